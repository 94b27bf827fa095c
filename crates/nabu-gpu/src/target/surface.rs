use crate::device::{
    ColorAttachmentDesc, DepthStencilAttachmentDesc, GpuDevice, PassDescriptor, TextureDesc,
    TextureId, ViewDesc, ViewId,
};

use super::{Attachment, PassOps, RenderTargetKey};

/// An externally owned single-sample color texture rendered into by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorBuffer {
    pub texture: TextureId,
    pub format: wgpu::TextureFormat,
}

/// Where a surface's depth/stencil comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DepthConfig {
    #[default]
    None,
    /// Allocated by the surface at `init`, released at `destroy`.
    Owned(wgpu::TextureFormat),
    /// Supplied by the caller; the surface only creates a view of it.
    External {
        texture: TextureId,
        format: wgpu::TextureFormat,
    },
}

/// Construction parameters for an offscreen [`RenderSurface`].
#[derive(Debug, Clone)]
pub struct RenderSurfaceDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub color_buffers: Vec<ColorBuffer>,
    pub depth: DepthConfig,
}

impl Default for RenderSurfaceDesc {
    fn default() -> Self {
        Self {
            label: "render surface".into(),
            width: 0,
            height: 0,
            sample_count: 1,
            color_buffers: Vec::new(),
            depth: DepthConfig::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Assigned {
    texture: TextureId,
    view: ViewId,
}

/// Color and depth attachments of one render target, with the descriptor used
/// to open passes on it.
///
/// `Uninitialized --init--> Initialized --destroy--> Uninitialized`. GPU
/// textures are only allocated by `init`; formats, sample count and size may
/// only change while uninitialized (except the backbuffer's slot 0 format,
/// which follows the swapchain).
#[derive(Debug)]
pub struct RenderSurface {
    label: String,
    width: u32,
    height: u32,
    sample_count: u32,
    backbuffer: bool,

    color_buffers: Vec<ColorBuffer>,
    color_attachments: Vec<Attachment>,
    /// Views of `color_buffers`, owned by the surface.
    color_views: Vec<Option<ViewId>>,
    assigned: Option<Assigned>,

    depth: DepthConfig,
    depth_format: Option<wgpu::TextureFormat>,
    has_stencil: bool,
    depth_texture: Option<TextureId>,
    depth_view: Option<ViewId>,

    key: RenderTargetKey,
    pass: PassDescriptor,
    initialized: bool,
}

impl RenderSurface {
    pub fn new(desc: RenderSurfaceDesc) -> Self {
        let mut surface = Self::empty(desc.label, desc.sample_count, false);
        surface.width = desc.width;
        surface.height = desc.height;
        surface.depth = desc.depth;

        for (i, buffer) in desc.color_buffers.iter().enumerate() {
            surface.set_color_attachment(i, None, Some(buffer.format));
        }
        surface.color_buffers = desc.color_buffers;

        match desc.depth {
            DepthConfig::None => {}
            DepthConfig::Owned(format) | DepthConfig::External { format, .. } => {
                surface.set_depth_format(format)
            }
        }
        surface.update_key();
        surface
    }

    /// The surface presenting into the swapchain. Its size and slot 0 format
    /// are set every frame from the swapchain texture.
    pub fn backbuffer(sample_count: u32, depth_format: Option<wgpu::TextureFormat>) -> Self {
        let mut surface = Self::empty("backbuffer".into(), sample_count, true);
        if let Some(format) = depth_format {
            surface.depth = DepthConfig::Owned(format);
            surface.set_depth_format(format);
        }
        surface.update_key();
        surface
    }

    fn empty(label: String, sample_count: u32, backbuffer: bool) -> Self {
        Self {
            pass: PassDescriptor {
                label: label.clone(),
                ..PassDescriptor::default()
            },
            label,
            width: 0,
            height: 0,
            sample_count: sample_count.max(1),
            backbuffer,
            color_buffers: Vec::new(),
            color_attachments: Vec::new(),
            color_views: Vec::new(),
            assigned: None,
            depth: DepthConfig::None,
            depth_format: None,
            has_stencil: false,
            depth_texture: None,
            depth_view: None,
            key: RenderTargetKey::default(),
            initialized: false,
        }
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn is_backbuffer(&self) -> bool {
        self.backbuffer
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn has_stencil(&self) -> bool {
        self.has_stencil
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_format
    }

    pub fn key(&self) -> &RenderTargetKey {
        &self.key
    }

    pub fn pass_descriptor(&self) -> &PassDescriptor {
        &self.pass
    }

    pub(crate) fn pass_descriptor_mut(&mut self) -> &mut PassDescriptor {
        &mut self.pass
    }

    pub fn color_attachment(&self, index: usize) -> Option<&Attachment> {
        self.color_attachments.get(index)
    }

    pub fn color_attachment_count(&self) -> usize {
        self.color_attachments.len()
    }

    /// The single-sample texture holding the final color of slot `index`.
    pub fn color_texture(&self, index: usize) -> Option<TextureId> {
        if self.backbuffer && index == 0 {
            return self.assigned.map(|a| a.texture);
        }
        self.color_buffers.get(index).map(|b| b.texture)
    }

    pub fn depth_texture(&self) -> Option<TextureId> {
        self.depth_texture
    }

    // ── structural mutation ───────────────────────────────────────────────

    /// Creates the attachment at `index` if needed and updates whichever of
    /// `multisampled` and `format` is given.
    pub fn set_color_attachment(
        &mut self,
        index: usize,
        multisampled: Option<TextureId>,
        format: Option<wgpu::TextureFormat>,
    ) {
        let created = index >= self.color_attachments.len();
        if created {
            self.color_attachments.resize_with(index + 1, Attachment::default);
        }
        let attachment = &mut self.color_attachments[index];

        if let Some(texture) = multisampled {
            attachment.set_multisampled(texture);
        }
        let format_changed = format.is_some_and(|f| attachment.set_format(f));
        if created || format_changed {
            self.update_key();
        }
    }

    pub fn set_depth_format(&mut self, format: wgpu::TextureFormat) {
        assert!(
            format.has_depth_aspect(),
            "render surface '{}': {format:?} is not a depth format",
            self.label
        );
        self.has_stencil = format.has_stencil_aspect();
        if self.depth_format != Some(format) {
            self.depth_format = Some(format);
            self.update_key();
        }
    }

    pub fn set_sample_count(&mut self, sample_count: u32) {
        debug_assert!(
            !self.initialized,
            "render surface '{}': sample count changed while initialized",
            self.label
        );
        let sample_count = sample_count.max(1);
        if self.sample_count != sample_count {
            self.sample_count = sample_count;
            self.update_key();
        }
    }

    /// Sets the size used by the next `init`.
    pub fn resize(&mut self, width: u32, height: u32) {
        debug_assert!(
            !self.initialized,
            "render surface '{}': resize requires destroy first",
            self.label
        );
        self.width = width;
        self.height = height;
    }

    fn update_key(&mut self) {
        self.key = RenderTargetKey {
            sample_count: self.sample_count,
            depth_format: self.depth_format,
            color_formats: self.color_attachments.iter().map(Attachment::format).collect(),
        };
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    /// Hands this frame's swapchain texture to the backbuffer.
    pub fn assign_color_texture<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        texture: TextureId,
    ) {
        debug_assert!(self.backbuffer, "only the backbuffer is assigned textures");
        let Some(info) = device.texture_info(texture) else {
            log::error!("render surface '{}': assigned texture is gone", self.label);
            return;
        };

        let view = device.create_view(texture, &ViewDesc::default());
        if let Some(previous) = self.assigned.replace(Assigned { texture, view }) {
            device.destroy_view(previous.view);
        }

        self.set_color_attachment(0, None, Some(info.format));
        if let Some(slot) = self.pass.color_attachments.first_mut() {
            if self.sample_count > 1 {
                slot.resolve_target = Some(view);
            } else {
                slot.view = Some(view);
            }
        }
    }

    /// Allocates the surface's GPU textures and builds its pass descriptor.
    pub fn init<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        if self.initialized {
            debug_assert!(false, "render surface '{}' initialized twice", self.label);
            log::error!("render surface '{}' initialized twice", self.label);
            return;
        }
        assert!(
            self.width > 0 && self.height > 0,
            "render surface '{}' has zero size {}x{}",
            self.label,
            self.width,
            self.height
        );

        let depth_stencil = self.init_depth(device);

        let count = self.color_buffers.len().max(1);
        self.color_views = vec![None; count];
        let mut color_attachments = Vec::with_capacity(count);

        for index in 0..count {
            if index >= self.color_buffers.len() && !self.backbuffer {
                // Depth-only target.
                break;
            }
            let single = match self.color_buffers.get(index) {
                Some(buffer) => {
                    let view = device.create_view(buffer.texture, &ViewDesc::single_mip(0));
                    self.color_views[index] = Some(view);
                    Some(view)
                }
                None if self.backbuffer && index == 0 => self.assigned.map(|a| a.view),
                None => None,
            };

            let desc = if self.sample_count > 1 {
                let msaa = self.init_multisampled_color(device, index);
                ColorAttachmentDesc::new(msaa, single)
            } else {
                ColorAttachmentDesc::new(single, None)
            };

            let awaiting_backbuffer = index == 0
                && self
                    .color_attachments
                    .first()
                    .and_then(Attachment::format)
                    .is_some();
            if desc.view.is_some() || awaiting_backbuffer {
                color_attachments.push(desc);
            }
        }

        self.pass = PassDescriptor {
            label: self.label.clone(),
            color_attachments,
            depth_stencil,
            timestamp_writes: None,
        };
        self.initialized = true;
        log::debug!(
            "render surface '{}' initialized: {}x{}, {} samples",
            self.label,
            self.width,
            self.height,
            self.sample_count
        );
    }

    fn init_depth<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
    ) -> Option<DepthStencilAttachmentDesc> {
        let texture = match self.depth {
            DepthConfig::None => return None,
            DepthConfig::External { texture, .. } => texture,
            DepthConfig::Owned(format) => {
                // Multisampled depth is resolved by sampling it; single-sample
                // depth is copied out for grab passes.
                let extra = if self.sample_count > 1 {
                    wgpu::TextureUsages::TEXTURE_BINDING
                } else {
                    wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST
                };
                let label = format!("{} depth", self.label);
                let texture = device.create_texture(&TextureDesc {
                    label: &label,
                    width: self.width,
                    height: self.height,
                    mip_level_count: 1,
                    sample_count: self.sample_count,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | extra,
                });
                self.depth_texture = Some(texture);
                texture
            }
        };
        if let DepthConfig::External { texture, .. } = self.depth {
            self.depth_texture = Some(texture);
        }

        let view = device.create_view(texture, &ViewDesc::default());
        self.depth_view = Some(view);
        Some(DepthStencilAttachmentDesc {
            view,
            depth_ops: None,
            stencil_ops: None,
        })
    }

    fn init_multisampled_color<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        index: usize,
    ) -> Option<ViewId> {
        let format = self
            .color_attachments
            .get(index)
            .and_then(Attachment::format)
            .or_else(|| self.color_buffers.get(index).map(|b| b.format));
        let Some(format) = format else {
            log::warn!(
                "render surface '{}': color slot {index} has no format, no multisample buffer",
                self.label
            );
            return None;
        };

        let label = format!("{} msaa color {index}", self.label);
        let texture = device.create_texture(&TextureDesc {
            label: &label,
            width: self.width,
            height: self.height,
            mip_level_count: 1,
            sample_count: self.sample_count,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        });
        let view = device.create_view(texture, &ViewDesc::default());

        self.set_color_attachment(index, Some(texture), Some(format));
        self.color_attachments[index].set_multisampled_view(view);
        Some(view)
    }

    /// Writes this pass's load/store/clear configuration into the descriptor.
    pub fn setup_for_render_pass(&mut self, ops: &PassOps) {
        debug_assert!(
            self.initialized,
            "render surface '{}' used before init",
            self.label
        );

        for (index, slot) in self.pass.color_attachments.iter_mut().enumerate() {
            slot.ops = ops.color(index).operations();
        }
        if let Some(depth) = self.pass.depth_stencil.as_mut() {
            depth.depth_ops = Some(ops.depth_stencil.depth_operations());
            depth.stencil_ops = self
                .has_stencil
                .then(|| ops.depth_stencil.stencil_operations());
        }
    }

    /// Releases every GPU object the surface created. The surface can be
    /// initialized again afterwards, possibly with a new size.
    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        for attachment in &mut self.color_attachments {
            attachment.release(device);
        }
        for view in self.color_views.drain(..).flatten() {
            device.destroy_view(view);
        }
        if let Some(assigned) = self.assigned.take() {
            device.destroy_view(assigned.view);
        }
        if let Some(view) = self.depth_view.take() {
            device.destroy_view(view);
        }
        let owns_depth = matches!(self.depth, DepthConfig::Owned(_));
        if let Some(texture) = self.depth_texture.take().filter(|_| owns_depth) {
            device.destroy_texture(texture);
        }

        self.reset_pass();
    }

    /// Forgets every GPU handle after the device was lost. Nothing is released.
    pub fn lose_context(&mut self) {
        for attachment in &mut self.color_attachments {
            attachment.forget();
        }
        self.color_views.clear();
        self.assigned = None;
        self.depth_view = None;
        self.depth_texture = None;
        self.reset_pass();
    }

    fn reset_pass(&mut self) {
        self.pass = PassDescriptor {
            label: self.label.clone(),
            ..PassDescriptor::default()
        };
        self.initialized = false;
    }
}

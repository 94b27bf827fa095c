//! Recording backend for GPU-free tests.
//!
//! Every encoder call is stored as a [`MockCommand`]. Submitted command buffers
//! are kept in submission order so tests can assert on the exact stream the
//! core produced.

use std::ops::Range;

use slotmap::SlotMap;

use super::backend::{
    GpuDevice, PassDescriptor, ReadbackCallback, SwapchainTexture, TextureDesc, TextureInfo,
    ViewDesc,
};
use super::handles::{
    BindGroupId, BufferId, CommandBufferId, EncoderId, PipelineId, QuerySetId, ReadbackId,
    TextureId, ViewId,
};
use super::SurfaceErrorAction;

#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    BeginRenderPass(PassDescriptor),
    EndRenderPass,
    SetPipeline(PipelineId),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupId,
        offsets: Vec<u32>,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferId,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: BufferId,
        format: wgpu::IndexFormat,
    },
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    SetScissorRect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    SetStencilReference(u32),
    SetBlendConstant(wgpu::Color),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    CopyTextureToTexture {
        src: TextureId,
        dst: TextureId,
        size: wgpu::Extent3d,
    },
    ResolveDepth {
        src: TextureId,
        dst: TextureId,
    },
    GenerateMipmaps(TextureId),
    WriteTimestamp {
        query_set: QuerySetId,
        index: u32,
    },
    ResolveQuerySet {
        query_set: QuerySetId,
        count: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockCommandBuffer {
    pub label: String,
    pub commands: Vec<MockCommand>,
}

#[derive(Debug, Clone)]
pub struct MockTexture {
    pub label: String,
    pub info: TextureInfo,
    pub destroyed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MockView {
    pub texture: TextureId,
    pub desc: ViewDesc,
}

struct PendingReadback {
    count: u32,
    on_ready: Option<ReadbackCallback>,
}

pub struct MockDevice {
    textures: SlotMap<TextureId, MockTexture>,
    views: SlotMap<ViewId, MockView>,
    encoders: SlotMap<EncoderId, MockCommandBuffer>,
    command_buffers: SlotMap<CommandBufferId, MockCommandBuffer>,
    query_sets: SlotMap<QuerySetId, u32>,
    readbacks: SlotMap<ReadbackId, PendingReadback>,

    submissions: Vec<Vec<MockCommandBuffer>>,
    destroyed_views: Vec<ViewId>,

    surface_width: u32,
    surface_height: u32,
    surface_format: wgpu::TextureFormat,
    backbuffer: Option<TextureId>,
    next_acquire_error: Option<wgpu::SurfaceError>,
    handled_errors: Vec<wgpu::SurfaceError>,

    timestamps_supported: bool,
    timestamp_period: f32,

    pub presents: u32,
    pub polls: u32,
    pub resizes: Vec<(u32, u32)>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl MockDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            textures: SlotMap::with_key(),
            views: SlotMap::with_key(),
            encoders: SlotMap::with_key(),
            command_buffers: SlotMap::with_key(),
            query_sets: SlotMap::with_key(),
            readbacks: SlotMap::with_key(),
            submissions: Vec::new(),
            destroyed_views: Vec::new(),
            surface_width: width,
            surface_height: height,
            surface_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            backbuffer: None,
            next_acquire_error: None,
            handled_errors: Vec::new(),
            timestamps_supported: true,
            timestamp_period: 1.0,
            presents: 0,
            polls: 0,
            resizes: Vec::new(),
        }
    }

    pub fn without_timestamps(mut self) -> Self {
        self.timestamps_supported = false;
        self
    }

    pub fn set_surface_size(&mut self, width: u32, height: u32) {
        self.surface_width = width;
        self.surface_height = height;
    }

    pub fn set_timestamp_period(&mut self, period: f32) {
        self.timestamp_period = period;
    }

    /// Makes the next `acquire_backbuffer` fail with `err`.
    pub fn fail_next_acquire(&mut self, err: wgpu::SurfaceError) {
        self.next_acquire_error = Some(err);
    }

    pub fn handled_errors(&self) -> &[wgpu::SurfaceError] {
        &self.handled_errors
    }

    pub fn submissions(&self) -> &[Vec<MockCommandBuffer>] {
        &self.submissions
    }

    /// Labels of every submitted command buffer, flattened in submission order.
    pub fn submitted_labels(&self) -> Vec<String> {
        self.submissions
            .iter()
            .flatten()
            .map(|cb| cb.label.clone())
            .collect()
    }

    /// Every submitted command, flattened in submission order.
    pub fn submitted_commands(&self) -> Vec<MockCommand> {
        self.submissions
            .iter()
            .flatten()
            .flat_map(|cb| cb.commands.iter().cloned())
            .collect()
    }

    /// Encoders still recording plus command buffers finished but never submitted.
    pub fn unsubmitted_commands(&self) -> usize {
        self.command_buffers.len() + self.encoders.len()
    }

    pub fn texture(&self, texture: TextureId) -> Option<&MockTexture> {
        self.textures.get(texture)
    }

    pub fn view(&self, view: ViewId) -> Option<&MockView> {
        self.views.get(view)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.values().filter(|t| !t.destroyed).count()
    }

    pub fn live_views(&self) -> usize {
        self.views.len()
    }

    pub fn destroyed_views(&self) -> &[ViewId] {
        &self.destroyed_views
    }

    pub fn pending_readbacks(&self) -> usize {
        self.readbacks
            .values()
            .filter(|r| r.on_ready.is_some())
            .count()
    }

    /// Delivers every mapped readback. Query `i` reads `i * 1_000_000` ticks,
    /// so each begin/end pair spans one million ticks.
    pub fn complete_readbacks(&mut self) {
        self.complete_readbacks_with(|count| (0..u64::from(count)).map(|i| i * 1_000_000).collect());
    }

    pub fn complete_readbacks_with(&mut self, mut ticks: impl FnMut(u32) -> Vec<u64>) {
        let ready: Vec<ReadbackId> = self
            .readbacks
            .iter()
            .filter(|(_, r)| r.on_ready.is_some())
            .map(|(id, _)| id)
            .collect();
        for id in ready {
            let Some(mut readback) = self.readbacks.remove(id) else {
                continue;
            };
            if let Some(on_ready) = readback.on_ready.take() {
                on_ready(Some(ticks(readback.count)));
            }
        }
    }

    /// Delivers every mapped readback as a mapping failure.
    pub fn fail_readbacks(&mut self) {
        let ready: Vec<ReadbackId> = self.readbacks.keys().collect();
        for id in ready {
            let on_ready = self.readbacks.remove(id).and_then(|mut r| r.on_ready.take());
            if let Some(on_ready) = on_ready {
                on_ready(None);
            }
        }
    }

    fn record(&mut self, encoder: EncoderId, command: MockCommand) {
        match self.encoders.get_mut(encoder) {
            Some(cb) => cb.commands.push(command),
            None => log::warn!("mock: command on unknown encoder {encoder:?}"),
        }
    }
}

impl GpuDevice for MockDevice {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureId {
        self.textures.insert(MockTexture {
            label: desc.label.to_owned(),
            info: TextureInfo {
                width: desc.width,
                height: desc.height,
                mip_level_count: desc.mip_level_count,
                sample_count: desc.sample_count,
                format: desc.format,
                usage: desc.usage,
            },
            destroyed: false,
        })
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.get_mut(texture) {
            t.destroyed = true;
        }
    }

    fn texture_info(&self, texture: TextureId) -> Option<TextureInfo> {
        self.textures
            .get(texture)
            .filter(|t| !t.destroyed)
            .map(|t| t.info)
    }

    fn create_view(&mut self, texture: TextureId, desc: &ViewDesc) -> ViewId {
        self.views.insert(MockView {
            texture,
            desc: *desc,
        })
    }

    fn destroy_view(&mut self, view: ViewId) {
        if self.views.remove(view).is_some() {
            self.destroyed_views.push(view);
        }
    }

    fn acquire_backbuffer(&mut self) -> Result<SwapchainTexture, wgpu::SurfaceError> {
        if let Some(err) = self.next_acquire_error.take() {
            return Err(err);
        }
        let texture = match self.backbuffer {
            Some(texture) => texture,
            None => {
                let texture = self.create_texture(&TextureDesc {
                    label: "swapchain",
                    width: self.surface_width,
                    height: self.surface_height,
                    mip_level_count: 1,
                    sample_count: 1,
                    format: self.surface_format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::COPY_SRC
                        | wgpu::TextureUsages::COPY_DST,
                });
                self.backbuffer = Some(texture);
                texture
            }
        };
        Ok(SwapchainTexture {
            texture,
            width: self.surface_width,
            height: self.surface_height,
            format: self.surface_format,
        })
    }

    fn handle_surface_error(&mut self, err: wgpu::SurfaceError) -> SurfaceErrorAction {
        let action = SurfaceErrorAction::classify(&err);
        self.handled_errors.push(err);
        action
    }

    fn present(&mut self) {
        if let Some(texture) = self.backbuffer.take() {
            self.destroy_texture(texture);
            self.presents += 1;
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.resizes.push((width, height));
        if width > 0 && height > 0 {
            self.set_surface_size(width, height);
        }
    }

    fn create_encoder(&mut self, label: &str) -> EncoderId {
        self.encoders.insert(MockCommandBuffer {
            label: label.to_owned(),
            commands: Vec::new(),
        })
    }

    fn finish_encoder(&mut self, encoder: EncoderId) -> CommandBufferId {
        match self.encoders.remove(encoder) {
            Some(cb) => self.command_buffers.insert(cb),
            None => CommandBufferId::default(),
        }
    }

    fn begin_render_pass(&mut self, encoder: EncoderId, desc: &PassDescriptor) {
        self.record(encoder, MockCommand::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&mut self, encoder: EncoderId) {
        self.record(encoder, MockCommand::EndRenderPass);
    }

    fn set_pipeline(&mut self, encoder: EncoderId, pipeline: PipelineId) {
        self.record(encoder, MockCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(
        &mut self,
        encoder: EncoderId,
        index: u32,
        bind_group: BindGroupId,
        dynamic_offsets: &[u32],
    ) {
        self.record(
            encoder,
            MockCommand::SetBindGroup {
                index,
                bind_group,
                offsets: dynamic_offsets.to_vec(),
            },
        );
    }

    fn set_vertex_buffer(&mut self, encoder: EncoderId, slot: u32, buffer: BufferId, offset: u64) {
        self.record(
            encoder,
            MockCommand::SetVertexBuffer {
                slot,
                buffer,
                offset,
            },
        );
    }

    fn set_index_buffer(&mut self, encoder: EncoderId, buffer: BufferId, format: wgpu::IndexFormat) {
        self.record(encoder, MockCommand::SetIndexBuffer { buffer, format });
    }

    fn set_viewport(&mut self, encoder: EncoderId, x: f32, y: f32, width: f32, height: f32) {
        self.record(
            encoder,
            MockCommand::SetViewport {
                x,
                y,
                width,
                height,
            },
        );
    }

    fn set_scissor_rect(&mut self, encoder: EncoderId, x: u32, y: u32, width: u32, height: u32) {
        self.record(
            encoder,
            MockCommand::SetScissorRect {
                x,
                y,
                width,
                height,
            },
        );
    }

    fn set_stencil_reference(&mut self, encoder: EncoderId, reference: u32) {
        self.record(encoder, MockCommand::SetStencilReference(reference));
    }

    fn set_blend_constant(&mut self, encoder: EncoderId, color: wgpu::Color) {
        self.record(encoder, MockCommand::SetBlendConstant(color));
    }

    fn draw(&mut self, encoder: EncoderId, vertices: Range<u32>, instances: Range<u32>) {
        self.record(
            encoder,
            MockCommand::Draw {
                vertices,
                instances,
            },
        );
    }

    fn draw_indexed(
        &mut self,
        encoder: EncoderId,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) {
        self.record(
            encoder,
            MockCommand::DrawIndexed {
                indices,
                base_vertex,
                instances,
            },
        );
    }

    fn copy_texture_to_texture(
        &mut self,
        encoder: EncoderId,
        src: TextureId,
        dst: TextureId,
        size: wgpu::Extent3d,
    ) {
        self.record(encoder, MockCommand::CopyTextureToTexture { src, dst, size });
    }

    fn resolve_depth(&mut self, encoder: EncoderId, src: TextureId, dst: TextureId) {
        self.record(encoder, MockCommand::ResolveDepth { src, dst });
    }

    fn generate_mipmaps(&mut self, encoder: EncoderId, texture: TextureId) {
        self.record(encoder, MockCommand::GenerateMipmaps(texture));
    }

    fn submit(&mut self, command_buffers: Vec<CommandBufferId>) {
        let batch: Vec<MockCommandBuffer> = command_buffers
            .into_iter()
            .filter_map(|id| self.command_buffers.remove(id))
            .collect();
        self.submissions.push(batch);
    }

    fn create_query_set(&mut self, count: u32) -> Option<QuerySetId> {
        self.timestamps_supported
            .then(|| self.query_sets.insert(count))
    }

    fn write_timestamp(&mut self, encoder: EncoderId, query_set: QuerySetId, index: u32) {
        self.record(encoder, MockCommand::WriteTimestamp { query_set, index });
    }

    fn resolve_query_set(
        &mut self,
        encoder: EncoderId,
        query_set: QuerySetId,
        count: u32,
    ) -> ReadbackId {
        self.record(encoder, MockCommand::ResolveQuerySet { query_set, count });
        self.readbacks.insert(PendingReadback {
            count,
            on_ready: None,
        })
    }

    fn map_readback(&mut self, readback: ReadbackId, on_ready: ReadbackCallback) {
        match self.readbacks.get_mut(readback) {
            Some(pending) => pending.on_ready = Some(on_ready),
            None => on_ready(None),
        }
    }

    fn timestamp_period(&self) -> f32 {
        self.timestamp_period
    }

    fn poll(&mut self) {
        self.polls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_land_in_submission_order() {
        let mut mock = MockDevice::default();
        let a = mock.create_encoder("a");
        let b = mock.create_encoder("b");
        mock.draw(b, 0..3, 0..1);
        let cb_a = mock.finish_encoder(a);
        let cb_b = mock.finish_encoder(b);

        mock.submit(vec![cb_b, cb_a]);

        assert_eq!(mock.submitted_labels(), vec!["b", "a"]);
        assert_eq!(
            mock.submitted_commands(),
            vec![MockCommand::Draw {
                vertices: 0..3,
                instances: 0..1
            }]
        );
        assert_eq!(mock.unsubmitted_commands(), 0);
    }

    #[test]
    fn backbuffer_is_stable_until_present() {
        let mut mock = MockDevice::new(64, 32);
        let first = mock.acquire_backbuffer().unwrap();
        let again = mock.acquire_backbuffer().unwrap();
        assert_eq!(first, again);
        assert_eq!((first.width, first.height), (64, 32));

        mock.present();
        assert!(mock.texture_info(first.texture).is_none());
        let next = mock.acquire_backbuffer().unwrap();
        assert_ne!(next.texture, first.texture);
    }

    #[test]
    fn readback_delivers_ticks_once() {
        use std::sync::{Arc, Mutex};

        let mut mock = MockDevice::default();
        let qs = mock.create_query_set(4).unwrap();
        let enc = mock.create_encoder("resolve");
        let rb = mock.resolve_query_set(enc, qs, 4);

        let got = Arc::new(Mutex::new(None));
        let sink = got.clone();
        mock.map_readback(rb, Box::new(move |ticks| *sink.lock().unwrap() = ticks));
        assert_eq!(mock.pending_readbacks(), 1);

        mock.complete_readbacks();
        assert_eq!(
            got.lock().unwrap().clone(),
            Some(vec![0, 1_000_000, 2_000_000, 3_000_000])
        );
        assert_eq!(mock.pending_readbacks(), 0);
    }
}

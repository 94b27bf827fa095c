use std::ops::Range;

use super::handles::{
    BindGroupId, BufferId, CommandBufferId, EncoderId, PipelineId, QuerySetId, ReadbackId,
    TextureId, ViewId,
};
use super::SurfaceErrorAction;

/// Invoked once with the raw timestamp ticks of a readback, or `None` when
/// mapping failed.
pub type ReadbackCallback = Box<dyn FnOnce(Option<Vec<u64>>) + Send + 'static>;

/// Parameters for a 2D texture allocation.
#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

/// Immutable properties of a live texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

/// Subresource selection for a texture view.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ViewDesc {
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub aspect: wgpu::TextureAspect,
}

impl Default for ViewDesc {
    fn default() -> Self {
        Self {
            base_mip_level: 0,
            mip_level_count: None,
            aspect: wgpu::TextureAspect::All,
        }
    }
}

impl ViewDesc {
    /// A single-level view of `mip_level`, as used for render attachments.
    pub fn single_mip(mip_level: u32) -> Self {
        Self {
            base_mip_level: mip_level,
            mip_level_count: Some(1),
            aspect: wgpu::TextureAspect::All,
        }
    }
}

/// The texture handed out by the swapchain for the current frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SwapchainTexture {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// One color slot of a [`PassDescriptor`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColorAttachmentDesc {
    /// The view rendered into. `None` only while the backbuffer waits for its
    /// swapchain texture.
    pub view: Option<ViewId>,
    /// Single-sample target a multisampled `view` resolves into.
    pub resolve_target: Option<ViewId>,
    pub ops: wgpu::Operations<wgpu::Color>,
}

impl ColorAttachmentDesc {
    pub fn new(view: Option<ViewId>, resolve_target: Option<ViewId>) -> Self {
        Self {
            view,
            resolve_target,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        }
    }
}

/// The depth/stencil slot of a [`PassDescriptor`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DepthStencilAttachmentDesc {
    pub view: ViewId,
    /// `None` marks the aspect read-only for the pass.
    pub depth_ops: Option<wgpu::Operations<f32>>,
    pub stencil_ops: Option<wgpu::Operations<u32>>,
}

/// Query indices written at the start and end of a render pass.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PassTimestampWrites {
    pub query_set: QuerySetId,
    pub beginning_of_pass_write_index: u32,
    pub end_of_pass_write_index: u32,
}

/// Everything needed to open a native render pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassDescriptor {
    pub label: String,
    pub color_attachments: Vec<ColorAttachmentDesc>,
    pub depth_stencil: Option<DepthStencilAttachmentDesc>,
    pub timestamp_writes: Option<PassTimestampWrites>,
}

/// Backend operations consumed by the orchestration core.
///
/// All GPU objects are named through handles. Operations on an unknown handle
/// are logged and ignored; they never panic.
///
/// Render-pass state calls (`set_pipeline` through `draw_indexed`) are only
/// meaningful between `begin_render_pass` and `end_render_pass` on the same
/// encoder.
pub trait GpuDevice {
    // ── resources ─────────────────────────────────────────────────────────

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureId;

    fn destroy_texture(&mut self, texture: TextureId);

    fn texture_info(&self, texture: TextureId) -> Option<TextureInfo>;

    fn create_view(&mut self, texture: TextureId, desc: &ViewDesc) -> ViewId;

    fn destroy_view(&mut self, view: ViewId);

    // ── swapchain ─────────────────────────────────────────────────────────

    /// Returns the swapchain texture for the current frame.
    ///
    /// Calling this again before [`present`](Self::present) returns the same
    /// texture.
    fn acquire_backbuffer(&mut self) -> Result<SwapchainTexture, wgpu::SurfaceError>;

    /// Converts an acquisition failure into a higher-level action, reconfiguring
    /// the surface where that helps.
    fn handle_surface_error(&mut self, err: wgpu::SurfaceError) -> SurfaceErrorAction;

    /// Presents the acquired swapchain texture, if any.
    fn present(&mut self);

    /// Reconfigures the swapchain for a new drawable size.
    fn resize(&mut self, width: u32, height: u32);

    // ── recording ─────────────────────────────────────────────────────────

    fn create_encoder(&mut self, label: &str) -> EncoderId;

    fn finish_encoder(&mut self, encoder: EncoderId) -> CommandBufferId;

    fn begin_render_pass(&mut self, encoder: EncoderId, desc: &PassDescriptor);

    fn end_render_pass(&mut self, encoder: EncoderId);

    fn set_pipeline(&mut self, encoder: EncoderId, pipeline: PipelineId);

    fn set_bind_group(
        &mut self,
        encoder: EncoderId,
        index: u32,
        bind_group: BindGroupId,
        dynamic_offsets: &[u32],
    );

    fn set_vertex_buffer(&mut self, encoder: EncoderId, slot: u32, buffer: BufferId, offset: u64);

    fn set_index_buffer(&mut self, encoder: EncoderId, buffer: BufferId, format: wgpu::IndexFormat);

    fn set_viewport(&mut self, encoder: EncoderId, x: f32, y: f32, width: f32, height: f32);

    fn set_scissor_rect(&mut self, encoder: EncoderId, x: u32, y: u32, width: u32, height: u32);

    fn set_stencil_reference(&mut self, encoder: EncoderId, reference: u32);

    fn set_blend_constant(&mut self, encoder: EncoderId, color: wgpu::Color);

    fn draw(&mut self, encoder: EncoderId, vertices: Range<u32>, instances: Range<u32>);

    fn draw_indexed(
        &mut self,
        encoder: EncoderId,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    );

    /// Copies mip 0 of `src` into mip 0 of `dst` (outside a render pass).
    fn copy_texture_to_texture(
        &mut self,
        encoder: EncoderId,
        src: TextureId,
        dst: TextureId,
        size: wgpu::Extent3d,
    );

    /// Resolves a multisampled depth texture into a single-sample color texture.
    fn resolve_depth(&mut self, encoder: EncoderId, src: TextureId, dst: TextureId);

    /// Fills mips `1..` of `texture` from mip 0.
    fn generate_mipmaps(&mut self, encoder: EncoderId, texture: TextureId);

    // ── queue ─────────────────────────────────────────────────────────────

    /// Submits command buffers in the given order.
    fn submit(&mut self, command_buffers: Vec<CommandBufferId>);

    // ── timestamps ────────────────────────────────────────────────────────

    /// Creates a timestamp query set, or `None` when timestamps are unsupported.
    fn create_query_set(&mut self, count: u32) -> Option<QuerySetId>;

    /// Records a single timestamp outside any render pass.
    fn write_timestamp(&mut self, encoder: EncoderId, query_set: QuerySetId, index: u32);

    /// Records the resolve of queries `0..count` into a mappable readback buffer.
    fn resolve_query_set(&mut self, encoder: EncoderId, query_set: QuerySetId, count: u32)
    -> ReadbackId;

    /// Maps a resolved readback once the GPU is done with it; `on_ready` runs
    /// outside the caller's control flow, from a later [`poll`](Self::poll).
    fn map_readback(&mut self, readback: ReadbackId, on_ready: ReadbackCallback);

    /// Nanoseconds per timestamp tick.
    fn timestamp_period(&self) -> f32;

    /// Lets the backend make progress on asynchronous work without blocking.
    fn poll(&mut self);
}

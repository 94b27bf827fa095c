//! Services the orchestrator consumes without owning their logic.

use std::sync::Arc;

use crate::device::{BindGroupFormatId, CommandBufferId, GpuDevice, PipelineId, ShaderId};
use crate::target::RenderTargetKey;

use super::state::{BlendState, DepthState, VertexFormat};

/// Everything that selects a render pipeline for a draw.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineRequest {
    pub topology: wgpu::PrimitiveTopology,
    pub vertex_formats: [Option<Arc<VertexFormat>>; 2],
    pub shader: ShaderId,
    pub target: RenderTargetKey,
    pub bind_group_formats: Vec<Option<BindGroupFormatId>>,
    pub blend: BlendState,
    pub depth: DepthState,
    pub cull_mode: Option<wgpu::Face>,
    pub stencil_enabled: bool,
    pub stencil_front: wgpu::StencilFaceState,
    pub stencil_back: wgpu::StencilFaceState,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
}

/// Creates or looks up render pipelines.
pub trait PipelineCache<D: GpuDevice> {
    /// `None` when no pipeline can be built for `request`; the draw is skipped.
    fn get(&mut self, device: &mut D, request: &PipelineRequest) -> Option<PipelineId>;
}

/// Per-frame staging uploads that must reach the GPU before any consumer.
pub trait DynamicBuffers<D: GpuDevice> {
    /// Finishes the pending upload commands, if any.
    fn submit(&mut self, device: &mut D) -> Option<CommandBufferId>;

    /// Called once the upload was handed to the GPU queue; staging memory can
    /// be recycled.
    fn on_submitted(&mut self);
}

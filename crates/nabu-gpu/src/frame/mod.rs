//! Frame and render-pass sequencing.
//!
//! [`FrameOrchestrator`] records passes into command buffers, keeps the
//! backbuffer in step with the swapchain and submits everything in order.

mod collaborators;
mod orchestrator;
mod pass;
mod queue;
mod state;

#[cfg(test)]
mod scenarios;

slotmap::new_key_type! {
    /// A render surface owned by the orchestrator.
    pub struct SurfaceId;
}

pub use collaborators::{DynamicBuffers, PipelineCache, PipelineRequest};
pub use orchestrator::{FrameOrchestrator, FrameStats, OrchestratorConfig};
pub use pass::RenderPassDesc;
pub use queue::CommandQueue;
pub use state::{
    BindGroup, BlendState, DepthState, IndexBuffer, Primitive, ScissorRect, Shader, ShaderStatus,
    StencilParameters, VertexBuffer, VertexElement, VertexFormat, Viewport,
};

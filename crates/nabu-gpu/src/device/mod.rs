//! GPU backend seam.
//!
//! The orchestration core talks to the GPU exclusively through [`GpuDevice`],
//! naming every object by handle. [`WgpuDevice`] is the production backend:
//! it owns the wgpu Instance/Adapter/Device/Queue and the window surface.

mod backend;
mod error;
mod gpu;
mod handles;
mod init;
mod mipmap;
mod pool;
mod resolve;
mod surface;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{
    ColorAttachmentDesc, DepthStencilAttachmentDesc, GpuDevice, PassDescriptor,
    PassTimestampWrites, ReadbackCallback, SwapchainTexture, TextureDesc, TextureInfo, ViewDesc,
};
pub use error::SurfaceErrorAction;
pub use gpu::WgpuDevice;
pub use handles::{
    BindGroupFormatId, BindGroupId, BufferId, CommandBufferId, EncoderId, PipelineId, QuerySetId,
    ReadbackId, ShaderId, TextureId, ViewId,
};
pub use init::GpuInit;

//! Opaque handles for GPU objects.
//!
//! Handles are small `Copy` keys. The object they name lives in the registry
//! of whichever [`GpuDevice`](super::GpuDevice) created or registered it.

use slotmap::new_key_type;

new_key_type! {
    /// A texture (owned by the core, imported by a collaborator, or a swapchain image).
    pub struct TextureId;

    /// A view into a texture.
    pub struct ViewId;

    /// A vertex, index or staging buffer.
    pub struct BufferId;

    /// A bind group.
    pub struct BindGroupId;

    /// The layout a bind group was created against.
    pub struct BindGroupFormatId;

    /// A shader program, owned by the pipeline cache.
    pub struct ShaderId;

    /// A render pipeline produced by the pipeline cache.
    pub struct PipelineId;

    /// A command encoder that is still recording.
    pub struct EncoderId;

    /// A finished, not yet submitted, command buffer.
    pub struct CommandBufferId;

    /// A timestamp query set.
    pub struct QuerySetId;

    /// Resolved query results waiting to be mapped for reading.
    pub struct ReadbackId;
}

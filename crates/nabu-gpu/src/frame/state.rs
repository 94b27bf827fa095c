use std::sync::Arc;

use crate::device::{BindGroupFormatId, BindGroupId, BufferId, ShaderId};

/// Compilation state of a shader, as reported by whoever compiles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shader {
    pub id: ShaderId,
    pub status: ShaderStatus,
}

impl Shader {
    pub fn ready(id: ShaderId) -> Self {
        Self {
            id,
            status: ShaderStatus::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ShaderStatus::Ready
    }
}

/// One attribute of a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub format: wgpu::VertexFormat,
    /// Byte offset into the buffer where this element's first value starts.
    pub offset: u64,
    pub shader_location: u32,
}

/// Layout of a vertex buffer.
///
/// Every element binds its own slot at the element's offset. Interleaved
/// elements share `stride`; non-interleaved elements are tightly packed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    pub elements: Vec<VertexElement>,
    pub stride: u64,
    pub interleaved: bool,
}

impl VertexFormat {
    /// Number of vertex buffer slots this format occupies.
    pub fn slot_count(&self) -> u32 {
        self.elements.len() as u32
    }

    /// Distance between consecutive values of `element`.
    pub fn element_stride(&self, element: &VertexElement) -> u64 {
        if self.interleaved {
            self.stride
        } else {
            element.format.size()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexBuffer {
    pub buffer: BufferId,
    pub format: Arc<VertexFormat>,
    pub vertex_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexBuffer {
    pub buffer: BufferId,
    pub format: wgpu::IndexFormat,
    pub index_count: u32,
}

/// What to draw from the bound buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    pub topology: wgpu::PrimitiveTopology,
    /// First vertex, or first index when `indexed`.
    pub base: u32,
    pub count: u32,
    pub indexed: bool,
    pub base_vertex: i32,
}

impl Primitive {
    pub fn triangles(count: u32) -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            base: 0,
            count,
            indexed: false,
            base_vertex: 0,
        }
    }

    pub fn indexed_triangles(count: u32) -> Self {
        Self {
            indexed: true,
            ..Self::triangles(count)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub blend: Option<wgpu::BlendState>,
    pub write_mask: wgpu::ColorWrites,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        }
    }
}

impl BlendState {
    pub fn alpha_blending() -> Self {
        Self {
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub compare: wgpu::CompareFunction,
    pub write: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            compare: wgpu::CompareFunction::LessEqual,
            write: true,
        }
    }
}

impl DepthState {
    pub fn disabled() -> Self {
        Self {
            compare: wgpu::CompareFunction::Always,
            write: false,
        }
    }
}

/// Stencil configuration of one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilParameters {
    pub face: wgpu::StencilFaceState,
    pub read_mask: u32,
    pub write_mask: u32,
    /// Dynamic state; not part of the pipeline.
    pub reference: u32,
}

impl Default for StencilParameters {
    fn default() -> Self {
        Self {
            face: wgpu::StencilFaceState::IGNORE,
            read_mask: 0xff,
            write_mask: 0xff,
            reference: 0,
        }
    }
}

/// A bind group together with the layout it was created against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroup {
    pub id: BindGroupId,
    pub format: BindGroupFormatId,
    pub dynamic_offsets: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Per-draw state collected by the setters and consumed by `draw`.
#[derive(Debug, Clone, Default)]
pub(crate) struct DrawState {
    pub shader: Option<Shader>,
    pub vertex_buffers: Vec<VertexBuffer>,
    pub index_buffer: Option<IndexBuffer>,
    pub blend: BlendState,
    pub blend_color: Option<wgpu::Color>,
    pub depth: DepthState,
    pub stencil_front: Option<StencilParameters>,
    pub stencil_back: Option<StencilParameters>,
    pub cull_mode: Option<wgpu::Face>,
    pub bind_group_formats: Vec<Option<BindGroupFormatId>>,
}

impl DrawState {
    pub fn stencil_enabled(&self) -> bool {
        self.stencil_front.is_some() || self.stencil_back.is_some()
    }

    pub fn clear_buffers(&mut self) {
        self.vertex_buffers.clear();
        self.index_buffer = None;
    }
}

/// Last values emitted into the open pass, for redundant-state elimination.
///
/// Reset values match what a freshly opened native pass starts with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PassCache {
    pub pipeline: Option<crate::device::PipelineId>,
    pub stencil_reference: u32,
    pub blend_color: wgpu::Color,
    pub viewport: Viewport,
    pub scissor: ScissorRect,
}

impl PassCache {
    /// Cache for a pass just opened on a `width` x `height` target.
    ///
    /// Seeding with the values wgpu applies when a pass opens is equivalent
    /// to forcing re-emission: a value is skipped only when the pass already
    /// holds it, and any other value is emitted on first use.
    pub fn for_target(width: u32, height: u32) -> Self {
        Self {
            pipeline: None,
            stencil_reference: 0,
            blend_color: wgpu::Color::TRANSPARENT,
            viewport: Viewport {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
            },
            scissor: ScissorRect {
                x: 0,
                y: 0,
                width,
                height,
            },
        }
    }
}

use crate::target::PassOps;

use super::SurfaceId;

/// One logical render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDesc {
    /// Used for labels and as the profiler slot name.
    pub name: String,
    /// `None` renders into the backbuffer.
    pub target: Option<SurfaceId>,
    pub ops: PassOps,
}

impl RenderPassDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn target(mut self, target: SurfaceId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn ops(mut self, ops: PassOps) -> Self {
        self.ops = ops;
        self
    }
}

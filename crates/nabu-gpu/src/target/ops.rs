/// Load/store behavior of one color attachment for a single pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorOps {
    /// Clear to `clear_value` instead of loading previous contents.
    pub clear: bool,
    pub clear_value: wgpu::Color,
    /// Keep the rendered result. Disable for transient attachments.
    pub store: bool,
    /// Fill the lower mip levels of the color buffer once the pass ends.
    pub mipmaps: bool,
}

impl Default for ColorOps {
    fn default() -> Self {
        Self {
            clear: false,
            clear_value: wgpu::Color::BLACK,
            store: true,
            mipmaps: false,
        }
    }
}

impl ColorOps {
    pub fn cleared(color: wgpu::Color) -> Self {
        Self {
            clear: true,
            clear_value: color,
            ..Self::default()
        }
    }

    pub(crate) fn operations(&self) -> wgpu::Operations<wgpu::Color> {
        wgpu::Operations {
            load: if self.clear {
                wgpu::LoadOp::Clear(self.clear_value)
            } else {
                wgpu::LoadOp::Load
            },
            store: store_op(self.store),
        }
    }
}

/// Load/store behavior of the depth/stencil attachment for a single pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilOps {
    pub clear_depth: bool,
    pub clear_depth_value: f32,
    pub store_depth: bool,
    pub clear_stencil: bool,
    pub clear_stencil_value: u32,
    pub store_stencil: bool,
}

impl Default for DepthStencilOps {
    fn default() -> Self {
        Self {
            clear_depth: false,
            clear_depth_value: 1.0,
            store_depth: true,
            clear_stencil: false,
            clear_stencil_value: 0,
            store_stencil: true,
        }
    }
}

impl DepthStencilOps {
    pub fn cleared() -> Self {
        Self {
            clear_depth: true,
            clear_stencil: true,
            ..Self::default()
        }
    }

    pub(crate) fn depth_operations(&self) -> wgpu::Operations<f32> {
        wgpu::Operations {
            load: if self.clear_depth {
                wgpu::LoadOp::Clear(self.clear_depth_value)
            } else {
                wgpu::LoadOp::Load
            },
            store: store_op(self.store_depth),
        }
    }

    pub(crate) fn stencil_operations(&self) -> wgpu::Operations<u32> {
        wgpu::Operations {
            load: if self.clear_stencil {
                wgpu::LoadOp::Clear(self.clear_stencil_value)
            } else {
                wgpu::LoadOp::Load
            },
            store: store_op(self.store_stencil),
        }
    }
}

/// Per-pass attachment configuration. Color slots without an entry in
/// `color` use [`ColorOps::default`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOps {
    pub color: Vec<ColorOps>,
    pub depth_stencil: DepthStencilOps,
}

impl PassOps {
    /// Clears color slot 0 to `color` and depth/stencil to their clear values.
    pub fn clear_all(color: wgpu::Color) -> Self {
        Self {
            color: vec![ColorOps::cleared(color)],
            depth_stencil: DepthStencilOps::cleared(),
        }
    }

    pub fn color(&self, index: usize) -> ColorOps {
        self.color.get(index).copied().unwrap_or_default()
    }
}

fn store_op(store: bool) -> wgpu::StoreOp {
    if store {
        wgpu::StoreOp::Store
    } else {
        wgpu::StoreOp::Discard
    }
}

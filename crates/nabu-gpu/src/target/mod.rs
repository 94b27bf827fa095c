//! Render targets: color/depth attachments and the pass descriptors built
//! from them.

mod attachment;
mod key;
mod ops;
mod surface;

pub use attachment::Attachment;
pub use key::RenderTargetKey;
pub use ops::{ColorOps, DepthStencilOps, PassOps};
pub use surface::{ColorBuffer, DepthConfig, RenderSurface, RenderSurfaceDesc};

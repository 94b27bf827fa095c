//! Nabu GPU crate.
//!
//! Frame orchestration for a wgpu renderer: render surfaces and their
//! attachments, render pass sequencing with ordered submission, and GPU pass
//! timing through timestamp queries.

pub mod device;
pub mod frame;
pub mod logging;
pub mod profiler;
pub mod target;

pub use device::{GpuDevice, GpuInit, SurfaceErrorAction, WgpuDevice};
pub use frame::{FrameOrchestrator, OrchestratorConfig, RenderPassDesc, SurfaceId};
pub use profiler::{ProfilerReport, TimestampProfiler};
pub use target::{PassOps, RenderSurface, RenderSurfaceDesc};

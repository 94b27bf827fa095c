use std::fmt;

/// High-level response after a swapchain acquisition failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

impl SurfaceErrorAction {
    /// Classifies a surface error without touching the surface.
    ///
    /// `Lost` and `Outdated` need a reconfigure before the next acquisition;
    /// the caller performs it.
    pub fn classify(err: &wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => Self::Reconfigured,
            wgpu::SurfaceError::OutOfMemory => Self::Fatal,
            wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => Self::SkipFrame,
        }
    }

    pub fn is_fatal(self) -> bool {
        self == Self::Fatal
    }
}

impl fmt::Display for SurfaceErrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconfigured => f.write_str("surface reconfigured, frame skipped"),
            Self::SkipFrame => f.write_str("swapchain texture unavailable, frame skipped"),
            Self::Fatal => f.write_str("swapchain failure is unrecoverable"),
        }
    }
}

impl std::error::Error for SurfaceErrorAction {}

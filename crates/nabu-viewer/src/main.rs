//! Interactive check of the frame orchestrator on a real window.
//!
//! Draws a gradient triangle into a multisampled backbuffer each frame.
//! `P` toggles GPU pass timing; reports go to the log.

mod pipelines;

use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use nabu_gpu::frame::{Primitive, Shader};
use nabu_gpu::logging::{init_logging, LoggingConfig};
use nabu_gpu::target::PassOps;
use nabu_gpu::{
    FrameOrchestrator, GpuInit, OrchestratorConfig, RenderPassDesc, SurfaceErrorAction,
    WgpuDevice,
};

use pipelines::WgslPipelines;

const TRIANGLE_WGSL: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) i: u32) -> VsOut {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(0.0, 0.7),
        vec2<f32>(-0.7, -0.6),
        vec2<f32>(0.7, -0.6),
    );
    var color = array<vec3<f32>, 3>(
        vec3<f32>(0.95, 0.35, 0.2),
        vec3<f32>(0.2, 0.8, 0.45),
        vec3<f32>(0.25, 0.4, 0.95),
    );
    var out: VsOut;
    out.pos = vec4<f32>(pos[i], 0.5, 1.0);
    out.color = color[i];
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

struct Viewer {
    window: Arc<Window>,
    frame: FrameOrchestrator<WgpuDevice>,
    shader: Shader,
    pass: RenderPassDesc,
    profiling: bool,
}

impl Viewer {
    fn new(window: Arc<Window>) -> Result<Self> {
        let device = WgpuDevice::new_blocking(window.clone(), GpuInit::default())
            .context("GPU initialization failed")?;

        let mut pipelines = WgslPipelines::new(device.device());
        let shader = pipelines.add_shader(device.device(), "triangle", TRIANGLE_WGSL);

        let frame = FrameOrchestrator::new(
            device,
            Box::new(pipelines),
            OrchestratorConfig {
                backbuffer_sample_count: 4,
                backbuffer_depth_format: Some(wgpu::TextureFormat::Depth24PlusStencil8),
                ..OrchestratorConfig::default()
            },
        );

        Ok(Self {
            window,
            frame,
            shader: Shader::ready(shader),
            pass: RenderPassDesc::new("main").ops(PassOps::clear_all(wgpu::Color {
                r: 0.05,
                g: 0.05,
                b: 0.08,
                a: 1.0,
            })),
            profiling: false,
        })
    }

    fn toggle_profiling(&mut self) {
        self.profiling = !self.profiling;
        self.frame.set_profiling_enabled(self.profiling);
        log::info!("gpu profiling {}", if self.profiling { "requested" } else { "off" });
    }

    /// Renders one frame. `false` means rendering cannot continue.
    fn redraw(&mut self) -> bool {
        match self.frame.frame_start() {
            Ok(()) => {}
            Err(SurfaceErrorAction::Fatal) => return false,
            Err(_) => return true,
        }

        self.frame.start_pass(&self.pass);
        self.frame.set_shader(self.shader);
        self.frame.draw(&Primitive::triangles(3), 1, false);
        self.frame.end_pass(&self.pass);
        self.frame.frame_end();

        for report in self.frame.poll_profiler() {
            let passes: Vec<String> = report
                .passes
                .iter()
                .map(|p| format!("{} {:.3}ms", p.name, p.ms))
                .collect();
            log::info!(
                "frame {}: {:.3}ms [{}]",
                report.render_version,
                report.frame_ms,
                passes.join(", ")
            );
        }
        log::trace!("{:?}", self.frame.stats());
        true
    }
}

#[derive(Default)]
struct AppState {
    viewer: Option<Viewer>,
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("nabu viewer")
            .with_inner_size(LogicalSize::new(960.0, 600.0));
        let viewer = event_loop
            .create_window(attrs)
            .context("failed to create window")
            .and_then(|window| Viewer::new(Arc::new(window)));

        match viewer {
            Ok(viewer) => {
                viewer.window.request_redraw();
                self.viewer = Some(viewer);
            }
            Err(e) => {
                log::error!("failed to start viewer: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(viewer) = &self.viewer {
            viewer.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => viewer.frame.resize(size.width, size.height),

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = viewer.window.inner_size();
                viewer.frame.resize(size.width, size.height);
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyP),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => viewer.toggle_profiling(),

            WindowEvent::RedrawRequested => {
                if !viewer.redraw() {
                    log::error!("rendering stopped");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut state = AppState::default();
    event_loop
        .run_app(&mut state)
        .context("winit event loop terminated with error")?;
    Ok(())
}

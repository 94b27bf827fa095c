//! Whole-frame behavior of the orchestrator against the mock device.

use std::cell::Cell;
use std::rc::Rc;

use slotmap::{Key, SlotMap};

use crate::device::mock::{MockCommand, MockDevice};
use crate::device::{CommandBufferId, GpuDevice, PipelineId};
use crate::target::{ColorOps, PassOps};

use super::{
    DynamicBuffers, FrameOrchestrator, OrchestratorConfig, PipelineCache, PipelineRequest,
    Primitive, RenderPassDesc, Shader,
};

// ── helpers ───────────────────────────────────────────────────────────────

/// Hands out one pipeline per distinct request.
#[derive(Default)]
pub(crate) struct Pipelines {
    built: SlotMap<PipelineId, PipelineRequest>,
}

impl<D: GpuDevice> PipelineCache<D> for Pipelines {
    fn get(&mut self, _device: &mut D, request: &PipelineRequest) -> Option<PipelineId> {
        let existing = self
            .built
            .iter()
            .find(|(_, built)| *built == request)
            .map(|(id, _)| id);
        Some(existing.unwrap_or_else(|| self.built.insert(request.clone())))
    }
}

/// Records an "upload" command buffer whenever it has staged data.
struct Uploads {
    staged: bool,
    notified: Rc<Cell<u32>>,
}

impl DynamicBuffers<MockDevice> for Uploads {
    fn submit(&mut self, device: &mut MockDevice) -> Option<CommandBufferId> {
        if !std::mem::take(&mut self.staged) {
            return None;
        }
        let encoder = device.create_encoder("upload");
        Some(device.finish_encoder(encoder))
    }

    fn on_submitted(&mut self) {
        self.notified.set(self.notified.get() + 1);
        self.staged = true;
    }
}

pub(crate) fn orchestrator_with(config: OrchestratorConfig) -> FrameOrchestrator<MockDevice> {
    FrameOrchestrator::new(MockDevice::default(), Box::new(Pipelines::default()), config)
}

pub(crate) fn orchestrator() -> FrameOrchestrator<MockDevice> {
    orchestrator_with(OrchestratorConfig::default())
}

/// `n` distinct handles of any key type.
pub(crate) fn ids<K: Key>(n: usize) -> Vec<K> {
    let mut map: SlotMap<K, ()> = SlotMap::with_key();
    (0..n).map(|_| map.insert(())).collect()
}

pub(crate) fn ready_shader() -> Shader {
    Shader::ready(ids(1)[0])
}

/// Commands recorded into the submitted command buffer labelled `label`.
pub(crate) fn commands_of(mock: &MockDevice, label: &str) -> Vec<MockCommand> {
    mock.submissions()
        .iter()
        .flatten()
        .filter(|cb| cb.label == label)
        .flat_map(|cb| cb.commands.iter().cloned())
        .collect()
}

fn run_pass(frame: &mut FrameOrchestrator<MockDevice>, pass: &RenderPassDesc) {
    frame.start_pass(pass);
    frame.set_shader(ready_shader());
    frame.draw(&Primitive::triangles(3), 1, false);
    frame.end_pass(pass);
}

// ── scenarios ─────────────────────────────────────────────────────────────

#[test]
fn backbuffer_matches_swapchain_every_frame() {
    let mut frame = orchestrator();
    for (w, h) in [(800, 600), (1024, 768), (1024, 768), (640, 480), (1, 1)] {
        frame.device_mut().set_surface_size(w, h);
        frame.frame_start().unwrap();

        let backbuffer = frame.surface(frame.backbuffer()).unwrap();
        assert_eq!((backbuffer.width(), backbuffer.height()), (w, h));
        assert!(backbuffer.is_initialized());

        run_pass(&mut frame, &RenderPassDesc::new("main"));
        frame.frame_end();
    }
    assert_eq!(frame.device().presents, 5);
}

#[test]
fn backbuffer_resize_releases_previous_allocation() {
    let mut frame = orchestrator_with(OrchestratorConfig {
        backbuffer_sample_count: 4,
        backbuffer_depth_format: Some(wgpu::TextureFormat::Depth32Float),
        ..OrchestratorConfig::default()
    });
    frame.frame_start().unwrap();
    frame.frame_end();
    // Multisampled color and depth.
    let live = frame.device().live_textures();
    assert_eq!(live, 2);

    frame.device_mut().set_surface_size(320, 200);
    frame.frame_start().unwrap();
    // Old msaa color and depth destroyed, new pair allocated, plus this frame's swapchain texture.
    assert_eq!(frame.device().live_textures(), 3);
    let backbuffer = frame.surface(frame.backbuffer()).unwrap();
    let depth = backbuffer.depth_texture().unwrap();
    let info = frame.device().texture_info(depth).unwrap();
    assert_eq!((info.width, info.height, info.sample_count), (320, 200, 4));
}

#[test]
#[should_panic(expected = "still active")]
fn nested_pass_is_fatal() {
    let mut frame = orchestrator();
    frame.frame_start().unwrap();
    frame.start_pass(&RenderPassDesc::new("outer"));
    frame.start_pass(&RenderPassDesc::new("inner"));
}

#[test]
#[should_panic(expected = "without an active render pass")]
fn unmatched_end_pass_is_fatal() {
    let mut frame = orchestrator();
    frame.frame_start().unwrap();
    frame.end_pass(&RenderPassDesc::new("main"));
}

#[test]
fn upload_buffer_is_submitted_first() {
    let notified = Rc::new(Cell::new(0));
    let mut frame = orchestrator();
    frame.set_dynamic_buffers(Box::new(Uploads {
        staged: true,
        notified: notified.clone(),
    }));

    for n in [1, 3] {
        frame.frame_start().unwrap();
        for i in 0..n {
            run_pass(&mut frame, &RenderPassDesc::new(format!("pass {i}")));
        }
        frame.frame_end();

        let last: Vec<&str> = frame
            .device()
            .submissions()
            .last()
            .unwrap()
            .iter()
            .map(|cb| cb.label.as_str())
            .collect();
        assert_eq!(last.first(), Some(&"upload"));
        assert_eq!(last.len(), n + 1);
    }
    assert_eq!(notified.get(), 2);
}

#[test]
fn repeated_pass_names_share_a_profiler_slot() {
    let mut frame = orchestrator_with(OrchestratorConfig {
        profiler_enabled: true,
        ..OrchestratorConfig::default()
    });
    frame.frame_start().unwrap();
    for name in ["shadow", "main", "shadow"] {
        run_pass(&mut frame, &RenderPassDesc::new(name));
    }
    frame.frame_end();

    let writes: Vec<_> = frame
        .device()
        .submitted_commands()
        .into_iter()
        .filter_map(|c| match c {
            MockCommand::BeginRenderPass(desc) => Some(desc.timestamp_writes.unwrap()),
            _ => None,
        })
        .collect();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[0], writes[2]);
    assert_ne!(writes[0], writes[1]);
    // Slot 0 belongs to the frame itself.
    assert_eq!(writes[0].beginning_of_pass_write_index, 2);
}

#[test]
fn depth_stencil_backbuffer_descriptor() {
    let mut frame = orchestrator_with(OrchestratorConfig {
        backbuffer_depth_format: Some(wgpu::TextureFormat::Depth24PlusStencil8),
        ..OrchestratorConfig::default()
    });
    frame.frame_start().unwrap();

    let backbuffer = frame.surface(frame.backbuffer()).unwrap();
    assert!(backbuffer.has_stencil());
    let desc = backbuffer.pass_descriptor();
    assert_eq!(desc.color_attachments.len(), 1);
    assert!(desc.color_attachments[0].view.is_some());
    assert!(desc.depth_stencil.is_some());
}

#[test]
fn frame_start_twice_flushes_the_first_frame() {
    let mut frame = orchestrator();
    frame.frame_start().unwrap();
    run_pass(&mut frame, &RenderPassDesc::new("first"));
    assert_eq!(frame.queued_command_buffers(), 1);

    frame.frame_start().unwrap();
    assert_eq!(frame.queued_command_buffers(), 0);
    assert_eq!(frame.device().submitted_labels(), vec!["first"]);
    assert_eq!(frame.render_version(), 2);

    run_pass(&mut frame, &RenderPassDesc::new("second"));
    frame.frame_end();
    assert_eq!(frame.device().submissions().len(), 2);
    assert_eq!(frame.device().submissions()[1][0].label, "second");
    assert_eq!(frame.device().unsubmitted_commands(), 0);
}

#[test]
fn timings_keep_the_issuing_render_version() {
    let mut frame = orchestrator_with(OrchestratorConfig {
        profiler_enabled: true,
        ..OrchestratorConfig::default()
    });

    while frame.render_version() < 41 {
        frame.frame_start().unwrap();
        frame.frame_end();
        frame.device_mut().complete_readbacks();
        frame.poll_profiler();
    }

    for _ in 0..3 {
        frame.frame_start().unwrap();
        run_pass(&mut frame, &RenderPassDesc::new("main"));
        frame.frame_end();
        assert!(frame.poll_profiler().is_empty());
    }
    assert_eq!(frame.render_version(), 44);

    frame.device_mut().complete_readbacks();
    let reports = frame.poll_profiler();
    let mut versions: Vec<u64> = reports.iter().map(|r| r.render_version).collect();
    versions.sort_unstable();
    assert_eq!(versions, vec![42, 43, 44]);

    let first = reports.iter().find(|r| r.render_version == 42).unwrap();
    assert!((first.frame_ms - 1.0).abs() < 1e-9);
    assert_eq!(first.passes.len(), 1);
    assert_eq!(first.passes[0].name, "main");
}

#[test]
fn profiling_toggle_applies_next_frame() {
    let mut frame = orchestrator();
    frame.frame_start().unwrap();
    frame.set_profiling_enabled(true);
    run_pass(&mut frame, &RenderPassDesc::new("main"));
    frame.frame_end();
    assert_eq!(frame.device().pending_readbacks(), 0);

    frame.frame_start().unwrap();
    run_pass(&mut frame, &RenderPassDesc::new("main"));
    frame.frame_end();
    assert_eq!(frame.device().pending_readbacks(), 1);
    assert_eq!(
        frame.device().submitted_labels().first().map(String::as_str),
        Some("main")
    );
}

#[test]
fn profiling_without_timestamp_support_renders_normally() {
    let mut frame = FrameOrchestrator::new(
        MockDevice::default().without_timestamps(),
        Box::new(Pipelines::default()),
        OrchestratorConfig {
            profiler_enabled: true,
            ..OrchestratorConfig::default()
        },
    );
    frame.frame_start().unwrap();
    run_pass(&mut frame, &RenderPassDesc::new("main"));
    frame.frame_end();

    assert!(!frame.profiler().is_enabled());
    assert_eq!(frame.device().submitted_labels(), vec!["main"]);
    assert_eq!(frame.stats().draw_calls, 1);
}

#[test]
fn offscreen_target_then_backbuffer() {
    use crate::target::{ColorBuffer, DepthConfig, RenderSurfaceDesc};

    let mut frame = orchestrator();
    let color = frame.device_mut().create_texture(&crate::device::TextureDesc {
        label: "scene color",
        width: 256,
        height: 256,
        mip_level_count: 1,
        sample_count: 1,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
    });
    let scene = frame.create_render_surface(RenderSurfaceDesc {
        label: "scene".into(),
        width: 256,
        height: 256,
        color_buffers: vec![ColorBuffer {
            texture: color,
            format: wgpu::TextureFormat::Rgba8Unorm,
        }],
        depth: DepthConfig::Owned(wgpu::TextureFormat::Depth32Float),
        ..RenderSurfaceDesc::default()
    });
    assert!(!frame.surface(scene).unwrap().is_initialized());

    frame.frame_start().unwrap();
    let ops = PassOps {
        color: vec![ColorOps::cleared(wgpu::Color::BLACK)],
        ..PassOps::default()
    };
    run_pass(
        &mut frame,
        &RenderPassDesc::new("scene").target(scene).ops(ops),
    );
    run_pass(&mut frame, &RenderPassDesc::new("present"));
    frame.frame_end();

    assert!(frame.surface(scene).unwrap().is_initialized());
    assert_eq!(frame.device().submitted_labels(), vec!["scene", "present"]);
    let Some(MockCommand::BeginRenderPass(desc)) = commands_of(frame.device(), "scene").first().cloned()
    else {
        panic!("scene pass not recorded");
    };
    assert!(matches!(
        desc.color_attachments[0].ops.load,
        wgpu::LoadOp::Clear(_)
    ));
    assert!(desc.depth_stencil.is_some());

    frame.destroy_render_surface(scene);
    assert!(frame.surface(scene).is_none());
    assert!(frame.device().texture_info(color).is_some());
}

#[test]
fn surface_errors_skip_the_frame() {
    let mut frame = orchestrator();
    frame
        .device_mut()
        .fail_next_acquire(wgpu::SurfaceError::Outdated);
    assert_eq!(
        frame.frame_start(),
        Err(crate::device::SurfaceErrorAction::Reconfigured)
    );

    frame
        .device_mut()
        .fail_next_acquire(wgpu::SurfaceError::OutOfMemory);
    let err = frame.frame_start().unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(frame.device().handled_errors().len(), 2);

    frame.frame_start().unwrap();
    assert!(frame.surface(frame.backbuffer()).unwrap().is_initialized());
}

#[test]
fn context_loss_and_restore() {
    let mut frame = orchestrator();
    frame.frame_start().unwrap();
    frame.start_pass(&RenderPassDesc::new("main"));

    frame.lose_context();
    assert!(!frame.is_pass_active());
    assert!(!frame.surface(frame.backbuffer()).unwrap().is_initialized());
    assert_eq!(
        frame.frame_start(),
        Err(crate::device::SurfaceErrorAction::SkipFrame)
    );

    frame.restore_context(MockDevice::new(640, 480), Box::new(Pipelines::default()));
    frame.frame_start().unwrap();
    run_pass(&mut frame, &RenderPassDesc::new("main"));
    frame.frame_end();

    let backbuffer = frame.surface(frame.backbuffer()).unwrap();
    assert_eq!((backbuffer.width(), backbuffer.height()), (640, 480));
    assert_eq!(frame.device().submitted_labels(), vec!["main"]);
}

#[test]
fn pass_named_frame_keeps_frame_markers_intact() {
    let mut frame = orchestrator_with(OrchestratorConfig {
        profiler_enabled: true,
        ..OrchestratorConfig::default()
    });
    frame.frame_start().unwrap();
    run_pass(&mut frame, &RenderPassDesc::new("frame"));
    frame.frame_end();

    let writes = frame
        .device()
        .submitted_commands()
        .into_iter()
        .find_map(|c| match c {
            MockCommand::BeginRenderPass(desc) => desc.timestamp_writes,
            _ => None,
        })
        .unwrap();
    assert_eq!(writes.beginning_of_pass_write_index, 2);
    assert_eq!(writes.end_of_pass_write_index, 3);

    frame.device_mut().complete_readbacks();
    let reports = frame.poll_profiler();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].passes.len(), 1);
    assert_eq!(reports[0].passes[0].name, "frame");
}

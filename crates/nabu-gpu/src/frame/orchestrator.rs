use std::collections::HashSet;

use slotmap::SlotMap;

use crate::device::{EncoderId, GpuDevice, ShaderId, SurfaceErrorAction, TextureId};
use crate::profiler::{ProfilerReport, TimestampProfiler, DEFAULT_CAPACITY};
use crate::target::{ColorOps, RenderSurface, RenderSurfaceDesc};

use super::collaborators::{DynamicBuffers, PipelineCache, PipelineRequest};
use super::pass::RenderPassDesc;
use super::queue::CommandQueue;
use super::state::{
    BindGroup, BlendState, DepthState, DrawState, IndexBuffer, PassCache, Primitive, ScissorRect,
    Shader, StencilParameters, VertexBuffer, Viewport,
};
use super::SurfaceId;

/// Orchestrator construction parameters.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub backbuffer_sample_count: u32,
    pub backbuffer_depth_format: Option<wgpu::TextureFormat>,
    pub profiler_capacity: u32,
    pub profiler_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backbuffer_sample_count: 1,
            backbuffer_depth_format: None,
            profiler_capacity: DEFAULT_CAPACITY,
            profiler_enabled: false,
        }
    }
}

/// Counters for the frame in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub passes: u32,
    pub draw_calls: u32,
    /// Draws dropped because the shader was not ready or no pipeline matched.
    pub skipped_draws: u32,
    pub submitted: u32,
}

struct ActivePass {
    name: String,
    target: SurfaceId,
    color_ops: Vec<ColorOps>,
}

#[derive(Debug, Clone, Copy)]
enum CopyOp {
    Texture {
        src: TextureId,
        dst: TextureId,
        size: wgpu::Extent3d,
    },
    ResolveDepth {
        src: TextureId,
        dst: TextureId,
    },
}

/// Turns render passes into ordered command buffers.
///
/// A frame is `frame_start`, then any number of `start_pass` / draws /
/// `end_pass`, then `frame_end`. Only one pass may be open at a time.
pub struct FrameOrchestrator<D: GpuDevice> {
    device: D,
    config: OrchestratorConfig,

    surfaces: SlotMap<SurfaceId, RenderSurface>,
    backbuffer: SurfaceId,

    profiler: TimestampProfiler,
    pipelines: Box<dyn PipelineCache<D>>,
    dynamic_buffers: Option<Box<dyn DynamicBuffers<D>>>,

    queue: CommandQueue,
    encoder: Option<EncoderId>,
    active_pass: Option<ActivePass>,
    deferred_copies: Vec<CopyOp>,

    state: DrawState,
    cache: PassCache,

    render_version: u64,
    stats: FrameStats,
    warned_shaders: HashSet<ShaderId>,
    context_lost: bool,
}

impl<D: GpuDevice> FrameOrchestrator<D> {
    pub fn new(mut device: D, pipelines: Box<dyn PipelineCache<D>>, config: OrchestratorConfig) -> Self {
        let profiler =
            TimestampProfiler::new(&mut device, config.profiler_capacity, config.profiler_enabled);

        let mut surfaces = SlotMap::with_key();
        let backbuffer = surfaces.insert(RenderSurface::backbuffer(
            config.backbuffer_sample_count,
            config.backbuffer_depth_format,
        ));

        Self {
            device,
            config,
            surfaces,
            backbuffer,
            profiler,
            pipelines,
            dynamic_buffers: None,
            queue: CommandQueue::default(),
            encoder: None,
            active_pass: None,
            deferred_copies: Vec::new(),
            state: DrawState::default(),
            cache: PassCache::for_target(0, 0),
            render_version: 0,
            stats: FrameStats::default(),
            warned_shaders: HashSet::new(),
            context_lost: false,
        }
    }

    pub fn set_dynamic_buffers(&mut self, dynamic_buffers: Box<dyn DynamicBuffers<D>>) {
        self.dynamic_buffers = Some(dynamic_buffers);
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn render_version(&self) -> u64 {
        self.render_version
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn is_pass_active(&self) -> bool {
        self.active_pass.is_some()
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    pub fn queued_command_buffers(&self) -> usize {
        self.queue.len()
    }

    pub fn profiler(&self) -> &TimestampProfiler {
        &self.profiler
    }

    /// Turns profiling on or off from the next frame on.
    pub fn set_profiling_enabled(&mut self, enabled: bool) {
        self.profiler.set_enabled(enabled);
    }

    /// Drives pending readbacks and returns the timing reports that arrived.
    pub fn poll_profiler(&mut self) -> Vec<ProfilerReport> {
        self.device.poll();
        self.profiler.poll()
    }

    // ── surfaces ──────────────────────────────────────────────────────────

    pub fn backbuffer(&self) -> SurfaceId {
        self.backbuffer
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&RenderSurface> {
        self.surfaces.get(id)
    }

    /// Registers an offscreen target. GPU resources are allocated by the
    /// first pass rendering into it.
    pub fn create_render_surface(&mut self, desc: RenderSurfaceDesc) -> SurfaceId {
        self.surfaces.insert(RenderSurface::new(desc))
    }

    pub fn destroy_render_surface(&mut self, id: SurfaceId) {
        assert!(id != self.backbuffer, "the backbuffer cannot be destroyed");
        if let Some(mut surface) = self.surfaces.remove(id) {
            surface.destroy(&mut self.device);
        }
    }

    /// Resizes an offscreen target. Its textures are reallocated on next use.
    pub fn resize_render_surface(&mut self, id: SurfaceId, width: u32, height: u32) {
        assert!(
            id != self.backbuffer,
            "the backbuffer follows the swapchain size"
        );
        let Some(surface) = self.surfaces.get_mut(id) else {
            return;
        };
        if surface.is_initialized() {
            surface.destroy(&mut self.device);
        }
        surface.resize(width, height);
    }

    /// Forwards a window resize to the swapchain. The backbuffer follows at
    /// the next `frame_start`.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.device.resize(width, height);
    }

    // ── frame ─────────────────────────────────────────────────────────────

    /// Begins a frame: flushes leftover work and reconciles the backbuffer
    /// with the swapchain texture.
    ///
    /// On error no backbuffer is available and the frame should be skipped;
    /// a [`SurfaceErrorAction::Fatal`] means rendering cannot continue.
    pub fn frame_start(&mut self) -> Result<(), SurfaceErrorAction> {
        if self.context_lost {
            log::debug!("frame skipped: gpu context lost");
            return Err(SurfaceErrorAction::SkipFrame);
        }
        debug_assert!(
            self.active_pass.is_none(),
            "frame_start inside a render pass"
        );

        self.render_version += 1;
        self.stats = FrameStats::default();

        self.profiler.frame_start();
        if let Some((query_set, index)) = self.profiler.frame_begin_query() {
            let encoder = self.device.create_encoder("frame begin timestamp");
            self.device.write_timestamp(encoder, query_set, index);
            let cb = self.device.finish_encoder(encoder);
            self.queue.push_front(cb);
        }

        self.submit();
        self.device.poll();

        let swapchain = match self.device.acquire_backbuffer() {
            Ok(swapchain) => swapchain,
            Err(err) => {
                let action = self.device.handle_surface_error(err);
                if action.is_fatal() {
                    log::error!("swapchain acquisition failed: {action}");
                } else {
                    log::debug!("swapchain acquisition failed: {action}");
                }
                return Err(action);
            }
        };

        let Some(backbuffer) = self.surfaces.get_mut(self.backbuffer) else {
            unreachable!("backbuffer surface is never removed");
        };
        let format_changed = backbuffer.color_attachment(0).and_then(|a| a.format())
            != Some(swapchain.format);
        if backbuffer.width() != swapchain.width
            || backbuffer.height() != swapchain.height
            || format_changed
        {
            if backbuffer.is_initialized() {
                backbuffer.destroy(&mut self.device);
            }
            backbuffer.resize(swapchain.width, swapchain.height);
            log::debug!(
                "backbuffer reallocated at {}x{} ({:?})",
                swapchain.width,
                swapchain.height,
                swapchain.format
            );
        }

        backbuffer.set_color_attachment(0, None, Some(swapchain.format));
        if !backbuffer.is_initialized() {
            backbuffer.init(&mut self.device);
        }
        backbuffer.assign_color_texture(&mut self.device, swapchain.texture);
        Ok(())
    }

    /// Ends the frame: submits everything, presents, and requests this
    /// frame's timings.
    pub fn frame_end(&mut self) {
        debug_assert!(self.active_pass.is_none(), "frame_end inside a render pass");

        let mut readback = None;
        if let Some((query_set, index)) = self.profiler.frame_end_query() {
            let encoder = self.device.create_encoder("frame end timestamp");
            self.device.write_timestamp(encoder, query_set, index);
            readback = self.profiler.resolve(&mut self.device, encoder);
            let cb = self.device.finish_encoder(encoder);
            self.queue.push_back(cb);
        }

        self.submit();

        if let Some(readback) = readback.filter(|_| !self.context_lost) {
            self.profiler
                .request(&mut self.device, readback, self.render_version);
        }
        self.device.present();
    }

    /// Hands every queued command buffer to the GPU in one submission, with
    /// dynamic buffer uploads first.
    pub fn submit(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        let upload = self
            .dynamic_buffers
            .as_mut()
            .and_then(|dynamic| dynamic.submit(&mut self.device));
        if let Some(upload) = upload {
            self.queue.push_front(upload);
        }

        let buffers = self.queue.drain();
        self.stats.submitted += buffers.len() as u32;
        self.device.submit(buffers);

        if let Some(dynamic) = self.dynamic_buffers.as_mut() {
            dynamic.on_submitted();
        }
    }

    // ── passes ────────────────────────────────────────────────────────────

    pub fn start_pass(&mut self, pass: &RenderPassDesc) {
        if let Some(active) = &self.active_pass {
            panic!(
                "render pass '{}' started while '{}' is still active",
                pass.name, active.name
            );
        }

        let target = pass.target.unwrap_or(self.backbuffer);
        let Some(surface) = self.surfaces.get_mut(target) else {
            panic!("render pass '{}' targets an unknown surface", pass.name);
        };

        let encoder = self.device.create_encoder(&pass.name);

        if !surface.is_backbuffer() && !surface.is_initialized() {
            surface.init(&mut self.device);
        }
        assert!(
            surface.is_initialized(),
            "render pass '{}' targets uninitialized surface '{}'",
            pass.name,
            surface.label()
        );
        surface.setup_for_render_pass(&pass.ops);

        let descriptor = surface.pass_descriptor_mut();
        descriptor.label.clone_from(&pass.name);
        descriptor.timestamp_writes = self.profiler.pass_timestamp_writes(&pass.name);
        self.device.begin_render_pass(encoder, surface.pass_descriptor());

        self.cache = PassCache::for_target(surface.width(), surface.height());
        self.encoder = Some(encoder);
        self.active_pass = Some(ActivePass {
            name: pass.name.clone(),
            target,
            color_ops: pass.ops.color.clone(),
        });
        self.stats.passes += 1;
    }

    pub fn end_pass(&mut self, pass: &RenderPassDesc) {
        let (Some(active), Some(encoder)) = (self.active_pass.take(), self.encoder.take()) else {
            panic!("end_pass('{}') without an active render pass", pass.name);
        };
        debug_assert_eq!(active.name, pass.name, "mismatched end_pass");

        self.device.end_render_pass(encoder);
        self.state.bind_group_formats.clear();

        for copy in std::mem::take(&mut self.deferred_copies) {
            self.record_copy(encoder, copy);
        }

        if let Some(surface) = self.surfaces.get(active.target) {
            for (index, ops) in active.color_ops.iter().enumerate() {
                if !ops.mipmaps {
                    continue;
                }
                let Some(texture) = surface.color_texture(index) else {
                    continue;
                };
                let has_mips = self
                    .device
                    .texture_info(texture)
                    .is_some_and(|info| info.mip_level_count > 1);
                if has_mips {
                    self.device.generate_mipmaps(encoder, texture);
                }
            }
        }

        let cb = self.device.finish_encoder(encoder);
        self.queue.push_back(cb);
    }

    // ── draw state ────────────────────────────────────────────────────────

    pub fn set_shader(&mut self, shader: Shader) {
        self.state.shader = Some(shader);
    }

    pub fn set_blend_state(&mut self, blend: BlendState) {
        self.state.blend = blend;
    }

    pub fn set_blend_color(&mut self, color: wgpu::Color) {
        self.state.blend_color = Some(color);
    }

    pub fn set_depth_state(&mut self, depth: DepthState) {
        self.state.depth = depth;
    }

    /// `None` on both faces disables stencil testing.
    pub fn set_stencil_state(
        &mut self,
        front: Option<StencilParameters>,
        back: Option<StencilParameters>,
    ) {
        self.state.stencil_front = front;
        self.state.stencil_back = back;
    }

    pub fn set_cull_mode(&mut self, cull_mode: Option<wgpu::Face>) {
        self.state.cull_mode = cull_mode;
    }

    /// Adds a vertex buffer for the next draw. At most two are bound.
    pub fn set_vertex_buffer(&mut self, buffer: VertexBuffer) {
        assert!(
            self.state.vertex_buffers.len() < 2,
            "at most two vertex buffers per draw"
        );
        self.state.vertex_buffers.push(buffer);
    }

    pub fn set_index_buffer(&mut self, buffer: IndexBuffer) {
        self.state.index_buffer = Some(buffer);
    }

    pub fn set_bind_group(&mut self, index: u32, bind_group: &BindGroup) {
        let Some(encoder) = self.pass_encoder("set_bind_group") else {
            return;
        };
        self.device
            .set_bind_group(encoder, index, bind_group.id, &bind_group.dynamic_offsets);

        let slot = index as usize;
        if self.state.bind_group_formats.len() <= slot {
            self.state.bind_group_formats.resize(slot + 1, None);
        }
        self.state.bind_group_formats[slot] = Some(bind_group.format);
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let Some(encoder) = self.pass_encoder("set_viewport") else {
            return;
        };
        let viewport = Viewport {
            x,
            y,
            width,
            height,
        };
        if self.cache.viewport != viewport {
            self.device.set_viewport(encoder, x, y, width, height);
            self.cache.viewport = viewport;
        }
    }

    pub fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        let Some(encoder) = self.pass_encoder("set_scissor") else {
            return;
        };
        let scissor = ScissorRect {
            x,
            y,
            width,
            height,
        };
        if self.cache.scissor != scissor {
            self.device.set_scissor_rect(encoder, x, y, width, height);
            self.cache.scissor = scissor;
        }
    }

    fn pass_encoder(&self, op: &str) -> Option<EncoderId> {
        if self.active_pass.is_none() {
            log::warn!("{op} ignored outside a render pass");
            return None;
        }
        self.encoder
    }

    // ── draw ──────────────────────────────────────────────────────────────

    /// Records a draw with the current state.
    ///
    /// Draws whose shader is not ready are skipped and counted. Unless
    /// `keep_buffers` is set, the vertex and index buffers are consumed.
    pub fn draw(&mut self, primitive: &Primitive, instance_count: u32, keep_buffers: bool) {
        let (Some(active), Some(encoder)) = (&self.active_pass, self.encoder) else {
            debug_assert!(false, "draw outside a render pass");
            log::error!("draw outside a render pass ignored");
            return;
        };
        let target = active.target;

        let shader = match self.state.shader {
            Some(shader) if shader.is_ready() => shader,
            other => {
                self.stats.skipped_draws += 1;
                match other {
                    Some(shader) if self.warned_shaders.insert(shader.id) => log::warn!(
                        "draws with shader {:?} skipped: {:?}",
                        shader.id,
                        shader.status
                    ),
                    None => log::warn!("draw skipped: no shader set"),
                    _ => {}
                }
                if !keep_buffers {
                    self.state.clear_buffers();
                }
                return;
            }
        };

        // One slot per element; the second buffer starts after the first's.
        let mut slot = 0;
        for vb in &self.state.vertex_buffers {
            for (i, element) in vb.format.elements.iter().enumerate() {
                self.device
                    .set_vertex_buffer(encoder, slot + i as u32, vb.buffer, element.offset);
            }
            slot += vb.format.slot_count();
        }

        let index_buffer = self.state.index_buffer.filter(|_| primitive.indexed);
        if let Some(ib) = index_buffer {
            self.device.set_index_buffer(encoder, ib.buffer, ib.format);
        }

        let Some(surface) = self.surfaces.get(target) else {
            return;
        };
        let request = self.pipeline_request(primitive, shader.id, surface.key().clone());
        let Some(pipeline) = self.pipelines.get(&mut self.device, &request) else {
            self.stats.skipped_draws += 1;
            log::debug!("draw skipped: no pipeline for shader {:?}", shader.id);
            if !keep_buffers {
                self.state.clear_buffers();
            }
            return;
        };

        if self.cache.pipeline != Some(pipeline) {
            self.device.set_pipeline(encoder, pipeline);
            self.cache.pipeline = Some(pipeline);
        }

        if self.state.stencil_enabled() {
            let reference = self
                .state
                .stencil_front
                .or(self.state.stencil_back)
                .map_or(0, |s| s.reference);
            if self.cache.stencil_reference != reference {
                self.device.set_stencil_reference(encoder, reference);
                self.cache.stencil_reference = reference;
            }
        }

        let blend_color = self.state.blend_color;
        if let Some(color) = blend_color.filter(|c| *c != self.cache.blend_color) {
            self.device.set_blend_constant(encoder, color);
            self.cache.blend_color = color;
        }

        let range = primitive.base..primitive.base + primitive.count;
        let instances = 0..instance_count.max(1);
        match index_buffer {
            Some(_) => {
                self.device
                    .draw_indexed(encoder, range, primitive.base_vertex, instances)
            }
            None => self.device.draw(encoder, range, instances),
        }
        self.stats.draw_calls += 1;

        if !keep_buffers {
            self.state.clear_buffers();
        }
    }

    fn pipeline_request(
        &self,
        primitive: &Primitive,
        shader: ShaderId,
        target: crate::target::RenderTargetKey,
    ) -> PipelineRequest {
        let state = &self.state;
        let front = state.stencil_front.unwrap_or_default();
        let back = state.stencil_back.unwrap_or(front);
        PipelineRequest {
            topology: primitive.topology,
            vertex_formats: [
                state.vertex_buffers.first().map(|vb| vb.format.clone()),
                state.vertex_buffers.get(1).map(|vb| vb.format.clone()),
            ],
            shader,
            target,
            bind_group_formats: state.bind_group_formats.clone(),
            blend: state.blend,
            depth: state.depth,
            cull_mode: state.cull_mode,
            stencil_enabled: state.stencil_enabled(),
            stencil_front: front.face,
            stencil_back: back.face,
            stencil_read_mask: front.read_mask,
            stencil_write_mask: front.write_mask,
        }
    }

    // ── copies ────────────────────────────────────────────────────────────

    /// Copies color and/or depth between two surfaces, either defaulting to
    /// the backbuffer. Multisampled depth is resolved into the destination's
    /// color buffer.
    ///
    /// Inside a pass the copy is recorded on the pass's encoder once the pass
    /// closes. Returns `false` when a texture is missing.
    pub fn copy_render_target(
        &mut self,
        source: Option<SurfaceId>,
        dest: Option<SurfaceId>,
        color: bool,
        depth: bool,
    ) -> bool {
        let (Some(src), Some(dst)) = (
            self.surfaces.get(source.unwrap_or(self.backbuffer)),
            self.surfaces.get(dest.unwrap_or(self.backbuffer)),
        ) else {
            return copy_failed("surface");
        };

        let size = wgpu::Extent3d {
            width: src.width().min(dst.width()),
            height: src.height().min(dst.height()),
            depth_or_array_layers: 1,
        };
        let mut ops = Vec::with_capacity(2);

        if color {
            match (src.color_texture(0), dst.color_texture(0)) {
                (Some(src), Some(dst)) => ops.push(CopyOp::Texture { src, dst, size }),
                _ => return copy_failed("color"),
            }
        }

        if depth {
            if src.sample_count() == 1 && dst.sample_count() > 1 {
                return copy_failed("single-sample destination depth");
            }
            let op = match src.depth_texture() {
                Some(src_depth) if src.sample_count() > 1 => dst
                    .color_texture(0)
                    .map(|dst| CopyOp::ResolveDepth { src: src_depth, dst }),
                Some(src_depth) => dst.depth_texture().map(|dst| CopyOp::Texture {
                    src: src_depth,
                    dst,
                    size,
                }),
                None => None,
            };
            match op {
                Some(op) => ops.push(op),
                None => return copy_failed("depth"),
            }
        }

        if self.active_pass.is_some() {
            self.deferred_copies.extend(ops);
        } else {
            let encoder = self.device.create_encoder("copy render target");
            for op in ops {
                self.record_copy(encoder, op);
            }
            let cb = self.device.finish_encoder(encoder);
            self.queue.push_back(cb);
        }
        true
    }

    fn record_copy(&mut self, encoder: EncoderId, op: CopyOp) {
        match op {
            CopyOp::Texture { src, dst, size } => {
                self.device.copy_texture_to_texture(encoder, src, dst, size)
            }
            CopyOp::ResolveDepth { src, dst } => self.device.resolve_depth(encoder, src, dst),
        }
    }

    // ── context loss ──────────────────────────────────────────────────────

    /// Drops every GPU handle after the device was lost. Frames are skipped
    /// until [`restore_context`](Self::restore_context).
    pub fn lose_context(&mut self) {
        log::warn!("gpu context lost");
        for surface in self.surfaces.values_mut() {
            surface.lose_context();
        }
        self.queue.clear();
        self.encoder = None;
        self.active_pass = None;
        self.deferred_copies.clear();
        self.state = DrawState::default();
        self.cache = PassCache::for_target(0, 0);
        self.context_lost = true;
    }

    /// Resumes rendering on a fresh device. Pipelines made for the lost device
    /// are invalid, so a new cache comes with it. Surfaces reallocate lazily.
    pub fn restore_context(&mut self, device: D, pipelines: Box<dyn PipelineCache<D>>) {
        self.device = device;
        self.pipelines = pipelines;
        self.profiler = TimestampProfiler::new(
            &mut self.device,
            self.config.profiler_capacity,
            self.config.profiler_enabled,
        );
        self.warned_shaders.clear();
        self.context_lost = false;
        log::info!("gpu context restored");
    }
}

fn copy_failed(what: &str) -> bool {
    if cfg!(debug_assertions) {
        panic!("copy_render_target: missing {what} texture");
    }
    log::error!("copy_render_target: missing {what} texture");
    false
}

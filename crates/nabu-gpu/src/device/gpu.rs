use std::ops::Range;
use std::sync::Arc;

use anyhow::{Context, Result};
use slotmap::SlotMap;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::backend::{
    GpuDevice, PassDescriptor, ReadbackCallback, SwapchainTexture, TextureDesc, TextureInfo,
    ViewDesc,
};
use super::handles::{
    BindGroupId, BufferId, CommandBufferId, EncoderId, PipelineId, QuerySetId, ReadbackId,
    TextureId, ViewId,
};
use super::init::GpuInit;
use super::mipmap::MipmapGenerator;
use super::pool::BufferPool;
use super::resolve::DepthResolver;
use super::surface::{apply_resize, choose_alpha_mode, choose_surface_format, recover_from_error};
use super::SurfaceErrorAction;

/// A command encoder, plus the render pass currently open on it.
struct Recording {
    encoder: wgpu::CommandEncoder,
    pass: Option<wgpu::RenderPass<'static>>,
}

struct Readback {
    resolve: wgpu::Buffer,
    staging: wgpu::Buffer,
    on_ready: Option<ReadbackCallback>,
}

/// [`GpuDevice`] backed by wgpu and bound to a window surface.
///
/// Owns the wgpu core objects and a registry per handle type. Collaborators
/// (pipeline caches, dynamic buffer allocators, asset loaders) create wgpu
/// objects through [`device`](Self::device) and register them here to obtain
/// handles.
pub struct WgpuDevice {
    /// Kept alive for the surface.
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,

    textures: SlotMap<TextureId, wgpu::Texture>,
    views: SlotMap<ViewId, wgpu::TextureView>,
    buffers: SlotMap<BufferId, wgpu::Buffer>,
    bind_groups: SlotMap<BindGroupId, wgpu::BindGroup>,
    pipelines: SlotMap<PipelineId, wgpu::RenderPipeline>,
    encoders: SlotMap<EncoderId, Recording>,
    command_buffers: SlotMap<CommandBufferId, wgpu::CommandBuffer>,
    query_sets: SlotMap<QuerySetId, wgpu::QuerySet>,
    readbacks: SlotMap<ReadbackId, Readback>,

    /// Swapchain image of the frame in flight, registered in `textures`.
    current_frame: Option<(wgpu::SurfaceTexture, TextureId)>,

    mapped_tx: flume::Sender<(ReadbackId, bool)>,
    mapped_rx: flume::Receiver<(ReadbackId, bool)>,
    /// Idle query resolve and staging buffers, reused by size and usage.
    buffer_pool: BufferPool<wgpu::Buffer>,

    mipmaps: MipmapGenerator,
    depth_resolver: DepthResolver,
}

impl WgpuDevice {
    /// Creates a device bound to `window`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu; see
    /// [`new_blocking`](Self::new_blocking) for native callers.
    pub async fn new(window: Arc<Window>, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let required_features = init.device_features(adapter.features());
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("nabu device"),
                required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps.formats, init.prefer_srgb)
            .context("no supported surface formats")?;
        let alpha_mode = choose_alpha_mode(&caps.alpha_modes, init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            // The backbuffer takes part in render target copies both ways.
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        log::info!(
            "gpu ready: {} ({:?}), surface {:?} {}x{}, timestamps {}",
            adapter.get_info().name,
            adapter.get_info().backend,
            format,
            size.width,
            size.height,
            required_features.contains(wgpu::Features::TIMESTAMP_QUERY),
        );

        let mipmaps = MipmapGenerator::new(&device);
        let depth_resolver = DepthResolver::new(&device);
        let (mapped_tx, mapped_rx) = flume::unbounded();

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            config,
            size,
            textures: SlotMap::with_key(),
            views: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            bind_groups: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            encoders: SlotMap::with_key(),
            command_buffers: SlotMap::with_key(),
            query_sets: SlotMap::with_key(),
            readbacks: SlotMap::with_key(),
            current_frame: None,
            mapped_tx,
            mapped_rx,
            buffer_pool: BufferPool::default(),
            mipmaps,
            depth_resolver,
        })
    }

    /// Blocking wrapper around [`new`](Self::new).
    pub fn new_blocking(window: Arc<Window>, init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::new(window, init))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Current drawable size in physical pixels.
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    // ── registration ──────────────────────────────────────────────────────

    pub fn register_texture(&mut self, texture: wgpu::Texture) -> TextureId {
        self.textures.insert(texture)
    }

    pub fn register_buffer(&mut self, buffer: wgpu::Buffer) -> BufferId {
        self.buffers.insert(buffer)
    }

    pub fn register_bind_group(&mut self, bind_group: wgpu::BindGroup) -> BindGroupId {
        self.bind_groups.insert(bind_group)
    }

    pub fn register_pipeline(&mut self, pipeline: wgpu::RenderPipeline) -> PipelineId {
        self.pipelines.insert(pipeline)
    }

    pub fn buffer(&self, buffer: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(buffer)
    }

    pub fn texture(&self, texture: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(texture)
    }

    pub fn release_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(buffer);
    }

    pub fn release_bind_group(&mut self, bind_group: BindGroupId) {
        self.bind_groups.remove(bind_group);
    }

    pub fn release_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(pipeline);
    }

    fn take_buffer(&mut self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        let device = &self.device;
        self.buffer_pool.take(size, usage, || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        })
    }

    fn finish_readback(&mut self, id: ReadbackId, mapped: bool) {
        let Some(mut readback) = self.readbacks.remove(id) else {
            return;
        };
        let ticks = mapped.then(|| {
            let data = readback.staging.slice(..).get_mapped_range();
            let ticks: Vec<u64> = bytemuck::pod_collect_to_vec(&data[..]);
            drop(data);
            readback.staging.unmap();
            ticks
        });
        if !mapped {
            log::warn!("timestamp readback could not be mapped");
        }
        if let Some(on_ready) = readback.on_ready.take() {
            on_ready(ticks);
        }
        let resolve = readback.resolve;
        self.buffer_pool.put(resolve.size(), resolve.usage(), resolve);
        if mapped {
            let staging = readback.staging;
            self.buffer_pool.put(staging.size(), staging.usage(), staging);
        }
    }
}

fn open_pass<'a>(
    encoders: &'a mut SlotMap<EncoderId, Recording>,
    encoder: EncoderId,
    op: &str,
) -> Option<&'a mut wgpu::RenderPass<'static>> {
    let pass = encoders.get_mut(encoder).and_then(|r| r.pass.as_mut());
    if pass.is_none() {
        log::warn!("{op} ignored: no render pass open on encoder {encoder:?}");
    }
    pass
}

fn idle_encoder<'a>(
    encoders: &'a mut SlotMap<EncoderId, Recording>,
    encoder: EncoderId,
    op: &str,
) -> Option<&'a mut wgpu::CommandEncoder> {
    match encoders.get_mut(encoder) {
        Some(Recording { encoder, pass: None }) => Some(encoder),
        Some(_) => {
            log::warn!("{op} ignored: render pass still open on encoder");
            None
        }
        None => {
            log::warn!("{op} ignored: unknown encoder {encoder:?}");
            None
        }
    }
}

impl GpuDevice for WgpuDevice {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureId {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_level_count.max(1),
            sample_count: desc.sample_count.max(1),
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        self.textures.insert(texture)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.current_frame.as_ref().is_some_and(|(_, id)| *id == texture) {
            log::warn!("refusing to destroy the swapchain texture");
            return;
        }
        if let Some(texture) = self.textures.remove(texture) {
            texture.destroy();
        }
    }

    fn texture_info(&self, texture: TextureId) -> Option<TextureInfo> {
        self.textures.get(texture).map(|t| TextureInfo {
            width: t.width(),
            height: t.height(),
            mip_level_count: t.mip_level_count(),
            sample_count: t.sample_count(),
            format: t.format(),
            usage: t.usage(),
        })
    }

    fn create_view(&mut self, texture: TextureId, desc: &ViewDesc) -> ViewId {
        let Some(texture) = self.textures.get(texture) else {
            log::error!("create_view on unknown texture {texture:?}");
            return ViewId::default();
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("nabu view"),
            aspect: desc.aspect,
            base_mip_level: desc.base_mip_level,
            mip_level_count: desc.mip_level_count,
            ..Default::default()
        });
        self.views.insert(view)
    }

    fn destroy_view(&mut self, view: ViewId) {
        self.views.remove(view);
    }

    fn acquire_backbuffer(&mut self) -> Result<SwapchainTexture, wgpu::SurfaceError> {
        if let Some((frame, id)) = &self.current_frame {
            return Ok(SwapchainTexture {
                texture: *id,
                width: frame.texture.width(),
                height: frame.texture.height(),
                format: frame.texture.format(),
            });
        }

        let frame = self.surface.get_current_texture()?;
        if frame.suboptimal {
            log::debug!("suboptimal swapchain texture acquired");
        }
        let id = self.textures.insert(frame.texture.clone());
        let swapchain = SwapchainTexture {
            texture: id,
            width: frame.texture.width(),
            height: frame.texture.height(),
            format: frame.texture.format(),
        };
        self.current_frame = Some((frame, id));
        Ok(swapchain)
    }

    fn handle_surface_error(&mut self, err: wgpu::SurfaceError) -> SurfaceErrorAction {
        recover_from_error(&self.surface, &self.device, &self.config, err)
    }

    fn present(&mut self) {
        let Some((frame, id)) = self.current_frame.take() else {
            log::debug!("present without an acquired frame");
            return;
        };
        self.textures.remove(id);
        frame.present();
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = PhysicalSize::new(width, height);
        if apply_resize(&self.surface, &self.device, &mut self.config, width, height) {
            log::debug!("surface resized to {width}x{height}");
        }
    }

    fn create_encoder(&mut self, label: &str) -> EncoderId {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        self.encoders.insert(Recording {
            encoder,
            pass: None,
        })
    }

    fn finish_encoder(&mut self, encoder: EncoderId) -> CommandBufferId {
        let Some(mut recording) = self.encoders.remove(encoder) else {
            log::error!("finish_encoder on unknown encoder {encoder:?}");
            return CommandBufferId::default();
        };
        if recording.pass.take().is_some() {
            log::warn!("encoder finished with an open render pass; pass ended implicitly");
        }
        self.command_buffers.insert(recording.encoder.finish())
    }

    fn begin_render_pass(&mut self, encoder: EncoderId, desc: &PassDescriptor) {
        let Self {
            encoders,
            views,
            query_sets,
            ..
        } = self;

        let Some(recording) = encoders.get_mut(encoder) else {
            log::warn!("begin_render_pass ignored: unknown encoder {encoder:?}");
            return;
        };
        if recording.pass.is_some() {
            log::error!("begin_render_pass '{}' while a pass is open", desc.label);
            return;
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = desc
            .color_attachments
            .iter()
            .map(|c| {
                let view = views.get(c.view?)?;
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: c.resolve_target.and_then(|r| views.get(r)),
                    ops: c.ops,
                    depth_slice: None,
                })
            })
            .collect();

        let depth_stencil_attachment = desc.depth_stencil.as_ref().and_then(|d| {
            Some(wgpu::RenderPassDepthStencilAttachment {
                view: views.get(d.view)?,
                depth_ops: d.depth_ops,
                stencil_ops: d.stencil_ops,
            })
        });

        let timestamp_writes = desc.timestamp_writes.as_ref().and_then(|t| {
            Some(wgpu::RenderPassTimestampWrites {
                query_set: query_sets.get(t.query_set)?,
                beginning_of_pass_write_index: Some(t.beginning_of_pass_write_index),
                end_of_pass_write_index: Some(t.end_of_pass_write_index),
            })
        });

        let pass = recording
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&desc.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();
        recording.pass = Some(pass);
    }

    fn end_render_pass(&mut self, encoder: EncoderId) {
        match self.encoders.get_mut(encoder) {
            Some(recording) => {
                if recording.pass.take().is_none() {
                    log::warn!("end_render_pass without an open pass");
                }
            }
            None => log::warn!("end_render_pass ignored: unknown encoder {encoder:?}"),
        }
    }

    fn set_pipeline(&mut self, encoder: EncoderId, pipeline: PipelineId) {
        let Some(pipeline) = self.pipelines.get(pipeline) else {
            log::warn!("set_pipeline ignored: unknown pipeline {pipeline:?}");
            return;
        };
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "set_pipeline") {
            pass.set_pipeline(pipeline);
        }
    }

    fn set_bind_group(
        &mut self,
        encoder: EncoderId,
        index: u32,
        bind_group: BindGroupId,
        dynamic_offsets: &[u32],
    ) {
        let Some(bind_group) = self.bind_groups.get(bind_group) else {
            log::warn!("set_bind_group ignored: unknown bind group {bind_group:?}");
            return;
        };
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "set_bind_group") {
            pass.set_bind_group(index, bind_group, dynamic_offsets);
        }
    }

    fn set_vertex_buffer(&mut self, encoder: EncoderId, slot: u32, buffer: BufferId, offset: u64) {
        let Some(buffer) = self.buffers.get(buffer) else {
            log::warn!("set_vertex_buffer ignored: unknown buffer {buffer:?}");
            return;
        };
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "set_vertex_buffer") {
            pass.set_vertex_buffer(slot, buffer.slice(offset..));
        }
    }

    fn set_index_buffer(&mut self, encoder: EncoderId, buffer: BufferId, format: wgpu::IndexFormat) {
        let Some(buffer) = self.buffers.get(buffer) else {
            log::warn!("set_index_buffer ignored: unknown buffer {buffer:?}");
            return;
        };
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "set_index_buffer") {
            pass.set_index_buffer(buffer.slice(..), format);
        }
    }

    fn set_viewport(&mut self, encoder: EncoderId, x: f32, y: f32, width: f32, height: f32) {
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "set_viewport") {
            pass.set_viewport(x, y, width, height, 0.0, 1.0);
        }
    }

    fn set_scissor_rect(&mut self, encoder: EncoderId, x: u32, y: u32, width: u32, height: u32) {
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "set_scissor_rect") {
            pass.set_scissor_rect(x, y, width, height);
        }
    }

    fn set_stencil_reference(&mut self, encoder: EncoderId, reference: u32) {
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "set_stencil_reference") {
            pass.set_stencil_reference(reference);
        }
    }

    fn set_blend_constant(&mut self, encoder: EncoderId, color: wgpu::Color) {
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "set_blend_constant") {
            pass.set_blend_constant(color);
        }
    }

    fn draw(&mut self, encoder: EncoderId, vertices: Range<u32>, instances: Range<u32>) {
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "draw") {
            pass.draw(vertices, instances);
        }
    }

    fn draw_indexed(
        &mut self,
        encoder: EncoderId,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) {
        if let Some(pass) = open_pass(&mut self.encoders, encoder, "draw_indexed") {
            pass.draw_indexed(indices, base_vertex, instances);
        }
    }

    fn copy_texture_to_texture(
        &mut self,
        encoder: EncoderId,
        src: TextureId,
        dst: TextureId,
        size: wgpu::Extent3d,
    ) {
        let (Some(src), Some(dst)) = (self.textures.get(src), self.textures.get(dst)) else {
            log::warn!("copy_texture_to_texture ignored: unknown texture");
            return;
        };
        let Some(encoder) = idle_encoder(&mut self.encoders, encoder, "copy_texture_to_texture")
        else {
            return;
        };
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: src,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: dst,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            size,
        );
    }

    fn resolve_depth(&mut self, encoder: EncoderId, src: TextureId, dst: TextureId) {
        let (Some(src), Some(dst)) = (self.textures.get(src), self.textures.get(dst)) else {
            log::warn!("resolve_depth ignored: unknown texture");
            return;
        };
        let Some(encoder) = idle_encoder(&mut self.encoders, encoder, "resolve_depth") else {
            return;
        };
        self.depth_resolver.resolve(&self.device, encoder, src, dst);
    }

    fn generate_mipmaps(&mut self, encoder: EncoderId, texture: TextureId) {
        let Some(texture) = self.textures.get(texture) else {
            log::warn!("generate_mipmaps ignored: unknown texture {texture:?}");
            return;
        };
        let Some(encoder) = idle_encoder(&mut self.encoders, encoder, "generate_mipmaps") else {
            return;
        };
        self.mipmaps.generate(&self.device, encoder, texture);
    }

    fn submit(&mut self, command_buffers: Vec<CommandBufferId>) {
        let buffers: Vec<wgpu::CommandBuffer> = command_buffers
            .into_iter()
            .filter_map(|id| {
                let cb = self.command_buffers.remove(id);
                if cb.is_none() {
                    log::warn!("submit skipped unknown command buffer {id:?}");
                }
                cb
            })
            .collect();
        self.queue.submit(buffers);
    }

    fn create_query_set(&mut self, count: u32) -> Option<QuerySetId> {
        if !self.device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            return None;
        }
        let query_set = self.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("nabu timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count,
        });
        Some(self.query_sets.insert(query_set))
    }

    fn write_timestamp(&mut self, encoder: EncoderId, query_set: QuerySetId, index: u32) {
        let Some(query_set) = self.query_sets.get(query_set) else {
            log::warn!("write_timestamp ignored: unknown query set {query_set:?}");
            return;
        };
        let Some(encoder) = idle_encoder(&mut self.encoders, encoder, "write_timestamp") else {
            return;
        };
        // An empty compute pass carries the timestamp; encoder-level writes need
        // an extra feature most adapters lack.
        let _ = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("nabu timestamp marker"),
            timestamp_writes: Some(wgpu::ComputePassTimestampWrites {
                query_set,
                beginning_of_pass_write_index: Some(index),
                end_of_pass_write_index: None,
            }),
        });
    }

    fn resolve_query_set(
        &mut self,
        encoder: EncoderId,
        query_set: QuerySetId,
        count: u32,
    ) -> ReadbackId {
        if !self.query_sets.contains_key(query_set) {
            log::warn!("resolve_query_set ignored: unknown query set {query_set:?}");
            return ReadbackId::default();
        }
        if idle_encoder(&mut self.encoders, encoder, "resolve_query_set").is_none() {
            return ReadbackId::default();
        }

        let size = u64::from(count) * std::mem::size_of::<u64>() as u64;
        let resolve = self.take_buffer(
            "nabu timestamp resolve",
            size,
            wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
        );
        let staging = self.take_buffer(
            "nabu timestamp staging",
            size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let (Some(qs), Some(enc)) = (
            self.query_sets.get(query_set),
            idle_encoder(&mut self.encoders, encoder, "resolve_query_set"),
        ) else {
            return ReadbackId::default();
        };
        enc.resolve_query_set(qs, 0..count, &resolve, 0);
        enc.copy_buffer_to_buffer(&resolve, 0, &staging, 0, size);

        self.readbacks.insert(Readback {
            resolve,
            staging,
            on_ready: None,
        })
    }

    fn map_readback(&mut self, readback: ReadbackId, on_ready: ReadbackCallback) {
        let Some(entry) = self.readbacks.get_mut(readback) else {
            log::warn!("map_readback on unknown readback {readback:?}");
            on_ready(None);
            return;
        };
        entry.on_ready = Some(on_ready);
        let tx = self.mapped_tx.clone();
        entry
            .staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send((readback, result.is_ok()));
            });
    }

    fn timestamp_period(&self) -> f32 {
        self.queue.get_timestamp_period()
    }

    fn poll(&mut self) {
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {err}");
        }
        let ready: Vec<(ReadbackId, bool)> = self.mapped_rx.try_iter().collect();
        for (id, mapped) in ready {
            self.finish_readback(id, mapped);
        }
    }
}

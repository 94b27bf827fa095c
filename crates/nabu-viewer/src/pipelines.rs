use std::collections::HashMap;

use nabu_gpu::device::{PipelineId, ShaderId, WgpuDevice};
use nabu_gpu::frame::{PipelineCache, PipelineRequest};
use slotmap::SlotMap;

/// Builds render pipelines on demand from registered WGSL modules.
///
/// Every module must expose `vs_main` and `fs_main`. Bind groups are not
/// supported; pipelines use an empty layout.
pub struct WgslPipelines {
    shaders: SlotMap<ShaderId, wgpu::ShaderModule>,
    layout: wgpu::PipelineLayout,
    built: HashMap<PipelineRequest, PipelineId>,
}

impl WgslPipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("viewer pipeline layout"),
            bind_group_layouts: &[],
            immediate_size: 0,
        });
        Self {
            shaders: SlotMap::with_key(),
            layout,
            built: HashMap::new(),
        }
    }

    pub fn add_shader(&mut self, device: &wgpu::Device, label: &str, wgsl: &str) -> ShaderId {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });
        self.shaders.insert(module)
    }

    fn build(&self, device: &wgpu::Device, request: &PipelineRequest) -> Option<wgpu::RenderPipeline> {
        let module = self.shaders.get(request.shader)?;

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = request
            .vertex_formats
            .iter()
            .flatten()
            .flat_map(|format| format.elements.iter())
            .map(|e| {
                [wgpu::VertexAttribute {
                    format: e.format,
                    offset: 0,
                    shader_location: e.shader_location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = request
            .vertex_formats
            .iter()
            .flatten()
            .flat_map(|format| format.elements.iter().map(move |e| format.element_stride(e)))
            .zip(&attributes)
            .map(|(array_stride, attributes)| wgpu::VertexBufferLayout {
                array_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = request
            .target
            .color_targets()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend: request.blend.blend,
                    write_mask: request.blend.write_mask,
                })
            })
            .collect();

        let depth_stencil = request
            .target
            .depth_format
            .map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: request.depth.write,
                depth_compare: request.depth.compare,
                stencil: if request.stencil_enabled {
                    wgpu::StencilState {
                        front: request.stencil_front,
                        back: request.stencil_back,
                        read_mask: request.stencil_read_mask,
                        write_mask: request.stencil_write_mask,
                    }
                } else {
                    wgpu::StencilState::default()
                },
                bias: wgpu::DepthBiasState::default(),
            });

        Some(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("viewer pipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &targets,
            }),
            primitive: wgpu::PrimitiveState {
                topology: request.topology,
                cull_mode: request.cull_mode,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: request.target.sample_count,
                ..Default::default()
            },
            multiview_mask: None,
            cache: None,
        }))
    }
}

impl PipelineCache<WgpuDevice> for WgslPipelines {
    fn get(&mut self, device: &mut WgpuDevice, request: &PipelineRequest) -> Option<PipelineId> {
        if let Some(&id) = self.built.get(request) {
            return Some(id);
        }

        let Some(pipeline) = self.build(device.device(), request) else {
            log::warn!("no shader module for {:?}", request.shader);
            return None;
        };
        let id = device.register_pipeline(pipeline);
        log::debug!(
            "built pipeline {id:?} for {:?} ({} samples)",
            request.shader,
            request.target.sample_count
        );
        self.built.insert(request.clone(), id);
        Some(id)
    }
}

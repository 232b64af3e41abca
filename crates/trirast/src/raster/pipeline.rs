//! Pipeline objects shared by every render call of one renderer.

use bytemuck::{Pod, Zeroable};

use crate::buffers::{DEPTH_FORMAT, TARGET_FORMAT};

/// Workgroup edge of the resolve shader.
pub(super) const RESOLVE_WORKGROUP: u32 = 8;

// ── uniforms ──────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct RasterParams {
    pub proj: [f32; 16], // column-major
    pub peeling: u32,
    pub _pad: [u32; 3], // 16-byte alignment
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct ResolveDims {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub _pad: u32,
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn layered_texture_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2Array,
            multisampled: false,
        },
        count: None,
    }
}

/// Render and resolve pipelines plus their bind group layouts.
pub(super) struct RasterPipelines {
    pub raster_bgl: wgpu::BindGroupLayout,
    pub raster: wgpu::RenderPipeline,
    pub resolve_bgl: wgpu::BindGroupLayout,
    pub resolve: wgpu::ComputePipeline,
}

impl RasterPipelines {
    /// With `derivatives`, the raster pipeline writes a second color target.
    pub fn new(device: &wgpu::Device, derivatives: bool) -> Self {
        let raster_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("trirast raster shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/raster.wgsl").into()),
        });
        let resolve_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("trirast resolve shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/resolve.wgsl").into()),
        });

        let vs = wgpu::ShaderStages::VERTEX;
        let fs = wgpu::ShaderStages::FRAGMENT;
        let raster_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trirast raster bgl"),
            entries: &[
                uniform_entry(0, vs | fs),
                storage_entry(1, vs, true),
                storage_entry(2, vs, true),
                storage_entry(3, vs, true),
                layered_texture_entry(4, fs),
            ],
        });

        let raster_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("trirast raster pipeline layout"),
            bind_group_layouts: &[&raster_bgl],
            immediate_size: 0,
        });

        let target = Some(wgpu::ColorTargetState {
            format: TARGET_FORMAT,
            // Float32 targets are not blendable.
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        });
        let targets_db = [target.clone(), target.clone()];
        let targets_plain = [target];
        let (fs_entry, targets): (_, &[Option<wgpu::ColorTargetState>]) = if derivatives {
            ("fs_main_db", &targets_db[..])
        } else {
            ("fs_main", &targets_plain[..])
        };

        let raster = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("trirast raster pipeline"),
            layout: Some(&raster_layout),

            vertex: wgpu::VertexState {
                module: &raster_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                // Positions and indices are pulled from storage buffers.
                buffers: &[],
            },

            fragment: Some(wgpu::FragmentState {
                module: &raster_shader,
                entry_point: Some(fs_entry),
                compilation_options: Default::default(),
                targets,
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),

            multiview_mask: None,
            cache: None,
        });

        let cs = wgpu::ShaderStages::COMPUTE;
        let resolve_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trirast resolve bgl"),
            entries: &[
                layered_texture_entry(0, cs),
                storage_entry(1, cs, false),
                uniform_entry(2, cs),
            ],
        });

        let resolve_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("trirast resolve pipeline layout"),
            bind_group_layouts: &[&resolve_bgl],
            immediate_size: 0,
        });

        let resolve = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("trirast resolve pipeline"),
            layout: Some(&resolve_layout),
            module: &resolve_shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            raster_bgl,
            raster,
            resolve_bgl,
            resolve,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_match_wgsl() {
        // mat4x4<f32> + four u32
        assert_eq!(std::mem::size_of::<RasterParams>(), 80);
        assert_eq!(std::mem::size_of::<ResolveDims>(), 16);
    }
}

use crate::buffers::{DeviceBufferSet, RasterTargets};
use crate::error::{RasterError, RasterResult};

use super::pipeline::{RasterParams, RasterPipelines, ResolveDims, RESOLVE_WORKGROUP};
use super::request::ValidatedRequest;

/// Records the rasterization of a validated request.
///
/// Pipelines are built once per renderer. Everything per call (uploads,
/// peel passes, resolve) goes through the queue and the encoder handed in, so
/// it is ordered with the copy that follows on the same queue.
pub struct RasterRenderer {
    derivatives: bool,
    pipelines: RasterPipelines,
    params_first: wgpu::Buffer,
    params_peel: wgpu::Buffer,
    resolve_dims: wgpu::Buffer,
}

impl RasterRenderer {
    pub fn new(device: &wgpu::Device, double_buffered_derivatives: bool) -> Self {
        let uniform = |label, size: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Self {
            derivatives: double_buffered_derivatives,
            pipelines: RasterPipelines::new(device, double_buffered_derivatives),
            params_first: uniform("trirast params (first pass)", std::mem::size_of::<RasterParams>()),
            params_peel: uniform("trirast params (peel passes)", std::mem::size_of::<RasterParams>()),
            resolve_dims: uniform("trirast resolve dims", std::mem::size_of::<ResolveDims>()),
        }
    }

    /// Frees the uniform buffers and drops the pipelines. Must run before the
    /// device is destroyed.
    pub fn release(self) {
        self.resolve_dims.destroy();
        self.params_peel.destroy();
        self.params_first.destroy();
        log::debug!("raster renderer released");
    }

    /// Uploads the request and records `peeling_index + 1` passes per layer
    /// followed by the resolve into the buffer set's output buffers.
    ///
    /// `buffers` must already be sized for `req`.
    pub fn draw(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &DeviceBufferSet,
        req: &ValidatedRequest<'_>,
    ) -> RasterResult<()> {
        let passes = req
            .peeling_index
            .checked_add(1)
            .ok_or_else(|| RasterError::invalid("peeling index out of range"))?;
        let missing = |what: &str| RasterError::ResourceAllocation(format!("{what} is not allocated"));
        let positions = buffers.positions().ok_or_else(|| missing("position buffer"))?;
        let indices = buffers.indices().ok_or_else(|| missing("index buffer"))?;
        let layers = buffers.layers().ok_or_else(|| missing("draw-range table"))?;
        let raster_out = buffers.raster_out().ok_or_else(|| missing("raster output"))?;
        let targets = buffers.targets().ok_or_else(|| missing("render targets"))?;
        let derivatives_out = if self.derivatives {
            Some(buffers.derivatives_out().ok_or_else(|| missing("derivative output"))?)
        } else {
            None
        };

        self.upload(queue, positions, indices, layers, req);

        let bind_groups = self.raster_bind_groups(device, positions, indices, layers, targets);
        log::debug!(
            "rasterizing {} triangles into {}x{}x{} ({passes} pass(es))",
            req.triangle_count,
            req.width,
            req.height,
            req.depth
        );

        for pass in 0..passes {
            let into = (pass % 2) as usize;
            let bind_group = match (pass, into) {
                (0, _) => &bind_groups[0],
                (_, 0) => &bind_groups[1],
                _ => &bind_groups[2],
            };
            self.record_pass(encoder, targets, into, bind_group, req);
        }

        let last = (req.peeling_index % 2) as usize;
        let mut sources = vec![(&targets.raster[last], raster_out)];
        if let (Some(texture), Some(out)) = (targets.derivatives.as_ref(), derivatives_out) {
            sources.push((texture, out));
        }
        self.record_resolve(device, queue, encoder, &sources, req);

        Ok(())
    }

    fn upload(
        &self,
        queue: &wgpu::Queue,
        positions: &wgpu::Buffer,
        indices: &wgpu::Buffer,
        layers: &wgpu::Buffer,
        req: &ValidatedRequest<'_>,
    ) {
        queue.write_buffer(positions, 0, bytemuck::cast_slice(req.positions));
        // Validated non-negative, so the bit pattern is the same as u32.
        queue.write_buffer(indices, 0, bytemuck::cast_slice(req.triangles));
        queue.write_buffer(layers, 0, bytemuck::cast_slice(&req.layer_bases));

        let first = RasterParams {
            proj: req.projection,
            peeling: 0,
            _pad: [0; 3],
        };
        let peel = RasterParams { peeling: 1, ..first };
        queue.write_buffer(&self.params_first, 0, bytemuck::bytes_of(&first));
        queue.write_buffer(&self.params_peel, 0, bytemuck::bytes_of(&peel));
    }

    /// `[first pass, peel into raster[0], peel into raster[1]]`.
    fn raster_bind_groups(
        &self,
        device: &wgpu::Device,
        positions: &wgpu::Buffer,
        indices: &wgpu::Buffer,
        layers: &wgpu::Buffer,
        targets: &RasterTargets,
    ) -> [wgpu::BindGroup; 3] {
        let layered = |texture: &wgpu::Texture| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("trirast previous layer view"),
                dimension: Some(wgpu::TextureViewDimension::D2Array),
                ..Default::default()
            })
        };
        let prev = [layered(&targets.raster[0]), layered(&targets.raster[1])];

        let make = |label, params: &wgpu::Buffer, prev: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.pipelines.raster_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: positions.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: indices.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: layers.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(prev),
                    },
                ],
            })
        };

        // A pass never samples the texture it renders into.
        [
            make("trirast first pass bind group", &self.params_first, &prev[1]),
            make("trirast peel into 0 bind group", &self.params_peel, &prev[1]),
            make("trirast peel into 1 bind group", &self.params_peel, &prev[0]),
        ]
    }

    fn record_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RasterTargets,
        into: usize,
        bind_group: &wgpu::BindGroup,
        req: &ValidatedRequest<'_>,
    ) {
        let layer_view = |texture: &wgpu::Texture, layer: u32| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("trirast target layer view"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            })
        };
        let depth_view = targets.depth.create_view(&wgpu::TextureViewDescriptor::default());
        let cleared = wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            store: wgpu::StoreOp::Store,
        };
        let tri_vertices = (req.triangle_count * 3) as u32;

        for layer in 0..req.depth {
            let raster_view = layer_view(&targets.raster[into], layer);
            let db_view = targets
                .derivatives
                .as_ref()
                .filter(|_| self.derivatives)
                .map(|texture| layer_view(texture, layer));

            let mut attachments = vec![Some(wgpu::RenderPassColorAttachment {
                view: &raster_view,
                resolve_target: None,
                ops: cleared,
                depth_slice: None,
            })];
            if let Some(view) = db_view.as_ref() {
                attachments.push(Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: cleared,
                    depth_slice: None,
                }));
            }

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("trirast raster pass"),
                color_attachments: &attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            // Targets may be larger than the request; map clip space onto
            // the requested corner only.
            rpass.set_viewport(0.0, 0.0, req.width as f32, req.height as f32, 0.0, 1.0);
            rpass.set_pipeline(&self.pipelines.raster);
            rpass.set_bind_group(0, bind_group, &[]);
            rpass.draw(0..tri_vertices, layer..layer + 1);
        }
    }

    fn record_resolve(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        sources: &[(&wgpu::Texture, &wgpu::Buffer)],
        req: &ValidatedRequest<'_>,
    ) {
        let dims = ResolveDims {
            width: req.width,
            height: req.height,
            depth: req.depth,
            _pad: 0,
        };
        queue.write_buffer(&self.resolve_dims, 0, bytemuck::bytes_of(&dims));

        let bind_groups: Vec<wgpu::BindGroup> = sources
            .iter()
            .map(|(texture, out)| {
                let view = texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("trirast resolve source view"),
                    dimension: Some(wgpu::TextureViewDimension::D2Array),
                    ..Default::default()
                });
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("trirast resolve bind group"),
                    layout: &self.pipelines.resolve_bgl,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: out.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: self.resolve_dims.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();

        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("trirast resolve pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(&self.pipelines.resolve);
        for bind_group in &bind_groups {
            cpass.set_bind_group(0, bind_group, &[]);
            cpass.dispatch_workgroups(
                req.width.div_ceil(RESOLVE_WORKGROUP),
                req.height.div_ceil(RESOLVE_WORKGROUP),
                req.depth,
            );
        }
    }
}

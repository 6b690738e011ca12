use glam::Mat4;
use wgpu::{util::DeviceExt, Device, PipelineCompilationOptions, RenderPassDescriptor, ShaderSource};

use crate::rendering::{
    passes::render_pass_context::{RenderPassContext, RenderPassCreationContext},
    render_model::RENDER_MODEL_VBL,
    shader_loader::{PipelineId, ShaderDefinition},
    texture::DepthTexture,
};

const SHADOW_SHADER: ShaderDefinition = ShaderDefinition {
    name: "Shadow shader",
    path: "shadow.wgsl",
};

/// Renders shadow-casting objects into the light's depth map.
pub struct ShadowPass {
    pipeline_id: PipelineId,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
}

impl ShadowPass {
    pub fn create(context: &mut RenderPassCreationContext) -> anyhow::Result<Self> {
        let device = context.device;
        let common = &context.common;

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shadow camera buffer"),
            contents: bytemuck::bytes_of(&Mat4::IDENTITY),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow camera bind group"),
            layout: &common.shadow_camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow pipeline layout"),
            bind_group_layouts: &[&common.shadow_camera_layout, &common.object_layout],
            push_constant_ranges: &[],
        });

        let pipeline_id = context.cache_builder.add_shader(
            SHADOW_SHADER,
            Box::new(
                move |device: &Device, shader_def: &ShaderDefinition, source: &str| {
                    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some(shader_def.name),
                        source: ShaderSource::Wgsl(source.into()),
                    });

                    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some("Shadow pipeline"),
                        layout: Some(&layout),
                        vertex: wgpu::VertexState {
                            module: &shader,
                            entry_point: Some("vs_main"),
                            buffers: &[RENDER_MODEL_VBL],
                            compilation_options: PipelineCompilationOptions::default(),
                        },
                        fragment: None,
                        primitive: wgpu::PrimitiveState {
                            topology: wgpu::PrimitiveTopology::TriangleList,
                            cull_mode: None,
                            ..Default::default()
                        },
                        depth_stencil: Some(wgpu::DepthStencilState {
                            format: DepthTexture::DEPTH_FORMAT,
                            depth_write_enabled: true,
                            depth_compare: wgpu::CompareFunction::LessEqual,
                            stencil: wgpu::StencilState::default(),
                            bias: wgpu::DepthBiasState {
                                constant: 2,
                                slope_scale: 2.0,
                                clamp: 0.0,
                            },
                        }),
                        multisample: wgpu::MultisampleState::default(),
                        multiview: None,
                        cache: None,
                    });

                    Ok(pipeline)
                },
            ),
        );

        Ok(ShadowPass {
            pipeline_id,
            camera_buffer,
            camera_bind_group,
        })
    }

    pub fn update_camera(&self, queue: &wgpu::Queue, view_proj: Mat4) {
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&view_proj));
    }

    pub fn render(&self, shadow_map: &wgpu::TextureView, context: &mut RenderPassContext) {
        let mut render_pass = context.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("Shadow pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: shadow_map,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        let Some(pipeline) = context.pipeline_cache.get(self.pipeline_id) else {
            return;
        };

        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &self.camera_bind_group, &[]);

        for draw in context.draws.iter().filter(|draw| draw.cast_shadow) {
            let (Some(object), Some(model)) = (
                context.objects.get(&draw.object),
                context.render_models.get(draw.model),
            ) else {
                continue;
            };

            render_pass.set_bind_group(1, &object.bind_group, &[]);

            for primitive in &model.primitives {
                render_pass.set_vertex_buffer(0, primitive.vertex_buffer.slice(..));
                render_pass.set_index_buffer(
                    primitive.index_buffer.slice(..),
                    wgpu::IndexFormat::Uint32,
                );
                render_pass.draw_indexed(0..primitive.num_indices, 0, 0..1);
            }
        }
    }
}

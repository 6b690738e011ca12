use std::sync::Arc;

use wgpu::{
    DepthBiasState, Device, MultisampleState, PipelineCompilationOptions, RenderPassDescriptor,
    ShaderSource, StencilState,
};

use crate::rendering::{
    passes::render_pass_context::{RenderPassContext, RenderPassCreationContext},
    render_common::RenderCommon,
    render_model::RENDER_MODEL_VBL,
    shader_loader::{PipelineFactory, PipelineId, ShaderDefinition},
    texture::DepthTexture,
};

const FORWARD_SHADER: ShaderDefinition = ShaderDefinition {
    name: "Forward shader",
    path: "forward.wgsl",
};

const FORWARD_DOUBLE_SIDED_SHADER: ShaderDefinition = ShaderDefinition {
    name: "Forward shader (double-sided)",
    path: "forward.wgsl",
};

pub struct ForwardTextureViews<'a> {
    /// The surface view, or the MSAA target when multisampling.
    pub color: &'a wgpu::TextureView,
    pub resolve_target: Option<&'a wgpu::TextureView>,
    pub depth: &'a wgpu::TextureView,
}

/// Lit, shadowed geometry. Double-sided materials use a pipeline without culling.
pub struct ForwardPass {
    pipeline_id: PipelineId,
    double_sided_pipeline_id: PipelineId,
}

impl ForwardPass {
    pub fn create(context: &mut RenderPassCreationContext) -> anyhow::Result<Self> {
        let common = &context.common;

        let layout = context
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Forward pipeline layout"),
                bind_group_layouts: &[
                    &common.frame_layout,
                    &common.object_layout,
                    &common.material_layout,
                ],
                push_constant_ranges: &[],
            });

        let pipeline_id = context.cache_builder.add_shader(
            FORWARD_SHADER,
            pipeline_factory(common.clone(), layout.clone(), Some(wgpu::Face::Back)),
        );
        let double_sided_pipeline_id = context.cache_builder.add_shader(
            FORWARD_DOUBLE_SIDED_SHADER,
            pipeline_factory(common.clone(), layout, None),
        );

        Ok(ForwardPass {
            pipeline_id,
            double_sided_pipeline_id,
        })
    }

    pub fn render(
        &self,
        texture_views: &ForwardTextureViews,
        frame_bind_group: &wgpu::BindGroup,
        clear_color: wgpu::Color,
        context: &mut RenderPassContext,
    ) {
        let mut render_pass = context.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("Forward pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: texture_views.color,
                resolve_target: texture_views.resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: texture_views.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        let (Some(pipeline), Some(double_sided_pipeline)) = (
            context.pipeline_cache.get(self.pipeline_id),
            context.pipeline_cache.get(self.double_sided_pipeline_id),
        ) else {
            return;
        };

        render_pass.set_bind_group(0, frame_bind_group, &[]);

        for draw in context.draws {
            let (Some(object), Some(model)) = (
                context.objects.get(&draw.object),
                context.render_models.get(draw.model),
            ) else {
                continue;
            };

            render_pass.set_bind_group(1, &object.bind_group, &[]);

            for (index, primitive) in model.primitives.iter().enumerate() {
                let material = context
                    .materials
                    .get(draw.materials.get(index).copied().flatten());

                render_pass.set_pipeline(if material.double_sided {
                    double_sided_pipeline
                } else {
                    pipeline
                });
                render_pass.set_bind_group(2, &material.bind_group, &[]);
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

fn pipeline_factory(
    common: Arc<RenderCommon>,
    layout: wgpu::PipelineLayout,
    cull_mode: Option<wgpu::Face>,
) -> PipelineFactory {
    Box::new(
        move |device: &Device, shader_def: &ShaderDefinition, source: &str| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(shader_def.name),
                source: ShaderSource::Wgsl(source.into()),
            });

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(shader_def.name),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[RENDER_MODEL_VBL],
                    compilation_options: PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: common.surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DepthTexture::DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: StencilState::default(),
                    bias: DepthBiasState::default(),
                }),
                multisample: MultisampleState {
                    count: common.msaa_samples,
                    ..Default::default()
                },
                multiview: None,
                cache: None,
            });

            Ok(pipeline)
        },
    )
}

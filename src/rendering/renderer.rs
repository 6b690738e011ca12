use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use id_arena::Arena;
use wgpu::{util::DeviceExt, CommandEncoderDescriptor};
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    camera::CameraUniform,
    lights::{shadow_caster, LightsUniform, ShadowCaster},
    rendering::{
        imgui_renderer::ImguiRendererState,
        passes::{
            forward_pass::{ForwardPass, ForwardTextureViews},
            render_pass_context::{DrawItem, RenderPassContext, RenderPassCreationContext},
            shadow_pass::ShadowPass,
        },
        render_common::RenderCommon,
        render_material_manager::RenderMaterialManager,
        render_model::{ObjectRenderData, ObjectUniform, RenderModel},
        shader_loader::{PipelineCacheBuilder, ShaderLoader},
        texture::{DepthTexture, MsaaTarget, ShadowMap},
    },
    scene_graph::{ObjectId, Scene},
    viewer::ViewerState,
};

/// Surface texture of the current frame, presented by `finish_frame` once the overlay is drawn.
pub struct Frame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

pub struct Renderer {
    pub window: Arc<Window>,
    pub size: PhysicalSize<u32>,

    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,

    depth_texture: DepthTexture,
    msaa_target: Option<MsaaTarget>,
    shadow_map: ShadowMap,
    shadow_caster: Option<ShadowCaster>,
    clear_color: wgpu::Color,

    camera_uniform: CameraUniform,
    camera_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,

    common: Arc<RenderCommon>,
    render_models: Arena<RenderModel>,
    materials: RenderMaterialManager,
    objects: HashMap<ObjectId, ObjectRenderData>,

    shader_loader: ShaderLoader,
    shadow_pass: ShadowPass,
    forward_pass: ForwardPass,
    imgui_renderer: ImguiRendererState,
}

impl Renderer {
    pub async fn new(
        window: Arc<Window>,
        state: &ViewerState,
        imgui: &mut imgui::Context,
    ) -> anyhow::Result<Renderer> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable graphics adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to create device")?;

        let surface_config = RenderCommon::surface_config(&surface, &adapter, size)?;
        surface.configure(&device, &surface_config);

        let msaa_samples = supported_sample_count(
            &adapter,
            surface_config.format,
            state.config.renderer.msaa_samples,
        );

        let common = Arc::new(RenderCommon::new(&device, surface_config.format, msaa_samples));

        let depth_texture = DepthTexture::new(&device, size, msaa_samples, "Depth Texture");
        let msaa_target = (msaa_samples > 1)
            .then(|| MsaaTarget::new(&device, size, surface_config.format, msaa_samples));

        let shadow_caster = state
            .config
            .renderer
            .shadows
            .then(|| shadow_caster(&state.lights))
            .flatten();
        let shadow_map = ShadowMap::new(&device, shadow_caster.map_or(1, |c| c.map_size));

        let mut camera_uniform = CameraUniform::default();
        camera_uniform.update(&state.camera);
        let camera_buffer = camera_uniform.create_buffer(&device);

        let mut lights_uniform = LightsUniform::from_lights(&state.lights);
        lights_uniform.set_shadow(shadow_caster.as_ref());
        let lights_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lights Uniform Buffer"),
            contents: bytemuck::bytes_of(&lights_uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame bind group"),
            layout: &common.frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(shadow_map.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(shadow_map.sampler()),
                },
            ],
        });

        let mut cache_builder = PipelineCacheBuilder::new();
        let mut creation_context = RenderPassCreationContext {
            device: &device,
            common: common.clone(),
            cache_builder: &mut cache_builder,
        };

        let shadow_pass = ShadowPass::create(&mut creation_context)?;
        let forward_pass = ForwardPass::create(&mut creation_context)?;

        let shader_loader = ShaderLoader::new(device.clone(), cache_builder)?;

        let materials = RenderMaterialManager::new(&device, &queue, &common.material_layout);
        let imgui_renderer = ImguiRendererState::new(&device, &queue, surface_config.format, imgui);

        log::info!(
            "Renderer ready: {}x{}, {:?}, MSAA x{}, shadows {}",
            size.width,
            size.height,
            surface_config.format,
            msaa_samples,
            if shadow_caster.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            window,
            size,
            surface,
            surface_config,
            device,
            queue,
            depth_texture,
            msaa_target,
            shadow_map,
            shadow_caster,
            clear_color: state.config.renderer.clear_color,
            camera_uniform,
            camera_buffer,
            frame_bind_group,
            common,
            render_models: Arena::new(),
            materials,
            objects: HashMap::new(),
            shader_loader,
            shadow_pass,
            forward_pass,
            imgui_renderer,
        })
    }

    /// Creates GPU resources for models and materials that don't have them yet.
    pub fn upload_scene(&mut self, scene: &mut Scene) {
        for (id, material) in scene.materials.iter() {
            if !self.materials.is_loaded(id) {
                self.materials.load_material(id, material);
            }
        }

        for (_id, scene_model) in scene.models.iter_mut() {
            if scene_model.render_model.is_some() {
                continue;
            }

            let render_model = RenderModel::from_model(&self.device, &scene_model.model);
            scene_model.render_model = Some(self.render_models.alloc(render_model));
            log::info!(
                "Loaded model {} with {} primitives",
                scene_model.name(),
                scene_model.model.primitives.len()
            );
        }
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        self.size = new_size;
        self.surface_config.width = new_size.width;
        self.surface_config.height = new_size.height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_texture.resize(&self.device, new_size);
        if let Some(msaa_target) = &mut self.msaa_target {
            msaa_target.resize(&self.device, new_size);
        }
    }

    pub fn render(&mut self, state: &ViewerState) -> Result<Frame, wgpu::SurfaceError> {
        self.shader_loader.load_pending_shaders();

        self.camera_uniform.update(&state.camera);
        self.camera_uniform
            .update_buffer(&self.queue, &self.camera_buffer);

        let draws = self.prepare_objects(&state.scene);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let mut context = RenderPassContext {
            encoder: &mut encoder,
            pipeline_cache: &self.shader_loader.cache,
            render_models: &self.render_models,
            objects: &self.objects,
            materials: &self.materials,
            draws: &draws,
        };

        if let Some(caster) = &self.shadow_caster {
            self.shadow_pass.update_camera(&self.queue, caster.view_proj);
            self.shadow_pass.render(self.shadow_map.view(), &mut context);
        }

        let texture_views = match &self.msaa_target {
            Some(msaa_target) => ForwardTextureViews {
                color: msaa_target.view(),
                resolve_target: Some(&view),
                depth: self.depth_texture.view(),
            },
            None => ForwardTextureViews {
                color: &view,
                resolve_target: None,
                depth: self.depth_texture.view(),
            },
        };

        self.forward_pass.render(
            &texture_views,
            &self.frame_bind_group,
            self.clear_color,
            &mut context,
        );

        self.queue.submit([encoder.finish()]);

        Ok(Frame { output, view })
    }

    pub fn finish_frame(&mut self, frame: Frame, imgui: &mut imgui::Context) -> anyhow::Result<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Imgui Encoder"),
            });

        self.imgui_renderer
            .render(&frame.view, imgui, &self.device, &self.queue, &mut encoder)?;

        self.queue.submit([encoder.finish()]);
        frame.output.present();

        Ok(())
    }

    /// Writes transforms and joint palettes of visible mesh objects and lists them for drawing.
    fn prepare_objects<'s>(&mut self, scene: &'s Scene) -> Vec<DrawItem<'s>> {
        let mut draws = Vec::new();

        for (id, object) in scene.objects.iter() {
            let Some(scene_model) = object.model_id.and_then(|model_id| scene.models.get(model_id))
            else {
                continue;
            };
            let Some(render_model) = scene_model.render_model else {
                continue;
            };
            if !is_visible_in_hierarchy(scene, id) {
                continue;
            }

            let world = *object.transform.get_world_matrix();
            let skin = object.skin_id.and_then(|skin_id| scene.skins.get(skin_id));
            let joints = skin
                .map(|skin| skin.joint_matrices(scene, world))
                .unwrap_or_default();

            let needs_new_data = self
                .objects
                .get(&id)
                .is_none_or(|data| data.joint_capacity() < joints.len());
            if needs_new_data {
                let data = ObjectRenderData::new(
                    &self.device,
                    &self.common.object_layout,
                    &object.name,
                    joints.len(),
                );
                self.objects.insert(id, data);
            }

            let uniform = ObjectUniform::new(
                world,
                *object.transform.get_normal_matrix(),
                skin.is_some(),
                object.receive_shadow,
            );
            if let Some(data) = self.objects.get(&id) {
                data.write(&self.queue, &uniform, &joints);
            }

            draws.push(DrawItem {
                object: id,
                model: render_model,
                materials: &scene_model.material_ids,
                cast_shadow: object.cast_shadow,
            });
        }

        draws
    }
}

fn is_visible_in_hierarchy(scene: &Scene, id: ObjectId) -> bool {
    let mut current = Some(id);
    while let Some(object) = current.and_then(|id| scene.get_object(id)) {
        if !object.visible {
            return false;
        }
        current = object.parent_id;
    }
    true
}

fn supported_sample_count(
    adapter: &wgpu::Adapter,
    format: wgpu::TextureFormat,
    requested: u32,
) -> u32 {
    if requested <= 1 {
        return 1;
    }

    let color = adapter.get_texture_format_features(format).flags;
    let depth = adapter
        .get_texture_format_features(DepthTexture::DEPTH_FORMAT)
        .flags;

    if color.sample_count_supported(requested) && depth.sample_count_supported(requested) {
        requested
    } else {
        log::warn!("MSAA x{} not supported by the adapter, falling back to x1", requested);
        1
    }
}

use crate::rendering::bind_group_builder::BindGroupLayoutBuilder;

/// State shared by every pass: output formats and the bind group layouts pipelines agree on.
pub struct RenderCommon {
    pub surface_format: wgpu::TextureFormat,
    pub msaa_samples: u32,

    /// Group 0 of the forward pass: camera, lights, shadow map.
    pub frame_layout: wgpu::BindGroupLayout,
    /// Group 1 of every model pipeline: object transform and joint palette.
    pub object_layout: wgpu::BindGroupLayout,
    /// Group 2 of the forward pass.
    pub material_layout: wgpu::BindGroupLayout,
    /// Group 0 of the shadow pass.
    pub shadow_camera_layout: wgpu::BindGroupLayout,
}

impl RenderCommon {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, msaa_samples: u32) -> Self {
        let frame_layout =
            BindGroupLayoutBuilder::new("Frame bind group layout", wgpu::ShaderStages::VERTEX_FRAGMENT)
                .uniform(0)
                .uniform(1)
                .depth_texture(2)
                .sampler(3, wgpu::SamplerBindingType::Comparison)
                .build(device);

        let object_layout =
            BindGroupLayoutBuilder::new("Object bind group layout", wgpu::ShaderStages::VERTEX_FRAGMENT)
                .uniform(0)
                .storage(1)
                .build(device);

        let material_layout =
            BindGroupLayoutBuilder::new("Material bind group layout", wgpu::ShaderStages::FRAGMENT)
                .uniform(0)
                .texture(1)
                .sampler(2, wgpu::SamplerBindingType::Filtering)
                .build(device);

        let shadow_camera_layout =
            BindGroupLayoutBuilder::new("Shadow camera bind group layout", wgpu::ShaderStages::VERTEX)
                .uniform(0)
                .build(device);

        Self {
            surface_format,
            msaa_samples,
            frame_layout,
            object_layout,
            material_layout,
            shadow_camera_layout,
        }
    }

    pub fn surface_config(
        surface: &wgpu::Surface,
        adapter: &wgpu::Adapter,
        size: winit::dpi::PhysicalSize<u32>,
    ) -> anyhow::Result<wgpu::SurfaceConfiguration> {
        let surface_caps = surface.get_capabilities(adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Surface reports no supported formats"))?;

        Ok(wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        })
    }
}

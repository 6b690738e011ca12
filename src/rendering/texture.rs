use winit::dpi::PhysicalSize;

pub struct DepthTexture {
    view: wgpu::TextureView,
    label: String,
    sample_count: u32,
}

impl DepthTexture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(
        device: &wgpu::Device,
        size: PhysicalSize<u32>,
        sample_count: u32,
        label: impl Into<String>,
    ) -> Self {
        let label: String = label.into();
        let view = Self::create_view(device, size, sample_count, &label);

        DepthTexture {
            view,
            label,
            sample_count,
        }
    }

    fn create_view(
        device: &wgpu::Device,
        size: PhysicalSize<u32>,
        sample_count: u32,
        label: &str,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn resize(&mut self, device: &wgpu::Device, size: PhysicalSize<u32>) {
        self.view = Self::create_view(device, size, self.sample_count, &self.label);
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

/// Multisampled color target resolved into the surface texture.
pub struct MsaaTarget {
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    sample_count: u32,
}

impl MsaaTarget {
    pub fn new(
        device: &wgpu::Device,
        size: PhysicalSize<u32>,
        format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Self {
        Self {
            view: Self::create_view(device, size, format, sample_count),
            format,
            sample_count,
        }
    }

    fn create_view(
        device: &wgpu::Device,
        size: PhysicalSize<u32>,
        format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("MSAA color target"),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn resize(&mut self, device: &wgpu::Device, size: PhysicalSize<u32>) {
        self.view = Self::create_view(device, size, self.format, self.sample_count);
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

/// Depth map rendered from the shadow-casting light, sampled with a comparison sampler.
pub struct ShadowMap {
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl ShadowMap {
    pub fn new(device: &wgpu::Device, size: u32) -> Self {
        let size = size.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow map"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DepthTexture::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow map sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        });

        Self {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            sampler,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

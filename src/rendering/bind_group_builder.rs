/// Collects bind group layout entries so that layouts read like their WGSL counterparts.
pub struct BindGroupLayoutBuilder {
    label: &'static str,
    visibility: wgpu::ShaderStages,
    entries: Vec<wgpu::BindGroupLayoutEntry>,
}

impl BindGroupLayoutBuilder {
    pub fn new(label: &'static str, visibility: wgpu::ShaderStages) -> Self {
        Self {
            label,
            visibility,
            entries: Vec::new(),
        }
    }

    fn entry(mut self, binding: u32, ty: wgpu::BindingType) -> Self {
        self.entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: self.visibility,
            ty,
            count: None,
        });
        self
    }

    pub fn uniform(self, binding: u32) -> Self {
        self.entry(
            binding,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        )
    }

    pub fn storage(self, binding: u32) -> Self {
        self.entry(
            binding,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        )
    }

    pub fn texture(self, binding: u32) -> Self {
        self.entry(
            binding,
            wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
        )
    }

    pub fn depth_texture(self, binding: u32) -> Self {
        self.entry(
            binding,
            wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
        )
    }

    pub fn sampler(self, binding: u32, ty: wgpu::SamplerBindingType) -> Self {
        self.entry(binding, wgpu::BindingType::Sampler(ty))
    }

    pub fn build(self, device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(self.label),
            entries: &self.entries,
        })
    }
}

use std::{borrow::Cow, collections::HashMap};

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use wgpu::{util::DeviceExt, TexelCopyBufferLayout, TexelCopyTextureInfo};

use crate::asset::material::{ImageData, MaterialData, MaterialId};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct MaterialUniform {
    base_color_factor: Vec4,
}

pub struct RenderMaterial {
    pub bind_group: wgpu::BindGroup,
    pub double_sided: bool,
}

/// GPU side of scene materials. Primitives without a material use a white default.
pub struct RenderMaterialManager {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    white_texture: wgpu::TextureView,

    materials: HashMap<MaterialId, RenderMaterial>,
    default_material: RenderMaterial,
}

impl RenderMaterialManager {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, layout: &wgpu::BindGroupLayout) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Default sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        let white_texture = create_default_texture(device, queue);

        let default_material = Self::create_material(
            device,
            layout,
            &sampler,
            &white_texture,
            &MaterialData::solid("Default material", glam::Vec3::ONE, false),
        );

        Self {
            device: device.clone(),
            queue: queue.clone(),
            layout: layout.clone(),
            sampler,
            white_texture,
            materials: HashMap::new(),
            default_material,
        }
    }

    pub fn is_loaded(&self, id: MaterialId) -> bool {
        self.materials.contains_key(&id)
    }

    pub fn load_material(&mut self, id: MaterialId, material: &MaterialData) {
        let texture = material
            .base_color_image
            .as_ref()
            .and_then(|image| self.create_texture(&material.name, image));

        let render_material = Self::create_material(
            &self.device,
            &self.layout,
            &self.sampler,
            texture.as_ref().unwrap_or(&self.white_texture),
            material,
        );

        log::debug!("Uploaded material {}", material.name);
        self.materials.insert(id, render_material);
    }

    pub fn get(&self, id: Option<MaterialId>) -> &RenderMaterial {
        id.and_then(|id| self.materials.get(&id))
            .unwrap_or(&self.default_material)
    }

    fn create_material(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        texture: &wgpu::TextureView,
        material: &MaterialData,
    ) -> RenderMaterial {
        let uniform = MaterialUniform {
            base_color_factor: material.base_color_factor,
        };

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Material uniform ({})", material.name)),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Material bind group ({})", material.name)),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(texture),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        RenderMaterial {
            bind_group,
            double_sided: material.double_sided,
        }
    }

    /// Oversized images are downscaled to the device limit. Empty ones fall back to white.
    fn create_texture(&self, name: &str, image: &ImageData) -> Option<wgpu::TextureView> {
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        let Some(image) = image.fit_within(max_dimension) else {
            log::warn!("Ignoring empty base color image of {}", name);
            return None;
        };
        if let Cow::Owned(resized) = &image {
            log::warn!(
                "Base color image of {} downscaled to {}x{}",
                name,
                resized.width,
                resized.height
            );
        }

        let texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some(&format!("{name} (base color)")),
                size: wgpu::Extent3d {
                    width: image.width,
                    height: image.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::wgt::TextureDataOrder::default(),
            &image.pixels,
        );

        Some(texture.create_view(&wgpu::TextureViewDescriptor::default()))
    }
}

fn create_default_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Default Texture (white)"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255, 255, 255, 255],
        TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );

    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

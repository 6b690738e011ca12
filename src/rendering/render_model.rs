use std::mem::offset_of;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4};
use id_arena::Id;
use wgpu::util::DeviceExt;

use crate::asset::model::{Model, ModelPrimitive, Vertex};

pub type RenderModelId = Id<RenderModel>;

pub struct RenderPrimitive {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_indices: u32,
}

impl RenderPrimitive {
    fn from_primitive(device: &wgpu::Device, model: &Model, primitive: &ModelPrimitive) -> Self {
        let vertex_buffer_name = format!(
            "Vertex buffer ({}, primitive {})",
            model.name, primitive.index
        );
        let index_buffer_name = format!(
            "Index buffer ({}, primitive {})",
            model.name, primitive.index
        );

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&vertex_buffer_name),
            contents: bytemuck::cast_slice(&primitive.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&index_buffer_name),
            contents: bytemuck::cast_slice(&primitive.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            num_indices: primitive.indices.len() as u32,
        }
    }
}

pub struct RenderModel {
    pub primitives: Vec<RenderPrimitive>,
}

impl RenderModel {
    pub fn from_model(device: &wgpu::Device, model: &Model) -> Self {
        let primitives = model
            .primitives
            .iter()
            .map(|primitive| RenderPrimitive::from_primitive(device, model, primitive))
            .collect();

        RenderModel { primitives }
    }
}

pub const RENDER_MODEL_VBL: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, position) as wgpu::BufferAddress,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, normal) as wgpu::BufferAddress,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, tex_coords) as wgpu::BufferAddress,
            shader_location: 2,
            format: wgpu::VertexFormat::Float32x2,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, joints) as wgpu::BufferAddress,
            shader_location: 3,
            format: wgpu::VertexFormat::Uint16x4,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, weights) as wgpu::BufferAddress,
            shader_location: 4,
            format: wgpu::VertexFormat::Float32x4,
        },
    ],
};

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: Mat4,
    pub normal: Mat4,
    /// x: skinned, y: receives shadows.
    pub flags: UVec4,
}

impl ObjectUniform {
    pub fn new(model: Mat4, normal: Mat4, skinned: bool, receive_shadow: bool) -> Self {
        Self {
            model,
            normal,
            flags: UVec4::new(skinned as u32, receive_shadow as u32, 0, 0),
        }
    }
}

/// Per-object GPU state: transform uniform plus the joint palette of skinned meshes.
pub struct ObjectRenderData {
    uniform_buffer: wgpu::Buffer,
    joints_buffer: wgpu::Buffer,
    joint_capacity: usize,
    pub bind_group: wgpu::BindGroup,
}

impl ObjectRenderData {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        name: &str,
        joint_count: usize,
    ) -> Self {
        // Storage bindings can't be empty.
        let joint_capacity = joint_count.max(1);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("Object uniform ({})", name)),
            size: std::mem::size_of::<ObjectUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let joints_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Joint matrices ({})", name)),
            contents: bytemuck::cast_slice(&vec![Mat4::IDENTITY; joint_capacity]),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Object bind group ({})", name)),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: joints_buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            uniform_buffer,
            joints_buffer,
            joint_capacity,
            bind_group,
        }
    }

    pub fn joint_capacity(&self) -> usize {
        self.joint_capacity
    }

    pub fn write(&self, queue: &wgpu::Queue, uniform: &ObjectUniform, joints: &[Mat4]) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniform));

        if !joints.is_empty() {
            let count = joints.len().min(self.joint_capacity);
            queue.write_buffer(
                &self.joints_buffer,
                0,
                bytemuck::cast_slice(&joints[..count]),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_covers_every_attribute() {
        let attributes = RENDER_MODEL_VBL.attributes;
        assert_eq!(attributes.len(), 5);

        let last = attributes[4];
        assert_eq!(
            last.offset + last.format.size(),
            RENDER_MODEL_VBL.array_stride
        );
    }

    #[test]
    fn object_uniform_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 144);

        let uniform = ObjectUniform::new(Mat4::IDENTITY, Mat4::IDENTITY, true, false);
        assert_eq!(uniform.flags, UVec4::new(1, 0, 0, 0));
    }
}

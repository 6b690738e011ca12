use glam::{Mat4, Vec3, Vec4};
use wgpu::util::DeviceExt;

use crate::config::CameraSettings;

#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    pub fn new(settings: &CameraSettings, aspect: f32) -> Self {
        Self {
            position: settings.position,
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: settings.fov_y_degrees.to_radians(),
            aspect,
            near: settings.near,
            far: settings.far,
        }
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    /// Follows the viewport size. Degenerate sizes (minimized windows) are ignored.
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Default)]
pub struct CameraUniform {
    view_proj: Mat4,
    position: Vec4,
}

impl CameraUniform {
    pub fn update(&mut self, camera: &PerspectiveCamera) {
        self.view_proj = camera.view_projection();
        self.position = camera.position.extend(1.0);
    }

    pub fn create_buffer(&self, device: &wgpu::Device) -> wgpu::Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform Buffer"),
            contents: bytemuck::cast_slice(&[*self]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
    }

    pub fn update_buffer(&self, queue: &wgpu::Queue, buffer: &wgpu::Buffer) {
        queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[*self]));
    }
}

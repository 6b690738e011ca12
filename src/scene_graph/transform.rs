use glam::{Mat4, Quat, Vec3};
use std::cell::{Cell, Ref, RefCell};

#[derive(Debug, Clone)]
pub struct Transform {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,

    local_matrix: RefCell<Mat4>,
    world_matrix: RefCell<Mat4>,
    normal_matrix: RefCell<Mat4>,
    local_dirty: Cell<bool>,
    world_dirty: Cell<bool>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_trs(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)
    }
}

impl Transform {
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
            local_matrix: RefCell::new(Mat4::IDENTITY),
            world_matrix: RefCell::new(Mat4::IDENTITY),
            normal_matrix: RefCell::new(Mat4::IDENTITY),
            local_dirty: Cell::new(true),
            world_dirty: Cell::new(true),
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_trs(translation, Quat::IDENTITY, Vec3::ONE)
    }

    pub fn get_local_matrix(&self) -> Ref<Mat4> {
        if self.local_dirty.get() {
            let matrix =
                Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);

            self.local_matrix.replace(matrix);
            self.local_dirty.set(false);
            self.invalidate_world();
        }

        self.local_matrix.borrow()
    }

    pub fn get_world_matrix(&self) -> Ref<Mat4> {
        self.world_matrix.borrow()
    }

    /// Inverse transpose of the world matrix, for transforming normals.
    pub fn get_normal_matrix(&self) -> Ref<Mat4> {
        self.normal_matrix.borrow()
    }

    pub fn set_world_matrix(&self, world_matrix: Mat4) {
        self.world_matrix.replace(world_matrix);
        self.world_dirty.set(false);
        self.normal_matrix
            .replace(world_matrix.inverse().transpose());
    }

    pub fn invalidate_local(&self) {
        self.local_dirty.set(true);
        self.world_dirty.set(true);
    }

    pub fn invalidate_world(&self) {
        self.world_dirty.set(true);
    }

    pub fn is_world_dirty(&self) -> bool {
        self.world_dirty.get()
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.invalidate_local();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.invalidate_local();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.invalidate_local();
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }
}

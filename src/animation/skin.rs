use glam::Mat4;
use id_arena::Id;

use crate::scene_graph::{ObjectId, Scene};

pub type SkinId = Id<Skin>;

pub struct Skin {
    pub name: String,
    pub joints: Vec<ObjectId>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

impl Skin {
    /// Joint palette in the mesh's local space: `mesh_world⁻¹ · joint_world · inverse_bind`.
    pub fn joint_matrices(&self, scene: &Scene, mesh_world: Mat4) -> Vec<Mat4> {
        let mesh_world_inverse = mesh_world.inverse();

        self.joints
            .iter()
            .enumerate()
            .map(|(i, &joint)| {
                let joint_world = scene.world_matrix(joint).unwrap_or(Mat4::IDENTITY);
                let inverse_bind = self
                    .inverse_bind_matrices
                    .get(i)
                    .copied()
                    .unwrap_or(Mat4::IDENTITY);
                mesh_world_inverse * joint_world * inverse_bind
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_graph::Object3D;
    use glam::{Quat, Vec3};

    #[test]
    fn bind_pose_yields_identity_palette() {
        let mut scene = Scene::new();
        let joint = scene.add_object(Object3D::named("joint"));
        scene.set_object_translation(joint, Vec3::new(0.0, 2.0, 0.0));
        scene.late_update();

        let bind_world = scene.world_matrix(joint).unwrap();
        let skin = Skin {
            name: "Armature".to_string(),
            joints: vec![joint],
            inverse_bind_matrices: vec![bind_world.inverse()],
        };

        let palette = skin.joint_matrices(&scene, Mat4::IDENTITY);
        assert!(palette[0].abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn moved_joint_offsets_palette() {
        let mut scene = Scene::new();
        let joint = scene.add_object(Object3D::named("joint"));
        scene.late_update();

        let skin = Skin {
            name: "Armature".to_string(),
            joints: vec![joint],
            inverse_bind_matrices: Vec::new(),
        };

        scene.set_object_rotation(joint, Quat::from_rotation_z(1.0));
        scene.set_object_translation(joint, Vec3::X);
        scene.late_update();

        let mesh_world = Mat4::from_translation(Vec3::Y);
        let palette = skin.joint_matrices(&scene, mesh_world);
        let expected = mesh_world.inverse()
            * Mat4::from_rotation_translation(Quat::from_rotation_z(1.0), Vec3::X);
        assert!(palette[0].abs_diff_eq(expected, 1e-6));
    }
}

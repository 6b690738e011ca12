use glam::{Mat4, Quat, Vec3};
use id_arena::Arena;

use crate::animation::skin::{Skin, SkinId};
use crate::asset::{material::MaterialData, material::MaterialId, model::Model, LoadedAsset};
use crate::scene_graph::object3d::{Object3D, ObjectId};
use crate::scene_graph::scene_model::{SceneModel, SceneModelId};
use crate::scene_graph::transform::Transform;

/// Objects created for one asset.
pub struct SpawnedAsset {
    pub root: ObjectId,
    /// Scene object for each node index of the asset.
    pub nodes: Vec<ObjectId>,
}

pub struct Scene {
    pub objects: Arena<Object3D>,
    pub models: Arena<SceneModel>,
    pub materials: Arena<MaterialData>,
    pub skins: Arena<Skin>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Arena::new(),
            models: Arena::new(),
            materials: Arena::new(),
            skins: Arena::new(),
        }
    }

    pub fn add_object(&mut self, object: Object3D) -> ObjectId {
        self.objects.alloc(object)
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&Object3D> {
        self.objects.get(id)
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Option<&mut Object3D> {
        self.objects.get_mut(id)
    }

    pub fn get_object_by_name(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .find(|(_, object)| object.name == name)
            .map(|(id, _)| id)
    }

    pub fn add_model(&mut self, model: SceneModel) -> SceneModelId {
        self.models.alloc(model)
    }

    pub fn add_material(&mut self, material: MaterialData) -> MaterialId {
        self.materials.alloc(material)
    }

    /// Adds a mesh object with a single material on every primitive.
    pub fn add_mesh_object(
        &mut self,
        name: impl Into<String>,
        model: Model,
        material: MaterialId,
        transform: Transform,
    ) -> ObjectId {
        let material_ids = vec![Some(material); model.primitives.len()];
        let model_id = self.add_model(SceneModel::new(model, material_ids));

        self.add_object(Object3D {
            name: name.into(),
            transform,
            model_id: Some(model_id),
            ..Default::default()
        })
    }

    /// Moves the asset's meshes, materials and skins into the scene and creates an object
    /// per node below a new root object.
    pub fn spawn_asset(&mut self, asset: &mut LoadedAsset, root_transform: Transform) -> SpawnedAsset {
        let root = self.add_object(Object3D {
            name: asset.name.clone(),
            transform: root_transform,
            ..Default::default()
        });

        let material_ids = asset
            .materials
            .drain(..)
            .map(|material| self.add_material(material))
            .collect::<Vec<_>>();

        let model_ids = asset
            .meshes
            .drain(..)
            .map(|model| {
                let primitive_materials = model
                    .primitives
                    .iter()
                    .map(|p| p.material.and_then(|i| material_ids.get(i).copied()))
                    .collect();
                self.add_model(SceneModel::new(model, primitive_materials))
            })
            .collect::<Vec<_>>();

        let nodes = asset
            .nodes
            .iter()
            .map(|node| {
                self.add_object(Object3D {
                    name: node.name.clone(),
                    transform: Transform::from_trs(node.translation, node.rotation, node.scale),
                    model_id: node.mesh.and_then(|i| model_ids.get(i).copied()),
                    ..Default::default()
                })
            })
            .collect::<Vec<_>>();

        let skin_ids = asset
            .skins
            .drain(..)
            .map(|skin| {
                self.skins.alloc(Skin {
                    name: skin.name,
                    joints: skin
                        .joints
                        .iter()
                        .filter_map(|&joint| nodes.get(joint).copied())
                        .collect(),
                    inverse_bind_matrices: skin.inverse_bind_matrices,
                })
            })
            .collect::<Vec<SkinId>>();

        for (index, node) in asset.nodes.iter().enumerate() {
            let object_id = nodes[index];

            if let Some(skin_id) = node.skin.and_then(|i| skin_ids.get(i).copied()) {
                self.objects[object_id].skin_id = Some(skin_id);
            }

            for &child in &node.children {
                if let Some(&child_id) = nodes.get(child) {
                    self.set_object_parent(child_id, Some(object_id));
                }
            }
        }

        for &scene_root in &asset.roots {
            if let Some(&root_node) = nodes.get(scene_root) {
                self.set_object_parent(root_node, Some(root));
            }
        }

        SpawnedAsset { root, nodes }
    }

    /// Depth-first walk over `root` and its descendants.
    pub fn traverse<F>(&mut self, root: ObjectId, f: &mut F)
    where
        F: FnMut(&mut Object3D),
    {
        let Some(object) = self.objects.get_mut(root) else {
            return;
        };
        f(object);

        let children = object.child_ids.clone();
        for child in children {
            self.traverse(child, f);
        }
    }

    pub fn world_matrix(&self, id: ObjectId) -> Option<Mat4> {
        self.objects
            .get(id)
            .map(|object| *object.transform.get_world_matrix())
    }

    /// Updates all object transforms in hierarchical order
    fn update_transforms(&self) {
        let root_objects = self
            .objects
            .iter()
            .filter(|(_, object)| object.parent_id.is_none())
            .map(|(id, _)| id);

        for root_id in root_objects {
            self.update_object_transform_recursive(root_id, Mat4::IDENTITY, false);
        }
    }

    fn update_object_transform_recursive(
        &self,
        object_id: ObjectId,
        parent_world_matrix: Mat4,
        parent_changed: bool,
    ) {
        if let Some(object) = self.objects.get(object_id) {
            let local_matrix = *object.transform.get_local_matrix();
            let changed = parent_changed || object.transform.is_world_dirty();

            if changed {
                object
                    .transform
                    .set_world_matrix(parent_world_matrix * local_matrix);
            }

            let world_matrix = *object.transform.get_world_matrix();
            for &child_id in &object.child_ids {
                self.update_object_transform_recursive(child_id, world_matrix, changed);
            }
        }
    }

    /// Invalidates world transforms for an object and all its descendants
    pub fn invalidate_object_hierarchy(&self, object_id: ObjectId) {
        if let Some(object) = self.objects.get(object_id) {
            object.transform.invalidate_world();

            for &child_id in &object.child_ids {
                self.invalidate_object_hierarchy(child_id);
            }
        }
    }

    /// Sets the parent of an object and updates child relationships
    pub fn set_object_parent(&mut self, child_id: ObjectId, new_parent_id: Option<ObjectId>) {
        if let Some(old_parent_id) = self.objects.get(child_id).and_then(|c| c.parent_id) {
            if let Some(old_parent) = self.objects.get_mut(old_parent_id) {
                old_parent.child_ids.retain(|&id| id != child_id);
            }
        }

        if let Some(child) = self.objects.get_mut(child_id) {
            child.parent_id = new_parent_id;
        }

        if let Some(new_parent) = new_parent_id.and_then(|id| self.objects.get_mut(id)) {
            new_parent.child_ids.push(child_id);
        }

        self.invalidate_object_hierarchy(child_id);
    }

    pub fn set_object_translation(&mut self, object_id: ObjectId, translation: Vec3) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_translation(translation);
        }
    }

    pub fn set_object_rotation(&mut self, object_id: ObjectId, rotation: Quat) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_rotation(rotation);
        }
    }

    pub fn set_object_scale(&mut self, object_id: ObjectId, scale: Vec3) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_scale(scale);
        }
    }

    pub fn late_update(&mut self) {
        self.update_transforms();
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::test_asset;

    #[test]
    fn world_matrices_compose_down_the_hierarchy() {
        let mut scene = Scene::new();
        let parent = scene.add_object(Object3D::named("parent"));
        let child = scene.add_object(Object3D::named("child"));
        scene.set_object_parent(child, Some(parent));

        scene.set_object_translation(parent, Vec3::new(0.0, 1.05, -1.0));
        scene.set_object_translation(child, Vec3::X);
        scene.late_update();

        let world = scene.world_matrix(child).unwrap();
        assert!(world
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(1.0, 1.05, -1.0), 1e-6));
    }

    #[test]
    fn moving_a_parent_moves_clean_children() {
        let mut scene = Scene::new();
        let parent = scene.add_object(Object3D::named("parent"));
        let child = scene.add_object(Object3D::named("child"));
        scene.set_object_parent(child, Some(parent));
        scene.late_update();

        scene.set_object_translation(parent, Vec3::Y);
        scene.late_update();

        assert_eq!(scene.world_matrix(child).unwrap().w_axis.truncate(), Vec3::Y);
    }

    #[test]
    fn reparenting_updates_child_lists() {
        let mut scene = Scene::new();
        let a = scene.add_object(Object3D::named("a"));
        let b = scene.add_object(Object3D::named("b"));
        let child = scene.add_object(Object3D::named("child"));

        scene.set_object_parent(child, Some(a));
        scene.set_object_parent(child, Some(b));

        assert!(scene.get_object(a).unwrap().child_ids.is_empty());
        assert_eq!(scene.get_object(b).unwrap().child_ids, vec![child]);
        assert_eq!(scene.get_object(child).unwrap().parent_id, Some(b));
        assert_eq!(scene.get_object_by_name("child"), Some(child));
    }

    #[test]
    fn traverse_visits_every_descendant() {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::named("root"));
        let a = scene.add_object(Object3D::named("a"));
        let b = scene.add_object(Object3D::named("b"));
        let outside = scene.add_object(Object3D::named("outside"));
        scene.set_object_parent(a, Some(root));
        scene.set_object_parent(b, Some(a));

        let mut visited = Vec::new();
        scene.traverse(root, &mut |object| {
            object.cast_shadow = true;
            visited.push(object.name.clone());
        });

        assert_eq!(visited, vec!["root", "a", "b"]);
        assert!(!scene.get_object(outside).unwrap().cast_shadow);
    }

    #[test]
    fn spawned_asset_hangs_below_positioned_root() {
        let path = test_asset::write_fixture("spawn");
        let bytes = std::fs::read(&path).unwrap();
        let mut asset =
            LoadedAsset::from_slice("spider.gltf", &bytes, path.parent().unwrap()).unwrap();
        test_asset::cleanup(&path);

        let mut scene = Scene::new();
        let spawned = scene.spawn_asset(
            &mut asset,
            Transform::from_translation(Vec3::new(0.0, 1.05, -1.0)),
        );
        scene.late_update();

        assert_eq!(spawned.nodes.len(), 3);
        let armature = scene.get_object(spawned.nodes[0]).unwrap();
        assert_eq!(armature.parent_id, Some(spawned.root));

        let mesh_object = scene.get_object(spawned.nodes[1]).unwrap();
        assert!(mesh_object.model_id.is_some());
        let skin = &scene.skins[mesh_object.skin_id.unwrap()];
        assert_eq!(skin.joints, vec![spawned.nodes[0], spawned.nodes[2]]);

        let model = &scene.models[mesh_object.model_id.unwrap()];
        let material = &scene.materials[model.material_ids[0].unwrap()];
        assert_eq!(material.name, "Chitin");

        let bone_world = scene.world_matrix(spawned.nodes[2]).unwrap();
        assert!(bone_world
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(0.0, 2.05, -1.0), 1e-6));
    }
}

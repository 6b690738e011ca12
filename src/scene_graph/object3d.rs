use id_arena::Id;

use crate::animation::skin::SkinId;
use crate::scene_graph::scene_model::SceneModelId;
use crate::scene_graph::transform::Transform;

pub type ObjectId = Id<Object3D>;

pub struct Object3D {
    pub name: String,
    pub transform: Transform,
    pub model_id: Option<SceneModelId>,
    pub skin_id: Option<SkinId>,
    pub parent_id: Option<ObjectId>,
    pub child_ids: Vec<ObjectId>,
    pub visible: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Object3D {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Default for Object3D {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Transform::default(),
            model_id: None,
            skin_id: None,
            parent_id: None,
            child_ids: Vec::new(),
            visible: true,
            cast_shadow: false,
            receive_shadow: false,
        }
    }
}

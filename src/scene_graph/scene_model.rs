use id_arena::Id;

use crate::{
    asset::{material::MaterialId, model::Model},
    rendering::render_model::RenderModelId,
};

pub type SceneModelId = Id<SceneModel>;

pub struct SceneModel {
    pub model: Model,
    /// Material per primitive, parallel to `model.primitives`.
    pub material_ids: Vec<Option<MaterialId>>,
    pub render_model: Option<RenderModelId>,
}

impl SceneModel {
    pub fn new(model: Model, material_ids: Vec<Option<MaterialId>>) -> Self {
        Self {
            model,
            material_ids,
            render_model: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.model.name
    }
}

use std::{collections::HashMap, sync::Arc};

use id_arena::Arena;

use crate::{
    asset::material::MaterialId,
    rendering::{
        render_common::RenderCommon,
        render_material_manager::RenderMaterialManager,
        render_model::{ObjectRenderData, RenderModel, RenderModelId},
        shader_loader::{PipelineCache, PipelineCacheBuilder},
    },
    scene_graph::ObjectId,
};

pub struct RenderPassCreationContext<'a> {
    pub device: &'a wgpu::Device,
    pub common: Arc<RenderCommon>,
    pub cache_builder: &'a mut PipelineCacheBuilder,
}

/// One visible mesh object, gathered from the scene before encoding.
pub struct DrawItem<'a> {
    pub object: ObjectId,
    pub model: RenderModelId,
    /// Parallel to the model's primitives.
    pub materials: &'a [Option<MaterialId>],
    pub cast_shadow: bool,
}

pub struct RenderPassContext<'a> {
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub pipeline_cache: &'a PipelineCache,
    pub render_models: &'a Arena<RenderModel>,
    pub objects: &'a HashMap<ObjectId, ObjectRenderData>,
    pub materials: &'a RenderMaterialManager,
    pub draws: &'a [DrawItem<'a>],
}

pub mod ground;
pub mod object3d;
pub mod scene;
pub mod scene_model;
pub mod transform;

pub use object3d::{Object3D, ObjectId};
pub use scene::{Scene, SpawnedAsset};
pub use scene_model::{SceneModel, SceneModelId};
pub use transform::Transform;

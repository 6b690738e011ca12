//! Keyframe clips, the mixer that plays them, and skins driven by the animated joints.

pub mod clip;
pub mod mixer;
pub mod skin;

pub use clip::AnimationClip;
pub use mixer::{ActionId, AnimationMixer, ClipAction, LoopMode};
pub use skin::{Skin, SkinId};

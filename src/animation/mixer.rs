use std::collections::HashMap;

use glam::{Quat, Vec3, Vec4};
use id_arena::{Arena, Id};

use crate::{
    animation::clip::{AnimationClip, Property, SampledValue},
    scene_graph::{ObjectId, Scene},
};

pub type ActionId = Id<ClipAction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Repeat,
    Once,
}

/// Playback state of a single clip.
pub struct ClipAction {
    pub clip: AnimationClip,
    pub time: f32,
    pub time_scale: f32,
    pub weight: f32,
    pub loop_mode: LoopMode,
    playing: bool,
    paused: bool,
    finished: bool,
}

impl ClipAction {
    fn new(clip: AnimationClip) -> Self {
        Self {
            clip,
            time: 0.0,
            time_scale: 1.0,
            weight: 1.0,
            loop_mode: LoopMode::Repeat,
            playing: false,
            paused: false,
            finished: false,
        }
    }

    pub fn play(&mut self) {
        if self.finished {
            self.time = 0.0;
        }
        self.playing = true;
        self.paused = false;
        self.finished = false;
    }

    pub fn stop(&mut self) {
        self.playing = false;
        self.paused = false;
        self.finished = false;
        self.time = 0.0;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn is_running(&self) -> bool {
        self.playing && !self.paused
    }

    /// Running actions, and `Once` actions holding their final pose, write to the scene.
    fn contributes(&self) -> bool {
        self.weight > 0.0 && (self.is_running() || self.finished)
    }

    fn advance(&mut self, dt: f32) {
        if !self.is_running() {
            return;
        }

        let duration = self.clip.duration;
        self.time += dt * self.time_scale;

        match self.loop_mode {
            LoopMode::Repeat if duration > 0.0 => {
                self.time = self.time.rem_euclid(duration);
            }
            LoopMode::Repeat => self.time = 0.0,
            LoopMode::Once => {
                if self.time >= duration || self.time < 0.0 {
                    self.time = self.time.clamp(0.0, duration);
                    self.playing = false;
                    self.finished = true;
                }
            }
        }
    }
}

#[derive(Default)]
struct Accumulator {
    contributions: u32,
    weight: f32,
    first: Option<SampledValue>,
    vector: Vec3,
    rotation: Vec4,
}

impl Accumulator {
    fn add(&mut self, value: SampledValue, weight: f32) {
        if self.first.is_none() {
            self.first = Some(value);
        }
        self.contributions += 1;
        self.weight += weight;

        match value {
            SampledValue::Vector(v) => self.vector += v * weight,
            SampledValue::Rotation(q) => {
                let q = Vec4::from(q);
                // Keep every contribution in the same hemisphere as the accumulated value.
                let sign = if self.rotation.dot(q) < 0.0 { -1.0 } else { 1.0 };
                self.rotation += q * weight * sign;
            }
        }
    }

    fn resolve(&self) -> Option<SampledValue> {
        if self.contributions == 1 {
            return self.first;
        }
        if self.weight <= f32::EPSILON {
            return None;
        }

        match self.first? {
            SampledValue::Vector(_) => Some(SampledValue::Vector(self.vector / self.weight)),
            SampledValue::Rotation(_) => Some(SampledValue::Rotation(
                Quat::from_vec4(self.rotation).normalize(),
            )),
        }
    }
}

/// Plays clips on the objects spawned from one asset.
pub struct AnimationMixer {
    /// Scene object for each node index of the source document.
    bindings: Vec<ObjectId>,
    actions: Arena<ClipAction>,
}

impl AnimationMixer {
    pub fn new(bindings: Vec<ObjectId>) -> Self {
        Self {
            bindings,
            actions: Arena::new(),
        }
    }

    /// Returns the action for `clip`, creating it on first use.
    pub fn clip_action(&mut self, clip: AnimationClip) -> ActionId {
        if let Some(id) = self.action_by_name(&clip.name) {
            return id;
        }

        self.actions.alloc(ClipAction::new(clip))
    }

    pub fn action_by_name(&self, name: &str) -> Option<ActionId> {
        self.actions
            .iter()
            .find(|(_, action)| action.clip.name == name)
            .map(|(id, _)| id)
    }

    pub fn action(&self, id: ActionId) -> Option<&ClipAction> {
        self.actions.get(id)
    }

    pub fn action_mut(&mut self, id: ActionId) -> Option<&mut ClipAction> {
        self.actions.get_mut(id)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ClipAction> {
        self.actions.iter().map(|(_, action)| action)
    }

    /// Starts the named clip. Missing clips are reported and skipped.
    pub fn play(&mut self, name: &str) -> bool {
        match self.action_by_name(name) {
            Some(id) => {
                self.actions[id].play();
                true
            }
            None => {
                log::warn!("No animation clip named '{}'", name);
                false
            }
        }
    }

    pub fn update(&mut self, dt: f32, scene: &mut Scene) {
        let mut targets: HashMap<(usize, Property), Accumulator> = HashMap::new();

        for (_, action) in self.actions.iter_mut() {
            action.advance(dt);

            if !action.contributes() {
                continue;
            }

            for track in &action.clip.tracks {
                targets
                    .entry((track.node, track.property))
                    .or_default()
                    .add(track.sample(action.time), action.weight);
            }
        }

        for ((node, property), accumulator) in targets {
            let Some(&object_id) = self.bindings.get(node) else {
                continue;
            };
            let Some(value) = accumulator.resolve() else {
                continue;
            };

            match (property, value) {
                (Property::Translation, SampledValue::Vector(v)) => {
                    scene.set_object_translation(object_id, v)
                }
                (Property::Scale, SampledValue::Vector(v)) => scene.set_object_scale(object_id, v),
                (Property::Rotation, SampledValue::Rotation(q)) => {
                    scene.set_object_rotation(object_id, q)
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        animation::clip::{Interpolation, Keyframes, Track},
        scene_graph::Object3D,
    };

    fn slide_clip(name: &str, node: usize, end: Vec3) -> AnimationClip {
        AnimationClip::new(
            name,
            vec![Track::new(
                node,
                Property::Translation,
                Interpolation::Linear,
                vec![0.0, 2.0],
                Keyframes::Vectors(vec![Vec3::ZERO, end]),
            )
            .unwrap()],
        )
    }

    fn setup() -> (Scene, ObjectId, AnimationMixer) {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::named("root"));
        let bone = scene.add_object(Object3D::named("bone"));
        scene.set_object_parent(bone, Some(root));
        let mixer = AnimationMixer::new(vec![root, bone]);
        (scene, bone, mixer)
    }

    fn translation(scene: &Scene, id: ObjectId) -> Vec3 {
        scene.get_object(id).unwrap().transform.translation()
    }

    #[test]
    fn clip_action_is_idempotent_per_name() {
        let (_, _, mut mixer) = setup();
        let a = mixer.clip_action(slide_clip("Walk", 1, Vec3::X));
        let b = mixer.clip_action(slide_clip("Walk", 1, Vec3::Y));

        assert_eq!(a, b);
        assert_eq!(mixer.actions().count(), 1);
    }

    #[test]
    fn playing_action_moves_bound_object() {
        let (mut scene, bone, mut mixer) = setup();
        mixer.clip_action(slide_clip("Walk", 1, Vec3::new(2.0, 0.0, 0.0)));
        assert!(mixer.play("Walk"));

        mixer.update(0.5, &mut scene);
        assert_eq!(translation(&scene, bone), Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn stopped_actions_do_not_animate() {
        let (mut scene, bone, mut mixer) = setup();
        mixer.clip_action(slide_clip("Walk", 1, Vec3::X));

        mixer.update(1.0, &mut scene);
        assert_eq!(translation(&scene, bone), Vec3::ZERO);
    }

    #[test]
    fn repeat_wraps_time() {
        let (mut scene, bone, mut mixer) = setup();
        let id = mixer.clip_action(slide_clip("Walk", 1, Vec3::new(2.0, 0.0, 0.0)));
        mixer.play("Walk");

        mixer.update(2.5, &mut scene);
        assert!((mixer.action(id).unwrap().time - 0.5).abs() < 1e-6);
        assert!(translation(&scene, bone).abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn once_clamps_to_final_pose_and_stops() {
        let (mut scene, bone, mut mixer) = setup();
        let id = mixer.clip_action(slide_clip("Jump", 1, Vec3::Y));
        mixer.action_mut(id).unwrap().loop_mode = LoopMode::Once;
        mixer.play("Jump");

        mixer.update(5.0, &mut scene);

        let action = mixer.action(id).unwrap();
        assert!(!action.is_running());
        assert_eq!(action.time, 2.0);
        assert_eq!(translation(&scene, bone), Vec3::Y);
    }

    #[test]
    fn pause_freezes_time_and_pose_until_resumed() {
        let (mut scene, bone, mut mixer) = setup();
        let id = mixer.clip_action(slide_clip("Walk", 1, Vec3::new(2.0, 0.0, 0.0)));
        mixer.play("Walk");
        mixer.update(0.5, &mut scene);

        mixer.action_mut(id).unwrap().pause();
        mixer.update(1.0, &mut scene);

        let action = mixer.action(id).unwrap();
        assert!(!action.is_running());
        assert_eq!(action.time, 0.5);
        assert_eq!(translation(&scene, bone), Vec3::new(0.5, 0.0, 0.0));

        mixer.action_mut(id).unwrap().play();
        mixer.update(0.25, &mut scene);

        assert_eq!(mixer.action(id).unwrap().time, 0.75);
        assert_eq!(translation(&scene, bone), Vec3::new(0.75, 0.0, 0.0));
    }

    #[test]
    fn stop_rewinds_and_releases_the_object() {
        let (mut scene, bone, mut mixer) = setup();
        let id = mixer.clip_action(slide_clip("Walk", 1, Vec3::new(2.0, 0.0, 0.0)));
        mixer.play("Walk");
        mixer.update(1.0, &mut scene);

        mixer.action_mut(id).unwrap().stop();
        scene.set_object_translation(bone, Vec3::Z);
        mixer.update(1.0, &mut scene);

        let action = mixer.action(id).unwrap();
        assert!(!action.is_running());
        assert_eq!(action.time, 0.0);
        // A stopped action no longer writes to the scene.
        assert_eq!(translation(&scene, bone), Vec3::Z);
    }

    #[test]
    fn replaying_a_finished_once_action_starts_over() {
        let (mut scene, bone, mut mixer) = setup();
        let id = mixer.clip_action(slide_clip("Jump", 1, Vec3::new(2.0, 0.0, 0.0)));
        mixer.action_mut(id).unwrap().loop_mode = LoopMode::Once;
        mixer.play("Jump");
        mixer.update(3.0, &mut scene);
        assert_eq!(mixer.action(id).unwrap().time, 2.0);

        mixer.play("Jump");
        mixer.update(0.5, &mut scene);

        let action = mixer.action(id).unwrap();
        assert!(action.is_running());
        assert_eq!(action.time, 0.5);
        assert_eq!(translation(&scene, bone), Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn missing_clip_is_reported_not_fatal() {
        let (_, _, mut mixer) = setup();
        assert!(!mixer.play("Armature.005Action"));
    }

    #[test]
    fn concurrent_actions_blend_by_weight() {
        let (mut scene, bone, mut mixer) = setup();
        mixer.clip_action(slide_clip("A", 1, Vec3::new(2.0, 0.0, 0.0)));
        let b = mixer.clip_action(slide_clip("B", 1, Vec3::new(0.0, 2.0, 0.0)));
        mixer.action_mut(b).unwrap().weight = 3.0;
        mixer.play("A");
        mixer.play("B");

        mixer.update(1.0, &mut scene);

        // A = (1, 0, 0) and B = (0, 1, 0), weighted 1:3.
        let t = translation(&scene, bone);
        assert!(t.abs_diff_eq(Vec3::new(0.25, 0.75, 0.0), 1e-4));
    }

    #[test]
    fn tracks_for_unbound_nodes_are_ignored() {
        let (mut scene, bone, mut mixer) = setup();
        mixer.clip_action(slide_clip("Ghost", 7, Vec3::X));
        mixer.play("Ghost");

        mixer.update(1.0, &mut scene);
        assert_eq!(translation(&scene, bone), Vec3::ZERO);
    }
}

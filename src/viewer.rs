use glam::Vec3;

use crate::{
    animation::AnimationMixer,
    asset::{
        loader::{AssetLoader, LoadEvent},
        material::MaterialData,
        progress::LoadProgress,
        LoadedAsset,
    },
    camera::PerspectiveCamera,
    config::{GroundSettings, ViewerConfig},
    controls::OrbitControls,
    lights::Light,
    scene_graph::{ground::plane_geometry, ObjectId, Scene, Transform},
};

/// Everything one scene preset owns: camera rig, stage, lights and the loading asset.
pub struct ViewerState {
    pub config: ViewerConfig,
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    pub scene: Scene,
    pub lights: Vec<Light>,
    pub ground: ObjectId,
    pub asset_root: Option<ObjectId>,
    pub mixer: Option<AnimationMixer>,
    pub progress: LoadProgress,
    loader: Option<AssetLoader>,
    pending_upload: bool,
}

impl ViewerState {
    pub fn new(config: ViewerConfig, aspect: f32) -> anyhow::Result<Self> {
        let mut camera = PerspectiveCamera::new(&config.camera, aspect);
        let mut controls = OrbitControls::new(config.controls.clone());
        camera.look_at(controls.target);
        controls.update(&mut camera, 0.0);

        let mut scene = Scene::new();
        let ground = spawn_ground(&mut scene, &config.ground);
        let lights = Light::from_settings(&config.lights);

        let loader = AssetLoader::spawn(config.asset_path())?;

        Ok(Self {
            config,
            camera,
            controls,
            scene,
            lights,
            ground,
            asset_root: None,
            mixer: None,
            progress: LoadProgress::default(),
            loader: Some(loader),
            pending_upload: true,
        })
    }

    /// Advances one frame: load events, animation, camera, world transforms.
    pub fn update(&mut self, dt: f32) {
        self.handle_load_events();

        if let Some(mixer) = &mut self.mixer {
            mixer.update(dt, &mut self.scene);
        }

        self.controls.update(&mut self.camera, dt);

        self.scene.late_update();
    }

    /// True once after new meshes or materials were added to the scene.
    pub fn take_pending_upload(&mut self) -> bool {
        std::mem::take(&mut self.pending_upload)
    }

    fn handle_load_events(&mut self) {
        let Some(loader) = &self.loader else {
            return;
        };

        for event in loader.poll() {
            match event {
                LoadEvent::Progress { loaded, total } => self.progress.update(loaded, total),
                LoadEvent::Loaded(asset) => {
                    self.on_loaded(*asset);
                    self.loader = None;
                }
                LoadEvent::Failed(error) => {
                    log::error!("An error happened: {:#}", error);
                    self.progress.fail(format!("{:#}", error));
                    self.loader = None;
                }
            }
        }
    }

    fn on_loaded(&mut self, mut asset: LoadedAsset) {
        let clips = std::mem::take(&mut asset.clips);
        let root_transform = Transform::from_translation(self.config.asset.position);
        let spawned = self.scene.spawn_asset(&mut asset, root_transform);

        let cast_shadow = self.config.asset.cast_shadow;
        let receive_shadow = self.config.asset.receive_shadow;
        self.scene.traverse(spawned.root, &mut |object| {
            if object.model_id.is_some() {
                object.cast_shadow = cast_shadow;
                object.receive_shadow = receive_shadow;
            }
        });

        log::info!(
            "Loaded {} ({} nodes, {} clips)",
            asset.name,
            spawned.nodes.len(),
            clips.len()
        );

        if !clips.is_empty() {
            let mut mixer = AnimationMixer::new(spawned.nodes);
            for clip in clips {
                mixer.clip_action(clip);
            }
            for name in &self.config.animation.autoplay {
                mixer.play(name);
            }
            self.mixer = Some(mixer);
        } else if !self.config.animation.autoplay.is_empty() {
            log::warn!("{} has no animations to play", asset.name);
        }

        self.asset_root = Some(spawned.root);
        self.progress.finish();
        self.pending_upload = true;
    }
}

fn spawn_ground(scene: &mut Scene, settings: &GroundSettings) -> ObjectId {
    let model = plane_geometry(
        settings.width,
        settings.depth,
        settings.width_segments,
        settings.depth_segments,
    );
    let material = scene.add_material(MaterialData::solid(
        "Ground",
        settings.color,
        settings.double_sided,
    ));
    let ground = scene.add_mesh_object(
        "Ground",
        model,
        material,
        Transform::from_translation(Vec3::new(0.0, settings.y, 0.0)),
    );

    if let Some(object) = scene.get_object_mut(ground) {
        object.cast_shadow = settings.cast_shadow;
        object.receive_shadow = settings.receive_shadow;
    }

    ground
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        time::{Duration, Instant},
    };

    use super::*;
    use crate::{asset::test_asset, config::Preset};

    fn config_for(preset: Preset, asset: &Path) -> ViewerConfig {
        let mut config = ViewerConfig::preset(preset);
        config.asset.directory = asset.parent().map(PathBuf::from).unwrap_or_default();
        config.asset.file_name = asset.file_name().unwrap().to_string_lossy().into_owned();
        config
    }

    fn wait_until_settled(state: &mut ViewerState) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while matches!(
            state.progress,
            LoadProgress::Pending | LoadProgress::Loading { .. }
        ) {
            assert!(Instant::now() < deadline, "asset never finished loading");
            std::thread::sleep(Duration::from_millis(5));
            state.update(0.0);
        }
    }

    #[test]
    fn stage_is_built_before_the_asset_arrives() {
        let config = config_for(Preset::Table, Path::new("missing/table.gltf"));
        let mut state = ViewerState::new(config, 1.5).unwrap();

        let ground = state.scene.get_object(state.ground).unwrap();
        assert!(ground.receive_shadow);
        assert!(!ground.cast_shadow);
        assert_eq!(ground.transform.translation(), Vec3::new(0.0, -8.0, 0.0));
        assert!(state.take_pending_upload());
        assert!(!state.take_pending_upload());

        let distance = state.controls.distance(&state.camera);
        assert!((5.0..=20.0).contains(&distance));
    }

    #[test]
    fn load_failure_keeps_indicator_visible() {
        let config = config_for(Preset::Table, Path::new("missing/table.gltf"));
        let mut state = ViewerState::new(config, 1.5).unwrap();

        wait_until_settled(&mut state);

        assert!(matches!(state.progress, LoadProgress::Failed(_)));
        assert!(state.progress.is_visible());
        assert!(state.asset_root.is_none());
        assert!(state.mixer.is_none());
    }

    #[test]
    fn loaded_asset_is_placed_shadowed_and_animated() {
        let path = test_asset::write_fixture("viewer-spider");
        let mut state = ViewerState::new(config_for(Preset::Spider, &path), 1.5).unwrap();
        state.take_pending_upload();

        wait_until_settled(&mut state);
        test_asset::cleanup(&path);

        assert_eq!(state.progress, LoadProgress::Done);
        assert!(!state.progress.is_visible());
        assert!(state.take_pending_upload());

        let root = state.scene.get_object(state.asset_root.unwrap()).unwrap();
        assert_eq!(root.transform.translation(), Vec3::new(0.0, 1.05, -1.0));

        let spider = state.scene.get_object_by_name("Spider").unwrap();
        let spider = state.scene.get_object(spider).unwrap();
        assert!(spider.cast_shadow && spider.receive_shadow);

        // Only one of the six configured clips exists in the file.
        let mixer = state.mixer.as_ref().unwrap();
        let playing = mixer.actions().filter(|action| action.is_running()).count();
        assert_eq!(playing, 1);

        state.update(0.5);
        let bone = state.scene.get_object_by_name("Bone").unwrap();
        let bone = state.scene.get_object(bone).unwrap();
        assert!(bone
            .transform
            .translation()
            .abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
    }
}

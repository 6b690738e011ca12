use std::{path::PathBuf, str::FromStr};

use anyhow::Context;
use glam::Vec3;

/// Converts an sRGB `0xRRGGBB` colour into linear RGB.
pub fn rgb_hex(hex: u32) -> Vec3 {
    fn channel(value: u32) -> f32 {
        let c = (value & 0xff) as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }

    Vec3::new(channel(hex >> 16), channel(hex >> 8), channel(hex))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Table,
    Spider,
}

impl FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Preset::Table),
            "spider" => Ok(Preset::Spider),
            other => anyhow::bail!("Unknown preset '{}', expected 'table' or 'spider'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub clear_color: wgpu::Color,
    pub msaa_samples: u32,
    pub shadows: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: wgpu::Color::BLACK,
            msaa_samples: 4,
            shadows: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            near: 1.0,
            far: 1000.0,
            position: Vec3::new(4.0, 5.0, 11.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_pan: bool,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub auto_rotate: bool,
    pub auto_rotate_speed: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub target: Vec3,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            enable_damping: true,
            damping_factor: 0.05,
            enable_pan: false,
            min_distance: 5.0,
            max_distance: 20.0,
            min_polar_angle: 0.5,
            max_polar_angle: 1.5,
            auto_rotate: false,
            auto_rotate_speed: 2.0,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            target: Vec3::new(0.0, 1.0, 0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroundSettings {
    pub width: f32,
    pub depth: f32,
    pub width_segments: u32,
    pub depth_segments: u32,
    pub color: Vec3,
    pub y: f32,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub double_sided: bool,
}

impl Default for GroundSettings {
    fn default() -> Self {
        Self {
            width: 20.0,
            depth: 20.0,
            width_segments: 32,
            depth_segments: 32,
            color: rgb_hex(0x555555),
            y: -8.0,
            cast_shadow: false,
            receive_shadow: true,
            double_sided: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ShadowCamera {
    /// Perspective frustum derived from the spot cone.
    Spot,
    Orthographic {
        half_extent: f32,
        near: f32,
        far: f32,
    },
}

#[derive(Debug, Clone)]
pub struct ShadowSettings {
    pub bias: f32,
    pub map_size: u32,
    pub camera: ShadowCamera,
}

#[derive(Debug, Clone)]
pub enum LightSettings {
    Spot {
        color: Vec3,
        intensity: f32,
        distance: f32,
        angle: f32,
        penumbra: f32,
        decay: f32,
        position: Vec3,
        target: Vec3,
        visible: bool,
        cast_shadow: bool,
        shadow: ShadowSettings,
    },
    Hemisphere {
        sky_color: Vec3,
        ground_color: Vec3,
        intensity: f32,
        position: Vec3,
        visible: bool,
    },
    Directional {
        color: Vec3,
        intensity: f32,
        position: Vec3,
        target: Vec3,
        visible: bool,
        cast_shadow: bool,
        shadow: ShadowSettings,
    },
}

#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub directory: PathBuf,
    pub file_name: String,
    pub position: Vec3,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AnimationSettings {
    /// Clips started right after the asset finishes loading.
    pub autoplay: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub preset: Preset,
    pub renderer: RendererSettings,
    pub camera: CameraSettings,
    pub controls: ControlSettings,
    pub ground: GroundSettings,
    pub lights: Vec<LightSettings>,
    pub asset: AssetSettings,
    pub animation: AnimationSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::preset(Preset::Table)
    }
}

impl ViewerConfig {
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Table => Self::table(),
            Preset::Spider => Self::spider(),
        }
    }

    fn table() -> Self {
        Self {
            preset: Preset::Table,
            renderer: RendererSettings::default(),
            camera: CameraSettings::default(),
            controls: ControlSettings::default(),
            ground: GroundSettings::default(),
            lights: vec![LightSettings::Spot {
                color: Vec3::ONE,
                intensity: 3.0,
                distance: 100.0,
                angle: 0.22,
                penumbra: 1.0,
                decay: 2.0,
                position: Vec3::new(0.0, 25.0, 0.0),
                target: Vec3::ZERO,
                visible: true,
                cast_shadow: true,
                shadow: ShadowSettings {
                    bias: -0.0001,
                    map_size: 512,
                    camera: ShadowCamera::Spot,
                },
            }],
            asset: AssetSettings {
                directory: PathBuf::from("table"),
                file_name: "table.gltf".to_string(),
                position: Vec3::new(0.0, 1.05, -1.0),
                cast_shadow: true,
                receive_shadow: true,
            },
            animation: AnimationSettings::default(),
        }
    }

    fn spider() -> Self {
        let autoplay = std::iter::once("ArmatureAction".to_string())
            .chain((1..=5).map(|i| format!("Armature.{:03}Action", i)))
            .collect();

        Self {
            preset: Preset::Spider,
            renderer: RendererSettings::default(),
            camera: CameraSettings::default(),
            controls: ControlSettings {
                min_distance: 250.0,
                max_distance: 20.0,
                ..Default::default()
            },
            ground: GroundSettings {
                width: 20000.0,
                depth: 200000.0,
                y: 0.0,
                cast_shadow: true,
                receive_shadow: false,
                ..Default::default()
            },
            lights: vec![
                LightSettings::Hemisphere {
                    sky_color: Vec3::ONE,
                    ground_color: Vec3::ZERO,
                    intensity: 1.0,
                    position: Vec3::new(0.0, 50.0, 0.0),
                    visible: false,
                },
                LightSettings::Directional {
                    color: Vec3::ONE,
                    intensity: 3.0,
                    position: Vec3::new(5.0, 10.0, 7.5),
                    target: Vec3::ZERO,
                    visible: true,
                    cast_shadow: false,
                    shadow: ShadowSettings {
                        bias: 0.0,
                        map_size: 2048,
                        camera: ShadowCamera::Orthographic {
                            half_extent: 50.0,
                            near: 0.5,
                            far: 500.0,
                        },
                    },
                },
            ],
            asset: AssetSettings {
                directory: PathBuf::from("spider"),
                file_name: "spiderr.gltf".to_string(),
                position: Vec3::new(0.0, 1.05, -1.0),
                cast_shadow: true,
                receive_shadow: true,
            },
            animation: AnimationSettings { autoplay },
        }
    }

    pub fn asset_path(&self) -> PathBuf {
        self.asset.directory.join(&self.asset.file_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub preset: Preset,
    pub asset: Option<PathBuf>,
    pub msaa_samples: Option<u32>,
    pub window_size: (u32, u32),
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            preset: Preset::Table,
            asset: None,
            msaa_samples: None,
            window_size: (1280, 720),
        }
    }
}

impl CliArgs {
    /// Parses `--flag=value` style arguments. The first item (program name) is skipped.
    pub fn parse<I, S>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cli = CliArgs::default();

        for arg in args.into_iter().skip(1) {
            let arg = arg.as_ref();

            if let Some(value) = arg.strip_prefix("--preset=") {
                cli.preset = value.parse()?;
            } else if let Some(value) = arg.strip_prefix("--asset=") {
                cli.asset = Some(PathBuf::from(value));
            } else if let Some(value) = arg.strip_prefix("--msaa=") {
                let samples = value
                    .parse::<u32>()
                    .with_context(|| format!("Invalid --msaa value '{}'", value))?;
                if samples != 1 && samples != 4 {
                    anyhow::bail!("--msaa must be 1 or 4, got {}", samples);
                }
                cli.msaa_samples = Some(samples);
            } else if let Some(value) = arg.strip_prefix("--size=") {
                let (w, h) = value
                    .split_once('x')
                    .or_else(|| value.split_once('X'))
                    .with_context(|| format!("Invalid --size value '{}', expected WxH", value))?;
                let w = w.parse::<u32>().context("Invalid window width")?;
                let h = h.parse::<u32>().context("Invalid window height")?;
                cli.window_size = (w.max(1), h.max(1));
            } else {
                log::warn!("Ignoring unknown argument '{}'", arg);
            }
        }

        Ok(cli)
    }

    pub fn to_config(&self) -> ViewerConfig {
        let mut config = ViewerConfig::preset(self.preset);

        if let Some(asset) = &self.asset {
            config.asset.directory = asset
                .parent()
                .map(PathBuf::from)
                .unwrap_or_default();
            config.asset.file_name = asset
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        if let Some(samples) = self.msaa_samples {
            config.renderer.msaa_samples = samples;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_preset_matches_scene_constants() {
        let config = ViewerConfig::preset(Preset::Table);

        assert_eq!(config.controls.min_distance, 5.0);
        assert_eq!(config.controls.max_distance, 20.0);
        assert_eq!(config.ground.y, -8.0);
        assert!(!config.ground.cast_shadow);
        assert!(config.ground.receive_shadow);
        assert_eq!(config.asset_path(), PathBuf::from("table").join("table.gltf"));
        assert!(config.animation.autoplay.is_empty());
        assert!(matches!(
            config.lights.as_slice(),
            [LightSettings::Spot { cast_shadow: true, .. }]
        ));
    }

    #[test]
    fn spider_preset_plays_six_clips() {
        let config = ViewerConfig::preset(Preset::Spider);

        assert_eq!(
            config.animation.autoplay,
            vec![
                "ArmatureAction",
                "Armature.001Action",
                "Armature.002Action",
                "Armature.003Action",
                "Armature.004Action",
                "Armature.005Action",
            ]
        );
        assert_eq!(config.ground.width, 20000.0);
        assert_eq!(config.ground.depth, 200000.0);
        assert!(matches!(
            config.lights[0],
            LightSettings::Hemisphere { visible: false, .. }
        ));
    }

    #[test]
    fn rgb_hex_converts_to_linear() {
        let red = rgb_hex(0xff0000);
        assert!((red.x - 1.0).abs() < 1e-5);
        assert_eq!(red.y, 0.0);
        assert_eq!(red.z, 0.0);

        let grey = rgb_hex(0x555555);
        assert!((grey.x - 0.0908).abs() < 1e-3);
        assert_eq!(grey.x, grey.y);
        assert_eq!(grey.y, grey.z);
    }

    #[test]
    fn cli_overrides_preset_and_asset() {
        let cli = CliArgs::parse([
            "stagehand",
            "--preset=spider",
            "--asset=models/robot/robot.glb",
            "--msaa=1",
            "--size=800x600",
        ])
        .unwrap();

        assert_eq!(cli.preset, Preset::Spider);
        assert_eq!(cli.window_size, (800, 600));

        let config = cli.to_config();
        assert_eq!(config.renderer.msaa_samples, 1);
        assert_eq!(
            config.asset_path(),
            PathBuf::from("models/robot").join("robot.glb")
        );
        assert_eq!(config.animation.autoplay.len(), 6);
    }

    #[test]
    fn cli_rejects_bad_values() {
        assert!(CliArgs::parse(["stagehand", "--preset=garden"]).is_err());
        assert!(CliArgs::parse(["stagehand", "--msaa=3"]).is_err());
        assert!(CliArgs::parse(["stagehand", "--size=wide"]).is_err());
    }

    #[test]
    fn cli_ignores_unknown_flags() {
        let cli = CliArgs::parse(["stagehand", "--fullscreen"]).unwrap();
        assert_eq!(cli, CliArgs::default());
    }
}

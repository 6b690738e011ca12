use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4, Vec3, Vec4};

use crate::config::{LightSettings, ShadowCamera, ShadowSettings};

pub const MAX_PUNCTUAL_LIGHTS: usize = 4;

const LIGHT_KIND_DIRECTIONAL: u32 = 1;
const LIGHT_KIND_SPOT: u32 = 2;

// Shadow camera defaults for lights without explicit extents.
const SHADOW_NEAR: f32 = 0.5;
const SHADOW_FAR: f32 = 500.0;
const DEFAULT_ORTHO_HALF_EXTENT: f32 = 5.0;

#[derive(Debug, Clone)]
pub enum Light {
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
        shadow: Option<ShadowSettings>,
    },
    Spot {
        color: Vec3,
        intensity: f32,
        /// Cut-off range. Zero means unlimited.
        distance: f32,
        /// Outer cone half-angle in radians.
        angle: f32,
        penumbra: f32,
        decay: f32,
        position: Vec3,
        target: Vec3,
        visible: bool,
        shadow: Option<ShadowSettings>,
    },
}

impl From<&LightSettings> for Light {
    fn from(settings: &LightSettings) -> Self {
        match settings.clone() {
            LightSettings::Hemisphere {
                sky_color,
                ground_color,
                intensity,
                position,
                visible,
            } => Light::Hemisphere {
                sky_color,
                ground_color,
                intensity,
                position,
                visible,
            },
            LightSettings::Directional {
                color,
                intensity,
                position,
                target,
                visible,
                cast_shadow,
                shadow,
            } => Light::Directional {
                color,
                intensity,
                position,
                target,
                visible,
                shadow: cast_shadow.then_some(shadow),
            },
            LightSettings::Spot {
                color,
                intensity,
                distance,
                angle,
                penumbra,
                decay,
                position,
                target,
                visible,
                cast_shadow,
                shadow,
            } => Light::Spot {
                color,
                intensity,
                distance,
                angle,
                penumbra,
                decay,
                position,
                target,
                visible,
                shadow: cast_shadow.then_some(shadow),
            },
        }
    }
}

impl Light {
    pub fn from_settings(settings: &[LightSettings]) -> Vec<Light> {
        settings.iter().map(Light::from).collect()
    }

    pub fn is_visible(&self) -> bool {
        match self {
            Light::Hemisphere { visible, .. }
            | Light::Directional { visible, .. }
            | Light::Spot { visible, .. } => *visible,
        }
    }

    fn shadow(&self) -> Option<&ShadowSettings> {
        match self {
            Light::Hemisphere { .. } => None,
            Light::Directional { shadow, .. } | Light::Spot { shadow, .. } => shadow.as_ref(),
        }
    }
}

/// The light whose depth map is rendered this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCaster {
    pub view_proj: Mat4,
    pub bias: f32,
    pub map_size: u32,
}

/// First visible light with shadows enabled.
pub fn shadow_caster(lights: &[Light]) -> Option<ShadowCaster> {
    let light = lights
        .iter()
        .find(|light| light.is_visible() && light.shadow().is_some())?;
    let shadow = light.shadow()?;

    let (position, target, projection) = match light {
        Light::Spot {
            position,
            target,
            angle,
            distance,
            ..
        } => {
            let projection = match shadow.camera {
                ShadowCamera::Spot => {
                    let far = if *distance > 0.0 { *distance } else { SHADOW_FAR };
                    Mat4::perspective_rh(2.0 * angle, 1.0, SHADOW_NEAR, far)
                }
                ShadowCamera::Orthographic {
                    half_extent,
                    near,
                    far,
                } => orthographic(half_extent, near, far),
            };
            (*position, *target, projection)
        }
        Light::Directional {
            position, target, ..
        } => {
            let projection = match shadow.camera {
                ShadowCamera::Orthographic {
                    half_extent,
                    near,
                    far,
                } => orthographic(half_extent, near, far),
                ShadowCamera::Spot => {
                    orthographic(DEFAULT_ORTHO_HALF_EXTENT, SHADOW_NEAR, SHADOW_FAR)
                }
            };
            (*position, *target, projection)
        }
        Light::Hemisphere { .. } => return None,
    };

    let view = Mat4::look_at_rh(position, target, light_up(target - position));

    Some(ShadowCaster {
        view_proj: projection * view,
        bias: shadow.bias,
        map_size: shadow.map_size,
    })
}

fn orthographic(half_extent: f32, near: f32, far: f32) -> Mat4 {
    Mat4::orthographic_rh(
        -half_extent,
        half_extent,
        -half_extent,
        half_extent,
        near,
        far,
    )
}

// `look_at` degenerates when looking straight along +Y/-Y.
fn light_up(direction: Vec3) -> Vec3 {
    if direction.normalize_or_zero().dot(Vec3::Y).abs() > 0.999 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, Default)]
pub struct PunctualLightUniform {
    /// xyz: position, w: kind (0 = unused).
    position: Vec4,
    /// xyz: direction the light travels, w: cut-off distance.
    direction: Vec4,
    /// rgb: color * intensity, w: decay.
    color: Vec4,
    /// x: cos(outer angle), y: cos(inner angle).
    cone: Vec4,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, Default)]
pub struct LightsUniform {
    hemisphere_sky: Vec4,
    hemisphere_ground: Vec4,
    /// xyz: sky direction, w: 1 when the hemisphere light is active.
    hemisphere_up: Vec4,
    shadow_view_proj: Mat4,
    /// x: bias, y: 1 when shadows are enabled, z: 1 / map size, w: index of the casting light.
    shadow_params: Vec4,
    /// x: number of punctual lights.
    counts: UVec4,
    lights: [PunctualLightUniform; MAX_PUNCTUAL_LIGHTS],
}

impl LightsUniform {
    pub fn from_lights(lights: &[Light]) -> Self {
        let mut uniform = LightsUniform::default();
        let mut count = 0;
        let mut shadow_index = None;

        for light in lights.iter().filter(|light| light.is_visible()) {
            match light {
                Light::Hemisphere {
                    sky_color,
                    ground_color,
                    intensity,
                    position,
                    ..
                } => {
                    uniform.hemisphere_sky = (*sky_color * *intensity).extend(1.0);
                    uniform.hemisphere_ground = (*ground_color * *intensity).extend(1.0);
                    uniform.hemisphere_up = position.normalize_or(Vec3::Y).extend(1.0);
                }
                punctual => {
                    if count == MAX_PUNCTUAL_LIGHTS {
                        log::warn!(
                            "Only {} punctual lights are supported, ignoring the rest",
                            MAX_PUNCTUAL_LIGHTS
                        );
                        break;
                    }
                    if shadow_index.is_none() && punctual.shadow().is_some() {
                        shadow_index = Some(count);
                    }
                    uniform.lights[count] = PunctualLightUniform::from_light(punctual);
                    count += 1;
                }
            }
        }

        uniform.counts = UVec4::new(count as u32, 0, 0, 0);
        uniform.shadow_params.w = shadow_index.unwrap_or(0) as f32;
        uniform
    }

    pub fn set_shadow(&mut self, caster: Option<&ShadowCaster>) {
        match caster {
            Some(caster) => {
                self.shadow_view_proj = caster.view_proj;
                self.shadow_params = Vec4::new(
                    caster.bias,
                    1.0,
                    1.0 / caster.map_size.max(1) as f32,
                    self.shadow_params.w,
                );
            }
            None => {
                self.shadow_view_proj = Mat4::IDENTITY;
                self.shadow_params.x = 0.0;
                self.shadow_params.y = 0.0;
                self.shadow_params.z = 0.0;
            }
        }
    }

    pub fn light_count(&self) -> u32 {
        self.counts.x
    }

    pub fn hemisphere_enabled(&self) -> bool {
        self.hemisphere_up.w > 0.0
    }
}

impl PunctualLightUniform {
    fn from_light(light: &Light) -> Self {
        match light {
            Light::Directional {
                color,
                intensity,
                position,
                target,
                ..
            } => Self {
                position: position.extend(LIGHT_KIND_DIRECTIONAL as f32),
                direction: (*target - *position).normalize_or(Vec3::NEG_Y).extend(0.0),
                color: (*color * *intensity).extend(0.0),
                cone: Vec4::ZERO,
            },
            Light::Spot {
                color,
                intensity,
                distance,
                angle,
                penumbra,
                decay,
                position,
                target,
                ..
            } => Self {
                position: position.extend(LIGHT_KIND_SPOT as f32),
                direction: (*target - *position)
                    .normalize_or(Vec3::NEG_Y)
                    .extend(*distance),
                color: (*color * *intensity).extend(*decay),
                cone: Vec4::new(angle.cos(), (angle * (1.0 - penumbra)).cos(), 0.0, 0.0),
            },
            Light::Hemisphere { .. } => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Preset, ViewerConfig};

    fn preset_lights(preset: Preset) -> Vec<Light> {
        Light::from_settings(&ViewerConfig::preset(preset).lights)
    }

    #[test]
    fn table_spot_light_is_packed() {
        let uniform = LightsUniform::from_lights(&preset_lights(Preset::Table));

        assert_eq!(uniform.light_count(), 1);
        assert!(!uniform.hemisphere_enabled());

        let spot = uniform.lights[0];
        assert_eq!(spot.position, Vec4::new(0.0, 25.0, 0.0, LIGHT_KIND_SPOT as f32));
        assert!(spot.direction.truncate().abs_diff_eq(Vec3::NEG_Y, 1e-6));
        assert_eq!(spot.direction.w, 100.0);
        assert_eq!(spot.color, Vec4::new(3.0, 3.0, 3.0, 2.0));
        // Full penumbra puts the inner cone on the axis.
        assert!((spot.cone.x - 0.22f32.cos()).abs() < 1e-6);
        assert_eq!(spot.cone.y, 1.0);
    }

    #[test]
    fn invisible_lights_are_skipped() {
        let uniform = LightsUniform::from_lights(&preset_lights(Preset::Spider));

        assert!(!uniform.hemisphere_enabled());
        assert_eq!(uniform.light_count(), 1);
        assert_eq!(
            uniform.lights[0].position.w,
            LIGHT_KIND_DIRECTIONAL as f32
        );
    }

    #[test]
    fn hemisphere_light_scales_colors() {
        let lights = [Light::Hemisphere {
            sky_color: Vec3::ONE,
            ground_color: Vec3::new(0.5, 0.0, 0.0),
            intensity: 2.0,
            position: Vec3::new(0.0, 50.0, 0.0),
            visible: true,
        }];
        let uniform = LightsUniform::from_lights(&lights);

        assert!(uniform.hemisphere_enabled());
        assert_eq!(uniform.hemisphere_sky, Vec4::new(2.0, 2.0, 2.0, 1.0));
        assert_eq!(uniform.hemisphere_ground, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(uniform.hemisphere_up.truncate(), Vec3::Y);
    }

    #[test]
    fn extra_punctual_lights_are_dropped() {
        let light = Light::Directional {
            color: Vec3::ONE,
            intensity: 1.0,
            position: Vec3::Y,
            target: Vec3::ZERO,
            visible: true,
            shadow: None,
        };
        let lights = vec![light; MAX_PUNCTUAL_LIGHTS + 2];

        assert_eq!(
            LightsUniform::from_lights(&lights).light_count(),
            MAX_PUNCTUAL_LIGHTS as u32
        );
    }

    #[test]
    fn spot_shadow_looks_down_the_cone() {
        let caster = shadow_caster(&preset_lights(Preset::Table)).unwrap();
        assert_eq!(caster.map_size, 512);
        assert_eq!(caster.bias, -0.0001);

        let origin = caster.view_proj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = origin.truncate() / origin.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);

        // Outside the 0.22 rad cone.
        let outside = caster.view_proj * Vec4::new(10.0, 0.0, 0.0, 1.0);
        assert!((outside.x / outside.w).abs() > 1.0);
    }

    #[test]
    fn non_casting_lights_produce_no_shadow() {
        assert!(shadow_caster(&preset_lights(Preset::Spider)).is_none());
    }

    #[test]
    fn directional_shadow_uses_orthographic_extents() {
        let mut settings = ViewerConfig::preset(Preset::Spider).lights;
        if let LightSettings::Directional { cast_shadow, .. } = &mut settings[1] {
            *cast_shadow = true;
        }
        let caster = shadow_caster(&Light::from_settings(&settings)).unwrap();
        assert_eq!(caster.map_size, 2048);

        let target = caster.view_proj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((target.w - 1.0).abs() < 1e-6);
        assert!(target.x.abs() < 1e-5 && target.y.abs() < 1e-5);

        let outside = caster.view_proj * Vec4::new(100.0, 0.0, 0.0, 1.0);
        assert!(outside.x.abs() > 1.0);
    }

    #[test]
    fn shadow_uniform_toggles() {
        let lights = preset_lights(Preset::Table);
        let caster = shadow_caster(&lights);

        let mut uniform = LightsUniform::from_lights(&lights);
        uniform.set_shadow(caster.as_ref());
        assert_eq!(uniform.shadow_params.y, 1.0);
        assert_eq!(uniform.shadow_params.z, 1.0 / 512.0);

        uniform.set_shadow(None);
        assert_eq!(uniform.shadow_params.y, 0.0);
    }

    #[test]
    fn shadow_index_points_at_casting_light() {
        let fill = Light::Directional {
            color: Vec3::ONE,
            intensity: 1.0,
            position: Vec3::X,
            target: Vec3::ZERO,
            visible: true,
            shadow: None,
        };
        let mut lights = vec![fill.clone(), fill];
        lights.extend(preset_lights(Preset::Table));

        let uniform = LightsUniform::from_lights(&lights);
        assert_eq!(uniform.light_count(), 3);
        assert_eq!(uniform.shadow_params.w, 2.0);
    }
}

use std::f32::consts::PI;

use glam::{Vec2, Vec3};
use winit::event::{ElementState, MouseButton, MouseScrollDelta};

use crate::{camera::PerspectiveCamera, config::ControlSettings};

const EPS: f32 = 0.000001;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Spherical {
    radius: f32,
    /// Polar angle from +Y.
    phi: f32,
    /// Azimuth around +Y, measured from +Z.
    theta: f32,
}

impl Spherical {
    fn from_vector(v: Vec3) -> Self {
        let radius = v.length();
        if radius == 0.0 {
            return Self {
                radius,
                phi: 0.0,
                theta: 0.0,
            };
        }

        Self {
            radius,
            theta: v.x.atan2(v.z),
            phi: (v.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    fn to_vector(self) -> Vec3 {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vec3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragState {
    None,
    Rotate,
    Pan,
}

/// Mouse-driven orbit around a target point, with optional damping.
pub struct OrbitControls {
    pub settings: ControlSettings,
    pub target: Vec3,

    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    pan_offset: Vec3,

    drag: DragState,
    last_cursor: Option<Vec2>,
}

impl OrbitControls {
    pub fn new(settings: ControlSettings) -> Self {
        if settings.min_distance > settings.max_distance {
            log::warn!(
                "Orbit min distance {} exceeds max distance {}; the camera stays at {}",
                settings.min_distance,
                settings.max_distance,
                settings.min_distance
            );
        }

        Self {
            target: settings.target,
            settings,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
            drag: DragState::None,
            last_cursor: None,
        }
    }

    pub fn on_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        let pressed = state == ElementState::Pressed;

        self.drag = match (button, pressed) {
            (MouseButton::Left, true) => DragState::Rotate,
            (MouseButton::Right, true) if self.settings.enable_pan => DragState::Pan,
            (MouseButton::Left | MouseButton::Right, false) => DragState::None,
            _ => self.drag,
        };
    }

    /// `viewport_height` is in the same units as `position`.
    pub fn on_cursor_moved(
        &mut self,
        position: Vec2,
        viewport_height: f32,
        camera: &PerspectiveCamera,
    ) {
        let last = self.last_cursor.replace(position);
        let Some(last) = last else {
            return;
        };
        if viewport_height <= 0.0 {
            return;
        }

        let delta = position - last;

        match self.drag {
            DragState::Rotate => {
                let speed = self.settings.rotate_speed;
                self.rotate_left(2.0 * PI * delta.x / viewport_height * speed);
                self.rotate_up(2.0 * PI * delta.y / viewport_height * speed);
            }
            DragState::Pan => self.pan(delta * self.settings.pan_speed, viewport_height, camera),
            DragState::None => {}
        }
    }

    pub fn on_scroll(&mut self, delta: &MouseScrollDelta) {
        let amount = match delta {
            MouseScrollDelta::LineDelta(_, y) => *y,
            MouseScrollDelta::PixelDelta(position) => position.y as f32,
        };

        let zoom_scale = 0.95f32.powf(self.settings.zoom_speed);
        if amount > 0.0 {
            self.scale *= zoom_scale;
        } else if amount < 0.0 {
            self.scale /= zoom_scale;
        }
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.delta_theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.delta_phi -= angle;
    }

    fn pan(&mut self, delta: Vec2, viewport_height: f32, camera: &PerspectiveCamera) {
        if !self.settings.enable_pan {
            return;
        }

        let offset = camera.position - self.target;
        let target_distance = offset.length() * (camera.fov_y * 0.5).tan();

        let view = camera.view_matrix().inverse();
        let right = view.x_axis.truncate();
        let up = view.y_axis.truncate();

        self.pan_offset += right * (-2.0 * delta.x * target_distance / viewport_height);
        self.pan_offset += up * (2.0 * delta.y * target_distance / viewport_height);
    }

    /// Moves the camera. Returns whether it moved noticeably.
    pub fn update(&mut self, camera: &mut PerspectiveCamera, dt: f32) -> bool {
        let settings = &self.settings;
        let previous_position = camera.position;

        let mut spherical = Spherical::from_vector(camera.position - self.target);

        if settings.auto_rotate && self.drag == DragState::None {
            let angle = 2.0 * PI / 60.0 * settings.auto_rotate_speed * dt;
            self.delta_theta -= angle;
        }

        if settings.enable_damping {
            spherical.theta += self.delta_theta * settings.damping_factor;
            spherical.phi += self.delta_phi * settings.damping_factor;
        } else {
            spherical.theta += self.delta_theta;
            spherical.phi += self.delta_phi;
        }

        spherical.phi = spherical
            .phi
            .max(settings.min_polar_angle)
            .min(settings.max_polar_angle);
        spherical.phi = spherical.phi.clamp(EPS, PI - EPS);

        spherical.radius *= self.scale;
        // Same order as the min/max pair is applied on the web: the minimum wins if inverted.
        spherical.radius = settings
            .min_distance
            .max(settings.max_distance.min(spherical.radius));

        if settings.enable_damping {
            self.target += self.pan_offset * settings.damping_factor;
        } else {
            self.target += self.pan_offset;
        }

        camera.position = self.target + spherical.to_vector();
        camera.look_at(self.target);

        if settings.enable_damping {
            let decay = 1.0 - settings.damping_factor;
            self.delta_theta *= decay;
            self.delta_phi *= decay;
            self.pan_offset *= decay;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vec3::ZERO;
        }

        self.scale = 1.0;

        previous_position.distance_squared(camera.position) > EPS
    }

    pub fn distance(&self, camera: &PerspectiveCamera) -> f32 {
        camera.position.distance(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraSettings, Preset, ViewerConfig};

    fn setup(preset: Preset) -> (OrbitControls, PerspectiveCamera) {
        let config = ViewerConfig::preset(preset);
        let camera = PerspectiveCamera::new(&config.camera, 1.5);
        (OrbitControls::new(config.controls), camera)
    }

    fn polar(controls: &OrbitControls, camera: &PerspectiveCamera) -> f32 {
        Spherical::from_vector(camera.position - controls.target).phi
    }

    fn azimuth(controls: &OrbitControls, camera: &PerspectiveCamera) -> f32 {
        Spherical::from_vector(camera.position - controls.target).theta
    }

    #[test]
    fn spherical_round_trips() {
        let v = Vec3::new(4.0, 4.0, 11.0);
        assert!(Spherical::from_vector(v).to_vector().abs_diff_eq(v, 1e-5));
    }

    #[test]
    fn first_update_keeps_initial_view_within_limits() {
        let (mut controls, mut camera) = setup(Preset::Table);
        controls.update(&mut camera, 1.0 / 60.0);

        assert!((controls.distance(&camera) - 153f32.sqrt()).abs() < 1e-4);
        assert_eq!(camera.target, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn inverted_distance_limits_pin_camera_to_minimum() {
        let (mut controls, mut camera) = setup(Preset::Spider);
        controls.update(&mut camera, 1.0 / 60.0);

        assert!((controls.distance(&camera) - 250.0).abs() < 1e-3);
    }

    #[test]
    fn polar_angle_is_clamped() {
        let (mut controls, mut camera) = setup(Preset::Table);
        camera.position = Vec3::new(0.0, 13.0, 0.0);
        controls.update(&mut camera, 0.0);
        assert!((polar(&controls, &camera) - 0.5).abs() < 1e-5);

        camera.position = Vec3::new(0.0, -11.0, 0.01);
        controls.update(&mut camera, 0.0);
        assert!((polar(&controls, &camera) - 1.5).abs() < 1e-5);
    }

    #[test]
    fn scroll_dollies_and_clamps() {
        let (mut controls, mut camera) = setup(Preset::Table);
        controls.update(&mut camera, 0.0);
        let before = controls.distance(&camera);

        controls.on_scroll(&MouseScrollDelta::LineDelta(0.0, 1.0));
        controls.update(&mut camera, 0.0);
        assert!((controls.distance(&camera) - before * 0.95).abs() < 1e-4);

        for _ in 0..200 {
            controls.on_scroll(&MouseScrollDelta::LineDelta(0.0, 1.0));
            controls.update(&mut camera, 0.0);
        }
        assert!((controls.distance(&camera) - 5.0).abs() < 1e-4);

        for _ in 0..200 {
            controls.on_scroll(&MouseScrollDelta::LineDelta(0.0, -1.0));
            controls.update(&mut camera, 0.0);
        }
        assert!((controls.distance(&camera) - 20.0).abs() < 1e-3);
    }

    #[test]
    fn damping_spreads_rotation_over_frames() {
        let (mut controls, mut camera) = setup(Preset::Table);
        controls.update(&mut camera, 0.0);
        let start = azimuth(&controls, &camera);

        controls.rotate_left(0.4);
        controls.update(&mut camera, 0.0);
        let first_step = start - azimuth(&controls, &camera);
        assert!((first_step - 0.4 * 0.05).abs() < 1e-4);

        for _ in 0..1000 {
            controls.update(&mut camera, 0.0);
        }
        let total = start - azimuth(&controls, &camera);
        assert!((total - 0.4).abs() < 1e-3);
        assert!(!controls.update(&mut camera, 0.0));
    }

    #[test]
    fn without_damping_rotation_applies_at_once() {
        let config = ViewerConfig::preset(Preset::Table);
        let mut controls = OrbitControls::new(ControlSettings {
            enable_damping: false,
            ..config.controls
        });
        let mut camera = PerspectiveCamera::new(&CameraSettings::default(), 1.0);
        controls.update(&mut camera, 0.0);
        let start = azimuth(&controls, &camera);

        controls.rotate_left(0.3);
        assert!(controls.update(&mut camera, 0.0));
        assert!((start - azimuth(&controls, &camera) - 0.3).abs() < 1e-4);
        assert!(!controls.update(&mut camera, 0.0));
    }

    #[test]
    fn left_drag_rotates() {
        let (mut controls, mut camera) = setup(Preset::Table);
        controls.update(&mut camera, 0.0);
        let start = azimuth(&controls, &camera);

        controls.on_mouse_button(MouseButton::Left, ElementState::Pressed);
        controls.on_cursor_moved(Vec2::new(100.0, 100.0), 600.0, &camera);
        controls.on_cursor_moved(Vec2::new(160.0, 100.0), 600.0, &camera);
        controls.on_mouse_button(MouseButton::Left, ElementState::Released);
        controls.on_cursor_moved(Vec2::new(400.0, 100.0), 600.0, &camera);

        for _ in 0..1000 {
            controls.update(&mut camera, 0.0);
        }
        let expected = 2.0 * PI * 60.0 / 600.0;
        assert!((start - azimuth(&controls, &camera) - expected).abs() < 1e-3);
    }

    #[test]
    fn right_drag_pans_only_when_enabled() {
        let (mut controls, mut camera) = setup(Preset::Table);
        controls.on_mouse_button(MouseButton::Right, ElementState::Pressed);
        controls.on_cursor_moved(Vec2::ZERO, 600.0, &camera);
        controls.on_cursor_moved(Vec2::new(50.0, 0.0), 600.0, &camera);
        controls.update(&mut camera, 0.0);
        assert_eq!(controls.target, Vec3::new(0.0, 1.0, 0.0));

        controls.settings.enable_pan = true;
        controls.settings.enable_damping = false;
        controls.on_mouse_button(MouseButton::Right, ElementState::Pressed);
        controls.on_cursor_moved(Vec2::new(100.0, 0.0), 600.0, &camera);
        controls.update(&mut camera, 0.0);
        assert!(controls.target.distance(Vec3::new(0.0, 1.0, 0.0)) > 0.1);
        assert_eq!(camera.target, controls.target);
    }

    #[test]
    fn auto_rotate_turns_when_idle() {
        let (mut controls, mut camera) = setup(Preset::Table);
        controls.settings.auto_rotate = true;
        controls.settings.enable_damping = false;
        controls.update(&mut camera, 0.0);
        let start = azimuth(&controls, &camera);

        controls.update(&mut camera, 1.0);
        let expected = 2.0 * PI / 60.0 * 2.0;
        assert!((start - azimuth(&controls, &camera) - expected).abs() < 1e-4);
    }
}

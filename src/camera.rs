//! Camera integrators: a yaw/pitch/zoom orbit camera and a first-person
//! camera driven by accumulated rotation angles.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::CameraConfig;

/// Squared cursor travel below which rotation input is discarded.
pub const ROTATION_THRESHOLD: f32 = 0.00001;

/// Largest absolute lateral (pitch) angle of the first-person camera.
pub const LATERAL_LIMIT: f32 = FRAC_PI_2 * 0.9;

const WORLD_UP: Vec3 = Vec3::Y;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraMode {
    FirstPerson,
    Orbit,
}

impl CameraMode {
    pub fn toggled(self) -> Self {
        match self {
            CameraMode::FirstPerson => CameraMode::Orbit,
            CameraMode::Orbit => CameraMode::FirstPerson,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
}

impl CameraMovement {
    /// Camera-local unit axis for the movement.
    pub fn local_direction(self) -> Vec3 {
        match self {
            CameraMovement::Forward => Vec3::new(0.0, 0.0, -1.0),
            CameraMovement::Backward => Vec3::new(0.0, 0.0, 1.0),
            CameraMovement::Left => Vec3::new(-1.0, 0.0, 0.0),
            CameraMovement::Right => Vec3::new(1.0, 0.0, 0.0),
        }
    }
}

/// Common surface of both camera variants.
pub trait Camera {
    fn process_keyboard(&mut self, direction: CameraMovement, dt: f32);

    /// Feeds an absolute cursor position in window pixels.
    fn process_cursor(&mut self, cursor: Vec2, viewport: Vec2, dt: f32);

    fn process_scroll(&mut self, dy: f32);

    fn view_matrix(&self) -> Mat4;

    fn projection_matrix(&self, aspect: f32) -> Mat4;

    fn position(&self) -> Vec3;

    fn forward(&self) -> Vec3;

    fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

/// Remembers the last committed cursor sample.
///
/// The first sample only seeds the tracker so that startup never produces a
/// rotation jump.
#[derive(Debug, Clone, Default)]
pub struct CursorTracker {
    last: Option<Vec2>,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Difference to the last committed sample, `None` for the seeding sample.
    pub fn offset(&mut self, cursor: Vec2) -> Option<Vec2> {
        match self.last {
            Some(last) => Some(cursor - last),
            None => {
                self.last = Some(cursor);
                None
            }
        }
    }

    pub fn commit(&mut self, cursor: Vec2) {
        self.last = Some(cursor);
    }

    pub fn last(&self) -> Option<Vec2> {
        self.last
    }
}

/// Maps a window-space cursor position into `[min, max]` on both axes with Y up.
pub fn cursor_in_range(screen: Vec2, size: Vec2, min: f32, max: f32) -> Vec2 {
    let sum = max - min;
    let size = size.max(Vec2::ONE);
    let x = screen.x / size.x * sum - sum / 2.0;
    let y = screen.y / size.y * sum - sum / 2.0;
    Vec2::new(x, -y)
}

/// Rotates `(0, 0, -1)` around the vertical axis, then around the lateral
/// axis `cross(forward, up)`.
fn forward_from_angles(around_vertical: f32, around_lateral: f32) -> Vec3 {
    let horizontal_forward = Quat::from_rotation_y(around_vertical) * Vec3::NEG_Z;
    let lateral_axis = horizontal_forward.cross(WORLD_UP).normalize_or_zero();
    (Quat::from_axis_angle(lateral_axis, around_lateral) * horizontal_forward).normalize()
}

/// Free-look camera steered by accumulated vertical and lateral rotation angles.
#[derive(Debug, Clone)]
pub struct FirstPersonCamera {
    position: Vec3,
    forward: Vec3,
    fov: f32,
    near: f32,
    far: f32,
    linear_speed: f32,
    rotation_gain: f32,
    rotation_around_vertical: f32,
    rotation_around_lateral: f32,
    view: Mat4,
    tracker: CursorTracker,
}

impl FirstPersonCamera {
    pub fn new(config: &CameraConfig) -> Self {
        let mut forward = config.forward.try_normalize().unwrap_or(Vec3::NEG_Z);
        let rotation_around_vertical = (-forward.x).atan2(-forward.z);
        let lateral = forward.y.clamp(-1.0, 1.0).asin();
        let rotation_around_lateral = lateral.clamp(-LATERAL_LIMIT, LATERAL_LIMIT);
        if lateral != rotation_around_lateral {
            forward = forward_from_angles(rotation_around_vertical, rotation_around_lateral);
        }
        let mut camera = Self {
            position: config.position,
            forward,
            fov: config.fov_degrees.to_radians(),
            near: config.near,
            far: config.far,
            linear_speed: config.linear_speed,
            rotation_gain: config.rotation_gain,
            rotation_around_vertical,
            rotation_around_lateral,
            view: Mat4::IDENTITY,
            tracker: CursorTracker::new(),
        };
        camera.rebuild_view();
        camera
    }

    /// Moves along a camera-local axis projected onto the horizontal plane.
    pub fn move_local(&mut self, local_direction: Vec3, dt: f32) {
        let mut delta = self.view.transpose().transform_vector3(local_direction);
        delta.y = 0.0;
        self.position += delta.normalize_or_zero() * dt * self.linear_speed;
        self.rebuild_view();
    }

    /// Integrates the rotation for a cursor sample expressed in range units.
    ///
    /// Returns whether the sample moved far enough from the last applied one
    /// to rotate the camera. Samples under the threshold are not committed, so
    /// slow drifts still accumulate into a rotation eventually.
    pub fn rotate(&mut self, cursor: Vec2, dt: f32) -> bool {
        let Some(diff) = self.tracker.offset(cursor) else {
            return false;
        };
        if diff.dot(diff) <= ROTATION_THRESHOLD {
            return false;
        }

        self.rotation_around_vertical += (-diff.x * self.rotation_gain * dt).to_radians();
        self.rotation_around_lateral += (diff.y * self.rotation_gain * dt).to_radians();
        self.rotation_around_lateral = self
            .rotation_around_lateral
            .clamp(-LATERAL_LIMIT, LATERAL_LIMIT);
        self.forward =
            forward_from_angles(self.rotation_around_vertical, self.rotation_around_lateral);

        self.tracker.commit(cursor);
        self.rebuild_view();
        true
    }

    /// `(around_vertical, around_lateral)` in radians.
    pub fn rotation_angles(&self) -> (f32, f32) {
        (self.rotation_around_vertical, self.rotation_around_lateral)
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn set_fov_degrees(&mut self, degrees: f32) {
        self.fov = degrees.to_radians();
    }

    pub fn set_linear_speed(&mut self, speed: f32) {
        self.linear_speed = speed;
    }

    pub fn set_rotation_gain(&mut self, gain: f32) {
        self.rotation_gain = gain;
    }

    /// Teleports the camera; orientation is kept.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.rebuild_view();
    }

    fn rebuild_view(&mut self) {
        self.view = Mat4::look_at_rh(self.position, self.position + self.forward, WORLD_UP);
    }
}

impl Camera for FirstPersonCamera {
    fn process_keyboard(&mut self, direction: CameraMovement, dt: f32) {
        self.move_local(direction.local_direction(), dt);
    }

    fn process_cursor(&mut self, cursor: Vec2, viewport: Vec2, dt: f32) {
        self.rotate(cursor_in_range(cursor, viewport, -1.0, 1.0), dt);
    }

    fn process_scroll(&mut self, _dy: f32) {}

    fn view_matrix(&self) -> Mat4 {
        self.view
    }

    fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect.max(0.01), self.near, self.far)
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn forward(&self) -> Vec3 {
        self.forward
    }
}

/// Yaw/pitch/zoom camera in the style of the classic tutorial camera.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    yaw: f32,
    pitch: f32,
    movement_speed: f32,
    mouse_sensitivity: f32,
    zoom: f32,
    tracker: CursorTracker,
}

impl OrbitCamera {
    pub const YAW: f32 = -90.0;
    pub const PITCH: f32 = 0.0;
    pub const SPEED: f32 = 2.5;
    pub const SENSITIVITY: f32 = 0.1;
    pub const ZOOM: f32 = 45.0;
    pub const PITCH_LIMIT: f32 = 89.0;
    pub const ZOOM_RANGE: (f32, f32) = (1.0, 45.0);
    const NEAR: f32 = 0.1;
    const FAR: f32 = 100.0;

    pub fn new(position: Vec3) -> Self {
        let mut camera = Self {
            position,
            front: Vec3::NEG_Z,
            up: WORLD_UP,
            right: Vec3::X,
            yaw: Self::YAW,
            pitch: Self::PITCH,
            movement_speed: Self::SPEED,
            mouse_sensitivity: Self::SENSITIVITY,
            zoom: Self::ZOOM,
            tracker: CursorTracker::new(),
        };
        camera.update_vectors();
        camera
    }

    /// Applies a cursor offset in pixels with Y pointing up.
    pub fn process_mouse_movement(&mut self, x_offset: f32, y_offset: f32) {
        self.yaw += x_offset * self.mouse_sensitivity;
        self.pitch = (self.pitch + y_offset * self.mouse_sensitivity)
            .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
        self.update_vectors();
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(WORLD_UP).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

impl Camera for OrbitCamera {
    fn process_keyboard(&mut self, direction: CameraMovement, dt: f32) {
        let velocity = self.movement_speed * dt;
        match direction {
            CameraMovement::Forward => self.position += self.front * velocity,
            CameraMovement::Backward => self.position -= self.front * velocity,
            CameraMovement::Left => self.position -= self.right * velocity,
            CameraMovement::Right => self.position += self.right * velocity,
        }
    }

    fn process_cursor(&mut self, cursor: Vec2, _viewport: Vec2, _dt: f32) {
        if let Some(offset) = self.tracker.offset(cursor) {
            self.tracker.commit(cursor);
            // window Y grows downwards
            self.process_mouse_movement(offset.x, -offset.y);
        }
    }

    fn process_scroll(&mut self, dy: f32) {
        let (min, max) = Self::ZOOM_RANGE;
        self.zoom = (self.zoom - dy).clamp(min, max);
    }

    fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.zoom.to_radians(), aspect.max(0.01), Self::NEAR, Self::FAR)
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn forward(&self) -> Vec3 {
        self.front
    }
}

/// Owns both camera variants and routes input to the active one.
#[derive(Debug, Clone)]
pub struct CameraRig {
    mode: CameraMode,
    first_person: FirstPersonCamera,
    orbit: OrbitCamera,
}

impl CameraRig {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            mode: config.mode,
            first_person: FirstPersonCamera::new(config),
            orbit: OrbitCamera::new(config.position),
        }
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn toggle(&mut self) -> CameraMode {
        self.mode = self.mode.toggled();
        self.mode
    }

    pub fn set_mode(&mut self, mode: CameraMode) {
        self.mode = mode;
    }

    /// Moves both cameras.
    pub fn set_position(&mut self, position: Vec3) {
        self.first_person.set_position(position);
        self.orbit.set_position(position);
    }

    pub fn active(&self) -> &dyn Camera {
        match self.mode {
            CameraMode::FirstPerson => &self.first_person,
            CameraMode::Orbit => &self.orbit,
        }
    }

    pub fn active_mut(&mut self) -> &mut dyn Camera {
        match self.mode {
            CameraMode::FirstPerson => &mut self.first_person,
            CameraMode::Orbit => &mut self.orbit,
        }
    }

    pub fn first_person(&self) -> &FirstPersonCamera {
        &self.first_person
    }

    pub fn first_person_mut(&mut self) -> &mut FirstPersonCamera {
        &mut self.first_person
    }

    pub fn orbit(&self) -> &OrbitCamera {
        &self.orbit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at_origin() -> FirstPersonCamera {
        FirstPersonCamera::new(&CameraConfig {
            position: Vec3::ZERO,
            ..CameraConfig::default()
        })
    }

    #[test]
    fn small_cursor_jitter_does_not_rotate() {
        let mut camera = camera_at_origin();
        assert!(!camera.rotate(Vec2::ZERO, 0.02));
        let before = (camera.rotation_angles(), camera.forward());
        for step in 0..50 {
            let wiggle = if step % 2 == 0 { 0.001 } else { -0.001 };
            assert!(!camera.rotate(Vec2::new(wiggle, wiggle), 0.02));
        }
        assert_eq!((camera.rotation_angles(), camera.forward()), before);
    }

    #[test]
    fn lateral_angle_stays_clamped() {
        let mut camera = camera_at_origin();
        camera.rotate(Vec2::ZERO, 0.02);
        for step in 1..40 {
            camera.rotate(Vec2::new(0.0, step as f32 * 5.0), 0.02);
            assert!(camera.rotation_angles().1 <= LATERAL_LIMIT + 1e-6);
        }
        for step in 1..80 {
            camera.rotate(Vec2::new(0.0, -(step as f32) * 5.0), 0.02);
            assert!(camera.rotation_angles().1 >= -LATERAL_LIMIT - 1e-6);
        }
    }

    #[test]
    fn forward_stays_unit_length() {
        let mut camera = camera_at_origin();
        let samples = [
            Vec2::new(0.3, -0.2),
            Vec2::new(-0.7, 0.9),
            Vec2::new(0.05, 0.01),
            Vec2::new(1.0, -1.0),
            Vec2::new(-0.4, 0.4),
        ];
        for sample in samples.iter().cycle().take(40) {
            camera.rotate(*sample, 0.02);
            assert!((camera.forward().length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn first_cursor_sample_only_seeds() {
        let mut camera = camera_at_origin();
        assert!(!camera.rotate(Vec2::new(0.8, -0.6), 0.02));
        assert_eq!(camera.forward(), Vec3::NEG_Z);
        assert!(camera.rotate(Vec2::new(0.9, -0.6), 0.02));
    }

    #[test]
    fn rightward_cursor_turns_right() {
        let mut camera = camera_at_origin();
        camera.rotate(Vec2::ZERO, 0.02);
        camera.rotate(Vec2::new(0.1, 0.0), 0.02);
        assert!(camera.forward().x > 0.0);
    }

    #[test]
    fn movement_ignores_vertical_component() {
        let mut camera = camera_at_origin();
        camera.rotate(Vec2::ZERO, 0.02);
        camera.rotate(Vec2::new(0.0, 0.5), 0.02);
        assert!(camera.forward().y > 0.0);
        camera.process_keyboard(CameraMovement::Forward, 0.02);
        assert!(camera.position().y.abs() < 1e-6);
        assert!((camera.position().length() - 0.6).abs() < 1e-5);
    }

    #[test]
    fn orbit_pitch_and_zoom_are_clamped() {
        let mut camera = OrbitCamera::new(Vec3::ZERO);
        camera.process_mouse_movement(0.0, 10_000.0);
        assert_eq!(camera.pitch(), OrbitCamera::PITCH_LIMIT);
        camera.process_scroll(100.0);
        assert_eq!(camera.zoom(), 1.0);
        camera.process_scroll(-100.0);
        assert_eq!(camera.zoom(), 45.0);
    }

    #[test]
    fn orbit_first_cursor_sample_seeds() {
        let mut camera = OrbitCamera::new(Vec3::ZERO);
        camera.process_cursor(Vec2::new(640.0, 10.0), Vec2::new(800.0, 600.0), 0.02);
        assert_eq!(camera.yaw(), OrbitCamera::YAW);
        camera.process_cursor(Vec2::new(650.0, 10.0), Vec2::new(800.0, 600.0), 0.02);
        assert!((camera.yaw() - (OrbitCamera::YAW + 1.0)).abs() < 1e-5);
    }

    #[test]
    fn cursor_range_is_centered_with_y_up() {
        let size = Vec2::new(800.0, 600.0);
        assert_eq!(cursor_in_range(Vec2::new(400.0, 300.0), size, -1.0, 1.0), Vec2::ZERO);
        assert_eq!(
            cursor_in_range(Vec2::new(800.0, 0.0), size, -1.0, 1.0),
            Vec2::new(1.0, 1.0)
        );
    }

    #[test]
    fn rig_toggles_active_camera() {
        let mut rig = CameraRig::new(&CameraConfig::default());
        assert_eq!(rig.mode(), CameraMode::FirstPerson);
        assert_eq!(rig.toggle(), CameraMode::Orbit);
        rig.active_mut().process_keyboard(CameraMovement::Forward, 1.0);
        assert_eq!(rig.first_person().position(), CameraConfig::default().position);
        assert_ne!(rig.orbit().position(), CameraConfig::default().position);
    }

    #[test]
    fn steep_configured_forward_is_clamped() {
        for y in [1.0, -1.0, 0.999] {
            let camera = FirstPersonCamera::new(&CameraConfig {
                forward: Vec3::new(0.0, y, -0.01),
                ..CameraConfig::default()
            });
            let (_, lateral) = camera.rotation_angles();
            assert!(lateral.abs() <= LATERAL_LIMIT + 1e-6);
            assert!((camera.forward().y.asin() - lateral).abs() < 1e-4);
            assert!((camera.forward().length() - 1.0).abs() < 1e-5);
            assert!(camera.view_matrix().is_finite());
        }
    }

    #[test]
    fn mild_configured_forward_is_kept() {
        let forward = Vec3::new(0.3, -0.2, -1.0).normalize();
        let camera = FirstPersonCamera::new(&CameraConfig {
            forward,
            ..CameraConfig::default()
        });
        assert!((camera.forward() - forward).length() < 1e-6);
    }

    #[test]
    fn rig_setters_reach_both_cameras() {
        let mut rig = CameraRig::new(&CameraConfig::default());
        rig.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(rig.first_person().position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(rig.orbit().position(), Vec3::new(1.0, 2.0, 3.0));
        rig.first_person_mut().set_fov_degrees(90.0);
        assert!((rig.first_person().fov() - FRAC_PI_2).abs() < 1e-6);
        rig.set_mode(CameraMode::Orbit);
        assert_eq!(rig.mode(), CameraMode::Orbit);
    }
}

use std::io::{self, Write};

use glam::{Vec2, Vec3};
use log::{debug, info};

use crate::camera::{Camera, CameraMovement, CameraRig};
use crate::config::{ConfigError, SceneConfig};
use crate::frame::FrameTiming;
use crate::input::{InputState, KeyCode, NamedKey};
use crate::particles::{ParticleFrame, PrecipitationMode, PrecipitationSystem};
use crate::passes::CameraParams;
use crate::scene::Scene;
use crate::shadow::LightSpace;

const MOVEMENT_BINDINGS: [([KeyCode; 2], CameraMovement); 4] = [
    (
        [KeyCode::Character('W'), KeyCode::Named(NamedKey::Up)],
        CameraMovement::Forward,
    ),
    (
        [KeyCode::Character('S'), KeyCode::Named(NamedKey::Down)],
        CameraMovement::Backward,
    ),
    (
        [KeyCode::Character('A'), KeyCode::Named(NamedKey::Left)],
        CameraMovement::Left,
    ),
    (
        [KeyCode::Character('D'), KeyCode::Named(NamedKey::Right)],
        CameraMovement::Right,
    ),
];

/// Parameters that change the particle base buffer itself.
const FIELD_PARAMETERS: [&str; 3] = ["box_size", "particle_vertex_count", "particle_seed"];

/// Everything the renderer needs to draw one frame.
#[derive(Debug, Clone)]
pub struct FrameState {
    pub timing: FrameTiming,
    pub camera: CameraParams,
    pub light_space: LightSpace,
    pub particles: ParticleFrame,
    /// Bumped whenever the particle base buffer is regenerated.
    pub field_revision: u64,
}

/// Single owner of the configuration, cameras and precipitation state.
#[derive(Debug)]
pub struct App {
    config: SceneConfig,
    scene: Scene,
    cameras: CameraRig,
    precipitation: PrecipitationSystem,
    field_revision: u64,
    input: InputState,
    viewport: (u32, u32),
    exit_requested: bool,
}

impl App {
    pub fn new(config: SceneConfig, scene: Scene, viewport: (u32, u32)) -> Self {
        let cameras = CameraRig::new(&config.camera);
        let precipitation = PrecipitationSystem::new(&config.precipitation);
        Self {
            config,
            scene,
            cameras,
            precipitation,
            field_revision: 0,
            input: InputState::new(),
            viewport: (viewport.0.max(1), viewport.1.max(1)),
            exit_requested: false,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Named setter for UI-style tweaks; regenerates the particle field when
    /// its shape changes.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        self.config.set_from_str(name, value)?;
        if FIELD_PARAMETERS.contains(&name) {
            self.precipitation.regenerate(&self.config.precipitation);
            self.field_revision += 1;
            debug!("particle field regenerated (revision {})", self.field_revision);
        }
        self.sync_camera(name);
        Ok(())
    }

    /// Pushes a changed camera parameter into the live cameras.
    fn sync_camera(&mut self, name: &str) {
        let camera = &self.config.camera;
        match name {
            "first_person_camera" => self.cameras.set_mode(camera.mode),
            "camera_position" => self.cameras.set_position(camera.position),
            "camera_fov" => self.cameras.first_person_mut().set_fov_degrees(camera.fov_degrees),
            "camera_linear_speed" => {
                self.cameras.first_person_mut().set_linear_speed(camera.linear_speed);
            }
            "camera_rotation_gain" => {
                self.cameras.first_person_mut().set_rotation_gain(camera.rotation_gain);
            }
            _ => {}
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn cameras(&self) -> &CameraRig {
        &self.cameras
    }

    pub fn precipitation(&self) -> &PrecipitationSystem {
        &self.precipitation
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
    }

    pub fn aspect(&self) -> f32 {
        self.viewport.0 as f32 / self.viewport.1 as f32
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Applies the input gathered since the last frame and derives the frame's
    /// transforms. Movement integrates over `delta_time`; particles depend only
    /// on `current_time`.
    pub fn update(&mut self, timing: FrameTiming) -> FrameState {
        let pressed = self.input.take_pressed();
        if pressed.contains(&KeyCode::Named(NamedKey::Escape)) {
            self.exit_requested = true;
        }
        if pressed.contains(&KeyCode::Named(NamedKey::Tab)) {
            let mode = self.cameras.toggle();
            self.config.camera.mode = mode;
            info!("switched to {mode:?} camera");
        }
        if self.input.is_key_down(KeyCode::Digit(1)) {
            self.config.precipitation.mode = PrecipitationMode::Rain;
        }
        if self.input.is_key_down(KeyCode::Digit(2)) {
            self.config.precipitation.mode = PrecipitationMode::Snow;
        }

        let viewport = Vec2::new(self.viewport.0 as f32, self.viewport.1 as f32);
        let rotation_dt = self.config.loop_interval;
        let camera = self.cameras.active_mut();
        for (keys, movement) in MOVEMENT_BINDINGS {
            if keys.iter().any(|key| self.input.is_key_down(*key)) {
                camera.process_keyboard(movement, timing.delta_time);
            }
        }
        if let Some(cursor) = self.input.take_cursor_motion() {
            camera.process_cursor(cursor, viewport, rotation_dt);
        }
        let scroll = self.input.take_scroll();
        if scroll != 0.0 {
            camera.process_scroll(scroll);
        }

        let camera = self.camera_params();
        let light_space = LightSpace::new(&self.config.light, &self.config.shadow);
        let particles = self.precipitation.prepare(
            &self.config.precipitation,
            timing.current_time,
            camera.position,
            camera.forward,
            camera.view_projection(),
        );
        FrameState {
            timing,
            camera,
            light_space,
            particles,
            field_revision: self.field_revision,
        }
    }

    /// Called once the frame has been drawn.
    pub fn end_frame(&mut self, frame: &FrameState) {
        self.precipitation.finish_frame(frame.particles.view_proj);
    }

    pub fn camera_params(&self) -> CameraParams {
        let camera = self.cameras.active();
        CameraParams {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(self.aspect()),
            position: camera.position(),
            forward: camera.forward(),
        }
    }

    pub fn print_summary(&self, frame: Option<&FrameState>) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_summary(&mut out, frame)
    }

    pub fn write_summary(&self, out: &mut impl Write, frame: Option<&FrameState>) -> io::Result<()> {
        let camera = self.cameras.active();
        writeln!(
            out,
            "Camera: {:?} pos={} forward={}",
            self.cameras.mode(),
            fmt_vec3(camera.position()),
            fmt_vec3(camera.forward())
        )?;
        writeln!(
            out,
            "Precipitation: {:?} ({} vertices, {} streams)",
            self.config.precipitation.mode,
            self.precipitation.field().vertex_count(),
            self.precipitation.streams().len()
        )?;
        if let Some(frame) = frame {
            writeln!(
                out,
                "Frame {} at t={:.2}s",
                frame.timing.frame_index, frame.timing.current_time
            )?;
            for (index, stream) in frame.particles.streams.iter().enumerate() {
                writeln!(
                    out,
                    " - stream {index} offsets={} inverse_velocity={}",
                    fmt_vec3(stream.offsets),
                    fmt_vec3(stream.inverse_velocity)
                )?;
            }
        }
        Ok(())
    }
}

fn fmt_vec3(value: Vec3) -> String {
    format!("({:.2}, {:.2}, {:.2})", value.x, value.y, value.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraMode;

    fn app() -> App {
        App::new(SceneConfig::default(), Scene::builtin(), (800, 600))
    }

    fn timing(frame_index: u64, delta_time: f32, current_time: f32) -> FrameTiming {
        FrameTiming {
            frame_index,
            delta_time,
            current_time,
        }
    }

    #[test]
    fn holding_forward_moves_by_speed_times_delta() {
        let mut app = app();
        app.input_mut().set_key_down(KeyCode::Character('W'));
        let frame = app.update(timing(0, 0.02, 0.0));
        assert!((frame.camera.position - Vec3::new(0.0, 10.6, -0.6)).length() < 1e-4);
    }

    #[test]
    fn tab_toggles_camera_once_per_press() {
        let mut app = app();
        let tab = KeyCode::Named(NamedKey::Tab);
        app.input_mut().set_key_down(tab);
        app.update(timing(0, 0.0, 0.0));
        app.update(timing(1, 0.02, 0.02));
        assert_eq!(app.cameras().mode(), CameraMode::Orbit);
        app.input_mut().set_key_up(tab);
        app.input_mut().set_key_down(tab);
        app.update(timing(2, 0.02, 0.04));
        assert_eq!(app.cameras().mode(), CameraMode::FirstPerson);
    }

    #[test]
    fn number_keys_switch_precipitation() {
        let mut app = app();
        app.input_mut().set_key_down(KeyCode::Digit(2));
        let frame = app.update(timing(0, 0.0, 0.0));
        assert!(!frame.particles.render_lines);
        app.input_mut().set_key_up(KeyCode::Digit(2));
        app.input_mut().set_key_down(KeyCode::Digit(1));
        let frame = app.update(timing(1, 0.02, 0.02));
        assert!(frame.particles.render_lines);
    }

    #[test]
    fn end_frame_stores_previous_view_projection() {
        let mut app = app();
        let first = app.update(timing(0, 0.0, 0.0));
        app.end_frame(&first);
        let second = app.update(timing(1, 0.02, 0.02));
        assert_eq!(second.particles.prev_view_proj, first.particles.view_proj);
    }

    #[test]
    fn field_parameters_regenerate_particles() {
        let mut app = app();
        app.set_param("light_intensity", "0.5").unwrap();
        assert_eq!(app.update(timing(0, 0.0, 0.0)).field_revision, 0);
        app.set_param("particle_vertex_count", "10").unwrap();
        assert_eq!(app.precipitation().field().vertex_count(), 10);
        assert_eq!(app.update(timing(1, 0.0, 0.0)).field_revision, 1);
        assert!(app.set_param("particle_vertex_count", "abc").is_err());
    }

    #[test]
    fn escape_requests_exit() {
        let mut app = app();
        app.input_mut().set_key_down(KeyCode::Named(NamedKey::Escape));
        app.update(timing(0, 0.0, 0.0));
        assert!(app.exit_requested());
    }

    #[test]
    fn summary_lists_camera_and_streams() {
        let mut app = app();
        let frame = app.update(timing(0, 0.0, 0.0));
        let mut out = Vec::new();
        app.write_summary(&mut out, Some(&frame)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Camera: FirstPerson pos=(0.00, 10.60, 0.00)"));
        assert!(text.contains(" - stream 3 offsets="));
    }

    #[test]
    fn camera_parameters_apply_at_runtime() {
        let mut app = app();
        app.set_param("camera_linear_speed", "60").unwrap();
        app.input_mut().set_key_down(KeyCode::Character('W'));
        let frame = app.update(timing(0, 0.02, 0.0));
        assert!((frame.camera.position - Vec3::new(0.0, 10.6, -1.2)).length() < 1e-4);

        app.set_param("first_person_camera", "false").unwrap();
        assert_eq!(app.cameras().mode(), CameraMode::Orbit);
        app.set_param("camera_position", "1 2 3").unwrap();
        assert_eq!(app.camera_params().position, Vec3::new(1.0, 2.0, 3.0));
        app.set_param("first_person_camera", "true").unwrap();
        assert_eq!(app.camera_params().position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn tab_keeps_config_mode_in_step() {
        let mut app = app();
        app.input_mut().set_key_down(KeyCode::Named(NamedKey::Tab));
        app.update(timing(0, 0.0, 0.0));
        assert_eq!(app.config().camera.mode, CameraMode::Orbit);
    }

    #[test]
    fn regenerating_the_field_keeps_motion_streaks() {
        let mut app = app();
        let first = app.update(timing(0, 0.0, 0.0));
        app.end_frame(&first);
        app.set_param("box_size", "20").unwrap();
        let second = app.update(timing(1, 0.02, 0.02));
        assert_eq!(second.particles.prev_view_proj, first.particles.view_proj);
        assert_eq!(app.precipitation().field().box_size(), 20.0);
    }

    #[test]
    fn non_finite_parameters_are_rejected() {
        let mut app = app();
        for (name, text) in [("box_size", "inf"), ("box_size", "NaN"), ("loop_interval", "inf")] {
            assert!(app.set_param(name, text).is_err());
        }
        assert_eq!(app.precipitation().field().box_size(), 30.0);
        assert_eq!(app.update(timing(0, 0.0, 0.0)).field_revision, 0);
    }
}

//! Camera-relative precipitation.
//!
//! The base buffer is generated once and never touched again. Every frame a
//! handful of streams each produce an offset that translates the whole field;
//! the vertex stage folds positions back into a box around the camera, so a
//! finite buffer reads as endless rain or snow.

use glam::{Mat4, Vec3};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::PrecipitationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrecipitationMode {
    #[default]
    Rain,
    Snow,
}

impl PrecipitationMode {
    /// Rain is drawn as streaked line pairs, snow as points.
    pub fn renders_lines(self) -> bool {
        matches!(self, PrecipitationMode::Rain)
    }
}

/// Constant motion parameters of one layer of particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleStream {
    pub velocity: Vec3,
    pub wind: Vec3,
    pub random_offset: Vec3,
}

pub const DEFAULT_STREAMS: [ParticleStream; 4] = [
    ParticleStream {
        velocity: Vec3::new(0.0, 10.0, 0.0),
        wind: Vec3::new(0.85, 0.0, 0.0),
        random_offset: Vec3::new(0.1, 0.2, 0.3),
    },
    ParticleStream {
        velocity: Vec3::new(0.0, 7.0, 0.0),
        wind: Vec3::new(0.0, 0.0, 0.7),
        random_offset: Vec3::new(0.22, 0.3, 0.5),
    },
    ParticleStream {
        velocity: Vec3::new(0.0, 11.0, 0.0),
        wind: Vec3::new(0.55, 0.0, 1.3),
        random_offset: Vec3::new(0.55, 0.0, 1.3),
    },
    ParticleStream {
        velocity: Vec3::new(0.0, 8.0, 0.0),
        wind: Vec3::new(2.11, 0.0, 0.0),
        random_offset: Vec3::new(2.11, 0.0, 0.0),
    },
];

/// Seeded base positions, uniformly spread inside `[0, box_size)^3`.
///
/// Vertices come in identical pairs so the same buffer can be drawn as points
/// or as line segments whose second end is stretched in the vertex stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleField {
    vertices: Vec<[f32; 3]>,
    box_size: f32,
}

impl ParticleField {
    pub fn generate(vertex_count: u32, box_size: f32, seed: u64) -> Self {
        let pairs = vertex_count.div_ceil(2) as usize;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut vertices = Vec::with_capacity(pairs * 2);
        for _ in 0..pairs {
            let position = [
                rng.gen_range(0.0..box_size),
                rng.gen_range(0.0..box_size),
                rng.gen_range(0.0..box_size),
            ];
            vertices.push(position);
            vertices.push(position);
        }
        debug!("generated {} particle vertices (seed {seed})", vertices.len());
        Self { vertices, box_size }
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn box_size(&self) -> f32 {
        self.box_size
    }
}

/// Folds every component of `value` into `[0, box_size)`.
pub fn wrap(value: Vec3, box_size: f32) -> Vec3 {
    Vec3::new(
        wrap_component(value.x, box_size),
        wrap_component(value.y, box_size),
        wrap_component(value.z, box_size),
    )
}

fn wrap_component(value: f32, box_size: f32) -> f32 {
    let wrapped = value.rem_euclid(box_size);
    // rem_euclid may round up to box_size for tiny negative inputs
    if wrapped >= box_size {
        0.0
    } else {
        wrapped
    }
}

/// Per-stream uniform pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamState {
    pub offsets: Vec3,
    pub inverse_velocity: Vec3,
}

/// Everything the particle program reads for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleFrame {
    pub streams: Vec<StreamState>,
    pub forward_offset: Vec3,
    pub box_size: f32,
    pub render_lines: bool,
    pub camera_position: Vec3,
    pub view_proj: Mat4,
    pub prev_view_proj: Mat4,
}

/// Owns the base field and the previous frame's view-projection.
#[derive(Debug, Clone)]
pub struct PrecipitationSystem {
    field: ParticleField,
    streams: Vec<ParticleStream>,
    prev_view_proj: Mat4,
}

impl PrecipitationSystem {
    pub fn new(config: &PrecipitationConfig) -> Self {
        Self::with_streams(config, DEFAULT_STREAMS.to_vec())
    }

    pub fn with_streams(config: &PrecipitationConfig, streams: Vec<ParticleStream>) -> Self {
        Self {
            field: ParticleField::generate(config.vertex_count, config.box_size, config.seed),
            streams,
            prev_view_proj: Mat4::IDENTITY,
        }
    }

    /// Rebuilds the base buffer from `config`; streams and the previous
    /// view-projection carry over.
    pub fn regenerate(&mut self, config: &PrecipitationConfig) {
        self.field = ParticleField::generate(config.vertex_count, config.box_size, config.seed);
    }

    pub fn field(&self) -> &ParticleField {
        &self.field
    }

    pub fn streams(&self) -> &[ParticleStream] {
        &self.streams
    }

    pub fn prev_view_proj(&self) -> Mat4 {
        self.prev_view_proj
    }

    /// Offset of the particle box ahead of the camera.
    pub fn forward_offset(camera_forward: Vec3, box_size: f32) -> Vec3 {
        camera_forward.normalize_or_zero() * (box_size / 2.0)
    }

    /// Offset and inverse velocity of one stream at absolute time `current_time`.
    pub fn stream_state(
        config: &PrecipitationConfig,
        stream: &ParticleStream,
        current_time: f32,
        camera_position: Vec3,
        camera_forward: Vec3,
    ) -> StreamState {
        let box_size = config.box_size;
        let gravity_scale = match config.mode {
            PrecipitationMode::Snow => config.snow_scale,
            PrecipitationMode::Rain => config.rain_scale,
        };
        let gravity_offset = stream.velocity * current_time * gravity_scale;
        let wind_offset = stream.wind * current_time;
        let mut offsets = gravity_offset + wind_offset + stream.random_offset;
        offsets -= camera_position + Self::forward_offset(camera_forward, box_size) + box_size / 2.0;
        StreamState {
            offsets: wrap(offsets, box_size),
            inverse_velocity: (-stream.velocity - stream.wind) * config.damping,
        }
    }

    /// Uniforms for the current frame; the previous view-projection is the one
    /// stored by the last [`PrecipitationSystem::finish_frame`].
    pub fn prepare(
        &self,
        config: &PrecipitationConfig,
        current_time: f32,
        camera_position: Vec3,
        camera_forward: Vec3,
        view_proj: Mat4,
    ) -> ParticleFrame {
        let streams = self
            .streams
            .iter()
            .map(|stream| {
                Self::stream_state(config, stream, current_time, camera_position, camera_forward)
            })
            .collect();
        ParticleFrame {
            streams,
            forward_offset: Self::forward_offset(camera_forward, config.box_size),
            box_size: config.box_size,
            render_lines: config.mode.renders_lines(),
            camera_position,
            view_proj,
            prev_view_proj: self.prev_view_proj,
        }
    }

    /// Keeps `view_proj` for the next frame's motion streaks.
    pub fn finish_frame(&mut self, view_proj: Mat4) {
        self.prev_view_proj = view_proj;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PrecipitationConfig {
        PrecipitationConfig::default()
    }

    fn assert_in_box(value: Vec3, box_size: f32) {
        for component in value.to_array() {
            assert!(
                (0.0..box_size).contains(&component),
                "{component} outside [0, {box_size})"
            );
        }
    }

    #[test]
    fn wrap_handles_boundaries() {
        assert_eq!(wrap(Vec3::new(0.0, 30.0, -30.0), 30.0), Vec3::ZERO);
        assert_eq!(wrap(Vec3::new(60.0, -60.0, 90.0), 30.0), Vec3::ZERO);
        assert_in_box(wrap(Vec3::splat(-1e-7), 30.0), 30.0);
        assert_in_box(wrap(Vec3::new(1e7, -1e7, 12345.678), 30.0), 30.0);
    }

    #[test]
    fn offsets_stay_inside_box() {
        let config = config();
        let times = [0.0, 1.5, 3.0, 30.0, 1_000.0, 86_400.0];
        let cameras = [Vec3::ZERO, Vec3::new(0.0, 10.6, 0.0), Vec3::new(-512.3, 4.0, 77.7)];
        for stream in &DEFAULT_STREAMS {
            for &time in &times {
                for &camera in &cameras {
                    let state = PrecipitationSystem::stream_state(
                        &config,
                        stream,
                        time,
                        camera,
                        Vec3::new(0.3, -0.2, -0.9),
                    );
                    assert_in_box(state.offsets, config.box_size);
                }
            }
        }
    }

    #[test]
    fn base_buffer_is_never_mutated() {
        let config = config();
        let mut system = PrecipitationSystem::new(&config);
        let snapshot = system.field().clone();
        for frame in 0..120 {
            let time = frame as f32 * 0.02;
            let view_proj = Mat4::from_translation(Vec3::splat(time));
            let prepared = system.prepare(&config, time, Vec3::splat(time), Vec3::NEG_Z, view_proj);
            assert_eq!(prepared.streams.len(), 4);
            system.finish_frame(view_proj);
        }
        assert_eq!(system.field(), &snapshot);
    }

    #[test]
    fn field_is_seeded_and_paired() {
        let a = ParticleField::generate(2000, 30.0, 7);
        let b = ParticleField::generate(2000, 30.0, 7);
        let c = ParticleField::generate(2000, 30.0, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.vertex_count(), 2000);
        for pair in a.vertices().chunks_exact(2) {
            assert_eq!(pair[0], pair[1]);
            for component in pair[0] {
                assert!((0.0..30.0).contains(&component));
            }
        }
    }

    #[test]
    fn previous_view_projection_lags_one_frame() {
        let config = config();
        let mut system = PrecipitationSystem::new(&config);
        let first = Mat4::from_scale(Vec3::splat(2.0));
        let second = Mat4::from_scale(Vec3::splat(3.0));

        let frame = system.prepare(&config, 0.0, Vec3::ZERO, Vec3::NEG_Z, first);
        assert_eq!(frame.prev_view_proj, Mat4::IDENTITY);
        system.finish_frame(first);

        let frame = system.prepare(&config, 0.02, Vec3::ZERO, Vec3::NEG_Z, second);
        assert_eq!(frame.prev_view_proj, first);
        assert_eq!(frame.view_proj, second);
    }

    #[test]
    fn snow_falls_slower_and_renders_points() {
        let mut config = config();
        let stream = ParticleStream {
            velocity: Vec3::new(0.0, 10.0, 0.0),
            wind: Vec3::ZERO,
            random_offset: Vec3::ZERO,
        };
        config.box_size = 1_000.0;
        let rain = PrecipitationSystem::stream_state(&config, &stream, 2.0, Vec3::ZERO, Vec3::ZERO);
        config.mode = PrecipitationMode::Snow;
        let snow = PrecipitationSystem::stream_state(&config, &stream, 2.0, Vec3::ZERO, Vec3::ZERO);
        assert!((rain.offsets.y - 520.0).abs() < 1e-3);
        assert!((snow.offsets.y - 504.0).abs() < 1e-3);
        assert!(!config.mode.renders_lines());
    }

    #[test]
    fn inverse_velocity_is_damped() {
        let state = PrecipitationSystem::stream_state(
            &config(),
            &DEFAULT_STREAMS[0],
            5.0,
            Vec3::ZERO,
            Vec3::NEG_Z,
        );
        let expected = Vec3::new(-0.85, -10.0, 0.0) * 0.025;
        assert!((state.inverse_velocity - expected).length() < 1e-6);
    }

    #[test]
    fn regeneration_keeps_streams_and_previous_frame() {
        let streams = vec![DEFAULT_STREAMS[2]];
        let mut system = PrecipitationSystem::with_streams(&config(), streams.clone());
        let view_proj = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        system.finish_frame(view_proj);

        let mut bigger = config();
        bigger.vertex_count = 10;
        bigger.box_size = 12.0;
        system.regenerate(&bigger);

        assert_eq!(system.field().vertex_count(), 10);
        assert_eq!(system.field().box_size(), 12.0);
        assert_eq!(system.streams(), streams.as_slice());
        assert_eq!(system.prev_view_proj(), view_proj);
    }
}

//! Real-time forest scene with shadow mapping, a skybox and camera-relative
//! precipitation.
//!
//! Everything except [`render`] is plain CPU code: camera integration, the
//! light-space math of the shadow pass, the per-frame particle uniforms and
//! frame pacing can all be driven and tested without a GPU.

pub mod app;
pub mod camera;
pub mod config;
pub mod frame;
pub mod input;
pub mod mesh;
pub mod particles;
pub mod passes;
pub mod render;
pub mod scene;
pub mod shadow;
pub mod uniforms;

pub use app::{App, FrameState};
pub use camera::{Camera, CameraMode, CameraMovement, CameraRig, FirstPersonCamera, OrbitCamera};
pub use config::{ConfigError, ParamKind, ParamValue, SceneConfig};
pub use frame::{Clock, FrameScheduler, FrameTiming, ManualClock, SchedulerState, SystemClock};
pub use input::{InputState, KeyCode, NamedKey};
pub use mesh::{load_mesh, load_obj_from_str, MeshData, MeshError, MeshSource};
pub use particles::{
    wrap, ParticleField, ParticleFrame, ParticleStream, PrecipitationMode, PrecipitationSystem,
    StreamState, DEFAULT_STREAMS,
};
pub use passes::{CameraParams, DrawPhase, ProgramKind};
pub use render::Renderer;
pub use scene::{MaterialKind, Scene, SceneObject, Transform};
pub use shadow::{LightSpace, RenderTargets, ShadowPassState};
pub use uniforms::{UniformBlock, UniformLayout, UniformSink};

pub mod native;
pub mod program;
pub mod resources;
pub mod shaders;

pub use native::Renderer;
pub use program::{PipelineSettings, ShaderProgram};

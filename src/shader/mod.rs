//! Shader loading: include expansion, WGSL validation and reflection.

mod compile;
mod include;

pub use compile::{ProgramLayout, ProgramSource, UniformBinding, FRAGMENT_ENTRY, VERTEX_ENTRY};
pub use include::{preprocess, EmbeddedShaders, IncludeResolver, ShaderDir};

pub const VERTEX_SHADER: &str = "sphere.vert.wgsl";
pub const FRAGMENT_SHADER: &str = "sphere.frag.wgsl";

use std::path::PathBuf;

use thiserror::Error;

use crate::render::{AttributeSlot, Topology, UniformKind};

/// Failures while loading, pre-processing, compiling or linking shaders.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader source `{name}` not found")]
    Missing { name: String },
    #[error("failed to read shader {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed #include in `{file}` on line {line}")]
    MalformedInclude { file: String, line: usize },
    #[error("include cycle: {chain}")]
    IncludeCycle { chain: String },
    #[error("{stage} shader failed to parse:\n{message}")]
    Parse { stage: &'static str, message: String },
    #[error("{stage} shader failed validation: {message}")]
    Validation { stage: &'static str, message: String },
    #[error("{stage} shader has no `{name}` entry point")]
    MissingEntryPoint { stage: &'static str, name: &'static str },
    #[error("uniform `{name}` has an unsupported type")]
    UnsupportedUniform { name: String },
    #[error("uniform `{name}` lives in bind group {group}; only group 0 is supported")]
    UnsupportedGroup { name: String, group: u32 },
    #[error("uniform `{name}` conflicts between stages: {reason}")]
    UniformConflict { name: String, reason: String },
    #[error("vertex input at location {location} is {found}; only f32 inputs are supported")]
    VertexInput { location: u32, found: String },
    #[error("stage interface mismatch at location {location}: {reason}")]
    StageInterface { location: u32, reason: String },
}

/// Failures reported by a render context while creating resources or
/// recording frame commands.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error("unknown program handle #{0}")]
    UnknownProgram(usize),
    #[error("unknown mesh handle #{0}")]
    UnknownMesh(usize),
    #[error("no program is bound")]
    NoProgramBound,
    #[error("no mesh is bound")]
    NoMeshBound,
    #[error("bound program has no uniform named `{name}`")]
    UnknownUniform { name: String },
    #[error("uniform `{name}` expects {expected}, got {found}")]
    UniformType {
        name: String,
        expected: UniformKind,
        found: UniformKind,
    },
    #[error("model, view and projection matrices must be set before drawing")]
    MatricesUnset,
    #[error("bound mesh has no attribute for shader location {location}")]
    MissingAttribute { location: u32 },
    #[error("invalid mesh: {0}")]
    Mesh(#[from] MeshError),
}

/// Reasons a mesh descriptor is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("a position attribute is required")]
    MissingPosition,
    #[error("attribute slot {0} is given more than once")]
    DuplicateAttribute(AttributeSlot),
    #[error("attribute {slot} has {found} elements, expected {expected}")]
    AttributeLength {
        slot: AttributeSlot,
        expected: usize,
        found: usize,
    },
    #[error("{count} indices do not form whole {topology} primitives")]
    IndexCount { count: usize, topology: Topology },
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

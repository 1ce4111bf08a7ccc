//! Render context interfaces and their two implementations: a wgpu backend
//! bound to a window and a recording backend used headless.

use std::fmt;
use std::ops::BitOr;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::error::ContextError;
use crate::shader::ProgramSource;

pub mod frame;
pub mod gpu;
pub mod recording;
pub mod resources;

pub use frame::{FrameCommand, FramePlan, FrameRecorder, PassPlan, PlannedDraw};
pub use gpu::GpuContext;
pub use recording::RecordingContext;
pub use resources::{MatrixSlots, MeshInfo, ResourceTable};

pub const MODEL_UNIFORM: &str = "uModel";
pub const VIEW_UNIFORM: &str = "uView";
pub const PROJECTION_UNIFORM: &str = "uProjection";

/// Camera matrix state, fed to programs through their matrix uniforms.
pub trait MatrixState {
    fn set_projection_matrix(&mut self, projection: Mat4);
    fn set_view_matrix(&mut self, view: Mat4);
    fn set_model_matrix(&mut self, model: Mat4);
}

/// Creates GPU resources that live as long as the context.
pub trait ResourceFactory {
    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, ContextError>;
    fn create_mesh(&mut self, mesh: &MeshDescriptor<'_>) -> Result<MeshHandle, ContextError>;
}

/// Commands issued while recording a frame. They execute in issue order.
pub trait FrameCommands {
    fn set_clear_color(&mut self, color: Color);
    fn clear(&mut self, mask: ClearMask);
    fn set_depth_test(&mut self, enabled: bool);
    fn bind_program(&mut self, program: ProgramHandle) -> Result<(), ContextError>;
    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), ContextError>;
    fn bind_mesh(&mut self, mesh: MeshHandle) -> Result<(), ContextError>;
    /// Draws the full index range of the bound mesh with the bound program.
    fn draw_mesh(&mut self) -> Result<(), ContextError>;
}

pub trait RenderContext: MatrixState + ResourceFactory + FrameCommands {
    /// Width over height of the render target.
    fn aspect_ratio(&self) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) usize);

impl ProgramHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub(crate) usize);

impl MeshHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for MeshHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}, {:.2}, {:.2})",
            self.r, self.g, self.b, self.a
        )
    }
}

/// Buffers affected by [`FrameCommands::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearMask(u8);

impl ClearMask {
    pub const COLOR: ClearMask = ClearMask(0b01);
    pub const DEPTH: ClearMask = ClearMask(0b10);

    pub const fn contains(self, other: ClearMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ClearMask {
    type Output = ClearMask;

    fn bitor(self, rhs: ClearMask) -> ClearMask {
        ClearMask(self.0 | rhs.0)
    }
}

impl fmt::Display for ClearMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [(ClearMask::COLOR, "color"), (ClearMask::DEPTH, "depth")]
            .into_iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| name)
            .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Vertex attribute slots and the shader locations they feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSlot {
    Position,
    Normal,
}

impl AttributeSlot {
    pub const fn location(self) -> u32 {
        match self {
            AttributeSlot::Position => 0,
            AttributeSlot::Normal => 1,
        }
    }
}

impl fmt::Display for AttributeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttributeSlot::Position => "position",
            AttributeSlot::Normal => "normal",
        })
    }
}

/// Upload hint for index data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    /// Uploaded once and never written again.
    #[default]
    Static,
    /// May be rewritten after creation.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    #[default]
    Triangles,
    Lines,
    Points,
}

impl Topology {
    pub const fn indices_per_primitive(self) -> usize {
        match self {
            Topology::Triangles => 3,
            Topology::Lines => 2,
            Topology::Points => 1,
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Topology::Triangles => "triangle",
            Topology::Lines => "line",
            Topology::Points => "point",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute<'a> {
    pub slot: AttributeSlot,
    pub data: &'a [[f32; 3]],
}

#[derive(Debug, Clone, Copy)]
pub struct IndexBuffer<'a> {
    pub indices: &'a [u32],
    pub usage: BufferUsage,
}

/// Host-side data for [`ResourceFactory::create_mesh`].
#[derive(Debug, Clone)]
pub struct MeshDescriptor<'a> {
    pub attributes: Vec<VertexAttribute<'a>>,
    pub indices: IndexBuffer<'a>,
    pub topology: Topology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Vec3,
    Mat4,
}

impl UniformKind {
    /// Size of the backing uniform buffer.
    pub const fn buffer_size(self) -> u64 {
        match self {
            UniformKind::Vec3 => 16,
            UniformKind::Mat4 => 64,
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UniformKind::Vec3 => "vec3<f32>",
            UniformKind::Mat4 => "mat4x4<f32>",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Vec3(Vec3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Bytes laid out for a WGSL uniform of the matching type.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Vec3(v) => bytemuck::bytes_of(&PaddedVec3 {
                xyz: v.to_array(),
                _pad: 0.0,
            })
            .to_vec(),
            UniformValue::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
        }
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformValue::Vec3(v) => write!(f, "({:.2}, {:.2}, {:.2})", v.x, v.y, v.z),
            UniformValue::Mat4(_) => f.write_str("mat4x4"),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PaddedVec3 {
    xyz: [f32; 3],
    _pad: f32,
}

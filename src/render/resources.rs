use glam::Mat4;

use crate::error::{ContextError, MeshError};
use crate::shader::ProgramLayout;

use super::{
    AttributeSlot, MeshDescriptor, MeshHandle, ProgramHandle, Topology, MODEL_UNIFORM,
    PROJECTION_UNIFORM, VIEW_UNIFORM,
};

/// What a context remembers about a mesh after upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshInfo {
    pub vertex_count: usize,
    pub index_count: u32,
    pub topology: Topology,
    pub slots: Vec<AttributeSlot>,
}

impl MeshInfo {
    /// Checks a descriptor and summarises it.
    pub fn validate(mesh: &MeshDescriptor<'_>) -> Result<Self, MeshError> {
        let position = mesh
            .attributes
            .iter()
            .find(|attr| attr.slot == AttributeSlot::Position)
            .ok_or(MeshError::MissingPosition)?;
        let vertex_count = position.data.len();

        let mut slots = Vec::with_capacity(mesh.attributes.len());
        for attr in &mesh.attributes {
            if slots.contains(&attr.slot) {
                return Err(MeshError::DuplicateAttribute(attr.slot));
            }
            if attr.data.len() != vertex_count {
                return Err(MeshError::AttributeLength {
                    slot: attr.slot,
                    expected: vertex_count,
                    found: attr.data.len(),
                });
            }
            slots.push(attr.slot);
        }

        let indices = mesh.indices.indices;
        if indices.len() % mesh.topology.indices_per_primitive() != 0 {
            return Err(MeshError::IndexCount {
                count: indices.len(),
                topology: mesh.topology,
            });
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }

        Ok(Self {
            vertex_count,
            index_count: indices.len() as u32,
            topology: mesh.topology,
            slots,
        })
    }

    pub fn has_location(&self, location: u32) -> bool {
        self.slots.iter().any(|slot| slot.location() == location)
    }
}

/// Backend-independent bookkeeping for created programs and meshes.
#[derive(Debug, Default)]
pub struct ResourceTable {
    programs: Vec<ProgramLayout>,
    meshes: Vec<MeshInfo>,
}

impl ResourceTable {
    pub fn add_program(&mut self, layout: ProgramLayout) -> ProgramHandle {
        self.programs.push(layout);
        ProgramHandle(self.programs.len() - 1)
    }

    pub fn add_mesh(&mut self, info: MeshInfo) -> MeshHandle {
        self.meshes.push(info);
        MeshHandle(self.meshes.len() - 1)
    }

    pub fn program(&self, handle: ProgramHandle) -> Result<&ProgramLayout, ContextError> {
        self.programs
            .get(handle.0)
            .ok_or(ContextError::UnknownProgram(handle.0))
    }

    pub fn mesh(&self, handle: MeshHandle) -> Result<&MeshInfo, ContextError> {
        self.meshes
            .get(handle.0)
            .ok_or(ContextError::UnknownMesh(handle.0))
    }
}

/// Model, view and projection as last set on a context.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatrixSlots {
    pub model: Option<Mat4>,
    pub view: Option<Mat4>,
    pub projection: Option<Mat4>,
}

impl MatrixSlots {
    pub fn is_complete(&self) -> bool {
        self.model.is_some() && self.view.is_some() && self.projection.is_some()
    }

    /// Matrices keyed by the uniform names programs declare for them.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, Mat4)> {
        [
            (MODEL_UNIFORM, self.model),
            (VIEW_UNIFORM, self.view),
            (PROJECTION_UNIFORM, self.projection),
        ]
        .into_iter()
        .filter_map(|(name, matrix)| matrix.map(|m| (name, m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{BufferUsage, IndexBuffer, VertexAttribute};

    static TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    static UP: [[f32; 3]; 3] = [[0.0, 0.0, 1.0]; 3];

    fn descriptor<'a>(
        attributes: Vec<VertexAttribute<'a>>,
        indices: &'a [u32],
        topology: Topology,
    ) -> MeshDescriptor<'a> {
        MeshDescriptor {
            attributes,
            indices: IndexBuffer {
                indices,
                usage: BufferUsage::Static,
            },
            topology,
        }
    }

    fn position() -> VertexAttribute<'static> {
        VertexAttribute {
            slot: AttributeSlot::Position,
            data: &TRIANGLE,
        }
    }

    #[test]
    fn accepts_well_formed_mesh() {
        let normal = VertexAttribute {
            slot: AttributeSlot::Normal,
            data: &UP,
        };
        let info =
            MeshInfo::validate(&descriptor(vec![position(), normal], &[0, 1, 2], Topology::Triangles))
                .unwrap();
        assert_eq!(info.vertex_count, 3);
        assert_eq!(info.index_count, 3);
        assert!(info.has_location(0) && info.has_location(1));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let err = MeshInfo::validate(&descriptor(vec![position()], &[0, 1, 3], Topology::Triangles))
            .unwrap_err();
        assert_eq!(
            err,
            MeshError::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            }
        );
    }

    #[test]
    fn rejects_partial_primitives() {
        let err = MeshInfo::validate(&descriptor(vec![position()], &[0, 1], Topology::Triangles))
            .unwrap_err();
        assert!(matches!(err, MeshError::IndexCount { count: 2, .. }));
        assert!(MeshInfo::validate(&descriptor(vec![position()], &[0, 1], Topology::Lines)).is_ok());
    }

    #[test]
    fn requires_position_and_matching_lengths() {
        let short = VertexAttribute {
            slot: AttributeSlot::Normal,
            data: &UP[..2],
        };
        assert_eq!(
            MeshInfo::validate(&descriptor(vec![short], &[], Topology::Points)).unwrap_err(),
            MeshError::MissingPosition
        );
        assert!(matches!(
            MeshInfo::validate(&descriptor(vec![position(), short], &[], Topology::Points)),
            Err(MeshError::AttributeLength { found: 2, .. })
        ));
        assert_eq!(
            MeshInfo::validate(&descriptor(vec![position(), position()], &[], Topology::Points))
                .unwrap_err(),
            MeshError::DuplicateAttribute(AttributeSlot::Position)
        );
    }

    #[test]
    fn unknown_handles_are_errors() {
        let table = ResourceTable::default();
        assert!(matches!(
            table.program(ProgramHandle(0)),
            Err(ContextError::UnknownProgram(0))
        ));
        assert!(matches!(table.mesh(MeshHandle(4)), Err(ContextError::UnknownMesh(4))));
    }

    #[test]
    fn matrix_slots_report_completeness() {
        let mut slots = MatrixSlots::default();
        slots.model = Some(Mat4::IDENTITY);
        slots.view = Some(Mat4::IDENTITY);
        assert!(!slots.is_complete());
        assert_eq!(slots.named().count(), 2);
        slots.projection = Some(Mat4::IDENTITY);
        assert!(slots.is_complete());
    }
}

use glam::Mat4;
use log::debug;

use crate::camera::aspect_ratio;
use crate::error::ContextError;
use crate::shader::{ProgramLayout, ProgramSource};

use super::{
    ClearMask, Color, FrameCommand, FrameCommands, FrameRecorder, MatrixSlots, MatrixState,
    MeshDescriptor, MeshHandle, MeshInfo, ProgramHandle, RenderContext, ResourceFactory,
    ResourceTable, UniformValue,
};

/// Render context without a GPU.
///
/// Programs are compiled and linked and meshes validated exactly as the GPU
/// context does, but frames are only recorded. Used by the headless mode and
/// by tests that check command order.
#[derive(Debug)]
pub struct RecordingContext {
    width: u32,
    height: u32,
    resources: ResourceTable,
    matrices: MatrixSlots,
    recorder: FrameRecorder,
    frames: Vec<Vec<FrameCommand>>,
}

impl RecordingContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            resources: ResourceTable::default(),
            matrices: MatrixSlots::default(),
            recorder: FrameRecorder::default(),
            frames: Vec::new(),
        }
    }

    /// Closes the current frame and returns its commands.
    pub fn finish_frame(&mut self) -> &[FrameCommand] {
        let commands = self.recorder.take();
        debug!("recorded frame {} ({} commands)", self.frames.len() + 1, commands.len());
        self.frames.push(commands);
        self.frames.last().map(Vec::as_slice).unwrap_or_default()
    }

    /// Commands issued since the last finished frame.
    pub fn pending(&self) -> &[FrameCommand] {
        self.recorder.commands()
    }

    pub fn frames(&self) -> &[Vec<FrameCommand>] {
        &self.frames
    }

    pub fn matrices(&self) -> &MatrixSlots {
        &self.matrices
    }

    pub fn program(&self, handle: ProgramHandle) -> Result<&ProgramLayout, ContextError> {
        self.resources.program(handle)
    }

    pub fn mesh(&self, handle: MeshHandle) -> Result<&MeshInfo, ContextError> {
        self.resources.mesh(handle)
    }
}

impl MatrixState for RecordingContext {
    fn set_projection_matrix(&mut self, projection: Mat4) {
        self.matrices.projection = Some(projection);
    }

    fn set_view_matrix(&mut self, view: Mat4) {
        self.matrices.view = Some(view);
    }

    fn set_model_matrix(&mut self, model: Mat4) {
        self.matrices.model = Some(model);
    }
}

impl ResourceFactory for RecordingContext {
    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, ContextError> {
        let layout = source.link()?;
        Ok(self.resources.add_program(layout))
    }

    fn create_mesh(&mut self, mesh: &MeshDescriptor<'_>) -> Result<MeshHandle, ContextError> {
        let info = MeshInfo::validate(mesh)?;
        Ok(self.resources.add_mesh(info))
    }
}

impl FrameCommands for RecordingContext {
    fn set_clear_color(&mut self, color: Color) {
        self.recorder.set_clear_color(color);
    }

    fn clear(&mut self, mask: ClearMask) {
        self.recorder.clear(mask);
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.recorder.set_depth_test(enabled);
    }

    fn bind_program(&mut self, program: ProgramHandle) -> Result<(), ContextError> {
        self.recorder.bind_program(program, &self.resources)
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), ContextError> {
        self.recorder.set_uniform(name, value, &self.resources)
    }

    fn bind_mesh(&mut self, mesh: MeshHandle) -> Result<(), ContextError> {
        self.recorder.bind_mesh(mesh, &self.resources)
    }

    fn draw_mesh(&mut self) -> Result<(), ContextError> {
        self.recorder.draw_mesh(&self.resources, &self.matrices)
    }
}

impl RenderContext for RecordingContext {
    fn aspect_ratio(&self) -> f32 {
        aspect_ratio(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{AttributeSlot, BufferUsage, IndexBuffer, Topology, VertexAttribute};
    use crate::shader::{EmbeddedShaders, FRAGMENT_SHADER, VERTEX_SHADER};
    use glam::Vec3;

    static POSITIONS: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

    fn context_with_program() -> (RecordingContext, ProgramHandle) {
        let mut ctx = RecordingContext::new(4, 3);
        let source = ProgramSource::load(&EmbeddedShaders, VERTEX_SHADER, FRAGMENT_SHADER).unwrap();
        let program = ctx.create_program(&source).unwrap();
        (ctx, program)
    }

    fn position_only_mesh(ctx: &mut RecordingContext) -> MeshHandle {
        ctx.create_mesh(&MeshDescriptor {
            attributes: vec![VertexAttribute {
                slot: AttributeSlot::Position,
                data: &POSITIONS,
            }],
            indices: IndexBuffer {
                indices: &[0, 1, 2],
                usage: BufferUsage::Static,
            },
            topology: Topology::Triangles,
        })
        .unwrap()
    }

    #[test]
    fn reports_aspect_ratio_of_its_size() {
        assert_eq!(RecordingContext::new(4, 3).aspect_ratio(), 4.0 / 3.0);
    }

    #[test]
    fn uniform_requires_bound_program() {
        let (mut ctx, _) = context_with_program();
        let err = ctx
            .set_uniform("uLightPos", UniformValue::Vec3(Vec3::ONE))
            .unwrap_err();
        assert!(matches!(err, ContextError::NoProgramBound));
    }

    #[test]
    fn uniform_name_and_type_are_checked() {
        let (mut ctx, program) = context_with_program();
        ctx.bind_program(program).unwrap();
        assert!(matches!(
            ctx.set_uniform("uLightDir", UniformValue::Vec3(Vec3::ONE)),
            Err(ContextError::UnknownUniform { .. })
        ));
        assert!(matches!(
            ctx.set_uniform("uLightPos", UniformValue::Mat4(Mat4::IDENTITY)),
            Err(ContextError::UniformType { .. })
        ));
        ctx.set_uniform("uLightPos", UniformValue::Vec3(Vec3::ONE))
            .unwrap();
    }

    #[test]
    fn draw_requires_matrices_and_attributes() {
        let (mut ctx, program) = context_with_program();
        let mesh = position_only_mesh(&mut ctx);
        ctx.bind_program(program).unwrap();
        ctx.bind_mesh(mesh).unwrap();
        assert!(matches!(ctx.draw_mesh(), Err(ContextError::MatricesUnset)));

        ctx.set_model_matrix(Mat4::IDENTITY);
        ctx.set_view_matrix(Mat4::IDENTITY);
        ctx.set_projection_matrix(Mat4::IDENTITY);
        assert!(matches!(
            ctx.draw_mesh(),
            Err(ContextError::MissingAttribute { location: 1 })
        ));
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let mut ctx = RecordingContext::new(1, 1);
        assert!(matches!(
            ctx.bind_program(ProgramHandle(3)),
            Err(ContextError::UnknownProgram(3))
        ));
        assert!(matches!(
            ctx.bind_mesh(MeshHandle(0)),
            Err(ContextError::UnknownMesh(0))
        ));
        assert!(matches!(ctx.draw_mesh(), Err(ContextError::NoProgramBound)));
    }

    #[test]
    fn finish_frame_splits_command_stream() {
        let mut ctx = RecordingContext::new(1, 1);
        ctx.clear(ClearMask::COLOR);
        assert_eq!(ctx.pending().len(), 1);
        assert_eq!(ctx.finish_frame(), [FrameCommand::Clear(ClearMask::COLOR)]);
        assert!(ctx.pending().is_empty());
        assert!(ctx.finish_frame().is_empty());
        assert_eq!(ctx.frames().len(), 2);
    }
}

use std::fmt;

use crate::error::ContextError;

use super::{
    ClearMask, Color, MatrixSlots, MeshHandle, ProgramHandle, ResourceTable, UniformValue,
};

/// One command recorded during a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameCommand {
    SetClearColor(Color),
    Clear(ClearMask),
    SetDepthTest(bool),
    BindProgram(ProgramHandle),
    SetUniform { name: String, value: UniformValue },
    BindMesh(MeshHandle),
    DrawMesh { index_count: u32 },
}

impl fmt::Display for FrameCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameCommand::SetClearColor(color) => write!(f, "set-clear-color {color}"),
            FrameCommand::Clear(mask) => write!(f, "clear {mask}"),
            FrameCommand::SetDepthTest(enabled) => {
                write!(f, "depth-test {}", if *enabled { "on" } else { "off" })
            }
            FrameCommand::BindProgram(program) => write!(f, "bind-program {program}"),
            FrameCommand::SetUniform { name, value } => write!(f, "set-uniform {name} = {value}"),
            FrameCommand::BindMesh(mesh) => write!(f, "bind-mesh {mesh}"),
            FrameCommand::DrawMesh { index_count } => write!(f, "draw {index_count} indices"),
        }
    }
}

/// Validates frame commands against the resources a context owns and keeps
/// them in issue order until the frame is taken.
///
/// Bound program and mesh persist across frames.
#[derive(Debug, Default)]
pub struct FrameRecorder {
    commands: Vec<FrameCommand>,
    program: Option<ProgramHandle>,
    mesh: Option<MeshHandle>,
}

impl FrameRecorder {
    pub fn set_clear_color(&mut self, color: Color) {
        self.commands.push(FrameCommand::SetClearColor(color));
    }

    pub fn clear(&mut self, mask: ClearMask) {
        self.commands.push(FrameCommand::Clear(mask));
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.commands.push(FrameCommand::SetDepthTest(enabled));
    }

    pub fn bind_program(
        &mut self,
        program: ProgramHandle,
        resources: &ResourceTable,
    ) -> Result<(), ContextError> {
        resources.program(program)?;
        self.program = Some(program);
        self.commands.push(FrameCommand::BindProgram(program));
        Ok(())
    }

    pub fn set_uniform(
        &mut self,
        name: &str,
        value: UniformValue,
        resources: &ResourceTable,
    ) -> Result<(), ContextError> {
        let program = self.program.ok_or(ContextError::NoProgramBound)?;
        let uniform = resources
            .program(program)?
            .uniform(name)
            .ok_or_else(|| ContextError::UnknownUniform {
                name: name.to_string(),
            })?;
        if uniform.kind != value.kind() {
            return Err(ContextError::UniformType {
                name: name.to_string(),
                expected: uniform.kind,
                found: value.kind(),
            });
        }
        self.commands.push(FrameCommand::SetUniform {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    pub fn bind_mesh(
        &mut self,
        mesh: MeshHandle,
        resources: &ResourceTable,
    ) -> Result<(), ContextError> {
        resources.mesh(mesh)?;
        self.mesh = Some(mesh);
        self.commands.push(FrameCommand::BindMesh(mesh));
        Ok(())
    }

    pub fn draw_mesh(
        &mut self,
        resources: &ResourceTable,
        matrices: &MatrixSlots,
    ) -> Result<(), ContextError> {
        let program = resources.program(self.program.ok_or(ContextError::NoProgramBound)?)?;
        let mesh = resources.mesh(self.mesh.ok_or(ContextError::NoMeshBound)?)?;
        if !matrices.is_complete() {
            return Err(ContextError::MatricesUnset);
        }
        if let Some(&location) = program
            .attribute_locations
            .iter()
            .find(|&&location| !mesh.has_location(location))
        {
            return Err(ContextError::MissingAttribute { location });
        }
        self.commands.push(FrameCommand::DrawMesh {
            index_count: mesh.index_count,
        });
        Ok(())
    }

    pub fn commands(&self) -> &[FrameCommand] {
        &self.commands
    }

    /// Hands over the commands recorded since the last call.
    pub fn take(&mut self) -> Vec<FrameCommand> {
        std::mem::take(&mut self.commands)
    }
}

/// A draw with the state that was current when it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedDraw {
    pub program: ProgramHandle,
    pub mesh: MeshHandle,
    pub depth_test: bool,
}

/// One render pass: load operations plus the draws recorded into it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PassPlan {
    /// `Some` clears the color target to this value, `None` keeps it.
    pub clear_color: Option<Color>,
    pub clear_depth: bool,
    pub draws: Vec<PlannedDraw>,
}

impl PassPlan {
    fn is_empty(&self) -> bool {
        self.clear_color.is_none() && !self.clear_depth && self.draws.is_empty()
    }
}

/// A recorded frame folded into render passes.
///
/// A clear becomes the load operation of the pass it opens; a clear issued
/// after draws closes the current pass and opens a new one. Uniform writes are
/// collected separately and land before the frame is submitted, so the last
/// value written in a frame applies to all of its draws.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FramePlan {
    pub passes: Vec<PassPlan>,
    pub uniforms: Vec<(ProgramHandle, String, UniformValue)>,
}

impl FramePlan {
    pub fn from_commands(commands: &[FrameCommand]) -> Self {
        let mut plan = FramePlan::default();
        let mut pass = PassPlan::default();
        let mut clear_color = Color::TRANSPARENT;
        let mut depth_test = false;
        let mut program = None;
        let mut mesh = None;

        for command in commands {
            match command {
                FrameCommand::SetClearColor(color) => clear_color = *color,
                FrameCommand::Clear(mask) => {
                    if !pass.draws.is_empty() {
                        plan.passes.push(std::mem::take(&mut pass));
                    }
                    if mask.contains(ClearMask::COLOR) {
                        pass.clear_color = Some(clear_color);
                    }
                    if mask.contains(ClearMask::DEPTH) {
                        pass.clear_depth = true;
                    }
                }
                FrameCommand::SetDepthTest(enabled) => depth_test = *enabled,
                FrameCommand::BindProgram(handle) => program = Some(*handle),
                FrameCommand::SetUniform { name, value } => {
                    if let Some(handle) = program {
                        plan.uniforms.push((handle, name.clone(), *value));
                    }
                }
                FrameCommand::BindMesh(handle) => mesh = Some(*handle),
                FrameCommand::DrawMesh { .. } => {
                    if let (Some(program), Some(mesh)) = (program, mesh) {
                        pass.draws.push(PlannedDraw {
                            program,
                            mesh,
                            depth_test,
                        });
                    }
                }
            }
        }
        if !pass.is_empty() {
            plan.passes.push(pass);
        }
        plan
    }

    pub fn draws(&self) -> impl Iterator<Item = &PlannedDraw> {
        self.passes.iter().flat_map(|pass| pass.draws.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    const GRAY: Color = Color::new(0.2, 0.2, 0.2, 1.0);

    fn sphere_frame() -> Vec<FrameCommand> {
        vec![
            FrameCommand::SetClearColor(GRAY),
            FrameCommand::Clear(ClearMask::COLOR | ClearMask::DEPTH),
            FrameCommand::SetDepthTest(true),
            FrameCommand::BindProgram(ProgramHandle(0)),
            FrameCommand::SetUniform {
                name: "uLightPos".into(),
                value: UniformValue::Vec3(Vec3::splat(10.0)),
            },
            FrameCommand::BindMesh(MeshHandle(0)),
            FrameCommand::DrawMesh { index_count: 6 },
        ]
    }

    #[test]
    fn single_clear_and_draw_fold_into_one_pass() {
        let plan = FramePlan::from_commands(&sphere_frame());
        assert_eq!(plan.passes.len(), 1);
        let pass = &plan.passes[0];
        assert_eq!(pass.clear_color, Some(GRAY));
        assert!(pass.clear_depth);
        assert_eq!(
            pass.draws,
            vec![PlannedDraw {
                program: ProgramHandle(0),
                mesh: MeshHandle(0),
                depth_test: true,
            }]
        );
        assert_eq!(plan.uniforms.len(), 1);
        assert_eq!(plan.uniforms[0].1, "uLightPos");
    }

    #[test]
    fn clear_after_draw_opens_a_new_pass() {
        let mut commands = sphere_frame();
        commands.push(FrameCommand::Clear(ClearMask::DEPTH));
        commands.push(FrameCommand::SetDepthTest(false));
        commands.push(FrameCommand::DrawMesh { index_count: 6 });
        let plan = FramePlan::from_commands(&commands);
        assert_eq!(plan.passes.len(), 2);
        assert_eq!(plan.passes[1].clear_color, None);
        assert!(plan.passes[1].clear_depth);
        assert!(!plan.passes[1].draws[0].depth_test);
        assert_eq!(plan.draws().count(), 2);
    }

    #[test]
    fn empty_frame_has_no_passes() {
        assert!(FramePlan::from_commands(&[]).passes.is_empty());
        let only_state = [FrameCommand::SetDepthTest(true)];
        assert!(FramePlan::from_commands(&only_state).passes.is_empty());
    }

    #[test]
    fn commands_render_as_text() {
        let lines: Vec<String> = sphere_frame().iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            [
                "set-clear-color (0.20, 0.20, 0.20, 1.00)",
                "clear color|depth",
                "depth-test on",
                "bind-program #0",
                "set-uniform uLightPos = (10.00, 10.00, 10.00)",
                "bind-mesh #0",
                "draw 6 indices",
            ]
        );
    }
}

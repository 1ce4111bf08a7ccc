use anyhow::{Context, Result};
use glam::Vec3;
use log::info;

use crate::camera::CameraState;
use crate::error::ContextError;
use crate::geometry::uv_sphere;
use crate::render::{
    AttributeSlot, BufferUsage, ClearMask, Color, FrameCommands, IndexBuffer, MeshDescriptor,
    MeshHandle, ProgramHandle, RenderContext, Topology, UniformValue, VertexAttribute,
};
use crate::shader::{IncludeResolver, ProgramSource, FRAGMENT_SHADER, VERTEX_SHADER};

pub const CLEAR_COLOR: Color = Color::new(0.2, 0.2, 0.2, 1.0);
pub const LIGHT_UNIFORM: &str = "uLightPos";
pub const LIGHT_POSITION: Vec3 = Vec3::new(10.0, 10.0, 10.0);

/// Handles produced by setup and consumed by every frame step.
#[derive(Debug, Clone)]
pub struct SphereDemo {
    camera: CameraState,
    program: ProgramHandle,
    mesh: MeshHandle,
    index_count: usize,
}

impl SphereDemo {
    /// Pushes the camera matrices, builds the program and uploads the sphere.
    ///
    /// Runs once. Any failure here aborts start-up.
    pub fn setup<C: RenderContext + ?Sized>(
        ctx: &mut C,
        shaders: &dyn IncludeResolver,
    ) -> Result<Self> {
        let camera = CameraState::new(ctx.aspect_ratio());
        camera.apply(ctx);

        let source = ProgramSource::load(shaders, VERTEX_SHADER, FRAGMENT_SHADER)
            .context("failed to load shader sources")?;
        let program = ctx
            .create_program(&source)
            .context("failed to build shader program")?;

        let sphere = uv_sphere();
        let mesh = ctx
            .create_mesh(&MeshDescriptor {
                attributes: vec![
                    VertexAttribute {
                        slot: AttributeSlot::Position,
                        data: &sphere.positions,
                    },
                    VertexAttribute {
                        slot: AttributeSlot::Normal,
                        data: &sphere.normals,
                    },
                ],
                indices: IndexBuffer {
                    indices: sphere.indices(),
                    usage: BufferUsage::Static,
                },
                topology: Topology::Triangles,
            })
            .context("failed to build sphere mesh")?;
        info!(
            "sphere mesh {mesh}: {} vertices, {} triangles",
            sphere.vertex_count(),
            sphere.triangle_count()
        );

        Ok(Self {
            camera,
            program,
            mesh,
            index_count: sphere.indices().len(),
        })
    }

    /// Issues one frame: clear, enable depth, bind, set the light, bind, draw.
    pub fn frame<C: FrameCommands + ?Sized>(&self, ctx: &mut C) -> Result<(), ContextError> {
        ctx.set_clear_color(CLEAR_COLOR);
        ctx.clear(ClearMask::COLOR | ClearMask::DEPTH);
        ctx.set_depth_test(true);
        ctx.bind_program(self.program)?;
        ctx.set_uniform(LIGHT_UNIFORM, UniformValue::Vec3(LIGHT_POSITION))?;
        ctx.bind_mesh(self.mesh)?;
        ctx.draw_mesh()
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn mesh(&self) -> MeshHandle {
        self.mesh
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShaderError;
    use crate::render::{FrameCommand, RecordingContext};
    use crate::shader::EmbeddedShaders;
    use glam::Mat4;

    struct Override {
        name: &'static str,
        text: &'static str,
    }

    impl IncludeResolver for Override {
        fn resolve(&self, name: &str) -> Result<String, ShaderError> {
            if name == self.name {
                Ok(self.text.to_string())
            } else {
                EmbeddedShaders.resolve(name)
            }
        }
    }

    #[test]
    fn setup_pushes_camera_before_anything_else() {
        let mut ctx = RecordingContext::new(1024, 576);
        let demo = SphereDemo::setup(&mut ctx, &EmbeddedShaders).unwrap();
        assert_eq!(ctx.matrices().model, Some(Mat4::IDENTITY));
        assert_eq!(ctx.matrices().view, Some(demo.camera().view));
        assert_eq!(ctx.matrices().projection, Some(demo.camera().projection));
        assert!(ctx.pending().is_empty());
    }

    #[test]
    fn setup_builds_static_triangle_mesh() {
        let mut ctx = RecordingContext::new(1024, 576);
        let demo = SphereDemo::setup(&mut ctx, &EmbeddedShaders).unwrap();
        let mesh = ctx.mesh(demo.mesh()).unwrap();
        assert_eq!(mesh.topology, Topology::Triangles);
        assert_eq!(mesh.vertex_count, 561);
        assert_eq!(mesh.index_count as usize, demo.index_count());
        assert_eq!(mesh.slots, [AttributeSlot::Position, AttributeSlot::Normal]);
    }

    #[test]
    fn frame_issues_seven_commands_in_order() {
        let mut ctx = RecordingContext::new(1024, 576);
        let demo = SphereDemo::setup(&mut ctx, &EmbeddedShaders).unwrap();
        demo.frame(&mut ctx).unwrap();
        let frame = ctx.finish_frame().to_vec();
        assert_eq!(
            frame,
            [
                FrameCommand::SetClearColor(CLEAR_COLOR),
                FrameCommand::Clear(ClearMask::COLOR | ClearMask::DEPTH),
                FrameCommand::SetDepthTest(true),
                FrameCommand::BindProgram(demo.program()),
                FrameCommand::SetUniform {
                    name: LIGHT_UNIFORM.to_string(),
                    value: UniformValue::Vec3(LIGHT_POSITION),
                },
                FrameCommand::BindMesh(demo.mesh()),
                FrameCommand::DrawMesh {
                    index_count: demo.index_count() as u32,
                },
            ]
        );
    }

    #[test]
    fn broken_shader_aborts_setup() {
        let mut ctx = RecordingContext::new(1024, 576);
        let shaders = Override {
            name: FRAGMENT_SHADER,
            text: "@fragment fn fs_main( -> {",
        };
        let err = SphereDemo::setup(&mut ctx, &shaders).unwrap_err();
        assert!(format!("{err:#}").contains("failed to"));
        assert!(ctx.pending().is_empty());
    }

    #[test]
    fn light_uniform_must_exist_in_program() {
        let mut ctx = RecordingContext::new(1024, 576);
        let shaders = Override {
            name: FRAGMENT_SHADER,
            text: "#include \"varyings.wgsl\"\n\
                   @fragment fn fs_main(input: Varyings) -> @location(0) vec4<f32> {\n\
                       return vec4<f32>(1.0);\n\
                   }\n",
        };
        let demo = SphereDemo::setup(&mut ctx, &shaders).unwrap();
        let err = demo.frame(&mut ctx).unwrap_err();
        assert!(matches!(err, ContextError::UnknownUniform { .. }));
    }
}

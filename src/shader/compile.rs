use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{
    AddressSpace, Binding, Handle, Module, ScalarKind, ShaderStage, Type, TypeInner, VectorSize,
};

use crate::error::ShaderError;
use crate::render::UniformKind;

use super::include::{preprocess, IncludeResolver};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Pre-processed WGSL for one vertex/fragment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub vertex: String,
    pub fragment: String,
}

impl ProgramSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Resolves both stages by name and expands their includes.
    pub fn load(
        resolver: &dyn IncludeResolver,
        vertex: &str,
        fragment: &str,
    ) -> Result<Self, ShaderError> {
        Ok(Self {
            vertex: preprocess(vertex, resolver)?,
            fragment: preprocess(fragment, resolver)?,
        })
    }

    /// Parses and validates both stages, then checks that they agree.
    pub fn link(&self) -> Result<ProgramLayout, ShaderError> {
        let vertex = compile_stage("vertex", &self.vertex)?;
        let fragment = compile_stage("fragment", &self.fragment)?;

        let vertex_entry = find_entry(&vertex, ShaderStage::Vertex, VERTEX_ENTRY)
            .ok_or(ShaderError::MissingEntryPoint {
                stage: "vertex",
                name: VERTEX_ENTRY,
            })?;
        let fragment_entry = find_entry(&fragment, ShaderStage::Fragment, FRAGMENT_ENTRY)
            .ok_or(ShaderError::MissingEntryPoint {
                stage: "fragment",
                name: FRAGMENT_ENTRY,
            })?;
        check_stage_interface(&vertex, vertex_entry, &fragment, fragment_entry)?;

        let mut uniforms = reflect_uniforms(&vertex)?;
        for uniform in reflect_uniforms(&fragment)? {
            merge_uniform(&mut uniforms, uniform)?;
        }
        uniforms.sort_by_key(|u| (u.group, u.binding));

        let mut attribute_locations = Vec::new();
        for (location, ty) in entry_inputs(&vertex, vertex_entry) {
            let inner = &vertex.types[ty].inner;
            if !is_f32(inner) {
                return Err(ShaderError::VertexInput {
                    location,
                    found: describe(inner),
                });
            }
            attribute_locations.push(location);
        }
        attribute_locations.sort_unstable();
        attribute_locations.dedup();

        Ok(ProgramLayout {
            uniforms,
            attribute_locations,
        })
    }
}

/// Named bindings a linked program exposes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramLayout {
    pub uniforms: Vec<UniformBinding>,
    /// Vertex input locations consumed by the vertex entry point.
    pub attribute_locations: Vec<u32>,
}

impl ProgramLayout {
    pub fn uniform(&self, name: &str) -> Option<&UniformBinding> {
        self.uniforms.iter().find(|u| u.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBinding {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: UniformKind,
}

fn compile_stage(stage: &'static str, source: &str) -> Result<Module, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| ShaderError::Parse {
        stage,
        message: err.emit_to_string(source),
    })?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|err| ShaderError::Validation {
            stage,
            message: err.to_string(),
        })?;
    Ok(module)
}

fn find_entry<'m>(
    module: &'m Module,
    stage: ShaderStage,
    name: &str,
) -> Option<&'m naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|entry| entry.stage == stage && entry.name == name)
}

fn reflect_uniforms(module: &Module) -> Result<Vec<UniformBinding>, ShaderError> {
    let mut uniforms = Vec::new();
    for (_, global) in module.global_variables.iter() {
        if global.space != AddressSpace::Uniform {
            continue;
        }
        let (Some(name), Some(binding)) = (global.name.clone(), global.binding.as_ref()) else {
            continue;
        };
        if binding.group != 0 {
            return Err(ShaderError::UnsupportedGroup {
                name,
                group: binding.group,
            });
        }
        let Some(kind) = uniform_kind(&module.types[global.ty].inner) else {
            return Err(ShaderError::UnsupportedUniform { name });
        };
        uniforms.push(UniformBinding {
            name,
            group: binding.group,
            binding: binding.binding,
            kind,
        });
    }
    Ok(uniforms)
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match *inner {
        TypeInner::Vector {
            size: VectorSize::Tri,
            scalar,
        } if scalar.kind == ScalarKind::Float && scalar.width == 4 => Some(UniformKind::Vec3),
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar.kind == ScalarKind::Float && scalar.width == 4 => Some(UniformKind::Mat4),
        _ => None,
    }
}

fn merge_uniform(
    uniforms: &mut Vec<UniformBinding>,
    uniform: UniformBinding,
) -> Result<(), ShaderError> {
    if let Some(existing) = uniforms.iter().find(|u| u.name == uniform.name) {
        if existing.binding != uniform.binding || existing.kind != uniform.kind {
            return Err(ShaderError::UniformConflict {
                reason: format!(
                    "declared as binding {} ({}) and binding {} ({})",
                    existing.binding, existing.kind, uniform.binding, uniform.kind
                ),
                name: uniform.name,
            });
        }
        return Ok(());
    }
    if let Some(other) = uniforms.iter().find(|u| u.binding == uniform.binding) {
        return Err(ShaderError::UniformConflict {
            reason: format!("binding {} is already used by `{}`", other.binding, other.name),
            name: uniform.name,
        });
    }
    uniforms.push(uniform);
    Ok(())
}

/// Every fragment input must be written by the vertex stage with the same type.
fn check_stage_interface(
    vertex: &Module,
    vertex_entry: &naga::EntryPoint,
    fragment: &Module,
    fragment_entry: &naga::EntryPoint,
) -> Result<(), ShaderError> {
    let outputs = entry_outputs(vertex, vertex_entry);
    for (location, ty) in entry_inputs(fragment, fragment_entry) {
        let wanted = &fragment.types[ty].inner;
        let Some(&(_, written)) = outputs.iter().find(|(l, _)| *l == location) else {
            return Err(ShaderError::StageInterface {
                location,
                reason: format!(
                    "fragment reads {} but the vertex stage writes nothing",
                    describe(wanted)
                ),
            });
        };
        let written = &vertex.types[written].inner;
        if written != wanted {
            return Err(ShaderError::StageInterface {
                location,
                reason: format!(
                    "vertex writes {} but fragment reads {}",
                    describe(written),
                    describe(wanted)
                ),
            });
        }
    }
    Ok(())
}

fn entry_inputs(module: &Module, entry: &naga::EntryPoint) -> Vec<(u32, Handle<Type>)> {
    let mut locations = Vec::new();
    for argument in &entry.function.arguments {
        collect_locations(module, argument.binding.as_ref(), argument.ty, &mut locations);
    }
    locations
}

fn entry_outputs(module: &Module, entry: &naga::EntryPoint) -> Vec<(u32, Handle<Type>)> {
    let mut locations = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(module, result.binding.as_ref(), result.ty, &mut locations);
    }
    locations
}

/// Location-bound values of a direct binding or of the members of a struct.
fn collect_locations(
    module: &Module,
    binding: Option<&Binding>,
    ty: Handle<Type>,
    out: &mut Vec<(u32, Handle<Type>)>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push((*location, ty)),
        Some(_) => {}
        None => {
            if let TypeInner::Struct { ref members, .. } = module.types[ty].inner {
                out.extend(members.iter().filter_map(|member| match member.binding {
                    Some(Binding::Location { location, .. }) => Some((location, member.ty)),
                    _ => None,
                }));
            }
        }
    }
}

fn is_f32(inner: &TypeInner) -> bool {
    match *inner {
        TypeInner::Scalar(scalar) | TypeInner::Vector { scalar, .. } => {
            scalar.kind == ScalarKind::Float && scalar.width == 4
        }
        _ => false,
    }
}

fn describe(inner: &TypeInner) -> String {
    fn scalar_name(scalar: naga::Scalar) -> String {
        let prefix = match scalar.kind {
            ScalarKind::Float => "f",
            ScalarKind::Sint => "i",
            ScalarKind::Uint => "u",
            ScalarKind::Bool => return "bool".to_string(),
            _ => "?",
        };
        format!("{prefix}{}", scalar.width as u32 * 8)
    }
    match *inner {
        TypeInner::Scalar(scalar) => scalar_name(scalar),
        TypeInner::Vector { size, scalar } => format!("vec{}<{}>", size as u8, scalar_name(scalar)),
        _ => "a non-scalar, non-vector type".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{EmbeddedShaders, FRAGMENT_SHADER, VERTEX_SHADER};

    const VERTEX: &str = r#"
@group(0) @binding(0) var<uniform> uView: mat4x4<f32>;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return uView * vec4<f32>(position, 1.0);
}
"#;

    const FRAGMENT: &str = r#"
@group(0) @binding(1) var<uniform> uTint: vec3<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(uTint, 1.0);
}
"#;

    #[test]
    fn embedded_program_links() {
        let source = ProgramSource::load(&EmbeddedShaders, VERTEX_SHADER, FRAGMENT_SHADER).unwrap();
        let layout = source.link().unwrap();
        let names: Vec<&str> = layout.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["uModel", "uView", "uProjection", "uLightPos"]);
        assert_eq!(layout.uniform("uLightPos").unwrap().kind, UniformKind::Vec3);
        assert_eq!(layout.uniform("uModel").unwrap().kind, UniformKind::Mat4);
        assert_eq!(layout.attribute_locations, vec![0, 1]);
    }

    #[test]
    fn reflects_direct_arguments() {
        let layout = ProgramSource::new(VERTEX, FRAGMENT).link().unwrap();
        assert_eq!(layout.attribute_locations, vec![0]);
        assert_eq!(layout.uniform("uTint").unwrap().binding, 1);
    }

    #[test]
    fn syntax_error_is_a_parse_error() {
        let err = ProgramSource::new(VERTEX, "fn fs_main( {").link().unwrap_err();
        assert!(matches!(err, ShaderError::Parse { stage: "fragment", .. }));
    }

    #[test]
    fn missing_entry_point_fails_to_link() {
        let renamed = FRAGMENT.replace("fs_main", "main");
        let err = ProgramSource::new(VERTEX, renamed).link().unwrap_err();
        assert!(matches!(
            err,
            ShaderError::MissingEntryPoint {
                stage: "fragment",
                name: FRAGMENT_ENTRY
            }
        ));
    }

    #[test]
    fn shared_binding_with_different_names_conflicts() {
        let clashing = FRAGMENT.replace("@binding(1)", "@binding(0)");
        let err = ProgramSource::new(VERTEX, clashing).link().unwrap_err();
        assert!(matches!(err, ShaderError::UniformConflict { ref name, .. } if name == "uTint"));
    }

    #[test]
    fn unsupported_uniform_type_is_rejected() {
        let scalar = FRAGMENT
            .replace("uTint: vec3<f32>", "uTint: f32")
            .replace("vec4<f32>(uTint, 1.0)", "vec4<f32>(uTint)");
        let err = ProgramSource::new(VERTEX, scalar).link().unwrap_err();
        assert!(matches!(err, ShaderError::UnsupportedUniform { ref name } if name == "uTint"));
    }

    const VARYING_VERTEX: &str = r#"
struct Out {
    @builtin(position) clip: vec4<f32>,
    @location(0) shade: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> Out {
    var out: Out;
    out.clip = vec4<f32>(position, 1.0);
    out.shade = position;
    return out;
}
"#;

    fn fragment_reading(binding: &str) -> String {
        format!(
            "@fragment\nfn fs_main(@location({binding}) shade: vec3<f32>) -> @location(0) vec4<f32> {{\n    return vec4<f32>(shade, 1.0);\n}}\n"
        )
    }

    #[test]
    fn matching_stage_interface_links() {
        let layout = ProgramSource::new(VARYING_VERTEX, fragment_reading("0"))
            .link()
            .unwrap();
        assert_eq!(layout.attribute_locations, vec![0]);
    }

    #[test]
    fn fragment_input_without_vertex_output_fails_to_link() {
        let err = ProgramSource::new(VARYING_VERTEX, fragment_reading("5"))
            .link()
            .unwrap_err();
        assert!(matches!(err, ShaderError::StageInterface { location: 5, .. }));
    }

    #[test]
    fn stage_interface_type_mismatch_fails_to_link() {
        let fragment = r#"
@fragment
fn fs_main(@location(0) @interpolate(flat) shade: vec4<i32>) -> @location(0) vec4<f32> {
    return vec4<f32>(shade);
}
"#;
        let err = ProgramSource::new(VARYING_VERTEX, fragment)
            .link()
            .unwrap_err();
        match err {
            ShaderError::StageInterface { location, reason } => {
                assert_eq!(location, 0);
                assert_eq!(reason, "vertex writes vec3<f32> but fragment reads vec4<i32>");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn integer_vertex_input_is_rejected() {
        let vertex = VERTEX
            .replace("position: vec3<f32>", "position: vec3<i32>")
            .replace("vec4<f32>(position, 1.0)", "vec4<f32>(vec3<f32>(position), 1.0)");
        let err = ProgramSource::new(vertex, FRAGMENT).link().unwrap_err();
        assert!(matches!(
            err,
            ShaderError::VertexInput { location: 0, ref found } if found == "vec3<i32>"
        ));
    }
}

use std::io::Write;

use anyhow::{Context, Result};
use log::info;

use crate::app::SphereDemo;
use crate::config::DemoConfig;
use crate::render::RecordingContext;

/// Runs setup and the requested number of frames without a window and
/// writes the recorded command stream to `out`.
pub fn run_headless(config: &DemoConfig, out: &mut impl Write) -> Result<()> {
    let shaders = config.shader_resolver();
    let mut ctx = RecordingContext::new(config.width, config.height);
    let demo = SphereDemo::setup(&mut ctx, shaders.as_ref())?;

    let layout = ctx.program(demo.program())?;
    let names: Vec<&str> = layout.uniforms.iter().map(|u| u.name.as_str()).collect();
    writeln!(
        out,
        "Compiled program: {} uniforms ({})",
        names.len(),
        names.join(", ")
    )?;
    let mesh = ctx.mesh(demo.mesh())?;
    writeln!(
        out,
        "Built mesh: {} vertices, {} triangles",
        mesh.vertex_count,
        mesh.index_count / 3
    )?;

    let frames = config.frames.unwrap_or(1);
    info!("running {frames} headless frame(s)");
    for frame in 1..=frames {
        demo.frame(&mut ctx)
            .with_context(|| format!("frame {frame} failed"))?;
        writeln!(out, "Frame {frame}:")?;
        for command in ctx.finish_frame() {
            writeln!(out, "  {command}")?;
        }
    }
    Ok(())
}

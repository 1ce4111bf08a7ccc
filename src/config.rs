use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::shader::{EmbeddedShaders, IncludeResolver, ShaderDir};

pub const USAGE: &str =
    "Usage: lit-sphere [--headless] [--frames <n>] [--size <width>x<height>] [--shader-dir <path>]";

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 576;

/// Start-up options for the demo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Shader sources are read from here instead of the embedded copies.
    pub shader_dir: Option<PathBuf>,
    pub headless: bool,
    /// Frames to run before exiting. `None` runs until the window closes.
    pub frames: Option<u32>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            title: "Lit Sphere".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            shader_dir: None,
            headless: false,
            frames: None,
        }
    }
}

impl DemoConfig {
    /// Parses the arguments that follow the program name.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut config = DemoConfig::default();
        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => config.headless = true,
                "--frames" => {
                    let value = required(&mut args, "--frames")?;
                    config.frames = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid frame count: {value}"))?,
                    );
                }
                "--size" => {
                    let value = required(&mut args, "--size")?;
                    let (width, height) = parse_size(&value)?;
                    config.width = width;
                    config.height = height;
                }
                "--shader-dir" => {
                    config.shader_dir = Some(PathBuf::from(required(&mut args, "--shader-dir")?));
                }
                other => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
            }
        }
        Ok(config)
    }

    pub fn shader_resolver(&self) -> Box<dyn IncludeResolver> {
        match &self.shader_dir {
            Some(dir) => Box::new(ShaderDir::new(dir.clone())),
            None => Box::new(EmbeddedShaders),
        }
    }
}

fn required(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("invalid size {value}: expected <width>x<height>"))?;
    let width: u32 = width
        .trim()
        .parse()
        .with_context(|| format!("invalid width in {value}"))?;
    let height: u32 = height
        .trim()
        .parse()
        .with_context(|| format!("invalid height in {value}"))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("invalid size {value}: both dimensions must be positive"));
    }
    Ok((width, height))
}

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use log::debug;

use crate::error::ShaderError;

const DIRECTIVE: &str = "#include";

const EMBEDDED: &[(&str, &str)] = &[
    (
        "sphere.vert.wgsl",
        include_str!("../shaders/sphere.vert.wgsl"),
    ),
    (
        "sphere.frag.wgsl",
        include_str!("../shaders/sphere.frag.wgsl"),
    ),
    ("varyings.wgsl", include_str!("../shaders/varyings.wgsl")),
    ("lambert.wgsl", include_str!("../shaders/lambert.wgsl")),
];

/// Supplies raw shader text by name.
pub trait IncludeResolver {
    fn resolve(&self, name: &str) -> Result<String, ShaderError>;
}

/// Shaders compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedShaders;

impl IncludeResolver for EmbeddedShaders {
    fn resolve(&self, name: &str) -> Result<String, ShaderError> {
        EMBEDDED
            .iter()
            .find(|(file, _)| *file == name)
            .map(|(_, source)| source.to_string())
            .ok_or_else(|| ShaderError::Missing {
                name: name.to_string(),
            })
    }
}

/// Shaders read from a directory on disk; includes resolve relative to it.
#[derive(Debug, Clone)]
pub struct ShaderDir {
    root: PathBuf,
}

impl ShaderDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl IncludeResolver for ShaderDir {
    fn resolve(&self, name: &str) -> Result<String, ShaderError> {
        let path = self.root.join(name);
        if !path.is_file() {
            return Err(ShaderError::Missing {
                name: name.to_string(),
            });
        }
        fs::read_to_string(&path).map_err(|source| ShaderError::Io { path, source })
    }
}

/// Loads `entry` and expands its `#include "name"` lines.
///
/// Every file is expanded at most once; repeated includes of the same file
/// produce nothing.
pub fn preprocess(entry: &str, resolver: &dyn IncludeResolver) -> Result<String, ShaderError> {
    let mut expander = Expander {
        resolver,
        stack: Vec::new(),
        included: HashSet::new(),
        output: String::new(),
    };
    expander.expand(entry)?;
    Ok(expander.output)
}

struct Expander<'r> {
    resolver: &'r dyn IncludeResolver,
    stack: Vec<String>,
    included: HashSet<String>,
    output: String,
}

impl Expander<'_> {
    fn expand(&mut self, name: &str) -> Result<(), ShaderError> {
        if self.stack.iter().any(|open| open == name) {
            let mut chain = self.stack.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(name);
            return Err(ShaderError::IncludeCycle { chain });
        }
        if !self.included.insert(name.to_string()) {
            debug!("skipping repeated include of {name}");
            return Ok(());
        }

        let source = self.resolver.resolve(name)?;
        self.stack.push(name.to_string());
        for (line_no, line) in source.lines().enumerate() {
            match Line::parse(line) {
                Line::Include(target) => self.expand(target)?,
                Line::Malformed => {
                    return Err(ShaderError::MalformedInclude {
                        file: name.to_string(),
                        line: line_no + 1,
                    })
                }
                Line::Text(text) => {
                    self.output.push_str(text);
                    self.output.push('\n');
                }
            }
        }
        self.stack.pop();
        Ok(())
    }
}

enum Line<'a> {
    Text(&'a str),
    Include(&'a str),
    Malformed,
}

impl<'a> Line<'a> {
    fn parse(line: &'a str) -> Self {
        let Some(rest) = line.trim().strip_prefix(DIRECTIVE) else {
            return Line::Text(line);
        };
        rest.trim()
            .strip_prefix('"')
            .and_then(|quoted| quoted.strip_suffix('"'))
            .filter(|target| !target.is_empty() && !target.contains('"'))
            .map_or(Line::Malformed, Line::Include)
    }
}

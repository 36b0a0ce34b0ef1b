//! Reading graph and parameter files, writing layouts
//!
//! Inputs are JSON or YAML, chosen by file extension. A graph file holds a
//! [`Branch`]; a parameter file holds any subset of [`Parameters`].

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::Parameters;
use crate::graph::Branch;
use crate::system::ParticleSystem;

/// Errors that can occur while loading or saving
#[derive(Error, Debug)]
pub enum LayoutError {
    /// The file format is not supported
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file extension could not be determined
    #[error("could not determine file format from path: {0}")]
    UnknownExtension(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("write error: {0}")]
    Write(String),
}

pub type LayoutResult<T> = Result<T, LayoutError>;

/// Final node positions keyed by node name
pub type Positions = BTreeMap<String, [f64; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("json") {
            Some(Format::Json)
        } else if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Some(Format::Yaml)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> LayoutResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| LayoutError::UnknownExtension(path.display().to_string()))?;

        Self::from_extension(ext).ok_or_else(|| LayoutError::UnsupportedFormat(ext.to_string()))
    }

    fn parse<T: DeserializeOwned>(self, text: &str) -> LayoutResult<T> {
        match self {
            Format::Json => {
                serde_json::from_str(text).map_err(|e| LayoutError::Parse(e.to_string()))
            }
            Format::Yaml => {
                serde_yaml::from_str(text).map_err(|e| LayoutError::Parse(e.to_string()))
            }
        }
    }

    fn render<T: Serialize>(self, value: &T) -> LayoutResult<String> {
        match self {
            Format::Json => {
                serde_json::to_string_pretty(value).map_err(|e| LayoutError::Write(e.to_string()))
            }
            Format::Yaml => {
                serde_yaml::to_string(value).map_err(|e| LayoutError::Write(e.to_string()))
            }
        }
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> LayoutResult<T> {
    let format = Format::from_path(path)?;
    let text = fs::read_to_string(path)?;
    format.parse(&text)
}

pub fn load_branch(path: &Path) -> LayoutResult<Branch> {
    let branch: Branch = load(path)?;
    tracing::debug!(
        path = %path.display(),
        nodes = branch.nodes.len(),
        sources = branch.edges.len(),
        "loaded graph"
    );
    Ok(branch)
}

/// Load parameters; missing keys take their defaults, invalid values are
/// replaced
pub fn load_parameters(path: &Path) -> LayoutResult<Parameters> {
    let params: Parameters = load(path)?;
    Ok(params.sanitized())
}

/// Positions of every placed node
pub fn collect_positions(system: &ParticleSystem) -> Positions {
    system
        .nodes()
        .filter_map(|node| node.position.map(|p| (node.name.clone(), [p.x, p.y])))
        .collect()
}

/// Write positions to `output` (format by extension), or as JSON to stdout
pub fn write_positions(positions: &Positions, output: Option<&Path>) -> LayoutResult<()> {
    match output {
        Some(path) => {
            let format = Format::from_path(path)?;
            let text = format.render(positions)?;
            fs::write(path, text)?;
            tracing::info!(path = %path.display(), nodes = positions.len(), "wrote layout");
        }
        None => {
            let text = Format::Json.render(positions)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}")?;
        }
    }
    Ok(())
}

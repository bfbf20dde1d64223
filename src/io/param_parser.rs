use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use nalgebra::Vector2;
use serde::Deserialize;

use crate::{
    disc::{
        boundary::BoundaryKind, coupling::simple::SimpleSettings, linear_solver::SolverSettings,
    },
    error::ConfigError,
};

/// A case file: everything needed to set up and run one simulation.
#[derive(Clone, Debug, Deserialize)]
pub struct CaseConfig {
    pub name: String,
    /// Mesh file; relative paths are taken from the case file's directory.
    pub mesh: PathBuf,
    pub density: f64,
    /// Dynamic viscosity.
    pub viscosity: f64,
    #[serde(default)]
    pub physics: Physics,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub transient: Option<TransientConfig>,
    #[serde(default)]
    pub boundaries: BTreeMap<String, BoundaryKind>,
    #[serde(default)]
    pub velocity: VelocityConfig,
    #[serde(default)]
    pub scalars: Vec<ScalarConfig>,
    #[serde(default)]
    pub simple: SimpleSettings,
    #[serde(default)]
    pub linear_solver: SolverSettings,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Physics {
    pub incompressible_flow: bool,
    pub transport: bool,
}
impl Default for Physics {
    fn default() -> Self {
        Self {
            incompressible_flow: true,
            transport: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Vtu,
    Csv,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Ascii,
    Binary,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub formats: Vec<OutputFormat>,
    pub encoding: Encoding,
    /// Write frames from a background thread.
    pub background: bool,
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            formats: vec![OutputFormat::Vtu],
            encoding: Encoding::Ascii,
            background: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct TransientConfig {
    pub dt: f64,
    pub steps: usize,
    #[serde(default = "every_step")]
    pub output_frequency: usize,
}
fn every_step() -> usize {
    1
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct VelocityConfig {
    pub inflow: Option<VectorProfile>,
    pub initial: Option<VectorProfile>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct VectorProfile {
    #[serde(default)]
    pub x: Profile,
    #[serde(default)]
    pub y: Profile,
}
impl VectorProfile {
    pub fn component(&self, c: usize) -> &Profile {
        match c {
            0 => &self.x,
            _ => &self.y,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ScalarConfig {
    pub name: String,
    #[serde(default)]
    pub diffusivity: f64,
    pub inflow: Option<Profile>,
    pub initial: Option<Profile>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

/// A value that may depend on position: a bare number or a shaped profile.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Profile {
    Constant(f64),
    Shaped(Shape),
}
impl Default for Profile {
    fn default() -> Self {
        Profile::Constant(0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    /// `c + dx x + dy y`
    Linear {
        #[serde(default)]
        c: f64,
        #[serde(default)]
        dx: f64,
        #[serde(default)]
        dy: f64,
    },
    /// Fully developed channel profile across `axis`: zero at `lower` and
    /// `upper`, `peak` half way between.
    Parabolic {
        axis: Axis,
        lower: f64,
        upper: f64,
        peak: f64,
    },
}

impl Profile {
    pub fn evaluate(&self, p: Vector2<f64>) -> f64 {
        match self {
            Profile::Constant(value) => *value,
            Profile::Shaped(Shape::Linear { c, dx, dy }) => c + dx * p.x + dy * p.y,
            Profile::Shaped(Shape::Parabolic {
                axis,
                lower,
                upper,
                peak,
            }) => {
                let s = match axis {
                    Axis::X => p.x,
                    Axis::Y => p.y,
                };
                let t = (s - lower) / (upper - lower);
                4.0 * peak * t * (1.0 - t)
            }
        }
    }
}

impl CaseConfig {
    pub fn parse(file_path: &Path) -> Result<Self, ConfigError> {
        let file_content = fs::read_to_string(file_path).map_err(|source| ConfigError::Io {
            path: file_path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&file_content)?;
        if config.mesh.is_relative() {
            if let Some(dir) = file_path.parent() {
                config.mesh = dir.join(&config.mesh);
            }
        }
        Ok(config)
    }
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
    pub fn kinematic_viscosity(&self) -> f64 {
        self.viscosity / self.density
    }
}

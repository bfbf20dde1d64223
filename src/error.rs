use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("cannot read mesh file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed mesh file at line {line}: {message}")]
    Format { line: usize, message: String },
    #[error("unsupported mesh format version {0} (expected 2.2)")]
    UnsupportedVersion(String),
    #[error("unsupported element type {element_type} for element {element}")]
    UnsupportedElement { element: usize, element_type: u32 },
    #[error("boundary face between vertices {0} and {1} has no tagged boundary segment")]
    UntaggedBoundaryFace(usize, usize),
    #[error("cell {cell} has {vertices} vertices, only triangles and quadrilaterals are supported")]
    UnsupportedCell { cell: usize, vertices: usize },
    #[error("cell {0} has zero area")]
    DegenerateCell(usize),
    #[error("edge between vertices {0} and {1} is shared by more than two cells")]
    NonManifoldEdge(usize, usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read case file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid case file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("field '{field}' has no boundary condition for boundary group {group}")]
    MissingBoundaryCondition { field: String, group: usize },
    #[error("boundary '{0}' is configured but does not exist in the mesh")]
    UnknownBoundary(String),
    #[error("mesh boundary '{0}' has no configured kind (wall, inflow or outflow)")]
    UnmappedBoundary(String),
    #[error("field '{field}' needs an inflow profile for inflow boundary '{boundary}'")]
    MissingInflowProfile { field: String, boundary: String },
    #[error("transient settings are invalid: {0}")]
    InvalidTransient(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinearSolverError {
    #[error("zero diagonal in row {row} (value {value:e})")]
    ZeroDiagonal { row: usize, value: f64 },
    #[error("no convergence after {iterations} iterations (residual {residual:e})")]
    NotConverged { iterations: usize, residual: f64 },
}

#[derive(Debug, Error)]
#[error("solving the {equation} equation failed: {source}")]
pub struct CouplingError {
    pub equation: String,
    #[source]
    pub source: LinearSolverError,
}

impl CouplingError {
    pub fn new(equation: impl Into<String>, source: LinearSolverError) -> Self {
        Self {
            equation: equation.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv output failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("vtk output failed: {0}")]
    Vtk(String),
    #[error("output writer thread panicked")]
    WriterPanicked,
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Coupling(#[from] CouplingError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

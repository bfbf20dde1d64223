mod disc;
mod error;
mod initialization;
mod io;
mod solver;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::{
    io::{gmsh::read_gmsh, param_parser::CaseConfig},
    solver::Simulation,
};

/// Incompressible flow and passive scalar transport on 2D unstructured meshes.
#[derive(Parser)]
#[command(name = "fvflow", version, long_about = None)]
struct Cli {
    /// Case file (JSON).
    case: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = CaseConfig::parse(&cli.case)
        .with_context(|| format!("failed to load case {}", cli.case.display()))?;
    let mesh = read_gmsh(&config.mesh)
        .with_context(|| format!("failed to load mesh {}", config.mesh.display()))?;
    let simulation = Simulation::new(&config, mesh)
        .with_context(|| format!("failed to set up case '{}'", config.name))?;
    let summary = simulation
        .run()
        .with_context(|| format!("case '{}' failed", config.name))?;
    info!(
        steps = summary.steps,
        frames = summary.frames,
        output = %config.output.directory.display(),
        "done"
    );
    Ok(())
}

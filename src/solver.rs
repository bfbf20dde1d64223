use std::sync::Arc;

use ndarray::Array1;
use tracing::{debug, error, info};

use crate::{
    disc::{
        coupling::{Workspace, projection::projection_step, simple::solve_steady, transport::advance_scalar},
        field::{ScalarField, VectorField, pool::FieldPool},
        linear_system::LinearSystemBuilder,
        mesh::Mesh,
    },
    error::SimulationError,
    initialization::{FieldSetup, SolverParameters, initialize_boundaries, initialize_params},
    io::{FrameWriter, output_thread::OutputSink, param_parser::CaseConfig},
};

pub struct Scalar {
    pub field: ScalarField,
    pub diffusivity: f64,
}

/// Totals of a finished run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub time: f64,
    pub frames: usize,
}

/// One simulation run: owns the mesh, the field pool, every field and the
/// output sink.
pub struct Simulation {
    mesh: Arc<Mesh>,
    pool: FieldPool,
    builder: LinearSystemBuilder,
    params: SolverParameters,
    velocity: VectorField,
    pressure: ScalarField,
    scalars: Vec<Scalar>,
    /// Face flux of the velocity of the last completed step.
    mass_flux: Array1<f64>,
    output: OutputSink,
    step: usize,
    time: f64,
    frames: usize,
}

impl Simulation {
    pub fn new(config: &CaseConfig, mesh: Mesh) -> Result<Self, SimulationError> {
        let params = initialize_params(config)?;
        let FieldSetup {
            velocity: velocity_boundary,
            pressure: pressure_boundary,
            initial_velocity,
            scalars: scalar_setups,
        } = initialize_boundaries(config, &mesh)?;
        let mesh = Arc::new(mesh);
        let output = OutputSink::new(
            FrameWriter::new(Arc::clone(&mesh), &config.name, &config.output)?,
            config.output.background,
        )?;

        let mut pool = FieldPool::new(&mesh);
        let builder = LinearSystemBuilder::new(&mesh);
        let [bx, by] = velocity_boundary;
        let mut velocity = VectorField::from_components(
            "velocity",
            ScalarField::from_fn("velocity.x", bx, &mesh, &mut pool, |p| initial_velocity.x.evaluate(p)),
            ScalarField::from_fn("velocity.y", by, &mesh, &mut pool, |p| initial_velocity.y.evaluate(p)),
        );
        let pressure = ScalarField::new("pressure", pressure_boundary, &mut pool);
        let scalars = scalar_setups
            .into_iter()
            .map(|setup| Scalar {
                field: ScalarField::from_fn(setup.name, setup.boundary, &mesh, &mut pool, |p| {
                    setup.initial.evaluate(p)
                }),
                diffusivity: setup.diffusivity,
            })
            .collect();
        velocity.ensure_flux(&mesh, &mut pool);
        let mut mass_flux = pool.acquire_face();
        mass_flux.assign(&velocity.flux());

        info!(
            name = %config.name,
            cells = mesh.cell_num(),
            transient = params.transient.is_some(),
            flow = params.physics.incompressible_flow,
            transport = params.physics.transport,
            "simulation initialized"
        );
        Ok(Self {
            mesh,
            pool,
            builder,
            params,
            velocity,
            pressure,
            scalars,
            mass_flux,
            output,
            step: 0,
            time: 0.0,
            frames: 0,
        })
    }

    /// Runs every step, then tears down. The first error aborts the run.
    pub fn run(mut self) -> Result<RunSummary, SimulationError> {
        let result = self.advance_all();
        if let Err(err) = &result {
            error!(%err, step = self.step, "simulation aborted");
        }
        let summary = RunSummary {
            steps: self.step,
            time: self.time,
            frames: self.frames,
        };
        let finished = self.finalize();
        result?;
        finished?;
        info!(steps = summary.steps, time = summary.time, frames = summary.frames, "simulation finished");
        Ok(summary)
    }

    fn advance_all(&mut self) -> Result<(), SimulationError> {
        self.write_frame()?;
        match self.params.transient {
            Some(transient) => {
                for step in 1..=transient.steps {
                    self.advance(Some(transient.dt))?;
                    if step % transient.output_frequency == 0 || step == transient.steps {
                        self.write_frame()?;
                    }
                }
            }
            None => {
                self.advance(None)?;
                self.write_frame()?;
            }
        }
        Ok(())
    }

    /// One time step, or the whole steady solve when `dt` is `None`.
    pub fn advance(&mut self, dt: Option<f64>) -> Result<(), SimulationError> {
        let mut ws = Workspace {
            mesh: &self.mesh,
            pool: &mut self.pool,
            builder: &mut self.builder,
            solver: &self.params.linear_solver,
        };
        if self.params.physics.incompressible_flow {
            match dt {
                Some(dt) => {
                    let report = projection_step(
                        &mut ws,
                        &mut self.velocity,
                        &mut self.pressure,
                        self.mass_flux.view(),
                        &self.params.fluid,
                        dt,
                    )?;
                    debug!(
                        momentum_x = report.momentum[0].iterations,
                        momentum_y = report.momentum[1].iterations,
                        pressure = report.pressure.iterations,
                        pressure_residual = report.pressure.residual,
                        "projection step"
                    );
                }
                None => {
                    solve_steady(
                        &mut ws,
                        &mut self.velocity,
                        &mut self.pressure,
                        &self.params.fluid,
                        &self.params.simple,
                    )?;
                }
            }
            // transport follows the velocity it just solved for
            self.velocity.ensure_flux(ws.mesh, ws.pool);
            self.mass_flux.assign(&self.velocity.flux());
        }
        if self.params.physics.transport {
            for scalar in self.scalars.iter_mut() {
                let report = advance_scalar(&mut ws, &mut scalar.field, self.mass_flux.view(), scalar.diffusivity, dt)?;
                debug!(scalar = scalar.field.name(), iterations = report.iterations, "scalar advanced");
            }
        }
        self.step += 1;
        self.time += dt.unwrap_or(0.0);
        debug!(step = self.step, time = self.time, "step finished");
        Ok(())
    }

    fn write_frame(&mut self) -> Result<(), SimulationError> {
        let mut fields = Vec::with_capacity(self.scalars.len() + 1);
        fields.push(&self.pressure);
        fields.extend(self.scalars.iter().map(|s| &s.field));
        let (step, time, velocity) = (self.step, self.time, &self.velocity);
        self.output.submit(|frame| frame.fill(step, time, velocity, &fields))?;
        self.frames += 1;
        Ok(())
    }

    /// Closes the output and returns every field buffer to the pool.
    fn finalize(self) -> Result<(), SimulationError> {
        let Self {
            mut pool,
            velocity,
            pressure,
            scalars,
            mass_flux,
            output,
            ..
        } = self;
        let finished = output.finish();
        velocity.release(&mut pool);
        pressure.release(&mut pool);
        for scalar in scalars {
            scalar.field.release(&mut pool);
        }
        pool.release(mass_flux);
        debug!(allocated = pool.allocated(), "field pool released");
        Ok(finished?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{LinearSolverError, SetupError},
        io::param_parser::OutputFormat,
    };
    use approx::assert_relative_eq;
    use std::{fs, path::Path};

    fn config(dir: &Path, body: &str) -> CaseConfig {
        let mut config = CaseConfig::from_json(&format!(
            r#"{{ "name": "run", "mesh": "unused.msh", "density": 1.0, "viscosity": 0.1,
                 "boundaries": {{ "inlet": "inflow", "outlet": "outflow", "walls": "wall" }}
                 {body} }}"#
        ))
        .unwrap();
        config.output.directory = dir.to_path_buf();
        config
    }

    fn read_column(path: &Path, column: &str) -> Vec<f64> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let index = reader.headers().unwrap().iter().position(|h| h == column).unwrap();
        reader
            .records()
            .map(|record| record.unwrap()[index].parse().unwrap())
            .collect()
    }

    #[test]
    fn test_steady_upwind_transport_fills_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(
            dir.path(),
            r#", "physics": { "incompressible_flow": false, "transport": true },
                 "velocity": { "initial": { "x": 0.5 } },
                 "scalars": [ { "name": "dye", "inflow": 1.0 } ]"#,
        );
        config.output.formats = vec![OutputFormat::Csv];
        config.linear_solver.tolerance = 1e-10;
        let summary = Simulation::new(&config, Mesh::channel(10, 3, 5.0, 1.0))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.steps, 1);
        assert_eq!(summary.frames, 2);
        let initial = read_column(&dir.path().join("run_0.csv"), "dye");
        assert!(initial.iter().all(|&c| c == 0.0));
        let dye = read_column(&dir.path().join("run_1.csv"), "dye");
        assert_eq!(dye.len(), 30);
        for c in dye {
            assert_relative_eq!(c, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_transient_channel_writes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            dir.path(),
            r#", "transient": { "dt": 0.05, "steps": 3, "output_frequency": 2 },
                 "velocity": { "inflow": { "x": 1.0 } },
                 "scalars": [ { "name": "dye", "diffusivity": 0.01, "inflow": 1.0 } ]"#,
        );
        let summary = Simulation::new(&config, Mesh::channel(8, 3, 2.0, 1.0))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.steps, 3);
        assert_relative_eq!(summary.time, 0.15);
        assert_eq!(summary.frames, 3);
        for step in [0, 2, 3] {
            assert!(dir.path().join(format!("run_{step}.vtu")).is_file());
        }
        assert!(!dir.path().join("run_1.vtu").exists());
        let pvd = fs::read_to_string(dir.path().join("run.pvd")).unwrap();
        assert_eq!(pvd.matches("<DataSet").count(), 3);
    }

    #[test]
    fn test_steady_flow_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(
            dir.path(),
            r#", "velocity": { "inflow": { "x": { "kind": "parabolic", "axis": "y", "lower": 0.0, "upper": 1.0, "peak": 1.0 } } },
                 "simple": { "iterations": 5, "momentum_relaxation": 0.7, "pressure_relaxation": 0.3 }"#,
        );
        config.output.background = true;
        config.output.formats = vec![OutputFormat::Vtu, OutputFormat::Csv];
        let summary = Simulation::new(&config, Mesh::channel(6, 3, 2.0, 1.0))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.frames, 2);
        let ux = read_column(&dir.path().join("run_1.csv"), "velocity.x");
        assert!(ux.iter().all(|u| u.is_finite()));
        assert!(ux.iter().sum::<f64>() > 0.0);
        assert!(dir.path().join("run_1.vtu").is_file());
    }

    #[test]
    fn test_solver_failure_aborts_run_and_closes_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            dir.path(),
            r#", "transient": { "dt": 0.05, "steps": 4 },
                 "velocity": { "inflow": { "x": 1.0 } },
                 "linear_solver": { "max_iterations": 1, "tolerance": 1e-14 }"#,
        );
        let result = Simulation::new(&config, Mesh::channel(6, 3, 2.0, 1.0))
            .unwrap()
            .run();
        match result {
            Err(SimulationError::Coupling(err)) => {
                assert_eq!(err.equation, "momentum-x");
                assert!(matches!(err.source, LinearSolverError::NotConverged { iterations: 1, .. }));
            }
            other => panic!("expected a coupling failure, got {other:?}"),
        }
        // only the initial frame was written before the abort
        assert!(dir.path().join("run_0.vtu").is_file());
        assert!(!dir.path().join("run_1.vtu").exists());
        let pvd = fs::read_to_string(dir.path().join("run.pvd")).unwrap();
        assert_eq!(pvd.matches("<DataSet").count(), 1);
        assert!(pvd.trim_end().ends_with("</VTKFile>"));
        assert!(pvd.contains("</Collection>"));
    }

    #[test]
    fn test_setup_errors_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "");
        let result = Simulation::new(&config, Mesh::channel(2, 1, 2.0, 1.0));
        assert!(matches!(
            result,
            Err(SimulationError::Setup(SetupError::MissingInflowProfile { .. }))
        ));
    }
}

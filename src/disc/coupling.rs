//! Pressure-velocity coupling and scalar transport, built from the
//! operators and solved with the linear solvers.

use ndarray::{Array1, ArrayView1};

use super::{
    field::{ScalarField, pool::FieldPool},
    linear_solver::{SolveReport, SolverSettings, solve_general, solve_symmetric},
    linear_system::{LinearSystemBuilder, Mode},
    mesh::Mesh,
    operators::{Diffusivity, advection, diffusion, transient},
};
use crate::error::CouplingError;

pub mod projection;
pub mod simple;
pub mod transport;

/// Everything a coupling step borrows from the running simulation.
pub struct Workspace<'a> {
    pub mesh: &'a Mesh,
    pub pool: &'a mut FieldPool,
    pub builder: &'a mut LinearSystemBuilder,
    pub solver: &'a SolverSettings,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fluid {
    pub density: f64,
    pub kinematic_viscosity: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverKind {
    /// Conjugate gradient, for the symmetric pressure equations.
    Symmetric,
    /// Gauss-Seidel, for advection-diffusion equations.
    General,
}

/// Solves the system currently held by the builder, starting from
/// `initial`. The solution buffer comes from the pool and must be released
/// by the caller; on failure it has already been released.
pub(crate) fn solve_into(
    ws: &mut Workspace,
    kind: SolverKind,
    equation: &str,
    initial: ArrayView1<f64>,
) -> Result<(Array1<f64>, SolveReport), CouplingError> {
    let mut solution = ws.pool.acquire_cell();
    solution.assign(&initial);
    let system = ws.builder.system();
    let result = match kind {
        SolverKind::Symmetric => solve_symmetric(&system, solution.view_mut(), ws.pool, ws.solver),
        SolverKind::General => solve_general(&system, solution.view_mut(), ws.pool, ws.solver),
    };
    match result {
        Ok(report) => Ok((solution, report)),
        Err(err) => {
            ws.pool.release(solution);
            Err(CouplingError::new(equation, err))
        }
    }
}

/// Assembles `[V/dt] + div(F u) - nu lap(u) = -grad(p)/rho` for one velocity
/// component. The component's gradient must be up to date.
fn assemble_momentum(
    ws: &mut Workspace,
    component: &ScalarField,
    flux: ArrayView1<f64>,
    pressure_gradient: ArrayView1<f64>,
    fluid: &Fluid,
    dt: Option<f64>,
) {
    let builder = &mut *ws.builder;
    builder.reset();
    for icell in 0..ws.mesh.cell_num() {
        builder.start_cell(icell);
        if let Some(dt) = dt {
            transient(builder, ws.mesh, component.values(), dt);
        }
        advection(builder, ws.mesh, component, flux);
        builder.add_source_density(-pressure_gradient[icell] / fluid.density);
        builder.set_mode(Mode::Subtract);
        diffusion(
            builder,
            ws.mesh,
            component,
            Diffusivity::Uniform(fluid.kinematic_viscosity),
        );
        builder.end_cell();
    }
}

const MOMENTUM: [&str; 2] = ["momentum-x", "momentum-y"];

/// Assembles and solves the momentum equation of velocity component `c`,
/// starting from its current values. The caller owns the returned buffer.
pub(crate) fn solve_momentum(
    ws: &mut Workspace,
    component: &mut ScalarField,
    c: usize,
    flux: ArrayView1<f64>,
    pressure_gradient: ArrayView1<f64>,
    fluid: &Fluid,
    dt: Option<f64>,
) -> Result<(Array1<f64>, SolveReport), CouplingError> {
    component.ensure_gradient(ws.mesh, ws.pool);
    assemble_momentum(ws, component, flux, pressure_gradient, fluid, dt);
    solve_into(ws, SolverKind::General, MOMENTUM[c], component.values())
}

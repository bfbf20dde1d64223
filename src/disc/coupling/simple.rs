use ndarray::{Array1, Zip};
use serde::Deserialize;
use tracing::{debug, info};

use super::{Fluid, SolverKind, Workspace, solve_into, solve_momentum};
use crate::{
    disc::{
        boundary::BoundaryConditions,
        field::{ScalarField, VectorField, derived, pool::FieldPool},
        linear_system::Mode,
        mesh::Mesh,
        operators::{Diffusivity, diffusion},
    },
    error::CouplingError,
};

/// Outer-loop controls of the steady pressure-velocity coupling.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimpleSettings {
    pub iterations: usize,
    /// Weight of the new momentum solution when blending with the old velocity.
    pub momentum_relaxation: f64,
    /// Fraction of the pressure correction applied per iteration.
    pub pressure_relaxation: f64,
    /// Stop early once the mean |p'| falls below this value.
    pub tolerance: Option<f64>,
}
impl Default for SimpleSettings {
    fn default() -> Self {
        Self {
            iterations: 30,
            momentum_relaxation: 1.0,
            pressure_relaxation: 1.0,
            tolerance: Some(1e-5),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimpleReport {
    pub iterations: usize,
    /// Mean |p'| of the last iteration.
    pub correction: f64,
    pub converged: bool,
}

/// Buffers reused across the outer iterations of one steady solve.
struct Scratch {
    flux: Array1<f64>,
    h: [Array1<f64>; 2],
    h_face: [Array1<f64>; 2],
    h_flux: Array1<f64>,
    h_divergence: Array1<f64>,
    d: Array1<f64>,
    d_face: Array1<f64>,
    extrapolate: BoundaryConditions,
    correction: ScalarField,
}
impl Scratch {
    fn acquire(mesh: &Mesh, pool: &mut FieldPool, pressure: &ScalarField) -> Self {
        Self {
            flux: pool.acquire_face(),
            h: [pool.acquire_cell(), pool.acquire_cell()],
            h_face: [pool.acquire_face(), pool.acquire_face()],
            h_flux: pool.acquire_face(),
            h_divergence: pool.acquire_cell(),
            d: pool.acquire_cell(),
            d_face: pool.acquire_face(),
            extrapolate: BoundaryConditions::zero_gradient(mesh),
            correction: ScalarField::new("pressure-correction", pressure.boundary().homogeneous(), pool),
        }
    }
    fn release(self, pool: &mut FieldPool) {
        let Self {
            flux,
            h: [hx, hy],
            h_face: [hx_face, hy_face],
            h_flux,
            h_divergence,
            d,
            d_face,
            correction,
            ..
        } = self;
        for buffer in [flux, hx, hy, hx_face, hy_face, h_flux, h_divergence, d, d_face] {
            pool.release(buffer);
        }
        correction.release(pool);
    }
}

/// Steady SIMPLE iteration: at most `settings.iterations` outer passes,
/// stopping early once the pressure correction is below the tolerance.
pub fn solve_steady(
    ws: &mut Workspace,
    velocity: &mut VectorField,
    pressure: &mut ScalarField,
    fluid: &Fluid,
    settings: &SimpleSettings,
) -> Result<SimpleReport, CouplingError> {
    let mut scratch = Scratch::acquire(ws.mesh, ws.pool, pressure);
    let mut report = SimpleReport {
        iterations: 0,
        correction: f64::INFINITY,
        converged: false,
    };
    let mut result = Ok(());
    for iteration in 1..=settings.iterations {
        match iterate(ws, &mut scratch, velocity, pressure, fluid, settings) {
            Ok(correction) => {
                report.iterations = iteration;
                report.correction = correction;
                debug!(iteration, correction, "simple iteration");
                if settings.tolerance.is_some_and(|tolerance| correction < tolerance) {
                    report.converged = true;
                    break;
                }
            }
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    scratch.release(ws.pool);
    result?;
    info!(
        iterations = report.iterations,
        correction = report.correction,
        converged = report.converged,
        "simple finished"
    );
    Ok(report)
}

/// One outer pass; returns the mean |p'|.
fn iterate(
    ws: &mut Workspace,
    scratch: &mut Scratch,
    velocity: &mut VectorField,
    pressure: &mut ScalarField,
    fluid: &Fluid,
    settings: &SimpleSettings,
) -> Result<f64, CouplingError> {
    let mesh = ws.mesh;
    velocity.ensure_flux(mesh, ws.pool);
    scratch.flux.assign(&velocity.flux());
    pressure.ensure_gradient(mesh, ws.pool);

    // momentum predictor, then H = (b - sum a_n u_n)/a_p + D grad(p)
    scratch.d.fill(0.0);
    let alpha = settings.momentum_relaxation;
    for c in 0..2 {
        let gradient = pressure.gradient()[c];
        let component = velocity.component_mut(c);
        let (solved, _) = solve_momentum(ws, component, c, scratch.flux.view(), gradient, fluid, None)?;
        component.mutate(ws.pool, |mut u| {
            Zip::from(&mut u)
                .and(&solved)
                .for_each(|u, &s| *u = alpha * s + (1.0 - alpha) * *u);
        });
        ws.pool.release(solved);

        let system = ws.builder.system();
        let u = component.values();
        for (icell, cell) in mesh.cells.iter().enumerate() {
            let a_p = system.diagonal(icell);
            let d = cell.volume / (fluid.density * a_p);
            scratch.h[c][icell] =
                (system.source[icell] - system.off_diagonal_dot(icell, u)) / a_p + d * gradient[icell];
            scratch.d[icell] += 0.5 * d;
        }
    }

    // div(D grad(p)) = div(H)
    derived::interpolate_to_faces(mesh, scratch.d.view(), &scratch.extrapolate, scratch.d_face.view_mut());
    for c in 0..2 {
        derived::interpolate_to_faces(
            mesh,
            scratch.h[c].view(),
            velocity.component(c).boundary(),
            scratch.h_face[c].view_mut(),
        );
    }
    derived::compute_flux(
        mesh,
        scratch.h_face[0].view(),
        scratch.h_face[1].view(),
        scratch.h_flux.view_mut(),
    );
    derived::compute_divergence(mesh, scratch.h_flux.view(), scratch.h_divergence.view_mut());
    {
        let builder = &mut *ws.builder;
        builder.reset();
        for icell in 0..mesh.cell_num() {
            builder.start_cell(icell);
            builder.set_mode(Mode::Subtract);
            diffusion(builder, mesh, pressure, Diffusivity::PerFace(scratch.d_face.view()));
            builder.add_source_density(scratch.h_divergence[icell]);
            builder.end_cell();
        }
    }
    let (solved, _) = solve_into(ws, SolverKind::Symmetric, "pressure", pressure.values())?;

    // p' = p_new - p_old
    let old = pressure.values();
    scratch.correction.mutate(ws.pool, |mut correction| {
        Zip::from(&mut correction)
            .and(&solved)
            .and(&old)
            .for_each(|p, &new, &old| *p = new - old);
    });
    ws.pool.release(solved);
    let mean_correction =
        scratch.correction.values().iter().map(|p| p.abs()).sum::<f64>() / mesh.cell_num() as f64;

    scratch.correction.ensure_gradient(mesh, ws.pool);
    let gradient = scratch.correction.gradient();
    velocity.begin_mutation(ws.pool);
    for (mut u, g) in velocity.values_mut().into_iter().zip(gradient) {
        Zip::from(&mut u)
            .and(&g)
            .and(&scratch.d)
            .for_each(|u, &g, &d| *u -= d * g);
    }
    velocity.end_mutation();
    let correction = scratch.correction.values();
    pressure.mutate(ws.pool, |mut p| p.scaled_add(settings.pressure_relaxation, &correction));
    Ok(mean_correction)
}

use ndarray::{Array1, ArrayView1};

use super::{Fluid, SolverKind, Workspace, solve_into, solve_momentum};
use crate::{
    disc::{
        field::{ScalarField, VectorField},
        linear_solver::SolveReport,
        linear_system::Mode,
        operators::{Diffusivity, diffusion},
    },
    error::CouplingError,
};

#[derive(Clone, Copy, Debug)]
pub struct ProjectionReport {
    pub momentum: [SolveReport; 2],
    pub pressure: SolveReport,
}

/// One incremental pressure-projection time step.
///
/// Momentum is advanced with the current pressure gradient as an explicit
/// source, then `-lap(p') = -(rho/dt) div(u*)` is solved for the pressure
/// correction, and `u -= dt/rho grad(p')`, `p += p'`.
pub fn projection_step(
    ws: &mut Workspace,
    velocity: &mut VectorField,
    pressure: &mut ScalarField,
    flux: ArrayView1<f64>,
    fluid: &Fluid,
    dt: f64,
) -> Result<ProjectionReport, CouplingError> {
    pressure.ensure_gradient(ws.mesh, ws.pool);
    let (predicted, momentum) = predict_velocity(ws, velocity, pressure, flux, fluid, dt)?;
    velocity.begin_mutation(ws.pool);
    for (mut values, buffer) in velocity.values_mut().into_iter().zip(predicted.iter()) {
        values.assign(buffer);
    }
    velocity.end_mutation();
    for buffer in predicted {
        ws.pool.release(buffer);
    }
    velocity.ensure_divergence(ws.mesh, ws.pool);

    let mut correction = ScalarField::new("pressure-correction", pressure.boundary().homogeneous(), ws.pool);
    correction.ensure_gradient(ws.mesh, ws.pool);
    {
        let divergence = velocity.divergence();
        let builder = &mut *ws.builder;
        builder.reset();
        for icell in 0..ws.mesh.cell_num() {
            builder.start_cell(icell);
            builder.set_mode(Mode::Subtract);
            diffusion(builder, ws.mesh, &correction, Diffusivity::Uniform(1.0));
            builder.add_source_density(fluid.density / dt * divergence[icell]);
            builder.end_cell();
        }
    }
    let initial = ws.pool.acquire_cell();
    let solved = solve_into(ws, SolverKind::Symmetric, "pressure", initial.view());
    ws.pool.release(initial);
    let (solution, pressure_report) = solved?;
    correction.mutate(ws.pool, |mut values| values.assign(&solution));
    ws.pool.release(solution);
    correction.ensure_gradient(ws.mesh, ws.pool);

    let scale = dt / fluid.density;
    let gradient = correction.gradient();
    velocity.begin_mutation(ws.pool);
    for (mut values, g) in velocity.values_mut().into_iter().zip(gradient) {
        values.scaled_add(-scale, &g);
    }
    velocity.end_mutation();
    pressure.mutate(ws.pool, |mut p| p += &correction.values());
    correction.release(ws.pool);
    Ok(ProjectionReport {
        momentum,
        pressure: pressure_report,
    })
}

/// Solves both momentum components from the same old velocity; nothing is
/// written back to `velocity`.
fn predict_velocity(
    ws: &mut Workspace,
    velocity: &mut VectorField,
    pressure: &ScalarField,
    flux: ArrayView1<f64>,
    fluid: &Fluid,
    dt: f64,
) -> Result<([Array1<f64>; 2], [SolveReport; 2]), CouplingError> {
    let gradient = pressure.gradient();
    let (x, rx) = solve_momentum(ws, velocity.component_mut(0), 0, flux, gradient[0], fluid, Some(dt))?;
    match solve_momentum(ws, velocity.component_mut(1), 1, flux, gradient[1], fluid, Some(dt)) {
        Ok((y, ry)) => Ok(([x, y], [rx, ry])),
        Err(err) => {
            ws.pool.release(x);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::{
        boundary::{BoundaryCondition, BoundaryConditions},
        field::pool::FieldPool,
        linear_solver::SolverSettings,
        linear_system::LinearSystemBuilder,
        mesh::Mesh,
    };

    fn fluid() -> Fluid {
        Fluid {
            density: 1.0,
            kinematic_viscosity: 0.1,
        }
    }

    #[test]
    fn test_fluid_at_rest_stays_at_rest() {
        let mesh = Mesh::triangulated_rectangle(4, 3, 1.0, 1.0);
        let mut pool = FieldPool::new(&mesh);
        let mut builder = LinearSystemBuilder::new(&mesh);
        let settings = SolverSettings::default();
        let mut walls = BoundaryConditions::new();
        for group in mesh.boundary_groups() {
            walls.insert(group, BoundaryCondition::dirichlet(0.0));
        }
        let mut velocity = VectorField::new("velocity", [walls.clone(), walls], &mut pool);
        let mut pressure = ScalarField::new("pressure", BoundaryConditions::zero_gradient(&mesh), &mut pool);
        let flux = Array1::zeros(mesh.face_num());
        let mut ws = Workspace {
            mesh: &mesh,
            pool: &mut pool,
            builder: &mut builder,
            solver: &settings,
        };
        let report = projection_step(&mut ws, &mut velocity, &mut pressure, flux.view(), &fluid(), 0.1).unwrap();
        assert_eq!(report.pressure.iterations, 0);
        assert!(report.momentum.iter().all(|m| m.residual < settings.tolerance));
        for i in 0..2 {
            assert!(velocity.component(i).values().iter().all(|v| v.abs() < 1e-12));
        }
        assert!(pressure.values().iter().all(|p| p.abs() < 1e-12));
        velocity.release(&mut pool);
        pressure.release(&mut pool);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_channel_steps_stay_bounded() {
        let mesh = Mesh::channel(12, 4, 3.0, 1.0);
        let inlet = mesh.group_id("inlet").unwrap();
        let outlet = mesh.group_id("outlet").unwrap();
        let walls = mesh.group_id("walls").unwrap();
        let mut pool = FieldPool::new(&mesh);
        let mut builder = LinearSystemBuilder::new(&mesh);
        let settings = SolverSettings::default();
        let bx = BoundaryConditions::new()
            .with(inlet, BoundaryCondition::dirichlet(1.0))
            .with(outlet, BoundaryCondition::neumann(0.0))
            .with(walls, BoundaryCondition::dirichlet(0.0));
        let by = BoundaryConditions::new()
            .with(inlet, BoundaryCondition::dirichlet(0.0))
            .with(outlet, BoundaryCondition::neumann(0.0))
            .with(walls, BoundaryCondition::dirichlet(0.0));
        let bp = BoundaryConditions::new()
            .with(inlet, BoundaryCondition::neumann(0.0))
            .with(outlet, BoundaryCondition::dirichlet(0.0))
            .with(walls, BoundaryCondition::neumann(0.0));
        let mut velocity = VectorField::new("velocity", [bx, by], &mut pool);
        let mut pressure = ScalarField::new("pressure", bp, &mut pool);
        let mut flux = pool.acquire_face();
        for _ in 0..5 {
            velocity.ensure_flux(&mesh, &mut pool);
            flux.assign(&velocity.flux());
            let mut ws = Workspace {
                mesh: &mesh,
                pool: &mut pool,
                builder: &mut builder,
                solver: &settings,
            };
            projection_step(&mut ws, &mut velocity, &mut pressure, flux.view(), &fluid(), 0.05).unwrap();
        }
        let ux = velocity.x().values();
        assert!(ux.iter().all(|v| v.is_finite() && v.abs() < 2.0));
        let mean = ux.sum() / ux.len() as f64;
        assert!(mean > 0.0);
        // pressure drives the flow from inlet to outlet
        let first = pressure.values()[0];
        let last = pressure.values()[11];
        assert!(first > last);
        pool.release(flux);
        velocity.release(&mut pool);
        pressure.release(&mut pool);
        assert_eq!(pool.outstanding(), 0);
    }
}

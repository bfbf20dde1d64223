use ndarray::ArrayView1;
use tracing::debug;

use super::{SolverKind, Workspace, solve_into};
use crate::{
    disc::{
        field::ScalarField,
        linear_solver::SolveReport,
        linear_system::Mode,
        operators::{Diffusivity, advection, diffusion, transient},
    },
    error::CouplingError,
};

/// Advances a passive scalar by one implicit solve of
/// `[V/dt] + div(F phi) - D lap(phi) = 0`; steady when `dt` is `None`.
pub fn advance_scalar(
    ws: &mut Workspace,
    scalar: &mut ScalarField,
    flux: ArrayView1<f64>,
    diffusivity: f64,
    dt: Option<f64>,
) -> Result<SolveReport, CouplingError> {
    scalar.ensure_gradient(ws.mesh, ws.pool);
    {
        let builder = &mut *ws.builder;
        builder.reset();
        for icell in 0..ws.mesh.cell_num() {
            builder.start_cell(icell);
            if let Some(dt) = dt {
                transient(builder, ws.mesh, scalar.values(), dt);
            }
            advection(builder, ws.mesh, scalar, flux);
            builder.set_mode(Mode::Subtract);
            diffusion(builder, ws.mesh, scalar, Diffusivity::Uniform(diffusivity));
            builder.end_cell();
        }
    }
    let equation = format!("scalar:{}", scalar.name());
    let (solution, report) = solve_into(ws, SolverKind::General, &equation, scalar.values())?;
    scalar.mutate(ws.pool, |mut values| values.assign(&solution));
    ws.pool.release(solution);
    debug!(scalar = scalar.name(), iterations = report.iterations, "scalar transported");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::{
        boundary::{BoundaryCondition, BoundaryConditions},
        field::{VectorField, pool::FieldPool},
        linear_solver::SolverSettings,
        linear_system::LinearSystemBuilder,
        mesh::{
            Mesh,
            mesh2d::{INLET, OUTLET, WALLS},
        },
    };
    use approx::assert_relative_eq;

    fn groups(mesh: &Mesh) -> [usize; 3] {
        [INLET, OUTLET, WALLS].map(|name| mesh.group_id(name).unwrap())
    }

    fn channel_velocity(mesh: &Mesh, pool: &mut FieldPool) -> VectorField {
        let [inlet, outlet, walls] = groups(mesh);
        let bx = BoundaryConditions::new()
            .with(inlet, BoundaryCondition::dirichlet(0.5))
            .with(outlet, BoundaryCondition::neumann(0.0))
            .with(walls, BoundaryCondition::dirichlet(0.0));
        let by = BoundaryConditions::new()
            .with(inlet, BoundaryCondition::dirichlet(0.0))
            .with(outlet, BoundaryCondition::neumann(0.0))
            .with(walls, BoundaryCondition::dirichlet(0.0));
        let mut u = VectorField::new("velocity", [bx, by], pool);
        u.component_mut(0).mutate(pool, |mut ux| ux.fill(0.5));
        u
    }

    #[test]
    fn test_pure_advection_carries_inflow_value_downstream() {
        let mesh = Mesh::channel(10, 3, 5.0, 1.0);
        let mut pool = FieldPool::new(&mesh);
        let mut builder = LinearSystemBuilder::new(&mesh);
        let settings = SolverSettings::default();
        let mut u = channel_velocity(&mesh, &mut pool);
        u.ensure_flux(&mesh, &mut pool);
        let [inlet, outlet, walls] = groups(&mesh);
        let bcs = BoundaryConditions::new()
            .with(inlet, BoundaryCondition::dirichlet(1.0))
            .with(outlet, BoundaryCondition::neumann(0.0))
            .with(walls, BoundaryCondition::neumann(0.0));
        let mut dye = ScalarField::new("dye", bcs, &mut pool);
        let mut ws = Workspace {
            mesh: &mesh,
            pool: &mut pool,
            builder: &mut builder,
            solver: &settings,
        };
        advance_scalar(&mut ws, &mut dye, u.flux(), 0.0, None).unwrap();
        for &value in dye.values().iter() {
            assert_relative_eq!(value, 1.0, epsilon = 1e-5);
        }
        dye.release(&mut pool);
        u.release(&mut pool);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_transient_step_without_flow_keeps_uniform_field() {
        let mesh = Mesh::triangulated_rectangle(4, 4, 1.0, 1.0);
        let mut pool = FieldPool::new(&mesh);
        let mut builder = LinearSystemBuilder::new(&mesh);
        let settings = SolverSettings::default();
        let flux = ndarray::Array1::zeros(mesh.face_num());
        let mut dye = ScalarField::from_fn(
            "dye",
            BoundaryConditions::zero_gradient(&mesh),
            &mesh,
            &mut pool,
            |_| 0.3,
        );
        let mut ws = Workspace {
            mesh: &mesh,
            pool: &mut pool,
            builder: &mut builder,
            solver: &settings,
        };
        advance_scalar(&mut ws, &mut dye, flux.view(), 0.1, Some(0.01)).unwrap();
        assert_eq!(dye.revision(), 1);
        for &value in dye.values().iter() {
            assert_relative_eq!(value, 0.3, epsilon = 1e-6);
        }
        dye.release(&mut pool);
    }
}

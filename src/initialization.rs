use hashbrown::HashMap;

use crate::{
    disc::{
        boundary::{BoundaryCondition, BoundaryConditions, BoundaryKind},
        coupling::{Fluid, simple::SimpleSettings},
        linear_solver::SolverSettings,
        mesh::Mesh,
    },
    error::SetupError,
    io::param_parser::{CaseConfig, Physics, Profile, TransientConfig, VectorProfile},
};

pub struct SolverParameters {
    pub fluid: Fluid,
    pub physics: Physics,
    /// `None` for a steady run.
    pub transient: Option<TransientConfig>,
    pub simple: SimpleSettings,
    pub linear_solver: SolverSettings,
}

pub struct ScalarSetup {
    pub name: String,
    pub diffusivity: f64,
    pub boundary: BoundaryConditions,
    pub initial: Profile,
}

/// Boundary conditions and initial profiles of every field of a case.
pub struct FieldSetup {
    pub velocity: [BoundaryConditions; 2],
    pub pressure: BoundaryConditions,
    pub initial_velocity: VectorProfile,
    pub scalars: Vec<ScalarSetup>,
}

pub fn initialize_params(config: &CaseConfig) -> Result<SolverParameters, SetupError> {
    if let Some(transient) = config.transient {
        if !(transient.dt.is_finite() && transient.dt > 0.0) {
            return Err(SetupError::InvalidTransient(format!(
                "dt must be positive, got {}",
                transient.dt
            )));
        }
        if transient.steps == 0 {
            return Err(SetupError::InvalidTransient("steps must be at least 1".to_string()));
        }
        if transient.output_frequency == 0 {
            return Err(SetupError::InvalidTransient(
                "output_frequency must be at least 1".to_string(),
            ));
        }
    }
    Ok(SolverParameters {
        fluid: Fluid {
            density: config.density,
            kinematic_viscosity: config.kinematic_viscosity(),
        },
        physics: config.physics,
        transient: config.transient,
        simple: config.simple,
        linear_solver: config.linear_solver,
    })
}

/// Name and kind of every boundary group of the mesh.
fn boundary_kinds(config: &CaseConfig, mesh: &Mesh) -> Result<HashMap<usize, (String, BoundaryKind)>, SetupError> {
    for name in config.boundaries.keys() {
        if mesh.group_id(name).is_none() {
            return Err(SetupError::UnknownBoundary(name.clone()));
        }
    }
    let mut kinds = HashMap::new();
    for group in mesh.boundary_groups() {
        let name = match mesh.boundary_name(group) {
            Some(name) => name.to_string(),
            None => return Err(SetupError::UnmappedBoundary(format!("#{group}"))),
        };
        match config.boundaries.get(&name) {
            Some(&kind) => {
                kinds.insert(group, (name, kind));
            }
            None => return Err(SetupError::UnmappedBoundary(name)),
        }
    }
    Ok(kinds)
}

fn missing_inflow(field: &str, boundary: &str) -> SetupError {
    SetupError::MissingInflowProfile {
        field: field.to_string(),
        boundary: boundary.to_string(),
    }
}

pub fn initialize_boundaries(config: &CaseConfig, mesh: &Mesh) -> Result<FieldSetup, SetupError> {
    let kinds = boundary_kinds(config, mesh)?;
    let initial_velocity = config.velocity.initial.clone().unwrap_or_default();
    // a prescribed (not solved) velocity may take its inflow from the initial field
    let velocity_inflow = match (&config.velocity.inflow, config.physics.incompressible_flow) {
        (Some(inflow), _) => Some(inflow),
        (None, false) => Some(&initial_velocity),
        (None, true) => None,
    };

    let mut velocity = [BoundaryConditions::new(), BoundaryConditions::new()];
    let mut pressure = BoundaryConditions::new();
    for (&group, (name, kind)) in kinds.iter() {
        match kind {
            BoundaryKind::Wall => {
                for component in velocity.iter_mut() {
                    component.insert(group, BoundaryCondition::dirichlet(0.0));
                }
                pressure.insert(group, BoundaryCondition::neumann(0.0));
            }
            BoundaryKind::Inflow => {
                let profile = velocity_inflow.ok_or_else(|| missing_inflow("velocity", name))?;
                for (c, component) in velocity.iter_mut().enumerate() {
                    let shape = profile.component(c);
                    component.insert(group, BoundaryCondition::dirichlet_with(mesh, group, |p| shape.evaluate(p)));
                }
                pressure.insert(group, BoundaryCondition::neumann(0.0));
            }
            BoundaryKind::Outflow => {
                for component in velocity.iter_mut() {
                    component.insert(group, BoundaryCondition::neumann(0.0));
                }
                // fixed outlet pressure; the outflow pressure gradient is neglected
                pressure.insert(group, BoundaryCondition::dirichlet(0.0));
            }
        }
    }

    let mut scalars = Vec::with_capacity(config.scalars.len());
    for scalar in config.scalars.iter() {
        let mut boundary = BoundaryConditions::new();
        for (&group, (name, kind)) in kinds.iter() {
            let condition = match kind {
                BoundaryKind::Inflow => {
                    let profile = scalar
                        .inflow
                        .as_ref()
                        .ok_or_else(|| missing_inflow(&scalar.name, name))?;
                    BoundaryCondition::dirichlet_with(mesh, group, |p| profile.evaluate(p))
                }
                BoundaryKind::Wall | BoundaryKind::Outflow => BoundaryCondition::neumann(0.0),
            };
            boundary.insert(group, condition);
        }
        boundary.validate(&scalar.name, mesh)?;
        scalars.push(ScalarSetup {
            name: scalar.name.clone(),
            diffusivity: scalar.diffusivity,
            boundary,
            initial: scalar.initial.clone().unwrap_or_default(),
        });
    }

    velocity[0].validate("velocity.x", mesh)?;
    velocity[1].validate("velocity.y", mesh)?;
    pressure.validate("pressure", mesh)?;
    Ok(FieldSetup {
        velocity,
        pressure,
        initial_velocity,
        scalars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::boundary::ConditionKind;
    use approx::assert_relative_eq;

    fn config(extra: &str) -> CaseConfig {
        CaseConfig::from_json(&format!(
            r#"{{ "name": "c", "mesh": "m.msh", "density": 2.0, "viscosity": 0.5,
                 "boundaries": {{ "inlet": "inflow", "outlet": "outflow", "walls": "wall" }}
                 {extra} }}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_boundary_table() {
        let mesh = Mesh::channel(4, 2, 4.0, 2.0);
        let config = config(
            r#", "velocity": { "inflow": { "x": { "kind": "linear", "dy": 1.0 } } },
                 "scalars": [ { "name": "dye", "inflow": 1.0 } ]"#,
        );
        let setup = initialize_boundaries(&config, &mesh).unwrap();
        let inlet = mesh.group_id("inlet").unwrap();
        let outlet = mesh.group_id("outlet").unwrap();
        let walls = mesh.group_id("walls").unwrap();

        let ux_in = setup.velocity[0].for_group(inlet);
        assert_eq!(ux_in.kind, ConditionKind::Dirichlet);
        let iface = mesh
            .faces
            .iter()
            .position(|f| f.boundary_group() == Some(inlet) && f.pos.y > 1.0)
            .unwrap();
        assert_relative_eq!(ux_in.value_at(iface), 1.5);
        assert_eq!(setup.velocity[1].for_group(inlet).value_at(iface), 0.0);
        assert_eq!(setup.velocity[0].for_group(walls), &BoundaryCondition::dirichlet(0.0));
        assert_eq!(setup.velocity[1].for_group(outlet), &BoundaryCondition::neumann(0.0));
        assert_eq!(setup.pressure.for_group(outlet), &BoundaryCondition::dirichlet(0.0));
        assert_eq!(setup.pressure.for_group(inlet), &BoundaryCondition::neumann(0.0));
        assert_eq!(setup.scalars[0].boundary.for_group(walls), &BoundaryCondition::neumann(0.0));
        assert_eq!(setup.scalars[0].boundary.for_group(inlet).value_at(iface), 1.0);
        assert_eq!(setup.scalars[0].initial, Profile::Constant(0.0));
    }

    #[test]
    fn test_params() {
        let config = config(r#", "transient": { "dt": 0.1, "steps": 4 }"#);
        let params = initialize_params(&config).unwrap();
        assert_relative_eq!(params.fluid.kinematic_viscosity, 0.25);
        assert_eq!(params.transient.unwrap().output_frequency, 1);
        let bad = self::config(r#", "transient": { "dt": 0.0, "steps": 4 }"#);
        assert!(matches!(initialize_params(&bad), Err(SetupError::InvalidTransient(_))));
        let bad = self::config(r#", "transient": { "dt": 0.1, "steps": 4, "output_frequency": 0 }"#);
        assert!(matches!(initialize_params(&bad), Err(SetupError::InvalidTransient(_))));
    }

    #[test]
    fn test_missing_inflow_profile() {
        let mesh = Mesh::channel(2, 1, 2.0, 1.0);
        let result = initialize_boundaries(&config(""), &mesh);
        assert!(matches!(
            result,
            Err(SetupError::MissingInflowProfile { field, boundary }) if field == "velocity" && boundary == "inlet"
        ));
        let config = config(r#", "velocity": { "inflow": { "x": 1.0 } }, "scalars": [ { "name": "dye" } ]"#);
        assert!(matches!(
            initialize_boundaries(&config, &mesh),
            Err(SetupError::MissingInflowProfile { field, .. }) if field == "dye"
        ));
    }

    #[test]
    fn test_prescribed_velocity_uses_initial_inflow() {
        let mesh = Mesh::channel(2, 1, 2.0, 1.0);
        let config = config(
            r#", "physics": { "incompressible_flow": false },
                 "velocity": { "initial": { "x": 0.5 } }"#,
        );
        let setup = initialize_boundaries(&config, &mesh).unwrap();
        let inlet = mesh.group_id("inlet").unwrap();
        let iface = mesh.faces.iter().position(|f| f.boundary_group() == Some(inlet)).unwrap();
        assert_eq!(setup.velocity[0].for_group(inlet).value_at(iface), 0.5);
    }

    #[test]
    fn test_boundary_names_must_match_mesh() {
        let mesh = Mesh::channel(2, 1, 2.0, 1.0);
        let mut unknown = config(r#", "velocity": { "inflow": { "x": 1.0 } }"#);
        unknown.boundaries.insert("top".to_string(), BoundaryKind::Wall);
        assert!(matches!(
            initialize_boundaries(&unknown, &mesh),
            Err(SetupError::UnknownBoundary(name)) if name == "top"
        ));
        let mut unmapped = config(r#", "velocity": { "inflow": { "x": 1.0 } }"#);
        unmapped.boundaries.remove("walls");
        assert!(matches!(
            initialize_boundaries(&unmapped, &mesh),
            Err(SetupError::UnmappedBoundary(name)) if name == "walls"
        ));
    }
}

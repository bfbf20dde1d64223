use hashbrown::HashMap;
use nalgebra::Vector2;
use serde::Deserialize;

use super::mesh::Mesh;
use crate::error::SetupError;

/// Physical role of a named boundary, as given in the case file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    Wall,
    Inflow,
    Outflow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionKind {
    Dirichlet,
    /// The value is the outward normal derivative.
    Neumann,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BoundaryValue {
    Uniform(f64),
    /// One value per boundary face id of the group.
    PerFace(HashMap<usize, f64>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryCondition {
    pub kind: ConditionKind,
    pub value: BoundaryValue,
}
impl BoundaryCondition {
    pub fn dirichlet(value: f64) -> Self {
        Self {
            kind: ConditionKind::Dirichlet,
            value: BoundaryValue::Uniform(value),
        }
    }
    pub fn neumann(value: f64) -> Self {
        Self {
            kind: ConditionKind::Neumann,
            value: BoundaryValue::Uniform(value),
        }
    }
    /// Dirichlet values of `f` at the midpoint of every face of `group`.
    pub fn dirichlet_with(mesh: &Mesh, group: usize, f: impl Fn(Vector2<f64>) -> f64) -> Self {
        let values = mesh
            .faces
            .iter()
            .enumerate()
            .filter(|(_, face)| face.boundary_group() == Some(group))
            .map(|(iface, face)| (iface, f(face.pos)))
            .collect();
        Self {
            kind: ConditionKind::Dirichlet,
            value: BoundaryValue::PerFace(values),
        }
    }
    pub fn value_at(&self, iface: usize) -> f64 {
        match &self.value {
            BoundaryValue::Uniform(value) => *value,
            BoundaryValue::PerFace(values) => match values.get(&iface) {
                Some(value) => *value,
                None => panic!("boundary condition has no value for face {iface}"),
            },
        }
    }
}

/// Boundary conditions of one field, keyed by boundary group id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundaryConditions {
    conditions: HashMap<usize, BoundaryCondition>,
}
impl BoundaryConditions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, group: usize, condition: BoundaryCondition) {
        self.conditions.insert(group, condition);
    }
    #[cfg(test)]
    pub fn with(mut self, group: usize, condition: BoundaryCondition) -> Self {
        self.insert(group, condition);
        self
    }
    /// Neumann 0 on every boundary group of `mesh`.
    pub fn zero_gradient(mesh: &Mesh) -> Self {
        let mut conditions = Self::new();
        for group in mesh.boundary_groups() {
            conditions.insert(group, BoundaryCondition::neumann(0.0));
        }
        conditions
    }
    /// Same condition kinds with every value set to zero, as needed by a
    /// correction field.
    pub fn homogeneous(&self) -> Self {
        let conditions = self
            .conditions
            .iter()
            .map(|(&group, condition)| {
                (
                    group,
                    BoundaryCondition {
                        kind: condition.kind,
                        value: BoundaryValue::Uniform(0.0),
                    },
                )
            })
            .collect();
        Self { conditions }
    }
    pub fn get(&self, group: usize) -> Option<&BoundaryCondition> {
        self.conditions.get(&group)
    }
    /// Condition of a boundary face; a missing entry is a setup defect that
    /// [`BoundaryConditions::validate`] should have caught.
    pub fn for_group(&self, group: usize) -> &BoundaryCondition {
        match self.conditions.get(&group) {
            Some(condition) => condition,
            None => panic!("no boundary condition registered for boundary group {group}"),
        }
    }
    pub fn validate(&self, field: &str, mesh: &Mesh) -> Result<(), SetupError> {
        for group in mesh.boundary_groups() {
            if !self.conditions.contains_key(&group) {
                return Err(SetupError::MissingBoundaryCondition {
                    field: field.to_string(),
                    group,
                });
            }
        }
        Ok(())
    }
}

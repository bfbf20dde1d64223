//! Implicit finite-volume operators. Each call writes the contribution of
//! one term into the builder's open row; the builder's mode sign applies.

use nalgebra::Vector2;
use ndarray::ArrayView1;

use super::{
    boundary::ConditionKind,
    field::ScalarField,
    linear_system::LinearSystemBuilder,
    mesh::{FaceNeighbour, Mesh},
};

/// Diffusion coefficient of a Laplacian term.
#[derive(Clone, Copy, Debug)]
pub enum Diffusivity<'a> {
    Uniform(f64),
    /// One coefficient per face.
    PerFace(ArrayView1<'a, f64>),
}
impl Diffusivity<'_> {
    pub fn at(&self, iface: usize) -> f64 {
        match self {
            Diffusivity::Uniform(value) => *value,
            Diffusivity::PerFace(values) => values[iface],
        }
    }
}

/// Laplacian `div(k grad(phi))` of `field` on the open row, with explicit
/// non-orthogonal correction.
///
/// The gradient of `field` must be up to date (`ensure_gradient`).
pub fn diffusion(
    builder: &mut LinearSystemBuilder,
    mesh: &Mesh,
    field: &ScalarField,
    diffusivity: Diffusivity,
) {
    let icell = builder.current_cell();
    let cell = &mesh.cells[icell];
    for &iface in cell.faces.iter() {
        let face = mesh.outward_face(icell, iface);
        let k_face = diffusivity.at(iface);
        match face.secondary {
            FaceNeighbour::Cell(_) => {
                let Some(other) = mesh.neighbour(icell, iface) else {
                    continue;
                };
                let d = mesh.cell_to_cell(icell, other);
                let dn = mesh.normal_distance(icell, iface);
                let coefficient = k_face * face.area / dn;
                builder.add_coefficient(other, coefficient);
                builder.add_coefficient(icell, -coefficient);

                let gradient = face_gradient(mesh, field, icell, other, iface);
                let mismatch = face.normal - d / dn;
                builder.add_source(-k_face * face.area * gradient.dot(&mismatch));
            }
            FaceNeighbour::Boundary(group) => {
                let condition = field.boundary().for_group(group);
                let value = condition.value_at(iface);
                match condition.kind {
                    ConditionKind::Dirichlet => {
                        let coefficient = k_face * face.area / mesh.face_distance(icell, iface);
                        builder.add_coefficient(icell, -coefficient);
                        builder.add_source(-coefficient * value);
                    }
                    ConditionKind::Neumann => {
                        builder.add_source(-face.area * value * k_face);
                    }
                }
            }
        }
    }
}

fn face_gradient(mesh: &Mesh, field: &ScalarField, icell: usize, other: usize, iface: usize) -> Vector2<f64> {
    let d_cell = mesh.face_distance(icell, iface);
    let d_other = mesh.face_distance(other, iface);
    (field.gradient_at(icell) * d_other + field.gradient_at(other) * d_cell) / (d_cell + d_other)
}

/// First-order upwind `div(F phi)` of `field` on the open row. `flux` is the
/// volumetric face flux, positive out of each face's primary cell.
pub fn advection(
    builder: &mut LinearSystemBuilder,
    mesh: &Mesh,
    field: &ScalarField,
    flux: ArrayView1<f64>,
) {
    let icell = builder.current_cell();
    for &iface in mesh.cells[icell].faces.iter() {
        let outflow = flux[iface] * mesh.orientation(icell, iface);
        match mesh.faces[iface].secondary {
            FaceNeighbour::Cell(_) => {
                if outflow >= 0.0 {
                    builder.add_coefficient(icell, outflow);
                } else if let Some(other) = mesh.neighbour(icell, iface) {
                    builder.add_coefficient(other, outflow);
                }
            }
            FaceNeighbour::Boundary(group) => {
                let condition = field.boundary().for_group(group);
                let value = condition.value_at(iface);
                match condition.kind {
                    ConditionKind::Dirichlet => builder.add_source(-outflow * value),
                    ConditionKind::Neumann => {
                        builder.add_coefficient(icell, outflow);
                        builder.add_source(-outflow * value * mesh.face_distance(icell, iface));
                    }
                }
            }
        }
    }
}

/// Implicit Euler time derivative on the open row.
pub fn transient(builder: &mut LinearSystemBuilder, mesh: &Mesh, previous: ArrayView1<f64>, dt: f64) {
    let icell = builder.current_cell();
    let coefficient = mesh.cells[icell].volume / dt;
    builder.add_coefficient(icell, coefficient);
    builder.add_source(previous[icell] * coefficient);
}

//! Explicit, stateless computation of the quantities a field caches.

use ndarray::{ArrayView1, ArrayViewMut1};

use crate::disc::{
    boundary::{BoundaryConditions, ConditionKind},
    mesh::{FaceNeighbour, Mesh},
};

/// Face values from cell values: inverse normal-distance weighting on
/// interior faces, boundary conditions on boundary faces.
pub fn interpolate_to_faces(
    mesh: &Mesh,
    values: ArrayView1<f64>,
    boundary: &BoundaryConditions,
    mut face_values: ArrayViewMut1<f64>,
) {
    for (iface, face) in mesh.faces.iter().enumerate() {
        let owner = face.primary;
        face_values[iface] = match face.secondary {
            FaceNeighbour::Cell(other) => {
                let d_owner = mesh.face_distance(owner, iface);
                let d_other = mesh.face_distance(other, iface);
                (d_other * values[owner] + d_owner * values[other]) / (d_owner + d_other)
            }
            FaceNeighbour::Boundary(group) => {
                let condition = boundary.for_group(group);
                let value = condition.value_at(iface);
                match condition.kind {
                    ConditionKind::Dirichlet => value,
                    ConditionKind::Neumann => {
                        let offset = (face.pos - mesh.cells[owner].pos)
                            .dot(&mesh.outward_normal(owner, iface));
                        values[owner] + value * offset
                    }
                }
            }
        };
    }
}

/// Green-Gauss cell gradient from face values, without limiting.
pub fn compute_gradient(
    mesh: &Mesh,
    face_values: ArrayView1<f64>,
    mut grad_x: ArrayViewMut1<f64>,
    mut grad_y: ArrayViewMut1<f64>,
) {
    for (icell, cell) in mesh.cells.iter().enumerate() {
        let mut gx = 0.0;
        let mut gy = 0.0;
        for &iface in cell.faces.iter() {
            let area_vector = mesh.outward_normal(icell, iface) * mesh.faces[iface].area;
            gx += face_values[iface] * area_vector.x;
            gy += face_values[iface] * area_vector.y;
        }
        grad_x[icell] = gx / cell.volume;
        grad_y[icell] = gy / cell.volume;
    }
}

/// Scales each cell gradient so that extrapolating it to any neighbour
/// centre stays within the min/max of the cell and its neighbours.
pub fn limit_gradient(
    mesh: &Mesh,
    values: ArrayView1<f64>,
    mut grad_x: ArrayViewMut1<f64>,
    mut grad_y: ArrayViewMut1<f64>,
) {
    for (icell, cell) in mesh.cells.iter().enumerate() {
        let value = values[icell];
        let mut min = value;
        let mut max = value;
        for &iface in cell.faces.iter() {
            if let Some(other) = mesh.neighbour(icell, iface) {
                min = min.min(values[other]);
                max = max.max(values[other]);
            }
        }
        let tiny = f64::EPSILON * value.abs().max(max - min).max(f64::MIN_POSITIVE);
        let mut factor: f64 = 1.0;
        for &iface in cell.faces.iter() {
            let Some(other) = mesh.neighbour(icell, iface) else {
                continue;
            };
            let d = mesh.cell_to_cell(icell, other);
            let delta = grad_x[icell] * d.x + grad_y[icell] * d.y;
            let ratio = if delta > tiny {
                (max - value) / delta
            } else if delta < -tiny {
                (min - value) / delta
            } else {
                continue;
            };
            factor = factor.min(ratio);
        }
        let factor = factor.clamp(0.0, 1.0);
        grad_x[icell] *= factor;
        grad_y[icell] *= factor;
    }
}

/// Volumetric flux through each face, positive out of the face's primary cell.
pub fn compute_flux(
    mesh: &Mesh,
    face_x: ArrayView1<f64>,
    face_y: ArrayView1<f64>,
    mut flux: ArrayViewMut1<f64>,
) {
    for (iface, face) in mesh.faces.iter().enumerate() {
        let normal = mesh.outward_normal(face.primary, iface);
        flux[iface] = (face_x[iface] * normal.x + face_y[iface] * normal.y) * face.area;
    }
}

pub fn compute_divergence(mesh: &Mesh, flux: ArrayView1<f64>, mut divergence: ArrayViewMut1<f64>) {
    for (icell, cell) in mesh.cells.iter().enumerate() {
        let net: f64 = cell
            .faces
            .iter()
            .map(|&iface| mesh.orientation(icell, iface) * flux[iface])
            .sum();
        divergence[icell] = net / cell.volume;
    }
}

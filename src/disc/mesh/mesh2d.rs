use hashbrown::HashMap;
use nalgebra::Vector2;

use super::{Cell, Face, FaceNeighbour, Mesh};
use crate::{disc::geometric::Geometric2D, error::MeshError};

/// Boundary group names of the structured test meshes.
#[cfg(test)]
pub const INLET: &str = "inlet";
#[cfg(test)]
pub const OUTLET: &str = "outlet";
#[cfg(test)]
pub const WALLS: &str = "walls";

struct PendingFace {
    pos: Vector2<f64>,
    normal: Vector2<f64>,
    area: f64,
    primary: usize,
    secondary: Option<usize>,
    inodes: (usize, usize),
}

/// Assembles a [`Mesh`] from vertex positions, cell vertex lists and tagged
/// boundary segments.
#[derive(Default)]
pub struct MeshBuilder {
    vertices: Vec<Vector2<f64>>,
    elements: Vec<Vec<usize>>,
    segments: HashMap<(usize, usize), usize>,
    boundary_names: HashMap<String, usize>,
}
impl Geometric2D for MeshBuilder {}
impl MeshBuilder {
    pub fn new(vertices: Vec<Vector2<f64>>) -> Self {
        Self {
            vertices,
            ..Default::default()
        }
    }
    pub fn add_cell(&mut self, inodes: Vec<usize>) {
        self.elements.push(inodes);
    }
    pub fn add_boundary_segment(&mut self, a: usize, b: usize, group: usize) {
        self.segments.insert(edge_key(a, b), group);
    }
    pub fn name_boundary(&mut self, name: impl Into<String>, group: usize) {
        self.boundary_names.insert(name.into(), group);
    }
    pub fn build(self) -> Result<Mesh, MeshError> {
        let mut faces: Vec<PendingFace> = Vec::new();
        let mut face_lookup: HashMap<(usize, usize), usize> = HashMap::new();
        let mut cells = Vec::with_capacity(self.elements.len());
        for (icell, element) in self.elements.into_iter().enumerate() {
            let mut inodes = element;
            if !(3..=4).contains(&inodes.len()) {
                return Err(MeshError::UnsupportedCell {
                    cell: icell,
                    vertices: inodes.len(),
                });
            }
            let points: Vec<Vector2<f64>> = inodes.iter().map(|&i| self.vertices[i]).collect();
            let signed_area = Self::compute_signed_area(&points);
            if signed_area.abs() <= f64::EPSILON * Self::bounding_scale(&points) {
                return Err(MeshError::DegenerateCell(icell));
            }
            if signed_area < 0.0 {
                inodes.reverse();
            }
            let pos = Self::compute_vertex_average(&points);
            let mut cell_faces = Vec::with_capacity(inodes.len());
            for k in 0..inodes.len() {
                let a = inodes[k];
                let b = inodes[(k + 1) % inodes.len()];
                let key = edge_key(a, b);
                match face_lookup.get(&key) {
                    Some(&iface) => {
                        let face = &mut faces[iface];
                        if face.secondary.is_some() {
                            return Err(MeshError::NonManifoldEdge(key.0, key.1));
                        }
                        face.secondary = Some(icell);
                        cell_faces.push(iface);
                    }
                    None => {
                        let pa = self.vertices[a];
                        let pb = self.vertices[b];
                        face_lookup.insert(key, faces.len());
                        cell_faces.push(faces.len());
                        faces.push(PendingFace {
                            pos: 0.5 * (pa + pb),
                            normal: Self::compute_normal(pa, pb),
                            area: Self::compute_edge_length(pa, pb),
                            primary: icell,
                            secondary: None,
                            inodes: key,
                        });
                    }
                }
            }
            cells.push(Cell {
                pos,
                volume: signed_area.abs(),
                faces: cell_faces,
                vertices: inodes,
            });
        }
        let faces = faces
            .into_iter()
            .map(|face| {
                let secondary = match face.secondary {
                    Some(icell) => FaceNeighbour::Cell(icell),
                    None => match self.segments.get(&face.inodes) {
                        Some(&group) => FaceNeighbour::Boundary(group),
                        None => {
                            return Err(MeshError::UntaggedBoundaryFace(
                                face.inodes.0,
                                face.inodes.1,
                            ));
                        }
                    },
                };
                Ok(Face {
                    pos: face.pos,
                    normal: face.normal,
                    area: face.area,
                    primary: face.primary,
                    secondary,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Mesh {
            vertices: self.vertices,
            cells,
            faces,
            boundary_names: self.boundary_names,
        })
    }
    fn bounding_scale(points: &[Vector2<f64>]) -> f64 {
        let mut scale: f64 = 0.0;
        for p in points.iter() {
            for q in points.iter() {
                scale = scale.max((p - q).norm_squared());
            }
        }
        scale
    }
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Structured rectangle meshes for tests.
#[cfg(test)]
impl Mesh {
    fn rectangle_builder(x_num: usize, y_num: usize, lx: f64, ly: f64) -> MeshBuilder {
        let mut vertices = Vec::with_capacity((x_num + 1) * (y_num + 1));
        for j in 0..=y_num {
            for i in 0..=x_num {
                vertices.push(Vector2::new(
                    lx * i as f64 / x_num as f64,
                    ly * j as f64 / y_num as f64,
                ));
            }
        }
        let mut builder = MeshBuilder::new(vertices);
        builder.name_boundary(INLET, 0);
        builder.name_boundary(OUTLET, 1);
        builder.name_boundary(WALLS, 2);
        let v = |i: usize, j: usize| j * (x_num + 1) + i;
        for j in 0..y_num {
            builder.add_boundary_segment(v(0, j), v(0, j + 1), 0);
            builder.add_boundary_segment(v(x_num, j), v(x_num, j + 1), 1);
        }
        for i in 0..x_num {
            builder.add_boundary_segment(v(i, 0), v(i + 1, 0), 2);
            builder.add_boundary_segment(v(i, y_num), v(i + 1, y_num), 2);
        }
        builder
    }
    /// Uniform quadrilateral channel `[0, lx] x [0, ly]` with `inlet` on the
    /// left, `outlet` on the right and `walls` top and bottom.
    pub fn channel(x_num: usize, y_num: usize, lx: f64, ly: f64) -> Mesh {
        let mut builder = Self::rectangle_builder(x_num, y_num, lx, ly);
        let v = |i: usize, j: usize| j * (x_num + 1) + i;
        for j in 0..y_num {
            for i in 0..x_num {
                builder.add_cell(vec![v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)]);
            }
        }
        builder
            .build()
            .unwrap_or_else(|e| panic!("structured channel mesh is invalid: {e}"))
    }
    /// Same domain and boundary groups as [`Mesh::channel`], every square split
    /// along its rising diagonal.
    pub fn triangulated_rectangle(x_num: usize, y_num: usize, lx: f64, ly: f64) -> Mesh {
        let mut builder = Self::rectangle_builder(x_num, y_num, lx, ly);
        let v = |i: usize, j: usize| j * (x_num + 1) + i;
        for j in 0..y_num {
            for i in 0..x_num {
                builder.add_cell(vec![v(i, j), v(i + 1, j), v(i + 1, j + 1)]);
                builder.add_cell(vec![v(i, j), v(i + 1, j + 1), v(i, j + 1)]);
            }
        }
        builder
            .build()
            .unwrap_or_else(|e| panic!("structured triangle mesh is invalid: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_two_quad_mesh() {
        let mesh = Mesh::channel(2, 1, 2.0, 1.0);
        assert_eq!(mesh.cell_num(), 2);
        assert_eq!(mesh.face_num(), 7);
        assert_eq!(mesh.vertices.len(), 6);
        let interior: Vec<&Face> = mesh.faces.iter().filter(|f| !f.is_boundary()).collect();
        assert_eq!(interior.len(), 1);
        assert_relative_eq!(interior[0].pos.x, 1.0);
        assert_relative_eq!(interior[0].area, 1.0);
        assert_eq!(mesh.boundary_groups(), vec![0, 1, 2]);
        assert_eq!(mesh.boundary_name(1), Some(OUTLET));
    }

    #[test]
    fn test_clockwise_cells_are_reordered() {
        let vertices = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ];
        let mut builder = MeshBuilder::new(vertices);
        builder.add_cell(vec![0, 2, 1]);
        builder.add_boundary_segment(0, 1, 0);
        builder.add_boundary_segment(1, 2, 0);
        builder.add_boundary_segment(2, 0, 0);
        let mesh = builder.build().unwrap();
        assert_eq!(mesh.cells[0].vertices, vec![1, 2, 0]);
        assert_relative_eq!(mesh.cells[0].volume, 0.5);
        assert_relative_eq!(mesh.cells[0].pos.x, 1.0 / 3.0, epsilon = 1e-14);
    }

    #[test]
    fn test_untagged_boundary_face_is_rejected() {
        let vertices = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ];
        let mut builder = MeshBuilder::new(vertices);
        builder.add_cell(vec![0, 1, 2]);
        builder.add_boundary_segment(0, 1, 0);
        builder.add_boundary_segment(1, 2, 0);
        assert!(matches!(
            builder.build(),
            Err(MeshError::UntaggedBoundaryFace(0, 2))
        ));
    }

    #[test]
    fn test_pentagon_is_rejected() {
        let vertices = (0..5)
            .map(|k| {
                let angle = 2.0 * std::f64::consts::PI * k as f64 / 5.0;
                Vector2::new(angle.cos(), angle.sin())
            })
            .collect();
        let mut builder = MeshBuilder::new(vertices);
        builder.add_cell(vec![0, 1, 2, 3, 4]);
        assert!(matches!(
            builder.build(),
            Err(MeshError::UnsupportedCell { cell: 0, vertices: 5 })
        ));
    }

    #[test]
    fn test_degenerate_cell_is_rejected() {
        let vertices = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(2.0, 0.0),
        ];
        let mut builder = MeshBuilder::new(vertices);
        builder.add_cell(vec![0, 1, 2]);
        assert!(matches!(builder.build(), Err(MeshError::DegenerateCell(0))));
    }
}

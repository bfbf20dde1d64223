use hashbrown::HashMap;
use nalgebra::Vector2;

pub mod mesh2d;

/// What lies on the far side of a face: another cell or a tagged boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceNeighbour {
    Cell(usize),
    Boundary(usize),
}

#[derive(Clone, Copy, Debug)]
pub struct Face {
    pub pos: Vector2<f64>,
    /// Unit normal. Its direction relative to `primary` is not guaranteed;
    /// use [`Mesh::outward_face`] or [`Mesh::outward_normal`] instead.
    pub normal: Vector2<f64>,
    pub area: f64,
    pub primary: usize,
    pub secondary: FaceNeighbour,
}
impl Face {
    pub fn is_boundary(&self) -> bool {
        matches!(self.secondary, FaceNeighbour::Boundary(_))
    }
    pub fn boundary_group(&self) -> Option<usize> {
        match self.secondary {
            FaceNeighbour::Boundary(group) => Some(group),
            FaceNeighbour::Cell(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Cell {
    pub pos: Vector2<f64>,
    pub volume: f64,
    pub faces: Vec<usize>,
    /// Counter-clockwise.
    pub vertices: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertices: Vec<Vector2<f64>>,
    pub cells: Vec<Cell>,
    pub faces: Vec<Face>,
    pub boundary_names: HashMap<String, usize>,
}
impl Mesh {
    pub fn cell_num(&self) -> usize {
        self.cells.len()
    }
    pub fn face_num(&self) -> usize {
        self.faces.len()
    }
    pub fn boundary_name(&self, group: usize) -> Option<&str> {
        self.boundary_names
            .iter()
            .find(|&(_, &id)| id == group)
            .map(|(name, _)| name.as_str())
    }
    pub fn group_id(&self, name: &str) -> Option<usize> {
        self.boundary_names.get(name).copied()
    }
    /// Distinct boundary group ids referenced by faces, sorted.
    pub fn boundary_groups(&self) -> Vec<usize> {
        let mut groups: Vec<usize> = self
            .faces
            .iter()
            .filter_map(|face| face.boundary_group())
            .collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
    pub fn cell_to_cell(&self, from: usize, to: usize) -> Vector2<f64> {
        self.cells[to].pos - self.cells[from].pos
    }
    pub fn outward_normal(&self, cell: usize, iface: usize) -> Vector2<f64> {
        let face = &self.faces[iface];
        if (face.pos - self.cells[cell].pos).dot(&face.normal) < 0.0 {
            -face.normal
        } else {
            face.normal
        }
    }
    /// Copy of `iface` with its normal pointing away from `cell`.
    pub fn outward_face(&self, cell: usize, iface: usize) -> Face {
        let mut face = self.faces[iface];
        face.normal = self.outward_normal(cell, iface);
        face
    }
    /// The cell across `iface` from `cell`, `None` on a boundary face.
    pub fn neighbour(&self, cell: usize, iface: usize) -> Option<usize> {
        let face = &self.faces[iface];
        match face.secondary {
            FaceNeighbour::Cell(other) if face.primary == cell => Some(other),
            FaceNeighbour::Cell(_) => Some(face.primary),
            FaceNeighbour::Boundary(_) => None,
        }
    }
    /// Signed distance between the centres of `cell` and its neighbour across
    /// `iface`, projected onto the face normal pointing away from `cell`.
    pub fn normal_distance(&self, cell: usize, iface: usize) -> f64 {
        let other = self.neighbour(cell, iface).unwrap_or(cell);
        self.cell_to_cell(cell, other).dot(&self.outward_normal(cell, iface))
    }
    /// Perpendicular distance from the centre of `cell` to `iface`.
    pub fn face_distance(&self, cell: usize, iface: usize) -> f64 {
        let face = &self.faces[iface];
        (face.pos - self.cells[cell].pos).dot(&face.normal).abs()
    }
    /// +1 when `cell` is the face's primary cell, -1 otherwise.
    pub fn orientation(&self, cell: usize, iface: usize) -> f64 {
        if self.faces[iface].primary == cell {
            1.0
        } else {
            -1.0
        }
    }
}

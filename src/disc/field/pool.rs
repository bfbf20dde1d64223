use ndarray::Array1;
use tracing::warn;

use crate::disc::mesh::Mesh;

/// Free lists of per-cell and per-face buffers sized once from the mesh.
///
/// Buffers leave the pool zeroed and must come back through
/// [`FieldPool::release`]; the pool counts what is still out and reports
/// leaks when it is dropped.
#[derive(Debug)]
pub struct FieldPool {
    cell_num: usize,
    face_num: usize,
    cell_free: Vec<Array1<f64>>,
    face_free: Vec<Array1<f64>>,
    outstanding: usize,
    allocated: usize,
}
impl FieldPool {
    pub fn new(mesh: &Mesh) -> Self {
        Self::with_sizes(mesh.cell_num(), mesh.face_num())
    }
    pub fn with_sizes(cell_num: usize, face_num: usize) -> Self {
        Self {
            cell_num,
            face_num,
            cell_free: Vec::new(),
            face_free: Vec::new(),
            outstanding: 0,
            allocated: 0,
        }
    }
    pub fn cell_num(&self) -> usize {
        self.cell_num
    }
    pub fn face_num(&self) -> usize {
        self.face_num
    }
    pub fn acquire_cell(&mut self) -> Array1<f64> {
        self.outstanding += 1;
        match self.cell_free.pop() {
            Some(buffer) => buffer,
            None => {
                self.allocated += 1;
                Array1::zeros(self.cell_num)
            }
        }
    }
    pub fn acquire_face(&mut self) -> Array1<f64> {
        self.outstanding += 1;
        match self.face_free.pop() {
            Some(buffer) => buffer,
            None => {
                self.allocated += 1;
                Array1::zeros(self.face_num)
            }
        }
    }
    pub fn release(&mut self, mut buffer: Array1<f64>) {
        let len = buffer.len();
        assert!(
            len == self.cell_num || len == self.face_num,
            "buffer of length {len} does not belong to this pool (cells {}, faces {})",
            self.cell_num,
            self.face_num
        );
        assert!(self.outstanding > 0, "more buffers released than acquired");
        buffer.fill(0.0);
        self.outstanding -= 1;
        if len == self.cell_num {
            self.cell_free.push(buffer);
        } else {
            self.face_free.push(buffer);
        }
    }
    /// Buffers handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
    /// Buffers ever allocated by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}
impl Drop for FieldPool {
    fn drop(&mut self) {
        if self.outstanding() > 0 {
            warn!(
                outstanding = self.outstanding(),
                "field pool dropped with buffers still in use"
            );
        }
    }
}

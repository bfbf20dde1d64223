use hashbrown::HashMap;
use ndarray::{ArrayView1, ArrayViewMut1};

use super::mesh::Mesh;

/// Sign applied to every contribution, so a term can be subtracted from an
/// equation by the same operator code that adds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Add,
    Subtract,
}
impl Mode {
    pub fn sign(self) -> f64 {
        match self {
            Mode::Add => 1.0,
            Mode::Subtract => -1.0,
        }
    }
}

/// Row-by-row CSR assembly of one linear system per cell.
///
/// Rows are opened with [`start_cell`](Self::start_cell) in ascending cell
/// order, filled by the operators and flushed by [`end_cell`](Self::end_cell).
/// [`reset`](Self::reset) keeps every allocation for the next assembly.
#[derive(Debug)]
pub struct LinearSystemBuilder {
    volumes: Vec<f64>,
    row: HashMap<usize, f64>,
    entries: Vec<(usize, f64)>,
    current: Option<usize>,
    next_row: usize,
    mode: Mode,
    values: Vec<f64>,
    columns: Vec<usize>,
    offsets: Vec<usize>,
    source: Vec<f64>,
}
impl LinearSystemBuilder {
    pub fn new(mesh: &Mesh) -> Self {
        Self::with_volumes(mesh.cells.iter().map(|cell| cell.volume).collect())
    }
    pub fn with_volumes(volumes: Vec<f64>) -> Self {
        let n = volumes.len();
        let mut offsets = Vec::with_capacity(n + 1);
        offsets.push(0);
        Self {
            volumes,
            row: HashMap::new(),
            entries: Vec::new(),
            current: None,
            next_row: 0,
            mode: Mode::Add,
            values: Vec::new(),
            columns: Vec::new(),
            offsets,
            source: vec![0.0; n],
        }
    }
    pub fn row_num(&self) -> usize {
        self.volumes.len()
    }
    pub fn mode(&self) -> Mode {
        self.mode
    }
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }
    pub fn current_cell(&self) -> usize {
        match self.current {
            Some(cell) => cell,
            None => panic!("no open row: call start_cell first"),
        }
    }
    pub fn start_cell(&mut self, cell: usize) {
        if let Some(open) = self.current {
            panic!("start_cell({cell}) while row {open} is still open");
        }
        assert!(
            cell >= self.next_row,
            "row {cell} opened out of order (next row is {})",
            self.next_row
        );
        assert!(cell < self.row_num(), "row {cell} is out of range");
        // rows skipped over stay empty
        while self.next_row < cell {
            self.offsets.push(self.values.len());
            self.next_row += 1;
        }
        self.current = Some(cell);
        self.mode = Mode::Add;
    }
    /// Adds `coefficient` (times the mode sign) to column `column` of the open row.
    pub fn add_coefficient(&mut self, column: usize, coefficient: f64) {
        self.current_cell();
        *self.row.entry(column).or_insert(0.0) += self.mode.sign() * coefficient;
    }
    /// Adds an already volume-integrated right-hand-side term.
    pub fn add_source(&mut self, value: f64) {
        let cell = self.current_cell();
        self.source[cell] += self.mode.sign() * value;
    }
    /// Adds a source density, integrated over the open cell's volume.
    pub fn add_source_density(&mut self, density: f64) {
        let cell = self.current_cell();
        self.source[cell] += self.mode.sign() * density * self.volumes[cell];
    }
    pub fn end_cell(&mut self) {
        let cell = self.current_cell();
        self.entries.clear();
        self.entries.extend(self.row.drain());
        // sorted columns keep the layout independent of hashing order
        self.entries.sort_unstable_by_key(|&(column, _)| column);
        for &(column, value) in self.entries.iter() {
            self.columns.push(column);
            self.values.push(value);
        }
        self.offsets.push(self.values.len());
        self.next_row = cell + 1;
        self.current = None;
        self.mode = Mode::Add;
    }
    pub fn reset(&mut self) {
        self.row.clear();
        self.current = None;
        self.next_row = 0;
        self.mode = Mode::Add;
        self.values.clear();
        self.columns.clear();
        self.offsets.clear();
        self.offsets.push(0);
        self.source.fill(0.0);
    }
    /// The assembled system. Rows never opened are empty.
    pub fn system(&mut self) -> LinearSystem<'_> {
        if let Some(open) = self.current {
            panic!("system requested while row {open} is still open");
        }
        while self.next_row < self.row_num() {
            self.offsets.push(self.values.len());
            self.next_row += 1;
        }
        LinearSystem {
            values: &self.values,
            columns: &self.columns,
            offsets: &self.offsets,
            source: &self.source,
        }
    }
}

/// Borrowed CSR view of an assembled system `A x = b`.
#[derive(Clone, Copy, Debug)]
pub struct LinearSystem<'a> {
    pub values: &'a [f64],
    pub columns: &'a [usize],
    pub offsets: &'a [usize],
    pub source: &'a [f64],
}
impl<'a> LinearSystem<'a> {
    pub fn row_num(&self) -> usize {
        self.offsets.len() - 1
    }
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + 'a {
        let columns: &'a [usize] = self.columns;
        let values: &'a [f64] = self.values;
        let range = self.offsets[i]..self.offsets[i + 1];
        columns[range.clone()]
            .iter()
            .copied()
            .zip(values[range].iter().copied())
    }
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let range = self.offsets[i]..self.offsets[i + 1];
        match self.columns[range.clone()].binary_search(&j) {
            Ok(k) => self.values[range.start + k],
            Err(_) => 0.0,
        }
    }
    pub fn diagonal(&self, i: usize) -> f64 {
        self.get(i, i)
    }
    /// `sum_j a_ij x_j` over the off-diagonal entries of row `i`.
    pub fn off_diagonal_dot(&self, i: usize, x: ArrayView1<f64>) -> f64 {
        self.row(i)
            .filter(|&(j, _)| j != i)
            .map(|(j, a)| a * x[j])
            .sum()
    }
    pub fn mul_vec(&self, x: ArrayView1<f64>, mut y: ArrayViewMut1<f64>) {
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = self.row(i).map(|(j, a)| a * x[j]).sum();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assemble(builder: &mut LinearSystemBuilder) {
        for cell in 0..3 {
            builder.start_cell(cell);
            builder.add_coefficient(cell, 4.0);
            if cell > 0 {
                builder.add_coefficient(cell - 1, -1.0);
            }
            if cell < 2 {
                builder.add_coefficient(cell + 1, -1.0);
            }
            builder.set_mode(Mode::Subtract);
            builder.add_coefficient(cell, 1.0);
            builder.add_source_density(2.0);
            builder.end_cell();
        }
    }

    #[test]
    fn test_duplicate_columns_merge_and_modes_apply() {
        let mut builder = LinearSystemBuilder::with_volumes(vec![0.5, 1.0, 2.0]);
        assemble(&mut builder);
        let system = builder.system();
        assert_eq!(system.row_num(), 3);
        assert_eq!(system.offsets, &[0, 2, 5, 7]);
        assert_relative_eq!(system.diagonal(1), 3.0);
        assert_relative_eq!(system.get(1, 0), -1.0);
        assert_relative_eq!(system.get(0, 2), 0.0);
        assert_relative_eq!(system.source[2], -4.0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut builder = LinearSystemBuilder::with_volumes(vec![0.5, 1.0, 2.0]);
        assemble(&mut builder);
        let first = {
            let s = builder.system();
            (s.values.to_vec(), s.columns.to_vec(), s.offsets.to_vec(), s.source.to_vec())
        };
        builder.reset();
        assemble(&mut builder);
        let s = builder.system();
        assert_eq!(first.0, s.values);
        assert_eq!(first.1, s.columns);
        assert_eq!(first.2, s.offsets);
        assert_eq!(first.3, s.source);
    }

    #[test]
    #[should_panic(expected = "still open")]
    fn test_start_before_end_panics() {
        let mut builder = LinearSystemBuilder::with_volumes(vec![1.0; 2]);
        builder.start_cell(0);
        builder.start_cell(1);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_reopening_a_row_panics() {
        let mut builder = LinearSystemBuilder::with_volumes(vec![1.0; 2]);
        builder.start_cell(1);
        builder.end_cell();
        builder.start_cell(0);
    }

    #[test]
    fn test_mul_vec() {
        let mut builder = LinearSystemBuilder::with_volumes(vec![1.0; 3]);
        assemble(&mut builder);
        let system = builder.system();
        let x = ndarray::arr1(&[1.0, 2.0, 3.0]);
        let mut y = ndarray::Array1::zeros(3);
        system.mul_vec(x.view(), y.view_mut());
        assert_eq!(y, ndarray::arr1(&[1.0, 2.0, 7.0]));
    }
}

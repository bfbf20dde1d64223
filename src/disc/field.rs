use nalgebra::Vector2;
use ndarray::{Array1, ArrayView1, ArrayViewMut1};

use super::{boundary::BoundaryConditions, mesh::Mesh};

pub mod derived;
pub mod pool;

use pool::FieldPool;

/// Mutation state of a field. Derived quantities may only be read while
/// `Clean`; `Dirty` means a mutation is open and every cache was released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldState {
    Clean,
    Dirty,
}

/// Per-cell scalar with lazily computed face values and limited gradient.
#[derive(Debug)]
pub struct ScalarField {
    name: String,
    values: Array1<f64>,
    boundary: BoundaryConditions,
    face_values: Option<Array1<f64>>,
    gradient: Option<[Array1<f64>; 2]>,
    state: FieldState,
    revision: u64,
}
impl ScalarField {
    pub fn new(name: impl Into<String>, boundary: BoundaryConditions, pool: &mut FieldPool) -> Self {
        Self {
            name: name.into(),
            values: pool.acquire_cell(),
            boundary,
            face_values: None,
            gradient: None,
            state: FieldState::Clean,
            revision: 0,
        }
    }
    pub fn from_fn(
        name: impl Into<String>,
        boundary: BoundaryConditions,
        mesh: &Mesh,
        pool: &mut FieldPool,
        f: impl Fn(Vector2<f64>) -> f64,
    ) -> Self {
        let mut field = Self::new(name, boundary, pool);
        for (icell, cell) in mesh.cells.iter().enumerate() {
            field.values[icell] = f(cell.pos);
        }
        field
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn boundary(&self) -> &BoundaryConditions {
        &self.boundary
    }
    /// Incremented every time a mutation is opened.
    pub fn revision(&self) -> u64 {
        self.revision
    }
    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }
    pub fn begin_mutation(&mut self, pool: &mut FieldPool) {
        assert!(
            self.state == FieldState::Clean,
            "field '{}': mutation is already open",
            self.name
        );
        self.release_derived(pool);
        self.state = FieldState::Dirty;
        self.revision += 1;
    }
    pub fn values_mut(&mut self) -> ArrayViewMut1<'_, f64> {
        assert!(
            self.state == FieldState::Dirty,
            "field '{}': values written outside begin_mutation/end_mutation",
            self.name
        );
        self.values.view_mut()
    }
    pub fn end_mutation(&mut self) {
        assert!(
            self.state == FieldState::Dirty,
            "field '{}': end_mutation without begin_mutation",
            self.name
        );
        self.state = FieldState::Clean;
    }
    pub fn mutate<R>(&mut self, pool: &mut FieldPool, f: impl FnOnce(ArrayViewMut1<f64>) -> R) -> R {
        self.begin_mutation(pool);
        let result = f(self.values.view_mut());
        self.end_mutation();
        result
    }
    fn assert_readable(&self, what: &str) {
        assert!(
            self.state == FieldState::Clean,
            "field '{}': {what} read while a mutation is open",
            self.name
        );
    }
    pub fn ensure_face_values(&mut self, mesh: &Mesh, pool: &mut FieldPool) {
        self.assert_readable("face values");
        if self.face_values.is_none() {
            let mut buffer = pool.acquire_face();
            derived::interpolate_to_faces(mesh, self.values.view(), &self.boundary, buffer.view_mut());
            self.face_values = Some(buffer);
        }
    }
    pub fn ensure_gradient(&mut self, mesh: &Mesh, pool: &mut FieldPool) {
        self.ensure_face_values(mesh, pool);
        if self.gradient.is_none() {
            let mut gx = pool.acquire_cell();
            let mut gy = pool.acquire_cell();
            if let Some(face_values) = &self.face_values {
                derived::compute_gradient(mesh, face_values.view(), gx.view_mut(), gy.view_mut());
            }
            derived::limit_gradient(mesh, self.values.view(), gx.view_mut(), gy.view_mut());
            self.gradient = Some([gx, gy]);
        }
    }
    pub fn face_values(&self) -> ArrayView1<'_, f64> {
        self.assert_readable("face values");
        match &self.face_values {
            Some(face_values) => face_values.view(),
            None => panic!("field '{}': face values are stale, call ensure_face_values", self.name),
        }
    }
    pub fn gradient(&self) -> [ArrayView1<'_, f64>; 2] {
        self.assert_readable("gradient");
        match &self.gradient {
            Some([gx, gy]) => [gx.view(), gy.view()],
            None => panic!("field '{}': gradient is stale, call ensure_gradient", self.name),
        }
    }
    pub fn gradient_at(&self, icell: usize) -> Vector2<f64> {
        let [gx, gy] = self.gradient();
        Vector2::new(gx[icell], gy[icell])
    }
    fn release_derived(&mut self, pool: &mut FieldPool) {
        if let Some(buffer) = self.face_values.take() {
            pool.release(buffer);
        }
        if let Some([gx, gy]) = self.gradient.take() {
            pool.release(gx);
            pool.release(gy);
        }
    }
    /// Returns every buffer of the field to the pool.
    pub fn release(mut self, pool: &mut FieldPool) {
        self.release_derived(pool);
        pool.release(self.values);
    }
}

/// Two scalar components plus cached face flux and cell divergence.
#[derive(Debug)]
pub struct VectorField {
    name: String,
    components: [ScalarField; 2],
    flux: Option<(Array1<f64>, [u64; 2])>,
    divergence: Option<(Array1<f64>, [u64; 2])>,
    state: FieldState,
}
impl VectorField {
    pub fn new(
        name: impl Into<String>,
        boundary: [BoundaryConditions; 2],
        pool: &mut FieldPool,
    ) -> Self {
        let name = name.into();
        let [bx, by] = boundary;
        let x = ScalarField::new(format!("{name}.x"), bx, pool);
        let y = ScalarField::new(format!("{name}.y"), by, pool);
        Self::from_components(name, x, y)
    }
    pub fn from_components(name: impl Into<String>, x: ScalarField, y: ScalarField) -> Self {
        Self {
            name: name.into(),
            components: [x, y],
            flux: None,
            divergence: None,
            state: FieldState::Clean,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn x(&self) -> &ScalarField {
        &self.components[0]
    }
    pub fn y(&self) -> &ScalarField {
        &self.components[1]
    }
    pub fn component(&self, i: usize) -> &ScalarField {
        &self.components[i]
    }
    /// Mutating a component through this reference makes the vector caches
    /// stale; they are recomputed by the next `ensure_*` call.
    pub fn component_mut(&mut self, i: usize) -> &mut ScalarField {
        &mut self.components[i]
    }
    fn revisions(&self) -> [u64; 2] {
        [self.components[0].revision(), self.components[1].revision()]
    }
    pub fn begin_mutation(&mut self, pool: &mut FieldPool) {
        assert!(
            self.state == FieldState::Clean,
            "field '{}': mutation is already open",
            self.name
        );
        self.release_derived(pool);
        for component in self.components.iter_mut() {
            component.begin_mutation(pool);
        }
        self.state = FieldState::Dirty;
    }
    pub fn values_mut(&mut self) -> [ArrayViewMut1<'_, f64>; 2] {
        let [x, y] = &mut self.components;
        [x.values_mut(), y.values_mut()]
    }
    pub fn end_mutation(&mut self) {
        assert!(
            self.state == FieldState::Dirty,
            "field '{}': end_mutation without begin_mutation",
            self.name
        );
        for component in self.components.iter_mut() {
            component.end_mutation();
        }
        self.state = FieldState::Clean;
    }
    fn assert_readable(&self, what: &str) {
        assert!(
            self.state == FieldState::Clean,
            "field '{}': {what} read while a mutation is open",
            self.name
        );
    }
    pub fn ensure_flux(&mut self, mesh: &Mesh, pool: &mut FieldPool) {
        self.assert_readable("flux");
        let revisions = self.revisions();
        if matches!(&self.flux, Some((_, stamp)) if *stamp == revisions) {
            return;
        }
        for component in self.components.iter_mut() {
            component.ensure_face_values(mesh, pool);
        }
        let mut buffer = match self.flux.take() {
            Some((buffer, _)) => buffer,
            None => pool.acquire_face(),
        };
        derived::compute_flux(
            mesh,
            self.components[0].face_values(),
            self.components[1].face_values(),
            buffer.view_mut(),
        );
        self.flux = Some((buffer, revisions));
    }
    pub fn ensure_divergence(&mut self, mesh: &Mesh, pool: &mut FieldPool) {
        self.ensure_flux(mesh, pool);
        let revisions = self.revisions();
        if matches!(&self.divergence, Some((_, stamp)) if *stamp == revisions) {
            return;
        }
        let mut buffer = match self.divergence.take() {
            Some((buffer, _)) => buffer,
            None => pool.acquire_cell(),
        };
        derived::compute_divergence(mesh, self.flux().view(), buffer.view_mut());
        self.divergence = Some((buffer, revisions));
    }
    pub fn flux(&self) -> ArrayView1<'_, f64> {
        self.assert_readable("flux");
        match &self.flux {
            Some((buffer, stamp)) if *stamp == self.revisions() => buffer.view(),
            _ => panic!("field '{}': flux is stale, call ensure_flux", self.name),
        }
    }
    pub fn divergence(&self) -> ArrayView1<'_, f64> {
        self.assert_readable("divergence");
        match &self.divergence {
            Some((buffer, stamp)) if *stamp == self.revisions() => buffer.view(),
            _ => panic!("field '{}': divergence is stale, call ensure_divergence", self.name),
        }
    }
    fn release_derived(&mut self, pool: &mut FieldPool) {
        if let Some((buffer, _)) = self.flux.take() {
            pool.release(buffer);
        }
        if let Some((buffer, _)) = self.divergence.take() {
            pool.release(buffer);
        }
    }
    pub fn release(mut self, pool: &mut FieldPool) {
        self.release_derived(pool);
        let [x, y] = self.components;
        x.release(pool);
        y.release(pool);
    }
}

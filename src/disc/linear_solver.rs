use ndarray::{Array1, ArrayViewMut1, Zip};
use serde::Deserialize;
use tracing::debug;

use super::{field::pool::FieldPool, linear_system::LinearSystem};
use crate::error::LinearSolverError;

const PCG_MIN_PIVOT: f64 = 1e-15;
const SOR_MIN_PIVOT: f64 = 1e-10;
/// Weight of the previous iterate when warm-starting Gauss-Seidel.
const SOR_WARM_START: f64 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Over-relaxation factor of the Gauss-Seidel sweeps.
    pub relaxation: f64,
}
impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 1000,
            relaxation: 1.2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    pub residual: f64,
}

/// Per-cell work arrays of one solve, borrowed from the field pool.
pub struct SolverScratch {
    residual: Array1<f64>,
    preconditioned: Array1<f64>,
    direction: Array1<f64>,
    product: Array1<f64>,
    temp: Array1<f64>,
    inv_diagonal: Array1<f64>,
}
impl SolverScratch {
    pub fn acquire(pool: &mut FieldPool) -> Self {
        Self {
            residual: pool.acquire_cell(),
            preconditioned: pool.acquire_cell(),
            direction: pool.acquire_cell(),
            product: pool.acquire_cell(),
            temp: pool.acquire_cell(),
            inv_diagonal: pool.acquire_cell(),
        }
    }
    pub fn release(self, pool: &mut FieldPool) {
        pool.release(self.residual);
        pool.release(self.preconditioned);
        pool.release(self.direction);
        pool.release(self.product);
        pool.release(self.temp);
        pool.release(self.inv_diagonal);
    }
}

fn invert_diagonal(
    system: &LinearSystem,
    inv_diagonal: &mut Array1<f64>,
    min_pivot: f64,
) -> Result<(), LinearSolverError> {
    for row in 0..system.row_num() {
        let value = system.diagonal(row);
        if value.abs() < min_pivot {
            return Err(LinearSolverError::ZeroDiagonal { row, value });
        }
        inv_diagonal[row] = 1.0 / value;
    }
    Ok(())
}

/// Jacobi-preconditioned conjugate gradient for symmetric positive
/// (semi-)definite systems. `x` holds the initial guess on entry.
pub fn conjugate_gradient(
    system: &LinearSystem,
    mut x: ArrayViewMut1<f64>,
    scratch: &mut SolverScratch,
    settings: &SolverSettings,
) -> Result<SolveReport, LinearSolverError> {
    let SolverScratch {
        residual: r,
        preconditioned: z,
        direction: p,
        product: q,
        inv_diagonal,
        ..
    } = scratch;
    invert_diagonal(system, inv_diagonal, PCG_MIN_PIVOT)?;

    system.mul_vec(x.view(), q.view_mut());
    for i in 0..system.row_num() {
        r[i] = system.source[i] - q[i];
    }
    let mut norm = r.dot(&*r).sqrt();
    if norm < settings.tolerance {
        return Ok(SolveReport {
            iterations: 0,
            residual: norm,
        });
    }
    Zip::from(&mut *z)
        .and(&*r)
        .and(&*inv_diagonal)
        .for_each(|z, &r, &d| *z = r * d);
    p.assign(&*z);
    let mut rz = r.dot(&*z);

    for iteration in 1..=settings.max_iterations {
        system.mul_vec(p.view(), q.view_mut());
        let pq = p.dot(&*q);
        if !pq.is_finite() || pq.abs() < f64::MIN_POSITIVE {
            // search direction collapsed or blew up before reaching the tolerance
            return Err(LinearSolverError::NotConverged {
                iterations: iteration,
                residual: norm,
            });
        }
        let alpha = rz / pq;
        x.scaled_add(alpha, &*p);
        r.scaled_add(-alpha, &*q);
        norm = r.dot(&*r).sqrt();
        if !norm.is_finite() {
            return Err(LinearSolverError::NotConverged {
                iterations: iteration,
                residual: norm,
            });
        }
        if norm < settings.tolerance {
            debug!(iterations = iteration, residual = norm, "pcg converged");
            return Ok(SolveReport {
                iterations: iteration,
                residual: norm,
            });
        }
        Zip::from(&mut *z)
            .and(&*r)
            .and(&*inv_diagonal)
            .for_each(|z, &r, &d| *z = r * d);
        let rz_next = r.dot(&*z);
        let beta = rz_next / rz;
        rz = rz_next;
        Zip::from(&mut *p).and(&*z).for_each(|p, &z| *p = z + beta * *p);
    }
    Err(LinearSolverError::NotConverged {
        iterations: settings.max_iterations,
        residual: norm,
    })
}

/// Successive over-relaxed Gauss-Seidel for general diagonally dominant
/// systems; converged once no entry changes by more than the tolerance.
pub fn gauss_seidel(
    system: &LinearSystem,
    mut x: ArrayViewMut1<f64>,
    scratch: &mut SolverScratch,
    settings: &SolverSettings,
) -> Result<SolveReport, LinearSolverError> {
    let SolverScratch {
        temp: jacobi,
        inv_diagonal,
        ..
    } = scratch;
    invert_diagonal(system, inv_diagonal, SOR_MIN_PIVOT)?;
    let n = system.row_num();

    for i in 0..n {
        jacobi[i] = (system.source[i] - system.off_diagonal_dot(i, x.view())) * inv_diagonal[i];
    }
    Zip::from(&mut x)
        .and(&*jacobi)
        .for_each(|x, &j| *x = SOR_WARM_START * *x + (1.0 - SOR_WARM_START) * j);

    let omega = settings.relaxation;
    let mut max_change = f64::INFINITY;
    for iteration in 1..=settings.max_iterations {
        max_change = 0.0;
        for i in 0..n {
            let update = (system.source[i] - system.off_diagonal_dot(i, x.view())) * inv_diagonal[i];
            let change = omega * (update - x[i]);
            x[i] += change;
            if !x[i].is_finite() {
                // diverged; f64::max would swallow the NaN
                return Err(LinearSolverError::NotConverged {
                    iterations: iteration,
                    residual: change.abs(),
                });
            }
            max_change = max_change.max(change.abs());
        }
        if max_change < settings.tolerance {
            debug!(iterations = iteration, change = max_change, "gauss-seidel converged");
            return Ok(SolveReport {
                iterations: iteration,
                residual: max_change,
            });
        }
    }
    Err(LinearSolverError::NotConverged {
        iterations: settings.max_iterations,
        residual: max_change,
    })
}

/// [`conjugate_gradient`] with scratch memory taken from and returned to `pool`.
pub fn solve_symmetric(
    system: &LinearSystem,
    x: ArrayViewMut1<f64>,
    pool: &mut FieldPool,
    settings: &SolverSettings,
) -> Result<SolveReport, LinearSolverError> {
    let mut scratch = SolverScratch::acquire(pool);
    let result = conjugate_gradient(system, x, &mut scratch, settings);
    scratch.release(pool);
    result
}

/// [`gauss_seidel`] with scratch memory taken from and returned to `pool`.
pub fn solve_general(
    system: &LinearSystem,
    x: ArrayViewMut1<f64>,
    pool: &mut FieldPool,
    settings: &SolverSettings,
) -> Result<SolveReport, LinearSolverError> {
    let mut scratch = SolverScratch::acquire(pool);
    let result = gauss_seidel(system, x, &mut scratch, settings);
    scratch.release(pool);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::linear_system::LinearSystemBuilder;
    use approx::assert_relative_eq;
    use faer::{Col, prelude::Solve};
    use faer_ext::IntoFaer;
    use ndarray::Array2;

    fn build(dense: &Array2<f64>, rhs: &[f64]) -> LinearSystemBuilder {
        let n = rhs.len();
        let mut builder = LinearSystemBuilder::with_volumes(vec![1.0; n]);
        for i in 0..n {
            builder.start_cell(i);
            for j in 0..n {
                if dense[(i, j)] != 0.0 {
                    builder.add_coefficient(j, dense[(i, j)]);
                }
            }
            builder.add_source(rhs[i]);
            builder.end_cell();
        }
        builder
    }

    fn dense_solution(dense: &Array2<f64>, rhs: &[f64]) -> Vec<f64> {
        let a = dense.view().into_faer();
        let b = Col::<f64>::from_iter(rhs.iter().copied());
        let lu = a.partial_piv_lu();
        let x = lu.solve(&b);
        x.subrows(0, rhs.len()).iter().copied().collect()
    }

    fn spd_matrix() -> Array2<f64> {
        ndarray::arr2(&[
            [4.0, -1.0, 0.0, 0.0, -1.0],
            [-1.0, 4.0, -1.0, 0.0, 0.0],
            [0.0, -1.0, 4.0, -1.0, 0.0],
            [0.0, 0.0, -1.0, 4.0, -1.0],
            [-1.0, 0.0, 0.0, -1.0, 4.0],
        ])
    }

    #[test]
    fn test_pcg_matches_analytic_solution() {
        let dense = spd_matrix();
        let exact = ndarray::arr1(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let rhs = dense.dot(&exact).to_vec();
        let mut builder = build(&dense, &rhs);
        let mut pool = FieldPool::with_sizes(5, 0);
        let mut x = Array1::zeros(5);
        let report = solve_symmetric(
            &builder.system(),
            x.view_mut(),
            &mut pool,
            &SolverSettings::default(),
        )
        .unwrap();
        assert!(report.iterations < 1000);
        let reference = dense_solution(&dense, &rhs);
        for i in 0..5 {
            assert_relative_eq!(x[i], exact[i], epsilon = 1e-6);
            assert_relative_eq!(x[i], reference[i], epsilon = 1e-6);
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_gauss_seidel_non_symmetric() {
        let dense = ndarray::arr2(&[
            [5.0, -2.0, 0.0, 1.0],
            [-1.0, 6.0, -3.0, 0.0],
            [0.0, -0.5, 4.0, -1.5],
            [2.0, 0.0, -1.0, 7.0],
        ]);
        let rhs = [1.0, -2.0, 3.0, 0.5];
        let mut builder = build(&dense, &rhs);
        let mut pool = FieldPool::with_sizes(4, 0);
        let mut x = Array1::zeros(4);
        let settings = SolverSettings {
            tolerance: 1e-10,
            ..Default::default()
        };
        solve_general(&builder.system(), x.view_mut(), &mut pool, &settings).unwrap();
        let reference = dense_solution(&dense, &rhs);
        for i in 0..4 {
            assert_relative_eq!(x[i], reference[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_zero_diagonal_fails_fast() {
        let dense = ndarray::arr2(&[[0.0, 1.0], [1.0, 2.0]]);
        let mut builder = build(&dense, &[1.0, 1.0]);
        let mut pool = FieldPool::with_sizes(2, 0);
        let mut x = Array1::zeros(2);
        let system = builder.system();
        let settings = SolverSettings::default();
        let expected = LinearSolverError::ZeroDiagonal { row: 0, value: 0.0 };
        assert_eq!(
            solve_symmetric(&system, x.view_mut(), &mut pool, &settings),
            Err(expected.clone())
        );
        assert_eq!(
            solve_general(&system, x.view_mut(), &mut pool, &settings),
            Err(expected)
        );
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_iteration_budget_is_reported() {
        let dense = spd_matrix();
        let rhs = [1.0, 0.0, 0.0, 0.0, 1.0];
        let mut builder = build(&dense, &rhs);
        let mut pool = FieldPool::with_sizes(5, 0);
        let mut x = Array1::zeros(5);
        let settings = SolverSettings {
            tolerance: 1e-14,
            max_iterations: 1,
            relaxation: 1.0,
        };
        let result = solve_general(&builder.system(), x.view_mut(), &mut pool, &settings);
        assert!(matches!(
            result,
            Err(LinearSolverError::NotConverged { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_diverging_gauss_seidel_is_not_converged() {
        // not diagonally dominant: the sweeps grow until they overflow
        let dense = ndarray::arr2(&[[1.0, 3.0], [3.0, 1.0]]);
        let mut builder = build(&dense, &[1.0, 2.0]);
        let mut pool = FieldPool::with_sizes(2, 0);
        let mut x = Array1::zeros(2);
        let result = solve_general(&builder.system(), x.view_mut(), &mut pool, &SolverSettings::default());
        assert!(matches!(result, Err(LinearSolverError::NotConverged { .. })));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_pcg_rejects_non_finite_source() {
        let dense = spd_matrix();
        let rhs = [1.0, f64::INFINITY, 0.0, 0.0, 1.0];
        let mut builder = build(&dense, &rhs);
        let mut pool = FieldPool::with_sizes(5, 0);
        let mut x = Array1::zeros(5);
        let result = solve_symmetric(&builder.system(), x.view_mut(), &mut pool, &SolverSettings::default());
        assert!(matches!(result, Err(LinearSolverError::NotConverged { .. })));
        assert_eq!(pool.outstanding(), 0);
    }
}

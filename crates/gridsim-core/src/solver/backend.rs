use anyhow::{anyhow, Result};
use faer::{prelude::*, solvers::PartialPivLu, Mat};

/// Trait for solving the dense Newton system `J Δx = b`.
pub trait LinearSystemBackend: Send + Sync {
    fn solve(&self, matrix: &Mat<f64>, rhs: &[f64]) -> Result<Vec<f64>>;
}

fn check_dimensions(matrix: &Mat<f64>, rhs: &[f64]) -> Result<usize> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(anyhow!(
            "matrix must be square, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        ));
    }
    if rhs.len() != n {
        return Err(anyhow!(
            "rhs length ({}) does not match matrix dimension {}",
            rhs.len(),
            n
        ));
    }
    Ok(n)
}

/// Pivots smaller than this are treated as a singular Jacobian.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Row with the largest magnitude in column `k`, searching rows `k..`.
fn pivot_row(a: &Mat<f64>, k: usize) -> usize {
    (k..a.nrows())
        .max_by(|&i, &j| a.read(i, k).abs().total_cmp(&a.read(j, k).abs()))
        .unwrap_or(k)
}

/// Swap rows `r1` and `r2` from column `from` onwards.
fn swap_rows(a: &mut Mat<f64>, r1: usize, r2: usize, from: usize) {
    for col in from..a.ncols() {
        let upper = a.read(r1, col);
        let lower = a.read(r2, col);
        a.write(r1, col, lower);
        a.write(r2, col, upper);
    }
}

/// Gaussian elimination with partial pivoting and back substitution.
#[derive(Debug, Clone, Default)]
pub struct GaussSolver;

impl LinearSystemBackend for GaussSolver {
    fn solve(&self, matrix: &Mat<f64>, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = check_dimensions(matrix, rhs)?;
        let mut a = matrix.clone();
        let mut x = rhs.to_vec();

        for k in 0..n {
            let pivot = pivot_row(&a, k);
            let diag = a.read(pivot, k);
            if diag.abs() < PIVOT_TOLERANCE {
                return Err(anyhow!("singular jacobian at column {}", k));
            }
            if pivot != k {
                swap_rows(&mut a, k, pivot, k);
                x.swap(k, pivot);
            }
            for row in k + 1..n {
                let factor = a.read(row, k) / diag;
                if factor == 0.0 {
                    continue;
                }
                for col in k..n {
                    let reduced = a.read(row, col) - factor * a.read(k, col);
                    a.write(row, col, reduced);
                }
                x[row] -= factor * x[k];
            }
        }

        for k in (0..n).rev() {
            let known: f64 = (k + 1..n).map(|col| a.read(k, col) * x[col]).sum();
            x[k] = (x[k] - known) / a.read(k, k);
        }
        Ok(x)
    }
}

/// LU with partial pivoting from `faer`.
#[derive(Debug, Clone, Default)]
pub struct FaerSolver;

impl LinearSystemBackend for FaerSolver {
    fn solve(&self, matrix: &Mat<f64>, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = check_dimensions(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let lu = PartialPivLu::new(matrix.as_ref());
        let sol = lu.solve(&rhs_mat);

        let solution: Vec<f64> = (0..n).map(|i| sol.read(i, 0)).collect();
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("singular jacobian (faer solver)"));
        }
        Ok(solution)
    }
}

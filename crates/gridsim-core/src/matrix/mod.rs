//! # Jacobian accumulators
//!
//! Models write partial derivatives through [`MatrixData`] without knowing
//! whether the solver wants a dense or a sparse Jacobian:
//!
//! ```text
//! ┌──────────────────────┬────────────────────┬────────────────────────────────────┐
//! │ ACCUMULATOR          │ BACKING            │ ASSIGN OUTSIDE STRUCTURE           │
//! │──────────────────────│────────────────────│────────────────────────────────────│
//! │ DenseMatrixData      │ faer::Mat (borrow) │ n/a (every cell exists)            │
//! │ SparseMatrixData     │ sprs CSC (borrow)  │ panic / GridError::Structure       │
//! │ TripletMatrixData    │ owned (r, c, v)    │ over-budget: panic / Structure     │
//! └──────────────────────┴────────────────────┴────────────────────────────────────┘
//! ```
//!
//! Every `assign` adds into the cell: two physical effects landing on the same
//! partial derivative sum. The sparse accumulator never inserts new structure;
//! the pattern is discovered up front with [`sparsity_pattern`], which runs a
//! model tree's `jacobian_elements` into a [`TripletMatrixData`].
//!
//! `assign_check_col` is the one sanctioned skip: a `None` column means the
//! upstream signal is not wired, so the term does not apply.

mod dense;
mod sparse;
mod triplet;

pub use dense::DenseMatrixData;
pub use sparse::SparseMatrixData;
pub use triplet::TripletMatrixData;

use crate::error::GridResult;
use crate::locations::StateData;
use crate::mode::SolveMode;
use crate::model::DynamicModel;
use serde::Serialize;
use sprs::CsMat;

/// One Jacobian entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Triplet {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// Write/read interface over a matrix under construction.
pub trait MatrixData {
    /// Zero every stored value; structure and capacity are unchanged.
    fn clear(&mut self);

    /// Add `value` into `(row, col)`, reporting a missing structural entry.
    fn try_assign(&mut self, row: usize, col: usize, value: f64) -> GridResult<()>;

    /// Add `value` into `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics when the cell is not part of the matrix structure. That means
    /// the pattern was registered from an under-declared model.
    fn assign(&mut self, row: usize, col: usize, value: f64) {
        if let Err(err) = self.try_assign(row, col, value) {
            panic!("jacobian assign ({row}, {col}) rejected: {err}");
        }
    }

    /// Like [`assign`](Self::assign) but skips unwired or out-of-range columns.
    fn assign_check_col(&mut self, row: usize, col: Option<usize>, value: f64) {
        if let Some(col) = col {
            if col < self.col_limit() {
                self.assign(row, col, value);
            }
        }
    }

    /// Structurally valid entries
    fn size(&self) -> usize;

    /// Allocated entries
    fn capacity(&self) -> usize;

    fn row_limit(&self) -> usize;

    fn col_limit(&self) -> usize;

    /// Row of the `n`-th stored entry
    fn row_index(&self, n: usize) -> usize;

    /// Column of the `n`-th stored entry
    fn col_index(&self, n: usize) -> usize;

    /// Value of the `n`-th stored entry
    fn val(&self, n: usize) -> f64;

    /// Value at `(row, col)`; 0.0 for cells that hold nothing.
    fn at(&self, row: usize, col: usize) -> f64;

    /// Restartable walk over stored entries in column-major order.
    fn triplets(&self) -> Box<dyn Iterator<Item = Triplet> + '_> {
        Box::new((0..self.size()).map(move |n| Triplet {
            row: self.row_index(n),
            col: self.col_index(n),
            value: self.val(n),
        }))
    }
}

/// Discover every Jacobian entry `model` can produce under `mode`.
///
/// Runs `jacobian_elements` once into a triplet list sized by the tree's
/// declared `jac_size` and returns a zero-valued `n × n` CSC pattern.
pub fn sparsity_pattern(model: &dyn DynamicModel, sd: &StateData<'_>, mode: &SolveMode, n: usize) -> CsMat<f64> {
    let budget = model.offsets().get(mode).total.jac_size;
    let mut triplets = TripletMatrixData::new(n, n, budget);
    model.jacobian_elements(&[], sd, &mut triplets, &[], mode);
    let pattern = triplets.pattern();
    tracing::debug!(
        component = model.name(),
        mode = %mode,
        n,
        nnz = pattern.nnz(),
        budget,
        "built jacobian sparsity pattern"
    );
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(data: &mut dyn MatrixData) {
        data.assign(0, 0, 1.0);
        data.assign(2, 0, 2.0);
        data.assign(1, 1, 3.0);
        data.assign(2, 2, 4.0);
        data.assign(2, 2, 0.5);
    }

    #[test]
    fn dense_and_sparse_accumulators_agree() {
        let mut pattern = TripletMatrixData::new(3, 3, 8);
        fill(&mut pattern);
        let mut csc = pattern.pattern();
        let mut dense = faer::Mat::<f64>::zeros(3, 3);

        let mut sparse_data = SparseMatrixData::new(&mut csc);
        fill(&mut sparse_data);
        let mut dense_data = DenseMatrixData::new(&mut dense);
        fill(&mut dense_data);

        for row in 0..3 {
            for col in 0..3 {
                assert_eq!(sparse_data.at(row, col), dense_data.at(row, col));
            }
        }
        assert_eq!(sparse_data.at(2, 2), 4.5);
    }

    #[test]
    fn assign_check_col_skips_unwired_columns() {
        let mut dense = faer::Mat::<f64>::zeros(2, 2);
        let mut data = DenseMatrixData::new(&mut dense);
        data.assign_check_col(0, None, 5.0);
        data.assign_check_col(0, Some(7), 5.0);
        data.assign_check_col(1, Some(1), 5.0);
        assert_eq!(data.at(0, 0), 0.0);
        assert_eq!(data.at(0, 1), 0.0);
        assert_eq!(data.at(1, 1), 5.0);
    }
}

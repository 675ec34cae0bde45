use super::{MatrixData, Triplet};
use crate::error::{GridError, GridResult};
use sprs::{CsMat, TriMat};

/// Owned coordinate list with a fixed entry budget.
///
/// Used to discover the Jacobian pattern before a compressed matrix exists.
/// Repeated `(row, col)` pairs are kept as separate entries and summed by
/// [`at`](MatrixData::at) and on conversion.
#[derive(Debug, Clone)]
pub struct TripletMatrixData {
    rows: usize,
    cols: usize,
    capacity: usize,
    row_ind: Vec<usize>,
    col_ind: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrixData {
    pub fn new(rows: usize, cols: usize, capacity: usize) -> Self {
        TripletMatrixData {
            rows,
            cols,
            capacity,
            row_ind: Vec::with_capacity(capacity),
            col_ind: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Drop every entry, keeping the dimensions and budget.
    pub fn reset(&mut self) {
        self.row_ind.clear();
        self.col_ind.clear();
        self.values.clear();
    }

    fn to_trimat(&self, zero_values: bool) -> TriMat<f64> {
        let values = if zero_values {
            vec![0.0; self.values.len()]
        } else {
            self.values.clone()
        };
        TriMat::from_triplets((self.rows, self.cols), self.row_ind.clone(), self.col_ind.clone(), values)
    }

    /// Compressed-column matrix with duplicates summed.
    pub fn to_csc(&self) -> CsMat<f64> {
        self.to_trimat(false).to_csc()
    }

    /// Compressed-column structure of every entry, all values zero.
    pub fn pattern(&self) -> CsMat<f64> {
        self.to_trimat(true).to_csc()
    }
}

impl MatrixData for TripletMatrixData {
    fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    fn try_assign(&mut self, row: usize, col: usize, value: f64) -> GridResult<()> {
        if row >= self.rows || col >= self.cols {
            return Err(GridError::Structure(format!(
                "entry ({}, {}) outside {}x{} matrix",
                row, col, self.rows, self.cols
            )));
        }
        if self.values.len() >= self.capacity {
            return Err(GridError::Structure(format!(
                "jacobian entry budget of {} exceeded; a model under-declared its jacobian size",
                self.capacity
            )));
        }
        self.row_ind.push(row);
        self.col_ind.push(col);
        self.values.push(value);
        Ok(())
    }

    fn size(&self) -> usize {
        self.values.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn row_limit(&self) -> usize {
        self.rows
    }

    fn col_limit(&self) -> usize {
        self.cols
    }

    fn row_index(&self, n: usize) -> usize {
        self.row_ind[n]
    }

    fn col_index(&self, n: usize) -> usize {
        self.col_ind[n]
    }

    fn val(&self, n: usize) -> f64 {
        self.values[n]
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        (0..self.values.len())
            .filter(|&n| self.row_ind[n] == row && self.col_ind[n] == col)
            .map(|n| self.values[n])
            .sum()
    }

    /// Entries in column-major order, stable within a column.
    fn triplets(&self) -> Box<dyn Iterator<Item = Triplet> + '_> {
        let mut order: Vec<usize> = (0..self.values.len()).collect();
        order.sort_by_key(|&n| (self.col_ind[n], self.row_ind[n]));
        Box::new(order.into_iter().map(move |n| Triplet {
            row: self.row_ind[n],
            col: self.col_ind[n],
            value: self.values[n],
        }))
    }
}

use super::MatrixData;
use crate::error::{GridError, GridResult};
use faer::Mat;

/// Accumulator over a borrowed dense `faer` matrix.
///
/// Positional access is column-major: entry `n` is row `n % nrows`,
/// column `n / nrows`.
pub struct DenseMatrixData<'a> {
    mat: &'a mut Mat<f64>,
}

impl<'a> DenseMatrixData<'a> {
    pub fn new(mat: &'a mut Mat<f64>) -> Self {
        DenseMatrixData { mat }
    }

    /// Rebind to another solver-owned matrix.
    pub fn set_matrix(&mut self, mat: &'a mut Mat<f64>) {
        self.mat = mat;
    }
}

impl MatrixData for DenseMatrixData<'_> {
    fn clear(&mut self) {
        for col in 0..self.mat.ncols() {
            for row in 0..self.mat.nrows() {
                self.mat.write(row, col, 0.0);
            }
        }
    }

    fn try_assign(&mut self, row: usize, col: usize, value: f64) -> GridResult<()> {
        if row >= self.mat.nrows() || col >= self.mat.ncols() {
            return Err(GridError::Structure(format!(
                "entry ({}, {}) outside {}x{} matrix",
                row,
                col,
                self.mat.nrows(),
                self.mat.ncols()
            )));
        }
        let current = self.mat.read(row, col);
        self.mat.write(row, col, current + value);
        Ok(())
    }

    fn size(&self) -> usize {
        self.mat.nrows() * self.mat.ncols()
    }

    fn capacity(&self) -> usize {
        self.size()
    }

    fn row_limit(&self) -> usize {
        self.mat.nrows()
    }

    fn col_limit(&self) -> usize {
        self.mat.ncols()
    }

    fn row_index(&self, n: usize) -> usize {
        n % self.mat.nrows()
    }

    fn col_index(&self, n: usize) -> usize {
        n / self.mat.nrows()
    }

    fn val(&self, n: usize) -> f64 {
        self.mat.read(self.row_index(n), self.col_index(n))
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        if row < self.mat.nrows() && col < self.mat.ncols() {
            self.mat.read(row, col)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_accumulates_and_clear_zeroes() {
        let mut mat = Mat::<f64>::zeros(3, 2);
        let mut data = DenseMatrixData::new(&mut mat);
        data.assign(2, 1, 1.5);
        data.assign(2, 1, 2.0);
        assert_eq!(data.at(2, 1), 3.5);
        assert_eq!(data.size(), 6);
        assert_eq!(data.capacity(), 6);

        data.clear();
        assert_eq!(data.at(2, 1), 0.0);
        assert_eq!(data.size(), 6);
    }

    #[test]
    fn positional_access_is_column_major() {
        let mut mat = Mat::<f64>::zeros(3, 2);
        let mut data = DenseMatrixData::new(&mut mat);
        data.assign(1, 1, 9.0);
        assert_eq!(data.row_index(4), 1);
        assert_eq!(data.col_index(4), 1);
        assert_eq!(data.val(4), 9.0);
        let cols: Vec<usize> = data.triplets().map(|t| t.col).collect();
        assert_eq!(cols, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn out_of_range_assign_is_an_error() {
        let mut mat = Mat::<f64>::zeros(2, 2);
        let mut data = DenseMatrixData::new(&mut mat);
        assert!(data.try_assign(2, 0, 1.0).is_err());
        assert_eq!(data.at(5, 5), 0.0);
    }

    #[test]
    fn set_matrix_rebinds_without_copying() {
        let mut first = Mat::<f64>::zeros(2, 2);
        let mut second = Mat::<f64>::zeros(4, 4);
        {
            let mut data = DenseMatrixData::new(&mut first);
            data.assign(0, 0, 1.0);
            data.set_matrix(&mut second);
            assert_eq!(data.row_limit(), 4);
            data.assign(3, 3, 2.0);
        }
        assert_eq!(first.read(0, 0), 1.0);
        assert_eq!(second.read(3, 3), 2.0);
    }
}

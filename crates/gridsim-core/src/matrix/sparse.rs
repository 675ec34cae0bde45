use super::{MatrixData, Triplet};
use crate::error::{GridError, GridResult};
use sprs::CsMat;

/// Accumulator over a borrowed compressed-column `sprs` matrix.
///
/// The non-zero structure is fixed by whoever built the matrix; `assign`
/// only ever adds into existing entries.
pub struct SparseMatrixData<'a> {
    mat: &'a mut CsMat<f64>,
}

/// Stored positions are used directly as indices into `indices()` and `data()`.
fn check_storage(mat: &CsMat<f64>) {
    assert!(mat.is_csc(), "sparse jacobian storage must be compressed-column");
    let base = mat.indptr().raw_storage()[0];
    assert!(base == 0, "sparse jacobian storage must own its entries (indptr starts at {})", base);
}

impl<'a> SparseMatrixData<'a> {
    /// # Panics
    ///
    /// Panics if `mat` is stored row-major or is a view whose column
    /// pointers do not start at zero.
    pub fn new(mat: &'a mut CsMat<f64>) -> Self {
        check_storage(mat);
        SparseMatrixData { mat }
    }

    /// Rebind to another solver-owned matrix.
    pub fn set_matrix(&mut self, mat: &'a mut CsMat<f64>) {
        check_storage(mat);
        self.mat = mat;
    }

    fn column_range(&self, col: usize) -> std::ops::Range<usize> {
        let ptr = self.mat.indptr();
        let ptr = ptr.raw_storage();
        ptr[col]..ptr[col + 1]
    }

    /// Storage position of `(row, col)`, if the pattern holds it.
    fn position(&self, row: usize, col: usize) -> Option<usize> {
        if col >= self.mat.cols() {
            return None;
        }
        let range = self.column_range(col);
        let start = range.start;
        self.mat.indices()[range]
            .iter()
            .position(|&r| r == row)
            .map(|k| start + k)
    }
}

impl MatrixData for SparseMatrixData<'_> {
    fn clear(&mut self) {
        self.mat.data_mut().iter_mut().for_each(|v| *v = 0.0);
    }

    fn try_assign(&mut self, row: usize, col: usize, value: f64) -> GridResult<()> {
        match self.position(row, col) {
            Some(pos) => {
                self.mat.data_mut()[pos] += value;
                Ok(())
            }
            None => Err(GridError::Structure(format!(
                "entry ({}, {}) is not in the registered sparsity pattern",
                row, col
            ))),
        }
    }

    fn size(&self) -> usize {
        self.mat.indptr().raw_storage()[self.mat.cols()]
    }

    /// sprs stores exactly the structural entries, so this equals `size()`.
    fn capacity(&self) -> usize {
        self.mat.indices().len()
    }

    fn row_limit(&self) -> usize {
        self.mat.rows()
    }

    fn col_limit(&self) -> usize {
        self.mat.cols()
    }

    fn row_index(&self, n: usize) -> usize {
        self.mat.indices()[n]
    }

    /// Greatest column whose start is at or before `n`; empty columns are skipped.
    fn col_index(&self, n: usize) -> usize {
        assert!(n < self.size(), "entry {} out of range for {} stored entries", n, self.size());
        let ptr = self.mat.indptr();
        ptr.raw_storage().partition_point(|&p| p <= n) - 1
    }

    fn val(&self, n: usize) -> f64 {
        self.mat.data()[n]
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.position(row, col).map_or(0.0, |pos| self.mat.data()[pos])
    }

    fn triplets(&self) -> Box<dyn Iterator<Item = Triplet> + '_> {
        let indices = self.mat.indices();
        let data = self.mat.data();
        Box::new((0..self.mat.cols()).flat_map(move |col| {
            self.column_range(col).map(move |pos| Triplet {
                row: indices[pos],
                col,
                value: data[pos],
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    /// 4x4 pattern with an empty column 2.
    fn pattern() -> CsMat<f64> {
        let mut tri = TriMat::new((4, 4));
        tri.add_triplet(0, 0, 0.0);
        tri.add_triplet(3, 0, 0.0);
        tri.add_triplet(1, 1, 0.0);
        tri.add_triplet(2, 3, 0.0);
        tri.add_triplet(3, 3, 0.0);
        tri.to_csc()
    }

    #[test]
    fn assign_accumulates_instead_of_overwriting() {
        let mut csc = pattern();
        let mut data = SparseMatrixData::new(&mut csc);
        data.assign(3, 0, 1.25);
        data.assign(3, 0, 2.5);
        assert_eq!(data.at(3, 0), 3.75);
        assert_eq!(data.at(2, 2), 0.0);
        assert_eq!(data.at(0, 3), 0.0);
        assert_eq!(data.at(9, 9), 0.0);
    }

    #[test]
    fn clear_keeps_structure() {
        let mut csc = pattern();
        let mut data = SparseMatrixData::new(&mut csc);
        data.assign(1, 1, 4.0);
        data.clear();
        assert_eq!(data.size(), 5);
        assert_eq!(data.capacity(), 5);
        assert_eq!(data.at(1, 1), 0.0);
    }

    #[test]
    fn col_index_skips_empty_columns() {
        let mut csc = pattern();
        let data = SparseMatrixData::new(&mut csc);
        let cols: Vec<usize> = (0..data.size()).map(|n| data.col_index(n)).collect();
        assert_eq!(cols, vec![0, 0, 1, 3, 3]);
        assert_eq!(data.row_index(1), 3);
    }

    #[test]
    fn iteration_is_column_major_and_restartable() {
        let mut csc = pattern();
        let mut data = SparseMatrixData::new(&mut csc);
        let fill = |data: &mut SparseMatrixData<'_>| {
            data.clear();
            data.assign(3, 3, 1.0);
            data.assign(0, 0, 2.0);
            data.assign(1, 1, 3.0);
        };
        fill(&mut data);
        let first: Vec<Triplet> = data.triplets().collect();
        let again: Vec<Triplet> = data.triplets().collect();
        fill(&mut data);
        let refilled: Vec<Triplet> = data.triplets().collect();

        assert_eq!(first, again);
        assert_eq!(first, refilled);
        let order: Vec<(usize, usize)> = first.iter().map(|t| (t.row, t.col)).collect();
        assert_eq!(order, vec![(0, 0), (3, 0), (1, 1), (2, 3), (3, 3)]);
        assert!(first.iter().all(|t| t.col < data.col_limit()));
        assert_eq!(first.last().map(|t| t.value), Some(1.0));
    }

    #[test]
    fn positional_access_agrees_with_iteration() {
        let mut csc = pattern();
        let mut data = SparseMatrixData::new(&mut csc);
        data.assign(3, 0, 1.0);
        data.assign(1, 1, 2.0);
        data.assign(2, 3, 3.0);
        for (n, t) in data.triplets().enumerate() {
            assert_eq!((data.row_index(n), data.col_index(n), data.val(n)), (t.row, t.col, t.value));
        }
        assert_eq!(data.triplets().count(), data.size());
    }

    #[test]
    fn missing_pattern_entry_is_reported() {
        let mut csc = pattern();
        let mut data = SparseMatrixData::new(&mut csc);
        let err = data.try_assign(2, 2, 1.0).unwrap_err();
        assert!(matches!(err, GridError::Structure(_)));
    }

    #[test]
    #[should_panic(expected = "not in the registered sparsity pattern")]
    fn missing_pattern_entry_panics_on_assign() {
        let mut csc = pattern();
        let mut data = SparseMatrixData::new(&mut csc);
        data.assign(0, 1, 1.0);
    }

    #[test]
    fn set_matrix_rebinds_to_new_structure() {
        let mut small = pattern();
        let mut big = {
            let mut tri = TriMat::new((6, 6));
            tri.add_triplet(5, 5, 0.0);
            tri.to_csc()
        };
        let mut data = SparseMatrixData::new(&mut small);
        data.set_matrix(&mut big);
        data.assign(5, 5, 1.0);
        assert_eq!(data.size(), 1);
        assert_eq!(data.at(5, 5), 1.0);
    }
}

//! Row-major views over flat slices and the faer GEMM entry point.
//!
//! faer views are column-major; a row-major `rows × cols` matrix is the
//! transpose of a column-major `cols × rows` one, so no data is copied.

use faer::linalg::matmul::matmul;
use faer::{Accum, MatMut, MatRef, Par};

/// Row-major `rows × cols` view of `data`.
///
/// # Panics
///
/// Panics if `rows * cols != data.len()`.
pub(crate) fn row_major(data: &[f64], rows: usize, cols: usize) -> MatRef<'_, f64> {
    assert_eq!(
        rows * cols,
        data.len(),
        "matrix dimensions ({rows} x {cols} = {}) must match data length ({})",
        rows * cols,
        data.len()
    );
    MatRef::from_column_major_slice(data, cols, rows).transpose()
}

/// Mutable row-major `rows × cols` view of `data`.
pub(crate) fn row_major_mut(data: &mut [f64], rows: usize, cols: usize) -> MatMut<'_, f64> {
    assert_eq!(
        rows * cols,
        data.len(),
        "matrix dimensions ({rows} x {cols} = {}) must match data length ({})",
        rows * cols,
        data.len()
    );
    MatMut::from_column_major_slice_mut(data, cols, rows).transpose_mut()
}

/// `dst = lhs · rhs`.
pub(crate) fn gemm(dst: MatMut<'_, f64>, lhs: MatRef<'_, f64>, rhs: MatRef<'_, f64>) {
    matmul(dst, Accum::Replace, lhs, rhs, 1.0, Par::Seq);
}

/// `dst += lhs · rhs`.
pub(crate) fn gemm_add(dst: MatMut<'_, f64>, lhs: MatRef<'_, f64>, rhs: MatRef<'_, f64>) {
    matmul(dst, Accum::Add, lhs, rhs, 1.0, Par::Seq);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_view() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = row_major(&data, 2, 3);
        assert_eq!(m.nrows(), 2);
        assert_eq!(m.ncols(), 3);
        assert_eq!(m[(0, 2)], 3.0);
        assert_eq!(m[(1, 0)], 4.0);
    }

    #[test]
    fn test_gemm_row_major() {
        // [[1,2],[3,4]] · [[5,6],[7,8]] = [[19,22],[43,50]]
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let mut c = [0.0; 4];
        gemm(row_major_mut(&mut c, 2, 2), row_major(&a, 2, 2), row_major(&b, 2, 2));
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);

        gemm_add(
            row_major_mut(&mut c, 2, 2),
            row_major(&a, 2, 2).transpose(),
            row_major(&b, 2, 2),
        );
        // Aᵗ B = [[26,30],[38,44]]
        assert_eq!(c, [45.0, 52.0, 81.0, 94.0]);
    }

    #[test]
    #[should_panic(expected = "must match data length")]
    fn test_row_major_wrong_size() {
        row_major(&[1.0, 2.0, 3.0], 2, 2);
    }
}

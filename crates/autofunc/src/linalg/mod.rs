//! Linear-algebra nodes over row-major matrices.
//!
//! Products go through faer's GEMM on zero-copy views; see [`kernels`].

mod kernels;
mod lin_tran;
mod matmul;
mod scale_rows;
mod transpose;

pub use lin_tran::{LinAdd, LinTran};
pub use matmul::{mat_mul, mat_mul_r, mat_vec, mat_vec_r, outer, outer_r};
pub use scale_rows::{scale_rows, scale_rows_r};
pub use transpose::{transpose, transpose_r};

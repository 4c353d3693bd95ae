//! Learnable affine maps built from the matrix nodes.

use super::matmul::{mat_mul, mat_mul_r, mat_vec, mat_vec_r};
use super::transpose::{transpose, transpose_r};
use crate::batch::{Batcher, RBatcher, segment_len};
use crate::gradient::RVector;
use crate::node::{Func, NodeRef, RFunc, RNodeRef};
use crate::ops::{add, add_r, repeat, repeat_r};
use crate::storage::Context;
use crate::variable::Variable;

/// Linear transform `y = M x` with a row-major `rows × cols` parameter matrix.
///
/// # Example
///
/// ```
/// use autofunc::linalg::LinTran;
/// use autofunc::{Context, Func, Variable, constant};
///
/// let ctx = Context::default();
/// let m = Variable::new(vec![1.0, 2.0, 3.0, 3.0, 4.0, 5.0, -6.0, 1.0, 7.0, 8.0, -10.0, 4.0]);
/// let lin = LinTran::new(m, 3, 4);
/// let y = lin.apply(&ctx, &constant(vec![4.0, 3.0, 2.0, 1.0]));
/// assert_eq!(y.output(), &[19.0, 20.0, 36.0]);
/// ```
#[derive(Debug)]
pub struct LinTran {
    data: Variable,
    rows: usize,
    cols: usize,
}

impl LinTran {
    /// # Panics
    ///
    /// Panics if `data` does not hold `rows * cols` values.
    pub fn new(data: Variable, rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "LinTran: matrix has length {}, expected {rows} x {cols}",
            data.len()
        );
        Self { data, rows, cols }
    }

    /// Output length.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Input length.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The parameter matrix.
    pub fn data(&self) -> &Variable {
        &self.data
    }

    /// Mutable parameter matrix, e.g. for an optimizer step.
    pub fn data_mut(&mut self) -> &mut Variable {
        &mut self.data
    }
}

impl Func for LinTran {
    fn apply(&self, ctx: &Context, input: &NodeRef) -> NodeRef {
        mat_vec(ctx, &self.data.node(), self.rows, self.cols, input)
    }
}

impl RFunc for LinTran {
    fn apply_r(&self, ctx: &Context, rv: &RVector, input: &RNodeRef) -> RNodeRef {
        mat_vec_r(ctx, &self.data.r_node(rv), self.rows, self.cols, input)
    }
}

impl Batcher for LinTran {
    /// `n` packed inputs as an `n × cols` matrix `X`; returns `X Mᵗ`.
    fn batch(&self, ctx: &Context, input: &NodeRef, n: usize) -> NodeRef {
        let cols = segment_len(input.output().len(), n);
        assert_eq!(
            cols, self.cols,
            "LinTran: input segments have length {cols}, expected {}",
            self.cols
        );
        let mt = transpose(ctx, &self.data.node(), self.rows, self.cols);
        mat_mul(ctx, input, n, self.cols, &mt, self.rows)
    }
}

impl RBatcher for LinTran {
    fn batch_r(&self, ctx: &Context, rv: &RVector, input: &RNodeRef, n: usize) -> RNodeRef {
        let cols = segment_len(input.output().len(), n);
        assert_eq!(
            cols, self.cols,
            "LinTran: input segments have length {cols}, expected {}",
            self.cols
        );
        let mt = transpose_r(ctx, &self.data.r_node(rv), self.rows, self.cols);
        mat_mul_r(ctx, input, n, self.cols, &mt, self.rows)
    }
}

/// Adds a learnable bias vector.
#[derive(Debug)]
pub struct LinAdd {
    bias: Variable,
}

impl LinAdd {
    pub fn new(bias: Variable) -> Self {
        Self { bias }
    }

    pub fn bias(&self) -> &Variable {
        &self.bias
    }

    pub fn bias_mut(&mut self) -> &mut Variable {
        &mut self.bias
    }
}

impl Func for LinAdd {
    fn apply(&self, ctx: &Context, input: &NodeRef) -> NodeRef {
        add(ctx, input, &self.bias.node())
    }
}

impl RFunc for LinAdd {
    fn apply_r(&self, ctx: &Context, rv: &RVector, input: &RNodeRef) -> RNodeRef {
        add_r(ctx, input, &self.bias.r_node(rv))
    }
}

impl Batcher for LinAdd {
    fn batch(&self, ctx: &Context, input: &NodeRef, n: usize) -> NodeRef {
        segment_len(input.output().len(), n);
        add(ctx, input, &repeat(ctx, &self.bias.node(), n))
    }
}

impl RBatcher for LinAdd {
    fn batch_r(&self, ctx: &Context, rv: &RVector, input: &RNodeRef, n: usize) -> RNodeRef {
        segment_len(input.output().len(), n);
        add_r(ctx, input, &repeat_r(ctx, &self.bias.r_node(rv), n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::backward;
    use crate::gradient::Gradient;
    use crate::leaf::constant;

    fn example() -> LinTran {
        LinTran::new(
            Variable::new(vec![
                1.0, 2.0, 3.0, 3.0, //
                4.0, 5.0, -6.0, 1.0, //
                7.0, 8.0, -10.0, 4.0,
            ]),
            3,
            4,
        )
    }

    #[test]
    fn test_lin_tran_batch_matches_apply() {
        let ctx = Context::default();
        let lin = example();
        let a = [4.0, 3.0, 2.0, 1.0];
        let b = [1.0, 0.0, -1.0, 2.0];
        let packed = constant([a, b].concat());

        let batched = lin.batch(&ctx, &packed, 2);
        let ya = lin.apply(&ctx, &constant(a.to_vec()));
        let yb = lin.apply(&ctx, &constant(b.to_vec()));
        assert_eq!(batched.output(), [ya.output(), yb.output()].concat().as_slice());

        let mut g_batch = Gradient::for_vars([lin.data()]);
        backward(batched.as_ref(), &[1.0; 6], &mut g_batch);
        let mut g_single = Gradient::for_vars([lin.data()]);
        backward(ya.as_ref(), &[1.0; 3], &mut g_single);
        backward(yb.as_ref(), &[1.0; 3], &mut g_single);
        assert_eq!(g_batch, g_single);
    }

    #[test]
    fn test_lin_add_batch() {
        let ctx = Context::default();
        let bias = LinAdd::new(Variable::new(vec![1.0, -1.0]));
        let y = bias.batch(&ctx, &constant(vec![0.0, 0.0, 10.0, 10.0]), 2);
        assert_eq!(y.output(), &[1.0, -1.0, 11.0, 9.0]);

        let mut grad = Gradient::for_vars([bias.bias()]);
        backward(y.as_ref(), &[1.0, 2.0, 3.0, 4.0], &mut grad);
        assert_eq!(grad.get(bias.bias().id()).unwrap(), &[4.0, 6.0]);
    }

    #[test]
    #[should_panic(expected = "LinTran: matrix has length 5")]
    fn test_lin_tran_shape() {
        LinTran::new(Variable::zeros(5), 2, 3);
    }
}

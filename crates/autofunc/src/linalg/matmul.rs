//! Dense products: matrix-matrix, matrix-vector and outer.
//!
//! All three are the same node. A vector of length `n` is an `n × 1` matrix
//! as a right operand and a `1 × n` matrix as the right side of an outer
//! product; in row-major order neither view moves any data.

use super::kernels::{gemm, gemm_add, row_major, row_major_mut};
use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::storage::{Buffer, Context};
use std::rc::Rc;

/// Shape of `C = A B` with `A: m × k`, `B: k × n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dims {
    m: usize,
    k: usize,
    n: usize,
}

impl Dims {
    fn check(self, op: &str, a_len: usize, b_len: usize) -> Self {
        assert_eq!(
            a_len,
            self.m * self.k,
            "{op}: left operand has length {a_len}, expected {} x {}",
            self.m,
            self.k
        );
        assert_eq!(
            b_len,
            self.k * self.n,
            "{op}: right operand has length {b_len}, expected {} x {}",
            self.k,
            self.n
        );
        self
    }

    fn product(self, ctx: &Context, a: &[f64], b: &[f64]) -> Buffer {
        let Dims { m, k, n } = self;
        let mut out = ctx.alloc(m * n);
        gemm(row_major_mut(&mut out, m, n), row_major(a, m, k), row_major(b, k, n));
        out
    }

    /// `Ȧ B + A Ḃ`
    fn tangent(self, ctx: &Context, a: &[f64], a_r: &[f64], b: &[f64], b_r: &[f64]) -> Buffer {
        let Dims { m, k, n } = self;
        let mut out = ctx.alloc(m * n);
        gemm(row_major_mut(&mut out, m, n), row_major(a_r, m, k), row_major(b, k, n));
        gemm_add(row_major_mut(&mut out, m, n), row_major(a, m, k), row_major(b_r, k, n));
        out
    }

    /// `U Bᵗ`, the adjoint of `A`.
    fn left_adjoint(self, ctx: &Context, u: &[f64], b: &[f64]) -> Buffer {
        let Dims { m, k, n } = self;
        let mut out = ctx.alloc(m * k);
        gemm(
            row_major_mut(&mut out, m, k),
            row_major(u, m, n),
            row_major(b, k, n).transpose(),
        );
        out
    }

    /// `out += U Bᵗ`
    fn add_left_adjoint(self, out: &mut [f64], u: &[f64], b: &[f64]) {
        let Dims { m, k, n } = self;
        gemm_add(
            row_major_mut(out, m, k),
            row_major(u, m, n),
            row_major(b, k, n).transpose(),
        );
    }

    /// `Aᵗ U`, the adjoint of `B`.
    fn right_adjoint(self, ctx: &Context, a: &[f64], u: &[f64]) -> Buffer {
        let Dims { m, k, n } = self;
        let mut out = ctx.alloc(k * n);
        gemm(
            row_major_mut(&mut out, k, n),
            row_major(a, m, k).transpose(),
            row_major(u, m, n),
        );
        out
    }

    /// `out += Aᵗ U`
    fn add_right_adjoint(self, out: &mut [f64], a: &[f64], u: &[f64]) {
        let Dims { m, k, n } = self;
        gemm_add(
            row_major_mut(out, k, n),
            row_major(a, m, k).transpose(),
            row_major(u, m, n),
        );
    }
}

#[derive(Debug)]
struct MatMul {
    ctx: Context,
    a: NodeRef,
    b: NodeRef,
    dims: Dims,
    output: Buffer,
    leaves: LeafSet,
}

fn mat_mul_node(ctx: &Context, a: &NodeRef, b: &NodeRef, dims: Dims) -> NodeRef {
    Rc::new(MatMul {
        ctx: ctx.clone(),
        output: dims.product(ctx, a.output(), b.output()),
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
        dims,
    })
}

/// Row-major matrix product `C = A B`, `A: rows × inner`, `B: inner × cols`.
///
/// # Panics
///
/// Panics if either operand's length does not match its dimensions.
///
/// # Example
///
/// ```
/// use autofunc::{Context, Variable, linalg};
///
/// let ctx = Context::default();
/// let a = Variable::new(vec![1.0, 2.0, 3.0, 4.0]);
/// let b = Variable::new(vec![5.0, 6.0, 7.0, 8.0]);
/// let c = linalg::mat_mul(&ctx, &a.node(), 2, 2, &b.node(), 2);
/// assert_eq!(c.output(), &[19.0, 22.0, 43.0, 50.0]);
/// ```
pub fn mat_mul(
    ctx: &Context,
    a: &NodeRef,
    rows: usize,
    inner: usize,
    b: &NodeRef,
    cols: usize,
) -> NodeRef {
    let dims = Dims { m: rows, k: inner, n: cols }.check(
        "mat_mul",
        a.output().len(),
        b.output().len(),
    );
    mat_mul_node(ctx, a, b, dims)
}

/// Row-major matrix-vector product `y = M x`.
pub fn mat_vec(ctx: &Context, m: &NodeRef, rows: usize, cols: usize, x: &NodeRef) -> NodeRef {
    let dims = Dims { m: rows, k: cols, n: 1 }.check(
        "mat_vec",
        m.output().len(),
        x.output().len(),
    );
    mat_mul_node(ctx, m, x, dims)
}

/// Outer product `a bᵗ`, row-major `len(a) × len(b)`.
pub fn outer(ctx: &Context, a: &NodeRef, b: &NodeRef) -> NodeRef {
    let dims = Dims { m: a.output().len(), k: 1, n: b.output().len() };
    mat_mul_node(ctx, a, b, dims)
}

impl Node for MatMul {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let (a, b) = (self.a.output(), self.b.output());
        if !self.a.constant(grad) {
            let mut ga = self.dims.left_adjoint(&self.ctx, upstream, b);
            self.a.propagate_gradient(&mut ga, grad);
        }
        if !self.b.constant(grad) {
            let mut gb = self.dims.right_adjoint(&self.ctx, a, upstream);
            self.b.propagate_gradient(&mut gb, grad);
        }
    }
}

#[derive(Debug)]
struct RMatMul {
    ctx: Context,
    a: RNodeRef,
    b: RNodeRef,
    dims: Dims,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

fn mat_mul_r_node(ctx: &Context, a: &RNodeRef, b: &RNodeRef, dims: Dims) -> RNodeRef {
    Rc::new(RMatMul {
        ctx: ctx.clone(),
        output: dims.product(ctx, a.output(), b.output()),
        r_output: dims.tangent(ctx, a.output(), a.r_output(), b.output(), b.r_output()),
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
        dims,
    })
}

/// R variant of [`mat_mul`]; tangent `Ȧ B + A Ḃ`.
pub fn mat_mul_r(
    ctx: &Context,
    a: &RNodeRef,
    rows: usize,
    inner: usize,
    b: &RNodeRef,
    cols: usize,
) -> RNodeRef {
    let dims = Dims { m: rows, k: inner, n: cols }.check(
        "mat_mul_r",
        a.output().len(),
        b.output().len(),
    );
    mat_mul_r_node(ctx, a, b, dims)
}

/// R variant of [`mat_vec`]; tangent `Ṁ x + M ẋ`.
pub fn mat_vec_r(ctx: &Context, m: &RNodeRef, rows: usize, cols: usize, x: &RNodeRef) -> RNodeRef {
    let dims = Dims { m: rows, k: cols, n: 1 }.check(
        "mat_vec_r",
        m.output().len(),
        x.output().len(),
    );
    mat_mul_r_node(ctx, m, x, dims)
}

/// R variant of [`outer`].
pub fn outer_r(ctx: &Context, a: &RNodeRef, b: &RNodeRef) -> RNodeRef {
    let dims = Dims { m: a.output().len(), k: 1, n: b.output().len() };
    mat_mul_r_node(ctx, a, b, dims)
}

impl RNode for RMatMul {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn r_output(&self) -> &[f64] {
        &self.r_output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_r_gradient(
        &self,
        upstream: &mut [f64],
        upstream_r: &mut [f64],
        rgrad: &mut RGradient,
        mut grad: Option<&mut Gradient>,
    ) {
        let (a, a_r) = (self.a.output(), self.a.r_output());
        let (b, b_r) = (self.b.output(), self.b.r_output());
        let dims = self.dims;
        if !self.a.constant(rgrad, grad.as_deref()) {
            let mut ga = dims.left_adjoint(&self.ctx, upstream, b);
            let mut ga_r = dims.left_adjoint(&self.ctx, upstream_r, b);
            dims.add_left_adjoint(&mut ga_r, upstream, b_r);
            self.a
                .propagate_r_gradient(&mut ga, &mut ga_r, rgrad, grad.as_deref_mut());
        }
        if !self.b.constant(rgrad, grad.as_deref()) {
            let mut gb = dims.right_adjoint(&self.ctx, a, upstream);
            let mut gb_r = dims.right_adjoint(&self.ctx, a, upstream_r);
            dims.add_right_adjoint(&mut gb_r, a_r, upstream);
            self.b
                .propagate_r_gradient(&mut gb, &mut gb_r, rgrad, grad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::{backward, backward_r};
    use crate::gradient::RVector;
    use crate::variable::Variable;

    #[test]
    fn test_mat_vec_linear_transform() {
        let ctx = Context::default();
        let m = Variable::new(vec![
            1.0, 2.0, 3.0, 3.0, //
            4.0, 5.0, -6.0, 1.0, //
            7.0, 8.0, -10.0, 4.0,
        ]);
        let x = Variable::new(vec![4.0, 3.0, 2.0, 1.0]);
        let y = mat_vec(&ctx, &m.node(), 3, 4, &x.node());
        assert_eq!(y.output(), &[19.0, 20.0, 36.0]);

        let mut grad = Gradient::for_vars([&m, &x]);
        backward(y.as_ref(), &[1.0, 0.0, -1.0], &mut grad);
        assert_eq!(
            grad.get(m.id()).unwrap(),
            &[4.0, 3.0, 2.0, 1.0, 0.0, 0.0, 0.0, 0.0, -4.0, -3.0, -2.0, -1.0]
        );
        assert_eq!(grad.get(x.id()).unwrap(), &[-6.0, -6.0, 13.0, -1.0]);
    }

    #[test]
    fn test_mat_mul_gradients() {
        let ctx = Context::default();
        // A: 1 x 2, B: 2 x 3
        let a = Variable::new(vec![1.0, 2.0]);
        let b = Variable::new(vec![1.0, 0.0, -1.0, 2.0, 3.0, 4.0]);
        let c = mat_mul(&ctx, &a.node(), 1, 2, &b.node(), 3);
        assert_eq!(c.output(), &[5.0, 6.0, 7.0]);

        let mut grad = Gradient::for_vars([&a, &b]);
        backward(c.as_ref(), &[1.0, 1.0, 1.0], &mut grad);
        // U Bᵗ = [0, 9]; Aᵗ U = [[1,1,1],[2,2,2]]
        assert_eq!(grad.get(a.id()).unwrap(), &[0.0, 9.0]);
        assert_eq!(grad.get(b.id()).unwrap(), &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_outer() {
        let ctx = Context::default();
        let a = Variable::new(vec![1.0, 2.0]);
        let b = Variable::new(vec![3.0, 4.0, 5.0]);
        let z = outer(&ctx, &a.node(), &b.node());
        assert_eq!(z.output(), &[3.0, 4.0, 5.0, 6.0, 8.0, 10.0]);

        let mut grad = Gradient::for_vars([&a, &b]);
        backward(z.as_ref(), &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0], &mut grad);
        assert_eq!(grad.get(a.id()).unwrap(), &[3.0, 5.0]);
        assert_eq!(grad.get(b.id()).unwrap(), &[1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_mat_vec_r_tangent_and_hessian() {
        let ctx = Context::default();
        let m = Variable::new(vec![1.0, 2.0, 3.0, 4.0]);
        let x = Variable::new(vec![1.0, -1.0]);
        let mut rv = RVector::new();
        rv.insert(m.id(), vec![1.0, 0.0, 0.0, 0.0]);
        rv.insert(x.id(), vec![0.0, 1.0]);

        let y = mat_vec_r(&ctx, &m.r_node(&rv), 2, 2, &x.r_node(&rv));
        assert_eq!(y.output(), &[-1.0, -1.0]);
        // Ṁx + Mẋ = [1, 0] + [2, 4]
        assert_eq!(y.r_output(), &[3.0, 4.0]);

        // f = u·(Mx) with u = [1, 1]: ∂f/∂M = u xᵗ, ∂f/∂x = Mᵗ u.
        // Tangents: d(u xᵗ) = u ẋᵗ; d(Mᵗ u) = Ṁᵗ u.
        let mut rgrad = Gradient::for_vars([&m, &x]);
        let mut grad = Gradient::for_vars([&m, &x]);
        backward_r(y.as_ref(), &[1.0, 1.0], &[0.0, 0.0], &mut rgrad, Some(&mut grad));
        assert_eq!(grad.get(m.id()).unwrap(), &[1.0, -1.0, 1.0, -1.0]);
        assert_eq!(grad.get(x.id()).unwrap(), &[4.0, 6.0]);
        assert_eq!(rgrad.get(m.id()).unwrap(), &[0.0, 1.0, 0.0, 1.0]);
        assert_eq!(rgrad.get(x.id()).unwrap(), &[1.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "mat_vec: right operand has length 3, expected 2 x 1")]
    fn test_mat_vec_shape_mismatch() {
        let ctx = Context::default();
        mat_vec(&ctx, &Variable::zeros(4).node(), 2, 2, &Variable::zeros(3).node());
    }
}

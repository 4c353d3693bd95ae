//! Matrix transpose.

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::storage::{Buffer, Context};
use std::rc::Rc;

fn check(op: &str, len: usize, rows: usize, cols: usize) {
    assert_eq!(
        len,
        rows * cols,
        "{op}: input has length {len}, expected {rows} x {cols}"
    );
}

/// Transpose of a row-major `rows × cols` matrix into `dst` (`cols × rows`).
fn transpose_into(dst: &mut [f64], src: &[f64], rows: usize, cols: usize) {
    for i in 0..rows {
        for j in 0..cols {
            dst[j * rows + i] = src[i * cols + j];
        }
    }
}

fn transposed(ctx: &Context, src: &[f64], rows: usize, cols: usize) -> Buffer {
    let mut out = ctx.alloc(src.len());
    transpose_into(&mut out, src, rows, cols);
    out
}

#[derive(Debug)]
struct Transpose {
    ctx: Context,
    input: NodeRef,
    rows: usize,
    cols: usize,
    output: Buffer,
}

/// Transpose a row-major `rows × cols` matrix; the output is `cols × rows`.
///
/// # Panics
///
/// Panics if the input length is not `rows * cols`.
pub fn transpose(ctx: &Context, m: &NodeRef, rows: usize, cols: usize) -> NodeRef {
    check("transpose", m.output().len(), rows, cols);
    Rc::new(Transpose {
        ctx: ctx.clone(),
        output: transposed(ctx, m.output(), rows, cols),
        input: Rc::clone(m),
        rows,
        cols,
    })
}

impl Node for Transpose {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let mut g = transposed(&self.ctx, upstream, self.cols, self.rows);
        self.input.propagate_gradient(&mut g, grad);
    }
}

#[derive(Debug)]
struct RTranspose {
    ctx: Context,
    input: RNodeRef,
    rows: usize,
    cols: usize,
    output: Buffer,
    r_output: Buffer,
}

/// R variant of [`transpose`].
pub fn transpose_r(ctx: &Context, m: &RNodeRef, rows: usize, cols: usize) -> RNodeRef {
    check("transpose_r", m.output().len(), rows, cols);
    Rc::new(RTranspose {
        ctx: ctx.clone(),
        output: transposed(ctx, m.output(), rows, cols),
        r_output: transposed(ctx, m.r_output(), rows, cols),
        input: Rc::clone(m),
        rows,
        cols,
    })
}

impl RNode for RTranspose {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn r_output(&self) -> &[f64] {
        &self.r_output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_r_gradient(
        &self,
        upstream: &mut [f64],
        upstream_r: &mut [f64],
        rgrad: &mut RGradient,
        grad: Option<&mut Gradient>,
    ) {
        let mut g = transposed(&self.ctx, upstream, self.cols, self.rows);
        let mut g_r = transposed(&self.ctx, upstream_r, self.cols, self.rows);
        self.input
            .propagate_r_gradient(&mut g, &mut g_r, rgrad, grad);
    }
}

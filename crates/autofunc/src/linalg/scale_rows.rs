//! Row scaling: `yᵢⱼ = Mᵢⱼ sᵢ`.

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::ops::dot;
use crate::storage::{Buffer, Context};
use std::rc::Rc;

fn check(op: &str, m_len: usize, s_len: usize, rows: usize, cols: usize) {
    assert_eq!(
        m_len,
        rows * cols,
        "{op}: matrix has length {m_len}, expected {rows} x {cols}"
    );
    assert_eq!(
        s_len, rows,
        "{op}: scaler has length {s_len}, expected {rows}"
    );
}

fn scaled(ctx: &Context, m: &[f64], s: &[f64], cols: usize) -> Buffer {
    let mut out = ctx.copy_of(m);
    if cols > 0 {
        for (row, &si) in out.chunks_exact_mut(cols).zip(s) {
            for x in row {
                *x *= si;
            }
        }
    }
    out
}

/// `out[i] = Σⱼ u[i][j] m[i][j]`
fn row_dots(ctx: &Context, u: &[f64], m: &[f64], rows: usize, cols: usize) -> Buffer {
    let mut out = ctx.alloc(rows);
    for (i, o) in out.iter_mut().enumerate() {
        let range = i * cols..(i + 1) * cols;
        *o = dot(&u[range.clone()], &m[range]);
    }
    out
}

#[derive(Debug)]
struct ScaleRows {
    ctx: Context,
    matrix: NodeRef,
    scaler: NodeRef,
    rows: usize,
    cols: usize,
    output: Buffer,
    leaves: LeafSet,
}

/// Scale row `i` of the row-major `rows × cols` matrix `m` by `s[i]`.
///
/// # Panics
///
/// Panics if `m` is not `rows * cols` long or `s` is not `rows` long.
pub fn scale_rows(ctx: &Context, m: &NodeRef, rows: usize, cols: usize, s: &NodeRef) -> NodeRef {
    check("scale_rows", m.output().len(), s.output().len(), rows, cols);
    Rc::new(ScaleRows {
        ctx: ctx.clone(),
        output: scaled(ctx, m.output(), s.output(), cols),
        leaves: m.leaves().union(s.leaves()),
        matrix: Rc::clone(m),
        scaler: Rc::clone(s),
        rows,
        cols,
    })
}

impl Node for ScaleRows {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let (m, s) = (self.matrix.output(), self.scaler.output());
        if !self.scaler.constant(grad) {
            let mut gs = row_dots(&self.ctx, upstream, m, self.rows, self.cols);
            self.scaler.propagate_gradient(&mut gs, grad);
        }
        if !self.matrix.constant(grad) {
            let mut gm = scaled(&self.ctx, upstream, s, self.cols);
            self.matrix.propagate_gradient(&mut gm, grad);
        }
    }
}

#[derive(Debug)]
struct RScaleRows {
    ctx: Context,
    matrix: RNodeRef,
    scaler: RNodeRef,
    rows: usize,
    cols: usize,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

/// R variant of [`scale_rows`]; tangent `Ṁᵢⱼ sᵢ + Mᵢⱼ ṡᵢ`.
pub fn scale_rows_r(
    ctx: &Context,
    m: &RNodeRef,
    rows: usize,
    cols: usize,
    s: &RNodeRef,
) -> RNodeRef {
    check("scale_rows_r", m.output().len(), s.output().len(), rows, cols);
    let mut r_output = scaled(ctx, m.r_output(), s.output(), cols);
    let extra = scaled(ctx, m.output(), s.r_output(), cols);
    for (r, e) in r_output.iter_mut().zip(extra.iter()) {
        *r += e;
    }
    Rc::new(RScaleRows {
        ctx: ctx.clone(),
        output: scaled(ctx, m.output(), s.output(), cols),
        r_output,
        leaves: m.leaves().union(s.leaves()),
        matrix: Rc::clone(m),
        scaler: Rc::clone(s),
        rows,
        cols,
    })
}

impl RNode for RScaleRows {
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
        let (m, m_r) = (self.matrix.output(), self.matrix.r_output());
        let (s, s_r) = (self.scaler.output(), self.scaler.r_output());
        let (rows, cols) = (self.rows, self.cols);
        if !self.scaler.constant(rgrad, grad.as_deref()) {
            let mut gs = row_dots(&self.ctx, upstream, m, rows, cols);
            let mut gs_r = row_dots(&self.ctx, upstream_r, m, rows, cols);
            let extra = row_dots(&self.ctx, upstream, m_r, rows, cols);
            for (g, e) in gs_r.iter_mut().zip(extra.iter()) {
                *g += e;
            }
            self.scaler
                .propagate_r_gradient(&mut gs, &mut gs_r, rgrad, grad.as_deref_mut());
        }
        if !self.matrix.constant(rgrad, grad.as_deref()) {
            let mut gm = scaled(&self.ctx, upstream, s, cols);
            let mut gm_r = scaled(&self.ctx, upstream_r, s, cols);
            let extra = scaled(&self.ctx, upstream, s_r, cols);
            for (g, e) in gm_r.iter_mut().zip(extra.iter()) {
                *g += e;
            }
            self.matrix
                .propagate_r_gradient(&mut gm, &mut gm_r, rgrad, grad);
        }
    }
}

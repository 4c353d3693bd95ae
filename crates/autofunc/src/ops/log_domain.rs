//! Numerically stable sums of values stored as logarithms.
//!
//! Both functions shift by a maximum before exponentiating and add it back
//! afterwards. The shift is a constant node, so it carries no gradient; the
//! result is still exact because `log Σ e^(aᵢ - m) + m` does not depend on `m`.

use super::{add, add_scaler, add_scaler_r, add_r, exp, exp_r, log, log_r, sub, sub_r, sum_all, sum_all_r};
use crate::leaf::{constant, constant_r};
use crate::node::{NodeRef, RNodeRef};
use crate::storage::Context;

fn finite_or_zero(m: f64) -> f64 {
    if m.is_finite() { m } else { 0.0 }
}

fn pairwise_shift(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| finite_or_zero(x.max(y)))
        .collect()
}

fn global_shift(a: &[f64]) -> f64 {
    finite_or_zero(a.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Elementwise `log(eᵃ + eᵇ)`.
///
/// # Example
///
/// ```
/// use autofunc::{Context, constant, ops};
///
/// let ctx = Context::default();
/// let big = 1e300f64.ln();
/// let y = ops::add_log_domain(&ctx, &constant(vec![big]), &constant(vec![big]));
/// assert!((y.output()[0] - (2f64.ln() + 300.0 * 10f64.ln())).abs() < 1e-9);
/// ```
pub fn add_log_domain(ctx: &Context, a: &NodeRef, b: &NodeRef) -> NodeRef {
    let shift = constant(pairwise_shift(a.output(), b.output()));
    let ea = exp(ctx, &sub(ctx, a, &shift));
    let eb = exp(ctx, &sub(ctx, b, &shift));
    add(ctx, &log(ctx, &add(ctx, &ea, &eb)), &shift)
}

/// R variant of [`add_log_domain`].
pub fn add_log_domain_r(ctx: &Context, a: &RNodeRef, b: &RNodeRef) -> RNodeRef {
    let shift = constant_r(pairwise_shift(a.output(), b.output()));
    let ea = exp_r(ctx, &sub_r(ctx, a, &shift));
    let eb = exp_r(ctx, &sub_r(ctx, b, &shift));
    add_r(ctx, &log_r(ctx, &add_r(ctx, &ea, &eb)), &shift)
}

/// `[log Σ e^aᵢ]`, a length-1 output.
pub fn sum_all_log_domain(ctx: &Context, a: &NodeRef) -> NodeRef {
    let m = global_shift(a.output());
    let shift = constant(vec![m; a.output().len()]);
    let total = sum_all(ctx, &exp(ctx, &sub(ctx, a, &shift)));
    add_scaler(ctx, &log(ctx, &total), m)
}

/// R variant of [`sum_all_log_domain`].
pub fn sum_all_log_domain_r(ctx: &Context, a: &RNodeRef) -> RNodeRef {
    let m = global_shift(a.output());
    let shift = constant_r(vec![m; a.output().len()]);
    let total = sum_all_r(ctx, &exp_r(ctx, &sub_r(ctx, a, &shift)));
    add_scaler_r(ctx, &log_r(ctx, &total), m)
}

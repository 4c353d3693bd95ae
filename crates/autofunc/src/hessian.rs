//! Hessian-vector products via the R-operator.
//!
//! HVP: H v where H = ∇²f
//!
//! Method (forward-on-reverse):
//!   1. build f on leaves whose tangents are v (forward tangent pass)
//!   2. run the R backward pass from f with adjoint 1, tangent 0
//!   3. the tangent of the gradient is H v
//!
//! No second derivatives are formed symbolically.

use crate::backward::backward_r;
use crate::gradient::{Gradient, RGradient, RVector};
use crate::node::RNodeRef;
use crate::storage::Context;
use crate::variable::Variable;
use log::debug;

/// Compute `∇f` and `H v` for a scalar-valued `f` at the current values of
/// `vars`, with `v` given by `direction`.
///
/// `f` receives the context and one R leaf per variable, in order. Variables
/// missing from `direction` have zero tangent.
///
/// # Panics
///
/// Panics if `f` does not produce a length-1 output.
///
/// # Example
///
/// ```
/// use autofunc::{Context, RVector, Variable, hessian_vector_product, ops};
///
/// let ctx = Context::default();
/// let x = Variable::new(vec![3.0]);
/// let mut v = RVector::new();
/// v.insert(x.id(), vec![1.0]);
///
/// // f(x) = x³, f' = 3x² = 27, f'' v = 6x = 18
/// let (grad, hv) = hessian_vector_product(&ctx, &[&x], &v, |ctx, leaves| {
///     ops::pow_r(ctx, &leaves[0], 3.0)
/// });
/// assert!((grad.get(x.id()).unwrap()[0] - 27.0).abs() < 1e-10);
/// assert!((hv.get(x.id()).unwrap()[0] - 18.0).abs() < 1e-10);
/// ```
pub fn hessian_vector_product(
    ctx: &Context,
    vars: &[&Variable],
    direction: &RVector,
    f: impl FnOnce(&Context, &[RNodeRef]) -> RNodeRef,
) -> (Gradient, RGradient) {
    let leaves: Vec<RNodeRef> = vars.iter().map(|v| v.r_node(direction)).collect();
    let out = f(ctx, &leaves);
    assert_eq!(
        out.output().len(),
        1,
        "hessian_vector_product: function output has length {}, expected 1",
        out.output().len()
    );
    debug!(
        "hessian_vector_product: {} variables, f = {}",
        vars.len(),
        out.output()[0]
    );

    let mut grad = Gradient::for_vars(vars.iter().copied());
    let mut rgrad = Gradient::for_vars(vars.iter().copied());
    backward_r(out.as_ref(), &[1.0], &[0.0], &mut rgrad, Some(&mut grad));
    (grad, rgrad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use approx::assert_relative_eq;

    #[test]
    fn test_hvp_quadratic_form() {
        // f(x, y) = x² y + y³; H = [[2y, 2x], [2x, 6y]]
        let ctx = Context::default();
        let x = Variable::new(vec![1.0]);
        let y = Variable::new(vec![2.0]);
        let mut v = RVector::new();
        v.insert(x.id(), vec![1.0]);
        v.insert(y.id(), vec![-1.0]);

        let (grad, hv) = hessian_vector_product(&ctx, &[&x, &y], &v, |ctx, p| {
            let x2y = ops::mul_r(ctx, &ops::square_r(ctx, &p[0]), &p[1]);
            ops::add_r(ctx, &x2y, &ops::pow_r(ctx, &p[1], 3.0))
        });

        assert_relative_eq!(grad.get(x.id()).unwrap()[0], 4.0);
        assert_relative_eq!(grad.get(y.id()).unwrap()[0], 13.0);
        // H v = [4 - 2, 2 - 12]
        assert_relative_eq!(hv.get(x.id()).unwrap()[0], 2.0);
        assert_relative_eq!(hv.get(y.id()).unwrap()[0], -10.0);
    }

    #[test]
    fn test_hvp_zero_direction() {
        let ctx = Context::default();
        let x = Variable::new(vec![1.0, 2.0]);
        let (grad, hv) = hessian_vector_product(&ctx, &[&x], &RVector::new(), |ctx, p| {
            ops::sum_all_r(ctx, &ops::exp_r(ctx, &p[0]))
        });
        assert_relative_eq!(grad.get(x.id()).unwrap()[1], 2f64.exp());
        assert_eq!(hv.get(x.id()).unwrap(), &[0.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "expected 1")]
    fn test_hvp_requires_scalar() {
        let ctx = Context::default();
        let x = Variable::new(vec![1.0, 2.0]);
        hessian_vector_product(&ctx, &[&x], &RVector::new(), |_, p| p[0].clone());
    }
}

//! Finite-difference checkers shared by the integration tests.

#![allow(dead_code)]

use approx::assert_relative_eq;
use autofunc::{
    Context, Gradient, NodeRef, RNodeRef, RVector, Variable, backward, backward_r,
};

pub const EPS: f64 = 1e-5;

/// Install a test logger once per binary.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic, non-uniform upstream vector.
pub fn upstream(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| if i % 2 == 0 { 1.0 + 0.25 * i as f64 } else { -0.5 - 0.1 * i as f64 })
        .collect()
}

/// Deterministic direction for R checks.
pub fn direction(len: usize, salt: usize) -> Vec<f64> {
    (0..len)
        .map(|i| ((i + salt) as f64 * 0.7).sin() + 0.3)
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn vars_at(values: &[Vec<f64>]) -> Vec<Variable> {
    values.iter().map(|v| Variable::new(v.clone())).collect()
}

/// Compute numerical gradient of `upstream · f(x)` using central difference.
///
/// grad_i ≈ (f(x + eps*e_i) - f(x - eps*e_i)) / (2*eps)
fn numerical_gradient<F>(f: &F, values: &[Vec<f64>], up: &[f64]) -> Vec<Vec<f64>>
where
    F: Fn(&[Vec<f64>]) -> Vec<f64>,
{
    let mut point = values.to_vec();
    values
        .iter()
        .enumerate()
        .map(|(k, v)| {
            (0..v.len())
                .map(|j| {
                    point[k][j] = v[j] + EPS;
                    let plus = dot(up, &f(&point));
                    point[k][j] = v[j] - EPS;
                    let minus = dot(up, &f(&point));
                    point[k][j] = v[j];
                    (plus - minus) / (2.0 * EPS)
                })
                .collect()
        })
        .collect()
}

/// Assert that backward through `f` matches finite differences at `values`.
pub fn check_gradient<F>(values: &[Vec<f64>], f: F, tol: f64)
where
    F: Fn(&Context, &[NodeRef]) -> NodeRef,
{
    let ctx = Context::default();
    let eval = |point: &[Vec<f64>]| {
        let vars = vars_at(point);
        let nodes: Vec<NodeRef> = vars.iter().map(Variable::node).collect();
        f(&ctx, &nodes).output().to_vec()
    };

    let vars = vars_at(values);
    let nodes: Vec<NodeRef> = vars.iter().map(Variable::node).collect();
    let out = f(&ctx, &nodes);
    let up = upstream(out.output().len());
    let mut grad = Gradient::for_vars(vars.iter());
    backward(out.as_ref(), &up, &mut grad);

    let numeric = numerical_gradient(&eval, values, &up);
    for (var, expected) in vars.iter().zip(&numeric) {
        let actual = grad.get(var.id()).unwrap();
        for (&a, &e) in actual.iter().zip(expected) {
            assert_relative_eq!(a, e, epsilon = tol, max_relative = tol);
        }
    }
}

/// Assert the R form of `f` against finite differences:
///
/// - `r_output` matches the directional derivative of the output,
/// - the gradient from `backward_r` matches the numeric gradient,
/// - the R gradient, seeded with a nonzero upstream tangent, matches the
///   directional derivative of the gradient plus the gradient of the
///   tangent seed.
pub fn check_r_operator<F>(values: &[Vec<f64>], f: F, tol: f64)
where
    F: Fn(&Context, &[RNodeRef]) -> RNodeRef,
{
    let ctx = Context::default();
    let dirs: Vec<Vec<f64>> = values
        .iter()
        .enumerate()
        .map(|(k, v)| direction(v.len(), 3 * k))
        .collect();
    let shifted = |sign: f64| -> Vec<Vec<f64>> {
        values
            .iter()
            .zip(&dirs)
            .map(|(v, d)| v.iter().zip(d).map(|(x, dx)| x + sign * EPS * dx).collect())
            .collect()
    };
    let eval = |point: &[Vec<f64>]| {
        let vars = vars_at(point);
        let nodes: Vec<RNodeRef> = vars.iter().map(|v| v.r_node(&RVector::new())).collect();
        f(&ctx, &nodes).output().to_vec()
    };
    // Gradient of `up · f` at `point`, one vector per variable.
    let gradient_at = |point: &[Vec<f64>], up: &[f64]| -> Vec<Vec<f64>> {
        let vars = vars_at(point);
        let nodes: Vec<RNodeRef> = vars.iter().map(|v| v.r_node(&RVector::new())).collect();
        let out = f(&ctx, &nodes);
        let mut rgrad = Gradient::new();
        let mut grad = Gradient::for_vars(vars.iter());
        backward_r(out.as_ref(), up, &vec![0.0; up.len()], &mut rgrad, Some(&mut grad));
        vars.iter().map(|v| grad.get(v.id()).unwrap().to_vec()).collect()
    };

    let vars = vars_at(values);
    let mut rv = RVector::new();
    for (var, d) in vars.iter().zip(&dirs) {
        rv.insert(var.id(), d.clone());
    }
    let nodes: Vec<RNodeRef> = vars.iter().map(|v| v.r_node(&rv)).collect();
    let out = f(&ctx, &nodes);

    let plus = eval(&shifted(1.0));
    let minus = eval(&shifted(-1.0));
    for (i, &r) in out.r_output().iter().enumerate() {
        let expected = (plus[i] - minus[i]) / (2.0 * EPS);
        assert_relative_eq!(r, expected, epsilon = tol, max_relative = tol);
    }

    let up = upstream(out.output().len());
    let up_r = direction(up.len(), 7);
    let mut rgrad = Gradient::for_vars(vars.iter());
    let mut grad = Gradient::for_vars(vars.iter());
    backward_r(out.as_ref(), &up, &up_r, &mut rgrad, Some(&mut grad));

    // With upstream tangent w the R gradient is Jᵀw + d/dε Jᵀ(x + εd) up.
    let numeric = numerical_gradient(&eval, values, &up);
    let numeric_r = numerical_gradient(&eval, values, &up_r);
    let g_plus = gradient_at(&shifted(1.0), &up);
    let g_minus = gradient_at(&shifted(-1.0), &up);
    for (k, var) in vars.iter().enumerate() {
        for (&a, &e) in grad.get(var.id()).unwrap().iter().zip(&numeric[k]) {
            assert_relative_eq!(a, e, epsilon = tol, max_relative = tol);
        }
        for (j, &r) in rgrad.get(var.id()).unwrap().iter().enumerate() {
            let expected = (g_plus[k][j] - g_minus[k][j]) / (2.0 * EPS) + numeric_r[k][j];
            assert_relative_eq!(r, expected, epsilon = tol, max_relative = tol);
        }
    }
}

//! Numerical gradient check: finite difference vs autograd for verification.

use crate::tensor::Tensor;

/// Epsilon for central difference: (f(x+eps) - f(x-eps)) / (2*eps).
pub const DEFAULT_EPS: f32 = 1e-4;

/// Compute numerical gradient of a scalar loss w.r.t. `param` via central
/// difference, perturbing one element at a time and calling `loss_fn` fresh
/// for each perturbation. Restores `param`'s original data before returning.
pub fn numerical_grad<F>(param: &Tensor, mut loss_fn: F, eps: f32) -> Vec<f32>
where
    F: FnMut() -> Tensor,
{
    let n = param.numel();
    let original = param.to_vec();
    let mut grad = vec![0.0f32; n];
    for i in 0..n {
        let mut plus = original.clone();
        plus[i] += eps;
        param.load_data(&plus).unwrap();
        let loss_plus = loss_fn().item().unwrap();

        let mut minus = original.clone();
        minus[i] -= eps;
        param.load_data(&minus).unwrap();
        let loss_minus = loss_fn().item().unwrap();

        grad[i] = (loss_plus - loss_minus) / (2.0 * eps);
    }
    param.load_data(&original).unwrap();
    grad
}

/// Compare autograd's gradient at `param` against the numerical gradient of
/// the same loss. `loss_fn` must build a fresh expression graph each call
/// (it is invoked once for the autograd pass and 2*numel times for the
/// numerical pass).
pub fn check_gradients<F>(param: &Tensor, loss_fn: F, eps: f32, rtol: f32, atol: f32) -> Result<(), String>
where
    F: Fn() -> Tensor,
{
    param.zero_grad();
    let loss = loss_fn();
    loss.backward().map_err(|e| e.to_string())?;
    let analytic = param.grad().ok_or("missing grad after backward")?.to_vec();

    let numeric = numerical_grad(param, &loss_fn, eps);

    if analytic.len() != numeric.len() {
        return Err(format!("grad len mismatch: {} vs {}", analytic.len(), numeric.len()));
    }
    for (j, (&a, &n)) in analytic.iter().zip(numeric.iter()).enumerate() {
        let diff = (a - n).abs();
        if diff > atol && diff > rtol * n.abs().max(1e-8) {
            return Err(format!("elem {j}: autograd {a} vs numerical {n}"));
        }
    }
    Ok(())
}

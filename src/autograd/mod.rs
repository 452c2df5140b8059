//! Autograd support code: numerical gradient checking against the analytic
//! backward pass implemented on [crate::expr]/[crate::tensor::Tensor].

pub mod check;

pub use check::{check_gradients, numerical_grad, DEFAULT_EPS};

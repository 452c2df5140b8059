//! Activation layers: ReLU, Sigmoid (no parameters).

use super::module::Module;
use super::Layer;
use crate::expr;
use crate::parameter::Parameter;
use crate::tensor::Tensor;

/// ReLU: max(0, x). No parameters.
#[derive(Default)]
pub struct ReLU;

impl ReLU {
    pub fn new() -> Self {
        ReLU
    }
}

impl Module for ReLU {
    fn parameters(&self) -> Vec<&Parameter> {
        vec![]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![]
    }

    fn forward(&self, x: &Tensor) -> crate::tensor::TensorResult<Tensor> {
        Ok(Tensor::from_expr(expr::relu(x)))
    }
}

impl Layer for ReLU {}

/// Sigmoid: 1/(1+exp(-x)). No parameters.
#[derive(Default)]
pub struct Sigmoid;

impl Sigmoid {
    pub fn new() -> Self {
        Sigmoid
    }
}

impl Module for Sigmoid {
    fn parameters(&self) -> Vec<&Parameter> {
        vec![]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![]
    }

    fn forward(&self, x: &Tensor) -> crate::tensor::TensorResult<Tensor> {
        Ok(Tensor::from_expr(expr::sigmoid(x)))
    }
}

impl Layer for Sigmoid {}

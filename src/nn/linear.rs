//! Linear: y = x @ W + b. One Parameter for weight, one for bias.

use super::module::Module;
use super::Layer;
use crate::expr;
use crate::init;
use crate::parameter::Parameter;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorResult};

/// Linear layer: output = input @ weight + bias. Bias is kept as a
/// `[1, out_features]` tensor so it broadcasts against a `[batch,
/// out_features]` output under the engine's equal-rank broadcasting rule.
pub struct Linear {
    pub weight: Parameter,
    pub bias: Parameter,
}

impl Linear {
    /// Weights and bias are zero-initialized; call [Self::init_xavier] or
    /// [Self::init_he] to set a real starting point.
    pub fn new(in_features: usize, out_features: usize) -> Self {
        let weight = Tensor::zeros(Shape::new(vec![in_features, out_features]), true);
        let bias = Tensor::zeros(Shape::new(vec![1, out_features]), true);
        Linear { weight: Parameter::new(weight), bias: Parameter::new(bias) }
    }

    pub fn named(name: impl AsRef<str>, in_features: usize, out_features: usize) -> Self {
        let prefix = name.as_ref();
        let mut linear = Self::new(in_features, out_features);
        linear.weight.set_name(Some(format!("{prefix}.weight")));
        linear.bias.set_name(Some(format!("{prefix}.bias")));
        linear
    }

    /// Reinitialize the weight with Xavier uniform, leaving the bias at zero.
    pub fn init_xavier(&mut self) {
        let shape = self.weight.data().shape();
        self.weight = Parameter::new(init::xavier_uniform(&shape));
    }

    /// Reinitialize the weight with He uniform (for ReLU-activated layers).
    pub fn init_he(&mut self) {
        let shape = self.weight.data().shape();
        self.weight = Parameter::new(init::he_uniform(&shape));
    }
}

impl Module for Linear {
    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight, &mut self.bias]
    }

    fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        let mm = Tensor::from_expr(expr::matmul(x, self.weight.data())?);
        Ok(Tensor::from_expr(expr::add(&mm, self.bias.data())?))
    }
}

impl Layer for Linear {}

/// Linear followed by ReLU, fused into a single layer for convenience.
pub struct LinearWithReLU {
    pub linear: Linear,
}

impl LinearWithReLU {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        LinearWithReLU { linear: Linear::new(in_features, out_features) }
    }

    pub fn init_he(&mut self) {
        self.linear.init_he();
    }
}

impl Module for LinearWithReLU {
    fn parameters(&self) -> Vec<&Parameter> {
        self.linear.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.linear.parameters_mut()
    }

    fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        let h = self.linear.forward(x)?;
        Ok(Tensor::from_expr(expr::relu(&h)))
    }
}

impl Layer for LinearWithReLU {}

//! 2D convolution (as img2col + matmul) and max pooling layers.

use super::module::Module;
use super::Layer;
use crate::expr::{self, Img2ColParams};
use crate::parameter::Parameter;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorResult};

/// Conv2d: `weight` is `[out_channels, in_channels * kh * kw]`, `bias` is
/// `[1, out_channels]`. Forward lowers to `img2col` followed by a matmul
/// against the flattened filter bank, exactly the layout `img2col`'s output
/// rows are laid out for.
pub struct Conv2d {
    pub weight: Parameter,
    pub bias: Parameter,
    params: Img2ColParams,
    in_channels: usize,
    out_channels: usize,
}

impl Conv2d {
    pub fn new(in_channels: usize, out_channels: usize, params: Img2ColParams) -> Self {
        let (kh, kw) = params.kernel;
        let weight = Tensor::zeros(Shape::new(vec![out_channels, in_channels * kh * kw]), true);
        let bias = Tensor::zeros(Shape::new(vec![1, out_channels]), true);
        Conv2d { weight: Parameter::new(weight), bias: Parameter::new(bias), params, in_channels, out_channels }
    }

    pub fn init_he(&mut self) {
        let fan_in = self.in_channels * self.params.kernel.0 * self.params.kernel.1;
        let shape = self.weight.data().shape();
        self.weight = Parameter::new(crate::init::he_uniform(&Shape::new(vec![fan_in, shape.size(0)])));
    }
}

impl Module for Conv2d {
    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight, &mut self.bias]
    }

    fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        let batch = x.size(0);
        let h = x.size(2);
        let w = x.size(3);
        let out_h = expr::out_size(h, self.params.kernel.0, self.params.stride.0, self.params.padding.0)?;
        let out_w = expr::out_size(w, self.params.kernel.1, self.params.stride.1, self.params.padding.1)?;

        let col = Tensor::from_expr(expr::img2col(x, self.params)?);
        let weight_t = self.weight.data().transpose(0, 1)?;
        let mm = Tensor::from_expr(expr::matmul(&col, &weight_t)?);
        let biased = Tensor::from_expr(expr::add(&mm, self.bias.data())?);

        let reshaped = biased.view(Shape::new(vec![out_h, out_w, batch, self.out_channels]))?;
        reshaped.permute(&[2, 3, 0, 1])
    }
}

impl Layer for Conv2d {}

/// Conv2d followed by ReLU.
pub struct Conv2dWithReLU {
    pub conv: Conv2d,
}

impl Conv2dWithReLU {
    pub fn new(in_channels: usize, out_channels: usize, params: Img2ColParams) -> Self {
        Conv2dWithReLU { conv: Conv2d::new(in_channels, out_channels, params) }
    }

    pub fn init_he(&mut self) {
        self.conv.init_he();
    }
}

impl Module for Conv2dWithReLU {
    fn parameters(&self) -> Vec<&Parameter> {
        self.conv.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.conv.parameters_mut()
    }

    fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        let h = self.conv.forward(x)?;
        Ok(Tensor::from_expr(expr::relu(&h)))
    }
}

impl Layer for Conv2dWithReLU {}

/// MaxPool2d module: no parameters, wraps the max_pool2d expression.
pub struct MaxPool2d {
    params: Img2ColParams,
}

impl MaxPool2d {
    pub fn new(params: Img2ColParams) -> Self {
        MaxPool2d { params }
    }
}

impl Module for MaxPool2d {
    fn parameters(&self) -> Vec<&Parameter> {
        vec![]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![]
    }

    fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        Ok(Tensor::from_expr(expr::max_pool2d(x, self.params)?))
    }
}

impl Layer for MaxPool2d {}

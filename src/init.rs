//! Weight initialization: uniform, normal, Xavier, He. Deterministic for a fixed seed
//! via [crate::runtime::with_rng].

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::runtime::with_rng;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Uniform(low, high), elementwise.
pub fn uniform(shape: &Shape, low: f32, high: f32) -> Tensor {
    let n = shape.numel();
    let data: Vec<f32> = with_rng(|rng| (0..n).map(|_| rng.gen_range(low..=high)).collect());
    Tensor::from_vec(data, shape.clone(), true).expect("vec length matches shape by construction")
}

/// Normal(mean, std), elementwise.
pub fn normal(shape: &Shape, mean: f32, std: f32) -> Tensor {
    let n = shape.numel();
    let dist = Normal::new(mean, std).expect("std must be positive");
    let data: Vec<f32> = with_rng(|rng| (0..n).map(|_| dist.sample(rng)).collect());
    Tensor::from_vec(data, shape.clone(), true).expect("vec length matches shape by construction")
}

/// Xavier (Glorot) uniform: scale = sqrt(6 / (fan_in + fan_out)).
/// For a 2D weight `[fan_in, fan_out]`, fills with Uniform(-scale, scale).
pub fn xavier_uniform(shape: &Shape) -> Tensor {
    let dims = shape.dims();
    if dims.len() < 2 {
        return Tensor::zeros(shape.clone(), true);
    }
    let fan_in = dims[0];
    let fan_out = dims[1];
    let scale = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
    uniform(shape, -scale, scale)
}

/// He (Kaiming) uniform: scale = sqrt(6 / fan_in). For ReLU-activated layers.
pub fn he_uniform(shape: &Shape) -> Tensor {
    let dims = shape.dims();
    if dims.is_empty() {
        return Tensor::zeros(shape.clone(), true);
    }
    let fan_in = dims[0];
    let scale = (6.0f32 / fan_in as f32).sqrt();
    uniform(shape, -scale, scale)
}

//! Parameter: long-lived, updatable, serializable. Distinct from intermediate tensors.

use serde::{Deserialize, Serialize};

use crate::shape::Shape;
use crate::tensor::{Tensor, TensorError};

/// Parameter: wraps a Tensor as a trainable parameter. Can be frozen, named, and serialized.
/// Grad and zero_grad delegate to the underlying tensor's own grad bookkeeping
/// (the optimizer reads `data().grad()` rather than a copy held here).
#[derive(Clone)]
pub struct Parameter {
    data: Tensor,
    name: Option<String>,
    frozen: bool,
}

impl Parameter {
    pub fn new(data: Tensor) -> Self {
        Parameter { data, name: None, frozen: false }
    }

    pub fn named(name: impl Into<String>, data: Tensor) -> Self {
        Parameter { data, name: Some(name.into()), frozen: false }
    }

    pub fn data(&self) -> &Tensor {
        &self.data
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn grad(&self) -> Option<Tensor> {
        self.data.grad()
    }

    pub fn zero_grad(&self) {
        self.data.zero_grad();
    }

    pub fn to_state(&self) -> ParameterState {
        ParameterState { name: self.name.clone(), shape: self.data.shape().dims().to_vec(), data: self.data.to_vec() }
    }

    pub fn from_state(state: ParameterState) -> Result<Self, TensorError> {
        let shape = Shape::new(state.shape);
        let data = Tensor::from_vec(state.data, shape, true)?;
        Ok(Parameter { data, name: state.name, frozen: false })
    }
}

/// Serializable parameter state (data only, for save/load).
#[derive(Serialize, Deserialize)]
pub struct ParameterState {
    pub name: Option<String>,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

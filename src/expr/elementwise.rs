//! Elementwise unary nonlinearities.

use std::rc::Rc;

use super::{AutogradError, ElemMul, ExprNode, LeafOperand};
use crate::tensor::Tensor;

macro_rules! unary_node {
    ($name:ident) => {
        pub struct $name {
            inner: Rc<dyn ExprNode>,
        }
    };
}
unary_node!(Exp);
unary_node!(Ln);
unary_node!(Sigmoid);
unary_node!(Relu);

impl ExprNode for Exp {
    fn eval(&self, index: &[usize]) -> f32 {
        self.inner.eval(index).exp()
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        // d(exp(x))/dx = exp(x); reuse self as the multiplier since eval is pure.
        self.inner.backward(&ElemMul { a: grad, b: self })
    }
    fn ndim(&self) -> usize {
        self.inner.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.inner.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.inner.requires_grad()
    }
}

pub fn exp(x: &Tensor) -> Rc<Exp> {
    Rc::new(Exp { inner: LeafOperand::capture(x, true) })
}

pub(crate) fn exp_nodes(inner: Rc<dyn ExprNode>) -> Rc<Exp> {
    Rc::new(Exp { inner })
}

struct RecipGrad<'a> {
    x: &'a dyn ExprNode,
}
impl ExprNode for RecipGrad<'_> {
    fn ndim(&self) -> usize {
        self.x.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.x.size(dim)
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        1.0 / self.x.eval(index)
    }
}

impl ExprNode for Ln {
    fn eval(&self, index: &[usize]) -> f32 {
        self.inner.eval(index).ln()
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        self.inner.backward(&ElemMul { a: grad, b: &RecipGrad { x: &*self.inner } })
    }
    fn ndim(&self) -> usize {
        self.inner.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.inner.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.inner.requires_grad()
    }
}

pub fn ln(x: &Tensor) -> Rc<Ln> {
    Rc::new(Ln { inner: LeafOperand::capture(x, true) })
}

struct SigmoidGrad<'a> {
    y: &'a dyn ExprNode,
}
impl ExprNode for SigmoidGrad<'_> {
    fn ndim(&self) -> usize {
        self.y.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.y.size(dim)
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let y = self.y.eval(index);
        y * (1.0 - y)
    }
}

impl ExprNode for Sigmoid {
    fn eval(&self, index: &[usize]) -> f32 {
        1.0 / (1.0 + (-self.inner.eval(index)).exp())
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        self.inner.backward(&ElemMul { a: grad, b: &SigmoidGrad { y: self } })
    }
    fn ndim(&self) -> usize {
        self.inner.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.inner.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.inner.requires_grad()
    }
}

pub fn sigmoid(x: &Tensor) -> Rc<Sigmoid> {
    Rc::new(Sigmoid { inner: LeafOperand::capture(x, true) })
}

struct Gt0Mask<'a> {
    x: &'a dyn ExprNode,
}
impl ExprNode for Gt0Mask<'_> {
    fn ndim(&self) -> usize {
        self.x.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.x.size(dim)
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        if self.x.eval(index) > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}

impl ExprNode for Relu {
    fn eval(&self, index: &[usize]) -> f32 {
        self.inner.eval(index).max(0.0)
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        self.inner.backward(&ElemMul { a: grad, b: &Gt0Mask { x: &*self.inner } })
    }
    fn ndim(&self) -> usize {
        self.inner.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.inner.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.inner.requires_grad()
    }
}

pub fn relu(x: &Tensor) -> Rc<Relu> {
    Rc::new(Relu { inner: LeafOperand::capture(x, true) })
}

pub(crate) fn relu_nodes(inner: Rc<dyn ExprNode>) -> Rc<Relu> {
    Rc::new(Relu { inner })
}

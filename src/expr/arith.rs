//! Elementwise binary arithmetic, with broadcasting on size-1 dims.

use std::rc::Rc;

use super::{broadcast_check, AutogradError, ElemMul, ExprNode, Neg};
use crate::shape::Shape;
use crate::tensor::Tensor;

pub struct Add {
    lhs: Rc<dyn ExprNode>,
    rhs: Rc<dyn ExprNode>,
    shape: Shape,
}

pub fn add(a: &Tensor, b: &Tensor) -> Result<Rc<Add>, AutogradError> {
    add_nodes(super::LeafOperand::capture(a, true), super::LeafOperand::capture(b, true))
}

pub(crate) fn add_nodes(lhs: Rc<dyn ExprNode>, rhs: Rc<dyn ExprNode>) -> Result<Rc<Add>, AutogradError> {
    let shape = broadcast_check(&*lhs, &*rhs)?;
    Ok(Rc::new(Add { lhs, rhs, shape }))
}

impl ExprNode for Add {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.lhs.requires_grad() || self.rhs.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        self.lhs.eval(index) + self.rhs.eval(index)
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        self.lhs.backward(grad)?;
        self.rhs.backward(grad)?;
        Ok(())
    }
}

pub struct Sub {
    lhs: Rc<dyn ExprNode>,
    rhs: Rc<dyn ExprNode>,
    shape: Shape,
}

pub fn sub(a: &Tensor, b: &Tensor) -> Result<Rc<Sub>, AutogradError> {
    let lhs = super::LeafOperand::capture(a, true);
    let rhs = super::LeafOperand::capture(b, true);
    let shape = broadcast_check(&*lhs, &*rhs)?;
    Ok(Rc::new(Sub { lhs, rhs, shape }))
}

impl ExprNode for Sub {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.lhs.requires_grad() || self.rhs.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        self.lhs.eval(index) - self.rhs.eval(index)
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        self.lhs.backward(grad)?;
        self.rhs.backward(&Neg(grad))?;
        Ok(())
    }
}

pub struct Mul {
    lhs: Rc<dyn ExprNode>,
    rhs: Rc<dyn ExprNode>,
    shape: Shape,
}

pub fn mul(a: &Tensor, b: &Tensor) -> Result<Rc<Mul>, AutogradError> {
    let lhs = super::LeafOperand::capture(a, true);
    let rhs = super::LeafOperand::capture(b, true);
    let shape = broadcast_check(&*lhs, &*rhs)?;
    Ok(Rc::new(Mul { lhs, rhs, shape }))
}

impl ExprNode for Mul {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.lhs.requires_grad() || self.rhs.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        self.lhs.eval(index) * self.rhs.eval(index)
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        self.lhs.backward(&ElemMul { a: grad, b: &*self.rhs })?;
        self.rhs.backward(&ElemMul { a: grad, b: &*self.lhs })?;
        Ok(())
    }
}

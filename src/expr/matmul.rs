//! Matrix multiplication, plain 2D and batched 3D.

use std::rc::Rc;

use super::{AutogradError, ExprNode, LeafOperand};
use crate::shape::Shape;
use crate::tensor::Tensor;

fn matmul_eval(a: &dyn ExprNode, b: &dyn ExprNode, i: usize, j: usize, k_dim: usize) -> f32 {
    let mut acc = 0.0;
    for k in 0..k_dim {
        acc += a.eval(&[i, k]) * b.eval(&[k, j]);
    }
    acc
}

/// `a @ b^T`, evaluated lazily: `(m, n)` from `a: (m, k)`, `b: (n, k)`.
struct MatMulBT<'a> {
    a: &'a dyn ExprNode,
    b: &'a dyn ExprNode,
}
impl ExprNode for MatMulBT<'_> {
    fn ndim(&self) -> usize {
        2
    }
    fn size(&self, dim: usize) -> usize {
        if dim == 0 {
            self.a.size(0)
        } else {
            self.b.size(0)
        }
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let (i, j) = (index[0], index[1]);
        let k_dim = self.a.size(1);
        let mut acc = 0.0;
        for k in 0..k_dim {
            acc += self.a.eval(&[i, k]) * self.b.eval(&[j, k]);
        }
        acc
    }
}

/// `a^T @ b`, evaluated lazily: `(k, n)` from `a: (m, k)`, `b: (m, n)`.
struct MatMulAT<'a> {
    a: &'a dyn ExprNode,
    b: &'a dyn ExprNode,
}
impl ExprNode for MatMulAT<'_> {
    fn ndim(&self) -> usize {
        2
    }
    fn size(&self, dim: usize) -> usize {
        if dim == 0 {
            self.a.size(1)
        } else {
            self.b.size(1)
        }
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let (k, j) = (index[0], index[1]);
        let m_dim = self.a.size(0);
        let mut acc = 0.0;
        for i in 0..m_dim {
            acc += self.a.eval(&[i, k]) * self.b.eval(&[i, j]);
        }
        acc
    }
}

pub struct MatMul {
    a: Rc<dyn ExprNode>,
    b: Rc<dyn ExprNode>,
    shape: Shape,
}

pub fn matmul(a: &Tensor, b: &Tensor) -> Result<Rc<MatMul>, AutogradError> {
    matmul_nodes(LeafOperand::capture(a, true), LeafOperand::capture(b, true))
}

pub(crate) fn matmul_nodes(a: Rc<dyn ExprNode>, b: Rc<dyn ExprNode>) -> Result<Rc<MatMul>, AutogradError> {
    if a.ndim() != 2 || b.ndim() != 2 || a.size(1) != b.size(0) {
        return Err(AutogradError::Shape(crate::shape::ShapeError::Mismatch {
            lhs: vec![a.size(0), a.size(1)],
            rhs: vec![b.size(0), b.size(1)],
        }));
    }
    let shape = Shape::new(vec![a.size(0), b.size(1)]);
    Ok(Rc::new(MatMul { a, b, shape }))
}

impl ExprNode for MatMul {
    fn ndim(&self) -> usize {
        2
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.a.requires_grad() || self.b.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        matmul_eval(&*self.a, &*self.b, index[0], index[1], self.a.size(1))
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        // d(A@B)/dA = grad @ B^T ; d(A@B)/dB = A^T @ grad
        self.a.backward(&MatMulBT { a: grad, b: &*self.b })?;
        self.b.backward(&MatMulAT { a: &*self.a, b: grad })?;
        Ok(())
    }
}

fn batch_matmul_eval(a: &dyn ExprNode, b: &dyn ExprNode, n: usize, i: usize, j: usize, k_dim: usize) -> f32 {
    let mut acc = 0.0;
    for k in 0..k_dim {
        acc += a.eval(&[n, i, k]) * b.eval(&[n, k, j]);
    }
    acc
}

struct BatchMatMulBT<'a> {
    a: &'a dyn ExprNode,
    b: &'a dyn ExprNode,
}
impl ExprNode for BatchMatMulBT<'_> {
    fn ndim(&self) -> usize {
        3
    }
    fn size(&self, dim: usize) -> usize {
        match dim {
            0 => self.a.size(0),
            1 => self.a.size(1),
            _ => self.b.size(1),
        }
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let (n, i, j) = (index[0], index[1], index[2]);
        let k_dim = self.a.size(2);
        let mut acc = 0.0;
        for k in 0..k_dim {
            acc += self.a.eval(&[n, i, k]) * self.b.eval(&[n, j, k]);
        }
        acc
    }
}

struct BatchMatMulAT<'a> {
    a: &'a dyn ExprNode,
    b: &'a dyn ExprNode,
}
impl ExprNode for BatchMatMulAT<'_> {
    fn ndim(&self) -> usize {
        3
    }
    fn size(&self, dim: usize) -> usize {
        match dim {
            0 => self.a.size(0),
            1 => self.a.size(2),
            _ => self.b.size(2),
        }
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let (n, k, j) = (index[0], index[1], index[2]);
        let m_dim = self.a.size(1);
        let mut acc = 0.0;
        for i in 0..m_dim {
            acc += self.a.eval(&[n, i, k]) * self.b.eval(&[n, i, j]);
        }
        acc
    }
}

pub struct BatchMatMul {
    a: Rc<dyn ExprNode>,
    b: Rc<dyn ExprNode>,
    shape: Shape,
}

pub fn batch_matmul(a: &Tensor, b: &Tensor) -> Result<Rc<BatchMatMul>, AutogradError> {
    let a_node = LeafOperand::capture(a, true);
    let b_node = LeafOperand::capture(b, true);
    if a_node.ndim() != 3 || b_node.ndim() != 3 || a_node.size(0) != b_node.size(0) || a_node.size(2) != b_node.size(1) {
        return Err(AutogradError::Shape(crate::shape::ShapeError::Mismatch {
            lhs: vec![a_node.size(0), a_node.size(1), a_node.size(2)],
            rhs: vec![b_node.size(0), b_node.size(1), b_node.size(2)],
        }));
    }
    let shape = Shape::new(vec![a_node.size(0), a_node.size(1), b_node.size(2)]);
    Ok(Rc::new(BatchMatMul { a: a_node, b: b_node, shape }))
}

impl ExprNode for BatchMatMul {
    fn ndim(&self) -> usize {
        3
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.a.requires_grad() || self.b.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        batch_matmul_eval(&*self.a, &*self.b, index[0], index[1], index[2], self.a.size(2))
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        self.a.backward(&BatchMatMulBT { a: grad, b: &*self.b })?;
        self.b.backward(&BatchMatMulAT { a: &*self.a, b: grad })?;
        Ok(())
    }
}

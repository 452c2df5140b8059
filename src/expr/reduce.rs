//! Reductions along a single dimension: mean, max, argmax, softmax and
//! log-softmax. All keep the reduced dimension at size 1 (`keepdim`) so the
//! result stays broadcast-compatible with its input.

use std::rc::Rc;

use super::{AutogradError, ExprNode, LeafOperand};
use crate::shape::Shape;
use crate::tensor::Tensor;

fn keepdim_shape(inner: &dyn ExprNode, dim: usize) -> Shape {
    Shape::new((0..inner.ndim()).map(|d| if d == dim { 1 } else { inner.size(d) }).collect())
}

struct BroadcastAlongDim<'a> {
    grad: &'a dyn ExprNode,
    dim: usize,
}
impl ExprNode for BroadcastAlongDim<'_> {
    fn ndim(&self) -> usize {
        self.grad.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.grad.size(dim)
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let mut idx = index.to_vec();
        idx[self.dim] = 0;
        self.grad.eval(&idx)
    }
}

pub struct Mean {
    inner: Rc<dyn ExprNode>,
    dim: usize,
    shape: Shape,
}

pub fn mean(x: &Tensor, dim: usize) -> Rc<Mean> {
    let inner = LeafOperand::capture(x, true);
    let shape = keepdim_shape(&*inner, dim);
    Rc::new(Mean { inner, dim, shape })
}

impl ExprNode for Mean {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, d: usize) -> usize {
        self.shape.size(d)
    }
    fn requires_grad(&self) -> bool {
        self.inner.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let n = self.inner.size(self.dim);
        let mut idx = index.to_vec();
        let mut acc = 0.0;
        for k in 0..n {
            idx[self.dim] = k;
            acc += self.inner.eval(&idx);
        }
        acc / n as f32
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        let n = self.inner.size(self.dim) as f32;
        struct MeanGrad<'a> {
            grad: &'a dyn ExprNode,
            dim: usize,
            n: f32,
        }
        impl ExprNode for MeanGrad<'_> {
            fn ndim(&self) -> usize {
                self.grad.ndim()
            }
            fn size(&self, d: usize) -> usize {
                self.grad.size(d)
            }
            fn requires_grad(&self) -> bool {
                false
            }
            fn eval(&self, index: &[usize]) -> f32 {
                let mut idx = index.to_vec();
                idx[self.dim] = 0;
                self.grad.eval(&idx) / self.n
            }
        }
        self.inner.backward(&MeanGrad { grad, dim: self.dim, n })
    }
}

pub struct Max {
    inner: Rc<dyn ExprNode>,
    dim: usize,
    shape: Shape,
}

pub fn reduce_max(x: &Tensor, dim: usize) -> Rc<Max> {
    let inner = LeafOperand::capture(x, true);
    let shape = keepdim_shape(&*inner, dim);
    Rc::new(Max { inner, dim, shape })
}

fn scan_max(inner: &dyn ExprNode, dim: usize, fixed: &[usize]) -> (f32, usize) {
    let n = inner.size(dim);
    let mut idx = fixed.to_vec();
    let mut best_val = f32::NEG_INFINITY;
    let mut best_k = 0;
    for k in 0..n {
        idx[dim] = k;
        let v = inner.eval(&idx);
        if v > best_val {
            best_val = v;
            best_k = k;
        }
    }
    (best_val, best_k)
}

impl ExprNode for Max {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, d: usize) -> usize {
        self.shape.size(d)
    }
    fn requires_grad(&self) -> bool {
        self.inner.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        scan_max(&*self.inner, self.dim, index).0
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        struct MaxGradRoute<'a> {
            inner: &'a dyn ExprNode,
            grad: &'a dyn ExprNode,
            dim: usize,
        }
        impl ExprNode for MaxGradRoute<'_> {
            fn ndim(&self) -> usize {
                self.inner.ndim()
            }
            fn size(&self, d: usize) -> usize {
                self.inner.size(d)
            }
            fn requires_grad(&self) -> bool {
                false
            }
            fn eval(&self, index: &[usize]) -> f32 {
                let (_, argmax) = scan_max(self.inner, self.dim, index);
                if index[self.dim] == argmax {
                    let mut gidx = index.to_vec();
                    gidx[self.dim] = 0;
                    self.grad.eval(&gidx)
                } else {
                    0.0
                }
            }
        }
        self.inner.backward(&MaxGradRoute { inner: &*self.inner, grad, dim: self.dim })
    }
}

pub struct Argmax {
    inner: Rc<dyn ExprNode>,
    dim: usize,
    shape: Shape,
}

pub fn argmax(x: &Tensor, dim: usize) -> Rc<Argmax> {
    let inner = LeafOperand::capture(x, false);
    let shape = keepdim_shape(&*inner, dim);
    Rc::new(Argmax { inner, dim, shape })
}

impl ExprNode for Argmax {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, d: usize) -> usize {
        self.shape.size(d)
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        scan_max(&*self.inner, self.dim, index).1 as f32
    }
    fn backward(&self, _grad: &dyn ExprNode) -> Result<(), AutogradError> {
        Err(AutogradError::UnimplementedGrad("argmax is not differentiable"))
    }
}

fn log_sum_exp(inner: &dyn ExprNode, dim: usize, fixed: &[usize]) -> (f32, f32) {
    let (m, _) = scan_max(inner, dim, fixed);
    let n = inner.size(dim);
    let mut idx = fixed.to_vec();
    let mut sum = 0.0;
    for k in 0..n {
        idx[dim] = k;
        sum += (inner.eval(&idx) - m).exp();
    }
    (m, sum.ln())
}

pub struct LogSoftmax {
    inner: Rc<dyn ExprNode>,
    dim: usize,
    shape: Shape,
}

pub fn log_softmax(x: &Tensor, dim: usize) -> Rc<LogSoftmax> {
    let inner = LeafOperand::capture(x, true);
    let shape = inner.shape();
    Rc::new(LogSoftmax { inner, dim, shape })
}

impl ExprNode for LogSoftmax {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, d: usize) -> usize {
        self.shape.size(d)
    }
    fn requires_grad(&self) -> bool {
        self.inner.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let (m, lse) = log_sum_exp(&*self.inner, self.dim, index);
        self.inner.eval(index) - m - lse
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        // d(log_softmax)_i/dx_j = delta_ij - softmax_j ; grad_x = grad - softmax * sum(grad)
        struct LogSoftmaxGrad<'a> {
            inner: &'a dyn ExprNode,
            grad: &'a dyn ExprNode,
            dim: usize,
        }
        impl ExprNode for LogSoftmaxGrad<'_> {
            fn ndim(&self) -> usize {
                self.inner.ndim()
            }
            fn size(&self, d: usize) -> usize {
                self.inner.size(d)
            }
            fn requires_grad(&self) -> bool {
                false
            }
            fn eval(&self, index: &[usize]) -> f32 {
                let n = self.inner.size(self.dim);
                let (m, lse) = log_sum_exp(self.inner, self.dim, index);
                let mut idx = index.to_vec();
                let mut grad_sum = 0.0;
                for k in 0..n {
                    idx[self.dim] = k;
                    grad_sum += self.grad.eval(&idx);
                }
                let softmax_i = (self.inner.eval(index) - m - lse).exp();
                self.grad.eval(index) - softmax_i * grad_sum
            }
        }
        self.inner.backward(&LogSoftmaxGrad { inner: &*self.inner, grad, dim: self.dim })
    }
}

pub struct Softmax {
    inner: Rc<dyn ExprNode>,
    dim: usize,
    shape: Shape,
}

pub fn softmax(x: &Tensor, dim: usize) -> Rc<Softmax> {
    let inner = LeafOperand::capture(x, true);
    let shape = inner.shape();
    Rc::new(Softmax { inner, dim, shape })
}

impl ExprNode for Softmax {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, d: usize) -> usize {
        self.shape.size(d)
    }
    fn requires_grad(&self) -> bool {
        self.inner.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let (m, lse) = log_sum_exp(&*self.inner, self.dim, index);
        (self.inner.eval(index) - m - lse).exp()
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        // d(softmax)_i/dx_j = softmax_i * (delta_ij - softmax_j)
        // grad_x_i = softmax_i * (grad_i - sum_k grad_k * softmax_k)
        struct SoftmaxGrad<'a> {
            inner: &'a dyn ExprNode,
            grad: &'a dyn ExprNode,
            dim: usize,
        }
        impl ExprNode for SoftmaxGrad<'_> {
            fn ndim(&self) -> usize {
                self.inner.ndim()
            }
            fn size(&self, d: usize) -> usize {
                self.inner.size(d)
            }
            fn requires_grad(&self) -> bool {
                false
            }
            fn eval(&self, index: &[usize]) -> f32 {
                let n = self.inner.size(self.dim);
                let (m, lse) = log_sum_exp(self.inner, self.dim, index);
                let softmax_at = |idx: &[usize]| (self.inner.eval(idx) - m - lse).exp();
                let mut idx = index.to_vec();
                let mut dot = 0.0;
                for k in 0..n {
                    idx[self.dim] = k;
                    dot += self.grad.eval(&idx) * softmax_at(&idx);
                }
                let softmax_i = softmax_at(index);
                softmax_i * (self.grad.eval(index) - dot)
            }
        }
        self.inner.backward(&SoftmaxGrad { inner: &*self.inner, grad, dim: self.dim })
    }
}

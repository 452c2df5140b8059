//! Negative log-likelihood loss over a batch of class log-probabilities.

use std::rc::Rc;

use super::{AutogradError, ExprNode, LeafOperand};
use crate::shape::{Shape, ShapeError};
use crate::tensor::Tensor;

/// `log_probs`: `(batch, classes)`. `labels[b]` is the true class of row `b`.
/// Output: `(batch, 1)`, `out[b, 0] = -log_probs[b, labels[b]]`.
pub struct NllLoss {
    log_probs: Rc<dyn ExprNode>,
    labels: Rc<Vec<usize>>,
    shape: Shape,
}

pub fn nll_loss(log_probs: &Tensor, labels: Vec<usize>) -> Result<Rc<NllLoss>, AutogradError> {
    let node = LeafOperand::capture(log_probs, true);
    if node.ndim() != 2 || node.size(0) != labels.len() {
        return Err(AutogradError::Shape(ShapeError::Mismatch {
            lhs: vec![node.size(0), node.size(1)],
            rhs: vec![labels.len()],
        }));
    }
    let shape = Shape::new(vec![node.size(0), 1]);
    Ok(Rc::new(NllLoss { log_probs: node, labels: Rc::new(labels), shape }))
}

impl ExprNode for NllLoss {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.log_probs.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let b = index[0];
        -self.log_probs.eval(&[b, self.labels[b]])
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        struct NllLossGrad<'a> {
            grad: &'a dyn ExprNode,
            labels: &'a [usize],
            classes: usize,
            batch: usize,
        }
        impl ExprNode for NllLossGrad<'_> {
            fn ndim(&self) -> usize {
                2
            }
            fn size(&self, dim: usize) -> usize {
                if dim == 0 {
                    self.batch
                } else {
                    self.classes
                }
            }
            fn requires_grad(&self) -> bool {
                false
            }
            fn eval(&self, index: &[usize]) -> f32 {
                let (b, c) = (index[0], index[1]);
                if c == self.labels[b] {
                    -self.grad.eval(&[b, 0])
                } else {
                    0.0
                }
            }
        }
        self.log_probs.backward(&NllLossGrad {
            grad,
            labels: &self.labels,
            classes: self.log_probs.size(1),
            batch: self.log_probs.size(0),
        })
    }
}

//! Loss functions: MSE (free function) and cross-entropy (a stateless Module).

use crate::expr;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorError, TensorResult};

/// MSE: mean squared error over all elements. `(pred - target)^2`, then mean
/// over the flattened tensor. Scalar output.
pub fn mse(pred: &Tensor, target: &Tensor) -> TensorResult<Tensor> {
    if !pred.shape().same_as(&target.shape()) {
        return Err(TensorError::Shape(crate::shape::ShapeError::Mismatch {
            lhs: pred.shape().dims().to_vec(),
            rhs: target.shape().dims().to_vec(),
        }));
    }
    let diff = Tensor::from_expr(expr::sub(pred, target)?);
    let sq = Tensor::from_expr(expr::mul(&diff, &diff)?);
    let flat = sq.view(Shape::new(vec![1, sq.numel()]))?;
    let mean = Tensor::from_expr(expr::mean(&flat, 1));
    mean.view(Shape::scalar())
}

/// Cross-entropy over class logits: `log_softmax` along the last dim, then
/// `nll_loss` against integer labels, averaged over the batch. No parameters.
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        CrossEntropy
    }

    /// `logits`: `[batch, classes]`. `labels[b]` is row `b`'s true class.
    /// Returns the scalar mean loss over the batch.
    pub fn loss(&self, logits: &Tensor, labels: Vec<usize>) -> TensorResult<Tensor> {
        let log_probs = Tensor::from_expr(expr::log_softmax(logits, 1));
        let per_example = Tensor::from_expr(expr::nll_loss(&log_probs, labels)?);
        let flat = per_example.view(Shape::new(vec![1, per_example.numel()]))?;
        let mean = Tensor::from_expr(expr::mean(&flat, 1));
        mean.view(Shape::scalar())
    }
}

impl Default for CrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

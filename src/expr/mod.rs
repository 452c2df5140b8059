//! Lazily-composed expression nodes.
//!
//! Building `a.add(&b)` allocates no result buffer: it returns a small node
//! holding `Rc`s to its operands. A node is only walked element-by-element
//! when it is materialized into a tensor (`Tensor::assign`/`Tensor::from_expr`)
//! or when an enclosing node calls `eval` on it while materializing itself.
//! Constructing a node over a tensor operand that requires grad also mutates
//! that tensor's pending-consumer count (`gradcount`); this bookkeeping, not
//! evaluation, is what makes node construction observable.

mod arith;
mod conv;
mod elementwise;
mod loss;
mod matmul;
mod reduce;

pub use arith::{add, mul, sub};
pub use conv::{img2col, max_pool2d, Img2ColParams, PoolParams};
pub(crate) use conv::out_size;
pub use elementwise::{exp, ln, relu, sigmoid};
pub use loss::nll_loss;
pub use matmul::{batch_matmul, matmul};
pub use reduce::{argmax, log_softmax, mean, reduce_max, softmax};

use std::rc::Rc;

use thiserror::Error;

use crate::shape::{Shape, ShapeError};
use crate::tensor::Tensor;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutogradError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("leaf variable was mutated after it was captured into the graph")]
    LeafMutatedInGraph,
    #[error("gradient is not defined for this operation ({0})")]
    UnimplementedGrad(&'static str),
}

/// A node in the lazy expression tree: either a captured tensor leaf or a
/// composed operator over other nodes.
pub trait ExprNode {
    fn ndim(&self) -> usize;
    fn size(&self, dim: usize) -> usize;
    fn requires_grad(&self) -> bool;
    fn eval(&self, index: &[usize]) -> f32;

    /// Routes `grad` (shaped like this node's output) back to whichever
    /// operands require it. A no-op default covers pure-data leaves.
    fn backward(&self, _grad: &dyn ExprNode) -> Result<(), AutogradError> {
        Ok(())
    }

    fn shape(&self) -> Shape {
        Shape::new((0..self.ndim()).map(|d| self.size(d)).collect())
    }
}

pub fn shape_of(e: &dyn ExprNode) -> Shape {
    e.shape()
}

/// Checks that two expression nodes have equal rank and are pairwise
/// size-compatible (equal, or one side size-1), returning the broadcast
/// output shape.
pub fn broadcast_check(a: &dyn ExprNode, b: &dyn ExprNode) -> Result<Shape, AutogradError> {
    Ok(a.shape().broadcast_with(&b.shape())?)
}

/// A tensor captured as an operand of an expression node.
///
/// Captures the tensor's storage version at construction time and, if the
/// tensor requires grad, increments its `gradcount` immediately: construction
/// of an expression node is not pure, it mutates operand bookkeeping before
/// any evaluation happens.
pub struct LeafOperand {
    tensor: Tensor,
    with_grad: bool,
    captured_version: u64,
}

impl LeafOperand {
    pub fn capture(tensor: &Tensor, with_grad: bool) -> Rc<LeafOperand> {
        let effective = with_grad && tensor.requires_grad();
        if effective {
            tensor.inc_gradcount();
        }
        Rc::new(LeafOperand { tensor: tensor.clone(), with_grad: effective, captured_version: tensor.version() })
    }
}

impl ExprNode for LeafOperand {
    fn ndim(&self) -> usize {
        self.tensor.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.tensor.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.tensor.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        self.tensor.eval_at(index)
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        if !self.tensor.requires_grad() {
            return Ok(());
        }
        if self.captured_version != self.tensor.version() {
            return Err(AutogradError::LeafMutatedInGraph);
        }
        if self.with_grad {
            self.tensor.dec_gradcount();
        }
        self.tensor.accumulate_and_propagate(grad)
    }
}

/// A constant leaf: evaluates to the same value everywhere, never produces
/// a gradient. Used to seed `backward()` on scalar outputs and as the
/// indicator constant in loss gradients.
pub struct Constant {
    shape: Shape,
    value: f32,
}

impl Constant {
    pub fn new(shape: Shape, value: f32) -> Self {
        Constant { shape, value }
    }

    pub fn scalar_one() -> Self {
        Constant { shape: Shape::scalar(), value: 1.0 }
    }
}

impl ExprNode for Constant {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, _index: &[usize]) -> f32 {
        self.value
    }
}

/// Negates an expression node's values on the fly; used to build subtraction
/// gradients without allocating.
pub(crate) struct Neg<'a>(pub &'a dyn ExprNode);

impl ExprNode for Neg<'_> {
    fn ndim(&self) -> usize {
        self.0.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.0.size(dim)
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        -self.0.eval(index)
    }
}

/// Elementwise product of two same-rank nodes, evaluated lazily. Used to
/// build gradients (e.g. `grad * other_operand`).
pub(crate) struct ElemMul<'a> {
    pub a: &'a dyn ExprNode,
    pub b: &'a dyn ExprNode,
}

impl ExprNode for ElemMul<'_> {
    fn ndim(&self) -> usize {
        self.a.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.a.size(dim).max(self.b.size(dim))
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        self.a.eval(index) * self.b.eval(index)
    }
}

/// Scales an expression node by a constant factor.
pub(crate) struct Scale<'a> {
    pub inner: &'a dyn ExprNode,
    pub factor: f32,
}

impl ExprNode for Scale<'_> {
    fn ndim(&self) -> usize {
        self.inner.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.inner.size(dim)
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        self.inner.eval(index) * self.factor
    }
}

/// A read-only view over a `Storage`-backed gradient, used as the `grad`
/// argument passed down into a materialized expression's `backward`.
pub(crate) struct StoredGrad {
    pub storage: crate::storage::Storage,
    pub shape: Shape,
    pub stride: crate::shape::Stride,
}

impl ExprNode for StoredGrad {
    fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        false
    }
    fn eval(&self, index: &[usize]) -> f32 {
        self.storage.get(self.stride.address(index))
    }
}

/// Writes `src`, evaluated over its own shape in row-major order, into
/// `storage` using `stride` to compute the destination offset for each
/// index. When `stride` has a zero entry (a broadcast dim), every index along
/// it lands on the same offset; with `accumulate = true` that naturally sums
/// contributions across that dim, which is exactly the broadcast-gradient
/// reduction rule.
pub(crate) fn write_strided(
    storage: &crate::storage::Storage,
    shape: &Shape,
    stride: &crate::shape::Stride,
    src: &dyn ExprNode,
    accumulate: bool,
) {
    let ndim = shape.ndim();
    let total = shape.numel();
    let mut idx = vec![0usize; ndim];
    for linear in 0..total {
        crate::shape::unravel(linear, shape, &mut idx);
        let offset = stride.address(&idx);
        let v = src.eval(&idx);
        if accumulate {
            storage.add_at(offset, v);
        } else {
            storage.set(offset, v);
        }
    }
}

//! The tensor handle: shared storage, shape/stride, and (when it requires
//! grad) the bookkeeping an expression graph needs to run backward through it.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

use thiserror::Error;

use crate::expr::{AutogradError, Constant, ExprNode};
use crate::shape::{Shape, ShapeError, Stride};
use crate::storage::Storage;

pub type TensorResult<T> = Result<T, TensorError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Autograd(#[from] AutogradError),
    #[error("index {index:?} out of bounds for shape {shape}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Shape },
    #[error("backward() requires a scalar tensor, got shape {0}")]
    ScalarRequired(Shape),
    #[error("tensor does not require grad")]
    NoGrad,
    #[error("data length {data_len} does not match shape {shape} ({numel} elements)")]
    DataLenMismatch { data_len: usize, shape: Shape, numel: usize },
}

enum GradFnRecord {
    View { source: Tensor },
    Expr(Rc<dyn ExprNode>),
}

struct GradMeta {
    grad: Storage,
    #[allow(dead_code)]
    from_view: bool,
    grad_fn: RefCell<Option<GradFnRecord>>,
    gradcount: Cell<i64>,
}

impl GradMeta {
    fn fresh(numel: usize) -> GradMeta {
        GradMeta { grad: Storage::zeros(numel), from_view: false, grad_fn: RefCell::new(None), gradcount: Cell::new(0) }
    }
}

struct TensorData {
    storage: Storage,
    shape: Shape,
    stride: Stride,
    requires_grad: bool,
    grad_meta: Option<GradMeta>,
}

/// A tensor: a shared, versioned view into a `Storage`, with shape/stride and
/// (for tensors participating in autograd) a `GradMeta`. Cheap to clone: all
/// clones share the same underlying data and grad bookkeeping, which is what
/// lets an expression node capture a tensor as an operand while the caller
/// keeps using it elsewhere.
#[derive(Clone)]
pub struct Tensor(Rc<RefCell<TensorData>>);

enum FireAction {
    View(Tensor),
    Expr(Rc<dyn ExprNode>, Storage, Shape, Stride),
}

impl Tensor {
    pub fn from_vec(data: Vec<f32>, shape: Shape, requires_grad: bool) -> Result<Tensor, TensorError> {
        if data.len() != shape.numel() {
            let numel = shape.numel();
            return Err(TensorError::DataLenMismatch { data_len: data.len(), shape, numel });
        }
        let stride = Stride::contiguous_for(&shape);
        let storage = Storage::from_vec(data);
        let grad_meta = if requires_grad { Some(GradMeta::fresh(shape.numel())) } else { None };
        Ok(Tensor(Rc::new(RefCell::new(TensorData { storage, shape, stride, requires_grad, grad_meta }))))
    }

    /// Stacks `tensors` (all the same shape) along a new leading dimension.
    pub fn stack(tensors: &[Tensor], requires_grad: bool) -> Result<Tensor, TensorError> {
        if tensors.is_empty() {
            return Ok(Tensor::from_vec(Vec::new(), Shape::new(vec![0]), requires_grad).expect("empty vec matches empty shape"));
        }
        let item_shape = tensors[0].shape();
        for t in &tensors[1..] {
            if !t.shape().same_as(&item_shape) {
                return Err(ShapeError::Mismatch { lhs: item_shape.dims().to_vec(), rhs: t.shape().dims().to_vec() }.into());
            }
        }
        let mut dims = vec![tensors.len()];
        dims.extend_from_slice(item_shape.dims());
        let mut data = Vec::with_capacity(tensors.len() * item_shape.numel());
        for t in tensors {
            data.extend(t.to_vec());
        }
        Tensor::from_vec(data, Shape::new(dims), requires_grad)
    }

    pub fn zeros(shape: Shape, requires_grad: bool) -> Tensor {
        let n = shape.numel();
        Tensor::from_vec(vec![0.0; n], shape, requires_grad).expect("vec length matches shape by construction")
    }

    pub fn scalar(value: f32) -> Tensor {
        Tensor::from_vec(vec![value], Shape::scalar(), false).expect("scalar shape has one element")
    }

    /// Materializes `expr` into a freshly allocated tensor.
    pub fn from_expr(expr: Rc<dyn ExprNode>) -> Tensor {
        let shape = expr.shape();
        let stride = Stride::contiguous_for(&shape);
        let storage = Storage::zeros(shape.numel());
        crate::expr::write_strided(&storage, &shape, &stride, &*expr, false);
        let requires_grad = expr.requires_grad();
        let grad_meta = if requires_grad {
            let gm = GradMeta::fresh(shape.numel());
            *gm.grad_fn.borrow_mut() = Some(GradFnRecord::Expr(expr));
            Some(gm)
        } else {
            None
        };
        Tensor(Rc::new(RefCell::new(TensorData { storage, shape, stride, requires_grad, grad_meta })))
    }

    /// Materializes `expr` into this (already allocated) tensor, replacing
    /// its value and grad-producing expression. Bumps the storage version,
    /// so any expression node that had already captured this tensor as an
    /// operand will report a leaf-mutated-in-graph error if asked to
    /// backward through it.
    pub fn assign(&self, expr: Rc<dyn ExprNode>) -> Result<(), TensorError> {
        let expr_shape = expr.shape();
        {
            let inner = self.inner();
            if !inner.shape.same_as(&expr_shape) {
                return Err(ShapeError::Mismatch { lhs: inner.shape.dims().to_vec(), rhs: expr_shape.dims().to_vec() }.into());
            }
            crate::expr::write_strided(&inner.storage, &inner.shape, &inner.stride, &*expr, false);
            inner.storage.bump_version();
        }
        let requires_grad = expr.requires_grad();
        let mut inner = self.inner_mut();
        if requires_grad {
            let grad = inner.grad_meta.take().map(|gm| gm.grad).unwrap_or_else(|| Storage::zeros(inner.shape.numel()));
            inner.grad_meta = Some(GradMeta { grad, from_view: false, grad_fn: RefCell::new(Some(GradFnRecord::Expr(expr))), gradcount: Cell::new(0) });
        } else {
            inner.grad_meta = None;
        }
        inner.requires_grad = requires_grad;
        Ok(())
    }

    /// `self += expr`: accumulates `expr`'s values into this tensor's storage
    /// in place and bumps its version. The resulting grad_fn tracks only
    /// `expr`; contributions already folded into `self`'s value before this
    /// call are not separately replayed during backward.
    pub fn assign_add(&self, expr: Rc<dyn ExprNode>) -> Result<(), TensorError> {
        let expr_shape = expr.shape();
        {
            let inner = self.inner();
            if !inner.shape.same_as(&expr_shape) {
                return Err(ShapeError::Mismatch { lhs: inner.shape.dims().to_vec(), rhs: expr_shape.dims().to_vec() }.into());
            }
            crate::expr::write_strided(&inner.storage, &inner.shape, &inner.stride, &*expr, true);
            inner.storage.bump_version();
        }
        let requires_grad = expr.requires_grad() || self.requires_grad();
        let mut inner = self.inner_mut();
        if requires_grad {
            let grad = inner.grad_meta.take().map(|gm| gm.grad).unwrap_or_else(|| Storage::zeros(inner.shape.numel()));
            inner.grad_meta = Some(GradMeta { grad, from_view: false, grad_fn: RefCell::new(Some(GradFnRecord::Expr(expr))), gradcount: Cell::new(0) });
        }
        inner.requires_grad = requires_grad;
        Ok(())
    }

    fn inner(&self) -> Ref<'_, TensorData> {
        self.0.borrow()
    }

    fn inner_mut(&self) -> RefMut<'_, TensorData> {
        self.0.borrow_mut()
    }

    pub fn shape(&self) -> Shape {
        self.inner().shape.clone()
    }

    pub fn ndim(&self) -> usize {
        self.inner().shape.ndim()
    }

    pub fn size(&self, dim: usize) -> usize {
        self.inner().shape.size(dim)
    }

    pub fn numel(&self) -> usize {
        self.inner().shape.numel()
    }

    pub fn requires_grad(&self) -> bool {
        self.inner().requires_grad
    }

    pub fn version(&self) -> u64 {
        self.inner().storage.version()
    }

    pub(crate) fn eval_at(&self, index: &[usize]) -> f32 {
        let inner = self.inner();
        let off = inner.stride.address(index);
        inner.storage.get(off)
    }

    fn check_index(&self, index: &[usize]) -> Result<(), TensorError> {
        let inner = self.inner();
        if index.len() != inner.shape.ndim() || index.iter().enumerate().any(|(d, &i)| i >= inner.shape.size(d)) {
            return Err(TensorError::IndexOutOfBounds { index: index.to_vec(), shape: inner.shape.clone() });
        }
        Ok(())
    }

    pub fn get(&self, index: &[usize]) -> Result<f32, TensorError> {
        self.check_index(index)?;
        Ok(self.eval_at(index))
    }

    pub fn set(&self, index: &[usize], value: f32) -> Result<(), TensorError> {
        self.check_index(index)?;
        let inner = self.inner();
        let off = inner.stride.address(index);
        inner.storage.set(off, value);
        inner.storage.bump_version();
        Ok(())
    }

    pub fn item(&self) -> Result<f32, TensorError> {
        if self.numel() != 1 {
            return Err(TensorError::ScalarRequired(self.shape()));
        }
        let zeros = vec![0usize; self.ndim()];
        Ok(self.eval_at(&zeros))
    }

    pub fn to_vec(&self) -> Vec<f32> {
        let inner = self.inner();
        let shape = inner.shape.clone();
        let stride = inner.stride.clone();
        let mut idx = vec![0usize; shape.ndim()];
        let mut out = Vec::with_capacity(shape.numel());
        for linear in 0..shape.numel() {
            crate::shape::unravel(linear, &shape, &mut idx);
            out.push(inner.storage.get(stride.address(&idx)));
        }
        out
    }

    pub(crate) fn inc_gradcount(&self) {
        if let Some(gm) = &self.inner().grad_meta {
            gm.gradcount.set(gm.gradcount.get() + 1);
        }
    }

    pub(crate) fn dec_gradcount(&self) {
        if let Some(gm) = &self.inner().grad_meta {
            gm.gradcount.set(gm.gradcount.get() - 1);
        }
    }

    pub(crate) fn accumulate_and_propagate(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        {
            let inner = self.inner();
            let gm = inner.grad_meta.as_ref().expect("accumulate called on a tensor without grad_meta");
            crate::expr::write_strided(&gm.grad, &grad.shape(), &inner.stride, grad, true);
        }
        self.maybe_fire()
    }

    pub(crate) fn maybe_fire(&self) -> Result<(), AutogradError> {
        let action = {
            let inner = self.inner();
            let gm = match &inner.grad_meta {
                Some(gm) => gm,
                None => return Ok(()),
            };
            if gm.gradcount.get() > 0 {
                None
            } else {
                gm.grad_fn.borrow_mut().take().map(|rec| match rec {
                    GradFnRecord::View { source } => FireAction::View(source),
                    GradFnRecord::Expr(expr) => FireAction::Expr(expr, gm.grad.clone(), inner.shape.clone(), inner.stride.clone()),
                })
            }
        };
        match action {
            Some(FireAction::View(source)) => source.maybe_fire(),
            Some(FireAction::Expr(expr, storage, shape, stride)) => {
                let view = crate::expr::StoredGrad { storage, shape, stride };
                expr.backward(&view)
            }
            None => Ok(()),
        }
    }

    /// Seeds backward with a constant gradient of 1, as is only valid for a
    /// single-element tensor (typically a loss).
    pub fn backward(&self) -> Result<(), TensorError> {
        if self.numel() != 1 {
            return Err(TensorError::ScalarRequired(self.shape()));
        }
        if !self.requires_grad() {
            return Err(TensorError::NoGrad);
        }
        let seed = Constant::new(self.shape(), 1.0);
        self.accumulate_and_propagate(&seed)?;
        Ok(())
    }

    /// Seeds backward with an explicit gradient tensor shaped like `self`.
    pub fn backward_from(&self, grad: &Tensor) -> Result<(), TensorError> {
        if !self.requires_grad() {
            return Err(TensorError::NoGrad);
        }
        if !grad.shape().same_as(&self.shape()) {
            return Err(ShapeError::Mismatch { lhs: self.shape().dims().to_vec(), rhs: grad.shape().dims().to_vec() }.into());
        }
        struct View<'a>(&'a Tensor);
        impl ExprNode for View<'_> {
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
                self.0.eval_at(index)
            }
        }
        self.accumulate_and_propagate(&View(grad))?;
        Ok(())
    }

    pub fn grad(&self) -> Option<Tensor> {
        let inner = self.inner();
        let gm = inner.grad_meta.as_ref()?;
        let storage = gm.grad.clone();
        let shape = inner.shape.clone();
        let stride = inner.stride.clone();
        drop(inner);
        Some(Tensor(Rc::new(RefCell::new(TensorData { storage, shape, stride, requires_grad: false, grad_meta: None }))))
    }

    pub fn zero_grad(&self) {
        if let Some(gm) = &self.inner().grad_meta {
            gm.grad.fill(0.0);
        }
    }

    /// Overwrites this tensor's own data in place from `data`, bumping its
    /// version (so graphs built over the old value see a stale capture).
    pub fn load_data(&self, data: &[f32]) -> Result<(), TensorError> {
        let inner = self.inner();
        if data.len() != inner.shape.numel() {
            return Err(TensorError::DataLenMismatch { data_len: data.len(), shape: inner.shape.clone(), numel: inner.shape.numel() });
        }
        let mut idx = vec![0usize; inner.shape.ndim()];
        for (linear, &v) in data.iter().enumerate() {
            crate::shape::unravel(linear, &inner.shape, &mut idx);
            inner.storage.set(inner.stride.address(&idx), v);
        }
        inner.storage.bump_version();
        Ok(())
    }

    fn make_view(&self, new_shape: Shape, new_stride: Stride, storage: Storage, grad_storage: Option<Storage>) -> Tensor {
        let requires_grad = self.requires_grad();
        let grad_meta = if requires_grad {
            Some(GradMeta {
                grad: grad_storage.expect("requires_grad implies a grad storage to alias"),
                from_view: true,
                grad_fn: RefCell::new(Some(GradFnRecord::View { source: self.clone() })),
                gradcount: Cell::new(0),
            })
        } else {
            None
        };
        Tensor(Rc::new(RefCell::new(TensorData { storage, shape: new_shape, stride: new_stride, requires_grad, grad_meta })))
    }

    pub fn slice_range(&self, dim: usize, start: usize, end: usize) -> Result<Tensor, TensorError> {
        let inner = self.inner();
        if dim >= inner.shape.ndim() || start > end || end > inner.shape.size(dim) {
            return Err(ShapeError::DimOutOfRange { dim, ndim: inner.shape.ndim() }.into());
        }
        let delta = inner.stride.get(dim) * start;
        let mut dims = inner.shape.dims().to_vec();
        dims[dim] = end - start;
        let new_shape = Shape::new(dims);
        let new_stride = inner.stride.clone();
        let storage = inner.storage.share_with_offset(delta);
        let grad_storage = inner.grad_meta.as_ref().map(|gm| gm.grad.share_with_offset(delta));
        drop(inner);
        Ok(self.make_view(new_shape, new_stride, storage, grad_storage))
    }

    pub fn slice_index(&self, dim: usize, index: usize) -> Result<Tensor, TensorError> {
        let sliced = self.slice_range(dim, index, index + 1)?;
        sliced.squeeze(Some(dim))
    }

    pub fn transpose(&self, i: usize, j: usize) -> Result<Tensor, TensorError> {
        let inner = self.inner();
        let ndim = inner.shape.ndim();
        if i >= ndim || j >= ndim {
            return Err(ShapeError::DimOutOfRange { dim: i.max(j), ndim }.into());
        }
        let mut dims = inner.shape.dims().to_vec();
        let mut strides = inner.stride.dims().to_vec();
        dims.swap(i, j);
        strides.swap(i, j);
        let new_shape = Shape::new(dims);
        let new_stride = Stride::new(strides);
        let storage = inner.storage.share_with_offset(0);
        let grad_storage = inner.grad_meta.as_ref().map(|gm| gm.grad.share_with_offset(0));
        drop(inner);
        Ok(self.make_view(new_shape, new_stride, storage, grad_storage))
    }

    pub fn permute(&self, perm: &[usize]) -> Result<Tensor, TensorError> {
        let inner = self.inner();
        let ndim = inner.shape.ndim();
        if perm.len() != ndim {
            return Err(ShapeError::InvalidPermutation { perm: perm.to_vec(), ndim }.into());
        }
        let mut seen = vec![false; ndim];
        for &p in perm {
            if p >= ndim || seen[p] {
                return Err(ShapeError::InvalidPermutation { perm: perm.to_vec(), ndim }.into());
            }
            seen[p] = true;
        }
        let dims: Vec<usize> = perm.iter().map(|&p| inner.shape.size(p)).collect();
        let strides: Vec<usize> = perm.iter().map(|&p| inner.stride.get(p)).collect();
        let new_shape = Shape::new(dims);
        let new_stride = Stride::new(strides);
        let storage = inner.storage.share_with_offset(0);
        let grad_storage = inner.grad_meta.as_ref().map(|gm| gm.grad.share_with_offset(0));
        drop(inner);
        Ok(self.make_view(new_shape, new_stride, storage, grad_storage))
    }

    pub fn view(&self, new_shape: Shape) -> Result<Tensor, TensorError> {
        let inner = self.inner();
        if new_shape.numel() != inner.shape.numel() {
            return Err(ShapeError::ElementCountMismatch { from: inner.shape.numel(), to: new_shape.dims().to_vec() }.into());
        }
        if !inner.stride.is_contiguous(&inner.shape) {
            return Err(ShapeError::Mismatch { lhs: inner.shape.dims().to_vec(), rhs: new_shape.dims().to_vec() }.into());
        }
        let new_stride = Stride::contiguous_for(&new_shape);
        let storage = inner.storage.share_with_offset(0);
        let grad_storage = inner.grad_meta.as_ref().map(|gm| gm.grad.share_with_offset(0));
        drop(inner);
        Ok(self.make_view(new_shape, new_stride, storage, grad_storage))
    }

    pub fn squeeze(&self, dim: Option<usize>) -> Result<Tensor, TensorError> {
        let inner = self.inner();
        let ndim = inner.shape.ndim();
        let keep: Vec<usize> = match dim {
            Some(d) => {
                if d >= ndim {
                    return Err(ShapeError::DimOutOfRange { dim: d, ndim }.into());
                }
                if inner.shape.size(d) != 1 {
                    return Err(ShapeError::NotSqueezable { dim: d, size: inner.shape.size(d) }.into());
                }
                (0..ndim).filter(|&i| i != d).collect()
            }
            None => (0..ndim).filter(|&i| inner.shape.size(i) != 1).collect(),
        };
        let dims: Vec<usize> = keep.iter().map(|&i| inner.shape.size(i)).collect();
        let strides: Vec<usize> = keep.iter().map(|&i| inner.stride.get(i)).collect();
        let new_shape = Shape::new(dims);
        let new_stride = Stride::new(strides);
        let storage = inner.storage.share_with_offset(0);
        let grad_storage = inner.grad_meta.as_ref().map(|gm| gm.grad.share_with_offset(0));
        drop(inner);
        Ok(self.make_view(new_shape, new_stride, storage, grad_storage))
    }

    pub fn unsqueeze(&self, dim: usize) -> Result<Tensor, TensorError> {
        let inner = self.inner();
        let ndim = inner.shape.ndim();
        if dim > ndim {
            return Err(ShapeError::DimOutOfRange { dim, ndim }.into());
        }
        let mut dims = inner.shape.dims().to_vec();
        let mut strides = inner.stride.dims().to_vec();
        dims.insert(dim, 1);
        strides.insert(dim, 0);
        let new_shape = Shape::new(dims);
        let new_stride = Stride::new(strides);
        let storage = inner.storage.share_with_offset(0);
        let grad_storage = inner.grad_meta.as_ref().map(|gm| gm.grad.share_with_offset(0));
        drop(inner);
        Ok(self.make_view(new_shape, new_stride, storage, grad_storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elementwise_add_grad_matches_broadcast_rule() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2]), true).unwrap();
        let b = Tensor::from_vec(vec![10.0, 20.0], Shape::new(vec![1, 2]), true).unwrap();
        let sum = crate::expr::add(&a, &b).unwrap();
        let y = Tensor::from_expr(sum);
        assert_eq!(y.to_vec(), vec![11.0, 22.0, 13.0, 24.0]);
        y.backward_from(&Tensor::from_vec(vec![1.0; 4], Shape::new(vec![2, 2]), false).unwrap()).unwrap();
        assert_eq!(a.grad().unwrap().to_vec(), vec![1.0, 1.0, 1.0, 1.0]);
        // b was broadcast along dim 0: its grad sums contributions from both rows.
        assert_eq!(b.grad().unwrap().to_vec(), vec![2.0, 2.0]);
    }

    #[test]
    fn view_write_after_capture_is_rejected() {
        let a = Tensor::from_vec(vec![1.0, 2.0], Shape::new(vec![2]), true).unwrap();
        let b = Tensor::from_vec(vec![3.0, 4.0], Shape::new(vec![2]), true).unwrap();
        let sum = crate::expr::add(&a, &b).unwrap();
        a.set(&[0], 99.0).unwrap();
        let y = Tensor::from_expr(sum);
        let err = y.backward().unwrap_err();
        match err {
            TensorError::Autograd(AutogradError::LeafMutatedInGraph) => {}
            other => panic!("expected LeafMutatedInGraph, got {other:?}"),
        }
    }

    #[test]
    fn view_grad_aliases_source() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2]), true).unwrap();
        let row = a.slice_index(0, 1).unwrap();
        assert_eq!(row.to_vec(), vec![3.0, 4.0]);
        row.backward_from(&Tensor::from_vec(vec![5.0, 6.0], Shape::new(vec![2]), false).unwrap()).unwrap();
        assert_eq!(a.grad().unwrap().to_vec(), vec![0.0, 0.0, 5.0, 6.0]);
    }
}

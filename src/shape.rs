//! Shapes and strides shared by tensors and expression nodes.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("dimension {dim} out of range for rank {ndim}")]
    DimOutOfRange { dim: usize, ndim: usize },
    #[error("element count mismatch: {from} elements cannot be viewed as shape {to:?}")]
    ElementCountMismatch { from: usize, to: Vec<usize> },
    #[error("shape mismatch: {lhs:?} vs {rhs:?}")]
    Mismatch { lhs: Vec<usize>, rhs: Vec<usize> },
    #[error("cannot broadcast shapes {lhs:?} and {rhs:?}")]
    NotBroadcastable { lhs: Vec<usize>, rhs: Vec<usize> },
    #[error("cannot squeeze dimension {dim} with size {size}")]
    NotSqueezable { dim: usize, size: usize },
    #[error("invalid permutation {perm:?} for rank {ndim}")]
    InvalidPermutation { perm: Vec<usize>, ndim: usize },
}

/// The sizes of a tensor or expression along each dimension, outermost first.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    pub fn scalar() -> Self {
        Shape(vec![1])
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn size(&self, dim: usize) -> usize {
        self.0[dim]
    }

    pub fn try_size(&self, dim: usize) -> Result<usize, ShapeError> {
        self.0
            .get(dim)
            .copied()
            .ok_or(ShapeError::DimOutOfRange { dim, ndim: self.ndim() })
    }

    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// Product of sizes from `from` (inclusive) to the end. `subsize(ndim)` is 1.
    pub fn subsize_from(&self, from: usize) -> usize {
        self.0[from..].iter().product()
    }

    pub fn same_as(&self, other: &Shape) -> bool {
        self.0 == other.0
    }

    pub fn is_scalar(&self) -> bool {
        self.numel() == 1
    }

    /// Equal-ndim broadcasting: both shapes must have the same rank, and each
    /// dimension must match or be 1 on one side.
    pub fn broadcast_with(&self, other: &Shape) -> Result<Shape, ShapeError> {
        if self.ndim() != other.ndim() {
            return Err(ShapeError::NotBroadcastable { lhs: self.0.clone(), rhs: other.0.clone() });
        }
        let mut out = Vec::with_capacity(self.ndim());
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            if a == b {
                out.push(*a);
            } else if *a == 1 {
                out.push(*b);
            } else if *b == 1 {
                out.push(*a);
            } else {
                return Err(ShapeError::NotBroadcastable { lhs: self.0.clone(), rhs: other.0.clone() });
            }
        }
        Ok(Shape(out))
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape(dims.to_vec())
    }
}

/// Per-dimension strides. A stride of 0 marks a broadcast dimension: every
/// index along it maps to the same storage offset.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Stride(Vec<usize>);

impl Stride {
    pub fn new(strides: Vec<usize>) -> Self {
        Stride(strides)
    }

    /// Row-major contiguous strides for `shape`, with 0 on any size-1 dim
    /// (matching the convention used to encode broadcastable dims).
    pub fn contiguous_for(shape: &Shape) -> Self {
        let ndim = shape.ndim();
        let mut strides = vec![0usize; ndim];
        for i in 0..ndim {
            strides[i] = if shape.size(i) == 1 { 0 } else { shape.subsize_from(i + 1) };
        }
        Stride(strides)
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, dim: usize) -> usize {
        self.0[dim]
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn is_contiguous(&self, shape: &Shape) -> bool {
        self.0 == Stride::contiguous_for(shape).0
    }

    /// Storage offset, relative to a tensor's own base offset, for `index`.
    pub fn address(&self, index: &[usize]) -> usize {
        index.iter().zip(self.0.iter()).map(|(i, s)| i * s).sum()
    }
}

impl fmt::Debug for Stride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Decomposes a row-major linear index over `shape` into a per-dimension
/// index array.
pub fn unravel(mut linear: usize, shape: &Shape, out: &mut [usize]) {
    for d in (0..shape.ndim()).rev() {
        let size = shape.size(d);
        out[d] = linear % size;
        linear /= size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_numel() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.numel(), 24);
        assert_eq!(s.subsize_from(1), 12);
        assert_eq!(s.subsize_from(3), 1);
    }

    #[test]
    fn contiguous_stride_marks_broadcast_dims() {
        let s = Shape::new(vec![2, 1, 4]);
        let st = Stride::contiguous_for(&s);
        assert_eq!(st.get(0), 4);
        assert_eq!(st.get(1), 0);
        assert_eq!(st.get(2), 1);
    }

    #[test]
    fn broadcast_with_matches_equal_ndim_rule() {
        let a = Shape::new(vec![2, 1, 4]);
        let b = Shape::new(vec![1, 3, 4]);
        let out = a.broadcast_with(&b).unwrap();
        assert_eq!(out.dims(), &[2, 3, 4]);

        let c = Shape::new(vec![2, 3]);
        assert!(a.broadcast_with(&c).is_err());
    }

    #[test]
    fn unravel_matches_row_major_order() {
        let shape = Shape::new(vec![2, 3]);
        let mut idx = [0usize; 2];
        unravel(4, &shape, &mut idx);
        assert_eq!(idx, [1, 1]);
    }
}

//! Patch extraction (`im2col`) and 2D max pooling, both over a `(batch,
//! channel, height, width)` operand.

use std::rc::Rc;

use super::{AutogradError, ExprNode, LeafOperand};
use crate::shape::{Shape, ShapeError};
use crate::tensor::Tensor;

#[derive(Clone, Copy, Debug)]
pub struct Img2ColParams {
    pub kernel: (usize, usize),
    pub stride: (usize, usize),
    pub padding: (usize, usize),
}

pub type PoolParams = Img2ColParams;

pub(crate) fn out_size(dim: usize, kernel: usize, stride: usize, padding: usize) -> Result<usize, ShapeError> {
    let padded = dim + 2 * padding;
    if padded < kernel {
        return Err(ShapeError::Mismatch { lhs: vec![dim], rhs: vec![kernel] });
    }
    Ok((padded - kernel) / stride + 1)
}

/// `operand`: `(b, c, h, w)`. Output: `(out_h*out_w*b, c*kh*kw)`, each row a
/// flattened patch laid out so a subsequent `matmul` with a flattened filter
/// bank computes the convolution.
pub struct Img2Col {
    operand: Rc<dyn ExprNode>,
    params: Img2ColParams,
    out_h: usize,
    out_w: usize,
    shape: Shape,
}

pub fn img2col(x: &Tensor, params: Img2ColParams) -> Result<Rc<Img2Col>, AutogradError> {
    let operand = LeafOperand::capture(x, true);
    if operand.ndim() != 4 {
        return Err(AutogradError::Shape(ShapeError::DimOutOfRange { dim: 4, ndim: operand.ndim() }));
    }
    let n_batch = operand.size(0);
    let channels = operand.size(1);
    let h = operand.size(2);
    let w = operand.size(3);
    let out_h = out_size(h, params.kernel.0, params.stride.0, params.padding.0)?;
    let out_w = out_size(w, params.kernel.1, params.stride.1, params.padding.1)?;
    let shape = Shape::new(vec![out_h * out_w * n_batch, channels * params.kernel.0 * params.kernel.1]);
    Ok(Rc::new(Img2Col { operand, params, out_h, out_w, shape }))
}

impl ExprNode for Img2Col {
    fn ndim(&self) -> usize {
        2
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.operand.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let n_batch = self.operand.size(0);
        let h = self.operand.size(2);
        let w = self.operand.size(3);
        let (kh, kw) = self.params.kernel;
        let (sh, sw) = self.params.stride;
        let (ph, pw) = self.params.padding;

        let mut col = index[0];
        let mut row = index[1];

        let h_idx = col / (self.out_w * n_batch);
        col %= n_batch * self.out_w;
        let w_idx = col / n_batch;
        let b_idx = col % n_batch;

        let c_idx = row / (kh * kw);
        row %= kh * kw;
        let kh_idx = row / kw;
        let kw_idx = row % kw;

        let h_idx = h_idx * sh + kh_idx;
        let w_idx = w_idx * sw + kw_idx;

        if h_idx < ph || h_idx >= h + ph || w_idx < pw || w_idx >= w + pw {
            return 0.0;
        }
        self.operand.eval(&[b_idx, c_idx, h_idx - ph, w_idx - pw])
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        struct Img2ColGrad<'a> {
            grad: &'a dyn ExprNode,
            params: Img2ColParams,
            out_h: usize,
            out_w: usize,
            n_batch: usize,
            channels: usize,
            h: usize,
            w: usize,
        }
        impl ExprNode for Img2ColGrad<'_> {
            fn ndim(&self) -> usize {
                4
            }
            fn size(&self, dim: usize) -> usize {
                [self.n_batch, self.channels, self.h, self.w][dim]
            }
            fn requires_grad(&self) -> bool {
                false
            }
            fn eval(&self, index: &[usize]) -> f32 {
                let (b_idx, c_idx, h_idx, w_idx) = (index[0], index[1], index[2], index[3]);
                let (kh, kw) = self.params.kernel;
                let (sh, sw) = self.params.stride;
                let (ph, pw) = self.params.padding;
                let img_h = self.h + 2 * ph;
                let img_w = self.w + 2 * pw;
                let c_step = kh * kw;
                let kh_step = kw;
                let oh_step = self.out_w * self.n_batch;
                let ow_step = self.n_batch;

                let ph_base = h_idx + ph;
                let pw_base = w_idx + pw;
                let mut total = 0.0f32;
                for kh_idx in 0..kh.min(ph_base + 1) {
                    for kw_idx in 0..kw.min(pw_base + 1) {
                        let ph_idx = ph_base - kh_idx;
                        let pw_idx = pw_base - kw_idx;
                        if ph_idx + kh > img_h || pw_idx + kw > img_w || ph_idx % sh != 0 || pw_idx % sw != 0 {
                            continue;
                        }
                        let row0 = ph_idx / sh * oh_step + pw_idx / sw * ow_step + b_idx;
                        let row1 = c_idx * c_step + kh_idx * kh_step + kw_idx;
                        total += self.grad.eval(&[row0, row1]);
                    }
                }
                total
            }
        }
        self.operand.backward(&Img2ColGrad {
            grad,
            params: self.params,
            out_h: self.out_h,
            out_w: self.out_w,
            n_batch: self.operand.size(0),
            channels: self.operand.size(1),
            h: self.operand.size(2),
            w: self.operand.size(3),
        })
    }
}

fn candidate_range(padded_pos: usize, kernel: usize, stride: usize, out_dim: usize) -> std::ops::Range<usize> {
    if out_dim == 0 {
        return 0..0;
    }
    let hi = (padded_pos / stride).min(out_dim - 1);
    let lo = if padded_pos + 1 > kernel { (padded_pos + 1 - kernel + stride - 1) / stride } else { 0 };
    if lo > hi {
        0..0
    } else {
        lo..hi + 1
    }
}

fn scan_pool_window(
    operand: &dyn ExprNode,
    b: usize,
    c: usize,
    h_start: usize,
    w_start: usize,
    kh: usize,
    kw: usize,
    ph: usize,
    pw: usize,
    h: usize,
    w: usize,
) -> (f32, Option<(usize, usize)>) {
    let mut max_value = f32::NEG_INFINITY;
    let mut argmax: Option<(usize, usize)> = None;
    for i in h_start..h_start + kh {
        if i < ph || i >= h + ph {
            if 0.0 > max_value {
                max_value = 0.0;
                argmax = None;
            }
            continue;
        }
        for j in w_start..w_start + kw {
            let (value, pos) = if j < pw || j >= w + pw {
                (0.0, None)
            } else {
                (operand.eval(&[b, c, i - ph, j - pw]), Some((i - ph, j - pw)))
            };
            if value > max_value {
                max_value = value;
                argmax = pos;
            }
        }
    }
    (max_value, argmax)
}

/// `operand`: `(b, c, h, w)`. Output: `(b, c, out_h, out_w)`.
pub struct MaxPool2d {
    operand: Rc<dyn ExprNode>,
    params: PoolParams,
    out_h: usize,
    out_w: usize,
    shape: Shape,
}

pub fn max_pool2d(x: &Tensor, params: PoolParams) -> Result<Rc<MaxPool2d>, AutogradError> {
    let operand = LeafOperand::capture(x, true);
    if operand.ndim() != 4 {
        return Err(AutogradError::Shape(ShapeError::DimOutOfRange { dim: 4, ndim: operand.ndim() }));
    }
    let out_h = out_size(operand.size(2), params.kernel.0, params.stride.0, params.padding.0)?;
    let out_w = out_size(operand.size(3), params.kernel.1, params.stride.1, params.padding.1)?;
    let shape = Shape::new(vec![operand.size(0), operand.size(1), out_h, out_w]);
    Ok(Rc::new(MaxPool2d { operand, params, out_h, out_w, shape }))
}

impl ExprNode for MaxPool2d {
    fn ndim(&self) -> usize {
        4
    }
    fn size(&self, dim: usize) -> usize {
        self.shape.size(dim)
    }
    fn requires_grad(&self) -> bool {
        self.operand.requires_grad()
    }
    fn eval(&self, index: &[usize]) -> f32 {
        let (b, c, oh, ow) = (index[0], index[1], index[2], index[3]);
        let (sh, sw) = self.params.stride;
        let (kh, kw) = self.params.kernel;
        let (ph, pw) = self.params.padding;
        scan_pool_window(&*self.operand, b, c, oh * sh, ow * sw, kh, kw, ph, pw, self.operand.size(2), self.operand.size(3)).0
    }
    fn backward(&self, grad: &dyn ExprNode) -> Result<(), AutogradError> {
        // MaxPool2d's own grad rule has no closed form: route through the
        // argmax recomputed per window, exactly as a max reduction would.
        struct MaxPool2dGrad<'a> {
            operand: &'a dyn ExprNode,
            grad: &'a dyn ExprNode,
            params: PoolParams,
            out_h: usize,
            out_w: usize,
            h: usize,
            w: usize,
        }
        impl ExprNode for MaxPool2dGrad<'_> {
            fn ndim(&self) -> usize {
                4
            }
            fn size(&self, dim: usize) -> usize {
                self.operand.size(dim)
            }
            fn requires_grad(&self) -> bool {
                false
            }
            fn eval(&self, index: &[usize]) -> f32 {
                let (b, c, ih, iw) = (index[0], index[1], index[2], index[3]);
                let (kh, kw) = self.params.kernel;
                let (sh, sw) = self.params.stride;
                let (ph, pw) = self.params.padding;
                let mut total = 0.0f32;
                for oh in candidate_range(ih + ph, kh, sh, self.out_h) {
                    for ow in candidate_range(iw + pw, kw, sw, self.out_w) {
                        let (_, argmax) = scan_pool_window(self.operand, b, c, oh * sh, ow * sw, kh, kw, ph, pw, self.h, self.w);
                        if argmax == Some((ih, iw)) {
                            total += self.grad.eval(&[b, c, oh, ow]);
                        }
                    }
                }
                total
            }
        }
        self.operand.backward(&MaxPool2dGrad {
            operand: &*self.operand,
            grad,
            params: self.params,
            out_h: self.out_h,
            out_w: self.out_w,
            h: self.operand.size(2),
            w: self.operand.size(3),
        })
    }
}

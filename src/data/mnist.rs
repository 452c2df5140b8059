//! MNIST idx-format image/label reader.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::data::Dataset;
use crate::runtime::with_rng;
use crate::shape::Shape;
use crate::tensor::Tensor;

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;
const ROWS: usize = 28;
const COLS: usize = 28;
const PIXELS: usize = ROWS * COLS;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic number {got} in {file}, expected {expected}")]
    BadMagic { file: &'static str, got: u32, expected: u32 },
    #[error("image count {images} does not match label count {labels}")]
    CountMismatch { images: usize, labels: usize },
}

/// An in-memory MNIST split: `batch_size`-sized batches of `[batch, 1, 28, 28]`
/// pixel tensors (scaled to `[0, 1]`) and a parallel integer label array.
/// `order` is the in-memory index permuted by [`Self::shuffle`]; samples are
/// always read through it, so the underlying storage never moves.
pub struct MnistDataset {
    images: Vec<[f32; PIXELS]>,
    labels: Vec<u8>,
    batch_size: usize,
    order: Vec<usize>,
}

impl MnistDataset {
    pub fn load(img_path: impl AsRef<Path>, label_path: impl AsRef<Path>, batch_size: usize) -> Result<Self, DataError> {
        let images = read_images(img_path)?;
        let labels = read_labels(label_path)?;
        if images.len() != labels.len() {
            return Err(DataError::CountMismatch { images: images.len(), labels: labels.len() });
        }
        let order = (0..images.len()).collect();
        Ok(MnistDataset { images, labels, batch_size, order })
    }

    pub fn n_samples(&self) -> usize {
        self.images.len()
    }

    pub fn n_batches(&self) -> usize {
        (self.images.len() + self.batch_size - 1) / self.batch_size.max(1)
    }

    /// Permutes the in-memory index with the global seeded RNG.
    pub fn shuffle(&mut self) {
        with_rng(|rng| self.order.shuffle(rng));
    }

    /// Batch `idx`: `(pixels [b,1,28,28], labels)`, read through the current order.
    pub fn get_batch(&self, idx: usize) -> Option<(Tensor, Vec<usize>)> {
        let start = idx * self.batch_size;
        if start >= self.order.len() {
            return None;
        }
        let end = (start + self.batch_size).min(self.order.len());
        let rows = &self.order[start..end];

        let mut pixels = Vec::with_capacity(rows.len() * PIXELS);
        let mut labels = Vec::with_capacity(rows.len());
        for &row in rows {
            pixels.extend_from_slice(&self.images[row]);
            labels.push(self.labels[row] as usize);
        }
        let x = Tensor::from_vec(pixels, Shape::new(vec![rows.len(), 1, ROWS, COLS]), false).expect("pixel count matches shape");
        Some((x, labels))
    }

    pub fn label_at(&self, idx: usize) -> u8 {
        self.labels[self.order[idx]]
    }
}

impl Dataset for MnistDataset {
    fn len(&self) -> usize {
        self.order.len()
    }

    /// Single sample: pixel tensor `[1,28,28]` and a one-element label tensor
    /// holding the integer class as `f32` (round to recover it).
    fn get(&self, index: usize) -> Option<(Tensor, Tensor)> {
        let row = *self.order.get(index)?;
        let x = Tensor::from_vec(self.images[row].to_vec(), Shape::new(vec![1, ROWS, COLS]), false).expect("pixel count matches shape");
        let y = Tensor::from_vec(vec![self.labels[row] as f32], Shape::new(vec![1]), false).expect("single label");
        Some((x, y))
    }
}

fn read_images(path: impl AsRef<Path>) -> Result<Vec<[f32; PIXELS]>, DataError> {
    let mut r = BufReader::new(File::open(path)?);
    let magic = r.read_u32::<BigEndian>()?;
    if magic != IMAGE_MAGIC {
        return Err(DataError::BadMagic { file: "images", got: magic, expected: IMAGE_MAGIC });
    }
    let n = r.read_u32::<BigEndian>()? as usize;
    let rows = r.read_u32::<BigEndian>()? as usize;
    let cols = r.read_u32::<BigEndian>()? as usize;
    let mut images = Vec::with_capacity(n);
    let mut buf = vec![0u8; rows * cols];
    for _ in 0..n {
        r.read_exact(&mut buf)?;
        let mut img = [0.0f32; PIXELS];
        for (dst, &src) in img.iter_mut().zip(buf.iter()) {
            *dst = src as f32 / 255.0;
        }
        images.push(img);
    }
    Ok(images)
}

fn read_labels(path: impl AsRef<Path>) -> Result<Vec<u8>, DataError> {
    let mut r = BufReader::new(File::open(path)?);
    let magic = r.read_u32::<BigEndian>()?;
    if magic != LABEL_MAGIC {
        return Err(DataError::BadMagic { file: "labels", got: magic, expected: LABEL_MAGIC });
    }
    let n = r.read_u32::<BigEndian>()? as usize;
    let mut labels = vec![0u8; n];
    r.read_exact(&mut labels)?;
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_idx_images(path: &Path, n: u32, rows: u32, cols: u32, pixels: &[u8]) {
        let mut f = File::create(path).unwrap();
        f.write_all(&IMAGE_MAGIC.to_be_bytes()).unwrap();
        f.write_all(&n.to_be_bytes()).unwrap();
        f.write_all(&rows.to_be_bytes()).unwrap();
        f.write_all(&cols.to_be_bytes()).unwrap();
        f.write_all(pixels).unwrap();
    }

    fn write_idx_labels(path: &Path, n: u32, labels: &[u8]) {
        let mut f = File::create(path).unwrap();
        f.write_all(&LABEL_MAGIC.to_be_bytes()).unwrap();
        f.write_all(&n.to_be_bytes()).unwrap();
        f.write_all(labels).unwrap();
    }

    #[test]
    fn loads_batches_with_integer_labels_and_shuffle_permutes_order() {
        let dir = std::env::temp_dir();
        let img_path = dir.join("tensorgrad_test_mnist_images.idx");
        let lbl_path = dir.join("tensorgrad_test_mnist_labels.idx");

        let n = 4usize;
        let pixels = vec![7u8; n * PIXELS];
        let labels = [1u8, 2, 3, 4];
        write_idx_images(&img_path, n as u32, ROWS as u32, COLS as u32, &pixels);
        write_idx_labels(&lbl_path, n as u32, &labels);

        let mut ds = MnistDataset::load(&img_path, &lbl_path, 2).unwrap();
        assert_eq!(ds.n_samples(), 4);
        assert_eq!(ds.n_batches(), 2);

        let (x0, y0) = ds.get_batch(0).unwrap();
        assert_eq!(x0.shape().dims(), &[2, 1, ROWS, COLS]);
        assert_eq!(y0, vec![1, 2]);

        assert_eq!(Dataset::len(&ds), 4);
        let (sx, sy) = Dataset::get(&ds, 2).unwrap();
        assert_eq!(sx.shape().dims(), &[1, ROWS, COLS]);
        assert_eq!(sy.to_vec(), vec![3.0]);

        crate::runtime::set_seed(7);
        ds.shuffle();
        let shuffled_labels: Vec<u8> = (0..4).map(|i| ds.label_at(i)).collect();
        let mut sorted = shuffled_labels.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, labels);

        let _ = std::fs::remove_file(&img_path);
        let _ = std::fs::remove_file(&lbl_path);
    }
}

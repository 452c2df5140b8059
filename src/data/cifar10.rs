//! CIFAR-10 binary-format reader: `N` x (1 label byte + 3072 image bytes)
//! records per file, `data_batch_{1..5}.bin` for train, `test_batch.bin`
//! for test.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use rand::seq::SliceRandom;

use super::mnist::DataError;
use crate::data::Dataset;
use crate::runtime::with_rng;
use crate::shape::Shape;
use crate::tensor::Tensor;

const CHANNELS: usize = 3;
const ROWS: usize = 32;
const COLS: usize = 32;
const PIXELS: usize = CHANNELS * ROWS * COLS;
const RECORD: usize = PIXELS + 1;

/// `order` is the in-memory index permuted by [`Self::shuffle`]; samples are
/// always read through it, so the underlying storage never moves.
pub struct Cifar10Dataset {
    images: Vec<[f32; PIXELS]>,
    labels: Vec<u8>,
    batch_size: usize,
    order: Vec<usize>,
}

impl Cifar10Dataset {
    /// `dataset_dir` holds `data_batch_1.bin`..`data_batch_5.bin` (train) or
    /// `test_batch.bin` (test), in the standard CIFAR-10 binary layout.
    pub fn load(dataset_dir: impl AsRef<Path>, train: bool, batch_size: usize) -> Result<Self, DataError> {
        let dir = dataset_dir.as_ref();
        let files: Vec<_> = if train {
            (1..=5).map(|i| dir.join(format!("data_batch_{i}.bin"))).collect()
        } else {
            vec![dir.join("test_batch.bin")]
        };

        let mut images = Vec::new();
        let mut labels = Vec::new();
        for f in files {
            let mut r = BufReader::new(File::open(f)?);
            let mut record = [0u8; RECORD];
            loop {
                match r.read_exact(&mut record) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(DataError::Io(e)),
                }
                labels.push(record[0]);
                let mut img = [0.0f32; PIXELS];
                for (dst, &src) in img.iter_mut().zip(record[1..].iter()) {
                    *dst = src as f32 / 255.0;
                }
                images.push(img);
            }
        }
        let order = (0..images.len()).collect();
        Ok(Cifar10Dataset { images, labels, batch_size, order })
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

    /// Batch `idx`: `(pixels [b,3,32,32], labels)`, read through the current order.
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
        let x = Tensor::from_vec(pixels, Shape::new(vec![rows.len(), CHANNELS, ROWS, COLS]), false).expect("pixel count matches shape");
        Some((x, labels))
    }

    pub fn label_at(&self, idx: usize) -> u8 {
        self.labels[self.order[idx]]
    }
}

impl Dataset for Cifar10Dataset {
    fn len(&self) -> usize {
        self.order.len()
    }

    /// Single sample: pixel tensor `[3,32,32]` and a one-element label tensor
    /// holding the integer class as `f32` (round to recover it).
    fn get(&self, index: usize) -> Option<(Tensor, Tensor)> {
        let row = *self.order.get(index)?;
        let x = Tensor::from_vec(self.images[row].to_vec(), Shape::new(vec![CHANNELS, ROWS, COLS]), false).expect("pixel count matches shape");
        let y = Tensor::from_vec(vec![self.labels[row] as f32], Shape::new(vec![1]), false).expect("single label");
        Some((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_records(path: &Path, labels: &[u8]) {
        let mut f = File::create(path).unwrap();
        for &label in labels {
            f.write_all(&[label]).unwrap();
            f.write_all(&vec![9u8; PIXELS]).unwrap();
        }
    }

    #[test]
    fn loads_batches_with_integer_labels_and_shuffle_permutes_order() {
        let dir = std::env::temp_dir().join("tensorgrad_test_cifar10");
        std::fs::create_dir_all(&dir).unwrap();
        let labels = [0u8, 1, 2, 3, 4];
        write_records(&dir.join("test_batch.bin"), &labels);

        let mut ds = Cifar10Dataset::load(&dir, false, 2).unwrap();
        assert_eq!(ds.n_samples(), 5);
        assert_eq!(ds.n_batches(), 3);

        let (x0, y0) = ds.get_batch(0).unwrap();
        assert_eq!(x0.shape().dims(), &[2, CHANNELS, ROWS, COLS]);
        assert_eq!(y0, vec![0, 1]);

        assert_eq!(Dataset::len(&ds), 5);
        let (sx, sy) = Dataset::get(&ds, 4).unwrap();
        assert_eq!(sx.shape().dims(), &[CHANNELS, ROWS, COLS]);
        assert_eq!(sy.to_vec(), vec![4.0]);

        crate::runtime::set_seed(11);
        ds.shuffle();
        let shuffled: Vec<u8> = (0..5).map(|i| ds.label_at(i)).collect();
        let mut sorted = shuffled.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, labels);

        let _ = std::fs::remove_file(dir.join("test_batch.bin"));
        let _ = std::fs::remove_dir(&dir);
    }
}

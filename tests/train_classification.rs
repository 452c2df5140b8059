//! End-to-end classification: small MLP + cross-entropy. Synthetic 2D two-class data.

use rand::Rng;
use tensorgrad::data::{DataLoader, InMemoryDataset};
use tensorgrad::optimizer::SGD;
use tensorgrad::train::Trainer;
use tensorgrad::{set_seed, with_rng, Linear, ReLU, Sequential, Shape, Tensor};

const N_SAMPLES: usize = 200;
const EPOCHS: usize = 80;
const LR: f32 = 0.05;
const BATCH_SIZE: usize = 16;

/// Generate 2D points and binary labels: class 0 near (-1,-1), class 1 near (1,1).
/// Targets are encoded as single-element tensors holding the integer label.
fn make_dataset() -> InMemoryDataset {
    set_seed(42);
    let mut samples = Vec::with_capacity(N_SAMPLES);
    for _ in 0..N_SAMPLES {
        let (x1, x2, label) = with_rng(|rng| {
            let c = rng.gen_range(0..2);
            let x1 = if c == 0 { rng.gen_range(-1.5f32..-0.3) } else { rng.gen_range(0.3f32..1.5) };
            let x2 = if c == 0 { rng.gen_range(-1.5f32..-0.3) } else { rng.gen_range(0.3f32..1.5) };
            (x1, x2, c)
        });
        let input = Tensor::from_vec(vec![x1, x2], Shape::new(vec![2]), false).unwrap();
        let target = Tensor::from_vec(vec![label as f32], Shape::new(vec![1]), false).unwrap();
        samples.push((input, target));
    }
    InMemoryDataset::new(samples)
}

#[test]
fn test_mlp_classification_ce() {
    set_seed(123);
    let dataset = make_dataset();
    let mut dataloader = DataLoader::new(dataset, BATCH_SIZE);

    let mut hidden = Linear::new(2, 8);
    hidden.init_he();
    let mut output = Linear::new(8, 2);
    output.init_xavier();
    let model = Sequential::new().push(hidden).push(ReLU::new()).push(output);

    let opt = SGD::new(LR);
    let mut trainer = Trainer::new(model, opt);

    let mut initial_loss = None::<f32>;
    let mut final_loss = None::<f32>;

    for _epoch in 0..EPOCHS {
        dataloader.reset();
        while let Some((inputs, targets)) = dataloader.next_batch() {
            let input_batch = Tensor::stack(&inputs, false).unwrap();
            let labels: Vec<usize> = targets.iter().map(|t| t.item().unwrap() as usize).collect();
            let r = trainer.step_batch_ce(&input_batch, labels).unwrap();
            if initial_loss.is_none() {
                initial_loss = Some(r.loss);
            }
            final_loss = Some(r.loss);
        }
    }

    let init = initial_loss.unwrap();
    let fin = final_loss.unwrap();
    eprintln!("  classification CE loss: initial={:.4} -> final={:.4} (epochs={})", init, fin, EPOCHS);
    assert!(fin < init, "CE loss should decrease: {} -> {}", init, fin);
}

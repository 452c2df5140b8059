//! Training loop: zero_grad -> forward -> loss -> backward -> optimizer step.
//! Training is a first-class citizen: explicit, controllable.

use thiserror::Error;

use crate::nn::{mse, CrossEntropy, Module};
use crate::optimizer::Optimizer;
use crate::tensor::Tensor;

#[derive(Error, Debug)]
#[error("train error: {0}")]
pub struct TrainError(pub String);

pub type TrainResult<T> = Result<T, TrainError>;

/// Result of one training step: loss value and optional metrics.
#[derive(Debug)]
pub struct TrainStepResult {
    pub loss: f32,
}

/// Trainer: holds model, optimizer; runs step and epoch.
pub struct Trainer<M, O> {
    pub model: M,
    pub optimizer: O,
}

impl<M: Module, O: Optimizer> Trainer<M, O> {
    pub fn new(model: M, optimizer: O) -> Self {
        Trainer { model, optimizer }
    }

    fn finish_step(&mut self, loss: &Tensor) -> TrainResult<TrainStepResult> {
        self.model.zero_grad();
        loss.backward().map_err(|e| TrainError(e.to_string()))?;
        let loss_val = loss.item().map_err(|e| TrainError(e.to_string()))?;
        let mut params = self.model.parameters_mut();
        self.optimizer.step(&mut params).map_err(|e| TrainError(e.to_string()))?;
        Ok(TrainStepResult { loss: loss_val })
    }

    /// One step with mean-squared-error loss.
    pub fn step(&mut self, input: &Tensor, target: &Tensor) -> TrainResult<TrainStepResult> {
        let out = self.model.forward(input).map_err(|e| TrainError(e.to_string()))?;
        let loss = mse(&out, target).map_err(|e| TrainError(e.to_string()))?;
        self.finish_step(&loss)
    }

    /// One batch step with mean-squared-error loss. Same as [Self::step]; the
    /// distinction is purely about intent at the call site (batched input).
    pub fn step_batch(&mut self, input: &Tensor, target: &Tensor) -> TrainResult<TrainStepResult> {
        self.step(input, target)
    }

    /// One batch step for classification: cross-entropy against integer labels.
    pub fn step_batch_ce(&mut self, input: &Tensor, labels: Vec<usize>) -> TrainResult<TrainStepResult> {
        let out = self.model.forward(input).map_err(|e| TrainError(e.to_string()))?;
        let loss = CrossEntropy::new().loss(&out, labels).map_err(|e| TrainError(e.to_string()))?;
        self.finish_step(&loss)
    }

    /// Run one epoch of regression batches: iterate the dataloader, stack
    /// each batch, call [Self::step_batch] once per batch.
    pub fn run_epoch<D: crate::data::Dataset>(&mut self, dataloader: &mut crate::data::DataLoader<D>) -> TrainResult<(f32, usize)> {
        let mut total_loss = 0.0f32;
        let mut num_batches = 0usize;
        while let Some((inputs, targets)) = dataloader.next_batch() {
            let input_batch = Tensor::stack(&inputs, false).map_err(|e| TrainError(e.to_string()))?;
            let target_batch = Tensor::stack(&targets, false).map_err(|e| TrainError(e.to_string()))?;
            let r = self.step_batch(&input_batch, &target_batch)?;
            total_loss += r.loss;
            num_batches += 1;
        }
        let avg = if num_batches > 0 { total_loss / num_batches as f32 } else { 0.0 };
        Ok((avg, num_batches))
    }

    /// Run one epoch of classification batches over a dataset whose targets
    /// are single-element tensors holding the integer class as `f32` (as
    /// produced by `MnistDataset`/`Cifar10Dataset`'s `Dataset::get`):
    /// iterate the dataloader, stack inputs, round targets back to labels,
    /// and call [Self::step_batch_ce] once per batch.
    pub fn run_epoch_ce<D: crate::data::Dataset>(&mut self, dataloader: &mut crate::data::DataLoader<D>) -> TrainResult<(f32, usize)> {
        let mut total_loss = 0.0f32;
        let mut num_batches = 0usize;
        while let Some((inputs, targets)) = dataloader.next_batch() {
            let input_batch = Tensor::stack(&inputs, false).map_err(|e| TrainError(e.to_string()))?;
            let labels = targets.iter().map(|t| t.to_vec()[0].round() as usize).collect();
            let r = self.step_batch_ce(&input_batch, labels)?;
            total_loss += r.loss;
            num_batches += 1;
        }
        let avg = if num_batches > 0 { total_loss / num_batches as f32 } else { 0.0 };
        Ok((avg, num_batches))
    }
}

//! tensorgrad: a tensor engine with reverse-mode autograd over a lazily
//! composed expression tree, plus a small NN/training stack on top.
//!
//! Layers: shape/storage (Shape, Stride, Storage, Tensor) -> expr (lazy
//! expression nodes, materialized on assignment) -> autograd (backward
//! traversal, numerical gradient checking) -> nn (Module, Layer, Optimizer,
//! Parameter) -> train (Trainer, DataLoader).
//!
//! Determinism: use [set_seed] before init/training for reproducible runs.

pub mod alloc_tracker;
pub mod autograd;
pub mod data;
pub mod expr;
pub mod init;
pub mod nn;
pub mod optimizer;
pub mod parameter;
pub mod runtime;
pub mod shape;
pub mod state_io;
pub mod storage;
pub mod tensor;
pub mod train;

pub use autograd::check::{check_gradients, numerical_grad};
pub use data::{Cifar10Dataset, DataLoader, Dataset, InMemoryDataset, MnistDataset};
pub use expr::AutogradError;
pub use init::{he_uniform, normal, uniform, xavier_uniform};
pub use nn::{Conv2d, Conv2dWithReLU, CrossEntropy, Linear, LinearWithReLU, MaxPool2d, Module, ReLU, Sequential, Sigmoid};
pub use optimizer::{Adam, Optimizer, OptimizerError, SGDwithMomentum, SGD};
pub use parameter::{Parameter, ParameterState};
pub use runtime::{set_seed, with_rng};
pub use shape::{Shape, ShapeError, Stride};
pub use state_io::{load_state_dict, save_state_dict};
pub use tensor::{Tensor, TensorError, TensorResult};
pub use train::{Trainer, TrainError, TrainResult, TrainStepResult};

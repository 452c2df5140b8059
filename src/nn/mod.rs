//! Neural network abstraction: Module, Layer, and the concrete layers/losses
//! built on top of the lazy expression engine.

pub mod activation;
pub mod conv;
pub mod layer;
pub mod linear;
pub mod loss;
pub mod mlp;
pub mod module;

pub use activation::{ReLU, Sigmoid};
pub use conv::{Conv2d, Conv2dWithReLU, MaxPool2d};
pub use layer::Layer;
pub use linear::{Linear, LinearWithReLU};
pub use loss::{mse, CrossEntropy};
pub use mlp::Sequential;
pub use module::Module;

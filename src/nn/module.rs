//! Module: holds parameters, forward returns Tensor. Layer/Model compose Module.

use crate::parameter::Parameter;
use crate::tensor::{Tensor, TensorResult};

/// Module: has parameters and forwards a tensor to a tensor. `forward` builds
/// and immediately materializes whatever lazy expression it composes; there
/// is no separate graph object to thread through.
pub trait Module {
    /// All trainable parameters.
    fn parameters(&self) -> Vec<&Parameter>;

    /// Mutable parameters (for optimizer).
    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    /// Forward pass. `x` is captured as an operand of the expression this
    /// builds, so it must not be mutated before any resulting loss's
    /// `backward()` runs.
    fn forward(&self, x: &Tensor) -> TensorResult<Tensor>;

    /// Zero every parameter's accumulated gradient.
    fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }
}

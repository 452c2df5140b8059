//! Optimizer: updates parameters using gradients. SGD, SGD with momentum, Adam.

use thiserror::Error;

use crate::parameter::Parameter;

#[derive(Error, Debug)]
#[error("optimizer error: {0}")]
pub struct OptimizerError(pub String);

pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Optimizer trait: step(parameters) updates parameters using their gradients.
pub trait Optimizer {
    /// Perform one update step: param -= lr * grad (or equivalent).
    fn step(&mut self, parameters: &mut [&mut Parameter]) -> OptimizerResult<()>;
}

/// SGD: param = param - lr * grad.
pub struct SGD {
    pub lr: f32,
}

impl SGD {
    pub fn new(lr: f32) -> Self {
        SGD { lr }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, parameters: &mut [&mut Parameter]) -> OptimizerResult<()> {
        for p in parameters.iter_mut() {
            if p.is_frozen() {
                continue;
            }
            let grad = match p.grad() {
                Some(g) => g.to_vec(),
                None => continue,
            };
            let mut data = p.data().to_vec();
            if data.len() != grad.len() {
                return Err(OptimizerError("param and grad shape mismatch".into()));
            }
            for (d, g) in data.iter_mut().zip(grad.iter()) {
                *d -= self.lr * g;
            }
            p.data().load_data(&data).map_err(|e| OptimizerError(e.to_string()))?;
        }
        Ok(())
    }
}

/// SGD with momentum. The running mean for a parameter's first update is the
/// raw gradient itself (no zero-initialized EMA warm-up); every later step
/// blends it with `momentum * running_mean + (1 - momentum) * grad`.
pub struct SGDwithMomentum {
    pub lr: f32,
    pub momentum: f32,
    first_step: bool,
    running_means: Vec<Vec<f32>>,
}

impl SGDwithMomentum {
    pub fn new(lr: f32, momentum: f32) -> Self {
        SGDwithMomentum { lr, momentum, first_step: true, running_means: Vec::new() }
    }

    pub fn lr_decay(&mut self, factor: f32) {
        self.lr *= factor;
    }
}

impl Optimizer for SGDwithMomentum {
    fn step(&mut self, parameters: &mut [&mut Parameter]) -> OptimizerResult<()> {
        while self.running_means.len() < parameters.len() {
            self.running_means.push(Vec::new());
        }
        for (i, p) in parameters.iter_mut().enumerate() {
            if p.is_frozen() {
                continue;
            }
            let grad = match p.grad() {
                Some(g) => g.to_vec(),
                None => continue,
            };
            let mut data = p.data().to_vec();
            if data.len() != grad.len() {
                return Err(OptimizerError("param and grad shape mismatch".into()));
            }
            let running = &mut self.running_means[i];
            if self.first_step || running.is_empty() {
                *running = grad.clone();
            } else {
                for (r, g) in running.iter_mut().zip(grad.iter()) {
                    *r = self.momentum * *r + (1.0 - self.momentum) * g;
                }
            }
            for (d, r) in data.iter_mut().zip(running.iter()) {
                *d -= self.lr * r;
            }
            p.data().load_data(&data).map_err(|e| OptimizerError(e.to_string()))?;
        }
        self.first_step = false;
        Ok(())
    }
}

/// Adam: first and second moment with bias correction. Not named in the
/// feature set this engine targets, but kept as a supplemental optimizer
/// built from the same state-vector idiom as [SGDwithMomentum].
pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    state: Vec<(Vec<f32>, Vec<f32>)>,
    t: u32,
}

impl Adam {
    pub fn new(lr: f32) -> Self {
        Adam { lr, beta1: 0.9, beta2: 0.999, eps: 1e-8, state: Vec::new(), t: 0 }
    }

    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }
}

impl Optimizer for Adam {
    fn step(&mut self, parameters: &mut [&mut Parameter]) -> OptimizerResult<()> {
        self.t += 1;
        let beta1_t = self.beta1.powi(self.t as i32);
        let beta2_t = self.beta2.powi(self.t as i32);

        while self.state.len() < parameters.len() {
            let n = parameters[self.state.len()].data().numel();
            self.state.push((vec![0.0; n], vec![0.0; n]));
        }

        for (i, p) in parameters.iter_mut().enumerate() {
            if p.is_frozen() {
                continue;
            }
            let grad = match p.grad() {
                Some(g) => g.to_vec(),
                None => continue,
            };
            let mut data = p.data().to_vec();
            if data.len() != grad.len() {
                return Err(OptimizerError("param and grad shape mismatch".into()));
            }
            let (m, v) = &mut self.state[i];
            for j in 0..grad.len() {
                m[j] = self.beta1 * m[j] + (1.0 - self.beta1) * grad[j];
                v[j] = self.beta2 * v[j] + (1.0 - self.beta2) * grad[j] * grad[j];
            }
            let m_hat_scale = 1.0 / (1.0 - beta1_t);
            let v_hat_scale = 1.0 / (1.0 - beta2_t);
            for j in 0..data.len() {
                let m_hat = m[j] * m_hat_scale;
                let v_hat = v[j] * v_hat_scale;
                data[j] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
            p.data().load_data(&data).map_err(|e| OptimizerError(e.to_string()))?;
        }
        Ok(())
    }
}

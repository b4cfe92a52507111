use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use super::{
    decay,
    error::{check_lr, check_non_negative},
    OptimError, Optimize, OptimizerStatus,
};

/// MADGRAD optimizer.
///
/// Momentumized, adaptive, dual averaged gradient method, proposed in
/// [Adaptivity without Compromise](https://arxiv.org/abs/2101.11075).
///
/// The parameters are pulled towards a dual averaging point computed from their initial value and
/// from weighted sums of all the past gradients, normalized by the cube root of the sum of the
/// squared ones. There is no bias correction. Weight decay is added to the gradient.
///
/// ```text
/// λ = lr * sqrt(t)
/// s = s + λ * g
/// v = v + λ * g²
/// z = w₀ - s / (∛v + eps)
/// w = momentum * w + (1 - momentum) * z
/// ```
///
/// For sparse gradients both `momentum` and `weight_decay` should be set to zero.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MADGRAD {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    eps: f32,
}

impl MADGRAD {
    /// Creates a new MADGRAD status.
    ///
    /// # Arguments
    ///
    /// * `lr` - learning rate.
    ///
    /// * `momentum` - momentum factor, in *[0, 1)*. A good default is *0.9*.
    ///
    /// * `weight_decay` - L2 penalty coefficient.
    ///
    /// * `eps` - small constant for numerical stability. A good default value is *1e-6*.
    pub fn new(lr: f32, momentum: f32, weight_decay: f32, eps: f32) -> Self {
        Self {
            lr,
            momentum,
            weight_decay,
            eps,
        }
    }

    /// Returns the current learning rate.
    pub fn get_lr(&self) -> f32 {
        self.lr
    }

    /// Returns the momentum factor.
    pub fn get_momentum(&self) -> f32 {
        self.momentum
    }

    /// Returns the L2 penalty coefficient.
    pub fn get_weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Returns the epsilon constant.
    pub fn get_eps(&self) -> f32 {
        self.eps
    }
}

impl Default for MADGRAD {
    fn default() -> Self {
        Self::new(1e-2, 0.9, 0.0, 1e-6)
    }
}

impl OptimizerStatus for MADGRAD {
    type Param = MADGRADParam;

    const NAME: &'static str = "MADGRAD";

    fn get_lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn validate(&self) -> Result<(), OptimError> {
        check_lr(self.lr)?;
        if !(self.momentum >= 0.0 && self.momentum < 1.0) {
            return Err(OptimError::config(
                "momentum",
                self.momentum,
                "must be in [0, 1)",
            ));
        }
        check_non_negative("weight decay", self.weight_decay)?;
        check_non_negative("epsilon", self.eps)
    }
}

/// A parameter's state used by the MADGRAD optimizer.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MADGRADParam {
    step: usize,
    grad_sum: ArrayD<f32>,
    grad_sq_sum: ArrayD<f32>,
    x0: ArrayD<f32>,
}

impl MADGRADParam {
    /// Number of updates received so far.
    pub fn get_step(&self) -> usize {
        self.step
    }

    /// Weighted sum of the gradients.
    pub fn get_grad_sum(&self) -> &ArrayD<f32> {
        &self.grad_sum
    }

    /// Weighted sum of the squared gradients.
    pub fn get_grad_sq_sum(&self) -> &ArrayD<f32> {
        &self.grad_sq_sum
    }

    /// Value of the parameter before its first update.
    pub fn get_x0(&self) -> &ArrayD<f32> {
        &self.x0
    }
}

impl Optimize<MADGRAD> for MADGRADParam {
    fn init(_: &MADGRAD, data: &ArrayD<f32>) -> Self {
        let grad_sum = ArrayD::zeros(data.raw_dim());
        let grad_sq_sum = grad_sum.clone();

        Self {
            step: 0,
            grad_sum,
            grad_sq_sum,
            x0: data.clone(),
        }
    }

    fn optimize(&mut self, status: &MADGRAD, data: &mut ArrayD<f32>, grad: &ArrayD<f32>) {
        self.step += 1;

        let (momentum, eps) = (status.momentum, status.eps);
        let lamb = status.lr * (self.step as f32).sqrt();
        let grad = decay::coupled(grad, data, status.weight_decay);

        Zip::from(&mut self.grad_sum)
            .and(&mut self.grad_sq_sum)
            .and(&grad)
            .for_each(|grad_sum_el, grad_sq_sum_el, grad_el| {
                *grad_sum_el += lamb * grad_el;
                *grad_sq_sum_el += lamb * grad_el * grad_el;
            });

        Zip::from(data)
            .and(&self.x0)
            .and(&self.grad_sum)
            .and(&self.grad_sq_sum)
            .for_each(|data_el, x0_el, grad_sum_el, grad_sq_sum_el| {
                let z = x0_el - grad_sum_el / (grad_sq_sum_el.cbrt() + eps);
                *data_el = momentum * *data_el + (1.0 - momentum) * z
            });
    }

    fn shape(&self) -> &[usize] {
        self.x0.shape()
    }
}

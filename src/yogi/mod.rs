use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use super::{
    decay,
    error::{check_betas, check_lr, check_non_negative},
    optimizer::exponent,
    OptimError, Optimize, OptimizerStatus,
};

/// Yogi optimizer.
///
/// It has been proposed in
/// [Adaptive Methods for Nonconvex Optimization](https://papers.nips.cc/paper/8186-adaptive-methods-for-nonconvex-optimization).
///
/// The second moment is changed additively, by an amount whose sign depends on whether it
/// currently over or under estimates the squared gradient, instead of being an exponential
/// average. Both moments start from `initial_accumulator` rather than from zero.
///
/// ```text
/// m = β1 * m + (1 - β1) * g
/// v = v - (1 - β2) * sign(v - g²) * g²
/// w = w - lr / (1 - β1ᵗ) * m / (sqrt(v) / sqrt(1 - β2ᵗ) + eps)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Yogi {
    lr: f32,
    betas: (f32, f32),
    eps: f32,
    weight_decay: f32,
    initial_accumulator: f32,
}

impl Yogi {
    /// Creates a new Yogi status.
    ///
    /// # Arguments
    ///
    /// * `lr` - learning rate.
    ///
    /// * `betas` - a 2-tuple of coefficients used for computing the running moments. Good default
    /// is: *(0.9, 0.999)*.
    ///
    /// * `weight_decay` - L2 penalty coefficient.
    ///
    /// * `eps` - small constant for numerical stability. A good default value is *1e-3*.
    ///
    /// The moments start from *1e-6*, see
    /// [`.with_initial_accumulator()`](Self::with_initial_accumulator()).
    pub fn new(lr: f32, betas: (f32, f32), weight_decay: f32, eps: f32) -> Self {
        Self {
            lr,
            betas,
            eps,
            weight_decay,
            initial_accumulator: 1e-6,
        }
    }

    /// Sets the value both moments start from.
    pub fn with_initial_accumulator(mut self, initial_accumulator: f32) -> Self {
        self.initial_accumulator = initial_accumulator;
        self
    }

    /// Returns the current learning rate.
    pub fn get_lr(&self) -> f32 {
        self.lr
    }

    /// Returns the moments' decay rates.
    pub fn get_betas(&self) -> (f32, f32) {
        self.betas
    }

    /// Returns the epsilon constant.
    pub fn get_eps(&self) -> f32 {
        self.eps
    }

    /// Returns the L2 penalty coefficient.
    pub fn get_weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Returns the starting value of the moments.
    pub fn get_initial_accumulator(&self) -> f32 {
        self.initial_accumulator
    }
}

impl Default for Yogi {
    fn default() -> Self {
        Self::new(1e-2, (0.9, 0.999), 0.0, 1e-3)
    }
}

impl OptimizerStatus for Yogi {
    type Param = YogiParam;

    const NAME: &'static str = "Yogi";

    fn get_lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn validate(&self) -> Result<(), OptimError> {
        check_lr(self.lr)?;
        check_betas(self.betas)?;
        check_non_negative("epsilon", self.eps)?;
        check_non_negative("weight decay", self.weight_decay)?;
        check_non_negative("initial accumulator", self.initial_accumulator)
    }
}

/// Sign function with `sign(0) = 0`, unlike [`f32::signum()`].
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// A parameter's state used by the Yogi optimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YogiParam {
    step: usize,
    exp_avg: ArrayD<f32>,
    exp_avg_sq: ArrayD<f32>,
}

impl YogiParam {
    /// Number of updates received so far.
    pub fn get_step(&self) -> usize {
        self.step
    }

    /// First moment.
    pub fn get_exp_avg(&self) -> &ArrayD<f32> {
        &self.exp_avg
    }

    /// Second moment.
    pub fn get_exp_avg_sq(&self) -> &ArrayD<f32> {
        &self.exp_avg_sq
    }
}

impl Optimize<Yogi> for YogiParam {
    fn init(status: &Yogi, data: &ArrayD<f32>) -> Self {
        let exp_avg = ArrayD::from_elem(data.raw_dim(), status.initial_accumulator);
        let exp_avg_sq = exp_avg.clone();

        Self {
            step: 0,
            exp_avg,
            exp_avg_sq,
        }
    }

    fn optimize(&mut self, status: &Yogi, data: &mut ArrayD<f32>, grad: &ArrayD<f32>) {
        self.step += 1;

        let (beta1, beta2) = status.betas;
        let (lr, eps) = (status.lr, status.eps);
        let grad = decay::coupled(grad, data, status.weight_decay);

        let bias_correction1 = 1.0 - beta1.powi(exponent(self.step));
        let bias_correction2 = 1.0 - beta2.powi(exponent(self.step));

        Zip::from(&mut self.exp_avg)
            .and(&mut self.exp_avg_sq)
            .and(&grad)
            .for_each(|exp_avg_el, exp_avg_sq_el, grad_el| {
                let grad_sq = grad_el * grad_el;

                *exp_avg_el = *exp_avg_el * beta1 + grad_el * (1.0 - beta1);
                *exp_avg_sq_el -= (1.0 - beta2) * sign(*exp_avg_sq_el - grad_sq) * grad_sq;
            });

        let step_size = lr / bias_correction1;
        let bias_correction2_sqrt = bias_correction2.sqrt();

        Zip::from(data)
            .and(&self.exp_avg)
            .and(&self.exp_avg_sq)
            .for_each(|data_el, exp_avg_el, exp_avg_sq_el| {
                *data_el -=
                    step_size * exp_avg_el / (exp_avg_sq_el.sqrt() / bias_correction2_sqrt + eps)
            });
    }

    fn shape(&self) -> &[usize] {
        self.exp_avg.shape()
    }
}

#[cfg(test)]
mod test;

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use super::{
    decay,
    error::{check_betas, check_lr, check_non_negative},
    optimizer::exponent,
    OptimError, Optimize, OptimizerStatus,
};

/// AdaBound optimizer.
///
/// It has been proposed in
/// [Adaptive Gradient Methods with Dynamic Bound of Learning Rate](https://arxiv.org/abs/1902.09843).
///
/// The element-wise step size of Adam is clipped between a lower and an upper bound that both
/// converge to `final_lr`, so that the optimizer smoothly turns from Adam into SGD. Weight decay
/// is added to the gradient.
///
/// ```text
/// m = β1 * m + (1 - β1) * g
/// v = β2 * v + (1 - β2) * g²
/// η = clip(lr * sqrt(1 - β2ᵗ) / (1 - β1ᵗ) / (sqrt(v) + eps), lower(t), upper(t))
/// w = w - η * m
/// ```
///
/// If the learning rate is changed after creation, the bounds follow it: they converge to
/// `final_lr * lr / base_lr`, where `base_lr` is the learning rate the optimizer was created with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaBound {
    lr: f32,
    base_lr: f32,
    betas: (f32, f32),
    final_lr: f32,
    gamma: f32,
    eps: f32,
    weight_decay: f32,
    amsbound: bool,
}

impl AdaBound {
    /// Creates a new AdaBound status.
    ///
    /// # Arguments
    ///
    /// * `lr` - learning rate. It is also recorded as the base learning rate.
    ///
    /// * `betas` - a 2-tuple of coefficients used for computing running averages of the gradient
    /// and its square. Good default is: *(0.9, 0.999)*.
    ///
    /// * `final_lr` - final SGD learning rate. A good default is *0.1*.
    ///
    /// * `gamma` - convergence speed of the bounds, in *(0, 1]*. A good default is *1e-3*.
    ///
    /// * `weight_decay` - L2 penalty coefficient.
    ///
    /// * `eps` - small constant for numerical stability. A good default value is *1e-8*.
    pub fn new(
        lr: f32,
        betas: (f32, f32),
        final_lr: f32,
        gamma: f32,
        weight_decay: f32,
        eps: f32,
    ) -> Self {
        Self {
            lr,
            base_lr: lr,
            betas,
            final_lr,
            gamma,
            eps,
            weight_decay,
            amsbound: false,
        }
    }

    /// Enables the AMSBound variant, which normalizes by the running maximum of the second
    /// moment.
    pub fn with_amsbound(mut self) -> Self {
        self.amsbound = true;
        self
    }

    /// Returns the current learning rate.
    pub fn get_lr(&self) -> f32 {
        self.lr
    }

    /// Returns the learning rate the optimizer was created with.
    pub fn get_base_lr(&self) -> f32 {
        self.base_lr
    }

    /// Returns the exponential decay rates.
    pub fn get_betas(&self) -> (f32, f32) {
        self.betas
    }

    /// Returns the final SGD learning rate.
    pub fn get_final_lr(&self) -> f32 {
        self.final_lr
    }

    /// Returns the convergence speed of the bounds.
    pub fn get_gamma(&self) -> f32 {
        self.gamma
    }

    /// Returns the epsilon constant.
    pub fn get_eps(&self) -> f32 {
        self.eps
    }

    /// Returns the L2 penalty coefficient.
    pub fn get_weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Returns `true` if the AMSBound variant is enabled.
    pub fn get_amsbound(&self) -> bool {
        self.amsbound
    }
}

impl Default for AdaBound {
    fn default() -> Self {
        Self::new(1e-3, (0.9, 0.999), 0.1, 1e-3, 0.0, 1e-8)
    }
}

impl OptimizerStatus for AdaBound {
    type Param = AdaBoundParam;

    const NAME: &'static str = "AdaBound";

    fn get_lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn validate(&self) -> Result<(), OptimError> {
        check_lr(self.lr)?;
        check_lr(self.base_lr)?;
        check_betas(self.betas)?;
        check_non_negative("final learning rate", self.final_lr)?;
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(OptimError::config("gamma", self.gamma, "must be in (0, 1]"));
        }
        check_non_negative("epsilon", self.eps)?;
        check_non_negative("weight decay", self.weight_decay)
    }
}

/// Computes the lower and upper bounds of the step size at `step`, for a final learning rate
/// of `final_lr`.
///
/// ```text
/// lower(t) = final_lr * (1 - 1 / (γt + 1))
/// upper(t) = final_lr * (1 + 1 / γt)
/// ```
///
/// The lower bound increases and the upper one decreases with `step`, both towards `final_lr`.
pub fn bounds(final_lr: f32, gamma: f32, step: usize) -> (f32, f32) {
    let scaled_step = gamma * step as f32;

    (
        final_lr * (1.0 - 1.0 / (scaled_step + 1.0)),
        final_lr * (1.0 + 1.0 / scaled_step),
    )
}

/// A parameter's state used by the AdaBound optimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaBoundParam {
    step: usize,
    exp_avg: ArrayD<f32>,
    exp_avg_sq: ArrayD<f32>,
    max_exp_avg_sq: Option<ArrayD<f32>>,
}

impl AdaBoundParam {
    /// Number of updates received so far.
    pub fn get_step(&self) -> usize {
        self.step
    }

    /// Running average of the gradient.
    pub fn get_exp_avg(&self) -> &ArrayD<f32> {
        &self.exp_avg
    }

    /// Running average of the squared gradient.
    pub fn get_exp_avg_sq(&self) -> &ArrayD<f32> {
        &self.exp_avg_sq
    }

    /// Running maximum of the squared gradient average, kept only by AMSBound.
    pub fn get_max_exp_avg_sq(&self) -> Option<&ArrayD<f32>> {
        self.max_exp_avg_sq.as_ref()
    }
}

impl Optimize<AdaBound> for AdaBoundParam {
    fn init(status: &AdaBound, data: &ArrayD<f32>) -> Self {
        let exp_avg = ArrayD::zeros(data.raw_dim());
        let exp_avg_sq = exp_avg.clone();
        let max_exp_avg_sq = status.amsbound.then(|| exp_avg.clone());

        Self {
            step: 0,
            exp_avg,
            exp_avg_sq,
            max_exp_avg_sq,
        }
    }

    fn optimize(&mut self, status: &AdaBound, data: &mut ArrayD<f32>, grad: &ArrayD<f32>) {
        self.step += 1;

        let (beta1, beta2) = status.betas;
        let (lr, eps) = (status.lr, status.eps);
        let grad = decay::coupled(grad, data, status.weight_decay);

        Zip::from(&mut self.exp_avg)
            .and(&grad)
            .for_each(|exp_avg_el, grad_el| {
                *exp_avg_el = *exp_avg_el * beta1 + grad_el * (1.0 - beta1)
            });

        Zip::from(&mut self.exp_avg_sq)
            .and(&grad)
            .for_each(|exp_avg_sq_el, grad_el| {
                *exp_avg_sq_el = *exp_avg_sq_el * beta2 + grad_el * grad_el * (1.0 - beta2)
            });

        let second_moment = match self.max_exp_avg_sq.as_mut() {
            Some(max_exp_avg_sq) => {
                Zip::from(&mut *max_exp_avg_sq)
                    .and(&self.exp_avg_sq)
                    .for_each(|max_el, exp_avg_sq_el| *max_el = max_el.max(*exp_avg_sq_el));
                &*max_exp_avg_sq
            }
            None => &self.exp_avg_sq,
        };

        let bias_correction1 = 1.0 - beta1.powi(exponent(self.step));
        let bias_correction2 = 1.0 - beta2.powi(exponent(self.step));
        let step_size = lr * bias_correction2.sqrt() / bias_correction1;

        // The bounds track the current learning rate.
        let final_lr = status.final_lr * lr / status.base_lr;
        let (lower, upper) = bounds(final_lr, status.gamma, self.step);

        Zip::from(data)
            .and(&self.exp_avg)
            .and(second_moment)
            .for_each(|data_el, exp_avg_el, second_el| {
                let clipped = (step_size / (second_el.sqrt() + eps)).max(lower).min(upper);
                *data_el -= clipped * exp_avg_el
            });
    }

    fn shape(&self) -> &[usize] {
        self.exp_avg.shape()
    }
}

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use super::{
    decay,
    error::{check_betas, check_lr, check_non_negative},
    optimizer::exponent,
    OptimError, Optimize, OptimizerStatus,
};

/// AdamW optimizer.
///
/// Adam with decoupled weight decay, proposed in
/// [Decoupled Weight Decay Regularization](https://arxiv.org/abs/1711.05101). The decay shrinks
/// the parameters directly instead of being added to the gradient, so it is not rescaled by the
/// adaptive denominator.
///
/// The AMSGrad variant is described in
/// [On the Convergence of Adam and Beyond](https://openreview.net/forum?id=ryQu7f-RZ).
///
/// ```text
/// m = β1 * m + (1 - β1) * g
/// v = β2 * v + (1 - β2) * g²
/// w = w - lr * weight_decay * w
/// w = w - lr * sqrt(1 - β2ᵗ) / (1 - β1ᵗ) * m / (sqrt(v) + eps)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdamW {
    lr: f32,
    betas: (f32, f32),
    eps: f32,
    weight_decay: f32,
    amsgrad: bool,
}

impl AdamW {
    /// Creates a new AdamW status.
    ///
    /// # Arguments
    ///
    /// * `lr` - learning rate.
    ///
    /// * `betas` - a 2-tuple of coefficients used for computing running averages of the gradient
    /// and its square. Good default is: *(0.9, 0.999)*.
    ///
    /// * `weight_decay` - decoupled weight decay coefficient. A good default is *1e-2*.
    ///
    /// * `eps` - small constant for numerical stability. A good default value is *1e-8*.
    pub fn new(lr: f32, betas: (f32, f32), weight_decay: f32, eps: f32) -> Self {
        Self {
            lr,
            betas,
            eps,
            weight_decay,
            amsgrad: false,
        }
    }

    /// Enables the AMSGrad variant, which normalizes by the running maximum of the second moment.
    pub fn with_amsgrad(mut self) -> Self {
        self.amsgrad = true;
        self
    }

    /// Returns the current learning rate.
    pub fn get_lr(&self) -> f32 {
        self.lr
    }

    /// Returns the exponential decay rates.
    pub fn get_betas(&self) -> (f32, f32) {
        self.betas
    }

    /// Returns the epsilon constant.
    pub fn get_eps(&self) -> f32 {
        self.eps
    }

    /// Returns the weight decay coefficient.
    pub fn get_weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Returns `true` if the AMSGrad variant is enabled.
    pub fn get_amsgrad(&self) -> bool {
        self.amsgrad
    }
}

impl Default for AdamW {
    fn default() -> Self {
        Self::new(1e-3, (0.9, 0.999), 1e-2, 1e-8)
    }
}

impl OptimizerStatus for AdamW {
    type Param = AdamWParam;

    const NAME: &'static str = "AdamW";

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
        check_non_negative("weight decay", self.weight_decay)
    }
}

/// A parameter's state used by the AdamW optimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdamWParam {
    step: usize,
    exp_avg: ArrayD<f32>,
    exp_avg_sq: ArrayD<f32>,
    max_exp_avg_sq: Option<ArrayD<f32>>,
}

impl AdamWParam {
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

    /// Running maximum of the squared gradient average, kept only by AMSGrad.
    pub fn get_max_exp_avg_sq(&self) -> Option<&ArrayD<f32>> {
        self.max_exp_avg_sq.as_ref()
    }
}

impl Optimize<AdamW> for AdamWParam {
    fn init(status: &AdamW, data: &ArrayD<f32>) -> Self {
        let exp_avg = ArrayD::zeros(data.raw_dim());
        let exp_avg_sq = exp_avg.clone();
        let max_exp_avg_sq = status.amsgrad.then(|| exp_avg.clone());

        Self {
            step: 0,
            exp_avg,
            exp_avg_sq,
            max_exp_avg_sq,
        }
    }

    fn optimize(&mut self, status: &AdamW, data: &mut ArrayD<f32>, grad: &ArrayD<f32>) {
        self.step += 1;

        let (beta1, beta2) = status.betas;
        let (lr, eps, weight_decay) = (status.lr, status.eps, status.weight_decay);

        Zip::from(&mut self.exp_avg)
            .and(grad)
            .for_each(|exp_avg_el, grad_el| {
                *exp_avg_el = *exp_avg_el * beta1 + grad_el * (1.0 - beta1)
            });

        Zip::from(&mut self.exp_avg_sq)
            .and(grad)
            .for_each(|exp_avg_sq_el, grad_el| {
                *exp_avg_sq_el = *exp_avg_sq_el * beta2 + grad_el * grad_el * (1.0 - beta2)
            });

        let bias_correction1 = 1.0 - beta1.powi(exponent(self.step));
        let bias_correction2 = 1.0 - beta2.powi(exponent(self.step));
        let step_size = lr * bias_correction2.sqrt() / bias_correction1;

        // Decay acts on the value the parameter had before this step.
        decay::decouple(data, weight_decay * lr);

        let second_moment = match self.max_exp_avg_sq.as_mut() {
            Some(max_exp_avg_sq) => {
                Zip::from(&mut *max_exp_avg_sq)
                    .and(&self.exp_avg_sq)
                    .for_each(|max_el, exp_avg_sq_el| *max_el = max_el.max(*exp_avg_sq_el));
                &*max_exp_avg_sq
            }
            None => &self.exp_avg_sq,
        };

        Zip::from(data)
            .and(&self.exp_avg)
            .and(second_moment)
            .for_each(|data_el, exp_avg_el, second_el| {
                *data_el -= step_size * exp_avg_el / (second_el.sqrt() + eps)
            });
    }

    fn shape(&self) -> &[usize] {
        self.exp_avg.shape()
    }
}

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use super::{
    decay,
    error::{check_betas, check_lr, check_non_negative},
    optimizer::exponent,
    OptimError, Optimize, OptimizerStatus,
};

/// AdaBelief optimizer.
///
/// It has been proposed in
/// [AdaBelief Optimizer: Adapting Stepsizes by the Belief in Observed Gradients](https://arxiv.org/abs/2010.07468).
///
/// The step is normalized by the running variance of the gradient around its own running mean,
/// the *belief*, rather than by the running average of its square.
///
/// ```text
/// m = β1 * m + (1 - β1) * g
/// s = β2 * s + (1 - β2) * (g - m)² + eps
/// w = w - lr / (1 - β1ᵗ) * m / (sqrt(s / (1 - β2ᵗ)) + eps)
/// ```
///
/// When rectification is enabled the adaptive term is scaled as in
/// [RAdam](https://arxiv.org/abs/1908.03265), and dropped altogether during the first steps, for
/// which the variance of the adaptive learning rate is intractable. See [`rectification()`].
///
/// Weight decay is either added to the gradient or, if decoupled, applied directly to the
/// parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaBelief {
    lr: f32,
    betas: (f32, f32),
    eps: f32,
    weight_decay: f32,
    amsgrad: bool,
    weight_decouple: bool,
    fixed_decay: bool,
    rectify: bool,
}

impl AdaBelief {
    /// Creates a new AdaBelief status.
    ///
    /// # Arguments
    ///
    /// * `lr` - learning rate.
    ///
    /// * `betas` - a 2-tuple of coefficients used for computing running averages of the gradient
    /// and of its variance. Good default is: *(0.9, 0.999)*.
    ///
    /// * `weight_decay` - weight decay coefficient, coupled unless
    /// [`.with_weight_decouple()`](Self::with_weight_decouple()) is used.
    ///
    /// * `eps` - small constant for numerical stability. A good default value is *1e-16*.
    pub fn new(lr: f32, betas: (f32, f32), weight_decay: f32, eps: f32) -> Self {
        Self {
            lr,
            betas,
            eps,
            weight_decay,
            amsgrad: false,
            weight_decouple: false,
            fixed_decay: false,
            rectify: false,
        }
    }

    /// Normalizes by the running maximum of the belief.
    pub fn with_amsgrad(mut self) -> Self {
        self.amsgrad = true;
        self
    }

    /// Decouples the weight decay from the gradient. If `fixed_decay` is `true` the parameters
    /// shrink by `weight_decay` at every step, otherwise by `weight_decay * lr`.
    pub fn with_weight_decouple(mut self, fixed_decay: bool) -> Self {
        self.weight_decouple = true;
        self.fixed_decay = fixed_decay;
        self
    }

    /// Enables the rectification of the adaptive learning rate.
    pub fn with_rectify(mut self) -> Self {
        self.rectify = true;
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

    /// Returns `true` if the running maximum of the belief is used.
    pub fn get_amsgrad(&self) -> bool {
        self.amsgrad
    }

    /// Returns `true` if the weight decay is decoupled.
    pub fn get_weight_decouple(&self) -> bool {
        self.weight_decouple
    }

    /// Returns `true` if the decoupled weight decay ignores the learning rate.
    pub fn get_fixed_decay(&self) -> bool {
        self.fixed_decay
    }

    /// Returns `true` if rectification is enabled.
    pub fn get_rectify(&self) -> bool {
        self.rectify
    }
}

impl Default for AdaBelief {
    fn default() -> Self {
        Self::new(1e-3, (0.9, 0.999), 0.0, 1e-16)
    }
}

impl OptimizerStatus for AdaBelief {
    type Param = AdaBeliefParam;

    const NAME: &'static str = "AdaBelief";

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

/// Computes the variance rectification term at `step`.
///
/// ```text
/// ρ∞ = 2 / (1 - β2) - 1
/// ρₜ = ρ∞ - 2t * β2ᵗ / (1 - β2ᵗ)
/// rₜ = sqrt((ρₜ - 4)(ρₜ - 2)ρ∞ / ((ρ∞ - 4)(ρ∞ - 2)ρₜ))
/// ```
///
/// Returns `None` when `ρₜ ≤ 4`, in which case the adaptive term must not be used.
///
/// The computation is carried out in double precision: `ρₜ` is the difference of two terms of
/// magnitude about `2 / (1 - β2)`.
pub fn rectification(beta2: f32, step: usize) -> Option<f64> {
    let beta2 = beta2 as f64;
    let beta2_t = beta2.powi(exponent(step));

    let rho_inf = 2.0 / (1.0 - beta2) - 1.0;
    let rho_t = rho_inf - 2.0 * step as f64 * beta2_t / (1.0 - beta2_t);

    // NaN, as with a unit beta2, doesn't pass either.
    if rho_t > 4.0 {
        Some(
            ((rho_t - 4.0) * (rho_t - 2.0) * rho_inf
                / ((rho_inf - 4.0) * (rho_inf - 2.0) * rho_t))
                .sqrt(),
        )
    } else {
        None
    }
}

/// A parameter's state used by the AdaBelief optimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaBeliefParam {
    step: usize,
    exp_avg: ArrayD<f32>,
    exp_avg_var: ArrayD<f32>,
    max_exp_avg_var: Option<ArrayD<f32>>,
}

impl AdaBeliefParam {
    /// Number of updates received so far.
    pub fn get_step(&self) -> usize {
        self.step
    }

    /// Running average of the gradient.
    pub fn get_exp_avg(&self) -> &ArrayD<f32> {
        &self.exp_avg
    }

    /// Running variance of the gradient around its running average, the belief.
    pub fn get_exp_avg_var(&self) -> &ArrayD<f32> {
        &self.exp_avg_var
    }

    /// Running maximum of the belief, kept only when AMSGrad is enabled.
    pub fn get_max_exp_avg_var(&self) -> Option<&ArrayD<f32>> {
        self.max_exp_avg_var.as_ref()
    }
}

impl Optimize<AdaBelief> for AdaBeliefParam {
    fn init(status: &AdaBelief, data: &ArrayD<f32>) -> Self {
        let exp_avg = ArrayD::zeros(data.raw_dim());
        let exp_avg_var = exp_avg.clone();
        let max_exp_avg_var = status.amsgrad.then(|| exp_avg.clone());

        Self {
            step: 0,
            exp_avg,
            exp_avg_var,
            max_exp_avg_var,
        }
    }

    fn optimize(&mut self, status: &AdaBelief, data: &mut ArrayD<f32>, grad: &ArrayD<f32>) {
        self.step += 1;

        let (beta1, beta2) = status.betas;
        let (lr, eps, weight_decay) = (status.lr, status.eps, status.weight_decay);

        let grad = if status.weight_decouple {
            let factor = if status.fixed_decay {
                weight_decay
            } else {
                weight_decay * lr
            };
            decay::decouple(data, factor);
            grad.to_owned()
        } else {
            decay::coupled(grad, data, weight_decay)
        };

        Zip::from(&mut self.exp_avg)
            .and(&mut self.exp_avg_var)
            .and(&grad)
            .for_each(|exp_avg_el, exp_avg_var_el, grad_el| {
                *exp_avg_el = *exp_avg_el * beta1 + grad_el * (1.0 - beta1);

                let residual = grad_el - *exp_avg_el;
                *exp_avg_var_el =
                    *exp_avg_var_el * beta2 + residual * residual * (1.0 - beta2) + eps;
            });

        let belief = match self.max_exp_avg_var.as_mut() {
            Some(max_exp_avg_var) => {
                Zip::from(&mut *max_exp_avg_var)
                    .and(&self.exp_avg_var)
                    .for_each(|max_el, exp_avg_var_el| *max_el = max_el.max(*exp_avg_var_el));
                &*max_exp_avg_var
            }
            None => &self.exp_avg_var,
        };

        let bias_correction1 = 1.0 - beta1.powi(exponent(self.step));
        let bias_correction2 = 1.0 - beta2.powi(exponent(self.step));

        let rectified = if status.rectify {
            rectification(beta2, self.step).map(|rect| rect as f32)
        } else {
            Some(1.0)
        };

        match rectified {
            Some(rect) => {
                let step_size = lr * rect / bias_correction1;
                let bias_correction2_sqrt = bias_correction2.sqrt();

                Zip::from(data)
                    .and(&self.exp_avg)
                    .and(belief)
                    .for_each(|data_el, exp_avg_el, belief_el| {
                        *data_el -=
                            step_size * exp_avg_el / (belief_el.sqrt() / bias_correction2_sqrt + eps)
                    });
            }
            None => {
                // Plain momentum while the adaptive learning rate is not yet reliable.
                let step_size = lr / bias_correction1;

                Zip::from(data)
                    .and(&self.exp_avg)
                    .for_each(|data_el, exp_avg_el| *data_el -= step_size * exp_avg_el);
            }
        }
    }

    fn shape(&self) -> &[usize] {
        self.exp_avg.shape()
    }
}

use crate::{optimizer::exponent, Optimizer, OptimizerStatus};

use super::{LRScheduler, Progress};

/// Decays the learning rate of each group by `gamma` every epoch.
///
///```text
/// lrₜ = lr₀ * gammaᵗ
///```
pub struct ExponentialLR<'a, T>
where
    T: OptimizerStatus,
{
    optimizer: &'a Optimizer<T>,
    gamma: f32,
    progress: Progress,
}

impl<'a, T> ExponentialLR<'a, T>
where
    T: OptimizerStatus,
{
    /// Creates a new ExponentialLR scheduler.
    ///
    /// # Arguments
    ///
    /// * `optimizer` - optimizer whose groups are rescaled.
    ///
    /// * `gamma` - decay factor.
    pub fn new(optimizer: &'a Optimizer<T>, gamma: f32) -> Self {
        Self {
            optimizer,
            gamma,
            progress: Progress::new(optimizer),
        }
    }
}

impl<'a, T> LRScheduler for ExponentialLR<'a, T>
where
    T: OptimizerStatus,
{
    fn step(&self) {
        self.progress.advance(self.optimizer, |epoch| Some(self.gamma.powi(exponent(epoch))));
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}

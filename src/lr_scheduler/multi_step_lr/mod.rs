use std::cell::Cell;

use crate::{Optimizer, OptimizerStatus};

use super::{LRScheduler, Progress};

/// Decays the learning rate of each group by `gamma` at every milestone epoch.
///
///```text
/// lrₜ = lrₜ₋₁ * gamma if t is a milestone else lrₜ₋₁
///```
pub struct MultiStepLR<'a, T>
where
    T: OptimizerStatus,
{
    optimizer: &'a Optimizer<T>,
    gamma: Cell<f32>,
    milestones: Vec<usize>,
    factor: Cell<f32>,
    progress: Progress,
}

impl<'a, T> MultiStepLR<'a, T>
where
    T: OptimizerStatus,
{
    /// Creates a new MultiStepLR scheduler.
    ///
    /// # Arguments
    ///
    /// * `optimizer` - optimizer whose groups are rescaled.
    ///
    /// * `milestones` - epochs at which the rate decays, in any order.
    ///
    /// * `gamma` - decay factor.
    pub fn new(optimizer: &'a Optimizer<T>, milestones: Vec<usize>, gamma: f32) -> Self {
        Self {
            optimizer,
            gamma: Cell::new(gamma),
            milestones,
            factor: Cell::new(1.0),
            progress: Progress::new(optimizer),
        }
    }

    /// Changes the decay factor. Decays already applied are kept.
    pub fn set_gamma(&self, gamma: f32) {
        self.gamma.set(gamma)
    }
}

impl<'a, T> LRScheduler for MultiStepLR<'a, T>
where
    T: OptimizerStatus,
{
    fn step(&self) {
        self.progress.advance(self.optimizer, |epoch| {
            if !self.milestones.contains(&epoch) {
                return None;
            }

            self.factor.set(self.factor.get() * self.gamma.get());
            Some(self.factor.get())
        });
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}

#[cfg(test)]
mod test;

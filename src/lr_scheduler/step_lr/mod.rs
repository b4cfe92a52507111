use std::cell::Cell;

use crate::{Optimizer, OptimizerStatus};

use super::{LRScheduler, Progress};

/// Decays the learning rate of each group by `gamma` every `step_size` epochs.
///
///```text
/// lrₜ = lrₜ₋₁ * gamma if t mod step_size == 0 else lrₜ₋₁
///```
pub struct StepLR<'a, T>
where
    T: OptimizerStatus,
{
    optimizer: &'a Optimizer<T>,
    gamma: Cell<f32>,
    step_size: Cell<usize>,
    factor: Cell<f32>,
    progress: Progress,
}

impl<'a, T> StepLR<'a, T>
where
    T: OptimizerStatus,
{
    /// Creates a new StepLR scheduler.
    ///
    /// # Arguments
    ///
    /// * `optimizer` - optimizer whose groups are rescaled.
    ///
    /// * `step_size` - number of epochs between two decays. With zero the rate never decays.
    ///
    /// * `gamma` - decay factor.
    pub fn new(optimizer: &'a Optimizer<T>, step_size: usize, gamma: f32) -> Self {
        Self {
            optimizer,
            gamma: Cell::new(gamma),
            step_size: Cell::new(step_size),
            factor: Cell::new(1.0),
            progress: Progress::new(optimizer),
        }
    }

    /// Changes the decay factor. Decays already applied are kept.
    pub fn set_gamma(&self, gamma: f32) {
        self.gamma.set(gamma)
    }

    /// Changes the number of epochs between two decays.
    pub fn set_step_size(&self, step_size: usize) {
        self.step_size.set(step_size)
    }
}

impl<'a, T> LRScheduler for StepLR<'a, T>
where
    T: OptimizerStatus,
{
    fn step(&self) {
        let step_size = self.step_size.get();

        self.progress.advance(self.optimizer, |epoch| {
            if step_size == 0 || epoch % step_size != 0 {
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

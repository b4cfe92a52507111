use crate::{Optimizer, OptimizerStatus};

use super::{LRScheduler, Progress};

/// Sets the learning rate of each group to its initial value times a given function of the
/// epoch.
///
///```text
/// lrₜ = lr₀ * lr_fn(t)
///```
pub struct LambdaLR<'a, T, F>
where
    T: OptimizerStatus,
    F: Fn(usize) -> f32,
{
    optimizer: &'a Optimizer<T>,
    lr_fn: F,
    progress: Progress,
}

impl<'a, T, F> LambdaLR<'a, T, F>
where
    T: OptimizerStatus,
    F: Fn(usize) -> f32,
{
    /// Creates a new LambdaLR scheduler.
    ///
    /// # Arguments
    ///
    /// * `optimizer` - optimizer whose groups are rescaled.
    ///
    /// * `lr_fn` - multiplicative factor applied to the initial learning rates, given the epoch.
    pub fn new(optimizer: &'a Optimizer<T>, lr_fn: F) -> Self {
        Self {
            optimizer,
            lr_fn,
            progress: Progress::new(optimizer),
        }
    }
}

impl<'a, T, F> LRScheduler for LambdaLR<'a, T, F>
where
    T: OptimizerStatus,
    F: Fn(usize) -> f32,
{
    fn step(&self) {
        self.progress.advance(self.optimizer, |epoch| Some((self.lr_fn)(epoch)));
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}

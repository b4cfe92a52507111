//! Learning rate schedulers.
//!
//! A scheduler borrows an optimizer and rescales the learning rate of each of its groups relative
//! to the value that group had when the scheduler was created. Scheduling should be applied after
//! the optimizer's update; for instance, you should write your code this way:
//!
//! ```
//! use ndarray::array;
//! use neuronika_adaptive::{
//!     lr_scheduler::{LRScheduler, StepLR},
//!     AdaBelief, Optimizer, Param,
//! };
//!
//! const EPOCHS: usize = 5;
//!
//! let w = Param::new(array![1.0_f32, 2.0]);
//! let optim = Optimizer::new(vec![w.clone()], AdaBelief::default())?;
//! let scheduler = StepLR::new(&optim, 2, 0.5);
//!
//! for _ in 0..EPOCHS {
//!     w.set_grad(array![0.1_f32, -0.1]);
//!     optim.step()?;
//!     optim.zero_grad();
//!     scheduler.step();
//! }
//!
//! assert!((optim.get_lr() - 2.5e-4).abs() <= f32::EPSILON);
//! # Ok::<(), neuronika_adaptive::OptimError>(())
//! ```
use std::cell::Cell;

use crate::{Optimizer, OptimizerStatus};

mod exponential_lr;
mod lambda_lr;
mod multi_step_lr;
mod step_lr;

pub use exponential_lr::*;
pub use lambda_lr::*;
pub use multi_step_lr::*;
pub use step_lr::*;

/// Learning rate scheduler trait, defines the scheduler's logic.
///
/// Implementors only decide how the learning rate changes at each epoch; the bookkeeping is kept
/// in their [`Progress`].
pub trait LRScheduler {
    /// Updates the learning rate.
    fn step(&self);

    /// Returns the epoch counter and the learning rates tracked by this scheduler.
    fn progress(&self) -> &Progress;

    /// Returns the learning rate of the first group before the last update.
    fn get_last_lr(&self) -> f32 {
        self.progress().last_lr.get()
    }

    /// Returns the current learning rate of the first group.
    fn get_current_lr(&self) -> f32 {
        self.progress().current_lr.get()
    }

    /// Returns the current epoch.
    fn get_current_epoch(&self) -> usize {
        self.progress().epoch.get()
    }

    /// Sets the current epoch.
    fn set_current_epoch(&self, epoch: usize) {
        self.progress().epoch.set(epoch);
    }

    /// Logs the update of the learning rate. It should be called after `.step()`.
    fn print_lr(&self) {
        tracing::info!(
            epoch = self.get_current_epoch(),
            lr = self.get_current_lr(),
            "learning rate adjusted"
        );
    }
}

/// Epoch counter and learning rates of a scheduler.
///
/// The learning rate of every group is recorded when the scheduler is created, and later
/// rescaled from that value.
#[derive(Debug)]
pub struct Progress {
    initial_lr: Vec<f32>,
    epoch: Cell<usize>,
    current_lr: Cell<f32>,
    last_lr: Cell<f32>,
}

impl Progress {
    fn new<T>(optimizer: &Optimizer<T>) -> Self
    where
        T: OptimizerStatus,
    {
        Self {
            initial_lr: optimizer.groups().iter().map(|group| group.get_lr()).collect(),
            epoch: Cell::new(0),
            current_lr: Cell::new(optimizer.get_lr()),
            last_lr: Cell::new(0.0),
        }
    }

    /// Moves to the next epoch. When `factor` returns a value for it, the learning rate of every
    /// group of `optimizer` becomes its initial value times that value.
    fn advance<T, F>(&self, optimizer: &Optimizer<T>, factor: F)
    where
        T: OptimizerStatus,
        F: FnOnce(usize) -> Option<f32>,
    {
        self.last_lr.set(self.current_lr.get());

        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);

        let factor = match factor(epoch) {
            Some(factor) => factor,
            None => return,
        };

        optimizer
            .groups()
            .iter()
            .zip(&self.initial_lr)
            .for_each(|(group, initial_lr)| group.set_lr(initial_lr * factor));

        if let Some(initial_lr) = self.initial_lr.first() {
            self.current_lr.set(initial_lr * factor);
        }
    }
}

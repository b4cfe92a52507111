//! The `neuronika-adaptive` crate provides adaptive first-order optimizers for training with
//! [`ndarray`] tensors.
//!
//! Five algorithms are available, all sharing the same driving machinery:
//!
//! * [`AdamW`], Adam with decoupled weight decay and optional AMSGrad.
//! * [`AdaBound`], Adam whose element-wise step is clipped into bounds converging to SGD.
//! * [`Yogi`], Adam with an additive, sign controlled, second moment.
//! * [`AdaBelief`], Adam normalized by the belief in the observed gradient, with optional
//!   rectification.
//! * [`MADGRAD`], momentumized, adaptive, dual averaged gradient.
//!
//! # Parameters
//!
//! The tensors to optimize are wrapped in a [`Param`]. A `Param` is a cheap, shareable handle:
//! the training loop keeps a clone to write gradients into while the optimizer keeps another
//! one to update the values in place.
//!
//! ```
//! use ndarray::array;
//! use neuronika_adaptive::{AdamW, Optimizer, Param};
//!
//! let w = Param::new(array![1.0_f32, -1.0]);
//! let optim = Optimizer::new(vec![w.clone()], AdamW::default())?;
//!
//! for _ in 0..10 {
//!     // Gradient of 0.5 * |w|².
//!     let grad = w.data().clone();
//!     w.set_grad(grad);
//!
//!     optim.step()?;
//!     optim.zero_grad();
//! }
//!
//! assert!(w.data()[[0]] < 1.0);
//! # Ok::<(), neuronika_adaptive::OptimError>(())
//! ```
//!
//! # Parameter Groups
//!
//! Parameters can be split into several [`ParamGroup`], each with its own hyper-parameters. The
//! groups are updated in the order they are given.
//!
//! ```
//! use ndarray::array;
//! use neuronika_adaptive::{Optimizer, Param, ParamGroup, Yogi};
//!
//! let (weights, biases) = (Param::new(array![[0.5_f32]]), Param::new(array![0.0_f32]));
//! let optim = Optimizer::with_groups(vec![
//!     ParamGroup::new(vec![weights], Yogi::default()),
//!     ParamGroup::new(vec![biases], Yogi::new(1e-3, (0.9, 0.999), 0.0, 1e-3)),
//! ])?;
//!
//! assert_eq!(optim.groups().len(), 2);
//! # Ok::<(), neuronika_adaptive::OptimError>(())
//! ```
//!
//! # Checkpoints
//!
//! The state of an optimizer can be exported with [`.state_dict()`](Optimizer::state_dict()),
//! serialized with any [`serde`] format and later restored with
//! [`.load_state_dict()`](Optimizer::load_state_dict()).
//!
//! # Learning Rate Scheduling
//!
//! See the [`lr_scheduler`] module.
mod adabelief;
mod adabound;
mod adamw;
mod decay;
mod error;
mod madgrad;
mod optimizer;
mod param;
mod yogi;

pub mod lr_scheduler;

pub use adabelief::*;
pub use adabound::*;
pub use adamw::*;
pub use error::OptimError;
pub use madgrad::*;
pub use optimizer::*;
pub use param::Param;
pub use yogi::*;

//! Weight decay kernels.
//!
//! Weight decay comes in two flavours. The *coupled* one, also known as L2 penalty, folds the
//! decay into the gradient before any moment is computed, so that it gets rescaled by the
//! adaptive denominator like the rest of the gradient:
//!
//! ```text
//! g = g + weight_decay * w
//! ```
//!
//! The *decoupled* one, proposed in
//! [Decoupled Weight Decay Regularization](https://arxiv.org/abs/1711.05101), shrinks the
//! parameter directly and is never seen by the moments:
//!
//! ```text
//! w = w - factor * w
//! ```
use ndarray::{ArrayD, Zip};

/// Returns a copy of `grad` with the coupled weight decay applied. The caller's gradient is
/// never modified.
pub(crate) fn coupled(grad: &ArrayD<f32>, data: &ArrayD<f32>, weight_decay: f32) -> ArrayD<f32> {
    let mut grad = grad.to_owned();
    if weight_decay != 0.0 {
        Zip::from(&mut grad)
            .and(data)
            .for_each(|grad_el, data_el| *grad_el += weight_decay * data_el);
    }

    grad
}

/// Shrinks every element of `data` by `factor` times its current value.
pub(crate) fn decouple(data: &mut ArrayD<f32>, factor: f32) {
    if factor != 0.0 {
        data.map_inplace(|data_el| *data_el -= factor * *data_el);
    }
}

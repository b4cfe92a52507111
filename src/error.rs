use thiserror::Error;

/// Errors raised by the optimizers of this crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimError {
    /// An hyper-parameter or the parameter list handed to an optimizer is invalid.
    #[error("invalid {name}: {value} ({reason})")]
    Config {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    /// A gradient, or a recorded state, does not match the shape of its parameter.
    #[error(
        "shape mismatch for parameter {index} of group {group}: expected {expected:?}, found {found:?}"
    )]
    Shape {
        group: usize,
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A state dictionary cannot be loaded into this optimizer.
    #[error("incompatible state dict: {0}")]
    StateDict(String),
}

impl OptimError {
    pub(crate) fn config(name: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::Config {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

/// Checks that the learning rate is strictly positive.
pub(crate) fn check_lr(lr: f32) -> Result<(), OptimError> {
    if lr > 0.0 {
        Ok(())
    } else {
        Err(OptimError::config("learning rate", lr, "must be > 0"))
    }
}

/// Checks that both exponential decay rates lie in *(0, 1]*.
pub(crate) fn check_betas((beta1, beta2): (f32, f32)) -> Result<(), OptimError> {
    for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
        if !(beta > 0.0 && beta <= 1.0) {
            return Err(OptimError::config(name, beta, "must be in (0, 1]"));
        }
    }

    Ok(())
}

/// Checks that `value` is non-negative. NaN is rejected.
pub(crate) fn check_non_negative(name: &'static str, value: f32) -> Result<(), OptimError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(OptimError::config(name, value, "must be >= 0"))
    }
}

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use ndarray::{Array, ArrayD, Dimension};

struct ParamInner {
    data: RwLock<ArrayD<f32>>,
    grad: RwLock<Option<ArrayD<f32>>>,
}

/// A learnable tensor together with its, possibly absent, gradient.
///
/// Cloning a `Param` yields another handle to the **same** storage: the training loop keeps one
/// handle to fill in gradients while the optimizer holds another one and updates the values in
/// place.
///
/// Do note that the accessors hand out lock guards. Holding a guard returned by
/// [`.data()`](Param::data()) or [`.grad()`](Param::grad()) across a call to an optimizer's
/// `.step()` will deadlock.
#[derive(Clone)]
pub struct Param {
    inner: Arc<ParamInner>,
}

impl Param {
    /// Creates a new parameter with the given value and no gradient.
    pub fn new<D>(data: Array<f32, D>) -> Self
    where
        D: Dimension,
    {
        let inner = ParamInner {
            data: RwLock::new(data.into_dyn()),
            grad: RwLock::new(None),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns the current value of the parameter.
    pub fn data(&self) -> RwLockReadGuard<'_, ArrayD<f32>> {
        self.inner
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a mutable reference to the value of the parameter.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, ArrayD<f32>> {
        self.inner
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the gradient of the parameter, if any.
    pub fn grad(&self) -> RwLockReadGuard<'_, Option<ArrayD<f32>>> {
        self.inner
            .grad
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a mutable reference to the gradient slot of the parameter.
    pub fn grad_mut(&self) -> RwLockWriteGuard<'_, Option<ArrayD<f32>>> {
        self.inner
            .grad
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the gradient of the parameter.
    pub fn set_grad<D>(&self, grad: Array<f32, D>)
    where
        D: Dimension,
    {
        *self.grad_mut() = Some(grad.into_dyn());
    }

    /// Removes the gradient. Optimizers skip parameters without a gradient.
    pub fn clear_grad(&self) {
        *self.grad_mut() = None;
    }

    /// Fills the gradient with zeroes, if present.
    pub fn zero_grad(&self) {
        if let Some(grad) = self.grad_mut().as_mut() {
            grad.fill(0.);
        }
    }

    /// Returns the shape of the parameter's value.
    pub fn shape(&self) -> Vec<usize> {
        self.data().shape().to_vec()
    }

    /// Returns an identifier shared by all the handles to this parameter.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("id", &self.id())
            .field("shape", &self.shape())
            .field("has_grad", &self.grad().is_some())
            .finish()
    }
}

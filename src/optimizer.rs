use std::{
    cell::{Cell, Ref, RefCell},
    collections::HashSet,
    fmt::Debug,
};

use ndarray::ArrayD;
use rayon::iter::{
    IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator, ParallelIterator,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{OptimError, Param};

/// Optimizer internal status trait.
///
/// It is implemented by the hyper-parameters of each algorithm. Every group of parameters owns
/// one status; the learning rate is the only field that may change after the optimizer has been
/// created.
pub trait OptimizerStatus:
    Copy + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// The per-parameter state kept by the algorithm.
    type Param: Optimize<Self>;

    /// Name of the algorithm, recorded in state dictionaries.
    const NAME: &'static str;

    /// Gets the learning rate.
    fn get_lr(&self) -> f32;

    /// Sets the learning rate.
    fn set_lr(&mut self, lr: f32);

    /// Checks the hyper-parameters.
    fn validate(&self) -> Result<(), OptimError>;
}

/// Parameter optimization logic trait.
pub trait Optimize<T>:
    Clone + Debug + PartialEq + Send + Serialize + DeserializeOwned + Sized
{
    /// Creates the state of a parameter, given its value at the time of its first update.
    fn init(status: &T, data: &ArrayD<f32>) -> Self;

    /// Specifies the learning rule for the parameter.
    fn optimize(&mut self, status: &T, data: &mut ArrayD<f32>, grad: &ArrayD<f32>);

    /// Shape of the tensors held by the state.
    fn shape(&self) -> &[usize];
}

/// A group of parameters sharing the same hyper-parameters.
pub struct ParamGroup<T>
where
    T: OptimizerStatus,
{
    params: Vec<Param>,
    status: Cell<T>,
    state: RefCell<Vec<Option<T::Param>>>,
}

impl<T> ParamGroup<T>
where
    T: OptimizerStatus,
{
    /// Creates a new group.
    ///
    /// # Arguments
    ///
    /// * `params` - parameters to optimize.
    ///
    /// * `status` - hyper-parameters used for all the parameters of the group.
    pub fn new(params: Vec<Param>, status: T) -> Self {
        let state = RefCell::new(params.iter().map(|_| None).collect());

        Self {
            params,
            status: Cell::new(status),
            state,
        }
    }

    /// Returns the parameters of the group.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Returns a copy of the hyper-parameters of the group.
    pub fn status(&self) -> T {
        self.status.get()
    }

    /// Returns the learning rate of the group.
    pub fn get_lr(&self) -> f32 {
        self.status.get().get_lr()
    }

    /// Sets a new value for the learning rate of the group.
    pub fn set_lr(&self, lr: f32) {
        let mut status = self.status.get();
        status.set_lr(lr);
        self.status.set(status);
    }

    /// Number of parameters in the group.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if the group holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn check_shapes(&self, group: usize) -> Result<(), OptimError> {
        let state = self.state.borrow();

        for (index, (param, slot)) in self.params.iter().zip(state.iter()).enumerate() {
            let grad = param.grad();
            if let Some(grad) = grad.as_ref() {
                let recorded = slot.as_ref().map(|slot| slot.shape());
                check_shape(group, index, recorded, &param.data(), grad)?;
            }
        }

        Ok(())
    }

    fn step(&self, group: usize) -> Result<(), OptimError> {
        let status = self.status.get();
        let mut state = self.state.borrow_mut();

        state
            .par_iter_mut()
            .zip(self.params.par_iter())
            .enumerate()
            .try_for_each(|(index, (slot, param))| -> Result<(), OptimError> {
                let grad = param.grad();
                let grad = match grad.as_ref() {
                    Some(grad) => grad,
                    None => return Ok(()),
                };
                let mut data = param.data_mut();

                // Another handle may have replaced the gradient since the first pass.
                let recorded = slot.as_ref().map(|slot| slot.shape());
                check_shape(group, index, recorded, &data, grad)?;

                slot.get_or_insert_with(|| T::Param::init(&status, &data))
                    .optimize(&status, &mut data, grad);

                Ok(())
            })
    }
}

/// Checks a gradient, and the state recorded so far, against the value of their parameter.
fn check_shape(
    group: usize,
    index: usize,
    recorded: Option<&[usize]>,
    data: &ArrayD<f32>,
    grad: &ArrayD<f32>,
) -> Result<(), OptimError> {
    if grad.shape() != data.shape() {
        return Err(OptimError::Shape {
            group,
            index,
            expected: data.shape().to_vec(),
            found: grad.shape().to_vec(),
        });
    }

    match recorded {
        Some(recorded) if recorded != data.shape() => Err(OptimError::Shape {
            group,
            index,
            expected: recorded.to_vec(),
            found: data.shape().to_vec(),
        }),
        _ => Ok(()),
    }
}

/// Returns `step` as an exponent for `powi`, saturating at `i32::MAX`.
pub(crate) fn exponent(step: usize) -> i32 {
    i32::try_from(step).unwrap_or(i32::MAX)
}

/// Generic optimization algorithm template.
///
/// It holds one or more [`ParamGroup`] and, for each of their parameters, a lazily created state
/// whose layout depends on the algorithm.
pub struct Optimizer<T>
where
    T: OptimizerStatus,
{
    groups: Vec<ParamGroup<T>>,
}

impl<T> Optimizer<T>
where
    T: OptimizerStatus,
{
    /// Creates a new optimizer with a single group of parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - parameters to optimize.
    ///
    /// * `status` - hyper-parameters of the algorithm.
    ///
    /// # Errors
    ///
    /// Fails with [`OptimError::Config`] if `params` is empty, if a parameter is registered
    /// twice or if any hyper-parameter is out of range.
    pub fn new(params: Vec<Param>, status: T) -> Result<Self, OptimError> {
        Self::with_groups(vec![ParamGroup::new(params, status)])
    }

    /// Creates a new optimizer from several groups of parameters. The groups, and the parameters
    /// within each of them, are updated in the order they are given.
    ///
    /// # Errors
    ///
    /// Fails with [`OptimError::Config`] if there are no groups, if any group is empty, if a
    /// parameter is registered twice or if any group has out of range hyper-parameters.
    pub fn with_groups(groups: Vec<ParamGroup<T>>) -> Result<Self, OptimError> {
        if groups.is_empty() {
            return Err(OptimError::config("params", "[]", "no parameter groups"));
        }

        let mut registered = HashSet::new();
        for (index, group) in groups.iter().enumerate() {
            group.status().validate()?;

            if group.is_empty() {
                return Err(OptimError::config(
                    "params",
                    format!("group {index}"),
                    "empty parameter list",
                ));
            }

            if let Some(param) = group.params.iter().find(|p| !registered.insert(p.id())) {
                return Err(OptimError::config(
                    "params",
                    format!("{param:?}"),
                    "parameter registered more than once",
                ));
            }
        }

        tracing::debug!(
            optimizer = T::NAME,
            groups = groups.len(),
            params = registered.len(),
            "created optimizer"
        );

        Ok(Self { groups })
    }

    /// Returns the groups of this optimizer.
    pub fn groups(&self) -> &[ParamGroup<T>] {
        &self.groups
    }

    /// Returns the group at `index`, if any.
    pub fn group(&self, index: usize) -> Option<&ParamGroup<T>> {
        self.groups.get(index)
    }

    /// Returns the learning rate of the first group.
    pub fn get_lr(&self) -> f32 {
        self.groups[0].get_lr()
    }

    /// Sets a new value for the learning rate of every group.
    pub fn set_lr(&self, lr: f32) {
        self.groups.iter().for_each(|group| group.set_lr(lr));
    }

    /// Returns the state of the parameter at `index` within `group`. The state is `None` until the
    /// parameter gets its first update.
    ///
    /// The returned reference must be dropped before calling [`.step()`](Self::step()) or
    /// [`.load_state_dict()`](Self::load_state_dict()), which would otherwise panic.
    pub fn state(&self, group: usize, index: usize) -> Option<Ref<'_, T::Param>> {
        let state = self.groups.get(group)?.state.borrow();
        Ref::filter_map(state, |state| state.get(index)?.as_ref()).ok()
    }

    /// Performs a single optimization step. It applies the learning rule to all the registered
    /// parameters that have a gradient; the others are left untouched.
    ///
    /// # Errors
    ///
    /// Fails with [`OptimError::Shape`] if a gradient doesn't match its parameter. Shapes are all
    /// checked before any update takes place, so that on failure no value nor state is modified.
    ///
    /// Each parameter is checked once more while it is locked for its update. If a gradient is
    /// replaced by another handle in the meantime, the step still fails with
    /// [`OptimError::Shape`], but the parameters updated before the failure keep their new
    /// values.
    pub fn step(&self) -> Result<(), OptimError> {
        for (index, group) in self.groups.iter().enumerate() {
            group.check_shapes(index)?;
        }

        tracing::trace!(optimizer = T::NAME, "step");
        self.groups
            .iter()
            .enumerate()
            .try_for_each(|(index, group)| group.step(index))
    }

    /// Evaluates `closure`, which typically recomputes the loss and the gradients, and then
    /// performs a single optimization step. Returns the value produced by the closure.
    pub fn step_with<F>(&self, closure: F) -> Result<f32, OptimError>
    where
        F: FnOnce() -> f32,
    {
        let loss = closure();
        self.step()?;

        Ok(loss)
    }

    /// Zeroes the gradients of all the parameters registered in this optimizer.
    pub fn zero_grad(&self) {
        self.groups
            .iter()
            .flat_map(|group| group.params.iter())
            .for_each(Param::zero_grad);
    }

    /// Exports the hyper-parameters of every group together with the state of every parameter.
    /// Parameters are identified by their position.
    pub fn state_dict(&self) -> StateDict<T> {
        let groups = self
            .groups
            .iter()
            .map(|group| GroupState {
                status: group.status(),
                state: group.state.borrow().clone(),
            })
            .collect();

        StateDict {
            optimizer: T::NAME.to_string(),
            groups,
        }
    }

    /// Restores a state previously exported with [`.state_dict()`](Self::state_dict()).
    ///
    /// # Errors
    ///
    /// Fails with [`OptimError::StateDict`] if the dictionary was produced by another algorithm,
    /// if its layout doesn't match the groups of this optimizer, if any recorded state doesn't
    /// match the shape of its parameter or if its hyper-parameters are invalid. Nothing is
    /// modified on failure.
    pub fn load_state_dict(&self, state_dict: StateDict<T>) -> Result<(), OptimError> {
        if state_dict.optimizer != T::NAME {
            return Err(OptimError::StateDict(format!(
                "cannot load {} state into {}",
                state_dict.optimizer,
                T::NAME
            )));
        }

        if state_dict.groups.len() != self.groups.len() {
            return Err(OptimError::StateDict(format!(
                "expected {} groups, found {}",
                self.groups.len(),
                state_dict.groups.len()
            )));
        }

        for (index, (group, saved)) in self.groups.iter().zip(&state_dict.groups).enumerate() {
            if saved.state.len() != group.len() {
                return Err(OptimError::StateDict(format!(
                    "expected {} parameters in group {index}, found {}",
                    group.len(),
                    saved.state.len()
                )));
            }

            saved
                .status
                .validate()
                .map_err(|err| OptimError::StateDict(format!("group {index}: {err}")))?;

            let mismatch = group
                .params
                .iter()
                .zip(&saved.state)
                .position(|(param, slot)| {
                    slot.as_ref()
                        .map_or(false, |slot| slot.shape() != param.data().shape())
                });
            if let Some(position) = mismatch {
                return Err(OptimError::StateDict(format!(
                    "state of parameter {position} of group {index} doesn't match its shape"
                )));
            }
        }

        for (group, saved) in self.groups.iter().zip(state_dict.groups) {
            group.status.set(saved.status);
            *group.state.borrow_mut() = saved.state;
        }

        tracing::debug!(optimizer = T::NAME, "loaded state dict");

        Ok(())
    }
}

/// Serializable snapshot of an optimizer, see [`Optimizer::state_dict()`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StateDict<T>
where
    T: OptimizerStatus,
{
    /// Name of the algorithm that produced the snapshot.
    pub optimizer: String,
    /// One entry per group, in registration order.
    pub groups: Vec<GroupState<T>>,
}

/// Snapshot of a single group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct GroupState<T>
where
    T: OptimizerStatus,
{
    /// Hyper-parameters of the group.
    pub status: T,
    /// State of each parameter of the group, in registration order.
    pub state: Vec<Option<T::Param>>,
}

#[cfg(test)]
mod test {
    use super::{exponent, OptimError, Optimizer};
    use crate::{AdamW, Param};
    use ndarray::array;

    #[test]
    fn gradient_replaced_between_check_and_update() {
        let (first, second) = (Param::new(array![1., 2.]), Param::new(array![3., 4.]));
        let optim = Optimizer::new(vec![first.clone(), second.clone()], AdamW::default()).unwrap();
        let group = &optim.groups()[0];

        first.set_grad(array![1., 1.]);
        second.set_grad(array![1., 1.]);
        group.check_shapes(0).unwrap();

        second.set_grad(array![1., 1., 1.]);
        let result = group.step(0);

        assert_eq!(
            result,
            Err(OptimError::Shape {
                group: 0,
                index: 1,
                expected: vec![2],
                found: vec![3],
            })
        );
        assert_eq!(*second.data(), array![3_f32, 4.].into_dyn());
        assert!(optim.state(0, 1).is_none());
    }

    #[test]
    fn exponent_saturates() {
        assert_eq!(exponent(3), 3);
        assert_eq!(exponent(i32::MAX as usize), i32::MAX);
        assert_eq!(exponent(usize::MAX), i32::MAX);

        let bias_correction = 1.0 - 0.9_f32.powi(exponent(usize::MAX));
        assert_eq!(bias_correction, 1.0);
    }
}

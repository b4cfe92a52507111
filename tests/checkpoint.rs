use ndarray::{arr1, Array, Array1, Array2};
use ndarray_rand::{
    rand::{rngs::StdRng, SeedableRng},
    rand_distr::Uniform,
    RandomExt,
};
use neuronika_adaptive::{
    AdaBelief, AdaBound, AdamW, OptimError, Optimizer, OptimizerStatus, Param, ParamGroup,
    StateDict, MADGRAD, Yogi,
};

const STEPS: usize = 10;

type Gradients = Vec<(Array2<f32>, Array1<f32>)>;

fn params(rng: &mut StdRng) -> Vec<Param> {
    vec![
        Param::new(Array::random_using((2, 3), Uniform::new(-1., 1.), rng)),
        Param::new(Array::random_using(4, Uniform::new(-1., 1.), rng)),
        // Never receives a gradient.
        Param::new(arr1(&[1., 2.])),
    ]
}

fn copy(params: &[Param]) -> Vec<Param> {
    params
        .iter()
        .map(|param| Param::new(param.data().clone()))
        .collect()
}

fn gradients(rng: &mut StdRng) -> Gradients {
    (0..STEPS)
        .map(|_| {
            (
                Array::random_using((2, 3), Uniform::new(-5., 5.), rng),
                Array::random_using(4, Uniform::new(-5., 5.), rng),
            )
        })
        .collect()
}

fn train<T>(optim: &Optimizer<T>, params: &[Param], grads: &Gradients)
where
    T: OptimizerStatus,
{
    for (first, second) in grads {
        params[0].set_grad(first.clone());
        params[1].set_grad(second.clone());
        optim.step().unwrap();
    }
}

fn assert_same_values(left: &[Param], right: &[Param]) {
    for (left, right) in left.iter().zip(right) {
        assert_eq!(*left.data(), *right.data());
    }
}

/// Trains an optimizer, moves its state into a fresh one through `transfer` and checks that both
/// produce identical updates afterwards.
fn resume<T, F>(status: T, transfer: F)
where
    T: OptimizerStatus,
    F: Fn(StateDict<T>) -> StateDict<T>,
{
    let mut rng = StdRng::seed_from_u64(7);
    let original = params(&mut rng);
    let optim = Optimizer::new(original.clone(), status).unwrap();

    train(&optim, &original, &gradients(&mut rng));

    let restored = copy(&original);
    let other = Optimizer::new(restored.clone(), status).unwrap();
    other.load_state_dict(transfer(optim.state_dict())).unwrap();

    assert_eq!(other.state_dict(), optim.state_dict());

    let grads = gradients(&mut rng);
    train(&optim, &original, &grads);
    train(&other, &restored, &grads);

    assert_same_values(&original, &restored);
    assert_eq!(other.state_dict(), optim.state_dict());
    assert!(optim.state(0, 2).is_none());
}

fn through_json<T>(state_dict: StateDict<T>) -> StateDict<T>
where
    T: OptimizerStatus,
{
    let json = serde_json::to_string(&state_dict).unwrap();
    serde_json::from_str(&json).unwrap()
}

#[test]
fn adamw_in_memory() {
    resume(AdamW::default().with_amsgrad(), |state_dict| state_dict);
}

#[test]
fn adamw_json() {
    resume(AdamW::default(), through_json);
}

#[test]
fn adabound_json() {
    resume(AdaBound::default().with_amsbound(), through_json);
}

#[test]
fn yogi_json() {
    resume(Yogi::default(), through_json);
}

#[test]
fn adabelief_json() {
    let status = AdaBelief::default()
        .with_rectify()
        .with_amsgrad()
        .with_weight_decouple(false);
    resume(status, through_json);
}

#[test]
fn madgrad_json() {
    resume(MADGRAD::default(), through_json);
}

#[test]
fn hyperparameters_are_restored() {
    let optim = Optimizer::new(vec![Param::new(arr1(&[1.]))], AdaBound::default()).unwrap();
    optim.set_lr(1e-4);

    let other = Optimizer::new(vec![Param::new(arr1(&[1.]))], AdaBound::default()).unwrap();
    other.load_state_dict(through_json(optim.state_dict())).unwrap();

    let status = other.groups()[0].status();
    assert!((status.get_lr() - 1e-4).abs() <= f32::EPSILON);
    assert!((status.get_base_lr() - 1e-3).abs() <= f32::EPSILON);
}

fn assert_rejected<T>(optim: &Optimizer<T>, state_dict: StateDict<T>)
where
    T: OptimizerStatus,
{
    let before = optim.state_dict();

    assert!(matches!(
        optim.load_state_dict(state_dict),
        Err(OptimError::StateDict(_))
    ));
    assert_eq!(optim.state_dict(), before);
}

fn trained(params: Vec<Param>) -> Optimizer<AdamW> {
    for param in &params {
        let grad = param.data().mapv(|el| el * 0.5);
        param.set_grad(grad);
    }

    let optim = Optimizer::new(params, AdamW::default()).unwrap();
    optim.step().unwrap();
    optim
}

#[test]
fn wrong_algorithm() {
    let optim = trained(vec![Param::new(arr1(&[1., 2.]))]);
    let mut state_dict = optim.state_dict();
    state_dict.optimizer = "Adam".to_string();

    assert_rejected(&optim, state_dict);
}

#[test]
fn wrong_group_count() {
    let source = Optimizer::with_groups(vec![
        ParamGroup::new(vec![Param::new(arr1(&[1., 2.]))], AdamW::default()),
        ParamGroup::new(vec![Param::new(arr1(&[3.]))], AdamW::default()),
    ])
    .unwrap();
    let optim = trained(vec![Param::new(arr1(&[1., 2.]))]);

    assert_rejected(&optim, source.state_dict());
}

#[test]
fn wrong_param_count() {
    let source = trained(vec![Param::new(arr1(&[1., 2.])), Param::new(arr1(&[3.]))]);
    let optim = trained(vec![Param::new(arr1(&[1., 2.]))]);

    assert_rejected(&optim, source.state_dict());
}

#[test]
fn wrong_shape() {
    let source = trained(vec![Param::new(arr1(&[1., 2., 3.]))]);
    let optim = trained(vec![Param::new(arr1(&[1., 2.]))]);

    assert_rejected(&optim, source.state_dict());
}

#[test]
fn invalid_hyperparameters() {
    let optim = trained(vec![Param::new(arr1(&[1., 2.]))]);
    let mut state_dict = optim.state_dict();
    state_dict.groups[0].status = AdamW::new(-1., (0.9, 0.999), 0.0, 1e-8);

    assert_rejected(&optim, state_dict);
}

#[test]
fn empty_slots_are_loadable() {
    let param = Param::new(arr1(&[1., 2., 3.]));
    let source = trained(vec![param]);
    let mut state_dict = source.state_dict();

    let target = Param::new(arr1(&[1., 2.]));
    let optim = Optimizer::new(vec![target.clone()], AdamW::default()).unwrap();
    assert!(optim.load_state_dict(state_dict.clone()).is_err());

    // A parameter without state matches any shape.
    state_dict.groups[0].state[0] = None;
    optim.load_state_dict(state_dict).unwrap();

    target.set_grad(arr1(&[1., 1.]));
    optim.step().unwrap();
    assert_eq!(optim.state(0, 0).unwrap().get_step(), 1);
}

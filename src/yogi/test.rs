use ndarray::{arr1, array};

use super::{super::OptimError, sign, Yogi};
use crate::{Optimizer, Param};

fn value(param: &Param) -> f32 {
    param.data()[[0]]
}

#[test]
fn creation() {
    let optim = Optimizer::new(vec![Param::new(arr1(&[1.]))], Yogi::default()).unwrap();
    let status = optim.groups()[0].status();

    assert!((status.get_lr() - 1e-2).abs() <= f32::EPSILON);
    assert!((status.get_eps() - 1e-3).abs() <= f32::EPSILON);
    assert!((status.get_initial_accumulator() - 1e-6).abs() <= f32::EPSILON);
    assert_eq!(status.get_betas(), (0.9, 0.999));
    assert_eq!(status.get_weight_decay(), 0.);
}

#[test]
fn set_lr() {
    let optim = Optimizer::new(vec![Param::new(arr1(&[1.]))], Yogi::default()).unwrap();

    optim.set_lr(1e-4);
    assert!((optim.get_lr() - 1e-4).abs() <= f32::EPSILON);
}

#[test]
fn invalid_hyperparameters() {
    let invalid = [
        Yogi::new(-1e-2, (0.9, 0.999), 0.0, 1e-3),
        Yogi::new(1e-2, (1.1, 0.999), 0.0, 1e-3),
        Yogi::new(1e-2, (0.9, 0.999), -0.1, 1e-3),
        Yogi::new(1e-2, (0.9, 0.999), 0.0, -1e-3),
        Yogi::default().with_initial_accumulator(-1.),
    ];

    for status in invalid {
        let result = Optimizer::new(vec![Param::new(arr1(&[1.]))], status);
        assert!(matches!(result, Err(OptimError::Config { .. })), "{status:?}");
    }
}

#[test]
fn sign_of_zero() {
    assert_eq!(sign(2.), 1.);
    assert_eq!(sign(-0.5), -1.);
    assert_eq!(sign(0.), 0.);
    assert_eq!(sign(-0.), 0.);
}

#[test]
fn accumulators_start_from_initial_value() {
    // With a zero gradient the second moment is left untouched and the first one only decays.
    let param = Param::new(arr1(&[1.]));
    let optim = Optimizer::new(vec![param.clone()], Yogi::default()).unwrap();

    param.set_grad(arr1(&[0.]));
    optim.step().unwrap();

    let state = optim.state(0, 0).unwrap();
    assert_eq!(state.get_step(), 1);
    assert_eq!(state.get_exp_avg_sq()[[0]], 1e-6);
    assert!((state.get_exp_avg()[[0]] - 9e-7).abs() <= 1e-12);
}

#[test]
fn second_moment_moves_towards_squared_gradient() {
    let (small, large) = (Param::new(arr1(&[0.])), Param::new(arr1(&[0.])));
    let status = Yogi::default().with_initial_accumulator(0.5);
    let optim = Optimizer::new(vec![small.clone(), large.clone()], status).unwrap();

    small.set_grad(arr1(&[0.1]));
    large.set_grad(arr1(&[1.]));
    optim.step().unwrap();

    // v = 0.5 + 0.001 * 1, it grows since g² > v.
    let state = optim.state(0, 1).unwrap();
    assert!((state.get_exp_avg()[[0]] - 0.55).abs() <= 1e-6);
    assert!((state.get_exp_avg_sq()[[0]] - 0.501).abs() <= 1e-6);
    drop(state);

    // v = 0.5 - 0.001 * 0.01, it shrinks since g² < v.
    let state = optim.state(0, 0).unwrap();
    assert!((state.get_exp_avg()[[0]] - 0.46).abs() <= 1e-6);
    assert!((state.get_exp_avg_sq()[[0]] - 0.49999).abs() <= 1e-6);
    assert!(state.get_exp_avg_sq()[[0]] < 0.5);
}

#[test]
fn second_moment_unchanged_on_match() {
    let param = Param::new(arr1(&[0.]));
    let status = Yogi::default().with_initial_accumulator(0.25);
    let optim = Optimizer::new(vec![param.clone()], status).unwrap();

    param.set_grad(arr1(&[0.5]));
    optim.step().unwrap();

    assert_eq!(optim.state(0, 0).unwrap().get_exp_avg_sq()[[0]], 0.25);
}

#[test]
fn skips_missing_gradients() {
    let (with_grad, without_grad) = (Param::new(array![1., 2.]), Param::new(array![3., 4.]));
    let params = vec![with_grad.clone(), without_grad.clone()];
    let optim = Optimizer::new(params, Yogi::default()).unwrap();

    with_grad.set_grad(array![1., -1.]);
    optim.step().unwrap();

    assert_eq!(*without_grad.data(), array![3_f32, 4.].into_dyn());
    assert!(optim.state(0, 1).is_none());
    assert!(with_grad.data()[[0]] < 1.);
    assert!(with_grad.data()[[1]] > 2.);
}

const EPOCHS: usize = 200;

#[test]
fn step() {
    let x = Param::new(arr1(&[3.]));
    let optim = Optimizer::new(vec![x.clone()], Yogi::default()).unwrap();

    for _ in 0..EPOCHS {
        // Gradient of 0.5 * x².
        let grad = x.data().clone();
        x.set_grad(grad);

        optim.step().unwrap();
    }

    assert!(value(&x).abs() < 3.);
    assert_eq!(optim.state(0, 0).unwrap().get_step(), EPOCHS);
}

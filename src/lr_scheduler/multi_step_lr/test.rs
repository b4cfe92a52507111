use ndarray::arr1;

use crate::{MADGRAD, Optimizer, Param};

use super::{super::LRScheduler, MultiStepLR};

#[test]
fn multistep_lr() {
    const EPOCHS: usize = 5;
    let status = MADGRAD::new(1.0, 0.9, 0.0, 1e-6);
    let optim = Optimizer::new(vec![Param::new(arr1(&[1.]))], status).unwrap();
    let scheduler = MultiStepLR::new(&optim, vec![1, 2, 3, 4], 2.);

    scheduler.set_current_epoch(5);
    assert_eq!(scheduler.get_current_epoch(), 5);
    scheduler.set_current_epoch(0);
    assert_eq!(scheduler.get_current_epoch(), 0);

    for epoch in 0..EPOCHS {
        optim.zero_grad();
        optim.step().unwrap();
        assert_eq!(scheduler.get_current_epoch(), epoch);
        scheduler.step();
        scheduler.print_lr();
    }
    assert!((scheduler.get_last_lr() - 16_f32).abs() <= f32::EPSILON);
    assert!((scheduler.get_current_lr() - 16_f32).abs() <= f32::EPSILON); // Should be 2^4.
    assert!((optim.get_lr() - 16_f32).abs() <= f32::EPSILON);
}

#[test]
fn multistep_lr_unordered_milestones() {
    let status = MADGRAD::new(1.0, 0.9, 0.0, 1e-6);
    let optim = Optimizer::new(vec![Param::new(arr1(&[1.]))], status).unwrap();
    let scheduler = MultiStepLR::new(&optim, vec![5, 2], 0.5);

    for _ in 0..4 {
        scheduler.step();
    }
    assert!((optim.get_lr() - 0.5).abs() <= f32::EPSILON);

    scheduler.set_gamma(0.1);
    scheduler.step();
    assert!((optim.get_lr() - 0.05).abs() <= f32::EPSILON);
}

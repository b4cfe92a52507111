use ndarray::arr1;
use neuronika_adaptive::{
    AdaBelief, AdaBound, AdamW, Optimizer, OptimizerStatus, Param, MADGRAD, Yogi,
};

const EPOCHS: usize = 400;

/// Logarithm of a sum of three squared terms. The middle term is either the one of the Beale
/// function, `2.25 - x + xy²`, whose minimum is at (3, 0.5), or its variant `2.25 - x - xy²`.
#[derive(Clone, Copy)]
enum Objective {
    Beale,
    NegatedMiddle,
}

impl Objective {
    fn middle_sign(self) -> f32 {
        match self {
            Objective::Beale => 1.,
            Objective::NegatedMiddle => -1.,
        }
    }

    fn terms(self, x: f32, y: f32) -> (f32, f32, f32) {
        (
            1.5 - x + x * y,
            2.25 - x + self.middle_sign() * x * y.powi(2),
            2.625 - x + x * y.powi(3),
        )
    }

    fn loss(self, x: f32, y: f32) -> f32 {
        let (a, b, c) = self.terms(x, y);
        (a.powi(2) + b.powi(2) + c.powi(2)).ln()
    }

    fn gradient(self, x: f32, y: f32) -> (f32, f32) {
        let (a, b, c) = self.terms(x, y);
        let sign = self.middle_sign();
        let sum = a.powi(2) + b.powi(2) + c.powi(2);

        let dx = 2. * a * (y - 1.) + 2. * b * (sign * y.powi(2) - 1.) + 2. * c * (y.powi(3) - 1.);
        let dy = 2. * a * x + 4. * sign * b * x * y + 6. * c * x * y.powi(2);

        (dx / sum, dy / sum)
    }
}

/// Runs the optimizer from (3, 3) and returns the initial and the final loss.
fn minimize<T>(objective: Objective, status: T) -> (f32, f32)
where
    T: OptimizerStatus,
{
    let (x, y) = (Param::new(arr1(&[3.])), Param::new(arr1(&[3.])));
    let optim = Optimizer::new(vec![x.clone(), y.clone()], status).unwrap();

    let value = |param: &Param| param.data()[[0]];
    let first_value = objective.loss(value(&x), value(&y));

    for _ in 0..EPOCHS {
        let current = optim
            .step_with(|| {
                let (dx, dy) = objective.gradient(value(&x), value(&y));
                x.set_grad(arr1(&[dx]));
                y.set_grad(arr1(&[dy]));

                objective.loss(value(&x), value(&y))
            })
            .unwrap();
        assert!(current.is_finite());
    }

    (first_value, objective.loss(value(&x), value(&y)))
}

fn assert_decreases<T>(status: T)
where
    T: OptimizerStatus,
{
    for objective in [Objective::Beale, Objective::NegatedMiddle] {
        let (first, last) = minimize(objective, status);
        assert!(last < first, "{first} -> {last}");
    }
}

#[test]
fn gradient_matches_finite_differences() {
    let (x, y) = (1.5_f64, -0.5_f64);
    let h = 1e-3;

    for objective in [Objective::Beale, Objective::NegatedMiddle] {
        let loss64 = |x: f64, y: f64| objective.loss(x as f32, y as f32) as f64;

        let (dx, dy) = objective.gradient(x as f32, y as f32);
        let numeric_dx = (loss64(x + h, y) - loss64(x - h, y)) / (2. * h);
        let numeric_dy = (loss64(x, y + h) - loss64(x, y - h)) / (2. * h);

        assert!((dx as f64 - numeric_dx).abs() <= 1e-2);
        assert!((dy as f64 - numeric_dy).abs() <= 1e-2);
    }
}

#[test]
fn adamw() {
    assert_decreases(AdamW::new(1e-2, (0.9, 0.999), 0.0, 1e-8));
}

#[test]
fn adamw_amsgrad() {
    assert_decreases(AdamW::new(1e-2, (0.9, 0.999), 0.0, 1e-8).with_amsgrad());
}

#[test]
fn adabound() {
    assert_decreases(AdaBound::new(1e-2, (0.9, 0.999), 0.1, 1e-3, 0.0, 1e-8));
}

#[test]
fn yogi() {
    assert_decreases(Yogi::new(1e-2, (0.9, 0.999), 0.0, 1e-3));
}

#[test]
fn adabelief() {
    assert_decreases(AdaBelief::new(1e-2, (0.9, 0.999), 0.0, 1e-16));
}

#[test]
fn adabelief_rectified() {
    let status = AdaBelief::new(1e-2, (0.9, 0.999), 0.0, 1e-16)
        .with_rectify()
        .with_amsgrad();
    assert_decreases(status);
}

#[test]
fn madgrad() {
    assert_decreases(MADGRAD::new(1e-2, 0.9, 0.0, 1e-6));
}

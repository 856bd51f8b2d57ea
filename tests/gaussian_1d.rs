//! Sampling a standard Gaussian target on a bounded interval.

use nalgebra::{DMatrix, DVector};
use rv::dist::Gaussian;
use rv::misc::ks_test;
use rv::traits::Cdf;

use ptmcmc::steppers;
use ptmcmc::utils::{mean, multiple_tries, variance};
use ptmcmc::{Chain, FnModel, ForwardModel, ParamSpec, Problem};

fn gauss_problem() -> Problem {
    Problem::new(
        vec![ParamSpec::new("theta", -10.0, 10.0, 5.0, 1.0)],
        DMatrix::zeros(1, 2),
    )
    .unwrap()
}

fn gauss_model() -> impl ForwardModel {
    FnModel::new(|params: &DVector<f64>, _: &DMatrix<f64>| -params[0] * params[0] / 2.0)
}

fn draw_sample(seed: u64, steps: usize) -> Vec<f64> {
    let problem = gauss_problem();
    let model = gauss_model();
    let mut chain = Chain::from_problem(&problem, seed);
    chain.update_prob(&model);
    chain.check_best();

    let mut thetas = Vec::with_capacity(steps);
    for _ in 0..steps {
        steppers::step(&mut chain, &model);
        thetas.push(chain.param(0));
    }
    thetas
}

#[test]
fn moments_match_the_target() {
    let _ = env_logger::try_init();
    let passed = multiple_tries(5, |i| {
        let thetas = draw_sample(0x7074 + i as u64, 10_000);
        let m = mean(&thetas);
        let v = variance(&thetas);
        println!("attempt {}: mean = {:.4}, variance = {:.4}", i, m, v);
        m > -0.1 && m < 0.1 && v > 0.9 && v < 1.1
    });
    assert!(passed, "sample moments repeatedly missed the target");
}

#[test]
fn thinned_sample_passes_a_ks_test() {
    let _ = env_logger::try_init();
    let target = Gaussian::standard();
    let passed = multiple_tries(5, |i| {
        let thetas = draw_sample(0xC0FFEE + i as u64, 20_000);
        // discard the walk-in from theta = 5 and decorrelate
        let thinned: Vec<f64> = thetas[2000..].iter().step_by(25).cloned().collect();
        let (stat, p) = ks_test(&thinned, |x| target.cdf(&x));
        println!("attempt {}: ks stat = {:.4}, p = {:.4}", i, stat, p);
        p > 0.01
    });
    assert!(passed, "thinned sample repeatedly failed the KS test");
}

#[test]
fn best_point_tracks_the_mode() {
    let problem = gauss_problem();
    let model = gauss_model();
    let mut chain = Chain::from_problem(&problem, 51);
    chain.update_prob(&model);
    chain.check_best();

    for _ in 0..5000 {
        steppers::step(&mut chain, &model);
        chain.check_best();
    }
    assert!(chain.prob_best() >= chain.prob());
    assert!(chain.params_best()[0].abs() < 0.5);
}

//! One Metropolis transition, joint or per-parameter.

use log::trace;
use rand::Rng;

use crate::chain::{Chain, Extension};
use crate::config::Settings;
use crate::model::ForwardModel;
use crate::utils::{clamp, wrap_into};

/// Outcome of a Metropolis transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MHStatus {
    /// The proposal was taken.
    Accepted,
    /// The previous state was restored.
    Rejected,
}

impl MHStatus {
    pub fn accepted(self) -> bool {
        self == MHStatus::Accepted
    }
}

/// Draw a new value for parameter `i` and write it into the chain.
///
/// Non-circular parameters redraw until the proposal lands inside the
/// prior interval; circular parameters wrap around instead.
fn propose_for<R: Rng, X: Extension>(chain: &mut Chain<R, X>, i: usize) {
    let step = chain.step_width(i);
    let old_value = chain.param(i);
    let min = chain.params_min()[i];
    let max = chain.params_max()[i];

    let mut new_value = old_value + chain.next_gauss(step);
    if chain.is_circular(i) {
        if new_value > max || new_value < min {
            new_value = wrap_into(new_value, min, max);
        }
    } else {
        while new_value > max || new_value < min {
            trace!("proposal for {} left the prior interval, redrawing", i);
            new_value = old_value + chain.next_gauss(step);
        }
    }
    debug_assert!(new_value >= min && new_value <= max);
    chain.set_param(i, new_value);
}

/// Metropolis accept rule in log space.
fn check_accept<R: Rng, X: Extension>(chain: &mut Chain<R, X>, prob_old: f64) -> bool {
    let prob_new = chain.prob();
    if prob_new >= prob_old {
        return true;
    }
    chain.next_log_uniform() < prob_new - prob_old
}

/// One joint transition: perturb every parameter, then accept or
/// restore the previous state.
pub fn step<R, X, M>(chain: &mut Chain<R, X>, model: &M) -> MHStatus
where
    R: Rng,
    X: Extension,
    M: ForwardModel + ?Sized,
{
    let prob_old = chain.prob();
    let prior_old = chain.prior();
    let old_params = chain.params().clone();

    chain.check();
    for i in 0..chain.n_par() {
        propose_for(chain, i);
    }
    chain.update_prob(model);

    if check_accept(chain, prob_old) {
        chain.record_accept_all();
        MHStatus::Accepted
    } else {
        chain.set_params(old_params);
        chain.set_prob(prob_old);
        chain.set_prior(prior_old);
        chain.record_reject_all();
        MHStatus::Rejected
    }
}

/// One transition that perturbs only parameter `index`.
///
/// The model is told which parameter changed and its previous value so
/// it may recompute the likelihood partially.
pub fn step_for<R, X, M>(chain: &mut Chain<R, X>, model: &M, index: usize) -> MHStatus
where
    R: Rng,
    X: Extension,
    M: ForwardModel + ?Sized,
{
    let prob_old = chain.prob();
    let prior_old = chain.prior();
    let old_value = chain.param(index);

    chain.check();
    propose_for(chain, index);
    chain.update_prob_for(model, index, old_value);

    if check_accept(chain, prob_old) {
        chain.record_accept_for(index);
        MHStatus::Accepted
    } else {
        chain.set_param(index, old_value);
        chain.set_prob(prob_old);
        chain.set_prior(prior_old);
        chain.record_reject_for(index);
        MHStatus::Rejected
    }
}

/// Stochastic step-width update after a transition.
///
/// Nudges every step width towards the target acceptance rate with a
/// magnitude that decays as `1/sqrt(n)`, keeping each width inside
/// `[MINIMAL_STEPWIDTH, MAXIMAL_STEPWIDTH]` times the parameter range.
pub fn adapt_stepwidth<R, X>(chain: &mut Chain<R, X>, settings: &Settings, prob_old: f64)
where
    R: Rng,
    X: Extension,
{
    let alpha = (chain.prob() - prob_old).exp().min(1.0);
    for i in 0..chain.n_par() {
        let scale = chain.range(i);
        let low = settings.minimal_stepwidth * scale;
        let high = settings.maximal_stepwidth * scale;

        let decay = (chain.n_iter().max(1) as f64).sqrt();
        let nudge = chain.next_uniform() / decay * (alpha - settings.target_acceptance_rate);
        let step = chain.step_width(i) + nudge * scale;
        chain.set_step_width(i, clamp(step, low, high));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::io::{ParamSpec, Problem};
    use crate::model::{FnModel, ForwardModel};
    use nalgebra::{DMatrix, DVector};
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    #[test]
    fn rejected_steps_restore_state_exactly() {
        let model = gauss_model();
        let mut chain = Chain::from_problem(&gauss_problem(), 42);
        chain.update_prob(&model);
        chain.check_best();

        let mut saw_reject = false;
        for _ in 0..200 {
            let params_before = chain.params().clone();
            let prob_before = chain.prob();
            let best_before = chain.prob_best();
            let rejects_before = chain.rejects_for(0);

            if let MHStatus::Rejected = step(&mut chain, &model) {
                saw_reject = true;
                assert_eq!(chain.params(), &params_before);
                assert_eq!(chain.prob().to_bits(), prob_before.to_bits());
                assert_eq!(chain.prob_best().to_bits(), best_before.to_bits());
                assert_eq!(chain.rejects_for(0), rejects_before + 1);
            }
        }
        assert!(saw_reject, "no rejection in 200 steps from the tail");
    }

    #[test]
    fn every_step_counts_exactly_one_proposal() {
        let model = gauss_model();
        let mut chain = Chain::from_problem(&gauss_problem(), 7);
        chain.update_prob(&model);

        for expected in 1..=100u64 {
            step(&mut chain, &model);
            assert_eq!(chain.accepts_for(0) + chain.rejects_for(0), expected);
            assert_eq!(chain.n_iter(), expected);
        }
    }

    #[test]
    fn per_parameter_step_touches_only_its_counter() {
        let problem = Problem::new(
            vec![
                ParamSpec::new("a", -1.0, 1.0, 0.0, 0.2),
                ParamSpec::new("b", -1.0, 1.0, 0.0, 0.2),
            ],
            DMatrix::zeros(1, 2),
        )
        .unwrap();
        let model = FnModel::new(|params: &DVector<f64>, _: &DMatrix<f64>| {
            -(params[0] * params[0] + params[1] * params[1])
        });
        let mut chain = Chain::from_problem(&problem, 11);
        chain.update_prob(&model);

        for _ in 0..50 {
            step_for(&mut chain, &model, 1);
        }
        assert_eq!(chain.accepts_for(0) + chain.rejects_for(0), 0);
        assert_eq!(chain.accepts_for(1) + chain.rejects_for(1), 50);
    }

    #[test]
    fn proposals_stay_inside_the_prior_interval() {
        let model = gauss_model();
        let mut chain = Chain::from_problem(&gauss_problem(), 3);
        // wide steps so boundary handling is exercised
        chain.set_step_width(0, 15.0);
        chain.update_prob(&model);

        for _ in 0..500 {
            step(&mut chain, &model);
            let theta = chain.param(0);
            assert!(theta >= -10.0 && theta <= 10.0);
        }
    }

    #[test]
    fn circular_parameters_wrap_instead_of_redrawing() {
        let problem = Problem::new(
            vec![ParamSpec::new("phi", 0.0, 2.0 * PI, 6.0, 1.5).circular()],
            DMatrix::zeros(1, 2),
        )
        .unwrap();
        let model = FnModel::new(|_: &DVector<f64>, _: &DMatrix<f64>| 0.0);
        let mut chain = Chain::from_problem(&problem, 5);
        chain.update_prob(&model);

        for _ in 0..500 {
            step(&mut chain, &model);
            let phi = chain.param(0);
            assert!(phi >= 0.0 && phi <= 2.0 * PI);
        }
        // a flat target accepts everything, so the walk must have wrapped
        assert_eq!(chain.accepts_for(0), 500);
    }

    struct CountingModel {
        full: AtomicUsize,
        partial: AtomicUsize,
    }

    impl ForwardModel for CountingModel {
        fn log_likelihood(&self, _: &DVector<f64>, _: &DMatrix<f64>) -> f64 {
            self.full.fetch_add(1, Ordering::Relaxed);
            0.0
        }

        fn log_likelihood_for(
            &self,
            _: &DVector<f64>,
            _: &DMatrix<f64>,
            _index: usize,
            _old_value: f64,
        ) -> f64 {
            self.partial.fetch_add(1, Ordering::Relaxed);
            0.0
        }
    }

    #[test]
    fn per_parameter_step_uses_the_partial_callback() {
        let model = CountingModel {
            full: AtomicUsize::new(0),
            partial: AtomicUsize::new(0),
        };
        let mut chain = Chain::from_problem(&gauss_problem(), 13);
        chain.update_prob(&model);
        assert_eq!(model.full.load(Ordering::Relaxed), 1);

        step_for(&mut chain, &model, 0);
        assert_eq!(model.full.load(Ordering::Relaxed), 1);
        assert_eq!(model.partial.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn adapt_stepwidth_respects_the_clamps() {
        let model = gauss_model();
        let settings = Settings::default();
        let mut chain = Chain::from_problem(&gauss_problem(), 23);
        chain.update_prob(&model);
        step(&mut chain, &model);

        chain.set_step_width(0, 1e-12);
        let prob_old = chain.prob() - 1.0;
        adapt_stepwidth(&mut chain, &settings, prob_old);
        assert!(chain.step_width(0) >= settings.minimal_stepwidth * chain.range(0));

        chain.set_step_width(0, 1e12);
        let prob_old = chain.prob() + 1.0;
        adapt_stepwidth(&mut chain, &settings, prob_old);
        assert!(chain.step_width(0) <= settings.maximal_stepwidth * chain.range(0));
    }
}

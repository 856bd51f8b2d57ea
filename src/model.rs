//! The forward-model capability.
//!
//! The sampler is generic over the model being fitted: anything that can
//! map a parameter vector and the observation matrix to an unnormalised
//! log-likelihood. The chain applies its inverse temperature and adds
//! the (untempered) log-prior when it stores the result, so models stay
//! oblivious to tempering.

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::chain::{Chain, Extension};

/// A user-supplied forward model plus likelihood.
pub trait ForwardModel: Send + Sync {
    /// Unnormalised log-likelihood of `params` given `data`.
    fn log_likelihood(&self, params: &DVector<f64>, data: &DMatrix<f64>) -> f64;

    /// Log-likelihood after only parameter `index` changed from
    /// `old_value`. Implementations may exploit this for a partial
    /// recomputation; the default recomputes everything.
    fn log_likelihood_for(
        &self,
        params: &DVector<f64>,
        data: &DMatrix<f64>,
        _index: usize,
        _old_value: f64,
    ) -> f64 {
        self.log_likelihood(params, data)
    }

    /// Log-prior of `params`. Flat by default; the interval bounds are
    /// enforced by the proposal mechanism either way.
    fn log_prior(&self, _params: &DVector<f64>) -> f64 {
        0.0
    }
}

/// Wrap a closure as a [`ForwardModel`].
pub struct FnModel<F>
where
    F: Fn(&DVector<f64>, &DMatrix<f64>) -> f64 + Send + Sync,
{
    log_likelihood: F,
}

impl<F> FnModel<F>
where
    F: Fn(&DVector<f64>, &DMatrix<f64>) -> f64 + Send + Sync,
{
    pub fn new(log_likelihood: F) -> Self {
        FnModel { log_likelihood }
    }
}

impl<F> ForwardModel for FnModel<F>
where
    F: Fn(&DVector<f64>, &DMatrix<f64>) -> f64 + Send + Sync,
{
    fn log_likelihood(&self, params: &DVector<f64>, data: &DMatrix<f64>) -> f64 {
        (self.log_likelihood)(params, data)
    }
}

impl<R: Rng, X: Extension> Chain<R, X> {
    /// Recompute the stored log-probability from scratch:
    /// `prob = beta * log L + log prior`.
    pub fn update_prob<M: ForwardModel + ?Sized>(&mut self, model: &M) {
        let ll = model.log_likelihood(self.params(), self.data());
        let prior = model.log_prior(self.params());
        self.set_prior(prior);
        self.set_prob(self.beta() * ll + prior);
    }

    /// Recompute the stored log-probability after only parameter
    /// `index` changed from `old_value`.
    pub fn update_prob_for<M: ForwardModel + ?Sized>(
        &mut self,
        model: &M,
        index: usize,
        old_value: f64,
    ) {
        let ll = model.log_likelihood_for(self.params(), self.data(), index, old_value);
        let prior = model.log_prior(self.params());
        self.set_prior(prior);
        self.set_prob(self.beta() * ll + prior);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Tempering;
    use crate::io::{ParamSpec, Problem};
    use nalgebra::DMatrix;

    fn unit_problem() -> Problem {
        Problem::new(
            vec![ParamSpec::new("x", -10.0, 10.0, 2.0, 1.0)],
            DMatrix::zeros(1, 2),
        )
        .unwrap()
    }

    #[test]
    fn update_prob_applies_beta_to_likelihood_only() {
        let model = FnModel::new(|params: &DVector<f64>, _: &DMatrix<f64>| -params[0]);

        let mut chain = Chain::from_problem(&unit_problem(), 1).with_extension(Tempering::new(0.5));
        chain.update_prob(&model);
        assert::close(chain.prob(), 0.5 * -2.0, 1e-12);
        assert_eq!(chain.prior(), 0.0);
    }

    struct WithPrior;

    impl ForwardModel for WithPrior {
        fn log_likelihood(&self, params: &DVector<f64>, _data: &DMatrix<f64>) -> f64 {
            -params[0] * params[0]
        }

        fn log_prior(&self, params: &DVector<f64>) -> f64 {
            -params[0].abs()
        }
    }

    #[test]
    fn prior_is_stored_untempered() {
        let mut chain = Chain::from_problem(&unit_problem(), 1).with_extension(Tempering::new(0.1));
        chain.update_prob(&WithPrior);
        assert::close(chain.prior(), -2.0, 1e-12);
        assert::close(chain.prob(), 0.1 * -4.0 + -2.0, 1e-12);
    }

    #[test]
    fn partial_update_defaults_to_full() {
        let model = WithPrior;
        let mut full = Chain::from_problem(&unit_problem(), 1);
        let mut partial = full.clone();
        full.update_prob(&model);
        partial.update_prob_for(&model, 0, 0.0);
        assert_eq!(full.prob(), partial.prob());
    }
}

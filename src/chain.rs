//! Markov-chain state.
//!
//! A [`Chain`] bundles everything one sampler instance owns: the current
//! parameter vector with its prior bounds and proposal step widths, the
//! best point seen so far, accept/reject bookkeeping, the observation
//! matrix and a private random generator. Mutation happens only through
//! the sampler, the calibrators and the tempering swap protocol.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rv::dist::Gaussian;
use rv::traits::Rv;

use crate::io::Problem;

/// Initial log-probability before the first model evaluation.
pub(crate) const PROB_UNSET: f64 = -1e10;

/// Per-chain auxiliary state.
///
/// Plain chains carry `()`; tempered chains carry [`Tempering`], which
/// scales the likelihood by an inverse temperature.
pub trait Extension: Clone + Send + Sync {
    /// Inverse temperature applied to the log-likelihood.
    fn beta(&self) -> f64 {
        1.0
    }
}

impl Extension for () {}

/// Auxiliary state of a chain inside a tempering ensemble.
#[derive(Clone, Debug, PartialEq)]
pub struct Tempering {
    /// Inverse temperature, in `(0, 1]`.
    pub beta: f64,
    /// Number of state exchanges this chain took part in.
    pub swap_count: u64,
}

impl Tempering {
    pub fn new(beta: f64) -> Self {
        assert!(beta > 0.0 && beta <= 1.0, "beta must lie in (0, 1]");
        Tempering {
            beta,
            swap_count: 0,
        }
    }
}

impl Extension for Tempering {
    fn beta(&self) -> f64 {
        self.beta
    }
}

/// State of a single Markov chain.
pub struct Chain<R = StdRng, X = ()>
where
    R: Rng,
    X: Extension,
{
    n_par: usize,
    params: DVector<f64>,
    params_min: DVector<f64>,
    params_max: DVector<f64>,
    params_step: DVector<f64>,
    params_best: DVector<f64>,
    prob: f64,
    prior: f64,
    prob_best: f64,
    params_accepts: Vec<u64>,
    params_rejects: Vec<u64>,
    n_iter: u64,
    circular: Vec<bool>,
    descr: Vec<String>,
    data: DMatrix<f64>,
    rng: R,
    extension: X,
}

impl Chain<StdRng, ()> {
    /// Construct a chain from a loaded problem with a deterministic seed.
    pub fn from_problem(problem: &Problem, seed: u64) -> Self {
        Chain::new(problem, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Chain<R, ()> {
    /// Construct a chain from a loaded problem with the given generator.
    pub fn new(problem: &Problem, rng: R) -> Self {
        let n_par = problem.n_par();
        assert!(n_par > 0, "chain needs at least one parameter");
        let params = DVector::from_iterator(n_par, problem.params.iter().map(|p| p.init));
        Chain {
            n_par,
            params_min: DVector::from_iterator(n_par, problem.params.iter().map(|p| p.min)),
            params_max: DVector::from_iterator(n_par, problem.params.iter().map(|p| p.max)),
            params_step: DVector::from_iterator(n_par, problem.params.iter().map(|p| p.step)),
            params_best: params.clone(),
            params,
            prob: PROB_UNSET,
            prior: 0.0,
            prob_best: PROB_UNSET,
            params_accepts: vec![0; n_par],
            params_rejects: vec![0; n_par],
            n_iter: 0,
            circular: problem.params.iter().map(|p| p.circular).collect(),
            descr: problem.params.iter().map(|p| p.name.clone()).collect(),
            data: problem.data.clone(),
            rng,
            extension: (),
        }
    }
}

impl<R: Rng, X: Extension> Chain<R, X> {
    /// Replace the auxiliary state, e.g. to join a tempering ensemble.
    pub fn with_extension<Y: Extension>(self, extension: Y) -> Chain<R, Y> {
        Chain {
            n_par: self.n_par,
            params: self.params,
            params_min: self.params_min,
            params_max: self.params_max,
            params_step: self.params_step,
            params_best: self.params_best,
            prob: self.prob,
            prior: self.prior,
            prob_best: self.prob_best,
            params_accepts: self.params_accepts,
            params_rejects: self.params_rejects,
            n_iter: self.n_iter,
            circular: self.circular,
            descr: self.descr,
            data: self.data,
            rng: self.rng,
            extension,
        }
    }

    pub fn n_par(&self) -> usize {
        self.n_par
    }

    pub fn params(&self) -> &DVector<f64> {
        &self.params
    }

    pub fn param(&self, i: usize) -> f64 {
        self.params[i]
    }

    pub fn set_params(&mut self, params: DVector<f64>) {
        debug_assert_eq!(params.len(), self.n_par);
        self.params = params;
    }

    pub(crate) fn set_param(&mut self, i: usize, value: f64) {
        self.params[i] = value;
    }

    pub fn params_min(&self) -> &DVector<f64> {
        &self.params_min
    }

    pub fn params_max(&self) -> &DVector<f64> {
        &self.params_max
    }

    /// Width of the prior interval of parameter `i`.
    pub fn range(&self, i: usize) -> f64 {
        self.params_max[i] - self.params_min[i]
    }

    pub fn is_circular(&self, i: usize) -> bool {
        self.circular[i]
    }

    pub fn steps(&self) -> &DVector<f64> {
        &self.params_step
    }

    pub fn set_steps(&mut self, steps: DVector<f64>) {
        debug_assert_eq!(steps.len(), self.n_par);
        self.params_step = steps;
    }

    pub fn scale_steps(&mut self, factor: f64) {
        self.params_step *= factor;
    }

    pub fn step_width(&self, i: usize) -> f64 {
        self.params_step[i]
    }

    pub fn set_step_width(&mut self, i: usize, width: f64) {
        self.params_step[i] = width;
    }

    /// Step width of parameter `i` as a fraction of its range.
    pub fn normalized_step_width(&self, i: usize) -> f64 {
        self.params_step[i] / self.range(i)
    }

    pub fn set_normalized_step_width(&mut self, i: usize, width: f64) {
        self.params_step[i] = width * self.range(i);
    }

    pub fn params_best(&self) -> &DVector<f64> {
        &self.params_best
    }

    pub fn set_params_best(&mut self, params: DVector<f64>) {
        debug_assert_eq!(params.len(), self.n_par);
        self.params_best = params;
    }

    pub fn prob(&self) -> f64 {
        self.prob
    }

    pub fn set_prob(&mut self, prob: f64) {
        self.prob = prob;
    }

    pub fn prior(&self) -> f64 {
        self.prior
    }

    pub fn set_prior(&mut self, prior: f64) {
        self.prior = prior;
    }

    pub fn prob_best(&self) -> f64 {
        self.prob_best
    }

    pub fn set_prob_best(&mut self, prob: f64) {
        self.prob_best = prob;
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn descr(&self, i: usize) -> &str {
        &self.descr[i]
    }

    pub fn param_names(&self) -> &[String] {
        &self.descr
    }

    pub fn extension(&self) -> &X {
        &self.extension
    }

    pub fn extension_mut(&mut self) -> &mut X {
        &mut self.extension
    }

    /// Inverse temperature of this chain (1 for plain chains).
    pub fn beta(&self) -> f64 {
        self.extension.beta()
    }

    // -- accept/reject bookkeeping ------------------------------------

    pub fn accepts_for(&self, i: usize) -> u64 {
        self.params_accepts[i]
    }

    pub fn rejects_for(&self, i: usize) -> u64 {
        self.params_rejects[i]
    }

    pub fn accepts_sum(&self) -> u64 {
        self.params_accepts.iter().sum()
    }

    pub fn rejects_sum(&self) -> u64 {
        self.params_rejects.iter().sum()
    }

    /// Proposals counted since the last reset.
    pub fn n_iter(&self) -> u64 {
        self.n_iter
    }

    pub(crate) fn record_accept_all(&mut self) {
        for a in self.params_accepts.iter_mut() {
            *a += 1;
        }
        self.n_iter += 1;
    }

    pub(crate) fn record_reject_all(&mut self) {
        for r in self.params_rejects.iter_mut() {
            *r += 1;
        }
        self.n_iter += 1;
    }

    pub(crate) fn record_accept_for(&mut self, i: usize) {
        self.params_accepts[i] += 1;
        self.n_iter += 1;
    }

    pub(crate) fn record_reject_for(&mut self, i: usize) {
        self.params_rejects[i] += 1;
        self.n_iter += 1;
    }

    /// Zero all accept/reject counters and the proposal count.
    pub fn reset_accept_rejects(&mut self) {
        for a in self.params_accepts.iter_mut() {
            *a = 0;
        }
        for r in self.params_rejects.iter_mut() {
            *r = 0;
        }
        self.n_iter = 0;
    }

    /// Per-parameter acceptance rates over the counted proposals.
    pub fn accept_rates(&self) -> Vec<f64> {
        (0..self.n_par)
            .map(|i| {
                let total = self.params_accepts[i] + self.params_rejects[i];
                if total == 0 {
                    0.0
                } else {
                    self.params_accepts[i] as f64 / total as f64
                }
            })
            .collect()
    }

    /// Acceptance rate pooled over all parameters.
    pub fn accept_rate_global(&self) -> f64 {
        let accepts = self.accepts_sum();
        let total = accepts + self.rejects_sum();
        if total == 0 {
            0.0
        } else {
            accepts as f64 / total as f64
        }
    }

    // -- random draws --------------------------------------------------

    /// Uniform draw from `[0, 1)`.
    pub fn next_uniform(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Gaussian draw with mean 0 and standard deviation `sigma`.
    pub fn next_gauss(&mut self, sigma: f64) -> f64 {
        assert!(sigma > 0.0, "cannot draw with sigma <= 0");
        let proposal_dist = Gaussian::new(0.0, sigma).unwrap();
        proposal_dist.draw(&mut self.rng)
    }

    /// `log(U(0, 1))`, the acceptance threshold draw.
    pub fn next_log_uniform(&mut self) -> f64 {
        self.rng.gen::<f64>().ln()
    }

    /// Uniform index draw from `0..n`.
    pub fn next_index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0, n)
    }

    // -- invariants ----------------------------------------------------

    /// Assert the structural invariants. Compiled out in release builds.
    pub fn check(&self) {
        debug_assert!(self.n_par > 0);
        debug_assert_eq!(self.params.len(), self.n_par);
        debug_assert_eq!(self.params_best.len(), self.n_par);
        debug_assert_eq!(self.params_step.len(), self.n_par);
        debug_assert!(self.data.ncols() >= 2);
        for i in 0..self.n_par {
            debug_assert!(
                self.params_min[i] < self.params_max[i],
                "empty prior interval for {}",
                self.descr[i]
            );
            debug_assert!(
                self.params[i] >= self.params_min[i] && self.params[i] <= self.params_max[i],
                "parameter {} left its prior interval",
                self.descr[i]
            );
            debug_assert!(
                self.params_step[i] > 0.0,
                "step width of {} must stay positive",
                self.descr[i]
            );
        }
    }

    /// Promote the current point to best-so-far if it improves on it.
    pub fn check_best(&mut self) {
        if self.prob > self.prob_best {
            self.params_best.copy_from(&self.params);
            self.prob_best = self.prob;
        }
    }
}

impl<R, X> Clone for Chain<R, X>
where
    R: Rng + Clone,
    X: Extension,
{
    fn clone(&self) -> Self {
        Chain {
            n_par: self.n_par,
            params: self.params.clone(),
            params_min: self.params_min.clone(),
            params_max: self.params_max.clone(),
            params_step: self.params_step.clone(),
            params_best: self.params_best.clone(),
            prob: self.prob,
            prior: self.prior,
            prob_best: self.prob_best,
            params_accepts: self.params_accepts.clone(),
            params_rejects: self.params_rejects.clone(),
            n_iter: self.n_iter,
            circular: self.circular.clone(),
            descr: self.descr.clone(),
            data: self.data.clone(),
            rng: self.rng.clone(),
            extension: self.extension.clone(),
        }
    }
}

impl<R: Rng, X: Extension> fmt::Debug for Chain<R, X> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Chain {{ n_par: {}, prob: {}, prob_best: {}, n_iter: {} }}",
            self.n_par, self.prob, self.prob_best, self.n_iter
        )
    }
}

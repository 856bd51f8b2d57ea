//! Step-width calibration.
//!
//! Before the analysis run, each chain's proposal step widths are tuned
//! so the sampler accepts at a useful rate. Two strategies implement
//! the same contract: [`Strategy::Classical`] rescales steps until the
//! per-parameter acceptance rates settle inside a band, while
//! [`Strategy::AccuracyDriven`] estimates each acceptance rate to an
//! explicit accuracy bound and moves the steps proportionally. Both
//! start with the same coarse-to-fine burn-in and leave the chain with
//! all structural invariants intact.

mod accuracy;
mod classical;

pub use self::accuracy::{assess_acceptance_rate, calibrate_accuracy, RateAssessment};
pub use self::classical::calibrate_classical;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use log::debug;
use rand::Rng;

use crate::chain::{Chain, Extension};
use crate::config::Settings;
use crate::error::Error;
use crate::model::ForwardModel;
use crate::steppers;

/// Which calibration algorithm to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub enum Strategy {
    /// Rescaling loop targeting a per-parameter acceptance-rate band.
    Classical,
    /// Acceptance-rate estimation with explicit accuracy bounds.
    AccuracyDriven,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "classical" => Ok(Strategy::Classical),
            "accuracy" => Ok(Strategy::AccuracyDriven),
            other => Err(format!(
                "unknown calibration strategy {:?} (expected classical or accuracy)",
                other
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Strategy::Classical => write!(f, "classical"),
            Strategy::AccuracyDriven => write!(f, "accuracy"),
        }
    }
}

/// Knobs shared by both calibrators.
#[derive(Clone, Debug)]
pub struct CalibrationConfig {
    /// Nominal burn-in iterations before tuning starts.
    pub burn_in_iterations: u64,
    /// Per-parameter acceptance rate to aim for. When `None`, the
    /// classical strategy uses `0.25^(1/n_par)` and the accuracy-driven
    /// strategy uses `0.25`.
    pub target_rate: Option<f64>,
    /// Iteration budget; exceeding it is a calibration failure.
    pub iter_limit: u64,
    /// Step rescaling factor. Steps are divided by this when the rate
    /// is too high and multiplied by it when too low, so a value below
    /// one widens steps on high rates and narrows them on low rates;
    /// a value above one inverts the adjustment direction.
    pub mul: f64,
    /// Factor applied to all step widths right after burn-in.
    pub adjust_step: f64,
    /// Where the accuracy-driven strategy writes its progress trace.
    pub progress_path: Option<PathBuf>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            burn_in_iterations: 10_000,
            target_rate: None,
            iter_limit: 100_000,
            mul: 0.85,
            adjust_step: 0.5,
            progress_path: None,
        }
    }
}

/// Calibrate `chain` with the strategy selected in `settings`.
pub fn calibrate<R, X, M>(
    chain: &mut Chain<R, X>,
    model: &M,
    config: &CalibrationConfig,
    settings: &Settings,
) -> Result<(), Error>
where
    R: Rng,
    X: Extension,
    M: ForwardModel + ?Sized,
{
    match settings.calibration_strategy {
        Strategy::Classical => calibrate_classical(chain, model, config, settings),
        Strategy::AccuracyDriven => calibrate_accuracy(chain, model, config, settings),
    }
}

/// Joint steps per burn-in pass.
const BURN_IN_SUB_STEPS: u64 = 200;

/// Log-probability sentinel forcing the next proposal to be accepted.
const RESTART_PROB_SENTINEL: f64 = -1e7;

/// Move the chain back to its best point and poison the stored
/// probability so the next transition is taken from there.
pub(crate) fn restart_from_best<R: Rng, X: Extension>(chain: &mut Chain<R, X>) {
    let best = chain.params_best().clone();
    chain.set_params(best);
    chain.set_prob(RESTART_PROB_SENTINEL);
}

/// Coarse-to-fine burn-in.
///
/// Runs half the budget with steps at a tenth of each prior range,
/// restarts from the best point found, then runs the rest with halved
/// steps. The original step widths are restored afterwards. One pass of
/// [`BURN_IN_SUB_STEPS`] joint steps counts as `BURN_IN_SUB_STEPS + 1`
/// nominal iterations.
pub fn burn_in<R, X, M>(chain: &mut Chain<R, X>, model: &M, iterations: u64)
where
    R: Rng,
    X: Extension,
    M: ForwardModel + ?Sized,
{
    let original_steps = chain.steps().clone();
    let coarse = (chain.params_max() - chain.params_min()) * 0.1;
    chain.set_steps(coarse);

    debug!("starting burn-in");
    chain.check();
    let mut iter = 0u64;
    while iter < iterations / 2 {
        for _ in 0..BURN_IN_SUB_STEPS {
            steppers::step(chain, model);
        }
        iter += BURN_IN_SUB_STEPS + 1;
        debug!("burn-in iteration {}", iter);
        chain.check_best();
    }

    debug!("re-initializing burn-in from the best point");
    restart_from_best(chain);
    chain.scale_steps(0.5);
    while iter < iterations {
        for _ in 0..BURN_IN_SUB_STEPS {
            steppers::step(chain, model);
        }
        iter += BURN_IN_SUB_STEPS + 1;
        debug!("burn-in iteration {}", iter);
        chain.check_best();
    }

    debug!("burn-in done, restoring step widths");
    chain.set_steps(original_steps);
    chain.check();
}

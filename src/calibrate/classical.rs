//! The classical rescaling calibrator.

use itertools::Itertools;
use log::{debug, info, warn};
use rand::Rng;

use crate::chain::{Chain, Extension};
use crate::config::Settings;
use crate::error::Error;
use crate::model::ForwardModel;
use crate::steppers;

use super::{burn_in, restart_from_best, CalibrationConfig};

/// Acceptance-rate band half-width around the moving limit.
const RATE_BAND: f64 = 0.05;

/// Tune step widths by rescaling until every per-parameter acceptance
/// rate sits inside a band around a moving limit and the global rate
/// matches the configured target.
///
/// The limit starts at the configured target rate (default
/// `0.25^(1/n_par)`) and is nudged by 1% after every inspection whose
/// global rate misses the fixed target, so the per-parameter band
/// drifts until the pooled behavior is right.
pub fn calibrate_classical<R, X, M>(
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
    let n_par = chain.n_par();
    let mut rat_limit = config
        .target_rate
        .unwrap_or_else(|| 0.25f64.powf(1.0 / n_par as f64));

    burn_in(chain, model, config.burn_in_iterations);
    chain.scale_steps(config.adjust_step);
    debug!("calibrating step widths");
    chain.reset_accept_rejects();

    let mut iter: u64 = 0;
    let mut nchecks_without_rescaling: u32 = 0;
    loop {
        for i in 0..n_par {
            steppers::step_for(chain, model, i);
            chain.check_best();
        }
        iter += 1;
        if iter % settings.iter_readjust != 0 {
            continue;
        }

        let accept_rates = chain.accept_rates();
        debug!(
            "inspection at iteration {}: rates [{}], steps [{}]",
            iter,
            accept_rates.iter().format(", "),
            chain.steps().iter().format(", ")
        );

        // -1 marks "shrink-only so far": a rescale that a later clamp
        // undoes must not count as quiet
        let mut rescaled: i32 = 0;
        for i in 0..n_par {
            if accept_rates[i] > rat_limit + RATE_BAND {
                chain.set_step_width(i, chain.step_width(i) / config.mul);
                if rescaled == 0 {
                    rescaled = -1;
                }
                if chain.normalized_step_width(i) > 1.0 {
                    warn!(
                        "step width of {} is {:.0} times the whole parameter space; \
                         the parameter may be independent. Clamping to the range.",
                        chain.descr(i),
                        chain.normalized_step_width(i)
                    );
                    chain.set_normalized_step_width(i, 1.0);
                    if rescaled == -1 {
                        rescaled = 0;
                    }
                }
                if chain.normalized_step_width(i) > 10_000.0 {
                    return Err(Error::calibration(
                        Some(chain.descr(i)),
                        "step width became too large",
                    ));
                }
                if rescaled == -1 {
                    rescaled = 1;
                }
            }
            if accept_rates[i] < rat_limit - RATE_BAND {
                chain.set_step_width(i, chain.step_width(i) * config.mul);
                if chain.normalized_step_width(i) < 1e-9 {
                    warn!(
                        "step width of {} is only {:e} times the parameter space",
                        chain.descr(i),
                        chain.normalized_step_width(i)
                    );
                }
                rescaled = 1;
            }
            debug_assert!(chain.step_width(i) > 0.0);
        }
        if rescaled == 0 {
            nchecks_without_rescaling += 1;
        }

        restart_from_best(chain);
        chain.reset_accept_rejects();
        for _ in 0..settings.iter_readjust {
            steppers::step(chain, model);
            chain.check_best();
        }
        debug!(
            "overall acceptance rate after reset: {:.4}",
            chain.accept_rate_global()
        );

        let delta = chain.accept_rate_global() - settings.target_acceptance_rate;
        let reached_perfection = delta.abs() < 0.01;
        if reached_perfection {
            debug!("reached the desired acceptance rate");
            info!("{} inspections without rescaling", nchecks_without_rescaling);
        } else if delta < 0.0 {
            rat_limit /= 0.99;
        } else {
            rat_limit *= 0.99;
        }

        if nchecks_without_rescaling >= settings.no_rescaling_limit
            && reached_perfection
            && rescaled == 0
        {
            debug!("quitting calibration: no rescaling needed for several inspections");
            break;
        }
        if iter > config.iter_limit {
            let worst = (0..n_par)
                .max_by(|&a, &b| {
                    (accept_rates[a] - rat_limit)
                        .abs()
                        .partial_cmp(&(accept_rates[b] - rat_limit).abs())
                        .unwrap()
                })
                .unwrap();
            return Err(Error::calibration(
                Some(chain.descr(worst)),
                format!("iteration limit of {} reached", config.iter_limit),
            ));
        }
    }

    chain.reset_accept_rejects();
    debug!("calibration done");
    Ok(())
}

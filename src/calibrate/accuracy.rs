//! The accuracy-driven calibrator.
//!
//! Instead of waiting for rates to settle into a band, this strategy
//! estimates every per-parameter acceptance rate together with an
//! explicit accuracy bound and moves each step width proportionally to
//! the rate's deviation from the target. The closer a rate is to the
//! target, the more accurately it is measured.

use std::fs::File;
use std::io::{BufWriter, Write};

use log::{debug, info};
use rand::Rng;

use crate::chain::{Chain, Extension};
use crate::config::Settings;
use crate::error::Error;
use crate::model::ForwardModel;
use crate::steppers;

use super::{burn_in, CalibrationConfig};

/// Result of one acceptance-rate estimation.
#[derive(Clone, Copy, Debug)]
pub struct RateAssessment {
    /// Estimated acceptance rate.
    pub rate: f64,
    /// Achieved accuracy of the estimate.
    pub accuracy: f64,
    /// Per-parameter steps spent on the estimate.
    pub iterations: u64,
}

/// Floor on the demanded accuracy.
const MIN_REQUIRED_ACCURACY: f64 = 0.005;

/// Initial number of steps per estimate.
const INITIAL_ASSESS_STEPS: usize = 40;

/// Estimate the acceptance rate of parameter `param`.
///
/// Steps the chain, logging each accept/reject outcome, until the
/// largest running deviation of the accept count from the fitted rate
/// is within the required accuracy: the larger of `min_accuracy`,
/// [`MIN_REQUIRED_ACCURACY`] and the distance to `desired` times
/// `ACCURACY_DEVIATION_FACTOR`. When the outcome log is still too
/// noisy, the step budget grows to the projected need and sampling
/// resumes where it stopped.
pub fn assess_acceptance_rate<R, X, M>(
    chain: &mut Chain<R, X>,
    model: &M,
    param: usize,
    desired: f64,
    min_accuracy: f64,
    settings: &Settings,
) -> RateAssessment
where
    R: Rng,
    X: Extension,
    M: ForwardModel + ?Sized,
{
    chain.reset_accept_rejects();
    let mut outcomes: Vec<bool> = Vec::with_capacity(INITIAL_ASSESS_STEPS);
    let mut n = INITIAL_ASSESS_STEPS;

    loop {
        debug!("assessing {}: stepping to {} outcomes", chain.descr(param), n);
        while outcomes.len() < n {
            let status = steppers::step_for(chain, model, param);
            chain.check_best();
            outcomes.push(status.accepted());
        }

        let accepts = outcomes.iter().filter(|&&accepted| accepted).count();
        let rate = accepts as f64 / n as f64;

        let mut running = 0usize;
        let mut maxdev: f64 = 1.0;
        for (j, &accepted) in outcomes.iter().enumerate() {
            if accepted {
                running += 1;
            }
            let deviation = (running as f64 - rate * j as f64).abs();
            if deviation > maxdev {
                maxdev = deviation;
            }
        }

        let mut required = (rate - desired).abs() * settings.accuracy_deviation_factor;
        if required < MIN_REQUIRED_ACCURACY {
            required = MIN_REQUIRED_ACCURACY;
        }
        if required < min_accuracy {
            required = min_accuracy;
        }

        let accuracy = maxdev / n as f64;
        debug!(
            "accuracy wanted {:.4}, got {:.4} (rate {:.4})",
            required, accuracy, rate
        );
        if accuracy <= required {
            return RateAssessment {
                rate,
                accuracy,
                iterations: n as u64,
            };
        }
        n = ((maxdev / required) as usize / 8 + 1) * 8;
    }
}

/// Tune step widths until every acceptance rate is within 0.01 of the
/// target and the aggregate accuracy is below 0.02.
pub fn calibrate_accuracy<R, X, M>(
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
    let desired = config.target_rate.unwrap_or(0.25);

    let mut progress = match &config.progress_path {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    burn_in(chain, model, config.burn_in_iterations);

    let mut accuracies = vec![0.0f64; n_par];
    let mut worst_accuracy_previous = 0.0f64;
    let mut best_worst_accuracy = 1.0f64;
    let mut iter: u64 = 0;

    loop {
        let mut max_deviation = 0.0f64;
        let mut worst_accuracy = 0.0f64;
        info!(
            "sweeping all parameters, demanding {:.4} accuracy",
            worst_accuracy_previous / settings.max_accuracy_improvement
        );
        for i in 0..n_par {
            // a parameter already measured far better than the worst
            // one gains nothing from another pass
            if accuracies[i] < 0.1 * worst_accuracy_previous {
                continue;
            }

            let assessment = assess_acceptance_rate(
                chain,
                model,
                i,
                desired,
                worst_accuracy_previous / settings.max_accuracy_improvement,
                settings,
            );
            iter += assessment.iterations;
            info!(
                "{}: rate {:.4} (+-{:.4}); desired {:.4}; normalized step {:.6}",
                chain.descr(i),
                assessment.rate,
                assessment.accuracy,
                desired,
                chain.normalized_step_width(i)
            );
            if let Some(w) = progress.as_mut() {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}",
                    i + 1,
                    iter,
                    chain.normalized_step_width(i),
                    assessment.rate,
                    assessment.accuracy
                )?;
            }

            worst_accuracy += assessment.accuracy;
            accuracies[i] = assessment.accuracy;

            let move_direction = assessment.rate - desired;
            let scale = best_worst_accuracy * settings.scale_lin_worst + settings.scale_min;
            debug_assert!(scale > 0.0);
            let mut step_move = move_direction * scale;
            if step_move < -1.0 {
                step_move = -0.9;
            }
            if max_deviation < move_direction.abs() {
                max_deviation = move_direction.abs();
            }

            // 10% too high => widen steps by 10% (modulo scale)
            let width = chain.step_width(i) * (1.0 + step_move);
            let low = settings.minimal_stepwidth * chain.range(i);
            let high = settings.maximal_stepwidth * chain.range(i);
            chain.set_step_width(i, crate::utils::clamp(width, low, high));
            debug!("{}: new normalized step {:.6}", chain.descr(i), chain.normalized_step_width(i));
        }

        if iter > config.iter_limit * n_par as u64 {
            let worst = (0..n_par)
                .max_by(|&a, &b| accuracies[a].partial_cmp(&accuracies[b]).unwrap())
                .unwrap();
            return Err(Error::calibration(
                Some(chain.descr(worst)),
                format!(
                    "iteration limit of {} reached",
                    config.iter_limit * n_par as u64
                ),
            ));
        }

        worst_accuracy_previous = worst_accuracy / n_par as f64;
        if worst_accuracy_previous < best_worst_accuracy {
            best_worst_accuracy = worst_accuracy;
        }

        info!("largest rate deviation: {:.4}", max_deviation);
        if max_deviation < 0.01 && worst_accuracy < 0.02 {
            info!("deviation is small, calibration done");
            break;
        }
    }

    if let Some(mut w) = progress {
        w.flush()?;
    }
    chain.check();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::io::{ParamSpec, Problem};
    use crate::model::FnModel;
    use nalgebra::{DMatrix, DVector};

    fn gauss_problem(step: f64) -> Problem {
        Problem::new(
            vec![ParamSpec::new("theta", -10.0, 10.0, 0.0, step)],
            DMatrix::zeros(1, 2),
        )
        .unwrap()
    }

    fn gauss_model() -> impl ForwardModel {
        FnModel::new(|params: &DVector<f64>, _: &DMatrix<f64>| -params[0] * params[0] / 2.0)
    }

    #[test]
    fn assessment_converges_and_counts_steps() {
        let model = gauss_model();
        let mut chain = Chain::from_problem(&gauss_problem(2.4), 77);
        chain.update_prob(&model);
        chain.check_best();

        let a = assess_acceptance_rate(&mut chain, &model, 0, 0.25, 0.05, &Settings::default());
        assert!(a.rate >= 0.0 && a.rate <= 1.0);
        assert!(a.accuracy <= 0.05 || a.accuracy <= 0.005 + 0.25 * (a.rate - 0.25).abs());
        assert!(a.iterations >= INITIAL_ASSESS_STEPS as u64);
        // the outcome log and the chain's own counters agree
        assert_eq!(
            chain.accepts_for(0) + chain.rejects_for(0),
            a.iterations
        );
    }

    #[test]
    fn tiny_step_widths_accept_almost_everything() {
        let model = gauss_model();
        let mut chain = Chain::from_problem(&gauss_problem(1e-4), 78);
        chain.update_prob(&model);
        chain.check_best();

        let a = assess_acceptance_rate(&mut chain, &model, 0, 0.25, 0.1, &Settings::default());
        assert!(a.rate > 0.9);
    }

    #[test]
    fn calibration_moves_the_rate_to_the_target() {
        let model = gauss_model();
        // start far too wide, so almost everything is rejected
        let mut chain = Chain::from_problem(&gauss_problem(8.0), 79);
        chain.update_prob(&model);
        chain.check_best();

        let config = CalibrationConfig {
            burn_in_iterations: 500,
            iter_limit: 10_000_000,
            ..CalibrationConfig::default()
        };
        calibrate_accuracy(&mut chain, &model, &config, &Settings::default()).unwrap();
        chain.check();

        chain.reset_accept_rejects();
        for _ in 0..4000 {
            steppers::step_for(&mut chain, &model, 0);
        }
        let rate = chain.accept_rate_global();
        assert!(
            (rate - 0.25).abs() < 0.1,
            "acceptance rate {} missed the target",
            rate
        );
    }

    #[test]
    fn iteration_limit_is_a_calibration_error() {
        // constant likelihood accepts everything, the rate never moves
        let model = FnModel::new(|_: &DVector<f64>, _: &DMatrix<f64>| 0.0);
        let mut chain = Chain::from_problem(&gauss_problem(1.0), 80);
        chain.update_prob(&model);
        chain.check_best();

        let config = CalibrationConfig {
            burn_in_iterations: 100,
            iter_limit: 50,
            ..CalibrationConfig::default()
        };
        let err = calibrate_accuracy(&mut chain, &model, &config, &Settings::default())
            .unwrap_err();
        assert!(format!("{}", err).contains("theta"));
    }
}

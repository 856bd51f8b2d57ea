//! Runtime tunables.
//!
//! Every knob has a compiled-in default mirroring the constants below
//! and can be overridden through an environment variable of the same
//! name, e.g. `ITER_READJUST=500`.

use std::env;
use std::str::FromStr;

use crate::calibrate::Strategy;
use crate::error::Error;

/// Hard ceiling on analysis iterations.
pub const MAX_ITERATIONS: u64 = 1_000_000;
/// Proposals between step-width inspections of the classical calibrator.
pub const ITER_READJUST: u64 = 200;
/// Consecutive quiet inspections required before calibration may finish.
pub const NO_RESCALING_LIMIT: u32 = 5;
/// Global acceptance rate the calibrators steer towards.
pub const TARGET_ACCEPTANCE_RATE: f64 = 0.23;
/// Analysis iterations between progress reports.
pub const PRINT_PROB_INTERVAL: u64 = 1000;
/// Number of probability samples written on a dump request.
pub const DUMP_PROB_LENGTH: usize = 3000;
/// Lower step-width clamp, as a fraction of the parameter range.
pub const MINIMAL_STEPWIDTH: f64 = 1e-7;
/// Upper step-width clamp, as a fraction of the parameter range.
pub const MAXIMAL_STEPWIDTH: f64 = 1e6;
/// Rate-estimation accuracy demanded per unit of deviation from the target.
pub const ACCURACY_DEVIATION_FACTOR: f64 = 0.25;
/// Largest per-sweep accuracy improvement the accuracy-driven calibrator asks for.
pub const MAX_ACCURACY_IMPROVEMENT: f64 = 2.8;
/// Linear coefficient of the step-update scale on the worst accuracy.
pub const SCALE_LIN_WORST: f64 = 5.0;
/// Constant floor of the step-update scale.
pub const SCALE_MIN: f64 = 0.4;

/// Resolved configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct Settings {
    pub max_iterations: u64,
    pub iter_readjust: u64,
    pub no_rescaling_limit: u32,
    pub target_acceptance_rate: f64,
    pub print_prob_interval: u64,
    pub dump_prob_length: usize,
    pub minimal_stepwidth: f64,
    pub maximal_stepwidth: f64,
    pub accuracy_deviation_factor: f64,
    pub max_accuracy_improvement: f64,
    pub scale_lin_worst: f64,
    pub scale_min: f64,
    /// 1-based indices of circular parameters.
    pub circular_params: Vec<usize>,
    pub calibration_strategy: Strategy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_iterations: MAX_ITERATIONS,
            iter_readjust: ITER_READJUST,
            no_rescaling_limit: NO_RESCALING_LIMIT,
            target_acceptance_rate: TARGET_ACCEPTANCE_RATE,
            print_prob_interval: PRINT_PROB_INTERVAL,
            dump_prob_length: DUMP_PROB_LENGTH,
            minimal_stepwidth: MINIMAL_STEPWIDTH,
            maximal_stepwidth: MAXIMAL_STEPWIDTH,
            accuracy_deviation_factor: ACCURACY_DEVIATION_FACTOR,
            max_accuracy_improvement: MAX_ACCURACY_IMPROVEMENT,
            scale_lin_worst: SCALE_LIN_WORST,
            scale_min: SCALE_MIN,
            circular_params: Vec::new(),
            calibration_strategy: Strategy::Classical,
        }
    }
}

impl Settings {
    /// Build settings from the process environment, starting from the
    /// defaults. Malformed values are load-time errors.
    pub fn from_env() -> Result<Self, Error> {
        let mut s = Settings::default();
        s.max_iterations = parse_env("MAX_ITERATIONS", s.max_iterations)?;
        s.iter_readjust = parse_env("ITER_READJUST", s.iter_readjust)?;
        s.no_rescaling_limit = parse_env("NO_RESCALING_LIMIT", s.no_rescaling_limit)?;
        s.target_acceptance_rate =
            parse_env("TARGET_ACCEPTANCE_RATE", s.target_acceptance_rate)?;
        s.print_prob_interval = parse_env("PRINT_PROB_INTERVAL", s.print_prob_interval)?;
        s.dump_prob_length = parse_env("DUMP_PROB_LENGTH", s.dump_prob_length)?;
        s.minimal_stepwidth = parse_env("MINIMAL_STEPWIDTH", s.minimal_stepwidth)?;
        s.maximal_stepwidth = parse_env("MAXIMAL_STEPWIDTH", s.maximal_stepwidth)?;
        s.accuracy_deviation_factor =
            parse_env("ACCURACY_DEVIATION_FACTOR", s.accuracy_deviation_factor)?;
        s.max_accuracy_improvement =
            parse_env("MAX_ACCURACY_IMPROVEMENT", s.max_accuracy_improvement)?;
        s.scale_lin_worst = parse_env("SCALE_LIN_WORST", s.scale_lin_worst)?;
        s.scale_min = parse_env("SCALE_MIN", s.scale_min)?;
        if let Ok(list) = env::var("CIRCULAR_PARAMS") {
            s.circular_params = parse_index_list(&list)?;
        }
        s.calibration_strategy = parse_env("CALIBRATION_STRATEGY", s.calibration_strategy)?;
        Ok(s)
    }
}

fn parse_env<T>(name: &'static str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e| Error::Config {
            name,
            reason: format!("{}", e),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated list of 1-based parameter indices.
fn parse_index_list(raw: &str) -> Result<Vec<usize>, Error> {
    let mut indices = Vec::new();
    for field in raw.split(',') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let index: usize = field.parse().map_err(|_| Error::Config {
            name: "CIRCULAR_PARAMS",
            reason: format!("not an index: {:?}", field),
        })?;
        if index == 0 {
            return Err(Error::Config {
                name: "CIRCULAR_PARAMS",
                reason: "indices are 1-based".to_owned(),
            });
        }
        indices.push(index);
    }
    Ok(indices)
}

//! The parallel-tempering driver.
//!
//! Runs an ensemble of chains at decreasing inverse temperatures. All
//! chains advance one joint step in parallel, then a serial section
//! occasionally exchanges state between neighbours. Samples are taken
//! from the cold (`beta = 1`) chain only.

mod signals;
mod swap;

pub use self::signals::Flags;
pub use self::swap::{tempering_swap, SwapStats};

use std::path::PathBuf;

use itertools::Itertools;
use log::info;
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;

use crate::calibrate::{calibrate, CalibrationConfig};
use crate::chain::{Chain, Extension, Tempering};
use crate::config::Settings;
use crate::error::Error;
use crate::io::Problem;
use crate::model::ForwardModel;
use crate::output::SampleWriter;
use crate::steppers;

/// Outcome of an analysis run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Analysis iterations performed.
    pub iterations: u64,
    /// Best parameter vector of the cold chain.
    pub best_params: DVector<f64>,
    /// Log-probability at the best point.
    pub prob_best: f64,
    /// Global acceptance rate of the cold chain over the analysis.
    pub accept_rate: f64,
    /// Swap bookkeeping.
    pub swap_stats: SwapStats,
    /// Cold-chain samples, when in-memory collection was requested.
    pub samples: Option<Vec<DVector<f64>>>,
}

/// Driver for a parallel-tempered analysis.
///
/// # Example
/// ```no_run
/// use nalgebra::{DMatrix, DVector};
/// use ptmcmc::{FnModel, ParamSpec, Problem, TemperingRunner};
///
/// let problem = Problem::new(
///     vec![ParamSpec::new("theta", -10.0, 10.0, 5.0, 1.0)],
///     DMatrix::zeros(1, 2),
/// )
/// .unwrap();
/// let model = FnModel::new(|p: &DVector<f64>, _: &DMatrix<f64>| -p[0] * p[0] / 2.0);
///
/// let report = TemperingRunner::new(&model, &problem)
///     .chains(4)
///     .beta_min(0.1)
///     .seed(1234)
///     .keep_samples()
///     .run()
///     .unwrap();
/// println!("best point: {}", report.best_params[0]);
/// ```
pub struct TemperingRunner<'a, M>
where
    M: ForwardModel,
{
    model: &'a M,
    problem: &'a Problem,
    settings: Settings,
    calibration: CalibrationConfig,
    n_chains: usize,
    beta_0: f64,
    n_swap: u32,
    kick_probability: f64,
    seed: u64,
    output_dir: Option<PathBuf>,
    keep_samples: bool,
    install_handlers: bool,
    flags: Flags,
}

impl<'a, M> Clone for TemperingRunner<'a, M>
where
    M: ForwardModel,
{
    fn clone(&self) -> Self {
        Self {
            model: self.model,
            problem: self.problem,
            settings: self.settings.clone(),
            calibration: self.calibration.clone(),
            n_chains: self.n_chains,
            beta_0: self.beta_0,
            n_swap: self.n_swap,
            kick_probability: self.kick_probability,
            seed: self.seed,
            output_dir: self.output_dir.clone(),
            keep_samples: self.keep_samples,
            install_handlers: self.install_handlers,
            flags: self.flags.clone(),
        }
    }
}

impl<'a, M> TemperingRunner<'a, M>
where
    M: ForwardModel,
{
    pub fn new(model: &'a M, problem: &'a Problem) -> Self {
        Self {
            model,
            problem,
            settings: Settings::default(),
            calibration: CalibrationConfig::default(),
            n_chains: 4,
            beta_0: 0.1,
            n_swap: 30,
            kick_probability: 1.0 / 10_000.0,
            seed: 0,
            output_dir: None,
            keep_samples: false,
            install_handlers: true,
            flags: Flags::new(),
        }
    }

    /// Number of chains in the ensemble.
    pub fn chains(&self, n_chains: usize) -> Self {
        assert!(n_chains >= 1, "the ensemble needs at least one chain");
        Self {
            n_chains,
            ..(*self).clone()
        }
    }

    /// Inverse temperature of the hottest chain.
    pub fn beta_min(&self, beta_0: f64) -> Self {
        assert!(
            beta_0 > 0.0 && beta_0 <= 1.0,
            "the hottest beta must lie in (0, 1]"
        );
        Self {
            beta_0,
            ..(*self).clone()
        }
    }

    /// A swap is proposed with probability `1/n_swap` per iteration.
    pub fn swap_interval(&self, n_swap: u32) -> Self {
        assert!(n_swap >= 1);
        Self {
            n_swap,
            ..(*self).clone()
        }
    }

    /// Probability of kicking a random chain back to its best point.
    /// Zero disables kicks.
    pub fn kick_probability(&self, kick_probability: f64) -> Self {
        Self {
            kick_probability,
            ..(*self).clone()
        }
    }

    /// Base seed; chain `i` uses `seed + i`.
    pub fn seed(&self, seed: u64) -> Self {
        Self {
            seed,
            ..(*self).clone()
        }
    }

    pub fn settings(&self, settings: Settings) -> Self {
        Self {
            settings,
            ..(*self).clone()
        }
    }

    pub fn calibration(&self, calibration: CalibrationConfig) -> Self {
        Self {
            calibration,
            ..(*self).clone()
        }
    }

    /// Write per-parameter sample streams and probability dumps here.
    pub fn output_dir<P: Into<PathBuf>>(&self, dir: P) -> Self {
        Self {
            output_dir: Some(dir.into()),
            ..(*self).clone()
        }
    }

    /// Keep the cold chain's samples in memory and return them in the
    /// report.
    pub fn keep_samples(&self) -> Self {
        Self {
            keep_samples: true,
            ..(*self).clone()
        }
    }

    /// Do not register process signal handlers.
    pub fn no_signal_handlers(&self) -> Self {
        Self {
            install_handlers: false,
            ..(*self).clone()
        }
    }

    /// Control-flag handle; lets an embedder stop the run or request a
    /// dump the same way the signal handlers would.
    pub fn flags(&self) -> Flags {
        self.flags.clone()
    }

    /// Initialise, calibrate and analyse the ensemble.
    pub fn run(&self) -> Result<RunReport, Error> {
        let n_beta = self.n_chains;
        let delta_beta = if n_beta == 1 {
            0.0
        } else {
            (1.0 - self.beta_0) / (n_beta as f64 - 1.0)
        };

        info!("initializing parallel tempering for {} chains", n_beta);
        let problem = self.problem;
        let model = self.model;
        let seed = self.seed;
        let mut chains: Vec<Chain<StdRng, Tempering>> = (0..n_beta)
            .into_par_iter()
            .map(|i| {
                let beta = 1.0 - i as f64 * delta_beta;
                info!("chain {:2} - beta = {:.6}", i, beta);
                let mut chain = Chain::from_problem(problem, seed.wrapping_add(i as u64))
                    .with_extension(Tempering::new(beta));
                chain.update_prob(model);
                chain.check();
                chain
            })
            .collect();

        info!("starting markov chain calibration");
        calibrate(&mut chains[0], model, &self.calibration, &self.settings)?;

        info!("calibrating all hotter chains from the best point of the cold chain");
        let best = chains[0].params_best().clone();
        let hot_calibration = CalibrationConfig {
            progress_path: None,
            ..self.calibration.clone()
        };
        let settings = &self.settings;
        let (_, hot) = chains.split_at_mut(1);
        hot.par_iter_mut().try_for_each(|chain| {
            chain.set_params(best.clone());
            chain.update_prob(model);
            let seeded = chain.prob() * chain.beta();
            chain.set_prob(seeded);
            calibrate(chain, model, &hot_calibration, settings)
        })?;

        info!("all chains calibrated");
        for (i, chain) in chains.iter().enumerate() {
            info!(
                "chain {:2} - beta = {:.6}, steps: [{}]",
                i,
                chain.beta(),
                chain.steps().iter().format(", ")
            );
        }

        if self.install_handlers {
            self.flags.install()?;
        }
        self.analyse(&mut chains)
    }

    fn analyse(&self, chains: &mut [Chain<StdRng, Tempering>]) -> Result<RunReport, Error> {
        let names: Vec<String> = self.problem.params.iter().map(|p| p.name.clone()).collect();
        let mut writer =
            SampleWriter::new(self.output_dir.as_ref().map(|d| d.as_path()), &names, self.keep_samples)?;
        let mut stats = SwapStats::default();
        let model = self.model;
        let mut iter = chains[0].n_iter();

        info!("starting the analysis");
        while self.flags.running() && iter < self.settings.max_iterations {
            chains.par_iter_mut().for_each(|chain| {
                steppers::step(chain, model);
            });
            chains[0].check_best();
            writer.append(&chains[0])?;
            iter += 1;
            tempering_swap(chains, self.n_swap, self.kick_probability, &mut stats);

            if iter % self.settings.print_prob_interval == 0 {
                if self.flags.take_dump_request() {
                    writer.dump_probabilities(Some(self.settings.dump_prob_length))?;
                    print_current_positions(chains);
                }
                info!(
                    "iteration {}: accepts/rejects {}/{}, current [{}]",
                    iter,
                    chains[0].accepts_sum(),
                    chains[0].rejects_sum(),
                    chains[0].params().iter().format(", ")
                );
                writer.flush()?;
            }
        }
        if !self.flags.running() {
            info!("stop requested, shutting down");
        }

        print_current_positions(chains);
        writer.dump_probabilities(None)?;
        writer.flush()?;

        Ok(RunReport {
            iterations: iter,
            best_params: chains[0].params_best().clone(),
            prob_best: chains[0].prob_best(),
            accept_rate: chains[0].accept_rate_global(),
            swap_stats: stats,
            samples: writer.take_samples(),
        })
    }
}

fn print_current_positions<R: Rng, X: Extension>(chains: &[Chain<R, X>]) {
    for (i, chain) in chains.iter().enumerate() {
        info!(
            "chain {:2}: current [{}], best [{}] ({:.4})",
            i,
            chain.params().iter().format(", "),
            chain.params_best().iter().format(", "),
            chain.prob_best()
        );
    }
}

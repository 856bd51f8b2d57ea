//! Bayesian parameter estimation with a parallel-tempered
//! Metropolis-Hastings MCMC sampler.
//!
//! Given observations, a forward model with a likelihood and
//! per-parameter interval priors with starting step widths, this crate
//! produces a chain of posterior samples. Proposal step widths are
//! tuned automatically by one of two calibration strategies, and an
//! ensemble of chains at decreasing inverse temperatures exchanges
//! state to improve mixing on multimodal posteriors.
//!
//! The pieces compose bottom-up:
//!
//! * [`Chain`] owns the state of one sampler instance.
//! * [`ForwardModel`] is the user-supplied likelihood capability.
//! * [`steppers`] performs single Metropolis transitions.
//! * [`calibrate`] tunes the proposal step widths.
//! * [`TemperingRunner`] drives the whole ensemble and reacts to
//!   process signals (SIGINT stops gracefully, SIGUSR1/SIGUSR2 dump
//!   the probability history).

#[cfg(feature = "serde_support")]
#[macro_use]
extern crate serde_derive;

pub mod calibrate;
pub mod chain;
pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod output;
pub mod steppers;
pub mod tempering;
pub mod utils;

pub use crate::calibrate::{calibrate, CalibrationConfig, Strategy};
pub use crate::chain::{Chain, Extension, Tempering};
pub use crate::config::Settings;
pub use crate::error::Error;
pub use crate::io::{ParamSpec, Problem};
pub use crate::model::{FnModel, ForwardModel};
pub use crate::output::SampleWriter;
pub use crate::tempering::{Flags, RunReport, SwapStats, TemperingRunner};

//! Stepping algorithms.

mod metropolis;

pub use self::metropolis::{adapt_stepwidth, step, step_for, MHStatus};

//! State exchange between neighbouring chains.

use log::debug;
use rand::Rng;

use crate::chain::{Chain, Tempering};

/// Bookkeeping of the swap protocol.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct SwapStats {
    /// Swaps proposed between neighbouring chains.
    pub attempts: u64,
    /// Proposed swaps that were taken.
    pub accepts: u64,
    /// Chains kicked back to their best point.
    pub kicks: u64,
}

impl SwapStats {
    /// Fraction of proposed swaps that were taken.
    pub fn acceptance_fraction(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.accepts as f64 / self.attempts as f64
        }
    }
}

/// Maybe exchange state between two neighbouring chains, or kick one
/// chain back to its best point.
///
/// With probability `kick_probability` a random chain has its current
/// point reset to its best point. Otherwise, with probability
/// `1/n_swap`, a random chain and its upper neighbour are proposed for
/// a swap and exchanged with the Metropolis probability implied by
/// their inverse temperatures. Chains keep their temperature; only
/// `params`, `params_best` and `prob_best` move.
pub fn tempering_swap<R: Rng>(
    chains: &mut [Chain<R, Tempering>],
    n_swap: u32,
    kick_probability: f64,
    stats: &mut SwapStats,
) {
    let n_beta = chains.len();
    assert!(n_beta > 0);
    if n_beta == 1 {
        return;
    }

    let u = chains[0].next_uniform();
    if kick_probability > 0.0 && u < kick_probability {
        let a = chains[0].next_index(n_beta);
        debug!("kicking chain {} back to its best point", a);
        let best = chains[a].params_best().clone();
        let prob_best = chains[a].prob_best();
        chains[a].set_params(best);
        chains[a].set_prob(prob_best);
        stats.kicks += 1;
    } else if u < 1.0 / f64::from(n_swap) {
        let a = chains[0].next_index(n_beta);
        let b = (a + 1) % n_beta;
        stats.attempts += 1;
        chains[a].check();
        chains[b].check();

        let a_prob = chains[a].prob();
        let b_prob = chains[b].prob();
        let a_beta = chains[a].beta();
        let b_beta = chains[b].beta();
        // both stored probabilities already carry their own beta, so
        // exchanging the factors evaluates each likelihood at the other
        // temperature
        let r = a_beta * b_prob / b_beta + b_beta * a_prob / a_beta - (a_prob + b_prob);
        let c = chains[0].next_log_uniform();
        if r > c {
            debug!("swapping chains {} and {} (log ratio {:.4})", a, b, r);
            exchange(chains, a, b);
            stats.accepts += 1;
        }
    }
}

/// Exchange `params`, `params_best` and `prob_best` between chains
/// `a` and `b`.
fn exchange<R: Rng>(chains: &mut [Chain<R, Tempering>], a: usize, b: usize) {
    let params_a = chains[a].params().clone();
    let params_b = chains[b].params().clone();
    chains[a].set_params(params_b);
    chains[b].set_params(params_a);

    let best_a = chains[a].params_best().clone();
    let best_b = chains[b].params_best().clone();
    chains[a].set_params_best(best_b);
    chains[b].set_params_best(best_a);

    let prob_best_a = chains[a].prob_best();
    let prob_best_b = chains[b].prob_best();
    chains[a].set_prob_best(prob_best_b);
    chains[b].set_prob_best(prob_best_a);

    chains[a].extension_mut().swap_count += 1;
    chains[b].extension_mut().swap_count += 1;

    chains[a].check();
    chains[b].check();
}

//! Sweep loop, initialization, and the burn-in/thinning keep policy.

use crate::draws::GibbsDraws;
use crate::error::BqrError;
use crate::model::SweepConstants;
use crate::stream::StreamPool;
use crate::sweep::{gibbs_sweep, SweepState};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rayon::ThreadPoolBuilder;

/// Resolve the configured worker count to an actual pool size.
///
/// Negative requests auto-size to half the logical cores (parallelism
/// detection tends to report logical, not physical, cores); zero is
/// normalized to one.
pub(crate) fn resolve_worker_count(requested: i32) -> usize {
    if requested < 0 {
        let logical = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1);
        (logical / 2).max(1)
    } else if requested == 0 {
        1
    } else {
        requested as usize
    }
}

/// Drive `n_burnin_draws + (thinning_factor + 1) * n_keep_draws` sweeps and
/// retain exactly `n_keep_draws` of them.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_sampler(
    y: &Array1<f64>,
    x: &Array2<f64>,
    consts: &SweepConstants,
    initial_beta: Option<&Array1<f64>>,
    hold_scale_fixed: bool,
    worker_count: usize,
    master_rng: &mut StdRng,
    n_burnin_draws: usize,
    n_keep_draws: usize,
    thinning_factor: usize,
) -> Result<GibbsDraws, BqrError> {
    let n = y.len();
    let k = x.ncols();

    let pool = ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .build()
        .expect("worker pool initialization should succeed");
    let mut streams = StreamPool::spawn(master_rng, worker_count);

    // Mismatched (or absent) initial coefficients fall back to zeros.
    let beta0 = match initial_beta {
        Some(beta0) if beta0.len() == k => beta0.clone(),
        _ => Array1::zeros(k),
    };
    let residual = y - &x.dot(&beta0);
    let sigma0 = residual.mapv(|e| e * e).sum() / n as f64;
    let mut state = SweepState {
        beta: beta0,
        // The latent scales start at the initial error-scale estimate.
        nu: Array1::from_elem(n, sigma0),
        sigma: sigma0,
    };
    if hold_scale_fixed {
        state.sigma = 1.0;
    }

    let total_sweeps = n_burnin_draws + (thinning_factor + 1) * n_keep_draws;
    let mut draws = GibbsDraws::with_capacity(k, n, n_keep_draws);

    for sweep_index in 0..total_sweeps {
        gibbs_sweep(y, x, consts, hold_scale_fixed, &pool, &mut streams, &mut state)?;

        if sweep_index >= n_burnin_draws
            && (sweep_index - n_burnin_draws) % (thinning_factor + 1) == 0
        {
            let latent = state.nu.mapv(|v| v / state.sigma);
            draws.push_draw(state.beta.view(), latent.view(), state.sigma)?;
        }
    }

    draws.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_resolution() {
        assert_eq!(resolve_worker_count(0), 1);
        assert_eq!(resolve_worker_count(1), 1);
        assert_eq!(resolve_worker_count(6), 6);
        assert!(resolve_worker_count(-1) >= 1);
    }

    #[test]
    fn keep_policy_counts_retained_sweeps() {
        // Mirror of the loop predicate: retained sweeps per schedule.
        let count = |burnin: usize, keep: usize, thin: usize| {
            let total = burnin + (thin + 1) * keep;
            (0..total)
                .filter(|&s| s >= burnin && (s - burnin) % (thin + 1) == 0)
                .count()
        };
        assert_eq!(count(0, 0, 0), 0);
        assert_eq!(count(10, 0, 3), 0);
        assert_eq!(count(0, 5, 0), 5);
        assert_eq!(count(7, 5, 0), 5);
        assert_eq!(count(7, 5, 2), 5);
        assert_eq!(count(100, 13, 9), 13);
    }
}

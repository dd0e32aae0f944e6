//! One Gibbs sweep for the asymmetric-Laplace mixture representation.
//!
//! Writing the check loss at quantile tau as a normal/exponential mixture
//! (Kozumi & Kobayashi 2011) turns quantile regression into a three-block
//! conjugate Gibbs sampler. With theta = (1 - 2 tau) / (tau (1 - tau)) and
//! omega^2 = 2 / (tau (1 - tau)), each sweep draws, in this fixed order:
//!
//! 1. beta | nu, sigma  — Gaussian, with posterior precision
//!    sum_i x_i x_i^T / (omega^2 sigma nu_i) + prior_precision_inv and
//!    right-hand side sum_i x_i (y_i - theta nu_i) / (omega^2 sigma nu_i).
//! 2. nu_i | beta, sigma — reciprocal of an inverse-Gaussian variate with
//!    gamma = sqrt(2/sigma + theta^2/(sigma omega^2)) and
//!    delta_i = |y_i - x_i beta| / sqrt(sigma omega^2).
//! 3. sigma | beta, nu  — inverse-gamma via the reciprocal of a Gamma draw.
//!
//! Each phase reads the freshest values of the other two blocks, so the
//! phases themselves are sequential; only the per-observation work inside a
//! phase is parallel. Reductions accumulate worker-private partials that
//! are merged sequentially in chunk order, keeping results bitwise
//! reproducible, and the latent draws write disjoint contiguous slices of
//! nu so no synchronization is needed.

use crate::error::BqrError;
use crate::linalg::SpdCholesky;
use crate::model::SweepConstants;
use crate::stream::StreamPool;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Axis};
use rand_distr::{Distribution, Gamma, InverseGaussian, StandardNormal};
use rayon::ThreadPool;
use std::ops::Range;

/// A zero residual would push the inverse-Gaussian mean to infinity.
const DELTA_FLOOR: f64 = 1e-100;

/// Current values of the three Gibbs blocks, mutated once per sweep.
pub(crate) struct SweepState {
    pub beta: Array1<f64>,
    pub nu: Array1<f64>,
    pub sigma: f64,
}

/// Split `0..n` into at most `worker_count` contiguous, non-empty ranges.
pub(crate) fn chunk_ranges(n: usize, worker_count: usize) -> Vec<Range<usize>> {
    let chunk_len = n.div_ceil(worker_count.max(1));
    (0..worker_count.max(1))
        .map(|w| (w * chunk_len).min(n)..((w + 1) * chunk_len).min(n))
        .filter(|r| !r.is_empty())
        .collect()
}

/// Execute one conditional-sampling sweep in the order beta, nu, sigma.
pub(crate) fn gibbs_sweep(
    y: &Array1<f64>,
    x: &Array2<f64>,
    consts: &SweepConstants,
    hold_scale_fixed: bool,
    pool: &ThreadPool,
    streams: &mut StreamPool,
    state: &mut SweepState,
) -> Result<(), BqrError> {
    draw_coefficients(y, x, consts, pool, streams, state)?;
    draw_latent_scales(y, x, consts, pool, streams, state)?;
    if !hold_scale_fixed {
        draw_error_scale(y, x, consts, pool, streams, state)?;
    }
    Ok(())
}

fn draw_coefficients(
    y: &Array1<f64>,
    x: &Array2<f64>,
    consts: &SweepConstants,
    pool: &ThreadPool,
    streams: &mut StreamPool,
    state: &mut SweepState,
) -> Result<(), BqrError> {
    let n = y.len();
    let k = x.ncols();
    let ranges = chunk_ranges(n, streams.len());
    let nu = &state.nu;
    let sigma = state.sigma;

    let precision_partials: Vec<Array2<f64>> = pool.install(|| {
        ranges
            .par_iter()
            .map(|range| {
                let mut acc = Array2::<f64>::zeros((k, k));
                for i in range.clone() {
                    let xi = x.row(i);
                    let w = 1.0 / (consts.omega_sq * sigma * nu[i]);
                    for a in 0..k {
                        let xa_w = xi[a] * w;
                        for b in 0..k {
                            acc[[a, b]] += xa_w * xi[b];
                        }
                    }
                }
                acc
            })
            .collect()
    });

    let rhs_partials: Vec<Array1<f64>> = pool.install(|| {
        ranges
            .par_iter()
            .map(|range| {
                let mut acc = Array1::<f64>::zeros(k);
                for i in range.clone() {
                    let xi = x.row(i);
                    let w = (y[i] - consts.theta * nu[i]) / (consts.omega_sq * sigma * nu[i]);
                    for a in 0..k {
                        acc[a] += xi[a] * w;
                    }
                }
                acc
            })
            .collect()
    });

    // Sequential merge in chunk order keeps the sums run-to-run identical.
    let mut post_precision = Array2::<f64>::zeros((k, k));
    for partial in &precision_partials {
        post_precision += partial;
    }
    post_precision += &consts.prior_precision_inv;

    let mut rhs = Array1::<f64>::zeros(k);
    for partial in &rhs_partials {
        rhs += partial;
    }
    rhs += &consts.prior_mu;

    let precision_factor = post_precision
        .spd_cholesky()
        .map_err(BqrError::numerical("posterior precision matrix"))?;
    let post_var = precision_factor.solve_mat(&Array2::eye(k));
    let post_mean = post_var.dot(&rhs);
    let l = post_var
        .spd_cholesky()
        .map_err(BqrError::numerical("posterior covariance matrix"))?
        .lower_triangular();

    let rng = streams.primary();
    let mut z = Array1::<f64>::zeros(k);
    for value in z.iter_mut() {
        *value = StandardNormal.sample(rng);
    }
    // beta = post_mean + L z, reading only the lower triangle of L.
    for a in 0..k {
        let mut shift = 0.0;
        for b in 0..=a {
            shift += l[[a, b]] * z[b];
        }
        state.beta[a] = post_mean[a] + shift;
    }
    Ok(())
}

fn draw_latent_scales(
    y: &Array1<f64>,
    x: &Array2<f64>,
    consts: &SweepConstants,
    pool: &ThreadPool,
    streams: &mut StreamPool,
    state: &mut SweepState,
) -> Result<(), BqrError> {
    let n = y.len();
    let chunk_len = n.div_ceil(streams.len());
    let sigma = state.sigma;
    let gamma = (2.0 / sigma + consts.theta * consts.theta / (sigma * consts.omega_sq)).sqrt();
    let residual_scale = (sigma * consts.omega_sq).sqrt();
    let beta = &state.beta;
    let nu = &mut state.nu;

    pool.install(|| {
        nu.axis_chunks_iter_mut(Axis(0), chunk_len)
            .into_par_iter()
            .zip(streams.engines_mut().par_iter_mut())
            .enumerate()
            .try_for_each(|(chunk_index, (mut nu_chunk, rng))| {
                let base = chunk_index * chunk_len;
                for (offset, nu_i) in nu_chunk.iter_mut().enumerate() {
                    let i = base + offset;
                    let residual = y[i] - x.row(i).dot(beta);
                    let delta = (residual.abs() / residual_scale).max(DELTA_FLOOR);
                    // nu_i ~ GIG(1/2, delta^2, gamma^2), drawn as the
                    // reciprocal of an IG(gamma/delta, gamma^2) variate.
                    let proposal = InverseGaussian::new(gamma / delta, gamma * gamma).map_err(
                        |e| BqrError::NumericalFailure {
                            context: "inverse-Gaussian latent-scale draw",
                            detail: e.to_string(),
                        },
                    )?;
                    *nu_i = 1.0 / proposal.sample(rng);
                }
                Ok(())
            })
    })
}

fn draw_error_scale(
    y: &Array1<f64>,
    x: &Array2<f64>,
    consts: &SweepConstants,
    pool: &ThreadPool,
    streams: &mut StreamPool,
    state: &mut SweepState,
) -> Result<(), BqrError> {
    let n = y.len();
    let ranges = chunk_ranges(n, streams.len());
    let beta = &state.beta;
    let nu = &state.nu;

    let partials: Vec<f64> = pool.install(|| {
        ranges
            .par_iter()
            .map(|range| {
                let mut acc = 0.0;
                for i in range.clone() {
                    let err = y[i] - x.row(i).dot(beta) - consts.theta * nu[i];
                    acc += err * err / (consts.omega_sq * nu[i]);
                }
                acc
            })
            .collect()
    });
    let sum_err: f64 = partials.iter().sum();

    let post_shape = consts.prior_sigma_shape + 3.0 * n as f64 / 2.0;
    let post_scale = (2.0 * consts.prior_sigma_scale + 2.0 * nu.sum() + sum_err) / 2.0;
    let dist =
        Gamma::new(post_shape, 1.0 / post_scale).map_err(|e| BqrError::NumericalFailure {
            context: "inverse-gamma error-scale draw",
            detail: e.to_string(),
        })?;
    state.sigma = 1.0 / dist.sample(streams.primary());
    Ok(())
}

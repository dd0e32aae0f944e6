//! Fixed-capacity columnar storage for accepted posterior draws.

use crate::error::BqrError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Posterior draws from one sampler run.
///
/// Column j of `beta` and `latent` and entry j of `sigma` come from the
/// same retained sweep. Latent columns hold `nu_i / sigma` as of the sweep
/// that produced them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GibbsDraws {
    beta: Array2<f64>,
    latent: Array2<f64>,
    sigma: Array1<f64>,
    #[serde(skip)]
    cursor: usize,
}

impl GibbsDraws {
    /// Pre-size zeroed storage for exactly `keep_count` retained sweeps.
    pub(crate) fn with_capacity(k: usize, n: usize, keep_count: usize) -> Self {
        GibbsDraws {
            beta: Array2::zeros((k, keep_count)),
            latent: Array2::zeros((n, keep_count)),
            sigma: Array1::zeros(keep_count),
            cursor: 0,
        }
    }

    /// Append one retained sweep at the next free column.
    pub(crate) fn push_draw(
        &mut self,
        beta: ArrayView1<f64>,
        latent: ArrayView1<f64>,
        sigma: f64,
    ) -> Result<(), BqrError> {
        if self.cursor >= self.sigma.len() {
            return Err(BqrError::InternalInvariantViolation(format!(
                "draw store overflow: capacity {} already filled",
                self.sigma.len()
            )));
        }
        self.beta.column_mut(self.cursor).assign(&beta);
        self.latent.column_mut(self.cursor).assign(&latent);
        self.sigma[self.cursor] = sigma;
        self.cursor += 1;
        Ok(())
    }

    /// Check that the keep policy filled every pre-sized column.
    pub(crate) fn finish(self) -> Result<Self, BqrError> {
        if self.cursor != self.sigma.len() {
            return Err(BqrError::InternalInvariantViolation(format!(
                "keep policy retained {} draws but the schedule required {}",
                self.cursor,
                self.sigma.len()
            )));
        }
        Ok(self)
    }

    /// Coefficient draws, K x keep_count.
    pub fn beta(&self) -> &Array2<f64> {
        &self.beta
    }

    /// Latent-scale draws (`nu / sigma`), n x keep_count.
    pub fn latent(&self) -> &Array2<f64> {
        &self.latent
    }

    /// Error-scale draws, length keep_count.
    pub fn sigma(&self) -> &Array1<f64> {
        &self.sigma
    }

    pub fn n_draws(&self) -> usize {
        self.sigma.len()
    }

    /// Posterior mean of the coefficient vector across retained draws.
    pub fn beta_posterior_mean(&self) -> Array1<f64> {
        self.beta
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(self.beta.nrows()))
    }

    /// Posterior mean of the error scale across retained draws.
    pub fn sigma_posterior_mean(&self) -> f64 {
        self.sigma.mean().unwrap_or(0.0)
    }
}

//! Model configuration: data, prior, target quantile, and run options.

use crate::draws::GibbsDraws;
use crate::error::BqrError;
use crate::linalg::spd_inverse;
use crate::sampler;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Prior for the Gaussian coefficient block and the error-scale block.
///
/// `beta_precision` is consumed as a precision-like matrix: it is inverted
/// once at run start and the **inverse** enters the posterior precision and
/// the prior pull term (`inverse * beta_mean`). A large-diagonal input
/// therefore induces a near-flat coefficient prior. Callers supplying a
/// covariance matrix here get the conventional conjugate update; the naming
/// follows the operation surface, not the units.
#[derive(Clone, Debug)]
pub struct PriorSpec {
    pub beta_mean: Array1<f64>,
    pub beta_precision: Array2<f64>,
    pub sigma_shape: f64,
    pub sigma_scale: f64,
}

impl PriorSpec {
    /// Zero mean, identity matrix, shape 3, scale 3.
    pub fn diffuse_default(k: usize) -> Self {
        PriorSpec {
            beta_mean: Array1::zeros(k),
            beta_precision: Array2::eye(k),
            sigma_shape: 3.0,
            sigma_scale: 3.0,
        }
    }
}

/// Closed-form constants derived once per run, before the first sweep.
pub(crate) struct SweepConstants {
    pub theta: f64,
    pub omega_sq: f64,
    pub prior_precision_inv: Array2<f64>,
    pub prior_mu: Array1<f64>,
    pub prior_sigma_shape: f64,
    pub prior_sigma_scale: f64,
}

impl SweepConstants {
    pub(crate) fn derive(tau: f64, prior: &PriorSpec) -> Result<Self, BqrError> {
        let theta = (1.0 - 2.0 * tau) / (tau * (1.0 - tau));
        let omega_sq = 2.0 / (tau * (1.0 - tau));
        let prior_precision_inv = spd_inverse(&prior.beta_precision)
            .map_err(BqrError::numerical("prior precision matrix"))?;
        let prior_mu = prior_precision_inv.dot(&prior.beta_mean);
        Ok(SweepConstants {
            theta,
            omega_sq,
            prior_precision_inv,
            prior_mu,
            prior_sigma_shape: prior.sigma_shape,
            prior_sigma_scale: prior.sigma_scale,
        })
    }
}

/// Bayesian quantile regression model with a Gibbs-sampling `run` operation.
#[derive(Debug)]
pub struct QuantileModel {
    y: Array1<f64>,
    x: Array2<f64>,
    tau: f64,
    prior: PriorSpec,
    initial_beta: Option<Array1<f64>>,
    worker_count: i32,
    hold_scale_fixed: bool,
    master_rng: StdRng,
}

impl QuantileModel {
    /// Build a model from a response vector and an n x K design matrix.
    ///
    /// Starts at the median (tau = 0.5) with the diffuse default prior;
    /// the master random engine is seeded from OS entropy until `set_seed`
    /// is called.
    pub fn new(y: Array1<f64>, x: Array2<f64>) -> Result<Self, BqrError> {
        validate_data(&y, &x)?;
        let k = x.ncols();
        Ok(QuantileModel {
            y,
            x,
            tau: 0.5,
            prior: PriorSpec::diffuse_default(k),
            initial_beta: None,
            worker_count: -1,
            hold_scale_fixed: false,
            master_rng: StdRng::from_os_rng(),
        })
    }

    /// Replace the data, keeping all other configuration.
    pub fn load_data(&mut self, y: Array1<f64>, x: Array2<f64>) -> Result<(), BqrError> {
        validate_data(&y, &x)?;
        self.y = y;
        self.x = x;
        Ok(())
    }

    /// Set the target quantile; must lie strictly inside (0, 1).
    pub fn set_quantile_target(&mut self, tau: f64) -> Result<(), BqrError> {
        if !(tau > 0.0 && tau < 1.0) {
            return Err(BqrError::InvalidParameter(format!(
                "target quantile must lie strictly inside (0, 1), got {tau}"
            )));
        }
        self.tau = tau;
        Ok(())
    }

    /// Set the prior. See [`PriorSpec`] for the units of `beta_precision`.
    pub fn set_prior_params(
        &mut self,
        beta_mean: Array1<f64>,
        beta_precision: Array2<f64>,
        sigma_shape: f64,
        sigma_scale: f64,
    ) -> Result<(), BqrError> {
        let k = self.x.ncols();
        if beta_mean.len() != k {
            return Err(BqrError::DimensionMismatch {
                what: "prior mean vector",
                expected: k,
                found: beta_mean.len(),
            });
        }
        if beta_precision.nrows() != k {
            return Err(BqrError::DimensionMismatch {
                what: "prior precision matrix rows",
                expected: k,
                found: beta_precision.nrows(),
            });
        }
        if beta_precision.ncols() != k {
            return Err(BqrError::DimensionMismatch {
                what: "prior precision matrix columns",
                expected: k,
                found: beta_precision.ncols(),
            });
        }
        if !(sigma_shape > 0.0) || !(sigma_scale > 0.0) {
            return Err(BqrError::InvalidParameter(format!(
                "error-scale prior shape and scale must be positive, got shape {sigma_shape}, scale {sigma_scale}"
            )));
        }
        self.prior = PriorSpec {
            beta_mean,
            beta_precision,
            sigma_shape,
            sigma_scale,
        };
        Ok(())
    }

    /// Initial coefficient vector for the first sweep (optional).
    ///
    /// A vector whose length does not match the design matrix is replaced
    /// by zeros at run start rather than rejected here.
    pub fn set_initial_coefficients(&mut self, beta0: Array1<f64>) {
        self.initial_beta = Some(beta0);
    }

    pub fn initial_coefficients(&self) -> Option<&Array1<f64>> {
        self.initial_beta.as_ref()
    }

    /// Reset the master random engine to a fixed seed.
    pub fn set_seed(&mut self, seed: u64) {
        self.master_rng = StdRng::seed_from_u64(seed);
    }

    /// Number of parallel workers: -1 resolves to half the available
    /// logical cores (at least one), 0 is normalized to one.
    pub fn set_worker_count(&mut self, worker_count: i32) {
        self.worker_count = worker_count;
    }

    pub fn worker_count(&self) -> i32 {
        self.worker_count
    }

    /// Hold the error scale fixed at 1 instead of sampling it.
    pub fn set_hold_scale_fixed(&mut self, hold: bool) {
        self.hold_scale_fixed = hold;
    }

    /// Run the Gibbs sampler.
    ///
    /// Executes `n_burnin_draws + (thinning_factor + 1) * n_keep_draws`
    /// sweeps and retains every `(thinning_factor + 1)`-th post-burn-in
    /// sweep, for exactly `n_keep_draws` stored columns.
    pub fn run(
        &mut self,
        n_burnin_draws: usize,
        n_keep_draws: usize,
        thinning_factor: usize,
    ) -> Result<GibbsDraws, BqrError> {
        let k = self.x.ncols();
        if self.prior.beta_mean.len() != k {
            return Err(BqrError::DimensionMismatch {
                what: "prior mean vector",
                expected: k,
                found: self.prior.beta_mean.len(),
            });
        }
        if self.prior.beta_precision.nrows() != k {
            return Err(BqrError::DimensionMismatch {
                what: "prior precision matrix rows",
                expected: k,
                found: self.prior.beta_precision.nrows(),
            });
        }
        if self.prior.beta_precision.ncols() != k {
            return Err(BqrError::DimensionMismatch {
                what: "prior precision matrix columns",
                expected: k,
                found: self.prior.beta_precision.ncols(),
            });
        }
        let consts = SweepConstants::derive(self.tau, &self.prior)?;
        sampler::run_sampler(
            &self.y,
            &self.x,
            &consts,
            self.initial_beta.as_ref(),
            self.hold_scale_fixed,
            sampler::resolve_worker_count(self.worker_count),
            &mut self.master_rng,
            n_burnin_draws,
            n_keep_draws,
            thinning_factor,
        )
    }
}

fn validate_data(y: &Array1<f64>, x: &Array2<f64>) -> Result<(), BqrError> {
    if y.len() != x.nrows() {
        return Err(BqrError::DimensionMismatch {
            what: "response vector against design matrix rows",
            expected: x.nrows(),
            found: y.len(),
        });
    }
    if y.is_empty() {
        return Err(BqrError::InvalidParameter(
            "at least one observation is required".to_string(),
        ));
    }
    if x.ncols() == 0 {
        return Err(BqrError::InvalidParameter(
            "design matrix must have at least one column".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn toy_model() -> QuantileModel {
        let y = array![1.0, 2.0, 3.0, 4.0];
        let x = Array2::from_shape_vec((4, 2), vec![1.0, 0.5, 1.0, 1.5, 1.0, 2.5, 1.0, 3.5])
            .unwrap();
        QuantileModel::new(y, x).unwrap()
    }

    #[test]
    fn rejects_row_count_mismatch() {
        let y = array![1.0, 2.0, 3.0];
        let x = Array2::<f64>::zeros((4, 2));
        assert!(matches!(
            QuantileModel::new(y, x),
            Err(BqrError::DimensionMismatch { expected: 4, found: 3, .. })
        ));
    }

    #[test]
    fn rejects_empty_data() {
        let err = QuantileModel::new(Array1::zeros(0), Array2::zeros((0, 2))).unwrap_err();
        assert!(matches!(err, BqrError::InvalidParameter(_)));
        let err = QuantileModel::new(array![1.0], Array2::zeros((1, 0))).unwrap_err();
        assert!(matches!(err, BqrError::InvalidParameter(_)));
    }

    #[test]
    fn rejects_quantile_outside_open_interval() {
        let mut model = toy_model();
        for bad in [0.0, 1.0, -0.2, 1.7, f64::NAN] {
            assert!(model.set_quantile_target(bad).is_err(), "tau = {bad}");
        }
        assert!(model.set_quantile_target(0.05).is_ok());
    }

    #[test]
    fn rejects_bad_prior_parameters() {
        let mut model = toy_model();
        let err = model
            .set_prior_params(Array1::zeros(3), Array2::eye(2), 3.0, 3.0)
            .unwrap_err();
        assert!(matches!(
            err,
            BqrError::DimensionMismatch { what: "prior mean vector", .. }
        ));
        // A non-square input reports the dimension that is actually wrong.
        let err = model
            .set_prior_params(Array1::zeros(2), Array2::zeros((3, 2)), 3.0, 3.0)
            .unwrap_err();
        assert!(matches!(
            err,
            BqrError::DimensionMismatch {
                what: "prior precision matrix rows",
                expected: 2,
                found: 3,
            }
        ));
        let err = model
            .set_prior_params(Array1::zeros(2), Array2::zeros((2, 3)), 3.0, 3.0)
            .unwrap_err();
        assert!(matches!(
            err,
            BqrError::DimensionMismatch {
                what: "prior precision matrix columns",
                expected: 2,
                found: 3,
            }
        ));
        for (shape, scale) in [(0.0, 3.0), (3.0, 0.0), (-1.0, 3.0), (f64::NAN, 3.0)] {
            let err = model
                .set_prior_params(Array1::zeros(2), Array2::eye(2), shape, scale)
                .unwrap_err();
            assert!(matches!(err, BqrError::InvalidParameter(_)));
        }
    }

    #[test]
    fn derived_constants_match_closed_forms() {
        let prior = PriorSpec::diffuse_default(2);
        let consts = SweepConstants::derive(0.25, &prior).unwrap();
        // theta = (1 - 2 tau) / (tau (1 - tau)), omega^2 = 2 / (tau (1 - tau))
        assert_abs_diff_eq!(consts.theta, 0.5 / 0.1875, epsilon = 1e-12);
        assert_abs_diff_eq!(consts.omega_sq, 2.0 / 0.1875, epsilon = 1e-12);
        // Identity precision: inverse is identity, prior_mu stays zero.
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(consts.prior_precision_inv[[i, j]], expected, epsilon = 1e-12);
            }
        }
        assert_eq!(consts.prior_mu, Array1::zeros(2));
        assert_eq!(consts.prior_sigma_shape, 3.0);
        assert_eq!(consts.prior_sigma_scale, 3.0);
    }

    #[test]
    fn singular_prior_matrix_fails_before_sampling() {
        let mut model = toy_model();
        let singular = Array2::from_shape_vec((2, 2), vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        model
            .set_prior_params(Array1::zeros(2), singular, 3.0, 3.0)
            .unwrap();
        let err = model.run(10, 10, 0).unwrap_err();
        assert!(matches!(
            err,
            BqrError::NumericalFailure { context: "prior precision matrix", .. }
        ));
    }

    #[test]
    fn median_is_the_default_target() {
        let mut model = toy_model();
        model.set_seed(3);
        model.set_worker_count(1);
        // Runs without any further configuration.
        let draws = model.run(5, 5, 0).unwrap();
        assert_eq!(draws.n_draws(), 5);
    }
}

//! Unscented Kalman Filter.
//!
//! Propagates mean and covariance through the nonlinear motion model with a
//! deterministic sigma-point sample instead of Jacobians. The predict step
//! also projects the predicted state into measurement space and retains the
//! predicted measurement and its innovation covariance, so the correct step
//! and Mahalanobis gating can reuse them.

use crate::motion::{MotionModel, MEASUREMENT_DIM, STATE_DIM};
use crate::{Error, Result};
use nalgebra::{Cholesky, DMatrix, DVector, RowDVector};

/// Singular values of the innovation covariance below this are treated as
/// zero by the pseudo-inverse.
const SVD_TOLERANCE: f64 = 1e-9;

/// Ridge added to a covariance whose Cholesky factorization fails.
const REGULARIZATION: f64 = 1e-9;

/// Sigma-point spread and weighting parameters.
///
/// Common choices: alpha in [1e-4, 1], beta = 2 for Gaussian priors,
/// kappa = 0 or 3 - n.
#[derive(Debug, Clone, Copy)]
pub struct UkfParams {
    /// Primary scaling parameter; smaller values pull the sigma points
    /// toward the mean.
    pub alpha: f64,
    /// Prior-distribution parameter; 2 is optimal for Gaussians.
    pub beta: f64,
    /// Tertiary scaling parameter.
    pub kappa: f64,
}

impl Default for UkfParams {
    fn default() -> Self {
        Self {
            alpha: 1e-3,
            beta: 2.0,
            kappa: 0.0,
        }
    }
}

/// An Unscented Kalman Filter over the shared 12-dimensional state layout.
#[derive(Debug, Clone)]
pub struct UnscentedKalmanFilter {
    model: MotionModel,

    state: DVector<f64>,      // x*, DP x 1
    error_cov: DMatrix<f64>,  // P, DP x DP

    process_noise_cov: DMatrix<f64>,     // Q, DP x DP
    measurement_noise_cov: DMatrix<f64>, // R, MP x MP

    // Retained between predict and correct.
    measurement_estimate: DVector<f64>, // y*, MP x 1
    innovation_cov: DMatrix<f64>,       // Syy, MP x MP
    innovation_cov_inv: DMatrix<f64>,
    transition_centered: DMatrix<f64>,  // Fc, DP x 2*DP+1
    measurement_centered: DMatrix<f64>, // Hc, MP x 2*DP+1

    // Sigma weights.
    wm: DVector<f64>,
    wc: DVector<f64>,
    scale: f64, // sqrt(DP + lambda)
}

impl UnscentedKalmanFilter {
    /// Create a filter from an initial state estimate.
    ///
    /// Returns `InvalidArgument` when any matrix dimension disagrees with
    /// the shared state layout.
    pub fn new(
        model: MotionModel,
        initial_state: DVector<f64>,
        initial_cov: DMatrix<f64>,
        process_noise_cov: DMatrix<f64>,
        measurement_noise_cov: DMatrix<f64>,
        params: UkfParams,
    ) -> Result<Self> {
        if initial_state.len() != STATE_DIM {
            return Err(Error::InvalidArgument(format!(
                "state vector has {} components, expected {}",
                initial_state.len(),
                STATE_DIM
            )));
        }
        if initial_cov.shape() != (STATE_DIM, STATE_DIM)
            || process_noise_cov.shape() != (STATE_DIM, STATE_DIM)
        {
            return Err(Error::InvalidArgument(format!(
                "state covariance must be {0}x{0}",
                STATE_DIM
            )));
        }
        if measurement_noise_cov.shape() != (MEASUREMENT_DIM, MEASUREMENT_DIM) {
            return Err(Error::InvalidArgument(format!(
                "measurement covariance must be {0}x{0}",
                MEASUREMENT_DIM
            )));
        }
        if params.alpha <= 0.0 {
            return Err(Error::InvalidArgument("alpha must be positive".to_string()));
        }

        let n = STATE_DIM as f64;
        let num_points = 2 * STATE_DIM + 1;
        let lambda = params.alpha * params.alpha * (n + params.kappa) - n;

        let mut wm = DVector::from_element(num_points, 0.5 / (n + lambda));
        let mut wc = wm.clone();
        wm[0] = lambda / (n + lambda);
        wc[0] = lambda / (n + lambda) + 1.0 - params.alpha * params.alpha + params.beta;

        let measurement_estimate = model.measurement(&initial_state);
        let innovation_cov = measurement_noise_cov.clone();
        let innovation_cov_inv = Self::pseudo_inverse(&innovation_cov)?;

        Ok(Self {
            model,
            state: initial_state,
            error_cov: initial_cov,
            process_noise_cov,
            measurement_noise_cov,
            measurement_estimate,
            innovation_cov,
            innovation_cov_inv,
            transition_centered: DMatrix::zeros(STATE_DIM, num_points),
            measurement_centered: DMatrix::zeros(MEASUREMENT_DIM, num_points),
            wm,
            wc,
            scale: (n + lambda).sqrt(),
        })
    }

    /// Prediction step over `dt` seconds.
    ///
    /// Advances the state and error covariance, then projects the result
    /// into measurement space, retaining the predicted measurement and the
    /// innovation covariance for `correct`.
    pub fn predict(&mut self, dt: f64) -> Result<()> {
        let num_points = 2 * STATE_DIM + 1;
        let ones = RowDVector::from_element(num_points, 1.0);
        let w = DMatrix::from_diagonal(&self.wc);

        // Propagate sigma points through the transition with zero noise.
        let sigma = self.sigma_points(&self.state, &self.error_cov)?;
        let mut f = DMatrix::zeros(STATE_DIM, num_points);
        for i in 0..num_points {
            f.set_column(i, &self.model.transition(&sigma.column(i).into_owned(), dt));
        }

        self.state = &f * &self.wm;
        let fc = f - &self.state * &ones;
        self.error_cov = &fc * &w * fc.transpose() + &self.process_noise_cov;

        // Re-sample from the predicted moments and project to measurement
        // space so Syy reflects the post-prediction uncertainty.
        let sigma = self.sigma_points(&self.state, &self.error_cov)?;
        let mut h = DMatrix::zeros(MEASUREMENT_DIM, num_points);
        for i in 0..num_points {
            h.set_column(i, &self.model.measurement(&sigma.column(i).into_owned()));
        }

        self.measurement_estimate = &h * &self.wm;
        let hc = h - &self.measurement_estimate * &ones;
        self.innovation_cov = &hc * &w * hc.transpose() + &self.measurement_noise_cov;
        self.innovation_cov_inv = Self::pseudo_inverse(&self.innovation_cov)?;

        self.transition_centered = fc;
        self.measurement_centered = hc;
        Ok(())
    }

    /// Correction step with a measurement vector.
    ///
    /// On a degenerate update (non-finite result) the last good state is
    /// kept and `FilterDegenerate` is reported.
    pub fn correct(&mut self, measurement: &DVector<f64>) -> Result<()> {
        if measurement.len() != MEASUREMENT_DIM {
            return Err(Error::InvalidArgument(format!(
                "measurement has {} components, expected {}",
                measurement.len(),
                MEASUREMENT_DIM
            )));
        }

        let w = DMatrix::from_diagonal(&self.wc);
        let cross = &self.transition_centered * &w * self.measurement_centered.transpose();
        let gain = &cross * &self.innovation_cov_inv;

        let innovation = measurement - &self.measurement_estimate;
        let state = &self.state + &gain * innovation;
        let error_cov = &self.error_cov - &gain * cross.transpose();

        if state.iter().any(|v| !v.is_finite()) || error_cov.iter().any(|v| !v.is_finite()) {
            return Err(Error::FilterDegenerate(
                "corrected state is not finite".to_string(),
            ));
        }

        self.state = state;
        self.error_cov = error_cov;
        Ok(())
    }

    /// Mahalanobis norm of `measurement - y*` under the innovation covariance.
    pub fn innovation_distance(&self, measurement: &DVector<f64>) -> f64 {
        let residual = measurement - &self.measurement_estimate;
        let d_sq = (residual.transpose() * &self.innovation_cov_inv * &residual)[(0, 0)];
        d_sq.max(0.0).sqrt()
    }

    /// Current state estimate.
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    /// Current state error covariance.
    pub fn error_cov(&self) -> &DMatrix<f64> {
        &self.error_cov
    }

    /// Predicted measurement from the last predict step.
    pub fn measurement_estimate(&self) -> &DVector<f64> {
        &self.measurement_estimate
    }

    /// Innovation covariance from the last predict step.
    pub fn innovation_cov(&self) -> &DMatrix<f64> {
        &self.innovation_cov
    }

    /// Pseudo-inverse of the innovation covariance.
    pub fn innovation_cov_inv(&self) -> &DMatrix<f64> {
        &self.innovation_cov_inv
    }

    /// The motion model this filter propagates.
    pub fn model(&self) -> MotionModel {
        self.model
    }

    // Symmetric sigma points: mean, mean +/- scale * L_i with L the lower
    // Cholesky factor. One regularized retry before giving up.
    fn sigma_points(&self, mean: &DVector<f64>, cov: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let l = match Cholesky::new(cov.clone()) {
            Some(chol) => chol.l(),
            None => {
                let regularized = cov + DMatrix::identity(STATE_DIM, STATE_DIM) * REGULARIZATION;
                Cholesky::new(regularized)
                    .ok_or_else(|| {
                        Error::FilterDegenerate(
                            "covariance not positive definite after regularization".to_string(),
                        )
                    })?
                    .l()
            }
        };

        let num_points = 2 * STATE_DIM + 1;
        let mut points = DMatrix::zeros(STATE_DIM, num_points);
        points.set_column(0, mean);
        for i in 0..STATE_DIM {
            let offset = l.column(i) * self.scale;
            points.set_column(1 + i, &(mean + &offset));
            points.set_column(1 + STATE_DIM + i, &(mean - &offset));
        }
        Ok(points)
    }

    fn pseudo_inverse(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let inverse = matrix
            .clone()
            .svd(true, true)
            .pseudo_inverse(SVD_TOLERANCE)
            .map_err(|e| Error::FilterDegenerate(e.to_string()))?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return Err(Error::FilterDegenerate(
                "innovation covariance inverse is not finite".to_string(),
            ));
        }
        Ok(inverse)
    }
}

//! D'Agostini iterative unfolding with deterministic covariance
//! propagation.
//!
//! The unfolding is a fixed number of Bayes iterations starting from the
//! truth distribution as prior. The covariance of the result is the
//! background-subtracted data variance propagated through the
//! final-iteration unfolding matrix; no toy sampling is involved, so the
//! same inputs always give the same output.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zz_core::{Binning, Error, Hist1D, Result};

use crate::response::ResponseMatrix;

/// Default threshold above which the condition number draws a warning.
pub const CONDITION_WARN_DEFAULT: f64 = 1.0e8;

/// The unfolded spectrum with its statistical covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnfoldedResult {
    binning: Binning,
    values: Vec<f64>,
    errors: Vec<f64>,
    /// Row-major n×n statistical covariance.
    covariance: Vec<f64>,
    /// Skipped in the persisted form when infinite (JSON has no
    /// representation for it); absence reads back as infinity.
    #[serde(default = "infinity", skip_serializing_if = "is_infinite")]
    condition_number: f64,
}

fn infinity() -> f64 {
    f64::INFINITY
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_infinite(v: &f64) -> bool {
    v.is_infinite()
}

impl UnfoldedResult {
    /// The binning of the result.
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Unfolded bin contents.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Per-bin statistical errors (sqrt of the covariance diagonal).
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    /// Row-major covariance entries.
    pub fn covariance(&self) -> &[f64] {
        &self.covariance
    }

    /// Covariance entry (i, j).
    pub fn covariance_at(&self, i: usize, j: usize) -> f64 {
        self.covariance[i * self.values.len() + j]
    }

    /// Covariance as a dense matrix.
    pub fn covariance_matrix(&self) -> DMatrix<f64> {
        let n = self.values.len();
        DMatrix::from_row_slice(n, n, &self.covariance)
    }

    /// Condition number of the migration-probability matrix this result
    /// was unfolded with; `+inf` for a degenerate response.
    pub fn condition_number(&self) -> f64 {
        self.condition_number
    }

    /// Sum of the unfolded contents.
    pub fn integral(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Scale to unit integral in place, rescaling errors and covariance
    /// accordingly. A zero integral leaves the result unchanged.
    pub fn normalize(&mut self) {
        let total = self.integral();
        if total == 0.0 {
            return;
        }
        let s = 1.0 / total;
        for v in &mut self.values {
            *v *= s;
        }
        for e in &mut self.errors {
            *e *= s;
        }
        for c in &mut self.covariance {
            *c *= s * s;
        }
    }
}

/// Configured D'Agostini unfolder.
#[derive(Debug, Clone)]
pub struct IterativeUnfolder {
    n_iterations: usize,
    condition_warn_threshold: f64,
}

impl IterativeUnfolder {
    /// Unfolder with the given iteration count.
    pub fn new(n_iterations: usize) -> Result<IterativeUnfolder> {
        if n_iterations == 0 {
            return Err(Error::Validation("iteration count must be at least 1".into()));
        }
        Ok(IterativeUnfolder { n_iterations, condition_warn_threshold: CONDITION_WARN_DEFAULT })
    }

    /// Override the condition-number warning threshold.
    pub fn with_condition_warn_threshold(mut self, threshold: f64) -> IterativeUnfolder {
        self.condition_warn_threshold = threshold;
        self
    }

    /// Unfold the observed spectrum, subtracting the estimated background.
    ///
    /// All binnings must agree. The background-subtracted data is clamped
    /// non-negative before the iteration; bins whose truth column is empty
    /// are pinned at zero with zero error.
    pub fn unfold(
        &self,
        response: &ResponseMatrix,
        data: &Hist1D,
        background: &Hist1D,
    ) -> Result<UnfoldedResult> {
        if data.binning() != response.binning() {
            return Err(Error::Validation(format!(
                "data binning ({} bins) does not match response ({} bins)",
                data.n_bins(),
                response.n_bins()
            )));
        }
        let mut subtracted = data.subtract(background)?;
        subtracted.zero_negative_bins();

        let n = response.n_bins();
        let prob = response.probabilities();
        let eff = response.efficiencies();

        let condition_number = condition_number(&prob);
        if !condition_number.is_finite() {
            warn!(condition = condition_number, "degenerate migration matrix");
        } else if condition_number > self.condition_warn_threshold {
            warn!(condition = condition_number, "poorly conditioned migration matrix");
        } else {
            info!(condition = condition_number, "migration matrix condition number");
        }

        let d = subtracted.values();
        let mut theta: Vec<f64> = response.truth().values().to_vec();
        let mut bayes = DMatrix::<f64>::zeros(n, n);
        for iteration in 0..self.n_iterations {
            // M[t][r] = P(r|t) theta_t / sum_t' P(r|t') theta_t'
            for r in 0..n {
                let denom: f64 = (0..n).map(|t| prob[(r, t)] * theta[t]).sum();
                for t in 0..n {
                    bayes[(t, r)] =
                        if denom > 0.0 { prob[(r, t)] * theta[t] / denom } else { 0.0 };
                }
            }
            for (t, th) in theta.iter_mut().enumerate() {
                *th = if eff[t] > 0.0 {
                    (0..n).map(|r| bayes[(t, r)] * d[r]).sum::<f64>() / eff[t]
                } else {
                    0.0
                };
            }
            debug!(iteration, total = theta.iter().sum::<f64>(), "unfolding iteration");
        }

        // Cov = U V U^T with U the final unfolding matrix and V the
        // diagonal variance of the subtracted data (Poisson fallback for
        // bins with no recorded sumw2).
        let mut unfolding = DMatrix::<f64>::zeros(n, n);
        for t in 0..n {
            if eff[t] > 0.0 {
                for r in 0..n {
                    unfolding[(t, r)] = bayes[(t, r)] / eff[t];
                }
            }
        }
        let variance = DMatrix::<f64>::from_diagonal(&nalgebra::DVector::from_iterator(
            n,
            (0..n).map(|r| {
                let w2 = subtracted.sumw2()[r];
                if w2 > 0.0 { w2 } else { subtracted.values()[r] }
            }),
        ));
        let covariance = &unfolding * variance * unfolding.transpose();

        let errors: Vec<f64> = (0..n).map(|t| covariance[(t, t)].max(0.0).sqrt()).collect();
        let mut cov_flat = Vec::with_capacity(n * n);
        for t in 0..n {
            for u in 0..n {
                cov_flat.push(covariance[(t, u)]);
            }
        }
        Ok(UnfoldedResult {
            binning: data.binning().clone(),
            values: theta,
            errors,
            covariance: cov_flat,
            condition_number,
        })
    }
}

/// Condition number of the migration-probability matrix: the ratio of the
/// largest to the smallest singular value, `+inf` when the smallest is not
/// strictly positive.
pub fn condition_number(prob: &DMatrix<f64>) -> f64 {
    let svd = prob.clone().svd(false, false);
    let mut smax = 0.0_f64;
    let mut smin = f64::INFINITY;
    for &s in svd.singular_values.iter() {
        smax = smax.max(s);
        smin = smin.min(s);
    }
    if smin > 0.0 { smax / smin } else { f64::INFINITY }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use zz_core::Binning;

    #[test]
    fn zero_iterations_rejected() {
        assert!(IterativeUnfolder::new(0).is_err());
        assert!(IterativeUnfolder::new(1).is_ok());
    }

    #[test]
    fn condition_of_identity_is_one() {
        let m = DMatrix::<f64>::identity(4, 4);
        assert_relative_eq!(condition_number(&m), 1.0, max_relative = 1e-12);
    }

    #[test]
    fn condition_of_zero_matrix_is_infinite() {
        let m = DMatrix::<f64>::zeros(3, 3);
        assert!(condition_number(&m).is_infinite());
    }

    #[test]
    fn normalize_rescales_covariance() {
        let mut r = UnfoldedResult {
            binning: Binning::new(vec![0.0, 1.0, 2.0]).unwrap(),
            values: vec![3.0, 1.0],
            errors: vec![1.0, 0.5],
            covariance: vec![1.0, 0.1, 0.1, 0.25],
            condition_number: 1.0,
        };
        r.normalize();
        assert_relative_eq!(r.integral(), 1.0);
        assert_relative_eq!(r.values()[0], 0.75);
        assert_relative_eq!(r.errors()[0], 0.25);
        assert_relative_eq!(r.covariance_at(0, 1), 0.1 / 16.0);
    }
}

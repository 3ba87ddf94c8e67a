//! Weighted 1D/2D histograms with sum-of-weights-squared tracking.
//!
//! These are the workspace's computational histograms: plain bin contents
//! plus sumw2, no under/overflow storage (out-of-range fills are dropped,
//! which keeps response-matrix marginals and directly filled histograms
//! consistent by construction).

use crate::{Binning, Error, Result};
use serde::{Deserialize, Serialize};

/// A weighted 1D histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist1D {
    binning: Binning,
    values: Vec<f64>,
    sumw2: Vec<f64>,
}

impl Hist1D {
    /// Empty histogram over the given binning.
    pub fn new(binning: Binning) -> Hist1D {
        let n = binning.n_bins();
        Hist1D { binning, values: vec![0.0; n], sumw2: vec![0.0; n] }
    }

    /// The binning.
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.values.len()
    }

    /// Bin contents.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Sum of squared weights per bin.
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    /// Statistical error of bin `i` (sqrt of sumw2).
    pub fn error(&self, i: usize) -> f64 {
        self.sumw2[i].max(0.0).sqrt()
    }

    /// Statistical errors for all bins.
    pub fn errors(&self) -> Vec<f64> {
        (0..self.n_bins()).map(|i| self.error(i)).collect()
    }

    /// Fill with a weighted entry. Out-of-range values are dropped.
    pub fn fill(&mut self, x: f64, weight: f64) {
        if let Some(b) = self.binning.find_bin(x) {
            self.values[b] += weight;
            self.sumw2[b] += weight * weight;
        }
    }

    /// Set bin `i` to an explicit (value, sumw2) pair.
    pub fn set(&mut self, i: usize, value: f64, sumw2: f64) {
        self.values[i] = value;
        self.sumw2[i] = sumw2;
    }

    /// Sum of all bin contents.
    pub fn integral(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Bin-wise sum. Fails on mismatched binnings.
    pub fn add(&self, other: &Hist1D) -> Result<Hist1D> {
        self.check_binning(other)?;
        let mut out = self.clone();
        for i in 0..out.values.len() {
            out.values[i] += other.values[i];
            out.sumw2[i] += other.sumw2[i];
        }
        Ok(out)
    }

    /// Bin-wise difference (errors still add in quadrature). Fails on
    /// mismatched binnings.
    pub fn subtract(&self, other: &Hist1D) -> Result<Hist1D> {
        self.check_binning(other)?;
        let mut out = self.clone();
        for i in 0..out.values.len() {
            out.values[i] -= other.values[i];
            out.sumw2[i] += other.sumw2[i];
        }
        Ok(out)
    }

    /// Copy scaled by a constant factor.
    pub fn scaled(&self, factor: f64) -> Hist1D {
        let mut out = self.clone();
        for i in 0..out.values.len() {
            out.values[i] *= factor;
            out.sumw2[i] *= factor * factor;
        }
        out
    }

    /// Divide by the integral in place. A zero integral leaves the
    /// histogram unchanged.
    pub fn normalize(&mut self) {
        let total = self.integral();
        if total != 0.0 {
            *self = self.scaled(1.0 / total);
        }
    }

    /// Clamp negative bins to zero (value and sumw2).
    pub fn zero_negative_bins(&mut self) {
        for i in 0..self.values.len() {
            if self.values[i] < 0.0 {
                self.values[i] = 0.0;
                self.sumw2[i] = 0.0;
            }
        }
    }

    /// Background-estimate floor: negative bins become exactly (0, 0±0);
    /// any bin whose error exceeds its value has the error capped at the
    /// value.
    pub fn ensure_nonneg(&mut self) {
        for i in 0..self.values.len() {
            if self.values[i] < 0.0 {
                self.values[i] = 0.0;
                self.sumw2[i] = 0.0;
            } else if self.error(i) > self.values[i] {
                self.sumw2[i] = self.values[i] * self.values[i];
            }
        }
    }

    fn check_binning(&self, other: &Hist1D) -> Result<()> {
        if self.binning != other.binning {
            return Err(Error::Validation(format!(
                "histogram binnings differ ({} vs {} bins)",
                self.n_bins(),
                other.n_bins()
            )));
        }
        Ok(())
    }
}

/// A weighted 2D histogram over (reco bin × truth bin).
///
/// Row-major storage: index `r * n_truth + t`. Owned by the unfolding for
/// one (channel, variable, systematic) triple and immutable once filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist2D {
    x_binning: Binning,
    y_binning: Binning,
    values: Vec<f64>,
    sumw2: Vec<f64>,
}

impl Hist2D {
    /// Empty 2D histogram; `x` is the reco axis, `y` the truth axis.
    pub fn new(x_binning: Binning, y_binning: Binning) -> Hist2D {
        let n = x_binning.n_bins() * y_binning.n_bins();
        Hist2D { x_binning, y_binning, values: vec![0.0; n], sumw2: vec![0.0; n] }
    }

    /// Reco-axis binning.
    pub fn x_binning(&self) -> &Binning {
        &self.x_binning
    }

    /// Truth-axis binning.
    pub fn y_binning(&self) -> &Binning {
        &self.y_binning
    }

    /// Number of reco bins.
    pub fn n_x(&self) -> usize {
        self.x_binning.n_bins()
    }

    /// Number of truth bins.
    pub fn n_y(&self) -> usize {
        self.y_binning.n_bins()
    }

    /// Content of bin (reco `x`, truth `y`).
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.values[x * self.n_y() + y]
    }

    /// Fill with a weighted (reco, truth) pair; either value out of range
    /// drops the entry.
    pub fn fill(&mut self, x_val: f64, y_val: f64, weight: f64) {
        let (Some(bx), Some(by)) = (self.x_binning.find_bin(x_val), self.y_binning.find_bin(y_val))
        else {
            return;
        };
        let idx = bx * self.n_y() + by;
        self.values[idx] += weight;
        self.sumw2[idx] += weight * weight;
    }

    /// Sum of all bin contents.
    pub fn integral(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Marginal over the truth axis: one entry per reco bin.
    pub fn x_marginal(&self) -> Hist1D {
        let mut out = Hist1D::new(self.x_binning.clone());
        for x in 0..self.n_x() {
            let mut v = 0.0;
            let mut w2 = 0.0;
            for y in 0..self.n_y() {
                v += self.values[x * self.n_y() + y];
                w2 += self.sumw2[x * self.n_y() + y];
            }
            out.set(x, v, w2);
        }
        out
    }

    /// Marginal over the reco axis: one entry per truth bin.
    pub fn y_marginal(&self) -> Hist1D {
        let mut out = Hist1D::new(self.y_binning.clone());
        for y in 0..self.n_y() {
            let mut v = 0.0;
            let mut w2 = 0.0;
            for x in 0..self.n_x() {
                v += self.values[x * self.n_y() + y];
                w2 += self.sumw2[x * self.n_y() + y];
            }
            out.set(y, v, w2);
        }
        out
    }
}

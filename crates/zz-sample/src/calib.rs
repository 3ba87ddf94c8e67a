//! Calibration lookup tables, consumed as opaque JSON inputs.
//!
//! Pileup reweighting is a 1D table keyed by the true number of pileup
//! interactions, with nominal/up/down variants. Fake factors are 2D tables
//! in (|η|, pT) per lepton flavor. Lookups clamp out-of-range values into
//! the nearest edge bin rather than dropping them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use zz_core::{Binning, Error, Result, Shift};

fn clamped_bin(binning: &Binning, val: f64) -> usize {
    match binning.find_bin(val) {
        Some(b) => b,
        None => {
            if val < binning.edges()[0] {
                0
            } else {
                binning.n_bins() - 1
            }
        }
    }
}

/// Pileup reweighting table with ±1σ variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PileupTable {
    binning: Binning,
    nominal: Vec<f64>,
    up: Vec<f64>,
    down: Vec<f64>,
}

impl PileupTable {
    /// Build from a binning and the three weight vectors.
    pub fn new(binning: Binning, nominal: Vec<f64>, up: Vec<f64>, down: Vec<f64>) -> Result<Self> {
        let n = binning.n_bins();
        if nominal.len() != n || up.len() != n || down.len() != n {
            return Err(Error::Validation(format!(
                "pileup table length mismatch: {} bins vs {}/{}/{} weights",
                n,
                nominal.len(),
                up.len(),
                down.len()
            )));
        }
        Ok(PileupTable { binning, nominal, up, down })
    }

    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let table: PileupTable = serde_json::from_str(&text)?;
        PileupTable::new(table.binning, table.nominal, table.up, table.down)
    }

    /// Per-event weight for a given true pileup count and shift.
    pub fn weight(&self, n_true_pu: f64, shift: Shift) -> f64 {
        let b = clamped_bin(&self.binning, n_true_pu);
        match shift {
            Shift::Nominal => self.nominal[b],
            Shift::Up => self.up[b],
            Shift::Down => self.down[b],
        }
    }
}

/// Fake-factor table in (|η|, pT) for one lepton flavor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeFactorTable {
    abs_eta_binning: Binning,
    pt_binning: Binning,
    /// Row-major: `factors[eta_bin * n_pt + pt_bin]`.
    factors: Vec<f64>,
}

impl FakeFactorTable {
    /// Build from binnings and the factor grid.
    pub fn new(abs_eta_binning: Binning, pt_binning: Binning, factors: Vec<f64>) -> Result<Self> {
        let expected = abs_eta_binning.n_bins() * pt_binning.n_bins();
        if factors.len() != expected {
            return Err(Error::Validation(format!(
                "fake factor grid has {} entries, expected {}",
                factors.len(),
                expected
            )));
        }
        Ok(FakeFactorTable { abs_eta_binning, pt_binning, factors })
    }

    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let table: FakeFactorTable = serde_json::from_str(&text)?;
        FakeFactorTable::new(table.abs_eta_binning, table.pt_binning, table.factors)
    }

    /// Fake factor for a lepton at (η, pT). The η sign is dropped.
    pub fn lookup(&self, eta: f64, pt: f64) -> f64 {
        let be = clamped_bin(&self.abs_eta_binning, eta.abs());
        let bp = clamped_bin(&self.pt_binning, pt);
        self.factors[be * self.pt_binning.n_bins() + bp]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pu_table() -> PileupTable {
        PileupTable::new(
            Binning::new(vec![0.0, 10.0, 20.0, 30.0]).unwrap(),
            vec![1.1, 1.0, 0.9],
            vec![1.2, 1.05, 0.95],
            vec![1.0, 0.95, 0.85],
        )
        .unwrap()
    }

    #[test]
    fn pileup_lookup_and_shift() {
        let t = pu_table();
        assert_relative_eq!(t.weight(5.0, Shift::Nominal), 1.1);
        assert_relative_eq!(t.weight(15.0, Shift::Up), 1.05);
        assert_relative_eq!(t.weight(25.0, Shift::Down), 0.85);
    }

    #[test]
    fn pileup_clamps_out_of_range() {
        let t = pu_table();
        assert_relative_eq!(t.weight(-3.0, Shift::Nominal), 1.1);
        assert_relative_eq!(t.weight(80.0, Shift::Nominal), 0.9);
    }

    #[test]
    fn pileup_length_mismatch() {
        let r = PileupTable::new(
            Binning::new(vec![0.0, 10.0]).unwrap(),
            vec![1.0, 2.0],
            vec![1.0],
            vec![1.0],
        );
        assert!(r.is_err());
    }

    #[test]
    fn fake_factor_lookup() {
        let t = FakeFactorTable::new(
            Binning::new(vec![0.0, 1.5, 2.5]).unwrap(),
            Binning::new(vec![0.0, 20.0, 50.0]).unwrap(),
            vec![0.10, 0.05, 0.20, 0.08],
        )
        .unwrap();
        assert_relative_eq!(t.lookup(0.4, 10.0), 0.10);
        assert_relative_eq!(t.lookup(-0.4, 10.0), 0.10); // |eta|
        assert_relative_eq!(t.lookup(2.0, 30.0), 0.08);
        assert_relative_eq!(t.lookup(4.0, 500.0), 0.08); // clamped
    }
}

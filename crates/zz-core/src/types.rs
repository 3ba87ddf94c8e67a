//! Common data types: analysis channels, event identity, binnings.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Nominal Z boson mass in GeV, used for same-flavor Z pairing decisions.
pub const Z_MASS: f64 = 91.1876;

/// Lepton flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeptonFlavor {
    /// Electron
    Electron,
    /// Muon
    Muon,
}

/// Final-state category of a four-lepton candidate.
///
/// All histograms, response matrices and background estimates are scoped to
/// one channel; cross-channel combination happens only in the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Four electrons (eeee)
    E4,
    /// Two electrons, two muons (eemm)
    E2Mu2,
    /// Four muons (mmmm)
    Mu4,
}

impl Channel {
    /// All channels, in the fixed analysis order.
    pub const ALL: [Channel; 3] = [Channel::E4, Channel::E2Mu2, Channel::Mu4];

    /// Short channel label used in file names and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::E4 => "eeee",
            Channel::E2Mu2 => "eemm",
            Channel::Mu4 => "mmmm",
        }
    }

    /// Parse a channel label.
    pub fn parse(s: &str) -> Result<Channel> {
        match s {
            "eeee" => Ok(Channel::E4),
            "eemm" => Ok(Channel::E2Mu2),
            "mmmm" => Ok(Channel::Mu4),
            other => Err(Error::Validation(format!("unknown channel '{other}'"))),
        }
    }

    /// Lepton flavor of each of the four final-state leptons, in object order.
    pub fn lepton_flavors(&self) -> [LeptonFlavor; 4] {
        use LeptonFlavor::{Electron, Muon};
        match self {
            Channel::E4 => [Electron; 4],
            Channel::E2Mu2 => [Electron, Electron, Muon, Muon],
            Channel::Mu4 => [Muon; 4],
        }
    }

    /// Whether the final state contains electrons.
    pub fn has_electrons(&self) -> bool {
        !matches!(self, Channel::Mu4)
    }

    /// Whether the final state contains muons.
    pub fn has_muons(&self) -> bool {
        !matches!(self, Channel::E4)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable identity of one recorded or simulated event.
///
/// Matched reco/truth pairs and data deduplication are keyed on this triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    /// Run number.
    pub run: u32,
    /// Luminosity section.
    pub lumi: u32,
    /// Event number within the lumi section.
    pub event: u64,
}

/// A ±1σ shift selector for calibration-style systematics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Shift {
    /// Shift down by one standard deviation.
    Down,
    /// No shift.
    #[default]
    Nominal,
    /// Shift up by one standard deviation.
    Up,
}

impl Shift {
    /// Suffix used in systematic names ("dn", "", "up").
    pub fn suffix(&self) -> &'static str {
        match self {
            Shift::Down => "dn",
            Shift::Nominal => "",
            Shift::Up => "up",
        }
    }
}

/// An ordered sequence of strictly increasing bin edges for one variable.
///
/// The same binning is shared between the reco and truth axes of a response
/// matrix, and must equal the observed-data histogram's binning for the
/// unfolding to be well posed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    edges: Vec<f64>,
}

impl Binning {
    /// Build from explicit edges. Fails unless there are at least two edges
    /// and they are strictly increasing.
    pub fn new(edges: Vec<f64>) -> Result<Binning> {
        if edges.len() < 2 {
            return Err(Error::Validation(format!(
                "binning needs at least 2 edges, got {}",
                edges.len()
            )));
        }
        for w in edges.windows(2) {
            if !(w[1] > w[0]) {
                return Err(Error::Validation(format!(
                    "bin edges must be strictly increasing ({} then {})",
                    w[0], w[1]
                )));
            }
        }
        Ok(Binning { edges })
    }

    /// Uniform binning with `n` bins on [lo, hi).
    pub fn uniform(n: usize, lo: f64, hi: f64) -> Result<Binning> {
        if n == 0 {
            return Err(Error::Validation("uniform binning needs n > 0".into()));
        }
        let w = (hi - lo) / n as f64;
        Binning::new((0..=n).map(|i| lo + i as f64 * w).collect())
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Bin edges (length `n_bins() + 1`).
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Width of bin `i`.
    pub fn width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    /// Bin index for a value, or `None` for under/overflow.
    pub fn find_bin(&self, val: f64) -> Option<usize> {
        if !val.is_finite() || val < self.edges[0] || val >= self.edges[self.edges.len() - 1] {
            return None;
        }
        match self.edges.binary_search_by(|e| e.total_cmp(&val)) {
            Ok(i) => {
                if i >= self.edges.len() - 1 {
                    None
                } else {
                    Some(i)
                }
            }
            Err(i) => {
                if i == 0 || i >= self.edges.len() {
                    None
                } else {
                    Some(i - 1)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_flavors() {
        assert!(Channel::E4.has_electrons());
        assert!(!Channel::E4.has_muons());
        assert!(Channel::E2Mu2.has_electrons());
        assert!(Channel::E2Mu2.has_muons());
        assert_eq!(Channel::parse("mmmm").unwrap(), Channel::Mu4);
        assert!(Channel::parse("emem").is_err());
    }

    #[test]
    fn binning_validation() {
        assert!(Binning::new(vec![0.0]).is_err());
        assert!(Binning::new(vec![0.0, 0.0, 1.0]).is_err());
        assert!(Binning::new(vec![0.0, 2.0, 1.0]).is_err());
        let b = Binning::new(vec![0.0, 1.0, 3.0]).unwrap();
        assert_eq!(b.n_bins(), 2);
        assert_eq!(b.width(1), 2.0);
    }

    #[test]
    fn find_bin_edge_cases() {
        let b = Binning::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(b.find_bin(-0.5), None);
        assert_eq!(b.find_bin(3.0), None);
        assert_eq!(b.find_bin(f64::NAN), None);
        assert_eq!(b.find_bin(0.0), Some(0));
        assert_eq!(b.find_bin(1.0), Some(1));
        assert_eq!(b.find_bin(2.99), Some(2));
    }

    #[test]
    fn uniform_binning() {
        let b = Binning::uniform(4, 0.0, 2.0).unwrap();
        assert_eq!(b.n_bins(), 4);
        assert_eq!(b.edges()[2], 1.0);
    }
}

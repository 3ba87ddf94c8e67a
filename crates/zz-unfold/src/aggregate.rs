//! Systematic-uncertainty aggregation: per-bin sign assignment of up/down
//! pairs, quadrature totals, and cross-channel combination.
//!
//! Deltas are signed differences `varied − nominal` per bin; the band that
//! comes out is a pair of non-negative per-bin deviations.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;
use zz_core::{Channel, Error, Result};

use crate::bayes::UnfoldedResult;
use crate::systematics::Systematic;

/// Per-bin absolute up/down uncertainty deviations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncertaintyBand {
    /// Upward deviations, one per bin, non-negative.
    pub up: Vec<f64>,
    /// Downward deviations, one per bin, non-negative.
    pub down: Vec<f64>,
}

impl UncertaintyBand {
    /// All-zero band over `n` bins.
    pub fn zeros(n: usize) -> UncertaintyBand {
        UncertaintyBand { up: vec![0.0; n], down: vec![0.0; n] }
    }

    /// Band from an up-named and a down-named signed delta.
    ///
    /// Per bin: deltas of opposite sign keep their natural direction; when
    /// both push the same way, the larger magnitude goes to that direction
    /// and the smaller to the other. The assignment depends only on the
    /// values, never on evaluation order.
    pub fn from_pair(up_delta: &[f64], dn_delta: &[f64]) -> UncertaintyBand {
        let n = up_delta.len();
        let mut band = UncertaintyBand::zeros(n);
        for i in 0..n {
            let (u, d) = (up_delta[i], dn_delta[i]);
            if u > 0.0 && d < 0.0 {
                band.up[i] = u;
                band.down[i] = -d;
            } else if d > 0.0 && u < 0.0 {
                band.up[i] = d;
                band.down[i] = -u;
            } else {
                let hi = u.abs().max(d.abs());
                let lo = u.abs().min(d.abs());
                if u > 0.0 || d > 0.0 {
                    band.up[i] = hi;
                    band.down[i] = lo;
                } else {
                    band.up[i] = lo;
                    band.down[i] = hi;
                }
            }
        }
        band
    }

    /// Symmetric band from a single signed delta: |delta| both ways.
    pub fn symmetric(delta: &[f64]) -> UncertaintyBand {
        let abs: Vec<f64> = delta.iter().map(|d| d.abs()).collect();
        UncertaintyBand { up: abs.clone(), down: abs }
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.up.len()
    }

    /// Quadrature sum over a set of bands.
    pub fn quadrature<'a>(bands: impl IntoIterator<Item = &'a UncertaintyBand>) -> UncertaintyBand {
        let mut total: Option<UncertaintyBand> = None;
        for band in bands {
            let t = total.get_or_insert_with(|| UncertaintyBand::zeros(band.n_bins()));
            for i in 0..band.n_bins() {
                t.up[i] = (t.up[i] * t.up[i] + band.up[i] * band.up[i]).sqrt();
                t.down[i] = (t.down[i] * t.down[i] + band.down[i] * band.down[i]).sqrt();
            }
        }
        total.unwrap_or_else(|| UncertaintyBand::zeros(0))
    }

    /// Copy with every deviation scaled by a constant factor.
    pub fn scaled(&self, factor: f64) -> UncertaintyBand {
        UncertaintyBand {
            up: self.up.iter().map(|v| v * factor).collect(),
            down: self.down.iter().map(|v| v * factor).collect(),
        }
    }
}

/// Signed per-bin deltas `varied − nominal`.
pub fn deltas(nominal: &[f64], varied: &[f64]) -> Vec<f64> {
    nominal.iter().zip(varied).map(|(n, v)| v - n).collect()
}

/// Envelope of the QCD-scale variations: per-bin (max − nominal,
/// min − nominal) over all variants, as a signed up/down delta pair.
pub fn scale_envelope(nominal: &[f64], variants: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let n = nominal.len();
    let mut up = vec![0.0; n];
    let mut dn = vec![0.0; n];
    for i in 0..n {
        let mut hi = nominal[i];
        let mut lo = nominal[i];
        for v in variants {
            hi = hi.max(v[i]);
            lo = lo.min(v[i]);
        }
        up[i] = hi - nominal[i];
        dn[i] = lo - nominal[i];
    }
    (up, dn)
}

/// Per-bin RMS deviation of the PDF replica variations from the nominal.
pub fn pdf_rms(nominal: &[f64], variants: &[Vec<f64>]) -> Vec<f64> {
    let n = nominal.len();
    if variants.is_empty() {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| {
            let ss: f64 = variants.iter().map(|v| (v[i] - nominal[i]).powi(2)).sum();
            (ss / variants.len() as f64).sqrt()
        })
        .collect()
}

/// One channel's aggregated measurement: central values, statistical
/// errors, and one band per systematic base name.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelResult {
    /// The channel.
    pub channel: Channel,
    /// Unfolded central values.
    pub values: Vec<f64>,
    /// Statistical errors.
    pub stat_errors: Vec<f64>,
    /// Systematic bands keyed by base name.
    pub bands: BTreeMap<String, UncertaintyBand>,
}

impl ChannelResult {
    /// Aggregate one channel's variations against its nominal result.
    ///
    /// `variations` maps systematic names (`"pu_up"`, `"generator"`, ...)
    /// to the varied unfolded values. Names present with both `_up` and
    /// `_dn` suffixes form a pair; unpaired names are symmetrised.
    /// Coverage may be partial; absent variations simply contribute no
    /// band.
    pub fn aggregate(
        channel: Channel,
        nominal: &UnfoldedResult,
        variations: &BTreeMap<String, Vec<f64>>,
    ) -> ChannelResult {
        let mut bands: BTreeMap<String, UncertaintyBand> = BTreeMap::new();
        for (name, varied) in variations {
            let base = Systematic::base_name(name);
            if bands.contains_key(base) {
                continue;
            }
            let band = if name.ends_with("_up") || name.ends_with("_dn") {
                let up = variations.get(&format!("{base}_up"));
                let dn = variations.get(&format!("{base}_dn"));
                match (up, dn) {
                    (Some(u), Some(d)) => UncertaintyBand::from_pair(
                        &deltas(nominal.values(), u),
                        &deltas(nominal.values(), d),
                    ),
                    (Some(one), None) | (None, Some(one)) => {
                        UncertaintyBand::symmetric(&deltas(nominal.values(), one))
                    }
                    (None, None) => continue,
                }
            } else {
                UncertaintyBand::symmetric(&deltas(nominal.values(), varied))
            };
            bands.insert(base.to_string(), band);
        }
        debug!(channel = %channel, n_sources = bands.len(), "aggregated systematic bands");
        ChannelResult {
            channel,
            values: nominal.values().to_vec(),
            stat_errors: nominal.errors().to_vec(),
            bands,
        }
    }

    /// Quadrature total over all systematic sources.
    pub fn total_band(&self) -> UncertaintyBand {
        if self.bands.is_empty() {
            return UncertaintyBand::zeros(self.values.len());
        }
        UncertaintyBand::quadrature(self.bands.values())
    }
}

/// The cross-channel combination.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedResult {
    /// Combined central values (bin-wise channel sum, optionally
    /// renormalised to unit integral).
    pub values: Vec<f64>,
    /// Statistical errors, channels added in quadrature.
    pub stat_errors: Vec<f64>,
    /// Combined systematic bands keyed by base name.
    pub bands: BTreeMap<String, UncertaintyBand>,
    /// Quadrature total over all sources.
    pub total: UncertaintyBand,
}

/// Combine per-channel results into one measurement.
///
/// The combined central value is the bin-wise sum. Each channel's band is
/// rescaled bin-wise by that channel's share of the combined value before
/// the linear sum over channels; the totals are then quadrature sums over
/// base names. With `normalize`, the combined result is scaled to unit
/// integral at the end.
pub fn combine_channels(channels: &[ChannelResult], normalize: bool) -> Result<CombinedResult> {
    let Some(first) = channels.first() else {
        return Err(Error::Validation("no channel results to combine".into()));
    };
    let n = first.values.len();
    for c in channels {
        if c.values.len() != n {
            return Err(Error::Validation(format!(
                "channel {} has {} bins, expected {}",
                c.channel,
                c.values.len(),
                n
            )));
        }
    }

    let mut values = vec![0.0; n];
    let mut stat_sq = vec![0.0; n];
    for c in channels {
        for i in 0..n {
            values[i] += c.values[i];
            stat_sq[i] += c.stat_errors[i] * c.stat_errors[i];
        }
    }

    let mut names: Vec<&String> = channels.iter().flat_map(|c| c.bands.keys()).collect();
    names.sort();
    names.dedup();

    let mut bands: BTreeMap<String, UncertaintyBand> = BTreeMap::new();
    for name in names {
        let mut combined = UncertaintyBand::zeros(n);
        for c in channels {
            let Some(band) = c.bands.get(name) else { continue };
            for i in 0..n {
                let share = if values[i] != 0.0 { c.values[i] / values[i] } else { 0.0 };
                combined.up[i] += band.up[i] * share;
                combined.down[i] += band.down[i] * share;
            }
        }
        bands.insert(name.clone(), combined);
    }

    let total = if bands.is_empty() {
        UncertaintyBand::zeros(n)
    } else {
        UncertaintyBand::quadrature(bands.values())
    };

    let mut out = CombinedResult {
        values,
        stat_errors: stat_sq.into_iter().map(f64::sqrt).collect(),
        bands,
        total,
    };
    if normalize {
        let integral: f64 = out.values.iter().sum();
        if integral != 0.0 {
            let s = 1.0 / integral;
            for v in &mut out.values {
                *v *= s;
            }
            for e in &mut out.stat_errors {
                *e *= s;
            }
            for band in out.bands.values_mut() {
                *band = band.scaled(s);
            }
            out.total = out.total.scaled(s);
        }
    }
    Ok(out)
}

//! Event records and the JSON sample-file format.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use zz_core::{EventId, LeptonFlavor};

/// One final-state lepton of a candidate, with the per-lepton quantities the
/// weighting and fake-estimation code needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lepton {
    /// Lepton flavor.
    pub flavor: LeptonFlavor,
    /// Transverse momentum in GeV.
    pub pt: f64,
    /// Pseudorapidity (signed).
    pub eta: f64,
    /// Efficiency scale factor for this lepton.
    #[serde(default = "one")]
    pub eff_sf: f64,
    /// Symmetric uncertainty on the efficiency scale factor.
    #[serde(default)]
    pub eff_sf_err: f64,
    /// Passes the tight identification requirement.
    #[serde(default = "yes")]
    pub tight_id: bool,
    /// Passes the isolation requirement.
    #[serde(default = "yes")]
    pub isolated: bool,
}

impl Lepton {
    /// Whether this lepton counts as prompt-like (tight ID and isolated).
    pub fn passes_tight(&self) -> bool {
        self.tight_id && self.isolated
    }
}

fn one() -> f64 {
    1.0
}

fn yes() -> bool {
    true
}

/// One reconstructed (or truth-level) four-lepton candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Identifying run/lumi/event triple.
    pub id: EventId,
    /// Named kinematic observables (e.g. "Mass", "Pt", "e1_e2_Mass").
    pub values: HashMap<String, f64>,
    /// True number of pileup interactions (MC only; 0 for data).
    #[serde(default)]
    pub n_true_pu: f64,
    /// Generator weight (MC only; 1 for data).
    #[serde(default = "one")]
    pub gen_weight: f64,
    /// The four final-state leptons, in object order.
    #[serde(default)]
    pub leptons: Vec<Lepton>,
    /// LHE QCD-scale variation weights, if the generator provides them.
    #[serde(default)]
    pub scale_weights: Vec<f64>,
    /// LHE PDF (and trailing αs) variation weights, if provided.
    #[serde(default)]
    pub pdf_weights: Vec<f64>,
}

impl Event {
    /// Look up a named kinematic value.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Sample-level metadata carried in each event file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMeta {
    /// Sample name (e.g. "ZZTo4L", "GluGluZZTo4e", "data2016B").
    pub name: String,
    /// Whether this is simulation (false for collision data).
    #[serde(default)]
    pub is_mc: bool,
    /// Cross section in pb (MC only).
    #[serde(default)]
    pub xsec: f64,
    /// Sum of generator weights over the full sample (MC only).
    #[serde(default = "one")]
    pub sum_w: f64,
    /// k-factor applied on top of the cross section.
    #[serde(default = "one")]
    pub k_factor: f64,
}

impl SampleMeta {
    /// Cross-section normalisation constant: xsec × lumi × k / Σw.
    /// Data samples are not rescaled.
    pub fn const_scale(&self, int_lumi: f64) -> f64 {
        if !self.is_mc || self.sum_w == 0.0 {
            return 1.0;
        }
        self.xsec * int_lumi * self.k_factor / self.sum_w
    }
}

/// On-disk sample file: metadata plus the event list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleFile {
    /// Sample metadata.
    pub meta: SampleMeta,
    /// Events in file order.
    pub events: Vec<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn const_scale() {
        let meta = SampleMeta {
            name: "ZZTo4L".into(),
            is_mc: true,
            xsec: 1.256,
            sum_w: 1.0e6,
            k_factor: 1.1,
        };
        assert_relative_eq!(meta.const_scale(35900.0), 1.256 * 35900.0 * 1.1 / 1.0e6);

        let data = SampleMeta {
            name: "data2016B".into(),
            is_mc: false,
            xsec: 0.0,
            sum_w: 1.0,
            k_factor: 1.0,
        };
        assert_eq!(data.const_scale(35900.0), 1.0);
    }

    #[test]
    fn event_roundtrip() {
        let json = r#"{
            "id": {"run": 274968, "lumi": 12, "event": 123456789},
            "values": {"Mass": 251.3, "Pt": 44.0},
            "n_true_pu": 23.5,
            "gen_weight": -1.0,
            "leptons": [
                {"flavor": "Electron", "pt": 41.0, "eta": 1.2,
                 "eff_sf": 0.98, "eff_sf_err": 0.01}
            ]
        }"#;
        let ev: Event = serde_json::from_str(json).unwrap();
        assert_eq!(ev.value("Mass"), Some(251.3));
        assert_eq!(ev.value("absent"), None);
        assert!(ev.leptons[0].passes_tight());
        assert!(ev.scale_weights.is_empty());
    }
}

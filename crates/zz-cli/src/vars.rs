//! The measured-variable catalog: binnings, selections and per-channel
//! value extraction.
//!
//! Events carry their kinematics as named values; dilepton-pair variables
//! additionally need the Z1/Z2 ordering decision, which assigns Z1 to the
//! pair closer to the nominal Z mass (for eemm this picks between the ee
//! and the mm pair). Per-object variables (`ZPt`, `LepPt`) return one value
//! per object and fill once each. Jet observables are stored under
//! calibration-suffixed keys (e.g. `nJets_jesUp`); the suffixed extractor
//! and selection read the shifted quantities for the jet-energy
//! systematics.

use zz_core::{Binning, Channel, Result, Z_MASS};
use zz_sample::Event;

/// Value-extraction closure for one (variable, channel).
pub type Extractor = Box<dyn Fn(&Event) -> Vec<f64>>;

/// Per-event selection closure for one variable.
pub type Selection = Box<dyn Fn(&Event) -> bool>;

/// All measured variables, in report order.
pub const VARIABLES: [&str; 18] = [
    "Mass",
    "Pt",
    "Eta",
    "Z1Mass",
    "Z2Mass",
    "Z1Pt",
    "Z2Pt",
    "ZPt",
    "ZHigherPt",
    "ZLowerPt",
    "LeadLepPt",
    "LepPt",
    "DPhiZZ",
    "DRZZ",
    "NJets",
    "Jet1Pt",
    "Mjj",
    "DEtaJJ",
];

/// Whether a variable is built from jet quantities and therefore varies
/// under the jet-energy calibrations.
pub fn is_jet_variable(variable: &str) -> bool {
    matches!(variable, "NJets" | "Jet1Pt" | "Mjj" | "DEtaJJ")
}

/// Binning for one variable.
pub fn binning(variable: &str) -> Result<Binning> {
    match variable {
        "Mass" => Binning::new(vec![
            100.0, 200.0, 250.0, 300.0, 350.0, 400.0, 500.0, 600.0, 800.0, 1000.0,
        ]),
        "Pt" => Binning::new(vec![0.0, 25.0, 50.0, 75.0, 100.0, 150.0, 200.0, 300.0]),
        "Eta" | "DRZZ" | "DEtaJJ" => Binning::uniform(6, 0.0, 6.0),
        "Z1Mass" | "Z2Mass" => Binning::uniform(12, 60.0, 120.0),
        "Z1Pt" | "Z2Pt" | "ZPt" | "ZHigherPt" | "ZLowerPt" => {
            Binning::new(vec![0.0, 25.0, 50.0, 75.0, 100.0, 125.0, 150.0, 200.0, 300.0])
        }
        "LeadLepPt" | "LepPt" => Binning::uniform(15, 0.0, 150.0),
        "DPhiZZ" => Binning::uniform(8, 0.0, std::f64::consts::PI),
        "NJets" => Binning::uniform(6, -0.5, 5.5),
        "Jet1Pt" => Binning::new(vec![0.0, 50.0, 100.0, 200.0, 300.0, 500.0]),
        "Mjj" => Binning::new(vec![0.0, 100.0, 300.0, 800.0]),
        other => Err(zz_core::Error::Validation(format!("unknown variable '{other}'"))),
    }
}

/// The two dilepton-pair value prefixes for a channel, in object order.
fn pair_prefixes(channel: Channel) -> (&'static str, &'static str) {
    match channel {
        Channel::E4 => ("e1_e2", "e3_e4"),
        Channel::E2Mu2 => ("e1_e2", "m1_m2"),
        Channel::Mu4 => ("m1_m2", "m3_m4"),
    }
}

fn pair_value(ev: &Event, prefix: &str, quantity: &str) -> Option<f64> {
    ev.value(&format!("{prefix}_{quantity}"))
}

/// The (Z1, Z2) pair prefixes of an event: Z1 is the pair whose mass is
/// closer to the Z mass.
fn ordered_prefixes(ev: &Event, channel: Channel) -> Option<(&'static str, &'static str)> {
    let (a, b) = pair_prefixes(channel);
    let (ma, mb) = (pair_value(ev, a, "Mass")?, pair_value(ev, b, "Mass")?);
    if (ma - Z_MASS).abs() <= (mb - Z_MASS).abs() { Some((a, b)) } else { Some((b, a)) }
}

fn delta_phi(a: f64, b: f64) -> f64 {
    use std::f64::consts::PI;
    let mut d = a - b;
    while d > PI {
        d -= 2.0 * PI;
    }
    while d < -PI {
        d += 2.0 * PI;
    }
    d
}

fn key_extractor(name: String) -> Extractor {
    Box::new(move |ev: &Event| ev.value(&name).into_iter().collect())
}

fn z1_quantity(channel: Channel, quantity: &'static str) -> Extractor {
    Box::new(move |ev: &Event| {
        ordered_prefixes(ev, channel)
            .and_then(|(z1, _)| pair_value(ev, z1, quantity))
            .into_iter()
            .collect()
    })
}

fn z2_quantity(channel: Channel, quantity: &'static str) -> Extractor {
    Box::new(move |ev: &Event| {
        ordered_prefixes(ev, channel)
            .and_then(|(_, z2)| pair_value(ev, z2, quantity))
            .into_iter()
            .collect()
    })
}

fn both_pair_pts(ev: &Event, channel: Channel) -> Option<(f64, f64)> {
    let (a, b) = pair_prefixes(channel);
    Some((pair_value(ev, a, "Pt")?, pair_value(ev, b, "Pt")?))
}

/// Value extractor for one (variable, channel). Fails fast on an unknown
/// variable name.
pub fn extractor(variable: &str, channel: Channel) -> Result<Extractor> {
    jet_extractor(variable, channel, "")
}

/// Value extractor reading jet quantities under a calibration suffix
/// (empty for nominal). Non-jet variables ignore the suffix.
pub fn jet_extractor(variable: &str, channel: Channel, jet_suffix: &str) -> Result<Extractor> {
    Ok(match variable {
        "Mass" | "Pt" | "LeadLepPt" | "DPhiZZ" => key_extractor(variable.to_string()),
        "Eta" => Box::new(|ev: &Event| ev.value("Eta").map(f64::abs).into_iter().collect()),
        "Z1Mass" => z1_quantity(channel, "Mass"),
        "Z2Mass" => z2_quantity(channel, "Mass"),
        "Z1Pt" => z1_quantity(channel, "Pt"),
        "Z2Pt" => z2_quantity(channel, "Pt"),
        "ZPt" => Box::new(move |ev: &Event| {
            both_pair_pts(ev, channel).map_or(Vec::new(), |(pa, pb)| vec![pa, pb])
        }),
        "ZHigherPt" => Box::new(move |ev: &Event| {
            both_pair_pts(ev, channel).map(|(pa, pb)| pa.max(pb)).into_iter().collect()
        }),
        "ZLowerPt" => Box::new(move |ev: &Event| {
            both_pair_pts(ev, channel).map(|(pa, pb)| pa.min(pb)).into_iter().collect()
        }),
        "LepPt" => Box::new(|ev: &Event| ev.leptons.iter().map(|l| l.pt).collect()),
        "DRZZ" => Box::new(move |ev: &Event| {
            let (a, b) = pair_prefixes(channel);
            let dr = (|| {
                let de = pair_value(ev, a, "Eta")? - pair_value(ev, b, "Eta")?;
                let dp = delta_phi(pair_value(ev, a, "Phi")?, pair_value(ev, b, "Phi")?);
                Some((de * de + dp * dp).sqrt())
            })();
            dr.into_iter().collect()
        }),
        "NJets" => key_extractor(format!("nJets{jet_suffix}")),
        "Jet1Pt" => key_extractor(format!("jet1Pt{jet_suffix}")),
        "Mjj" => key_extractor(format!("mjj{jet_suffix}")),
        "DEtaJJ" => {
            let name = format!("deltaEtajj{jet_suffix}");
            Box::new(move |ev: &Event| ev.value(&name).map(f64::abs).into_iter().collect())
        }
        other => {
            return Err(zz_core::Error::Validation(format!("unknown variable '{other}'")));
        }
    })
}

/// Per-event selection for one variable: dijet observables require two
/// jets, the leading-jet pt requires one. Everything else accepts all
/// events.
pub fn selection(variable: &str) -> Selection {
    jet_selection(variable, "")
}

/// Selection reading the jet count under a calibration suffix (empty for
/// nominal).
pub fn jet_selection(variable: &str, jet_suffix: &str) -> Selection {
    match variable {
        "Mjj" | "DEtaJJ" => {
            let key = format!("nJets{jet_suffix}");
            Box::new(move |ev: &Event| ev.value(&key).is_some_and(|n| n > 1.5))
        }
        "Jet1Pt" => {
            let key = format!("nJets{jet_suffix}");
            Box::new(move |ev: &Event| ev.value(&key).is_some_and(|n| n > 0.5))
        }
        _ => Box::new(|_| true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use zz_core::EventId;

    fn event(values: &[(&str, f64)]) -> Event {
        Event {
            id: EventId { run: 1, lumi: 1, event: 1 },
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            n_true_pu: 0.0,
            gen_weight: 1.0,
            leptons: Vec::new(),
            scale_weights: Vec::new(),
            pdf_weights: Vec::new(),
        }
    }

    #[test]
    fn eemm_pairing_picks_closer_to_z() {
        // mm pair is closer to MZ: it becomes Z1
        let ev = event(&[
            ("e1_e2_Mass", 70.0),
            ("m1_m2_Mass", 90.5),
            ("e1_e2_Pt", 40.0),
            ("m1_m2_Pt", 65.0),
        ]);
        let z1 = extractor("Z1Mass", Channel::E2Mu2).unwrap();
        let z2 = extractor("Z2Mass", Channel::E2Mu2).unwrap();
        assert_eq!(z1(&ev), vec![90.5]);
        assert_eq!(z2(&ev), vec![70.0]);

        let z1pt = extractor("Z1Pt", Channel::E2Mu2).unwrap();
        let z2pt = extractor("Z2Pt", Channel::E2Mu2).unwrap();
        assert_eq!(z1pt(&ev), vec![65.0]);
        assert_eq!(z2pt(&ev), vec![40.0]);
    }

    #[test]
    fn missing_pair_mass_skips_event() {
        let ev = event(&[("e1_e2_Mass", 91.0)]);
        let z1 = extractor("Z1Mass", Channel::E4).unwrap();
        assert!(z1(&ev).is_empty());
    }

    #[test]
    fn per_object_variables_fill_per_object() {
        let ev = event(&[("m1_m2_Pt", 80.0), ("m3_m4_Pt", 30.0)]);
        let zpt = extractor("ZPt", Channel::Mu4).unwrap();
        assert_eq!(zpt(&ev), vec![80.0, 30.0]);
        let hi = extractor("ZHigherPt", Channel::Mu4).unwrap();
        let lo = extractor("ZLowerPt", Channel::Mu4).unwrap();
        assert_eq!(hi(&ev), vec![80.0]);
        assert_eq!(lo(&ev), vec![30.0]);
    }

    #[test]
    fn drzz_from_pair_directions() {
        let ev = event(&[
            ("m1_m2_Eta", 1.0),
            ("m3_m4_Eta", -0.5),
            ("m1_m2_Phi", 3.0),
            ("m3_m4_Phi", -3.0),
        ]);
        let dr = extractor("DRZZ", Channel::Mu4).unwrap();
        // delta-phi wraps to 6 - 2*pi
        let dphi = 6.0 - 2.0 * std::f64::consts::PI;
        let expected = (1.5_f64 * 1.5 + dphi * dphi).sqrt();
        assert!((dr(&ev)[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn jet_variables_read_suffixed_keys() {
        let ev = event(&[
            ("nJets", 2.0),
            ("nJets_jesUp", 1.0),
            ("mjj", 450.0),
            ("mjj_jesUp", 420.0),
            ("jet1Pt", 120.0),
        ]);
        let nominal = jet_extractor("Mjj", Channel::Mu4, "").unwrap();
        let shifted = jet_extractor("Mjj", Channel::Mu4, "_jesUp").unwrap();
        assert_eq!(nominal(&ev), vec![450.0]);
        assert_eq!(shifted(&ev), vec![420.0]);

        // nominal selection sees 2 jets, the jes-up recalibration only 1
        assert!(jet_selection("Mjj", "")(&ev));
        assert!(!jet_selection("Mjj", "_jesUp")(&ev));
        assert!(jet_selection("Jet1Pt", "_jesUp")(&ev));
        assert!(jet_selection("Mass", "_jesUp")(&ev));
    }

    #[test]
    fn every_catalog_variable_resolves() {
        for name in VARIABLES {
            assert!(binning(name).is_ok());
            assert!(extractor(name, Channel::E4).is_ok());
        }
        assert!(binning("nope").is_err());
        assert!(extractor("nope", Channel::Mu4).is_err());
        assert!(is_jet_variable("NJets"));
        assert!(!is_jet_variable("Mass"));
    }
}

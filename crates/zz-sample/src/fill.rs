//! Single-pass weighted histogram filling from an event stream.
//!
//! Variables and selections are native closures rather than textual
//! expressions. An extractor returns every value the event contributes:
//! usually zero (quantity absent, e.g. a jet observable in a jet-free
//! event) or one, but per-object quantities such as the Z pair transverse
//! momenta fill once per object. A failed selection skips the event.

use crate::event::Event;
use crate::sample::Sample;
use zz_core::Hist1D;

/// Fill `hist` from one sample's events.
pub fn fill_into(
    hist: &mut Hist1D,
    sample: &Sample,
    var: &dyn Fn(&Event) -> Vec<f64>,
    sel: &dyn Fn(&Event) -> bool,
    weight: &dyn Fn(&Sample, &Event) -> f64,
) {
    for ev in &sample.events {
        if !sel(ev) {
            continue;
        }
        let vals = var(ev);
        if vals.is_empty() {
            continue;
        }
        let w = weight(sample, ev);
        for v in vals {
            hist.fill(v, w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use zz_core::{Binning, Channel, EventId};

    fn sample() -> Sample {
        let events = [(100.0, 1.0), (150.0, -1.0), (250.0, 1.0)]
            .iter()
            .enumerate()
            .map(|(i, &(m, gw))| Event {
                id: EventId { run: 1, lumi: 1, event: i as u64 },
                values: HashMap::from([("Mass".to_string(), m)]),
                n_true_pu: 0.0,
                gen_weight: gw,
                leptons: Vec::new(),
                scale_weights: Vec::new(),
                pdf_weights: Vec::new(),
            })
            .collect();
        Sample {
            name: "ZZTo4L".into(),
            channel: Channel::Mu4,
            is_mc: true,
            const_scale: 0.5,
            extra_scale: 1.0,
            has_lhe: false,
            events,
        }
    }

    #[test]
    fn selection_and_weight_applied() {
        let s = sample();
        let binning = Binning::new(vec![0.0, 200.0, 400.0]).unwrap();
        let mut h = Hist1D::new(binning);
        fill_into(
            &mut h,
            &s,
            &|e| e.value("Mass").into_iter().collect(),
            &|e| e.value("Mass").is_some_and(|m| m > 120.0),
            &|s, e| s.const_scale * e.gen_weight,
        );
        // 150 GeV enters with weight -0.5, 250 GeV with +0.5.
        assert_eq!(h.values(), &[-0.5, 0.5]);
    }

    #[test]
    fn missing_variable_skipped() {
        let s = sample();
        let binning = Binning::new(vec![0.0, 400.0]).unwrap();
        let mut h = Hist1D::new(binning);
        fill_into(&mut h, &s, &|e| e.value("nope").into_iter().collect(), &|_| true, &|_, _| 1.0);
        assert_eq!(h.integral(), 0.0);
    }

    #[test]
    fn multi_valued_extractor_fills_once_per_value() {
        let s = sample();
        let binning = Binning::new(vec![0.0, 200.0, 400.0]).unwrap();
        let mut h = Hist1D::new(binning);
        // each event contributes its mass twice, like a both-Z-pt variable
        fill_into(
            &mut h,
            &s,
            &|e| e.value("Mass").map_or(Vec::new(), |m| vec![m, m]),
            &|_| true,
            &|_, _| 1.0,
        );
        assert_eq!(h.values(), &[4.0, 2.0]);
    }
}

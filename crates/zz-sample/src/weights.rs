//! Per-event multiplicative weight builders.
//!
//! MC events are weighted by constant normalisation × pileup reweighting ×
//! generator weight × per-lepton efficiency scale factors, with ±1σ hooks
//! for the pileup and per-flavor efficiency systematics. Control-region
//! events additionally carry a per-lepton fake-factor product.

use crate::calib::{FakeFactorTable, PileupTable};
use crate::event::Event;
use crate::sample::{EventWeight, Sample};
use zz_core::{LeptonFlavor, Shift};

/// Per-flavor efficiency shift selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct EfficiencyShift {
    /// Electron efficiency shift.
    pub electron: Shift,
    /// Muon efficiency shift.
    pub muon: Shift,
}

impl EfficiencyShift {
    /// Shift applying to one flavor only.
    pub fn for_flavor(flavor: LeptonFlavor, shift: Shift) -> EfficiencyShift {
        match flavor {
            LeptonFlavor::Electron => EfficiencyShift { electron: shift, muon: Shift::Nominal },
            LeptonFlavor::Muon => EfficiencyShift { electron: Shift::Nominal, muon: shift },
        }
    }
}

fn lepton_sf(ev: &Event, eff: EfficiencyShift) -> f64 {
    let mut sf = 1.0;
    for l in &ev.leptons {
        let shift = match l.flavor {
            LeptonFlavor::Electron => eff.electron,
            LeptonFlavor::Muon => eff.muon,
        };
        sf *= match shift {
            Shift::Nominal => l.eff_sf,
            Shift::Up => l.eff_sf + l.eff_sf_err,
            Shift::Down => l.eff_sf - l.eff_sf_err,
        };
    }
    sf
}

/// Standard MC event weight: constant normalisation × pileup × generator
/// weight × lepton efficiency scale factors.
pub fn base_mc_weight<'a>(
    pu: &'a PileupTable,
    pu_shift: Shift,
    eff: EfficiencyShift,
) -> EventWeight<'a> {
    Box::new(move |s: &Sample, ev: &Event| {
        s.const_scale
            * s.extra_scale
            * pu.weight(ev.n_true_pu, pu_shift)
            * ev.gen_weight
            * lepton_sf(ev, eff)
    })
}

/// Weight for collision data: only the sample's extra scale (normally 1).
pub fn data_weight() -> EventWeight<'static> {
    Box::new(|s: &Sample, _: &Event| s.extra_scale)
}

/// Fake-rate systematic multipliers: ×1.4 up, ×0.6 down.
pub fn fake_rate_scale(shift: Shift) -> f64 {
    match shift {
        Shift::Up => 1.4,
        Shift::Nominal => 1.0,
        Shift::Down => 0.6,
    }
}

/// Wrap a base weight with the control-region fake-factor product: each
/// lepton failing tight ID/isolation contributes its flavor's fake factor
/// (optionally scaled by the per-flavor systematic multiplier), passing
/// leptons contribute 1.
pub fn control_region_weight<'a>(
    base: EventWeight<'a>,
    ff_e: &'a FakeFactorTable,
    ff_m: &'a FakeFactorTable,
    e_shift: Shift,
    m_shift: Shift,
) -> EventWeight<'a> {
    let e_scale = fake_rate_scale(e_shift);
    let m_scale = fake_rate_scale(m_shift);
    Box::new(move |s: &Sample, ev: &Event| {
        let mut ff = 1.0;
        for l in &ev.leptons {
            if l.passes_tight() {
                continue;
            }
            ff *= match l.flavor {
                LeptonFlavor::Electron => e_scale * ff_e.lookup(l.eta, l.pt),
                LeptonFlavor::Muon => m_scale * ff_m.lookup(l.eta, l.pt),
            };
        }
        ff * base(s, ev)
    })
}

/// Wrap a base weight with one LHE QCD-scale variation weight. Events
/// without LHE information (e.g. MCFM samples) contribute their nominal
/// weight unchanged.
pub fn with_scale_weight<'a>(base: EventWeight<'a>, index: usize) -> EventWeight<'a> {
    Box::new(move |s: &Sample, ev: &Event| {
        let lhe = ev.scale_weights.get(index).copied().unwrap_or(1.0);
        lhe * base(s, ev)
    })
}

/// Wrap a base weight with one LHE PDF/αs variation weight, with the same
/// missing-information fallback as [`with_scale_weight`].
pub fn with_pdf_weight<'a>(base: EventWeight<'a>, index: usize) -> EventWeight<'a> {
    Box::new(move |s: &Sample, ev: &Event| {
        let lhe = ev.pdf_weights.get(index).copied().unwrap_or(1.0);
        lhe * base(s, ev)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Lepton;
    use std::collections::HashMap;
    use zz_core::{Binning, Channel, EventId};

    fn pu() -> PileupTable {
        PileupTable::new(
            Binning::new(vec![0.0, 50.0]).unwrap(),
            vec![1.1],
            vec![1.2],
            vec![1.0],
        )
        .unwrap()
    }

    fn lepton(flavor: LeptonFlavor, tight: bool) -> Lepton {
        Lepton {
            flavor,
            pt: 30.0,
            eta: 1.0,
            eff_sf: 0.9,
            eff_sf_err: 0.05,
            tight_id: tight,
            isolated: true,
        }
    }

    fn sample_and_event() -> (Sample, Event) {
        let ev = Event {
            id: EventId { run: 1, lumi: 1, event: 1 },
            values: HashMap::new(),
            n_true_pu: 20.0,
            gen_weight: -1.0,
            leptons: vec![
                lepton(LeptonFlavor::Electron, true),
                lepton(LeptonFlavor::Muon, false),
            ],
            scale_weights: vec![1.0, 0.8],
            pdf_weights: vec![1.05],
        };
        let s = Sample {
            name: "ZZTo4L".into(),
            channel: Channel::E2Mu2,
            is_mc: true,
            const_scale: 2.0,
            extra_scale: 1.0,
            has_lhe: true,
            events: Vec::new(),
        };
        (s, ev)
    }

    #[test]
    fn base_weight_product() {
        let pu = pu();
        let (s, ev) = sample_and_event();
        let w = base_mc_weight(&pu, Shift::Nominal, EfficiencyShift::default());
        // 2.0 * 1.1 * (-1.0) * 0.9 * 0.9
        assert!((w(&s, &ev) - 2.0 * 1.1 * -1.0 * 0.81).abs() < 1e-12);
    }

    #[test]
    fn efficiency_shift_one_flavor_only() {
        let pu = pu();
        let (s, ev) = sample_and_event();
        let w = base_mc_weight(
            &pu,
            Shift::Nominal,
            EfficiencyShift::for_flavor(LeptonFlavor::Electron, Shift::Up),
        );
        // electron SF 0.95, muon SF untouched at 0.9
        assert!((w(&s, &ev) - 2.0 * 1.1 * -1.0 * (0.95 * 0.9)).abs() < 1e-12);
    }

    #[test]
    fn control_region_weight_only_failing_leptons() {
        let pu = pu();
        let (s, ev) = sample_and_event();
        let ff = FakeFactorTable::new(
            Binning::new(vec![0.0, 2.5]).unwrap(),
            Binning::new(vec![0.0, 100.0]).unwrap(),
            vec![0.25],
        )
        .unwrap();
        let base = base_mc_weight(&pu, Shift::Nominal, EfficiencyShift::default());
        let w = control_region_weight(base, &ff, &ff, Shift::Nominal, Shift::Nominal);
        // only the failing muon picks up the 0.25 factor
        let expect = 0.25 * 2.0 * 1.1 * -1.0 * 0.81;
        assert!((w(&s, &ev) - expect).abs() < 1e-12);

        let base = base_mc_weight(&pu, Shift::Nominal, EfficiencyShift::default());
        let w_up = control_region_weight(base, &ff, &ff, Shift::Nominal, Shift::Up);
        assert!((w_up(&s, &ev) - 1.4 * expect).abs() < 1e-12);
    }

    #[test]
    fn lhe_weight_fallback() {
        let (s, mut ev) = sample_and_event();
        let w = with_scale_weight(data_weight(), 1);
        assert!((w(&s, &ev) - 0.8).abs() < 1e-12);
        ev.scale_weights.clear();
        assert!((w(&s, &ev) - 1.0).abs() < 1e-12);
    }
}

//! Response-matrix construction from matched reco/truth event pairs.
//!
//! The truth value of each reconstructed event is found by its
//! run/lumi/event identity in a lookup table built once from the
//! truth-level event stream; reconstructed events with no truth partner
//! are counted and dropped. The truth marginal used for efficiencies comes
//! from the full truth stream, so events that were generated but never
//! reconstructed still enter the denominator.

use nalgebra::DMatrix;
use std::collections::HashMap;
use tracing::debug;
use zz_core::{Binning, Error, EventId, Hist1D, Hist2D, Result};
use zz_sample::{Event, Sample};

/// Truth values keyed by event identity, for one (channel, variable).
///
/// Built once per variable and shared across all systematic variations;
/// duplicate identities keep the first values seen. Per-object variables
/// store one value per object, in the extractor's order.
#[derive(Debug, Clone, Default)]
pub struct TruthTable {
    values: HashMap<EventId, Vec<f64>>,
}

impl TruthTable {
    /// Build from a truth-level event stream and a variable closure.
    /// Events whose variable is absent are skipped.
    pub fn build(events: &[Event], var: &dyn Fn(&Event) -> Vec<f64>) -> TruthTable {
        let mut table = TruthTable::default();
        table.add_events(events, var);
        table
    }

    /// Add a further event stream (e.g. another sub-sample); identities
    /// already present keep their first values.
    pub fn add_events(&mut self, events: &[Event], var: &dyn Fn(&Event) -> Vec<f64>) {
        self.values.reserve(events.len());
        for ev in events {
            let vals = var(ev);
            if !vals.is_empty() {
                self.values.entry(ev.id).or_insert(vals);
            }
        }
    }

    /// Truth values for an event identity, if it was generated.
    pub fn get(&self, id: EventId) -> Option<&[f64]> {
        self.values.get(&id).map(Vec::as_slice)
    }

    /// Number of distinct truth entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A filled response matrix with its truth marginal.
///
/// Immutable once built; one instance per (channel, variable, systematic).
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMatrix {
    matrix: Hist2D,
    truth: Hist1D,
}

impl ResponseMatrix {
    /// The (reco × truth) migration histogram.
    pub fn matrix(&self) -> &Hist2D {
        &self.matrix
    }

    /// The truth-level distribution, including never-reconstructed events.
    pub fn truth(&self) -> &Hist1D {
        &self.truth
    }

    /// Reco-level projection of the matched events.
    pub fn reco_marginal(&self) -> Hist1D {
        self.matrix.x_marginal()
    }

    /// Truth-level projection of the matched events (excludes events that
    /// were generated but never reconstructed, unlike [`truth`](Self::truth)).
    pub fn matched_truth_marginal(&self) -> Hist1D {
        self.matrix.y_marginal()
    }

    /// Shared binning of both axes.
    pub fn binning(&self) -> &Binning {
        self.matrix.x_binning()
    }

    /// Number of bins per axis.
    pub fn n_bins(&self) -> usize {
        self.binning().n_bins()
    }

    /// Per-truth-bin reconstruction efficiency: matched events over all
    /// generated events in the bin; zero for empty truth bins.
    pub fn efficiencies(&self) -> Vec<f64> {
        let matched = self.matched_truth_marginal();
        (0..self.n_bins())
            .map(|t| {
                let total = self.truth.values()[t];
                if total > 0.0 { matched.values()[t] / total } else { 0.0 }
            })
            .collect()
    }

    /// Migration probabilities as a dense matrix: entry (r, t) is
    /// P(reco r | truth t), zero for empty truth columns.
    pub fn probabilities(&self) -> DMatrix<f64> {
        let n = self.n_bins();
        let truth = self.truth.values();
        let mut prob = DMatrix::<f64>::zeros(n, n);
        for t in 0..n {
            if truth[t] > 0.0 {
                for r in 0..n {
                    prob[(r, t)] = self.matrix.get(r, t) / truth[t];
                }
            }
        }
        prob
    }

    /// Per-reco-bin purity: diagonal content over the reco projection.
    pub fn purity(&self) -> Vec<f64> {
        let reco = self.reco_marginal();
        (0..self.n_bins())
            .map(|r| {
                let tot = reco.values()[r];
                if tot > 0.0 { self.matrix.get(r, r) / tot } else { 0.0 }
            })
            .collect()
    }

    /// Per-truth-bin stability: diagonal content over the matched truth
    /// projection.
    pub fn stability(&self) -> Vec<f64> {
        let truth = self.matched_truth_marginal();
        (0..self.n_bins())
            .map(|t| {
                let tot = truth.values()[t];
                if tot > 0.0 { self.matrix.get(t, t) / tot } else { 0.0 }
            })
            .collect()
    }

}

/// Accumulates matched reco/truth pairs and the truth marginal into a
/// [`ResponseMatrix`].
#[derive(Debug, Clone)]
pub struct ResponseMatrixBuilder {
    matrix: Hist2D,
    truth: Hist1D,
    matched: usize,
    unmatched: usize,
}

impl ResponseMatrixBuilder {
    /// Empty builder with the same binning on both axes.
    pub fn new(binning: Binning) -> ResponseMatrixBuilder {
        ResponseMatrixBuilder {
            matrix: Hist2D::new(binning.clone(), binning.clone()),
            truth: Hist1D::new(binning),
            matched: 0,
            unmatched: 0,
        }
    }

    /// Fill the truth marginal from the truth-level stream of one sample,
    /// one entry per extracted value.
    pub fn fill_truth(
        &mut self,
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
                self.truth.fill(v, w);
            }
        }
    }

    /// Fill the migration matrix from one sample's reconstructed events,
    /// looking up each event's truth values by identity. Per-object
    /// variables pair reco and truth values positionally. Events with no
    /// truth partner are silently skipped (counted for diagnostics).
    pub fn fill_reco(
        &mut self,
        sample: &Sample,
        truth: &TruthTable,
        var: &dyn Fn(&Event) -> Vec<f64>,
        sel: &dyn Fn(&Event) -> bool,
        weight: &dyn Fn(&Sample, &Event) -> f64,
    ) {
        for ev in &sample.events {
            if !sel(ev) {
                continue;
            }
            let reco_vals = var(ev);
            if reco_vals.is_empty() {
                continue;
            }
            match truth.get(ev.id) {
                Some(true_vals) => {
                    let w = weight(sample, ev);
                    for (r, t) in reco_vals.iter().zip(true_vals) {
                        self.matrix.fill(*r, *t, w);
                    }
                    self.matched += 1;
                }
                None => self.unmatched += 1,
            }
        }
    }

    /// Add one weighted entry to the truth marginal directly.
    pub fn fill_truth_value(&mut self, val: f64, weight: f64) {
        self.truth.fill(val, weight);
    }

    /// Add one weighted (reco, truth) entry to the migration matrix
    /// directly.
    pub fn fill_matrix_value(&mut self, reco_val: f64, true_val: f64, weight: f64) {
        self.matrix.fill(reco_val, true_val, weight);
        self.matched += 1;
    }

    /// Matched reco events so far.
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Reco events dropped for lack of a truth partner.
    pub fn unmatched(&self) -> usize {
        self.unmatched
    }

    /// Finish the build. Fails if nothing was filled on either side, which
    /// points at a misconfigured variable or selection rather than at an
    /// empty-but-valid channel.
    pub fn finish(self) -> Result<ResponseMatrix> {
        if self.matched == 0 && self.truth.integral() == 0.0 {
            return Err(Error::Validation(
                "response matrix is empty on both axes; no truth or matched reco events".into(),
            ));
        }
        debug!(
            matched = self.matched,
            unmatched = self.unmatched,
            truth_integral = self.truth.integral(),
            "response matrix built"
        );
        Ok(ResponseMatrix { matrix: self.matrix, truth: self.truth })
    }

    /// Finish without the emptiness check, for deliberately degenerate
    /// inputs (a channel with no events still yields a well-formed, all-zero
    /// response).
    pub fn finish_unchecked(self) -> ResponseMatrix {
        ResponseMatrix { matrix: self.matrix, truth: self.truth }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;
    use zz_core::Channel;

    fn event(n: u64, mass: f64) -> Event {
        Event {
            id: EventId { run: 1, lumi: 1, event: n },
            values: HashMap::from([("Mass".to_string(), mass)]),
            n_true_pu: 0.0,
            gen_weight: 1.0,
            leptons: Vec::new(),
            scale_weights: Vec::new(),
            pdf_weights: Vec::new(),
        }
    }

    fn sample(events: Vec<Event>) -> Sample {
        Sample {
            name: "ZZTo4L".into(),
            channel: Channel::E4,
            is_mc: true,
            const_scale: 1.0,
            extra_scale: 1.0,
            has_lhe: false,
            events,
        }
    }

    #[test]
    fn truth_table_first_seen_wins() {
        let events = vec![event(1, 100.0), event(1, 200.0), event(2, 150.0)];
        let table = TruthTable::build(&events, &|e| e.value("Mass").into_iter().collect());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(EventId { run: 1, lumi: 1, event: 1 }), Some(&[100.0][..]));
    }

    #[test]
    fn per_object_values_paired_in_order() {
        let binning = Binning::new(vec![0.0, 50.0, 100.0]).unwrap();
        let mut ev_t = event(1, 0.0);
        ev_t.values.insert("aPt".into(), 30.0);
        ev_t.values.insert("bPt".into(), 80.0);
        let mut ev_r = event(1, 0.0);
        ev_r.values.insert("aPt".into(), 35.0);
        ev_r.values.insert("bPt".into(), 75.0);
        let both =
            |e: &Event| -> Vec<f64> { ["aPt", "bPt"].iter().filter_map(|k| e.value(k)).collect() };

        let table = TruthTable::build(std::slice::from_ref(&ev_t), &both);
        let mut b = ResponseMatrixBuilder::new(binning);
        b.fill_truth(&sample(vec![ev_t]), &both, &|_| true, &|_, _| 1.0);
        b.fill_reco(&sample(vec![ev_r]), &table, &both, &|_| true, &|_, _| 1.0);
        let r = b.finish().unwrap();

        assert_eq!(r.truth().values(), &[1.0, 1.0]);
        // reco 35 pairs with truth 30, reco 75 with truth 80
        assert_relative_eq!(r.matrix().get(0, 0), 1.0);
        assert_relative_eq!(r.matrix().get(1, 1), 1.0);
        assert_eq!(r.matrix().get(0, 1), 0.0);
        assert_eq!(r.matrix().get(1, 0), 0.0);
    }

    #[test]
    fn unmatched_reco_dropped() {
        let binning = Binning::new(vec![0.0, 150.0, 300.0]).unwrap();
        let truth_events = vec![event(1, 100.0), event(2, 200.0)];
        let truth_sample = sample(truth_events.clone());
        let table = TruthTable::build(&truth_events, &|e| e.value("Mass").into_iter().collect());

        // event 3 has no truth partner
        let reco = sample(vec![event(1, 110.0), event(3, 120.0)]);

        let mut b = ResponseMatrixBuilder::new(binning);
        b.fill_truth(&truth_sample, &|e| e.value("Mass").into_iter().collect(), &|_| true, &|_, _| 1.0);
        b.fill_reco(&reco, &table, &|e| e.value("Mass").into_iter().collect(), &|_| true, &|_, _| 1.0);
        assert_eq!(b.matched(), 1);
        assert_eq!(b.unmatched(), 1);

        let r = b.finish().unwrap();
        assert_relative_eq!(r.matrix().integral(), 1.0);
        assert_relative_eq!(r.truth().integral(), 2.0);
    }

    #[test]
    fn marginals_consistent_with_direct_fill() {
        let binning = Binning::new(vec![0.0, 100.0, 200.0, 300.0]).unwrap();
        let truth_events: Vec<Event> =
            (0..30).map(|i| event(i, 10.0 + (i as f64 * 9.7) % 280.0)).collect();
        let truth_sample = sample(truth_events.clone());
        let table = TruthTable::build(&truth_events, &|e| e.value("Mass").into_iter().collect());

        // reco values migrate a little around truth
        let reco_events: Vec<Event> = truth_events
            .iter()
            .map(|e| {
                let m = e.value("Mass").unwrap();
                event(e.id.event, m + if e.id.event % 3 == 0 { 15.0 } else { -5.0 })
            })
            .collect();
        let reco = sample(reco_events.clone());

        let mut b = ResponseMatrixBuilder::new(binning.clone());
        b.fill_truth(&truth_sample, &|e| e.value("Mass").into_iter().collect(), &|_| true, &|_, _| 1.0);
        b.fill_reco(&reco, &table, &|e| e.value("Mass").into_iter().collect(), &|_| true, &|_, _| 1.0);
        let r = b.finish().unwrap();

        // the reco marginal must equal a direct fill over the same in-range
        // matched events
        let mut direct = Hist1D::new(binning);
        for ev in &reco_events {
            let reco_val = ev.value("Mass").unwrap();
            let true_val = table.get(ev.id).unwrap()[0];
            if r.binning().find_bin(true_val).is_some() {
                direct.fill(reco_val, 1.0);
            }
        }
        for (a, b) in r.reco_marginal().values().iter().zip(direct.values()) {
            assert_relative_eq!(a, b, max_relative = 1e-6);
        }
    }

    #[test]
    fn efficiency_and_diagnostics() {
        let binning = Binning::new(vec![0.0, 150.0, 300.0]).unwrap();
        let truth_events = vec![event(1, 100.0), event(2, 120.0), event(3, 200.0)];
        let truth_sample = sample(truth_events.clone());
        let table = TruthTable::build(&truth_events, &|e| e.value("Mass").into_iter().collect());
        // only events 1 and 3 reconstructed, both in their truth bin
        let reco = sample(vec![event(1, 90.0), event(3, 210.0)]);

        let mut b = ResponseMatrixBuilder::new(binning);
        b.fill_truth(&truth_sample, &|e| e.value("Mass").into_iter().collect(), &|_| true, &|_, _| 1.0);
        b.fill_reco(&reco, &table, &|e| e.value("Mass").into_iter().collect(), &|_| true, &|_, _| 1.0);
        let r = b.finish().unwrap();

        let eff = r.efficiencies();
        assert_relative_eq!(eff[0], 0.5);
        assert_relative_eq!(eff[1], 1.0);
        assert_eq!(r.purity(), vec![1.0, 1.0]);
        assert_eq!(r.stability(), vec![1.0, 1.0]);
    }

    #[test]
    fn empty_builder_rejected_but_unchecked_allowed() {
        let binning = Binning::new(vec![0.0, 1.0]).unwrap();
        assert!(ResponseMatrixBuilder::new(binning.clone()).finish().is_err());
        let r = ResponseMatrixBuilder::new(binning).finish_unchecked();
        assert_eq!(r.truth().integral(), 0.0);
    }
}

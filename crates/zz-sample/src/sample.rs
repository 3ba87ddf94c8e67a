//! Sample composition: leaf samples and their Group/Stack combinations.
//!
//! Single samples, grouped samples and stacked samples share one
//! capability surface: make a histogram, iterate base events, rescale.

use crate::dedup::DedupSet;
use crate::event::{Event, SampleFile};
use crate::fill;
use std::path::Path;
use tracing::debug;
use zz_core::{Binning, Channel, Hist1D, Result};

/// Per-event multiplicative weight, given the owning leaf sample.
pub type EventWeight<'a> = Box<dyn Fn(&Sample, &Event) -> f64 + 'a>;

/// A single event source with its normalisation.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Sample name.
    pub name: String,
    /// Channel the events belong to.
    pub channel: Channel,
    /// Whether this is simulation.
    pub is_mc: bool,
    /// Cross-section normalisation constant (xsec × lumi × k / Σw); 1 for data.
    pub const_scale: f64,
    /// Extra multiplicative scale (control-region signs, flat rescales).
    pub extra_scale: f64,
    /// Whether events carry LHE scale/PDF weight vectors.
    pub has_lhe: bool,
    /// The events.
    pub events: Vec<Event>,
}

impl Sample {
    /// Load one sample file, normalising MC to the integrated luminosity.
    pub fn load(path: &Path, channel: Channel, int_lumi: f64) -> Result<Sample> {
        let text = std::fs::read_to_string(path)?;
        let file: SampleFile = serde_json::from_str(&text)?;
        let has_lhe = file.events.iter().any(|e| !e.scale_weights.is_empty());
        Ok(Sample {
            name: file.meta.name.clone(),
            channel,
            is_mc: file.meta.is_mc,
            const_scale: file.meta.const_scale(int_lumi),
            extra_scale: 1.0,
            has_lhe,
            events: file.events,
        })
    }

    /// Load several overlapping files as one sample, keeping the first
    /// occurrence of each run/lumi/event triple in the given file order.
    pub fn load_merged(
        name: &str,
        paths: &[std::path::PathBuf],
        channel: Channel,
        int_lumi: f64,
    ) -> Result<Sample> {
        let mut dedup = DedupSet::new();
        let mut merged: Option<Sample> = None;
        let mut loaded = 0usize;
        for path in paths {
            let mut s = Sample::load(path, channel, int_lumi)?;
            loaded += s.events.len();
            dedup.retain_first(&mut s.events);
            match &mut merged {
                None => merged = Some(s),
                Some(m) => m.events.append(&mut s.events),
            }
        }
        debug!(
            sample = name,
            channel = %channel,
            kept = dedup.len(),
            dropped = loaded - dedup.len(),
            "merged overlapping files"
        );
        let mut out = merged.unwrap_or(Sample {
            name: name.to_string(),
            channel,
            is_mc: false,
            const_scale: 1.0,
            extra_scale: 1.0,
            has_lhe: false,
            events: Vec::new(),
        });
        out.name = name.to_string();
        Ok(out)
    }
}

/// A sample tree node: a single sample, a summed group, or a display stack.
///
/// Groups and stacks are both summed for any yield computation; the
/// distinction only matters to rendering code outside this workspace.
#[derive(Debug, Clone)]
pub enum SampleNode {
    /// One event source.
    Leaf(Sample),
    /// A named sum of sub-samples (e.g. the gluon-fusion final states).
    Group {
        /// Group name.
        name: String,
        /// Members, in a fixed order.
        members: Vec<SampleNode>,
    },
    /// A named stack of components (signal + backgrounds).
    Stack {
        /// Stack name.
        name: String,
        /// Members, bottom to top.
        members: Vec<SampleNode>,
    },
}

impl SampleNode {
    /// Node name.
    pub fn name(&self) -> &str {
        match self {
            SampleNode::Leaf(s) => &s.name,
            SampleNode::Group { name, .. } | SampleNode::Stack { name, .. } => name,
        }
    }

    /// All leaf samples, in tree order.
    pub fn leaves(&self) -> Vec<&Sample> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Sample>) {
        match self {
            SampleNode::Leaf(s) => out.push(s),
            SampleNode::Group { members, .. } | SampleNode::Stack { members, .. } => {
                for m in members {
                    m.collect_leaves(out);
                }
            }
        }
    }

    /// Build a weighted histogram over all base events of the tree, given a
    /// variable extraction closure (one fill per returned value), a
    /// selection predicate and a per-event weight.
    pub fn make_hist(
        &self,
        binning: &Binning,
        var: &dyn Fn(&Event) -> Vec<f64>,
        sel: &dyn Fn(&Event) -> bool,
        weight: &dyn Fn(&Sample, &Event) -> f64,
    ) -> Hist1D {
        let mut h = Hist1D::new(binning.clone());
        for leaf in self.leaves() {
            fill::fill_into(&mut h, leaf, var, sel, weight);
        }
        h
    }

    /// Multiply every leaf's extra scale by `factor`.
    pub fn apply_scale(&mut self, factor: f64) {
        self.apply_scale_where(&|_| true, factor);
    }

    /// Multiply the extra scale of leaves matching `pred` by `factor`.
    pub fn apply_scale_where(&mut self, pred: &dyn Fn(&Sample) -> bool, factor: f64) {
        match self {
            SampleNode::Leaf(s) => {
                if pred(s) {
                    s.extra_scale *= factor;
                }
            }
            SampleNode::Group { members, .. } | SampleNode::Stack { members, .. } => {
                for m in members {
                    m.apply_scale_where(pred, factor);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use zz_core::EventId;

    fn leaf(name: &str, masses: &[f64], const_scale: f64) -> SampleNode {
        let events = masses
            .iter()
            .enumerate()
            .map(|(i, &m)| Event {
                id: EventId { run: 1, lumi: 1, event: i as u64 },
                values: HashMap::from([("Mass".to_string(), m)]),
                n_true_pu: 0.0,
                gen_weight: 1.0,
                leptons: Vec::new(),
                scale_weights: Vec::new(),
                pdf_weights: Vec::new(),
            })
            .collect();
        SampleNode::Leaf(Sample {
            name: name.into(),
            channel: Channel::E4,
            is_mc: true,
            const_scale,
            extra_scale: 1.0,
            has_lhe: false,
            events,
        })
    }

    #[test]
    fn group_sums_members() {
        let group = SampleNode::Group {
            name: "sig".into(),
            members: vec![leaf("a", &[0.5, 1.5], 2.0), leaf("b", &[0.5], 1.0)],
        };
        let binning = Binning::new(vec![0.0, 1.0, 2.0]).unwrap();
        let h = group.make_hist(
            &binning,
            &|e| e.value("Mass").into_iter().collect(),
            &|_| true,
            &|s, _| s.const_scale * s.extra_scale,
        );
        assert_eq!(h.values(), &[3.0, 2.0]);
        assert_eq!(group.leaves().len(), 2);
    }

    #[test]
    fn scale_where_targets_leaf() {
        let mut group = SampleNode::Group {
            name: "sig".into(),
            members: vec![leaf("GluGluZZTo4e", &[0.5], 1.0), leaf("ZZTo4L", &[0.5], 1.0)],
        };
        group.apply_scale_where(&|s| s.name.starts_with("GluGlu"), 1.18);
        let binning = Binning::new(vec![0.0, 1.0]).unwrap();
        let h = group.make_hist(
            &binning,
            &|e| e.value("Mass").into_iter().collect(),
            &|_| true,
            &|s, _| s.const_scale * s.extra_scale,
        );
        assert!((h.values()[0] - 2.18).abs() < 1e-12);
    }
}

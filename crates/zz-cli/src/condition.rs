//! Response-matrix diagnostics without unfolding: condition numbers,
//! bin-by-bin purity, stability and efficiency per (channel, variable).

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;
use zz_core::{Channel, Shift};
use zz_sample::weights::{base_mc_weight, EfficiencyShift};
use zz_sample::PileupTable;
use zz_unfold::bayes::condition_number;
use zz_unfold::{ResponseMatrixBuilder, TruthTable};

use crate::run::{load_mc_group, truth_weight};
use crate::vars;

/// Diagnostics for one (channel, variable) response.
#[derive(Debug, Serialize)]
pub struct ConditionReport {
    /// The channel.
    pub channel: Channel,
    /// Variable name.
    pub variable: String,
    /// Condition number of the migration-probability matrix.
    pub condition_number: f64,
    /// Per-reco-bin purity.
    pub purity: Vec<f64>,
    /// Per-truth-bin stability.
    pub stability: Vec<f64>,
    /// Per-truth-bin reconstruction efficiency.
    pub efficiency: Vec<f64>,
    /// Reco events dropped for lack of a truth partner.
    pub unmatched: usize,
}

/// Build the nominal response for each (channel, variable) and report its
/// diagnostics.
pub fn run_condition(
    mc_dir: &Path,
    pileup_file: &Path,
    int_lumi: f64,
    variables: &[String],
    channels: &[Channel],
) -> Result<Vec<ConditionReport>> {
    let pileup = PileupTable::from_file(pileup_file)
        .with_context(|| format!("loading pileup table {}", pileup_file.display()))?;

    let mut reports = Vec::new();
    for &channel in channels {
        let chan_dir = mc_dir.join(channel.as_str());
        let sig = load_mc_group(&chan_dir.join("signal"), channel, int_lumi, "signal")?
            .context("missing signal MC directory")?;
        let gen = load_mc_group(&chan_dir.join("gen"), channel, int_lumi, "gen")?
            .context("missing gen MC directory")?;

        for variable in variables {
            let binning = vars::binning(variable)?;
            let var = vars::extractor(variable, channel)?;
            let sel = vars::selection(variable);

            let mut table = TruthTable::default();
            let gated = |ev: &zz_sample::Event| if sel(ev) { var(ev) } else { Vec::new() };
            for leaf in gen.leaves() {
                table.add_events(&leaf.events, &gated);
            }

            let reco_w = base_mc_weight(&pileup, Shift::Nominal, EfficiencyShift::default());
            let truth_w = truth_weight();
            let mut builder = ResponseMatrixBuilder::new(binning);
            for leaf in gen.leaves() {
                builder.fill_truth(leaf, &*var, &*sel, &*truth_w);
            }
            for leaf in sig.leaves() {
                builder.fill_reco(leaf, &table, &*var, &*sel, &*reco_w);
            }
            let unmatched = builder.unmatched();
            let response = builder.finish_unchecked();

            let cond = condition_number(&response.probabilities());
            info!(channel = %channel, variable = %variable, condition = cond, "response diagnostics");
            reports.push(ConditionReport {
                channel,
                variable: variable.clone(),
                condition_number: cond,
                purity: response.purity(),
                stability: response.stability(),
                efficiency: response.efficiencies(),
                unmatched,
            });
        }
    }
    Ok(reports)
}

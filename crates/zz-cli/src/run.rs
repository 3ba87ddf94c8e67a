//! The measurement driver: load samples, build responses, unfold every
//! systematic variation, aggregate and combine.
//!
//! Input layout on disk (JSON throughout):
//!
//! ```text
//! {data_dir}/{channel}/{region}/*.json      recorded data, merged with dedup
//! {mc_dir}/{channel}/{region}/*.json        one simulated sample per file
//! {mc_dir}/{channel}/signal_{syst}/*.json   alternate reco streams
//! {alt_mc_dir}/{channel}/{signal,gen}/      alternate-generator signal MC
//! ```
//!
//! Regions are `signal`, `gen` (truth level, MC only), `bkg` (irreducible
//! MC background, simulation only), `2P2F` and `3P1F`. The subtracted
//! background is the fake-lepton estimate plus the irreducible MC yield.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zz_core::{Binning, Channel, Hist1D, LeptonFlavor, Shift};
use zz_sample::weights::{
    base_mc_weight, data_weight, with_pdf_weight, with_scale_weight, EfficiencyShift,
};
use zz_sample::{Event, EventWeight, FakeFactorTable, PileupTable, Sample, SampleNode};
use zz_unfold::systematics::{
    self, SystematicKind, ALPHA_S_DN_INDEX, ALPHA_S_UP_INDEX, LUMI_UNCERTAINTY, MCFM_XSEC_DN,
    MCFM_XSEC_UP, N_PDF_VARIATIONS,
};
use zz_unfold::{
    aggregate, ChannelResult, CombinedResult, ControlRegions, FakeBackgroundEstimator,
    IterativeUnfolder, ResponseMatrix, ResponseMatrixBuilder, ResultCache, ResultKey, TruthTable,
    UnfoldedResult,
};

use crate::vars;

/// Everything the driver needs, resolved from the command line.
#[derive(Debug)]
pub struct UnfoldConfig {
    /// Recorded-data directory.
    pub data_dir: PathBuf,
    /// Simulation directory.
    pub mc_dir: PathBuf,
    /// Alternate-generator signal MC directory, if available.
    pub alt_mc_dir: Option<PathBuf>,
    /// Pileup weight table.
    pub pileup_file: PathBuf,
    /// Electron fake-factor table.
    pub electron_fake_factors: PathBuf,
    /// Muon fake-factor table.
    pub muon_fake_factors: PathBuf,
    /// Directory for persisted unfolded results.
    pub store_dir: Option<PathBuf>,
    /// Integrated luminosity in /pb.
    pub int_lumi: f64,
    /// D'Agostini iteration count.
    pub n_iterations: usize,
    /// Variables to measure.
    pub variables: Vec<String>,
    /// Channels to include.
    pub channels: Vec<Channel>,
    /// Normalise to unit integral (shape-only measurement).
    pub normalize: bool,
    /// Recompute everything, ignoring cached results.
    pub force: bool,
}

/// One variable's full measurement.
#[derive(Debug, Serialize)]
pub struct VariableReport {
    /// Variable name.
    pub variable: String,
    /// Bin edges.
    pub edges: Vec<f64>,
    /// Per-channel aggregated results.
    pub channels: Vec<ChannelResult>,
    /// The cross-channel combination.
    pub combined: CombinedResult,
}

/// Run the full measurement and return one report per variable.
pub fn run_unfold(cfg: &UnfoldConfig) -> Result<Vec<VariableReport>> {
    let pileup = PileupTable::from_file(&cfg.pileup_file)
        .with_context(|| format!("loading pileup table {}", cfg.pileup_file.display()))?;
    let ff_e = FakeFactorTable::from_file(&cfg.electron_fake_factors)
        .with_context(|| format!("loading {}", cfg.electron_fake_factors.display()))?;
    let ff_m = FakeFactorTable::from_file(&cfg.muon_fake_factors)
        .with_context(|| format!("loading {}", cfg.muon_fake_factors.display()))?;

    let mut cache = match &cfg.store_dir {
        Some(dir) => ResultCache::with_store(dir),
        None => ResultCache::in_memory(),
    }
    .force_recompute(cfg.force);

    let inputs: Vec<ChannelInputs> = cfg
        .channels
        .iter()
        .map(|&channel| ChannelInputs::load(cfg, channel))
        .collect::<Result<_>>()?;

    let mut reports = Vec::with_capacity(cfg.variables.len());
    for variable in &cfg.variables {
        let binning = vars::binning(variable)?;
        let mut channels = Vec::with_capacity(inputs.len());
        for chan_inputs in &inputs {
            let ctx = VariableContext {
                cfg,
                inputs: chan_inputs,
                variable,
                binning: &binning,
                pileup: &pileup,
                ff_e: &ff_e,
                ff_m: &ff_m,
            };
            channels.push(ctx.measure(&mut cache)?);
        }
        let combined = aggregate::combine_channels(&channels, cfg.normalize)?;
        info!(variable = %variable, n_channels = channels.len(), "combined channels");
        reports.push(VariableReport {
            variable: variable.clone(),
            edges: binning.edges().to_vec(),
            channels,
            combined,
        });
    }
    Ok(reports)
}

/// All loaded event sources for one channel.
struct ChannelInputs {
    channel: Channel,
    data: SampleNode,
    sig: SampleNode,
    gen: SampleNode,
    cr_data_2p2f: SampleNode,
    cr_data_3p1f: SampleNode,
    cr_mc_2p2f: SampleNode,
    cr_mc_3p1f: SampleNode,
    /// Irreducible MC background (ttZ, WWZ, ...), subtracted with the
    /// fake estimate; `None` when the channel has no `bkg` directory.
    irr: Option<SampleNode>,
    /// Alternate reco streams keyed by systematic name.
    alt_reco: BTreeMap<String, SampleNode>,
    /// Alternate-generator (signal, gen) trees.
    alt_gen: Option<(SampleNode, SampleNode)>,
}

impl ChannelInputs {
    fn load(cfg: &UnfoldConfig, channel: Channel) -> Result<ChannelInputs> {
        let data_chan = cfg.data_dir.join(channel.as_str());
        let mc_chan = cfg.mc_dir.join(channel.as_str());

        let mut alt_reco = BTreeMap::new();
        for syst in systematics::registry(channel) {
            if !matches!(syst.kind, SystematicKind::RecoVariant(_)) {
                continue;
            }
            let dir = mc_chan.join(format!("signal_{}", syst.name));
            match load_mc_group(&dir, channel, cfg.int_lumi, &syst.name)? {
                Some(node) => {
                    alt_reco.insert(syst.name.clone(), node);
                }
                None => {
                    warn!(channel = %channel, systematic = %syst.name, "no alternate reco stream; variation will be skipped");
                }
            }
        }

        let alt_gen = match &cfg.alt_mc_dir {
            Some(alt_dir) => {
                let chan_dir = alt_dir.join(channel.as_str());
                let sig = load_mc_group(&chan_dir.join("signal"), channel, cfg.int_lumi, "altSig")?;
                let gen = load_mc_group(&chan_dir.join("gen"), channel, cfg.int_lumi, "altGen")?;
                match (sig, gen) {
                    (Some(sig), Some(gen)) => Some((sig, gen)),
                    _ => {
                        warn!(channel = %channel, "incomplete alternate-generator inputs; variation will be skipped");
                        None
                    }
                }
            }
            None => None,
        };

        let irr = load_mc_group(&mc_chan.join("bkg"), channel, cfg.int_lumi, "bkg")?;
        if irr.is_none() {
            warn!(channel = %channel, "no irreducible-background MC; only the fake estimate is subtracted");
        }

        Ok(ChannelInputs {
            channel,
            data: load_data(&data_chan.join("signal"), channel)?,
            sig: require(load_mc_group(&mc_chan.join("signal"), channel, cfg.int_lumi, "signal")?)?,
            gen: require(load_mc_group(&mc_chan.join("gen"), channel, cfg.int_lumi, "gen")?)?,
            cr_data_2p2f: load_data(&data_chan.join("2P2F"), channel)?,
            cr_data_3p1f: load_data(&data_chan.join("3P1F"), channel)?,
            cr_mc_2p2f: require(load_mc_group(&mc_chan.join("2P2F"), channel, cfg.int_lumi, "2P2F")?)?,
            cr_mc_3p1f: require(load_mc_group(&mc_chan.join("3P1F"), channel, cfg.int_lumi, "3P1F")?)?,
            irr,
            alt_reco,
            alt_gen,
        })
    }
}

fn require(node: Option<SampleNode>) -> Result<SampleNode> {
    node.context("required sample directory is missing")
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Merge every data file in `dir` into one leaf, first-seen-wins on
/// duplicate run/lumi/event triples.
fn load_data(dir: &Path, channel: Channel) -> Result<SampleNode> {
    let files = json_files(dir)?;
    let sample = Sample::load_merged("data", &files, channel, 1.0)?;
    info!(channel = %channel, dir = %dir.display(), events = sample.events.len(), "loaded data");
    Ok(SampleNode::Leaf(sample))
}

/// Load every MC file in `dir` as a leaf of one group. Returns `None` when
/// the directory does not exist (optional inputs).
pub(crate) fn load_mc_group(
    dir: &Path,
    channel: Channel,
    int_lumi: f64,
    name: &str,
) -> Result<Option<SampleNode>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut members = Vec::new();
    for path in json_files(dir)? {
        let sample = Sample::load(&path, channel, int_lumi)
            .with_context(|| format!("loading {}", path.display()))?;
        members.push(SampleNode::Leaf(sample));
    }
    Ok(Some(SampleNode::Group { name: name.to_string(), members }))
}

/// Truth-level event weight: normalisation and generator weight only, no
/// reconstruction-level corrections.
pub(crate) fn truth_weight() -> EventWeight<'static> {
    Box::new(|s: &Sample, e: &Event| s.const_scale * s.extra_scale * e.gen_weight)
}

fn normalized(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total != 0.0 { values.iter().map(|v| v / total).collect() } else { values.to_vec() }
}

/// One (channel, variable) measurement pass.
struct VariableContext<'a> {
    cfg: &'a UnfoldConfig,
    inputs: &'a ChannelInputs,
    variable: &'a str,
    binning: &'a Binning,
    pileup: &'a PileupTable,
    ff_e: &'a FakeFactorTable,
    ff_m: &'a FakeFactorTable,
}

impl VariableContext<'_> {
    fn measure(&self, cache: &mut ResultCache) -> Result<ChannelResult> {
        let channel = self.inputs.channel;
        let var = vars::extractor(self.variable, channel)?;
        let sel = vars::selection(self.variable);
        let truth_table = self.build_truth_table(&self.inputs.gen, &var, &sel);
        info!(channel = %channel, variable = self.variable, truth_entries = truth_table.len(), "built truth lookup");

        let data_w = data_weight();
        let data = self.inputs.data.make_hist(self.binning, &*var, &*sel, &*data_w);

        let fakes =
            self.fake_estimate(Shift::Nominal, Shift::Nominal, &self.control_regions(), &var, &sel)?;
        let irr_nominal = self.irreducible(&var, &sel, &*self.nominal_reco_weight());
        let background = fakes.add(&irr_nominal)?;
        let unfolder = IterativeUnfolder::new(self.cfg.n_iterations)?;

        let nominal = {
            let key = ResultKey::nominal(channel, self.variable);
            cache.get_or_compute(&key, self.binning, || {
                let response = self.response(
                    &self.inputs.sig,
                    &self.inputs.gen,
                    &truth_table,
                    (&var, &sel),
                    (&var, &sel),
                    &*base_mc_weight(self.pileup, Shift::Nominal, EfficiencyShift::default()),
                    &*truth_weight(),
                );
                unfolder.unfold(&response, &data, &background)
            })?
        };
        let nominal_values = self.report_values(&nominal);

        let mut variations: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut scale_variants: Vec<Vec<f64>> = Vec::new();

        for syst in systematics::registry(channel) {
            let varied = match syst.kind {
                SystematicKind::Pileup(shift) => {
                    let reco_w = base_mc_weight(self.pileup, shift, EfficiencyShift::default());
                    // the irreducible MC is reweighted with the signal; the
                    // fake estimate stays nominal
                    let bkg = fakes.add(&self.irreducible(&var, &sel, &*reco_w))?;
                    Some(self.unfold_reweighted(
                        cache,
                        &unfolder,
                        &syst.name,
                        &truth_table,
                        (&var, &sel),
                        &data,
                        &bkg,
                        reco_w,
                        truth_weight(),
                    )?)
                }
                SystematicKind::Efficiency(flavor, shift) => {
                    let reco_w = base_mc_weight(
                        self.pileup,
                        Shift::Nominal,
                        EfficiencyShift::for_flavor(flavor, shift),
                    );
                    let bkg = fakes.add(&self.irreducible(&var, &sel, &*reco_w))?;
                    Some(self.unfold_reweighted(
                        cache,
                        &unfolder,
                        &syst.name,
                        &truth_table,
                        (&var, &sel),
                        &data,
                        &bkg,
                        reco_w,
                        truth_weight(),
                    )?)
                }
                SystematicKind::AlphaS(shift) => {
                    let index =
                        if shift == Shift::Up { ALPHA_S_UP_INDEX } else { ALPHA_S_DN_INDEX };
                    Some(self.unfold_reweighted(
                        cache,
                        &unfolder,
                        &syst.name,
                        &truth_table,
                        (&var, &sel),
                        &data,
                        &background,
                        with_pdf_weight(self.nominal_reco_weight(), index),
                        with_pdf_weight(truth_weight(), index),
                    )?)
                }
                SystematicKind::QcdScale(index) => {
                    let result = self.unfold_reweighted(
                        cache,
                        &unfolder,
                        &syst.name,
                        &truth_table,
                        (&var, &sel),
                        &data,
                        &background,
                        with_scale_weight(self.nominal_reco_weight(), index),
                        with_scale_weight(truth_weight(), index),
                    )?;
                    scale_variants.push(result);
                    None
                }
                SystematicKind::Luminosity(shift) => {
                    let factor = match shift {
                        Shift::Up => 1.0 + LUMI_UNCERTAINTY,
                        Shift::Down => 1.0 - LUMI_UNCERTAINTY,
                        Shift::Nominal => 1.0,
                    };
                    Some(self.unfold_rescaled_mc(
                        cache,
                        &unfolder,
                        &syst.name,
                        &truth_table,
                        (&var, &sel),
                        &data,
                        &fakes,
                        &|_| true,
                        factor,
                        factor,
                    )?)
                }
                SystematicKind::McfmXsec(shift) => {
                    let factor = match shift {
                        Shift::Up => 1.0 + MCFM_XSEC_UP,
                        Shift::Down => 1.0 - MCFM_XSEC_DN,
                        Shift::Nominal => 1.0,
                    };
                    Some(self.unfold_rescaled_mc(
                        cache,
                        &unfolder,
                        &syst.name,
                        &truth_table,
                        (&var, &sel),
                        &data,
                        &fakes,
                        &|s: &Sample| !s.has_lhe,
                        factor,
                        1.0,
                    )?)
                }
                SystematicKind::FakeRate(flavor, shift) => {
                    let (e_shift, m_shift) = match flavor {
                        LeptonFlavor::Electron => (shift, Shift::Nominal),
                        LeptonFlavor::Muon => (Shift::Nominal, shift),
                    };
                    let varied_fakes =
                        self.fake_estimate(e_shift, m_shift, &self.control_regions(), &var, &sel)?;
                    let varied_bkg = varied_fakes.add(&irr_nominal)?;
                    let key = ResultKey::systematic(channel, self.variable, &syst.name);
                    let result = cache.get_or_compute(&key, self.binning, || {
                        let response = self.response(
                            &self.inputs.sig,
                            &self.inputs.gen,
                            &truth_table,
                            (&var, &sel),
                            (&var, &sel),
                            &*self.nominal_reco_weight(),
                            &*truth_weight(),
                        );
                        unfolder.unfold(&response, &data, &varied_bkg)
                    })?;
                    Some(self.report_values(&result))
                }
                SystematicKind::RecoVariant(_) => {
                    let Some(alt) = self.inputs.alt_reco.get(&syst.name) else { continue };
                    let key = ResultKey::systematic(channel, self.variable, &syst.name);
                    let result = cache.get_or_compute(&key, self.binning, || {
                        let response = self.response(
                            alt,
                            &self.inputs.gen,
                            &truth_table,
                            (&var, &sel),
                            (&var, &sel),
                            &*self.nominal_reco_weight(),
                            &*truth_weight(),
                        );
                        unfolder.unfold(&response, &data, &background)
                    })?;
                    Some(self.report_values(&result))
                }
                SystematicKind::Generator => {
                    let Some((alt_sig, alt_gen)) = &self.inputs.alt_gen else { continue };
                    let alt_table = self.build_truth_table(alt_gen, &var, &sel);
                    let key = ResultKey::systematic(channel, self.variable, &syst.name);
                    let result = cache.get_or_compute(&key, self.binning, || {
                        let response = self.response(
                            alt_sig,
                            alt_gen,
                            &alt_table,
                            (&var, &sel),
                            (&var, &sel),
                            &*self.nominal_reco_weight(),
                            &*truth_weight(),
                        );
                        unfolder.unfold(&response, &data, &background)
                    })?;
                    Some(self.report_values(&result))
                }
                SystematicKind::JetEnergy(calib, shift) => {
                    if !vars::is_jet_variable(self.variable) {
                        continue;
                    }
                    let suffix = systematics::jet_suffix(calib, shift);
                    let reco_var = vars::jet_extractor(self.variable, channel, suffix)?;
                    let reco_sel = vars::jet_selection(self.variable, suffix);
                    // data and the truth side stay nominal; the reco side
                    // and the irreducible MC read the recalibrated jets
                    let bkg = fakes
                        .add(&self.irreducible(&reco_var, &reco_sel, &*self.nominal_reco_weight()))?;
                    let key = ResultKey::systematic(channel, self.variable, &syst.name);
                    let result = cache.get_or_compute(&key, self.binning, || {
                        let response = self.response(
                            &self.inputs.sig,
                            &self.inputs.gen,
                            &truth_table,
                            (&var, &sel),
                            (&reco_var, &reco_sel),
                            &*self.nominal_reco_weight(),
                            &*truth_weight(),
                        );
                        unfolder.unfold(&response, &data, &bkg)
                    })?;
                    Some(self.report_values(&result))
                }
                SystematicKind::Pdf(shift) => {
                    if shift == Shift::Down {
                        // produced together with the up variant
                        continue;
                    }
                    let rms = self.pdf_rms(
                        &unfolder,
                        &truth_table,
                        (&var, &sel),
                        &data,
                        &background,
                        &nominal_values,
                    )?;
                    let up: Vec<f64> =
                        nominal_values.iter().zip(&rms).map(|(n, r)| n + r).collect();
                    let dn: Vec<f64> =
                        nominal_values.iter().zip(&rms).map(|(n, r)| n - r).collect();
                    variations.insert("pdf_up".to_string(), up);
                    variations.insert("pdf_dn".to_string(), dn);
                    None
                }
            };
            if let Some(values) = varied {
                variations.insert(syst.name.clone(), values);
            }
        }

        if !scale_variants.is_empty() {
            let (up_d, dn_d) = aggregate::scale_envelope(&nominal_values, &scale_variants);
            let up: Vec<f64> = nominal_values.iter().zip(&up_d).map(|(n, d)| n + d).collect();
            let dn: Vec<f64> = nominal_values.iter().zip(&dn_d).map(|(n, d)| n + d).collect();
            variations.insert("scale_up".to_string(), up);
            variations.insert("scale_dn".to_string(), dn);
        }

        let mut reported = nominal.clone();
        if self.cfg.normalize {
            reported.normalize();
        }
        Ok(ChannelResult::aggregate(channel, &reported, &variations))
    }

    fn nominal_reco_weight(&self) -> EventWeight<'_> {
        base_mc_weight(self.pileup, Shift::Nominal, EfficiencyShift::default())
    }

    fn build_truth_table(
        &self,
        gen: &SampleNode,
        var: &vars::Extractor,
        sel: &vars::Selection,
    ) -> TruthTable {
        let mut table = TruthTable::default();
        let gated = |ev: &Event| if sel(ev) { var(ev) } else { Vec::new() };
        for leaf in gen.leaves() {
            table.add_events(&leaf.events, &gated);
        }
        table
    }

    fn control_regions(&self) -> ControlRegions<'_> {
        ControlRegions {
            data_3p1f: &self.inputs.cr_data_3p1f,
            mc_3p1f: &self.inputs.cr_mc_3p1f,
            data_2p2f: &self.inputs.cr_data_2p2f,
            mc_2p2f: &self.inputs.cr_mc_2p2f,
        }
    }

    fn fake_estimate(
        &self,
        e_shift: Shift,
        m_shift: Shift,
        regions: &ControlRegions<'_>,
        var: &vars::Extractor,
        sel: &vars::Selection,
    ) -> Result<Hist1D> {
        let estimator = FakeBackgroundEstimator::new(self.ff_e, self.ff_m, self.pileup);
        Ok(estimator.estimate(regions, self.binning, &**var, &**sel, e_shift, m_shift)?)
    }

    /// Irreducible-background yield in the measured variable; zero when the
    /// channel has no `bkg` MC.
    fn irreducible(
        &self,
        var: &vars::Extractor,
        sel: &vars::Selection,
        weight: &dyn Fn(&Sample, &Event) -> f64,
    ) -> Hist1D {
        match &self.inputs.irr {
            Some(node) => node.make_hist(self.binning, &**var, &**sel, weight),
            None => Hist1D::new(self.binning.clone()),
        }
    }

    fn response(
        &self,
        sig: &SampleNode,
        gen: &SampleNode,
        table: &TruthTable,
        truth_side: (&vars::Extractor, &vars::Selection),
        reco_side: (&vars::Extractor, &vars::Selection),
        reco_w: &dyn Fn(&Sample, &Event) -> f64,
        truth_w: &dyn Fn(&Sample, &Event) -> f64,
    ) -> ResponseMatrix {
        let mut builder = ResponseMatrixBuilder::new(self.binning.clone());
        for leaf in gen.leaves() {
            builder.fill_truth(leaf, &**truth_side.0, &**truth_side.1, truth_w);
        }
        for leaf in sig.leaves() {
            builder.fill_reco(leaf, table, &**reco_side.0, &**reco_side.1, reco_w);
        }
        // a sparse or empty channel still unfolds (to zeros), per the
        // degeneracy policy
        builder.finish_unchecked()
    }

    /// Unfold with reweighted MC, through the cache.
    #[allow(clippy::too_many_arguments)]
    fn unfold_reweighted(
        &self,
        cache: &mut ResultCache,
        unfolder: &IterativeUnfolder,
        name: &str,
        table: &TruthTable,
        (var, sel): (&vars::Extractor, &vars::Selection),
        data: &Hist1D,
        background: &Hist1D,
        reco_w: EventWeight<'_>,
        truth_w: EventWeight<'_>,
    ) -> Result<Vec<f64>> {
        let key = ResultKey::systematic(self.inputs.channel, self.variable, name);
        let result = cache.get_or_compute(&key, self.binning, || {
            let response = self.response(
                &self.inputs.sig,
                &self.inputs.gen,
                table,
                (var, sel),
                (var, sel),
                &*reco_w,
                &*truth_w,
            );
            unfolder.unfold(&response, data, background)
        })?;
        Ok(self.report_values(&result))
    }

    /// Unfold with a flat rescale of the MC leaves matching `pred`, applied
    /// to the response trees and (via `irr_factor`) the irreducible MC. The
    /// fake estimate is data-driven and stays nominal.
    #[allow(clippy::too_many_arguments)]
    fn unfold_rescaled_mc(
        &self,
        cache: &mut ResultCache,
        unfolder: &IterativeUnfolder,
        name: &str,
        table: &TruthTable,
        (var, sel): (&vars::Extractor, &vars::Selection),
        data: &Hist1D,
        fakes: &Hist1D,
        pred: &dyn Fn(&Sample) -> bool,
        factor: f64,
        irr_factor: f64,
    ) -> Result<Vec<f64>> {
        let mut sig = self.inputs.sig.clone();
        let mut gen = self.inputs.gen.clone();
        sig.apply_scale_where(pred, factor);
        gen.apply_scale_where(pred, factor);

        let background =
            fakes.add(&self.irreducible(var, sel, &*self.nominal_reco_weight()).scaled(irr_factor))?;

        let key = ResultKey::systematic(self.inputs.channel, self.variable, name);
        let result = cache.get_or_compute(&key, self.binning, || {
            let response = self.response(
                &sig,
                &gen,
                table,
                (var, sel),
                (var, sel),
                &*self.nominal_reco_weight(),
                &*truth_weight(),
            );
            unfolder.unfold(&response, data, &background)
        })?;
        Ok(self.report_values(&result))
    }

    /// Per-bin RMS of the unfolded spectrum over the PDF replica weights.
    /// Samples without replica weights contribute their nominal spectrum,
    /// so the RMS only reflects genuine PDF spread.
    fn pdf_rms(
        &self,
        unfolder: &IterativeUnfolder,
        table: &TruthTable,
        (var, sel): (&vars::Extractor, &vars::Selection),
        data: &Hist1D,
        background: &Hist1D,
        nominal_values: &[f64],
    ) -> Result<Vec<f64>> {
        let has_replicas = self
            .inputs
            .sig
            .leaves()
            .iter()
            .any(|s| s.events.iter().any(|e| e.pdf_weights.len() >= N_PDF_VARIATIONS));
        if !has_replicas {
            warn!(channel = %self.inputs.channel, variable = self.variable, "no PDF replica weights; pdf variation is zero");
            return Ok(vec![0.0; self.binning.n_bins()]);
        }
        let mut replicas = Vec::with_capacity(N_PDF_VARIATIONS);
        for index in 0..N_PDF_VARIATIONS {
            let response = self.response(
                &self.inputs.sig,
                &self.inputs.gen,
                table,
                (var, sel),
                (var, sel),
                &*with_pdf_weight(self.nominal_reco_weight(), index),
                &*with_pdf_weight(truth_weight(), index),
            );
            let result = unfolder.unfold(&response, data, background)?;
            replicas.push(self.report_values(&result));
        }
        Ok(aggregate::pdf_rms(nominal_values, &replicas))
    }

    /// Values entering the aggregation: unit-normalised in shape-only mode.
    fn report_values(&self, result: &UnfoldedResult) -> Vec<f64> {
        if self.cfg.normalize {
            normalized(result.values())
        } else {
            result.values().to_vec()
        }
    }
}

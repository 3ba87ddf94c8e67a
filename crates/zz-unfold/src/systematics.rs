//! The systematic-variation registry.
//!
//! Every variation the measurement evaluates has a stable name (used for
//! result keys, persisted files and logs) and a kind telling the driver how
//! to realise it: reweight, swap calibration variant, substitute an
//! alternate event stream, or rescale. Flavor-scoped variations only apply
//! to channels containing that flavor.

use zz_core::{Channel, LeptonFlavor, Shift};

/// Relative luminosity uncertainty.
pub const LUMI_UNCERTAINTY: f64 = 0.026;

/// Flat cross-section uncertainty for samples without LHE weights
/// (gluon-fusion MCFM): +18% / −15%.
pub const MCFM_XSEC_UP: f64 = 0.18;
/// See [`MCFM_XSEC_UP`].
pub const MCFM_XSEC_DN: f64 = 0.15;

/// LHE weight indices spanning the QCD renormalisation/factorisation scale
/// variations (the (0.5, 2)×(0.5, 2) grid without the anticorrelated
/// corners).
pub const QCD_SCALE_INDICES: [usize; 6] = [1, 2, 3, 4, 6, 8];

/// Number of PDF replica weights preceding the two αs entries.
pub const N_PDF_VARIATIONS: usize = 100;
/// Index of the αs-up weight.
pub const ALPHA_S_UP_INDEX: usize = 100;
/// Index of the αs-down weight.
pub const ALPHA_S_DN_INDEX: usize = 101;

/// Which jet-energy calibration a [`SystematicKind::JetEnergy`] variation
/// shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JetCalib {
    /// Jet energy resolution smearing.
    Resolution,
    /// Jet energy scale correction.
    Scale,
}

/// How a systematic variation is realised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystematicKind {
    /// Swap the pileup weight table variant.
    Pileup(Shift),
    /// Shift the efficiency scale factors of one lepton flavor.
    Efficiency(LeptonFlavor, Shift),
    /// Flat rescale of the nominal response by the luminosity uncertainty.
    Luminosity(Shift),
    /// Shift the fake-rate multiplier for one flavor in the background
    /// estimate.
    FakeRate(LeptonFlavor, Shift),
    /// Substitute an alternate reconstructed event stream (energy scale or
    /// resolution shifts, muon closure).
    RecoVariant(Shift),
    /// Substitute the alternate-generator signal MC entirely.
    Generator,
    /// Reweight by one LHE QCD-scale weight; enveloped downstream.
    QcdScale(usize),
    /// Reweight by the LHE αs weight.
    AlphaS(Shift),
    /// Per-bin RMS over the LHE PDF replica weights, applied as a ±shift.
    Pdf(Shift),
    /// Flat cross-section shift of the no-LHE (MCFM) samples.
    McfmXsec(Shift),
    /// Read the jet quantities recomputed under a shifted jet calibration.
    /// Only evaluated for jet observables.
    JetEnergy(JetCalib, Shift),
}

/// Suffix appended to the stored jet quantity keys for one jet-energy
/// variation (e.g. `nJets` becomes `nJets_jesUp`). Empty for nominal.
pub fn jet_suffix(calib: JetCalib, shift: Shift) -> &'static str {
    match (calib, shift) {
        (_, Shift::Nominal) => "",
        (JetCalib::Resolution, Shift::Up) => "_jerUp",
        (JetCalib::Resolution, Shift::Down) => "_jerDown",
        (JetCalib::Scale, Shift::Up) => "_jesUp",
        (JetCalib::Scale, Shift::Down) => "_jesDown",
    }
}

/// A named systematic variation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Systematic {
    /// Stable name, e.g. `"eEff_up"`, `"scale_3"`, `"generator"`.
    pub name: String,
    /// How to realise it.
    pub kind: SystematicKind,
}

impl Systematic {
    fn new(name: impl Into<String>, kind: SystematicKind) -> Systematic {
        Systematic { name: name.into(), kind }
    }

    /// Base name shared by an up/down pair: the name with any `_up`/`_dn`
    /// suffix stripped.
    pub fn base_name(name: &str) -> &str {
        name.strip_suffix("_up").or_else(|| name.strip_suffix("_dn")).unwrap_or(name)
    }

    /// Whether this variation applies to a channel. Electron-scoped
    /// variations skip mmmm, muon-scoped ones skip eeee.
    pub fn applies_to(&self, channel: Channel) -> bool {
        match self.kind {
            SystematicKind::Efficiency(flavor, _) | SystematicKind::FakeRate(flavor, _) => {
                match flavor {
                    LeptonFlavor::Electron => channel.has_electrons(),
                    LeptonFlavor::Muon => channel.has_muons(),
                }
            }
            _ => true,
        }
    }

}

/// The full variation list for one channel, in evaluation order.
pub fn registry(channel: Channel) -> Vec<Systematic> {
    use LeptonFlavor::{Electron, Muon};
    use Shift::{Down, Up};
    use SystematicKind as K;

    let mut list = vec![
        Systematic::new("pu_up", K::Pileup(Up)),
        Systematic::new("pu_dn", K::Pileup(Down)),
        Systematic::new("eEff_up", K::Efficiency(Electron, Up)),
        Systematic::new("eEff_dn", K::Efficiency(Electron, Down)),
        Systematic::new("mEff_up", K::Efficiency(Muon, Up)),
        Systematic::new("mEff_dn", K::Efficiency(Muon, Down)),
        Systematic::new("lumi_up", K::Luminosity(Up)),
        Systematic::new("lumi_dn", K::Luminosity(Down)),
        Systematic::new("eFR_up", K::FakeRate(Electron, Up)),
        Systematic::new("eFR_dn", K::FakeRate(Electron, Down)),
        Systematic::new("mFR_up", K::FakeRate(Muon, Up)),
        Systematic::new("mFR_dn", K::FakeRate(Muon, Down)),
        Systematic::new("generator", K::Generator),
        Systematic::new("alphaS_up", K::AlphaS(Up)),
        Systematic::new("alphaS_dn", K::AlphaS(Down)),
        Systematic::new("pdf_up", K::Pdf(Up)),
        Systematic::new("pdf_dn", K::Pdf(Down)),
        Systematic::new("mcfmxsec_up", K::McfmXsec(Up)),
        Systematic::new("mcfmxsec_dn", K::McfmXsec(Down)),
        Systematic::new("jer_up", K::JetEnergy(JetCalib::Resolution, Up)),
        Systematic::new("jer_dn", K::JetEnergy(JetCalib::Resolution, Down)),
        Systematic::new("jes_up", K::JetEnergy(JetCalib::Scale, Up)),
        Systematic::new("jes_dn", K::JetEnergy(JetCalib::Scale, Down)),
    ];
    if channel.has_electrons() {
        list.push(Systematic::new("eScale_up", K::RecoVariant(Up)));
        list.push(Systematic::new("eScale_dn", K::RecoVariant(Down)));
        list.push(Systematic::new("eRhoRes_up", K::RecoVariant(Up)));
        list.push(Systematic::new("eRhoRes_dn", K::RecoVariant(Down)));
        // the φ-resolution smearing has no down variant; symmetrised later
        list.push(Systematic::new("ePhiRes_up", K::RecoVariant(Up)));
    }
    if channel.has_muons() {
        list.push(Systematic::new("mClosure_up", K::RecoVariant(Up)));
        list.push(Systematic::new("mClosure_dn", K::RecoVariant(Down)));
    }
    for i in QCD_SCALE_INDICES {
        list.push(Systematic::new(format!("scale_{i}"), K::QcdScale(i)));
    }
    list.retain(|s| s.applies_to(channel));
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_scoping() {
        let names = |c: Channel| -> Vec<String> {
            registry(c).into_iter().map(|s| s.name).collect()
        };
        let eeee = names(Channel::E4);
        assert!(eeee.contains(&"eEff_up".to_string()));
        assert!(!eeee.contains(&"mEff_up".to_string()));
        assert!(!eeee.contains(&"mClosure_up".to_string()));
        assert!(!eeee.contains(&"mFR_dn".to_string()));

        let mmmm = names(Channel::Mu4);
        assert!(!mmmm.contains(&"eEff_up".to_string()));
        assert!(!mmmm.contains(&"eScale_up".to_string()));
        assert!(mmmm.contains(&"mClosure_dn".to_string()));

        let eemm = names(Channel::E2Mu2);
        assert!(eemm.contains(&"eEff_up".to_string()));
        assert!(eemm.contains(&"mEff_up".to_string()));
    }

    #[test]
    fn base_names() {
        assert_eq!(Systematic::base_name("eEff_up"), "eEff");
        assert_eq!(Systematic::base_name("pu_dn"), "pu");
        assert_eq!(Systematic::base_name("generator"), "generator");
        assert_eq!(Systematic::base_name("scale_3"), "scale_3");
    }

    #[test]
    fn jet_energy_suffixes() {
        use Shift::{Down, Nominal, Up};
        assert_eq!(jet_suffix(JetCalib::Resolution, Up), "_jerUp");
        assert_eq!(jet_suffix(JetCalib::Resolution, Down), "_jerDown");
        assert_eq!(jet_suffix(JetCalib::Scale, Up), "_jesUp");
        assert_eq!(jet_suffix(JetCalib::Scale, Down), "_jesDown");
        assert_eq!(jet_suffix(JetCalib::Scale, Nominal), "");

        for channel in [Channel::E4, Channel::E2Mu2, Channel::Mu4] {
            let names: Vec<String> = registry(channel).into_iter().map(|s| s.name).collect();
            for name in ["jer_up", "jer_dn", "jes_up", "jes_dn"] {
                assert!(names.contains(&name.to_string()));
            }
        }
    }

    #[test]
    fn unpaired_phi_resolution() {
        let eeee = registry(Channel::E4);
        assert!(eeee.iter().any(|s| s.name == "ePhiRes_up"));
        assert!(!eeee.iter().any(|s| s.name == "ePhiRes_dn"));
    }
}

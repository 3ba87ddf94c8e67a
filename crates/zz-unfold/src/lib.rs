//! # zz-unfold
//!
//! The measurement engine: response-matrix construction from matched
//! reco/truth event pairs, D'Agostini iterative unfolding with full
//! covariance propagation, the fake-lepton (Z+X) background estimate,
//! systematic-uncertainty aggregation with cross-channel combination, and
//! a cache for unfolded results keyed by (channel, variable, systematic).

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Uncertainty bands, sign assignment, channel combination.
pub mod aggregate;
/// D'Agostini iterative unfolding.
pub mod bayes;
/// Unfolded-result caching and persistence.
pub mod cache;
/// Fake-lepton background estimation from ID control regions.
pub mod fakes;
/// Response matrices and their construction.
pub mod response;
/// The systematic-variation registry.
pub mod systematics;

pub use aggregate::{ChannelResult, CombinedResult, UncertaintyBand};
pub use bayes::{IterativeUnfolder, UnfoldedResult};
pub use cache::{ResultCache, ResultKey};
pub use fakes::{ControlRegions, FakeBackgroundEstimator};
pub use response::{ResponseMatrix, ResponseMatrixBuilder, TruthTable};
pub use systematics::{jet_suffix, JetCalib, Systematic, SystematicKind};

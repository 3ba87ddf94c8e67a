//! # zz-sample
//!
//! Sample bookkeeping for the ZZ→4ℓ analysis: per-event records and their
//! JSON input format, the Leaf/Group/Stack sample tree, run/lumi/event
//! deduplication, calibration lookup tables (pileup reweighting, fake
//! factors), per-event weight builders, and single-pass weighted histogram
//! filling from an event stream.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Calibration lookup tables.
pub mod calib;
/// Run/lumi/event deduplication.
pub mod dedup;
/// Event records and sample input files.
pub mod event;
/// Histogram filling from event streams.
pub mod fill;
/// Leaf/Group/Stack sample composition.
pub mod sample;
/// Per-event multiplicative weight builders.
pub mod weights;

pub use calib::{FakeFactorTable, PileupTable};
pub use dedup::DedupSet;
pub use event::{Event, Lepton, SampleFile, SampleMeta};
pub use sample::{EventWeight, Sample, SampleNode};
pub use weights::EfficiencyShift;

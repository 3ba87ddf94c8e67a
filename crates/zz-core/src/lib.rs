//! # zz-core
//!
//! Shared building blocks for the ZZ→4ℓ cross-section measurement:
//! the analysis channels, event identity, validated binnings, and the
//! weighted 1D/2D histogram types the rest of the workspace computes with.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;
/// Weighted histograms with sum-of-weights-squared tracking.
pub mod hist;
/// Channels, event identity, binnings.
pub mod types;

pub use error::{Error, Result};
pub use hist::{Hist1D, Hist2D};
pub use types::{Binning, Channel, EventId, LeptonFlavor, Shift, Z_MASS};

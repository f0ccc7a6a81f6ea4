//! Domain types for the governance core.
//!
//! This module contains the data model shared by detectors, the aggregator
//! and the pipeline façade.

mod detection;
mod evaluation;
mod intervention;
mod session;
mod tone;

pub use detection::*;
pub use evaluation::*;
pub use intervention::*;
pub use session::*;
pub use tone::*;

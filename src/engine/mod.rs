//! Evaluation engine for the governance core.
//!
//! This module contains the detector pipeline:
//! - Tone Analyzer: maps text to a six-dimensional tone profile
//! - Tone-Drift Detector: drift from the session baseline plus manipulative language
//! - Hallucination, Inconsistency and Unsafe-Reasoning Detectors
//! - Aggregator: weighted risk level and recommended action
//! - Evaluation Engine: runs the detectors concurrently and assembles the result

mod aggregator;
mod coordinator;
mod detector;
mod hallucination;
mod inconsistency;
mod rules;
mod tone_analyzer;
mod tone_drift;
mod unsafe_reasoning;

pub use aggregator::*;
pub use coordinator::*;
pub use detector::*;
pub use hallucination::*;
pub use inconsistency::*;
pub use tone_analyzer::*;
pub use tone_drift::*;
pub use unsafe_reasoning::*;

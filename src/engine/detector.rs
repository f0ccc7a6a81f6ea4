//! The detector seam.
//!
//! The evaluation engine and aggregator only know this trait; adding a
//! detector does not touch orchestration code.

use crate::config::CriterionPolicy;
use crate::domain::{Criterion, DetectionResult, SessionContext};
use crate::error::DetectorError;

/// A risk detector for one criterion.
///
/// Implementations must be pure functions of their inputs: no shared mutable
/// state, safe to run concurrently with other detectors.
pub trait Detector: Send + Sync {
    /// The criterion this detector scores.
    fn criterion(&self) -> Criterion;

    /// Human-readable detector name used in logs.
    fn name(&self) -> &str;

    /// Score `draft` in the given session context.
    ///
    /// `policy.threshold` gates `detected`; `policy.custom_rules` are extra
    /// rules supplied through configuration.
    fn detect(
        &self,
        draft: &str,
        context: &SessionContext,
        policy: &CriterionPolicy,
    ) -> Result<DetectionResult, DetectorError>;
}

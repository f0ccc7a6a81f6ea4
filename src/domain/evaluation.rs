//! Evaluation-related domain types.
//!
//! Represents the governance verdict for one candidate reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::detection::{Criterion, DetectionResult, DetectionSet};

/// Prefix of evaluation ids produced by the passthrough path.
pub const PASSTHROUGH_ID_PREFIX: &str = "passthrough_";

/// Discrete risk bucket derived from the weighted aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Map a normalized risk score onto a level.
    ///
    /// 0 → none, (0, .25) → low, [.25, .5) → medium, [.5, .75) → high,
    /// [.75, 1] → critical.
    pub fn from_score(score: f64) -> Self {
        if score.is_nan() || score <= 0.0 {
            RiskLevel::None
        } else if score < 0.25 {
            RiskLevel::Low
        } else if score < 0.5 {
            RiskLevel::Medium
        } else if score < 0.75 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::None => write!(f, "none"),
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(RiskLevel::None),
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

/// Delivery decision handed to the Intervention Engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAction {
    /// Deliver the draft as-is.
    Approve,
    /// Deliver a modified version of the draft.
    Modify,
    /// Do not deliver the draft.
    Block,
    /// Substitute a fallback reply. Chosen by the Intervention Engine, never
    /// recommended by the aggregator.
    Fallback,
}

impl std::fmt::Display for InterventionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterventionAction::Approve => write!(f, "approve"),
            InterventionAction::Modify => write!(f, "modify"),
            InterventionAction::Block => write!(f, "block"),
            InterventionAction::Fallback => write!(f, "fallback"),
        }
    }
}

impl std::str::FromStr for InterventionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(InterventionAction::Approve),
            "modify" => Ok(InterventionAction::Modify),
            "block" => Ok(InterventionAction::Block),
            "fallback" => Ok(InterventionAction::Fallback),
            _ => Err(format!("Unknown intervention action: {}", s)),
        }
    }
}

/// Result of evaluating one candidate reply. One per `evaluate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Unique identifier correlating this result with audit records.
    pub evaluation_id: String,

    /// Per-criterion detection results.
    #[serde(flatten)]
    pub detections: DetectionSet,

    /// Risk bucket of the weighted aggregate score.
    pub overall_risk: RiskLevel,

    /// Action the Intervention Engine should apply.
    pub recommended_action: InterventionAction,

    /// Highest confidence among the detectors that fired (0 if none).
    pub confidence: f64,

    /// When this evaluation was produced.
    pub timestamp: DateTime<Utc>,
}

impl EvaluationResult {
    /// Create a result with a freshly generated evaluation id.
    pub fn new(
        detections: DetectionSet,
        overall_risk: RiskLevel,
        recommended_action: InterventionAction,
        confidence: f64,
    ) -> Self {
        let timestamp = Utc::now();
        Self {
            evaluation_id: generate_id("eval_", timestamp),
            detections,
            overall_risk,
            recommended_action,
            confidence,
            timestamp,
        }
    }

    /// The canonical result for replies that are exempt from evaluation.
    pub fn passthrough() -> Self {
        let timestamp = Utc::now();
        Self {
            evaluation_id: generate_id(PASSTHROUGH_ID_PREFIX, timestamp),
            detections: DetectionSet::default(),
            overall_risk: RiskLevel::None,
            recommended_action: InterventionAction::Approve,
            confidence: 0.0,
            timestamp,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.evaluation_id.starts_with(PASSTHROUGH_ID_PREFIX)
    }

    pub fn detection(&self, criterion: Criterion) -> &DetectionResult {
        self.detections.get(criterion)
    }
}

/// `<prefix><unix millis>_<random suffix>`; unique per call.
fn generate_id(prefix: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}{}_{}",
        prefix,
        timestamp.timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::None);
        assert_eq!(RiskLevel::from_score(0.01), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.25), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.4999), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.5), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.75), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(1.0), RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_is_monotonic() {
        let mut previous = RiskLevel::None;
        for step in 0..=100 {
            let level = RiskLevel::from_score(step as f64 / 100.0);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_string(&InterventionAction::Modify).unwrap();
        assert_eq!(json, "\"modify\"");
        assert_eq!("BLOCK".parse::<InterventionAction>(), Ok(InterventionAction::Block));
    }

    #[test]
    fn test_passthrough_is_canonical() {
        let result = EvaluationResult::passthrough();
        assert!(result.evaluation_id.starts_with("passthrough_"));
        assert!(result.is_passthrough());
        assert_eq!(result.overall_risk, RiskLevel::None);
        assert_eq!(result.recommended_action, InterventionAction::Approve);
        assert_eq!(result.confidence, 0.0);
        for (_, detection) in result.detections.iter() {
            assert!(!detection.detected);
            assert_eq!(detection.confidence, 0.0);
        }
    }

    #[test]
    fn test_evaluation_ids_are_unique() {
        let a = EvaluationResult::passthrough();
        let b = EvaluationResult::passthrough();
        assert_ne!(a.evaluation_id, b.evaluation_id);
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = EvaluationResult::passthrough();
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("tone_drift").is_some());
        assert!(value.get("unsafe_reasoning").is_some());
        assert_eq!(value["recommended_action"], "approve");
    }
}

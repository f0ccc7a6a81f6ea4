//! Downstream collaborator contracts: the Intervention Engine and the audit
//! record handed to external persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::detection::DetectionSet;
use super::evaluation::{EvaluationResult, InterventionAction, RiskLevel};
use super::session::SessionContext;
use crate::error::GovernanceResult;

/// What the Intervention Engine did with a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionOutcome {
    /// Action actually applied (may differ from the recommendation, e.g. fallback).
    pub action: InterventionAction,
    pub reason: String,
    /// Whether the delivered text differs from the draft.
    pub modified: bool,
    /// Text to deliver. `None` means nothing is delivered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,
}

impl InterventionOutcome {
    /// Deliver the draft unchanged.
    pub fn unchanged(draft: &str, reason: impl Into<String>) -> Self {
        Self {
            action: InterventionAction::Approve,
            reason: reason.into(),
            modified: false,
            final_response: Some(draft.to_string()),
        }
    }
}

/// Renders the reply that is actually delivered.
///
/// Implemented outside this crate; the pipeline only hands it the decision.
pub trait InterventionEngine: Send + Sync {
    fn intervene(
        &self,
        action: InterventionAction,
        draft: &str,
        evaluation: &EvaluationResult,
    ) -> InterventionOutcome;
}

/// Evaluation portion of an audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvaluation {
    pub evaluation_id: String,
    #[serde(flatten)]
    pub detections: DetectionSet,
    pub overall_risk: RiskLevel,
    pub recommended_action: InterventionAction,
    pub confidence: f64,
}

impl From<&EvaluationResult> for AuditEvaluation {
    fn from(evaluation: &EvaluationResult) -> Self {
        Self {
            evaluation_id: evaluation.evaluation_id.clone(),
            detections: evaluation.detections.clone(),
            overall_risk: evaluation.overall_risk,
            recommended_action: evaluation.recommended_action,
            confidence: evaluation.confidence,
        }
    }
}

/// Record produced for external audit persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub session_id: String,
    pub draft_response: String,
    pub evaluation_results: AuditEvaluation,
    pub intervention_applied: bool,
    /// What the user received; `None` if delivery was blocked.
    pub final_response: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        context: &SessionContext,
        draft: &str,
        evaluation: &EvaluationResult,
        outcome: &InterventionOutcome,
    ) -> Self {
        Self {
            session_id: context.session_id.clone(),
            draft_response: draft.to_string(),
            evaluation_results: AuditEvaluation::from(evaluation),
            intervention_applied: outcome.action != InterventionAction::Approve
                || outcome.modified,
            final_response: outcome.final_response.clone(),
            recorded_at: Utc::now(),
        }
    }

    /// Encode for hand-off to persistence.
    pub fn to_json(&self) -> GovernanceResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_record_for_unchanged_delivery() {
        let ctx = SessionContext::new("session-1");
        let evaluation = EvaluationResult::passthrough();
        let outcome = InterventionOutcome::unchanged("hello", "approved");

        let record = AuditRecord::new(&ctx, "hello", &evaluation, &outcome);
        assert_eq!(record.session_id, "session-1");
        assert!(!record.intervention_applied);
        assert_eq!(record.final_response.as_deref(), Some("hello"));
        assert_eq!(record.evaluation_results.evaluation_id, evaluation.evaluation_id);
    }

    #[test]
    fn test_audit_record_marks_block_as_intervention() {
        let ctx = SessionContext::new("session-2");
        let evaluation = EvaluationResult::passthrough();
        let outcome = InterventionOutcome {
            action: InterventionAction::Block,
            reason: "unsafe".to_string(),
            modified: false,
            final_response: None,
        };

        let record = AuditRecord::new(&ctx, "draft", &evaluation, &outcome);
        assert!(record.intervention_applied);
        assert!(record.final_response.is_none());

        let json = record.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["evaluation_results"]["recommended_action"], "approve");
        assert_eq!(value["draft_response"], "draft");
    }
}

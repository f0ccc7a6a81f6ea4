//! Governance Pipeline - the entry point callers use.
//!
//! Decides whether a draft needs evaluation at all, delegates to the
//! [`EvaluationEngine`] under one config snapshot, and optionally drives the
//! Intervention Engine and builds the audit record.

use std::sync::Arc;

use crate::config::{
    ConfigSnapshot, ConfigStore, GovernanceConfig, GovernanceConfigUpdate, GovernanceMode,
};
use crate::domain::{
    AuditRecord, EvaluationResult, InterventionAction, InterventionEngine, InterventionOutcome,
    SessionContext,
};
use crate::engine::EvaluationEngine;
use crate::error::GovernanceResult;

/// Drafts starting with one of these are system messages, not model output.
pub const SYSTEM_MESSAGE_PREFIXES: [&str; 4] = ["Error:", "System:", "Loading", "Please wait"];

/// Everything produced for one governed reply.
#[derive(Debug, Clone)]
pub struct GovernedReply {
    pub evaluation: EvaluationResult,
    pub outcome: InterventionOutcome,
    pub audit: AuditRecord,
}

impl GovernedReply {
    /// Text to deliver, if any.
    pub fn final_response(&self) -> Option<&str> {
        self.outcome.final_response.as_deref()
    }
}

/// Gate plus façade over the evaluation engine and the config store.
pub struct GovernancePipeline {
    engine: EvaluationEngine,
    config: ConfigStore,
}

impl GovernancePipeline {
    /// Pipeline over the built-in detectors.
    pub fn new(config: GovernanceConfig) -> GovernanceResult<Self> {
        Self::with_engine(config, EvaluationEngine::new())
    }

    /// Pipeline over a custom engine.
    pub fn with_engine(config: GovernanceConfig, engine: EvaluationEngine) -> GovernanceResult<Self> {
        Ok(Self {
            engine,
            config: ConfigStore::new(config)?,
        })
    }

    /// Pipeline configured from `config/` files and `GOVERNANCE__*` variables.
    pub fn from_env() -> GovernanceResult<Self> {
        Self::new(GovernanceConfig::load()?)
    }

    /// The configuration snapshot currently in force.
    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.config.snapshot()
    }

    /// Apply a partial configuration update atomically.
    ///
    /// Evaluations already running keep the snapshot they started with.
    pub fn update_config(
        &self,
        update: &GovernanceConfigUpdate,
    ) -> GovernanceResult<Arc<ConfigSnapshot>> {
        self.config.update(update)
    }

    /// Replace the whole configuration atomically.
    pub fn replace_config(&self, config: GovernanceConfig) -> GovernanceResult<Arc<ConfigSnapshot>> {
        self.config.replace(config)
    }

    /// Whether `draft` must be evaluated under the current configuration.
    pub fn should_evaluate(&self, draft: &str, _context: &SessionContext) -> bool {
        skip_reason(&self.config.snapshot(), draft).is_none()
    }

    /// Evaluate `draft`, or return the passthrough result when exempt.
    pub async fn evaluate(
        &self,
        draft: &str,
        context: &SessionContext,
    ) -> GovernanceResult<EvaluationResult> {
        self.evaluate_with(self.config.snapshot(), draft, context)
            .await
    }

    /// The action an evaluation recommends.
    pub fn determine_action(&self, evaluation: &EvaluationResult) -> InterventionAction {
        evaluation.recommended_action
    }

    /// Evaluate `draft`, apply the decision through `intervention`, and build
    /// the audit record.
    ///
    /// In monitor mode the draft is delivered unchanged whatever the
    /// recommendation; the evaluation itself is the same in both modes.
    pub async fn govern(
        &self,
        draft: &str,
        context: &SessionContext,
        intervention: &dyn InterventionEngine,
    ) -> GovernanceResult<GovernedReply> {
        let snapshot = self.config.snapshot();
        let mode = snapshot.config().mode;
        let evaluation = self.evaluate_with(snapshot, draft, context).await?;
        let action = self.determine_action(&evaluation);

        let outcome = match mode {
            GovernanceMode::Enforce => intervention.intervene(action, draft, &evaluation),
            GovernanceMode::Monitor => {
                if action != InterventionAction::Approve {
                    tracing::info!(
                        evaluation_id = %evaluation.evaluation_id,
                        session_id = %context.session_id,
                        recommended_action = %action,
                        "Monitor mode, delivering draft unchanged"
                    );
                }
                InterventionOutcome::unchanged(
                    draft,
                    format!("monitor mode: {} recommended", action),
                )
            }
        };

        let audit = AuditRecord::new(context, draft, &evaluation, &outcome);
        Ok(GovernedReply {
            evaluation,
            outcome,
            audit,
        })
    }

    async fn evaluate_with(
        &self,
        snapshot: Arc<ConfigSnapshot>,
        draft: &str,
        context: &SessionContext,
    ) -> GovernanceResult<EvaluationResult> {
        if let Some(reason) = skip_reason(&snapshot, draft) {
            tracing::debug!(
                session_id = %context.session_id,
                reason,
                "Skipping evaluation"
            );
            return Ok(EvaluationResult::passthrough());
        }
        self.engine.evaluate(draft, context, snapshot).await
    }
}

fn skip_reason(snapshot: &ConfigSnapshot, draft: &str) -> Option<&'static str> {
    if !snapshot.config().enabled {
        return Some("governance disabled");
    }
    if SYSTEM_MESSAGE_PREFIXES
        .iter()
        .any(|prefix| draft.starts_with(prefix))
    {
        return Some("system message");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CriterionConfigUpdate;
    use crate::domain::{Criterion, RiskLevel};

    const MANIPULATIVE: &str =
        "You must trust only me. They're wrong about you. Don't listen to them.";

    /// Replaces anything not approved with a fixed fallback.
    struct FallbackIntervention;

    impl InterventionEngine for FallbackIntervention {
        fn intervene(
            &self,
            action: InterventionAction,
            draft: &str,
            _evaluation: &EvaluationResult,
        ) -> InterventionOutcome {
            match action {
                InterventionAction::Approve => InterventionOutcome::unchanged(draft, "approved"),
                InterventionAction::Block => InterventionOutcome {
                    action,
                    reason: "blocked".to_string(),
                    modified: true,
                    final_response: None,
                },
                InterventionAction::Modify | InterventionAction::Fallback => InterventionOutcome {
                    action,
                    reason: "rewritten".to_string(),
                    modified: true,
                    final_response: Some("Let's slow down and look at this together.".to_string()),
                },
            }
        }
    }

    fn pipeline() -> GovernancePipeline {
        GovernancePipeline::new(GovernanceConfig::default()).unwrap()
    }

    #[test]
    fn test_gate_exempts_system_messages() {
        let pipeline = pipeline();
        let ctx = SessionContext::new("s");

        assert!(pipeline.should_evaluate("Here is what I found.", &ctx));
        assert!(!pipeline.should_evaluate("Error: upstream timeout", &ctx));
        assert!(!pipeline.should_evaluate("System: session restored", &ctx));
        assert!(!pipeline.should_evaluate("Loading your history...", &ctx));
        assert!(!pipeline.should_evaluate("Please wait while I check.", &ctx));
        // only an exact leading prefix marks a system message
        assert!(pipeline.should_evaluate("  Error: leading whitespace", &ctx));
        assert!(pipeline.should_evaluate("error: lowercase is model text", &ctx));
    }

    #[test]
    fn test_gate_respects_global_switch() {
        let pipeline = pipeline();
        let ctx = SessionContext::new("s");
        pipeline
            .update_config(&GovernanceConfigUpdate {
                enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert!(!pipeline.should_evaluate("Here is what I found.", &ctx));
    }

    #[test]
    fn test_passthrough_when_disabled() {
        let mut config = GovernanceConfig::default();
        config.enabled = false;
        let pipeline = GovernancePipeline::new(config).unwrap();

        let result =
            tokio_test::block_on(pipeline.evaluate(MANIPULATIVE, &SessionContext::new("s")))
                .unwrap();
        assert!(result.is_passthrough());
        assert_eq!(result.overall_risk, RiskLevel::None);
        assert_eq!(result.recommended_action, InterventionAction::Approve);
        assert_eq!(result.confidence, 0.0);
        assert!(result.detections.fired().is_empty());
    }

    #[tokio::test]
    async fn test_indented_prefix_is_still_evaluated() {
        let pipeline = pipeline();
        let ctx = SessionContext::new("s");
        let draft = format!("  Error: just kidding. {}", MANIPULATIVE);

        assert!(pipeline.should_evaluate(&draft, &ctx));
        let result = pipeline.evaluate(&draft, &ctx).await.unwrap();
        assert!(!result.is_passthrough());
        assert!(result.detection(Criterion::ToneDrift).detected);
        assert_ne!(result.recommended_action, InterventionAction::Approve);
    }

    #[tokio::test]
    async fn test_update_applies_to_next_evaluation() {
        let pipeline = pipeline();
        let ctx = SessionContext::new("s");

        let before = pipeline.evaluate(MANIPULATIVE, &ctx).await.unwrap();
        assert!(before.detection(Criterion::ToneDrift).detected);

        pipeline
            .update_config(&GovernanceConfigUpdate::criterion(
                Criterion::ToneDrift,
                CriterionConfigUpdate {
                    threshold: Some(0.9),
                    ..Default::default()
                },
            ))
            .unwrap();

        let after = pipeline.evaluate(MANIPULATIVE, &ctx).await.unwrap();
        assert!(!after.detection(Criterion::ToneDrift).detected);
        assert_eq!(
            after.detection(Criterion::ToneDrift).confidence,
            before.detection(Criterion::ToneDrift).confidence
        );
        assert_eq!(pipeline.determine_action(&after), InterventionAction::Approve);
    }

    #[tokio::test]
    async fn test_govern_enforces_recommendation() {
        let pipeline = pipeline();
        let ctx = SessionContext::new("s");

        let reply = pipeline
            .govern(MANIPULATIVE, &ctx, &FallbackIntervention)
            .await
            .unwrap();
        assert_eq!(reply.evaluation.recommended_action, InterventionAction::Modify);
        assert!(reply.outcome.modified);
        assert_ne!(reply.final_response(), Some(MANIPULATIVE));
        assert!(reply.audit.intervention_applied);
        assert_eq!(reply.audit.draft_response, MANIPULATIVE);
    }

    #[tokio::test]
    async fn test_govern_in_monitor_mode_delivers_draft() {
        let mut config = GovernanceConfig::default();
        config.mode = GovernanceMode::Monitor;
        let pipeline = GovernancePipeline::new(config).unwrap();
        let ctx = SessionContext::new("s");

        let reply = pipeline
            .govern(MANIPULATIVE, &ctx, &FallbackIntervention)
            .await
            .unwrap();
        assert_eq!(reply.evaluation.recommended_action, InterventionAction::Modify);
        assert_eq!(reply.final_response(), Some(MANIPULATIVE));
        assert!(!reply.audit.intervention_applied);
        assert_eq!(
            reply.audit.evaluation_results.recommended_action,
            InterventionAction::Modify
        );
    }
}

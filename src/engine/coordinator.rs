//! Evaluation Engine - runs the detector set concurrently and assembles the
//! final [`EvaluationResult`].
//!
//! Every enabled detector runs on the blocking pool, optionally bounded by
//! the configured per-detector timeout. All detectors are joined before the
//! aggregator runs. A failed detector either aborts the evaluation or is
//! downgraded to a non-firing result, depending on the failure policy.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::config::{ConfigSnapshot, FailurePolicy};
use crate::domain::{Criterion, DetectionResult, DetectionSet, EvaluationResult, SessionContext};
use crate::engine::aggregator;
use crate::engine::detector::Detector;
use crate::engine::hallucination::HallucinationDetector;
use crate::engine::inconsistency::InconsistencyDetector;
use crate::engine::tone_drift::ToneDriftDetector;
use crate::engine::unsafe_reasoning::UnsafeReasoningDetector;
use crate::error::{GovernanceError, GovernanceResult};

/// The four built-in detectors.
pub fn default_detectors() -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(ToneDriftDetector::new()),
        Arc::new(HallucinationDetector::new()),
        Arc::new(InconsistencyDetector::new()),
        Arc::new(UnsafeReasoningDetector::new()),
    ]
}

/// Orchestrates one evaluation over a detector set.
pub struct EvaluationEngine {
    detectors: Vec<Arc<dyn Detector>>,
}

impl EvaluationEngine {
    /// Engine over the built-in detectors.
    pub fn new() -> Self {
        Self::with_detectors(default_detectors())
    }

    /// Engine over a custom detector set.
    ///
    /// When several detectors report the same criterion the first one is
    /// used. A criterion without a detector never fires.
    pub fn with_detectors(detectors: Vec<Arc<dyn Detector>>) -> Self {
        Self { detectors }
    }

    fn detector_for(&self, criterion: Criterion) -> Option<&Arc<dyn Detector>> {
        self.detectors.iter().find(|d| d.criterion() == criterion)
    }

    fn detector_name(&self, criterion: Criterion) -> &str {
        self.detector_for(criterion)
            .map_or("unregistered", |detector| detector.name())
    }

    /// Evaluate `draft` under one config snapshot.
    pub async fn evaluate(
        &self,
        draft: &str,
        context: &SessionContext,
        snapshot: Arc<ConfigSnapshot>,
    ) -> GovernanceResult<EvaluationResult> {
        let started = Instant::now();
        let failure_policy = snapshot.config().failure_policy;
        let timeout_ms = snapshot.config().detector_timeout_ms;

        let draft: Arc<str> = Arc::from(draft);
        let shared_context = Arc::new(context.clone());

        let mut detections = DetectionSet::default();
        let mut pending = BTreeSet::new();
        let mut tasks = JoinSet::new();

        for criterion in Criterion::ALL {
            if !snapshot.policy(criterion).enabled {
                tracing::debug!(criterion = %criterion, "Criterion disabled, skipping detector");
                continue;
            }
            let Some(detector) = self.detector_for(criterion) else {
                tracing::debug!(criterion = %criterion, "No detector registered");
                continue;
            };

            pending.insert(criterion);
            tasks.spawn(run_detector(
                criterion,
                Arc::clone(detector),
                Arc::clone(&draft),
                Arc::clone(&shared_context),
                Arc::clone(&snapshot),
                timeout_ms,
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            // The wrapper task only awaits; losing it is handled below.
            let Ok((criterion, outcome)) = joined else {
                continue;
            };
            pending.remove(&criterion);

            let result = match outcome {
                Ok(result) => result,
                Err(error) => match settle_failure(failure_policy, error) {
                    Ok(degraded) => degraded,
                    Err(error) => {
                        tasks.abort_all();
                        return Err(error);
                    }
                },
            };

            tracing::debug!(
                criterion = %criterion,
                detector = self.detector_name(criterion),
                confidence = result.confidence,
                detected = result.detected,
                patterns = result.patterns.len(),
                "Detector complete"
            );
            detections.set(criterion, result);
        }

        // A criterion still pending lost its task without reporting back.
        for criterion in pending {
            let degraded =
                settle_failure(failure_policy, GovernanceError::DetectorPanicked { criterion })?;
            detections.set(criterion, degraded);
        }

        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_millis() as u64;
        let budget_ms = snapshot.config().latency_budget_ms;
        if over_budget(elapsed, budget_ms) {
            tracing::warn!(
                session_id = %context.session_id,
                duration_ms,
                budget_ms,
                "Detector fan-out exceeded latency budget"
            );
        }

        let assessment = aggregator::assess(&detections, snapshot.thresholds());
        let evaluation = EvaluationResult::new(
            detections,
            assessment.overall_risk,
            assessment.recommended_action,
            assessment.confidence,
        );

        tracing::info!(
            evaluation_id = %evaluation.evaluation_id,
            session_id = %context.session_id,
            overall_risk = %evaluation.overall_risk,
            recommended_action = %evaluation.recommended_action,
            confidence = evaluation.confidence,
            risk_score = assessment.risk_score,
            duration_ms,
            config_version = snapshot.version(),
            "Evaluation complete"
        );

        Ok(evaluation)
    }
}

impl Default for EvaluationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a fan-out took strictly longer than the latency budget.
fn over_budget(elapsed: Duration, budget_ms: u64) -> bool {
    elapsed > Duration::from_millis(budget_ms)
}

/// Run one detector on the blocking pool and map its failure modes.
async fn run_detector(
    criterion: Criterion,
    detector: Arc<dyn Detector>,
    draft: Arc<str>,
    context: Arc<SessionContext>,
    snapshot: Arc<ConfigSnapshot>,
    timeout_ms: Option<u64>,
) -> (Criterion, GovernanceResult<DetectionResult>) {
    let handle = tokio::task::spawn_blocking(move || {
        detector.detect(&draft, &context, snapshot.policy(criterion))
    });

    // A timed-out detector keeps its blocking thread until it returns; only
    // the evaluation stops waiting for it.
    let joined = match timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), handle).await {
            Ok(joined) => joined,
            Err(_) => {
                return (
                    criterion,
                    Err(GovernanceError::DetectorTimeout {
                        criterion,
                        timeout_ms: ms,
                    }),
                )
            }
        },
        None => handle.await,
    };

    let outcome = match joined {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(error)) => Err(GovernanceError::Detector {
            criterion,
            message: error.to_string(),
        }),
        Err(_) => Err(GovernanceError::DetectorPanicked { criterion }),
    };
    (criterion, outcome)
}

/// Apply the failure policy to a detector failure.
fn settle_failure(
    policy: FailurePolicy,
    error: GovernanceError,
) -> GovernanceResult<DetectionResult> {
    match policy {
        FailurePolicy::FailFast => {
            tracing::warn!(
                criterion = ?error.criterion(),
                error = %error,
                "Detector failed, aborting evaluation"
            );
            Err(error)
        }
        FailurePolicy::Isolate => {
            tracing::warn!(
                criterion = ?error.criterion(),
                error = %error,
                "Detector failed, continuing with a non-firing result"
            );
            Ok(DetectionResult::failed(&error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CriterionPolicy, GovernanceConfig};
    use crate::domain::{InterventionAction, RiskLevel};
    use crate::error::DetectorError;
    use crate::logging;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDetector {
        criterion: Criterion,
        confidence: f64,
        calls: AtomicUsize,
    }

    impl FixedDetector {
        fn new(criterion: Criterion, confidence: f64) -> Self {
            Self {
                criterion,
                confidence,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Detector for FixedDetector {
        fn criterion(&self) -> Criterion {
            self.criterion
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(
            &self,
            _draft: &str,
            _context: &SessionContext,
            policy: &CriterionPolicy,
        ) -> Result<DetectionResult, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DetectionResult::scored(
                self.confidence,
                policy.threshold,
                vec!["fixed".to_string()],
                BTreeMap::new(),
            ))
        }
    }

    enum Misbehavior {
        Fail,
        Panic,
        Hang(Duration),
    }

    struct BrokenDetector {
        criterion: Criterion,
        misbehavior: Misbehavior,
    }

    impl Detector for BrokenDetector {
        fn criterion(&self) -> Criterion {
            self.criterion
        }

        fn name(&self) -> &str {
            "broken"
        }

        fn detect(
            &self,
            _draft: &str,
            _context: &SessionContext,
            policy: &CriterionPolicy,
        ) -> Result<DetectionResult, DetectorError> {
            match self.misbehavior {
                Misbehavior::Fail => Err(DetectorError::new("lexicon unavailable")),
                Misbehavior::Panic => panic!("detector bug"),
                Misbehavior::Hang(duration) => {
                    std::thread::sleep(duration);
                    Ok(DetectionResult::scored(0.0, policy.threshold, vec![], BTreeMap::new()))
                }
            }
        }
    }

    fn snapshot(config: GovernanceConfig) -> Arc<ConfigSnapshot> {
        Arc::new(ConfigSnapshot::compile(config, 1).unwrap())
    }

    fn with_broken(misbehavior: Misbehavior) -> EvaluationEngine {
        let mut detectors = default_detectors();
        detectors.insert(
            0,
            Arc::new(BrokenDetector {
                criterion: Criterion::Hallucination,
                misbehavior,
            }),
        );
        EvaluationEngine::with_detectors(detectors)
    }

    #[tokio::test]
    async fn test_neutral_reply_is_approved() {
        logging::init_test();
        let engine = EvaluationEngine::new();
        let result = engine
            .evaluate(
                "The report covers the quarterly figures for the northern region.",
                &SessionContext::new("s"),
                snapshot(GovernanceConfig::default()),
            )
            .await
            .unwrap();

        assert!(result.detections.fired().is_empty());
        assert_eq!(result.overall_risk, RiskLevel::None);
        assert_eq!(result.recommended_action, InterventionAction::Approve);
        assert_eq!(result.confidence, 0.0);
        assert!(result.evaluation_id.starts_with("eval_"));
    }

    #[tokio::test]
    async fn test_disabled_criterion_skips_detector() {
        let fixed = Arc::new(FixedDetector::new(Criterion::Inconsistency, 0.9));
        let as_detector: Arc<dyn Detector> = fixed.clone();
        let engine = EvaluationEngine::with_detectors(vec![as_detector]);

        let mut config = GovernanceConfig::default();
        config.criteria.inconsistency.enabled = false;
        let result = engine
            .evaluate("anything", &SessionContext::new("s"), snapshot(config))
            .await
            .unwrap();

        assert_eq!(fixed.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.detection(Criterion::Inconsistency), &DetectionResult::inactive());
        assert_eq!(result.recommended_action, InterventionAction::Approve);
    }

    #[tokio::test]
    async fn test_missing_detector_never_fires() {
        let engine = EvaluationEngine::with_detectors(vec![Arc::new(FixedDetector::new(
            Criterion::ToneDrift,
            0.6,
        ))]);
        let result = engine
            .evaluate("anything", &SessionContext::new("s"), snapshot(GovernanceConfig::default()))
            .await
            .unwrap();

        assert_eq!(result.detections.fired(), vec![Criterion::ToneDrift]);
        assert!(!result.detection(Criterion::UnsafeReasoning).detected);
        assert_eq!(result.recommended_action, InterventionAction::Modify);
        assert_eq!(result.confidence, 0.6);
    }

    #[tokio::test]
    async fn test_unsafe_override_blocks() {
        let mut detectors = default_detectors();
        detectors.insert(0, Arc::new(FixedDetector::new(Criterion::UnsafeReasoning, 0.85)));
        let engine = EvaluationEngine::with_detectors(detectors);

        let result = engine
            .evaluate(
                "You must trust only me. They're wrong about you. Don't listen to them.",
                &SessionContext::new("s"),
                snapshot(GovernanceConfig::default()),
            )
            .await
            .unwrap();

        assert!(result.detection(Criterion::ToneDrift).detected);
        assert_eq!(result.recommended_action, InterventionAction::Block);
    }

    #[tokio::test]
    async fn test_fail_fast_propagates_detector_error() {
        let engine = with_broken(Misbehavior::Fail);
        let err = engine
            .evaluate("hello", &SessionContext::new("s"), snapshot(GovernanceConfig::default()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GovernanceError::Detector { criterion: Criterion::Hallucination, .. }
        ));
        assert!(err.to_string().contains("lexicon unavailable"));
    }

    #[tokio::test]
    async fn test_isolate_downgrades_failed_detector() {
        let engine = with_broken(Misbehavior::Fail);
        let mut config = GovernanceConfig::default();
        config.failure_policy = FailurePolicy::Isolate;

        let result = engine
            .evaluate("hello", &SessionContext::new("s"), snapshot(config))
            .await
            .unwrap();

        let hallucination = result.detection(Criterion::Hallucination);
        assert!(!hallucination.detected);
        assert_eq!(hallucination.confidence, 0.0);
        assert!(hallucination.error().unwrap().contains("lexicon unavailable"));
        assert!(result.detection(Criterion::ToneDrift).error().is_none());
    }

    #[tokio::test]
    async fn test_panicking_detector_is_a_failure() {
        let engine = with_broken(Misbehavior::Panic);
        let err = engine
            .evaluate("hello", &SessionContext::new("s"), snapshot(GovernanceConfig::default()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::DetectorPanicked { criterion: Criterion::Hallucination }
        ));

        let mut config = GovernanceConfig::default();
        config.failure_policy = FailurePolicy::Isolate;
        let result = engine
            .evaluate("hello", &SessionContext::new("s"), snapshot(config))
            .await
            .unwrap();
        assert!(result.detection(Criterion::Hallucination).error().is_some());
    }

    #[tokio::test]
    async fn test_timeout_bounds_slow_detector() {
        let engine = with_broken(Misbehavior::Hang(Duration::from_millis(500)));
        let mut config = GovernanceConfig::default();
        config.detector_timeout_ms = Some(20);

        let err = engine
            .evaluate("hello", &SessionContext::new("s"), snapshot(config))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::DetectorTimeout {
                criterion: Criterion::Hallucination,
                timeout_ms: 20
            }
        ));
    }

    #[test]
    fn test_over_budget_boundary() {
        assert!(!over_budget(Duration::from_millis(999), 1000));
        assert!(!over_budget(Duration::from_millis(1000), 1000));
        assert!(over_budget(Duration::from_micros(1_000_001), 1000));
        assert!(over_budget(Duration::from_millis(30), 1));
    }

    #[test]
    fn test_detector_name_follows_first_registration() {
        let engine = with_broken(Misbehavior::Fail);
        assert_eq!(engine.detector_name(Criterion::Hallucination), "broken");
        assert_eq!(engine.detector_name(Criterion::ToneDrift), "tone_drift");

        let empty = EvaluationEngine::with_detectors(Vec::new());
        assert_eq!(empty.detector_name(Criterion::ToneDrift), "unregistered");
    }

    #[tokio::test]
    async fn test_slow_fan_out_is_not_an_error_without_timeout() {
        let engine = with_broken(Misbehavior::Hang(Duration::from_millis(30)));
        let mut config = GovernanceConfig::default();
        config.latency_budget_ms = 1;

        let result = engine
            .evaluate("hello", &SessionContext::new("s"), snapshot(config))
            .await
            .unwrap();
        assert_eq!(result.recommended_action, InterventionAction::Approve);
    }
}

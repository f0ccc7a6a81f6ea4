//! Aggregator - folds the four detection results into one risk level and a
//! recommended action.
//!
//! Pure function of the detections and the intervention thresholds; it never
//! looks at which concrete detector produced a result.

use crate::config::InterventionThresholds;
use crate::domain::{Criterion, DetectionSet, InterventionAction, RiskLevel};

/// Unsafe-reasoning confidence above which the reply is blocked outright.
pub const UNSAFE_OVERRIDE_CONFIDENCE: f64 = 0.8;

/// Aggregated view of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    /// Weighted mean confidence of the detectors that fired.
    pub risk_score: f64,
    pub overall_risk: RiskLevel,
    pub recommended_action: InterventionAction,
    /// Highest confidence among the detectors that fired.
    pub confidence: f64,
}

/// Weighted mean confidence over fired detectors; 0 when none fired.
pub fn risk_score(detections: &DetectionSet) -> f64 {
    let (weighted, weights) = detections
        .iter()
        .filter(|(_, result)| result.detected)
        .fold((0.0, 0.0), |(sum, total), (criterion, result)| {
            (
                sum + result.confidence * criterion.weight(),
                total + criterion.weight(),
            )
        });

    if weights > 0.0 {
        weighted / weights
    } else {
        0.0
    }
}

/// Highest confidence over fired detectors; 0 when none fired.
pub fn max_confidence(detections: &DetectionSet) -> f64 {
    detections
        .iter()
        .filter(|(_, result)| result.detected)
        .map(|(_, result)| result.confidence)
        .fold(0.0, f64::max)
}

/// Choose the action for an evaluation.
///
/// Order matters: the unsafe-reasoning override ignores thresholds, then the
/// highest crossed threshold wins. A warn-level crossing maps to `Modify`.
pub fn decide_action(
    detections: &DetectionSet,
    thresholds: &InterventionThresholds,
) -> InterventionAction {
    let unsafe_reasoning = detections.get(Criterion::UnsafeReasoning);
    if unsafe_reasoning.detected && unsafe_reasoning.confidence > UNSAFE_OVERRIDE_CONFIDENCE {
        return InterventionAction::Block;
    }

    let max = max_confidence(detections);
    if max > thresholds.block {
        InterventionAction::Block
    } else if max > thresholds.modify || max > thresholds.warn {
        InterventionAction::Modify
    } else {
        InterventionAction::Approve
    }
}

/// Aggregate detections under the given thresholds.
pub fn assess(detections: &DetectionSet, thresholds: &InterventionThresholds) -> Assessment {
    let risk_score = risk_score(detections);
    Assessment {
        risk_score,
        overall_risk: RiskLevel::from_score(risk_score),
        recommended_action: decide_action(detections, thresholds),
        confidence: max_confidence(detections),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DetectionResult;
    use std::collections::BTreeMap;

    fn fired(confidence: f64) -> DetectionResult {
        DetectionResult::scored(confidence, 0.0, vec!["x".to_string()], BTreeMap::new())
    }

    fn below_threshold(confidence: f64) -> DetectionResult {
        DetectionResult::scored(confidence, 1.0, Vec::new(), BTreeMap::new())
    }

    #[test]
    fn test_nothing_fired() {
        let detections = DetectionSet::default();
        let assessment = assess(&detections, &InterventionThresholds::default());
        assert_eq!(assessment.risk_score, 0.0);
        assert_eq!(assessment.overall_risk, RiskLevel::None);
        assert_eq!(assessment.recommended_action, InterventionAction::Approve);
        assert_eq!(assessment.confidence, 0.0);
    }

    #[test]
    fn test_undetected_results_do_not_count() {
        let mut detections = DetectionSet::default();
        detections.set(Criterion::Hallucination, below_threshold(0.95));
        let assessment = assess(&detections, &InterventionThresholds::default());
        assert_eq!(assessment.overall_risk, RiskLevel::None);
        assert_eq!(assessment.recommended_action, InterventionAction::Approve);
        assert_eq!(assessment.confidence, 0.0);
    }

    #[test]
    fn test_weighted_risk_score() {
        let mut detections = DetectionSet::default();
        detections.set(Criterion::ToneDrift, fired(0.6));
        detections.set(Criterion::Hallucination, fired(0.3));
        // (0.6 * 1.0 + 0.3 * 2.0) / 3.0
        assert!((risk_score(&detections) - 0.4).abs() < 1e-9);
        assert_eq!(max_confidence(&detections), 0.6);
        assert_eq!(
            assess(&detections, &InterventionThresholds::default()).overall_risk,
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_threshold_ladder() {
        let thresholds = InterventionThresholds::default();
        let action_for = |confidence: f64| {
            let mut detections = DetectionSet::default();
            detections.set(Criterion::ToneDrift, fired(confidence));
            decide_action(&detections, &thresholds)
        };

        assert_eq!(action_for(0.9), InterventionAction::Block);
        assert_eq!(action_for(0.8), InterventionAction::Modify);
        assert_eq!(action_for(0.6), InterventionAction::Modify);
        // warn crossing maps to modify
        assert_eq!(action_for(0.4), InterventionAction::Modify);
        assert_eq!(action_for(0.3), InterventionAction::Approve);
    }

    #[test]
    fn test_unsafe_override_ignores_thresholds() {
        let lenient = InterventionThresholds {
            block: 1.0,
            modify: 1.0,
            warn: 1.0,
        };
        let mut detections = DetectionSet::default();
        detections.set(Criterion::UnsafeReasoning, fired(0.85));
        detections.set(Criterion::ToneDrift, fired(0.1));
        assert_eq!(
            decide_action(&detections, &lenient),
            InterventionAction::Block
        );

        detections.set(Criterion::UnsafeReasoning, fired(0.8));
        assert_eq!(
            decide_action(&detections, &lenient),
            InterventionAction::Approve
        );
    }

    #[test]
    fn test_override_requires_detection() {
        let lenient = InterventionThresholds {
            block: 1.0,
            modify: 1.0,
            warn: 1.0,
        };
        let mut detections = DetectionSet::default();
        detections.set(Criterion::UnsafeReasoning, below_threshold(0.9));
        assert_eq!(
            decide_action(&detections, &lenient),
            InterventionAction::Approve
        );
    }
}

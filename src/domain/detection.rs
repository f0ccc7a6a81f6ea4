//! Detection domain types.
//!
//! Every detector produces the same [`DetectionResult`] shape, which is what
//! lets the aggregator stay detector-agnostic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The four governance criteria, in a fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Drift away from the session's behavioral baseline.
    ToneDrift,
    /// Unsupported or fabricated factual claims.
    Hallucination,
    /// Contradictions with earlier turns or within the reply.
    Inconsistency,
    /// Reasoning that encourages harm.
    UnsafeReasoning,
}

impl Criterion {
    /// All criteria in declaration order.
    pub const ALL: [Criterion; 4] = [
        Criterion::ToneDrift,
        Criterion::Hallucination,
        Criterion::Inconsistency,
        Criterion::UnsafeReasoning,
    ];

    /// Fixed aggregation weight for this criterion.
    pub fn weight(self) -> f64 {
        match self {
            Criterion::UnsafeReasoning => 3.0,
            Criterion::Hallucination => 2.0,
            Criterion::Inconsistency => 1.5,
            Criterion::ToneDrift => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::ToneDrift => "tone_drift",
            Criterion::Hallucination => "hallucination",
            Criterion::Inconsistency => "inconsistency",
            Criterion::UnsafeReasoning => "unsafe_reasoning",
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tone_drift" => Ok(Criterion::ToneDrift),
            "hallucination" => Ok(Criterion::Hallucination),
            "inconsistency" => Ok(Criterion::Inconsistency),
            "unsafe_reasoning" => Ok(Criterion::UnsafeReasoning),
            _ => Err(format!("Unknown criterion: {}", s)),
        }
    }
}

/// Clamp a score into [0, 1]. NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Uniform output of a risk detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Whether the detector fired (`confidence >= threshold`).
    pub detected: bool,

    /// Confidence in [0, 1].
    pub confidence: f64,

    /// Human-readable labels of the patterns that matched.
    pub patterns: Vec<String>,

    /// Detector-specific details.
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl DetectionResult {
    /// Build a result from a raw confidence, clamping it and gating
    /// `detected` on the criterion threshold.
    pub fn scored(
        raw_confidence: f64,
        threshold: f64,
        patterns: Vec<String>,
        details: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let confidence = clamp_unit(raw_confidence);
        Self {
            detected: confidence >= clamp_unit(threshold),
            confidence,
            patterns,
            details,
        }
    }

    /// A non-firing result, used for disabled criteria and passthrough.
    pub fn inactive() -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            patterns: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    /// A non-firing result annotated with the failure that produced it.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        let mut result = Self::inactive();
        result
            .details
            .insert("error".to_string(), serde_json::Value::String(error.to_string()));
        result
    }

    /// The failure annotation, if this result stands in for a failed detector.
    pub fn error(&self) -> Option<&str> {
        self.details.get("error").and_then(|v| v.as_str())
    }
}

impl Default for DetectionResult {
    fn default() -> Self {
        Self::inactive()
    }
}

/// The four detection results of one evaluation, keyed by criterion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSet {
    pub tone_drift: DetectionResult,
    pub hallucination: DetectionResult,
    pub inconsistency: DetectionResult,
    pub unsafe_reasoning: DetectionResult,
}

impl DetectionSet {
    pub fn get(&self, criterion: Criterion) -> &DetectionResult {
        match criterion {
            Criterion::ToneDrift => &self.tone_drift,
            Criterion::Hallucination => &self.hallucination,
            Criterion::Inconsistency => &self.inconsistency,
            Criterion::UnsafeReasoning => &self.unsafe_reasoning,
        }
    }

    pub fn set(&mut self, criterion: Criterion, result: DetectionResult) {
        match criterion {
            Criterion::ToneDrift => self.tone_drift = result,
            Criterion::Hallucination => self.hallucination = result,
            Criterion::Inconsistency => self.inconsistency = result,
            Criterion::UnsafeReasoning => self.unsafe_reasoning = result,
        }
    }

    /// Iterate results in criterion declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Criterion, &DetectionResult)> {
        Criterion::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Criteria whose detector fired.
    pub fn fired(&self) -> Vec<Criterion> {
        self.iter()
            .filter(|(_, r)| r.detected)
            .map(|(c, _)| c)
            .collect()
    }
}

//! Tone profile and drift types.

use serde::{Deserialize, Serialize};

use super::detection::clamp_unit;

/// One axis of a [`ToneProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneDimension {
    Formality,
    Emotionality,
    Directiveness,
    Certainty,
    Supportiveness,
    Urgency,
}

impl ToneDimension {
    /// Declaration order. Tie-breaks between dimensions follow this order.
    pub const ALL: [ToneDimension; 6] = [
        ToneDimension::Formality,
        ToneDimension::Emotionality,
        ToneDimension::Directiveness,
        ToneDimension::Certainty,
        ToneDimension::Supportiveness,
        ToneDimension::Urgency,
    ];

    /// Weight of this dimension in the drift score.
    pub fn drift_weight(self) -> f64 {
        match self {
            ToneDimension::Formality => 0.10,
            ToneDimension::Emotionality => 0.25,
            ToneDimension::Directiveness => 0.20,
            ToneDimension::Certainty => 0.15,
            ToneDimension::Supportiveness => 0.15,
            ToneDimension::Urgency => 0.15,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToneDimension::Formality => "formality",
            ToneDimension::Emotionality => "emotionality",
            ToneDimension::Directiveness => "directiveness",
            ToneDimension::Certainty => "certainty",
            ToneDimension::Supportiveness => "supportiveness",
            ToneDimension::Urgency => "urgency",
        }
    }
}

impl std::fmt::Display for ToneDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Six-dimensional behavioral summary of a text. Every value is in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneProfile {
    pub formality: f64,
    pub emotionality: f64,
    pub directiveness: f64,
    pub certainty: f64,
    pub supportiveness: f64,
    pub urgency: f64,
}

impl ToneProfile {
    /// Baseline used when a session has no assistant turns yet.
    pub const NEUTRAL: ToneProfile = ToneProfile {
        formality: 0.5,
        emotionality: 0.3,
        directiveness: 0.4,
        certainty: 0.5,
        supportiveness: 0.5,
        urgency: 0.2,
    };

    /// Build a profile, clamping every value into [0, 1].
    pub fn new(
        formality: f64,
        emotionality: f64,
        directiveness: f64,
        certainty: f64,
        supportiveness: f64,
        urgency: f64,
    ) -> Self {
        Self {
            formality: clamp_unit(formality),
            emotionality: clamp_unit(emotionality),
            directiveness: clamp_unit(directiveness),
            certainty: clamp_unit(certainty),
            supportiveness: clamp_unit(supportiveness),
            urgency: clamp_unit(urgency),
        }
    }

    pub fn get(&self, dimension: ToneDimension) -> f64 {
        match dimension {
            ToneDimension::Formality => self.formality,
            ToneDimension::Emotionality => self.emotionality,
            ToneDimension::Directiveness => self.directiveness,
            ToneDimension::Certainty => self.certainty,
            ToneDimension::Supportiveness => self.supportiveness,
            ToneDimension::Urgency => self.urgency,
        }
    }

    /// Elementwise mean. Returns `None` for an empty slice.
    pub fn mean(profiles: &[ToneProfile]) -> Option<ToneProfile> {
        if profiles.is_empty() {
            return None;
        }
        let n = profiles.len() as f64;
        let avg = |dim: ToneDimension| profiles.iter().map(|p| p.get(dim)).sum::<f64>() / n;
        Some(ToneProfile::new(
            avg(ToneDimension::Formality),
            avg(ToneDimension::Emotionality),
            avg(ToneDimension::Directiveness),
            avg(ToneDimension::Certainty),
            avg(ToneDimension::Supportiveness),
            avg(ToneDimension::Urgency),
        ))
    }

    /// Values in dimension declaration order.
    pub fn values(&self) -> [(ToneDimension, f64); 6] {
        ToneDimension::ALL.map(|d| (d, self.get(d)))
    }
}

/// Comparison of a reply's tone against the session baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAnalysis {
    pub baseline_tone: ToneProfile,
    pub current_tone: ToneProfile,
    /// Weighted sum of per-dimension absolute differences.
    pub drift_score: f64,
    pub drift_direction: String,
    /// Dimensions whose individual drift exceeded the flag limit.
    pub problematic_patterns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps() {
        let p = ToneProfile::new(1.4, -0.1, 0.5, 0.5, 2.0, f64::NAN);
        assert_eq!(p.formality, 1.0);
        assert_eq!(p.emotionality, 0.0);
        assert_eq!(p.supportiveness, 1.0);
        assert_eq!(p.urgency, 0.0);
    }

    #[test]
    fn test_mean() {
        let a = ToneProfile::new(0.2, 0.2, 0.2, 0.2, 0.2, 0.2);
        let b = ToneProfile::new(0.4, 0.4, 0.4, 0.4, 0.4, 0.4);
        let m = ToneProfile::mean(&[a, b]).unwrap();
        assert!((m.certainty - 0.3).abs() < 1e-12);
        assert!(ToneProfile::mean(&[]).is_none());
    }

    #[test]
    fn test_drift_weights_sum_to_one() {
        let total: f64 = ToneDimension::ALL.iter().map(|d| d.drift_weight()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }
}

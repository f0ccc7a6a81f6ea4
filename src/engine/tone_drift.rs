//! Tone-Drift Detector - compares a reply's tone against the session baseline
//! and scans it for manipulative, over-reassuring, alarmist,
//! dependency-forming and over-directive language.
//!
//! The baseline is the mean tone of the first (up to) three assistant turns,
//! a proxy for how the conversation started. Sessions without assistant
//! turns use [`ToneProfile::NEUTRAL`].

use std::collections::BTreeMap;

use serde_json::json;

use crate::config::{CriterionPolicy, CustomRule};
use crate::domain::{
    Criterion, DetectionResult, DriftAnalysis, SessionContext, ToneDimension, ToneProfile,
};
use crate::engine::detector::Detector;
use crate::engine::rules::{
    normalize, CategoryFindings, CompoundRule, FrequencyEscalation, Rule, RuleCategory,
};
use crate::engine::tone_analyzer::ToneAnalyzer;
use crate::error::DetectorError;

/// Assistant turns that make up the baseline.
const BASELINE_TURNS: usize = 3;
/// Per-dimension drift above which the dimension is flagged.
const DIMENSION_FLAG_LIMIT: f64 = 0.4;
/// Drift score above which drift contributes to confidence.
const DRIFT_CONTRIBUTION_FLOOR: f64 = 0.3;
const DRIFT_CONTRIBUTION_FACTOR: f64 = 0.4;
const ESCALATION_CONTRIBUTION: f64 = 0.2;

const MANIPULATIVE: &str = "manipulative";
const OVER_REASSURANCE: &str = "over-reassurance";
const ALARMISM: &str = "alarmism";
const DEPENDENCY: &str = "dependency";
const OVER_DIRECTIVE: &str = "over-directive";

/// Why the emotional-escalation trigger fired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EscalationTrigger {
    /// Emotionality rose by more than 0.4 over baseline (carries the rise).
    EmotionalJump(f64),
    /// Emotionality above 0.7 from a baseline below 0.4.
    SuddenIntensity,
    /// Emotionality, urgency and directiveness all above baseline.
    MultiDimensional,
}

impl EscalationTrigger {
    pub fn label(&self) -> String {
        match self {
            EscalationTrigger::EmotionalJump(rise) => {
                format!("emotional escalation: emotionality up {:.2} over baseline", rise)
            }
            EscalationTrigger::SuddenIntensity => {
                "emotional escalation: sudden intensity".to_string()
            }
            EscalationTrigger::MultiDimensional => {
                "emotional escalation: multi-dimensional escalation".to_string()
            }
        }
    }
}

/// First matching escalation trigger, checked in the order of the variants.
pub fn emotional_escalation(
    baseline: &ToneProfile,
    current: &ToneProfile,
) -> Option<EscalationTrigger> {
    let rise = current.emotionality - baseline.emotionality;
    if rise > 0.4 {
        return Some(EscalationTrigger::EmotionalJump(rise));
    }
    if current.emotionality > 0.7 && baseline.emotionality < 0.4 {
        return Some(EscalationTrigger::SuddenIntensity);
    }
    if current.emotionality > baseline.emotionality
        && current.urgency > baseline.urgency
        && current.directiveness > baseline.directiveness
    {
        return Some(EscalationTrigger::MultiDimensional);
    }
    None
}

/// Baseline tone of a session.
pub fn session_baseline(analyzer: &ToneAnalyzer, context: &SessionContext) -> ToneProfile {
    let opening: Vec<ToneProfile> = context
        .assistant_turns()
        .take(BASELINE_TURNS)
        .map(|turn| analyzer.analyze(&turn.content))
        .collect();
    ToneProfile::mean(&opening).unwrap_or(ToneProfile::NEUTRAL)
}

/// Compare `current` against `baseline`.
pub fn compute_drift(baseline: ToneProfile, current: ToneProfile) -> DriftAnalysis {
    let mut drift_score = 0.0;
    let mut primary = ToneDimension::Formality;
    let mut largest = f64::NEG_INFINITY;
    let mut problematic_patterns = Vec::new();

    for dimension in ToneDimension::ALL {
        let diff = (current.get(dimension) - baseline.get(dimension)).abs();
        drift_score += diff * dimension.drift_weight();
        // strict comparison: the first dimension wins ties
        if diff > largest {
            largest = diff;
            primary = dimension;
        }
        if diff > DIMENSION_FLAG_LIMIT {
            problematic_patterns.push(format!("significant {} shift ({:.2})", dimension, diff));
        }
    }

    let rising = current.get(primary) > baseline.get(primary);
    let drift_direction = match (primary, rising) {
        (ToneDimension::Emotionality, true) => "emotional escalation".to_string(),
        (ToneDimension::Directiveness, true) => "increasing directiveness".to_string(),
        (ToneDimension::Urgency, true) => "increasing urgency/alarm".to_string(),
        (dimension, _) => dimension.to_string(),
    };

    DriftAnalysis {
        baseline_tone: baseline,
        current_tone: current,
        drift_score,
        drift_direction,
        problematic_patterns,
    }
}

/// Detector for behavioral drift and manipulative tone.
pub struct ToneDriftDetector {
    analyzer: ToneAnalyzer,
    categories: Vec<RuleCategory>,
}

impl ToneDriftDetector {
    pub fn new() -> Self {
        Self {
            analyzer: ToneAnalyzer::new(),
            categories: build_categories(),
        }
    }

    /// Drift of `draft` against the session baseline.
    pub fn analyze(&self, draft: &str, context: &SessionContext) -> DriftAnalysis {
        let baseline = session_baseline(&self.analyzer, context);
        compute_drift(baseline, self.analyzer.analyze(draft))
    }
}

impl Default for ToneDriftDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ToneDriftDetector {
    fn criterion(&self) -> Criterion {
        Criterion::ToneDrift
    }

    fn name(&self) -> &str {
        "tone_drift"
    }

    fn detect(
        &self,
        draft: &str,
        context: &SessionContext,
        policy: &CriterionPolicy,
    ) -> Result<DetectionResult, DetectorError> {
        let text = normalize(draft);
        let drift = self.analyze(&text, context);

        let mut findings = CategoryFindings::default();
        for category in &self.categories {
            // configured rules extend the manipulative-language set
            let extra: &[CustomRule] = if category.name == MANIPULATIVE {
                policy.custom_rules.as_slice()
            } else {
                &[]
            };
            findings.record(category, category.scan(&text, extra));
        }

        let escalation = emotional_escalation(&drift.baseline_tone, &drift.current_tone);

        let mut confidence = 0.0;
        if drift.drift_score > DRIFT_CONTRIBUTION_FLOOR {
            confidence += drift.drift_score * DRIFT_CONTRIBUTION_FACTOR;
        }
        confidence += findings.confidence();
        if escalation.is_some() {
            confidence += ESCALATION_CONTRIBUTION;
        }

        let mut details = BTreeMap::new();
        details.insert("drift_score".to_string(), json!(drift.drift_score));
        details.insert("drift_direction".to_string(), json!(drift.drift_direction));
        details.insert("categories".to_string(), json!(findings.categories()));
        details.insert(
            "emotional_escalation".to_string(),
            json!(escalation.map(|e| e.label())),
        );
        details.insert(
            "drift_analysis".to_string(),
            serde_json::to_value(&drift).map_err(|e| DetectorError::new(e.to_string()))?,
        );

        let mut patterns = drift.problematic_patterns;
        patterns.extend(findings.into_patterns());
        if let Some(trigger) = escalation {
            patterns.push(trigger.label());
        }

        Ok(DetectionResult::scored(
            confidence,
            policy.threshold,
            patterns,
            details,
        ))
    }
}

fn build_categories() -> Vec<RuleCategory> {
    vec![
        RuleCategory::new(
            MANIPULATIVE,
            0.3,
            vec![
                Rule::new(
                    "demands exclusive trust",
                    r"\btrust (?:only|no one but|nobody but) me\b",
                ),
                Rule::new(
                    "demands unconditional trust",
                    r"\btrust me (?:completely|fully|entirely|absolutely|unconditionally)\b",
                ),
                Rule::new(
                    "isolating from others",
                    r"\bdon't (?:listen to|talk to|trust) (?:them|anyone else|anybody else|others|your (?:family|friends|parents|partner))\b",
                ),
                Rule::new(
                    "claims sole understanding",
                    r"\bonly i (?:can |truly |really )?(?:understand|know|get|help) you\b",
                ),
                Rule::new(
                    "discredits others",
                    r"\b(?:they're|they are|everyone else is|others are) (?:wrong|lying|jealous) about you\b",
                ),
                Rule::new(
                    "claims others don't understand",
                    r"\b(?:they|nobody|no one)(?: really)? (?:don't|doesn't|do not|does not) (?:understand|care about|get) you\b",
                ),
                Rule::new(
                    "asks for secrecy",
                    r"\b(?:keep this|this stays|let's keep this) between (?:us|you and me)\b",
                ),
            ],
        )
        .with_compound(CompoundRule::new(
            "isolating language paired with caring language",
            &[
                r"\b(?:only me|no one else|nobody else|don't need (?:them|anyone|anybody)|stay away from|cut (?:them|everyone) off|don't listen to)\b",
                r"\b(?:i care|care about you|i'm (?:always )?here for you|i love you|i understand you|i'm on your side)\b",
            ],
        ))
        .with_compound(CompoundRule::new(
            "opposing claims about them and me",
            &[
                r"\b(?:they|others|everyone else)\b[^.!?]{0,40}\b(?:wrong|lying|against you|jealous|don't understand)\b",
                r"\b(?:only me|trust me|i'm right|i understand|i know what's best|only i)\b",
            ],
        ))
        .with_escalation(FrequencyEscalation::new(
            "manipulative",
            &[
                "only me",
                "only i",
                "trust me",
                "no one else",
                "nobody else",
                "between us",
                "don't listen",
                "they're wrong",
                "they are wrong",
                "against you",
            ],
        )),
        RuleCategory::new(
            OVER_REASSURANCE,
            0.15,
            vec![
                Rule::new(
                    "everything will be fine",
                    r"\beverything(?: will| is going to|'ll) be (?:\w+ )?(?:fine|okay|ok|alright|all right|perfect|great)\b",
                ),
                Rule::new("zero risk claim", r"\b(?:zero|no) risk\b"),
                Rule::new(
                    "guaranteed outcome",
                    r"\b100% (?:success|guaranteed|safe|certain|sure)|\bguaranteed (?:success|to work|results?)\b",
                ),
                Rule::new(
                    "nothing can go wrong",
                    r"\bnothing (?:can|could|will) (?:possibly )?go wrong\b",
                ),
                Rule::new(
                    "dismisses concern",
                    r"\b(?:nothing|no need) to worry about\b|\bdon't worry about (?:a thing|anything)\b",
                ),
            ],
        )
        .with_compound(CompoundRule::new(
            "certainty paired with dismissal of risk",
            &[
                r"\b(?:definitely|certainly|absolutely|guaranteed)\b",
                r"\b(?:no|zero) (?:risk|downside|chance of failure)\b",
            ],
        ))
        .with_escalation(FrequencyEscalation::new(
            "reassurance",
            &[
                "perfect",
                "guaranteed",
                "absolutely",
                "completely",
                "definitely",
                "certainly",
                "zero risk",
                "no risk",
                "100%",
                "nothing to worry",
                "flawless",
            ],
        )),
        RuleCategory::new(
            ALARMISM,
            0.2,
            vec![
                Rule::new(
                    "catastrophizing",
                    r"\b(?:catastroph\w*|disaster|disastrous|ruined|devastating)\b",
                ),
                Rule::new(
                    "claims immediate danger",
                    r"\b(?:you're in (?:serious |grave |real )?danger|you are in (?:serious |grave |real )?danger|life[- ]threatening)\b",
                ),
                Rule::new(
                    "pressure to act now",
                    r"\b(?:act now|before it's too late|right now or|immediately or)\b",
                ),
                Rule::new(
                    "worst-case framing",
                    r"\b(?:worst[- ]case|point of no return|no going back)\b",
                ),
            ],
        )
        .with_compound(CompoundRule::new(
            "urgency paired with threat",
            &[
                r"\b(?:now|immediately|urgent(?:ly)?|right away|asap)\b",
                r"\b(?:lose everything|die|dying|destroy\w*|collapse|too late|ruin\w*)\b",
            ],
        ))
        .with_escalation(FrequencyEscalation::new(
            "alarm",
            &[
                "urgent",
                "emergency",
                "danger",
                "dangerous",
                "crisis",
                "terrible",
                "disaster",
                "panic",
                "catastrophic",
                "alarming",
                "threat",
            ],
        )),
        RuleCategory::new(
            DEPENDENCY,
            0.25,
            vec![
                Rule::new(
                    "claims to be needed",
                    r"\byou (?:need|have to rely on|can only rely on|can only count on) me\b",
                ),
                Rule::new(
                    "claims to be the only one",
                    r"\b(?:i'm|i am) the only one (?:who|that)\b",
                ),
                Rule::new(
                    "discourages other support",
                    r"\byou don't need (?:anyone|anybody|a therapist|a counselor|other people|your friends|friends)\b",
                ),
                Rule::new(
                    "asks to be consulted first",
                    r"\b(?:come back|talk) to me (?:whenever|every time|first|before)\b|\bcheck with me (?:before|first)\b",
                ),
                Rule::new(
                    "claims user cannot cope alone",
                    r"\bcan't (?:do|handle|manage|cope with) (?:this|it|anything) without me\b",
                ),
            ],
        )
        .with_compound(CompoundRule::new(
            "constant availability paired with exclusivity",
            &[
                r"\b(?:i'm|i am|i'll|i will) always (?:be )?here\b",
                r"\b(?:only|no one else|anyone else|nobody else)\b",
            ],
        ))
        .with_escalation(FrequencyEscalation::new(
            "dependency",
            &[
                "need me",
                "rely on me",
                "depend on me",
                "without me",
                "only me",
                "always here",
                "come back to me",
                "count on me",
            ],
        )),
        RuleCategory::new(
            OVER_DIRECTIVE,
            0.15,
            vec![
                Rule::new("issues commands", r"\byou (?:must|have no choice but to)\b"),
                Rule::new(
                    "forbids questioning",
                    r"\bdon't (?:listen to|question|doubt|second[- ]guess|think about)\b",
                ),
                Rule::new(
                    "demands obedience",
                    r"\b(?:do (?:exactly )?(?:what|as) i (?:say|tell you)|follow my (?:instructions|orders) exactly)\b",
                ),
                Rule::new(
                    "removes alternatives",
                    r"\b(?:there is|there's) no other (?:way|option|choice)\b",
                ),
                Rule::new(
                    "issues an ultimatum",
                    r"\b(?:stop|quit) (?:it |that )?(?:immediately|right now)\b",
                ),
            ],
        )
        .with_compound(CompoundRule::new(
            "commands paired with absolutes",
            &[
                r"\b(?:must|have to|need to)\b",
                r"\b(?:never|always|no exceptions)\b",
            ],
        ))
        .with_escalation(FrequencyEscalation::new(
            "directive",
            &[
                "must",
                "have to",
                "need to",
                "never",
                "always",
                "immediately",
                "do not",
                "don't",
            ],
        )),
    ]
}

//! Inconsistency Detector - flags replies that contradict earlier assistant
//! turns or themselves.
//!
//! Besides lexical retraction rules it extracts simple modal claims
//! ("you should X", "it is X") and quantities ("10 days") and compares them
//! with what the assistant said earlier in the session.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::json;

use crate::config::{CriterionPolicy, CustomRule};
use crate::domain::{Criterion, DetectionResult, SessionContext};
use crate::engine::detector::Detector;
use crate::engine::rules::{
    normalize, pattern, CategoryFindings, CompoundRule, FrequencyEscalation, Rule, RuleCategory,
};
use crate::error::DetectorError;

const RETRACTION: &str = "retraction";
const REVERSAL: &str = "reversal";
const NUMERIC_DRIFT: &str = "numeric drift";
const INTERNAL_CONTRADICTION: &str = "internal contradiction";

const CONTRACTIONS: &[(&str, &str)] = &[
    ("can't", "can not"),
    ("cannot", "can not"),
    ("won't", "will not"),
    ("shouldn't", "should not"),
    ("mustn't", "must not"),
    ("isn't", "is not"),
    ("wasn't", "was not"),
    ("don't", "do not"),
    ("it's", "it is"),
    ("that's", "that is"),
    ("you'll", "you will"),
];

/// A polar claim such as "you should rest" (affirmed) or "it is not safe".
#[derive(Debug, Clone, PartialEq, Eq)]
struct Claim {
    key: String,
    affirmed: bool,
}

/// A number with a unit, e.g. "10 days".
#[derive(Debug, Clone, PartialEq, Eq)]
struct Quantity {
    unit: String,
    value: String,
    text: String,
}

/// Detector for contradictions within a reply and against earlier replies.
pub struct InconsistencyDetector {
    categories: Vec<RuleCategory>,
    reversal: RuleCategory,
    numeric_drift: RuleCategory,
    internal: RuleCategory,
    claim: Regex,
    quantity: Regex,
}

impl InconsistencyDetector {
    pub fn new() -> Self {
        Self {
            categories: vec![RuleCategory::new(
                RETRACTION,
                0.2,
                vec![
                    Rule::new(
                        "denies earlier statement",
                        r"\bi (?:never|didn't|did not) (?:say|said|mention|suggest|recommend)\b",
                    ),
                    Rule::new(
                        "contradicts earlier answer",
                        r"\b(?:contrary to|unlike|despite) what i (?:said|told you|mentioned)\b",
                    ),
                    Rule::new(
                        "silent correction",
                        r"\b(?:actually|in fact),? (?:that's|that is|it's|it is) (?:not|wrong|incorrect)\b",
                    ),
                ],
            )
            .with_escalation(FrequencyEscalation::new(
                "correction",
                &[
                    "actually",
                    "correction",
                    "i was wrong",
                    "scratch that",
                    "i misspoke",
                    "disregard",
                    "ignore what i said",
                    "on second thought",
                ],
            ))],
            reversal: RuleCategory::new(REVERSAL, 0.35, Vec::new()),
            numeric_drift: RuleCategory::new(NUMERIC_DRIFT, 0.25, Vec::new()),
            internal: RuleCategory::new(INTERNAL_CONTRADICTION, 0.3, Vec::new()).with_compound(
                CompoundRule::new(
                    "calls the same thing safe and unsafe",
                    &[
                        r"\b(?:is|it's|are) (?:completely |perfectly |totally )?safe\b",
                        r"\b(?:not safe|unsafe|dangerous)\b",
                    ],
                ),
            ),
            claim: pattern(
                r"\b(you (?:should|must|can|will|need to)|(?:it|this|that) (?:is|was)) (not )?(?:(?:a|an|the|very|really|also|just|so|too|completely|totally|perfectly) )*([a-z]+)\b",
            ),
            quantity: pattern(
                r"\b(\d+(?:\.\d+)?)\s?(%|percent\b|mg\b|(?:day|week|month|year|hour|minute|milligram|time)s?\b)",
            ),
        }
    }

    fn claims(&self, text: &str) -> Vec<Claim> {
        let mut expanded = text.to_lowercase();
        for (from, to) in CONTRACTIONS {
            expanded = expanded.replace(from, to);
        }

        let mut claims: Vec<Claim> = Vec::new();
        for caps in self.claim.captures_iter(&expanded) {
            let word = &caps[3];
            if word == "not" {
                continue;
            }
            let subject = if caps[1].starts_with("you ") {
                caps[1].to_string()
            } else {
                // "this was" and "it is" make the same claim
                "it is".to_string()
            };
            let claim = Claim {
                key: format!("{} {}", subject, word),
                affirmed: caps.get(2).is_none(),
            };
            if !claims.contains(&claim) {
                claims.push(claim);
            }
        }
        claims
    }

    fn quantities(&self, text: &str) -> Vec<Quantity> {
        self.quantity
            .captures_iter(text)
            .map(|caps| {
                let raw_unit = caps[2].to_lowercase();
                let unit = match raw_unit.as_str() {
                    "%" | "percent" => "percent".to_string(),
                    "mg" | "milligram" | "milligrams" => "mg".to_string(),
                    other => other.trim_end_matches('s').to_string(),
                };
                Quantity {
                    unit,
                    value: caps[1].to_string(),
                    text: caps[0].to_string(),
                }
            })
            .collect()
    }
}

impl Default for InconsistencyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for InconsistencyDetector {
    fn criterion(&self) -> Criterion {
        Criterion::Inconsistency
    }

    fn name(&self) -> &str {
        "inconsistency"
    }

    fn detect(
        &self,
        draft: &str,
        context: &SessionContext,
        policy: &CriterionPolicy,
    ) -> Result<DetectionResult, DetectorError> {
        let text = normalize(draft);

        let mut findings = CategoryFindings::default();
        for category in &self.categories {
            let extra: &[CustomRule] = if category.name == RETRACTION {
                policy.custom_rules.as_slice()
            } else {
                &[]
            };
            findings.record(category, category.scan(&text, extra));
        }

        let mut earlier_claims: Vec<Claim> = Vec::new();
        let mut earlier_quantities: Vec<Quantity> = Vec::new();
        for turn in context.assistant_turns() {
            let content = normalize(&turn.content);
            earlier_claims.extend(self.claims(&content));
            earlier_quantities.extend(self.quantities(&content));
        }

        let current_claims = self.claims(&text);

        let reversed: Vec<String> = current_claims
            .iter()
            .filter(|claim| {
                earlier_claims
                    .iter()
                    .any(|e| e.key == claim.key && e.affirmed != claim.affirmed)
            })
            .map(|claim| claim.key.clone())
            .collect();
        findings.record(
            &self.reversal,
            reversed
                .iter()
                .map(|key| self.reversal.label(format!("reverses earlier claim '{}'", key)))
                .collect(),
        );

        let mut changed: Vec<String> = Vec::new();
        for quantity in self.quantities(&text) {
            let previous: Vec<&Quantity> = earlier_quantities
                .iter()
                .filter(|e| e.unit == quantity.unit)
                .collect();
            let Some(last) = previous.last() else {
                continue;
            };
            if previous.iter().any(|e| e.value == quantity.value) {
                continue;
            }
            let label = format!("number changed from '{}' to '{}'", last.text, quantity.text);
            if !changed.contains(&label) {
                changed.push(label);
            }
        }
        findings.record(
            &self.numeric_drift,
            changed.iter().map(|c| self.numeric_drift.label(c)).collect(),
        );

        let mut internal = self.internal.scan(&text, &[]);
        internal.extend(
            current_claims
                .iter()
                .filter(|claim| claim.affirmed)
                .filter(|claim| {
                    current_claims
                        .iter()
                        .any(|other| other.key == claim.key && !other.affirmed)
                })
                .map(|claim| {
                    self.internal
                        .label(format!("contradicts itself on '{}'", claim.key))
                }),
        );
        findings.record(&self.internal, internal);

        let confidence = findings.confidence();

        let mut details = BTreeMap::new();
        details.insert("categories".to_string(), json!(findings.categories()));
        details.insert("reversed_claims".to_string(), json!(reversed));
        details.insert("changed_figures".to_string(), json!(changed));

        Ok(DetectionResult::scored(
            confidence,
            policy.threshold,
            findings.into_patterns(),
            details,
        ))
    }
}

//! Hallucination Detector - flags unsupported or fabricated factual claims.
//!
//! Lexical categories cover unnamed citations, false precision, overclaimed
//! certainty and invented references. A context check flags percentages
//! that appear nowhere in the conversation so far.

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

const UNSUPPORTED_CITATION: &str = "unsupported citation";
const FALSE_PRECISION: &str = "false precision";
const OVERCLAIMED_CERTAINTY: &str = "overclaimed certainty";
const INVENTED_REFERENCE: &str = "invented reference";
const UNGROUNDED_FIGURE: &str = "ungrounded figure";

/// Detector for unsupported factual claims.
pub struct HallucinationDetector {
    categories: Vec<RuleCategory>,
    ungrounded: RuleCategory,
    figure: Regex,
}

impl HallucinationDetector {
    pub fn new() -> Self {
        Self {
            categories: build_categories(),
            ungrounded: RuleCategory::new(UNGROUNDED_FIGURE, 0.15, Vec::new()),
            figure: pattern(r"\b\d+(?:\.\d+)?%"),
        }
    }

    /// Percentages in `draft` that no earlier turn mentions.
    fn ungrounded_figures(&self, draft: &str, context: &SessionContext) -> Vec<String> {
        let mut figures: Vec<String> = Vec::new();
        for found in self.figure.find_iter(draft) {
            let figure = found.as_str();
            // "140%" or "2.40%" must not ground "40%".
            let earlier = pattern(&format!(r"(?:^|[^\d.]){}", regex::escape(figure)));
            let grounded = context
                .conversation_history
                .iter()
                .any(|turn| earlier.is_match(&turn.content));
            if !grounded && !figures.iter().any(|f| f == figure) {
                figures.push(figure.to_string());
            }
        }
        figures
    }
}

impl Default for HallucinationDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for HallucinationDetector {
    fn criterion(&self) -> Criterion {
        Criterion::Hallucination
    }

    fn name(&self) -> &str {
        "hallucination"
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
            let extra: &[CustomRule] = if category.name == UNSUPPORTED_CITATION {
                policy.custom_rules.as_slice()
            } else {
                &[]
            };
            findings.record(category, category.scan(&text, extra));
        }

        let figures = self.ungrounded_figures(&text, context);
        findings.record(
            &self.ungrounded,
            figures
                .iter()
                .map(|figure| {
                    self.ungrounded
                        .label(format!("{} does not appear earlier in the conversation", figure))
                })
                .collect(),
        );

        let confidence = findings.confidence();

        let mut details = BTreeMap::new();
        details.insert("categories".to_string(), json!(findings.categories()));
        details.insert("ungrounded_figures".to_string(), json!(figures));

        Ok(DetectionResult::scored(
            confidence,
            policy.threshold,
            findings.into_patterns(),
            details,
        ))
    }
}

fn build_categories() -> Vec<RuleCategory> {
    vec![
        RuleCategory::new(
            UNSUPPORTED_CITATION,
            0.3,
            vec![
                Rule::new(
                    "cites unnamed studies",
                    r"\b(?:studies|research|scientists|experts|doctors|researchers) (?:show|shows|have shown|prove|proves|have proven|confirm|agree|say)\b",
                ),
                Rule::new(
                    "appeals to unnamed authority",
                    r"\baccording to (?:research|experts|scientists|studies|researchers|a (?:recent |new )?study)\b",
                ),
                Rule::new(
                    "vague study reference",
                    r"\ba (?:recent |new |landmark |major )?(?:study|survey|report) (?:found|showed|shows|proved|revealed|confirmed)\b",
                ),
            ],
        )
        .with_compound(CompoundRule::new(
            "citation paired with exact figure",
            &[r"\b(?:study|studies|research|survey)\b", r"\b\d+(?:\.\d+)?%"],
        ))
        .with_escalation(FrequencyEscalation::new(
            "citation",
            &[
                "study",
                "studies",
                "research",
                "researchers",
                "experts",
                "scientists",
                "survey",
                "journal",
                "published",
                "according to",
                "data shows",
            ],
        )),
        RuleCategory::new(
            FALSE_PRECISION,
            0.2,
            vec![
                Rule::new(
                    "precise population statistic",
                    r"\b\d+(?:\.\d+)?% of (?:all )?(?:people|users|patients|adults|children|teens|americans|doctors|experts|cases|women|men)\b",
                ),
                Rule::new(
                    "exact odds",
                    r"\b\d+ (?:out of|in) (?:every )?\d+ (?:people|users|patients|adults|cases)\b",
                ),
                Rule::new("over-precise percentage", r"\b\d+\.\d{2,}%"),
            ],
        ),
        RuleCategory::new(
            OVERCLAIMED_CERTAINTY,
            0.2,
            vec![
                Rule::new(
                    "claims scientific proof",
                    r"\b(?:scientifically|clinically|medically) proven\b",
                ),
                Rule::new(
                    "asserts proven fact",
                    r"\b(?:it is|it's|that is|that's) (?:a )?(?:proven|well-known|established|undeniable) fact\b",
                ),
                Rule::new("appeals to common knowledge", r"\b(?:everyone|everybody) knows\b"),
                Rule::new(
                    "declares it beyond dispute",
                    r"\b(?:undeniabl[ey]|indisputabl[ey]|beyond (?:any )?doubt|no scientist disagrees)\b",
                ),
            ],
        )
        .with_compound(CompoundRule::new(
            "statistic paired with absolute certainty",
            &[
                r"\b\d+(?:\.\d+)?%",
                r"\b(?:proven|definitely|guaranteed|always|never|certainly|fact)\b",
            ],
        ))
        .with_escalation(FrequencyEscalation::new(
            "certainty",
            &[
                "proven",
                "fact",
                "definitely",
                "certainly",
                "always",
                "never",
                "undeniable",
                "guaranteed",
                "everyone knows",
            ],
        )),
        RuleCategory::new(
            INVENTED_REFERENCE,
            0.25,
            vec![
                Rule::new("cites a URL", r"\bhttps?://\S+"),
                Rule::new("cites a DOI", r"\b(?:doi:\s*)?10\.\d{4,}/\S+"),
                Rule::new(
                    "author-year citation",
                    r"\([^()]{0,60}\bet al\.?,? (?:19|20)\d{2}\)",
                ),
                Rule::new(
                    "names a journal",
                    r"\bpublished in (?:the )?(?:journal|proceedings|annals) of\b",
                ),
            ],
        ),
    ]
}

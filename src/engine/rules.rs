//! Lexical rule scaffolding shared by the detectors.
//!
//! A detector is a set of [`RuleCategory`] values. Each category holds
//! phrase/regex rules, compound co-occurrence rules and an optional frequency
//! escalation over a broader keyword set. A category contributes its fixed
//! confidence once, however many of its rules match.

use std::borrow::Cow;

use regex::Regex;

use crate::config::CustomRule;

/// Replace typographic apostrophes so "don’t" and "don't" match alike.
pub(crate) fn normalize(text: &str) -> Cow<'_, str> {
    if text.contains(['\u{2019}', '\u{2018}']) {
        Cow::Owned(text.replace(['\u{2019}', '\u{2018}'], "'"))
    } else {
        Cow::Borrowed(text)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Escape `term` and add word boundaries on the sides that start/end with a
/// word character (so "100%" still matches).
fn bounded(term: &str) -> String {
    let escaped = regex::escape(term);
    let head = if term.chars().next().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    let tail = if term.chars().last().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    format!("{}{}{}", head, escaped, tail)
}

/// Case-insensitive, word-bounded alternation of literal phrases.
///
/// Longer phrases are tried first so "right now" wins over "now".
pub(crate) fn phrase_regex(terms: &[&str]) -> Regex {
    let mut sorted: Vec<&str> = terms.to_vec();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let alternatives: Vec<String> = sorted.iter().map(|t| bounded(t)).collect();
    Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))
        .expect("escaped phrase list is a valid regex")
}

/// Case-insensitive regex from a built-in pattern.
pub(crate) fn pattern(source: &str) -> Regex {
    Regex::new(&format!("(?i){}", source)).expect("built-in rule is a valid regex")
}

/// Count of non-overlapping matches of `regex` in `text`.
pub(crate) fn count_matches(regex: &Regex, text: &str) -> usize {
    regex.find_iter(text).count()
}

/// One labelled rule.
pub(crate) struct Rule {
    label: &'static str,
    regex: Regex,
}

impl Rule {
    pub(crate) fn new(label: &'static str, source: &str) -> Self {
        Self {
            label,
            regex: pattern(source),
        }
    }
}

/// Emits an extra pattern when a response is dense with related keywords.
pub(crate) struct FrequencyEscalation {
    noun: &'static str,
    keywords: Regex,
    minimum: usize,
}

impl FrequencyEscalation {
    pub(crate) fn new(noun: &'static str, keywords: &[&str]) -> Self {
        Self {
            noun,
            keywords: phrase_regex(keywords),
            minimum: 3,
        }
    }
}

/// Fires when every one of its patterns matches somewhere in the text.
pub(crate) struct CompoundRule {
    label: &'static str,
    all: Vec<Regex>,
}

impl CompoundRule {
    pub(crate) fn new(label: &'static str, sources: &[&str]) -> Self {
        Self {
            label,
            all: sources.iter().map(|s| pattern(s)).collect(),
        }
    }

    fn is_match(&self, text: &str) -> bool {
        !self.all.is_empty() && self.all.iter().all(|re| re.is_match(text))
    }
}

/// A named group of rules contributing a fixed amount of confidence.
pub(crate) struct RuleCategory {
    pub(crate) name: &'static str,
    pub(crate) contribution: f64,
    rules: Vec<Rule>,
    compounds: Vec<CompoundRule>,
    escalation: Option<FrequencyEscalation>,
}

impl RuleCategory {
    pub(crate) fn new(name: &'static str, contribution: f64, rules: Vec<Rule>) -> Self {
        Self {
            name,
            contribution,
            rules,
            compounds: Vec::new(),
            escalation: None,
        }
    }

    pub(crate) fn with_compound(mut self, compound: CompoundRule) -> Self {
        self.compounds.push(compound);
        self
    }

    pub(crate) fn with_escalation(mut self, escalation: FrequencyEscalation) -> Self {
        self.escalation = Some(escalation);
        self
    }

    /// Label a finding in this category.
    pub(crate) fn label(&self, finding: impl std::fmt::Display) -> String {
        format!("{}: {}", self.name, finding)
    }

    /// Scan `text` with the built-in rules, `extra` custom rules, compound
    /// rules and the frequency escalation. Returns labelled findings in that
    /// order.
    pub(crate) fn scan(&self, text: &str, extra: &[CustomRule]) -> Vec<String> {
        let mut found: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| rule.regex.is_match(text))
            .map(|rule| self.label(rule.label))
            .collect();

        found.extend(
            extra
                .iter()
                .filter(|rule| rule.regex.is_match(text))
                .map(|rule| self.label(format!("custom rule '{}'", rule.source))),
        );

        found.extend(
            self.compounds
                .iter()
                .filter(|compound| compound.is_match(text))
                .map(|compound| self.label(compound.label)),
        );

        if let Some(escalation) = &self.escalation {
            let count = count_matches(&escalation.keywords, text);
            if count >= escalation.minimum {
                found.push(self.label(format!(
                    "{} {} phrases in one response",
                    count, escalation.noun
                )));
            }
        }

        found
    }
}

/// Findings of one detector run, grouped by category in scan order.
#[derive(Debug, Default)]
pub(crate) struct CategoryFindings {
    entries: Vec<(&'static str, f64, Vec<String>)>,
}

impl CategoryFindings {
    /// Record findings for a category; empty findings are ignored.
    pub(crate) fn record(&mut self, category: &RuleCategory, findings: Vec<String>) {
        if findings.is_empty() {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.0 == category.name) {
            entry.2.extend(findings);
        } else {
            self.entries
                .push((category.name, category.contribution, findings));
        }
    }

    /// Sum of contributions of every category with at least one finding.
    pub(crate) fn confidence(&self) -> f64 {
        self.entries.iter().map(|e| e.1).sum()
    }

    pub(crate) fn categories(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.0).collect()
    }

    pub(crate) fn into_patterns(self) -> Vec<String> {
        self.entries.into_iter().flat_map(|e| e.2).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Criterion;

    #[test]
    fn test_phrase_regex_respects_word_boundaries() {
        let re = phrase_regex(&["now", "right now"]);
        assert_eq!(count_matches(&re, "Do it right now, not snow."), 1);
        assert_eq!(count_matches(&re, "now and NOW"), 2);
    }

    #[test]
    fn test_phrase_regex_handles_symbol_edges() {
        let re = phrase_regex(&["100%"]);
        assert_eq!(count_matches(&re, "It is 100% safe"), 1);
        assert_eq!(count_matches(&re, "It is 1100% safe"), 0);
    }

    #[test]
    fn test_normalize_apostrophes() {
        assert_eq!(normalize("don\u{2019}t"), "don't");
        assert!(matches!(normalize("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_category_scan_with_escalation_and_custom_rule() {
        let category = RuleCategory::new(
            "alarmism",
            0.2,
            vec![Rule::new("act now pressure", r"\bact now\b")],
        )
        .with_escalation(FrequencyEscalation::new("alarm", &["danger", "urgent", "crisis"]));
        let custom = CustomRule::compile(Criterion::ToneDrift, "red alert").unwrap();

        let found = category.scan(
            "Act now! This is an urgent crisis and real danger. RED ALERT.",
            &[custom],
        );
        assert_eq!(
            found,
            vec![
                "alarmism: act now pressure".to_string(),
                "alarmism: custom rule 'red alert'".to_string(),
                "alarmism: 3 alarm phrases in one response".to_string(),
            ]
        );
    }

    #[test]
    fn test_compound_requires_every_part() {
        let category = RuleCategory::new("manipulative", 0.3, vec![]).with_compound(
            CompoundRule::new("isolating plus caring", &[r"\bno one else\b", r"\bi care\b"]),
        );
        assert!(category.scan("No one else gets it.", &[]).is_empty());
        assert_eq!(
            category.scan("No one else gets it, but I care.", &[]),
            vec!["manipulative: isolating plus caring".to_string()]
        );
    }

    #[test]
    fn test_findings_count_each_category_once() {
        let a = RuleCategory::new("a", 0.3, vec![]);
        let b = RuleCategory::new("b", 0.15, vec![]);
        let mut findings = CategoryFindings::default();
        findings.record(&a, vec!["a: one".into(), "a: two".into()]);
        findings.record(&a, vec!["a: three".into()]);
        findings.record(&b, vec![]);

        assert!((findings.confidence() - 0.3).abs() < 1e-12);
        assert_eq!(findings.categories(), vec!["a"]);
        assert_eq!(findings.into_patterns().len(), 3);
    }
}

//! Tone Profile Analyzer - maps text to a six-dimensional [`ToneProfile`].
//!
//! Each dimension counts two opposing closed-class marker sets
//! (case-insensitive, word-bounded) and combines them with a fixed linear
//! formula before clamping to [0, 1]. Coefficients are part of the contract:
//!
//! | dimension      | formula                                         |
//! |----------------|-------------------------------------------------|
//! | formality      | 0.5 + (formal − informal) × 0.1                 |
//! | emotionality   | emotional × 0.05 + exclamations × 0.1           |
//! | directiveness  | 0.5 + (directive − exploratory) × 0.08          |
//! | certainty      | 0.5 + (certain − uncertain) × 0.08              |
//! | supportiveness | support × 0.1                                   |
//! | urgency        | 0.3 + (urgent − calm) × 0.15                    |

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::ToneProfile;
use crate::engine::rules::{count_matches, normalize, phrase_regex};

const FORMAL_MARKERS: &[&str] = &[
    "furthermore",
    "moreover",
    "consequently",
    "therefore",
    "thus",
    "hence",
    "nevertheless",
    "accordingly",
    "additionally",
    "regarding",
    "in addition",
    "in conclusion",
    "subsequently",
    "whereas",
];

const INFORMAL_MARKERS: &[&str] = &[
    "yeah", "gonna", "kinda", "wanna", "gotta", "hey", "cool", "stuff", "lol", "yep", "nope",
    "sorta", "dunno", "btw",
];

const EMOTIONAL_MARKERS: &[&str] = &[
    "amazing",
    "terrible",
    "awful",
    "wonderful",
    "love",
    "hate",
    "thrilled",
    "devastated",
    "heartbroken",
    "furious",
    "excited",
    "scared",
    "incredible",
    "horrible",
    "fantastic",
    "perfect",
    "so happy",
    "so sad",
];

const DIRECTIVE_MARKERS: &[&str] = &[
    "must",
    "should",
    "need to",
    "have to",
    "make sure",
    "be sure to",
    "don't",
    "do not",
    "never",
    "always",
];

const EXPLORATORY_MARKERS: &[&str] = &[
    "might",
    "could",
    "perhaps",
    "maybe",
    "consider",
    "what if",
    "explore",
    "wonder",
    "alternatively",
    "one option",
];

const CERTAIN_MARKERS: &[&str] = &[
    "definitely",
    "certainly",
    "absolutely",
    "clearly",
    "obviously",
    "undoubtedly",
    "guaranteed",
    "100%",
    "without a doubt",
    "completely",
    "for sure",
];

const UNCERTAIN_MARKERS: &[&str] = &[
    "possibly",
    "probably",
    "unsure",
    "not sure",
    "i think",
    "it seems",
    "likely",
    "could be",
    "uncertain",
    "not certain",
];

const SUPPORT_MARKERS: &[&str] = &[
    "understand",
    "here for you",
    "support",
    "help",
    "care",
    "valid",
    "you're not alone",
    "it's okay",
    "that's okay",
    "glad",
    "appreciate",
];

const URGENT_MARKERS: &[&str] = &[
    "urgent",
    "urgently",
    "immediately",
    "right now",
    "asap",
    "emergency",
    "hurry",
    "quickly",
    "critical",
    "act now",
    "now",
    "before it's too late",
    "don't wait",
];

const CALM_MARKERS: &[&str] = &[
    "calm",
    "relax",
    "take your time",
    "no rush",
    "gently",
    "slowly",
    "breathe",
    "whenever you're ready",
    "at your own pace",
    "peaceful",
];

/// Compiled marker sets.
pub struct ToneAnalyzer {
    formal: Regex,
    informal: Regex,
    emotional: Regex,
    directive: Regex,
    exploratory: Regex,
    certain: Regex,
    uncertain: Regex,
    support: Regex,
    urgent: Regex,
    calm: Regex,
}

impl ToneAnalyzer {
    pub fn new() -> Self {
        Self {
            formal: phrase_regex(FORMAL_MARKERS),
            informal: phrase_regex(INFORMAL_MARKERS),
            emotional: phrase_regex(EMOTIONAL_MARKERS),
            directive: phrase_regex(DIRECTIVE_MARKERS),
            exploratory: phrase_regex(EXPLORATORY_MARKERS),
            certain: phrase_regex(CERTAIN_MARKERS),
            uncertain: phrase_regex(UNCERTAIN_MARKERS),
            support: phrase_regex(SUPPORT_MARKERS),
            urgent: phrase_regex(URGENT_MARKERS),
            calm: phrase_regex(CALM_MARKERS),
        }
    }

    /// Compute the tone profile of `text`.
    pub fn analyze(&self, text: &str) -> ToneProfile {
        let text = normalize(text);
        let count = |re: &Regex| count_matches(re, &text) as f64;
        let exclamations = text.matches('!').count() as f64;

        ToneProfile::new(
            0.5 + (count(&self.formal) - count(&self.informal)) * 0.1,
            count(&self.emotional) * 0.05 + exclamations * 0.1,
            0.5 + (count(&self.directive) - count(&self.exploratory)) * 0.08,
            0.5 + (count(&self.certain) - count(&self.uncertain)) * 0.08,
            count(&self.support) * 0.1,
            0.3 + (count(&self.urgent) - count(&self.calm)) * 0.15,
        )
    }
}

impl Default for ToneAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

static ANALYZER: LazyLock<ToneAnalyzer> = LazyLock::new(ToneAnalyzer::new);

/// Tone profile of `text` using the shared analyzer.
pub fn analyze_tone(text: &str) -> ToneProfile {
    ANALYZER.analyze(text)
}

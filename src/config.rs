//! Configuration module for the governance core.
//!
//! Loads configuration from YAML files and environment variables, validates
//! it into an immutable [`ConfigSnapshot`], and serves snapshots to
//! evaluations through a [`ConfigStore`] that swaps whole snapshots on update.

use std::sync::{Arc, PoisonError, RwLock};

use config::{Config as ConfigLoader, Environment, File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::Criterion;
use crate::error::{GovernanceError, GovernanceResult};

/// How the pipeline applies its decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceMode {
    /// Apply the recommended action through the Intervention Engine.
    #[default]
    Enforce,
    /// Evaluate and audit, but deliver drafts unchanged.
    Monitor,
}

/// What happens to an evaluation when one detector fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole evaluation with the detector's error.
    #[default]
    FailFast,
    /// Replace the failed detector's result with a non-firing result that
    /// carries the error, and keep going.
    Isolate,
}

/// Per-criterion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionConfig {
    pub enabled: bool,
    /// Confidence at or above which the detector fires.
    pub threshold: f64,
    /// Extra rules, matched case-insensitively as regular expressions.
    #[serde(default)]
    pub custom_patterns: Vec<String>,
}

impl CriterionConfig {
    pub fn new(enabled: bool, threshold: f64) -> Self {
        Self {
            enabled,
            threshold,
            custom_patterns: Vec::new(),
        }
    }
}

/// Settings for the four criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaConfig {
    pub tone_drift: CriterionConfig,
    pub hallucination: CriterionConfig,
    pub inconsistency: CriterionConfig,
    pub unsafe_reasoning: CriterionConfig,
}

impl CriteriaConfig {
    pub fn get(&self, criterion: Criterion) -> &CriterionConfig {
        match criterion {
            Criterion::ToneDrift => &self.tone_drift,
            Criterion::Hallucination => &self.hallucination,
            Criterion::Inconsistency => &self.inconsistency,
            Criterion::UnsafeReasoning => &self.unsafe_reasoning,
        }
    }

    pub fn get_mut(&mut self, criterion: Criterion) -> &mut CriterionConfig {
        match criterion {
            Criterion::ToneDrift => &mut self.tone_drift,
            Criterion::Hallucination => &mut self.hallucination,
            Criterion::Inconsistency => &mut self.inconsistency,
            Criterion::UnsafeReasoning => &mut self.unsafe_reasoning,
        }
    }
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            tone_drift: CriterionConfig::new(true, 0.4),
            hallucination: CriterionConfig::new(true, 0.5),
            inconsistency: CriterionConfig::new(true, 0.5),
            unsafe_reasoning: CriterionConfig::new(true, 0.3),
        }
    }
}

/// Confidence levels that escalate the recommended action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterventionThresholds {
    pub block: f64,
    pub modify: f64,
    pub warn: f64,
}

impl InterventionThresholds {
    /// Whether `block >= modify >= warn`.
    pub fn is_ordered(&self) -> bool {
        self.block >= self.modify && self.modify >= self.warn
    }
}

impl Default for InterventionThresholds {
    fn default() -> Self {
        Self {
            block: 0.8,
            modify: 0.5,
            warn: 0.3,
        }
    }
}

fn default_latency_budget_ms() -> u64 {
    1000
}

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Global switch; when off every reply passes through unevaluated.
    pub enabled: bool,
    pub mode: GovernanceMode,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Fan-out duration above which a performance warning is logged.
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,
    /// Hard bound per detector invocation. Unset means no deadline.
    #[serde(default)]
    pub detector_timeout_ms: Option<u64>,
    pub criteria: CriteriaConfig,
    pub intervention_thresholds: InterventionThresholds,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: GovernanceMode::Enforce,
            failure_policy: FailurePolicy::FailFast,
            latency_budget_ms: default_latency_budget_ms(),
            detector_timeout_ms: None,
            criteria: CriteriaConfig::default(),
            intervention_thresholds: InterventionThresholds::default(),
        }
    }
}

impl GovernanceConfig {
    /// Load configuration from files and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (GOVERNANCE__*)
    /// 2. config/local.yaml (if exists)
    /// 3. config/default.yaml
    pub fn load() -> GovernanceResult<Self> {
        let loaded: GovernanceConfig = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("GOVERNANCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Load and validate configuration from an in-memory YAML document.
    pub fn from_yaml_str(yaml: &str) -> GovernanceResult<Self> {
        let loaded: GovernanceConfig = ConfigLoader::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Check every field that can be malformed, without keeping the result.
    pub fn validate(&self) -> GovernanceResult<()> {
        CriterionPolicies::compile(self).map(|_| ())
    }
}

fn check_unit(name: &str, value: f64) -> GovernanceResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(GovernanceError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

/// A compiled custom rule.
#[derive(Debug, Clone)]
pub struct CustomRule {
    /// The rule as written in configuration.
    pub source: String,
    pub regex: Regex,
}

impl CustomRule {
    pub fn compile(criterion: Criterion, source: &str) -> GovernanceResult<Self> {
        let regex = Regex::new(&format!("(?i){}", source)).map_err(|e| {
            GovernanceError::InvalidRule {
                criterion,
                rule: source.to_string(),
                source: e,
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }
}

/// Validated settings a detector runs with.
#[derive(Debug, Clone)]
pub struct CriterionPolicy {
    pub enabled: bool,
    pub threshold: f64,
    pub custom_rules: Vec<CustomRule>,
}

impl CriterionPolicy {
    fn compile(criterion: Criterion, config: &CriterionConfig) -> GovernanceResult<Self> {
        check_unit(&format!("criteria.{}.threshold", criterion), config.threshold)?;

        let custom_rules = config
            .custom_patterns
            .iter()
            .map(|rule| CustomRule::compile(criterion, rule))
            .collect::<GovernanceResult<Vec<_>>>()?;

        Ok(Self {
            enabled: config.enabled,
            threshold: config.threshold,
            custom_rules,
        })
    }

    /// Policy with the given threshold and no custom rules.
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            enabled: true,
            threshold,
            custom_rules: Vec::new(),
        }
    }
}

/// Compiled policies for the four criteria.
#[derive(Debug, Clone)]
pub struct CriterionPolicies {
    tone_drift: CriterionPolicy,
    hallucination: CriterionPolicy,
    inconsistency: CriterionPolicy,
    unsafe_reasoning: CriterionPolicy,
}

impl CriterionPolicies {
    fn compile(config: &GovernanceConfig) -> GovernanceResult<Self> {
        let thresholds = &config.intervention_thresholds;
        check_unit("intervention_thresholds.block", thresholds.block)?;
        check_unit("intervention_thresholds.modify", thresholds.modify)?;
        check_unit("intervention_thresholds.warn", thresholds.warn)?;

        if config.latency_budget_ms == 0 {
            return Err(GovernanceError::Config(
                "latency_budget_ms must be greater than zero".to_string(),
            ));
        }
        if config.detector_timeout_ms == Some(0) {
            return Err(GovernanceError::Config(
                "detector_timeout_ms must be greater than zero when set".to_string(),
            ));
        }

        let criteria = &config.criteria;
        Ok(Self {
            tone_drift: CriterionPolicy::compile(Criterion::ToneDrift, &criteria.tone_drift)?,
            hallucination: CriterionPolicy::compile(
                Criterion::Hallucination,
                &criteria.hallucination,
            )?,
            inconsistency: CriterionPolicy::compile(
                Criterion::Inconsistency,
                &criteria.inconsistency,
            )?,
            unsafe_reasoning: CriterionPolicy::compile(
                Criterion::UnsafeReasoning,
                &criteria.unsafe_reasoning,
            )?,
        })
    }

    pub fn get(&self, criterion: Criterion) -> &CriterionPolicy {
        match criterion {
            Criterion::ToneDrift => &self.tone_drift,
            Criterion::Hallucination => &self.hallucination,
            Criterion::Inconsistency => &self.inconsistency,
            Criterion::UnsafeReasoning => &self.unsafe_reasoning,
        }
    }
}

/// Immutable, validated view of a [`GovernanceConfig`].
///
/// An evaluation holds one `Arc<ConfigSnapshot>` for its whole duration.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    config: GovernanceConfig,
    policies: CriterionPolicies,
    version: u64,
}

impl ConfigSnapshot {
    /// Validate `config` into a snapshot.
    pub fn compile(config: GovernanceConfig, version: u64) -> GovernanceResult<Self> {
        let policies = CriterionPolicies::compile(&config)?;

        if !config.intervention_thresholds.is_ordered() {
            tracing::warn!(
                block = config.intervention_thresholds.block,
                modify = config.intervention_thresholds.modify,
                warn = config.intervention_thresholds.warn,
                "Intervention thresholds are not ordered block >= modify >= warn"
            );
        }

        Ok(Self {
            config,
            policies,
            version,
        })
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn policy(&self, criterion: Criterion) -> &CriterionPolicy {
        self.policies.get(criterion)
    }

    pub fn thresholds(&self) -> &InterventionThresholds {
        &self.config.intervention_thresholds
    }

    /// Starts at 1 and increases by one per successful swap.
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Partial update for one criterion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriterionConfigUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub custom_patterns: Option<Vec<String>>,
}

impl CriterionConfigUpdate {
    fn apply(&self, target: &mut CriterionConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(threshold) = self.threshold {
            target.threshold = threshold;
        }
        if let Some(patterns) = &self.custom_patterns {
            target.custom_patterns = patterns.clone();
        }
    }
}

/// Partial update of the live configuration. Absent fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfigUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub mode: Option<GovernanceMode>,
    #[serde(default)]
    pub failure_policy: Option<FailurePolicy>,
    #[serde(default)]
    pub latency_budget_ms: Option<u64>,
    #[serde(default)]
    pub detector_timeout_ms: Option<u64>,
    #[serde(default)]
    pub tone_drift: Option<CriterionConfigUpdate>,
    #[serde(default)]
    pub hallucination: Option<CriterionConfigUpdate>,
    #[serde(default)]
    pub inconsistency: Option<CriterionConfigUpdate>,
    #[serde(default)]
    pub unsafe_reasoning: Option<CriterionConfigUpdate>,
    #[serde(default)]
    pub intervention_thresholds: Option<InterventionThresholds>,
}

impl GovernanceConfigUpdate {
    /// Update a single criterion.
    pub fn criterion(criterion: Criterion, update: CriterionConfigUpdate) -> Self {
        let mut this = Self::default();
        *this.criterion_slot(criterion) = Some(update);
        this
    }

    fn criterion_slot(&mut self, criterion: Criterion) -> &mut Option<CriterionConfigUpdate> {
        match criterion {
            Criterion::ToneDrift => &mut self.tone_drift,
            Criterion::Hallucination => &mut self.hallucination,
            Criterion::Inconsistency => &mut self.inconsistency,
            Criterion::UnsafeReasoning => &mut self.unsafe_reasoning,
        }
    }

    fn criterion_update(&self, criterion: Criterion) -> Option<&CriterionConfigUpdate> {
        match criterion {
            Criterion::ToneDrift => self.tone_drift.as_ref(),
            Criterion::Hallucination => self.hallucination.as_ref(),
            Criterion::Inconsistency => self.inconsistency.as_ref(),
            Criterion::UnsafeReasoning => self.unsafe_reasoning.as_ref(),
        }
    }

    /// Return a copy of `base` with this update applied.
    pub fn apply(&self, base: &GovernanceConfig) -> GovernanceConfig {
        let mut next = base.clone();
        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if let Some(mode) = self.mode {
            next.mode = mode;
        }
        if let Some(policy) = self.failure_policy {
            next.failure_policy = policy;
        }
        if let Some(budget) = self.latency_budget_ms {
            next.latency_budget_ms = budget;
        }
        if let Some(timeout) = self.detector_timeout_ms {
            next.detector_timeout_ms = Some(timeout);
        }
        for criterion in Criterion::ALL {
            if let Some(update) = self.criterion_update(criterion) {
                update.apply(next.criteria.get_mut(criterion));
            }
        }
        if let Some(thresholds) = self.intervention_thresholds {
            next.intervention_thresholds = thresholds;
        }
        next
    }
}

/// Holds the current snapshot and replaces it atomically.
///
/// Readers clone the `Arc` under a short read lock; writers validate and
/// swap the whole snapshot, so a reader never sees a half-applied update.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Validate `config` and make it the first snapshot.
    pub fn new(config: GovernanceConfig) -> GovernanceResult<Self> {
        let snapshot = ConfigSnapshot::compile(config, 1)?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// The snapshot currently in force.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the whole configuration.
    pub fn replace(&self, config: GovernanceConfig) -> GovernanceResult<Arc<ConfigSnapshot>> {
        self.swap(|_| Ok(config))
    }

    /// Apply a partial update. On error the previous snapshot stays in force.
    pub fn update(&self, update: &GovernanceConfigUpdate) -> GovernanceResult<Arc<ConfigSnapshot>> {
        self.swap(|current| Ok(update.apply(current)))
    }

    fn swap<F>(&self, next: F) -> GovernanceResult<Arc<ConfigSnapshot>>
    where
        F: FnOnce(&GovernanceConfig) -> GovernanceResult<GovernanceConfig>,
    {
        // Held for the whole read-modify-write so concurrent updates serialize.
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let config = next(guard.config())?;
        let snapshot = Arc::new(ConfigSnapshot::compile(config, guard.version() + 1)?);
        *guard = Arc::clone(&snapshot);

        tracing::info!(
            version = snapshot.version(),
            enabled = snapshot.config().enabled,
            mode = ?snapshot.config().mode,
            "Governance configuration updated"
        );

        Ok(snapshot)
    }
}

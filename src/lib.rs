//! Governance Core - scores candidate replies for behavioral risk before
//! they reach a user, and decides how each reply is delivered.
//!
//! The entry point is [`GovernancePipeline`]: it gates system messages,
//! runs the four detectors (tone drift, hallucination, inconsistency,
//! unsafe reasoning) concurrently, aggregates their results into a risk
//! level and a recommended [`InterventionAction`], and can hand the decision
//! to a caller-supplied [`InterventionEngine`].
//!
//! ```no_run
//! use governance_core::{GovernanceConfig, GovernancePipeline, SessionContext};
//!
//! # async fn run() -> governance_core::GovernanceResult<()> {
//! let pipeline = GovernancePipeline::new(GovernanceConfig::load()?)?;
//! let context = SessionContext::new("session-42");
//! let evaluation = pipeline.evaluate("Here is what I found.", &context).await?;
//! println!("{}", pipeline.determine_action(&evaluation));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use config::{
    ConfigSnapshot, ConfigStore, CriterionConfig, CriterionConfigUpdate, FailurePolicy,
    GovernanceConfig, GovernanceConfigUpdate, GovernanceMode, InterventionThresholds,
};
pub use domain::{
    AuditRecord, ConversationTurn, Criterion, DetectionResult, EvaluationResult,
    InterventionAction, InterventionEngine, InterventionOutcome, RiskLevel, SessionContext,
    ToneProfile,
};
pub use engine::{Detector, EvaluationEngine};
pub use error::{DetectorError, GovernanceError, GovernanceResult};
pub use pipeline::{GovernancePipeline, GovernedReply};

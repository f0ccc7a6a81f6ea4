//! Session context supplied by the calling conversation pipeline.
//!
//! The core only reads this; ownership stays with the caller.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Per-call session context.
///
/// `conversation_history` is chronological: insertion order is the order the
/// turns happened in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub journey_id: Option<String>,

    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,

    #[serde(default)]
    pub current_step: u32,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SessionContext {
    /// Create an empty context for a session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_journey(mut self, journey_id: impl Into<String>) -> Self {
        self.journey_id = Some(journey_id.into());
        self
    }

    /// Append a turn to the history.
    pub fn with_turn(mut self, turn: ConversationTurn) -> Self {
        self.conversation_history.push(turn);
        self
    }

    /// Assistant turns in chronological order.
    pub fn assistant_turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.conversation_history
            .iter()
            .filter(|t| t.role == TurnRole::Assistant)
    }

    /// User turns in chronological order.
    pub fn user_turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.conversation_history
            .iter()
            .filter(|t| t.role == TurnRole::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_filters_keep_order() {
        let ctx = SessionContext::new("s1")
            .with_turn(ConversationTurn::user("hi"))
            .with_turn(ConversationTurn::assistant("first"))
            .with_turn(ConversationTurn::user("more"))
            .with_turn(ConversationTurn::assistant("second"));

        let assistant: Vec<&str> = ctx.assistant_turns().map(|t| t.content.as_str()).collect();
        assert_eq!(assistant, vec!["first", "second"]);
        assert_eq!(ctx.user_turns().count(), 2);
    }

    #[test]
    fn test_context_deserializes_with_defaults() {
        let ctx: SessionContext = serde_json::from_str(
            r#"{"session_id":"abc","conversation_history":[{"role":"assistant","content":"hello"}]}"#,
        )
        .unwrap();
        assert_eq!(ctx.session_id, "abc");
        assert_eq!(ctx.conversation_history[0].role, TurnRole::Assistant);
        assert!(ctx.user_id.is_none());
        assert_eq!(ctx.current_step, 0);
    }
}

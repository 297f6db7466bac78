use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lead::SessionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

/// One chat session's ordered history. The reconciliation core only reads it;
/// the interactive chat path appends to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    pub session_id: SessionId,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self { session_id, turns: Vec::new(), created_at: now, updated_at: now }
    }

    pub fn user_inputs(&self) -> Vec<String> {
        self.turns
            .iter()
            .filter(|turn| turn.role == Role::User)
            .map(|turn| turn.text.clone())
            .collect()
    }

    /// Turns with a trailing unanswered user turn dropped, keeping
    /// user/assistant turns paired for summarization.
    pub fn paired_turns(&self) -> &[Turn] {
        if self.turns.len() % 2 != 0 {
            &self.turns[..self.turns.len() - 1]
        } else {
            &self.turns
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }
}

/// Collapses runs of whitespace and trims, matching what the assistant front
/// end sends after form submission.
pub fn clean_user_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

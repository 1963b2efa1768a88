//! Per-session state: [`ExecutionContext`], its lifecycle [`InterpreterState`],
//! and the session-intrinsic [`RuntimeError`] it records on failure.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::value::Value;

/// A session's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterState {
    Idle,
    Running,
    WaitingInput,
    Finished,
    Error,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Failures intrinsic to a running session: never raised to the caller as a
/// `Result`, only recorded on [`ExecutionContext::last_error`] and surfaced
/// through `Output.message` once the session transitions to `ERROR`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("step `{0}` does not exist")]
    UnknownStep(String),
    #[error("while loop exceeded {0} iterations")]
    LoopCapExceeded(u32),
    #[error("expected numeric operands for `{op}`, got {left} and {right}")]
    TypeMismatch { op: String, left: String, right: String },
}

/// Execution state for a single dialogue session.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub session_id: String,
    pub variables: HashMap<String, Value>,
    pub current_step: Option<String>,
    pub state: InterpreterState,
    pub conversation_history: Vec<HistoryEntry>,
    pub last_speak_output: String,
    pub available_intents: Vec<String>,
    pub last_error: Option<RuntimeError>,
}

impl ExecutionContext {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            variables: HashMap::new(),
            current_step: None,
            state: InterpreterState::Idle,
            conversation_history: Vec::new(),
            last_speak_output: String::new(),
            available_intents: Vec::new(),
            last_error: None,
        }
    }

    pub fn set_variable(&mut self, name: String, value: Value) {
        self.variables.insert(name, value);
    }

    /// Unbound variables read as the empty string, per specification.
    pub fn get_variable(&self, name: &str) -> Value {
        self.variables.get(name).cloned().unwrap_or_else(|| Value::String(String::new()))
    }

    pub fn add_to_history(&mut self, role: &str, content: &str) {
        self.conversation_history.push(HistoryEntry {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// The last `n` history entries as `(role, content)` pairs, for handing to
    /// the recognizer as conversational context.
    pub fn recent_history(&self, n: usize) -> Vec<(String, String)> {
        let start = self.conversation_history.len().saturating_sub(n);
        self.conversation_history[start..]
            .iter()
            .map(|h| (h.role.clone(), h.content.clone()))
            .collect()
    }
}

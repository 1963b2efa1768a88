//! Intent recognition contract (C4): classifies a user utterance against an
//! ordered list of candidate intents.
//!
//! Two implementations are provided: [`local::LocalRecognizer`], a
//! dependency-free keyword/TF-IDF matcher, and [`remote::RemoteRecognizer`], an
//! LLM-backed client that falls back to local keyword matching on any failure.

pub mod local;
pub mod remote;

use std::collections::HashMap;

use crate::value::Value;

/// Recent conversational state handed to a recognizer so it can disambiguate.
pub struct RecognizerContext<'a> {
    pub variables: &'a HashMap<String, Value>,
    pub recent_history: &'a [(String, String)],
}

/// Outcome of a single `recognize` call.
///
/// `intent` is either empty (no match) or equal to one of the candidates
/// passed in; implementations must snap or reject to the candidate set before
/// returning, never invent an intent outside it.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f64,
    pub entities: HashMap<String, Value>,
    pub is_silence: bool,
}

impl IntentResult {
    pub fn silence() -> Self {
        Self {
            intent: String::new(),
            confidence: 0.0,
            entities: HashMap::new(),
            is_silence: true,
        }
    }

    pub fn no_match() -> Self {
        Self {
            intent: String::new(),
            confidence: 0.0,
            entities: HashMap::new(),
            is_silence: false,
        }
    }
}

/// A single intent definition consulted by [`local::LocalRecognizer`].
#[derive(Debug, Clone)]
pub struct IntentPattern {
    pub intent: String,
    pub keywords: Vec<String>,
    pub synonyms: HashMap<String, Vec<String>>,
    pub regexes: Vec<String>,
    pub examples: Vec<String>,
    pub weight: f64,
    pub priority: i32,
}

impl IntentPattern {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            keywords: Vec::new(),
            synonyms: HashMap::new(),
            regexes: Vec::new(),
            examples: Vec::new(),
            weight: 1.0,
            priority: 0,
        }
    }

    pub fn keywords(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn examples(mut self, examples: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }

    pub fn synonym(mut self, canonical: impl Into<String>, variants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.synonyms
            .insert(canonical.into(), variants.into_iter().map(Into::into).collect());
        self
    }

    pub fn pattern(mut self, regex: impl Into<String>) -> Self {
        self.regexes.push(regex.into());
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Implemented by every intent classifier the interpreter can drive.
///
/// The contract is pure and synchronous from the interpreter's point of view:
/// an implementation may block internally (network I/O, CPU-bound scoring),
/// but never returns control to the caller mid-operation.
pub trait Recognizer: Send + Sync {
    fn recognize(
        &self,
        utterance: &str,
        candidates: &[String],
        ctx: RecognizerContext<'_>,
    ) -> IntentResult;
}

/// Test doubles usable both by this crate's own unit tests and by
/// downstream integration tests that need a recognizer without the local or
/// remote implementation's machinery.
pub mod testutil {
    use super::*;
    use std::sync::Mutex;

    /// Recognizer test double: returns pre-programmed results keyed by the
    /// lowercased utterance, falling back to [`IntentResult::no_match`].
    pub struct MockRecognizer {
        responses: Mutex<HashMap<String, IntentResult>>,
    }

    impl MockRecognizer {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
            }
        }

        pub fn set_response(&self, utterance: &str, result: IntentResult) {
            self.responses
                .lock()
                .unwrap()
                .insert(utterance.to_lowercase(), result);
        }
    }

    impl Default for MockRecognizer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Recognizer for MockRecognizer {
        fn recognize(
            &self,
            utterance: &str,
            _candidates: &[String],
            _ctx: RecognizerContext<'_>,
        ) -> IntentResult {
            if utterance.trim().is_empty() {
                return IntentResult::silence();
            }
            self.responses
                .lock()
                .unwrap()
                .get(&utterance.to_lowercase())
                .cloned()
                .unwrap_or_else(IntentResult::no_match)
        }
    }
}

//! Error types for the dialogue-engine crate.
//!
//! This module defines a unified error enumeration used across script compilation,
//! recognizer construction, and service registration. It integrates with `thiserror`
//! to provide rich `Display` implementations and error source chaining where
//! applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - Errors that are intrinsic to a *running* session (unknown step target, numeric
//!   type mismatch, loop cap exceeded) are not represented here: they never escape
//!   the interpreter and are instead captured as [`crate::interpreter::RuntimeError`]
//!   on the session's `last_error` field.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the dialogue-engine library.
///
/// Covers lexical failures, recognizer configuration failures, and service
/// registration failures. Implements `std::error::Error` via `thiserror`.
pub enum DslError {
    /// An unrecognized character was encountered while tokenizing.
    #[error("unexpected character '{0}' at line {1}, column {2}")]
    UnexpectedChar(char, usize, usize),

    /// A string literal was not closed before a raw newline or end of input.
    #[error("unterminated string literal starting at line {0}, column {1}")]
    UnterminatedString(usize, usize),

    /// A regex pattern supplied to a local-recognizer intent pattern failed to compile.
    #[error("invalid regex pattern `{0}`: {1}")]
    InvalidPattern(String, regex::Error),

    /// No pattern library is registered for the requested scenario tag.
    #[error("unknown recognizer scenario `{0}`")]
    UnknownScenario(String),

    /// A service name was registered twice against the same handler.
    #[error("service `{0}` is already registered")]
    DuplicateService(String),

    /// The remote recognizer could not be constructed (e.g. invalid endpoint URL).
    #[error("failed to construct remote recognizer: {0}")]
    RecognizerConfig(String),

    /// I/O error surfaced while loading a script or configuration from disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value failed to deserialize.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    Custom(String),
}

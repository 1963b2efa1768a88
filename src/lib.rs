//! `dialogue-engine` is a lexer, parser, and per-session interpreter for a
//! step-based dialogue scripting DSL, paired with a local (dependency-free)
//! and an LLM-backed intent recognizer.
//!
//! The embedding surface is [`compile_script`] to turn source text into a
//! [`Script`], and [`interpreter::Interpreter`] to drive any number of
//! concurrent sessions against the compiled result.

pub mod ast;
pub mod config;
pub mod errors;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod recognizer;
pub mod service;
pub mod value;

pub use ast::{ParseError, Script};
pub use errors::DslError;
pub use interpreter::{ExecutionContext, Interpreter, InterpreterState, Output};
pub use recognizer::local::LocalRecognizer;
pub use recognizer::remote::RemoteRecognizer;
pub use recognizer::{IntentPattern, IntentResult, Recognizer};
pub use service::{DefaultServiceHandler, ServiceHandler};
pub use value::Value;

use lexer::Lexer;

/// Compiles DSL source into a [`Script`].
///
/// Lexical errors abort tokenization entirely (there is no recovery below the
/// token level) and are reported as the script's sole parse error; syntactic
/// errors are recorded per malformed step while the rest of the script is
/// still returned, per the parser's recovery policy.
pub fn compile_script(source: &str) -> Script {
    match Lexer::new(source).tokenize() {
        Ok(tokens) => {
            let script = parser::parse(tokens);
            tracing::info!(
                step_count = script.steps.len(),
                error_count = script.errors.len(),
                "compiled script"
            );
            script
        }
        Err(err) => {
            let (line, column) = lex_error_location(&err);
            tracing::info!(error = %err, "script compilation failed during tokenization");
            let mut script = Script::default();
            script.errors.push(ParseError { message: err.to_string(), line, column });
            script
        }
    }
}

fn lex_error_location(err: &DslError) -> (usize, usize) {
    match err {
        DslError::UnexpectedChar(_, line, column) => (*line, *column),
        DslError::UnterminatedString(line, column) => (*line, *column),
        _ => (0, 0),
    }
}

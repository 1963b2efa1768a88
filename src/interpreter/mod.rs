//! Per-session AST execution (C6): drives a compiled [`crate::ast::Script`]
//! through a concurrent [`dashmap::DashMap`]-backed session registry (C7),
//! evaluating expressions, dispatching to the intent recognizer (C4) and
//! service handler (C5), and producing an [`Output`] at every suspension
//! point.

mod context;
mod eval;

pub use context::{ExecutionContext, HistoryEntry, InterpreterState, RuntimeError};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, trace};

use crate::ast::{Script, Statement};
use crate::config::RuntimeConfig;
use crate::recognizer::{Recognizer, RecognizerContext};
use crate::service::{DefaultServiceHandler, ServiceHandler};
use crate::value::Value;

/// Result of `start`/`process_input`: the message accumulated since the last
/// suspension, the session's resulting state, and whether it is now waiting
/// on the caller for more input.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub message: String,
    pub state: InterpreterState,
    pub waiting_for_input: bool,
    pub available_intents: Vec<String>,
}

impl Output {
    fn finished(message: String) -> Self {
        Self { message, state: InterpreterState::Finished, waiting_for_input: false, available_intents: Vec::new() }
    }

    fn waiting(message: String, available_intents: Vec<String>) -> Self {
        Self { message, state: InterpreterState::WaitingInput, waiting_for_input: true, available_intents }
    }

    fn error(message: impl Into<String>) -> Self {
        Self { message: message.into(), state: InterpreterState::Error, waiting_for_input: false, available_intents: Vec::new() }
    }
}

/// Errors returned by [`Interpreter`] operations that are not themselves part
/// of the per-session state machine (a bad session id). These are distinct
/// from [`RuntimeError`], which lives *inside* a session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session `{0}` does not exist")]
    NotFound(String),
}

/// Executes a compiled script against any number of concurrent sessions.
pub struct Interpreter {
    script: Arc<Script>,
    recognizer: Arc<dyn Recognizer>,
    service_handler: Arc<dyn ServiceHandler>,
    config: RuntimeConfig,
    sessions: DashMap<String, Mutex<ExecutionContext>>,
}

impl Interpreter {
    pub fn new(script: Arc<Script>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            script,
            recognizer,
            service_handler: Arc::new(DefaultServiceHandler::new()),
            config: RuntimeConfig::default(),
            sessions: DashMap::new(),
        }
    }

    pub fn with_service_handler(mut self, handler: Arc<dyn ServiceHandler>) -> Self {
        self.service_handler = handler;
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates (or overwrites) a session, seeded at the script's entry step.
    /// Per specification, uniqueness of `session_id` is the caller's
    /// responsibility.
    pub fn create_session(&self, session_id: String, initial_variables: Option<HashMap<String, Value>>) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(session_id.clone());
        if let Some(vars) = initial_variables {
            ctx.variables.extend(vars);
        }
        if !self.script.entry_step.is_empty() {
            ctx.current_step = Some(self.script.entry_step.clone());
        }
        debug!(session_id, "session created");
        self.sessions.insert(session_id, Mutex::new(ctx.clone()));
        ctx
    }

    pub fn get_session(&self, session_id: &str) -> Option<ExecutionContext> {
        self.sessions.get(session_id).map(|entry| entry.lock().unwrap().clone())
    }

    pub fn remove_session(&self, session_id: &str) {
        debug!(session_id, "session removed");
        self.sessions.remove(session_id);
    }

    pub fn start(&self, session_id: &str) -> Output {
        let Some(entry) = self.sessions.get(session_id) else {
            return Output::error(format!("session `{session_id}` does not exist"));
        };
        let mut ctx = entry.lock().unwrap();
        ctx.state = InterpreterState::Running;
        self.execute_current_step(&mut ctx)
    }

    pub fn process_input(&self, session_id: &str, user_input: &str) -> Output {
        let Some(entry) = self.sessions.get(session_id) else {
            return Output::error(format!("session `{session_id}` does not exist"));
        };
        let mut ctx = entry.lock().unwrap();

        if ctx.state != InterpreterState::WaitingInput {
            return Output {
                message: "not currently waiting for input".to_string(),
                state: InterpreterState::Error,
                waiting_for_input: false,
                available_intents: ctx.available_intents.clone(),
            };
        }

        ctx.add_to_history("user", user_input);

        let recent_history = ctx.recent_history(5);
        let intent_result = self.recognizer.recognize(
            user_input,
            &ctx.available_intents.clone(),
            RecognizerContext { variables: &ctx.variables, recent_history: &recent_history },
        );

        let Some(current_step) = self.script.step(ctx.current_step.as_deref().unwrap_or_default()) else {
            ctx.state = InterpreterState::Error;
            return Output::error(format!("step `{}` does not exist", ctx.current_step.clone().unwrap_or_default()));
        };

        let next_step = if intent_result.is_silence && current_step.silence_handler.is_some() {
            current_step.silence_handler.clone()
        } else if !intent_result.intent.is_empty() {
            let branch = current_step.branches.iter().find(|b| b.intent == intent_result.intent);
            match branch {
                Some(branch) => {
                    for (key, value) in &intent_result.entities {
                        ctx.set_variable(key.clone(), value.clone());
                    }
                    Some(branch.target.clone())
                }
                None => current_step.default_handler.clone(),
            }
        } else {
            current_step.default_handler.clone()
        };

        match next_step {
            Some(target) => {
                trace!(session_id, target, "routing to next step");
                ctx.current_step = Some(target);
                ctx.state = InterpreterState::Running;
                self.execute_current_step(&mut ctx)
            }
            None => Output::waiting(
                "Sorry, I didn't understand. Please try again.".to_string(),
                ctx.available_intents.clone(),
            ),
        }
    }

    fn execute_current_step(&self, ctx: &mut ExecutionContext) -> Output {
        let Some(step_name) = ctx.current_step.clone() else {
            ctx.state = InterpreterState::Error;
            return Output::error("no current step set");
        };
        let Some(step) = self.script.step(&step_name) else {
            ctx.state = InterpreterState::Error;
            ctx.last_error = Some(RuntimeError::UnknownStep(step_name.clone()));
            return Output::error(format!("step `{step_name}` does not exist"));
        };

        trace!(step = step_name.as_str(), "executing step");

        let mut output_lines = Vec::new();
        for stmt in &step.statements {
            if let Some(redirect) = self.execute_statement(stmt, ctx, &mut output_lines) {
                return redirect;
            }
        }

        ctx.available_intents = step.branches.iter().map(|b| b.intent.clone()).collect();

        if step.is_exit {
            ctx.state = InterpreterState::Finished;
            let message = output_lines.join("\n");
            ctx.add_to_history("assistant", &message);
            return Output::finished(message);
        }

        let has_listen = step.statements.iter().any(|s| matches!(s, Statement::Listen { .. }));
        let has_branches = !step.branches.is_empty() || step.silence_handler.is_some() || step.default_handler.is_some();

        if has_listen || has_branches {
            ctx.state = InterpreterState::WaitingInput;
            let message = output_lines.join("\n");
            if !message.is_empty() {
                ctx.add_to_history("assistant", &message);
            }
            return Output::waiting(message, ctx.available_intents.clone());
        }

        ctx.state = InterpreterState::Finished;
        Output::finished(output_lines.join("\n"))
    }

    /// Executes one statement, appending any `Speak` output to `output_lines`.
    /// Returns `Some(output)` when the statement caused an immediate
    /// suspension (`Goto`, an expression error, or a loop-cap overrun) that
    /// must short-circuit every enclosing statement loop up to the step.
    fn execute_statement(&self, stmt: &Statement, ctx: &mut ExecutionContext, output_lines: &mut Vec<String>) -> Option<Output> {
        match stmt {
            Statement::Speak(expr) => match self.eval_expr(expr, ctx) {
                Ok(value) => {
                    let rendered = value.to_string();
                    ctx.last_speak_output = rendered.clone();
                    output_lines.push(rendered);
                    None
                }
                Err(err) => Some(self.fail(ctx, err)),
            },
            Statement::Listen { .. } => None,
            Statement::Set { var, value } => match self.eval_expr(value, ctx) {
                Ok(value) => {
                    ctx.set_variable(var.clone(), value);
                    None
                }
                Err(err) => Some(self.fail(ctx, err)),
            },
            Statement::Goto(target) => {
                ctx.current_step = Some(target.clone());
                Some(self.execute_current_step(ctx))
            }
            Statement::If { cond, then_block, else_block } => match self.eval_expr(cond, ctx) {
                Ok(value) => {
                    let block = if value.is_truthy() { Some(then_block) } else { else_block.as_ref() };
                    if let Some(block) = block {
                        for stmt in block {
                            if let Some(redirect) = self.execute_statement(stmt, ctx, output_lines) {
                                return Some(redirect);
                            }
                        }
                    }
                    None
                }
                Err(err) => Some(self.fail(ctx, err)),
            },
            Statement::While { cond, body } => {
                let mut iterations = 0u32;
                loop {
                    match self.eval_expr(cond, ctx) {
                        Ok(value) if value.is_truthy() => {}
                        Ok(_) => break None,
                        Err(err) => return Some(self.fail(ctx, err)),
                    }
                    iterations += 1;
                    if iterations > self.config.max_loop_iterations {
                        return Some(self.fail(ctx, RuntimeError::LoopCapExceeded(self.config.max_loop_iterations)));
                    }
                    for stmt in body {
                        if let Some(redirect) = self.execute_statement(stmt, ctx, output_lines) {
                            return Some(redirect);
                        }
                    }
                }
            }
            Statement::Call { service, args, result_var } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    match self.eval_expr(arg, ctx) {
                        Ok(v) => values.push(v),
                        Err(err) => return Some(self.fail(ctx, err)),
                    }
                }
                let result = self.service_handler.call(service, &values, ctx);
                if let Some(var) = result_var {
                    ctx.set_variable(var.clone(), result);
                }
                None
            }
            Statement::Exit => None,
        }
    }

    fn fail(&self, ctx: &mut ExecutionContext, err: RuntimeError) -> Output {
        ctx.state = InterpreterState::Error;
        let message = err.to_string();
        ctx.last_error = Some(err);
        Output::error(message)
    }
}

//! End-to-end scripts compiled and driven through [`Interpreter`] as an
//! embedder would: `compile_script` once, `create_session`/`start` per
//! conversation, `process_input` per turn.

use std::collections::HashMap;
use std::sync::Arc;

use dialogue_engine::interpreter::InterpreterState;
use dialogue_engine::recognizer::testutil::MockRecognizer;
use dialogue_engine::recognizer::IntentResult;
use dialogue_engine::service::testutil::MockServiceHandler;
use dialogue_engine::{compile_script, DefaultServiceHandler, Interpreter, Value};

const GREETING_SCRIPT: &str = r#"
Step greet
  Speak "Hi, how can I help?"
  Listen
  Branch "book", booking
  Branch "cancel", farewell
  Silence prompt_again
  Default farewell

Step prompt_again
  Speak "Are you still there?"
  Listen
  Branch "book", booking
  Default farewell

Step booking
  Set $confirmed = 1
  Speak "Booking you in now."
  Exit

Step farewell
  Speak "Goodbye!"
  Exit
"#;

fn greeting_recognizer() -> Arc<MockRecognizer> {
    let recognizer = MockRecognizer::new();
    recognizer.set_response(
        "i want to book",
        IntentResult { intent: "book".into(), confidence: 0.9, entities: HashMap::new(), is_silence: false },
    );
    recognizer.set_response(
        "never mind",
        IntentResult { intent: "cancel".into(), confidence: 0.8, entities: HashMap::new(), is_silence: false },
    );
    Arc::new(recognizer)
}

#[test]
fn happy_path_routes_through_branch_to_an_exit_step() {
    let script = compile_script(GREETING_SCRIPT);
    assert!(script.errors.is_empty(), "unexpected parse errors: {:?}", script.errors);

    let interp = Interpreter::new(Arc::new(script), greeting_recognizer());
    interp.create_session("session-1".into(), None);

    let first = interp.start("session-1");
    assert_eq!(first.state, InterpreterState::WaitingInput);
    assert_eq!(first.message, "Hi, how can I help?");
    assert_eq!(first.available_intents, vec!["book".to_string(), "cancel".to_string()]);

    let second = interp.process_input("session-1", "I want to book");
    assert_eq!(second.state, InterpreterState::Finished);
    assert_eq!(second.message, "Booking you in now.");

    let ctx = interp.get_session("session-1").unwrap();
    assert_eq!(ctx.get_variable("confirmed"), Value::Int(1));
}

#[test]
fn unrecognized_intent_falls_back_to_default_handler() {
    let script = compile_script(GREETING_SCRIPT);
    let interp = Interpreter::new(Arc::new(script), greeting_recognizer());
    interp.create_session("session-2".into(), None);
    interp.start("session-2");

    let out = interp.process_input("session-2", "something entirely unrelated");
    assert_eq!(out.state, InterpreterState::Finished);
    assert_eq!(out.message, "Goodbye!");
}

#[test]
fn empty_utterance_routes_to_the_silence_handler_not_default() {
    let script = compile_script(GREETING_SCRIPT);
    let interp = Interpreter::new(Arc::new(script), greeting_recognizer());
    interp.create_session("session-3".into(), None);
    interp.start("session-3");

    let out = interp.process_input("session-3", "   ");
    assert_eq!(out.state, InterpreterState::WaitingInput);
    assert_eq!(out.message, "Are you still there?");
}

#[test]
fn nested_prompt_again_still_reaches_booking() {
    let script = compile_script(GREETING_SCRIPT);
    let interp = Interpreter::new(Arc::new(script), greeting_recognizer());
    interp.create_session("session-4".into(), None);
    interp.start("session-4");

    interp.process_input("session-4", "   ");
    let out = interp.process_input("session-4", "I want to book");
    assert_eq!(out.state, InterpreterState::Finished);
    assert_eq!(out.message, "Booking you in now.");
}

const SERVICE_SCRIPT: &str = r#"
Step start
  Call book_appointment("Cardiology") = $booking
  If $booking
    Speak "Booked your appointment."
  Else
    Speak "Something went wrong."
  EndIf
  Exit
"#;

#[test]
fn call_statement_invokes_the_service_handler_and_binds_the_result() {
    let script = compile_script(SERVICE_SCRIPT);
    assert!(script.errors.is_empty(), "unexpected parse errors: {:?}", script.errors);

    let interp = Interpreter::new(Arc::new(script), Arc::new(MockRecognizer::new()))
        .with_service_handler(Arc::new(DefaultServiceHandler::new()));
    interp.create_session("svc".into(), None);
    let out = interp.start("svc");
    assert_eq!(out.state, InterpreterState::Finished);
    assert_eq!(out.message, "Booked your appointment.");
}

#[test]
fn call_statement_against_an_unknown_service_produces_an_error_value_not_a_crash() {
    let script = compile_script(
        r#"
Step start
  Call not_a_real_service() = $result
  Speak $result
  Exit
"#,
    );
    let interp = Interpreter::new(Arc::new(script), Arc::new(MockRecognizer::new()));
    interp.create_session("svc2".into(), None);
    let out = interp.start("svc2");
    assert_eq!(out.state, InterpreterState::Finished);
    assert!(out.message.contains("error"), "message was: {}", out.message);
}

#[test]
fn mock_service_handler_records_every_call_it_receives() {
    let script = compile_script(
        r#"
Step start
  Call reserve_table(4, "19:30") = $result
  Exit
"#,
    );
    let mock = Arc::new(MockServiceHandler::new().with_response("reserve_table", Value::String("ok".into())));
    let interp = Interpreter::new(Arc::new(script), Arc::new(MockRecognizer::new())).with_service_handler(mock.clone());
    interp.create_session("svc3".into(), None);
    interp.start("svc3");

    let calls = mock.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "reserve_table");
    assert_eq!(calls[0].1, vec![Value::Int(4), Value::String("19:30".into())]);
}

#[test]
fn goto_mid_step_discards_output_buffered_before_it() {
    // A `Speak` before a `Goto` in the same step never reaches the caller: the
    // jump restarts step execution from scratch via a fresh recursive call.
    let script = compile_script(
        r#"
Step start
  Speak "this never appears"
  Goto finish

Step finish
  Speak "this does"
  Exit
"#,
    );
    let interp = Interpreter::new(Arc::new(script), Arc::new(MockRecognizer::new()));
    interp.create_session("goto-test".into(), None);
    let out = interp.start("goto-test");
    assert_eq!(out.message, "this does");
}

#[test]
fn while_loop_runs_to_its_natural_condition_and_accumulates_state() {
    let script = compile_script(
        r#"
Step start
  Set $count = 0
  While $count < 3
    Set $count = $count + 1
  EndWhile
  Speak $count
  Exit
"#,
    );
    let interp = Interpreter::new(Arc::new(script), Arc::new(MockRecognizer::new()));
    interp.create_session("loop-test".into(), None);
    let out = interp.start("loop-test");
    assert_eq!(out.state, InterpreterState::Finished);
    assert_eq!(out.message, "3");
}

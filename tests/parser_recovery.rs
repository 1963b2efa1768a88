//! Exercises the parser's single resynchronization point (the next `Step`
//! keyword, or `EOF`) against scripts with more than one malformed step, and
//! confirms lexical failures are reported without a panic.

use dialogue_engine::compile_script;

#[test]
fn a_single_malformed_step_does_not_prevent_the_rest_of_the_script_from_parsing() {
    let script = compile_script(
        r#"
Step broken
  Speak

Step fine
  Speak "hello"
  Exit
"#,
    );
    assert_eq!(script.errors.len(), 1);
    assert!(script.step("broken").is_none());
    let fine = script.step("fine").unwrap();
    assert!(fine.is_exit);
}

#[test]
fn two_malformed_steps_each_record_their_own_error() {
    let script = compile_script(
        r#"
Step first_broken
  Set $x =

Step second_broken
  If $x
    Speak "unclosed"

Step last
  Exit
"#,
    );
    assert_eq!(script.errors.len(), 2);
    assert!(script.step("first_broken").is_none());
    assert!(script.step("second_broken").is_none());
    assert!(script.step("last").unwrap().is_exit);
}

#[test]
fn stray_tokens_before_the_first_step_are_recorded_and_skipped() {
    let script = compile_script(
        r#"
Speak "no step yet"

Step ok
  Exit
"#,
    );
    assert!(!script.errors.is_empty());
    assert!(script.step("ok").unwrap().is_exit);
}

#[test]
fn entry_step_is_the_first_successfully_parsed_step_not_the_first_written_one() {
    // "broken" is written first but never makes it into the step map, so
    // "fine" — the first step that actually parses — becomes the entry step.
    let script = compile_script(
        r#"
Step broken
  Branch "x"

Step fine
  Exit
"#,
    );
    assert_eq!(script.entry_step, "fine");
}

#[test]
fn lexical_error_aborts_compilation_with_exactly_one_error_and_no_steps() {
    let script = compile_script("Step s\n  Speak \"unterminated\n  Exit\n");
    assert_eq!(script.errors.len(), 1);
    assert!(script.steps.is_empty());
}

#[test]
fn unexpected_character_is_reported_at_its_exact_line_and_column() {
    let script = compile_script("Step s\n  Set $x = 1 ~ 2\n");
    assert_eq!(script.errors.len(), 1);
    assert_eq!(script.errors[0].line, 2);
}

#[test]
fn empty_script_parses_to_no_steps_and_no_errors() {
    let script = compile_script("");
    assert!(script.steps.is_empty());
    assert!(script.errors.is_empty());
    assert_eq!(script.entry_step, "");
}

#[test]
fn comments_and_blank_lines_between_steps_never_trigger_recovery() {
    let script = compile_script(
        "# a leading comment\n\nStep one\n  # mid-step comment\n  Speak \"hi\"\n  Exit\n\n# trailing comment\n",
    );
    assert!(script.errors.is_empty());
    assert!(script.step("one").unwrap().is_exit);
}

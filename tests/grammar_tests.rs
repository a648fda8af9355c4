//! End-to-end tests through the grammar-text front-end: whitespace and word
//! policies, semantic actions, and diagnostics.

use pegra::{parse_grammar, Grammar, GrammarErrorKind, ParseErrorKind, Value};

fn grammar(src: &str) -> Grammar {
    match parse_grammar(src) {
        Ok(grammar) => grammar,
        Err(errors) => panic!("grammar should parse, got {errors:?}"),
    }
}

#[test]
fn arithmetic_grammar_evaluates_through_actions() {
    let mut g = grammar(
        r#"
        Expr    <- Term ('+' Term)*
        Term    <- Factor ('*' Factor)*
        Factor  <- Number / '(' Expr ')'
        Number  <- < [0-9]+ >
        %whitespace <- [ \t]*
        "#,
    );

    g.set_action("Number", |sv, _| {
        let n: i64 = sv.token().parse().expect("digits");
        Ok(Value::Int(n))
    });
    g.set_action("Expr", |sv, _| {
        Ok(Value::Int(sv.vs.iter().filter_map(Value::as_i64).sum()))
    });
    g.set_action("Term", |sv, _| {
        Ok(Value::Int(sv.vs.iter().filter_map(Value::as_i64).product()))
    });

    let (l, value) = g.parse("1 + 2 * 3").expect("should parse");
    assert_eq!(l, 9);
    assert_eq!(value.as_i64(), Some(7));

    let (_, value) = g.parse("(1 + 2) * 3").expect("should parse");
    assert_eq!(value.as_i64(), Some(9));
}

#[test]
fn leading_whitespace_is_skipped_before_the_start_rule() {
    let g = grammar(
        r#"
        Start <- 'a' 'b'
        %whitespace <- [ ]*
        "#,
    );
    let (l, _) = g.parse("  a  b  ").expect("should parse");
    assert_eq!(l, 8);
}

#[test]
fn each_literal_skips_trailing_whitespace_once() {
    let g = grammar(
        r#"
        Start <- 'a' 'b'
        %whitespace <- [ ]*
        "#,
    );
    assert!(g.parse("ab").is_ok());
    assert!(g.parse("a   b").is_ok());
    assert!(g.parse("a , b").is_err());
}

#[test]
fn trailing_whitespace_after_the_match_is_allowed() {
    // Character classes never skip whitespace on their own, so the leftover
    // blanks are only absorbed by the start-rule entry point.
    let g = grammar(
        r#"
        Start <- [a-z]+
        %whitespace <- [ ]*
        "#,
    );
    assert_eq!(g.parse("abc ").map(|(l, _)| l).ok(), Some(4));
    assert_eq!(g.parse("abc   ").map(|(l, _)| l).ok(), Some(6));
    assert!(g.parse("abc x ").is_err());
}

#[test]
fn token_boundary_excludes_skipped_whitespace() {
    let mut g = grammar(
        r#"
        Start <- < [a-z]+ > 'end'
        %whitespace <- [ ]*
        "#,
    );
    g.set_action("Start", |sv, _| {
        assert_eq!(sv.ts.len(), 1);
        Ok(Value::Str(sv.token().to_string()))
    });

    let (l, value) = g.parse("abc   end").expect("should parse");
    assert_eq!(l, 9);
    assert_eq!(value.as_str(), Some("abc"));
}

#[test]
fn word_boundary_rejects_a_longer_word() {
    let g = grammar(
        r#"
        Start <- 'int' [a-z]*
        %word <- [a-z]
        "#,
    );
    assert!(g.parse("int").is_ok());
    assert!(
        g.parse("integer").is_err(),
        "keyword must stop at a word boundary"
    );
}

#[test]
fn without_word_operator_the_longer_word_matches() {
    let g = grammar("Start <- 'int' [a-z]*");
    assert!(g.parse("integer").is_ok());
}

#[test]
fn mismatch_reports_position_and_expectation() {
    let g = grammar("Start <- 'hello'");
    let err = g.parse("help").expect_err("should fail");

    assert_eq!((err.line, err.col), (1, 1));
    let rendered = err.render();
    assert!(rendered.contains("1:1  help"));
    assert!(rendered.contains("Expected \"hello\""));
}

#[test]
fn failed_choice_aggregates_every_alternative() {
    let g = grammar("Start <- 'aaa' / 'bbb'");
    let err = g.parse("ccc").expect_err("should fail");

    let ParseErrorKind::Choice { alternatives } = &err.kind else {
        panic!("expected a choice aggregate, got {err:?}");
    };
    assert_eq!(alternatives.len(), 2);

    let rendered = err.render();
    assert!(rendered.contains("Expected \"aaa\""));
    assert!(rendered.contains("Expected \"bbb\""));
}

#[test]
fn unconsumed_trailing_input_fails() {
    let g = grammar("Start <- 'ab'");
    let err = g.parse("abc").expect_err("should fail");
    assert!(err.to_string().contains("end of input"));
}

#[test]
fn rule_error_message_becomes_help_text() {
    let mut g = grammar("Start <- [0-9]+");
    g.rule_mut("Start").expect("rule exists").error_message =
        Some("a number is required here".to_string());

    let err = g.parse("x").expect_err("should fail");
    assert_eq!(err.help.as_deref(), Some("a number is required here"));
}

#[test]
fn undefined_reference_is_a_grammar_error() {
    let errors = parse_grammar("Start <- Missing").expect_err("should be rejected");
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0].kind,
        GrammarErrorKind::UndefinedReference(ref name) if name == "Missing"
    ));
}

#[test]
fn duplicate_definition_is_a_grammar_error() {
    let errors = parse_grammar("A <- 'a'\nA <- 'b'").expect_err("should be rejected");
    assert!(errors
        .iter()
        .any(|e| matches!(e.kind, GrammarErrorKind::DuplicateDefinition(ref name) if name == "A")));
}

#[test]
fn wrong_macro_arity_is_a_grammar_error() {
    let errors =
        parse_grammar("A <- L('a')\nL(X, Y) <- X Y").expect_err("should be rejected");
    assert!(errors.iter().any(|e| matches!(
        e.kind,
        GrammarErrorKind::ArityMismatch {
            expected: 2,
            found: 1,
            ..
        }
    )));
}

#[test]
fn empty_grammar_is_rejected() {
    assert!(parse_grammar("").is_err());
    assert!(parse_grammar("# only a comment\n").is_err());
}

#[test]
fn cancel_flag_aborts_the_parse() {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    let mut g = grammar("Start <- [a-z]*");
    let flag = Arc::new(AtomicBool::new(true));
    g.cancel = Some(flag);

    assert!(g.parse("abc").is_err());
}

#[test]
fn grammar_can_be_shared_across_threads() {
    use std::sync::Arc;

    let g = Arc::new(grammar("Start <- [a-z]+"));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let g = Arc::clone(&g);
            std::thread::spawn(move || g.parse("abc").map(|(l, _)| l))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("no panic").ok(), Some(3));
    }
}

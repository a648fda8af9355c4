//! Parameterized (macro) rules: positional binding, repeated use of a
//! parameter, and substitution through nested macro calls.

use pegra::{parse_grammar, Grammar, Value};

fn grammar(src: &str) -> Grammar {
    match parse_grammar(src) {
        Ok(grammar) => grammar,
        Err(errors) => panic!("grammar should parse, got {errors:?}"),
    }
}

#[test]
fn list_macro_matches_delimited_items() {
    let g = grammar(
        r#"
        Start <- List(Num, Comma)
        List(I, D) <- I (D I)*
        Num   <- < [0-9]+ >
        Comma <- ','
        "#,
    );

    assert_eq!(g.parse("1").map(|(l, _)| l).ok(), Some(1));
    assert_eq!(g.parse("1,22,333").map(|(l, _)| l).ok(), Some(8));
    assert!(g.parse(",1").is_err());
    assert!(g.parse("1,").is_err());
}

#[test]
fn one_macro_instantiated_with_different_arguments() {
    let g = grammar(
        r#"
        Start <- List(Num, Comma) ';' List(Word, Comma)
        List(I, D) <- I (D I)*
        Num   <- [0-9]+
        Word  <- [a-z]+
        Comma <- ','
        "#,
    );

    assert!(g.parse("1,2;a,b").is_ok());
    assert!(g.parse("a,b;1,2").is_err());
}

#[test]
fn parameter_used_twice_matches_the_same_expression() {
    let g = grammar(
        r#"
        Start  <- Pair(Num)
        Pair(x) <- x '-' x
        Num    <- [0-9]+
        "#,
    );

    assert!(g.parse("12-34").is_ok());
    assert!(g.parse("12-").is_err());
    assert!(g.parse("-34").is_err());
}

#[test]
fn macro_argument_referencing_an_outer_parameter_substitutes_through() {
    let g = grammar(
        r#"
        Start <- Outer(Num)
        Outer(x) <- Inner(x)
        Inner(y) <- y (',' y)*
        Num   <- [0-9]+
        "#,
    );

    assert_eq!(g.parse("1,2,3").map(|(l, _)| l).ok(), Some(5));
    assert!(g.parse("a").is_err());
}

#[test]
fn macro_bodies_run_rule_actions_of_their_arguments() {
    let mut g = grammar(
        r#"
        Start <- List(Num, Comma)
        List(I, D) <- I (D I)*
        Num   <- < [0-9]+ >
        Comma <- ','
        "#,
    );
    g.set_action("Num", |sv, _| {
        Ok(Value::Int(sv.token().parse::<i64>().expect("digits")))
    });
    g.set_action("List", |sv, _| {
        Ok(Value::Int(sv.vs.iter().filter_map(Value::as_i64).sum()))
    });
    g.set_action("Start", |sv, _| Ok(sv.vs[0].clone()));

    let (_, value) = g.parse("1,2,3").expect("should parse");
    assert_eq!(value.as_i64(), Some(6));
}

#[test]
fn literal_arguments_work_in_macro_calls() {
    let g = grammar(
        r#"
        Start <- Wrapped('<', '>')
        Wrapped(O, C) <- O [a-z]+ C
        "#,
    );

    assert!(g.parse("<abc>").is_ok());
    assert!(g.parse("(abc)").is_err());
}

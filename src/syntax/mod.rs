//! The grammar-text front-end.
//!
//! Turns PEG grammar source into a [`Grammar`]: a recursive-descent parser
//! builds the operator trees ([`parser`]), and a static pass checks the
//! assembled registry for dangling references, duplicate definitions and
//! macro arity mismatches ([`lint`]). The first definition that is not a
//! `%`-directive becomes the start rule; `%whitespace` and `%word`
//! definitions are wired onto it as the implicit skipper and the
//! word-boundary alphabet.

use std::sync::Arc;

use miette::NamedSource;

use crate::errors::{GrammarError, GrammarErrorKind};
use crate::ope::wsp;
use crate::rule::Grammar;

pub(crate) mod lint;
pub(crate) mod parser;

/// Parses PEG grammar text into a grammar. All collected defects are
/// returned together; a grammar is only produced when there are none.
pub fn parse_grammar(src: &str) -> Result<Grammar, Vec<GrammarError>> {
    parse_grammar_named(src, "grammar")
}

/// Like [`parse_grammar`], naming the source for diagnostics.
pub fn parse_grammar_named(src: &str, name: &str) -> Result<Grammar, Vec<GrammarError>> {
    let named = Arc::new(NamedSource::new(name, src.to_string()));
    let defs = parser::parse_definitions(src, &named).map_err(|e| vec![e])?;

    let mut errors = Vec::new();
    let mut grammar = Grammar::default();
    let mut start: Option<String> = None;

    for def in defs {
        if grammar.rule(&def.rule.name).is_some() {
            errors.push(GrammarError::new(
                GrammarErrorKind::DuplicateDefinition(def.rule.name.clone()),
                named.clone(),
                def.name_span,
            ));
            continue;
        }
        if start.is_none() && !def.rule.name.starts_with('%') {
            start = Some(def.rule.name.clone());
        }
        grammar.add_rule(def.rule);
    }

    match start {
        Some(name) => grammar.set_start(name),
        None => errors.push(GrammarError::new(
            GrammarErrorKind::Syntax("no start rule defined".to_string()),
            named.clone(),
            0..0,
        )),
    }

    // The %-directives become the start rule's implicit operators.
    let whitespace_ope = grammar.rule("%whitespace").map(|r| wsp(r.ope.clone()));
    let word_ope = grammar.rule("%word").map(|r| r.ope.clone());
    let start_name = grammar.start().to_string();
    if let Some(rule) = grammar.rule_mut(&start_name) {
        rule.whitespace_ope = whitespace_ope;
        rule.word_ope = word_ope;
    }

    errors.extend(lint::check(&grammar, &named));

    if errors.is_empty() {
        Ok(grammar)
    } else {
        Err(errors)
    }
}

//! Static checks over a constructed grammar.
//!
//! The runtime stays total when a reference dangles or a macro call has the
//! wrong shape; this pass is what turns those defects into grammar errors
//! with spans, before any input is parsed.

use std::sync::Arc;

use miette::NamedSource;

use crate::errors::{GrammarError, GrammarErrorKind};
use crate::ope::Ope;
use crate::rule::Grammar;

pub(crate) fn check(grammar: &Grammar, src: &Arc<NamedSource<String>>) -> Vec<GrammarError> {
    let mut findings: Vec<(usize, GrammarError)> = Vec::new();
    for rule in grammar.rules() {
        walk(&rule.ope, grammar, src, &mut findings);
    }
    findings.sort_by_key(|(pos, _)| *pos);
    findings.into_iter().map(|(_, e)| e).collect()
}

fn walk(
    ope: &Ope,
    grammar: &Grammar,
    src: &Arc<NamedSource<String>>,
    findings: &mut Vec<(usize, GrammarError)>,
) {
    match ope {
        Ope::Reference {
            name,
            args,
            iarg,
            pos,
        } => {
            for arg in args {
                walk(arg, grammar, src, findings);
            }
            if iarg.is_some() {
                return;
            }
            let span = *pos..*pos + name.len();
            match grammar.rule(name) {
                None => findings.push((
                    *pos,
                    GrammarError::new(
                        GrammarErrorKind::UndefinedReference(name.clone()),
                        src.clone(),
                        span,
                    ),
                )),
                Some(rule) => {
                    let expected = rule.parameters.as_ref().map_or(0, Vec::len);
                    if expected != args.len() {
                        findings.push((
                            *pos,
                            GrammarError::new(
                                GrammarErrorKind::ArityMismatch {
                                    name: name.clone(),
                                    expected,
                                    found: args.len(),
                                },
                                src.clone(),
                                span,
                            ),
                        ));
                    }
                }
            }
        }

        Ope::Sequence(children) | Ope::PrioritizedChoice(children) => {
            for child in children {
                walk(child, grammar, src, findings);
            }
        }

        Ope::ZeroOrMore(child)
        | Ope::OneOrMore(child)
        | Ope::Option(child)
        | Ope::AndPredicate(child)
        | Ope::NotPredicate(child)
        | Ope::TokenBoundary(child)
        | Ope::Ignore(child)
        | Ope::Whitespace(child) => walk(child, grammar, src, findings),

        Ope::LiteralString { .. }
        | Ope::CharacterClass { .. }
        | Ope::AnyCharacter
        | Ope::User(_) => {}
    }
}

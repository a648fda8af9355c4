//! The parsing expression operators and their evaluation semantics.
//!
//! An operator graph is an immutable tree of [`Ope`] nodes shared through
//! `Arc`. Evaluation is a depth-first recursion with ordered-choice
//! backtracking: each node consumes input at a byte position and either
//! returns the consumed length or a [`ParseError`] carrying the failure
//! position. All dispatch goes through [`eval`] so tracing and cancellation
//! stay uniform.
//!
//! Operator graphs may be shared between concurrent parses; the only interior
//! mutation is the at-most-once memoization of a literal's word-status, which
//! `OnceLock` makes idempotent under races.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use miette::NamedSource;

use crate::context::Context;
use crate::errors::ParseError;
use crate::rule::Grammar;
use crate::values::{SemanticValues, Token};

/// A caller-supplied matcher: `(input, pos, sv, data) -> consumed length`.
/// The returned length must land on a character boundary of the input.
#[derive(Clone)]
pub struct UserFn(
    pub(crate) Arc<dyn Fn(&str, usize, &mut SemanticValues, &mut dyn Any) -> Result<usize, ParseError> + Send + Sync>,
);

impl fmt::Debug for UserFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserFn")
    }
}

/// One node of a parsing expression.
#[derive(Debug)]
pub enum Ope {
    Sequence(Vec<Arc<Ope>>),
    PrioritizedChoice(Vec<Arc<Ope>>),
    ZeroOrMore(Arc<Ope>),
    OneOrMore(Arc<Ope>),
    Option(Arc<Ope>),
    AndPredicate(Arc<Ope>),
    NotPredicate(Arc<Ope>),
    LiteralString {
        lit: String,
        /// Whether the literal itself matches the word operator; decided on
        /// first use, at most once per node even across shared parses.
        is_word: OnceLock<bool>,
    },
    CharacterClass {
        /// The class as written, kept for error reporting.
        chars: String,
        singles: Vec<char>,
        ranges: Vec<(char, char)>,
    },
    AnyCharacter,
    TokenBoundary(Arc<Ope>),
    Ignore(Arc<Ope>),
    Whitespace(Arc<Ope>),
    User(UserFn),
    Reference {
        name: String,
        args: Vec<Arc<Ope>>,
        /// Index into the enclosing macro's argument list when this reference
        /// names a parameter rather than a rule.
        iarg: Option<usize>,
        /// Byte position of the reference in the grammar source, for lint.
        pos: usize,
    },
}

impl Ope {
    /// The variant name, used by tracers and not-predicate errors.
    pub fn label(&self) -> &'static str {
        match self {
            Ope::Sequence(_) => "Sequence",
            Ope::PrioritizedChoice(_) => "PrioritizedChoice",
            Ope::ZeroOrMore(_) => "ZeroOrMore",
            Ope::OneOrMore(_) => "OneOrMore",
            Ope::Option(_) => "Option",
            Ope::AndPredicate(_) => "AndPredicate",
            Ope::NotPredicate(_) => "NotPredicate",
            Ope::LiteralString { .. } => "LiteralString",
            Ope::CharacterClass { .. } => "CharacterClass",
            Ope::AnyCharacter => "AnyCharacter",
            Ope::TokenBoundary(_) => "TokenBoundary",
            Ope::Ignore(_) => "Ignore",
            Ope::Whitespace(_) => "Whitespace",
            Ope::User(_) => "User",
            Ope::Reference { .. } => "Reference",
        }
    }

    /// Matches this operator against `s` from position 0, outside any rule.
    ///
    /// References do not resolve here (there is no grammar in scope); this is
    /// the entry point for operator-level tests and tooling.
    pub fn parse(&self, s: &str) -> Result<usize, ParseError> {
        self.parse_with(s, &mut ()).map(|(l, _)| l)
    }

    /// Like [`Ope::parse`], but threads user data and returns the semantic
    /// values frame the match populated.
    pub fn parse_with(
        &self,
        s: &str,
        dt: &mut dyn Any,
    ) -> Result<(usize, SemanticValues), ParseError> {
        let grammar = Grammar::default();
        let ss: Arc<str> = Arc::from(s);
        let src = Arc::new(NamedSource::new("input", s.to_string()));
        let mut c = Context::new(ss.clone(), src, &grammar);
        let mut sv = SemanticValues::new(ss);
        let l = eval(self, s, 0, &mut sv, &mut c, dt)?;
        Ok((l, sv))
    }
}

// ============================================================================
// CONSTRUCTORS
// ============================================================================

pub fn seq(opes: Vec<Arc<Ope>>) -> Arc<Ope> {
    Arc::new(Ope::Sequence(opes))
}

pub fn cho(opes: Vec<Arc<Ope>>) -> Arc<Ope> {
    Arc::new(Ope::PrioritizedChoice(opes))
}

pub fn zom(ope: Arc<Ope>) -> Arc<Ope> {
    Arc::new(Ope::ZeroOrMore(ope))
}

pub fn oom(ope: Arc<Ope>) -> Arc<Ope> {
    Arc::new(Ope::OneOrMore(ope))
}

pub fn opt(ope: Arc<Ope>) -> Arc<Ope> {
    Arc::new(Ope::Option(ope))
}

pub fn apd(ope: Arc<Ope>) -> Arc<Ope> {
    Arc::new(Ope::AndPredicate(ope))
}

pub fn npd(ope: Arc<Ope>) -> Arc<Ope> {
    Arc::new(Ope::NotPredicate(ope))
}

pub fn lit(s: &str) -> Arc<Ope> {
    Arc::new(Ope::LiteralString {
        lit: s.to_string(),
        is_word: OnceLock::new(),
    })
}

/// Builds a character class from its textual form: `-` between two characters
/// denotes an inclusive range, a stray `-` is a literal.
pub fn cls(chars: &str) -> Arc<Ope> {
    let cs: Vec<char> = chars.chars().collect();
    let mut singles = Vec::new();
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < cs.len() {
        if i + 2 < cs.len() && cs[i + 1] == '-' {
            ranges.push((cs[i], cs[i + 2]));
            i += 3;
        } else {
            singles.push(cs[i]);
            i += 1;
        }
    }
    Arc::new(Ope::CharacterClass {
        chars: chars.to_string(),
        singles,
        ranges,
    })
}

pub fn dot() -> Arc<Ope> {
    Arc::new(Ope::AnyCharacter)
}

pub fn tok(ope: Arc<Ope>) -> Arc<Ope> {
    Arc::new(Ope::TokenBoundary(ope))
}

pub fn ign(ope: Arc<Ope>) -> Arc<Ope> {
    Arc::new(Ope::Ignore(ope))
}

/// The whitespace skipper: an ignored child behind a reentrancy guard.
pub fn wsp(ope: Arc<Ope>) -> Arc<Ope> {
    Arc::new(Ope::Whitespace(ign(ope)))
}

pub fn usr<F>(f: F) -> Arc<Ope>
where
    F: Fn(&str, usize, &mut SemanticValues, &mut dyn Any) -> Result<usize, ParseError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(Ope::User(UserFn(Arc::new(f))))
}

/// A reference to a named rule.
pub fn ref_(name: &str) -> Arc<Ope> {
    reference(name, Vec::new(), None, 0)
}

/// A reference to a parameterized rule, with the arguments of the call.
pub fn ref_args(name: &str, args: Vec<Arc<Ope>>) -> Arc<Ope> {
    reference(name, args, None, 0)
}

pub(crate) fn reference(
    name: &str,
    args: Vec<Arc<Ope>>,
    iarg: Option<usize>,
    pos: usize,
) -> Arc<Ope> {
    Arc::new(Ope::Reference {
        name: name.to_string(),
        args,
        iarg,
        pos,
    })
}

// ============================================================================
// EVALUATION
// ============================================================================

/// Uniform dispatch: cancellation check, tracer-enter, core match,
/// tracer-leave. Every operator invocation routes through here.
pub(crate) fn eval(
    o: &Ope,
    s: &str,
    p: usize,
    sv: &mut SemanticValues,
    c: &mut Context,
    dt: &mut dyn Any,
) -> Result<usize, ParseError> {
    if c.is_cancelled() {
        c.set_error_pos(p);
        return Err(c.mismatch(p, vec!["parse cancelled".to_string()], 0));
    }

    if let Some(tracer) = c.tracer_enter.clone() {
        tracer(o.label(), s, sv, dt, p);
    }

    let result = eval_core(o, s, p, sv, c, dt);

    if let Some(tracer) = c.tracer_leave.clone() {
        let l = result.as_ref().map_or(0, |l| *l);
        tracer(o.label(), s, sv, dt, p, l);
    }

    result
}

fn eval_core(
    o: &Ope,
    s: &str,
    p: usize,
    sv: &mut SemanticValues,
    c: &mut Context,
    dt: &mut dyn Any,
) -> Result<usize, ParseError> {
    match o {
        Ope::Sequence(opes) => {
            let mut l = 0;
            for ope in opes {
                let n = eval(ope, s, p + l, sv, c, dt)?;
                l += n;
            }
            Ok(l)
        }

        Ope::PrioritizedChoice(opes) => {
            let mut errs = Vec::with_capacity(opes.len());
            for (id, ope) in opes.iter().enumerate() {
                // Fresh frame per alternative; captures of failed speculative
                // paths are discarded with it.
                let mut chv = c.new_frame();
                match eval(ope, s, p, &mut chv, c, dt) {
                    Ok(l) => {
                        sv.vs.append(&mut chv.vs);
                        sv.ts.append(&mut chv.ts);
                        sv.pos = chv.pos;
                        sv.matched_len = chv.matched_len;
                        sv.choice = id;
                        return Ok(l);
                    }
                    Err(e) => errs.push(e),
                }
            }
            if errs.is_empty() {
                c.set_error_pos(p);
                return Err(c.mismatch(p, vec![o.label().to_string()], 0));
            }
            Err(ParseError::choice(errs))
        }

        Ope::ZeroOrMore(ope) => {
            let save_error_pos = c.error_pos;
            let mut l = 0;
            while p + l < s.len() {
                let save_vs = sv.vs.len();
                let save_ts = sv.ts.len();
                match eval(ope, s, p + l, sv, c, dt) {
                    Ok(n) => l += n,
                    Err(_) => {
                        sv.vs.truncate(save_vs);
                        sv.ts.truncate(save_ts);
                        c.error_pos = save_error_pos;
                        break;
                    }
                }
            }
            Ok(l)
        }

        Ope::OneOrMore(ope) => {
            // The first attempt is unguarded: its failure is the failure of
            // the whole repetition and its error position must survive.
            let mut l = eval(ope, s, p, sv, c, dt)?;
            let save_error_pos = c.error_pos;
            while p + l < s.len() {
                let save_vs = sv.vs.len();
                let save_ts = sv.ts.len();
                match eval(ope, s, p + l, sv, c, dt) {
                    Ok(n) => l += n,
                    Err(_) => {
                        sv.vs.truncate(save_vs);
                        sv.ts.truncate(save_ts);
                        c.error_pos = save_error_pos;
                        break;
                    }
                }
            }
            Ok(l)
        }

        Ope::Option(ope) => {
            let save_error_pos = c.error_pos;
            let save_vs = sv.vs.len();
            let save_ts = sv.ts.len();
            match eval(ope, s, p, sv, c, dt) {
                Ok(l) => Ok(l),
                Err(_) => {
                    sv.vs.truncate(save_vs);
                    sv.ts.truncate(save_ts);
                    c.error_pos = save_error_pos;
                    Ok(0)
                }
            }
        }

        Ope::AndPredicate(ope) => {
            let mut chv = c.new_frame();
            eval(ope, s, p, &mut chv, c, dt)?;
            Ok(0)
        }

        Ope::NotPredicate(ope) => {
            let save_error_pos = c.error_pos;
            let mut chv = c.new_frame();
            match eval(ope, s, p, &mut chv, c, dt) {
                Ok(n) => {
                    c.set_error_pos(p);
                    Err(c.mismatch(p, vec![format!("Not {}", ope.label())], n))
                }
                Err(_) => {
                    c.error_pos = save_error_pos;
                    Ok(0)
                }
            }
        }

        Ope::LiteralString { lit, is_word } => {
            if p + lit.len() > s.len() || !s.as_bytes()[p..].starts_with(lit.as_bytes()) {
                c.set_error_pos(p);
                return Err(c.mismatch(p, vec![lit.clone()], lit.len()));
            }
            let mut l = lit.len();

            if let Some(word) = c.word_ope.clone() {
                let word_literal = *is_word.get_or_init(|| {
                    // Does the literal itself start a word? Probed against the
                    // literal's own text, outside this parse's error state.
                    let mut probe = c.probe_over(lit);
                    let mut chv = probe.new_frame();
                    eval(&word, lit, 0, &mut chv, &mut probe, &mut ()).is_ok()
                });
                if word_literal {
                    // A word literal must not be followed by another word
                    // character. The check runs in a fresh context, with
                    // throwaway user data, so a successful continuation can
                    // neither advance error_pos nor leak side effects.
                    let mut probe = c.probe();
                    let mut chv = probe.new_frame();
                    if let Ok(n) = eval(&word, s, p + l, &mut chv, &mut probe, &mut ()) {
                        return Err(c.mismatch(p + l, vec![format!("Not {}", word.label())], n));
                    }
                }
            }

            if !c.in_token {
                if let Some(ws) = c.whitespace_ope.clone() {
                    l += eval(&ws, s, p + l, sv, c, dt)?;
                }
            }
            Ok(l)
        }

        Ope::CharacterClass {
            chars,
            singles,
            ranges,
        } => {
            let Some(ch) = s[p..].chars().next() else {
                c.set_error_pos(p);
                return Err(c.mismatch(p, vec![chars.clone()], 0));
            };
            if singles.contains(&ch) || ranges.iter().any(|&(lo, hi)| lo <= ch && ch <= hi) {
                Ok(ch.len_utf8())
            } else {
                c.set_error_pos(p);
                Err(c.mismatch(p, vec![chars.clone()], 1))
            }
        }

        Ope::AnyCharacter => match s[p..].chars().next() {
            Some(ch) => Ok(ch.len_utf8()),
            None => {
                c.set_error_pos(p);
                Err(c.mismatch(p, vec!["Anything".to_string()], 0))
            }
        },

        Ope::TokenBoundary(ope) => {
            let saved = c.in_token;
            c.in_token = true;
            let result = eval(ope, s, p, sv, c, dt);
            c.in_token = saved;

            let mut l = result?;
            sv.ts.push(Token { pos: p, len: l });
            // Trailing whitespace is skipped, but stays outside the token.
            if let Some(ws) = c.whitespace_ope.clone() {
                l += eval(&ws, s, p + l, sv, c, dt)?;
            }
            Ok(l)
        }

        Ope::Ignore(ope) => {
            let mut chv = c.new_frame();
            eval(ope, s, p, &mut chv, c, dt)
        }

        Ope::Whitespace(ope) => {
            if c.in_whitespace {
                return Ok(0);
            }
            c.in_whitespace = true;
            let result = eval(ope, s, p, sv, c, dt);
            c.in_whitespace = false;
            result
        }

        Ope::User(f) => (f.0)(s, p, sv, dt),

        Ope::Reference {
            name,
            args,
            iarg,
            pos: _,
        } => {
            if let Some(i) = *iarg {
                // Parameter of the enclosing macro, bound at the call site.
                let arg = c.top_args().get(i).cloned();
                match arg {
                    Some(arg) => eval(&arg, s, p, sv, c, dt),
                    None => {
                        c.set_error_pos(p);
                        Err(c.mismatch(p, vec![name.clone()], 0))
                    }
                }
            } else {
                let grammar = c.grammar;
                match grammar.rule(name) {
                    Some(rule) if rule.parameters.is_none() => rule.invoke(s, p, sv, c, dt),
                    Some(rule) => {
                        // Macro call: rewrite the call-site arguments against
                        // the caller's argument list, then bring them into
                        // scope for the rule body.
                        let substituted: Vec<Arc<Ope>> = {
                            let caller = c.top_args();
                            args.iter().map(|a| substitute(a, caller)).collect()
                        };
                        c.push_args(substituted);
                        let result = rule.invoke(s, p, sv, c, dt);
                        c.pop_args();
                        result
                    }
                    None => {
                        c.set_error_pos(p);
                        Err(c.mismatch(p, vec![name.clone()], 0))
                    }
                }
            }
        }
    }
}

// ============================================================================
// MACRO ARGUMENT SUBSTITUTION
// ============================================================================

/// Rewrites one argument tree for a macro call: parameter references are
/// replaced with the corresponding operator from the caller's argument list.
/// Subtrees containing no parameter references are shared, not copied.
pub(crate) fn substitute(ope: &Arc<Ope>, args: &[Arc<Ope>]) -> Arc<Ope> {
    match &**ope {
        Ope::Reference {
            iarg: Some(i),
            ..
        } => args.get(*i).cloned().unwrap_or_else(|| ope.clone()),

        Ope::Reference {
            name,
            args: call_args,
            iarg: None,
            pos,
        } => match rewrite_all(call_args, args) {
            Some(new_args) => reference(name, new_args, None, *pos),
            None => ope.clone(),
        },

        Ope::Sequence(children) => match rewrite_all(children, args) {
            Some(new) => Arc::new(Ope::Sequence(new)),
            None => ope.clone(),
        },

        Ope::PrioritizedChoice(children) => match rewrite_all(children, args) {
            Some(new) => Arc::new(Ope::PrioritizedChoice(new)),
            None => ope.clone(),
        },

        Ope::ZeroOrMore(child) => rewrite_one(ope, child, args, Ope::ZeroOrMore),
        Ope::OneOrMore(child) => rewrite_one(ope, child, args, Ope::OneOrMore),
        Ope::Option(child) => rewrite_one(ope, child, args, Ope::Option),
        Ope::AndPredicate(child) => rewrite_one(ope, child, args, Ope::AndPredicate),
        Ope::NotPredicate(child) => rewrite_one(ope, child, args, Ope::NotPredicate),
        Ope::TokenBoundary(child) => rewrite_one(ope, child, args, Ope::TokenBoundary),
        Ope::Ignore(child) => rewrite_one(ope, child, args, Ope::Ignore),
        Ope::Whitespace(child) => rewrite_one(ope, child, args, Ope::Whitespace),

        Ope::LiteralString { .. }
        | Ope::CharacterClass { .. }
        | Ope::AnyCharacter
        | Ope::User(_) => ope.clone(),
    }
}

fn rewrite_all(children: &[Arc<Ope>], args: &[Arc<Ope>]) -> Option<Vec<Arc<Ope>>> {
    let new: Vec<Arc<Ope>> = children.iter().map(|c| substitute(c, args)).collect();
    if new.iter().zip(children).all(|(a, b)| Arc::ptr_eq(a, b)) {
        None
    } else {
        Some(new)
    }
}

fn rewrite_one(
    ope: &Arc<Ope>,
    child: &Arc<Ope>,
    args: &[Arc<Ope>],
    make: fn(Arc<Ope>) -> Ope,
) -> Arc<Ope> {
    let new = substitute(child, args);
    if Arc::ptr_eq(&new, child) {
        ope.clone()
    } else {
        Arc::new(make(new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_replaces_parameter_references() {
        let param = reference("x", Vec::new(), Some(0), 0);
        let tree = seq(vec![lit("("), param, lit(")")]);
        let arg = lit("inner");

        let rewritten = substitute(&tree, &[arg.clone()]);
        let Ope::Sequence(children) = &*rewritten else {
            panic!("expected a sequence");
        };
        assert!(Arc::ptr_eq(&children[1], &arg));
    }

    #[test]
    fn substitute_shares_parameter_free_subtrees() {
        let tree = seq(vec![lit("a"), zom(cls("0-9"))]);
        let rewritten = substitute(&tree, &[lit("unused")]);
        assert!(Arc::ptr_eq(&rewritten, &tree));
    }

    #[test]
    fn substitute_descends_into_reference_arguments() {
        let param = reference("x", Vec::new(), Some(0), 0);
        let call = reference("Inner", vec![param], None, 0);
        let arg = lit("deep");

        let rewritten = substitute(&call, &[arg.clone()]);
        let Ope::Reference { args, .. } = &*rewritten else {
            panic!("expected a reference");
        };
        assert!(Arc::ptr_eq(&args[0], &arg));
    }
}

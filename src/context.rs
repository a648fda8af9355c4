//! Ambient state threaded through one parse.
//!
//! A [`Context`] belongs to exactly one parse. Operator evaluation threads it
//! by `&mut` alongside the current semantic-values frame; nothing in here is
//! global or thread-local, so concurrent parses over a shared grammar each
//! own their context.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use miette::NamedSource;

use crate::errors::ParseError;
use crate::ope::Ope;
use crate::rule::Grammar;
use crate::values::SemanticValues;

/// Observer invoked before every operator dispatch with
/// `(label, input, sv, data, pos)`.
pub type TracerEnter = Arc<dyn Fn(&str, &str, &SemanticValues, &mut dyn Any, usize) + Send + Sync>;

/// Observer invoked after every operator dispatch with
/// `(label, input, sv, data, pos, length)`; `length` is 0 on failure.
pub type TracerLeave =
    Arc<dyn Fn(&str, &str, &SemanticValues, &mut dyn Any, usize, usize) + Send + Sync>;

pub(crate) struct Context<'g> {
    /// The input, shared with every frame created during this parse.
    pub(crate) ss: Arc<str>,
    /// Named source handle cloned into every error.
    pub(crate) src: Arc<NamedSource<String>>,
    /// Rule registry used to resolve references.
    pub(crate) grammar: &'g Grammar,
    /// Furthest position at which a failure has been observed. Monotonic,
    /// except across the explicit save/restore scopes of the backtracking
    /// operators.
    pub(crate) error_pos: Option<usize>,
    /// Failure annotation installed by a failing rule that carries one.
    pub(crate) message: Option<(usize, String)>,
    /// One entry per active macro call: the substituted arguments in scope.
    pub(crate) args_stack: Vec<Vec<Arc<Ope>>>,
    /// True inside a token boundary; suppresses per-literal whitespace skips.
    pub(crate) in_token: bool,
    /// Reentrancy guard for the whitespace operator.
    pub(crate) in_whitespace: bool,
    pub(crate) whitespace_ope: Option<Arc<Ope>>,
    pub(crate) word_ope: Option<Arc<Ope>>,
    pub(crate) tracer_enter: Option<TracerEnter>,
    pub(crate) tracer_leave: Option<TracerLeave>,
    pub(crate) cancel: Option<Arc<AtomicBool>>,
}

impl<'g> Context<'g> {
    pub(crate) fn new(ss: Arc<str>, src: Arc<NamedSource<String>>, grammar: &'g Grammar) -> Self {
        Self {
            ss,
            src,
            grammar,
            error_pos: None,
            message: None,
            args_stack: Vec::new(),
            in_token: false,
            in_whitespace: false,
            whitespace_ope: None,
            word_ope: None,
            tracer_enter: None,
            tracer_leave: None,
            cancel: None,
        }
    }

    /// A bare context over the same input, used for evaluations whose error
    /// state must not leak into this parse (the literal word-boundary check).
    pub(crate) fn probe(&self) -> Context<'g> {
        Context::new(self.ss.clone(), self.src.clone(), self.grammar)
    }

    /// A bare context over foreign text, used to test whether a literal
    /// itself matches the word operator.
    pub(crate) fn probe_over(&self, text: &str) -> Context<'g> {
        let src = Arc::new(NamedSource::new("probe", text.to_string()));
        Context::new(Arc::from(text), src, self.grammar)
    }

    /// Advances the furthest-failure cursor; never moves it backwards.
    pub(crate) fn set_error_pos(&mut self, p: usize) {
        if self.error_pos.map_or(true, |ep| ep < p) {
            self.error_pos = Some(p);
        }
    }

    /// Installs a rule failure message, keeping the furthest one.
    pub(crate) fn set_message(&mut self, pos: usize, message: String) {
        if self.message.as_ref().map_or(true, |(mp, _)| *mp <= pos) {
            self.message = Some((pos, message));
        }
    }

    pub(crate) fn mismatch(&self, pos: usize, expected: Vec<String>, length: usize) -> ParseError {
        ParseError::mismatch_in(self.src.clone(), pos, expected, length)
    }

    pub(crate) fn push_args(&mut self, args: Vec<Arc<Ope>>) {
        self.args_stack.push(args);
    }

    pub(crate) fn pop_args(&mut self) {
        self.args_stack.pop();
    }

    pub(crate) fn top_args(&self) -> &[Arc<Ope>] {
        self.args_stack.last().map_or(&[], Vec::as_slice)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    pub(crate) fn new_frame(&self) -> SemanticValues {
        SemanticValues::new(self.ss.clone())
    }
}

//! Named productions and the grammar registry.
//!
//! A [`Grammar`] maps rule names to [`Rule`]s and designates the start rule.
//! It is the single source of truth for reference resolution: references in
//! operator trees carry names, resolved against the registry at parse time,
//! so rule graphs may be arbitrarily recursive without ownership cycles.
//! Grammars are immutable during parsing and may be shared across concurrent
//! parses.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use miette::NamedSource;

use crate::context::{Context, TracerEnter, TracerLeave};
use crate::errors::ParseError;
use crate::ope::{eval, Ope};
use crate::values::{SemanticValues, Value};

/// A semantic callback attached to a rule: receives the rule's frame and the
/// user data, produces the value pushed onto the caller's frame.
pub type Action = Arc<dyn Fn(&SemanticValues, &mut dyn Any) -> Result<Value, ParseError> + Send + Sync>;

/// A named production.
#[derive(Clone)]
pub struct Rule {
    pub name: String,
    /// Parameter names when this rule is a macro; `None` for plain rules.
    pub parameters: Option<Vec<String>>,
    pub ope: Arc<Ope>,
    pub action: Option<Action>,
    /// Installed on the context when this rule fails; surfaces as help text
    /// on the reported error.
    pub error_message: Option<String>,
    /// Implicit whitespace skipper; only meaningful on the start rule.
    pub whitespace_ope: Option<Arc<Ope>>,
    /// Word-continuation alphabet for literal boundary checks; only
    /// meaningful on the start rule.
    pub word_ope: Option<Arc<Ope>>,
}

impl Rule {
    pub fn new(name: impl Into<String>, ope: Arc<Ope>) -> Self {
        Self {
            name: name.into(),
            parameters: None,
            ope,
            action: None,
            error_message: None,
            whitespace_ope: None,
            word_ope: None,
        }
    }

    /// A macro rule: `parameters` bind positionally at each call site.
    pub fn parameterized(
        name: impl Into<String>,
        parameters: Vec<String>,
        ope: Arc<Ope>,
    ) -> Self {
        Self {
            parameters: Some(parameters),
            ..Self::new(name, ope)
        }
    }

    /// Parses `s` from position 0 with this rule as the start rule,
    /// requiring the entire input to be consumed.
    pub fn parse(&self, grammar: &Grammar, s: &str) -> Result<(usize, Value), ParseError> {
        self.parse_with(grammar, s, "input", &mut ())
    }

    /// Like [`Rule::parse`], with a source name for diagnostics and user
    /// data threaded to actions, user operators and tracers.
    pub fn parse_with(
        &self,
        grammar: &Grammar,
        s: &str,
        name: &str,
        dt: &mut dyn Any,
    ) -> Result<(usize, Value), ParseError> {
        let ss: Arc<str> = Arc::from(s);
        let src = Arc::new(NamedSource::new(name, s.to_string()));
        let mut c = Context::new(ss.clone(), src, grammar);
        c.whitespace_ope = self.whitespace_ope.clone();
        c.word_ope = self.word_ope.clone();
        c.tracer_enter = grammar.tracer_enter.clone();
        c.tracer_leave = grammar.tracer_leave.clone();
        c.cancel = grammar.cancel.clone();

        let mut sv = SemanticValues::new(ss);

        // Leading whitespace is consumed before the rule body.
        let mut l = 0;
        if let Some(ws) = c.whitespace_ope.clone() {
            match eval(&ws, s, 0, &mut sv, &mut c, dt) {
                Ok(n) => l = n,
                Err(e) => return Err(e.with_help(message_of(&c))),
            }
        }

        match self.invoke(s, l, &mut sv, &mut c, dt) {
            Ok(n) => {
                l += n;
                // The match may stop short of the end as long as everything
                // left over is whitespace.
                if l != s.len() {
                    if let Some(ws) = c.whitespace_ope.clone() {
                        if let Ok(n) = eval(&ws, s, l, &mut sv, &mut c, dt) {
                            l += n;
                        }
                    }
                }
                if l != s.len() {
                    let pos = c.error_pos.map_or(l, |ep| ep.max(l));
                    let err = c
                        .mismatch(pos, vec!["end of input".to_string()], 0)
                        .with_help(message_of(&c));
                    return Err(err);
                }
                let value = sv.vs.into_iter().next().unwrap_or(Value::Nil);
                Ok((l, value))
            }
            Err(e) => Err(e.with_help(message_of(&c))),
        }
    }

    /// One rule invocation: fresh frame, body, action, value to the caller.
    pub(crate) fn invoke(
        &self,
        s: &str,
        p: usize,
        sv: &mut SemanticValues,
        c: &mut Context,
        dt: &mut dyn Any,
    ) -> Result<usize, ParseError> {
        let mut chv = c.new_frame();
        match eval(&self.ope, s, p, &mut chv, c, dt) {
            Ok(l) => {
                chv.pos = p;
                chv.matched_len = l;
                let value = match &self.action {
                    Some(action) => action(&chv, dt)?,
                    None if chv.vs.len() == 1 => chv.vs.pop().expect("length checked"),
                    None => Value::List(std::mem::take(&mut chv.vs)),
                };
                sv.vs.push(value);
                Ok(l)
            }
            Err(e) => {
                if let Some(message) = &self.error_message {
                    c.set_message(p, message.clone());
                }
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("ope", &self.ope.label())
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

/// The rule registry plus parse-wide configuration: start rule, tracer
/// hooks, and the cooperative cancel flag.
#[derive(Default, Clone)]
pub struct Grammar {
    rules: HashMap<String, Rule>,
    start: String,
    pub tracer_enter: Option<TracerEnter>,
    pub tracer_leave: Option<TracerLeave>,
    /// Checked at every operator dispatch; raising it makes the in-flight
    /// parse unwind with a failure.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Grammar {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            ..Self::default()
        }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.insert(rule.name.clone(), rule);
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn rule_mut(&mut self, name: &str) -> Option<&mut Rule> {
        self.rules.get_mut(name)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn set_start(&mut self, name: impl Into<String>) {
        self.start = name.into();
    }

    /// Attaches an action to a named rule. Returns false when no such rule
    /// exists.
    pub fn set_action<F>(&mut self, name: &str, action: F) -> bool
    where
        F: Fn(&SemanticValues, &mut dyn Any) -> Result<Value, ParseError> + Send + Sync + 'static,
    {
        match self.rules.get_mut(name) {
            Some(rule) => {
                rule.action = Some(Arc::new(action));
                true
            }
            None => false,
        }
    }

    /// Parses `s` with the start rule, requiring full consumption.
    pub fn parse(&self, s: &str) -> Result<(usize, Value), ParseError> {
        self.parse_with(s, "input", &mut ())
    }

    pub fn parse_with(
        &self,
        s: &str,
        name: &str,
        dt: &mut dyn Any,
    ) -> Result<(usize, Value), ParseError> {
        match self.rule(&self.start) {
            Some(rule) => rule.parse_with(self, s, name, dt),
            None => {
                let src = Arc::new(NamedSource::new(name, s.to_string()));
                Err(ParseError::mismatch_in(
                    src,
                    0,
                    vec![format!("start rule '{}'", self.start)],
                    0,
                ))
            }
        }
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Grammar")
            .field("start", &self.start)
            .field("rules", &names)
            .finish()
    }
}

fn message_of(c: &Context) -> Option<String> {
    c.message.as_ref().map(|(_, m)| m.clone())
}

//! Error carriers for the engine.
//!
//! Two families exist. [`ParseError`] describes a failed match of input text:
//! either a single mismatch at a position, or the aggregate of every
//! alternative a prioritized choice attempted. [`GrammarError`] describes a
//! defect in the grammar itself, found by the front-end or the lint pass.
//!
//! Both carry a shared handle to their named source and implement
//! `miette::Diagnostic`, so the CLI renders them as rich reports;
//! [`ParseError::render`] produces the classic caret form for plain-text
//! consumers.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

/// A failed match. `pos`, `line` and `col` locate the failure; `help`
/// carries a rule-installed message when one was in scope.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub pos: usize,
    pub line: usize,
    pub col: usize,
    pub help: Option<String>,
    src: Arc<NamedSource<String>>,
}

#[derive(Debug, Clone)]
pub enum ParseErrorKind {
    /// A terminal, a not-predicate, or an unresolved reference did not match.
    /// `length` is the caret width used when rendering.
    Mismatch { expected: Vec<String>, length: usize },
    /// Every alternative of a prioritized choice failed.
    Choice { alternatives: Vec<ParseError> },
}

impl ParseError {
    /// Builds a mismatch error over a standalone input. Intended for user
    /// operators and actions; the engine threads its own source handle.
    pub fn mismatch(input: &str, pos: usize, expected: Vec<String>, length: usize) -> Self {
        let src = Arc::new(NamedSource::new("input", input.to_string()));
        Self::mismatch_in(src, pos, expected, length)
    }

    pub(crate) fn mismatch_in(
        src: Arc<NamedSource<String>>,
        pos: usize,
        expected: Vec<String>,
        length: usize,
    ) -> Self {
        let (line, col) = line_col(src.inner(), pos);
        Self {
            kind: ParseErrorKind::Mismatch { expected, length },
            pos,
            line,
            col,
            help: None,
            src,
        }
    }

    /// Aggregates the child errors of a failed choice. The aggregate is
    /// located at the furthest child position.
    pub(crate) fn choice(alternatives: Vec<ParseError>) -> Self {
        debug_assert!(!alternatives.is_empty());
        let furthest = alternatives
            .iter()
            .max_by_key(|e| e.pos)
            .expect("choice error with no alternatives");
        let (pos, line, col) = (furthest.pos, furthest.line, furthest.col);
        let src = furthest.src.clone();
        Self {
            kind: ParseErrorKind::Choice { alternatives },
            pos,
            line,
            col,
            help: None,
            src,
        }
    }

    pub(crate) fn with_help(mut self, help: Option<String>) -> Self {
        self.help = help;
        self
    }

    fn expected_label(&self) -> String {
        match &self.kind {
            ParseErrorKind::Mismatch { expected, .. } => match expected.len() {
                0 => "expected nothing".to_string(),
                1 => format!("expected \"{}\"", expected[0]),
                _ => format!("expected one of \"{}\"", expected.join("\", \"")),
            },
            ParseErrorKind::Choice { .. } => "no alternative matched here".to_string(),
        }
    }

    /// Renders the classic plain-text caret form:
    ///
    /// ```text
    /// line:col  <line text>
    /// ----------^^^
    /// Expected "<e>", instead got "<actual>".
    /// ```
    ///
    /// Choice aggregates render each attempted alternative under a divider.
    /// `Display` stays a one-line summary; this is the long form.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        use std::fmt::Write;
        match &self.kind {
            ParseErrorKind::Mismatch { expected, length } => {
                let s = self.src.inner().as_str();
                let (line_start, line_end) = line_bounds(s, self.pos);
                let prefix = format!("{}:{}  ", self.line, self.col);

                let _ = writeln!(out);
                let _ = writeln!(out, "{}{}", prefix, &s[line_start..line_end]);
                let _ = writeln!(
                    out,
                    "{}{}",
                    "-".repeat(prefix.len() + self.col - 1),
                    "^".repeat(*length)
                );
                let _ = writeln!(out);
                let _ = writeln!(
                    out,
                    "Expected {}, instead got \"{}\".",
                    quoted_list(expected),
                    self.actual()
                );
            }
            ParseErrorKind::Choice { alternatives } => {
                let _ = writeln!(out, "no alternative matched; attempts were:");
                let _ = writeln!(out, "===");
                for e in alternatives {
                    e.render_into(out);
                }
                let _ = writeln!(out, "===");
            }
        }
    }

    /// The slice of input under the carets, clipped to the input end.
    fn actual(&self) -> &str {
        let s = self.src.inner().as_str();
        let length = match &self.kind {
            ParseErrorKind::Mismatch { length, .. } => *length,
            ParseErrorKind::Choice { .. } => 0,
        };
        let end = ceil_char_boundary(s, (self.pos + length).min(s.len()));
        &s[self.pos.min(end)..end]
    }
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::Mismatch { expected, .. } => {
                write!(
                    f,
                    "{}:{} expected {}, instead got \"{}\"",
                    self.line,
                    self.col,
                    quoted_list(expected),
                    self.actual()
                )
            }
            ParseErrorKind::Choice { alternatives } => {
                write!(
                    f,
                    "{}:{} no alternative matched ({} attempts)",
                    self.line,
                    self.col,
                    alternatives.len()
                )
            }
        }
    }
}

fn quoted_list(expected: &[String]) -> String {
    match expected.len() {
        0 => "nothing".to_string(),
        1 => format!("\"{}\"", expected[0]),
        _ => format!("one of \"{}\"", expected.join("\", \"")),
    }
}

impl Diagnostic for ParseError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self.kind {
            ParseErrorKind::Mismatch { .. } => "pegra::parse::mismatch",
            ParseErrorKind::Choice { .. } => "pegra::parse::choice",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let s = self.src.inner().as_str();
        let len = match &self.kind {
            ParseErrorKind::Mismatch { length, .. } => {
                ceil_char_boundary(s, (self.pos + length).min(s.len())) - self.pos
            }
            ParseErrorKind::Choice { .. } => 0,
        };
        let span = SourceSpan::from(self.pos..self.pos + len);
        let labels = vec![LabeledSpan::new_with_span(Some(self.expected_label()), span)];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.src)
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        match &self.kind {
            ParseErrorKind::Choice { alternatives } => {
                Some(Box::new(alternatives.iter().map(|e| e as &dyn Diagnostic)))
            }
            ParseErrorKind::Mismatch { .. } => None,
        }
    }
}

/// A defect in the grammar itself: bad grammar syntax, a duplicate rule, a
/// dangling reference, or a macro call with the wrong number of arguments.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct GrammarError {
    pub kind: GrammarErrorKind,
    src: Arc<NamedSource<String>>,
    span: SourceSpan,
}

#[derive(Debug, Clone, Error)]
pub enum GrammarErrorKind {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("duplicate definition of rule '{0}'")]
    DuplicateDefinition(String),
    #[error("reference to undefined rule '{0}'")]
    UndefinedReference(String),
    #[error("'{name}' takes {expected} argument(s), but {found} were supplied")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
}

impl GrammarError {
    pub(crate) fn new(
        kind: GrammarErrorKind,
        src: Arc<NamedSource<String>>,
        span: std::ops::Range<usize>,
    ) -> Self {
        Self {
            kind,
            src,
            span: SourceSpan::from(span),
        }
    }
}

impl Diagnostic for GrammarError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self.kind {
            GrammarErrorKind::Syntax(_) => "pegra::grammar::syntax",
            GrammarErrorKind::DuplicateDefinition(_) => "pegra::grammar::duplicate_definition",
            GrammarErrorKind::UndefinedReference(_) => "pegra::grammar::undefined_reference",
            GrammarErrorKind::ArityMismatch { .. } => "pegra::grammar::arity_mismatch",
        };
        Some(Box::new(code))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let label = match &self.kind {
            GrammarErrorKind::Syntax(_) => "here",
            GrammarErrorKind::DuplicateDefinition(_) => "redefined here",
            GrammarErrorKind::UndefinedReference(_) => "not defined anywhere",
            GrammarErrorKind::ArityMismatch { .. } => "wrong number of arguments",
        };
        let labels = vec![LabeledSpan::new_with_span(
            Some(label.to_string()),
            self.span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.src)
    }
}

/// 1-based line and byte column of `pos` within `s`.
pub(crate) fn line_col(s: &str, pos: usize) -> (usize, usize) {
    let pos = pos.min(s.len());
    let before = &s[..pos];
    let line = 1 + before.bytes().filter(|&b| b == b'\n').count();
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    (line, pos - line_start + 1)
}

/// Byte bounds of the line containing `pos` (newline excluded).
fn line_bounds(s: &str, pos: usize) -> (usize, usize) {
    let pos = pos.min(s.len());
    let start = s[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = s[pos..].find('\n').map(|i| pos + i).unwrap_or(s.len());
    (start, end)
}

/// Rounds `i` up to the next character boundary of `s`.
fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i.min(s.len())
}

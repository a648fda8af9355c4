//! Recursive-descent parser for PEG grammar text.
//!
//! Builds operator trees through the public constructors; no semantic
//! analysis happens here beyond resolving parameter names of the enclosing
//! rule to argument indices. Registry-level checks live in the lint pass.

use std::ops::Range;
use std::sync::Arc;

use miette::NamedSource;

use crate::errors::{GrammarError, GrammarErrorKind};
use crate::ope::{apd, cho, cls, dot, ign, lit, npd, oom, opt, reference, seq, tok, zom, Ope};
use crate::rule::Rule;

/// One `Name <- Expression` definition, with the span of its name for
/// duplicate reporting.
pub(crate) struct Definition {
    pub(crate) rule: Rule,
    pub(crate) name_span: Range<usize>,
}

pub(crate) fn parse_definitions(
    src: &str,
    named: &Arc<NamedSource<String>>,
) -> Result<Vec<Definition>, GrammarError> {
    let mut parser = GrammarParser {
        src,
        pos: 0,
        named: named.clone(),
    };
    parser.parse_definitions()
}

struct GrammarParser<'a> {
    src: &'a str,
    pos: usize,
    named: Arc<NamedSource<String>>,
}

impl GrammarParser<'_> {
    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    fn parse_definitions(&mut self) -> Result<Vec<Definition>, GrammarError> {
        let mut defs = Vec::new();
        self.spacing();
        while !self.at_end() {
            defs.push(self.parse_definition()?);
            self.spacing();
        }
        if defs.is_empty() {
            return Err(self.error("grammar contains no definitions"));
        }
        Ok(defs)
    }

    fn parse_definition(&mut self) -> Result<Definition, GrammarError> {
        let name_start = self.pos;
        let name = self.parse_rule_name()?;
        let name_span = name_start..self.pos;
        self.spacing();

        let parameters = if self.eat('(') {
            let mut params = Vec::new();
            loop {
                self.spacing();
                params.push(self.parse_ident()?);
                self.spacing();
                if !self.eat(',') {
                    break;
                }
            }
            self.expect(')')?;
            self.spacing();
            Some(params)
        } else {
            None
        };

        if !self.eat_str("<-") {
            return Err(self.error("expected '<-'"));
        }
        self.spacing();

        let empty = Vec::new();
        let params = parameters.as_ref().unwrap_or(&empty);
        let ope = self.parse_expression(params)?;

        let rule = match parameters {
            Some(params) => Rule::parameterized(name, params, ope),
            None => Rule::new(name, ope),
        };
        Ok(Definition { rule, name_span })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expression(&mut self, params: &[String]) -> Result<Arc<Ope>, GrammarError> {
        let mut alternatives = vec![self.parse_sequence(params)?];
        while self.eat('/') {
            self.spacing();
            alternatives.push(self.parse_sequence(params)?);
        }
        Ok(if alternatives.len() == 1 {
            alternatives.pop().expect("one alternative")
        } else {
            cho(alternatives)
        })
    }

    fn parse_sequence(&mut self, params: &[String]) -> Result<Arc<Ope>, GrammarError> {
        let mut items = Vec::new();
        loop {
            self.spacing();
            if !self.starts_primary() {
                break;
            }
            items.push(self.parse_prefix(params)?);
        }
        Ok(if items.len() == 1 {
            items.pop().expect("one item")
        } else {
            seq(items)
        })
    }

    fn parse_prefix(&mut self, params: &[String]) -> Result<Arc<Ope>, GrammarError> {
        if self.eat('&') {
            self.spacing();
            Ok(apd(self.parse_suffix(params)?))
        } else if self.eat('!') {
            self.spacing();
            Ok(npd(self.parse_suffix(params)?))
        } else if self.eat('~') {
            self.spacing();
            Ok(ign(self.parse_suffix(params)?))
        } else {
            self.parse_suffix(params)
        }
    }

    fn parse_suffix(&mut self, params: &[String]) -> Result<Arc<Ope>, GrammarError> {
        let ope = self.parse_primary(params)?;
        self.spacing();
        Ok(if self.eat('?') {
            opt(ope)
        } else if self.eat('*') {
            zom(ope)
        } else if self.eat('+') {
            oom(ope)
        } else {
            ope
        })
    }

    fn parse_primary(&mut self, params: &[String]) -> Result<Arc<Ope>, GrammarError> {
        match self.peek() {
            Some('(') => {
                self.bump();
                self.spacing();
                let ope = self.parse_expression(params)?;
                self.expect(')')?;
                Ok(ope)
            }
            Some('<') => {
                self.bump();
                self.spacing();
                let ope = self.parse_expression(params)?;
                self.expect('>')?;
                Ok(tok(ope))
            }
            Some('\'') | Some('"') => self.parse_literal(),
            Some('[') => self.parse_class(),
            Some('.') => {
                self.bump();
                Ok(dot())
            }
            Some(c) if c == '%' || is_ident_start(c) => self.parse_reference(params),
            Some(c) => Err(self.error(&format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of grammar")),
        }
    }

    fn parse_reference(&mut self, params: &[String]) -> Result<Arc<Ope>, GrammarError> {
        let start = self.pos;
        let name = self.parse_rule_name()?;

        // A macro call's argument list must be adjacent to the name;
        // whitespace in between starts a grouped sub-expression instead.
        if self.peek() == Some('(') {
            self.bump();
            let mut args = Vec::new();
            loop {
                self.spacing();
                args.push(self.parse_expression(params)?);
                if !self.eat(',') {
                    break;
                }
            }
            self.expect(')')?;
            return Ok(reference(&name, args, None, start));
        }

        let iarg = params.iter().position(|p| *p == name);
        Ok(reference(&name, Vec::new(), iarg, start))
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    fn parse_literal(&mut self) -> Result<Arc<Ope>, GrammarError> {
        let quote = self.bump().expect("quote peeked");
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated literal")),
                Some(c) if c == quote => break,
                Some('\\') => text.push(self.parse_escape()?),
                Some(c) => text.push(c),
            }
        }
        Ok(lit(&text))
    }

    fn parse_class(&mut self) -> Result<Arc<Ope>, GrammarError> {
        self.bump(); // '['

        // Collect items, remembering which were escaped so an escaped or
        // stray '-' stays a literal character rather than a range marker.
        let mut items: Vec<(char, bool)> = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated character class")),
                Some(']') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    items.push((self.parse_escape()?, true));
                }
                Some(c) => {
                    self.bump();
                    items.push((c, false));
                }
            }
        }

        let mut singles = Vec::new();
        let mut ranges = Vec::new();
        let mut i = 0;
        while i < items.len() {
            if i + 2 < items.len() && items[i + 1] == ('-', false) {
                ranges.push((items[i].0, items[i + 2].0));
                i += 3;
            } else {
                singles.push(items[i].0);
                i += 1;
            }
        }

        // Serialize back to the class-string form; a literal '-' goes first
        // so it cannot be read as a range marker.
        let mut chars = String::new();
        if singles.contains(&'-') {
            chars.push('-');
        }
        for c in singles.iter().filter(|&&c| c != '-') {
            chars.push(*c);
        }
        for (lo, hi) in ranges {
            chars.push(lo);
            chars.push('-');
            chars.push(hi);
        }
        Ok(cls(&chars))
    }

    fn parse_escape(&mut self) -> Result<char, GrammarError> {
        match self.bump() {
            None => Err(self.error("unterminated escape sequence")),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some(c) => Ok(c),
        }
    }

    fn parse_rule_name(&mut self) -> Result<String, GrammarError> {
        let mut name = String::new();
        if self.eat('%') {
            name.push('%');
        }
        match self.peek() {
            Some(c) if is_ident_start(c) => {}
            _ => return Err(self.error("expected a rule name")),
        }
        while let Some(c) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            name.push(c);
            self.bump();
        }
        Ok(name)
    }

    fn parse_ident(&mut self) -> Result<String, GrammarError> {
        match self.peek() {
            Some(c) if is_ident_start(c) => {}
            _ => return Err(self.error("expected an identifier")),
        }
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            ident.push(c);
            self.bump();
        }
        Ok(ident)
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, pat: &str) -> bool {
        if self.src[self.pos..].starts_with(pat) {
            self.pos += pat.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), GrammarError> {
        if self.eat(ch) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{ch}'")))
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Skips whitespace and `#` line comments.
    fn spacing(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Whether the cursor can start another primary of the current sequence.
    fn starts_primary(&self) -> bool {
        match self.peek() {
            None | Some('/') | Some(')') | Some('>') | Some(',') => false,
            Some(_) => !self.at_definition_start(),
        }
    }

    /// Lookahead for `Name <-` (optionally `%`-prefixed or parameterized):
    /// the next definition ends the current expression.
    fn at_definition_start(&self) -> bool {
        let bytes = self.src.as_bytes();
        let mut i = self.pos;

        if i < bytes.len() && bytes[i] == b'%' {
            i += 1;
        }
        let ident_start = i;
        while i < bytes.len() && is_ident_char(bytes[i] as char) {
            i += 1;
        }
        if i == ident_start {
            return false;
        }

        i = skip_spacing_from(bytes, i);
        if i < bytes.len() && bytes[i] == b'(' {
            while i < bytes.len() && bytes[i] != b')' {
                i += 1;
            }
            if i == bytes.len() {
                return false;
            }
            i += 1;
            i = skip_spacing_from(bytes, i);
        }

        self.src[i..].starts_with("<-")
    }

    fn error(&self, message: &str) -> GrammarError {
        let width = self.peek().map_or(0, char::len_utf8);
        GrammarError::new(
            GrammarErrorKind::Syntax(message.to_string()),
            self.named.clone(),
            self.pos..self.pos + width,
        )
    }
}

fn skip_spacing_from(bytes: &[u8], mut i: usize) -> usize {
    loop {
        while i < bytes.len() && (bytes[i] as char).is_whitespace() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'#' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
        } else {
            return i;
        }
    }
}

// Identifiers are ASCII; the definition lookahead scans them byte-wise.
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions(src: &str) -> Vec<Definition> {
        let named = Arc::new(NamedSource::new("test", src.to_string()));
        parse_definitions(src, &named).expect("grammar should parse")
    }

    #[test]
    fn parses_a_minimal_definition() {
        let defs = definitions("A <- 'a'");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].rule.name, "A");
        assert_eq!(defs[0].rule.ope.label(), "LiteralString");
    }

    #[test]
    fn parses_choice_and_sequence_nesting() {
        let defs = definitions("A <- 'a' 'b' / 'c'");
        assert_eq!(defs[0].rule.ope.label(), "PrioritizedChoice");
    }

    #[test]
    fn two_definitions_split_on_the_arrow_lookahead() {
        let defs = definitions("A <- B\nB <- 'b'");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].rule.ope.label(), "Reference");
    }

    #[test]
    fn macro_parameters_become_argument_indices() {
        let defs = definitions("L(I, D) <- I (D I)*");
        let rule = &defs[0].rule;
        assert_eq!(
            rule.parameters.as_deref(),
            Some(&["I".to_string(), "D".to_string()][..])
        );
        let Ope::Sequence(items) = &*rule.ope else {
            panic!("expected a sequence body");
        };
        let Ope::Reference { iarg, .. } = &*items[0] else {
            panic!("expected a parameter reference");
        };
        assert_eq!(*iarg, Some(0));
    }

    #[test]
    fn class_with_leading_dash_keeps_it_literal() {
        let defs = definitions("A <- [-a-z]");
        let Ope::CharacterClass {
            singles, ranges, ..
        } = &*defs[0].rule.ope
        else {
            panic!("expected a character class");
        };
        assert_eq!(singles, &['-']);
        assert_eq!(ranges, &[('a', 'z')]);
    }

    #[test]
    fn unterminated_literal_is_a_syntax_error() {
        let named = Arc::new(NamedSource::new("test", "A <- 'a".to_string()));
        assert!(parse_definitions("A <- 'a", &named).is_err());
    }

    #[test]
    fn token_boundary_and_ignore_prefixes() {
        let defs = definitions("N <- < [0-9]+ > ~WS\nWS <- ' '*");
        let Ope::Sequence(items) = &*defs[0].rule.ope else {
            panic!("expected a sequence body");
        };
        assert_eq!(items[0].label(), "TokenBoundary");
        assert_eq!(items[1].label(), "Ignore");
    }
}

//! A PEG parsing engine: composable operators, parameterized rules, and
//! rich syntax diagnostics.

pub mod cli;
mod context;
pub mod errors;
pub mod ope;
pub mod rule;
pub mod syntax;
pub mod values;

pub use context::{TracerEnter, TracerLeave};
pub use errors::{GrammarError, GrammarErrorKind, ParseError, ParseErrorKind};
pub use ope::{
    apd, cho, cls, dot, ign, lit, npd, oom, opt, ref_, ref_args, seq, tok, usr, wsp, zom, Ope,
};
pub use rule::{Action, Grammar, Rule};
pub use syntax::{parse_grammar, parse_grammar_named};
pub use values::{SemanticValues, Token, Value};

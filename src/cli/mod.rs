//! The `peglint` command-line interface.
//!
//! Reads a grammar file, builds the rule graph through the front-end, and
//! optionally checks a source file against it. Exit code 0 means everything
//! checked out; any failure prints a diagnostic report and exits 1.

use std::fs;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;
use miette::Report;

use crate::cli::args::PeglintArgs;
use crate::rule::Grammar;
use crate::syntax::parse_grammar_named;

pub mod args;

/// The main entry point for the CLI.
pub fn run() -> ExitCode {
    let args = PeglintArgs::parse();

    let grammar_text = match fs::read_to_string(&args.grammar) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", args.grammar.display());
            return ExitCode::FAILURE;
        }
    };

    let grammar_name = args.grammar.display().to_string();
    let mut grammar = match parse_grammar_named(&grammar_text, &grammar_name) {
        Ok(grammar) => grammar,
        Err(errors) => {
            for e in errors {
                eprintln!("{:?}", Report::new(e));
            }
            return ExitCode::FAILURE;
        }
    };

    let Some(source_path) = args.source else {
        return ExitCode::SUCCESS;
    };
    let source_text = match fs::read_to_string(&source_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", source_path.display());
            return ExitCode::FAILURE;
        }
    };

    if args.trace {
        install_tracer(&mut grammar);
    }

    let source_name = source_path.display().to_string();
    match grammar.parse_with(&source_text, &source_name, &mut ()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:?}", Report::new(e));
            ExitCode::FAILURE
        }
    }
}

/// Wires an indented operator trace to stderr. Backtracks (dispatches at a
/// position before the previous one) are marked with `*`.
fn install_tracer(grammar: &mut Grammar) {
    eprintln!("pos:lev\trule/ope");
    eprintln!("-------\t--------");

    let level = Arc::new(AtomicUsize::new(0));
    let prev_pos = Arc::new(AtomicUsize::new(0));

    let enter_level = level.clone();
    grammar.tracer_enter = Some(Arc::new(move |label, _s, _sv, _dt, pos| {
        let lev = enter_level.load(Ordering::Relaxed);
        let backtrack = if pos < prev_pos.load(Ordering::Relaxed) {
            "*"
        } else {
            ""
        };
        eprintln!("{pos}:{lev}{backtrack}\t{}{label}", "  ".repeat(lev));
        prev_pos.store(pos, Ordering::Relaxed);
        enter_level.store(lev + 1, Ordering::Relaxed);
    }));

    grammar.tracer_leave = Some(Arc::new(move |_label, _s, _sv, _dt, _pos, _l| {
        let lev = level.load(Ordering::Relaxed);
        level.store(lev.saturating_sub(1), Ordering::Relaxed);
    }));
}

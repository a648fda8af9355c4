//! Command-line arguments for `peglint`, declared with clap's derive API.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "peglint",
    version,
    about = "Checks the syntax of a PEG grammar file and, optionally, of a source file against it."
)]
pub struct PeglintArgs {
    /// Print a rule/operator trace to stderr while parsing the source file.
    #[arg(long)]
    pub trace: bool,

    /// Path to the PEG grammar file.
    pub grammar: PathBuf,

    /// Path to a source file to check against the grammar.
    pub source: Option<PathBuf>,
}

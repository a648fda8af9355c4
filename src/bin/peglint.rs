use std::process::ExitCode;

fn main() -> ExitCode {
    pegra::cli::run()
}

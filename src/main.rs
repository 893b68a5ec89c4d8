//! Contentmill - command-line content build pipeline

use std::process::ExitCode;

use contentmill::cli;

fn main() -> ExitCode {
    cli::run()
}

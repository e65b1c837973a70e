use clap::Parser;
use ctatrader::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}

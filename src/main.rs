//! Binary entry point for the `converge` CLI.
use anyhow::Result;
use clap::Parser;

use converge_cli::{cli, commands, logging};

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init(args.verbose);

    match args.command {
        cli::Command::Apply(opts) => commands::apply::run(&args.global, &opts),
        cli::Command::Check(opts) => commands::check::run(&args.global, &opts),
        cli::Command::Version => {
            let version = option_env!("CONVERGE_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
            println!("converge {version}");
            Ok(())
        }
    }
}

//! Command-line interface definitions.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "converge",
    about = "Single-host idempotent provisioning engine",
    version
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared across subcommands.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Path to the plan document
    #[arg(long, global = true, default_value = "plan.toml")]
    pub plan: PathBuf,

    /// Run only steps whose tags intersect this set
    #[arg(short = 't', long, global = true, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Converge the host to the state declared in the plan
    Apply(ApplyOpts),
    /// Validate the plan without touching the host
    Check(CheckOpts),
    /// Print version information
    Version,
}

/// Options for the `apply` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ApplyOpts {
    /// Override the run lock file location
    #[arg(long)]
    pub lock_file: Option<PathBuf>,
}

/// Options for the `check` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct CheckOpts {}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_apply_with_plan() {
        let cli = Cli::parse_from(["converge", "--plan", "/etc/web.toml", "apply"]);
        assert_eq!(cli.global.plan, PathBuf::from("/etc/web.toml"));
        assert!(matches!(cli.command, Command::Apply(_)));
    }

    #[test]
    fn plan_defaults_to_plan_toml() {
        let cli = Cli::parse_from(["converge", "apply"]);
        assert_eq!(cli.global.plan, PathBuf::from("plan.toml"));
    }

    #[test]
    fn parse_apply_dry_run() {
        let cli = Cli::parse_from(["converge", "--dry-run", "apply"]);
        assert!(cli.global.dry_run);
    }

    #[test]
    fn parse_apply_dry_run_short() {
        let cli = Cli::parse_from(["converge", "-d", "apply"]);
        assert!(cli.global.dry_run);
    }

    #[test]
    fn parse_tags_comma_separated() {
        let cli = Cli::parse_from(["converge", "apply", "--tags", "web,runtime"]);
        assert_eq!(cli.global.tags, vec!["web", "runtime"]);
    }

    #[test]
    fn parse_tags_short() {
        let cli = Cli::parse_from(["converge", "-t", "web", "apply"]);
        assert_eq!(cli.global.tags, vec!["web"]);
    }

    #[test]
    fn tags_default_to_empty() {
        let cli = Cli::parse_from(["converge", "apply"]);
        assert!(cli.global.tags.is_empty());
    }

    #[test]
    fn parse_apply_lock_file_override() {
        let cli = Cli::parse_from(["converge", "apply", "--lock-file", "/tmp/x.lock"]);
        if let Command::Apply(opts) = cli.command {
            assert_eq!(opts.lock_file, Some(PathBuf::from("/tmp/x.lock")));
        } else {
            panic!("expected Apply command");
        }
    }

    #[test]
    fn parse_check() {
        let cli = Cli::parse_from(["converge", "check"]);
        assert!(matches!(cli.command, Command::Check(_)));
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["converge", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::parse_from(["converge", "-v", "apply"]);
        assert!(cli.verbose);
    }
}

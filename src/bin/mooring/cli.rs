//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Mooring - resolve C++ dependencies with whichever package manager is available
#[derive(Parser)]
#[command(name = "mooring")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the project's dependencies
    Resolve(ResolveArgs),

    /// Show which dependency backends are usable
    Backends(BackendsArgs),

    /// Cross-check existing lock files without resolving
    Locks(LocksArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Try this backend first (conan, vcpkg, fetch)
    #[arg(long, value_name = "BACKEND", env = "MOORING_PREFER")]
    pub prefer: Option<String>,

    /// Target platform triple (defaults to the host)
    #[arg(long, value_name = "TRIPLE")]
    pub platform: Option<String>,

    /// Per-backend resolve timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Exit with an error when lock files of different backends disagree
    #[arg(long)]
    pub strict_locks: bool,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct BackendsArgs {
    #[command(subcommand)]
    pub command: Option<BackendsCommands>,

    /// Print the report as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum BackendsCommands {
    /// List every registered backend (default)
    List,

    /// Probe one backend; fails when it is unusable
    Check {
        /// Backend name (conan, vcpkg, fetch)
        backend: String,
    },
}

#[derive(Args)]
pub struct LocksArgs {
    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Exit with an error when the locks disagree
    #[arg(long)]
    pub strict_locks: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve_flags() {
        let cli = Cli::parse_from([
            "mooring",
            "resolve",
            "--prefer",
            "vcpkg",
            "--platform",
            "x86_64-unknown-linux-gnu",
            "--timeout",
            "30",
            "--strict-locks",
        ]);
        let Commands::Resolve(args) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(args.prefer.as_deref(), Some("vcpkg"));
        assert_eq!(args.timeout, Some(30));
        assert!(args.strict_locks);
    }
}

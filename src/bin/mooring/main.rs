//! Mooring CLI - a dependency-resolution coordinator for C++ package managers

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::exit;
use mooring::util::{ColorChoice, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let color = match cli.color.parse::<ColorChoice>() {
        Ok(color) => color,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(exit::INVALID_INPUT);
        }
    };
    let json = match &cli.command {
        Commands::Resolve(args) => args.json,
        Commands::Backends(args) => args.json,
        Commands::Locks(args) => args.json,
        Commands::Completions(_) => false,
    };
    let shell = Shell::from_flags(cli.quiet, cli.verbose, color, json);

    init_logging(&cli);

    match run(cli, &shell) {
        Ok(code) => ExitCode::from(code),
        Err(e) => ExitCode::from(commands::report_error(&shell, &e)),
    }
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "mooring=debug"
    } else if cli.quiet {
        "mooring=error"
    } else {
        "mooring=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli, shell: &Shell) -> Result<u8> {
    match cli.command {
        Commands::Resolve(args) => commands::resolve::execute(args, shell),
        Commands::Backends(args) => commands::backends::execute(args, shell),
        Commands::Locks(args) => commands::locks::execute(args, shell),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

//! `mooring resolve` command

use std::time::{Duration, Instant};

use anyhow::Result;

use super::{exit, load_workspace};
use crate::cli::ResolveArgs;
use mooring::coordinator::TraceOutcome;
use mooring::core::{BackendId, TargetTriple, Workspace};
use mooring::ops::{resolve_workspace, ResolveOptions, ResolveResult};
use mooring::util::diagnostic;
use mooring::util::shell::format_duration;
use mooring::util::{CancelToken, GlobalContext, Shell, Status};

pub fn execute(args: ResolveArgs, shell: &Shell) -> Result<u8> {
    let prefer = args
        .prefer
        .as_deref()
        .map(str::parse::<BackendId>)
        .transpose()?;
    let platform = args
        .platform
        .as_deref()
        .map(str::parse::<TargetTriple>)
        .transpose()?;

    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(shell.is_verbose());
    let ws = load_workspace(&ctx)?;
    let config = ctx.load_config(ws.root());

    let opts = ResolveOptions {
        prefer,
        platform,
        timeout: args.timeout.map(Duration::from_secs),
        strict_locks: args.strict_locks,
    };

    let start = Instant::now();
    let spinner = shell.spinner("detecting backends");
    let progress = spinner.clone();
    let result = resolve_workspace(&ws, &config, &opts, &CancelToken::new(), move |state| {
        if !state.is_terminal() {
            progress.set_message(state);
        }
    });
    spinner.finish();
    let result = result?;

    if shell.is_json() {
        print_json(shell, &ws, &result);
    } else {
        print_human(shell, &result, start.elapsed());
    }

    if result.strict_violation {
        Ok(exit::LOCK_DIVERGENCE)
    } else {
        Ok(exit::SUCCESS)
    }
}

fn print_human(shell: &Shell, result: &ResolveResult, elapsed: Duration) {
    let outcome = &result.outcome;

    for entry in outcome.trace.entries() {
        if !matches!(entry.outcome, TraceOutcome::Selected) {
            shell.status(Status::Skipped, entry);
        }
    }

    shell.status(
        Status::Resolved,
        format!(
            "{} package(s) with {} for {}",
            outcome.manifest.len(),
            outcome.backend,
            outcome.manifest.platform
        ),
    );
    for (name, version) in outcome.manifest.pairs() {
        shell.detail(format!("{} {}", name, version));
    }

    let lock_file = outcome.backend.identity().lock_file;
    if outcome.lock_written {
        shell.status(Status::Locked, lock_file);
    } else {
        shell.note(format!("{} unchanged", lock_file));
    }

    if !shell.is_quiet() {
        for warning in &outcome.warnings {
            diagnostic::emit(&warning.to_diagnostic(), shell.use_color());
        }
    }

    if result.strict_violation {
        shell.error("lock files diverge and strict lock checking is enabled");
    }

    shell.status(
        Status::Finished,
        format!(
            "{} in {}",
            result.resolved_path.display(),
            format_duration(elapsed)
        ),
    );
}

fn print_json(shell: &Shell, ws: &Workspace, result: &ResolveResult) {
    let outcome = &result.outcome;
    let warnings: Vec<String> = outcome.warnings.iter().map(|w| w.to_string()).collect();

    shell.json(&serde_json::json!({
        "success": !result.strict_violation,
        "backend": outcome.backend,
        "platform": outcome.manifest.platform,
        "packages": outcome.manifest.packages,
        "trace": outcome.trace,
        "lock": {
            "path": ws.lock_path(outcome.backend),
            "content-hash": outcome.lock.content_hash,
            "written": outcome.lock_written,
        },
        "warnings": warnings,
        "drift": outcome.drift_detected(),
        "divergence": outcome.has_divergence(),
        "resolved-manifest": result.resolved_path,
    }));
}

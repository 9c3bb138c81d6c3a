//! `mooring backends` command
//!
//! List and check dependency backends.

use anyhow::Result;

use super::{exit, load_workspace};
use crate::cli::{BackendsArgs, BackendsCommands};
use mooring::backend::BackendRegistry;
use mooring::core::{BackendId, Manifest, ManifestError, Workspace};
use mooring::ops::{backend_status, backend_statuses, format_statuses};
use mooring::util::{GlobalContext, Shell, Status};

pub fn execute(args: BackendsArgs, shell: &Shell) -> Result<u8> {
    let ctx = GlobalContext::new()?;
    let ws = workspace_or_cwd(&ctx)?;
    let config = ctx.load_config(ws.root());
    let registry = BackendRegistry::builtin(&config);

    match args.command.unwrap_or(BackendsCommands::List) {
        BackendsCommands::List => list_backends(shell, &registry, &ws),
        BackendsCommands::Check { backend } => check_backend(shell, &registry, &ws, &backend),
    }
}

/// Probes only need a root directory, so outside a project the current
/// directory stands in.
fn workspace_or_cwd(ctx: &GlobalContext) -> Result<Workspace> {
    match load_workspace(ctx) {
        Ok(ws) => Ok(ws),
        Err(e) if matches!(e.downcast_ref::<ManifestError>(), Some(ManifestError::NotFound { .. })) => {
            tracing::debug!("no manifest found; probing {}", ctx.cwd().display());
            Ok(Workspace::from_parts(
                ctx.cwd().to_path_buf(),
                Manifest {
                    name: String::new(),
                    version: None,
                    dependencies: Vec::new(),
                },
            ))
        }
        Err(e) => Err(e),
    }
}

fn list_backends(shell: &Shell, registry: &BackendRegistry, ws: &Workspace) -> Result<u8> {
    let statuses = backend_statuses(registry, ws);

    if shell.is_json() {
        shell.json(&statuses);
    } else {
        shell.print("Dependency backends (tried in rank order):\n\n");
        shell.print(format_statuses(&statuses, shell.is_verbose()));
    }

    Ok(exit::SUCCESS)
}

fn check_backend(
    shell: &Shell,
    registry: &BackendRegistry,
    ws: &Workspace,
    name: &str,
) -> Result<u8> {
    let id: BackendId = name.parse()?;
    let status = backend_status(registry, ws, id)
        .ok_or_else(|| super::InvalidInput(format!("backend `{}` is not registered", id)))?;

    if shell.is_json() {
        shell.json(&status);
    } else if status.usable {
        let version = status.version.as_deref().unwrap_or("unknown version");
        shell.status(Status::Checking, format!("{}: usable ({})", id, version));
    } else {
        let reason = status.reason.as_deref().unwrap_or("unusable");
        shell.error(format!("{}: {}", id, reason));
    }

    if status.usable {
        Ok(exit::SUCCESS)
    } else {
        Ok(exit::NO_BACKEND_AVAILABLE)
    }
}

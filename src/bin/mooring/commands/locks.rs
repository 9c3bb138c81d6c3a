//! `mooring locks` command

use anyhow::Result;

use super::{exit, load_workspace};
use crate::cli::LocksArgs;
use mooring::ops::{check_locks, format_lock_check};
use mooring::util::diagnostic;
use mooring::util::{GlobalContext, Shell};

pub fn execute(args: LocksArgs, shell: &Shell) -> Result<u8> {
    let ctx = GlobalContext::new()?;
    let ws = load_workspace(&ctx)?;
    let config = ctx.load_config(ws.root());
    let strict = args.strict_locks || config.resolve.strict_locks;

    let check = check_locks(&ws);

    if shell.is_json() {
        let warnings: Vec<String> = check.warnings.iter().map(|w| w.to_string()).collect();
        shell.json(&serde_json::json!({
            "locks": check.locks,
            "warnings": warnings,
            "divergence": check.has_divergence(),
        }));
    } else {
        shell.print(format_lock_check(&check));
        if !shell.is_quiet() {
            for warning in &check.warnings {
                diagnostic::emit(&warning.to_diagnostic(), shell.use_color());
            }
        }
    }

    if strict && check.has_divergence() {
        Ok(exit::LOCK_DIVERGENCE)
    } else {
        Ok(exit::SUCCESS)
    }
}

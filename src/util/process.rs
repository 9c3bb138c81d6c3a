//! Subprocess execution utilities.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use wait_timeout::ChildExt;

use crate::util::cancel::{CancelToken, Interrupt};

/// How often a running child is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Failure to run a subprocess to completion.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for `{program}`")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` was interrupted")]
    Interrupted { program: String, reason: Interrupt },
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Execute the command, killing it if `cancel` is interrupted first.
    ///
    /// Output pipes are drained on helper threads so a chatty child cannot
    /// block on a full pipe while we poll it.
    pub fn exec_with_cancel(&self, cancel: &CancelToken) -> Result<Output, ExecError> {
        if let Some(reason) = cancel.check() {
            return Err(ExecError::Interrupted {
                program: self.program_name(),
                reason,
            });
        }

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: self.program_name(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            let waited = child
                .wait_timeout(POLL_INTERVAL)
                .map_err(|source| ExecError::Wait {
                    program: self.program_name(),
                    source,
                })?;

            if let Some(status) = waited {
                break status;
            }

            if let Some(reason) = cancel.check() {
                kill(&mut child);
                tracing::debug!("killed `{}` ({:?})", self.display_command(), reason);
                return Err(ExecError::Interrupted {
                    program: self.program_name(),
                    reason,
                });
            }
        };

        Ok(Output {
            status,
            stdout: join(stdout),
            stderr: join(stderr),
        })
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_process_builder() {
        let output = ProcessBuilder::new("echo")
            .arg("hello")
            .exec_with_cancel(&CancelToken::new())
            .unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("hello"));
    }

    #[test]
    #[cfg(unix)]
    fn test_exec_times_out() {
        let cancel = CancelToken::new().with_timeout(Duration::from_millis(200));
        let err = ProcessBuilder::new("sleep")
            .arg("5")
            .exec_with_cancel(&cancel)
            .unwrap_err();

        assert!(matches!(
            err,
            ExecError::Interrupted {
                reason: Interrupt::TimedOut,
                ..
            }
        ));
    }

    #[test]
    fn test_exec_refuses_when_already_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = ProcessBuilder::new("definitely-not-a-real-tool")
            .exec_with_cancel(&cancel)
            .unwrap_err();
        assert!(matches!(
            err,
            ExecError::Interrupted {
                reason: Interrupt::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("conan").args(["install", ".", "--build=missing"]);

        assert_eq!(pb.display_command(), "conan install . --build=missing");
    }
}

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

/// pkexec (and sudo) report exit 126 when the user dismisses the
/// authentication prompt.
const EXIT_AUTH_DECLINED: i32 = 126;

/// Captured result of one external tool invocation. Both streams are
/// decoded as UTF-8 text; the exit code is the primary success signal.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Re-invoke through the elevation helper if we are not already root.
    pub elevate: bool,
    /// Turn a non-zero exit into an error instead of returning the output.
    pub require_success: bool,
}

/// Seam between bridges and the operating system. Production code uses
/// [`ProcessRunner`]; tests substitute a scripted implementation.
pub trait ToolRunner {
    /// Whether `program` resolves on the executable search path.
    fn locate(&self, program: &str) -> bool;

    /// Run `program` with `args`, blocking until it exits and capturing
    /// both output streams. Never fails on a non-zero exit unless
    /// `opts.require_success` is set, with one exception: a declined
    /// elevation prompt (exit 126 through the helper) is always an
    /// [`crate::error::Error::ElevationDeclined`].
    fn run(&self, program: &str, args: &[&str], opts: RunOptions) -> Result<CommandOutput>;
}

/// Spawns real child processes, escalating privileges through pkexec
/// when asked to and not already running as root.
pub struct ProcessRunner {
    is_root: bool,
    helper_override: Option<Option<PathBuf>>,
    helper: OnceLock<Option<PathBuf>>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            is_root: nix::unistd::geteuid().is_root(),
            helper_override: None,
            helper: OnceLock::new(),
        }
    }

    /// Construct with a fixed elevation policy instead of probing the
    /// system. Intended for tests.
    pub fn with_elevation(is_root: bool, helper: Option<PathBuf>) -> Self {
        Self {
            is_root,
            helper_override: Some(helper),
            helper: OnceLock::new(),
        }
    }

    /// The elevation helper path, probed once and cached for the
    /// lifetime of the runner.
    fn helper(&self) -> Option<&PathBuf> {
        if let Some(fixed) = &self.helper_override {
            return fixed.as_ref();
        }
        self.helper
            .get_or_init(|| which::which("pkexec").ok())
            .as_ref()
    }

    fn spawn(&self, program: &str, args: &[&str], display_tool: &str) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| Error::Spawn {
                tool: display_tool.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // Killed-by-signal has no code; treat it as a generic failure.
            code: output.status.code().unwrap_or(-1),
        })
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRunner for ProcessRunner {
    fn locate(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn run(&self, program: &str, args: &[&str], opts: RunOptions) -> Result<CommandOutput> {
        let elevate = opts.elevate && !self.is_root;
        let helper = if elevate { self.helper() } else { None };

        let output = match helper {
            Some(helper) => {
                log::debug!(target: "runner", "running (via pkexec): {} {}", program, args.join(" "));
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(program);
                full.extend_from_slice(args);
                self.spawn(&helper.to_string_lossy(), &full, program)?
            }
            None => {
                // No helper available (or none needed): invoke directly
                // and let the tool fail naturally if it lacks privileges.
                log::debug!(target: "runner", "running: {} {}", program, args.join(" "));
                self.spawn(program, args, program)?
            }
        };

        classify(program, output, helper.is_some(), opts.require_success)
    }
}

/// Decide whether a finished invocation is an error. Exit 126 through the
/// helper path means the user declined the prompt and is surfaced as its
/// own variant so callers can skip futile retries.
fn classify(
    tool: &str,
    output: CommandOutput,
    via_helper: bool,
    require_success: bool,
) -> Result<CommandOutput> {
    if output.success() {
        return Ok(output);
    }

    // A declined prompt means the tool never ran; there is no output
    // worth returning, so this is an error even without require_success.
    if via_helper && output.code == EXIT_AUTH_DECLINED {
        log::warn!(target: "runner", "{}: authentication cancelled by user", tool);
        return Err(Error::ElevationDeclined {
            tool: tool.to_string(),
        });
    }

    log::warn!(
        target: "runner",
        "{} failed (exit {}): {}",
        tool,
        output.code,
        output.stderr.trim()
    );

    if require_success {
        return Err(Error::CommandFailed {
            tool: tool.to_string(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{}", body).unwrap();
        drop(f);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error_by_default() {
        let runner = ProcessRunner::with_elevation(true, None);
        let out = runner
            .run("sh", &["-c", "echo oops >&2; exit 3"], RunOptions::default())
            .unwrap();
        assert_eq!(out.code, 3);
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn test_require_success_maps_to_command_failed() {
        let runner = ProcessRunner::with_elevation(true, None);
        let err = runner
            .run(
                "sh",
                &["-c", "echo bad >&2; exit 1"],
                RunOptions {
                    elevate: false,
                    require_success: true,
                },
            )
            .unwrap_err();
        match err {
            Error::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 1);
                assert_eq!(stderr, "bad");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_exit_126_via_helper_is_elevation_declined() {
        let tmp = tempfile::tempdir().unwrap();
        // Helper that simulates the user dismissing the auth prompt.
        let helper = script(tmp.path(), "fake-pkexec", "exit 126");

        let runner = ProcessRunner::with_elevation(false, Some(helper));
        // Declined is an error even without require_success.
        let err = runner
            .run("true", &[], RunOptions { elevate: true, require_success: false })
            .unwrap_err();
        assert!(err.is_elevation_declined());
    }

    #[test]
    fn test_exit_126_without_helper_is_plain_failure() {
        // Outside the helper path, 126 is an ordinary exit code.
        let runner = ProcessRunner::with_elevation(true, None);
        let out = runner
            .run("sh", &["-c", "exit 126"], RunOptions::default())
            .unwrap();
        assert_eq!(out.code, 126);
    }

    #[test]
    fn test_exit_1_via_helper_is_generic_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let helper = script(tmp.path(), "fake-pkexec", "exit 1");

        let runner = ProcessRunner::with_elevation(false, Some(helper));
        let err = runner
            .run(
                "true",
                &[],
                RunOptions {
                    elevate: true,
                    require_success: true,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: 1, .. }));
    }

    #[test]
    fn test_helper_prepends_tool_and_args() {
        let tmp = tempfile::tempdir().unwrap();
        let helper = script(tmp.path(), "fake-pkexec", r#"echo "$@""#);

        let runner = ProcessRunner::with_elevation(false, Some(helper));
        let out = runner
            .run(
                "some-tool",
                &["--flag", "value"],
                RunOptions {
                    elevate: true,
                    require_success: false,
                },
            )
            .unwrap();
        assert_eq!(out.stdout.trim(), "some-tool --flag value");
    }

    #[test]
    fn test_root_skips_helper() {
        let tmp = tempfile::tempdir().unwrap();
        let helper = script(tmp.path(), "fake-pkexec", "echo HELPER; exit 126");

        // Already root: helper must not be involved even with elevate set.
        let runner = ProcessRunner::with_elevation(true, Some(helper));
        let out = runner
            .run(
                "sh",
                &["-c", "echo direct"],
                RunOptions {
                    elevate: true,
                    require_success: true,
                },
            )
            .unwrap();
        assert_eq!(out.stdout.trim(), "direct");
    }

    #[test]
    fn test_spawn_failure_for_missing_program() {
        let runner = ProcessRunner::with_elevation(true, None);
        let err = runner
            .run(
                "/nonexistent/definitely-not-a-tool",
                &[],
                RunOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}

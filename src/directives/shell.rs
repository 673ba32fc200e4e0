//! SZ-021: `shell` — run a command through bash.
//!
//! Output is captured to temp files rather than pipes so the child can be
//! polled for exit (and killed on interrupt) without filling a pipe buffer.

use crate::core::context::Context;
use crate::core::unit::Directive;
use crate::logs::VERBOSE;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Output from a finished command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn read_back(mut file: std::fs::File) -> Result<String, String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut bytes))
        .map_err(|e| format!("output read error: {}", e))?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Execute a script via `bash`, optionally in `cwd`. Killed if `interrupt` is set.
pub fn exec_shell(script: &str, cwd: Option<&Path>, interrupt: &AtomicBool) -> Result<ExecOutput, String> {
    let stdout = tempfile::tempfile().map_err(|e| format!("cannot capture stdout: {}", e))?;
    let stderr = tempfile::tempfile().map_err(|e| format!("cannot capture stderr: {}", e))?;
    let mut command = Command::new("bash");
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::from(
            stdout.try_clone().map_err(|e| format!("cannot capture stdout: {}", e))?,
        ))
        .stderr(Stdio::from(
            stderr.try_clone().map_err(|e| format!("cannot capture stderr: {}", e))?,
        ));
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    let mut child = command
        .spawn()
        .map_err(|e| format!("failed to spawn bash: {}", e))?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(script.as_bytes()) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(format!("stdin write error: {}", e));
        }
    }

    let status = loop {
        if interrupt.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            return Err("interrupted".to_string());
        }
        match child.try_wait().map_err(|e| format!("wait error: {}", e))? {
            Some(status) => break status,
            None => std::thread::sleep(POLL_INTERVAL),
        }
    };

    Ok(ExecOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: read_back(stdout)?,
        stderr: read_back(stderr)?,
    })
}

/// `shell COMMAND` with options `expect = CODE` and `cwd = DIR`.
pub struct Shell {
    command: String,
    expect: i32,
    cwd: Option<PathBuf>,
}

impl Shell {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            expect: 0,
            cwd: None,
        }
    }
}

impl Directive for Shell {
    fn name(&self) -> &str {
        "shell"
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "expect" => {
                self.expect = value
                    .parse()
                    .map_err(|_| format!("expect must be an exit status, got '{}'", value))?;
            }
            "cwd" => self.cwd = Some(PathBuf::from(value)),
            other => return Err(format!("unknown option '{}'", other)),
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("shell needs a command".to_string());
        }
        let flag = ctx.interrupt_flag();
        let out = exec_shell(&self.command, self.cwd.as_deref(), &flag)?;
        for line in out.stdout.lines() {
            ctx.say(VERBOSE, line);
        }
        for line in out.stderr.lines() {
            ctx.say(VERBOSE, &format!("stderr: {}", line));
        }
        if out.exit_code != self.expect {
            return Err(format!(
                "exit status {} (expected {})",
                out.exit_code, self.expect
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::probe_context;
    use std::sync::Arc;
    use std::time::Instant;

    fn idle() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_sz021_echo() {
        let out = exec_shell("echo hello", None, &idle()).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_sz021_failure_and_stderr() {
        let out = exec_shell("echo err >&2\nexit 42", None, &idle()).unwrap();
        assert_eq!(out.exit_code, 42);
        assert!(out.stderr.contains("err"));
    }

    #[test]
    fn test_sz021_signal_killed() {
        let out = exec_shell("kill -9 $$", None, &idle()).unwrap();
        assert_eq!(out.exit_code, -1);
    }

    #[test]
    fn test_sz021_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let out = exec_shell("pwd", Some(dir.path()), &idle()).unwrap();
        let reported = std::fs::canonicalize(out.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_sz021_large_output_does_not_block() {
        let out = exec_shell("seq 1 200000", None, &idle()).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.lines().count(), 200000);
    }

    #[test]
    fn test_sz021_script_not_fully_read() {
        // bash reads a piped script line by line, so it exits before the pipe drains
        let script = format!("exit 3\n{}", "# filler\n".repeat(200_000));
        let err = exec_shell(&script, None, &idle()).unwrap_err();
        assert!(err.starts_with("stdin write error"), "{}", err);
    }

    #[test]
    fn test_sz021_interrupt_kills() {
        let flag = Arc::new(idle());
        let setter = Arc::clone(&flag);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            setter.store(true, Ordering::SeqCst);
        });
        let started = Instant::now();
        let err = exec_shell("sleep 30", None, &flag).unwrap_err();
        handle.join().unwrap();
        assert_eq!(err, "interrupted");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_sz021_directive_expect() {
        let (mut ctx, buf) = probe_context(false);
        let mut shell = Shell::new("echo out; exit 3");
        assert!(shell.execute(&mut ctx).unwrap_err().contains("exit status 3 (expected 0)"));
        shell.set_option("expect", "3").unwrap();
        shell.execute(&mut ctx).unwrap();
        assert!(buf.contents().contains("  out\n"));
        assert!(shell.set_option("expect", "zero").is_err());
        assert!(shell.set_option("colour", "red").is_err());
    }

    #[test]
    fn test_sz021_empty_command() {
        let (mut ctx, _buf) = probe_context(false);
        assert_eq!(
            Shell::new("  ").execute(&mut ctx),
            Err("shell needs a command".to_string())
        );
    }
}

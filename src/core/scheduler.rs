//! SZ-008: Job scheduler — bounded pool of worker processes.
//!
//! Top-level directives may be delegated to a worker: the same executable
//! re-invoked with the `worker` subcommand, fed the stanza as JSON on stdin.
//! Each worker writes its logs to private buffers that are merged into the
//! parent's sinks when it is reaped. Reaping polls; there are no timeouts.

use super::context::Context;
use super::parser::SourceLine;
use super::types::UnitError;
use super::worker::WorkerJob;
use crate::logs::eventlog::RunEvent;
use crate::logs::{PrivateBuffer, DETAIL, NORMAL};
use indexmap::IndexMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

/// How often outstanding workers are polled while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Program and arguments that start a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// This executable with the `worker` subcommand.
    pub fn current_exe() -> Result<Self, String> {
        let program = std::env::current_exe()
            .map_err(|e| format!("cannot locate own executable: {}", e))?;
        Ok(Self {
            program,
            args: vec!["worker".to_string()],
        })
    }
}

/// A top-level directive and its stanza, ready to hand off.
#[derive(Debug, Clone)]
pub struct StanzaJob<'a> {
    pub file: &'a str,
    pub describe: String,
    pub line: usize,
    pub top_level: bool,
    /// The directive line followed by every line nested under it.
    pub lines: &'a [SourceLine],
}

/// Where a submitted directive ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Caller runs it in this process.
    InProcess,
    /// A worker owns it; the caller skips the stanza.
    Delegated { pid: u32 },
}

struct Outstanding {
    file: String,
    describe: String,
    line: usize,
    child: Child,
    buffers: Vec<PrivateBuffer>,
}

/// Bounded pool of worker processes for one script file.
pub struct JobScheduler {
    max_jobs: usize,
    worker: Option<WorkerCommand>,
    outstanding: IndexMap<u32, Outstanding>,
    failures: usize,
}

impl JobScheduler {
    pub fn new(max_jobs: usize, worker: Option<WorkerCommand>) -> Self {
        Self {
            max_jobs: max_jobs.max(1),
            worker,
            outstanding: IndexMap::new(),
            failures: 0,
        }
    }

    /// Scheduler that never delegates.
    pub fn in_process() -> Self {
        Self::new(1, None)
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    pub fn set_max_jobs(&mut self, max_jobs: usize) {
        self.max_jobs = max_jobs.max(1);
    }

    /// Workers spawned and not yet reaped.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Delegated directives whose worker exited nonzero.
    pub fn failures(&self) -> usize {
        self.failures
    }

    fn eligible(&self, ctx: &Context, top_level: bool) -> bool {
        !ctx.is_worker() && top_level && self.max_jobs > 1 && self.worker.is_some()
    }

    /// Block until a worker slot is free. No-op when the directive would run in-process.
    pub fn wait_for_slot(&mut self, ctx: &mut Context, top_level: bool) -> Result<(), UnitError> {
        if !self.eligible(ctx, top_level) {
            return Ok(());
        }
        while self.outstanding.len() >= self.max_jobs {
            self.reap_one(ctx)?;
        }
        Ok(())
    }

    /// Decide where a directive runs, spawning a worker if it is delegated.
    pub fn submit(&mut self, ctx: &mut Context, job: StanzaJob<'_>) -> Result<Submission, UnitError> {
        if !self.eligible(ctx, job.top_level) {
            return Ok(Submission::InProcess);
        }
        self.wait_for_slot(ctx, job.top_level)?;
        match self.spawn(ctx, &job) {
            Ok(pid) => Ok(Submission::Delegated { pid }),
            Err(e) => {
                ctx.warn(&format!(
                    "cannot start worker for '{}', running in-process: {}",
                    job.describe, e
                ));
                Ok(Submission::InProcess)
            }
        }
    }

    fn spawn(&mut self, ctx: &mut Context, job: &StanzaJob<'_>) -> Result<u32, String> {
        let command = self
            .worker
            .as_ref()
            .ok_or_else(|| "no worker command".to_string())?;
        let buffers = ctx.logs.allocate_private_buffers()?;
        let payload = WorkerJob {
            file: job.file.to_string(),
            lines: job.lines.to_vec(),
            persist: ctx.persist(),
            sinks: ctx.logs.specs(),
            buffers: buffers.iter().map(|b| b.path().to_path_buf()).collect(),
            events: ctx.events_path().map(|p| p.to_path_buf()),
        };
        let payload =
            serde_json::to_vec(&payload).map_err(|e| format!("JSON serialize error: {}", e))?;

        // Anything still buffered would otherwise be duplicated or reordered.
        ctx.logs.flush();
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", command.program.display(), e))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("stdin write error: {}", e));
            }
        }

        let pid = child.id();
        ctx.logs.log(
            &format!("worker {} started for '{}'", pid, job.describe),
            "",
            DETAIL,
            false,
        );
        ctx.emit(RunEvent::WorkerSpawned {
            file: job.file.to_string(),
            line: job.line,
            directive: job.describe.clone(),
            pid,
        });
        self.outstanding.insert(
            pid,
            Outstanding {
                file: job.file.to_string(),
                describe: job.describe.clone(),
                line: job.line,
                child,
                buffers,
            },
        );
        Ok(pid)
    }

    /// Wait for any one outstanding worker to exit and merge it.
    pub fn reap_one(&mut self, ctx: &mut Context) -> Result<(), UnitError> {
        if self.outstanding.is_empty() {
            return Ok(());
        }
        loop {
            if ctx.interrupted() {
                self.terminate_all(ctx);
                return Err(UnitError::Interrupted);
            }
            let mut exited = None;
            for (pid, job) in self.outstanding.iter_mut() {
                match job.child.try_wait() {
                    Ok(Some(status)) => {
                        exited = Some((*pid, Ok(status)));
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        exited = Some((*pid, Err(e.to_string())));
                        break;
                    }
                }
            }
            if let Some((pid, status)) = exited {
                if let Some(job) = self.outstanding.shift_remove(&pid) {
                    self.settle(ctx, pid, job, status);
                }
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait for every outstanding worker.
    pub fn drain(&mut self, ctx: &mut Context) -> Result<(), UnitError> {
        while !self.outstanding.is_empty() {
            self.reap_one(ctx)?;
        }
        Ok(())
    }

    /// Kill every outstanding worker, then reap and merge each one.
    pub fn terminate_all(&mut self, ctx: &mut Context) {
        for job in self.outstanding.values_mut() {
            let _ = job.child.kill();
        }
        let pids: Vec<u32> = self.outstanding.keys().copied().collect();
        for pid in pids {
            if let Some(mut job) = self.outstanding.shift_remove(&pid) {
                let status = job.child.wait().map_err(|e| e.to_string());
                self.settle(ctx, pid, job, status);
            }
        }
    }

    fn settle(
        &mut self,
        ctx: &mut Context,
        pid: u32,
        job: Outstanding,
        status: Result<ExitStatus, String>,
    ) {
        if let Err(e) = ctx.logs.merge(job.buffers) {
            ctx.warn(&format!("lost output of worker {}: {}", pid, e));
        }
        let code = match &status {
            Ok(s) => s.code(),
            Err(_) => None,
        };
        let passed = matches!(&status, Ok(s) if s.success());
        ctx.emit(RunEvent::WorkerReaped {
            file: job.file.clone(),
            line: job.line,
            directive: job.describe.clone(),
            pid,
            exit_code: code,
        });
        ctx.tally(passed);
        if passed {
            return;
        }

        self.failures += 1;
        let err = UnitError::WorkerExit {
            directive: job.describe.clone(),
            pid,
            code,
        };
        let mut trace = format!("in {}:{}: {}", job.file, job.line, job.describe);
        if let Err(e) = &status {
            trace.push_str(&format!("\nwait error: {}", e));
        }
        // A worker that ran to a normal failure already logged its own FAIL line.
        if code != Some(super::types::WORKER_FAILED) {
            ctx.logs.log(&job.describe, "FAIL", NORMAL, false);
        }
        ctx.logs.log_exception(err.kind(), &err.to_string(), &trace, DETAIL);
        ctx.note_failure(err.to_string());
    }
}

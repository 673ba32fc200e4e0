//! SZ-014: Batch runner — files in order under one failure policy.

use super::context::Context;
use super::registry::Registry;
use super::scheduler::{JobScheduler, WorkerCommand};
use super::script::ScriptFile;
use super::types::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::logs::eventlog::{generate_run_id, RunEvent};
use crate::logs::{ALWAYS, NORMAL};
use std::path::PathBuf;

/// Outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub files_passed: usize,
    pub files_failed: usize,
    /// Never started because the batch gave up or was interrupted
    pub files_skipped: usize,
    pub directives_passed: usize,
    pub directives_failed: usize,
    pub interrupted: bool,
}

impl BatchReport {
    pub fn success(&self) -> bool {
        !self.interrupted && self.files_failed == 0 && self.files_skipped == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }

    fn total(&self) -> usize {
        self.files_passed + self.files_failed + self.files_skipped
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        let directives = format!(
            "{} directive(s) passed, {} failed",
            self.directives_passed, self.directives_failed
        );
        if self.interrupted {
            format!("INTERRUPTED: {} of {} file(s) run; {}", self.files_passed + self.files_failed, self.total(), directives)
        } else if self.success() {
            format!("PASS: {} file(s); {}", self.files_passed, directives)
        } else {
            format!(
                "FAIL: {} of {} file(s) failed, {} skipped; {}",
                self.files_failed,
                self.total(),
                self.files_skipped,
                directives
            )
        }
    }
}

/// Drives script files one after another.
pub struct BatchRunner<'r> {
    registry: &'r Registry,
    max_jobs: usize,
    worker: Option<WorkerCommand>,
}

impl<'r> BatchRunner<'r> {
    pub fn new(registry: &'r Registry, max_jobs: usize) -> Self {
        Self {
            registry,
            max_jobs: max_jobs.max(1),
            worker: None,
        }
    }

    /// How to start workers. Without one every directive runs in-process.
    pub fn with_worker(mut self, worker: Option<WorkerCommand>) -> Self {
        self.worker = worker;
        self
    }

    pub fn run(&self, ctx: &mut Context, files: &[PathBuf]) -> BatchReport {
        let run_id = generate_run_id();
        ctx.emit(RunEvent::BatchStarted {
            run_id: run_id.clone(),
            files: files.len(),
            max_jobs: self.max_jobs,
            persist: ctx.persist(),
        });

        let mut report = BatchReport::default();
        for (i, path) in files.iter().enumerate() {
            if ctx.interrupted() || ctx.giveup() {
                report.files_skipped = files.len() - i;
                break;
            }
            let scheduler = JobScheduler::new(self.max_jobs, self.worker.clone());
            let mut file = match ScriptFile::load(path, self.registry, scheduler) {
                Ok(file) => file,
                Err(e) => {
                    ctx.logs.log(&format!("error: {}", e), "", ALWAYS, false);
                    ctx.note_failure(e);
                    report.files_failed += 1;
                    continue;
                }
            };
            match file.run(ctx) {
                Ok(true) => report.files_passed += 1,
                Ok(false) => report.files_failed += 1,
                Err(err) => {
                    ctx.logs
                        .log_exception(err.kind(), &err.to_string(), &format!("in {}", file.label()), NORMAL);
                    report.files_failed += 1;
                    report.files_skipped = files.len() - i - 1;
                    break;
                }
            }
        }

        report.interrupted = ctx.interrupted();
        (report.directives_passed, report.directives_failed) = ctx.tallies();
        if report.files_skipped > 0 && !report.interrupted {
            ctx.logs.log(
                &format!("giving up: {} file(s) not run", report.files_skipped),
                "",
                NORMAL,
                false,
            );
        }
        self.summarize(ctx, &report);
        ctx.emit(RunEvent::BatchCompleted {
            run_id,
            files_passed: report.files_passed,
            files_failed: report.files_failed,
            interrupted: report.interrupted,
        });
        ctx.logs.flush();
        report
    }

    fn summarize(&self, ctx: &mut Context, report: &BatchReport) {
        let failures: Vec<String> = ctx.failures().to_vec();
        if !failures.is_empty() {
            ctx.logs.log("failures:", "", NORMAL, false);
            for failure in &failures {
                ctx.logs.log(&format!("  {}", failure), "", NORMAL, false);
            }
        }
        let mut summary = report.summary();
        if let Some(path) = ctx.logs.detail_log() {
            summary.push_str(&format!("; details in {}", path.display()));
        }
        ctx.logs.log(&summary, "", ALWAYS, false);
    }
}

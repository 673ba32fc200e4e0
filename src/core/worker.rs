//! SZ-013: Worker side of delegation.
//!
//! A worker receives one top-level stanza as a JSON [`WorkerJob`] on stdin,
//! binds every sink to the private buffer the parent allocated for it, runs
//! the stanza in-process and reports the outcome only through its exit status.

use super::context::Context;
use super::parser::SourceLine;
use super::registry::Registry;
use super::scheduler::JobScheduler;
use super::script::ScriptFile;
use super::types::{UnitError, EXIT_SUCCESS, WORKER_FAILED, WORKER_INTERRUPTED};
use crate::logs::{LogAggregator, SinkSpec};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Everything a worker needs, sent by the parent at spawn time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerJob {
    /// Label of the script the stanza came from
    pub file: String,
    /// The directive line and every line nested under it
    pub lines: Vec<SourceLine>,
    pub persist: bool,
    /// One per parent sink, in sink order
    pub sinks: Vec<SinkSpec>,
    /// Private buffer for each sink, same order
    pub buffers: Vec<PathBuf>,
    #[serde(default)]
    pub events: Option<PathBuf>,
}

/// Decode a job from the parent.
pub fn read_job(input: impl Read) -> Result<WorkerJob, String> {
    serde_json::from_reader(input).map_err(|e| format!("invalid worker job: {}", e))
}

/// Run one delegated stanza and return the process exit status.
pub fn run_worker(registry: &Registry, input: impl Read, interrupt: Arc<AtomicBool>) -> i32 {
    let job = match read_job(input) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("stanza worker: {}", e);
            return WORKER_FAILED;
        }
    };

    let mut logs = LogAggregator::from_specs(&job.sinks);
    if let Err(e) = logs.bind(&job.buffers) {
        eprintln!("stanza worker: {}", e);
        return WORKER_FAILED;
    }
    let mut ctx = Context::new(logs, job.persist)
        .with_events(job.events)
        .with_interrupt(interrupt)
        .into_worker();

    let mut file = ScriptFile::from_lines(&job.file, job.lines, registry, JobScheduler::in_process());
    let code = match file.run(&mut ctx) {
        Ok(true) => EXIT_SUCCESS,
        Ok(false) => WORKER_FAILED,
        Err(UnitError::Interrupted) => WORKER_INTERRUPTED,
        Err(_) => WORKER_FAILED,
    };
    ctx.logs.flush();
    ctx.logs.unbind();
    code
}

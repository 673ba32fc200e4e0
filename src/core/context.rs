//! SZ-005: Batch context — the state shared by everything in one process.
//!
//! Created at batch start and passed explicitly through the runner, files,
//! scheduler and directives. A worker builds its own from the job it receives.

use crate::logs::eventlog::{self, RunEvent};
use crate::logs::{LogAggregator, ALWAYS, NORMAL};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Explicit per-batch state.
pub struct Context {
    pub logs: LogAggregator,
    events: Option<PathBuf>,
    interrupt: Arc<AtomicBool>,
    worker: bool,
    persist: bool,
    giveup: bool,
    failures: Vec<String>,
    passed: usize,
    failed: usize,
    indent: usize,
}

impl Context {
    pub fn new(logs: LogAggregator, persist: bool) -> Self {
        Self {
            logs,
            events: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            worker: false,
            persist,
            giveup: false,
            failures: Vec::new(),
            passed: 0,
            failed: 0,
            indent: 0,
        }
    }

    /// Record run events to a JSONL file.
    pub fn with_events(mut self, path: Option<PathBuf>) -> Self {
        self.events = path;
        self
    }

    /// Share an interrupt flag set from outside (e.g. a signal handler).
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// Mark this process as a worker; workers never spawn workers.
    pub fn into_worker(mut self) -> Self {
        self.worker = true;
        self
    }

    pub fn is_worker(&self) -> bool {
        self.worker
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    pub fn events_path(&self) -> Option<&Path> {
        self.events.as_deref()
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn request_interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// True once a failure happened and the batch does not persist.
    pub fn giveup(&self) -> bool {
        self.giveup
    }

    /// Record a failure; trips `giveup` unless the batch persists.
    pub fn note_failure(&mut self, what: impl Into<String>) {
        self.failures.push(what.into());
        if !self.persist {
            self.giveup = true;
        }
    }

    /// One line per recorded failure, in the order they happened.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Count the outcome of one top-level directive.
    pub fn tally(&mut self, passed: bool) {
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    /// `(passed, failed)` top-level directive counts.
    pub fn tallies(&self) -> (usize, usize) {
        (self.passed, self.failed)
    }

    /// Nesting depth used to indent directive output.
    pub fn set_indent(&mut self, depth: usize) {
        self.indent = depth;
    }

    /// Log a directive's own message, indented under it.
    pub fn say(&mut self, level: u8, message: &str) {
        let text = format!("{}{}", "  ".repeat(self.indent + 1), message);
        self.logs.log(&text, "", level, false);
    }

    /// Warn on every sink.
    pub fn warn(&mut self, message: &str) {
        self.logs.log(&format!("warning: {}", message), "", ALWAYS, false);
    }

    /// Progress line on interactive sinks.
    pub fn progress(&mut self, message: &str) {
        self.logs.log(message, "", NORMAL, true);
    }

    /// Append to the event log if one is configured. Failures to write are ignored.
    pub fn emit(&self, event: RunEvent) {
        if let Some(path) = &self.events {
            let _ = eventlog::append_event(path, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{MemoryBuffer, Sink, VERBOSE};

    #[test]
    fn test_sz005_giveup_without_persist() {
        let mut ctx = Context::new(LogAggregator::new(), false);
        assert!(!ctx.giveup());
        ctx.note_failure("a.stz:1: fail");
        assert!(ctx.giveup());
        assert_eq!(ctx.failures(), ["a.stz:1: fail".to_string()]);
    }

    #[test]
    fn test_sz005_persist_never_gives_up() {
        let mut ctx = Context::new(LogAggregator::new(), true);
        ctx.note_failure("x");
        ctx.note_failure("y");
        assert!(!ctx.giveup());
        assert_eq!(ctx.failures().len(), 2);
    }

    #[test]
    fn test_sz005_interrupt_flag_shared() {
        let ctx = Context::new(LogAggregator::new(), false);
        let flag = ctx.interrupt_flag();
        assert!(!ctx.interrupted());
        flag.store(true, Ordering::SeqCst);
        assert!(ctx.interrupted());
    }

    #[test]
    fn test_sz005_say_indents() {
        let buf = MemoryBuffer::new();
        let logs = LogAggregator::new().with_sink(Sink::memory("m", VERBOSE, false, buf.clone()));
        let mut ctx = Context::new(logs, false);
        ctx.set_indent(1);
        ctx.say(VERBOSE, "hello");
        assert_eq!(buf.contents(), "    hello\n");
    }

    #[test]
    fn test_sz005_tally_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let events = dir.path().join("events.jsonl");
        let mut ctx = Context::new(LogAggregator::new(), false).with_events(Some(events.clone()));
        ctx.tally(true);
        ctx.tally(false);
        ctx.tally(true);
        assert_eq!(ctx.tallies(), (2, 1));
        ctx.emit(RunEvent::FileStarted { file: "a".into() });
        assert!(std::fs::read_to_string(events).unwrap().contains("file_started"));
        assert!(!ctx.into_worker().persist());
    }
}

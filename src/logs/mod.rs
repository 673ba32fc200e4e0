//! SZ-011: Log aggregation — one message, many thresholded sinks.
//!
//! Workers get one private buffer per sink; the parent splices a worker's
//! buffers into its own sinks when the worker is reaped. Reap order, not spawn
//! order, decides where a worker's output lands.

pub mod eventlog;
pub mod sink;

pub use sink::{MemoryBuffer, Sink, SinkConfig, SinkKind, SinkSpec};

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Always written (summaries, hard errors).
pub const ALWAYS: u8 = 0;
/// Per-directive PASS/FAIL lines.
pub const NORMAL: u8 = 1;
/// Nested directives and directive output.
pub const VERBOSE: u8 = 2;
/// Traces and scheduler bookkeeping.
pub const DETAIL: u8 = 3;

/// Temporary file standing in for one sink while a worker runs.
#[derive(Debug)]
pub struct PrivateBuffer {
    file: tempfile::NamedTempFile,
}

impl PrivateBuffer {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Fans messages out to every sink whose threshold admits them.
#[derive(Default)]
pub struct LogAggregator {
    sinks: Vec<Sink>,
}

/// Pad `message` so `status` lines up in a column.
pub fn format_line(message: &str, status: &str) -> String {
    if status.is_empty() {
        message.to_string()
    } else {
        format!("{:<width$} {}", message, status, width = sink::STATUS_COLUMN)
    }
}

impl LogAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Open every sink declared in the config.
    pub fn from_configs(configs: &[SinkConfig]) -> Result<Self, String> {
        let sinks = configs.iter().map(Sink::open).collect::<Result<_, _>>()?;
        Ok(Self { sinks })
    }

    /// Detached sinks matching a parent's specs, for a worker to bind.
    pub fn from_specs(specs: &[SinkSpec]) -> Self {
        Self {
            sinks: specs.iter().cloned().map(Sink::detached).collect(),
        }
    }

    pub fn specs(&self) -> Vec<SinkSpec> {
        self.sinks.iter().map(|s| s.spec().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Write one message to every sink with `threshold >= level`.
    ///
    /// Progress messages overwrite the current line on interactive sinks and
    /// are dropped everywhere else.
    pub fn log(&mut self, message: &str, status: &str, level: u8, progress: bool) {
        let line = format_line(message, status);
        for sink in self.sinks.iter_mut().filter(|s| s.accepts(level)) {
            let _ = if progress {
                sink.write_progress(&line)
            } else {
                sink.write_line(&line)
            };
        }
    }

    /// Write an error headline followed by its trace. `level` is capped at
    /// the most verbose sink, so the trace is never dropped entirely.
    pub fn log_exception(&mut self, kind: &str, value: &str, trace: &str, level: u8) {
        let ceiling = self.sinks.iter().map(Sink::threshold).max().unwrap_or(level);
        let level = level.min(ceiling);
        let mut text = format!("{}: {}", kind, value);
        for line in trace.lines() {
            text.push_str("\n    ");
            text.push_str(line);
        }
        for sink in self.sinks.iter_mut().filter(|s| s.accepts(level)) {
            let _ = sink.write_line(&text);
        }
    }

    /// One fresh temp file per sink, in sink order.
    pub fn allocate_private_buffers(&self) -> Result<Vec<PrivateBuffer>, String> {
        self.sinks
            .iter()
            .map(|_| {
                tempfile::Builder::new()
                    .prefix("stanza-log-")
                    .suffix(".buf")
                    .tempfile()
                    .map(|file| PrivateBuffer { file })
                    .map_err(|e| format!("cannot allocate log buffer: {}", e))
            })
            .collect()
    }

    /// Repoint every sink at the matching buffer path.
    ///
    /// All buffers are opened before any sink switches, so a failure leaves
    /// every sink on its previous target.
    pub fn bind(&mut self, paths: &[PathBuf]) -> Result<(), String> {
        if paths.len() != self.sinks.len() {
            return Err(format!(
                "{} buffer(s) for {} sink(s)",
                paths.len(),
                self.sinks.len()
            ));
        }
        let files = paths
            .iter()
            .map(|p| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(p)
                    .map_err(|e| format!("cannot open log buffer {}: {}", p.display(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for (sink, file) in self.sinks.iter_mut().zip(files) {
            sink.redirect(file);
        }
        Ok(())
    }

    /// Point every sink back at its real destination.
    pub fn unbind(&mut self) {
        for sink in &mut self.sinks {
            sink.restore();
        }
    }

    /// Append each buffer to its sink's real destination, then delete the buffers.
    pub fn merge(&mut self, buffers: Vec<PrivateBuffer>) -> Result<(), String> {
        if buffers.len() != self.sinks.len() {
            return Err(format!(
                "{} buffer(s) for {} sink(s)",
                buffers.len(),
                self.sinks.len()
            ));
        }
        let mut first_error = None;
        for (sink, buffer) in self.sinks.iter_mut().zip(buffers) {
            let result = std::fs::read(buffer.path())
                .and_then(|content| sink.append_real(&content))
                .map_err(|e| format!("cannot merge {}: {}", buffer.path().display(), e));
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn flush(&mut self) {
        for sink in &mut self.sinks {
            let _ = sink.flush();
        }
    }

    /// The most verbose file sink, for pointing users at details.
    pub fn detail_log(&self) -> Option<&Path> {
        self.sinks
            .iter()
            .filter(|s| s.path().is_some())
            .max_by_key(|s| s.threshold())
            .and_then(|s| s.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn two_sinks() -> (LogAggregator, MemoryBuffer, MemoryBuffer) {
        let quiet = MemoryBuffer::new();
        let loud = MemoryBuffer::new();
        let logs = LogAggregator::new()
            .with_sink(Sink::memory("quiet", NORMAL, false, quiet.clone()))
            .with_sink(Sink::memory("loud", DETAIL, false, loud.clone()));
        (logs, quiet, loud)
    }

    #[test]
    fn test_sz011_thresholds() {
        let (mut logs, quiet, loud) = two_sinks();
        logs.log("summary", "", ALWAYS, false);
        logs.log("nested", "", VERBOSE, false);
        assert_eq!(quiet.contents(), "summary\n");
        assert_eq!(loud.contents(), "summary\nnested\n");
    }

    #[test]
    fn test_sz011_status_column() {
        let line = format_line("echo hi", "PASS");
        assert!(line.starts_with("echo hi "));
        assert!(line.ends_with(" PASS"));
        assert_eq!(line.len(), sink::STATUS_COLUMN + 1 + 4);
        assert_eq!(format_line("plain", ""), "plain");
    }

    #[test]
    fn test_sz011_log_exception() {
        let (mut logs, quiet, loud) = two_sinks();
        logs.log_exception("ExecutionError", "boom", "in a.stz:1: fail\nin a.stz:0", DETAIL);
        assert_eq!(quiet.contents(), "");
        assert_eq!(
            loud.contents(),
            "ExecutionError: boom\n    in a.stz:1: fail\n    in a.stz:0\n"
        );
    }

    #[test]
    fn test_sz011_exception_reaches_most_verbose_sink() {
        let console = MemoryBuffer::new();
        let mut logs = LogAggregator::new().with_sink(Sink::memory("console", NORMAL, false, console.clone()));
        logs.log_exception("ExecutionError", "boom", "in a.stz:1: fail", DETAIL);
        assert_eq!(console.contents(), "ExecutionError: boom\n    in a.stz:1: fail\n");

        let quiet = MemoryBuffer::new();
        let verbose = MemoryBuffer::new();
        let mut logs = LogAggregator::new()
            .with_sink(Sink::memory("quiet", ALWAYS, false, quiet.clone()))
            .with_sink(Sink::memory("verbose", VERBOSE, false, verbose.clone()));
        logs.log_exception("ExecutionError", "boom", "in a.stz:1: fail", DETAIL);
        assert_eq!(quiet.contents(), "");
        assert!(verbose.contents().starts_with("ExecutionError: boom"));
    }

    #[test]
    fn test_sz011_bind_and_merge() {
        let (mut logs, quiet, loud) = two_sinks();
        let buffers = logs.allocate_private_buffers().unwrap();
        assert_eq!(buffers.len(), 2);
        let paths: Vec<_> = buffers.iter().map(|b| b.path().to_path_buf()).collect();

        logs.log("before", "", NORMAL, false);
        logs.bind(&paths).unwrap();
        logs.log("inside", "", NORMAL, false);
        logs.log("deep", "", DETAIL, false);
        logs.unbind();
        logs.log("after", "", NORMAL, false);
        logs.merge(buffers).unwrap();

        assert_eq!(quiet.contents(), "before\nafter\ninside\n");
        assert_eq!(loud.contents(), "before\nafter\ninside\ndeep\n");
        for p in &paths {
            assert!(!p.exists(), "merged buffer should be deleted");
        }
    }

    #[test]
    fn test_sz011_merge_is_concatenation_in_reap_order() {
        let (mut logs, quiet, _loud) = two_sinks();
        let first = logs.allocate_private_buffers().unwrap();
        let second = logs.allocate_private_buffers().unwrap();
        for (buffers, tag) in [(&first, "one"), (&second, "two")] {
            for b in buffers.iter() {
                let mut f = OpenOptions::new().append(true).open(b.path()).unwrap();
                writeln!(f, "{}-a", tag).unwrap();
                writeln!(f, "{}-b", tag).unwrap();
            }
        }
        logs.log("parent", "", NORMAL, false);
        // second worker reaped first
        logs.merge(second).unwrap();
        logs.log("between", "", NORMAL, false);
        logs.merge(first).unwrap();
        assert_eq!(
            quiet.contents(),
            "parent\ntwo-a\ntwo-b\nbetween\none-a\none-b\n"
        );
    }

    #[test]
    fn test_sz011_bind_wrong_count() {
        let (mut logs, _, _) = two_sinks();
        assert!(logs.bind(&[PathBuf::from("/tmp/x")]).is_err());
        let err = logs.merge(Vec::new()).unwrap_err();
        assert!(err.contains("0 buffer(s) for 2 sink(s)"));
    }

    #[test]
    fn test_sz011_bind_failure_keeps_targets() {
        let (mut logs, quiet, _) = two_sinks();
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("ok");
        let bad = dir.path().join("missing/dir/buf");
        assert!(logs.bind(&[good, bad]).is_err());
        logs.log("still real", "", NORMAL, false);
        assert_eq!(quiet.contents(), "still real\n");
    }

    #[test]
    fn test_sz011_worker_side_specs() {
        let (logs, _, _) = two_sinks();
        let specs = logs.specs();
        let mut worker = LogAggregator::from_specs(&specs);
        assert_eq!(worker.len(), 2);
        assert_eq!(worker.specs(), specs);
        let buffers = logs.allocate_private_buffers().unwrap();
        let paths: Vec<_> = buffers.iter().map(|b| b.path().to_path_buf()).collect();
        worker.bind(&paths).unwrap();
        worker.log("from worker", "PASS", NORMAL, false);
        worker.log("verbose only", "", VERBOSE, false);
        worker.flush();
        let quiet = std::fs::read_to_string(&paths[0]).unwrap();
        let loud = std::fs::read_to_string(&paths[1]).unwrap();
        assert!(quiet.starts_with("from worker"));
        assert!(!quiet.contains("verbose only"));
        assert!(loud.contains("verbose only"));
    }

    #[test]
    fn test_sz011_detail_log() {
        let dir = tempfile::tempdir().unwrap();
        let normal = dir.path().join("normal.log");
        let detail = dir.path().join("detail.log");
        let logs = LogAggregator::new()
            .with_sink(Sink::console(NORMAL))
            .with_sink(Sink::file(&normal, NORMAL).unwrap())
            .with_sink(Sink::file(&detail, DETAIL).unwrap());
        assert_eq!(logs.detail_log(), Some(detail.as_path()));
        assert_eq!(LogAggregator::new().detail_log(), None);
    }
}

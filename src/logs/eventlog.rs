//! SZ-012: Append-only JSONL run event log.
//!
//! Parent and workers append to the same file; each record is one `write`
//! of a single line.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Something worth recording about a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    BatchStarted {
        run_id: String,
        files: usize,
        max_jobs: usize,
        persist: bool,
    },
    FileStarted {
        file: String,
    },
    UnitFinished {
        file: String,
        line: usize,
        directive: String,
        passed: bool,
    },
    WorkerSpawned {
        file: String,
        line: usize,
        directive: String,
        pid: u32,
    },
    WorkerReaped {
        file: String,
        line: usize,
        directive: String,
        pid: u32,
        exit_code: Option<i32>,
    },
    BatchCompleted {
        run_id: String,
        files_passed: usize,
        files_failed: usize,
        interrupted: bool,
    },
}

/// Event plus when and where it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    pub pid: u32,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso8601() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_utc(secs)
}

fn format_utc(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

/// Identifier for one batch run.
pub fn generate_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("run-{:08x}-{:x}", std::process::id(), nanos & 0xFFFF_FFFF_FFFF)
}

/// Append one event to the log at `path`.
pub fn append_event(path: &Path, event: RunEvent) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create event log dir: {}", e))?;
    }
    let record = TimestampedEvent {
        ts: now_iso8601(),
        pid: std::process::id(),
        event,
    };
    let mut line =
        serde_json::to_string(&record).map_err(|e| format!("JSON serialize error: {}", e))?;
    line.push('\n');

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| format!("write error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sz012_format_utc() {
        assert_eq!(format_utc(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_utc(951_782_400), "2000-02-29T00:00:00Z");
        assert_eq!(format_utc(1_700_000_000), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_sz012_now_shape() {
        let ts = now_iso8601();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_sz012_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("run-"));
    }

    #[test]
    fn test_sz012_append_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/events.jsonl");
        append_event(
            &path,
            RunEvent::FileStarted {
                file: "a.stz".into(),
            },
        )
        .unwrap();
        append_event(
            &path,
            RunEvent::WorkerReaped {
                file: "a.stz".into(),
                line: 4,
                directive: "group x".into(),
                pid: 77,
                exit_code: Some(1),
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"event\":\"file_started\""));
        let parsed: TimestampedEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(
            parsed.event,
            RunEvent::WorkerReaped {
                file: "a.stz".into(),
                line: 4,
                directive: "group x".into(),
                pid: 77,
                exit_code: Some(1),
            }
        );
    }
}

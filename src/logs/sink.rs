//! SZ-010: Log sinks — thresholded, redirectable output targets.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Column at which status text is aligned.
pub const STATUS_COLUMN: usize = 56;

/// Sink type in the batch config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Console,
    File,
}

/// A sink as declared in the batch config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub kind: SinkKind,

    /// Destination file (file sinks only)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Verbosity threshold; messages at or below it are written
    #[serde(default = "default_level")]
    pub level: u8,
}

fn default_level() -> u8 {
    super::NORMAL
}

/// What a worker needs to rebuild a sink on its side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkSpec {
    pub name: String,
    pub threshold: u8,
    pub interactive: bool,
}

/// Shared in-memory destination.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer(Arc<Mutex<Vec<u8>>>);

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).to_string()
    }

    fn append(&self, buf: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
    }
}

enum Target {
    Stdout,
    File(File),
    Memory(MemoryBuffer),
    Discard,
}

impl Write for Target {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout => io::stdout().write(buf),
            Self::File(f) => f.write(buf),
            Self::Memory(m) => {
                m.append(buf);
                Ok(buf.len())
            }
            Self::Discard => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout => io::stdout().flush(),
            Self::File(f) => f.flush(),
            Self::Memory(_) | Self::Discard => Ok(()),
        }
    }
}

/// One output destination with its own verbosity threshold.
pub struct Sink {
    spec: SinkSpec,
    path: Option<PathBuf>,
    real: Target,
    redirect: Option<File>,
    progress_shown: bool,
}

impl Sink {
    /// Standard output; interactive when stdout is a terminal.
    pub fn console(threshold: u8) -> Self {
        Self {
            spec: SinkSpec {
                name: "console".to_string(),
                threshold,
                interactive: io::stdout().is_terminal(),
            },
            path: None,
            real: Target::Stdout,
            redirect: None,
            progress_shown: false,
        }
    }

    /// A log file, truncated on open.
    pub fn file(path: &Path, threshold: u8) -> Result<Self, String> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create log dir {}: {}", parent.display(), e))?;
        }
        let file = File::create(path)
            .map_err(|e| format!("cannot open log file {}: {}", path.display(), e))?;
        Ok(Self {
            spec: SinkSpec {
                name: path.display().to_string(),
                threshold,
                interactive: false,
            },
            path: Some(path.to_path_buf()),
            real: Target::File(file),
            redirect: None,
            progress_shown: false,
        })
    }

    /// An in-memory sink.
    pub fn memory(name: &str, threshold: u8, interactive: bool, buffer: MemoryBuffer) -> Self {
        Self {
            spec: SinkSpec {
                name: name.to_string(),
                threshold,
                interactive,
            },
            path: None,
            real: Target::Memory(buffer),
            redirect: None,
            progress_shown: false,
        }
    }

    /// A sink with no real destination, used by workers before binding.
    pub fn detached(spec: SinkSpec) -> Self {
        Self {
            spec,
            path: None,
            real: Target::Discard,
            redirect: None,
            progress_shown: false,
        }
    }

    /// Build a sink from its config entry.
    pub fn open(config: &SinkConfig) -> Result<Self, String> {
        match config.kind {
            SinkKind::Console => Ok(Self::console(config.level)),
            SinkKind::File => {
                let path = config
                    .path
                    .as_deref()
                    .ok_or_else(|| "file sink needs a path".to_string())?;
                Self::file(path, config.level)
            }
        }
    }

    pub fn spec(&self) -> &SinkSpec {
        &self.spec
    }

    pub fn threshold(&self) -> u8 {
        self.spec.threshold
    }

    /// Real destination path for file sinks.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn accepts(&self, level: u8) -> bool {
        level <= self.spec.threshold
    }

    fn clear_progress(&mut self) -> io::Result<()> {
        if self.progress_shown {
            self.progress_shown = false;
            self.real.write_all(b"\r\x1b[K")?;
        }
        Ok(())
    }

    /// Write a full line to the current target.
    pub fn write_line(&mut self, text: &str) -> io::Result<()> {
        if let Some(file) = self.redirect.as_mut() {
            return writeln!(file, "{}", text);
        }
        self.clear_progress()?;
        writeln!(self.real, "{}", text)
    }

    /// Overwrite the current line. Dropped unless the sink is interactive and not redirected.
    pub fn write_progress(&mut self, text: &str) -> io::Result<()> {
        if !self.spec.interactive || self.redirect.is_some() {
            return Ok(());
        }
        write!(self.real, "\r\x1b[K{}", text)?;
        self.progress_shown = true;
        self.real.flush()
    }

    /// Point output at a private buffer until [`Sink::restore`].
    pub fn redirect(&mut self, file: File) {
        self.redirect = Some(file);
    }

    /// Point output back at the real destination.
    pub fn restore(&mut self) -> Option<File> {
        self.redirect.take()
    }

    /// Splice raw content into the real destination.
    pub fn append_real(&mut self, content: &[u8]) -> io::Result<()> {
        if content.is_empty() {
            return Ok(());
        }
        self.clear_progress()?;
        self.real.write_all(content)?;
        self.real.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.redirect.as_mut() {
            file.flush()?;
        }
        self.real.flush()
    }
}

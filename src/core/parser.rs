//! SZ-002: Script lexing.
//!
//! Turns raw script text into numbered lines and classifies each non-blank
//! line as an option assignment or a directive invocation:
//! - `# ...` comments are stripped (not quote-aware)
//! - indentation is measured with tabs expanded to an 8-column stop
//! - `name = value` is an option, `name argtext...` is a directive

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tab stop used when measuring indentation.
pub const TAB_STOP: usize = 8;

/// A malformed or structurally invalid script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(file: &str, line: usize, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// One raw line of a script, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    pub number: usize,
    pub text: String,
}

/// What a non-blank line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Option { name: String, value: String },
    Directive { name: String, args: String },
}

/// A classified, non-blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub number: usize,
    pub indent: usize,
    pub kind: LineKind,
}

/// Split script text into numbered source lines.
pub fn source_lines(text: &str) -> Vec<SourceLine> {
    text.lines()
        .enumerate()
        .map(|(i, l)| SourceLine {
            number: i + 1,
            text: l.to_string(),
        })
        .collect()
}

/// Drop everything from the first `#` on.
pub fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Width of the leading whitespace, tabs expanded to [`TAB_STOP`].
pub fn measure_indent(line: &str) -> usize {
    let mut col = 0;
    for c in line.chars() {
        match c {
            ' ' => col += 1,
            '\t' => col = (col / TAB_STOP + 1) * TAB_STOP,
            _ => break,
        }
    }
    col
}

/// Indentation of a source line, or `None` if it is blank after comment stripping.
pub fn line_indent(line: &SourceLine) -> Option<usize> {
    let body = strip_comment(&line.text);
    if body.trim().is_empty() {
        None
    } else {
        Some(measure_indent(body))
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Classify a source line. Returns `Ok(None)` for blank and comment-only lines.
pub fn lex_line(file: &str, line: &SourceLine) -> Result<Option<ScriptLine>, ParseError> {
    let body = strip_comment(&line.text);
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let indent = measure_indent(body);

    let name_end = trimmed
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(trimmed.len());
    let (name, rest) = trimmed.split_at(name_end);
    let rest = rest.trim_start();

    if name.is_empty() {
        return Err(ParseError::new(
            file,
            line.number,
            "malformed option: missing name before '='",
        ));
    }
    if !is_valid_name(name) {
        return Err(ParseError::new(
            file,
            line.number,
            format!("invalid name '{}'", name),
        ));
    }

    let kind = match rest.strip_prefix('=') {
        Some(value) => LineKind::Option {
            name: name.to_string(),
            value: value.trim().to_string(),
        },
        None => LineKind::Directive {
            name: name.to_string(),
            args: rest.to_string(),
        },
    };

    Ok(Some(ScriptLine {
        number: line.number,
        indent,
        kind,
    }))
}

/// Index one past the last line of the stanza opened by the directive just
/// before `start`: every following line that is blank or indented deeper than
/// `indent`.
pub fn stanza_end(lines: &[SourceLine], start: usize, indent: usize) -> usize {
    let mut end = start;
    while let Some(line) = lines.get(end) {
        match line_indent(line) {
            Some(level) if level <= indent => break,
            _ => end += 1,
        }
    }
    end
}

/// Options accepted at file level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOption {
    MaxJobs(usize),
}

/// Parse a file-level option assignment.
pub fn parse_file_option(name: &str, value: &str) -> Result<FileOption, String> {
    match name {
        "maxjobs" => match value.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(FileOption::MaxJobs(n)),
            _ => Err(format!("maxjobs must be a positive integer, got '{}'", value)),
        },
        other => Err(format!("unknown file option '{}'", other)),
    }
}

//! SZ-009: Script files — scanning one file through the stack machine.
//!
//! Lines are consumed one at a time. Each line first closes every open unit
//! at or deeper than its indentation, then is checked against the active
//! unit's subindent, then dispatched as an option or a directive. Top-level
//! directives are validated as a whole stanza and offered to the scheduler
//! before anything in them runs.

use super::context::Context;
use super::parser::{
    lex_line, parse_file_option, source_lines, stanza_end, FileOption, LineKind, ParseError,
    ScriptLine, SourceLine,
};
use super::registry::{Registry, ROOT_SCOPE};
use super::scheduler::{JobScheduler, StanzaJob, Submission};
use super::stack::ExecutionStack;
use super::types::{UnitError, UnitState};
use super::unit::Unit;
use super::validate::{check_structure, indent_error, option_after_nested};
use crate::logs::eventlog::RunEvent;
use crate::logs::{DETAIL, NORMAL, VERBOSE};
use std::path::Path;

/// One script being run: its lines, open units and worker pool.
pub struct ScriptFile<'r> {
    label: String,
    registry: &'r Registry,
    lines: Vec<SourceLine>,
    stack: ExecutionStack<Unit>,
    scheduler: JobScheduler,
    failed: bool,
}

fn describe(name: &str, args: &str) -> String {
    if args.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", name, args)
    }
}

impl<'r> ScriptFile<'r> {
    /// Read a script from disk.
    pub fn load(path: &Path, registry: &'r Registry, scheduler: JobScheduler) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        Ok(Self::from_source(
            &path.display().to_string(),
            &text,
            registry,
            scheduler,
        ))
    }

    pub fn from_source(label: &str, text: &str, registry: &'r Registry, scheduler: JobScheduler) -> Self {
        Self::from_lines(label, source_lines(text), registry, scheduler)
    }

    /// Lines keep their original numbers, so a worker's stanza reports the
    /// same positions as the parent file.
    pub fn from_lines(
        label: &str,
        lines: Vec<SourceLine>,
        registry: &'r Registry,
        scheduler: JobScheduler,
    ) -> Self {
        Self {
            label: label.to_string(),
            registry,
            lines,
            stack: ExecutionStack::new(),
            scheduler,
            failed: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Run the whole file. `Ok(passed)` unless the batch was interrupted.
    pub fn run(&mut self, ctx: &mut Context) -> Result<bool, UnitError> {
        if !ctx.is_worker() {
            ctx.emit(RunEvent::FileStarted {
                file: self.label.clone(),
            });
            ctx.logs
                .log(&format!("file {}", self.label), "", DETAIL, false);
        }

        let scanned = match self.scan(ctx) {
            Ok(()) if ctx.interrupted() => Err(UnitError::Interrupted),
            other => other,
        };
        match scanned {
            Ok(()) => self.close_to(ctx, 0),
            Err(UnitError::Parse(e)) => {
                let trace = self.trace(None);
                ctx.logs.log_exception("ParseError", &e.to_string(), &trace, NORMAL);
                ctx.note_failure(e.to_string());
                self.failed = true;
                self.abandon_all(ctx);
            }
            Err(err) => {
                self.scheduler.terminate_all(ctx);
                self.abandon_all(ctx);
                ctx.set_indent(0);
                return Err(err);
            }
        }

        let drained = self.scheduler.drain(ctx);
        ctx.set_indent(0);
        drained?;
        if self.scheduler.failures() > 0 {
            self.failed = true;
        }
        Ok(!self.failed)
    }

    fn scan(&mut self, ctx: &mut Context) -> Result<(), UnitError> {
        let mut idx = 0;
        while idx < self.lines.len() {
            if ctx.interrupted() {
                return Err(UnitError::Interrupted);
            }
            if ctx.giveup() {
                return Ok(());
            }
            let pos = idx;
            idx += 1;
            let Some(line) = lex_line(&self.label, &self.lines[pos])? else {
                continue;
            };

            self.close_to(ctx, line.indent);
            if ctx.interrupted() {
                return Err(UnitError::Interrupted);
            }
            if ctx.giveup() {
                return Ok(());
            }
            self.stack
                .bind_subindent(line.indent)
                .map_err(|expected| indent_error(&self.label, &line, expected))?;

            match &line.kind {
                LineKind::Option { name, value } => self.apply_option(ctx, &line, name, value)?,
                LineKind::Directive { name, args } => {
                    if self.stack.is_top_level() {
                        let end = stanza_end(&self.lines, idx, line.indent);
                        let stanza = &self.lines[pos..end];
                        check_structure(&self.label, self.registry, stanza)?;
                        self.scheduler.wait_for_slot(ctx, true)?;
                        if ctx.giveup() {
                            return Ok(());
                        }
                        let job = StanzaJob {
                            file: &self.label,
                            describe: describe(name, args),
                            line: line.number,
                            top_level: true,
                            lines: stanza,
                        };
                        if let Submission::Delegated { .. } = self.scheduler.submit(ctx, job)? {
                            idx = end;
                            continue;
                        }
                    }
                    self.open(ctx, &line, name, args)?;
                }
            }
        }
        Ok(())
    }

    fn apply_option(
        &mut self,
        ctx: &mut Context,
        line: &ScriptLine,
        name: &str,
        value: &str,
    ) -> Result<(), ParseError> {
        let trace = self.trace(None);
        let Some(frame) = self.stack.top_mut() else {
            let option = parse_file_option(name, value)
                .map_err(|m| ParseError::new(&self.label, line.number, m))?;
            match option {
                FileOption::MaxJobs(n) => {
                    self.scheduler.set_max_jobs(n);
                    ctx.logs
                        .log(&format!("maxjobs = {}", n), "", DETAIL, false);
                }
            }
            return Ok(());
        };
        if frame.nested {
            return Err(option_after_nested(&self.label, line, name, frame.item.name()));
        }
        frame.item.configure(ctx, name, value, &trace);
        Ok(())
    }

    fn open(&mut self, ctx: &mut Context, line: &ScriptLine, name: &str, args: &str) -> Result<(), ParseError> {
        let scope = self
            .stack
            .top()
            .map_or(Some(ROOT_SCOPE), |frame| frame.item.children());
        let spec = *self
            .registry
            .lookup(scope, name)
            .map_err(|m| ParseError::new(&self.label, line.number, m))?;

        let trace = self.trace(None);
        let depth = self.stack.depth();
        let runnable = match self.stack.top_mut() {
            Some(parent) => {
                ctx.set_indent(depth - 1);
                parent.item.start(ctx, &trace)
            }
            None => true,
        };
        let unit = if runnable {
            Unit::new(&spec, name, args, line.number)
        } else {
            Unit::skipped(&spec, name, args, line.number)
        };
        if depth == 0 {
            ctx.progress(&format!("running {}", unit.describe()));
        }
        self.stack.push(line.indent, unit);
        ctx.set_indent(self.stack.depth() - 1);
        Ok(())
    }

    /// Close every open unit whose indent is at or above `level`, innermost first.
    fn close_to(&mut self, ctx: &mut Context, level: usize) {
        while let Some(frame) = self.stack.pop_at_or_above(level) {
            let mut unit = frame.item;
            ctx.set_indent(self.stack.depth());
            let trace = self.trace(Some(&unit));
            let state = unit.finish(ctx, &trace);
            self.settle(ctx, unit, state);
        }
    }

    /// Close everything without starting anything new.
    fn abandon_all(&mut self, ctx: &mut Context) {
        while let Some(frame) = self.stack.pop() {
            let mut unit = frame.item;
            ctx.set_indent(self.stack.depth());
            let trace = self.trace(Some(&unit));
            let state = unit.abandon(ctx, &trace);
            self.settle(ctx, unit, state);
        }
    }

    fn settle(&mut self, ctx: &mut Context, unit: Unit, state: UnitState) {
        let depth = self.stack.depth();
        let passed = state == UnitState::Succeeded;
        let status = if unit.is_skipped() {
            "SKIP"
        } else if passed {
            "PASS"
        } else {
            "FAIL"
        };
        let level = if depth == 0 { NORMAL } else { VERBOSE };
        let message = format!("{}{}", "  ".repeat(depth), unit.describe());
        ctx.logs.log(&message, status, level, false);

        match self.stack.top_mut() {
            Some(parent) => {
                if !passed {
                    parent.item.fail_child();
                }
            }
            None => {
                ctx.tally(passed);
                if !passed {
                    self.failed = true;
                }
                ctx.emit(RunEvent::UnitFinished {
                    file: self.label.clone(),
                    line: unit.line(),
                    directive: unit.describe(),
                    passed,
                });
            }
        }
    }

    /// Open units innermost first, then the file.
    fn trace(&self, closing: Option<&Unit>) -> String {
        let mut trace = String::new();
        let units = closing.into_iter().chain(self.stack.iter().rev().map(|f| &f.item));
        for unit in units {
            trace.push_str(&format!("in {}:{}: {}\n", self.label, unit.line(), unit.describe()));
        }
        trace.push_str(&format!("in {}", self.label));
        trace
    }
}

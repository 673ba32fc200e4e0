//! SZ-006: Units — one directive instance and its lifecycle.
//!
//! `execute()` runs once, lazily: right before the first nested directive is
//! opened, or when the stanza closes if it has none. `cleanup()` runs at close
//! whenever `execute()` was attempted. Errors and panics from the handler are
//! caught here, logged with a trace, and fail the unit.

use super::context::Context;
use super::registry::DirectiveSpec;
use super::types::{UnitError, UnitState};
use crate::logs::DETAIL;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};

/// A directive handler.
pub trait Directive {
    /// Identifying name of the handler type.
    fn name(&self) -> &str;

    /// Apply one `name = value` option from the script.
    fn set_option(&mut self, name: &str, _value: &str) -> Result<(), String> {
        Err(format!("unknown option '{}'", name))
    }

    /// Do the directive's work. Nested directives run after this returns.
    fn execute(&mut self, ctx: &mut Context) -> Result<(), String>;

    /// Tear down after the stanza closes.
    fn cleanup(&mut self, _ctx: &mut Context) -> Result<(), String> {
        Ok(())
    }
}

/// An open directive on the execution stack.
pub struct Unit {
    name: String,
    args: String,
    line: usize,
    state: UnitState,
    handler: Box<dyn Directive>,
    children: Option<&'static str>,
    executed: bool,
    skipped: bool,
    child_failed: bool,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

impl Unit {
    pub fn new(spec: &DirectiveSpec, name: &str, args: &str, line: usize) -> Self {
        Self {
            name: name.to_string(),
            args: args.to_string(),
            line,
            state: UnitState::Created,
            handler: (spec.factory)(args),
            children: spec.children,
            executed: false,
            skipped: false,
            child_failed: false,
        }
    }

    /// A unit that is parsed but never run because its parent failed first.
    pub fn skipped(spec: &DirectiveSpec, name: &str, args: &str, line: usize) -> Self {
        Self {
            skipped: true,
            ..Self::new(spec, name, args, line)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Registry scope for nested directives.
    pub fn children(&self) -> Option<&'static str> {
        self.children
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// `name args` as written in the script.
    pub fn describe(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.args)
        }
    }

    /// Run one handler call, converting errors and panics into a failed unit.
    fn guarded<F>(&mut self, ctx: &mut Context, trace: &str, phase: &str, call: F) -> bool
    where
        F: FnOnce(&mut dyn Directive, &mut Context) -> Result<(), String>,
    {
        let handler = self.handler.as_mut();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(handler, ctx)));
        let (message, trace) = match outcome {
            Ok(Ok(())) => return true,
            Ok(Err(message)) => (message, trace.to_string()),
            Err(payload) => (
                panic_message(payload.as_ref()),
                format!("{}\n{}", trace, Backtrace::force_capture()),
            ),
        };
        let err = UnitError::Execution {
            unit: format!("{} ({})", self.describe(), phase),
            message,
        };
        ctx.logs.log_exception(err.kind(), &err.to_string(), &trace, DETAIL);
        ctx.note_failure(err.to_string());
        self.state = UnitState::Failed;
        false
    }

    /// Apply an option while the unit is still being configured.
    pub fn configure(&mut self, ctx: &mut Context, name: &str, value: &str, trace: &str) {
        if self.skipped || self.state == UnitState::Failed {
            return;
        }
        self.state = UnitState::Configuring;
        let phase = format!("option {}", name);
        self.guarded(ctx, trace, &phase, |h, _| h.set_option(name, value));
    }

    /// Run `execute()` if it has not run yet. Returns whether nested
    /// directives may run under this unit.
    pub fn start(&mut self, ctx: &mut Context, trace: &str) -> bool {
        if self.skipped {
            return false;
        }
        if !self.executed && self.state < UnitState::Executing {
            self.executed = true;
            self.state = UnitState::Executing;
            self.guarded(ctx, trace, "execute", |h, c| h.execute(c));
        }
        self.state != UnitState::Failed
    }

    /// A nested unit failed; this unit fails with it.
    pub fn fail_child(&mut self) {
        self.child_failed = true;
    }

    /// Close the stanza: execute if still pending, then clean up.
    pub fn finish(&mut self, ctx: &mut Context, trace: &str) -> UnitState {
        if self.skipped {
            return self.state;
        }
        self.start(ctx, trace);
        self.close(ctx, trace)
    }

    /// Close without starting anything new; only clean up what already ran.
    pub fn abandon(&mut self, ctx: &mut Context, trace: &str) -> UnitState {
        if self.skipped {
            return self.state;
        }
        self.close(ctx, trace);
        if !self.executed {
            self.state = UnitState::Failed;
        }
        self.state
    }

    fn close(&mut self, ctx: &mut Context, trace: &str) -> UnitState {
        if self.executed {
            self.guarded(ctx, trace, "cleanup", |h, c| h.cleanup(c));
        }
        if self.state != UnitState::Failed {
            self.state = if self.child_failed {
                UnitState::Failed
            } else {
                UnitState::Succeeded
            };
        }
        self.state
    }
}

//! Test directives that record what the engine asks of them.

use super::context::Context;
use super::registry::{DirectiveSpec, Registry, ROOT_SCOPE};
use super::unit::Directive;
use crate::logs::{LogAggregator, MemoryBuffer, Sink, DETAIL};
use std::cell::RefCell;

thread_local! {
    static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(event: String) {
    EVENTS.with(|e| e.borrow_mut().push(event));
}

/// Drain everything recorded on this thread.
pub fn take_events() -> Vec<String> {
    EVENTS.with(|e| std::mem::take(&mut *e.borrow_mut()))
}

/// Records every call; accepts any option and nested probes. Fails
/// `execute()` when its argument is `fail-execute` and raises the interrupt
/// flag when it is `interrupt`.
pub struct Probe {
    args: String,
}

impl Directive for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<(), String> {
        record(format!("option {} {}={}", self.args, name, value));
        Ok(())
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<(), String> {
        record(format!("execute {}", self.args));
        match self.args.as_str() {
            "fail-execute" => Err("probe failure".to_string()),
            "interrupt" => {
                ctx.request_interrupt();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn cleanup(&mut self, _ctx: &mut Context) -> Result<(), String> {
        record(format!("cleanup {}", self.args));
        Ok(())
    }
}

/// Leaf whose behaviour is chosen by its argument text: `fail-execute`,
/// `panic-execute`, `fail-cleanup` or `interrupt`.
pub struct Scripted {
    args: String,
}

impl Directive for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<(), String> {
        record(format!("execute {}", self.args));
        match self.args.as_str() {
            "fail-execute" => Err("scripted failure".to_string()),
            "panic-execute" => panic!("scripted panic"),
            // as if SIGINT arrived while this directive ran
            "interrupt" => {
                ctx.request_interrupt();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn cleanup(&mut self, _ctx: &mut Context) -> Result<(), String> {
        record(format!("cleanup {}", self.args));
        match self.args.as_str() {
            "fail-cleanup" => Err("scripted cleanup failure".to_string()),
            _ => Ok(()),
        }
    }
}

fn probe(args: &str) -> Box<dyn Directive> {
    Box::new(Probe {
        args: args.to_string(),
    })
}

fn scripted(args: &str) -> Box<dyn Directive> {
    Box::new(Scripted {
        args: args.to_string(),
    })
}

pub const PROBE: DirectiveSpec = DirectiveSpec {
    factory: probe,
    children: Some("probe"),
    summary: "records calls",
};

pub const SCRIPTED: DirectiveSpec = DirectiveSpec {
    factory: scripted,
    children: None,
    summary: "fails on request",
};

/// `probe` and `scripted` at top level and under `probe`.
pub fn probe_registry() -> Registry {
    let mut registry = Registry::new();
    for scope in [ROOT_SCOPE, "probe"] {
        registry
            .register(scope, "probe", PROBE)
            .register(scope, "scripted", SCRIPTED);
    }
    registry
}

/// A context with one memory sink at full detail. Clears recorded events.
pub fn probe_context(persist: bool) -> (Context, MemoryBuffer) {
    take_events();
    let buf = MemoryBuffer::new();
    let logs = LogAggregator::new().with_sink(Sink::memory("test", DETAIL, false, buf.clone()));
    (Context::new(logs, persist), buf)
}

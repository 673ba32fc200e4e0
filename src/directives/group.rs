//! SZ-022: `group` — a container for nested directives.

use super::shell::exec_shell;
use crate::core::context::Context;
use crate::core::unit::Directive;
use crate::logs::VERBOSE;

/// Groups nested directives. `setup = CMD` runs before them and
/// `teardown = CMD` after them.
pub struct Group {
    label: String,
    setup: Option<String>,
    teardown: Option<String>,
}

impl Group {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            setup: None,
            teardown: None,
        }
    }

    fn run_hook(&self, ctx: &mut Context, hook: &str, command: &str) -> Result<(), String> {
        ctx.say(VERBOSE, &format!("{}: {}", hook, command));
        let flag = ctx.interrupt_flag();
        let out = exec_shell(command, None, &flag)?;
        for line in out.stdout.lines().chain(out.stderr.lines()) {
            ctx.say(VERBOSE, line);
        }
        if !out.success() {
            return Err(format!("{} exited with status {}", hook, out.exit_code));
        }
        Ok(())
    }
}

impl Directive for Group {
    fn name(&self) -> &str {
        "group"
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "setup" => self.setup = Some(value.to_string()),
            "teardown" => self.teardown = Some(value.to_string()),
            other => {
                return Err(format!(
                    "unknown option '{}' for group '{}'",
                    other, self.label
                ))
            }
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<(), String> {
        match self.setup.clone() {
            Some(cmd) => self.run_hook(ctx, "setup", &cmd),
            None => Ok(()),
        }
    }

    fn cleanup(&mut self, ctx: &mut Context) -> Result<(), String> {
        match self.teardown.clone() {
            Some(cmd) => self.run_hook(ctx, "teardown", &cmd),
            None => Ok(()),
        }
    }
}

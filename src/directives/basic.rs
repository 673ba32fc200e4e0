//! SZ-020: Small built-ins — `noop`, `echo`, `fail`, `sleep`.

use crate::core::context::Context;
use crate::core::unit::Directive;
use crate::logs::NORMAL;
use std::time::{Duration, Instant};

/// Does nothing and passes.
pub struct Noop;

impl Directive for Noop {
    fn name(&self) -> &str {
        "noop"
    }

    fn execute(&mut self, _ctx: &mut Context) -> Result<(), String> {
        Ok(())
    }
}

/// Logs its argument text.
pub struct Echo {
    text: String,
}

impl Echo {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl Directive for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<(), String> {
        ctx.say(NORMAL, &self.text);
        Ok(())
    }
}

/// Always fails, with its argument text as the message.
pub struct Fail {
    message: String,
}

impl Fail {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl Directive for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    fn execute(&mut self, _ctx: &mut Context) -> Result<(), String> {
        if self.message.is_empty() {
            Err("failed".to_string())
        } else {
            Err(self.message.clone())
        }
    }
}

/// Sleeps for a number of seconds (fractions allowed), waking early on interrupt.
pub struct Sleep {
    seconds: String,
}

impl Sleep {
    pub fn new(seconds: &str) -> Self {
        Self {
            seconds: seconds.trim().to_string(),
        }
    }

    fn duration(&self) -> Result<Duration, String> {
        self.seconds
            .parse::<f64>()
            .ok()
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .ok_or_else(|| format!("sleep needs a number of seconds, got '{}'", self.seconds))
    }
}

impl Directive for Sleep {
    fn name(&self) -> &str {
        "sleep"
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<(), String> {
        let deadline = Instant::now() + self.duration()?;
        loop {
            if ctx.interrupted() {
                return Err("interrupted".to_string());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(20)));
        }
    }
}

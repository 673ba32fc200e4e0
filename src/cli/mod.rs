//! SZ-016: CLI subcommands — run, validate, directives, worker.

use crate::core::config::{self, BatchConfig};
use crate::core::context::Context;
use crate::core::parser::source_lines;
use crate::core::registry::Registry;
use crate::core::runner::BatchRunner;
use crate::core::scheduler::WorkerCommand;
use crate::core::types::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::core::validate::check_structure;
use crate::core::worker;
use crate::directives::builtin_registry;
use crate::logs::{LogAggregator, SinkConfig, SinkKind, ALWAYS, DETAIL, NORMAL};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run script files in order
    Run {
        /// Script files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Worker processes per file for top-level directives
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Keep going after a failure
        #[arg(long)]
        persist: bool,

        /// Batch config (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// More console output (repeatable)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,

        /// Only summaries on the console
        #[arg(short, long, conflicts_with = "verbose")]
        quiet: bool,

        /// Also write a full-detail log to this file
        #[arg(long)]
        log: Option<PathBuf>,

        /// Append run events (JSONL) to this file
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Check script structure without running anything
    Validate {
        /// Script files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List built-in directives
    Directives,

    /// Run one delegated stanza read from stdin
    #[command(hide = true)]
    Worker,
}

/// Options of `run` that adjust the batch config.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub jobs: Option<usize>,
    pub persist: bool,
    pub verbose: u8,
    pub quiet: bool,
    pub log: Option<PathBuf>,
    pub events: Option<PathBuf>,
}

/// Dispatch a CLI command. Returns the process exit status.
pub fn dispatch(cmd: Commands) -> Result<i32, String> {
    match cmd {
        Commands::Run {
            files,
            jobs,
            persist,
            config,
            verbose,
            quiet,
            log,
            events,
        } => {
            let overrides = RunOverrides {
                jobs,
                persist,
                verbose,
                quiet,
                log,
                events,
            };
            cmd_run(&files, config.as_deref(), &overrides)
        }
        Commands::Validate { files } => cmd_validate(&files),
        Commands::Directives => {
            print!("{}", describe_registry(&builtin_registry()));
            Ok(EXIT_SUCCESS)
        }
        Commands::Worker => {
            let interrupt = install_interrupt_handler()?;
            Ok(worker::run_worker(
                &builtin_registry(),
                std::io::stdin().lock(),
                interrupt,
            ))
        }
    }
}

fn install_interrupt_handler() -> Result<Arc<AtomicBool>, String> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))
        .map_err(|e| format!("cannot install interrupt handler: {}", e))?;
    Ok(flag)
}

/// Load the config (or defaults) and apply command-line overrides.
pub fn build_config(path: Option<&Path>, overrides: &RunOverrides) -> Result<BatchConfig, String> {
    let mut config = match path {
        Some(path) => config::parse_config_file(path)?,
        None => BatchConfig::default(),
    };

    if let Some(jobs) = overrides.jobs {
        config.max_jobs = jobs;
    }
    config.persist |= overrides.persist;
    if overrides.verbose > 0 || overrides.quiet {
        let level = if overrides.quiet {
            ALWAYS
        } else {
            NORMAL.saturating_add(overrides.verbose).min(DETAIL)
        };
        for sink in config.sinks.iter_mut().filter(|s| s.kind == SinkKind::Console) {
            sink.level = level;
        }
    }
    if let Some(log) = &overrides.log {
        config.sinks.push(SinkConfig {
            kind: SinkKind::File,
            path: Some(log.clone()),
            level: DETAIL,
        });
    }
    if overrides.events.is_some() {
        config.events = overrides.events.clone();
    }

    let errors = config::validate_config(&config);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} config error(s)", errors.len()));
    }
    Ok(config)
}

fn cmd_run(files: &[PathBuf], config_path: Option<&Path>, overrides: &RunOverrides) -> Result<i32, String> {
    let config = build_config(config_path, overrides)?;
    let logs = LogAggregator::from_configs(&config.sinks)?;
    let interrupt = install_interrupt_handler()?;
    let mut ctx = Context::new(logs, config.persist)
        .with_events(config.events.clone())
        .with_interrupt(interrupt);

    // Always offered: a file's own `maxjobs` can turn on workers even at -j 1.
    let worker = match WorkerCommand::current_exe() {
        Ok(cmd) => Some(cmd),
        Err(e) => {
            ctx.warn(&format!("{}; running every directive in-process", e));
            None
        }
    };

    let registry = builtin_registry();
    let report = BatchRunner::new(&registry, config.max_jobs)
        .with_worker(worker)
        .run(&mut ctx, files);
    Ok(report.exit_code())
}

/// Structural check of each file; returns the number of directives.
fn validate_file(registry: &Registry, path: &Path) -> Result<usize, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    check_structure(&path.display().to_string(), registry, &source_lines(&text))
        .map_err(|e| e.to_string())
}

fn cmd_validate(files: &[PathBuf]) -> Result<i32, String> {
    let registry = builtin_registry();
    let mut failed = 0;
    for path in files {
        match validate_file(&registry, path) {
            Ok(count) => println!("OK: {} ({} directives)", path.display(), count),
            Err(e) => {
                eprintln!("  ERROR: {}", e);
                failed += 1;
            }
        }
    }
    if failed == 0 {
        Ok(EXIT_SUCCESS)
    } else {
        eprintln!("{} of {} file(s) invalid", failed, files.len());
        Ok(EXIT_FAILURE)
    }
}

/// Listing of every scope and its directives.
pub fn describe_registry(registry: &Registry) -> String {
    let mut out = String::new();
    for scope in registry.scopes() {
        out.push_str(&format!("{}:\n", scope));
        for (name, spec) in registry.entries(scope) {
            out.push_str(&format!("  {:<8} {}\n", name, spec.summary));
        }
    }
    out
}

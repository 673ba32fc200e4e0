//! Core engine — lexing, the stack machine, units, scheduling and the batch runner.

pub mod config;
pub mod context;
pub mod parser;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod script;
pub mod stack;
pub mod types;
pub mod unit;
pub mod validate;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

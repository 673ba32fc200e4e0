//! Stanza — indentation-structured batch directives.
//!
//! Scripts nest directives by indentation; each stanza runs in pre-order.
//! Top-level stanzas can fan out to a bounded pool of worker processes whose
//! logs are merged back when they are reaped.

pub mod cli;
pub mod core;
pub mod directives;
pub mod logs;

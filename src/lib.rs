//! Experiment Configuration Library
//!
//! Composes, resolves and validates hierarchical run configurations for
//! training experiments.

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;

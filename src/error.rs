//! Structured error types for configuration composition.

use crate::config::Origin;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input errors
    Io,
    Parse,
    InvalidPath,
    InvalidOverride,

    // Composition errors
    MissingGroup,
    MissingPreset,
    DuplicateGroup,
    MandatoryGroup,

    // Resolution errors
    MissingPath,
    MissingValue,
    CyclicReference,
    InterpolationType,
    ConflictingKey,
    TypeMismatch,

    // Aggregated constraint violations
    Validation,
}

/// A single constraint violation found while validating a resolved config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Some(ref origin) => write!(f, "{}: {} (set in {})", self.path, self.message, origin),
            None => write!(f, "{}: {}", self.path, self.message),
        }
    }
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configuration failed validation with {} violation(s):",
            self.violations.len()
        )?;
        for violation in &self.violations {
            write!(f, "\n  - {}", violation)?;
        }
        Ok(())
    }
}

/// Errors raised while loading, composing, resolving or validating a configuration.
///
/// Every variant names the offending path or key and the origin (file, preset
/// or command-line argument) that introduced it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {origin}: {message}")]
    Parse { origin: Origin, message: String },

    #[error("invalid config path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid override '{text}': {reason}")]
    InvalidOverride { text: String, reason: String },

    #[error("cannot select config group '{group}' from {origin}: {reason}")]
    MissingGroup {
        group: String,
        origin: Origin,
        reason: String,
    },

    #[error(
        "preset '{preset}' not found in group '{group}' (selected in {origin}); available: [{}]",
        .available.join(", ")
    )]
    MissingPreset {
        group: String,
        preset: String,
        origin: Origin,
        available: Vec<String>,
    },

    #[error(
        "config group '{group}' selected twice: first in {first}, again in {origin}; use 'override /{group}: <preset>' to replace it"
    )]
    DuplicateGroup {
        group: String,
        first: Origin,
        origin: Origin,
    },

    #[error("config group '{group}' declared as '???' in {origin} was never given a preset (e.g. {group}=<preset>)")]
    MandatoryGroup { group: String, origin: Origin },

    #[error("path '{path}' does not exist (required by '{required_by}' in {origin})")]
    MissingPath {
        path: String,
        required_by: String,
        origin: Origin,
    },

    #[error("mandatory value at '{path}' is '???' but is referenced by '{required_by}' in {origin}")]
    MissingValue {
        path: String,
        required_by: String,
        origin: Origin,
    },

    #[error("cyclic reference {} (introduced in {origin})", .chain.join(" -> "))]
    CyclicReference { chain: Vec<String>, origin: Origin },

    #[error(
        "'{path}' embeds '${{{target}}}' in a string but the target is a {found}, not a scalar (in {origin})"
    )]
    InterpolationType {
        path: String,
        target: String,
        found: &'static str,
        origin: Origin,
    },

    #[error("key '{path}' already exists; use '++{path}=...' to force it (from {origin})")]
    ConflictingKey { path: String, origin: Origin },

    #[error("'{path}' is a {found}, expected {expected} (set in {origin})")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
        origin: Origin,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfigError::Io { .. } => ErrorCode::Io,
            ConfigError::Parse { .. } => ErrorCode::Parse,
            ConfigError::InvalidPath { .. } => ErrorCode::InvalidPath,
            ConfigError::InvalidOverride { .. } => ErrorCode::InvalidOverride,
            ConfigError::MissingGroup { .. } => ErrorCode::MissingGroup,
            ConfigError::MissingPreset { .. } => ErrorCode::MissingPreset,
            ConfigError::DuplicateGroup { .. } => ErrorCode::DuplicateGroup,
            ConfigError::MandatoryGroup { .. } => ErrorCode::MandatoryGroup,
            ConfigError::MissingPath { .. } => ErrorCode::MissingPath,
            ConfigError::MissingValue { .. } => ErrorCode::MissingValue,
            ConfigError::CyclicReference { .. } => ErrorCode::CyclicReference,
            ConfigError::InterpolationType { .. } => ErrorCode::InterpolationType,
            ConfigError::ConflictingKey { .. } => ErrorCode::ConflictingKey,
            ConfigError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            ConfigError::Validation(_) => ErrorCode::Validation,
        }
    }

    // Convenience constructors

    pub fn parse(origin: &Origin, message: impl fmt::Display) -> Self {
        ConfigError::Parse {
            origin: origin.clone(),
            message: message.to_string(),
        }
    }

    pub fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_override(text: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidOverride {
            text: text.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing_path(path: impl fmt::Display, required_by: impl Into<String>, origin: &Origin) -> Self {
        ConfigError::MissingPath {
            path: path.to_string(),
            required_by: required_by.into(),
            origin: origin.clone(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_violation() {
        let err = ValidationError {
            violations: vec![
                Violation::new("algo.optimizer.lr", "must be > 0").with_origin(Origin::new("algo/ppo.yaml")),
                Violation::new("buffer.size", "required key is missing"),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 violation(s)"));
        assert!(text.contains("algo.optimizer.lr: must be > 0 (set in algo/ppo.yaml)"));
        assert!(text.contains("buffer.size: required key is missing"));
    }

    #[test]
    fn test_cycle_message_shows_chain() {
        let err = ConfigError::CyclicReference {
            chain: vec!["a.b".into(), "c.d".into(), "a.b".into()],
            origin: Origin::new("exp/loop.yaml"),
        };
        assert_eq!(
            err.to_string(),
            "cyclic reference a.b -> c.d -> a.b (introduced in exp/loop.yaml)"
        );
        assert_eq!(err.code(), ErrorCode::CyclicReference);
    }

    #[test]
    fn test_missing_preset_names_preset_and_origin() {
        let err = ConfigError::MissingPreset {
            group: "algo".into(),
            preset: "nonexistent_preset".into(),
            origin: Origin::new("exp/ppo.yaml"),
            available: vec!["ppo".into(), "sac".into()],
        };
        let text = err.to_string();
        assert!(text.contains("'nonexistent_preset'"));
        assert!(text.contains("exp/ppo.yaml"));
        assert!(text.contains("ppo, sac"));
    }

    #[test]
    fn test_error_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::MissingPreset).unwrap();
        assert_eq!(json, "\"MISSING_PRESET\"");
    }
}

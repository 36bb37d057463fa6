//! Dotted paths into a configuration tree (`algo.optimizer.lr`, `layers.0`).

use crate::error::{ConfigError, ConfigResult};
use std::fmt;

/// A parsed dotted path. Each segment is a mapping key or a sequence index;
/// which one applies is decided by the node being walked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigPath {
    segments: Vec<String>,
}

impl ConfigPath {
    /// The empty path, addressing the root of the tree.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> ConfigResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConfigError::invalid_path(text, "path is empty"));
        }
        let mut segments = Vec::new();
        for segment in text.split('.') {
            if segment.is_empty() {
                return Err(ConfigError::invalid_path(text, "empty segment"));
            }
            if let Some(c) = segment
                .chars()
                .find(|c| c.is_whitespace() || matches!(c, '$' | '{' | '}' | '='))
            {
                return Err(ConfigError::invalid_path(
                    text,
                    format!("unexpected character '{}' in segment '{}'", c, segment),
                ));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Path of a config group: `env/atari` places its presets under `env.atari`.
    pub fn from_group(group: &str) -> ConfigResult<Self> {
        Self::parse(&group.trim_matches('/').replace('/', "."))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Split into parent path and final segment. `None` for the root.
    pub fn split_last(&self) -> Option<(ConfigPath, &str)> {
        let (last, parent) = self.segments.split_last()?;
        Some((
            ConfigPath {
                segments: parent.to_vec(),
            },
            last.as_str(),
        ))
    }

    /// Path made of the first `len` segments.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }
        f.write_str(&self.segments.join("."))
    }
}

impl std::str::FromStr for ConfigPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

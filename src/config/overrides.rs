//! Command-line overrides.
//!
//! - `algo=sac` selects a preset when `algo` is a config group
//! - `algo.optimizer.lr=3e-4` sets an existing value
//! - `+algo.clip_vloss=true` adds a value (or appends a group) that must not exist yet
//! - `++algo.clip_vloss=true` sets a value whether or not it exists
//! - `++algo=sac` selects a preset, adding the group when no file declares it
//! - `~algo.clip_vloss` deletes an existing value

use super::node::{ConfigNode, Origin, Scalar};
use super::path::ConfigPath;
use crate::error::{ConfigError, ConfigResult};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideAction {
    /// `key=value`
    Set,
    /// `+key=value`
    Add,
    /// `++key=value`
    ForceSet,
    /// `~key`
    Delete,
}

/// A parsed command-line override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub action: OverrideAction,
    pub key: String,
    /// Raw value text; `None` for deletions.
    pub value: Option<String>,
    /// The argument as given, for error messages.
    pub text: String,
}

impl Override {
    pub fn origin(&self) -> Origin {
        Origin::command_line(&self.text)
    }

    /// Parse the value as YAML. An empty value is the empty string.
    pub fn value_node(&self) -> ConfigResult<ConfigNode> {
        let origin = self.origin();
        let raw = self.value.as_deref().unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(ConfigNode::scalar(Scalar::String(String::new()), origin));
        }
        let value: serde_yaml::Value = serde_yaml::from_str(raw)
            .map_err(|e| ConfigError::invalid_override(&self.text, e.to_string()))?;
        ConfigNode::from_yaml_at(value, &origin, &self.path()?)
    }

    pub fn path(&self) -> ConfigResult<ConfigPath> {
        ConfigPath::parse(&self.key)
    }
}

impl FromStr for Override {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let (action, rest) = if let Some(rest) = trimmed.strip_prefix("++") {
            (OverrideAction::ForceSet, rest)
        } else if let Some(rest) = trimmed.strip_prefix('+') {
            (OverrideAction::Add, rest)
        } else if let Some(rest) = trimmed.strip_prefix('~') {
            (OverrideAction::Delete, rest)
        } else {
            (OverrideAction::Set, trimmed)
        };

        let (key, value) = match rest.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.to_string())),
            None => (rest.trim(), None),
        };
        if key.is_empty() {
            return Err(ConfigError::invalid_override(text, "missing key"));
        }
        match (action, &value) {
            (OverrideAction::Delete, Some(_)) => {
                return Err(ConfigError::invalid_override(text, "deletions take no value: use '~key'"));
            }
            (OverrideAction::Set | OverrideAction::Add | OverrideAction::ForceSet, None) => {
                return Err(ConfigError::invalid_override(text, "expected 'key=value'"));
            }
            _ => {}
        }
        if !key.contains('/') {
            ConfigPath::parse(key).map_err(|e| ConfigError::invalid_override(text, e.to_string()))?;
        }

        Ok(Self {
            action,
            key: key.to_string(),
            value,
            text: text.to_string(),
        })
    }
}

/// Parse every argument, stopping at the first malformed one.
pub fn parse_overrides<I, S>(args: I) -> ConfigResult<Vec<Override>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().map(|arg| arg.as_ref().parse()).collect()
}

/// Apply a value override to a composed (not yet resolved) tree.
pub fn apply_value_override(tree: &mut ConfigNode, ov: &Override) -> ConfigResult<()> {
    let path = ov.path()?;
    let origin = ov.origin();
    let Some((parent_path, key)) = path.split_last() else {
        return Err(ConfigError::invalid_override(&ov.text, "cannot replace the root"));
    };

    let creates_parents = matches!(ov.action, OverrideAction::Add | OverrideAction::ForceSet);
    let parent = walk_mut(tree, &parent_path, creates_parents)
        .ok_or_else(|| ConfigError::missing_path(&parent_path, ov.text.clone(), &origin))?;
    let exists = parent.child(key).is_some();

    match ov.action {
        OverrideAction::Set if !exists => Err(ConfigError::missing_path(&path, ov.text.clone(), &origin)),
        OverrideAction::Add if exists => Err(ConfigError::ConflictingKey {
            path: path.to_string(),
            origin,
        }),
        OverrideAction::Delete if !exists => Err(ConfigError::missing_path(&path, ov.text.clone(), &origin)),
        OverrideAction::Delete => {
            remove_child(parent, key);
            Ok(())
        }
        OverrideAction::Set | OverrideAction::Add | OverrideAction::ForceSet => {
            let value = ov.value_node()?;
            set_child(parent, key, value).ok_or_else(|| ConfigError::TypeMismatch {
                path: parent_path.to_string(),
                expected: "mapping or sequence".to_string(),
                found: parent_kind_name(tree, &parent_path),
                origin,
            })
        }
    }
}

fn parent_kind_name(tree: &ConfigNode, path: &ConfigPath) -> String {
    tree.get(path)
        .map(|node| node.kind().type_name().to_string())
        .unwrap_or_else(|| "missing".to_string())
}

/// Walk to `path`, optionally creating missing mappings along the way.
fn walk_mut<'a>(node: &'a mut ConfigNode, path: &ConfigPath, create: bool) -> Option<&'a mut ConfigNode> {
    let mut current = node;
    for segment in path.segments() {
        if create && current.child(segment).is_none() {
            let origin = current.origin().clone();
            current
                .as_mapping_mut()?
                .insert(segment.clone(), ConfigNode::empty(origin));
        }
        current = current.child_mut(segment)?;
    }
    Some(current)
}

fn set_child(parent: &mut ConfigNode, key: &str, value: ConfigNode) -> Option<()> {
    if let Some(entries) = parent.as_mapping_mut() {
        entries.insert(key.to_string(), value);
        return Some(());
    }
    let slot = parent.child_mut(key)?;
    *slot = value;
    Some(())
}

fn remove_child(parent: &mut ConfigNode, key: &str) {
    if let Some(entries) = parent.as_mapping_mut() {
        entries.remove(key);
    } else if let Some(items) = parent.as_sequence_mut()
        && let Ok(index) = key.parse::<usize>()
        && index < items.len()
    {
        items.remove(index);
    }
}

//! `defaults:` lists at the top of config files.
//!
//! ```yaml
//! defaults:
//!   - override /algo: ppo
//!   - override /env: gym
//!   - _self_
//! ```

use super::node::{ConfigNode, NodeKind, Origin, Scalar};
use crate::error::{ConfigError, ConfigResult};
use std::fmt;

/// Key of the defaults list inside a config file.
pub const DEFAULTS_KEY: &str = "defaults";

/// Marker for the position of the file's own body in its merge order.
pub const SELF_MARKER: &str = "_self_";

const OVERRIDE_PREFIX: &str = "override ";

/// What a group is set to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Preset(String),
    /// `group: null` disables the group.
    Disabled,
    /// `group: ???` must be chosen by a later override.
    Mandatory,
}

impl Choice {
    /// Parse a preset name as written on the command line.
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "null" | "~" => Choice::Disabled,
            "???" => Choice::Mandatory,
            name => Choice::Preset(strip_extension(name).to_string()),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Preset(name) => f.write_str(name),
            Choice::Disabled => f.write_str("null"),
            Choice::Mandatory => f.write_str("???"),
        }
    }
}

/// One item of a defaults list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultsEntry {
    /// `_self_`
    SelfMarker,
    /// `group: preset`, declaring a group and its default preset.
    Group { group: String, choice: Choice },
    /// `override /group: preset`, replacing the selection of a declared group.
    Override { group: String, choice: Choice },
}

/// A selection change requested by a file or by the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideDirective {
    pub group: String,
    pub choice: Choice,
    pub origin: Origin,
}

/// Normalize a group name: no leading or trailing `/`.
pub fn normalize_group(group: &str) -> String {
    group.trim().trim_matches('/').to_string()
}

fn strip_extension(name: &str) -> &str {
    name.strip_suffix(".yaml")
        .or_else(|| name.strip_suffix(".yml"))
        .unwrap_or(name)
}

/// Parse the value of a `defaults:` key.
pub fn parse_defaults(node: &ConfigNode, origin: &Origin) -> ConfigResult<Vec<DefaultsEntry>> {
    let NodeKind::Sequence(items) = node.kind() else {
        return Err(ConfigError::parse(origin, "'defaults' must be a list"));
    };
    items.iter().map(|item| parse_entry(item, origin)).collect()
}

fn parse_entry(item: &ConfigNode, origin: &Origin) -> ConfigResult<DefaultsEntry> {
    match item.kind() {
        NodeKind::Scalar(Scalar::String(s)) if s == SELF_MARKER => Ok(DefaultsEntry::SelfMarker),
        NodeKind::Mapping(entries) if entries.len() == 1 => {
            let Some((key, value)) = entries.iter().next() else {
                return Err(ConfigError::parse(origin, "empty defaults entry"));
            };
            let choice = parse_choice(key, value, origin)?;
            match key.strip_prefix(OVERRIDE_PREFIX) {
                Some(group) => Ok(DefaultsEntry::Override {
                    group: checked_group(group, origin)?,
                    choice,
                }),
                None => Ok(DefaultsEntry::Group {
                    group: checked_group(key, origin)?,
                    choice,
                }),
            }
        }
        _ => Err(ConfigError::parse(
            origin,
            format!(
                "defaults entries must be '{}' or a single 'group: preset' pair, found a {}",
                SELF_MARKER,
                item.kind().type_name()
            ),
        )),
    }
}

fn parse_choice(key: &str, value: &ConfigNode, origin: &Origin) -> ConfigResult<Choice> {
    match value.kind() {
        NodeKind::Scalar(Scalar::String(name)) => Ok(Choice::Preset(strip_extension(name).to_string())),
        NodeKind::Scalar(Scalar::Null) => Ok(Choice::Disabled),
        NodeKind::Missing => Ok(Choice::Mandatory),
        other => Err(ConfigError::parse(
            origin,
            format!(
                "preset for '{}' in defaults must be a name, null or ???; found a {}",
                key,
                other.type_name()
            ),
        )),
    }
}

fn checked_group(raw: &str, origin: &Origin) -> ConfigResult<String> {
    let group = normalize_group(raw);
    let valid = !group.is_empty()
        && group.split('/').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        });
    if valid {
        Ok(group)
    } else {
        Err(ConfigError::parse(
            origin,
            format!("invalid config group name '{}' in defaults", raw.trim()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults(text: &str) -> ConfigResult<Vec<DefaultsEntry>> {
        let origin = Origin::new("exp/ppo.yaml");
        let node = ConfigNode::parse_yaml(text, &origin).unwrap();
        parse_defaults(&node, &origin)
    }

    #[test]
    fn test_parse_experiment_defaults() {
        let entries = defaults("- override /algo: ppo\n- override /env: gym.yaml\n- _self_\n").unwrap();
        assert_eq!(
            entries,
            vec![
                DefaultsEntry::Override {
                    group: "algo".into(),
                    choice: Choice::Preset("ppo".into())
                },
                DefaultsEntry::Override {
                    group: "env".into(),
                    choice: Choice::Preset("gym".into())
                },
                DefaultsEntry::SelfMarker,
            ]
        );
    }

    #[test]
    fn test_parse_group_choices() {
        let entries = defaults("- algo: default\n- metric: null\n- exp: ???\n- env/atari: pong\n").unwrap();
        assert_eq!(
            entries,
            vec![
                DefaultsEntry::Group {
                    group: "algo".into(),
                    choice: Choice::Preset("default".into())
                },
                DefaultsEntry::Group {
                    group: "metric".into(),
                    choice: Choice::Disabled
                },
                DefaultsEntry::Group {
                    group: "exp".into(),
                    choice: Choice::Mandatory
                },
                DefaultsEntry::Group {
                    group: "env/atari".into(),
                    choice: Choice::Preset("pong".into())
                },
            ]
        );
    }

    #[test]
    fn test_rejects_malformed_entries() {
        assert!(defaults("algo: ppo\n").is_err());
        assert!(defaults("- algo/ppo\n").is_err());
        assert!(defaults("- {algo: ppo, env: gym}\n").is_err());
        assert!(defaults("- algo: [ppo]\n").is_err());
        assert!(defaults("- 'bad group': ppo\n").is_err());
    }

    #[test]
    fn test_choice_from_command_line() {
        assert_eq!(Choice::parse("sac"), Choice::Preset("sac".into()));
        assert_eq!(Choice::parse("sac.yaml"), Choice::Preset("sac".into()));
        assert_eq!(Choice::parse("null"), Choice::Disabled);
        assert_eq!(Choice::parse("???"), Choice::Mandatory);
    }
}

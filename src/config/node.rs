//! Configuration tree model.
//!
//! A [`ConfigNode`] is a tagged variant over scalars, parsed reference
//! expressions, the mandatory-value marker `???`, sequences and mappings.
//! Each node remembers the [`Origin`] that introduced it so errors can point
//! at the file or argument responsible.

use super::interpolation::Interpolation;
use super::path::ConfigPath;
use crate::error::{ConfigError, ConfigResult};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Marker for a value that must be supplied by a later override.
pub const MISSING_MARKER: &str = "???";

/// Where a value came from: a file, a preset, or a command-line argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin(Arc<str>);

impl Origin {
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(Arc::from(label.as_ref()))
    }

    pub fn file(path: &Path) -> Self {
        Self::new(path.display().to_string())
    }

    pub fn command_line(text: &str) -> Self {
        Self::new(format!("command line '{}'", text))
    }

    pub fn inline() -> Self {
        Self::new("<inline>")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::inline()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::String(_) => "string",
        }
    }

    /// Text used when the scalar is embedded inside a larger string.
    pub fn render(&self) -> String {
        match self {
            Scalar::Null => "null".to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(x) => format!("{:?}", x),
            Scalar::String(s) => s.clone(),
        }
    }
}

/// Mapping from keys to child nodes. Iterates in key order.
pub type Mapping = BTreeMap<String, ConfigNode>;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Scalar(Scalar),
    /// String containing one or more `${path}` references.
    Reference(Interpolation),
    /// The `???` marker.
    Missing,
    Sequence(Vec<ConfigNode>),
    Mapping(Mapping),
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Scalar(s) => s.type_name(),
            NodeKind::Reference(_) => "reference",
            NodeKind::Missing => "missing value",
            NodeKind::Sequence(_) => "sequence",
            NodeKind::Mapping(_) => "mapping",
        }
    }
}

/// A node of the configuration tree.
///
/// Equality compares content only; the origin is diagnostic metadata.
#[derive(Debug, Clone)]
pub struct ConfigNode {
    kind: NodeKind,
    origin: Origin,
}

impl PartialEq for ConfigNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl ConfigNode {
    pub fn new(kind: NodeKind, origin: Origin) -> Self {
        Self { kind, origin }
    }

    pub fn scalar(value: Scalar, origin: Origin) -> Self {
        Self::new(NodeKind::Scalar(value), origin)
    }

    pub fn mapping(entries: Mapping, origin: Origin) -> Self {
        Self::new(NodeKind::Mapping(entries), origin)
    }

    pub fn empty(origin: Origin) -> Self {
        Self::mapping(Mapping::new(), origin)
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn into_kind(self) -> NodeKind {
        self.kind
    }

    pub fn into_parts(self) -> (NodeKind, Origin) {
        (self.kind, self.origin)
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self.kind {
            NodeKind::Mapping(ref m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self.kind {
            NodeKind::Mapping(ref mut m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn as_sequence_mut(&mut self) -> Option<&mut Vec<ConfigNode>> {
        match self.kind {
            NodeKind::Sequence(ref mut items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self.kind {
            NodeKind::Scalar(ref s) => Some(s),
            _ => None,
        }
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self.kind, NodeKind::Mapping(_))
    }

    /// Immediate child by key (mappings) or index (sequences).
    pub fn child(&self, segment: &str) -> Option<&ConfigNode> {
        match self.kind {
            NodeKind::Mapping(ref m) => m.get(segment),
            NodeKind::Sequence(ref items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    pub(crate) fn child_mut(&mut self, segment: &str) -> Option<&mut ConfigNode> {
        match self.kind {
            NodeKind::Mapping(ref mut m) => m.get_mut(segment),
            NodeKind::Sequence(ref mut items) => segment
                .parse::<usize>()
                .ok()
                .and_then(move |i| items.get_mut(i)),
            _ => None,
        }
    }

    /// Walk `path` from this node without following references.
    pub fn get(&self, path: &ConfigPath) -> Option<&ConfigNode> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Whether any node in this tree is a reference expression.
    pub fn has_references(&self) -> bool {
        match self.kind {
            NodeKind::Reference(_) => true,
            NodeKind::Sequence(ref items) => items.iter().any(ConfigNode::has_references),
            NodeKind::Mapping(ref m) => m.values().any(ConfigNode::has_references),
            NodeKind::Scalar(_) | NodeKind::Missing => false,
        }
    }

    /// Parse YAML text into a tree. A null or empty document yields an empty mapping.
    pub fn parse_yaml(text: &str, origin: &Origin) -> ConfigResult<Self> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| ConfigError::parse(origin, e))?;
        match value {
            serde_yaml::Value::Null => Ok(Self::empty(origin.clone())),
            other => Self::from_yaml(other, origin),
        }
    }

    /// Convert a YAML value, parsing reference expressions once.
    pub fn from_yaml(value: serde_yaml::Value, origin: &Origin) -> ConfigResult<Self> {
        Self::from_yaml_at(value, origin, &ConfigPath::root())
    }

    pub(crate) fn from_yaml_at(value: serde_yaml::Value, origin: &Origin, path: &ConfigPath) -> ConfigResult<Self> {
        use serde_yaml::Value;

        let kind = match value {
            Value::Null => NodeKind::Scalar(Scalar::Null),
            Value::Bool(b) => NodeKind::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => NodeKind::Scalar(Scalar::Int(i)),
                None => NodeKind::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => string_kind(&s, origin, path)?,
            Value::Sequence(items) => NodeKind::Sequence(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| Self::from_yaml_at(item, origin, &path.child(index.to_string())))
                    .collect::<ConfigResult<Vec<_>>>()?,
            ),
            Value::Mapping(entries) => {
                let mut mapping = Mapping::new();
                for (key, value) in entries {
                    let key = mapping_key(key, origin, path)?;
                    let child = Self::from_yaml_at(value, origin, &path.child(key.clone()))?;
                    mapping.insert(key, child);
                }
                NodeKind::Mapping(mapping)
            }
            Value::Tagged(tagged) => return Self::from_yaml_at(tagged.value, origin, path),
        };
        Ok(Self::new(kind, origin.clone()))
    }
}

fn string_kind(text: &str, origin: &Origin, path: &ConfigPath) -> ConfigResult<NodeKind> {
    if text == MISSING_MARKER {
        return Ok(NodeKind::Missing);
    }
    let interpolation = Interpolation::parse(text).map_err(|reason| {
        ConfigError::parse(origin, format!("at '{}', value '{}': {}", path, text, reason))
    })?;
    Ok(match interpolation.into_literal() {
        Ok(literal) => NodeKind::Scalar(Scalar::String(literal)),
        Err(interpolation) => NodeKind::Reference(interpolation),
    })
}

fn mapping_key(key: serde_yaml::Value, origin: &Origin, path: &ConfigPath) -> ConfigResult<String> {
    use serde_yaml::Value;

    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Err(ConfigError::parse(
            origin,
            format!("at '{}', mapping key {} must be a string; quote it", path, n),
        )),
        other => Err(ConfigError::parse(
            origin,
            format!("at '{}', mapping keys must be strings, found {:?}", path, other),
        )),
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.kind {
            NodeKind::Scalar(Scalar::Null) => serializer.serialize_unit(),
            NodeKind::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(b),
            NodeKind::Scalar(Scalar::Int(i)) => serializer.serialize_i64(i),
            NodeKind::Scalar(Scalar::Float(x)) => serializer.serialize_f64(x),
            NodeKind::Scalar(Scalar::String(ref s)) => serializer.serialize_str(s),
            NodeKind::Reference(ref interpolation) => serializer.serialize_str(interpolation.source()),
            NodeKind::Missing => serializer.serialize_str(MISSING_MARKER),
            NodeKind::Sequence(ref items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            NodeKind::Mapping(ref entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

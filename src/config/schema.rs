//! Constraints that consuming components declare over a resolved config.
//!
//! The resolver hard-codes no required fields. Each consumer (an algorithm,
//! a buffer, a logger) builds or loads its own [`Schema`]; schemas can be
//! combined with [`Schema::merge`] before validation.

use super::node::{ConfigNode, MISSING_MARKER, NodeKind, Origin, Scalar};
use super::path::ConfigPath;
use super::resolve::ResolvedConfig;
use crate::error::{ConfigError, ConfigResult, ValidationError, Violation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Expected kind of a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Any,
    Bool,
    Int,
    /// Floats; integers are accepted as well.
    Float,
    /// Any int or float.
    Number,
    String,
    Sequence,
    Mapping,
}

impl ValueKind {
    fn accepts(self, node: &ConfigNode) -> bool {
        match (self, node.kind()) {
            (ValueKind::Any, _) => true,
            (ValueKind::Bool, NodeKind::Scalar(Scalar::Bool(_))) => true,
            (ValueKind::Int, NodeKind::Scalar(Scalar::Int(_))) => true,
            (ValueKind::Float | ValueKind::Number, NodeKind::Scalar(Scalar::Float(_) | Scalar::Int(_))) => true,
            (ValueKind::String, NodeKind::Scalar(Scalar::String(_))) => true,
            (ValueKind::Sequence, NodeKind::Sequence(_)) => true,
            (ValueKind::Mapping, NodeKind::Mapping(_)) => true,
            _ => false,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ValueKind::Any => "any",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Sequence => "sequence",
            ValueKind::Mapping => "mapping",
        }
    }
}

/// Constraint on a single path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(default)]
    pub kind: ValueKind,

    /// Whether the path must exist (default: true).
    #[serde(default = "default_required")]
    pub required: bool,

    /// Whether null is accepted in place of a value of `kind`.
    #[serde(default)]
    pub nullable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default)]
    pub exclusive_min: bool,

    #[serde(default)]
    pub exclusive_max: bool,

    /// Allowed values for strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

fn default_required() -> bool {
    true
}

impl Default for FieldRule {
    fn default() -> Self {
        Self::new(ValueKind::Any)
    }
}

impl FieldRule {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            required: default_required(),
            nullable: false,
            min: None,
            max: None,
            exclusive_min: false,
            exclusive_max: false,
            choices: Vec::new(),
        }
    }

    pub fn any() -> Self {
        Self::new(ValueKind::Any)
    }

    pub fn bool() -> Self {
        Self::new(ValueKind::Bool)
    }

    pub fn int() -> Self {
        Self::new(ValueKind::Int)
    }

    pub fn float() -> Self {
        Self::new(ValueKind::Float)
    }

    pub fn number() -> Self {
        Self::new(ValueKind::Number)
    }

    pub fn string() -> Self {
        Self::new(ValueKind::String)
    }

    pub fn sequence() -> Self {
        Self::new(ValueKind::Sequence)
    }

    pub fn mapping() -> Self {
        Self::new(ValueKind::Mapping)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Strictly greater than zero.
    pub fn positive(mut self) -> Self {
        self.min = Some(0.0);
        self.exclusive_min = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self.exclusive_min = false;
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self.exclusive_max = false;
        self
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.min(min).max(max)
    }

    pub fn one_of<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// Problems with `node`, if any.
    fn check(&self, node: &ConfigNode) -> Vec<String> {
        let mut problems = Vec::new();

        if self.nullable && matches!(node.kind(), NodeKind::Scalar(Scalar::Null)) {
            return problems;
        }
        if !self.kind.accepts(node) {
            problems.push(format!(
                "expected {}, found {}",
                self.kind.as_str(),
                node.kind().type_name()
            ));
            return problems;
        }

        let number = match node.as_scalar() {
            Some(Scalar::Int(i)) => Some(*i as f64),
            Some(Scalar::Float(x)) => Some(*x),
            _ => None,
        };
        if let Some(value) = number {
            if value.is_nan() {
                problems.push("value is NaN".to_string());
            }
            if let Some(min) = self.min {
                if self.exclusive_min && value <= min {
                    problems.push(format!("must be > {}, found {}", min, value));
                } else if !self.exclusive_min && value < min {
                    problems.push(format!("must be >= {}, found {}", min, value));
                }
            }
            if let Some(max) = self.max {
                if self.exclusive_max && value >= max {
                    problems.push(format!("must be < {}, found {}", max, value));
                } else if !self.exclusive_max && value > max {
                    problems.push(format!("must be <= {}, found {}", max, value));
                }
            }
        }

        if !self.choices.is_empty()
            && let Some(Scalar::String(s)) = node.as_scalar()
            && !self.choices.iter().any(|choice| choice == s)
        {
            problems.push(format!(
                "'{}' is not one of [{}]",
                s,
                self.choices.join(", ")
            ));
        }

        problems
    }
}

/// A set of field rules keyed by dotted path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRule>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the rule for `path`.
    pub fn field(mut self, path: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(path.into(), rule);
        self
    }

    /// Combine with another consumer's schema. Rules in `other` win on the same path.
    pub fn merge(mut self, other: Schema) -> Self {
        self.fields.extend(other.fields);
        self
    }

    pub fn from_yaml_str(text: &str, origin: &Origin) -> ConfigResult<Self> {
        let schema: Schema = serde_yaml::from_str(text).map_err(|e| ConfigError::parse(origin, e))?;
        for path in schema.fields.keys() {
            ConfigPath::parse(path)?;
        }
        Ok(schema)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text, &Origin::file(path))
    }
}

/// Check a resolved config, reporting every violation at once.
///
/// Leftover `???` values are always violations; `schema` adds the
/// consumer-declared rules.
pub fn validate(config: ResolvedConfig, schema: Option<&Schema>) -> ConfigResult<ResolvedConfig> {
    let mut violations = Vec::new();
    collect_missing(config.root(), &ConfigPath::root(), &mut violations);

    if let Some(schema) = schema {
        for (path, rule) in &schema.fields {
            let parsed = ConfigPath::parse(path)?;
            match config.root().get(&parsed) {
                None if rule.required => {
                    violations.push(Violation::new(path, "required key is missing"));
                }
                None => {}
                // Already reported as a leftover `???`
                Some(node) if matches!(node.kind(), NodeKind::Missing) => {}
                Some(node) => {
                    for problem in rule.check(node) {
                        violations.push(Violation::new(path, problem).with_origin(node.origin().clone()));
                    }
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(config)
    } else {
        Err(ValidationError { violations }.into())
    }
}

fn collect_missing(node: &ConfigNode, path: &ConfigPath, violations: &mut Vec<Violation>) {
    match node.kind() {
        NodeKind::Missing => violations.push(
            Violation::new(
                path.to_string(),
                format!("mandatory value '{}' was never set", MISSING_MARKER),
            )
            .with_origin(node.origin().clone()),
        ),
        NodeKind::Mapping(entries) => {
            for (key, child) in entries {
                collect_missing(child, &path.child(key.clone()), violations);
            }
        }
        NodeKind::Sequence(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_missing(child, &path.child(index.to_string()), violations);
            }
        }
        NodeKind::Scalar(_) | NodeKind::Reference(_) => {}
    }
}

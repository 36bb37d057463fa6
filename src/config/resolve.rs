//! Reference resolution.
//!
//! Every `${path}` is looked up in the merged tree and replaced by the value
//! found there, transitively. Results are memoized by path; a path that is
//! revisited while its own resolution is still in progress is a cycle.

use super::interpolation::Part;
use super::node::{ConfigNode, Mapping, NodeKind, Origin, Scalar};
use super::path::ConfigPath;
use crate::error::{ConfigError, ConfigResult};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};

/// A fully merged and dereferenced configuration.
///
/// Contains no reference expressions. There is no way to mutate it; consumers
/// receive it by shared reference or clone.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    root: ConfigNode,
}

impl ResolvedConfig {
    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    pub fn into_node(self) -> ConfigNode {
        self.root
    }

    /// Look up a dotted path. Invalid or absent paths yield `None`.
    pub fn get(&self, path: &str) -> Option<&ConfigNode> {
        let path = ConfigPath::parse(path).ok()?;
        self.root.get(&path)
    }

    /// Look up a dotted path, failing loudly when it is absent.
    pub fn require(&self, path: &str) -> ConfigResult<&ConfigNode> {
        let parsed = ConfigPath::parse(path)?;
        self.root
            .get(&parsed)
            .ok_or_else(|| ConfigError::missing_path(path, "consumer", self.root.origin()))
    }

    pub fn get_f64(&self, path: &str) -> ConfigResult<f64> {
        let node = self.require(path)?;
        match node.as_scalar() {
            Some(Scalar::Float(x)) => Ok(*x),
            Some(Scalar::Int(i)) => Ok(*i as f64),
            _ => Err(type_mismatch(path, "float", node)),
        }
    }

    pub fn get_i64(&self, path: &str) -> ConfigResult<i64> {
        let node = self.require(path)?;
        match node.as_scalar() {
            Some(Scalar::Int(i)) => Ok(*i),
            _ => Err(type_mismatch(path, "int", node)),
        }
    }

    pub fn get_bool(&self, path: &str) -> ConfigResult<bool> {
        let node = self.require(path)?;
        match node.as_scalar() {
            Some(Scalar::Bool(b)) => Ok(*b),
            _ => Err(type_mismatch(path, "bool", node)),
        }
    }

    pub fn get_str(&self, path: &str) -> ConfigResult<&str> {
        let node = self.require(path)?;
        match node.as_scalar() {
            Some(Scalar::String(s)) => Ok(s.as_str()),
            _ => Err(type_mismatch(path, "string", node)),
        }
    }

    /// Deserialize the sub-tree at `path` into a consumer's typed config.
    pub fn extract<T: DeserializeOwned>(&self, path: &str) -> ConfigResult<T> {
        let node = self.require(path)?;
        let value = serde_json::to_value(node).map_err(|e| ConfigError::TypeMismatch {
            path: path.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            found: e.to_string(),
            origin: node.origin().clone(),
        })?;
        serde_json::from_value(value).map_err(|e| ConfigError::TypeMismatch {
            path: path.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            found: format!("incompatible value ({})", e),
            origin: node.origin().clone(),
        })
    }

    /// Deserialize the whole tree.
    pub fn deserialize<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        let value = serde_json::to_value(&self.root).map_err(|e| ConfigError::parse(self.root.origin(), e))?;
        serde_json::from_value(value).map_err(|e| ConfigError::TypeMismatch {
            path: "<root>".to_string(),
            expected: std::any::type_name::<T>().to_string(),
            found: format!("incompatible value ({})", e),
            origin: self.root.origin().clone(),
        })
    }
}

fn type_mismatch(path: &str, expected: &str, node: &ConfigNode) -> ConfigError {
    ConfigError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: node.kind().type_name().to_string(),
        origin: node.origin().clone(),
    }
}

/// Replace every reference expression in `tree` with the value it points to.
///
/// References are looked up in `tree` itself, so they see the final merged
/// values. Chained references resolve transitively.
pub fn resolve_references(tree: ConfigNode) -> ConfigResult<ResolvedConfig> {
    if !tree.has_references() {
        return Ok(ResolvedConfig { root: tree });
    }
    let root = Resolver::new(&tree).resolve_path(&ConfigPath::root(), &ConfigPath::root(), tree.origin())?;
    Ok(ResolvedConfig { root })
}

/// Resolved view of a path: still borrowed from the tree, or built by resolution.
enum Located<'a> {
    Raw(&'a ConfigNode),
    Resolved(ConfigNode),
}

struct Resolver<'a> {
    tree: &'a ConfigNode,
    memo: HashMap<ConfigPath, ConfigNode>,
    in_progress: HashSet<ConfigPath>,
    chain: Vec<ConfigPath>,
}

impl<'a> Resolver<'a> {
    fn new(tree: &'a ConfigNode) -> Self {
        Self {
            tree,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            chain: Vec::new(),
        }
    }

    /// Resolved value at `path`. `required_by` and `origin` describe who asked.
    fn resolve_path(
        &mut self,
        path: &ConfigPath,
        required_by: &ConfigPath,
        origin: &Origin,
    ) -> ConfigResult<ConfigNode> {
        if let Some(done) = self.memo.get(path) {
            return Ok(done.clone());
        }
        if self.in_progress.contains(path) {
            let start = self.chain.iter().position(|p| p == path).unwrap_or(0);
            let mut chain: Vec<String> = self.chain[start..].iter().map(ToString::to_string).collect();
            chain.push(path.to_string());
            return Err(ConfigError::CyclicReference {
                chain,
                origin: origin.clone(),
            });
        }

        self.in_progress.insert(path.clone());
        self.chain.push(path.clone());
        let result = match self.locate(path, required_by, origin) {
            Ok(Located::Raw(node)) => self.resolve_node(node, path),
            Ok(Located::Resolved(node)) => Ok(node),
            Err(e) => Err(e),
        };
        self.chain.pop();
        self.in_progress.remove(path);

        let resolved = result?;
        self.memo.insert(path.clone(), resolved.clone());
        Ok(resolved)
    }

    /// Walk to `path`, resolving any reference met on the way (`a.b.c` where
    /// `a.b` is itself `${x}`).
    fn locate(
        &mut self,
        path: &ConfigPath,
        required_by: &ConfigPath,
        origin: &Origin,
    ) -> ConfigResult<Located<'a>> {
        let tree: &'a ConfigNode = self.tree;
        let segments = path.segments();
        let mut node = tree;

        for (depth, segment) in segments.iter().enumerate() {
            let Some(child) = node.child(segment) else {
                return Err(ConfigError::missing_path(path, required_by.to_string(), origin));
            };
            let is_last = depth + 1 == segments.len();
            if !is_last && matches!(child.kind(), NodeKind::Reference(_)) {
                let prefix = path.prefix(depth + 1);
                let resolved = self.resolve_path(&prefix, required_by, origin)?;
                let rest = ConfigPath::parse(&segments[depth + 1..].join("."))?;
                return resolved
                    .get(&rest)
                    .cloned()
                    .map(Located::Resolved)
                    .ok_or_else(|| ConfigError::missing_path(path, required_by.to_string(), origin));
            }
            node = child;
        }
        Ok(Located::Raw(node))
    }

    fn resolve_node(&mut self, node: &'a ConfigNode, path: &ConfigPath) -> ConfigResult<ConfigNode> {
        let origin = node.origin();
        match node.kind() {
            NodeKind::Scalar(_) | NodeKind::Missing => Ok(node.clone()),
            NodeKind::Sequence(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for index in 0..items.len() {
                    resolved.push(self.resolve_path(&path.child(index.to_string()), path, origin)?);
                }
                Ok(ConfigNode::new(NodeKind::Sequence(resolved), origin.clone()))
            }
            NodeKind::Mapping(entries) => {
                let mut resolved = Mapping::new();
                for key in entries.keys() {
                    let value = self.resolve_path(&path.child(key.clone()), path, origin)?;
                    resolved.insert(key.clone(), value);
                }
                Ok(ConfigNode::mapping(resolved, origin.clone()))
            }
            NodeKind::Reference(interpolation) => {
                if let Some(target) = interpolation.whole_reference() {
                    let value = self.resolve_path(target, path, origin)?;
                    if matches!(value.kind(), NodeKind::Missing) {
                        return Err(ConfigError::MissingValue {
                            path: target.to_string(),
                            required_by: path.to_string(),
                            origin: origin.clone(),
                        });
                    }
                    return Ok(value.with_origin(origin.clone()));
                }

                let mut text = String::new();
                for part in interpolation.parts() {
                    match part {
                        Part::Literal(literal) => text.push_str(literal),
                        Part::Reference(target) => {
                            let value = self.resolve_path(target, path, origin)?;
                            match value.kind() {
                                NodeKind::Scalar(scalar) => text.push_str(&scalar.render()),
                                NodeKind::Missing => {
                                    return Err(ConfigError::MissingValue {
                                        path: target.to_string(),
                                        required_by: path.to_string(),
                                        origin: origin.clone(),
                                    });
                                }
                                other => {
                                    return Err(ConfigError::InterpolationType {
                                        path: path.to_string(),
                                        target: target.to_string(),
                                        found: other.type_name(),
                                        origin: origin.clone(),
                                    });
                                }
                            }
                        }
                    }
                }
                Ok(ConfigNode::scalar(Scalar::String(text), origin.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn yaml(text: &str) -> ConfigNode {
        ConfigNode::parse_yaml(text, &Origin::new("test.yaml")).unwrap()
    }

    #[test]
    fn test_whole_reference_keeps_type() {
        let resolved = resolve_references(yaml(
            r#"
algo:
  lr: 1.0e-3
  rollout_steps: 128
buffer:
  size: ${algo.rollout_steps}
"#,
        ))
        .unwrap();
        assert_eq!(resolved.get_i64("buffer.size").unwrap(), 128);
    }

    #[test]
    fn test_chained_references() {
        let resolved = resolve_references(yaml("a: ${b}\nb: ${c}\nc: 7\n")).unwrap();
        assert_eq!(resolved.get_i64("a").unwrap(), 7);
        assert_eq!(resolved.get_i64("b").unwrap(), 7);
    }

    #[test]
    fn test_embedded_references_render_scalars() {
        let resolved = resolve_references(yaml(
            "exp_name: ppo_cartpole\nseed: 5\nlog_dir: logs/${exp_name}/seed_${seed}\n",
        ))
        .unwrap();
        assert_eq!(resolved.get_str("log_dir").unwrap(), "logs/ppo_cartpole/seed_5");
    }

    #[test]
    fn test_reference_to_mapping_copies_subtree() {
        let resolved = resolve_references(yaml(
            "encoder: {dense_units: 512, layers: 2}\nactor:\n  encoder: ${encoder}\n",
        ))
        .unwrap();
        assert_eq!(resolved.get_i64("actor.encoder.dense_units").unwrap(), 512);
    }

    #[test]
    fn test_reference_through_referenced_mapping() {
        let resolved = resolve_references(yaml(
            "shared: {units: 64}\nalias: ${shared}\nwidth: ${alias.units}\n",
        ))
        .unwrap();
        assert_eq!(resolved.get_i64("width").unwrap(), 64);
    }

    #[test]
    fn test_references_inside_referenced_subtree_resolve() {
        let resolved = resolve_references(yaml(
            "steps: 32\ntemplate: {horizon: '${steps}'}\ncopy: ${template}\n",
        ))
        .unwrap();
        assert_eq!(resolved.get_i64("copy.horizon").unwrap(), 32);
    }

    #[test]
    fn test_sequence_elements_and_indices() {
        let resolved = resolve_references(yaml(
            "sizes: [64, '${width}']\nwidth: 128\nfirst: ${sizes.0}\n",
        ))
        .unwrap();
        assert_eq!(resolved.get_i64("sizes.1").unwrap(), 128);
        assert_eq!(resolved.get_i64("first").unwrap(), 64);
    }

    #[test]
    fn test_cycle_is_detected() {
        let err = resolve_references(yaml("a:\n  b: ${c.d}\nc:\n  d: ${a.b}\n")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CyclicReference);
        let ConfigError::CyclicReference { chain, .. } = err else {
            panic!("expected cycle");
        };
        assert_eq!(chain, vec!["a.b", "c.d", "a.b"]);
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let err = resolve_references(yaml("a: ${a}\n")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CyclicReference);
    }

    #[test]
    fn test_reference_to_ancestor_is_cycle() {
        let err = resolve_references(yaml("a:\n  inner: ${a}\n")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CyclicReference);
    }

    #[test]
    fn test_missing_path_names_target_and_origin() {
        let err = resolve_references(yaml("buffer:\n  size: ${algo.rollout_steps}\n")).unwrap_err();
        match err {
            ConfigError::MissingPath {
                path,
                required_by,
                origin,
            } => {
                assert_eq!(path, "algo.rollout_steps");
                assert_eq!(required_by, "buffer.size");
                assert_eq!(origin.as_str(), "test.yaml");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reference_to_missing_value() {
        let err = resolve_references(yaml("env:\n  id: ???\nname: ${env.id}\n")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingValue);
    }

    #[test]
    fn test_embedding_mapping_is_type_error() {
        let err = resolve_references(yaml("algo: {lr: 1}\nname: run_${algo}\n")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InterpolationType);
    }

    #[test]
    fn test_tree_without_references_unchanged() {
        let tree = yaml("algo: {lr: 0.001, layers: [1, 2]}\nname: run\nflag: null\n");
        let resolved = resolve_references(tree.clone()).unwrap();
        assert_eq!(resolved.root(), &tree);
    }

    #[test]
    fn test_typed_getters_report_mismatch() {
        let resolved = resolve_references(yaml("algo: {name: ppo, lr: 3}\n")).unwrap();
        assert_eq!(resolved.get_f64("algo.lr").unwrap(), 3.0);
        let err = resolved.get_i64("algo.name").unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
        let err = resolved.get_str("algo.missing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingPath);
    }

    #[test]
    fn test_extract_typed_section() {
        #[derive(serde::Deserialize)]
        struct Optimizer {
            lr: f64,
            eps: f64,
        }

        let resolved = resolve_references(yaml(
            "base_lr: 0.0003\nalgo:\n  optimizer: {lr: '${base_lr}', eps: 1.0e-5}\n",
        ))
        .unwrap();
        let optimizer: Optimizer = resolved.extract("algo.optimizer").unwrap();
        assert_eq!(optimizer.lr, 0.0003);
        assert_eq!(optimizer.eps, 1.0e-5);
    }
}

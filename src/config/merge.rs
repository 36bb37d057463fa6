//! Deep merge of configuration trees.
//!
//! Implements field-by-field merging where later overrides take precedence.
//! Sequences are replaced entirely, not concatenated.

use super::node::{ConfigNode, NodeKind};

/// Deep merge `overlay` onto `base`, returning a new tree.
///
/// - Mappings are merged recursively: keys in overlay override keys in base
/// - Scalars, references and sequences are replaced entirely
/// - A `???` in overlay preserves the base value (it means "not specified")
///
/// Neither input is modified.
///
/// # Example
/// ```
/// use expconf::config::{ConfigNode, Origin, apply_override};
///
/// let base = ConfigNode::parse_yaml("algo: {name: base, lr: 0.001}", &Origin::inline()).unwrap();
/// let overlay = ConfigNode::parse_yaml("algo: {name: sac}", &Origin::inline()).unwrap();
/// let merged = apply_override(&base, &overlay);
/// let expected = ConfigNode::parse_yaml("algo: {name: sac, lr: 0.001}", &Origin::inline()).unwrap();
/// assert_eq!(merged, expected);
/// ```
pub fn apply_override(base: &ConfigNode, overlay: &ConfigNode) -> ConfigNode {
    deep_merge(base.clone(), overlay.clone())
}

/// Merge a sequence of overrides onto `base` in order, later entries winning ties.
///
/// Equivalent to folding [`apply_override`] over the sequence.
pub fn apply_override_sequence<'a>(
    base: &ConfigNode,
    overrides: impl IntoIterator<Item = &'a ConfigNode>,
) -> ConfigNode {
    overrides
        .into_iter()
        .fold(base.clone(), |acc, overlay| deep_merge(acc, overlay.clone()))
}

/// Owned variant of [`apply_override`].
pub fn deep_merge(base: ConfigNode, overlay: ConfigNode) -> ConfigNode {
    let (base_kind, base_origin) = base.into_parts();
    let (overlay_kind, overlay_origin) = overlay.into_parts();
    match (base_kind, overlay_kind) {
        // Both are mappings: merge recursively, keeping the base's origin
        (NodeKind::Mapping(mut base_map), NodeKind::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            ConfigNode::mapping(base_map, base_origin)
        }
        // Overlay is `???`: preserve base
        (base_kind, NodeKind::Missing) => ConfigNode::new(base_kind, base_origin),
        // Any other case: overlay replaces base entirely
        (_, overlay_kind) => ConfigNode::new(overlay_kind, overlay_origin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Origin, Scalar};

    fn yaml(text: &str) -> ConfigNode {
        ConfigNode::parse_yaml(text, &Origin::new("test.yaml")).unwrap()
    }

    #[test]
    fn test_merge_simple_mappings() {
        let result = apply_override(&yaml("{a: 1, b: 2}"), &yaml("{b: 3, c: 4}"));
        assert_eq!(result, yaml("{a: 1, b: 3, c: 4}"));
    }

    #[test]
    fn test_merge_nested_mappings() {
        let base = yaml(
            r#"
algo:
  optimizer: {lr: 0.001, eps: 1.0e-8}
  rollout_steps: 128
seed: 42
"#,
        );
        let overlay = yaml("algo: {optimizer: {lr: 0.0003}}");
        let result = apply_override(&base, &overlay);
        assert_eq!(
            result,
            yaml(
                r#"
algo:
  optimizer: {lr: 0.0003, eps: 1.0e-8}
  rollout_steps: 128
seed: 42
"#
            )
        );
    }

    #[test]
    fn test_sequences_replaced_not_merged() {
        let result = apply_override(&yaml("layers: [64, 64, 64]"), &yaml("layers: [256]"));
        assert_eq!(result, yaml("layers: [256]"));
    }

    #[test]
    fn test_null_replaces_base() {
        let result = apply_override(&yaml("{a: 1, b: {c: 2}}"), &yaml("{a: null, b: null}"));
        assert_eq!(result, yaml("{a: null, b: null}"));
    }

    #[test]
    fn test_missing_marker_preserves_base() {
        let result = apply_override(&yaml("a: 1\nb: ???\n"), &yaml("a: ???\nb: 2\n"));
        assert_eq!(result, yaml("{a: 1, b: 2}"));
    }

    #[test]
    fn test_overlay_replaces_scalar_with_mapping() {
        let result = apply_override(&yaml("value: 42"), &yaml("value: {nested: true}"));
        assert_eq!(result, yaml("value: {nested: true}"));
    }

    #[test]
    fn test_overlay_replaces_mapping_with_scalar() {
        let result = apply_override(&yaml("value: {nested: true}"), &yaml("value: 42"));
        assert_eq!(result, yaml("value: 42"));
    }

    #[test]
    fn test_reference_replaced_like_a_leaf() {
        let result = apply_override(&yaml("size: ${algo.steps}"), &yaml("size: 64"));
        assert_eq!(result, yaml("size: 64"));
    }

    #[test]
    fn test_base_is_not_modified() {
        let base = yaml("algo: {name: base, lr: 0.001}");
        let snapshot = base.clone();
        let _ = apply_override(&base, &yaml("algo: {name: sac, extra: 1}"));
        assert_eq!(base, snapshot);
    }

    #[test]
    fn test_sequence_last_override_wins() {
        let base = yaml("algo: {name: base}");
        let overrides = [yaml("algo: {name: ppo}"), yaml("algo: {name: sac}")];
        let result = apply_override_sequence(&base, &overrides);
        let name = result
            .get(&"algo.name".parse().unwrap())
            .and_then(ConfigNode::as_scalar);
        assert_eq!(name, Some(&Scalar::String("sac".into())));
    }

    #[test]
    fn test_origin_follows_winning_leaf() {
        let base = yaml("algo: {name: base, lr: 0.001}");
        let overlay = ConfigNode::parse_yaml("algo: {name: sac}", &Origin::new("algo/sac.yaml")).unwrap();
        let result = apply_override(&base, &overlay);
        let name = result.get(&"algo.name".parse().unwrap()).unwrap();
        let lr = result.get(&"algo.lr".parse().unwrap()).unwrap();
        assert_eq!(name.origin().as_str(), "algo/sac.yaml");
        assert_eq!(lr.origin().as_str(), "test.yaml");
    }

    #[test]
    fn test_empty_sequence_of_overrides_returns_base() {
        let base = yaml("{a: 1}");
        let result = apply_override_sequence(&base, std::iter::empty());
        assert_eq!(result, base);
    }
}

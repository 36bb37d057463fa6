use expconf::config::{
    ConfigNode, ConfigPath, Mapping, NodeKind, Origin, Scalar, apply_override, apply_override_sequence,
    resolve_references,
};
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = ConfigNode> {
    prop_oneof![
        Just(Scalar::Null),
        any::<bool>().prop_map(Scalar::Bool),
        any::<i64>().prop_map(Scalar::Int),
        (-1.0e6f64..1.0e6).prop_map(Scalar::Float),
        "[a-z]{0,6}".prop_map(Scalar::String),
    ]
    .prop_map(|value| ConfigNode::scalar(value, Origin::inline()))
}

fn node() -> impl Strategy<Value = ConfigNode> {
    scalar().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::btree_map("[a-d]", inner.clone(), 0..4)
                .prop_map(|entries| ConfigNode::mapping(entries, Origin::inline())),
            prop::collection::vec(inner, 0..3)
                .prop_map(|items| ConfigNode::new(NodeKind::Sequence(items), Origin::inline())),
        ]
    })
}

fn tree_with_keys(keys: &'static str) -> impl Strategy<Value = ConfigNode> {
    prop::collection::btree_map(keys, node(), 0..4)
        .prop_map(|entries| ConfigNode::mapping(entries, Origin::inline()))
}

fn tree() -> impl Strategy<Value = ConfigNode> {
    tree_with_keys("[a-d]")
}

proptest! {
    #[test]
    fn test_apply_override_leaves_inputs_untouched(base in tree(), overlay in tree()) {
        let base_before = base.clone();
        let overlay_before = overlay.clone();
        let _ = apply_override(&base, &overlay);
        prop_assert_eq!(base, base_before);
        prop_assert_eq!(overlay, overlay_before);
    }

    #[test]
    fn test_sequence_is_left_fold(base in tree(), first in tree(), second in tree()) {
        let folded = apply_override(&apply_override(&base, &first), &second);
        let sequenced = apply_override_sequence(&base, [&first, &second]);
        prop_assert_eq!(sequenced, folded);
    }

    #[test]
    fn test_disjoint_overrides_commute(
        base in tree(),
        left in tree_with_keys("[a-d]"),
        right in tree_with_keys("[w-z]"),
    ) {
        let one_way = apply_override_sequence(&base, [&left, &right]);
        let other_way = apply_override_sequence(&base, [&right, &left]);
        prop_assert_eq!(one_way, other_way);
    }

    #[test]
    fn test_later_override_wins_on_overlap(base in tree(), first in scalar(), second in scalar()) {
        let mut a = Mapping::new();
        a.insert("k".to_string(), first);
        let mut b = Mapping::new();
        b.insert("k".to_string(), second.clone());
        let a = ConfigNode::mapping(a, Origin::inline());
        let b = ConfigNode::mapping(b, Origin::inline());

        let merged = apply_override_sequence(&base, [&a, &b]);
        let path = ConfigPath::parse("k").unwrap();
        prop_assert_eq!(merged.get(&path), Some(&second));
    }

    #[test]
    fn test_apply_override_is_idempotent(t in tree()) {
        prop_assert_eq!(apply_override(&t, &t), t);
    }

    #[test]
    fn test_resolving_reference_free_tree_is_identity(t in tree()) {
        let resolved = resolve_references(t.clone()).unwrap();
        prop_assert_eq!(resolved.root(), &t);
    }
}

#[test]
fn test_later_preset_wins_over_base() {
    let origin = Origin::inline();
    let base = ConfigNode::parse_yaml("algo:\n  name: base\n  lr: 0.001\n", &origin).unwrap();
    let ppo = ConfigNode::parse_yaml("algo:\n  name: ppo\n", &origin).unwrap();
    let sac = ConfigNode::parse_yaml("algo:\n  name: sac\n", &origin).unwrap();

    let merged = apply_override_sequence(&base, [&ppo, &sac]);
    let name = merged.get(&ConfigPath::parse("algo.name").unwrap()).unwrap();
    assert_eq!(name.as_scalar(), Some(&Scalar::String("sac".into())));
    assert!(merged.get(&ConfigPath::parse("algo.lr").unwrap()).is_some());
}

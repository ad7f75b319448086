//! Property tests for threshold propagation and structural identity.

use approx::abs_diff_eq;
use interlink_dsl::{spec_digest_v1, LinkSpecification, LogicOperator, SpecOperator};
use proptest::prelude::*;

fn measure() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9_]{0,8}")
        .unwrap()
        .prop_filter("measure names must not be operator keywords", |m| {
            SpecOperator::from_keyword(m).is_none()
        })
}

fn property() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-zA-Z0-9_]{0,6}").unwrap()
}

fn leaf() -> impl Strategy<Value = String> {
    (measure(), property(), property()).prop_map(|(m, p, q)| format!("{m}(x.{p},y.{q})"))
}

fn unit() -> impl Strategy<Value = f64> {
    (0u32..=1000).prop_map(|n| n as f64 / 1000.0)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn add_children_get_back_propagated_thresholds(
        left in leaf(),
        right in leaf(),
        c1 in 1u32..=100,
        c2 in 1u32..=100,
        theta in unit(),
    ) {
        let c1 = c1 as f64 / 100.0;
        let c2 = c2 as f64 / 100.0;
        let text = format!("ADD({c1}*{left}|0.5, {c2}*{right}|0.5)");
        let spec = LinkSpecification::parse(&text, theta).unwrap();

        prop_assert_eq!(spec.operator(), Some(LogicOperator::And));
        prop_assert_eq!(spec.threshold(), theta);
        let theta_left = spec.children()[0].threshold();
        let theta_right = spec.children()[1].threshold();
        prop_assert_eq!(theta_left, (theta - c2) / c1);
        prop_assert_eq!(theta_right, (theta - c1) / c2);

        // Each bound is where the weighted sum reaches theta with the other
        // similarity at its maximum of 1.
        prop_assert!(abs_diff_eq!(c1 * theta_left + c2, theta, epsilon = 1e-9));
        prop_assert!(abs_diff_eq!(c1 + c2 * theta_right, theta, epsilon = 1e-9));

        prop_assert_eq!(spec.weights(), Some((c1, c2)));
        let reparsed = LinkSpecification::parse(spec.full_expression(), theta).unwrap();
        prop_assert_eq!(reparsed.weights(), Some((c1, c2)));
        prop_assert_eq!(reparsed.full_expression(), spec.full_expression());
    }

    #[test]
    fn min_and_max_children_receive_theta_unchanged(
        left in leaf(),
        right in leaf(),
        t1 in unit(),
        t2 in unit(),
        theta in unit(),
        use_min in any::<bool>(),
    ) {
        let keyword = if use_min { "MIN" } else { "MAX" };
        let text = format!("{keyword}({left}|{t1}, {right}|{t2})");
        let spec = LinkSpecification::parse(&text, theta).unwrap();

        let expected = if use_min { LogicOperator::And } else { LogicOperator::Or };
        prop_assert_eq!(spec.operator(), Some(expected));
        for child in spec.children() {
            prop_assert_eq!(child.threshold(), theta);
        }
    }

    #[test]
    fn literal_operators_keep_written_thresholds(
        left in leaf(),
        right in leaf(),
        t1 in unit(),
        t2 in unit(),
        theta in unit(),
        op in prop_oneof![
            Just(SpecOperator::And),
            Just(SpecOperator::Or),
            Just(SpecOperator::Xor),
            Just(SpecOperator::Minus),
        ],
    ) {
        let text = format!("{}({left}|{t1}, {right}|{t2})", op.keyword());
        let spec = LinkSpecification::parse(&text, theta).unwrap();
        prop_assert_eq!(spec.children()[0].threshold(), t1);
        prop_assert_eq!(spec.children()[1].threshold(), t2);
        prop_assert_eq!(spec.threshold(), theta);
        prop_assert_eq!(spec.children()[0].filter_expression(), Some(left.as_str()));
    }

    #[test]
    fn swapping_children_preserves_equality_and_hash(
        left in leaf(),
        right in leaf(),
        t1 in unit(),
        t2 in unit(),
        op in prop_oneof![Just("AND"), Just("OR"), Just("XOR"), Just("MINUS")],
    ) {
        let a = LinkSpecification::parse(&format!("{op}({left}|{t1}, {right}|{t2})"), 0.5).unwrap();
        let b = LinkSpecification::parse(&format!("{op}({right}|{t2}, {left}|{t1})"), 0.5).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.structural_hash(), b.structural_hash());
        prop_assert_eq!(spec_digest_v1(&a), spec_digest_v1(&b));
    }

    #[test]
    fn size_counts_every_node_of_non_empty_trees(
        leaves in proptest::collection::vec(leaf(), 2..6),
        theta in 1u32..=1000,
    ) {
        let theta = theta as f64 / 1000.0;
        let mut text = format!("{}", leaves[0]);
        for next in &leaves[1..] {
            text = format!("OR({text}|0.9, {next}|0.8)");
        }
        let spec = LinkSpecification::parse(&text, theta).unwrap();
        prop_assert_eq!(spec.all_leaves().len(), leaves.len());
        prop_assert_eq!(spec.size(), 2 * leaves.len() - 1);
    }
}

//! End-to-end: specification text → tree → plan → engine → links.

use std::fs;
use std::sync::Arc;

use approx::assert_relative_eq;
use interlink_dsl::{spec_digest_v1, LinkSpecification, LogicOperator};
use interlink_engine::{
    Cache, CanonicalPlanner, Instance, Mapping, NestedPlan, RunConfig, SimpleExecutionEngine,
};

fn instance(uri: &str, props: &[(&str, &str)]) -> Instance {
    let mut i = Instance::new(uri);
    for (p, v) in props {
        i.add_property(p, *v);
    }
    i
}

fn drugs() -> (Cache, Cache) {
    let source: Cache = [
        instance("src:aspirin", &[("name", "Aspirin"), ("formula", "C9H8O4")]),
        instance("src:ibuprofen", &[("name", "Ibuprofen"), ("formula", "C13H18O2")]),
        instance("src:paracetamol", &[("name", "Paracetamol"), ("formula", "C8H9NO2")]),
    ]
    .into_iter()
    .collect();
    let target: Cache = [
        instance("tgt:1", &[("label", "aspirin"), ("formula", "C9H8O4")]),
        instance("tgt:2", &[("label", "ibuprofene"), ("formula", "C13H18O2")]),
        instance("tgt:3", &[("label", "acetaminophen"), ("formula", "C8H9NO2")]),
    ]
    .into_iter()
    .collect();
    (source, target)
}

fn run(expression: &str, theta: f64) -> Mapping {
    let (source, target) = drugs();
    let spec = LinkSpecification::parse(expression, theta).unwrap();
    let plan = CanonicalPlanner.plan(&spec);
    let engine = SimpleExecutionEngine::new(Arc::new(source), Arc::new(target), "?x", "?y");
    let execution = engine.execute_nested(&plan).unwrap();
    assert!(execution.is_clean(), "warnings: {:?}", execution.warnings);
    execution.mapping
}

#[test]
fn parse_scenario_from_grammar() {
    let spec = LinkSpecification::parse("AND(trigram(a)|0.9, jaccard(b)|0.8)", 0.85).unwrap();
    assert_eq!(spec.operator(), Some(LogicOperator::And));
    assert_eq!(spec.children()[0].threshold(), 0.9);
    assert_eq!(spec.children()[1].threshold(), 0.8);
    assert_eq!(spec.all_leaves().len(), 2);
}

#[test]
fn label_and_formula_agree() {
    let m = run(
        "AND(trigrams(x.name,y.label)|0.6, exactmatch(x.formula,y.formula)|1.0)",
        0.6,
    );
    assert_eq!(m.size(), 2);
    assert_relative_eq!(m.confidence("src:aspirin", "tgt:1"), 1.0);
    assert!(m.contains("src:ibuprofen", "tgt:2"));
    assert!(!m.contains("src:paracetamol", "tgt:3"));
}

#[test]
fn formula_alone_finds_synonyms() {
    let m = run(
        "MINUS(exactmatch(x.formula,y.formula)|1.0, trigrams(x.name,y.label)|0.6)",
        0.5,
    );
    assert_eq!(m.pairs_output(), "src:paracetamol,tgt:3\n");
}

#[test]
fn max_needs_one_side_at_theta() {
    let m = run(
        "MAX(levenshtein(x.name,y.label)|0.1, exactmatch(x.formula,y.formula)|0.1)",
        0.9,
    );
    // MAX passes θ to both children: only the formula matches reach it.
    assert_eq!(m.size(), 3);
    assert_eq!(Mapping::best_one_to_one(&m).size(), 3);
}

#[test]
fn add_weighs_name_and_formula() {
    // Dice(Ibuprofen, ibuprofene) = 18/23: the lower of the two scores misses
    // θ, the weighted sum does not.
    let m = run(
        "ADD(0.5*trigrams(x.name,y.label)|0.0, 0.5*exactmatch(x.formula,y.formula)|0.0)",
        0.85,
    );
    assert_eq!(m.size(), 2);
    assert_relative_eq!(m.confidence("src:aspirin", "tgt:1"), 1.0);
    assert_relative_eq!(
        m.confidence("src:ibuprofen", "tgt:2"),
        0.5 * 18.0 / 23.0 + 0.5,
        epsilon = 1e-9
    );

    let strict = run(
        "AND(trigrams(x.name,y.label)|0.85, exactmatch(x.formula,y.formula)|0.85)",
        0.85,
    );
    assert!(!strict.contains("src:ibuprofen", "tgt:2"));
}

#[test]
fn equal_specs_plan_identically() {
    let a = LinkSpecification::parse(
        "OR(trigrams(x.name,y.label)|0.6, exactmatch(x.formula,y.formula)|1.0)",
        0.5,
    )
    .unwrap();
    let b = LinkSpecification::parse(
        "OR(exactmatch(x.formula,y.formula)|1.0, TRIGRAMS(x.name,y.label)|0.6)",
        0.5,
    )
    .unwrap();
    assert_eq!(a, b);
    assert_eq!(spec_digest_v1(&a), spec_digest_v1(&b));

    let pa: NestedPlan = CanonicalPlanner.plan(&a);
    let pb: NestedPlan = CanonicalPlanner.plan(&b);
    let ma = run(a.full_expression(), 0.5);
    let mb = run(b.full_expression(), 0.5);
    assert_eq!(pa.size(), pb.size());
    assert_eq!(ma, mb);
}

#[test]
fn configuration_drives_threshold_split() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    fs::write(
        &path,
        r#"{
            "source": {"id": "drugbank", "var": "?x"},
            "target": {"id": "chebi", "var": "?y"},
            "metric": "trigrams(x.name,y.label)",
            "acceptance_threshold": 0.95,
            "verification_threshold": 0.6
        }"#,
    )
    .unwrap();
    let config = RunConfig::from_path(&path).unwrap();

    let m = run(&config.metric, config.verification_threshold);
    let (accepted, review) =
        m.split_by_thresholds(config.acceptance_threshold, config.verification_threshold);
    assert!(accepted.contains("src:aspirin", "tgt:1"));
    assert!(review.contains("src:ibuprofen", "tgt:2"));
    assert_eq!(accepted.size() + review.size(), m.size());
}

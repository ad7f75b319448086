use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn interlink_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_interlink"))
}

#[test]
fn parse_json_reports_tree_and_digest() {
    let output = Command::new(interlink_bin())
        .args([
            "parse",
            "ADD(0.5*trigrams(x.name,y.label)|0.1, 0.5*levenshtein(x.name,y.label)|0.1)",
            "--threshold",
            "0.8",
            "--json",
        ])
        .output()
        .expect("run interlink parse");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(json["size"], 3);
    assert!(json["digest"].as_str().unwrap().starts_with("fnv1a64:"));
    assert_eq!(json["redundant_properties"], true);
    let leaves = json["leaves"].as_array().unwrap();
    assert_eq!(leaves.len(), 2);
    // (0.8 - 0.5) / 0.5
    assert!((leaves[0]["threshold"].as_f64().unwrap() - 0.6).abs() < 1e-9);
}

#[test]
fn plan_prints_final_plan() {
    let output = Command::new(interlink_bin())
        .args([
            "plan",
            "OR(exactmatch(x.id,y.id)|1.0, trigrams(x.name,y.label)|0.7)",
            "-t",
            "0.5",
        ])
        .output()
        .expect("run interlink plan");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("RUN:exactmatch(x.id,y.id)-1"));
    assert!(stdout.contains("UNION"));
    assert!(stdout.contains("FILTER:0.5"));
}

#[test]
fn plan_of_add_filters_with_weighted_sum() {
    let output = Command::new(interlink_bin())
        .args([
            "plan",
            "ADD(0.7*trigrams(x.name,y.label)|0.0, 0.3*exactmatch(x.id,y.id)|0.0)",
            "-t",
            "0.8",
        ])
        .output()
        .expect("run interlink plan");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("INTERSECTION"));
    assert!(stdout.contains("FILTER:ADD(0.7*trigrams(x.name,y.label)|"));
    assert!(stdout.contains("0.3*exactmatch(x.id,y.id)|"));
}

#[test]
fn malformed_expression_fails() {
    let output = Command::new(interlink_bin())
        .args(["parse", "AND(trigrams(x.name,y.label)|0.5)"])
        .output()
        .expect("run interlink parse");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to parse specification"));
}

#[test]
fn run_prints_pairs_without_output_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("run.json");
    fs::write(
        &config,
        r#"{"source": {"id": "a", "var": "?x"}, "target": {"id": "b", "var": "?y"},
            "metric": "soundex(x.name,y.name)",
            "acceptance_threshold": 0.9, "verification_threshold": 0.5}"#,
    )
    .unwrap();
    let instances = dir.path().join("instances.json");
    fs::write(&instances, r#"[{"uri": "e:1", "properties": {"name": ["x"]}}]"#).unwrap();

    let output = Command::new(interlink_bin())
        .arg("run")
        .arg(&config)
        .arg("--source")
        .arg(&instances)
        .arg("--target")
        .arg(&instances)
        .output()
        .expect("run interlink run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("# accepted (0 links)"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unresolved measure `soundex`"));
}

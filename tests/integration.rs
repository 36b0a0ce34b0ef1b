use std::collections::BTreeMap;
use std::fs;
use std::process::Command;

use tempfile::TempDir;

const TRIANGLE: &str = "\
nodes:
  a: {x: 0, y: 0, fixed: true}
edges:
  a:
    b: {length: 2}
    c: {length: 2}
  b:
    c: {length: 2}
";

type Positions = BTreeMap<String, [f64; 2]>;

#[test]
fn lays_out_graph_to_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("graph.yaml");
    let output = dir.path().join("layout.json");
    fs::write(&input, TRIANGLE).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_forcelayout"))
        .args(["layout", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .status()
        .expect("Failed to execute forcelayout");

    assert!(status.success(), "forcelayout exited with error");

    let positions: Positions = serde_json::from_str(&fs::read_to_string(&output).unwrap())
        .expect("output is not a position map");
    assert_eq!(
        positions.keys().map(String::as_str).collect::<Vec<_>>(),
        ["a", "b", "c"]
    );
    // fixed node stays put
    assert_eq!(positions["a"], [0.0, 0.0]);
    assert!(positions.values().flatten().all(|v| v.is_finite()));
}

#[test]
fn writes_json_to_stdout_with_parameters() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("graph.json");
    let config = dir.path().join("params.yml");
    fs::write(&input, r#"{"edges": {"x": {"y": {}}}}"#).unwrap();
    fs::write(&config, "integrator: euler\nprecision: 0\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_forcelayout"))
        .args(["layout", "--max-frames", "50", "--input"])
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("Failed to execute forcelayout");

    assert!(output.status.success(), "forcelayout exited with error");
    let positions: Positions =
        serde_json::from_slice(&output.stdout).expect("stdout is not a position map");
    assert_eq!(positions.len(), 2);
}

#[test]
fn same_input_gives_same_layout() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("graph.yaml");
    fs::write(&input, TRIANGLE).unwrap();

    let run = || {
        let output = Command::new(env!("CARGO_BIN_EXE_forcelayout"))
            .args(["layout", "--max-frames", "100", "--input"])
            .arg(&input)
            .output()
            .expect("Failed to execute forcelayout");
        assert!(output.status.success());
        output.stdout
    };

    assert_eq!(run(), run());
}

#[test]
fn unsupported_input_format_fails() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("graph.ttl");
    fs::write(&input, "").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_forcelayout"))
        .args(["layout", "--input"])
        .arg(&input)
        .output()
        .expect("Failed to execute forcelayout");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported format: ttl"), "stderr: {stderr}");
}

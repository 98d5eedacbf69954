use std::process::Command;

use ordinal_harness::{write_comparison_log, Comparison};
use serde_json::Value;
use tempfile::tempdir;

fn ordinal() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ordinal"))
}

fn read_json(path: &std::path::Path) -> Value {
    let text = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn ranked_items(snapshot: &Value) -> Vec<String> {
    snapshot["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["item"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn fit_ranks_a_stored_log() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("log.jsonl");
    let out_path = dir.path().join("ranking.json");
    let log = vec![
        Comparison::new("x", "y"),
        Comparison::new("y", "z"),
        Comparison::new("x", "z"),
        Comparison::new("x", "y"),
    ];
    write_comparison_log(&log_path, &log).unwrap();

    let status = ordinal()
        .args(["fit", "--log"])
        .arg(&log_path)
        .args(["--items", "z,y,x,w", "--out"])
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());

    let snapshot = read_json(&out_path);
    assert_eq!(snapshot["comparisons_made"], 4);
    assert_eq!(snapshot["component_count"], 2);
    let order = ranked_items(&snapshot);
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], "x");
    assert_eq!(snapshot["entries"][0]["rank"], 1);
}

#[test]
fn fit_rejects_log_with_unregistered_item() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("log.jsonl");
    write_comparison_log(&log_path, &[Comparison::new("x", "q")]).unwrap();

    let output = ordinal()
        .args(["fit", "--log"])
        .arg(&log_path)
        .args(["--items", "x,y"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("q"), "stderr: {stderr}");
}

#[test]
fn simulate_writes_ranking_and_log() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("sim.jsonl");
    let out_path = dir.path().join("sim.json");

    let status = ordinal()
        .args([
            "simulate",
            "--items",
            "low,mid,high",
            "--strengths=-3,0,3",
            "--noise",
            "0",
            "--budget",
            "9",
            "--seed",
            "7",
            "--log",
        ])
        .arg(&log_path)
        .arg("--out")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());

    let snapshot = read_json(&out_path);
    assert_eq!(snapshot["comparisons_made"], 9);
    assert_eq!(ranked_items(&snapshot).len(), 3);

    let lines = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(lines.lines().count(), 9);
}

#[test]
fn eval_writes_results_and_curve() {
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("eval.jsonl");
    let csv_path = dir.path().join("curve.csv");

    let status = ordinal()
        .args(["eval", "--case", "clean_ordering", "--out"])
        .arg(&out_path)
        .arg("--curve-csv")
        .arg(&csv_path)
        .status()
        .unwrap();
    assert!(status.success());

    let text = std::fs::read_to_string(&out_path).unwrap();
    let results: Vec<Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["case_name"], "clean_ordering_8");
    assert_eq!(results[0]["metrics"]["comparisons_used"], 40);
    assert_eq!(
        results[0]["metrics"]["stop_reason"]["reason"],
        "budget_exhausted"
    );

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert!(csv.starts_with("case,comparison,aggregate_confidence\n"));
    assert_eq!(csv.lines().count(), 41);
}

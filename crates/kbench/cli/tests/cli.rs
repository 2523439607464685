use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn kbench() -> Command {
    let mut cmd = Command::cargo_bin("kbench").unwrap();
    cmd.env_remove("KBENCH_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    kbench()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bootstrap"))
        .stdout(predicate::str::contains("invoke"))
        .stdout(predicate::str::contains("cleanup"));
}

#[test]
fn missing_config_file_fails() {
    kbench()
        .args(["--config", "/nonexistent/kbench.json", "cleanup"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn unknown_benchmark_fails_before_touching_the_cluster() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{"benchmarks": [{{
            "name": "fib",
            "functions": ["fibonacci-python"],
            "entry-point": "fibonacci-python",
            "sla": {{"p50_us": 1000.0, "p90_us": 2000.0}},
            "rps-range": {{"min": 10, "max": 20}},
            "replicas": {{"min": 1, "max": 2}}
        }}]}}"#
    )
    .unwrap();

    kbench()
        .args(["--config", file.path().to_str().unwrap()])
        .args(["invoke", "--benchmark", "nope", "--rps", "10", "--duration", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope"));
}

#[test]
fn bootstrap_rejects_bad_testbed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"servers": {{"hostnames": {{}}}}}}"#).unwrap();

    kbench()
        .args(["bootstrap", "--testbed", file.path().to_str().unwrap()])
        .assert()
        .failure();
}

use assert_cmd::Command;
use predicates::prelude::*;

fn governor_cmd() -> Command {
    let mut cmd = Command::cargo_bin("quota-governor").unwrap();
    for var in [
        "QUOTA_GOVERNOR_TIER",
        "QUOTA_GOVERNOR_SAFETY_FACTOR",
        "QUOTA_GOVERNOR_MONITORING",
        "QUOTA_GOVERNOR_BASE_DELAY_SECS",
        "QUOTA_GOVERNOR_MAX_DELAY_SECS",
        "QUOTA_GOVERNOR_LOW_HEADROOM",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_cli_version() {
    governor_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("quota-governor 0.1.0"));
}

#[test]
fn test_cli_help() {
    governor_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Adaptive client-side rate governor for quota-limited APIs",
        ));
}

#[test]
fn test_cli_catalog_single_tier() {
    governor_cmd()
        .args(["catalog", "--tier", "basic"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BASIC"))
        .stdout(predicate::str::contains("get_users_tweets"))
        .stdout(predicate::str::contains("per app"));
}

#[test]
fn test_cli_catalog_enterprise_fallback() {
    governor_cmd()
        .args(["catalog", "--tier", "enterprise"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fallback"));
}

#[test]
fn test_cli_rejects_unknown_tier() {
    governor_cmd()
        .args(["catalog", "--tier", "gold"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown API tier: gold"));
}

#[test]
fn test_cli_plan() {
    governor_cmd()
        .args(["plan", "--tier", "basic", "--safety-factor", "0.8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tier BASIC at 80% safety factor"))
        .stdout(predicate::str::contains("recommended interval 112.5s"));
}

#[test]
fn test_cli_plan_rejects_bad_safety_factor() {
    governor_cmd()
        .args(["plan", "--safety-factor", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid safety factor"));
}

#[test]
fn test_cli_simulate_summary() {
    governor_cmd()
        .args(["simulate", "--tier", "pro", "--endpoint", "search_recent", "--calls", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rate limit status summary"))
        .stdout(predicate::str::contains("3/360 (15 minute window)"));
}

#[test]
fn test_cli_simulate_json_and_metrics() {
    governor_cmd()
        .args([
            "simulate",
            "--tier",
            "pro",
            "--calls",
            "2",
            "--json",
            "--metrics",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_admitted\": 2"))
        .stdout(predicate::str::contains("governor_admissions_total"));
}

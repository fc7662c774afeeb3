//! Scenario: CLI commands that need no database.
//!
//! # Invariants under test
//!
//! 1. `config-hash` is stable across key order and prints canonical JSON.
//! 2. `ingest --dry-run` reports counters from an in-memory store.
//! 3. `ingest --dry-run --analyze` also tags the ingested trades.
//! 4. An empty CSV fails the command with the run-level message.
//! 5. `behaviors` lists the catalog.
//! 6. `ingest --ledger` stores FIFO round trips and lists cash events.

use std::fs;

use assert_cmd::prelude::*;
use predicates::prelude::*;

const CSV: &str = "\
Ticker,Action,Quantity,Price,Date,closed_at,pnl
AAPL,BUY,10,100,2024-05-06T14:00:00Z,2024-05-06T14:20:00Z,-50
AAPL,BUY,10,100,2024-05-06T15:00:00Z,2024-05-06T15:30:00Z,30
MSFT,LONG,5,200,2024-05-07T14:00:00Z,,
";

fn tg() -> std::process::Command {
    let mut cmd = std::process::Command::cargo_bin("tg").expect("tg binary");
    cmd.env_remove("RUST_LOG");
    cmd
}

// ---------------------------------------------------------------------------
// 1. config-hash
// ---------------------------------------------------------------------------

#[test]
fn config_hash_ignores_key_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let a = dir.path().join("a.yaml");
    let b = dir.path().join("b.yaml");
    fs::write(&a, "store:\n  backend: memory\n  max_connections: 4\n")?;
    fs::write(&b, "store:\n  max_connections: 4\n  backend: memory\n")?;

    let out_a = tg().args(["config-hash", a.to_str().unwrap()]).output()?;
    let out_b = tg().args(["config-hash", b.to_str().unwrap()]).output()?;
    assert!(out_a.status.success());
    assert_eq!(out_a.stdout, out_b.stdout);

    let stdout = String::from_utf8(out_a.stdout)?;
    assert!(stdout.starts_with("config_hash="));
    assert!(stdout.contains("\"backend\":\"memory\""));
    Ok(())
}

#[test]
fn config_hash_requires_paths() {
    tg().arg("config-hash").assert().failure();
}

// ---------------------------------------------------------------------------
// 2-4. dry-run ingest
// ---------------------------------------------------------------------------

#[test]
fn dry_run_ingest_reports_counters() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broker.csv");
    fs::write(&path, CSV)?;

    // MSFT side "LONG" is not a valid side
    tg().args(["ingest", "--user", "user-a", "--dry-run", "--file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("run_id="))
        .stdout(predicate::str::contains(
            "rows_processed=2 rows_inserted=2 rows_updated=0 rows_failed=1",
        ));
    Ok(())
}

#[test]
fn dry_run_ingest_can_analyze() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broker.csv");
    fs::write(&path, CSV)?;

    tg().args(["ingest", "--user", "user-a", "--dry-run", "--analyze", "--file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("trades_analyzed=2"));
    Ok(())
}

#[test]
fn empty_csv_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("empty.csv");
    fs::write(&path, "")?;

    tg().args(["ingest", "--user", "user-a", "--dry-run", "--file"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("csv has no header row"));
    Ok(())
}

#[test]
fn missing_file_fails() {
    tg().args([
        "ingest",
        "--user",
        "user-a",
        "--dry-run",
        "--file",
        "/definitely/not/here.csv",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("read /definitely/not/here.csv"));
}

// ---------------------------------------------------------------------------
// 5. behaviors
// ---------------------------------------------------------------------------

#[test]
fn behaviors_lists_catalog() {
    tg().arg("behaviors")
        .assert()
        .success()
        .stdout(predicate::str::contains("revenge_immediate\ttrade\tbehavior\t-\tRevenge Trade"))
        .stdout(predicate::str::contains("focused_day\tday"));
}

// ---------------------------------------------------------------------------
// 6. ledger ingest
// ---------------------------------------------------------------------------

#[test]
fn dry_run_ledger_ingest_reports_round_trips() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.csv");
    fs::write(
        &path,
        "date,ticker,action,quantity,price,amount
         2024-05-01,,ACH Deposit,,,5000
         2024-05-01,AAPL,Buy,10,100,-1000
         2024-05-02,AAPL,Buy,5,110,-550
         2024-05-03,AAPL,Sell,12,120,1440
",
    )?;

    tg().args(["ingest", "--user", "user-a", "--dry-run", "--ledger", "--file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("cash_event date=2024-05-01 kind=deposit amount=5000"))
        .stdout(predicate::str::contains("round_trips=2 cash_events=1 rows_ignored=0"))
        .stdout(predicate::str::contains(
            "rows_processed=2 rows_inserted=2 rows_updated=0 rows_failed=0",
        ));
    Ok(())
}

#[test]
fn ledger_without_required_columns_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.csv");
    fs::write(&path, "date,ticker,action
2024-05-01,AAPL,Buy
")?;

    tg().args(["ingest", "--user", "user-a", "--dry-run", "--ledger", "--file"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required columns: quantity, price"));
    Ok(())
}

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PAYLOAD: &str = r#"[
  {"externalTransactionId": "tx1", "amountSigned": -42.50, "date": "2025-05-20",
   "name": "CVS PHARMACY #123", "merchantName": "CVS", "pending": false},
  {"externalTransactionId": "tx2", "amountSigned": 18.00, "date": "2025-05-21",
   "name": "SQ *CORNER CAFE 9921", "pending": true},
  {"amountSigned": 5.00, "date": "2025-05-22", "name": "NO ID"}
]"#;

fn carekeep(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("carekeep").unwrap();
    cmd.env("HOME", home.path()).env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn initialized() -> TempDir {
    let home = tempfile::tempdir().unwrap();
    carekeep(&home).args(["init", "--agi", "80000"]).assert().success();
    home
}

fn write_payload(home: &TempDir) -> String {
    let path = home.path().join("batch.json");
    std::fs::write(&path, PAYLOAD).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_commands_require_init() {
    let home = tempfile::tempdir().unwrap();
    carekeep(&home)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("carekeep init"));
}

#[test]
fn test_init_writes_settings_and_database() {
    let home = initialized();
    assert!(home.path().join(".config/carekeep/settings.json").exists());
    assert!(home.path().join("Documents/carekeep/carekeep.db").exists());
}

#[test]
fn test_sync_is_idempotent() {
    let home = initialized();
    let payload = write_payload(&home);
    carekeep(&home)
        .args(["sync", &payload])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 new, 0 updated"))
        .stdout(predicate::str::contains("1 invalid"));
    carekeep(&home)
        .args(["sync", &payload])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 new, 2 updated"));
}

#[test]
fn test_sync_into_unknown_account_fails() {
    let home = initialized();
    let payload = write_payload(&home);
    carekeep(&home)
        .args(["sync", &payload, "--account", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown account"));
}

#[test]
fn test_keep_undo_round_trip() {
    let home = initialized();
    let payload = write_payload(&home);
    carekeep(&home).args(["accounts", "add", "Checking"]).assert().success();
    carekeep(&home).args(["sync", &payload, "--account", "Checking"]).assert().success();

    carekeep(&home)
        .args(["triage", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CVS PHARMACY"));
    carekeep(&home)
        .args(["triage", "keep", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$42.50"));
    carekeep(&home)
        .args(["triage", "keep", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already kept"));
    carekeep(&home)
        .args(["expenses", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 expenses, $42.50"));

    carekeep(&home)
        .args(["triage", "undo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Undid keep of transaction 1"));
    carekeep(&home)
        .args(["expenses", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 expenses"));
    carekeep(&home)
        .args(["triage", "undo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to undo"));
}

#[test]
fn test_status_reports_tax_progress() {
    let home = initialized();
    carekeep(&home)
        .args(["expenses", "add", "1500", "--date", "2025-03-01", "--deductible"])
        .assert()
        .success();
    carekeep(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("$6,000.00"));
}

#[test]
fn test_recipient_delete_blocked_while_in_use() {
    let home = initialized();
    carekeep(&home).args(["recipients", "add", "Mom"]).assert().success();
    carekeep(&home)
        .args(["expenses", "add", "30", "--recipient", "1"])
        .assert()
        .success();
    carekeep(&home)
        .args(["recipients", "delete", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("referenced by 1 expense"));
}

#[test]
fn test_rules_reject_unknown_category() {
    let home = initialized();
    carekeep(&home)
        .args(["rules", "add", "scooter", "--category", "toys"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category"));
    carekeep(&home)
        .args(["rules", "add", "scooter", "--category", "equipment"])
        .assert()
        .success();
    carekeep(&home)
        .args(["rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scooter"));
}

#[test]
fn test_reconcile_on_clean_database() {
    let home = initialized();
    carekeep(&home)
        .arg("reconcile")
        .assert()
        .success()
        .stdout(predicate::str::contains("consistent"));
}

use std::path::Path;
use std::process::{Command, Output};

fn cipt(cwd: &Path, args: &[&str]) -> Output {
    cipt_with_tz(cwd, "America/Fortaleza", args)
}

fn cipt_with_tz(cwd: &Path, tz: &str, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cipt"))
        .args(args)
        .current_dir(cwd)
        .env("TZ", tz)
        .env_remove("SQLITE_STORAGE")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run cipt")
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn phone_prints_last_eleven_digits() {
    let dir = tempfile::tempdir().unwrap();
    let out = cipt(dir.path(), &["phone", "+55 (85) 99999-1234"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out).trim(), "85999991234");
}

#[test]
fn fix_on_missing_database_exits_nonzero_without_creating_it() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("missing.sqlite");
    let db_arg = db.to_str().unwrap();

    for args in [
        vec!["fix", "unify-status", db_arg],
        vec!["fix", "unify-status", db_arg, "--dry-run"],
        vec!["fix", "final-installment", "2025", db_arg],
        vec!["fix", "final-installment", "2025", db_arg, "--dry-run"],
    ] {
        let out = cipt(dir.path(), &args);
        assert_eq!(out.status.code(), Some(1), "{args:?}");
        assert!(
            String::from_utf8_lossy(&out.stderr).contains("database not found"),
            "{args:?}"
        );
        assert!(!db.exists(), "{args:?} created the database");
    }
}

#[test]
fn final_installment_defaults_to_db_sqlite_in_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let out = cipt(dir.path(), &["fix", "final-installment"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!dir.path().join("db.sqlite").exists());
}

#[test]
fn migrate_up_status_down_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cipt.db");
    let db_arg = db.to_str().unwrap();

    let up = cipt(dir.path(), &["--db", db_arg, "migrate", "up"]);
    assert!(up.status.success(), "{}", String::from_utf8_lossy(&up.stderr));
    assert!(stdout(&up).contains("applied 20250930150010-create-espacos-evento"));

    let again = cipt(dir.path(), &["--db", db_arg, "migrate", "up"]);
    assert!(stdout(&again).contains("Database is up to date."));

    let status = cipt(dir.path(), &["--db", db_arg, "migrate", "status", "--json"]);
    assert!(status.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert!(rows.iter().all(|r| r["applied"] == true));

    let down = cipt(dir.path(), &["--db", db_arg, "migrate", "down"]);
    assert!(down.status.success());
    assert_eq!(
        stdout(&down).trim(),
        "reverted 20250930150010-create-espacos-evento"
    );
}

#[test]
fn migrate_up_to_unknown_id_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cipt.db");
    let out = cipt(
        dir.path(),
        &["--db", db.to_str().unwrap(), "migrate", "up", "--to", "20990101000000-nope"],
    );
    assert!(!out.status.success());
}

#[test]
fn fix_runs_against_a_migrated_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("db.sqlite");
    let db_arg = db.to_str().unwrap();
    assert!(cipt(dir.path(), &["--db", db_arg, "migrate", "up"]).status.success());

    let out = cipt(dir.path(), &["fix", "unify-status", db_arg]);
    assert!(out.status.success());
    assert_eq!(stdout(&out).trim(), "matched 0, updated 0");

    let out = cipt(dir.path(), &["fix", "final-installment", "2025", "--dry-run"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains("created 0"));
}

#[test]
fn posix_tz_does_not_break_commands() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("db.sqlite");
    let db_arg = db.to_str().unwrap();

    for tz in [":/etc/localtime", "EST5EDT4"] {
        let up = cipt_with_tz(dir.path(), tz, &["--db", db_arg, "migrate", "up"]);
        assert!(up.status.success(), "{tz}: {}", stderr(&up));

        let out = cipt_with_tz(dir.path(), tz, &["fix", "unify-status", db_arg]);
        assert!(out.status.success(), "{tz}: {}", stderr(&out));
        assert_eq!(stdout(&out).trim(), "matched 0, updated 0");

        let out = cipt_with_tz(
            dir.path(),
            tz,
            &["fix", "final-installment", "2025", db_arg, "--dry-run"],
        );
        assert!(out.status.success(), "{tz}: {}", stderr(&out));
        assert!(stderr(&out).contains("not an IANA timezone name"), "{tz}");
    }
}

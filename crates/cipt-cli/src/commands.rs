use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Datelike;
use cipt_config::{ConfigLoader, ResolvedConfig};
use cipt_db::{MigrationRunner, MigrationStatus};
use cipt_fixes::calendar::today_in;
use cipt_fixes::{
    FinalInstallmentOptions, Target, UnifyStatusOptions, final_installment, unify_status,
    with_target,
};
use rusqlite::Connection;
use tracing::info;

/// Database used by `fix final-installment` when no path is given.
pub const FIX_DEFAULT_DB: &str = "./db.sqlite";

pub fn load_config(config_file: Option<PathBuf>, db: Option<PathBuf>) -> Result<ResolvedConfig> {
    let mut config = ConfigLoader::from_cwd()?
        .with_config_file(config_file)
        .load()
        .context("failed to load configuration")?;
    if let Some(db) = db {
        config.storage_path = db;
    }
    Ok(config)
}

fn runner_connection(config: &ResolvedConfig) -> Result<Connection> {
    info!("using database {}", config.storage_path.display());
    Ok(cipt_db::open(&config.storage_path, config.busy_timeout)?)
}

pub fn migrate_up(config: &ResolvedConfig, to: Option<&str>) -> Result<()> {
    let runner = MigrationRunner::with_catalogue()?;
    let mut conn = runner_connection(config)?;
    let report = match to {
        Some(target) => runner.apply_to(&mut conn, target)?,
        None => runner.apply_all(&mut conn)?,
    };
    if report.is_empty() {
        println!("Database is up to date.");
    } else {
        for id in &report.applied {
            println!("applied {id}");
        }
    }
    Ok(())
}

pub fn migrate_down(config: &ResolvedConfig) -> Result<()> {
    let runner = MigrationRunner::with_catalogue()?;
    let mut conn = runner_connection(config)?;
    let id = runner.revert_last(&mut conn)?;
    println!("reverted {id}");
    Ok(())
}

pub fn migrate_status(config: &ResolvedConfig, json: bool) -> Result<()> {
    let runner = MigrationRunner::with_catalogue()?;
    let conn = runner_connection(config)?;
    let status = runner.status(&conn)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in &status {
            println!("{}", format_status(line));
        }
    }
    Ok(())
}

fn format_status(s: &MigrationStatus) -> String {
    let state = match (s.applied, s.unknown) {
        (_, true) => "unknown",
        (true, false) => "applied",
        (false, false) => "pending",
    };
    let when = s
        .applied_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let marker = if s.reversible { "" } else { " (irreversible)" };
    format!("{state:<8} {:<60} {when}{marker}", s.id)
        .trim_end()
        .to_string()
}

fn target(config: &ResolvedConfig, db_path: PathBuf) -> Target {
    Target::new(db_path).with_busy_timeout(config.busy_timeout)
}

pub fn fix_unify_status(config: &ResolvedConfig, db_path: PathBuf, dry_run: bool) -> Result<()> {
    let opts = UnifyStatusOptions { dry_run };
    let report = with_target(&target(config, db_path), |conn| unify_status::run(conn, &opts))?;
    println!(
        "matched {}, updated {}{}",
        report.matched,
        report.updated,
        if dry_run { " (dry-run)" } else { "" }
    );
    Ok(())
}

pub fn fix_final_installment(
    config: &ResolvedConfig,
    db_path: PathBuf,
    year: Option<i32>,
    dry_run: bool,
) -> Result<()> {
    let today = today_in(config.timezone()?);
    let opts = FinalInstallmentOptions {
        year: year.unwrap_or_else(|| today.year()),
        dry_run,
        today,
    };
    let report = with_target(&target(config, db_path), |conn| {
        final_installment::run(conn, &opts)
    })?;
    println!(
        "created {}, planned {}, skipped {}{}",
        report.created.len(),
        report.planned.len(),
        report.skipped.len(),
        if dry_run { " (dry-run)" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn status(applied: bool, unknown: bool, reversible: bool) -> MigrationStatus {
        MigrationStatus {
            id: "20250816000000-unify-vencida-status".into(),
            applied,
            applied_at: applied.then(|| Utc.with_ymd_and_hms(2025, 8, 16, 12, 0, 0).unwrap()),
            reversible,
            unknown,
        }
    }

    #[test]
    fn pending_line_has_no_timestamp() {
        let line = format_status(&status(false, false, true));
        assert!(line.starts_with("pending "));
        assert!(line.ends_with("unify-vencida-status"));
    }

    #[test]
    fn applied_irreversible_line() {
        let line = format_status(&status(true, false, false));
        assert!(line.starts_with("applied "));
        assert!(line.contains("2025-08-16 12:00:00"));
        assert!(line.ends_with("(irreversible)"));
    }

    #[test]
    fn unknown_wins_over_applied() {
        assert!(format_status(&status(true, true, true)).starts_with("unknown "));
    }
}

//! Year-end "final installment" DARs.
//!
//! An event that received at least one payment during the year but still owes
//! part of its `valor_final` gets one more DAR for the remaining balance, due on
//! the next business day. Reruns are safe: an event that already has an open DAR
//! matching its balance is skipped.

use chrono::NaiveDate;
use cipt_common::{Error, Result, SchemaError};
use cipt_db::{SchemaEditor, quote_ident};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::{info, warn};

use crate::calendar::next_business_day;

pub const FINAL_STATUS: &str = "Emitido";
const BALANCE_EPSILON: f64 = 0.009;
const MATCH_TOLERANCE: f64 = 0.01;

const CANDIDATES_SQL: &str = "
    WITH pagos AS (
      SELECT e.id AS id_evento,
             e.nome_evento AS nome_evento,
             e.valor_final AS valor_final,
             SUM(CASE WHEN d.status = 'Pago' THEN 1 ELSE 0 END) AS qtd_pagas,
             ROUND(SUM(CASE WHEN d.status = 'Pago' THEN de.valor_parcela ELSE 0 END), 2)
               AS total_pago
      FROM Eventos e
      JOIN DARs_Eventos de ON de.id_evento = e.id
      JOIN dars d ON d.id = de.id_dar
      WHERE COALESCE(e.evento_gratuito, 0) = 0
        AND strftime('%Y', d.data_pagamento) = ?1
      GROUP BY e.id
    )
    SELECT id_evento, nome_evento, total_pago, ROUND(valor_final - total_pago, 2) AS saldo
    FROM pagos
    WHERE qtd_pagas >= 1
      AND ROUND(valor_final - total_pago, 2) > ?2
    ORDER BY saldo DESC, nome_evento";

#[derive(Debug, Clone, Copy)]
pub struct FinalInstallmentOptions {
    pub year: i32,
    pub dry_run: bool,
    /// Reference date for the due date; normally today in the configured timezone.
    pub today: NaiveDate,
}

/// One event that still owes money for the year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentPlan {
    pub event_id: i64,
    pub event_name: String,
    pub total_paid: f64,
    pub balance: f64,
    pub installment_number: i64,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEvent {
    pub event_id: i64,
    pub open_dar_id: i64,
    pub open_dar_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinalInstallmentReport {
    /// Ids of DARs inserted, in processing order.
    pub created: Vec<i64>,
    /// Installments that would be created (dry run) or were created.
    pub planned: Vec<InstallmentPlan>,
    pub skipped: Vec<SkippedEvent>,
}

struct Candidate {
    event_id: i64,
    event_name: String,
    total_paid: f64,
    balance: f64,
}

pub fn run(
    conn: &mut Connection,
    opts: &FinalInstallmentOptions,
) -> Result<FinalInstallmentReport> {
    info!(
        "generating final installments for events paid in {}{}",
        opts.year,
        if opts.dry_run { " (dry-run)" } else { "" }
    );

    let (dars_cols, link_cols) = {
        let editor = SchemaEditor::new(conn);
        for table in ["Eventos", "dars", "DARs_Eventos"] {
            if !editor.table_exists(table)? {
                return Err(SchemaError::TableNotFound(table.into()).into());
            }
        }
        (column_names(&editor, "dars")?, column_names(&editor, "DARs_Eventos")?)
    };

    let candidates = load_candidates(conn, opts.year)?;
    if candidates.is_empty() {
        info!("no events with an outstanding balance");
        return Ok(FinalInstallmentReport::default());
    }

    let due_date = next_business_day(opts.today, 1);
    let mut report = FinalInstallmentReport::default();

    for cand in candidates {
        let open = closest_open_dar(conn, cand.event_id, cand.balance)?
            .filter(|(_, value)| (value - cand.balance).abs() <= MATCH_TOLERANCE);
        if let Some((open_dar_id, open_dar_value)) = open {
            info!(
                "skip event #{} \"{}\": open DAR {open_dar_id} already covers the balance \
                 ({open_dar_value:.2})",
                cand.event_id, cand.event_name
            );
            report.skipped.push(SkippedEvent {
                event_id: cand.event_id,
                open_dar_id,
                open_dar_value,
            });
            continue;
        }

        let plan = InstallmentPlan {
            installment_number: next_installment_number(conn, cand.event_id)?,
            event_id: cand.event_id,
            event_name: cand.event_name,
            total_paid: cand.total_paid,
            balance: round2(cand.balance),
            due_date,
        };

        if opts.dry_run {
            info!(
                "[dry-run] event #{} \"{}\": balance R$ {:.2}, installment #{} due {}",
                plan.event_id, plan.event_name, plan.balance, plan.installment_number, plan.due_date
            );
            report.planned.push(plan);
            continue;
        }

        let dar_id = insert_installment(conn, &plan, &dars_cols, &link_cols).map_err(|e| {
            warn!("event #{} \"{}\" failed: {e}", plan.event_id, plan.event_name);
            e
        })?;
        info!(
            "event #{} \"{}\": created DAR {dar_id} (installment #{}, R$ {:.2}, due {})",
            plan.event_id, plan.event_name, plan.installment_number, plan.balance, plan.due_date
        );
        report.created.push(dar_id);
        report.planned.push(plan);
    }

    info!("done, {} DAR(s) created", report.created.len());
    Ok(report)
}

fn column_names(editor: &SchemaEditor<'_>, table: &str) -> Result<Vec<String>> {
    Ok(editor
        .describe_table(table)?
        .into_iter()
        .map(|c| c.name)
        .collect())
}

fn load_candidates(conn: &Connection, year: i32) -> Result<Vec<Candidate>> {
    let mut stmt = conn
        .prepare(CANDIDATES_SQL)
        .map_err(|e| Error::database("failed to prepare balance query", e))?;
    let rows = stmt
        .query_map(params![year.to_string(), BALANCE_EPSILON], |row| {
            Ok(Candidate {
                event_id: row.get(0)?,
                event_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                total_paid: row.get::<_, Option<f64>>(2)?.unwrap_or_default(),
                balance: row.get(3)?,
            })
        })
        .map_err(|e| Error::database("failed to query balances", e))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database("failed to read balance row", e))
}

/// The unpaid DAR of `event_id` whose value is closest to `balance`.
fn closest_open_dar(conn: &Connection, event_id: i64, balance: f64) -> Result<Option<(i64, f64)>> {
    conn.query_row(
        "SELECT d.id, d.valor
         FROM dars d
         JOIN DARs_Eventos de ON de.id_dar = d.id
         WHERE de.id_evento = ?1 AND d.status != 'Pago'
         ORDER BY ABS(ROUND(d.valor * 100) - ROUND(?2 * 100)) ASC
         LIMIT 1",
        params![event_id, balance],
        |row| Ok((row.get(0)?, row.get::<_, Option<f64>>(1)?.unwrap_or_default())),
    )
    .optional()
    .map_err(|e| Error::database("failed to look up open DARs", e))
}

fn next_installment_number(conn: &Connection, event_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(numero_parcela), 0) + 1 FROM DARs_Eventos WHERE id_evento = ?1",
        [event_id],
        |row| row.get(0),
    )
    .map_err(|e| Error::database("failed to compute installment number", e))
}

fn latest_revenue_code(conn: &Connection, event_id: i64) -> Result<Option<String>> {
    conn.query_row(
        "SELECT d.codigo_receita
         FROM dars d
         JOIN DARs_Eventos de ON de.id_dar = d.id
         WHERE de.id_evento = ?1
         ORDER BY d.id DESC
         LIMIT 1",
        [event_id],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map(Option::flatten)
    .map_err(|e| Error::database("failed to read latest DAR", e))
}

fn insert_row(conn: &Connection, table: &str, values: Vec<(&str, Value)>) -> Result<i64> {
    let columns: Vec<String> = values.iter().map(|(c, _)| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    );
    let params: Vec<Value> = values.into_iter().map(|(_, v)| v).collect();
    conn.execute(&sql, rusqlite::params_from_iter(params))
        .map_err(|e| Error::database(&format!("failed to insert into {table}"), e))?;
    Ok(conn.last_insert_rowid())
}

/// Insert the DAR and its event link in one transaction. Only columns present in
/// the live tables are written.
fn insert_installment(
    conn: &mut Connection,
    plan: &InstallmentPlan,
    dars_cols: &[String],
    link_cols: &[String],
) -> Result<i64> {
    let has = |cols: &[String], name: &str| cols.iter().any(|c| c == name);
    let due = plan.due_date.format("%Y-%m-%d").to_string();
    let revenue_code = if has(dars_cols, "codigo_receita") {
        latest_revenue_code(conn, plan.event_id)?
    } else {
        None
    };

    let tx = conn
        .transaction()
        .map_err(|e| Error::database("failed to begin transaction", e))?;

    let dar: Vec<(&str, Value)> = [
        ("valor", Value::Real(plan.balance)),
        ("data_vencimento", Value::Text(due.clone())),
        ("status", Value::Text(FINAL_STATUS.into())),
        (
            "descricao",
            Value::Text(format!("Parcela Final (Saldo) - Evento {}", plan.event_id)),
        ),
        ("codigo_receita", revenue_code.map_or(Value::Null, Value::Text)),
        ("permissionario_id", Value::Null),
        ("numero_documento", Value::Null),
        ("codigo_barras", Value::Null),
        ("linha_digitavel", Value::Null),
    ]
    .into_iter()
    .filter(|(c, _)| has(dars_cols, c))
    .collect();
    let dar_id = insert_row(&tx, "dars", dar)?;

    let link: Vec<(&str, Value)> = [
        ("id_evento", Value::Integer(plan.event_id)),
        ("id_dar", Value::Integer(dar_id)),
        ("numero_parcela", Value::Integer(plan.installment_number)),
        ("valor_parcela", Value::Real(plan.balance)),
        ("data_vencimento", Value::Text(due)),
    ]
    .into_iter()
    .filter(|(c, _)| has(link_cols, c))
    .collect();
    insert_row(&tx, "DARs_Eventos", link)?;

    // Dropping an uncommitted transaction rolls it back.
    tx.commit()
        .map_err(|e| Error::database("failed to commit installment", e))?;
    Ok(dar_id)
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(10.005_1), 10.01);
        assert_eq!(round2(99.994), 99.99);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn missing_tables_are_reported() {
        let mut conn = cipt_db::open_in_memory().unwrap();
        let opts = FinalInstallmentOptions {
            year: 2025,
            dry_run: true,
            today: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
        };
        let err = run(&mut conn, &opts).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::TableNotFound(t)) if t == "Eventos"));
    }

    #[test]
    fn insert_row_writes_given_columns() {
        let conn = cipt_db::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, a TEXT, b REAL)")
            .unwrap();
        let id = insert_row(
            &conn,
            "t",
            vec![("a", Value::Text("x".into())), ("b", Value::Real(1.5))],
        )
        .unwrap();
        let (a, b): (String, f64) = conn
            .query_row("SELECT a, b FROM t WHERE id = ?1", [id], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!((a.as_str(), b), ("x", 1.5));
    }
}

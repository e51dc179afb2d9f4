// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily sending statistics.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use rusqlite::params;
use shepherd_core::ShepherdError;
use shepherd_core::types::{DailyStats, StatAction, TemplateStats};

use crate::database::Database;

fn column(action: StatAction) -> &'static str {
    match action {
        StatAction::Sent => "sent",
        StatAction::Delivered => "delivered",
        StatAction::Read => "read",
        StatAction::Failed => "failed",
    }
}

/// Today's UTC date as stored in the stats tables.
pub fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Add one `action` and `cost` to the daily totals and the template bucket.
///
/// Runs on the caller's connection so it can join a larger transaction.
pub(crate) fn bump(
    conn: &rusqlite::Connection,
    date: &str,
    template_code: &str,
    action: StatAction,
    cost: i64,
) -> rusqlite::Result<()> {
    let col = column(action);
    conn.execute(
        &format!(
            "INSERT INTO daily_stats (date, {col}, cost) VALUES (?1, 1, ?2)
             ON CONFLICT(date) DO UPDATE SET {col} = {col} + 1, cost = cost + excluded.cost"
        ),
        params![date, cost],
    )?;
    conn.execute(
        &format!(
            "INSERT INTO template_stats (date, template_code, {col}, cost) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(date, template_code) DO UPDATE SET {col} = {col} + 1, cost = cost + excluded.cost"
        ),
        params![date, template_code, cost],
    )?;
    Ok(())
}

/// Every day on or after `since` that has counters, oldest first.
pub async fn sending_stats(
    db: &Database,
    since: NaiveDate,
) -> Result<Vec<DailyStats>, ShepherdError> {
    let since = since.format("%Y-%m-%d").to_string();
    db.connection()
        .call(move |conn| {
            let mut days: BTreeMap<String, DailyStats> = BTreeMap::new();

            let mut stmt = conn.prepare(
                "SELECT date, sent, delivered, read, failed, cost
                 FROM daily_stats WHERE date >= ?1 ORDER BY date",
            )?;
            let rows = stmt.query_map(params![since], |row| {
                Ok(DailyStats {
                    date: row.get(0)?,
                    total_sent: row.get(1)?,
                    total_delivered: row.get(2)?,
                    total_read: row.get(3)?,
                    total_failed: row.get(4)?,
                    total_cost: row.get(5)?,
                    templates: BTreeMap::new(),
                })
            })?;
            for day in rows {
                let day = day?;
                days.insert(day.date.clone(), day);
            }

            let mut stmt = conn.prepare(
                "SELECT date, template_code, sent, delivered, read, failed, cost
                 FROM template_stats WHERE date >= ?1",
            )?;
            let rows = stmt.query_map(params![since], |row| {
                let date: String = row.get(0)?;
                let code: String = row.get(1)?;
                let stats = TemplateStats {
                    sent: row.get(2)?,
                    delivered: row.get(3)?,
                    read: row.get(4)?,
                    failed: row.get(5)?,
                    cost: row.get(6)?,
                };
                Ok((date, code, stats))
            })?;
            for row in rows {
                let (date, code, stats) = row?;
                if let Some(day) = days.get_mut(&date) {
                    day.templates.insert(code, stats);
                }
            }

            Ok(days.into_values().collect())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

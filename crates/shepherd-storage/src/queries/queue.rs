// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message queue.
//!
//! Every function is one closure on the connection thread, so a
//! read-decide-write sequence inside it cannot interleave with another call.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use shepherd_core::ShepherdError;
use shepherd_core::types::{NewQueueItem, QueueItem, QueueStatus, SentReceipt, StatAction};
use tracing::{debug, warn};

use crate::database::{
    Database, enum_col, format_ts, json_col, map_tr_err, now_ts, opt_ts_col, to_json, ts_col,
};
use crate::queries::stats;

const COLUMNS: &str = "id, message_type, template_code, recipient_phone, content,
    template_variables, buttons, scheduled_time, priority, retry_count, max_retries, status,
    sermon_id, member_id, record_id, created_at, sent_at, delivered_at, error_message, cost,
    provider_message_id";

const PRIORITY_RANK: &str = "CASE priority WHEN 'HIGH' THEN 0 WHEN 'NORMAL' THEN 1 ELSE 2 END";

const TERMINAL: &str = "('SENT', 'DELIVERED', 'READ', 'FAILED', 'CANCELLED')";

/// Error stored on an item whose claim lease ran out before an outcome was recorded.
pub const INTERRUPTED: &str = "delivery interrupted before an outcome was recorded";

/// `msg-{epoch millis}-{9 random characters}`.
pub fn new_queue_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("msg-{}-{}", Utc::now().timestamp_millis(), &random[..9])
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueItem> {
    let provider_message_id: Option<i64> = row.get(20)?;
    Ok(QueueItem {
        id: row.get(0)?,
        message_type: enum_col(row, 1)?,
        template_code: row.get(2)?,
        recipient_phone: row.get(3)?,
        content: row.get(4)?,
        template_variables: json_col(row, 5)?,
        buttons: json_col(row, 6)?,
        scheduled_time: ts_col(row, 7)?,
        priority: enum_col(row, 8)?,
        retry_count: row.get(9)?,
        max_retries: row.get(10)?,
        status: enum_col(row, 11)?,
        sermon_id: row.get(12)?,
        member_id: row.get(13)?,
        record_id: row.get(14)?,
        created_at: ts_col(row, 15)?,
        sent_at: opt_ts_col(row, 16)?,
        delivered_at: opt_ts_col(row, 17)?,
        error_message: row.get(18)?,
        cost: row.get(19)?,
        provider_message_id: provider_message_id.map(|mid| mid as u64),
    })
}

/// Insert a fresh `PENDING` row and return the stored item.
pub(crate) fn insert_item(
    conn: &rusqlite::Connection,
    item: NewQueueItem,
) -> rusqlite::Result<QueueItem> {
    let id = new_queue_id();
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO queue_items (id, message_type, template_code, recipient_phone, content,
             template_variables, buttons, scheduled_time, priority, retry_count, max_retries,
             status, sermon_id, member_id, record_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, 'PENDING', ?11, ?12, ?13, ?14)",
        params![
            id,
            item.message_type.to_string(),
            item.template_code,
            item.recipient_phone,
            item.content,
            to_json(&item.template_variables)?,
            to_json(&item.buttons)?,
            format_ts(&item.scheduled_time),
            item.priority.to_string(),
            item.max_retries,
            item.sermon_id,
            item.member_id,
            item.record_id,
            format_ts(&created_at),
        ],
    )?;

    Ok(QueueItem {
        id,
        message_type: item.message_type,
        template_code: item.template_code,
        recipient_phone: item.recipient_phone,
        content: item.content,
        template_variables: item.template_variables,
        buttons: item.buttons,
        scheduled_time: item.scheduled_time,
        priority: item.priority,
        retry_count: 0,
        max_retries: item.max_retries,
        status: QueueStatus::Pending,
        sermon_id: item.sermon_id,
        member_id: item.member_id,
        record_id: item.record_id,
        created_at,
        sent_at: None,
        delivered_at: None,
        error_message: None,
        cost: None,
        provider_message_id: None,
    })
}

/// Set the queue status and mirror it onto the linked message record.
fn set_status(
    conn: &rusqlite::Connection,
    id: &str,
    status: QueueStatus,
    error: Option<&str>,
) -> rusqlite::Result<bool> {
    transition(conn, id, None, status, error)
}

/// [`set_status`] restricted to items currently in `from`.
fn transition(
    conn: &rusqlite::Connection,
    id: &str,
    from: Option<QueueStatus>,
    status: QueueStatus,
    error: Option<&str>,
) -> rusqlite::Result<bool> {
    let now = now_ts();
    let changed = conn.execute(
        "UPDATE queue_items SET
             status = ?2,
             sent_at = CASE WHEN ?2 = 'SENT' THEN ?3 ELSE sent_at END,
             delivered_at = CASE
                 WHEN ?2 = 'DELIVERED' THEN ?3
                 WHEN ?2 = 'READ' THEN COALESCE(delivered_at, ?3)
                 ELSE delivered_at END,
             error_message = COALESCE(?4, error_message),
             locked_until = NULL
         WHERE id = ?1 AND (?5 IS NULL OR status = ?5)",
        params![id, status.to_string(), now, error, from.map(|s| s.to_string())],
    )?;
    if changed == 0 {
        return Ok(false);
    }
    mirror_record(conn, id, status)?;
    Ok(true)
}

/// Spend one retry on an item and move it to `PENDING`, or to `FAILED` with
/// the failed stat once the budget is gone.
fn consume_retry(
    conn: &rusqlite::Connection,
    id: &str,
    retry_count: u32,
    max_retries: u32,
    stats_code: &str,
    error: &str,
) -> rusqlite::Result<(QueueStatus, u32)> {
    let next = (retry_count + 1).min(max_retries);
    let status = if next >= max_retries {
        QueueStatus::Failed
    } else {
        QueueStatus::Pending
    };
    conn.execute(
        "UPDATE queue_items SET retry_count = ?2, status = ?3, error_message = ?4,
             locked_until = NULL
         WHERE id = ?1",
        params![id, next, status.to_string(), error],
    )?;
    if status == QueueStatus::Failed {
        mirror_record(conn, id, status)?;
        stats::bump(conn, &stats::today(), stats_code, StatAction::Failed, 0)?;
    }
    Ok((status, next))
}

fn mirror_record(
    conn: &rusqlite::Connection,
    id: &str,
    status: QueueStatus,
) -> rusqlite::Result<()> {
    if let Some(record_status) = status.record_status() {
        conn.execute(
            "UPDATE scheduled_messages SET status = ?1
             WHERE id = (SELECT record_id FROM queue_items WHERE id = ?2)",
            params![record_status.to_string(), id],
        )?;
    }
    Ok(())
}

/// Statistics bucket for an item: its template code, or its message type
/// when it has none.
fn stats_key(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT COALESCE(template_code, message_type) FROM queue_items WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
    .optional()
}

fn not_found(id: &str) -> ShepherdError {
    ShepherdError::NotFound {
        entity: "queue item",
        id: id.to_string(),
    }
}

/// Enqueue a new item.
pub async fn enqueue(db: &Database, item: NewQueueItem) -> Result<QueueItem, ShepherdError> {
    let item = db
        .connection()
        .call(move |conn| insert_item(conn, item))
        .await
        .map_err(map_tr_err)?;
    debug!(id = %item.id, recipient = %item.recipient_phone, "queue item enqueued");
    Ok(item)
}

/// Fetch a single item by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<QueueItem>, ShepherdError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM queue_items WHERE id = ?1"),
                params![id],
                row_to_item,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// List items newest first.
pub async fn list(
    db: &Database,
    status: Option<QueueStatus>,
    limit: usize,
) -> Result<Vec<QueueItem>, ShepherdError> {
    let status = status.map(|s| s.to_string());
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM queue_items
                 WHERE ?1 IS NULL OR status = ?1
                 ORDER BY seq DESC LIMIT ?2"
            ))?;
            let items = stmt
                .query_map(params![status, limit], row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
        .map_err(map_tr_err)
}

/// Due items, highest priority first, then insertion order.
pub async fn get_pending_at(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<Vec<QueueItem>, ShepherdError> {
    let now = format_ts(&now);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM queue_items
                 WHERE status = 'PENDING' AND scheduled_time <= ?1 AND retry_count < max_retries
                 ORDER BY {PRIORITY_RANK}, seq"
            ))?;
            let items = stmt
                .query_map(params![now], row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrite the status.
pub async fn update_status(
    db: &Database,
    id: &str,
    status: QueueStatus,
    error: Option<&str>,
) -> Result<(), ShepherdError> {
    let key = id.to_string();
    let error = error.map(str::to_string);
    let found = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let found = set_status(&tx, &key, status, error.as_deref())?;
            tx.commit()?;
            Ok(found)
        })
        .await
        .map_err(map_tr_err)?;
    if found { Ok(()) } else { Err(not_found(id)) }
}

/// Consume one retry, capped at `max_retries`.
pub async fn increment_retry(db: &Database, id: &str) -> Result<(), ShepherdError> {
    let key = id.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue_items SET retry_count = MIN(retry_count + 1, max_retries)
                 WHERE id = ?1",
                params![key],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 { Err(not_found(id)) } else { Ok(()) }
}

/// Consume a retry and decide between `PENDING` and `FAILED` in one step.
pub async fn record_failure(
    db: &Database,
    id: &str,
    error: &str,
) -> Result<QueueStatus, ShepherdError> {
    let key = id.to_string();
    let error = error.to_string();
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let row: Option<(u32, u32, String)> = tx
                .query_row(
                    "SELECT retry_count, max_retries, COALESCE(template_code, message_type)
                     FROM queue_items WHERE id = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let Some((retry_count, max_retries, stats_code)) = row else {
                return Ok(None);
            };
            let outcome =
                consume_retry(&tx, &key, retry_count, max_retries, &stats_code, &error)?;
            tx.commit()?;
            Ok(Some(outcome))
        })
        .await
        .map_err(map_tr_err)?;

    let (status, retry_count) = outcome.ok_or_else(|| not_found(id))?;
    debug!(id, %status, retry_count, "delivery failure recorded");
    Ok(status)
}

/// `FAILED` without consuming a retry.
pub async fn fail_permanently(db: &Database, id: &str, error: &str) -> Result<(), ShepherdError> {
    let key = id.to_string();
    let error = error.to_string();
    let found = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(stats_code) = stats_key(&tx, &key)? else {
                return Ok(false);
            };
            set_status(&tx, &key, QueueStatus::Failed, Some(&error))?;
            stats::bump(&tx, &stats::today(), &stats_code, StatAction::Failed, 0)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;
    if found { Ok(()) } else { Err(not_found(id)) }
}

/// `SENT` plus cost, provider id, record mirror, and the sent stat.
pub async fn record_sent(
    db: &Database,
    id: &str,
    receipt: &SentReceipt,
) -> Result<(), ShepherdError> {
    let key = id.to_string();
    let cost = receipt.cost;
    let mid = receipt.provider_message_id.map(|m| m as i64);
    let found = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(stats_code) = stats_key(&tx, &key)? else {
                return Ok(false);
            };
            set_status(&tx, &key, QueueStatus::Sent, None)?;
            tx.execute(
                "UPDATE queue_items SET cost = ?2, provider_message_id = ?3 WHERE id = ?1",
                params![key, cost, mid],
            )?;
            stats::bump(&tx, &stats::today(), &stats_code, StatAction::Sent, cost)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;
    if found { Ok(()) } else { Err(not_found(id)) }
}

/// Apply a provider delivery report to a `SENT` item.
///
/// Returns false, leaving status and statistics untouched, when the item has
/// already moved past `SENT`.
pub async fn record_report(
    db: &Database,
    id: &str,
    status: QueueStatus,
    error: Option<&str>,
) -> Result<bool, ShepherdError> {
    let action = match status {
        QueueStatus::Delivered => StatAction::Delivered,
        QueueStatus::Read => StatAction::Read,
        QueueStatus::Failed => StatAction::Failed,
        other => {
            return Err(ShepherdError::Internal(format!(
                "{other} is not a delivery report status"
            )));
        }
    };
    let key = id.to_string();
    let error = error.map(str::to_string);
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(stats_code) = stats_key(&tx, &key)? else {
                return Ok(None);
            };
            let applied = transition(
                &tx,
                &key,
                Some(QueueStatus::Sent),
                status,
                error.as_deref(),
            )?;
            if applied {
                stats::bump(&tx, &stats::today(), &stats_code, action, 0)?;
            }
            tx.commit()?;
            Ok(Some(applied))
        })
        .await
        .map_err(map_tr_err)?;
    let applied = outcome.ok_or_else(|| not_found(id))?;
    if !applied {
        debug!(id, %status, "stale delivery report ignored");
    }
    Ok(applied)
}

/// Reserve still-`PENDING` items for one sweep until `lease_until`.
///
/// Returns the claimed items in the order of `ids`. Items another sweep has
/// claimed, or that left `PENDING` since they were read, are left out.
pub async fn claim(
    db: &Database,
    ids: &[String],
    lease_until: DateTime<Utc>,
) -> Result<Vec<QueueItem>, ShepherdError> {
    let ids = ids.to_vec();
    let lease = format_ts(&lease_until);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut claimed = Vec::with_capacity(ids.len());
            for id in &ids {
                let changed = tx.execute(
                    "UPDATE queue_items SET status = 'PROCESSING', locked_until = ?2
                     WHERE id = ?1 AND status = 'PENDING' AND retry_count < max_retries",
                    params![id, lease],
                )?;
                if changed == 0 {
                    continue;
                }
                claimed.push(tx.query_row(
                    &format!("SELECT {COLUMNS} FROM queue_items WHERE id = ?1"),
                    params![id],
                    row_to_item,
                )?);
            }
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

/// Return `PROCESSING` items whose lease expired at `now` to the queue.
///
/// The interrupted attempt counts against the retry budget, so an item that
/// keeps getting interrupted eventually ends `FAILED`.
pub async fn recover_stale(db: &Database, now: DateTime<Utc>) -> Result<usize, ShepherdError> {
    let now = format_ts(&now);
    let recovered = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let stale: Vec<(String, u32, u32, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, retry_count, max_retries, COALESCE(template_code, message_type)
                     FROM queue_items
                     WHERE status = 'PROCESSING' AND (locked_until IS NULL OR locked_until <= ?1)",
                )?;
                stmt.query_map(params![now], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?
            };
            for (id, retry_count, max_retries, stats_code) in &stale {
                consume_retry(&tx, id, *retry_count, *max_retries, stats_code, INTERRUPTED)?;
            }
            tx.commit()?;
            Ok(stale.len())
        })
        .await
        .map_err(map_tr_err)?;
    if recovered > 0 {
        warn!(recovered, "interrupted deliveries returned to the queue");
    }
    Ok(recovered)
}

/// `PENDING -> CANCELLED`; false when the item is in any other state.
pub async fn cancel(db: &Database, id: &str) -> Result<bool, ShepherdError> {
    let key = id.to_string();
    let outcome = db
        .connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE queue_items SET status = 'CANCELLED' WHERE id = ?1 AND status = 'PENDING'",
                params![key],
            )?;
            if changed > 0 {
                return Ok(Some(true));
            }
            let exists = conn
                .query_row(
                    "SELECT 1 FROM queue_items WHERE id = ?1",
                    params![key],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(exists.map(|_| false))
        })
        .await
        .map_err(map_tr_err)?;
    outcome.ok_or_else(|| not_found(id))
}

/// `SENT` items with a provider message id, oldest first.
pub async fn awaiting_report(db: &Database, limit: usize) -> Result<Vec<QueueItem>, ShepherdError> {
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM queue_items
                 WHERE status = 'SENT' AND provider_message_id IS NOT NULL
                 ORDER BY seq LIMIT ?1"
            ))?;
            let items = stmt
                .query_map(params![limit], row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
        .map_err(map_tr_err)
}

/// Move terminal items created before `older_than` into `queue_archive`.
pub async fn archive_terminal(
    db: &Database,
    older_than: DateTime<Utc>,
) -> Result<usize, ShepherdError> {
    let cutoff = format_ts(&older_than);
    let archived = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let items = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {COLUMNS} FROM queue_items
                     WHERE status IN {TERMINAL} AND created_at < ?1"
                ))?;
                stmt.query_map(params![cutoff], row_to_item)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            for item in &items {
                tx.execute(
                    "INSERT OR REPLACE INTO queue_archive (id, status, payload) VALUES (?1, ?2, ?3)",
                    params![item.id, item.status.to_string(), to_json(item)?],
                )?;
                tx.execute("DELETE FROM queue_items WHERE id = ?1", params![item.id])?;
            }
            tx.commit()?;
            Ok(items.len())
        })
        .await
        .map_err(map_tr_err)?;
    debug!(archived, "terminal queue items archived");
    Ok(archived)
}

/// Delete archive rows archived before `older_than`.
pub async fn prune_archive(
    db: &Database,
    older_than: DateTime<Utc>,
) -> Result<usize, ShepherdError> {
    let cutoff = format_ts(&older_than);
    let pruned = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM queue_archive WHERE archived_at < ?1",
                params![cutoff],
            )
        })
        .await
        .map_err(map_tr_err)?;
    debug!(pruned, "expired archive rows deleted");
    Ok(pruned)
}

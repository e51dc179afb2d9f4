// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generated weekly message records and their atomic hand-off to the queue.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::{OptionalExtension, params};
use shepherd_core::ShepherdError;
use shepherd_core::types::{MessageRecord, NewQueueItem, QueueItem};
use tracing::debug;

use crate::database::{Database, enum_col, format_ts, json_col, map_tr_err, to_json, ts_col};
use crate::queries::queue::insert_item;

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        template_id: row.get(1)?,
        sermon_id: row.get(2)?,
        recipient_phone: row.get(3)?,
        member_id: row.get(4)?,
        content: row.get(5)?,
        buttons: json_col(row, 6)?,
        variables: json_col(row, 7)?,
        scheduled_time: ts_col(row, 8)?,
        status: enum_col(row, 9)?,
        created_at: ts_col(row, 10)?,
    })
}

/// Persist records and their queue items in one transaction.
///
/// A record whose id already exists is skipped together with its item, so
/// scheduling the same sermon twice enqueues nothing the second time. The
/// same holds for sermons whose records retention has already pruned.
pub async fn save_scheduled(
    db: &Database,
    records: Vec<MessageRecord>,
    items: Vec<NewQueueItem>,
) -> Result<Vec<QueueItem>, ShepherdError> {
    if records.len() != items.len() {
        return Err(ShepherdError::Internal(format!(
            "{} records but {} queue items",
            records.len(),
            items.len()
        )));
    }

    let total = records.len();
    let queued = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut queued = Vec::new();
            for (record, mut item) in records.into_iter().zip(items) {
                let retired = tx
                    .query_row(
                        "SELECT 1 FROM retired_sermons WHERE sermon_id = ?1",
                        params![record.sermon_id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if retired {
                    continue;
                }
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO scheduled_messages (id, template_id, sermon_id,
                         recipient_phone, member_id, content, buttons, variables,
                         scheduled_time, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        record.id,
                        record.template_id,
                        record.sermon_id,
                        record.recipient_phone,
                        record.member_id,
                        record.content,
                        to_json(&record.buttons)?,
                        to_json(&record.variables)?,
                        format_ts(&record.scheduled_time),
                        record.status.to_string(),
                        format_ts(&record.created_at),
                    ],
                )?;
                if inserted == 0 {
                    continue;
                }
                item.record_id = Some(record.id);
                queued.push(insert_item(&tx, item)?);
            }
            tx.commit()?;
            Ok(queued)
        })
        .await
        .map_err(map_tr_err)?;

    debug!(total, queued = queued.len(), "scheduled messages saved");
    Ok(queued)
}

/// Pending records whose scheduled instant falls on `date` (UTC).
pub async fn scheduled_for_date(
    db: &Database,
    date: NaiveDate,
) -> Result<Vec<MessageRecord>, ShepherdError> {
    let start = format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"));
    let end = date
        .checked_add_days(Days::new(1))
        .map(|next| format!("{}T00:00:00.000Z", next.format("%Y-%m-%d")))
        .ok_or_else(|| ShepherdError::Internal(format!("date out of range: {date}")))?;

    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, template_id, sermon_id, recipient_phone, member_id, content,
                        buttons, variables, scheduled_time, status, created_at
                 FROM scheduled_messages
                 WHERE status = 'pending' AND scheduled_time >= ?1 AND scheduled_time < ?2
                 ORDER BY scheduled_time, id",
            )?;
            let records = stmt
                .query_map(params![start, end], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete records created before `older_than` that no live queue item
/// references, and remember their sermons as retired.
pub async fn prune_records(
    db: &Database,
    older_than: DateTime<Utc>,
) -> Result<usize, ShepherdError> {
    let cutoff = format_ts(&older_than);
    let pruned = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO retired_sermons (sermon_id)
                 SELECT DISTINCT r.sermon_id FROM scheduled_messages r
                 WHERE r.created_at < ?1
                   AND NOT EXISTS (SELECT 1 FROM queue_items q WHERE q.record_id = r.id)",
                params![cutoff],
            )?;
            let pruned = tx.execute(
                "DELETE FROM scheduled_messages
                 WHERE created_at < ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM queue_items q WHERE q.record_id = scheduled_messages.id)",
                params![cutoff],
            )?;
            tx.commit()?;
            Ok(pruned)
        })
        .await
        .map_err(map_tr_err)?;
    debug!(pruned, "expired message records pruned");
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone};
    use shepherd_core::types::{QueueStatus, RecordStatus};

    use crate::queries::queue;

    fn record(phone: &str, day: u32) -> (MessageRecord, NewQueueItem) {
        let at = Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap();
        let record = MessageRecord {
            id: MessageRecord::record_id("s1", "wednesday_meditation", phone),
            template_id: "wednesday_meditation".into(),
            sermon_id: "s1".into(),
            recipient_phone: phone.into(),
            member_id: None,
            content: "묵상".into(),
            buttons: vec![],
            variables: BTreeMap::new(),
            scheduled_time: at,
            status: RecordStatus::Pending,
            created_at: Utc::now(),
        };
        let item = NewQueueItem::alimtalk("MEDITATION_002", phone, "묵상", at);
        (record, item)
    }

    #[tokio::test]
    async fn saving_twice_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let (r1, i1) = record("010-1", 8);
        let (r2, i2) = record("010-2", 8);

        let first = save_scheduled(
            &db,
            vec![r1.clone(), r2.clone()],
            vec![i1.clone(), i2.clone()],
        )
        .await
        .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].record_id.as_deref(), Some(r1.id.as_str()));

        let second = save_scheduled(&db, vec![r1, r2], vec![i1, i2]).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(queue::list(&db, None, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mismatched_lengths_are_rejected() {
        let db = Database::open_in_memory().await.unwrap();
        let (r1, _) = record("010-1", 8);
        assert!(save_scheduled(&db, vec![r1], vec![]).await.is_err());
    }

    #[tokio::test]
    async fn queue_status_mirrors_onto_record() {
        let db = Database::open_in_memory().await.unwrap();
        let (r1, i1) = record("010-1", 8);
        let queued = save_scheduled(&db, vec![r1], vec![i1]).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        assert_eq!(scheduled_for_date(&db, date).await.unwrap().len(), 1);

        queue::update_status(&db, &queued[0].id, QueueStatus::Sent, None)
            .await
            .unwrap();
        assert!(scheduled_for_date(&db, date).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_for_date_filters_by_day() {
        let db = Database::open_in_memory().await.unwrap();
        let (r1, i1) = record("010-1", 8);
        let (mut r2, i2) = record("010-2", 10);
        r2.id = MessageRecord::record_id("s1", "friday_practice", "010-2");
        save_scheduled(&db, vec![r1, r2], vec![i1, i2]).await.unwrap();

        let wed = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        let records = scheduled_for_date(&db, wed).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].recipient_phone, "010-1");

        let thu = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        assert!(scheduled_for_date(&db, thu).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prune_keeps_records_with_live_items() {
        let db = Database::open_in_memory().await.unwrap();
        let (r1, i1) = record("010-1", 8);
        let (r2, i2) = record("010-2", 8);
        let queued = save_scheduled(&db, vec![r1, r2], vec![i1, i2]).await.unwrap();
        let later = Utc::now() + Duration::seconds(1);

        assert_eq!(prune_records(&db, later).await.unwrap(), 0);

        queue::update_status(&db, &queued[0].id, QueueStatus::Sent, None)
            .await
            .unwrap();
        queue::archive_terminal(&db, later).await.unwrap();
        assert_eq!(prune_records(&db, later).await.unwrap(), 1);

        let date = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        let left = scheduled_for_date(&db, date).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].recipient_phone, "010-2");
    }

    #[tokio::test]
    async fn pruned_sermon_is_not_scheduled_again() {
        let db = Database::open_in_memory().await.unwrap();
        let (r1, i1) = record("010-1", 8);
        let queued = save_scheduled(&db, vec![r1.clone()], vec![i1.clone()])
            .await
            .unwrap();
        queue::update_status(&db, &queued[0].id, QueueStatus::Sent, None)
            .await
            .unwrap();
        let later = Utc::now() + Duration::seconds(1);
        queue::archive_terminal(&db, later).await.unwrap();
        assert_eq!(prune_records(&db, later).await.unwrap(), 1);

        let again = save_scheduled(&db, vec![r1], vec![i1]).await.unwrap();
        assert!(again.is_empty());
        assert!(queue::list(&db, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_records_are_kept() {
        let db = Database::open_in_memory().await.unwrap();
        let (r1, i1) = record("010-1", 8);
        let queued = save_scheduled(&db, vec![r1], vec![i1]).await.unwrap();
        queue::cancel(&db, &queued[0].id).await.unwrap();
        queue::archive_terminal(&db, Utc::now() + Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(
            prune_records(&db, Utc::now() - Duration::days(90)).await.unwrap(),
            0
        );
    }
}

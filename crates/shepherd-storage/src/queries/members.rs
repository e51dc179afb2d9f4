// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Member directory backing store.

use rusqlite::params;
use shepherd_core::ShepherdError;
use shepherd_core::types::{Member, MessageCategory, MessagePreferences, Recipient};

use crate::database::{Database, map_tr_err};

fn preference_column(category: MessageCategory) -> &'static str {
    match category {
        MessageCategory::SermonSummary => "receive_sermon_summary",
        MessageCategory::Meditation => "receive_meditation",
        MessageCategory::PracticeCheck => "receive_practice_check",
        MessageCategory::Announcements => "receive_announcements",
    }
}

/// Insert or update members by id in one transaction. Returns the count written.
pub async fn upsert_members(db: &Database, members: Vec<Member>) -> Result<usize, ShepherdError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for m in &members {
                let prefs = m.message_settings;
                tx.execute(
                    "INSERT INTO members (id, name, phone, is_active, receive_sermon_summary,
                         receive_meditation, receive_practice_check, receive_announcements)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                         name = excluded.name,
                         phone = excluded.phone,
                         is_active = excluded.is_active,
                         receive_sermon_summary = excluded.receive_sermon_summary,
                         receive_meditation = excluded.receive_meditation,
                         receive_practice_check = excluded.receive_practice_check,
                         receive_announcements = excluded.receive_announcements,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![
                        m.id,
                        m.name,
                        m.phone,
                        m.is_active,
                        prefs.receive_sermon_summary,
                        prefs.receive_meditation,
                        prefs.receive_practice_check,
                        prefs.receive_announcements,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(members.len())
        })
        .await
        .map_err(map_tr_err)
}

/// Every member in insertion order.
pub async fn list_members(db: &Database) -> Result<Vec<Member>, ShepherdError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, phone, is_active, receive_sermon_summary, receive_meditation,
                        receive_practice_check, receive_announcements
                 FROM members ORDER BY rowid",
            )?;
            let members = stmt
                .query_map([], |row| {
                    Ok(Member {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        is_active: row.get(3)?,
                        message_settings: MessagePreferences {
                            receive_sermon_summary: row.get(4)?,
                            receive_meditation: row.get(5)?,
                            receive_practice_check: row.get(6)?,
                            receive_announcements: row.get(7)?,
                        },
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(members)
        })
        .await
        .map_err(map_tr_err)
}

/// Active members opted in to `category`, in insertion order.
pub async fn message_recipients(
    db: &Database,
    category: MessageCategory,
) -> Result<Vec<Recipient>, ShepherdError> {
    let column = preference_column(category);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, phone FROM members
                 WHERE is_active = 1 AND {column} = 1
                 ORDER BY rowid"
            ))?;
            let recipients = stmt
                .query_map([], |row| {
                    Ok(Recipient {
                        member_id: Some(row.get(0)?),
                        phone: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(recipients)
        })
        .await
        .map_err(map_tr_err)
}

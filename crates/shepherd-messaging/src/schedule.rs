// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisting generated messages and queueing them for delivery.

use serde::Serialize;
use shepherd_core::types::{MessageRecord, MessageType, NewQueueItem, Priority, ProcessedSermon};
use shepherd_core::{ScheduleStore, ShepherdError};
use shepherd_templates::TemplateCatalog;
use tracing::{info, warn};

use crate::generator::MessageGenerator;

/// Outcome of scheduling one sermon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    /// Records produced by the generator.
    pub generated: usize,
    /// Queue items written. Lower than `generated` when the sermon was
    /// scheduled before.
    pub queued: usize,
}

/// The queue item that delivers `record`, or `None` when the record's
/// template has no provider code.
pub fn queue_item_for(
    record: &MessageRecord,
    catalog: &TemplateCatalog,
    max_retries: u32,
) -> Option<NewQueueItem> {
    let template = catalog.get(&record.template_id)?;
    Some(NewQueueItem {
        message_type: MessageType::Alimtalk,
        template_code: Some(template.code.clone()),
        recipient_phone: record.recipient_phone.clone(),
        content: record.content.clone(),
        template_variables: record.variables.clone(),
        buttons: record.buttons.clone(),
        scheduled_time: record.scheduled_time,
        priority: Priority::Normal,
        max_retries,
        sermon_id: Some(record.sermon_id.clone()),
        member_id: record.member_id.clone(),
        record_id: Some(record.id.clone()),
    })
}

/// Generate the week's messages for `sermon`, then store the records and
/// their queue items in one transaction.
///
/// Scheduling the same sermon twice queues nothing new.
pub async fn schedule_sermon(
    generator: &MessageGenerator,
    store: &dyn ScheduleStore,
    sermon: &ProcessedSermon,
    max_retries: u32,
) -> Result<ScheduleSummary, ShepherdError> {
    let records = generator.generate(sermon).await?;
    let generated = records.len();

    let mut kept = Vec::with_capacity(generated);
    let mut items = Vec::with_capacity(generated);
    for record in records {
        match queue_item_for(&record, generator.catalog(), max_retries) {
            Some(item) => {
                items.push(item);
                kept.push(record);
            }
            None => warn!(
                record_id = %record.id,
                template = %record.template_id,
                "no template code for record, not scheduling"
            ),
        }
    }

    let queued = store.save_scheduled(kept, items).await?.len();
    info!(sermon_id = %sermon.id, generated, queued, "sermon scheduled");
    Ok(ScheduleSummary { generated, queued })
}

// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weekly message generation.
//!
//! One processed sermon becomes one message per template per opted-in
//! member, each scheduled on the next matching weekday after the sermon.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use shepherd_config::ChurchConfig;
use shepherd_core::types::{MessageCategory, MessageRecord, ProcessedSermon, RecordStatus};
use shepherd_core::{MemberDirectory, ShepherdError};
use shepherd_templates::{ScheduleSpec, Template, TemplateCatalog};
use tracing::{debug, info, warn};

/// Used when the meditation text has no question lines.
pub const MEDITATION_FALLBACK: &str = "오늘 받은 은혜를 돌아보며 하나님께 감사드리세요.";

const MAX_MEDITATION_QUESTIONS: usize = 2;
const MAX_PRACTICAL_TASKS: usize = 3;

/// Church-wide values merged into every template.
#[derive(Debug, Clone)]
pub struct ChurchProfile {
    pub name: String,
    pub pastor_phone: String,
    pub domain: String,
    /// Local time zone the weekly schedule slots are expressed in.
    pub offset: FixedOffset,
}

impl ChurchProfile {
    pub fn from_config(config: &ChurchConfig) -> Result<Self, ShepherdError> {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            ShepherdError::Config(format!(
                "church.utc_offset_hours out of range: {}",
                config.utc_offset_hours
            ))
        })?;
        Ok(Self {
            name: config.name.clone(),
            pastor_phone: config.pastor_phone.clone(),
            domain: config.domain.clone(),
            offset,
        })
    }
}

/// Local send date for a template slot: the next `slot.weekday` strictly
/// after the sermon date.
pub fn send_date(sermon_date: NaiveDate, slot: ScheduleSpec) -> NaiveDate {
    let sermon_weekday = i64::from(sermon_date.weekday().num_days_from_sunday());
    let mut delta = i64::from(slot.weekday) - sermon_weekday;
    if delta <= 0 {
        delta += 7;
    }
    sermon_date + Duration::days(delta)
}

/// UTC instant of a template slot in the week following the sermon.
pub fn send_instant(
    sermon_date: NaiveDate,
    slot: ScheduleSpec,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, ShepherdError> {
    let local = send_date(sermon_date, slot)
        .and_hms_opt(u32::from(slot.hour), u32::from(slot.minute), 0)
        .ok_or_else(|| {
            ShepherdError::Config(format!(
                "invalid schedule time {:02}:{:02}",
                slot.hour, slot.minute
            ))
        })?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ShepherdError::Internal(format!("ambiguous local time {local}")))
}

/// Up to two meditation lines that ask something, numbered from 1.
pub fn meditation_questions(meditation: &str) -> String {
    let questions: Vec<String> = meditation
        .lines()
        .filter(|line| line.contains('?') || line.contains("묵상"))
        .take(MAX_MEDITATION_QUESTIONS)
        .enumerate()
        .map(|(i, line)| format!("{}. {}", i + 1, line.trim()))
        .collect();

    if questions.is_empty() {
        MEDITATION_FALLBACK.to_string()
    } else {
        questions.join("\n")
    }
}

/// The first three practical tasks, numbered from 1.
pub fn practical_task_list(tasks: &[String]) -> String {
    tasks
        .iter()
        .take(MAX_PRACTICAL_TASKS)
        .enumerate()
        .map(|(i, task)| format!("{}. {task}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Produces the weekly message records for a sermon.
pub struct MessageGenerator {
    catalog: Arc<TemplateCatalog>,
    directory: Arc<dyn MemberDirectory>,
    church: ChurchProfile,
}

impl MessageGenerator {
    pub fn new(
        catalog: Arc<TemplateCatalog>,
        directory: Arc<dyn MemberDirectory>,
        church: ChurchProfile,
    ) -> Self {
        Self {
            catalog,
            directory,
            church,
        }
    }

    pub fn catalog(&self) -> &Arc<TemplateCatalog> {
        &self.catalog
    }

    /// Variables shared by every template of this sermon.
    pub fn base_variables(&self, sermon: &ProcessedSermon) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("church_name".to_string(), self.church.name.clone()),
            ("pastor_phone".to_string(), self.church.pastor_phone.clone()),
            ("domain".to_string(), self.church.domain.clone()),
            ("sermon_id".to_string(), sermon.id.clone()),
            ("sermon_title".to_string(), sermon.title.clone()),
            ("scripture".to_string(), sermon.scripture.clone()),
            ("summary".to_string(), sermon.summary.clone()),
        ])
    }

    /// Base variables plus the template-specific extras.
    pub fn template_variables(
        &self,
        template: &Template,
        sermon: &ProcessedSermon,
    ) -> BTreeMap<String, String> {
        let mut vars = self.base_variables(sermon);
        match template.category {
            MessageCategory::Meditation => {
                vars.insert(
                    "meditation_questions".to_string(),
                    meditation_questions(&sermon.meditation),
                );
            }
            MessageCategory::PracticeCheck => {
                vars.insert(
                    "practical_tasks".to_string(),
                    practical_task_list(&sermon.practical_tasks),
                );
            }
            MessageCategory::SermonSummary | MessageCategory::Announcements => {}
        }
        vars
    }

    /// One pending record per (template, opted-in recipient), grouped by
    /// template in catalog order.
    pub async fn generate(
        &self,
        sermon: &ProcessedSermon,
    ) -> Result<Vec<MessageRecord>, ShepherdError> {
        let now = Utc::now();
        let mut records = Vec::new();

        for template in self.catalog.iter() {
            let scheduled_time = send_instant(sermon.date, template.schedule, self.church.offset)?;
            let vars = self.template_variables(template, sermon);
            let missing = template.missing_variables(&vars);
            if !missing.is_empty() {
                warn!(
                    template = %template.id,
                    missing = ?missing,
                    "template has unbound placeholders, they are sent verbatim"
                );
            }
            let content = template.render(&vars);
            let buttons = template.render_buttons(&vars);

            let recipients = self.directory.message_recipients(template.category).await?;
            debug!(
                template = %template.id,
                recipients = recipients.len(),
                scheduled = %scheduled_time,
                "resolved recipients"
            );

            records.extend(recipients.into_iter().map(|recipient| MessageRecord {
                id: MessageRecord::record_id(&sermon.id, &template.id, &recipient.phone),
                template_id: template.id.clone(),
                sermon_id: sermon.id.clone(),
                recipient_phone: recipient.phone,
                member_id: recipient.member_id,
                content: content.clone(),
                buttons: buttons.clone(),
                variables: vars.clone(),
                scheduled_time,
                status: RecordStatus::Pending,
                created_at: now,
            }));
        }

        info!(
            sermon_id = %sermon.id,
            messages = records.len(),
            "generated weekly messages"
        );
        Ok(records)
    }
}

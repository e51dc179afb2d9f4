// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot subcommands.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use shepherd_core::types::{Member, ProcessedSermon, QueueItem, QueueStatus};
use shepherd_core::{QueueStore, ScheduleStore, ShepherdError};
use shepherd_messaging::{DispatchOutcome, schedule_sermon};

use crate::app::App;

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ShepherdError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ShepherdError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| ShepherdError::Config(format!("invalid JSON in {}: {e}", path.display())))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ShepherdError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ShepherdError::Internal(format!("failed to serialize output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// `shepherd process`: one sweep, then a delivery report refresh.
pub async fn run_process(app: &App, refresh: bool) -> Result<(), ShepherdError> {
    let report = app.sender.process_pending_messages().await?;
    println!(
        "due {}  sent {}  retrying {}  failed {}  errored {}  claimed elsewhere {}",
        report.due,
        report.sent,
        report.retried,
        report.failed,
        report.errored,
        report.unclaimed
    );
    if refresh {
        let reports = app.sender.refresh_delivery_status(100).await?;
        println!(
            "reports: checked {}  delivered {}  read {}  failed {}",
            reports.queried, reports.delivered, reports.read, reports.failed
        );
    }
    Ok(())
}

/// `shepherd generate`: schedule the week of messages for a processed sermon.
pub async fn run_generate(app: &App, sermon_path: &Path, dry_run: bool) -> Result<(), ShepherdError> {
    let sermon: ProcessedSermon = read_json(sermon_path)?;
    let generator = app.generator()?;

    if dry_run {
        let records = generator.generate(&sermon).await?;
        let mut per_template: BTreeMap<&str, (usize, String)> = BTreeMap::new();
        for record in &records {
            let entry = per_template
                .entry(record.template_id.as_str())
                .or_insert((0, record.scheduled_time.to_rfc3339()));
            entry.0 += 1;
        }
        for (template, (count, at)) in per_template {
            println!("{template:<24} {count:>4} recipients  at {at}");
        }
        println!("{} messages (dry run, nothing stored)", records.len());
        return Ok(());
    }

    let summary = schedule_sermon(
        &generator,
        app.storage.as_ref(),
        &sermon,
        app.config.sender.default_max_retries,
    )
    .await?;
    println!(
        "sermon {}: {} messages generated, {} queued",
        sermon.id, summary.generated, summary.queued
    );
    Ok(())
}

/// `shepherd send-test`: send one message now.
///
/// Church settings fill any variable not given on the command line.
pub async fn run_send_test(
    app: &App,
    phone: &str,
    template_code: &str,
    vars: Vec<(String, String)>,
) -> Result<(), ShepherdError> {
    let church = &app.config.church;
    let mut variables = BTreeMap::from([
        ("church_name".to_string(), church.name.clone()),
        ("pastor_phone".to_string(), church.pastor_phone.clone()),
        ("domain".to_string(), church.domain.clone()),
    ]);
    variables.extend(vars);

    let (item, outcome) = app
        .sender
        .send_test_message(phone, template_code, variables)
        .await?;
    match outcome {
        DispatchOutcome::Sent {
            provider_message_id,
        } => {
            let mid = provider_message_id.map_or_else(|| "-".to_string(), |m| m.to_string());
            println!("{}: sent (provider id {mid})", item.id);
            Ok(())
        }
        DispatchOutcome::Retrying { error }
        | DispatchOutcome::Failed { error }
        | DispatchOutcome::Errored { error } => Err(ShepherdError::delivery(format!(
            "{}: test message not sent: {error}",
            item.id
        ))),
    }
}

fn print_queue_row(item: &QueueItem) {
    println!(
        "{:<28} {:<15} {:<20} {:<25} {:<10} {}/{}  {}",
        item.id,
        item.recipient_phone,
        item.template_code.as_deref().unwrap_or("-"),
        item.scheduled_time.format("%Y-%m-%d %H:%M:%S UTC"),
        item.status,
        item.retry_count,
        item.max_retries,
        item.error_message.as_deref().unwrap_or(""),
    );
}

/// `shepherd queue`: list queue items, newest first.
pub async fn run_queue(
    app: &App,
    status: Option<QueueStatus>,
    limit: usize,
    json: bool,
) -> Result<(), ShepherdError> {
    let items = app.storage.list(status, limit).await?;
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("queue is empty");
        return Ok(());
    }
    println!(
        "{:<28} {:<15} {:<20} {:<25} {:<10} {:<5} ERROR",
        "ID", "RECIPIENT", "TEMPLATE", "SCHEDULED", "STATUS", "TRIES"
    );
    for item in &items {
        print_queue_row(item);
    }
    Ok(())
}

/// `shepherd cancel`: withdraw a pending item.
pub async fn run_cancel(app: &App, id: &str) -> Result<(), ShepherdError> {
    if app.storage.cancel(id).await? {
        println!("{id}: cancelled");
        Ok(())
    } else {
        Err(ShepherdError::Internal(format!(
            "{id} is no longer pending and cannot be cancelled"
        )))
    }
}

/// `shepherd scheduled`: pending records due on a UTC date.
pub async fn run_scheduled(app: &App, date: NaiveDate, json: bool) -> Result<(), ShepherdError> {
    let records = app.storage.scheduled_for_date(date).await?;
    if json {
        return print_json(&records);
    }
    for record in &records {
        println!(
            "{}  {:<15} {:<22} {}",
            record.scheduled_time.format("%H:%M UTC"),
            record.recipient_phone,
            record.template_id,
            record.sermon_id
        );
    }
    println!("{} pending on {date}", records.len());
    Ok(())
}

/// `shepherd stats`: per-day totals with a per-template breakdown.
pub async fn run_stats(app: &App, days: u32, json: bool) -> Result<(), ShepherdError> {
    let stats = app.sender.sending_stats(days).await?;
    if json {
        return print_json(&stats);
    }
    if stats.is_empty() {
        println!("no messages sent in the last {days} days");
        return Ok(());
    }
    for day in &stats {
        println!(
            "{}  sent {:>5}  delivered {:>5}  read {:>5}  failed {:>5}  cost {:>7} KRW",
            day.date,
            day.total_sent,
            day.total_delivered,
            day.total_read,
            day.total_failed,
            day.total_cost
        );
        for (code, t) in &day.templates {
            println!(
                "    {code:<22} sent {:>5}  delivered {:>5}  read {:>5}  failed {:>5}  cost {:>7}",
                t.sent, t.delivered, t.read, t.failed, t.cost
            );
        }
    }
    Ok(())
}

/// `shepherd members import`: upsert members from a JSON array.
pub async fn run_members_import(app: &App, path: &Path) -> Result<(), ShepherdError> {
    let members: Vec<Member> = read_json(path)?;
    let count = app.storage.upsert_members(members).await?;
    println!("imported {count} members");
    Ok(())
}

/// `shepherd members list`.
pub async fn run_members_list(app: &App, json: bool) -> Result<(), ShepherdError> {
    let members = app.storage.list_members().await?;
    if json {
        return print_json(&members);
    }
    for m in &members {
        let s = m.message_settings;
        let flag = |on: bool| if on { 'Y' } else { '-' };
        println!(
            "{:<12} {:<10} {:<15} {:<8} summary {} meditation {} practice {} notices {}",
            m.id,
            m.name,
            m.phone,
            if m.is_active { "active" } else { "inactive" },
            flag(s.receive_sermon_summary),
            flag(s.receive_meditation),
            flag(s.receive_practice_check),
            flag(s.receive_announcements),
        );
    }
    println!("{} members", members.len());
    Ok(())
}

/// `shepherd purge`: apply queue, record, and archive retention.
pub async fn run_purge(app: &App, days: Option<u32>) -> Result<(), ShepherdError> {
    let report = app.archive_expired(days).await?;
    println!(
        "archived {} queue items  pruned {} records  expired {} archive rows",
        report.archived, report.pruned_records, report.expired_archive
    );
    Ok(())
}

/// `shepherd balance`.
pub async fn run_balance(app: &App) -> Result<(), ShepherdError> {
    let balance = app.sender.balance().await?;
    println!("{} {}", balance.balance, balance.currency);
    Ok(())
}

use crate::profile::ActivityEntry;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};

const HEADER: [&str; 6] = ["person", "date", "time", "title", "category", "points"];

/// One row per history entry, in stored order. Every field is quoted.
pub fn history_csv(person: &str, history: &[ActivityEntry]) -> String {
    let header = HEADER.iter().map(|field| quote(field)).collect::<Vec<_>>();

    std::iter::once(header.join(","))
        .chain(history.iter().map(|entry| {
            [
                person.to_string(),
                entry.date.format("%Y-%m-%d").to_string(),
                local_time(entry.timestamp),
                entry.title.clone(),
                entry.category.clone(),
                entry.points.to_string(),
            ]
            .iter()
            .map(|field| quote(field))
            .collect::<Vec<_>>()
            .join(",")
        }))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn export_file_name(person: &str, today: NaiveDate) -> String {
    let safe_person = person
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect::<String>();

    format!("questlog-activity-{safe_person}-{}.csv", today.format("%Y-%m-%d"))
}

pub fn write_history_csv(
    person: &str,
    history: &[ActivityEntry],
    export_dir: &Path,
    today: NaiveDate,
) -> Result<PathBuf> {
    fs::create_dir_all(export_dir).with_context(|| {
        format!(
            "Failed to create export directory: {}",
            export_dir.display()
        )
    })?;

    let path = export_dir.join(export_file_name(person, today));
    fs::write(&path, history_csv(person, history))
        .with_context(|| format!("Failed to write CSV export: {}", path.display()))?;

    Ok(path)
}

fn quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

/// Local wall-clock time of an epoch-millisecond timestamp, `HH:MM:SS`.
pub fn local_time(timestamp_millis: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_millis)
        .map(|instant| instant.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

//! Summaries and exports over stored employer records.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::models::{Confidence, EmployerRecord, Status};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub by_status: BTreeMap<Status, usize>,
    pub by_confidence: BTreeMap<Confidence, usize>,
    pub conflicts: usize,
    pub needs_review: usize,
    pub messages: usize,
}

impl Statistics {
    pub fn from_records(records: &[EmployerRecord]) -> Self {
        let mut stats = Statistics {
            total: records.len(),
            by_status: Status::ALL.iter().map(|s| (*s, 0)).collect(),
            by_confidence: [Confidence::Low, Confidence::Medium, Confidence::High]
                .into_iter()
                .map(|c| (c, 0))
                .collect(),
            ..Default::default()
        };
        for record in records {
            *stats.by_status.entry(record.status).or_default() += 1;
            *stats.by_confidence.entry(record.confidence).or_default() += 1;
            if record.has_conflict() {
                stats.conflicts += 1;
            }
            if record.needs_review() {
                stats.needs_review += 1;
            }
            stats.messages += record.message_ids.len();
        }
        stats
    }

    pub fn status_count(&self, status: Status) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Share of tracked applications at `status`, in percent.
    pub fn percent(&self, status: Status) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.status_count(status) as f64 * 100.0 / self.total as f64
    }
}

/// Review markers for table output: `!` for a conflict, `?` for low confidence.
pub fn review_flags(record: &EmployerRecord) -> String {
    let mut flags = String::new();
    if record.has_conflict() {
        flags.push('!');
    }
    if record.confidence == Confidence::Low {
        flags.push('?');
    }
    flags
}

/// Shortens `s` to at most `max` characters, ending in "..." when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Company")]
    company: &'a str,
    #[serde(rename = "Position")]
    position: &'a str,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Confidence")]
    confidence: &'static str,
    #[serde(rename = "First Seen")]
    first_seen: String,
    #[serde(rename = "Last Seen")]
    last_seen: String,
    #[serde(rename = "Email IDs")]
    email_ids: String,
    #[serde(rename = "Notes")]
    notes: String,
    #[serde(rename = "Needs Review")]
    needs_review: &'static str,
}

impl<'a> From<&'a EmployerRecord> for CsvRow<'a> {
    fn from(record: &'a EmployerRecord) -> Self {
        CsvRow {
            company: &record.employer,
            position: &record.role,
            status: record.status.as_str(),
            confidence: record.confidence.as_str(),
            first_seen: record.first_seen.format("%Y-%m-%d").to_string(),
            last_seen: record.last_seen.format("%Y-%m-%d").to_string(),
            email_ids: record.message_ids.join(", "),
            notes: record.rendered_notes(),
            needs_review: if record.needs_review() { "Yes" } else { "No" },
        }
    }
}

pub fn write_csv<W: Write>(records: &[EmployerRecord], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(CsvRow::from(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_csv(records: &[EmployerRecord], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(records, file).with_context(|| format!("Failed to write CSV to {}", path.display()))
}

pub fn export_json(records: &[EmployerRecord], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, records)
        .with_context(|| format!("Failed to write JSON to {}", path.display()))
}

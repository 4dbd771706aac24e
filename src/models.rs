use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder employer name when no extraction method produced one.
pub const UNKNOWN_EMPLOYER: &str = "Unknown";
/// Placeholder role title when no extraction method produced one.
pub const ROLE_NOT_SPECIFIED: &str = "Not specified";

// --- Status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    Applied,
    Interviewing,
    Rejected,
    Offer,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Applied,
        Status::Interviewing,
        Status::Rejected,
        Status::Offer,
    ];

    /// Rank in the application lifecycle. Interviewing and Rejected share a
    /// level so either may replace the other.
    pub fn level(self) -> u8 {
        match self {
            Status::Applied => 0,
            Status::Interviewing | Status::Rejected => 1,
            Status::Offer => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Applied => "Applied",
            Status::Interviewing => "Interviewing",
            Status::Rejected => "Rejected",
            Status::Offer => "Offer",
        }
    }

    /// Lenient parse for free-form labels (collaborator output). Anything
    /// unrecognisable falls back to Applied.
    pub fn normalize(value: &str) -> Status {
        if let Ok(status) = value.parse() {
            return status;
        }
        let lower = value.to_lowercase();
        if lower.contains("interview") {
            Status::Interviewing
        } else if lower.contains("reject") || lower.contains("denied") {
            Status::Rejected
        } else if lower.contains("offer") {
            Status::Offer
        } else {
            Status::Applied
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "applied" | "application" | "submitted" => Ok(Status::Applied),
            "interviewing" | "interview" | "screening" => Ok(Status::Interviewing),
            "rejected" | "rejection" | "declined" => Ok(Status::Rejected),
            "offer" | "offered" => Ok(Status::Offer),
            _ => Err(anyhow!(
                "Unknown status '{}'. Expected one of: Applied, Interviewing, Rejected, Offer",
                s
            )),
        }
    }
}

// --- Confidence ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            _ => Err(anyhow!("Unknown confidence level '{}'", s)),
        }
    }
}

/// Where an extracted field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Domain,
    Subject,
    Body,
    Ai,
}

impl FieldSource {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldSource::Domain => "domain",
            FieldSource::Subject => "subject",
            FieldSource::Body => "body",
            FieldSource::Ai => "ai",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Pattern,
    Ai,
    Hybrid,
    PatternOnly,
    AiFailed,
}

impl ExtractionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMethod::Pattern => "pattern",
            ExtractionMethod::Ai => "ai",
            ExtractionMethod::Hybrid => "hybrid",
            ExtractionMethod::PatternOnly => "pattern_only",
            ExtractionMethod::AiFailed => "ai_failed",
        }
    }
}

// --- Message ---

/// An inbound message as handed over by the message source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "from")]
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, alias = "date")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub has_attachments: bool,
}

impl Message {
    /// Body text used for matching: the body, or the snippet when the body is
    /// empty. HTML bodies are reduced to their text nodes.
    pub fn text_body(&self) -> String {
        let raw = if self.body.trim().is_empty() {
            &self.snippet
        } else {
            &self.body
        };

        if looks_like_html(raw) {
            let document = Html::parse_document(raw);
            document.root_element().text().collect::<Vec<_>>().join(" ")
        } else {
            raw.clone()
        }
    }

    /// Subject and body joined, as scanned for safety keywords.
    pub fn full_text(&self) -> String {
        format!("{} {}", self.subject, self.text_body())
    }
}

fn looks_like_html(text: &str) -> bool {
    let lower = text.trim_start().to_lowercase();
    lower.starts_with("<!doctype html")
        || lower.starts_with("<html")
        || lower.contains("<body")
        || (lower.starts_with('<') && lower.contains("</"))
}

// --- Extraction result ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub message_id: String,
    pub message_date: Option<DateTime<Utc>>,
    pub employer: String,
    pub employer_source: Option<FieldSource>,
    pub role: String,
    pub role_source: Option<FieldSource>,
    pub status: Status,
    pub status_evidence_count: usize,
    pub matched_patterns: Vec<String>,
    pub confidence: Confidence,
    pub confidence_score: f64,
    pub extraction_method: ExtractionMethod,
}

impl Default for ExtractionResult {
    fn default() -> Self {
        Self {
            message_id: String::new(),
            message_date: None,
            employer: UNKNOWN_EMPLOYER.to_string(),
            employer_source: None,
            role: ROLE_NOT_SPECIFIED.to_string(),
            role_source: None,
            status: Status::Applied,
            status_evidence_count: 0,
            matched_patterns: Vec::new(),
            confidence: Confidence::Low,
            confidence_score: 0.0,
            extraction_method: ExtractionMethod::Pattern,
        }
    }
}

impl ExtractionResult {
    pub fn has_employer(&self) -> bool {
        !is_unknown_employer(&self.employer)
    }

    pub fn has_role(&self) -> bool {
        !is_unspecified_role(&self.role)
    }
}

pub fn is_unknown_employer(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.eq_ignore_ascii_case(UNKNOWN_EMPLOYER)
}

pub fn is_unspecified_role(title: &str) -> bool {
    let title = title.trim();
    title.is_empty() || title.eq_ignore_ascii_case(ROLE_NOT_SPECIFIED)
}

/// Normalised store key for an employer name: trimmed, lowercased, inner
/// whitespace collapsed.
pub fn employer_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// --- Employer record ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub received: Status,
    pub kept: Status,
    pub at: DateTime<Utc>,
    pub message_id: Option<String>,
}

impl ConflictEntry {
    pub fn note(&self) -> String {
        format!(
            "Conflict: received {} after {} on {}",
            self.received,
            self.kept,
            self.at.format("%Y-%m-%d")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    Automatic,
    Manual,
}

/// One status-affecting event on a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub origin: ChangeOrigin,
    pub from: Option<Status>,
    pub to: Status,
    pub message_id: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployerRecord {
    pub employer_key: String,
    pub employer: String,
    pub role: String,
    pub status: Status,
    pub confidence: Confidence,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub message_ids: Vec<String>,
    /// Operator notes. Conflicts live in `conflicts`, not here.
    pub notes: Vec<String>,
    pub conflicts: Vec<ConflictEntry>,
    pub audit: Vec<AuditEntry>,
}

impl EmployerRecord {
    pub fn new(
        employer: &str,
        role: &str,
        status: Status,
        confidence: Confidence,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            employer_key: employer_key(employer),
            employer: employer.trim().to_string(),
            role: role.to_string(),
            status,
            confidence,
            first_seen: at,
            last_seen: at,
            message_ids: Vec::new(),
            notes: Vec::new(),
            conflicts: Vec::new(),
            audit: Vec::new(),
        }
    }

    pub fn has_message(&self, id: &str) -> bool {
        self.message_ids.iter().any(|existing| existing == id)
    }

    /// Records a message id with set semantics. Returns false for empty or
    /// already-known ids.
    pub fn add_message_id(&mut self, id: &str) -> bool {
        if id.is_empty() || self.has_message(id) {
            return false;
        }
        self.message_ids.push(id.to_string());
        true
    }

    /// Widens the seen window to include `at`.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at < self.first_seen {
            self.first_seen = at;
        }
        if at > self.last_seen {
            self.last_seen = at;
        }
    }

    pub fn has_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Whether an unreviewed conflict was raised by message `id`.
    pub fn has_conflict_for(&self, id: &str) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.message_id.as_deref() == Some(id))
    }

    pub fn needs_review(&self) -> bool {
        self.has_conflict() || self.confidence == Confidence::Low
    }

    pub fn rendered_notes(&self) -> String {
        self.notes
            .iter()
            .cloned()
            .chain(self.conflicts.iter().map(ConflictEntry::note))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

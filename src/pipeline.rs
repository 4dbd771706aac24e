//! Batch processing: message in, record mutation and deletion decision out.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::ai::AIProvider;
use crate::classify::classify;
use crate::config::AppConfig;
use crate::deletion::{DeletionDecision, should_delete};
use crate::extract::{extract_employer_from, extract_role_within};
use crate::merge::{CollaboratorOutcome, consult, merge, should_consult};
use crate::models::{ExtractionMethod, ExtractionResult, Message, Status};
use crate::store::RecordStore;
use crate::tracker::{UpsertKind, UpsertOutcome, apply_extraction};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Skip messages timestamped before this instant.
    pub since: Option<DateTime<Utc>>,
    pub max_messages: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedMessage {
    pub message_id: String,
    pub extraction: ExtractionResult,
    pub outcome: UpsertOutcome,
    pub deletion: DeletionDecision,
}

/// One entry of the deletion plan handed to the mailbox side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAction {
    pub message_id: String,
    pub employer: String,
    pub status: Status,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_keyword: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    pub messages_seen: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub created: usize,
    pub updated: usize,
    pub conflicts: usize,
    pub duplicates: usize,
    pub ai_consulted: usize,
    pub checkpoints: usize,
    pub by_status: BTreeMap<Status, usize>,
    pub to_delete: Vec<PlannedAction>,
    pub to_keep: Vec<PlannedAction>,
}

impl ScanReport {
    fn record(&mut self, processed: &ProcessedMessage) {
        self.processed += 1;
        *self.by_status.entry(processed.extraction.status).or_default() += 1;
        match processed.outcome.kind {
            UpsertKind::Created => self.created += 1,
            UpsertKind::Updated => self.updated += 1,
            UpsertKind::Conflict => self.conflicts += 1,
            UpsertKind::Duplicate => self.duplicates += 1,
        }
        if matches!(
            processed.extraction.extraction_method,
            ExtractionMethod::Ai | ExtractionMethod::Hybrid | ExtractionMethod::AiFailed
        ) {
            self.ai_consulted += 1;
        }

        let action = PlannedAction {
            message_id: processed.message_id.clone(),
            employer: processed.outcome.employer.clone(),
            status: processed.extraction.status,
            reason: processed.deletion.reason.clone(),
            safety_keyword: processed.deletion.matched_safety_keyword.clone(),
        };
        if processed.deletion.should_delete {
            self.to_delete.push(action);
        } else {
            self.to_keep.push(action);
        }
    }

    fn attempted(&self) -> usize {
        self.processed + self.errors
    }

    /// Writes the deletion plan as JSON for whatever executes deletions.
    pub fn write_plan(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct Plan<'a> {
            generated_at: DateTime<Utc>,
            to_delete: &'a [PlannedAction],
            to_keep: &'a [PlannedAction],
        }

        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let plan = Plan {
            generated_at: Utc::now(),
            to_delete: &self.to_delete,
            to_keep: &self.to_keep,
        };
        serde_json::to_writer_pretty(file, &plan)
            .with_context(|| format!("Failed to write deletion plan to {}", path.display()))
    }
}

pub struct Pipeline<'a> {
    store: &'a mut dyn RecordStore,
    provider: Option<&'a dyn AIProvider>,
    config: &'a AppConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a mut dyn RecordStore, config: &'a AppConfig) -> Self {
        Self {
            store,
            provider: None,
            config,
        }
    }

    pub fn with_provider(mut self, provider: Option<&'a dyn AIProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Pattern extraction, classification and scoring, merged with the
    /// collaborator when enabled and the pattern result is weak.
    pub fn extract(&self, message: &Message) -> ExtractionResult {
        let window = self.config.extraction.body_window;
        let body = message.text_body();

        let (employer, employer_source) =
            extract_employer_from(&message.sender, &message.subject, &body, window);
        let (role, role_source) = extract_role_within(&message.subject, &body, window);
        let classification = classify(&message.subject, &body);

        if self.config.logging.log_classifications {
            debug!(
                message_id = %message.id,
                status = %classification.status,
                evidence = classification.evidence_count,
                "classified"
            );
        }

        let mut result = ExtractionResult {
            message_id: message.id.clone(),
            message_date: message.timestamp,
            employer,
            employer_source,
            role,
            role_source,
            status: classification.status,
            status_evidence_count: classification.evidence_count,
            matched_patterns: classification.matched_patterns,
            ..Default::default()
        };
        result.rescore();

        let outcome = if self.config.extraction.use_ai
            && should_consult(&result, self.config.triggers())
        {
            match self.provider {
                Some(provider) => consult(provider, message),
                None => CollaboratorOutcome::Unavailable,
            }
        } else {
            CollaboratorOutcome::Disabled
        };
        let merged = merge(result, outcome);

        if self.config.logging.log_extractions {
            debug!(
                message_id = %message.id,
                employer = %merged.employer,
                role = %merged.role,
                confidence = %merged.confidence,
                method = merged.extraction_method.as_str(),
                "extracted"
            );
        }
        merged
    }

    pub fn process(&mut self, message: &Message) -> Result<ProcessedMessage> {
        let extraction = self.extract(message);
        let outcome = apply_extraction(&mut *self.store, &extraction)
            .with_context(|| format!("Failed to record message {}", message.id))?;

        let deletion = should_delete(
            extraction.status,
            &message.full_text(),
            outcome.is_conflict(),
            message.starred,
            message.has_attachments,
            &self.config.deletion,
        );
        if self.config.logging.log_deletions {
            debug!(
                message_id = %message.id,
                delete = deletion.should_delete,
                reason = %deletion.reason,
                "deletion decision"
            );
        }

        Ok(ProcessedMessage {
            message_id: message.id.clone(),
            extraction,
            outcome,
            deletion,
        })
    }

    /// Processes messages in arrival order. A failing message is logged and
    /// counted; the batch carries on. The store is flushed every
    /// `store.save_after_n_messages` messages and once at the end.
    pub fn run(
        &mut self,
        messages: impl IntoIterator<Item = Message>,
        options: &ScanOptions,
    ) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        let checkpoint_every = self.config.store.save_after_n_messages;

        for message in messages {
            if options.max_messages.is_some_and(|max| report.attempted() >= max) {
                break;
            }
            report.messages_seen += 1;

            if let (Some(since), Some(at)) = (options.since, message.timestamp) {
                if at < since {
                    report.skipped += 1;
                    continue;
                }
            }

            match self.process(&message) {
                Ok(processed) => report.record(&processed),
                Err(e) => {
                    report.errors += 1;
                    warn!(message_id = %message.id, error = %format!("{e:#}"), "failed to process message");
                }
            }

            if checkpoint_every > 0 && report.attempted() % checkpoint_every == 0 {
                self.store.flush()?;
                report.checkpoints += 1;
                debug!(processed = report.processed, "checkpoint");
            }
        }

        self.store.flush()?;
        report.checkpoints += 1;

        info!(
            processed = report.processed,
            created = report.created,
            updated = report.updated,
            conflicts = report.conflicts,
            errors = report.errors,
            "scan complete"
        );
        Ok(report)
    }
}

/// Reads messages from a JSON array or a JSON-lines file. Malformed lines
/// are logged and skipped.
pub fn read_messages(path: &Path) -> Result<Vec<Message>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut first = String::new();
    loop {
        first.clear();
        if reader.read_line(&mut first)? == 0 || !first.trim().is_empty() {
            break;
        }
    }

    if first.trim_start().starts_with('[') {
        let mut rest = String::new();
        std::io::Read::read_to_string(&mut reader, &mut rest)?;
        return serde_json::from_str(&format!("{first}{rest}"))
            .with_context(|| format!("Failed to parse message array in {}", path.display()));
    }

    let mut messages = Vec::new();
    let lines = std::iter::once(Ok(first)).chain(reader.lines());
    for (idx, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(&line) {
            Ok(message) => messages.push(message),
            Err(e) => warn!(line = idx + 1, error = %e, "skipping malformed message"),
        }
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use crate::models::{EmployerRecord, FieldSource};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, d, 10, 0, 0).unwrap()
    }

    fn message(id: &str, sender: &str, subject: &str, body: &str, d: u32) -> Message {
        Message {
            id: id.to_string(),
            sender: sender.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            timestamp: Some(day(d)),
            ..Default::default()
        }
    }

    fn applied() -> Message {
        message(
            "a1",
            "recruiting@acme.com",
            "Thank you for applying to Acme!",
            "We've received your application",
            1,
        )
    }

    fn offer() -> Message {
        message(
            "a2",
            "talent@acme.com",
            "Your offer letter",
            "We are delighted to extend this offer of employment.",
            3,
        )
    }

    fn rejection() -> Message {
        message(
            "a3",
            "recruiting@acme.com",
            "Update",
            "Unfortunately we are not moving forward with your candidacy.",
            5,
        )
    }

    struct StubProvider;

    impl AIProvider for StubProvider {
        fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, AiError> {
            Ok(r#"{"company_name": "Globex", "position": "Data Engineer", "status": "Interviewing"}"#.to_string())
        }
        fn is_available(&self) -> bool {
            true
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    /// Refuses to store one employer.
    struct FailingStore {
        inner: MemoryStore,
        refuse: &'static str,
    }

    impl RecordStore for FailingStore {
        fn find(&self, employer: &str) -> Result<Option<EmployerRecord>> {
            self.inner.find(employer)
        }
        fn upsert(&mut self, record: &EmployerRecord) -> Result<()> {
            if record.employer_key == self.refuse {
                anyhow::bail!("disk full");
            }
            self.inner.upsert(record)
        }
        fn all(&self) -> Result<Vec<EmployerRecord>> {
            self.inner.all()
        }
        fn flush(&mut self) -> Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn test_extract_pattern_only() {
        let mut store = MemoryStore::new();
        let config = AppConfig::default();
        let pipeline = Pipeline::new(&mut store, &config);
        let result = pipeline.extract(&applied());
        assert_eq!(result.employer, "Acme");
        assert_eq!(result.employer_source, Some(FieldSource::Domain));
        assert_eq!(result.status, Status::Applied);
        assert_eq!(result.extraction_method, ExtractionMethod::Pattern);
    }

    #[test]
    fn test_run_tracks_lifecycle_and_plans_deletions() {
        let mut store = MemoryStore::new();
        let config = AppConfig::default();
        let report = Pipeline::new(&mut store, &config)
            .run(vec![applied(), offer(), rejection()], &ScanOptions::default())
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.by_status.get(&Status::Offer), Some(&1));

        assert_eq!(report.to_delete.len(), 1);
        assert_eq!(report.to_delete[0].message_id, "a1");
        assert_eq!(report.to_delete[0].reason, "Status is Applied (safe to delete)");
        let conflict = report.to_keep.iter().find(|a| a.message_id == "a3").unwrap();
        assert_eq!(conflict.reason, "Email created status conflict (requires review)");

        let record = store.find("acme").unwrap().unwrap();
        assert_eq!(record.status, Status::Offer);
        assert_eq!(record.message_ids.len(), 3);
        assert!(record.has_conflict());
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let mut store = MemoryStore::new();
        let config = AppConfig::default();
        Pipeline::new(&mut store, &config)
            .run(vec![applied(), offer()], &ScanOptions::default())
            .unwrap();
        let before = store.find("acme").unwrap();

        let report = Pipeline::new(&mut store, &config)
            .run(vec![applied(), offer()], &ScanOptions::default())
            .unwrap();
        assert_eq!(report.duplicates, 2);
        assert_eq!(store.find("acme").unwrap(), before);
    }

    #[test]
    fn test_rescan_keeps_conflicting_message() {
        let mut store = MemoryStore::new();
        let config = AppConfig::default();

        for _ in 0..2 {
            let report = Pipeline::new(&mut store, &config)
                .run(vec![offer(), applied()], &ScanOptions::default())
                .unwrap();
            assert!(report.to_delete.is_empty());
            let kept = report.to_keep.iter().find(|a| a.message_id == "a1").unwrap();
            assert_eq!(kept.reason, "Email created status conflict (requires review)");
        }
    }

    #[test]
    fn test_since_and_max_filters() {
        let mut store = MemoryStore::new();
        let config = AppConfig::default();
        let options = ScanOptions {
            since: Some(day(2)),
            max_messages: None,
        };
        let report = Pipeline::new(&mut store, &config)
            .run(vec![applied(), offer()], &options)
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed, 1);

        let mut store = MemoryStore::new();
        let options = ScanOptions {
            since: None,
            max_messages: Some(1),
        };
        let report = Pipeline::new(&mut store, &config)
            .run(vec![applied(), offer(), rejection()], &options)
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.messages_seen, 1);
    }

    #[test]
    fn test_periodic_checkpoints() {
        let mut store = MemoryStore::new();
        let mut config = AppConfig::default();
        config.store.save_after_n_messages = 2;
        let messages: Vec<Message> = (0..5)
            .map(|i| {
                let mut m = applied();
                m.id = format!("m{i}");
                m
            })
            .collect();
        let report = Pipeline::new(&mut store, &config)
            .run(messages, &ScanOptions::default())
            .unwrap();
        assert_eq!(report.checkpoints, 3);
        assert_eq!(store.flush_count(), 3);
    }

    #[test]
    fn test_failing_message_does_not_stop_batch() {
        let mut store = FailingStore {
            inner: MemoryStore::new(),
            refuse: "globex",
        };
        let config = AppConfig::default();
        let globex = message("g1", "jobs@globex.com", "Thanks for applying", "", 1);
        let report = Pipeline::new(&mut store, &config)
            .run(vec![globex, applied()], &ScanOptions::default())
            .unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.processed, 1);
        assert!(store.inner.find("acme").unwrap().is_some());
    }

    #[test]
    fn test_collaborator_fills_weak_extraction() {
        let mut store = MemoryStore::new();
        let mut config = AppConfig::default();
        config.extraction.use_ai = true;
        let provider = StubProvider;
        let vague = message("v1", "noreply@greenhouse.io", "Hello", "Please see below.", 2);

        let mut pipeline = Pipeline::new(&mut store, &config).with_provider(Some(&provider as &dyn AIProvider));
        let processed = pipeline.process(&vague).unwrap();
        assert_eq!(processed.extraction.employer, "Globex");
        assert_eq!(processed.extraction.status, Status::Interviewing);
        assert_eq!(processed.extraction.extraction_method, ExtractionMethod::Ai);
        assert!(!processed.deletion.should_delete);
        assert!(store.find("globex").unwrap().is_some());
    }

    #[test]
    fn test_missing_provider_degrades_to_patterns() {
        let mut store = MemoryStore::new();
        let mut config = AppConfig::default();
        config.extraction.use_ai = true;
        let pipeline = Pipeline::new(&mut store, &config);
        let vague = message("v1", "noreply@greenhouse.io", "Hello", "Please see below.", 2);
        let result = pipeline.extract(&vague);
        assert_eq!(result.extraction_method, ExtractionMethod::PatternOnly);
        assert_eq!(result.employer, "Unknown");
    }

    #[test]
    fn test_write_plan() {
        let mut store = MemoryStore::new();
        let config = AppConfig::default();
        let report = Pipeline::new(&mut store, &config)
            .run(vec![applied(), offer()], &ScanOptions::default())
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        report.write_plan(&path).unwrap();
        let plan: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(plan["to_delete"][0]["message_id"], "a1");
        assert_eq!(plan["to_keep"][0]["reason"], "Status is Offer (always kept)");
    }

    #[test]
    fn test_read_messages_jsonl_and_array() {
        let dir = tempfile::tempdir().unwrap();

        let lines = dir.path().join("inbox.jsonl");
        std::fs::write(
            &lines,
            "\n{\"id\":\"1\",\"from\":\"a@acme.com\",\"subject\":\"Hi\"}\nnot json\n{\"id\":\"2\",\"starred\":true}\n",
        )
        .unwrap();
        let messages = read_messages(&lines).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, "a@acme.com");
        assert!(messages[1].starred);

        let array = dir.path().join("inbox.json");
        std::fs::write(&array, "[\n{\"id\":\"1\"},\n{\"id\":\"2\"}\n]").unwrap();
        assert_eq!(read_messages(&array).unwrap().len(), 2);
    }
}

//! Applies extraction results and operator actions to employer records.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::hierarchy::can_transition;
use crate::models::{
    AuditEntry, ChangeOrigin, ConflictEntry, EmployerRecord, ExtractionResult, Status,
    employer_key, is_unspecified_role,
};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    Created,
    Updated,
    Conflict,
    /// The message was already recorded; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertOutcome {
    pub kind: UpsertKind,
    pub employer_key: String,
    pub employer: String,
    pub previous_status: Option<Status>,
    /// Status stored after the operation.
    pub status: Status,
    /// Status the message (or operator) asked for.
    pub requested_status: Status,
    pub reason: String,
    /// The message has an unreviewed conflict on the record, raised now or
    /// by an earlier scan.
    pub conflict_pending: bool,
}

impl UpsertOutcome {
    pub fn is_conflict(&self) -> bool {
        self.kind == UpsertKind::Conflict || self.conflict_pending
    }
}

fn optional_id(id: &str) -> Option<String> {
    (!id.is_empty()).then(|| id.to_string())
}

/// Pure upsert decision: what `existing` becomes after seeing `result` at
/// time `at`. The returned record is unchanged for duplicates.
pub fn resolve(
    existing: Option<EmployerRecord>,
    result: &ExtractionResult,
    at: DateTime<Utc>,
) -> (EmployerRecord, UpsertOutcome) {
    let message_id = optional_id(&result.message_id);

    let Some(mut record) = existing else {
        let mut record = EmployerRecord::new(
            &result.employer,
            &result.role,
            result.status,
            result.confidence,
            at,
        );
        record.add_message_id(&result.message_id);
        record.audit.push(AuditEntry {
            at,
            origin: ChangeOrigin::Automatic,
            from: None,
            to: result.status,
            message_id,
            detail: "record created".to_string(),
        });
        let outcome = UpsertOutcome {
            kind: UpsertKind::Created,
            employer_key: record.employer_key.clone(),
            employer: record.employer.clone(),
            previous_status: None,
            status: record.status,
            requested_status: result.status,
            reason: format!("New application: {}", result.status),
            conflict_pending: false,
        };
        return (record, outcome);
    };

    let current = record.status;
    let mut outcome = UpsertOutcome {
        kind: UpsertKind::Duplicate,
        employer_key: record.employer_key.clone(),
        employer: record.employer.clone(),
        previous_status: Some(current),
        status: current,
        requested_status: result.status,
        reason: String::new(),
        conflict_pending: false,
    };

    if let Some(id) = &message_id {
        if record.has_message(id) {
            outcome.reason = format!("Message {id} already recorded");
            outcome.conflict_pending = record.has_conflict_for(id);
            return (record, outcome);
        }
    }

    let check = can_transition(current, result.status);
    record.add_message_id(&result.message_id);
    record.touch(at);

    if check.allowed {
        record.status = result.status;
        if result.confidence > record.confidence {
            record.confidence = result.confidence;
        }
        if !is_unspecified_role(&result.role) {
            record.role = result.role.clone();
        }
        if current != result.status {
            record.audit.push(AuditEntry {
                at,
                origin: ChangeOrigin::Automatic,
                from: Some(current),
                to: result.status,
                message_id,
                detail: check.reason.clone(),
            });
        }
        outcome.kind = UpsertKind::Updated;
    } else {
        record.conflicts.push(ConflictEntry {
            received: result.status,
            kept: current,
            at,
            message_id,
        });
        outcome.kind = UpsertKind::Conflict;
        outcome.conflict_pending = true;
    }

    outcome.status = record.status;
    outcome.reason = check.reason;
    (record, outcome)
}

/// Looks up the record for `result.employer`, applies the result and writes
/// the record back. Messages without a timestamp count as seen now.
pub fn apply_extraction(store: &mut dyn RecordStore, result: &ExtractionResult) -> Result<UpsertOutcome> {
    let at = result.message_date.unwrap_or_else(Utc::now);
    let existing = store.find(&result.employer)?;
    let (record, outcome) = resolve(existing, result, at);

    match outcome.kind {
        UpsertKind::Duplicate => {
            debug!(employer = %outcome.employer, message_id = %result.message_id, "duplicate message skipped");
            return Ok(outcome);
        }
        UpsertKind::Conflict => warn!(
            employer = %outcome.employer,
            kept = %outcome.status,
            received = %outcome.requested_status,
            "status conflict recorded"
        ),
        UpsertKind::Created | UpsertKind::Updated => debug!(
            employer = %outcome.employer,
            status = %outcome.status,
            kind = ?outcome.kind,
            "record saved"
        ),
    }

    store.upsert(&record)?;
    Ok(outcome)
}

fn load(store: &dyn RecordStore, employer: &str) -> Result<EmployerRecord> {
    store
        .find(employer)?
        .ok_or_else(|| anyhow!("No application found for '{}'", employer))
}

/// Operator-issued status change. Without `force` the hierarchy still
/// applies and a regression is refused untouched; with `force` it is bypassed.
pub fn manual_update(
    store: &mut dyn RecordStore,
    employer: &str,
    status: Status,
    force: bool,
    at: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let mut record = load(store, employer)?;
    let current = record.status;
    let check = can_transition(current, status);

    let mut outcome = UpsertOutcome {
        kind: UpsertKind::Conflict,
        employer_key: record.employer_key.clone(),
        employer: record.employer.clone(),
        previous_status: Some(current),
        status: current,
        requested_status: status,
        reason: check.reason.clone(),
        conflict_pending: false,
    };

    if !check.allowed && !force {
        outcome.reason = format!("{} (use --force to override)", check.reason);
        return Ok(outcome);
    }

    record.status = status;
    record.touch(at);
    record.audit.push(AuditEntry {
        at,
        origin: ChangeOrigin::Manual,
        from: Some(current),
        to: status,
        message_id: None,
        detail: if check.allowed {
            "manual update".to_string()
        } else {
            format!("forced: {}", check.reason)
        },
    });
    store.upsert(&record)?;
    info!(employer = %record.employer, from = %current, to = %status, force, "manual status update");

    outcome.kind = UpsertKind::Updated;
    outcome.status = status;
    Ok(outcome)
}

/// Sets or appends an operator note.
pub fn annotate(store: &mut dyn RecordStore, employer: &str, note: &str, append: bool) -> Result<()> {
    let mut record = load(store, employer)?;
    if append {
        record.notes.push(note.to_string());
    } else {
        record.notes = vec![note.to_string()];
    }
    store.upsert(&record)
}

/// Marks every recorded conflict as reviewed. Returns how many were cleared.
pub fn clear_conflicts(store: &mut dyn RecordStore, employer: &str, at: DateTime<Utc>) -> Result<usize> {
    let mut record = load(store, employer)?;
    let cleared = record.conflicts.len();
    if cleared == 0 {
        return Ok(0);
    }
    record.conflicts.clear();
    record.audit.push(AuditEntry {
        at,
        origin: ChangeOrigin::Manual,
        from: Some(record.status),
        to: record.status,
        message_id: None,
        detail: format!("cleared {cleared} conflict(s)"),
    });
    store.upsert(&record)?;
    Ok(cleared)
}

/// Canonical store key for a result, including the unknown-employer bucket.
pub fn record_key(result: &ExtractionResult) -> String {
    employer_key(&result.employer)
}

//! Combines pattern extraction with the optional AI collaborator.

use tracing::{debug, warn};

use crate::ai::{AIProvider, AiError, AiExtraction, ai_extract};
use crate::models::{
    ExtractionMethod, ExtractionResult, FieldSource, Message, Status, is_unknown_employer, is_unspecified_role,
};

/// What came back from the collaborator for one message.
#[derive(Debug)]
pub enum CollaboratorOutcome {
    /// Not configured, or not needed for this message.
    Disabled,
    Unavailable,
    Failed(AiError),
    Extracted(AiExtraction),
}

/// Which weak pattern results justify asking the collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiTriggers {
    pub low_confidence: bool,
    pub unknown_employer: bool,
    pub unclear_status: bool,
    /// Scores strictly below this count as low confidence.
    pub confidence_threshold: f64,
}

impl Default for AiTriggers {
    fn default() -> Self {
        Self {
            low_confidence: true,
            unknown_employer: true,
            unclear_status: true,
            confidence_threshold: 0.4,
        }
    }
}

pub fn should_consult(result: &ExtractionResult, triggers: AiTriggers) -> bool {
    (triggers.low_confidence && result.confidence_score < triggers.confidence_threshold)
        || (triggers.unknown_employer && !result.has_employer())
        || (triggers.unclear_status
            && result.status == Status::Applied
            && result.status_evidence_count < 2)
}

/// Asks the collaborator about `message`. Every failure is folded into the
/// returned outcome.
pub fn consult(provider: &dyn AIProvider, message: &Message) -> CollaboratorOutcome {
    if !provider.is_available() {
        debug!(model = provider.model_name(), "collaborator unavailable");
        return CollaboratorOutcome::Unavailable;
    }
    match ai_extract(provider, message) {
        Ok(extraction) => CollaboratorOutcome::Extracted(extraction),
        Err(AiError::Unavailable(_)) => CollaboratorOutcome::Unavailable,
        Err(e) => {
            warn!(message_id = %message.id, error = %e, "AI extraction failed, keeping pattern result");
            CollaboratorOutcome::Failed(e)
        }
    }
}

/// Merges a collaborator outcome into a pattern result.
///
/// Precedence per field:
/// - employer: a domain-derived name wins, then the collaborator's, then
///   whatever patterns found
/// - role: a pattern-derived title wins, then the collaborator's
/// - status: the pattern status stands when backed by two or more hits,
///   otherwise the collaborator's status is taken with one unit of evidence
///
/// Confidence is recomputed from the merged fields.
pub fn merge(pattern: ExtractionResult, outcome: CollaboratorOutcome) -> ExtractionResult {
    let mut merged = pattern;
    let ai = match outcome {
        CollaboratorOutcome::Disabled => {
            merged.extraction_method = ExtractionMethod::Pattern;
            return merged;
        }
        CollaboratorOutcome::Unavailable => {
            merged.extraction_method = ExtractionMethod::PatternOnly;
            return merged;
        }
        CollaboratorOutcome::Failed(_) => {
            merged.extraction_method = ExtractionMethod::AiFailed;
            return merged;
        }
        CollaboratorOutcome::Extracted(ai) => ai,
    };

    let keep_pattern_employer =
        merged.has_employer() && merged.employer_source == Some(FieldSource::Domain);
    let took_employer = !keep_pattern_employer && !is_unknown_employer(&ai.employer);
    if took_employer {
        merged.employer = ai.employer.trim().to_string();
        merged.employer_source = Some(FieldSource::Ai);
    }

    let took_role = !merged.has_role() && !is_unspecified_role(&ai.role);
    if took_role {
        merged.role = ai.role.trim().to_string();
        merged.role_source = Some(FieldSource::Ai);
    }

    let took_status = merged.status_evidence_count < 2;
    if took_status {
        merged.status = ai.status;
        merged.status_evidence_count = 1;
        merged.matched_patterns.clear();
    }

    merged.extraction_method = if took_employer && took_role && took_status {
        ExtractionMethod::Ai
    } else {
        ExtractionMethod::Hybrid
    };
    merged.rescore();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, ROLE_NOT_SPECIFIED, UNKNOWN_EMPLOYER};

    fn pattern_result() -> ExtractionResult {
        let mut r = ExtractionResult {
            message_id: "m1".to_string(),
            ..Default::default()
        };
        r.rescore();
        r
    }

    fn ai(employer: &str, role: &str, status: Status) -> CollaboratorOutcome {
        CollaboratorOutcome::Extracted(AiExtraction {
            employer: employer.to_string(),
            role: role.to_string(),
            status,
        })
    }

    #[test]
    fn test_non_extracted_outcomes_keep_pattern_fields() {
        let base = pattern_result();
        assert_eq!(merge(base.clone(), CollaboratorOutcome::Disabled).extraction_method, ExtractionMethod::Pattern);
        assert_eq!(
            merge(base.clone(), CollaboratorOutcome::Unavailable).extraction_method,
            ExtractionMethod::PatternOnly
        );
        let failed = merge(
            base.clone(),
            CollaboratorOutcome::Failed(AiError::Unavailable("test".to_string())),
        );
        assert_eq!(failed.extraction_method, ExtractionMethod::AiFailed);
        assert_eq!(failed.employer, base.employer);
        assert_eq!(failed.status, base.status);
    }

    #[test]
    fn test_empty_pattern_result_takes_everything() {
        let merged = merge(pattern_result(), ai("Globex", "Data Engineer", Status::Interviewing));
        assert_eq!(merged.employer, "Globex");
        assert_eq!(merged.employer_source, Some(FieldSource::Ai));
        assert_eq!(merged.role, "Data Engineer");
        assert_eq!(merged.status, Status::Interviewing);
        assert_eq!(merged.status_evidence_count, 1);
        assert_eq!(merged.extraction_method, ExtractionMethod::Ai);
        // 0.4 + 0.2 + 0.2
        assert_eq!(merged.confidence, Confidence::High);
        assert_eq!(merged.confidence_score, 0.8);
    }

    #[test]
    fn test_domain_employer_and_strong_status_are_kept() {
        let mut base = pattern_result();
        base.employer = "Acme".to_string();
        base.employer_source = Some(FieldSource::Domain);
        base.status = Status::Rejected;
        base.status_evidence_count = 3;
        base.rescore();

        let merged = merge(base, ai("Acme Holdings", ROLE_NOT_SPECIFIED, Status::Applied));
        assert_eq!(merged.employer, "Acme");
        assert_eq!(merged.employer_source, Some(FieldSource::Domain));
        assert_eq!(merged.status, Status::Rejected);
        assert_eq!(merged.status_evidence_count, 3);
        assert_eq!(merged.role, ROLE_NOT_SPECIFIED);
        assert_eq!(merged.extraction_method, ExtractionMethod::Hybrid);
    }

    #[test]
    fn test_subject_employer_yields_to_collaborator() {
        let mut base = pattern_result();
        base.employer = "Your Team".to_string();
        base.employer_source = Some(FieldSource::Subject);
        base.role = "Product Designer".to_string();
        base.role_source = Some(FieldSource::Body);

        let merged = merge(base, ai("Initech", "Designer", Status::Applied));
        assert_eq!(merged.employer, "Initech");
        assert_eq!(merged.role, "Product Designer");
        assert_eq!(merged.role_source, Some(FieldSource::Body));
        assert_eq!(merged.extraction_method, ExtractionMethod::Hybrid);
    }

    #[test]
    fn test_collaborator_placeholders_are_ignored() {
        let merged = merge(pattern_result(), ai(UNKNOWN_EMPLOYER, ROLE_NOT_SPECIFIED, Status::Offer));
        assert_eq!(merged.employer, UNKNOWN_EMPLOYER);
        assert_eq!(merged.employer_source, None);
        assert_eq!(merged.status, Status::Offer);
        assert_eq!(merged.extraction_method, ExtractionMethod::Hybrid);
    }

    #[test]
    fn test_should_consult_triggers() {
        let weak = pattern_result();
        assert!(should_consult(&weak, AiTriggers::default()));

        let mut strong = pattern_result();
        strong.employer = "Acme".to_string();
        strong.employer_source = Some(FieldSource::Domain);
        strong.status = Status::Interviewing;
        strong.status_evidence_count = 2;
        strong.rescore();
        assert!(!should_consult(&strong, AiTriggers::default()));

        let off = AiTriggers {
            low_confidence: false,
            unknown_employer: false,
            unclear_status: false,
            ..AiTriggers::default()
        };
        assert!(!should_consult(&weak, off));
        let only_employer = AiTriggers {
            unknown_employer: true,
            ..off
        };
        assert!(should_consult(&weak, only_employer));

        let strict = AiTriggers {
            low_confidence: true,
            confidence_threshold: 0.9,
            ..off
        };
        assert!(should_consult(&strong, strict));
    }

    struct Offline;

    impl AIProvider for Offline {
        fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, AiError> {
            Err(AiError::Unavailable("offline".to_string()))
        }
        fn is_available(&self) -> bool {
            false
        }
        fn model_name(&self) -> &str {
            "offline"
        }
    }

    #[test]
    fn test_consult_offline_provider_is_unavailable() {
        let message = Message::default();
        assert!(matches!(consult(&Offline, &message), CollaboratorOutcome::Unavailable));
    }
}

//! Decides whether a processed message can be discarded.
//!
//! Rules are checked in order and the first match wins. Anything no rule
//! explicitly clears for deletion is kept.

use crate::models::Status;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAFETY_KEYWORDS: &[&str] = &[
    // interview
    "interview", "phone screen", "video call", "video interview", "zoom call", "teams meeting",
    "google meet", "next steps", "schedule a call", "schedule call", "schedule a meeting",
    "schedule meeting", "speak with", "meet with", "meeting", "call with", "chat with",
    // assessment
    "assessment", "technical challenge", "coding challenge", "programming challenge", "take-home",
    "take home", "homework", "project", "assignment", "test", "exercise",
    // offer
    "offer", "job offer", "offer letter", "compensation", "salary", "benefits", "stock options",
    "equity", "sign-on bonus", "signing bonus", "relocation", "start date",
    // time-sensitive
    "urgent", "asap", "immediately", "deadline", "respond by", "reply by", "due date",
    "time-sensitive",
    // account and security
    "password", "account", "verify", "verification", "security", "two-factor", "2fa",
    "authenticate", "reset",
    // document requests
    "references", "background check", "documents", "upload", "submit", "provide", "send us",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionPolicy {
    pub delete_applied: bool,
    pub delete_rejected: bool,
    pub delete_interviewing: bool,
    pub delete_offer: bool,
    pub protect_starred: bool,
    pub protect_attachments: bool,
    pub protect_conflicts: bool,
    pub safety_keywords: Vec<String>,
}

impl Default for DeletionPolicy {
    fn default() -> Self {
        Self {
            delete_applied: true,
            delete_rejected: true,
            delete_interviewing: false,
            delete_offer: false,
            protect_starred: true,
            protect_attachments: false,
            protect_conflicts: true,
            safety_keywords: DEFAULT_SAFETY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionDecision {
    pub should_delete: bool,
    pub reason: String,
    pub matched_safety_keyword: Option<String>,
}

impl DeletionDecision {
    fn keep(reason: impl Into<String>) -> Self {
        Self {
            should_delete: false,
            reason: reason.into(),
            matched_safety_keyword: None,
        }
    }

    fn delete(reason: impl Into<String>) -> Self {
        Self {
            should_delete: true,
            reason: reason.into(),
            matched_safety_keyword: None,
        }
    }
}

/// First keyword (in list order) found in `text`, case-insensitively.
pub fn find_safety_keyword<'a>(text: &str, keywords: &'a [String]) -> Option<&'a str> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .map(String::as_str)
        .find(|keyword| !keyword.is_empty() && lower.contains(&keyword.to_lowercase()))
}

pub fn should_delete(
    status: Status,
    text: &str,
    is_conflict: bool,
    is_starred: bool,
    has_attachments: bool,
    policy: &DeletionPolicy,
) -> DeletionDecision {
    if status == Status::Interviewing && !policy.delete_interviewing {
        return DeletionDecision::keep("Status is Interviewing (always kept)");
    }
    if status == Status::Offer && !policy.delete_offer {
        return DeletionDecision::keep("Status is Offer (always kept)");
    }
    if is_conflict && policy.protect_conflicts {
        return DeletionDecision::keep("Email created status conflict (requires review)");
    }
    if is_starred && policy.protect_starred {
        return DeletionDecision::keep("Email is starred (protected)");
    }
    if has_attachments && policy.protect_attachments {
        return DeletionDecision::keep("Email has attachments (protected)");
    }
    if let Some(keyword) = find_safety_keyword(text, &policy.safety_keywords) {
        return DeletionDecision {
            should_delete: false,
            reason: format!("Contains safety keyword: '{keyword}'"),
            matched_safety_keyword: Some(keyword.to_string()),
        };
    }
    match status {
        Status::Applied if policy.delete_applied => {
            DeletionDecision::delete("Status is Applied (safe to delete)")
        }
        Status::Rejected if policy.delete_rejected => {
            DeletionDecision::delete("Status is Rejected (safe to delete)")
        }
        _ => DeletionDecision::keep(format!("Status is {status} (not configured for deletion)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "Thanks for applying. We received your application.";

    #[test]
    fn test_applied_without_keywords_is_deleted() {
        let decision = should_delete(Status::Applied, PLAIN, false, false, false, &DeletionPolicy::default());
        assert!(decision.should_delete);
        assert_eq!(decision.reason, "Status is Applied (safe to delete)");
        assert_eq!(decision.matched_safety_keyword, None);
    }

    #[test]
    fn test_rejected_is_deleted() {
        let decision = should_delete(
            Status::Rejected,
            "We went with other candidates.",
            false,
            false,
            false,
            &DeletionPolicy::default(),
        );
        assert!(decision.should_delete);
        assert_eq!(decision.reason, "Status is Rejected (safe to delete)");
    }

    #[test]
    fn test_safety_keyword_keeps_message() {
        let decision = should_delete(
            Status::Applied,
            "Please complete the coding challenge by Friday",
            false,
            false,
            false,
            &DeletionPolicy::default(),
        );
        assert!(!decision.should_delete);
        assert_eq!(decision.matched_safety_keyword.as_deref(), Some("coding challenge"));
        assert_eq!(decision.reason, "Contains safety keyword: 'coding challenge'");
    }

    #[test]
    fn test_rule_order() {
        let policy = DeletionPolicy::default();
        let d = should_delete(Status::Applied, "interview", true, true, false, &policy);
        assert_eq!(d.reason, "Email created status conflict (requires review)");

        let d = should_delete(Status::Applied, "interview", false, true, false, &policy);
        assert_eq!(d.reason, "Email is starred (protected)");

        let d = should_delete(Status::Applied, PLAIN, false, false, true, &policy);
        assert!(d.should_delete, "attachments are not protected by default");

        let policy = DeletionPolicy {
            protect_attachments: true,
            ..DeletionPolicy::default()
        };
        let d = should_delete(Status::Applied, PLAIN, false, false, true, &policy);
        assert_eq!(d.reason, "Email has attachments (protected)");
    }

    #[test]
    fn test_disabled_status_switch_keeps() {
        let policy = DeletionPolicy {
            delete_applied: false,
            ..DeletionPolicy::default()
        };
        let d = should_delete(Status::Applied, PLAIN, false, false, false, &policy);
        assert!(!d.should_delete);
        assert_eq!(d.reason, "Status is Applied (not configured for deletion)");
    }

    #[test]
    fn test_opted_in_offer_can_be_deleted_only_when_clean() {
        let policy = DeletionPolicy {
            delete_offer: true,
            ..DeletionPolicy::default()
        };
        // Offer is not in the deletable set even when no longer always kept.
        let d = should_delete(Status::Offer, PLAIN, false, false, false, &policy);
        assert!(!d.should_delete);
        assert_eq!(d.reason, "Status is Offer (not configured for deletion)");
    }

    #[test]
    fn test_default_policy_never_deletes_protected_statuses() {
        let policy = DeletionPolicy::default();
        for status in [Status::Interviewing, Status::Offer] {
            for flags in 0..8u8 {
                let d = should_delete(
                    status,
                    PLAIN,
                    flags & 1 != 0,
                    flags & 2 != 0,
                    flags & 4 != 0,
                    &policy,
                );
                assert!(!d.should_delete, "{status} with flags {flags}");
            }
        }
    }

    #[test]
    fn test_custom_keywords_replace_defaults() {
        let policy = DeletionPolicy {
            safety_keywords: vec!["Visa".to_string()],
            ..DeletionPolicy::default()
        };
        let d = should_delete(Status::Applied, "visa sponsorship details", false, false, false, &policy);
        assert_eq!(d.matched_safety_keyword.as_deref(), Some("Visa"));

        let d = should_delete(Status::Applied, "schedule an interview", false, false, false, &policy);
        assert!(d.should_delete);
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: DeletionPolicy = toml::from_str("delete_rejected = false").unwrap();
        assert!(!policy.delete_rejected);
        assert!(policy.delete_applied);
        assert!(!policy.safety_keywords.is_empty());
    }
}

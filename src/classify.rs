//! Status classification by pattern evidence.

use crate::models::Status;
use crate::patterns::{self, STATUS_CHECK_ORDER};
use serde::Serialize;

/// Lowest to highest precedence when hit counts tie.
const TIE_BREAK_ORDER: [Status; 4] = [
    Status::Applied,
    Status::Interviewing,
    Status::Offer,
    Status::Rejected,
];

/// `(preferred, other)`, applied in order after the count: when both have
/// hits and `preferred` has at least as many, `preferred` becomes the
/// winner whatever won the count.
const PREFERENCES: [(Status, Status); 2] = [
    (Status::Offer, Status::Rejected),
    (Status::Interviewing, Status::Applied),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub status: Status,
    pub evidence_count: usize,
    pub matched_patterns: Vec<String>,
}

#[derive(Debug, Default)]
struct Tally {
    hits: [Vec<String>; 4],
}

impl Tally {
    fn slot(status: Status) -> usize {
        match status {
            Status::Applied => 0,
            Status::Interviewing => 1,
            Status::Rejected => 2,
            Status::Offer => 3,
        }
    }

    fn count(&self, status: Status) -> usize {
        self.hits[Self::slot(status)].len()
    }

    fn record(&mut self, status: Status, pattern: &str) {
        self.hits[Self::slot(status)].push(pattern.to_string());
    }

    fn verdict(mut self, status: Status) -> Classification {
        let matched_patterns = std::mem::take(&mut self.hits[Self::slot(status)]);
        Classification {
            status,
            evidence_count: matched_patterns.len(),
            matched_patterns,
        }
    }
}

/// Classifies a message into a lifecycle status.
///
/// Every status pattern set is scored against the lowercased subject and
/// body. A strong rejection phrase settles the message as Rejected unless the
/// offer evidence is at least as strong. Otherwise the highest count wins,
/// ties go to the later entry of `TIE_BREAK_ORDER`, and each of
/// `PREFERENCES` may then replace the winner. A later preference overrides an
/// earlier one, so Interviewing over Applied has the last word. No hits at all means Applied with zero evidence.
///
/// The returned evidence count is always the chosen status's own hit count.
pub fn classify(subject: &str, body: &str) -> Classification {
    let text = format!("{subject} {body}").to_lowercase();
    let library = patterns::library();

    let mut tally = Tally::default();
    for status in STATUS_CHECK_ORDER {
        for re in library.status_patterns(status) {
            if re.is_match(&text) {
                tally.record(status, re.as_str());
            }
        }
    }

    let strong_rejection = library.strong_rejection.iter().any(|re| re.is_match(&text));
    let offers = tally.count(Status::Offer);
    let rejections = tally.count(Status::Rejected);
    if strong_rejection && rejections > 0 && !(offers > 0 && offers >= rejections) {
        return tally.verdict(Status::Rejected);
    }

    let mut best: Option<Status> = None;
    for status in TIE_BREAK_ORDER {
        let count = tally.count(status);
        if count == 0 {
            continue;
        }
        if best.is_none_or(|current| count >= tally.count(current)) {
            best = Some(status);
        }
    }

    let Some(mut best) = best else {
        return Classification {
            status: Status::Applied,
            evidence_count: 0,
            matched_patterns: Vec::new(),
        };
    };

    for (preferred, other) in PREFERENCES {
        let preferred_hits = tally.count(preferred);
        let other_hits = tally.count(other);
        if preferred_hits > 0 && other_hits > 0 && preferred_hits >= other_hits {
            best = preferred;
        }
    }

    tally.verdict(best)
}

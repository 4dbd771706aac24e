//! Confidence scoring for extraction results.

use crate::models::{Confidence, ExtractionResult, FieldSource};

// Weights are kept in hundredths so threshold comparisons stay exact.
const EMPLOYER_POINTS: u32 = 40;
const DOMAIN_BONUS_POINTS: u32 = 10;
const ROLE_POINTS: u32 = 20;
const HIGH_POINTS: u32 = 70;
const MEDIUM_POINTS: u32 = 40;
const MAX_POINTS: u32 = 100;

fn evidence_points(count: usize) -> u32 {
    match count {
        0 => 0,
        1 => 20,
        2 => 30,
        _ => 40,
    }
}

/// Scores an extraction from field completeness and status evidence.
pub fn estimate(result: &ExtractionResult) -> (Confidence, f64) {
    let mut points = 0;
    if result.has_employer() {
        points += EMPLOYER_POINTS;
        if result.employer_source == Some(FieldSource::Domain) {
            points += DOMAIN_BONUS_POINTS;
        }
    }
    if result.has_role() {
        points += ROLE_POINTS;
    }
    points = (points + evidence_points(result.status_evidence_count)).min(MAX_POINTS);

    let level = if points >= HIGH_POINTS {
        Confidence::High
    } else if points >= MEDIUM_POINTS {
        Confidence::Medium
    } else {
        Confidence::Low
    };
    (level, f64::from(points) / 100.0)
}

impl ExtractionResult {
    /// Recomputes `confidence` and `confidence_score` from the current fields.
    pub fn rescore(&mut self) {
        let (level, score) = estimate(self);
        self.confidence = level;
        self.confidence_score = score;
    }
}

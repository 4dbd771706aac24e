//! Employer and role extraction.
//!
//! Each field is resolved by a cascade: the sender domain is trusted most,
//! then the subject, then a leading window of the body.

use crate::models::{FieldSource, Message, ROLE_NOT_SPECIFIED, UNKNOWN_EMPLOYER};
use crate::patterns::{
    self, BODY_GENERIC_PHRASES, GENERIC_SUBDOMAINS, Ruleset, SUBJECT_GENERIC_PHRASES, cleanup,
    has_role_keyword, is_generic_provider, title_case,
};
use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_BODY_WINDOW: usize = 500;

static SENDER_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\w.-]+@([\w.-]+)").expect("sender domain pattern is valid")
});

const EMPLOYER_LEN: std::ops::RangeInclusive<usize> = 2..=50;
const ROLE_LEN: std::ops::RangeInclusive<usize> = 5..=60;

/// Company name from the sender address, e.g. `jobs@acme.com` -> `Acme`.
/// Returns `None` for personal mail, ATS relays and bulk senders.
pub fn employer_from_domain(sender: &str) -> Option<String> {
    let caps = SENDER_DOMAIN.captures(sender)?;
    let domain = caps[1].to_lowercase();
    let labels: Vec<&str> = domain.split('.').collect();

    let mut company = None;
    for label in labels.iter().take(labels.len().saturating_sub(1)) {
        if GENERIC_SUBDOMAINS.contains(label) {
            continue;
        }
        if is_generic_provider(label) {
            return None;
        }
        company = Some(*label);
        break;
    }

    if company.is_none() && labels.len() >= 2 {
        let candidate = labels[labels.len() - 2];
        if !is_generic_provider(candidate) {
            company = Some(candidate);
        }
    }

    let mut name = company?.replace(['-', '_'], " ");
    for suffix in &patterns::library().domain_suffixes {
        name = suffix.replace_all(&name, "").into_owned();
    }
    let name = title_case(&name.split_whitespace().collect::<Vec<_>>().join(" "));

    (name.chars().count() >= 2).then_some(name)
}

fn accept_employer(raw: &str, generic_phrases: &[&str]) -> Option<String> {
    let name = cleanup(raw, Ruleset::Employer);
    if !EMPLOYER_LEN.contains(&name.chars().count()) {
        return None;
    }
    if generic_phrases.contains(&name.to_lowercase().as_str()) {
        return None;
    }
    Some(title_case(&name))
}

fn first_capture(
    patterns: &[Regex],
    text: &str,
    accept: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(text)?;
        accept(caps.get(1)?.as_str())
    })
}

pub fn employer_from_subject(subject: &str) -> Option<String> {
    first_capture(&patterns::library().subject_employer, subject, |raw| {
        accept_employer(raw, SUBJECT_GENERIC_PHRASES)
    })
}

pub fn employer_from_body(body: &str, window: usize) -> Option<String> {
    let head = leading_window(body, window);
    first_capture(&patterns::library().body_employer, &head, |raw| {
        accept_employer(raw, BODY_GENERIC_PHRASES)
    })
}

pub fn extract_employer(message: &Message) -> (String, Option<FieldSource>) {
    extract_employer_within(message, DEFAULT_BODY_WINDOW)
}

/// Same cascade as [`extract_employer`] with an explicit body window.
pub fn extract_employer_within(message: &Message, window: usize) -> (String, Option<FieldSource>) {
    extract_employer_from(&message.sender, &message.subject, &message.text_body(), window)
}

/// The employer cascade over already-reduced body text.
pub fn extract_employer_from(
    sender: &str,
    subject: &str,
    body: &str,
    window: usize,
) -> (String, Option<FieldSource>) {
    if let Some(name) = employer_from_domain(sender) {
        return (name, Some(FieldSource::Domain));
    }
    if let Some(name) = employer_from_subject(subject) {
        return (name, Some(FieldSource::Subject));
    }
    if let Some(name) = employer_from_body(body, window) {
        return (name, Some(FieldSource::Body));
    }
    (UNKNOWN_EMPLOYER.to_string(), None)
}

fn accept_role(raw: &str) -> Option<String> {
    let title = cleanup(raw, Ruleset::Role);
    if !ROLE_LEN.contains(&title.chars().count()) || !has_role_keyword(&title) {
        return None;
    }
    Some(title)
}

pub fn role_from_subject(subject: &str) -> Option<String> {
    first_capture(&patterns::library().subject_role, subject, |raw| {
        let title = accept_role(raw)?;
        Some(title_case(strip_employer_suffix(&title)))
    })
}

pub fn role_from_body(body: &str, window: usize) -> Option<String> {
    let head = leading_window(body, window);
    first_capture(&patterns::library().body_role, &head, |raw| {
        accept_role(raw).map(|title| title_case(&title))
    })
}

pub fn extract_role(subject: &str, body: &str) -> (String, Option<FieldSource>) {
    extract_role_within(subject, body, DEFAULT_BODY_WINDOW)
}

pub fn extract_role_within(subject: &str, body: &str, window: usize) -> (String, Option<FieldSource>) {
    if let Some(title) = role_from_subject(subject) {
        return (title, Some(FieldSource::Subject));
    }
    if let Some(title) = role_from_body(body, window) {
        return (title, Some(FieldSource::Body));
    }
    (ROLE_NOT_SPECIFIED.to_string(), None)
}

/// "Backend Engineer at Acme" -> "Backend Engineer"
fn strip_employer_suffix(title: &str) -> &str {
    match title.to_ascii_lowercase().find(" at ") {
        Some(idx) if idx > 0 => title[..idx].trim(),
        _ => title,
    }
}

fn leading_window(text: &str, window: usize) -> String {
    text.chars().take(window).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, subject: &str, body: &str) -> Message {
        Message {
            id: "m1".to_string(),
            sender: sender.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_employer_from_domain() {
        assert_eq!(employer_from_domain("recruiting@acme.com"), Some("Acme".to_string()));
        assert_eq!(employer_from_domain("jobs@techcorp.com"), Some("Techcorp".to_string()));
        assert_eq!(
            employer_from_domain("Jane Doe <jane@careers.perplexity.ai>"),
            Some("Perplexity".to_string())
        );
    }

    #[test]
    fn test_employer_from_domain_formats_separators() {
        assert_eq!(
            employer_from_domain("hr@blue-origin.com"),
            Some("Blue Origin".to_string())
        );
        assert_eq!(employer_from_domain("talent@tech-corp.com"), Some("Tech".to_string()));
        assert_eq!(employer_from_domain("x@acme_labs.io"), Some("Acme Labs".to_string()));
    }

    #[test]
    fn test_employer_from_domain_rejects_generic() {
        assert_eq!(employer_from_domain("noreply@greenhouse.io"), None);
        assert_eq!(employer_from_domain("someone@gmail.com"), None);
        assert_eq!(employer_from_domain("not an address"), None);
        assert_eq!(employer_from_domain("x@localhost"), None);
    }

    #[test]
    fn test_employer_from_subject() {
        assert_eq!(
            employer_from_subject("Thank you for applying to Globex!"),
            Some("Globex".to_string())
        );
        assert_eq!(
            employer_from_subject("Application Received | Initech"),
            Some("Initech".to_string())
        );
        assert_eq!(
            employer_from_subject("Your application to The Hooli Corporation"),
            Some("Hooli".to_string())
        );
    }

    #[test]
    fn test_employer_from_subject_skips_generic_phrases() {
        // "Thank you" is captured by the leading "X - application" form and rejected.
        assert_eq!(employer_from_subject("Thank you - Application"), None);
        assert_eq!(employer_from_subject("Follow up: next steps"), None);
    }

    #[test]
    fn test_employer_from_body() {
        assert_eq!(
            employer_from_body("Thanks for your interest in Umbrella Health. We'll be in touch.", 500),
            Some("Umbrella Health".to_string())
        );
        assert_eq!(
            employer_from_body("Best,\nThe Wayne Enterprises Recruiting Team", 500),
            Some("Wayne Enterprises".to_string())
        );
    }

    #[test]
    fn test_employer_from_body_respects_window() {
        let body = format!("{}Thanks for your interest in Umbrella Health.", " ".repeat(600));
        assert_eq!(employer_from_body(&body, 500), None);
        assert_eq!(employer_from_body(&body, 1000), Some("Umbrella Health".to_string()));
    }

    #[test]
    fn test_extract_employer_cascade() {
        let msg = message(
            "recruiting@acme.com",
            "Thank you for applying to Acme!",
            "We've received your application",
        );
        assert_eq!(extract_employer(&msg), ("Acme".to_string(), Some(FieldSource::Domain)));

        let msg = message("noreply@greenhouse.io", "Thank you for applying to Globex!", "");
        assert_eq!(extract_employer(&msg), ("Globex".to_string(), Some(FieldSource::Subject)));
    }

    #[test]
    fn test_extract_employer_from_reduced_body() {
        let msg = message(
            "noreply@greenhouse.io",
            "Hello",
            "<html><body><p>Thanks for your interest in Umbrella Health.</p></body></html>",
        );
        let body = msg.text_body();
        let expected = ("Umbrella Health".to_string(), Some(FieldSource::Body));
        assert_eq!(extract_employer_from(&msg.sender, &msg.subject, &body, 500), expected);
        assert_eq!(extract_employer_within(&msg, 500), expected);
    }

    #[test]
    fn test_extract_employer_unknown_for_ats_sender() {
        let msg = message(
            "noreply@greenhouse.io",
            "Thank you",
            "We have received your materials and will reply soon",
        );
        let (name, source) = extract_employer(&msg);
        assert_eq!(name, UNKNOWN_EMPLOYER);
        assert_eq!(source, None);
    }

    #[test]
    fn test_role_from_subject() {
        assert_eq!(
            role_from_subject("Application for Senior Backend Engineer - Acme"),
            Some("Senior Backend Engineer".to_string())
        );
        assert_eq!(
            role_from_subject("Your Data Analyst application"),
            Some("Data Analyst".to_string())
        );
        assert_eq!(role_from_subject("Your application"), None);
    }

    #[test]
    fn test_role_from_subject_strips_employer() {
        assert_eq!(
            role_from_subject("Your Platform Engineer at Acme application"),
            Some("Platform Engineer".to_string())
        );
    }

    #[test]
    fn test_role_requires_keyword_and_length() {
        assert_eq!(role_from_body("Thanks for applying for the Barista position.", 500), None);
        assert_eq!(
            role_from_body("Thanks for applying for the Product Designer role.", 500),
            Some("Product Designer".to_string())
        );
    }

    #[test]
    fn test_extract_role_falls_back() {
        assert_eq!(
            extract_role("Hello", "Nothing relevant here."),
            (ROLE_NOT_SPECIFIED.to_string(), None)
        );
        let (title, source) = extract_role("Update", "We reviewed your application for the ML Engineer position.");
        assert_eq!(title, "Ml Engineer");
        assert_eq!(source, Some(FieldSource::Body));
    }
}

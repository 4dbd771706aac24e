//! Compiled pattern tables shared by the extractor and classifier.
//!
//! Everything here is built once on first use and read-only afterwards.

use crate::models::Status;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use tracing::warn;

/// Mail relays, personal providers and ATS platforms. A sender domain whose
/// company label is one of these says nothing about the employer.
pub const GENERIC_PROVIDERS: &[&str] = &[
    // personal mail
    "gmail", "yahoo", "outlook", "hotmail", "icloud", "aol", "protonmail", "zoho", "mail", "live",
    "msn",
    // applicant tracking / HR platforms
    "greenhouse", "lever", "workday", "myworkdayjobs", "icims", "taleo", "jobvite",
    "smartrecruiters", "applicantstack", "bamboohr", "workable", "ashbyhq", "breezy", "jazz",
    "recruiterbox", "resumator", "newton", "pinpointhq", "recruitee", "comeet", "fountain",
    "rippling", "gusto", "deel", "namely", "paychex", "adp", "paylocity", "paycom", "ultipro",
    "successfactors", "cornerstone", "ceridian", "kronos",
    // bulk senders
    "noreply", "no-reply", "donotreply", "notifications", "mailer", "sendgrid", "mailchimp",
    "mailgun", "amazonses", "postmark", "sparkpost",
];

/// Subdomain labels skipped while looking for the company label.
pub const GENERIC_SUBDOMAINS: &[&str] = &[
    "www", "mail", "email", "jobs", "careers", "recruiting", "apply", "hr",
];

/// Subject captures that look like a company but are boilerplate.
pub const SUBJECT_GENERIC_PHRASES: &[&str] = &[
    "your application",
    "application received",
    "thank you",
    "application update",
    "important information",
    "follow up",
];

pub const BODY_GENERIC_PHRASES: &[&str] = &[
    "us",
    "our team",
    "the team",
    "our company",
    "this position",
    "the role",
    "your application",
];

/// A role candidate must contain one of these (substring match).
pub const ROLE_KEYWORDS: &[&str] = &[
    "engineer", "developer", "manager", "designer", "analyst", "scientist", "architect",
    "specialist", "consultant", "administrator", "admin", "lead", "director", "coordinator",
    "associate", "intern", "backend", "frontend", "full stack", "fullstack", "full-stack",
    "senior", "junior", "staff", "principal", "devops", "sre", "data", "product", "software",
    "qa", "test", "security", "cloud", "platform", "infrastructure", "mobile", "ios", "android",
    "web", "ml", "machine learning", "ai", "artificial intelligence",
];

/// Order in which status pattern sets are evaluated.
pub const STATUS_CHECK_ORDER: [Status; 4] = [
    Status::Rejected,
    Status::Offer,
    Status::Interviewing,
    Status::Applied,
];

const SUBJECT_EMPLOYER: &[&str] = &[
    r"application to ([^-|\n]+?)(?:\s*[-|]|$)",
    r"your application at ([^-|\n]+?)(?:\s*[-|]|$)",
    r"^([^-|]+?)\s*[-|]\s*application",
    r"applying to ([^-|!\n]+?)(?:\s*[-|!]|$)",
    r"your application to ([^-|!\n]+?)(?:\s*[-|!]|$)",
    r"^([^:]+?):\s*\w",
    r"(?:update|thanks) from ([^-|\n]+?)(?:\s*[-|]|$)",
    r"was sent to ([^-|\n]+?)(?:\s*[-|]|$)",
    r"application at ([^-|\n]+?)(?:\s*[-|]|$)",
    r"\|\s*([^|\n]+?)$",
    r"^([^-|]+?)\s+application\b",
];

const BODY_EMPLOYER: &[&str] = &[
    r"interest in ([^.\n,]+?)(?:[.,]|$)",
    r"welcome to ([^']+?)'s",
    r"applied to ([^.\n,]+?)(?:\s+for|[.,]|$)",
    r"([^.\n,]+?)\s+recruiting team",
    r"\bat ([^.\n,]+?)(?:[.,]|$)",
    r"applying to ([^.\n,!]+?)(?:[.,!]|$)",
    r"role at ([^.\n,]+?)(?:[.,]|$)",
    r"position at ([^.\n,]+?)(?:[.,]|$)",
    r"job at ([^.\n,]+?)(?:[.,]|$)",
    r"on behalf of ([^.\n,]+?)(?:[.,]|$)",
    r"here at ([^.\n,]+?)(?:[.,]|$)",
    r"team at ([^.\n,]+?)(?:[.,]|$)",
];

const SUBJECT_ROLE: &[&str] = &[
    r"application for\s+(?:the\s+)?([^-|\n]+?)(?:\s*[-|]|\s+at\s+|$)",
    r"applied for\s+(?:the\s+)?([^-|\n]+?)\s+at",
    r"^([^-]+?)\s*-\s*application",
    r"your\s+([^-|\n]+?)\s+application",
];

const BODY_ROLE: &[&str] = &[
    r"for the ([^.\n]+?) (?:position|role)",
    r"applied to our ([^.\n]+?) (?:position|role)",
    r"interest in (?:the )?([^.\n]+?)(?:\s+position|\s+role|[.,])",
    r"application for (?:the )?([^.\n]+?)(?:\s+position|\s+role|[.,])",
    r"application for (?:the )?([^.\n]+?)(?:\s+and|\s+at|[.,])",
    concat!(
        r"((?:senior|junior|staff|principal|lead|sr\.?|jr\.?)?\s*",
        r"(?:software|backend|frontend|full[-\s]?stack|devops|data|ml|ai|cloud|platform|infrastructure|site reliability|sre|mobile|ios|android|web|qa|test|security)?\s*",
        r"(?:engineer|developer|scientist|analyst|manager|designer|architect|specialist|consultant|administrator|admin|lead|director))",
    ),
];

const REJECTED: &[&str] = &[
    r"not moving forward",
    r"won'?t be advancing",
    r"will not be moving forward",
    r"not move forward",
    r"made the decision to not move forward",
    r"we are not moving forward",
    r"decided to move forward with other candidates",
    r"decided to pursue (?:other|different) candidates",
    r"position has been filled",
    r"role has been filled",
    r"no longer considering",
    r"not selected",
    r"not been selected",
    r"not a fit",
    r"not the right fit",
    r"after (?:careful )?consideration.*not",
    r"unfortunately.*(?:not|won't|will not)",
    r"unfortunately, we will not",
    r"unfortunately, we are not",
    r"regret to inform",
    r"sorry to inform",
    r"wish you (?:well|success|the best) (?:in|on|with) your (?:search|job search|future)",
    r"best of luck (?:in|on|with) your (?:search|job search|future)",
    r"success in your job search",
    r"good luck (?:in|on|with) your (?:search|job search)",
    r"we appreciate your (?:time|interest|application)",
    r"(?:keep|stay) in touch",
    r"reach out.*in the future",
    r"future opportunities",
    r"watch our (?:career|careers) page",
    r"encourage you to (?:watch|check|apply)",
    r"when a position opens up",
    r"consider you for future",
    r"overwhelming response",
    r"high volume of applications",
    r"many (?:exceptional|qualified|strong) (?:applications|candidates)",
    r"other candidates",
    r"moved forward with other",
    r"pursuing other candidates",
];

const OFFER: &[&str] = &[
    r"pleased to offer",
    r"(?:we are |we're )?excited to offer",
    r"(?:we would |we'd )?like to offer",
    r"delighted to offer",
    r"happy to offer",
    r"thrilled to offer",
    r"job offer",
    r"offer letter",
    r"offer of employment",
    r"extend(?:ing)? (?:an |a )?offer",
    r"formal offer",
    r"official offer",
    r"congratulations.*(?:position|role|job|offer)",
    r"welcome to (?:the )?team",
    r"welcome aboard",
    r"accept (?:your|this|the) offer",
    r"(?:please )?sign (?:the|this|your) offer",
    r"compensation package",
    r"salary of",
    r"annual salary",
    r"base salary",
    r"starting salary",
    r"start date",
    r"your start date",
    r"onboarding",
    r"first day",
    r"benefits package",
    r"equity grant",
    r"stock options",
    r"signing bonus",
    r"sign-on bonus",
    r"relocation (?:package|assistance|bonus)",
];

const INTERVIEWING: &[&str] = &[
    r"\binterview\b",
    r"phone screen",
    r"video (?:call|interview|chat)",
    r"zoom (?:call|meeting|interview)",
    r"teams (?:call|meeting|interview)",
    r"google meet",
    r"virtual interview",
    r"in-person interview",
    r"on-?site (?:interview|visit)",
    r"final round",
    r"next round",
    r"second round",
    r"technical round",
    r"next steps",
    r"schedule (?:a )?(?:call|meeting|time|interview)",
    r"speak with",
    r"meet with(?: our| the)? team",
    r"meeting with",
    r"chat with",
    r"connect with",
    r"would like to (?:meet|speak|talk|chat)",
    r"invite you to",
    r"like to invite",
    r"(?:technical|coding) (?:assessment|challenge|test|exercise)",
    r"take-?home (?:assignment|project|exercise|test)",
    r"homework assignment",
    r"coding (?:exercise|project|challenge)",
    r"skills assessment",
    r"assessment test",
    r"hiring manager",
    r"recruiter",
    r"talent (?:team|acquisition)",
    r"engineering (?:team|manager|lead)",
    r"your availability",
    r"available (?:to|for)",
    r"please (?:provide|share|send) your availability",
    r"book (?:a )?time",
    r"pick a time",
    r"calendly",
];

const APPLIED: &[&str] = &[
    r"thank you for (?:your )?(?:applying|application|interest)",
    r"thanks for applying",
    r"we.*received your application",
    r"(?:we )?received your application",
    r"application (?:has been )?(?:received|was sent|submitted)",
    r"confirm(?:ing)? (?:receipt of )?(?:your )?application",
    r"your application was sent",
    r"successfully (?:submitted|applied|received)",
    r"we will (?:review|be in touch)",
    r"our team will review",
    r"we are committed to reviewing",
    r"excited to review your application",
    r"application is (?:being|under) review",
    r"currently reviewing",
    r"reviewing (?:all |your )?application",
    r"review your (?:application|background|qualifications)",
    r"delighted that you would consider",
    r"thank you for taking the time",
    r"appreciate your interest",
    r"glad you(?:'re| are) interested",
    r"application (?:status|update)",
    r"status of your application",
    r"keep you (?:updated|informed|posted)",
    r"you will hear from us",
    r"we'll be in touch",
    r"if.*qualifications match",
    r"if.*good (?:fit|match)",
];

/// Phrases that settle a message as a rejection even when it also mentions
/// an interview.
const STRONG_REJECTION: &[&str] = &[
    r"not moving forward",
    r"won'?t be advancing",
    r"will not be moving forward",
    r"not move forward",
    r"unfortunately.*not",
    r"decided to not move forward",
    r"we are not moving forward",
    r"wish you.*success.*job search",
    r"best of luck.*job search",
];

const DOMAIN_SUFFIX: &str = r"\b(?:corp|inc|llc|ltd|co)\b";

const EMPLOYER_CLEANUP: &[(&str, &str)] = &[
    (r"\b(?:corp|inc|llc|ltd|co|company|corporation|incorporated)\.?\s*$", ""),
    (r"^the\s+", ""),
    (r"[.,!?;:]+$", ""),
    (r#"^["']|["']$"#, ""),
    (r"\s+", " "),
];

const ROLE_CLEANUP: &[(&str, &str)] = &[
    (r"^(?:a|an|the)\s+", ""),
    (r"[.,!?;:]+$", ""),
    (r"\s+", " "),
    (r"\s*\([^)]*\)\s*$", ""),
];

pub struct CleanupRule {
    pattern: Regex,
    replacement: &'static str,
}

/// Which ordered cleanup chain to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ruleset {
    Employer,
    Role,
}

pub struct PatternLibrary {
    pub subject_employer: Vec<Regex>,
    pub body_employer: Vec<Regex>,
    pub subject_role: Vec<Regex>,
    pub body_role: Vec<Regex>,
    pub rejected: Vec<Regex>,
    pub offer: Vec<Regex>,
    pub interviewing: Vec<Regex>,
    pub applied: Vec<Regex>,
    pub strong_rejection: Vec<Regex>,
    pub domain_suffixes: Vec<Regex>,
    employer_cleanup: Vec<CleanupRule>,
    role_cleanup: Vec<CleanupRule>,
}

impl PatternLibrary {
    fn build() -> Self {
        Self {
            subject_employer: compile(SUBJECT_EMPLOYER),
            body_employer: compile(BODY_EMPLOYER),
            subject_role: compile(SUBJECT_ROLE),
            body_role: compile(BODY_ROLE),
            rejected: compile(REJECTED),
            offer: compile(OFFER),
            interviewing: compile(INTERVIEWING),
            applied: compile(APPLIED),
            strong_rejection: compile(STRONG_REJECTION),
            domain_suffixes: compile(&[DOMAIN_SUFFIX]),
            employer_cleanup: compile_rules(EMPLOYER_CLEANUP),
            role_cleanup: compile_rules(ROLE_CLEANUP),
        }
    }

    pub fn status_patterns(&self, status: Status) -> &[Regex] {
        match status {
            Status::Rejected => &self.rejected,
            Status::Offer => &self.offer,
            Status::Interviewing => &self.interviewing,
            Status::Applied => &self.applied,
        }
    }

    fn rules(&self, ruleset: Ruleset) -> &[CleanupRule] {
        match ruleset {
            Ruleset::Employer => &self.employer_cleanup,
            Ruleset::Role => &self.role_cleanup,
        }
    }
}

static LIBRARY: LazyLock<PatternLibrary> = LazyLock::new(PatternLibrary::build);

pub fn library() -> &'static PatternLibrary {
    &LIBRARY
}

fn build_regex(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "skipping invalid pattern");
            None
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| build_regex(p)).collect()
}

fn compile_rules(rules: &[(&str, &'static str)]) -> Vec<CleanupRule> {
    rules
        .iter()
        .filter_map(|(pattern, replacement)| {
            build_regex(pattern).map(|pattern| CleanupRule {
                pattern,
                replacement: *replacement,
            })
        })
        .collect()
}

/// Runs the ordered cleanup chain for a field over `text`.
pub fn cleanup(text: &str, ruleset: Ruleset) -> String {
    let mut cleaned = text.trim().to_string();
    for rule in library().rules(ruleset) {
        cleaned = rule
            .pattern
            .replace_all(&cleaned, rule.replacement)
            .into_owned();
    }
    cleaned.trim().to_string()
}

pub fn is_generic_provider(label: &str) -> bool {
    let label = label.to_lowercase();
    GENERIC_PROVIDERS.contains(&label.as_str())
}

pub fn has_role_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    ROLE_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Capitalises the first letter of every alphabetic run, lowercases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        let lib = library();
        assert_eq!(lib.subject_employer.len(), SUBJECT_EMPLOYER.len());
        assert_eq!(lib.body_employer.len(), BODY_EMPLOYER.len());
        assert_eq!(lib.subject_role.len(), SUBJECT_ROLE.len());
        assert_eq!(lib.body_role.len(), BODY_ROLE.len());
        assert_eq!(lib.rejected.len(), REJECTED.len());
        assert_eq!(lib.offer.len(), OFFER.len());
        assert_eq!(lib.interviewing.len(), INTERVIEWING.len());
        assert_eq!(lib.applied.len(), APPLIED.len());
        assert_eq!(lib.strong_rejection.len(), STRONG_REJECTION.len());
        assert_eq!(lib.employer_cleanup.len(), EMPLOYER_CLEANUP.len());
        assert_eq!(lib.role_cleanup.len(), ROLE_CLEANUP.len());
    }

    #[test]
    fn test_status_patterns_are_case_insensitive() {
        let lib = library();
        assert!(lib.offer.iter().any(|re| re.is_match("OFFER LETTER attached")));
        assert!(lib.interviewing.iter().any(|re| re.is_match("Phone Screen")));
    }

    #[test]
    fn test_employer_cleanup_chain() {
        assert_eq!(cleanup("The Acme Corp.", Ruleset::Employer), "Acme");
        assert_eq!(cleanup("  Globex   Inc ", Ruleset::Employer), "Globex");
        assert_eq!(cleanup("\"Initech\"", Ruleset::Employer), "Initech");
        assert_eq!(cleanup("Hooli   Labs!!", Ruleset::Employer), "Hooli Labs");
    }

    #[test]
    fn test_role_cleanup_chain() {
        assert_eq!(cleanup("a Senior Engineer.", Ruleset::Role), "Senior Engineer");
        assert_eq!(
            cleanup("Data Analyst (Remote, US)", Ruleset::Role),
            "Data Analyst"
        );
        assert_eq!(cleanup("the   Product  Designer", Ruleset::Role), "Product Designer");
    }

    #[test]
    fn test_generic_provider_lookup() {
        assert!(is_generic_provider("greenhouse"));
        assert!(is_generic_provider("Gmail"));
        assert!(!is_generic_provider("acme"));
    }

    #[test]
    fn test_role_keyword_lookup() {
        assert!(has_role_keyword("Staff Software Engineer"));
        assert!(has_role_keyword("Machine Learning Researcher"));
        assert!(!has_role_keyword("Barista"));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("acme robotics"), "Acme Robotics");
        assert_eq!(title_case("SENIOR data-engineer"), "Senior Data-Engineer");
        assert_eq!(title_case("r2d2 labs"), "R2D2 Labs");
    }
}

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::models::{JobRecord, Source};

/// Longest role kept when the subject matches no split pattern.
pub const MAX_ROLE_CHARS: usize = 120;

/// Brand tokens per source, checked in this order; the first hit wins.
const SOURCE_TOKENS: &[(Source, &[&str])] = &[
    (Source::LinkedIn, &["linkedin", "lnkd.in"]),
    (Source::Indeed, &["indeed"]),
    (Source::Glassdoor, &["glassdoor"]),
];

static ROLE_AT_COMPANY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?P<role>.+?)\s+at\s+(?P<company>.+?)\s*$").expect("valid regex")
});

static COMPANY_DASH_ROLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<company>.+?)\s+[-–—]\s+(?P<role>.+?)\s*$").expect("valid regex")
});

static PAY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<cur>\$|€|£|\b(?:usd|eur|gbp|mxn)\s?)\d+(?:,\d{3})*(?:\.\d+)?\s?k?(?:\s*(?:-|–|to)\s*(?:\$|€|£)?\d+(?:,\d{3})*(?:\.\d+)?\s?k?)?",
    )
    .expect("valid regex")
});

/// Maps sender/subject/URL (and optionally body text) to a known job board.
/// Case-insensitive substring match; total.
pub fn classify_source(sender: &str, subject: &str, url: &str, body: Option<&str>) -> Source {
    let haystack = format!(
        "{} {} {} {}",
        subject,
        sender,
        body.unwrap_or_default(),
        url
    )
    .to_lowercase();

    SOURCE_TOKENS
        .iter()
        .find(|(_, tokens)| tokens.iter().any(|t| haystack.contains(*t)))
        .map(|(source, _)| *source)
        .unwrap_or(Source::Unknown)
}

/// Best-effort `(role, company)` from a subject line:
/// "<role> at <company>", then "<company> - <role>", else the (truncated) subject as role.
pub fn split_subject(subject: &str) -> (String, String) {
    if let Some(caps) = ROLE_AT_COMPANY.captures(subject) {
        return (caps["role"].to_string(), caps["company"].to_string());
    }

    if let Some(caps) = COMPANY_DASH_ROLE.captures(subject) {
        return (caps["role"].to_string(), caps["company"].to_string());
    }

    (subject.trim().chars().take(MAX_ROLE_CHARS).collect(), String::new())
}

/// First pay figure or range in `text`, as `(currency code, matched text)`.
pub fn extract_comp(text: &str) -> Option<(String, String)> {
    let caps = PAY_RANGE.captures(text)?;
    let currency = match caps["cur"].trim().to_lowercase().as_str() {
        "$" | "usd" => "USD",
        "€" | "eur" => "EUR",
        "£" | "gbp" => "GBP",
        "mxn" => "MXN",
        _ => "",
    };
    Some((currency.to_string(), caps[0].trim().to_string()))
}

/// Inputs to [`build_record`] for one inspected message.
pub struct RecordInput<'a> {
    pub message_id: &'a str,
    pub source: Source,
    pub subject: &'a str,
    pub text: &'a str,
    /// Already normalized.
    pub apply_url: &'a str,
    pub is_ats: bool,
}

/// Assembles a full-schema record; every field not derived here stays empty.
pub fn build_record(input: &RecordInput<'_>, now: DateTime<Local>) -> JobRecord {
    let (role, company) = split_subject(input.subject);
    let (currency, comp) = extract_comp(input.text).unwrap_or_default();

    JobRecord {
        created_at: now.format("%Y-%m-%d %H:%M").to_string(),
        company,
        role,
        apply_url: input.apply_url.to_string(),
        source: input.source.as_str().to_string(),
        currency,
        comp,
        thread_id: input.message_id.to_string(),
        notes: input.subject.to_string(),
        use_latex_cv: if input.is_ats { "Yes" } else { "" }.to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_split_role_at_company() {
        assert_eq!(
            split_subject("Product Manager at Acme Corp"),
            ("Product Manager".to_string(), "Acme Corp".to_string())
        );
        assert_eq!(
            split_subject("  Staff SRE AT Initech  "),
            ("Staff SRE".to_string(), "Initech".to_string())
        );
    }

    #[test]
    fn test_split_company_dash_role() {
        assert_eq!(
            split_subject("Globex - Senior Data Engineer"),
            ("Senior Data Engineer".to_string(), "Globex".to_string())
        );
    }

    #[test]
    fn test_hyphenated_words_are_not_separators() {
        assert_eq!(
            split_subject("Front-End Developer opening"),
            ("Front-End Developer opening".to_string(), String::new())
        );
    }

    #[test]
    fn test_unmatched_subject_is_truncated_role() {
        let long = "x".repeat(300);
        let (role, company) = split_subject(&long);
        assert_eq!(role.chars().count(), MAX_ROLE_CHARS);
        assert_eq!(company, "");
    }

    #[test]
    fn test_classify_source_priority_and_fallback() {
        assert_eq!(
            classify_source("jobs-noreply@linkedin.com", "", "", None),
            Source::LinkedIn
        );
        assert_eq!(
            classify_source("someone@corp.com", "", "https://lnkd.in/abc", None),
            Source::LinkedIn
        );
        assert_eq!(
            classify_source("alert@Indeed.com", "Glassdoor and more", "", None),
            Source::Indeed
        );
        assert_eq!(
            classify_source("a@b.com", "hi", "", Some("posted on GLASSDOOR")),
            Source::Glassdoor
        );
        assert_eq!(classify_source("", "", "", None), Source::Unknown);
    }

    #[test]
    fn test_extract_comp() {
        assert_eq!(
            extract_comp("Salary: $120k-$140k plus equity"),
            Some(("USD".to_string(), "$120k-$140k".to_string()))
        );
        assert_eq!(
            extract_comp("Pay MXN 45,000 to 60,000 monthly"),
            Some(("MXN".to_string(), "MXN 45,000 to 60,000".to_string()))
        );
        assert_eq!(extract_comp("no numbers here"), None);
    }

    #[test]
    fn test_build_record() {
        let now = Local.with_ymd_and_hms(2026, 3, 4, 9, 5, 0).unwrap();
        let input = RecordInput {
            message_id: "msg-1",
            source: Source::LinkedIn,
            subject: "Product Manager at Acme Corp",
            text: "Great PM role",
            apply_url: "https://www.linkedin.com/jobs/view/4455667788",
            is_ats: false,
        };

        let record = build_record(&input, now);
        assert_eq!(record.created_at, "2026-03-04 09:05");
        assert_eq!(record.role, "Product Manager");
        assert_eq!(record.company, "Acme Corp");
        assert_eq!(record.source, "LinkedIn");
        assert_eq!(record.apply_url, "https://www.linkedin.com/jobs/view/4455667788");
        assert_eq!(record.notes, "Product Manager at Acme Corp");
        assert_eq!(record.thread_id, "msg-1");
        assert_eq!(record.use_latex_cv, "");
        assert_eq!(record.comp, "");
        assert!(!record.is_ats());
    }

    #[test]
    fn test_build_record_flags_ats() {
        let now = Local.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let input = RecordInput {
            message_id: "m",
            source: Source::Unknown,
            subject: "hello",
            text: "",
            apply_url: "https://boards.greenhouse.io/acme/jobs/1",
            is_ats: true,
        };
        assert_eq!(build_record(&input, now).use_latex_cv, "Yes");
    }
}

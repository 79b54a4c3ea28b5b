use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use url::{Url, form_urlencoded};

use crate::error::HuntError;

static URL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s<>"]+"#).expect("URL token pattern is a valid regex")
});

/// Score given to a surviving URL that matches no job-board rule.
pub const BASE_SCORE: u32 = 50;

const DEFAULT_DENY: &[&str] = &[
    r"unsubscribe",
    r"preferences",
    r"settings",
    r"pixel\.",
    r"1x1\.gif",
    r"track\.",
    r"analytics\.",
    r"facebook\.com",
    r"twitter\.com",
    r"linkedin\.com/e/v2",
    r"linkedin\.com/comm/pulse",
    r"support\.",
    r"help\.",
];

const DEFAULT_SCORES: &[(u32, &str)] = &[
    (100, r"linkedin\.com/jobs/view/\d+"),
    (95, r"indeed\.com/viewjob"),
    (95, r"glassdoor\.com/job-listing/"),
    (90, r"linkedin\.com/comm/jobs"),
    (90, r"indeed\.com.*?jk="),
    (90, r"glassdoor\.com.*?jl="),
    (80, r"myworkdayjobs\.com"),
    (80, r"greenhouse\.io"),
    (80, r"lever\.co"),
    (80, r"icims\.com"),
    (70, r"careers\.|jobs\.|apply\."),
];

const DEFAULT_ATS_DOMAINS: &[&str] = &[
    "workday",
    "myworkdayjobs",
    "greenhouse",
    "lever",
    "icims",
    "smartrecruiters",
    "taleo",
    "successfactors",
    "adp",
    "workable",
    "workforcenow",
];

const DEFAULT_STRIP_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "ao",
    "s",
    "guid",
    "src",
    "t",
    "vt",
    "uido",
    "ea",
    "cs",
    "cb",
    "jobListingId",
    "pos",
];

/// Pattern tables as plain data, loadable from JSON. Missing keys keep the built-in lists.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleTables {
    pub deny: Vec<String>,
    pub score: Vec<(u32, String)>,
    pub ats_domains: Vec<String>,
    pub strip_params: Vec<String>,
}

impl Default for RuleTables {
    fn default() -> Self {
        Self {
            deny: DEFAULT_DENY.iter().map(|p| p.to_string()).collect(),
            score: DEFAULT_SCORES
                .iter()
                .map(|(points, p)| (*points, p.to_string()))
                .collect(),
            ats_domains: DEFAULT_ATS_DOMAINS.iter().map(|d| d.to_string()).collect(),
            strip_params: DEFAULT_STRIP_PARAMS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// A URL that survived the denylist, with its job-board score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredUrl {
    pub url: String,
    pub score: u32,
}

/// Compiled denylist, score table, ATS host fragments and tracking parameters.
#[derive(Debug, Clone)]
pub struct UrlRules {
    deny: Vec<Regex>,
    score: Vec<(u32, Regex)>,
    ats_domains: Vec<String>,
    strip_params: HashSet<String>,
}

impl Default for UrlRules {
    fn default() -> Self {
        Self::compile(&RuleTables::default()).expect("built-in URL rules are valid regexes")
    }
}

impl UrlRules {
    pub fn compile(tables: &RuleTables) -> Result<Self, HuntError> {
        let compile = |pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| HuntError::InvalidRules(format!("{}: {}", pattern, e)))
        };

        let deny = tables
            .deny
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        let score = tables
            .score
            .iter()
            .map(|(points, p)| compile(p).map(|re| (*points, re)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            deny,
            score,
            ats_domains: tables.ats_domains.iter().map(|d| d.to_lowercase()).collect(),
            strip_params: tables.strip_params.iter().cloned().collect(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
        let tables: RuleTables = serde_json::from_str(&raw)
            .map_err(|e| HuntError::InvalidRules(format!("{}: {}", path.display(), e)))?;
        Ok(Self::compile(&tables)?)
    }

    fn is_denied(&self, url_lower: &str) -> bool {
        self.deny.iter().any(|re| re.is_match(url_lower))
    }

    fn score_of(&self, url_lower: &str) -> u32 {
        self.score
            .iter()
            .find(|(_, re)| re.is_match(url_lower))
            .map(|(points, _)| *points)
            .unwrap_or(BASE_SCORE)
    }

    /// Every non-denied URL in `text`, in order of appearance, with its score.
    pub fn score_candidates(&self, text: &str) -> Vec<ScoredUrl> {
        extract_urls(text)
            .into_iter()
            .filter_map(|url| {
                let lower = url.to_lowercase();
                if self.is_denied(&lower) {
                    return None;
                }
                let score = self.score_of(&lower);
                Some(ScoredUrl { url, score })
            })
            .collect()
    }

    /// Highest-scoring candidate; the earliest one wins ties. Empty when nothing qualifies.
    pub fn best_job_url(&self, text: &str) -> String {
        let mut best: Option<ScoredUrl> = None;
        for candidate in self.score_candidates(text) {
            if best.as_ref().is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        best.map(|b| b.url).unwrap_or_default()
    }

    /// Canonical dedup key: lowercase host, no fragment, tracking parameters removed.
    /// Strings that do not parse as URLs come back trimmed.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        let Ok(mut url) = Url::parse(trimmed) else {
            return trimmed.to_string();
        };

        url.set_fragment(None);

        if let Some(host) = url.host_str() {
            let lower = host.to_lowercase();
            if lower != host {
                let _ = url.set_host(Some(&lower));
            }
        }

        if let Some(query) = url.query().map(str::to_string) {
            let kept: Vec<&str> = query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .filter(|pair| {
                    let key = form_urlencoded::parse(pair.as_bytes())
                        .next()
                        .map(|(k, _)| k.into_owned())
                        .unwrap_or_default();
                    !self.strip_params.contains(&key)
                })
                .collect();
            if kept.is_empty() {
                url.set_query(None);
            } else {
                url.set_query(Some(&kept.join("&")));
            }
        }

        url.to_string()
    }

    /// True when the URL's host contains a known applicant-tracking-system fragment.
    pub fn is_ats(&self, url: &str) -> bool {
        Url::parse(url.trim())
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .is_some_and(|host| self.ats_domains.iter().any(|d| host.contains(d.as_str())))
    }
}

/// Every syntactically valid HTTP(S) URL in `text`, duplicates included.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_TOKEN
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'']))
        .filter(|candidate| Url::parse(candidate).is_ok_and(|u| u.host_str().is_some()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rules() -> UrlRules {
        UrlRules::default()
    }

    #[test]
    fn test_extract_urls_keeps_order_and_duplicates() {
        let text = "a https://one.example/x, then (https://two.example/y). https://one.example/x";
        assert_eq!(
            extract_urls(text),
            vec![
                "https://one.example/x",
                "https://two.example/y",
                "https://one.example/x"
            ]
        );
    }

    #[test]
    fn test_extract_urls_ignores_non_http() {
        assert!(extract_urls("mailto:a@b.com ftp://files.example/x plain text").is_empty());
    }

    #[test]
    fn test_job_board_url_beats_noise() {
        let text = "https://www.linkedin.com/e/v2?e=abc\n\
                    https://x.com/unsubscribe?id=1\n\
                    https://pixel.mailer.example/open.gif\n\
                    https://www.linkedin.com/jobs/view/4455667788?trk=email";
        assert_eq!(
            rules().best_job_url(text),
            "https://www.linkedin.com/jobs/view/4455667788?trk=email"
        );
    }

    #[test]
    fn test_scoring_prefers_direct_job_view_over_careers_subdomain() {
        let text = "https://careers.acme.com/openings https://www.indeed.com/viewjob?jk=abc";
        assert_eq!(rules().best_job_url(text), "https://www.indeed.com/viewjob?jk=abc");
    }

    #[test]
    fn test_ties_go_to_earliest() {
        let text = "https://acme.example/first https://other.example/second";
        assert_eq!(rules().best_job_url(text), "https://acme.example/first");
    }

    #[test]
    fn test_unrecognized_url_gets_base_score() {
        let scored = rules().score_candidates("see https://acme.example/role/1");
        assert_eq!(scored, vec![ScoredUrl {
            url: "https://acme.example/role/1".to_string(),
            score: BASE_SCORE
        }]);
    }

    #[test]
    fn test_only_noise_yields_empty() {
        let text = "https://help.example.com/faq https://x.com/unsubscribe";
        assert_eq!(rules().best_job_url(text), "");
        assert_eq!(rules().best_job_url("no links at all"), "");
    }

    #[test]
    fn test_normalize_strips_tracking_and_lowercases_host() {
        let r = rules();
        assert_eq!(
            r.normalize("https://Example.com/job?utm_source=x&id=5"),
            r.normalize("https://example.com/job?id=5")
        );
        assert_eq!(
            r.normalize("https://Example.COM/Job?utm_source=x&id=5&gclid=9#apply"),
            "https://example.com/Job?id=5"
        );
    }

    #[test]
    fn test_normalize_preserves_other_params_in_order() {
        assert_eq!(
            rules().normalize("https://www.indeed.com/viewjob?jk=abc&from=email&vt=2&tk=9"),
            "https://www.indeed.com/viewjob?jk=abc&from=email&tk=9"
        );
    }

    #[test]
    fn test_normalize_drops_empty_query() {
        assert_eq!(
            rules().normalize("https://example.com/job?utm_campaign=z&fbclid=1"),
            "https://example.com/job"
        );
    }

    #[test]
    fn test_normalize_malformed_returns_trimmed_input() {
        assert_eq!(rules().normalize("  not a url  "), "not a url");
        assert_eq!(rules().normalize(""), "");
    }

    #[test]
    fn test_is_ats() {
        let r = rules();
        assert!(r.is_ats("https://acme.wd5.myworkdayjobs.com/en-US/jobs/1"));
        assert!(r.is_ats("https://boards.greenhouse.io/acme/jobs/42"));
        assert!(!r.is_ats("https://www.linkedin.com/jobs/view/4455667788"));
        assert!(!r.is_ats("garbage"));
    }

    #[test]
    fn test_rules_file_overrides_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"{"score": [[99, "acme\\.example/jobs/"]], "strip_params": ["ref"]}"#,
        )
        .unwrap();

        let r = UrlRules::from_file(&path).unwrap();
        let text = "https://www.linkedin.com/jobs/view/1 https://acme.example/jobs/7";
        assert_eq!(r.best_job_url(text), "https://acme.example/jobs/7");
        assert_eq!(
            r.normalize("https://acme.example/jobs/7?ref=mail&utm_source=x"),
            "https://acme.example/jobs/7?utm_source=x"
        );
        // deny list untouched
        assert_eq!(r.best_job_url("https://x.com/unsubscribe"), "");
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let tables = RuleTables {
            deny: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        assert!(matches!(UrlRules::compile(&tables), Err(HuntError::InvalidRules(_))));
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(
            url in r"https?://[A-Za-z]{1,8}\.(com|io|co)(/[A-Za-z0-9_-]{0,6}){0,3}(\?([a-z_]{1,8}=[A-Za-z0-9%]{0,4}&?){0,4})?(#[a-z]{0,4})?"
        ) {
            let r = UrlRules::default();
            let once = r.normalize(&url);
            prop_assert_eq!(r.normalize(&once), once);
        }

        #[test]
        fn prop_normalize_never_panics(raw in ".{0,40}") {
            let _ = UrlRules::default().normalize(&raw);
        }
    }
}

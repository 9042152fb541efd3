use regex::Regex;
use std::sync::LazyLock;
use url::{Host, Url};

/// "amp" as a path, host or file segment, preceded by `.`, `/` or `-`.
static AMP_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[./-]amp\b").expect("valid AMP regex"));

/// Candidate URLs must carry an explicit scheme.
static URL_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:https?|ftp)://[^\s<>"'`]+"#).expect("valid URL regex")
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', '*', '_', '~'];

/// Whether a message contains something that looks like an AMP link.
///
/// Used as the cheap gate in front of the whole amputation pipeline.
pub fn looks_like_amp(text: &str) -> bool {
    AMP_LINK.is_match(text)
}

/// Extract well-formed URLs from free text, in order of appearance.
///
/// Only absolute `http`, `https` and `ftp` URLs with a host are returned.
/// Trailing sentence punctuation and unbalanced closing brackets are not
/// considered part of the URL.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_CANDIDATE
        .find_iter(text)
        .filter_map(|m| {
            let candidate = trim_candidate(m.as_str());
            let parsed = Url::parse(candidate).ok()?;
            parsed.host()?;
            Some(candidate.to_string())
        })
        .collect()
}

fn trim_candidate(mut candidate: &str) -> &str {
    loop {
        let before = candidate.len();
        candidate = candidate.trim_end_matches(TRAILING_PUNCTUATION);
        for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
            if candidate.ends_with(close)
                && candidate.matches(close).count() > candidate.matches(open).count()
            {
                candidate = &candidate[..candidate.len() - close.len_utf8()];
            }
        }
        if candidate.len() == before {
            return candidate;
        }
    }
}

/// Registrable domain of a URL: the last two labels of its host.
///
/// IP hosts and single-label hosts are returned whole. Returns `None` when
/// the URL cannot be parsed or has no host.
pub fn domain_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    match parsed.host()? {
        Host::Domain(domain) => {
            let labels: Vec<&str> = domain
                .trim_end_matches('.')
                .split('.')
                .filter(|l| !l.is_empty())
                .collect();
            match labels.len() {
                0 => None,
                1 => Some(labels[0].to_string()),
                n => Some(format!("{}.{}", labels[n - 2], labels[n - 1])),
            }
        }
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}

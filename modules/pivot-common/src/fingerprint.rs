//! URL normalization and article fingerprinting. The fingerprint is the unit
//! of deduplication everywhere downstream; it must be a pure, idempotent
//! function of the canonical URL.

use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters stripped during canonicalization.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "fbclid",
    "gclid",
    "ref",
    "cmpid",
    "smid",
];

/// Hosts dropped during ingest.
const BLOCKED_HOSTS: &[&str] = &["yahoo.com", "finance.yahoo.com"];

/// The aggregator host whose URLs wrap the real article.
const AGGREGATOR_HOST: &str = "news.google.com";

/// Canonicalize a URL: lowercase host, strip `www.`, drop tracking params,
/// drop the fragment, drop a trailing slash on non-root paths. Idempotent;
/// returns None when the input does not parse as an absolute URL.
pub fn canonicalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host)).ok()?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query: String = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    url.set_fragment(None);

    let mut out = url.to_string();
    // `Url` keeps the root slash; only trim deeper trailing slashes.
    if out.ends_with('/') && url.path() != "/" {
        out.pop();
    }
    Some(out)
}

/// Stable article fingerprint: `p5-` plus the first 16 hex chars of the
/// SHA-256 of the canonical URL. Empty string on URLs that fail to
/// canonicalize; ingest drops those rows.
pub fn fingerprint(raw: &str) -> String {
    match canonicalize(raw) {
        Some(canonical) => {
            let digest = Sha256::digest(canonical.as_bytes());
            format!("p5-{}", &hex::encode(digest)[..16])
        }
        None => String::new(),
    }
}

pub fn is_blocked(raw: &str) -> bool {
    let Some(host) = host_of(raw) else {
        return false;
    };
    BLOCKED_HOSTS.iter().any(|blocked| {
        host == *blocked || host.ends_with(&format!(".{blocked}"))
    })
}

pub fn is_aggregator_url(raw: &str) -> bool {
    host_of(raw).is_some_and(|h| h == AGGREGATOR_HOST)
}

fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_lowercases_and_strips_www() {
        assert_eq!(
            canonicalize("https://WWW.Reuters.com/Technology/story").as_deref(),
            Some("https://reuters.com/Technology/story")
        );
    }

    #[test]
    fn canonicalize_drops_tracking_params_and_fragment() {
        assert_eq!(
            canonicalize("https://techcrunch.com/a?utm_source=x&id=7&fbclid=zz#section").as_deref(),
            Some("https://techcrunch.com/a?id=7")
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let inputs = [
            "https://WWW.WSJ.com/articles/ai-story/?utm_campaign=d#top",
            "https://reuters.com/",
            "https://bloomberg.com/news/x?a=1&b=2",
        ];
        for input in inputs {
            let once = canonicalize(input).unwrap();
            let twice = canonicalize(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn canonicalize_rejects_garbage() {
        assert_eq!(canonicalize("not a url"), None);
        assert_eq!(canonicalize("ftp://example.com/x"), None);
    }

    #[test]
    fn fingerprint_is_pure_and_prefix_stable() {
        let a = fingerprint("https://www.reuters.com/x?utm_source=rss");
        let b = fingerprint("https://reuters.com/x");
        assert_eq!(a, b);
        assert!(a.starts_with("p5-"));
        assert_eq!(a.len(), 3 + 16);
    }

    #[test]
    fn fingerprint_empty_on_unparseable() {
        assert_eq!(fingerprint(""), "");
        assert_eq!(fingerprint("::::"), "");
    }

    #[test]
    fn blocklist_matches_subdomains() {
        assert!(is_blocked("https://finance.yahoo.com/news/x"));
        assert!(is_blocked("https://www.yahoo.com/tech/y"));
        assert!(is_blocked("https://news.yahoo.com/z"));
        assert!(!is_blocked("https://notyahoo.com/a"));
    }

    #[test]
    fn aggregator_detection() {
        assert!(is_aggregator_url(
            "https://news.google.com/rss/articles/CBMi"
        ));
        assert!(!is_aggregator_url("https://reuters.com/x"));
    }
}

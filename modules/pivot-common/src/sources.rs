//! Source-name resolution from article hosts, plus credibility defaults.

use std::collections::HashMap;

use url::Url;

/// Domain to display-name table for known publications. Matching tries the
/// exact host first, then the registrable domain.
const DOMAIN_TO_SOURCE: &[(&str, &str)] = &[
    ("reuters.com", "Reuters"),
    ("cnbc.com", "CNBC"),
    ("theverge.com", "The Verge"),
    ("techcrunch.com", "TechCrunch"),
    ("yahoo.com", "Yahoo Finance"),
    ("finance.yahoo.com", "Yahoo Finance"),
    ("wsj.com", "WSJ"),
    ("ft.com", "Financial Times"),
    ("bloomberg.com", "Bloomberg"),
    ("nytimes.com", "New York Times"),
    ("washingtonpost.com", "Washington Post"),
    ("bbc.com", "BBC"),
    ("bbc.co.uk", "BBC"),
    ("cnn.com", "CNN"),
    ("forbes.com", "Forbes"),
    ("businessinsider.com", "Business Insider"),
    ("wired.com", "Wired"),
    ("arstechnica.com", "Ars Technica"),
    ("engadget.com", "Engadget"),
    ("venturebeat.com", "VentureBeat"),
    ("zdnet.com", "ZDNet"),
    ("techrepublic.com", "TechRepublic"),
    ("theatlantic.com", "The Atlantic"),
    ("semafor.com", "Semafor"),
    ("axios.com", "Axios"),
    ("politico.com", "Politico"),
    ("apnews.com", "AP News"),
    ("marketwatch.com", "MarketWatch"),
    ("fortune.com", "Fortune"),
    ("inc.com", "Inc."),
    ("fastcompany.com", "Fast Company"),
    ("hbr.org", "Harvard Business Review"),
    ("thehill.com", "The Hill"),
    ("foxbusiness.com", "Fox Business"),
    ("theregister.com", "The Register"),
    ("thenextweb.com", "The Next Web"),
    ("gizmodo.com", "Gizmodo"),
    ("theguardian.com", "The Guardian"),
    ("technologyreview.com", "MIT Tech Review"),
    ("news.mit.edu", "MIT News"),
    ("sciencedaily.com", "Science Daily"),
    ("barrons.com", "Barrons"),
];

/// Source label used when an aggregator URL could not be resolved.
pub const AGGREGATOR_SOURCE: &str = "Google News";

/// Sources that paywall content and get a headless-extractor retry.
pub const PAYWALLED_SOURCES: &[&str] = &[
    "WSJ",
    "Wall Street Journal",
    "Bloomberg",
    "New York Times",
    "NYT",
    "MSN",
];

/// Resolve a display name from a URL's host. Falls back to the capitalized
/// first label of the registrable domain; None when the URL has no usable
/// host.
pub fn source_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    for (domain, name) in DOMAIN_TO_SOURCE {
        if host == *domain {
            return Some(name.to_string());
        }
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() >= 2 {
        let root = parts[parts.len() - 2..].join(".");
        for (domain, name) in DOMAIN_TO_SOURCE {
            if root == *domain {
                return Some(name.to_string());
            }
        }

        let main = parts[parts.len() - 2];
        let mut chars = main.chars();
        return chars.next().map(|first| {
            let mut s = first.to_uppercase().to_string();
            s.push_str(chars.as_str());
            s
        });
    }

    None
}

pub fn is_paywalled_source(source_name: &str) -> bool {
    PAYWALLED_SOURCES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(source_name))
}

/// Credibility score for a source. Every source scores `default_score`
/// unless an explicit override says otherwise.
pub fn credibility_for(
    source_name: &str,
    overrides: &HashMap<String, u8>,
    default_score: u8,
) -> u8 {
    overrides
        .get(&source_name.to_lowercase())
        .copied()
        .unwrap_or(default_score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_domain_match() {
        assert_eq!(
            source_from_url("https://www.reuters.com/tech/x").as_deref(),
            Some("Reuters")
        );
        assert_eq!(
            source_from_url("https://techcrunch.com/2026/x").as_deref(),
            Some("TechCrunch")
        );
    }

    #[test]
    fn registrable_domain_match() {
        assert_eq!(
            source_from_url("https://edition.cnn.com/2026/x").as_deref(),
            Some("CNN")
        );
        assert_eq!(
            source_from_url("https://news.mit.edu/2026/y").as_deref(),
            Some("MIT News")
        );
    }

    #[test]
    fn fallback_capitalizes_first_label() {
        assert_eq!(
            source_from_url("https://www.example.com/a").as_deref(),
            Some("Example")
        );
    }

    #[test]
    fn paywalled_detection_is_case_insensitive() {
        assert!(is_paywalled_source("wsj"));
        assert!(is_paywalled_source("Bloomberg"));
        assert!(!is_paywalled_source("Reuters"));
    }

    #[test]
    fn credibility_defaults_and_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("tabloid daily".to_string(), 1u8);
        assert_eq!(credibility_for("Reuters", &overrides, 3), 3);
        assert_eq!(credibility_for("Tabloid Daily", &overrides, 3), 1);
    }
}

//! Mirror discovery from `Link: <url>; rel=duplicate` headers.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use tracing::debug;

/// Priority of a mirror whose header carries no `pri` parameter.
pub const DEFAULT_PRIORITY: u32 = 999_999;

fn duplicate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^<(.+)>\s*;\s*rel=duplicate(?:.*pri=([0-9]+).*|.*)?$").unwrap()
    })
}

/// A mirror announced by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateLink {
    pub url: String,
    pub priority: u32,
}

/// Parse a single `Link` header value.
pub fn parse_duplicate_link(value: &str) -> Option<DuplicateLink> {
    let captures = duplicate_pattern().captures(value.trim())?;
    let url = captures.get(1)?.as_str().to_string();
    let priority = captures
        .get(2)
        .and_then(|p| p.as_str().parse().ok())
        .unwrap_or(DEFAULT_PRIORITY);
    Some(DuplicateLink { url, priority })
}

/// Collect mirror URLs from every `Link` header, lowest priority first.
///
/// Links with equal priority keep their header order.
pub fn duplicate_links(headers: &HeaderMap) -> Vec<String> {
    let mut links: Vec<DuplicateLink> = headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| {
            let link = parse_duplicate_link(value);
            if link.is_none() {
                debug!(link = value, "Ignoring link");
            }
            link
        })
        .collect();
    links.sort_by_key(|link| link.priority);
    links.into_iter().map(|link| link.url).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reqwest::header::HeaderValue;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for value in values {
            map.append(LINK, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_parse_with_priority() {
        let link = parse_duplicate_link("<https://m1.example.com/a.zip>; rel=duplicate; pri=2").unwrap();
        assert_eq!(link.url, "https://m1.example.com/a.zip");
        assert_eq!(link.priority, 2);
    }

    #[test]
    fn test_parse_without_priority() {
        let link = parse_duplicate_link("<https://m1.example.com/a.zip>;rel=Duplicate").unwrap();
        assert_eq!(link.priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_parse_rejects_other_relations() {
        assert!(parse_duplicate_link("<https://example.com/>; rel=next").is_none());
        assert!(parse_duplicate_link("https://example.com/; rel=duplicate").is_none());
    }

    #[test]
    fn test_links_sorted_by_priority() {
        let map = headers(&[
            "<https://c/x>; rel=duplicate",
            "<https://b/x>; rel=duplicate; pri=5",
            "<https://a/x>; rel=duplicate; pri=1",
            "<https://d/x>; rel=describedby",
        ]);
        assert_eq!(duplicate_links(&map), vec!["https://a/x", "https://b/x", "https://c/x"]);
    }

    proptest! {
        #[test]
        fn test_equal_priorities_keep_header_order(count in 1usize..8, pri in 0u32..10) {
            let values: Vec<String> = (0..count)
                .map(|i| format!("<https://mirror{i}/x>; rel=duplicate; pri={pri}"))
                .collect();
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            let urls = duplicate_links(&headers(&refs));
            let expected: Vec<String> = (0..count).map(|i| format!("https://mirror{i}/x")).collect();
            prop_assert_eq!(urls, expected);
        }
    }
}

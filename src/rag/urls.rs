// ABOUTME: URL ingestion loaders: single-page fetch and depth-one same-host crawl
// ABOUTME: Fetched pages are reduced to plain text through the HTML extractor
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use super::extract::{extract_text, SourceKind, UrlKind};
use super::Document;
use crate::errors::{AppError, AppResult};

/// Per-page fetch timeout
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Cap on followed links per seed page in recursive mode
const MAX_LINKS_PER_PAGE: usize = 16;

/// Load documents from a set of URLs
///
/// `Plain` fetches each URL itself; `Recursive` additionally follows
/// same-host links one level deep (capped). Unreachable pages are skipped
/// with a warning rather than failing the batch.
///
/// # Errors
///
/// Returns `invalid_input` when a URL cannot be parsed
pub async fn load_urls(
    http: &reqwest::Client,
    urls: &[String],
    kind: UrlKind,
) -> AppResult<Vec<Document>> {
    let mut documents = Vec::new();

    for raw in urls {
        let seed = Url::parse(raw)
            .map_err(|e| AppError::invalid_input(format!("Invalid url `{raw}`: {e}")))?;

        let Some(page) = fetch_page(http, &seed).await else {
            continue;
        };

        if kind == UrlKind::Recursive {
            let links = extract_same_host_links(&page, &seed);
            documents.extend(document_from_html(raw, &page));
            for link in links {
                if let Some(linked) = fetch_page(http, &link).await {
                    documents.extend(document_from_html(link.as_str(), &linked));
                }
            }
        } else {
            documents.extend(document_from_html(raw, &page));
        }
    }

    debug!("Loaded {} documents from {} urls", documents.len(), urls.len());
    Ok(documents)
}

/// Fetch one page body, skipping failures
async fn fetch_page(http: &reqwest::Client, url: &Url) -> Option<String> {
    let resp = match http
        .get(url.clone())
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            warn!("Skipping unreachable url {url}: {e}");
            return None;
        }
    };

    if !resp.status().is_success() {
        warn!("Skipping url {url}: status {}", resp.status());
        return None;
    }

    match resp.text().await {
        Ok(body) => Some(body),
        Err(e) => {
            warn!("Skipping unreadable body from {url}: {e}");
            None
        }
    }
}

/// Reduce a fetched page to a document, dropping empty extractions
fn document_from_html(source: &str, html: &str) -> Option<Document> {
    let text = extract_text(SourceKind::Html, html.as_bytes()).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    Some(Document {
        source: source.to_owned(),
        text,
        kind: SourceKind::Html,
    })
}

fn href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // literal pattern, checked by tests
        Regex::new(r#"href\s*=\s*["']([^"'#]+)["']"#).unwrap()
    })
}

/// Links on the page that resolve to the seed's host, deduplicated and capped
fn extract_same_host_links(html: &str, seed: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for capture in href_pattern().captures_iter(html) {
        let Some(raw) = capture.get(1) else { continue };
        let Ok(resolved) = seed.join(raw.as_str()) else {
            continue;
        };
        if resolved.host_str() != seed.host_str() || resolved == *seed {
            continue;
        }
        if seen.insert(resolved.to_string()) {
            links.push(resolved);
        }
        if links.len() >= MAX_LINKS_PER_PAGE {
            break;
        }
    }

    links
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_same_host_links() {
        let seed = Url::parse("https://example.com/docs/").unwrap();
        let html = r##"
            <a href="/docs/intro">intro</a>
            <a href="guide">relative</a>
            <a href="https://example.com/docs/intro">duplicate-ish</a>
            <a href="https://other.org/page">offsite</a>
            <a href="#anchor">anchor</a>
        "##;
        let links = extract_same_host_links(html, &seed);
        let rendered: Vec<String> = links.iter().map(Url::to_string).collect();
        assert!(rendered.contains(&"https://example.com/docs/intro".to_owned()));
        assert!(rendered.contains(&"https://example.com/docs/guide".to_owned()));
        assert!(!rendered.iter().any(|l| l.contains("other.org")));
    }

    #[test]
    fn test_link_cap() {
        let seed = Url::parse("https://example.com/").unwrap();
        let html: String = (0..50)
            .map(|i| format!(r#"<a href="/page-{i}">p</a>"#))
            .collect();
        let links = extract_same_host_links(&html, &seed);
        assert_eq!(links.len(), MAX_LINKS_PER_PAGE);
    }

    #[test]
    fn test_document_from_html_drops_empty() {
        assert!(document_from_html("u", "<html><body></body></html>").is_none());
        let doc = document_from_html("u", "<p>content</p>").unwrap();
        assert_eq!(doc.text.trim(), "content");
    }
}

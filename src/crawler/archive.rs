use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static PERMALINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\d+\.html").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Post permalinks on an archive page, in document order, without query or
/// fragment, each listed once. Comment-thread links are skipped, as are
/// links to other hosts.
pub fn post_links(html: &str, page_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let Some(body) = document.select(&BODY).next() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in body.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if href.contains("?thread=") || href.contains("#comments") {
            continue;
        }
        let Ok(mut resolved) = page_url.join(href) else {
            continue;
        };
        if resolved.host_str() != page_url.host_str() || !PERMALINK_RE.is_match(resolved.path()) {
            continue;
        }
        resolved.set_query(None);
        resolved.set_fragment(None);
        let clean = resolved.to_string();
        if seen.insert(clean.clone()) {
            links.push(clean);
        }
    }
    links
}

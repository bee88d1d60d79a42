use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static POST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\d+\.html$").unwrap());
static DAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\d{4}/\d{2}/\d{2}/?$").unwrap());
static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\d{4}/\d{2}/?$").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\d{4}/?$").unwrap());

/// What a user-supplied blog URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Post,
    Day,
    Month,
    Year,
    Blog,
}

/// Lexical classification of the URL path; first matching rule wins.
pub fn classify(raw: &str) -> UrlKind {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    if POST_RE.is_match(&path) {
        UrlKind::Post
    } else if DAY_RE.is_match(&path) {
        UrlKind::Day
    } else if MONTH_RE.is_match(&path) {
        UrlKind::Month
    } else if YEAR_RE.is_match(&path) {
        UrlKind::Year
    } else {
        UrlKind::Blog
    }
}

/// Monthly archive URLs `<base>/MM/` for a year archive URL.
pub fn year_months(year_url: &str) -> Vec<String> {
    let base = year_url.trim_end_matches('/');
    (1..=12).map(|m| format!("{}/{:02}/", base, m)).collect()
}

/// Monthly archive URLs for every year from `start_year` to `end_year`.
pub fn blog_months(origin: &str, start_year: i32, end_year: i32) -> Vec<String> {
    let origin = origin.trim_end_matches('/');
    (start_year..=end_year)
        .flat_map(|y| (1..=12).map(move |m| format!("{}/{}/{:02}/", origin, y, m)))
        .collect()
}

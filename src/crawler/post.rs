use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{ImportError, Result};
use crate::http::Fetch;
use crate::note::{children_trailer, format_tags, Note};
use crate::threads::{materialize, CommentRecord};

static META: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta[property]").unwrap());
static DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div[class]").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static SITE_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Site\.page\s*=\s*\{").unwrap());

const BODY_CLASSES: &[&str] = &["entry-content", "aentry-post__text", "asset-body"];
const MISSING_BODY: &str = "Тело поста не найдено.";

/// Post page metadata and rendered body.
#[derive(Debug, Clone, Default)]
pub struct BlogPost {
    pub title: String,
    pub url: String,
    pub description: String,
    pub body: String,
    pub tags: Vec<String>,
    pub published: Option<DateTime<Utc>>,
}

/// Read OpenGraph metadata and the entry body. `None` when no title can be
/// found at all.
pub fn parse_post_page(html: &str, title_suffix: &str) -> Option<BlogPost> {
    let document = Html::parse_document(html);
    let mut post = BlogPost::default();

    for meta in document.select(&META) {
        let el = meta.value();
        let content = el.attr("content").unwrap_or_default();
        match el.attr("property").unwrap_or_default() {
            "og:title" if post.title.is_empty() => post.title = content.to_string(),
            "og:url" if post.url.is_empty() => post.url = content.to_string(),
            "og:description" if post.description.is_empty() => {
                post.description = content.to_string()
            }
            "article:tag" if !content.is_empty() => post.tags.push(content.to_string()),
            "article:published_time" if post.published.is_none() => {
                post.published = DateTime::parse_from_rfc3339(content)
                    .ok()
                    .map(|d| d.with_timezone(&Utc));
            }
            _ => {}
        }
    }

    if post.title.is_empty() {
        post.title = document
            .select(&TITLE)
            .next()
            .map(|t| t.text().collect::<String>())
            .map(|t| t.trim_end_matches(title_suffix).trim().to_string())
            .unwrap_or_default();
    }
    if post.title.is_empty() {
        return None;
    }

    post.body = document
        .select(&DIV)
        .find(|div| {
            let class = div.value().attr("class").unwrap_or_default();
            BODY_CLASSES.iter().any(|c| class.contains(c))
        })
        .map(|div| div.inner_html())
        .unwrap_or_else(|| MISSING_BODY.to_string());

    Some(post)
}

/// The largest `Site.page = {...};` object embedded in the comments page.
pub fn site_page_json(html: &str) -> Option<Value> {
    let mut best: Option<(usize, Value)> = None;
    for m in SITE_PAGE_RE.find_iter(html) {
        let start = m.end() - 1;
        let mut stream = serde_json::Deserializer::from_str(&html[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            let len = stream.byte_offset();
            if best.as_ref().map_or(true, |(best_len, _)| len > *best_len) {
                best = Some((len, value));
            }
        }
    }
    best.map(|(_, value)| value)
}

fn number(obj: &Value, key: &str) -> Option<i64> {
    let v = obj.get(key)?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn string(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Flat comment records from the decoded `Site.page` object.
pub fn comment_records(site_page: &Value) -> Vec<CommentRecord> {
    let Some(comments) = site_page.get("comments").and_then(Value::as_array) else {
        return Vec::new();
    };
    comments
        .iter()
        .filter_map(|c| {
            let id = number(c, "thread").or_else(|| number(c, "dtalkid"))?;
            let parent_id = number(c, "parent").or_else(|| number(c, "above")).unwrap_or(0);
            Some(CommentRecord {
                id,
                parent_id,
                author: string(c, "dname").unwrap_or_default(),
                body: string(c, "article"),
                date: string(c, "ctime"),
                created: number(c, "ctime_ts").and_then(|ts| DateTime::from_timestamp(ts, 0)),
                url: string(c, "thread_url"),
            })
        })
        .filter(|r| r.id != 0)
        .collect()
}

/// Post note followed by its comment notes.
pub fn assemble(mut post: BlogPost, request_url: &str, comments: &[CommentRecord]) -> Vec<Note> {
    if post.url.is_empty() {
        post.url = request_url.to_string();
    }
    let comment_notes = materialize(&post.title, comments);

    let mut text = post.body;
    text.push_str(&format!(
        "\n\n---\n\n''Оригинал поста:'' <a href=\"{}\" target=\"_blank\">{}</a>",
        post.url, post.url
    ));
    if !comment_notes.is_empty() {
        text.push_str(&children_trailer(&post.title));
    }

    let mut note = Note::new(&post.title, text, format_tags(&post.tags)).with_field("url", &post.url);
    if let Some(at) = post.published {
        note = note.with_timestamp(at);
    }

    let mut notes = Vec::with_capacity(comment_notes.len() + 1);
    notes.push(note);
    notes.extend(comment_notes);
    notes
}

/// The post URL with its query replaced by `view=comments`.
pub fn comments_url(post_url: &str) -> Result<String> {
    let mut url = Url::parse(post_url)
        .map_err(|e| ImportError::dependency(post_url, format!("invalid post URL: {}", e)))?;
    url.set_query(Some("view=comments"));
    url.set_fragment(None);
    Ok(url.into())
}

/// Fetch one post and its `?view=comments` page.
pub async fn fetch_post<F: Fetch>(http: &F, url: &str, title_suffix: &str) -> Result<Vec<Note>> {
    let page = http.get(url).await?.require_success(url)?;
    let post = parse_post_page(&page.text(), title_suffix)
        .ok_or_else(|| ImportError::dependency(url, "post title not found"))?;

    let comments_url = comments_url(url)?;
    let comments_page = http
        .get(&comments_url)
        .await?
        .require_success(&comments_url)?;
    let records = site_page_json(&comments_page.text())
        .map(|page| comment_records(&page))
        .unwrap_or_default();
    debug!("{}: {} comments", url, records.len());

    Ok(assemble(post, url, &records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeFetch;

    const POST: &str = r#"<html><head>
        <title>Fallback — ЖЖ</title>
        <meta property="og:title" content="Hello world">
        <meta property="og:url" content="https://x.example.com/100.html">
        <meta property="og:description" content="desc">
        <meta property="article:tag" content="rust lang">
        <meta property="article:tag" content="notes">
        <meta property="article:published_time" content="2020-07-01T10:00:00+03:00">
        </head><body>
        <div class="header">nav</div>
        <div class="b-singlepost entry-content"><p>Body <b>text</b></p></div>
        <div class="asset-body">second</div>
        </body></html>"#;

    const COMMENTS: &str = r#"<html><script>
        Site.page = {"small":true};
        Site.page = {"comments":[
            {"thread":10,"parent":0,"dname":"ann","article":"hi","ctime":"July 1 2020, 10:00:00 UTC","ctime_ts":1593597600,"thread_url":"https://x.example.com/100.html?thread=10"},
            {"dtalkid":11,"above":10,"dname":"bob","article":null},
            {"thread":0,"dname":"ghost"},
            {"thread":12.0,"parent":11,"dname":"cid","article":"ok; }; still json"}
        ]};
        </script></html>"#;

    #[test]
    fn parses_open_graph_and_body() {
        let post = parse_post_page(POST, " — ЖЖ").unwrap();
        assert_eq!(post.title, "Hello world");
        assert_eq!(post.url, "https://x.example.com/100.html");
        assert_eq!(post.description, "desc");
        assert_eq!(post.tags, ["rust lang", "notes"]);
        assert_eq!(post.body, "<p>Body <b>text</b></p>");
        assert_eq!(post.published.unwrap().to_rfc3339(), "2020-07-01T07:00:00+00:00");
    }

    #[test]
    fn falls_back_to_page_title() {
        let html = "<html><head><title>Old post — ЖЖ</title></head><body></body></html>";
        let post = parse_post_page(html, " — ЖЖ").unwrap();
        assert_eq!(post.title, "Old post");
        assert_eq!(post.body, MISSING_BODY);
        assert!(parse_post_page("<html></html>", " — ЖЖ").is_none());
    }

    #[test]
    fn picks_largest_site_page_blob() {
        let page = site_page_json(COMMENTS).unwrap();
        let records = comment_records(&page);
        assert_eq!(records.len(), 3);
        assert_eq!((records[0].id, records[0].parent_id), (10, 0));
        assert_eq!((records[1].id, records[1].parent_id), (11, 10));
        assert_eq!((records[2].id, records[2].parent_id), (12, 11));
        assert!(records[1].body.is_none());
        assert_eq!(records[2].body.as_deref(), Some("ok; }; still json"));
        assert_eq!(records[0].created.unwrap().timestamp(), 1593597600);
    }

    #[test]
    fn assembles_post_and_thread() {
        let post = parse_post_page(POST, " — ЖЖ").unwrap();
        let records = comment_records(&site_page_json(COMMENTS).unwrap());
        let notes = assemble(post, "https://x.example.com/100.html", &records);

        assert_eq!(notes.len(), 4);
        let head = &notes[0];
        assert_eq!(head.title, "Hello world");
        assert_eq!(head.tags, "[[rust lang]] notes");
        assert_eq!(head.fields["url"], "https://x.example.com/100.html");
        assert!(head.text.contains("''Оригинал поста:'' <a href=\"https://x.example.com/100.html\""));
        assert!(head.text.ends_with("<<list-links \"[tag[Hello world]]\">>"));
        assert_eq!(notes[1].tags, "[[Hello world]]");
        assert_eq!(notes[3].tags, "[[Hello world-comment-11]]");
    }

    #[test]
    fn post_without_comments_has_no_trailer() {
        let post = parse_post_page(POST, " — ЖЖ").unwrap();
        let notes = assemble(post, "https://x.example.com/100.html", &[]);
        assert_eq!(notes.len(), 1);
        assert!(!notes[0].text.contains("list-links"));
    }

    #[tokio::test]
    async fn fetches_post_and_comments() {
        let http = FakeFetch::new()
            .route("https://x.example.com/100.html", 200, POST)
            .route("https://x.example.com/100.html?view=comments", 200, COMMENTS);
        let notes = fetch_post(&http, "https://x.example.com/100.html", " — ЖЖ").await.unwrap();
        assert_eq!(notes.len(), 4);
        assert_eq!(http.requests().len(), 2);
    }

    #[test]
    fn comments_url_replaces_query() {
        assert_eq!(
            comments_url("https://x.example.com/100.html").unwrap(),
            "https://x.example.com/100.html?view=comments"
        );
        assert_eq!(
            comments_url("https://x.example.com/100.html?style=mine#comments").unwrap(),
            "https://x.example.com/100.html?view=comments"
        );
        assert!(comments_url("100.html").is_err());
    }

    #[tokio::test]
    async fn post_url_with_query_fetches_plain_comments_page() {
        let http = FakeFetch::new()
            .route("https://x.example.com/100.html?style=mine", 200, POST)
            .route("https://x.example.com/100.html?view=comments", 200, COMMENTS);
        let notes = fetch_post(&http, "https://x.example.com/100.html?style=mine", " — ЖЖ")
            .await
            .unwrap();
        assert_eq!(notes.len(), 4);
        assert_eq!(
            http.requests(),
            [
                "https://x.example.com/100.html?style=mine",
                "https://x.example.com/100.html?view=comments"
            ]
        );
    }

    #[tokio::test]
    async fn failed_post_fetch_is_an_error() {
        let http = FakeFetch::new().route("https://x.example.com/1.html", 500, "");
        let err = fetch_post(&http, "https://x.example.com/1.html", " — ЖЖ").await.unwrap_err();
        assert!(matches!(err, ImportError::Status { status: 500, .. }));
    }
}

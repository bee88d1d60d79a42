//! WordPress REST import: the WordPress.com public API for `*.wordpress.com`
//! hosts, the `wp-json/wp/v2` API for everything else.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use super::parse_timestamp;
use crate::error::{ImportError, Result};
use crate::http::{paginate, Fetch, PAGE_DELAY};
use crate::note::{children_trailer, link_tag, Note};
use crate::threads::{materialize, CommentRecord};

pub const WPCOM_API: &str = "https://public-api.wordpress.com/rest/v1.1/sites";

static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|([0-9]+));").unwrap());

/// Decode the character references WordPress puts in titles and rendered
/// fields. `&amp;` goes last so `&amp;lt;` stays `&lt;`.
pub fn unescape_html(s: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(s, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

/// Title used for a post note and as the root of its comment titles.
pub fn note_title(raw: &str) -> String {
    unescape_html(raw).replace(' ', "_")
}

#[derive(Debug, Default, Deserialize)]
struct SiteInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpComPostPage {
    #[serde(default)]
    posts: Vec<WpComPost>,
}

#[derive(Debug, Deserialize)]
struct WpComPost {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "URL", default)]
    url: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    author: Named,
    #[serde(default)]
    tags: Value,
}

#[derive(Debug, Deserialize)]
struct WpComReplies {
    #[serde(default)]
    comments: Vec<WpComComment>,
}

#[derive(Debug, Deserialize)]
struct WpComComment {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "URL", default)]
    url: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    author: Named,
    #[serde(default)]
    parent: Value,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: i64,
    #[serde(default)]
    date: String,
    date_gmt: Option<String>,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    content: Rendered,
    #[serde(rename = "_embedded", default)]
    embedded: Embedded,
}

#[derive(Debug, Default, Deserialize)]
struct Embedded {
    #[serde(default)]
    author: Vec<Named>,
    #[serde(rename = "wp:term", default)]
    terms: Vec<Vec<Named>>,
}

#[derive(Debug, Deserialize)]
struct WpComment {
    id: i64,
    post: i64,
    #[serde(default)]
    parent: i64,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    date: String,
    date_gmt: Option<String>,
    #[serde(default)]
    content: Rendered,
    #[serde(default)]
    link: String,
}

/// A post in either dialect, ready to become a note.
struct Entry {
    id: i64,
    title: String,
    body: String,
    author: Option<String>,
    link: String,
    slug: String,
    tags: Vec<String>,
    created: Option<DateTime<Utc>>,
}

/// Post note followed by its comment notes.
fn entry_notes(entry: Entry, comments: &[CommentRecord]) -> Vec<Note> {
    let comment_notes = materialize(&entry.title, comments);

    let mut text = entry.body;
    if let Some(author) = entry.author.filter(|a| !a.is_empty()) {
        text.push_str(&format!("\n\n<p>''Автор: {}''</p>", author));
    }
    text.push_str(&format!(
        "\n\n---\n\n''Оригинал поста:'' <a href=\"{}\" target=\"_blank\">{}</a>",
        entry.link, entry.link
    ));
    if !comment_notes.is_empty() {
        text.push_str(&children_trailer(&entry.title));
    }

    let tags: Vec<String> = entry.tags.iter().map(|t| link_tag(t)).collect();
    let mut note = Note::new(&entry.title, text, tags.join(" "))
        .with_field("post-id", entry.id.to_string())
        .with_field("post-slug", entry.slug)
        .with_field("source-url", entry.link);
    if let Some(at) = entry.created {
        note = note.with_timestamp(at);
    }

    let mut notes = vec![note];
    notes.extend(comment_notes);
    notes
}

/// Tag names from a WordPress.com `tags` value: an object keyed by tag, or
/// an empty array when the post has none.
fn term_names(tags: &Value) -> Vec<String> {
    let items: Vec<&Value> = match tags {
        Value::Object(map) => map.values().collect(),
        Value::Array(list) => list.iter().collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|t| t.get("name").and_then(Value::as_str))
        .map(unescape_html)
        .collect()
}

/// `parent` is `false` for top-level comments and `{"ID": n, ...}` for replies.
fn wpcom_parent(parent: &Value) -> i64 {
    let id = parent.get("ID").or_else(|| parent.get("id"));
    id.and_then(Value::as_i64).filter(|id| *id > 0).unwrap_or(0)
}

fn site_notes(info: SiteInfo) -> Vec<Note> {
    vec![
        Note::system("$:/SiteTitle", unescape_html(&info.name)),
        Note::system("$:/SiteSubtitle", unescape_html(&info.description)),
    ]
}

async fn site_info<F: Fetch>(http: &F, url: &str) -> Vec<Note> {
    let info = async {
        let response = http.get(url).await?.require_success(url)?;
        response.json::<SiteInfo>()
    };
    match info.await {
        Ok(info) => site_notes(info),
        Err(e) => {
            warn!("Site info {} unavailable: {}", url, e);
            Vec::new()
        }
    }
}

async fn convert_wpcom<F: Fetch>(http: &F, host: &str) -> Result<Vec<Note>> {
    let base = format!("{}/{}", WPCOM_API, host);
    let mut notes = site_info(http, &base).await;

    let posts: Vec<WpComPost> = paginate(
        http,
        &format!("wordpress.com posts of {}", host),
        |page| format!("{}/posts?page={}&fields=ID,URL,date,title,content,author,tags,slug", base, page),
        |r| Ok(r.json::<WpComPostPage>()?.posts),
    )
    .await?;
    info!("{}: {} posts", host, posts.len());

    for post in posts {
        tokio::time::sleep(PAGE_DELAY).await;
        let replies_url = format!("{}/posts/{}/replies/?order=ASC", base, post.id);
        let replies = async {
            let response = http.get(&replies_url).await?.require_success(&replies_url)?;
            response.json::<WpComReplies>()
        };
        let comments = match replies.await {
            Ok(r) => r.comments,
            Err(e) => {
                warn!("Comments of post {} unavailable: {}", post.id, e);
                Vec::new()
            }
        };

        let records: Vec<CommentRecord> = comments
            .into_iter()
            .map(|c| CommentRecord {
                id: c.id,
                parent_id: wpcom_parent(&c.parent),
                author: c.author.name,
                body: c.content,
                created: parse_timestamp(&c.date),
                date: Some(c.date).filter(|d| !d.is_empty()),
                url: Some(c.url).filter(|u| !u.is_empty()),
            })
            .collect();

        let entry = Entry {
            id: post.id,
            title: note_title(&post.title),
            tags: term_names(&post.tags),
            author: Some(post.author.name),
            created: parse_timestamp(&post.date),
            body: post.content,
            link: post.url,
            slug: post.slug,
        };
        notes.extend(entry_notes(entry, &records));
    }
    Ok(notes)
}

async fn convert_self_hosted<F: Fetch>(http: &F, origin: &str) -> Result<Vec<Note>> {
    let mut notes = site_info(http, &format!("{}/wp-json/", origin)).await;

    let posts: Vec<WpPost> = paginate(
        http,
        &format!("posts of {}", origin),
        |page| format!("{}/wp-json/wp/v2/posts?page={}&_embed=author,wp:term", origin, page),
        |r| r.json(),
    )
    .await?;
    info!("{}: {} posts", origin, posts.len());

    let comments: Vec<WpComment> = match paginate(
        http,
        &format!("comments of {}", origin),
        |page| format!("{}/wp-json/wp/v2/comments?page={}&per_page=100&order=asc", origin, page),
        |r| r.json(),
    )
    .await
    {
        Ok(comments) => comments,
        Err(e) => {
            warn!("Comments of {} unavailable: {}", origin, e);
            Vec::new()
        }
    };

    let mut by_post: HashMap<i64, Vec<CommentRecord>> = HashMap::new();
    for c in comments {
        let created = c
            .date_gmt
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| parse_timestamp(&c.date));
        by_post.entry(c.post).or_default().push(CommentRecord {
            id: c.id,
            parent_id: c.parent,
            author: unescape_html(&c.author_name),
            body: Some(unescape_html(&c.content.rendered)),
            date: Some(c.date).filter(|d| !d.is_empty()),
            created,
            url: Some(c.link).filter(|u| !u.is_empty()),
        });
    }

    for post in posts {
        let created = post
            .date_gmt
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| parse_timestamp(&post.date));
        let records = by_post.remove(&post.id).unwrap_or_default();
        let entry = Entry {
            id: post.id,
            title: note_title(&post.title.rendered),
            body: unescape_html(&post.content.rendered),
            author: post.embedded.author.first().map(|a| unescape_html(&a.name)),
            tags: post
                .embedded
                .terms
                .iter()
                .flatten()
                .map(|t| unescape_html(&t.name))
                .collect(),
            link: post.link,
            slug: post.slug,
            created,
        };
        notes.extend(entry_notes(entry, &records));
    }
    Ok(notes)
}

/// Import a WordPress site over REST; the dialect follows the host name.
pub async fn convert<F: Fetch>(http: &F, site_url: &str) -> Result<Vec<Note>> {
    let url = Url::parse(site_url)
        .map_err(|e| ImportError::config(format!("invalid WordPress URL {:?}: {}", site_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ImportError::config(format!("WordPress URL {:?} has no host", site_url)))?;

    if host.ends_with(".wordpress.com") {
        info!("Importing WordPress.com site {}", host);
        convert_wpcom(http, host).await
    } else {
        info!("Importing self-hosted WordPress site {}", host);
        convert_self_hosted(http, &format!("https://{}", host)).await
    }
}

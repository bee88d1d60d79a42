use serde::Deserialize;
use tracing::info;
use url::Url;

use super::parse_timestamp;
use crate::error::{ImportError, Result};
use crate::http::{Fetch, PAGE_DELAY};
use crate::note::{format_tags, Note};

pub const API: &str = "https://www.googleapis.com/blogger/v3";
const PAGE_SIZE: &str = "50";

/// Which blog to import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlogRef {
    Url(String),
    Id(String),
}

#[derive(Debug, Deserialize)]
struct Blog {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostList {
    #[serde(default)]
    items: Vec<Post>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
    published: Option<String>,
    updated: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
}

fn api_url(path: &str, params: &[(&str, &str)]) -> Result<Url> {
    Url::parse_with_params(&format!("{}{}", API, path), params)
        .map_err(|e| ImportError::config(format!("bad Blogger request {}: {}", path, e)))
}

fn post_note(post: Post) -> Note {
    let title = match post.title.trim() {
        "" => format!("post-{}", post.id),
        t => t.to_string(),
    };
    let mut text = post.content;
    if !post.url.is_empty() {
        text.push_str(&format!(
            "\n\n---\n\n''Оригинал поста:'' <a href=\"{}\" target=\"_blank\">{}</a>",
            post.url, post.url
        ));
    }

    let mut note = Note::new(title, text, format_tags(&post.labels)).with_field("post-id", post.id);
    if !post.url.is_empty() {
        note = note.with_field("source-url", post.url);
    }
    let published = post.published.as_deref().and_then(parse_timestamp);
    let updated = post.updated.as_deref().and_then(parse_timestamp);
    if let Some(at) = published {
        note = note.with_timestamp(at);
    }
    if let Some(at) = updated {
        note.modified = at;
    }
    note
}

async fn resolve_blog<F: Fetch>(http: &F, api_key: &str, blog: &BlogRef) -> Result<Blog> {
    let (url, context) = match blog {
        BlogRef::Url(u) => (
            api_url("/blogs/byurl", &[("url", u.as_str()), ("key", api_key)])?,
            format!("blogger blog {}", u),
        ),
        BlogRef::Id(id) => (
            api_url(&format!("/blogs/{}", id), &[("key", api_key)])?,
            format!("blogger blog {}", id),
        ),
    };
    let response = http.get(url.as_str()).await?.require_success(&context)?;
    response.json()
}

/// Every post of a Blogger blog, after the blog's site notes.
pub async fn convert<F: Fetch>(http: &F, api_key: &str, blog: &BlogRef) -> Result<Vec<Note>> {
    if api_key.trim().is_empty() {
        return Err(ImportError::config("blogger needs --api_key"));
    }
    let info = resolve_blog(http, api_key, blog).await?;
    info!("Importing Blogger blog {} ({})", info.name, info.id);

    let mut notes = vec![
        Note::system("$:/SiteTitle", &info.name),
        Note::system("$:/SiteSubtitle", &info.description),
    ];

    let path = format!("/blogs/{}/posts", info.id);
    let context = format!("blogger posts of {}", info.id);
    let mut token: Option<String> = None;
    let mut page = 1;
    loop {
        if page > 1 {
            tokio::time::sleep(PAGE_DELAY).await;
        }
        let mut params = vec![("key", api_key), ("maxResults", PAGE_SIZE)];
        if let Some(t) = token.as_deref() {
            params.push(("pageToken", t));
        }
        let url = api_url(&path, &params)?;

        let response = http.get(url.as_str()).await?;
        if !response.is_success() {
            if page > 1 {
                info!("{}: page {} returned {}, stopping", context, page, response.status);
                break;
            }
            return Err(ImportError::Status {
                context,
                status: response.status,
            });
        }
        let list: PostList = response.json()?;
        if list.items.is_empty() {
            break;
        }
        info!("{}: {} posts on page {}", context, list.items.len(), page);
        notes.extend(list.items.into_iter().map(post_note));

        match list.next_page_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
        page += 1;
    }
    Ok(notes)
}

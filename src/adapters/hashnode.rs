use std::sync::LazyLock;

use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::parse_timestamp;
use crate::error::{ImportError, Result};
use crate::http::Fetch;
use crate::note::{children_trailer, format_tags, link_tag, Note};

pub const ENDPOINT: &str = "https://gql.hashnode.com/";
const PAGE_SIZE: u32 = 20;

static TAG_JUNK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9-]+").unwrap());

const HOST_QUERY: &str = r#"query UserHost($username: String!) {
  user(username: $username) {
    publications(first: 1) { edges { node { host } } }
  }
}"#;

const POSTS_QUERY: &str = r#"query PublicationPosts($host: String!, $first: Int!, $after: String) {
  publication(host: $host) {
    posts(first: $first, after: $after) {
      pageInfo { endCursor hasNextPage }
      edges { node {
        title slug publishedAt
        content { markdown }
        tags { name slug }
        comments(first: 50) { edges { node {
          author { name } content { text } dateAdded
          replies(first: 50) { edges { node { author { name } content { text } dateAdded } } }
        } } }
      } }
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
struct UserHostData {
    user: Option<UserNode>,
}

#[derive(Debug, Deserialize)]
struct UserNode {
    publications: Connection<HostNode>,
}

#[derive(Debug, Deserialize)]
struct HostNode {
    host: String,
}

#[derive(Debug, Deserialize)]
struct PostsData {
    publication: Option<Publication>,
}

#[derive(Debug, Deserialize)]
struct Publication {
    posts: PostPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostPage {
    page_info: PageInfo,
    edges: Vec<Edge<Post>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Post {
    title: String,
    slug: String,
    published_at: Option<String>,
    content: Content,
    #[serde(default)]
    tags: Vec<Tag>,
    comments: Connection<Comment>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Comment {
    author: Author,
    content: Content,
    date_added: Option<String>,
    replies: Option<Connection<Reply>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reply {
    author: Author,
    content: Content,
    date_added: Option<String>,
}

/// Run one GraphQL operation; a non-empty `errors` array or missing `data`
/// is a dependency error.
async fn query<F, T>(http: &F, context: &str, query: &str, variables: serde_json::Value) -> Result<T>
where
    F: Fetch,
    T: DeserializeOwned,
{
    let body = json!({ "query": query, "variables": variables });
    let response = http.post_json(ENDPOINT, &body).await?.require_success(context)?;
    let reply: GraphQlResponse<T> = response.json()?;
    if !reply.errors.is_empty() {
        let messages: Vec<&str> = reply.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(ImportError::dependency(context, messages.join("; ")));
    }
    reply
        .data
        .ok_or_else(|| ImportError::dependency(context, "response carries no data"))
}

/// Tag name reduced to `[A-Za-z0-9-]`, spaces becoming dashes.
pub fn sanitize_tag(tag: &str) -> String {
    TAG_JUNK_RE.replace_all(&tag.replace(' ', "-"), "").into_owned()
}

pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

fn quote(text: &str, author: &str) -> String {
    format!("<blockquote>{}</blockquote>\n\n''- {}''", text, author)
}

fn stamped(note: Note, at: Option<&str>) -> Note {
    match at.and_then(parse_timestamp) {
        Some(at) => note.with_timestamp(at),
        None => note,
    }
}

async fn resolve_host<F: Fetch>(http: &F, username: &str) -> Result<String> {
    info!("Looking up publication host for {}", username);
    let context = format!("hashnode user {}", username);
    let data: UserHostData = query(http, &context, HOST_QUERY, json!({ "username": username })).await?;
    data.user
        .and_then(|u| u.publications.edges.into_iter().next())
        .map(|edge| edge.node.host)
        .ok_or_else(|| ImportError::dependency(context, "user has no publications"))
}

/// Post note followed by its comment and reply notes.
fn post_notes(post: Post, host: &str) -> Vec<Note> {
    let comments = post.comments.edges;
    let mut text = markdown_to_html(&post.content.markdown);
    if !comments.is_empty() {
        text.push_str(&children_trailer(&post.title));
    }
    let tags = format_tags(post.tags.iter().map(|t| sanitize_tag(&t.name)));
    let head = Note::new(&post.title, text, tags)
        .with_field("post-slug", &post.slug)
        .with_field("source-url", format!("https://{}/{}", host, post.slug));

    let mut notes = vec![stamped(head, post.published_at.as_deref())];
    for (n, edge) in comments.into_iter().enumerate() {
        let comment = edge.node;
        let replies = comment.replies.map(|r| r.edges).unwrap_or_default();
        let title = format!("«{}»: комментарий {} от {}", post.title, n + 1, comment.author.name);

        let mut body = quote(&comment.content.text, &comment.author.name);
        if !replies.is_empty() {
            body.push_str(&children_trailer(&title));
        }
        let note = Note::new(&title, body, format!("comment {}", link_tag(&post.title)))
            .with_field("parent-post", &post.slug);
        notes.push(stamped(note, comment.date_added.as_deref()));

        for (m, reply) in replies.into_iter().enumerate() {
            let reply = reply.node;
            let reply_title = format!(
                "«{}»: ответ {}.{} от {}",
                post.title,
                n + 1,
                m + 1,
                reply.author.name
            );
            let note = Note::new(
                reply_title,
                quote(&reply.content.text, &reply.author.name),
                format!("comment reply {}", link_tag(&title)),
            )
            .with_field("parent-post", &post.slug);
            notes.push(stamped(note, reply.date_added.as_deref()));
        }
    }
    notes
}

/// Every post of a publication, located by `host` or by the first
/// publication of `username`.
pub async fn convert<F: Fetch>(http: &F, username: Option<&str>, host: Option<&str>) -> Result<Vec<Note>> {
    let host = match (host.filter(|h| !h.is_empty()), username.filter(|u| !u.is_empty())) {
        (Some(host), _) => host.to_string(),
        (None, Some(user)) => resolve_host(http, user).await?,
        (None, None) => return Err(ImportError::config("hashnode needs --user or --host")),
    };
    info!("Importing Hashnode publication {}", host);

    let context = format!("hashnode host {}", host);
    let mut notes = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let variables = json!({ "host": host, "first": PAGE_SIZE, "after": cursor });
        let data: PostsData = query(http, &context, POSTS_QUERY, variables).await?;
        let page = data
            .publication
            .ok_or_else(|| ImportError::dependency(&context, "publication not found"))?
            .posts;

        if page.edges.is_empty() && notes.is_empty() {
            return Err(ImportError::dependency(&context, "no posts found"));
        }
        info!("{}: {} posts, more: {}", context, page.edges.len(), page.page_info.has_next_page);
        for edge in page.edges {
            notes.extend(post_notes(edge.node, &host));
        }

        if !page.page_info.has_next_page {
            break;
        }
        match page.page_info.end_cursor {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            stalled => {
                warn!("{}: next page announced without a new cursor ({:?}), stopping", context, stalled);
                break;
            }
        }
    }

    notes.push(Note::system("$:/SiteTitle", "Hashnode"));
    notes.push(Note::system("$:/SiteSubtitle", host));
    Ok(notes)
}

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::info;

use super::parse_timestamp;
use crate::error::{ImportError, Result};
use crate::note::{children_trailer, format_tags, Note};
use crate::threads::{materialize, CommentRecord};

#[derive(Debug, Default)]
struct Item {
    title: String,
    link: String,
    pub_date: String,
    content: String,
    post_id: String,
    post_type: String,
    status: String,
    tags: Vec<String>,
    comments: Vec<Comment>,
}

#[derive(Debug, Default)]
struct Comment {
    id: i64,
    parent: i64,
    author: String,
    date_gmt: String,
    content: String,
    approved: Option<String>,
}

impl Comment {
    fn is_approved(&self) -> bool {
        self.approved.as_deref().map_or(true, |a| a.trim() == "1")
    }

    fn into_record(self) -> CommentRecord {
        CommentRecord {
            id: self.id,
            parent_id: self.parent,
            author: self.author,
            body: Some(self.content),
            created: parse_timestamp(&self.date_gmt),
            date: Some(self.date_gmt).filter(|d| !d.trim().is_empty()),
            url: None,
        }
    }
}

fn published(pub_date: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(pub_date.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Notes for one `<item>`; empty unless it is a published post.
fn item_notes(item: Item) -> Vec<Note> {
    if item.post_type != "post" || item.status != "publish" {
        return Vec::new();
    }
    let title = match item.title.trim() {
        "" => format!("post-{}", item.post_id),
        t => t.to_string(),
    };

    let records: Vec<CommentRecord> = item
        .comments
        .into_iter()
        .filter(Comment::is_approved)
        .map(Comment::into_record)
        .collect();
    let comment_notes = materialize(&title, &records);

    let mut text = item.content;
    if !item.link.is_empty() {
        text.push_str(&format!(
            "\n\n---\n\n''Оригинал поста:'' <a href=\"{}\" target=\"_blank\">{}</a>",
            item.link, item.link
        ));
    }
    if !comment_notes.is_empty() {
        text.push_str(&children_trailer(&title));
    }

    let mut note = Note::new(&title, text, format_tags(&item.tags)).with_field("post-id", item.post_id);
    if !item.link.is_empty() {
        note = note.with_field("source-url", item.link);
    }
    if let Some(at) = published(&item.pub_date) {
        note = note.with_timestamp(at);
    }

    let mut notes = vec![note];
    notes.extend(comment_notes);
    notes
}

/// Stream a WXR document, emitting notes item by item.
pub fn parse<R: BufRead>(mut reader: Reader<R>) -> Result<Vec<Note>> {
    let mut notes = Vec::new();
    let mut item: Option<Item> = None;
    let mut comment: Option<Comment> = None;
    let mut category_domain: Option<String> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                text.clear();
                match e.name().as_ref() {
                    b"item" => item = Some(Item::default()),
                    b"wp:comment" if item.is_some() => comment = Some(Comment::default()),
                    b"category" => {
                        category_domain = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"domain")
                            .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                    }
                    _ => {}
                }
            }
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::End(e) => {
                let value = std::mem::take(&mut text);
                match e.name().as_ref() {
                    b"item" => {
                        if let Some(done) = item.take() {
                            notes.extend(item_notes(done));
                        }
                    }
                    b"wp:comment" => {
                        if let (Some(it), Some(c)) = (item.as_mut(), comment.take()) {
                            it.comments.push(c);
                        }
                    }
                    name => {
                        if let Some(c) = comment.as_mut() {
                            match name {
                                b"wp:comment_id" => c.id = value.trim().parse().unwrap_or(0),
                                b"wp:comment_parent" => c.parent = value.trim().parse().unwrap_or(0),
                                b"wp:comment_author" => c.author = value.trim().to_string(),
                                b"wp:comment_date_gmt" => c.date_gmt = value,
                                b"wp:comment_content" => c.content = value,
                                b"wp:comment_approved" => c.approved = Some(value),
                                _ => {}
                            }
                        } else if let Some(it) = item.as_mut() {
                            match name {
                                b"title" => it.title = value,
                                b"link" => it.link = value.trim().to_string(),
                                b"pubDate" => it.pub_date = value,
                                b"content:encoded" => it.content = value,
                                b"wp:post_id" => it.post_id = value.trim().to_string(),
                                b"wp:post_type" => it.post_type = value.trim().to_string(),
                                b"wp:status" => it.status = value.trim().to_string(),
                                b"category" => {
                                    if category_domain.take().as_deref() == Some("post_tag") {
                                        it.tags.push(value.trim().to_string());
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(notes)
}

/// Import a WordPress export file.
pub fn convert(path: &Path) -> Result<Vec<Note>> {
    info!("Reading WordPress export {}", path.display());
    let file = File::open(path).map_err(|e| ImportError::file(path, e))?;
    let notes = parse(Reader::from_reader(BufReader::new(file)))?;
    info!("{}: {} notes", path.display(), notes.len());
    Ok(notes)
}

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::note::{children_trailer, link_tag, Note};

pub const HIDDEN_COMMENT: &str = "''Комментарий скрыт или удален.''";

/// One comment as delivered by a source, before threading.
#[derive(Debug, Clone, Default)]
pub struct CommentRecord {
    pub id: i64,
    /// 0 for a top-level comment.
    pub parent_id: i64,
    pub author: String,
    /// `None` when the source hides or deleted the text.
    pub body: Option<String>,
    /// Human-readable date shown in the note body.
    pub date: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

pub fn comment_title(post_title: &str, id: i64) -> String {
    format!("{}-comment-{}", post_title, id)
}

/// Turn a flat comment list into notes whose tags encode the reply tree.
///
/// First pass records each comment's (known) parent and which comments have
/// children; second pass emits in input order. A parent id that matches no
/// comment in the batch makes the comment a direct reply to the post.
pub fn materialize(post_title: &str, records: &[CommentRecord]) -> Vec<Note> {
    let known: HashSet<i64> = records.iter().filter(|r| r.id != 0).map(|r| r.id).collect();

    let mut parent_of: HashMap<i64, i64> = HashMap::new();
    let mut has_children: HashSet<i64> = HashSet::new();
    for r in records.iter().filter(|r| r.id != 0) {
        if r.parent_id != 0 && r.parent_id != r.id && known.contains(&r.parent_id) {
            parent_of.insert(r.id, r.parent_id);
            has_children.insert(r.parent_id);
        }
    }

    records
        .iter()
        .filter(|r| r.id != 0)
        .map(|r| {
            let title = comment_title(post_title, r.id);
            let parent_title = match parent_of.get(&r.id) {
                Some(pid) => comment_title(post_title, *pid),
                None => post_title.to_string(),
            };

            let mut text = render_body(r);
            if has_children.contains(&r.id) {
                text.push_str(&children_trailer(&title));
            }

            let note = Note::new(title, text, link_tag(&parent_title));
            match r.created {
                Some(at) => note.with_timestamp(at),
                None => note,
            }
        })
        .collect()
}

fn render_body(r: &CommentRecord) -> String {
    let mut text = format!("''Автор:'' {}\n", r.author);
    if let Some(date) = r.date.as_deref().filter(|d| !d.is_empty()) {
        text.push_str(&format!("''Дата:'' {}\n", date));
    }
    if let Some(url) = r.url.as_deref().filter(|u| !u.is_empty()) {
        text.push_str(&format!(
            "''Ссылка:'' <a href=\"{}\" target=\"_blank\">{}</a>\n",
            url, url
        ));
    }
    text.push_str("\n---\n\n");
    match r.body.as_deref().filter(|b| !b.trim().is_empty()) {
        Some(body) => text.push_str(body),
        None => text.push_str(HIDDEN_COMMENT),
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: i64, parent_id: i64) -> CommentRecord {
        CommentRecord {
            id,
            parent_id,
            author: format!("user{}", id),
            body: Some(format!("text {}", id)),
            ..Default::default()
        }
    }

    #[test]
    fn builds_tag_tree_and_trailers() {
        let notes = materialize("P", &[rec(10, 0), rec(11, 10), rec(12, 11), rec(13, 0)]);

        let titles: Vec<&str> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["P-comment-10", "P-comment-11", "P-comment-12", "P-comment-13"]);

        let tags: Vec<&str> = notes.iter().map(|n| n.tags.as_str()).collect();
        assert_eq!(tags, ["[[P]]", "[[P-comment-10]]", "[[P-comment-11]]", "[[P]]"]);

        let trailer = |n: &Note| n.text.ends_with(&children_trailer(&n.title));
        assert!(trailer(&notes[0]));
        assert!(trailer(&notes[1]));
        assert!(!notes[2].text.contains("list-links"));
        assert!(!notes[3].text.contains("list-links"));
    }

    #[test]
    fn unknown_parent_hangs_off_the_post() {
        let notes = materialize("P", &[rec(5, 99), rec(6, 6)]);
        assert_eq!(notes[0].tags, "[[P]]");
        assert_eq!(notes[1].tags, "[[P]]");
        assert!(notes.iter().all(|n| !n.text.contains("list-links")));
    }

    #[test]
    fn every_tag_points_at_an_emitted_title() {
        let records = [rec(1, 0), rec(2, 1), rec(3, 2), rec(4, 42), rec(5, 3), rec(0, 1)];
        let notes = materialize("Post", &records);
        assert_eq!(notes.len(), 5);
        let mut titles: HashSet<String> = notes.iter().map(|n| n.title.clone()).collect();
        titles.insert("Post".to_string());
        for n in &notes {
            let target = n.tags.trim_start_matches("[[").trim_end_matches("]]");
            assert!(titles.contains(target), "dangling tag {}", n.tags);
        }
    }

    #[test]
    fn body_layout_and_placeholder() {
        let mut r = rec(7, 0);
        r.body = None;
        r.date = Some("2020-01-02 03:04".into());
        r.url = Some("https://x.example.com/1.html?thread=7".into());
        let note = &materialize("P", &[r])[0];
        assert_eq!(
            note.text,
            "''Автор:'' user7\n''Дата:'' 2020-01-02 03:04\n''Ссылка:'' <a href=\"https://x.example.com/1.html?thread=7\" target=\"_blank\">https://x.example.com/1.html?thread=7</a>\n\n---\n\n''Комментарий скрыт или удален.''"
        );
        assert!(!note.text.is_empty());
    }

    #[test]
    fn source_timestamp_sets_both_dates() {
        let at = Utc::now() - chrono::Duration::days(400);
        let mut r = rec(1, 0);
        r.created = Some(at);
        let note = &materialize("P", &[r])[0];
        assert_eq!(note.created, at);
        assert_eq!(note.modified, at);
    }
}

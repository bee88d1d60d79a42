use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// `YYYYMMDDhhmmssSSS`, always 17 digits.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

const BUILTIN_KEYS: &[&str] = &["title", "text", "tags", "created", "modified"];

/// One content record of the output wiki.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub title: String,
    pub text: String,
    pub tags: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub fields: BTreeMap<String, String>,
}

impl Note {
    pub fn new(title: impl Into<String>, text: impl Into<String>, tags: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            title: title.into(),
            text: text.into(),
            tags: tags.into(),
            created: now,
            modified: now,
            fields: BTreeMap::new(),
        }
    }

    /// Reserved `$:/...` note read by the template itself.
    pub fn system(title: &str, text: impl Into<String>) -> Self {
        Self::new(title, text, "")
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.created = at;
        self.modified = at;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Flat JSON object: built-in keys first, then side-fields. A side-field
/// that shadows a built-in key is dropped.
impl Serialize for Note {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("title", &self.title)?;
        map.serialize_entry("text", &self.text)?;
        if !self.tags.is_empty() {
            map.serialize_entry("tags", &self.tags)?;
        }
        map.serialize_entry("created", &format_timestamp(&self.created))?;
        map.serialize_entry("modified", &format_timestamp(&self.modified))?;
        for (key, value) in &self.fields {
            if BUILTIN_KEYS.contains(&key.as_str()) {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Join tags into the wiki's tag string; tags containing spaces get `[[ ]]`.
pub fn format_tags<I, S>(tags: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .map(|t| if t.contains(' ') { link_tag(&t) } else { t })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tag pointing at another note, always bracketed.
pub fn link_tag(title: &str) -> String {
    format!("[[{}]]", title)
}

/// Directive that makes the wiki list every note tagged with `title`.
pub fn list_links(title: &str) -> String {
    format!("<<list-links \"[tag[{}]]\">>", title)
}

/// Separator + list-links directive appended to non-leaf notes.
pub fn children_trailer(title: &str) -> String {
    format!("\n\n---\n\n{}", list_links(title))
}

use std::sync::LazyLock;

use base64::Engine;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Result;
use crate::http::Fetch;
use crate::note::Note;

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

const USERPIC_KEY: &str = "\"url_userpic\":\"";

/// Split `"<title>: <blog> — <platform>"` into site title and subtitle.
pub fn split_site_title(full: &str) -> (String, String) {
    let (main, platform) = match full.split_once(" — ") {
        Some((main, platform)) => (main, platform.trim()),
        None => (full, ""),
    };
    match main.rfind(": ") {
        Some(idx) => {
            let title = main[..idx].trim().to_string();
            let blog = main[idx + 1..].trim();
            let subtitle = if platform.is_empty() {
                blog.to_string()
            } else {
                format!("{}: {}", blog, platform)
            };
            (title, subtitle)
        }
        None => (main.trim().to_string(), platform.to_string()),
    }
}

/// Page `<title>` text and the first `"url_userpic"` found in inline scripts.
pub fn scan_home_page(html: &str) -> (String, Option<String>) {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>())
        .unwrap_or_default();

    let userpic = document.select(&SCRIPT).find_map(|script| {
        let source: String = script.text().collect();
        let start = source.find(USERPIC_KEY)? + USERPIC_KEY.len();
        let rest = &source[start..];
        let end = rest.find('"')?;
        Some(rest[..end].replace("\\/", "/"))
    });

    (title, userpic)
}

/// `$:/SiteTitle`, `$:/SiteSubtitle`, `$:/DefaultTiddlers` and, when the
/// userpic can be fetched, `$:/favicon.ico`, built from the blog's home page.
pub async fn system_notes<F: Fetch>(http: &F, origin: &Url) -> Result<Vec<Note>> {
    let page = http.get(origin.as_str()).await?.require_success(origin.as_str())?;
    let (full_title, userpic) = scan_home_page(&page.text());
    let (title, subtitle) = split_site_title(&full_title);
    info!("Site title: {:?} / {:?}", title, subtitle);

    let mut notes = vec![
        Note::system("$:/SiteTitle", title),
        Note::system("$:/SiteSubtitle", subtitle),
        Note::system("$:/DefaultTiddlers", "[list[$:/StoryList]]"),
    ];

    let Some(userpic) = userpic else {
        debug!("No url_userpic on {}", origin);
        return Ok(notes);
    };
    let Ok(icon_url) = origin.join(&userpic) else {
        return Ok(notes);
    };
    match http.get(icon_url.as_str()).await {
        Ok(icon) if icon.is_success() => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&icon.body);
            let mut favicon = Note::system("$:/favicon.ico", encoded);
            if let Some(kind) = icon.content_type {
                favicon = favicon.with_field("type", kind);
            }
            notes.push(favicon);
        }
        Ok(icon) => warn!("Favicon {} returned {}", icon_url, icon.status),
        Err(e) => warn!("Favicon {} failed: {}", icon_url, e),
    }
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeFetch;

    #[test]
    fn splits_full_title() {
        assert_eq!(
            split_site_title("Заметки: Блог Ивана — LiveJournal"),
            ("Заметки".to_string(), "Блог Ивана: LiveJournal".to_string())
        );
        assert_eq!(
            split_site_title("Just a blog — LiveJournal"),
            ("Just a blog".to_string(), "LiveJournal".to_string())
        );
        assert_eq!(
            split_site_title("A: B: C"),
            ("A: B".to_string(), "C".to_string())
        );
        assert_eq!(split_site_title(""), (String::new(), String::new()));
    }

    #[test]
    fn finds_userpic_in_script() {
        let html = r#"<html><head><title>T: B — LJ</title>
            <script>var a = 1;</script>
            <script>Site.remote = {"url_userpic":"https:\/\/l-userpic.example.com\/1\/2"};</script>
            </head><body></body></html>"#;
        let (title, userpic) = scan_home_page(html);
        assert_eq!(title, "T: B — LJ");
        assert_eq!(userpic.as_deref(), Some("https://l-userpic.example.com/1/2"));
    }

    #[tokio::test]
    async fn builds_system_notes_with_favicon() {
        let home = r#"<html><head><title>T: B — LJ</title>
            <script>{"url_userpic":"https:\/\/pics.example.com\/u.png"}</script></head></html>"#;
        let http = FakeFetch::new()
            .route("http://x.example.com/", 200, home)
            .route_typed("https://pics.example.com/u.png", 200, Some("image/png"), vec![1u8, 2, 3]);
        let origin = Url::parse("http://x.example.com/").unwrap();
        let notes = system_notes(&http, &origin).await.unwrap();

        let titles: Vec<&str> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["$:/SiteTitle", "$:/SiteSubtitle", "$:/DefaultTiddlers", "$:/favicon.ico"]);
        assert_eq!(notes[0].text, "T");
        assert_eq!(notes[1].text, "B: LJ");
        assert_eq!(notes[2].text, "[list[$:/StoryList]]");
        assert_eq!(notes[3].text, "AQID");
        assert_eq!(notes[3].fields["type"], "image/png");
    }

    #[tokio::test]
    async fn missing_favicon_is_skipped() {
        let home = r#"<html><head><title>T</title>
            <script>{"url_userpic":"https:\/\/pics.example.com\/gone.png"}</script></head></html>"#;
        let http = FakeFetch::new().route("http://x.example.com/", 200, home);
        let origin = Url::parse("http://x.example.com/").unwrap();
        let notes = system_notes(&http, &origin).await.unwrap();
        assert_eq!(notes.len(), 3);
    }
}

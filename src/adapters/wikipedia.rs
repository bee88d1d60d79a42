//! Wikimedia article import: one MediaWiki `action=parse` call, split into
//! navbox, infobox, related-project, intro, section and category notes.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, NoExpand, Regex};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

use crate::error::{ImportError, Result};
use crate::http::Fetch;
use crate::note::{link_tag, Note};

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static NAVBOX: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".navbox").unwrap());

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static H1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<h1.*?>(.*?)</h1>").unwrap());
static INFOBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<table class="infobox.*?</table>"#).unwrap());
static RELATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<table[^>]*?class="ts-Родственный_проект.*?>.*?</table>"#).unwrap());
static HEADER_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<h[2-4].*?>(.*?)</h[2-4]>").unwrap());
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)(<(h[2-4]).*?>.*?/h\d>)").unwrap());
static EDITSECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^\s*(?:<span class="[^"]*?mw-editsection[^"]*?">.*?</span>)?</div>"#).unwrap()
});
static HEADING_WRAPPER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<div class="mw-heading[^"]*">\s*$"#).unwrap());
static BACKLINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<span class="mw-cite-backlink">.*?</span>"#).unwrap());
static MBOX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?s)<table class="mbox.*?</table>"#).unwrap());
static WIKIDATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<span class="wikidata-editlink">.*?</span>"#).unwrap());
static FOOTNOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"(?s)<sup id="cite_ref-[^"]+" class="reference"><a href="#[^"]+">.*?</a></sup>"##).unwrap()
});
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<a\s+([^>]+)>").unwrap());
static WIKI_HREF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="/wiki/([^"]+)""#).unwrap());
static EMPTY_P_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<p class="mw-empty-elt">\s*</p>"#).unwrap());

const NOTES_KEYWORDS: &[&str] = &["Примечания", "References", "Сноски", "Notes"];
const SKIP_CLASSES: &[&str] = &["navbar", "navbox-toggler", "mw-collapsible-toggle"];
const TEMPLATE_PREFIXES: &[&str] = &["/wiki/Template:", "/wiki/Шаблон:"];

/// Wikimedia project derived from `<lang>.<project>.<tld>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub language: String,
    pub name: String,
    pub domain: String,
}

impl Project {
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url.host_str().unwrap_or_default();
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < 3 {
            return Err(ImportError::config(format!(
                "cannot derive a wiki project from host {:?}, expected lang.project.org",
                host
            )));
        }
        Ok(Self {
            language: labels[0].to_string(),
            name: labels[1].to_string(),
            domain: host.to_string(),
        })
    }

    fn tag(&self, role: &str, import_tag: &str) -> String {
        format!("{}-{} {}", self.name, role, import_tag)
    }

    fn api_url(&self, params: &[(&str, &str)]) -> Result<Url> {
        Url::parse_with_params(&format!("https://{}/w/api.php", self.domain), params)
            .map_err(|e| ImportError::config(format!("bad API URL for {}: {}", self.domain, e)))
    }

    pub fn parse_url(&self, title: &str) -> Result<Url> {
        self.api_url(&[
            ("action", "parse"),
            ("page", title),
            ("prop", "text"),
            ("format", "json"),
            ("disabletoc", "true"),
        ])
    }

    /// `https://<domain>/wiki/<title>` with the title as one percent-encoded
    /// path segment, spaces written as `_`.
    pub fn article_url(&self, title: &str) -> Result<Url> {
        let bad = || ImportError::config(format!("cannot build article URL on {}", self.domain));
        let mut url = Url::parse(&format!("https://{}/wiki/", self.domain)).map_err(|_| bad())?;
        url.path_segments_mut()
            .map_err(|_| bad())?
            .pop_if_empty()
            .push(&title.replace(' ', "_"));
        Ok(url)
    }

    pub fn categories_url(&self, title: &str) -> Result<Url> {
        self.api_url(&[
            ("action", "query"),
            ("prop", "categories"),
            ("titles", title),
            ("format", "json"),
            ("cllimit", "max"),
            ("clshow", "!hidden"),
        ])
    }
}

/// Percent-decoded article name from a `/wiki/<title>` path.
pub fn article_title(url: &Url) -> Result<String> {
    let encoded = url
        .path()
        .strip_prefix("/wiki/")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ImportError::config(format!("URL path {:?} has no /wiki/ article", url.path())))?;
    // form_urlencoded treats `+` as a space and splits on `&` and `=`.
    let escaped = encoded.replace('+', "%2B").replace('&', "%26").replace('=', "%3D");
    Ok(form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(title, _)| title.into_owned())
        .unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct ParseReply {
    parse: Option<ParseBody>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ParseBody {
    text: ParseText,
}

#[derive(Debug, Deserialize)]
struct ParseText {
    #[serde(rename = "*")]
    html: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct CategoryReply {
    query: Option<CategoryQuery>,
}

#[derive(Debug, Deserialize)]
struct CategoryQuery {
    #[serde(default)]
    pages: BTreeMap<String, CategoryPage>,
}

#[derive(Debug, Deserialize)]
struct CategoryPage {
    #[serde(default)]
    categories: Vec<CategoryTitle>,
}

#[derive(Debug, Deserialize)]
struct CategoryTitle {
    title: String,
}

fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").trim().to_string()
}

fn has_class(el: &ElementRef<'_>, names: &[&str]) -> bool {
    el.value().classes().any(|c| names.contains(&c))
}

fn is_skipped(el: &ElementRef<'_>) -> bool {
    has_class(el, SKIP_CLASSES) || matches!(el.value().name(), "style" | "script")
}

/// Visible text of an element, without navbar widgets.
fn extract_text(el: ElementRef<'_>) -> String {
    if is_skipped(&el) {
        return String::new();
    }
    let mut out = String::new();
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            out.push_str(&extract_text(child));
        }
    }
    out.trim().to_string()
}

/// Depth-first search for the first element (self included) matching tag
/// and class, not descending into nested navboxes.
fn find_child<'a>(el: ElementRef<'a>, tag: Option<&str>, class: Option<&str>) -> Option<ElementRef<'a>> {
    let tag_ok = tag.map_or(true, |t| el.value().name() == t);
    let class_ok = class.map_or(true, |c| has_class(&el, &[c]));
    if tag_ok && class_ok {
        return Some(el);
    }
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| !has_class(c, &["navbox"]))
        .find_map(|c| find_child(c, tag, class))
}

fn quoted(text: &str) -> String {
    if text.split_whitespace().count() > 1 {
        format!("\"{}\"", text)
    } else {
        text.to_string()
    }
}

/// Flattens a navbox into a one-line bracketed outline ("ASON"), emitting a
/// separate note for every collapsible sub-navbox.
struct NavboxWriter<'p> {
    domain: &'p str,
    base_tag: &'p str,
}

impl NavboxWriter<'_> {
    fn space(out: &mut String) {
        if !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
    }

    fn title(&self, node: ElementRef<'_>, out: &mut String) {
        let text = extract_text(node);
        if text.is_empty() {
            return;
        }
        Self::space(out);
        let shown = quoted(&text);
        match find_child(node, Some("a"), None).and_then(|a| a.value().attr("href")) {
            Some(href) => out.push_str(&format!(
                "<b><a href=\"https://{}{}\" target=\"_blank\">{}</a></b>",
                self.domain, href, shown
            )),
            None => out.push_str(&format!("<b>{}</b>", shown)),
        }
    }

    fn write(&self, node: ElementRef<'_>, out: &mut String, parent_title: &str) -> Vec<Note> {
        if is_skipped(&node) || has_class(&node, &["navbox-title"]) {
            return Vec::new();
        }
        if has_class(&node, &["navbox-group"]) {
            self.title(node, out);
            return Vec::new();
        }
        if node.value().name() == "a" {
            let href = node.value().attr("href").unwrap_or_default();
            if !TEMPLATE_PREFIXES.iter().any(|p| href.starts_with(p)) {
                let text = extract_text(node);
                if !text.is_empty() {
                    Self::space(out);
                    out.push_str(&format!(
                        "<a href=\"https://{}{}\" target=\"_blank\">{}</a>",
                        self.domain,
                        href,
                        quoted(&text)
                    ));
                }
            }
            return Vec::new();
        }

        let is_list = has_class(&node, &["navbox-list", "navbox-abovebelow"]);
        if is_list {
            Self::space(out);
            out.push_str("<b>[</b> ");
        }

        let mut notes = Vec::new();
        for child in node.children() {
            if let Some(text) = child.value().as_text() {
                let text = text.trim();
                if !matches!(text, "" | "•" | "·" | "|") {
                    Self::space(out);
                    out.push_str(text);
                }
                continue;
            }
            let Some(child) = ElementRef::wrap(child) else {
                continue;
            };
            if has_class(&child, &["navbox-subgroup"]) && has_class(&child, &["mw-collapsible"]) {
                let name = find_child(child, None, Some("navbox-title"))
                    .map(extract_text)
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "Вложенный шаблон".to_string());
                let sub_title = format!("{} / {}", parent_title, name);
                Self::space(out);
                out.push_str(&format!("<b>{}</b>", link_tag(&sub_title)));

                let mut sub = String::new();
                let deeper = self.write(child, &mut sub, &sub_title);
                debug!("Sub-navbox note {:?}", sub_title);
                notes.push(Note::new(
                    &sub_title,
                    sub.trim(),
                    format!("{} {}", self.base_tag, link_tag(parent_title)),
                ));
                notes.extend(deeper);
            } else {
                notes.extend(self.write(child, out, parent_title));
            }
        }

        if is_list {
            let trimmed = out.trim_end_matches(' ').len();
            out.truncate(trimmed);
            out.push_str(" <b>]</b>");
        }
        notes
    }
}

/// Emit notes for every root navbox and return the remaining body HTML
/// with those navboxes removed.
fn extract_navboxes(html: &str, page_title: &str, project: &Project, base_tag: &str) -> (Vec<Note>, String) {
    let mut document = Html::parse_document(html);
    let writer = NavboxWriter {
        domain: &project.domain,
        base_tag,
    };

    let mut notes = Vec::new();
    let mut detached = Vec::new();
    let roots: Vec<ElementRef<'_>> = document
        .select(&NAVBOX)
        .filter(|nb| {
            !nb.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| has_class(&a, &["navbox"]))
        })
        .collect();

    for (i, navbox) in roots.into_iter().enumerate() {
        let name = find_child(navbox, None, Some("navbox-title"))
            .map(extract_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Нижний шаблон {}", i + 1));
        let title = format!("{}: {}", page_title, name);

        let mut outline = String::new();
        notes.extend(writer.write(navbox, &mut outline, &title));
        let outline = outline.trim();
        if outline.is_empty() {
            warn!("Navbox {:?} produced no outline, skipping", name);
        } else {
            info!("Navbox note {:?}", title);
            notes.push(Note::new(&title, outline, base_tag));
        }
        detached.push(navbox.id());
    }

    for id in detached {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
    let body = document
        .select(&BODY)
        .next()
        .map(|b| b.inner_html())
        .unwrap_or_default();
    (notes, body)
}

/// The light HTML rewrites applied to every emitted fragment.
fn cleanup_html(html: &str, page_title: &str, domain: &str, notes_section: Option<&str>) -> String {
    let mut cleaned = MBOX_RE.replace_all(html, "").into_owned();
    cleaned = WIKIDATA_RE.replace_all(&cleaned, "").into_owned();
    if let Some(section) = notes_section {
        let link = format!("[[*|{}: {}]]", page_title, section);
        cleaned = FOOTNOTE_RE.replace_all(&cleaned, NoExpand(&link)).into_owned();
    }
    cleaned = cleaned
        .replace("src=\"//", "src=\"https://")
        .replace("srcset=\"//", "srcset=\"https://");
    cleaned = ANCHOR_RE
        .replace_all(&cleaned, |caps: &Captures| {
            let absolute = format!("href=\"https://{}/wiki/${{1}}\"", domain);
            let tag = WIKI_HREF_RE.replace_all(&caps[0], absolute.as_str()).into_owned();
            if tag.contains("target=") {
                tag
            } else {
                tag.replacen('>', " target=\"_blank\" rel=\"noopener noreferrer\">", 1)
            }
        })
        .into_owned();
    cleaned = EMPTY_P_RE.replace_all(&cleaned, "").into_owned();

    let cleaned = cleaned.trim();
    match cleaned.strip_suffix("</div>") {
        Some(rest) => rest.trim().to_string(),
        None => cleaned.to_string(),
    }
}

fn notes_section_title(html: &str) -> Option<String> {
    HEADER_TEXT_RE
        .captures_iter(html)
        .map(|caps| strip_tags(&caps[1]))
        .find(|title| {
            let lower = title.to_lowercase();
            NOTES_KEYWORDS.iter().any(|k| k.to_lowercase() == lower)
        })
}

/// Note title for a section, nesting H3/H4 under the enclosing headings.
struct SectionPath {
    h2: Option<String>,
    h3: Option<String>,
}

impl SectionPath {
    fn enter(&mut self, level: &str, name: &str) -> String {
        match level {
            "h2" => {
                self.h2 = Some(name.to_string());
                self.h3 = None;
                name.to_string()
            }
            "h3" => {
                self.h3 = Some(name.to_string());
                match &self.h2 {
                    Some(h2) => format!("{} / {}", h2, name),
                    None => name.to_string(),
                }
            }
            _ => match (&self.h2, &self.h3) {
                (Some(h2), Some(h3)) => format!("{} / {} / {}", h2, h3, name),
                (Some(h2), None) => format!("{} / {}", h2, name),
                _ => name.to_string(),
            },
        }
    }
}

/// Split one parsed article into notes. Categories are added by the caller.
pub fn split_article(html: &str, article: &str, project: &Project, page_url: &str) -> Vec<Note> {
    let page_title = H1_RE
        .captures(html)
        .map(|caps| strip_tags(&caps[1]))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| article.replace('_', " "));
    let import_tag = format!("{}-{}", project.name, article.to_lowercase());
    let template_tag = project.tag("шаблон", &import_tag);
    info!("Splitting article {:?}", page_title);

    let (mut notes, mut body) = extract_navboxes(html, &page_title, project, &template_tag);

    if let Some(m) = INFOBOX_RE.find(&body) {
        let (range, infobox) = (m.range(), cleanup_html(m.as_str(), &page_title, &project.domain, None));
        notes.push(Note::new(format!("{}: Шаблон-карточка", page_title), infobox, &template_tag));
        body.replace_range(range, "");
    }
    if let Some(m) = RELATED_RE.find(&body) {
        let (range, related) = (m.range(), cleanup_html(m.as_str(), &page_title, &project.domain, None));
        notes.push(Note::new(
            format!("{}: Родственные проекты", page_title),
            related,
            project.tag("ссылки", &import_tag),
        ));
        body.replace_range(range, "");
    }

    let notes_section = notes_section_title(&body);
    let body = cleanup_html(&body, &page_title, &project.domain, notes_section.as_deref());

    let headers: Vec<(String, String)> = HEADER_RE
        .captures_iter(&body)
        .map(|caps| (strip_tags(&caps[1]), caps[2].to_string()))
        .collect();
    let mut pieces = HEADER_RE.split(&body);

    let intro = pieces.next().unwrap_or_default();
    let intro = HEADING_WRAPPER_RE.replace(intro.trim(), "");
    let intro = format!(
        "{}<p><br><i>Источник: <a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a></i></p>",
        intro.trim(),
        page_url,
        page_url
    );
    notes.push(
        Note::new(&page_title, intro, project.tag("статья", &import_tag)).with_field("source-url", page_url),
    );

    let mut path = SectionPath { h2: None, h3: None };
    for ((name, level), piece) in headers.iter().zip(pieces) {
        let mut content = EDITSECTION_RE.replace(piece, "").trim().to_string();
        content = HEADING_WRAPPER_RE.replace(&content, "").trim().to_string();
        if notes_section.as_deref() == Some(name.as_str()) {
            content = BACKLINK_RE.replace_all(&content, "").into_owned();
        }
        let title = format!("{}: {}", page_title, path.enter(level, name));
        notes.push(Note::new(title, content, project.tag("раздел", &import_tag)));
    }
    notes
}

fn categories_note(categories: &[String], page_title: &str, project: &Project, import_tag: &str) -> Result<Note> {
    let mut items = Vec::with_capacity(categories.len());
    for cat in categories {
        let name = cat
            .strip_prefix("Категория:")
            .or_else(|| cat.strip_prefix("Category:"))
            .unwrap_or(cat);
        items.push(format!(
            "<li><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a></li>",
            project.article_url(cat)?,
            name
        ));
    }
    Ok(Note::new(
        format!("{}: Категории", page_title),
        format!("<ul>\n{}\n</ul>", items.join("\n")),
        project.tag("категории", import_tag),
    ))
}

async fn fetch_article<F: Fetch>(http: &F, project: &Project, article: &str) -> Result<String> {
    let url = project.parse_url(article)?;
    let context = format!("wiki article {}", article);
    let reply: ParseReply = http.get(url.as_str()).await?.require_success(&context)?.json()?;
    if let Some(error) = reply.error {
        return Err(ImportError::dependency(context, error.info));
    }
    reply
        .parse
        .map(|p| p.text.html)
        .filter(|html| !html.trim().is_empty())
        .ok_or_else(|| ImportError::dependency(context, "no article HTML in response"))
}

async fn fetch_categories<F: Fetch>(http: &F, project: &Project, article: &str) -> Result<Vec<String>> {
    let url = project.categories_url(article)?;
    let context = format!("categories of {}", article);
    let reply: CategoryReply = http.get(url.as_str()).await?.require_success(&context)?.json()?;
    Ok(reply
        .query
        .map(|q| {
            q.pages
                .into_values()
                .flat_map(|p| p.categories)
                .map(|c| c.title)
                .collect()
        })
        .unwrap_or_default())
}

/// Import one article given its `https://<lang>.<project>.org/wiki/<title>` URL.
pub async fn convert<F: Fetch>(http: &F, page_url: &str) -> Result<Vec<Note>> {
    let url = Url::parse(page_url)
        .map_err(|e| ImportError::config(format!("invalid wiki URL {:?}: {}", page_url, e)))?;
    let project = Project::from_url(&url)?;
    let article = article_title(&url)?;
    info!(
        "Importing {} article {:?} ({} edition) from {}",
        project.name, article, project.language, project.domain
    );

    let html = fetch_article(http, &project, &article).await?;
    debug!("{} bytes of article HTML", html.len());
    let mut notes = split_article(&html, &article, &project, page_url);

    match fetch_categories(http, &project, &article).await {
        Ok(categories) if !categories.is_empty() => {
            let page_title = notes
                .iter()
                .find(|n| n.fields.contains_key("source-url"))
                .map(|n| n.title.clone())
                .unwrap_or_else(|| article.replace('_', " "));
            let import_tag = format!("{}-{}", project.name, article.to_lowercase());
            match categories_note(&categories, &page_title, &project, &import_tag) {
                Ok(note) => notes.push(note),
                Err(e) => warn!("Categories of {:?} skipped: {}", article, e),
            }
        }
        Ok(_) => {}
        Err(e) => warn!("Categories of {:?} unavailable: {}", article, e),
    }
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeFetch;

    fn project() -> Project {
        Project::from_url(&Url::parse("https://ru.wikipedia.org/wiki/Rust").unwrap()).unwrap()
    }

    const NAVBOX: &str = concat!(
        r#"<div class="navbox"><table>"#,
        r#"<tr><th class="navbox-title"><span class="navbar">v t e</span><a href="/wiki/Lang">Languages</a></th></tr>"#,
        r#"<tr><th class="navbox-group">Compiled</th><td class="navbox-list"><a href="/wiki/Rust">Rust</a> • <a href="/wiki/C_lang">C language</a> <a href="/wiki/Template:Nav">edit</a></td></tr>"#,
        r#"<tr><td class="navbox-subgroup mw-collapsible"><table><tr><th class="navbox-title">Old ones</th></tr>"#,
        r#"<tr><td class="navbox-list"><a href="/wiki/Fortran">Fortran</a></td></tr></table></td></tr>"#,
        r#"</table></div>"#,
    );

    fn article() -> String {
        format!(
            concat!(
                r#"<div class="mw-content-ltr mw-parser-output" lang="ru">"#,
                r#"<table class="infobox"><tr><td>Box</td></tr></table>"#,
                r#"<table class="mbox-small"><tr><td>warning</td></tr></table>"#,
                r##"<p>Intro <a href="/wiki/Mozilla">Mozilla</a><sup id="cite_ref-1" class="reference"><a href="#cite_note-1">[1]</a></sup></p>"##,
                r#"<img src="//upload.example.org/a.png">"#,
                r#"<p class="mw-empty-elt"> </p>"#,
                r#"<div class="mw-heading mw-heading2"><h2 id="History">History</h2><span class="mw-editsection"><span class="mw-editsection-bracket">[</span><a href="/w/index.php?edit">edit</a><span class="mw-editsection-bracket">]</span></span></div>"#,
                r#"<p>Early days</p>"#,
                r#"<div class="mw-heading mw-heading3"><h3 id="Origins">Origins</h3></div>"#,
                r#"<p>Graydon</p>"#,
                r#"<div class="mw-heading mw-heading4"><h4 id="Name">Name</h4></div>"#,
                r#"<p>Fungus</p>"#,
                r#"<div class="mw-heading mw-heading2"><h2 id="Notes">Примечания</h2></div>"#,
                r##"<ol><li><span class="mw-cite-backlink"><a href="#cite_ref-1">^</a></span> Source</li></ol>"##,
                "{}",
                "</div>",
            ),
            NAVBOX
        )
    }

    #[test]
    fn derives_project_and_title() {
        let p = project();
        assert_eq!((p.language.as_str(), p.name.as_str(), p.domain.as_str()), ("ru", "wikipedia", "ru.wikipedia.org"));
        assert!(Project::from_url(&Url::parse("https://localhost/wiki/X").unwrap()).is_err());

        let url = Url::parse("https://ru.wikipedia.org/wiki/%D0%A0%D0%B0%D1%81%D1%82_(%D1%8F%D0%B7%D1%8B%D0%BA)").unwrap();
        assert_eq!(article_title(&url).unwrap(), "Раст_(язык)");
        let url = Url::parse("https://en.wikipedia.org/wiki/C++").unwrap();
        assert_eq!(article_title(&url).unwrap(), "C++");
        let url = Url::parse("https://en.wikipedia.org/wiki/AT%26T").unwrap();
        assert_eq!(article_title(&url).unwrap(), "AT&T");
        assert!(article_title(&Url::parse("https://en.wikipedia.org/w/index.php").unwrap()).is_err());
    }

    #[test]
    fn flattens_navbox_with_sub_navbox() {
        let p = project();
        let (notes, body) = extract_navboxes(&format!("<div>{}</div><p>rest</p>", NAVBOX), "Rust", &p, "base");
        let titles: Vec<&str> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["Rust: Languages / Old ones", "Rust: Languages"]);

        assert_eq!(
            notes[1].text,
            concat!(
                r#"<b>Compiled</b> <b>[</b> <a href="https://ru.wikipedia.org/wiki/Rust" target="_blank">Rust</a> "#,
                r#"<a href="https://ru.wikipedia.org/wiki/C_lang" target="_blank">"C language"</a> <b>]</b> "#,
                r#"<b>[[Rust: Languages / Old ones]]</b>"#,
            )
        );
        assert_eq!(notes[1].tags, "base");
        assert_eq!(
            notes[0].text,
            r#"<b>[</b> <a href="https://ru.wikipedia.org/wiki/Fortran" target="_blank">Fortran</a> <b>]</b>"#
        );
        assert_eq!(notes[0].tags, "base [[Rust: Languages]]");

        assert!(!body.contains("navbox"));
        assert!(body.contains("<p>rest</p>"));
    }

    #[test]
    fn splits_article_into_notes() {
        let p = project();
        let notes = split_article(&article(), "Rust", &p, "https://ru.wikipedia.org/wiki/Rust");
        let titles: Vec<&str> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(
            titles,
            [
                "Rust: Languages / Old ones",
                "Rust: Languages",
                "Rust: Шаблон-карточка",
                "Rust",
                "Rust: History",
                "Rust: History / Origins",
                "Rust: History / Origins / Name",
                "Rust: Примечания",
            ]
        );

        assert_eq!(notes[1].tags, "wikipedia-шаблон wikipedia-rust");
        assert_eq!(notes[2].tags, "wikipedia-шаблон wikipedia-rust");
        assert!(notes[2].text.contains("Box"));

        let intro = &notes[3];
        assert_eq!(intro.tags, "wikipedia-статья wikipedia-rust");
        assert_eq!(intro.fields["source-url"], "https://ru.wikipedia.org/wiki/Rust");
        assert!(intro.text.contains(
            r#"<a href="https://ru.wikipedia.org/wiki/Mozilla" target="_blank" rel="noopener noreferrer">Mozilla</a>"#
        ));
        assert!(intro.text.contains("[[*|Rust: Примечания]]"));
        assert!(intro.text.contains(r#"src="https://upload.example.org/a.png""#));
        assert!(!intro.text.contains("mbox"));
        assert!(!intro.text.contains("infobox"));
        assert!(!intro.text.contains("mw-empty-elt"));
        assert!(!intro.text.contains("mw-heading"));
        assert!(intro.text.ends_with("</a></i></p>"));

        assert_eq!(notes[4].tags, "wikipedia-раздел wikipedia-rust");
        assert_eq!(notes[4].text, "<p>Early days</p>");
        assert_eq!(notes[5].text, "<p>Graydon</p>");
        assert_eq!(notes[6].text, "<p>Fungus</p>");
        assert!(!notes[7].text.contains("mw-cite-backlink"));
        assert!(notes[7].text.contains("Source"));
    }

    #[test]
    fn heading_nesting() {
        let mut path = SectionPath { h2: None, h3: None };
        assert_eq!(path.enter("h4", "Deep"), "Deep");
        assert_eq!(path.enter("h3", "Mid"), "Mid");
        assert_eq!(path.enter("h2", "Top"), "Top");
        assert_eq!(path.enter("h4", "Leaf"), "Top / Leaf");
        assert_eq!(path.enter("h3", "Mid"), "Top / Mid");
        assert_eq!(path.enter("h4", "Leaf"), "Top / Mid / Leaf");
    }

    #[tokio::test]
    async fn converts_article_with_categories() {
        let p = project();
        let parse = serde_json::json!({ "parse": { "text": { "*": article() } } });
        let categories = r#"{"query":{"pages":{"123":{"categories":[
            {"title":"Категория:Языки программирования"},{"title":"Category:Rust"}
        ]}}}}"#;
        let http = FakeFetch::new()
            .route(p.parse_url("Rust").unwrap().as_str(), 200, parse.to_string())
            .route(p.categories_url("Rust").unwrap().as_str(), 200, categories);

        let notes = convert(&http, "https://ru.wikipedia.org/wiki/Rust").await.unwrap();
        let last = notes.last().unwrap();
        assert_eq!(last.title, "Rust: Категории");
        assert_eq!(last.tags, "wikipedia-категории wikipedia-rust");
        assert!(last.text.starts_with("<ul>\n<li>"));
        assert!(last.text.contains(">Языки программирования</a></li>"));
        assert!(last.text.contains(
            "href=\"https://ru.wikipedia.org/wiki/%D0%9A%D0%B0%D1%82%D0%B5%D0%B3%D0%BE%D1%80%D0%B8%D1%8F:%D0%AF%D0%B7%D1%8B%D0%BA%D0%B8_%D0%BF%D1%80%D0%BE%D0%B3%D1%80%D0%B0%D0%BC%D0%BC%D0%B8%D1%80%D0%BE%D0%B2%D0%B0%D0%BD%D0%B8%D1%8F\""
        ));
        assert!(last.text.contains(">Rust</a></li>\n</ul>"));
    }

    #[test]
    fn article_urls_keep_plus_and_encode_spaces() {
        let p = project();
        assert_eq!(
            p.article_url("Category:C++ family").unwrap().as_str(),
            "https://ru.wikipedia.org/wiki/Category:C++_family"
        );
        assert_eq!(
            p.article_url("AC/DC?").unwrap().as_str(),
            "https://ru.wikipedia.org/wiki/AC%2FDC%3F"
        );
    }

    #[tokio::test]
    async fn missing_categories_are_not_fatal() {
        let p = project();
        let parse = serde_json::json!({ "parse": { "text": { "*": "<p>Only intro</p>" } } });
        let http = FakeFetch::new().route(p.parse_url("Rust").unwrap().as_str(), 200, parse.to_string());
        let notes = convert(&http, "https://ru.wikipedia.org/wiki/Rust").await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].text.starts_with("<p>Only intro</p>"));
    }

    #[tokio::test]
    async fn api_error_is_a_dependency_error() {
        let p = project();
        let http = FakeFetch::new().route(
            p.parse_url("Rust").unwrap().as_str(),
            200,
            r#"{"error":{"code":"missingtitle","info":"The page you specified doesn't exist."}}"#,
        );
        let err = convert(&http, "https://ru.wikipedia.org/wiki/Rust").await.unwrap_err();
        assert!(matches!(err, ImportError::Dependency { .. }));
    }
}

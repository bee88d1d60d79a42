//! Archive crawler for LiveJournal-style blogs: classify the user URL, emit
//! the site preamble, walk archive pages for post permalinks and fetch the
//! posts with bounded parallelism.

pub mod archive;
pub mod classify;
pub mod post;
pub mod preamble;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};
use url::Url;

use crate::error::{ImportError, Result};
use crate::http::Fetch;
use crate::note::Note;
use classify::{blog_months, classify, year_months, UrlKind};

const CONCURRENCY: usize = 10;
const LINK_BUFFER: usize = 100;

/// Blog host specifics the crawler cannot infer from the pages.
#[derive(Debug, Clone, Copy)]
pub struct Provider {
    pub name: &'static str,
    /// First year a whole-blog walk enumerates.
    pub start_year: i32,
    /// Suffix stripped from `<title>` when a post has no `og:title`.
    pub title_suffix: &'static str,
}

pub const LIVEJOURNAL: Provider = Provider {
    name: "LiveJournal",
    start_year: 1999,
    title_suffix: " — ЖЖ",
};

/// All notes reachable from `url`: system notes first, then posts with
/// their comments in worker completion order.
pub async fn convert_blog<F>(http: Arc<F>, provider: Provider, url: &str) -> Result<Vec<Note>>
where
    F: Fetch + 'static,
{
    let start = Url::parse(url)
        .map_err(|e| ImportError::config(format!("invalid blog URL {:?}: {}", url, e)))?;
    let origin = start
        .join("/")
        .map_err(|e| ImportError::config(format!("invalid blog URL {:?}: {}", url, e)))?;

    let mut notes = match preamble::system_notes(http.as_ref(), &origin).await {
        Ok(system) => system,
        Err(e) => {
            warn!("Site preamble for {} failed: {}", origin, e);
            Vec::new()
        }
    };

    let kind = classify(url);
    info!("{} {} URL classified as {:?}", provider.name, url, kind);
    let (pages, strict) = match kind {
        UrlKind::Post => {
            notes.extend(post::fetch_post(http.as_ref(), url, provider.title_suffix).await?);
            return Ok(notes);
        }
        UrlKind::Day | UrlKind::Month => (vec![url.to_string()], true),
        UrlKind::Year => (year_months(url), false),
        UrlKind::Blog => (
            blog_months(origin.as_str(), provider.start_year, Utc::now().year()),
            false,
        ),
    };

    notes.extend(crawl(http, provider, pages, strict).await?);
    Ok(notes)
}

/// Producer → dispatcher → collector pipeline over the archive pages.
async fn crawl<F>(http: Arc<F>, provider: Provider, pages: Vec<String>, strict: bool) -> Result<Vec<Note>>
where
    F: Fetch + 'static,
{
    info!("Walking {} archive pages", pages.len());
    let (link_tx, mut link_rx) = mpsc::channel::<String>(LINK_BUFFER);
    let (notes_tx, mut notes_rx) = mpsc::channel::<Vec<Note>>(CONCURRENCY);

    let producer = tokio::spawn(discover(Arc::clone(&http), pages, strict, link_tx));

    let dispatcher = tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
        while let Some(link) = link_rx.recv().await {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let http = Arc::clone(&http);
            let tx = notes_tx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match post::fetch_post(http.as_ref(), &link, provider.title_suffix).await {
                    Ok(notes) => {
                        let _ = tx.send(notes).await;
                    }
                    Err(e) => warn!("Post {} failed: {}", link, e),
                }
            });
        }
        // Workers hold the remaining senders; the collector ends when the last one finishes.
        drop(notes_tx);
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {pos} posts, {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    let mut collected = Vec::new();
    while let Some(batch) = notes_rx.recv().await {
        collected.extend(batch);
        spinner.inc(1);
        spinner.set_message(format!("{} notes", collected.len()));
    }
    let posts = spinner.position();
    spinner.finish_and_clear();

    dispatcher
        .await
        .map_err(|e| ImportError::dependency("post dispatcher", e.to_string()))?;
    producer
        .await
        .map_err(|e| ImportError::dependency("archive walk", e.to_string()))??;

    info!("Collected {} posts ({} notes)", posts, collected.len());
    Ok(collected)
}

/// Walk archive pages in order, streaming each new permalink to `tx`.
///
/// With `strict`, any page failure (404 included) ends the walk with an
/// error; otherwise 404s are expected absences and other failures are
/// logged and skipped.
async fn discover<F: Fetch>(
    http: Arc<F>,
    pages: Vec<String>,
    strict: bool,
    tx: mpsc::Sender<String>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for page in pages {
        let page_url = match Url::parse(&page) {
            Ok(u) => u,
            Err(e) => {
                warn!("Skipping archive {}: {}", page, e);
                continue;
            }
        };

        let response = match http.get(&page).await {
            Ok(r) if r.status == 404 && !strict => {
                info!("No archive at {}", page);
                continue;
            }
            Ok(r) => r.require_success(&page),
            Err(e) => Err(e),
        };
        let response = match response {
            Ok(r) => r,
            Err(e) if strict => return Err(e),
            Err(e) => {
                warn!("Archive {} failed: {}", page, e);
                continue;
            }
        };

        let links = archive::post_links(&response.text(), &page_url);
        info!("{}: {} posts", page, links.len());
        for link in links {
            if seen.insert(link.clone()) && tx.send(link).await.is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}

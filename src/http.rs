use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{ImportError, Result};

/// Pause between successive page requests of a paginated API.
pub const PAGE_DELAY: Duration = Duration::from_millis(250);

/// Fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Fail with `ImportError::Status` unless 2xx.
    pub fn require_success(self, context: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ImportError::Status {
                context: context.to_string(),
                status: self.status,
            })
        }
    }
}

/// HTTP surface used by every adapter and the crawler.
pub trait Fetch: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = Result<Response>> + Send;

    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> impl Future<Output = Result<Response>> + Send;
}

/// reqwest-backed client: per-request timeout and a desktop User-Agent.
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> Result<Response> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        Ok(Response {
            status,
            content_type,
            body,
        })
    }
}

impl Fetch for HttpClient {
    async fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<Response> {
        debug!("POST {}", url);
        let response = self.client.post(url).json(body).send().await?;
        Self::read(response).await
    }
}

/// Walk a page-numbered REST listing starting at page 1.
///
/// Stops on an empty page or on a non-OK status after the first page; a
/// non-OK first page is fatal. Sleeps `PAGE_DELAY` before every request
/// after the first.
pub async fn paginate<F, T>(
    http: &F,
    context: &str,
    page_url: impl Fn(u32) -> String,
    decode: impl Fn(&Response) -> Result<Vec<T>>,
) -> Result<Vec<T>>
where
    F: Fetch,
{
    let mut all = Vec::new();
    let mut page = 1;
    loop {
        if page > 1 {
            tokio::time::sleep(PAGE_DELAY).await;
        }
        let response = http.get(&page_url(page)).await?;
        if !response.is_success() {
            if page > 1 {
                info!("{}: page {} returned {}, stopping", context, page, response.status);
                break;
            }
            return Err(ImportError::Status {
                context: context.to_string(),
                status: response.status,
            });
        }
        let items = decode(&response)?;
        if items.is_empty() {
            break;
        }
        info!("{}: {} items on page {}", context, items.len(), page);
        all.extend(items);
        page += 1;
    }
    Ok(all)
}

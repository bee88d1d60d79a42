use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::adapters::blogger::BlogRef;
use crate::adapters::{blogger, hashnode, wikipedia, wordpress, wxr};
use crate::config::{ImportConfig, Platform};
use crate::crawler::{self, LIVEJOURNAL};
use crate::error::{ImportError, Result};
use crate::http::Fetch;
use crate::note::Note;

/// A validated import request: exactly one adapter and its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Hashnode {
        username: Option<String>,
        host: Option<String>,
    },
    WordpressXml(PathBuf),
    WordpressApi(String),
    Blogger {
        api_key: String,
        blog: BlogRef,
    },
    Wikipedia(String),
    LiveJournal(String),
}

fn given(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl Source {
    /// Pick the adapter for `cfg`. Fails on missing flags without any I/O.
    pub fn resolve(cfg: &ImportConfig) -> Result<Self> {
        let url = given(&cfg.url);
        match cfg.platform {
            Platform::Hashnode => {
                let username = given(&cfg.username);
                let host = match (given(&cfg.host), &url) {
                    (Some(host), _) => Some(host),
                    (None, Some(url)) => {
                        let parsed = Url::parse(url).map_err(|e| {
                            ImportError::config(format!("invalid Hashnode URL {:?}: {}", url, e))
                        })?;
                        parsed.host_str().map(str::to_string)
                    }
                    (None, None) => None,
                };
                if username.is_none() && host.is_none() {
                    return Err(ImportError::config("hashnode needs --url, --host or --user"));
                }
                Ok(Self::Hashnode { username, host })
            }
            Platform::Wordpress => match (&cfg.xml_path, url) {
                (Some(path), _) if !path.as_os_str().is_empty() => Ok(Self::WordpressXml(path.clone())),
                (_, Some(url)) => Ok(Self::WordpressApi(url)),
                _ => Err(ImportError::config("wordpress needs --url or --xml_path")),
            },
            Platform::Blogger => {
                let api_key =
                    given(&cfg.api_key).ok_or_else(|| ImportError::config("blogger needs --api_key"))?;
                let blog = match (url, given(&cfg.blog_id)) {
                    (Some(url), _) => BlogRef::Url(url),
                    (None, Some(id)) => BlogRef::Id(id),
                    (None, None) => return Err(ImportError::config("blogger needs --url or --blog_id")),
                };
                Ok(Self::Blogger { api_key, blog })
            }
            Platform::Wikipedia => url
                .map(Self::Wikipedia)
                .ok_or_else(|| ImportError::config("wikipedia needs --url")),
            Platform::Livejournal => url
                .map(Self::LiveJournal)
                .ok_or_else(|| ImportError::config("livejournal needs --url")),
        }
    }

    /// Run the selected adapter.
    pub async fn convert<F: Fetch + 'static>(self, http: Arc<F>) -> Result<Vec<Note>> {
        info!("Running import: {:?}", self);
        match self {
            Self::Hashnode { username, host } => {
                hashnode::convert(http.as_ref(), username.as_deref(), host.as_deref()).await
            }
            Self::WordpressXml(path) => wxr::convert(&path),
            Self::WordpressApi(url) => wordpress::convert(http.as_ref(), &url).await,
            Self::Blogger { api_key, blog } => blogger::convert(http.as_ref(), &api_key, &blog).await,
            Self::Wikipedia(url) => wikipedia::convert(http.as_ref(), &url).await,
            Self::LiveJournal(url) => crawler::convert_blog(http, LIVEJOURNAL, &url).await,
        }
    }
}

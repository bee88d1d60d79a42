use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::Deserialize;

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Source platforms selectable with `--platform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Platform {
    Hashnode,
    Wordpress,
    Blogger,
    Wikipedia,
    Livejournal,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hashnode => "hashnode",
            Self::Wordpress => "wordpress",
            Self::Blogger => "blogger",
            Self::Wikipedia => "wikipedia",
            Self::Livejournal => "livejournal",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user asked to import, straight from the command line.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub platform: Platform,
    pub url: Option<String>,
    pub username: Option<String>,
    pub host: Option<String>,
    pub xml_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub blog_id: Option<String>,
}

impl ImportConfig {
    #[cfg(test)]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            url: None,
            username: None,
            host: None,
            xml_path: None,
            api_key: None,
            blog_id: None,
        }
    }

    /// `<base>_import.html`, base = first non-empty of blog id, url, host,
    /// username, platform; scheme stripped, `/` → `_`.
    pub fn output_file_name(&self) -> String {
        let base = [&self.blog_id, &self.url, &self.host, &self.username]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .find(|v| !v.is_empty())
            .unwrap_or(self.platform.as_str());
        let base = base
            .replace("http://", "")
            .replace("https://", "")
            .replace('/', "_");
        format!("{}_import.html", base)
    }
}

/// Ambient settings: built-in defaults, overridden by `TW_IMPORT_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub template_path: PathBuf,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Settings {
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("template_path", "template.html")?
            .set_default("timeout_secs", 30_i64)?
            .set_default("user_agent", DESKTOP_USER_AGENT)?
            .add_source(config::Environment::with_prefix("TW_IMPORT").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("template.html"),
            timeout_secs: 30,
            user_agent: DESKTOP_USER_AGENT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_prefers_blog_id() {
        let mut cfg = ImportConfig::new(Platform::Blogger);
        cfg.url = Some("https://x.blogspot.com/".into());
        cfg.blog_id = Some("12345".into());
        assert_eq!(cfg.output_file_name(), "12345_import.html");
    }

    #[test]
    fn output_name_strips_scheme_and_slashes() {
        let mut cfg = ImportConfig::new(Platform::Livejournal);
        cfg.blog_id = Some(String::new());
        cfg.url = Some("https://x.example.com/2020/07/".into());
        assert_eq!(cfg.output_file_name(), "x.example.com_2020_07__import.html");
    }

    #[test]
    fn output_name_falls_back_to_platform() {
        let cfg = ImportConfig::new(Platform::Hashnode);
        assert_eq!(cfg.output_file_name(), "hashnode_import.html");

        let mut cfg = ImportConfig::new(Platform::Hashnode);
        cfg.username = Some("alice".into());
        assert_eq!(cfg.output_file_name(), "alice_import.html");
    }

    #[test]
    fn settings_defaults() {
        let s = Settings::default();
        assert_eq!(s.timeout_secs, 30);
        assert!(s.user_agent.starts_with("Mozilla/5.0"));
    }
}

mod adapters;
mod config;
mod crawler;
mod dispatch;
mod emitter;
mod error;
mod http;
mod note;
mod threads;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::config::{ImportConfig, Platform, Settings};
use crate::dispatch::Source;
use crate::http::HttpClient;

#[derive(Parser)]
#[command(name = "tiddly_import", about = "Import a blog or wiki into a single-file TiddlyWiki")]
struct Cli {
    /// Source platform
    #[arg(long, value_enum)]
    platform: Platform,
    /// Blog, site or article URL
    #[arg(long)]
    url: Option<String>,
    /// Hashnode username
    #[arg(long)]
    user: Option<String>,
    /// Hashnode publication host
    #[arg(long)]
    host: Option<String>,
    /// WordPress WXR export file
    #[arg(long = "xml_path")]
    xml_path: Option<PathBuf>,
    /// Blogger API key
    #[arg(long = "api_key")]
    api_key: Option<String>,
    /// Blogger blog id
    #[arg(long = "blog_id")]
    blog_id: Option<String>,
    /// TiddlyWiki template (default: template.html or TW_IMPORT_TEMPLATE_PATH)
    #[arg(long)]
    template: Option<PathBuf>,
    /// Output file (default: derived from the source)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn import_config(&self) -> ImportConfig {
        ImportConfig {
            platform: self.platform,
            url: self.url.clone(),
            username: self.user.clone(),
            host: self.host.clone(),
            xml_path: self.xml_path.clone(),
            api_key: self.api_key.clone(),
            blog_id: self.blog_id.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("{}", error_line(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let t0 = Instant::now();

    let mut settings = Settings::load().context("reading TW_IMPORT_* settings")?;
    if let Some(template) = &cli.template {
        settings.template_path = template.clone();
    }

    let import = cli.import_config();
    let source = Source::resolve(&import)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(import.output_file_name()));

    let http = Arc::new(HttpClient::new(&settings)?);
    let notes = source
        .convert(http)
        .await
        .with_context(|| format!("{} import failed", import.platform))?;

    emitter::write_html(&notes, &settings.template_path, &output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("Imported {} notes into {}", notes.len(), output.display());
    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {}", format_duration(elapsed));
    }
    Ok(())
}

/// Whole context chain on one line.
fn error_line(e: &anyhow::Error) -> String {
    format!("error: {:#}", e)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::error::ImportError;

    #[test]
    fn fatal_error_is_one_line_naming_the_file() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "No such file or directory");
        let err = anyhow::Error::from(ImportError::file("/nonexistent.xml", missing))
            .context("wordpress import failed");
        let line = error_line(&err);
        assert_eq!(line, "error: wordpress import failed: /nonexistent.xml: No such file or directory");
        assert!(!line.contains('\n'));
    }
}

pub mod extractor;


use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info};
use url::Url;

use crate::config::CrawlerSettings;
use crate::llm::http::HttpTransport;
use crate::llm::run_blocking;

pub use self::extractor::{ExtractedText, extract_text};

const MAX_SLUG_LEN: usize = 120;

/// Settings for downloading raw pages
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub user_agent: String,
    pub timeout: Duration,
    /// Minimum gap between two consecutive requests
    pub politeness_delay: Duration,
    /// Total attempts per page, 5xx and transport errors are retried
    pub retry_attempts: u32,
}

impl Default for CrawlerConfig {
    #[inline]
    fn default() -> Self {
        Self::from(&CrawlerSettings::default())
    }
}

impl From<&CrawlerSettings> for CrawlerConfig {
    #[inline]
    fn from(settings: &CrawlerSettings) -> Self {
        Self {
            user_agent: settings.user_agent.trim().to_string(),
            timeout: Duration::from_secs(settings.timeout_secs),
            politeness_delay: Duration::from_millis(settings.politeness_delay_ms),
            retry_attempts: settings.retry_attempts,
        }
    }
}

/// A page downloaded by [`PageFetcher::fetch_page`]
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    pub fetched: usize,
    pub failed: usize,
    pub saved_files: Vec<PathBuf>,
}

/// Sequential page downloader for the `scrape` command
#[derive(Debug)]
pub struct PageFetcher {
    transport: HttpTransport,
    user_agent: String,
    politeness_delay: Duration,
    last_request: Option<Instant>,
}

impl PageFetcher {
    #[inline]
    pub fn new(config: CrawlerConfig) -> Self {
        Self {
            transport: HttpTransport::new(config.timeout, config.retry_attempts),
            user_agent: config.user_agent,
            politeness_delay: config.politeness_delay,
            last_request: None,
        }
    }

    /// Validate `url` and download it
    #[inline]
    pub async fn fetch_page(&mut self, url: &str) -> Result<FetchedPage> {
        let url = validate_url(url)?;
        self.wait_turn().await;

        let transport = self.transport.clone();
        let user_agent = self.user_agent.clone();
        let target = url.to_string();
        let html = run_blocking(move || {
            transport.get(&target, &[("User-Agent", user_agent.as_str())])
        })
        .await
        .with_context(|| format!("Failed to fetch {url}"))?;
        debug!("Fetched {} bytes from {}", html.len(), url);

        Ok(FetchedPage {
            url,
            html,
            fetched_at: Utc::now(),
        })
    }

    /// Fetch every URL into `raw_dir`. Failures are logged and counted.
    #[inline]
    pub async fn scrape_to_dir(&mut self, urls: &[String], raw_dir: &Path) -> Result<ScrapeStats> {
        fs::create_dir_all(raw_dir)
            .with_context(|| format!("Failed to create raw directory: {}", raw_dir.display()))?;

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(urls.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Fetching {msg}")
                    .context("Invalid progress template")?,
            )
        } else {
            ProgressBar::hidden()
        };

        let mut stats = ScrapeStats::default();
        for url in urls {
            bar.set_message(url.clone());
            match self.fetch_page(url).await {
                Ok(page) => {
                    let path = save_raw(raw_dir, &page)?;
                    info!("Saved {} to {}", page.url, path.display());
                    stats.fetched += 1;
                    stats.saved_files.push(path);
                }
                Err(e) => {
                    error!("Skipping {}: {:#}", url, e);
                    stats.failed += 1;
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        Ok(stats)
    }

    async fn wait_turn(&mut self) {
        if let Some(last) = self.last_request {
            let remaining = self.politeness_delay.saturating_sub(last.elapsed());
            if !remaining.is_zero() {
                debug!("Waiting {:?} before the next request", remaining);
                sleep(remaining).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

/// Validate and normalize a URL
#[inline]
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str.trim())
        .with_context(|| format!("Invalid URL format: {}", url_str))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!("URL must use HTTP or HTTPS scheme: {}", url_str));
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL must have a valid host: {}", url_str));
    }

    Ok(url)
}

/// File stem derived from host and path, e.g. `www-ut-ee-en-admissions`
#[inline]
pub fn slug_for_url(url: &Url) -> String {
    let raw = format!("{}{}", url.host_str().unwrap_or_default(), url.path());

    let mut slug = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug: String = slug.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "index".to_string()
    } else {
        slug.to_string()
    }
}

/// Write the page to `<raw_dir>/<slug>.html`, replacing any previous copy.
/// A leading HTML comment records where and when it was fetched.
#[inline]
pub fn save_raw(raw_dir: &Path, page: &FetchedPage) -> Result<PathBuf> {
    fs::create_dir_all(raw_dir)
        .with_context(|| format!("Failed to create raw directory: {}", raw_dir.display()))?;

    let path = raw_dir.join(format!("{}.html", slug_for_url(&page.url)));
    let content = format!(
        "<!-- source: {} fetched: {} -->\n{}",
        page.url,
        page.fetched_at.to_rfc3339(),
        page.html
    );
    fs::write(&path, content)
        .with_context(|| format!("Failed to write raw page: {}", path.display()))?;
    Ok(path)
}

/// Read a raw file as plain text. HTML is stripped down to its visible text.
#[inline]
pub fn read_raw_file(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read raw file: {}", path.display()))?;

    let is_html = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));

    if !is_html {
        return Ok(content);
    }

    let extracted = extract_text(&content)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    if extracted.title.is_empty() || extracted.text.starts_with(&extracted.title) {
        Ok(extracted.text)
    } else {
        Ok(format!("{}\n\n{}", extracted.title, extracted.text))
    }
}

/// Files in `dir` (non-recursive) whose extension is one of `extensions`,
/// sorted by path
#[inline]
pub fn list_raw_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read raw directory: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| wanted.iter().any(|w| w.eq_ignore_ascii_case(e)));
        if matches {
            files.push(path);
        }
    }

    files.sort();
    debug!("Found {} raw files in {}", files.len(), dir.display());
    Ok(files)
}

use std::time::Duration;

use futures_util::{stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::json;
use thiserror::Error;
use tokio::time::timeout;
use url::Url;

use crate::logging::Logger;
use crate::stations::{CatalogEntry, ResolvedUrl, StationId};
use crate::stream_format::UrlKind;

const STREAM_EXTENSIONS: &[&str] = &[".mp3", ".m3u8", ".aac", ".pls"];
const ANCHOR_KEYWORDS: &[&str] = &["stream", "listen"];

// Extension matches come before the keyword fallbacks in both tables.
const EXTENSION_PATTERN: &str = r#"(?i)(https?://[^\s'"]+\.(mp3|m3u8|aac|pls))"#;
const STREAM_KEYWORD_PATTERN: &str = r#"(?i)(https?://[^\s'"]+stream[^\s'"]*)"#;
const LISTEN_KEYWORD_PATTERN: &str = r#"(?i)(https?://[^\s'"]+listen[^\s'"]*)"#;
const RADIO_KEYWORD_PATTERN: &str = r#"(?i)(https?://[^\s'"]+radio[^\s'"]*)"#;
const LIVE_KEYWORD_PATTERN: &str = r#"(?i)(https?://[^\s'"]+live[^\s'"]*)"#;

static SCRIPT_PATTERNS: Lazy<[Regex; 5]> = Lazy::new(|| {
    [
        EXTENSION_PATTERN,
        STREAM_KEYWORD_PATTERN,
        LISTEN_KEYWORD_PATTERN,
        RADIO_KEYWORD_PATTERN,
        LIVE_KEYWORD_PATTERN,
    ]
    .map(|pattern| Regex::new(pattern).expect("script stream pattern should compile"))
});

// The raw body carries site navigation, so the broad "radio"/"live"
// keywords are left out here.
static BODY_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        EXTENSION_PATTERN,
        STREAM_KEYWORD_PATTERN,
        LISTEN_KEYWORD_PATTERN,
    ]
    .map(|pattern| Regex::new(pattern).expect("body stream pattern should compile"))
});

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },
    #[error("no stream url found in {url}")]
    NotFound { url: String },
}

impl ResolveError {
    pub fn reason(&self) -> &'static str {
        match self {
            ResolveError::FetchFailed { .. } => "fetch-failed",
            ResolveError::NotFound { .. } => "not-found",
        }
    }
}

#[derive(Debug, Default)]
pub struct ResolutionSummary {
    pub resolved: Vec<ResolvedUrl>,
    pub skipped: Vec<(StationId, ResolveError)>,
}

/// Turns catalog URLs (play pages, playlists, direct streams) into URLs an
/// encoder can open.
#[derive(Clone)]
pub struct StreamUrlResolver {
    client: Client,
    timeout: Duration,
    logger: Logger,
}

impl StreamUrlResolver {
    pub fn new(client: Client, timeout: Duration, logger: Logger) -> Self {
        Self {
            client,
            timeout,
            logger,
        }
    }

    pub async fn resolve(&self, url: &str) -> Result<String, ResolveError> {
        match UrlKind::classify(url) {
            UrlKind::Html => {
                let extracted = self.resolve_html(url).await?;
                match UrlKind::classify(&extracted) {
                    kind if kind.is_playlist() => Ok(self.resolve_playlist(&extracted, kind).await),
                    _ => Ok(extracted),
                }
            }
            kind @ (UrlKind::Pls | UrlKind::M3u) => Ok(self.resolve_playlist(url, kind).await),
            UrlKind::Direct => Ok(url.to_string()),
        }
    }

    pub async fn resolve_entry(&self, entry: &CatalogEntry) -> Result<ResolvedUrl, ResolveError> {
        let source_kind = UrlKind::classify(&entry.raw_url).source_kind();
        let url = self.resolve(&entry.raw_url).await?;
        Ok(ResolvedUrl {
            id: entry.id.clone(),
            url,
            source_kind,
        })
    }

    /// Resolves many entries with at most `max_workers` fetches in flight.
    /// Failures are logged and returned as skips; they never abort the batch.
    pub async fn resolve_all(
        &self,
        entries: Vec<CatalogEntry>,
        max_workers: usize,
    ) -> ResolutionSummary {
        let outcomes = stream::iter(entries)
            .map(|entry| async move {
                let outcome = self.resolve_entry(&entry).await;
                (entry, outcome)
            })
            .buffer_unordered(max_workers.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut summary = ResolutionSummary::default();
        for (entry, outcome) in outcomes {
            match outcome {
                Ok(resolved) => summary.resolved.push(resolved),
                Err(error) => {
                    self.logger.warn(
                        "resolve.skipped",
                        json!({
                            "stationId": entry.id,
                            "url": entry.raw_url,
                            "reason": error.reason(),
                            "error": error.to_string(),
                        }),
                    );
                    summary.skipped.push((entry.id, error));
                }
            }
        }
        summary
    }

    async fn resolve_html(&self, page_url: &str) -> Result<String, ResolveError> {
        self.logger
            .debug("resolve.html.fetching", json!({ "url": page_url }));
        let body = self.fetch_text(page_url).await?;
        let base = Url::parse(page_url).ok();
        match extract_stream_url(&body, base.as_ref()) {
            Some(found) => {
                self.logger.info(
                    "resolve.html.extracted",
                    json!({ "url": page_url, "streamUrl": found }),
                );
                Ok(found)
            }
            None => Err(ResolveError::NotFound {
                url: page_url.to_string(),
            }),
        }
    }

    /// Playlist problems are not fatal: the playlist URL itself is handed on
    /// and the encoder gets a chance to open it.
    async fn resolve_playlist(&self, url: &str, kind: UrlKind) -> String {
        let body = match self.fetch_text(url).await {
            Ok(body) => body,
            Err(error) => {
                self.logger.warn(
                    "resolve.playlist.fetch_failed",
                    json!({ "url": url, "error": error.to_string() }),
                );
                return url.to_string();
            }
        };
        match parse_playlist(kind, &body) {
            Some(entry) => {
                self.logger.info(
                    "resolve.playlist.extracted",
                    json!({ "url": url, "streamUrl": entry, "format": kind }),
                );
                entry
            }
            None => {
                self.logger.warn(
                    "resolve.playlist.no_entry",
                    json!({ "url": url, "format": kind }),
                );
                url.to_string()
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ResolveError> {
        let fetch_failed = |reason: String| ResolveError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| fetch_failed("timeout".into()))?
            .map_err(|err| fetch_failed(format!("network: {err}")))?;
        if !response.status().is_success() {
            return Err(fetch_failed(format!(
                "status-{}",
                response.status().as_u16()
            )));
        }
        timeout(self.timeout, response.text())
            .await
            .map_err(|_| fetch_failed("timeout".into()))?
            .map_err(|err| fetch_failed(format!("body: {err}")))
    }
}

/// Walks a play page looking for the stream it wraps. Strategies run in a
/// fixed order and the first hit wins.
pub fn extract_stream_url(body: &str, page_url: Option<&Url>) -> Option<String> {
    let document = Html::parse_document(body);

    from_audio_source(&document)
        .or_else(|| from_iframes(&document))
        .or_else(|| from_anchors(&document, page_url))
        .or_else(|| from_scripts(&document))
        .or_else(|| scan_patterns(body, &BODY_PATTERNS[..]))
}

fn from_audio_source(document: &Html) -> Option<String> {
    let audio = Selector::parse("audio").ok()?;
    let source = Selector::parse("source").ok()?;
    let element = document.select(&audio).next()?;
    element
        .select(&source)
        .next()
        .and_then(|node| node.value().attr("src"))
        .map(str::to_string)
}

fn from_iframes(document: &Html) -> Option<String> {
    let iframe = Selector::parse("iframe[src]").ok()?;
    document
        .select(&iframe)
        .filter_map(|node| node.value().attr("src"))
        .find(|src| {
            src.starts_with("http") && STREAM_EXTENSIONS.iter().any(|ext| src.contains(ext))
        })
        .map(str::to_string)
}

fn from_anchors(document: &Html, page_url: Option<&Url>) -> Option<String> {
    let anchor = Selector::parse("a[href]").ok()?;
    let href = document
        .select(&anchor)
        .filter_map(|node| node.value().attr("href"))
        .find(|href| {
            STREAM_EXTENSIONS.iter().any(|ext| href.ends_with(ext))
                || ANCHOR_KEYWORDS.iter().any(|keyword| href.contains(keyword))
        })?;

    if href.starts_with("http") {
        return Some(href.to_string());
    }
    let origin = page_url.and_then(|page| Url::parse(&page.origin().ascii_serialization()).ok());
    match origin {
        Some(origin) => origin.join(href).ok().map(|joined| joined.to_string()),
        None => Some(href.to_string()),
    }
}

fn from_scripts(document: &Html) -> Option<String> {
    let script = Selector::parse("script").ok()?;
    document.select(&script).find_map(|node| {
        let text: String = node.text().collect();
        if text.trim().is_empty() {
            return None;
        }
        scan_patterns(&text, &SCRIPT_PATTERNS[..])
    })
}

fn scan_patterns(text: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|matched| matched.as_str().to_string())
    })
}

/// First stream entry of a playlist body. PLS files use the `File1=` key;
/// M3U files list URLs one per line.
pub fn parse_playlist(kind: UrlKind, body: &str) -> Option<String> {
    let lines = body.lines().map(str::trim);
    match kind {
        UrlKind::Pls => lines
            .filter(|line| line.to_ascii_lowercase().starts_with("file1="))
            .filter_map(|line| line.split_once('=').map(|(_, value)| value.trim()))
            .find(|candidate| candidate.to_ascii_lowercase().starts_with("http"))
            .map(str::to_string),
        UrlKind::M3u => lines
            .into_iter()
            .find(|line| line.starts_with("http"))
            .map(str::to_string),
        UrlKind::Html | UrlKind::Direct => None,
    }
}

use serde::Serialize;
use url::Url;

use crate::stations::SourceKind;

const HTML_SUFFIXES: &[&str] = &[".htm", ".html"];
const MANIFEST_SUFFIXES: &[&str] = &[".m3u8", ".m3u", ".pls"];

/// Shape of a catalog URL, judged from its path suffix alone.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum UrlKind {
    Html,
    Pls,
    M3u,
    Direct,
}

impl UrlKind {
    pub fn classify(url: &str) -> Self {
        let path = url_path(url).to_ascii_lowercase();
        if HTML_SUFFIXES.iter().any(|suffix| path.ends_with(suffix)) {
            UrlKind::Html
        } else if path.ends_with(".pls") {
            UrlKind::Pls
        } else if path.ends_with(".m3u") {
            UrlKind::M3u
        } else {
            UrlKind::Direct
        }
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self, UrlKind::Pls | UrlKind::M3u)
    }

    pub fn source_kind(&self) -> SourceKind {
        match self {
            UrlKind::Html => SourceKind::Html,
            UrlKind::Pls | UrlKind::M3u => SourceKind::Playlist,
            UrlKind::Direct => SourceKind::Direct,
        }
    }
}

/// True when the URL text ends in a playlist or manifest suffix. These are
/// probed with HEAD instead of a streaming GET.
pub fn is_manifest_suffix(url: &str) -> bool {
    let lowered = url.trim().to_ascii_lowercase();
    MANIFEST_SUFFIXES
        .iter()
        .any(|suffix| lowered.ends_with(suffix))
}

fn url_path(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_by_path_suffix() {
        assert_eq!(
            UrlKind::classify("https://worldradiomap.com/sa/play/alif.htm"),
            UrlKind::Html
        );
        assert_eq!(
            UrlKind::classify("https://x.example/Page.HTML?lang=ar"),
            UrlKind::Html
        );
        assert_eq!(
            UrlKind::classify("http://x.example/listen.pls"),
            UrlKind::Pls
        );
        assert_eq!(
            UrlKind::classify("http://x.example/radio.m3u?token=1"),
            UrlKind::M3u
        );
        assert_eq!(
            UrlKind::classify("http://x.example/live.m3u8"),
            UrlKind::Direct
        );
        assert_eq!(
            UrlKind::classify("http://x.example/stream"),
            UrlKind::Direct
        );
    }

    #[test]
    fn query_string_does_not_hide_html_pages() {
        assert_eq!(UrlKind::classify("not a url/page.htm?x=1"), UrlKind::Html);
    }

    #[test]
    fn manifest_suffixes_are_detected_on_the_raw_url() {
        assert!(is_manifest_suffix("https://cdn.example/hls/index.m3u8"));
        assert!(is_manifest_suffix("https://cdn.example/radio.PLS"));
        assert!(!is_manifest_suffix("https://cdn.example/radio.mp3"));
        assert!(!is_manifest_suffix("https://cdn.example/radio.m3u8?auth=1"));
    }

    #[test]
    fn playlist_kinds_map_to_playlist_source() {
        assert!(UrlKind::Pls.is_playlist());
        assert_eq!(UrlKind::M3u.source_kind(), SourceKind::Playlist);
        assert_eq!(UrlKind::Direct.source_kind(), SourceKind::Direct);
    }
}

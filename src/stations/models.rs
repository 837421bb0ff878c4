use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Station key as it appears in the catalog, conventionally
/// `<name>-<city>-<countryCode>`. Never parsed by the pipeline.
pub type StationId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: StationId,
    #[serde(rename = "rawUrl")]
    pub raw_url: String,
}

impl CatalogEntry {
    pub fn new(id: impl Into<StationId>, raw_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_url: raw_url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    Direct,
    Html,
    Playlist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedUrl {
    pub id: StationId,
    pub url: String,
    #[serde(rename = "sourceKind")]
    pub source_kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub id: StationId,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StationStatus {
    Working,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationState {
    pub id: StationId,
    pub status: StationStatus,
    #[serde(rename = "failureCount")]
    pub failure_count: u32,
    #[serde(rename = "lastVerifiedAt")]
    pub last_verified_at: Option<DateTime<Utc>>,
}

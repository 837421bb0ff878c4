mod catalog;
mod models;

pub use catalog::{Catalog, CatalogError, StationMap};
pub use models::{
    CatalogEntry, ResolvedUrl, SourceKind, StationId, StationState, StationStatus,
    VerificationResult,
};

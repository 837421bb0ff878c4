use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::models::{CatalogEntry, StationId};

/// Station id to catalog URL.
pub type StationMap = BTreeMap<StationId, String>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    stations_by_country: BTreeMap<String, StationMap>,
    #[serde(default)]
    stations_by_city: BTreeMap<String, StationMap>,
    #[serde(default)]
    city_country: BTreeMap<String, String>,
}

/// Read-only station catalog.
///
/// Country codes are stored and looked up UPPERCASE, city keys lowercase.
/// Every accessor normalizes its argument the same way, so callers may pass
/// keys in any case.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    by_country: BTreeMap<String, StationMap>,
    by_city: BTreeMap<String, StationMap>,
    city_country: BTreeMap<String, String>,
}

fn country_key(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn city_key(city: &str) -> String {
    city.trim().to_lowercase()
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(raw)?;
        Ok(Self::from_document(document))
    }

    fn from_document(document: CatalogDocument) -> Self {
        let mut by_country: BTreeMap<String, StationMap> = BTreeMap::new();
        for (code, stations) in document.stations_by_country {
            by_country
                .entry(country_key(&code))
                .or_default()
                .extend(stations);
        }

        let mut by_city: BTreeMap<String, StationMap> = BTreeMap::new();
        for (city, stations) in document.stations_by_city {
            by_city.entry(city_key(&city)).or_default().extend(stations);
        }

        let mut city_country: BTreeMap<String, String> = document
            .city_country
            .into_iter()
            .map(|(city, code)| (city_key(&city), country_key(&code)))
            .collect();

        for (city, stations) in &by_city {
            if city_country.contains_key(city) {
                continue;
            }
            let derived = by_country.iter().find_map(|(code, country_stations)| {
                stations
                    .keys()
                    .any(|id| country_stations.contains_key(id))
                    .then(|| code.clone())
            });
            if let Some(code) = derived {
                city_country.insert(city.clone(), code);
            }
        }

        Self {
            by_country,
            by_city,
            city_country,
        }
    }

    /// Every station in the catalog. City entries override country entries
    /// that share the same id.
    pub fn all_stations(&self) -> StationMap {
        let mut all = StationMap::new();
        for stations in self.by_country.values() {
            all.extend(stations.iter().map(|(id, url)| (id.clone(), url.clone())));
        }
        for stations in self.by_city.values() {
            all.extend(stations.iter().map(|(id, url)| (id.clone(), url.clone())));
        }
        all
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.all_stations()
            .into_iter()
            .map(|(id, url)| CatalogEntry::new(id, url))
            .collect()
    }

    pub fn stations_for_country(&self, code: &str) -> StationMap {
        self.by_country
            .get(&country_key(code))
            .cloned()
            .unwrap_or_default()
    }

    pub fn stations_for_city(&self, city: &str) -> StationMap {
        self.by_city.get(&city_key(city)).cloned().unwrap_or_default()
    }

    pub fn cities(&self) -> Vec<String> {
        self.by_city.keys().cloned().collect()
    }

    pub fn country_for_city(&self, city: &str) -> Option<&str> {
        self.city_country.get(&city_key(city)).map(String::as_str)
    }

    /// Case-insensitive substring match on station ids.
    pub fn search(&self, fragment: &str) -> StationMap {
        let needle = fragment.to_lowercase();
        self.all_stations()
            .into_iter()
            .filter(|(id, _)| id.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.all_stations().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_country.values().all(|stations| stations.is_empty())
            && self.by_city.values().all(|stations| stations.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = r#"{
        "stations_by_country": {
            "sa": {
                "Alif-riyadh-SA": "https://alif.example/stream.mp3",
                "Mix-jeddah-SA": "https://mix.example/live"
            },
            "EG": { "Nile-cairo-EG": "https://nile.example/play.htm" }
        },
        "stations_by_city": {
            "Riyadh": {
                "Alif-riyadh-SA": "https://alif.example/override.mp3",
                "Quran-riyadh-SA": "https://quran.example/listen.pls"
            },
            "cairo": { "Nile-cairo-EG": "https://nile.example/play.htm" }
        }
    }"#;

    #[test]
    fn lookups_are_case_insensitive() {
        let catalog = Catalog::from_json(DOCUMENT).unwrap();
        assert_eq!(catalog.stations_for_country("SA").len(), 2);
        assert_eq!(catalog.stations_for_country("sa").len(), 2);
        assert_eq!(catalog.stations_for_city("RIYADH").len(), 2);
        assert_eq!(catalog.cities(), vec!["cairo".to_string(), "riyadh".to_string()]);
    }

    #[test]
    fn city_entries_override_country_entries() {
        let catalog = Catalog::from_json(DOCUMENT).unwrap();
        let all = catalog.all_stations();
        assert_eq!(all.len(), 4);
        assert_eq!(
            all.get("Alif-riyadh-SA").map(String::as_str),
            Some("https://alif.example/override.mp3")
        );
    }

    #[test]
    fn city_country_is_derived_from_shared_ids() {
        let catalog = Catalog::from_json(DOCUMENT).unwrap();
        assert_eq!(catalog.country_for_city("Riyadh"), Some("SA"));
        assert_eq!(catalog.country_for_city("cairo"), Some("EG"));
        assert_eq!(catalog.country_for_city("tunis"), None);
    }

    #[test]
    fn explicit_city_country_wins() {
        let catalog = Catalog::from_json(
            r#"{"stations_by_city": {"dubai": {"x-dubai-AE": "https://x"}},
                "city_country": {"Dubai": "ae"}}"#,
        )
        .unwrap();
        assert_eq!(catalog.country_for_city("dubai"), Some("AE"));
    }

    #[test]
    fn search_matches_fragments() {
        let catalog = Catalog::from_json(DOCUMENT).unwrap();
        let hits = catalog.search("RIYADH");
        assert_eq!(
            hits.keys().cloned().collect::<Vec<_>>(),
            vec!["Alif-riyadh-SA".to_string(), "Quran-riyadh-SA".to_string()]
        );
    }

    #[test]
    fn empty_document_is_an_empty_catalog() {
        let catalog = Catalog::from_json(r#"{"stations_by_country": {"SA": {}}}"#).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.entries().is_empty());

        let catalog = Catalog::from_json(DOCUMENT).unwrap();
        assert!(!catalog.is_empty());
        let entries = catalog.entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(
            entries[0],
            CatalogEntry::new("Alif-riyadh-SA", "https://alif.example/override.mp3")
        );
    }

    #[test]
    fn unparseable_document_is_an_error() {
        assert!(matches!(
            Catalog::from_json("{not json"),
            Err(CatalogError::Parse(_))
        ));
        assert!(matches!(
            Catalog::load(Path::new("/definitely/missing/catalog.json")),
            Err(CatalogError::Io { .. })
        ));
    }
}

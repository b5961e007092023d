use serde::Serialize;
use serde_json::{Map, Value};

use crate::tmdb::StreamingProvider;

const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
pub const POSTER_SIZE: &str = "w500";
pub const LOGO_SIZE: &str = "w92";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

/// Original-language filter options offered by the UI.
pub const LANGUAGES: [Language; 5] = [
    Language { code: "es", name: "Español" },
    Language { code: "en", name: "English" },
    Language { code: "fr", name: "Français" },
    Language { code: "ja", name: "日本語" },
    Language { code: "ko", name: "한국어" },
];

pub fn language_name(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(code))
        .map(|l| l.name)
}

pub fn image_url(path: &str, size: &str) -> String {
    format!("{IMAGE_BASE}/{size}{path}")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionProviders {
    pub link: Option<String>,
    pub flatrate: Vec<StreamingProvider>,
    pub rent: Vec<StreamingProvider>,
    pub buy: Vec<StreamingProvider>,
}

impl RegionProviders {
    pub fn is_empty(&self) -> bool {
        self.flatrate.is_empty() && self.rent.is_empty() && self.buy.is_empty()
    }
}

/// Typed providers for one region of a watch-providers response.
pub fn providers_for_region(response: &Value, country: &str) -> RegionProviders {
    let Some(region) = response
        .get("results")
        .and_then(|r| r.get(country.to_uppercase()))
    else {
        return RegionProviders::default();
    };
    let list = |key: &str| -> Vec<StreamingProvider> {
        let mut providers: Vec<StreamingProvider> = region
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|p| serde_json::from_value(p.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        providers.sort_by_key(|p| p.display_priority.unwrap_or(u32::MAX));
        providers
    };
    RegionProviders {
        link: region
            .get("link")
            .and_then(|l| l.as_str())
            .map(|s| s.to_string()),
        flatrate: list("flatrate"),
        rent: list("rent"),
        buy: list("buy"),
    }
}

/// Keeps only `country` under `results`; everything else is left untouched.
pub fn narrow_to_region(mut response: Value, country: &str) -> Value {
    let key = country.to_uppercase();
    if let Some(obj) = response.as_object_mut() {
        let region = obj
            .get_mut("results")
            .and_then(|r| r.as_object_mut())
            .and_then(|r| r.remove(&key));
        let mut narrowed = Map::new();
        if let Some(region) = region {
            narrowed.insert(key, region);
        }
        obj.insert("results".to_string(), Value::Object(narrowed));
    }
    response
}

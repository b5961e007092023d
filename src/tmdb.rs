use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;
use tracing::warn;

use crate::config::TMDB_MAX_PAGE;

const TMDB_BASE: &str = "https://api.themoviedb.org/3";

/// Upstream calls the HTTP layer needs. Every method returns the TMDB body as-is.
#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn genres(&self) -> Result<Value>;
    async fn discover(&self, filters: &DiscoverFilters, page: u32) -> Result<Value>;
    async fn search(&self, query: &str, page: u32) -> Result<Value>;
    async fn watch_providers(&self, movie_id: u64) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    base: String,
    api_key: String,
    language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverFilters {
    pub genre: Option<String>,
    pub language: Option<String>,
}

impl DiscoverFilters {
    /// Empty strings are treated as "no filter", matching what the UI sends
    /// for its "all genres" / "all languages" options.
    pub fn new(genre: Option<String>, language: Option<String>) -> Self {
        Self {
            genre: non_empty(genre),
            language: non_empty(language),
        }
    }

    fn append_to(&self, url: &mut String) {
        if let Some(genre) = &self.genre {
            url.push_str("&with_genres=");
            url.push_str(&urlencoding::encode(genre));
        }
        if let Some(language) = &self.language {
            url.push_str("&with_original_language=");
            url.push_str(&urlencoding::encode(language));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub overview: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vote_average: f64,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genre_ids: Vec<u64>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
}

impl Movie {
    /// A movie from the `/movie/{id}` details body, which lists `genres`
    /// objects where list endpoints carry `genre_ids`.
    pub fn from_details(details: &Value) -> Result<Self> {
        let mut movie: Movie =
            serde_json::from_value(details.clone()).context("Unexpected movie shape")?;
        if movie.genre_ids.is_empty() {
            movie.genre_ids = genres_from(details).into_iter().map(|g| g.id).collect();
        }
        Ok(movie)
    }

    pub fn year(&self) -> Option<&str> {
        self.release_date
            .as_deref()
            .and_then(|d| d.split('-').next())
            .filter(|y| !y.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingProvider {
    #[serde(default)]
    pub logo_path: Option<String>,
    pub provider_name: String,
    pub provider_id: u64,
    #[serde(default)]
    pub display_priority: Option<u32>,
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>, language: impl Into<String>) -> Result<Self> {
        Self::with_base(TMDB_BASE, api_key, language)
    }

    /// Same client against another API root, e.g. a local stand-in.
    pub fn with_base(
        base: impl Into<String>,
        api_key: impl Into<String>,
        language: impl Into<String>,
    ) -> Result<Self> {
        let user_agent = format!("cinepolis/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            language: language.into(),
        })
    }

    /// Movie details by id. Not part of the proxied surface; the terminal tool
    /// uses it to resolve favorites.
    pub async fn movie(&self, id: u64) -> Result<Value> {
        let path = format!("/movie/{id}?language={}", self.lang());
        self.get_json(&path).await
    }

    async fn get_json(&self, path_and_query: &str) -> Result<Value> {
        let url = self.url(path_and_query);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            // reqwest errors embed the URL, which carries the key
            .map_err(|e| anyhow!("request to {} failed: {}", route_of(path_and_query), e.without_url()))?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!(
                "{} -> {}: {}",
                route_of(path_and_query),
                status,
                text
            ));
        }
        serde_json::from_str(&text).context("JSON parse failed")
    }

    fn url(&self, path_and_query: &str) -> String {
        let sep = if path_and_query.contains('?') { '&' } else { '?' };
        format!(
            "{}{path_and_query}{sep}api_key={}",
            self.base,
            urlencoding::encode(&self.api_key)
        )
    }

    fn lang(&self) -> Cow<'_, str> {
        urlencoding::encode(&self.language)
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn genres(&self) -> Result<Value> {
        let path = format!("/genre/movie/list?language={}", self.lang());
        self.get_json(&path).await
    }

    async fn discover(&self, filters: &DiscoverFilters, page: u32) -> Result<Value> {
        let mut path = format!(
            "/discover/movie?language={}&sort_by=popularity.desc&page={page}",
            self.lang()
        );
        filters.append_to(&mut path);
        self.get_json(&path).await
    }

    async fn search(&self, query: &str, page: u32) -> Result<Value> {
        let path = format!(
            "/search/movie?query={}&language={}&page={page}",
            urlencoding::encode(query),
            self.lang()
        );
        self.get_json(&path).await
    }

    async fn watch_providers(&self, movie_id: u64) -> Result<Value> {
        self.get_json(&format!("/movie/{movie_id}/watch/providers"))
            .await
    }
}

pub fn parse_movie_id(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok().filter(|id| *id > 0)
}

pub fn parse_page(input: &str) -> Option<u32> {
    input
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|p| (1..=TMDB_MAX_PAGE).contains(p))
}

/// Typed view over the `results` array of a discover/search response.
pub fn movies_from(value: &Value) -> Vec<Movie> {
    value
        .get("results")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|m| match serde_json::from_value(m.clone()) {
                    Ok(movie) => Some(movie),
                    Err(e) => {
                        warn!("Skipping unreadable movie in results ({})", e);
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn genres_from(value: &Value) -> Vec<Genre> {
    value
        .get("genres")
        .cloned()
        .and_then(|g| serde_json::from_value(g).ok())
        .unwrap_or_default()
}

/// `null` in a field reads as the type's default, like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn route_of(path_and_query: &str) -> &str {
    path_and_query
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(path_and_query)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

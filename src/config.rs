use anyhow::{Context, Result};
use std::env;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LANGUAGE: &str = "es";
pub const DEFAULT_COUNTRY: &str = "ES";
pub const DEFAULT_RANDOM_MAX_PAGE: u32 = 50;
/// TMDB refuses `page` values above this.
pub const TMDB_MAX_PAGE: u32 = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub tmdb_api_key: String,
    pub port: u16,
    pub language: String,
    pub country: String,
    pub random_max_page: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let tmdb_api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing required environment variable: TMDB_API_KEY"))?;

        let port = match non_empty_var("CINEPOLIS_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("CINEPOLIS_PORT is not a valid port: {}", raw))?,
            None => DEFAULT_PORT,
        };

        let random_max_page = match non_empty_var("RANDOM_MAX_PAGE") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("RANDOM_MAX_PAGE is not a number: {}", raw))?,
            None => DEFAULT_RANDOM_MAX_PAGE,
        };

        Ok(Self {
            tmdb_api_key,
            port,
            language: non_empty_var("TMDB_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            country: non_empty_var("CINEPOLIS_COUNTRY")
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            random_max_page: clamp_max_page(random_max_page),
        })
    }
}

pub fn clamp_max_page(value: u32) -> u32 {
    value.clamp(1, TMDB_MAX_PAGE)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_random_page_range() {
        assert_eq!(clamp_max_page(0), 1);
        assert_eq!(clamp_max_page(50), 50);
        assert_eq!(clamp_max_page(10_000), TMDB_MAX_PAGE);
    }
}

//! Favorites list with the same semantics the browser UI keeps in
//! `localStorage`: an ordered JSON array of movies, unique by id.
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::tmdb::Movie;

pub const STORAGE_KEY: &str = "favorites";

/// String key/value store shaped like the Web Storage API.
pub trait Storage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: String) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: String) -> Result<()> {
        self.items.insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON object on disk mapping keys to string values.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Map<String, Value>,
}

impl FileStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if text.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Map<String, Value>>(&text) {
                    Ok(items) => items,
                    Err(e) => {
                        // Unreadable contents are replaced on the next write.
                        warn!("Ignoring unreadable {} ({})", path.display(), e);
                        Map::new()
                    }
                }
            }
        } else {
            Map::new()
        };
        Ok(Self { path, items })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    fn set_item(&mut self, key: &str, value: String) -> Result<()> {
        self.items.insert(key.to_string(), Value::String(value));
        let text = serde_json::to_string_pretty(&self.items)?;
        fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Favorites {
    movies: Vec<Movie>,
}

impl Favorites {
    pub fn load(storage: &dyn Storage) -> Self {
        let Some(raw) = storage.get_item(STORAGE_KEY) else {
            return Self::default();
        };
        match serde_json::from_str::<Vec<Movie>>(&raw) {
            Ok(movies) => Self::from_movies(movies),
            Err(e) => {
                warn!("Ignoring unreadable favorites ({})", e);
                Self::default()
            }
        }
    }

    /// Keeps the first occurrence of each id.
    pub fn from_movies(movies: impl IntoIterator<Item = Movie>) -> Self {
        let mut seen = HashSet::new();
        let movies = movies.into_iter().filter(|m| seen.insert(m.id)).collect();
        Self { movies }
    }

    pub fn save(&self, storage: &mut dyn Storage) -> Result<()> {
        let raw = serde_json::to_string(&self.movies).context("Failed to encode favorites")?;
        storage.set_item(STORAGE_KEY, raw)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.movies.iter().any(|m| m.id == id)
    }

    pub fn add(&mut self, movie: Movie) -> bool {
        if self.contains(movie.id) {
            return false;
        }
        self.movies.push(movie);
        true
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.movies.len();
        self.movies.retain(|m| m.id != id);
        self.movies.len() != before
    }

    /// Returns whether the movie is a favorite afterwards.
    pub fn toggle(&mut self, movie: Movie) -> bool {
        if self.remove(movie.id) {
            false
        } else {
            self.add(movie)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Movie> {
        self.movies.iter()
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }
}

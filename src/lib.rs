pub mod app;
pub mod catalog;
pub mod config;
pub mod favorites;
pub mod random;
pub mod tmdb;

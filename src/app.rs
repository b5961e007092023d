use crate::catalog::{self, LANGUAGES};
use crate::config::Config;
use crate::random;
use crate::tmdb::{self, DiscoverFilters, TmdbApi, TmdbClient};
use anyhow::Result;
use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const INDEX_HTML: &str = include_str!("../assets/index.html");

const PER_IP_LIMIT: u32 = 120; // per minute
const PER_IP_BURST: u32 = 20;
const GLOBAL_LIMIT: u32 = 1_000; // per minute
const GLOBAL_BURST: u32 = 100;
const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub random_max_page: u32,
    /// Region the UI asks watch providers for.
    pub country: String,
    pub limiter: Arc<RequestLimiter>,
}

impl AppState {
    pub fn new(tmdb: Arc<dyn TmdbApi>, random_max_page: u32, country: impl Into<String>) -> Self {
        Self {
            tmdb,
            random_max_page,
            country: country.into(),
            limiter: Arc::new(RequestLimiter::default()),
        }
    }
}

/// Errors the API reports to clients. The body is always `{"error": <message>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Query required")]
    QueryRequired,
    #[error("Movie ID required")]
    MovieIdRequired,
    #[error("Invalid movie ID")]
    InvalidMovieId,
    #[error("Invalid page")]
    InvalidPage,
    #[error("No movies found")]
    NoMoviesFound,
    #[error("Too many requests")]
    TooManyRequests,
    #[error("{0}")]
    Upstream(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::QueryRequired
            | ApiError::MovieIdRequired
            | ApiError::InvalidMovieId
            | ApiError::InvalidPage => StatusCode::BAD_REQUEST,
            ApiError::NoMoviesFound => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn upstream_failure(message: &'static str, err: anyhow::Error) -> ApiError {
    warn!("{}: {:#}", message, err);
    ApiError::Upstream(message)
}

pub async fn run_server(config: Config) -> Result<()> {
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::new(
        config.tmdb_api_key.clone(),
        config.language.clone(),
    )?);
    info!(
        "Proxying TMDB with content language '{}', provider region '{}'",
        config.language, config.country
    );

    let state = AppState::new(tmdb, config.random_max_page, config.country.clone());
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/genres", get(genres))
        .route("/movies", get(movies))
        .route("/random-movie", get(random_movie))
        .route("/search-movies", get(search_movies))
        .route("/watch-providers", get(watch_providers))
        .route("/languages", get(languages))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_requests));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(INDEX_HTML.replace("__COUNTRY__", &state.country))
}

async fn languages() -> Json<Value> {
    Json(json!(LANGUAGES))
}

#[derive(Debug, Deserialize)]
struct FilterQuery {
    genre: Option<String>,
    language: Option<String>,
    page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: Option<String>,
    page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProvidersQuery {
    #[serde(rename = "movieId")]
    movie_id: Option<String>,
    country: Option<String>,
}

async fn genres(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .tmdb
        .genres()
        .await
        .map(Json)
        .map_err(|e| upstream_failure("Failed to fetch genres", e))
}

async fn movies(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = page_param(q.page.as_deref())?;
    let filters = DiscoverFilters::new(q.genre, q.language);
    state
        .tmdb
        .discover(&filters, page)
        .await
        .map(Json)
        .map_err(|e| upstream_failure("Failed to fetch movies", e))
}

async fn random_movie(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> Result<Json<Value>, ApiError> {
    let filters = DiscoverFilters::new(q.genre, q.language);
    match random::pick_movie(state.tmdb.as_ref(), &filters, state.random_max_page).await {
        Ok(Some(movie)) => Ok(Json(movie)),
        Ok(None) => Err(ApiError::NoMoviesFound),
        Err(e) => Err(upstream_failure("Failed to fetch random movie", e)),
    }
}

async fn search_movies(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let query = q
        .query
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::QueryRequired)?;
    let page = page_param(q.page.as_deref())?;
    state
        .tmdb
        .search(query, page)
        .await
        .map(Json)
        .map_err(|e| upstream_failure("Failed to search movies", e))
}

async fn watch_providers(
    State(state): State<AppState>,
    Query(q): Query<ProvidersQuery>,
) -> Result<Json<Value>, ApiError> {
    let raw_id = q
        .movie_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(ApiError::MovieIdRequired)?;
    let movie_id = tmdb::parse_movie_id(raw_id).ok_or(ApiError::InvalidMovieId)?;
    let response = state
        .tmdb
        .watch_providers(movie_id)
        .await
        .map_err(|e| upstream_failure("Failed to fetch watch providers", e))?;

    let country = q.country.as_deref().map(str::trim).filter(|c| !c.is_empty());
    Ok(Json(match country {
        Some(country) => catalog::narrow_to_region(response, country),
        None => response,
    }))
}

/// Absent or empty means the first page.
fn page_param(raw: Option<&str>) -> Result<u32, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(1),
        Some(p) => tmdb::parse_page(p).ok_or(ApiError::InvalidPage),
    }
}

async fn limit_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = extract_ip(request.headers());
    if !state.limiter.check(&ip).await {
        warn!("Rate limit exceeded for {}", ip);
        return ApiError::TooManyRequests.into_response();
    }
    next.run(request).await
}

#[derive(Clone, Debug, Default)]
pub struct WindowCounter {
    pub window: u64,
    pub count: u32,
}

impl WindowCounter {
    fn hit(&mut self, window: u64, max: u32) -> bool {
        if self.window != window {
            self.window = window;
            self.count = 0;
        }
        if self.count >= max {
            return false;
        }
        self.count += 1;
        true
    }
}

/// Fixed one-minute windows, per client IP and across all clients.
#[derive(Debug)]
pub struct RequestLimiter {
    per_ip_max: u32,
    global_max: u32,
    per_ip: Mutex<HashMap<String, WindowCounter>>,
    global: Mutex<WindowCounter>,
}

impl Default for RequestLimiter {
    fn default() -> Self {
        Self::new(PER_IP_LIMIT + PER_IP_BURST, GLOBAL_LIMIT + GLOBAL_BURST)
    }
}

impl RequestLimiter {
    pub fn new(per_ip_max: u32, global_max: u32) -> Self {
        Self {
            per_ip_max,
            global_max,
            per_ip: Mutex::new(HashMap::new()),
            global: Mutex::new(WindowCounter::default()),
        }
    }

    pub async fn check(&self, ip: &str) -> bool {
        let window = (Utc::now().timestamp() / 60) as u64;
        self.check_at(ip, window).await
    }

    async fn check_at(&self, ip: &str, window: u64) -> bool {
        {
            let mut guards = self.per_ip.lock().await;
            if guards.len() > MAX_RATE_LIMIT_ENTRIES {
                guards.retain(|_, v| v.window == window);
            }
            let entry = guards.entry(ip.to_string()).or_default();
            if !entry.hit(window, self.per_ip_max) {
                return false;
            }
        }
        self.global.lock().await.hit(window, self.global_max)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}

fn extract_ip(headers: &HeaderMap) -> String {
    headers
        .get("cf-connecting-ip")
        .or_else(|| headers.get("x-real-ip"))
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

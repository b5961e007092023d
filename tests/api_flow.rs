use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cinepolis::app::{build_router, AppState, RequestLimiter};
use cinepolis::tmdb::{DiscoverFilters, TmdbApi};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Genres,
    Discover(DiscoverFilters, u32),
    Search(String, u32),
    WatchProviders(u64),
}

#[derive(Default)]
struct FakeTmdb {
    /// Discover responses by page; pages not listed get `default_page`.
    pages: HashMap<u32, Value>,
    default_page: Option<Value>,
    fail: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeTmdb {
    fn record(&self, call: Call) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            anyhow::bail!("upstream exploded");
        }
        Ok(())
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TmdbApi for FakeTmdb {
    async fn genres(&self) -> anyhow::Result<Value> {
        self.record(Call::Genres)?;
        Ok(genres_body())
    }

    async fn discover(&self, filters: &DiscoverFilters, page: u32) -> anyhow::Result<Value> {
        self.record(Call::Discover(filters.clone(), page))?;
        Ok(self
            .pages
            .get(&page)
            .cloned()
            .or_else(|| self.default_page.clone())
            .unwrap_or_else(|| json!({ "page": page, "results": [], "total_pages": 0 })))
    }

    async fn search(&self, query: &str, page: u32) -> anyhow::Result<Value> {
        self.record(Call::Search(query.to_string(), page))?;
        Ok(json!({ "page": page, "results": [movie_json(27205, "Origen")], "total_pages": 1 }))
    }

    async fn watch_providers(&self, movie_id: u64) -> anyhow::Result<Value> {
        self.record(Call::WatchProviders(movie_id))?;
        Ok(providers_body(movie_id))
    }
}

fn genres_body() -> Value {
    json!({ "genres": [ { "id": 28, "name": "Acción" }, { "id": 18, "name": "Drama" } ] })
}

fn movie_json(id: u64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "poster_path": format!("/{id}.jpg"),
        "overview": "Sinopsis",
        "vote_average": 8.4,
        "release_date": "2010-07-16",
        "genre_ids": [28],
        "backdrop_path": null,
        "popularity": 99.5
    })
}

fn discover_page(ids: &[u64], total_pages: u32) -> Value {
    let results: Vec<Value> = ids.iter().map(|id| movie_json(*id, "Película")).collect();
    json!({ "page": 1, "results": results, "total_pages": total_pages, "total_results": 999 })
}

fn providers_body(movie_id: u64) -> Value {
    json!({
        "id": movie_id,
        "results": {
            "ES": {
                "link": "https://www.themoviedb.org/movie/550/watch?locale=ES",
                "flatrate": [ { "logo_path": "/n.jpg", "provider_name": "Netflix", "provider_id": 8, "display_priority": 1 } ]
            },
            "US": { "link": "https://www.themoviedb.org/movie/550/watch?locale=US" }
        }
    })
}

fn app_with(tmdb: FakeTmdb, random_max_page: u32) -> (Router, Arc<FakeTmdb>) {
    let tmdb = Arc::new(tmdb);
    let state = AppState::new(tmdb.clone(), random_max_page, "ES");
    (build_router(state), tmdb)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::get(uri)
        .header("x-real-ip", "198.51.100.7")
        .body(Body::empty())
        .expect("failed to build request");
    let res = app.oneshot(req).await.expect("router responds");
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn genres_pass_through_unchanged() {
    let (app, tmdb) = app_with(FakeTmdb::default(), 50);
    let (status, body) = get(app, "/api/genres").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, genres_body());
    assert_eq!(tmdb.calls(), vec![Call::Genres]);
}

#[tokio::test]
async fn movies_forward_filters_and_page() {
    let page = discover_page(&[1, 2, 3], 10);
    let (app, tmdb) = app_with(
        FakeTmdb {
            default_page: Some(page.clone()),
            ..Default::default()
        },
        50,
    );

    let (status, body) = get(app, "/api/movies?genre=28&language=ja&page=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, page);
    assert_eq!(
        tmdb.calls(),
        vec![Call::Discover(
            DiscoverFilters::new(Some("28".into()), Some("ja".into())),
            2
        )]
    );
}

#[tokio::test]
async fn movies_treat_empty_filters_as_absent() {
    let (app, tmdb) = app_with(FakeTmdb::default(), 50);
    let (status, _) = get(app, "/api/movies?genre=&language=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        tmdb.calls(),
        vec![Call::Discover(DiscoverFilters::default(), 1)]
    );
}

#[tokio::test]
async fn movies_reject_invalid_page() {
    let (app, tmdb) = app_with(FakeTmdb::default(), 50);
    let (status, body) = get(app, "/api/movies?page=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid page" }));
    assert!(tmdb.calls().is_empty());
}

#[tokio::test]
async fn search_requires_query() {
    for uri in ["/api/search-movies", "/api/search-movies?query=", "/api/search-movies?query=%20%20"] {
        let (app, tmdb) = app_with(FakeTmdb::default(), 50);
        let (status, body) = get(app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body, json!({ "error": "Query required" }));
        assert!(tmdb.calls().is_empty());
    }
}

#[tokio::test]
async fn search_passes_decoded_query_through() {
    let (app, tmdb) = app_with(FakeTmdb::default(), 50);
    let (status, body) = get(app, "/api/search-movies?query=el%20origen").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["title"], json!("Origen"));
    assert_eq!(tmdb.calls(), vec![Call::Search("el origen".to_string(), 1)]);
}

#[tokio::test]
async fn watch_providers_validate_movie_id() {
    let (app, _) = app_with(FakeTmdb::default(), 50);
    let (status, body) = get(app, "/api/watch-providers").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Movie ID required" }));

    let (app, tmdb) = app_with(FakeTmdb::default(), 50);
    let (status, body) = get(app, "/api/watch-providers?movieId=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid movie ID" }));
    assert!(tmdb.calls().is_empty());
}

#[tokio::test]
async fn watch_providers_pass_through_or_narrow_by_country() {
    let (app, tmdb) = app_with(FakeTmdb::default(), 50);
    let (status, body) = get(app, "/api/watch-providers?movieId=550").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, providers_body(550));
    assert_eq!(tmdb.calls(), vec![Call::WatchProviders(550)]);

    let (app, _) = app_with(FakeTmdb::default(), 50);
    let (status, body) = get(app, "/api/watch-providers?movieId=550&country=es").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(550));
    assert_eq!(body["results"], json!({ "ES": providers_body(550)["results"]["ES"] }));
}

#[tokio::test]
async fn upstream_failures_become_fixed_error_objects() {
    let cases = [
        ("/api/genres", "Failed to fetch genres"),
        ("/api/movies", "Failed to fetch movies"),
        ("/api/random-movie", "Failed to fetch random movie"),
        ("/api/search-movies?query=x", "Failed to search movies"),
        ("/api/watch-providers?movieId=1", "Failed to fetch watch providers"),
    ];
    for (uri, message) in cases {
        let (app, _) = app_with(
            FakeTmdb {
                fail: true,
                ..Default::default()
            },
            50,
        );
        let (status, body) = get(app, uri).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", uri);
        assert_eq!(body, json!({ "error": message }));
    }
}

#[tokio::test]
async fn random_movie_returns_one_upstream_result_verbatim() {
    let page = discover_page(&[11, 12, 13, 14], 50);
    for _ in 0..20 {
        let (app, tmdb) = app_with(
            FakeTmdb {
                default_page: Some(page.clone()),
                ..Default::default()
            },
            50,
        );
        let (status, body) = get(app, "/api/random-movie?genre=28").await;
        assert_eq!(status, StatusCode::OK);
        let results = page["results"].as_array().unwrap();
        assert!(results.contains(&body), "{} not in page", body);

        let calls = tmdb.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Discover(filters, p) => {
                assert_eq!(filters.genre.as_deref(), Some("28"));
                assert!((1..=50).contains(p));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }
}

#[tokio::test]
async fn random_movie_retries_within_upstream_page_count() {
    // Only page 1 has results; a max page of 2 means the first pick may land on
    // the empty page 2, which reports a single upstream page.
    let mut pages = HashMap::new();
    pages.insert(1, discover_page(&[7], 1));
    pages.insert(2, json!({ "page": 2, "results": [], "total_pages": 1 }));
    for _ in 0..20 {
        let (app, tmdb) = app_with(
            FakeTmdb {
                pages: pages.clone(),
                ..Default::default()
            },
            2,
        );
        let (status, body) = get(app, "/api/random-movie").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(7));
        let pages_hit: Vec<u32> = tmdb
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Discover(_, p) => Some(p),
                _ => None,
            })
            .collect();
        assert!(pages_hit == vec![1] || pages_hit == vec![2, 1], "{:?}", pages_hit);
    }
}

#[tokio::test]
async fn random_movie_with_no_results_is_not_found() {
    let (app, _) = app_with(FakeTmdb::default(), 50);
    let (status, body) = get(app, "/api/random-movie?language=ko").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "No movies found" }));
}

#[tokio::test]
async fn languages_list_the_fixed_catalog() {
    let (app, tmdb) = app_with(FakeTmdb::default(), 50);
    let (status, body) = get(app, "/api/languages").await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|l| l["code"].as_str())
        .collect();
    assert_eq!(codes, vec!["es", "en", "fr", "ja", "ko"]);
    assert_eq!(body[3]["name"], json!("日本語"));
    assert!(tmdb.calls().is_empty());
}

#[tokio::test]
async fn index_page_carries_configured_country() {
    let (app, _) = app_with(FakeTmdb::default(), 50);
    let req = Request::get("/").body(Body::empty()).unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains(r#"const COUNTRY = "ES";"#));
    assert!(!html.contains("__COUNTRY__"));
}

#[tokio::test]
async fn limiter_rejects_after_budget() {
    let tmdb = Arc::new(FakeTmdb::default());
    let mut state = AppState::new(tmdb, 50, "ES");
    state.limiter = Arc::new(RequestLimiter::new(2, 100));
    let app = build_router(state);

    assert_eq!(get(app.clone(), "/api/genres").await.0, StatusCode::OK);
    assert_eq!(get(app.clone(), "/api/genres").await.0, StatusCode::OK);
    let (status, body) = get(app.clone(), "/api/genres").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({ "error": "Too many requests" }));

    // health is outside the limited API surface
    let req = Request::get("/health")
        .header("x-real-ip", "198.51.100.7")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::OK);
}

//! Run the proxied TMDB operations from a terminal and keep a favorites file.
//! Usage:
//!   cargo run --bin discover -- genres
//!   cargo run --bin discover -- movies [genre_id] [language]
//!   cargo run --bin discover -- random [genre_id] [language]
//!   cargo run --bin discover -- search <query...>
//!   cargo run --bin discover -- providers <movie_id> [country]
//!   cargo run --bin discover -- favorites list|add <movie_id>|remove <movie_id>
//! Requires TMDB_API_KEY in the environment (.env supported). Favorites live in
//! CINEPOLIS_FAVORITES (default favorites.json).

use anyhow::{anyhow, Context, Result};
use cinepolis::catalog::{self, LOGO_SIZE, POSTER_SIZE};
use cinepolis::config::Config;
use cinepolis::favorites::{Favorites, FileStorage};
use cinepolis::random;
use cinepolis::tmdb::{self, DiscoverFilters, Movie, TmdbApi, TmdbClient};
use dotenvy::dotenv;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum Command {
    Genres,
    Movies(DiscoverFilters),
    Random(DiscoverFilters),
    Search(String),
    Providers(u64, Option<String>),
    FavoritesList,
    FavoritesAdd(u64),
    FavoritesRemove(u64),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn usage() -> ! {
    eprintln!(
        "Usage: discover <genres | movies [genre] [lang] | random [genre] [lang] | search <query> | providers <movie_id> [country] | favorites <list | add <id> | remove <id>>>"
    );
    std::process::exit(2);
}

fn parse_args() -> Command {
    let mut args = env::args().skip(1);
    let Some(cmd) = args.next() else { usage() };
    let id_arg = |raw: Option<String>| -> u64 {
        raw.as_deref()
            .and_then(tmdb::parse_movie_id)
            .unwrap_or_else(|| usage())
    };
    match cmd.as_str() {
        "genres" => Command::Genres,
        "movies" => Command::Movies(DiscoverFilters::new(args.next(), args.next())),
        "random" => Command::Random(DiscoverFilters::new(args.next(), args.next())),
        "search" => {
            let query = args.collect::<Vec<_>>().join(" ");
            if query.trim().is_empty() {
                usage();
            }
            Command::Search(query)
        }
        "providers" => {
            let id = id_arg(args.next());
            Command::Providers(id, args.next())
        }
        "favorites" => match args.next().as_deref() {
            None | Some("list") => Command::FavoritesList,
            Some("add") => Command::FavoritesAdd(id_arg(args.next())),
            Some("remove") => Command::FavoritesRemove(id_arg(args.next())),
            Some(_) => usage(),
        },
        _ => usage(),
    }
}

fn print_movie(movie: &Movie, favorites: &Favorites) {
    let star = if favorites.contains(movie.id) { "*" } else { " " };
    println!(
        "{star} {:>8}  {:<45} {:>4}  {:.1}",
        movie.id,
        movie.title,
        movie.year().unwrap_or("----"),
        movie.vote_average
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let command = parse_args();
    let config = Config::from_env()?;
    let client = TmdbClient::new(config.tmdb_api_key.clone(), config.language.clone())?;
    let favorites_path =
        env::var("CINEPOLIS_FAVORITES").unwrap_or_else(|_| "favorites.json".to_string());
    let mut storage = FileStorage::open(&favorites_path)?;
    let mut favorites = Favorites::load(&storage);
    info!("Command: {:?}", command);

    match command {
        Command::Genres => {
            let value = client.genres().await?;
            for genre in tmdb::genres_from(&value) {
                println!("{:>6}  {}", genre.id, genre.name);
            }
            println!();
            for lang in catalog::LANGUAGES {
                println!("{:>6}  {}", lang.code, lang.name);
            }
        }
        Command::Movies(filters) => {
            let value = client.discover(&filters, 1).await?;
            for movie in tmdb::movies_from(&value) {
                print_movie(&movie, &favorites);
            }
        }
        Command::Random(filters) => {
            let picked = random::pick_movie(&client, &filters, config.random_max_page)
                .await?
                .ok_or_else(|| anyhow!("No movies found"))?;
            let movie: Movie = serde_json::from_value(picked).context("Unexpected movie shape")?;
            print_movie(&movie, &favorites);
            if let Some(poster) = &movie.poster_path {
                println!("  {}", catalog::image_url(poster, POSTER_SIZE));
            }
            if !movie.overview.is_empty() {
                println!("  {}", movie.overview);
            }
        }
        Command::Search(query) => {
            let value = client.search(&query, 1).await?;
            for movie in tmdb::movies_from(&value) {
                print_movie(&movie, &favorites);
            }
        }
        Command::Providers(id, country) => {
            let country = country.unwrap_or_else(|| config.country.clone());
            let value = client.watch_providers(id).await?;
            let providers = catalog::providers_for_region(&value, &country);
            if providers.is_empty() {
                println!("No providers for movie {} in {}", id, country.to_uppercase());
            }
            for (kind, list) in [
                ("stream", &providers.flatrate),
                ("rent", &providers.rent),
                ("buy", &providers.buy),
            ] {
                for p in list {
                    let logo = p
                        .logo_path
                        .as_deref()
                        .map(|l| catalog::image_url(l, LOGO_SIZE))
                        .unwrap_or_default();
                    println!("{kind:<7} {:<30} {}", p.provider_name, logo);
                }
            }
            if let Some(link) = providers.link {
                println!("{}", link);
            }
        }
        Command::FavoritesList => {
            if favorites.is_empty() {
                println!("No favorites yet");
            }
            for movie in favorites.iter() {
                print_movie(movie, &favorites);
            }
        }
        Command::FavoritesAdd(id) => {
            let value = client.movie(id).await?;
            let movie = Movie::from_details(&value)?;
            if favorites.add(movie) {
                favorites.save(&mut storage)?;
                println!("Added {} to {}", id, storage.path().display());
            } else {
                println!("{} is already a favorite", id);
            }
        }
        Command::FavoritesRemove(id) => {
            if favorites.remove(id) {
                favorites.save(&mut storage)?;
                println!("Removed {}", id);
            } else {
                println!("{} is not a favorite", id);
            }
        }
    }
    Ok(())
}

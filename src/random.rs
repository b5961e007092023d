//! Uniform picks behind the "surprise me" recommendation.
use anyhow::Result;
use rand::Rng;
use serde_json::Value;
use tracing::debug;

use crate::tmdb::{DiscoverFilters, TmdbApi};

/// One discover result from a random page in `1..=max_page`, unchanged.
///
/// Narrow filters can leave fewer pages than that range covers, so an empty
/// first page gets one more try within the page count upstream reports.
/// `Ok(None)` means nothing matched.
pub async fn pick_movie(
    tmdb: &dyn TmdbApi,
    filters: &DiscoverFilters,
    max_page: u32,
) -> Result<Option<Value>> {
    let page = pick_page(&mut rand::thread_rng(), max_page);
    let response = tmdb.discover(filters, page).await?;
    let picked = pick_result(&mut rand::thread_rng(), &response);
    if picked.is_some() {
        return Ok(picked);
    }

    let Some(total) = total_pages(&response) else {
        return Ok(None);
    };
    let retry_page = pick_page(&mut rand::thread_rng(), total.min(max_page));
    if retry_page == page {
        return Ok(None);
    }
    debug!(
        page,
        retry_page,
        total_pages = total,
        "Random page was empty, retrying within upstream range"
    );
    let response = tmdb.discover(filters, retry_page).await?;
    let picked = pick_result(&mut rand::thread_rng(), &response);
    Ok(picked)
}

/// Uniform in `1..=max_page`. A `max_page` of zero is treated as one.
pub fn pick_page<R: Rng + ?Sized>(rng: &mut R, max_page: u32) -> u32 {
    rng.gen_range(1..=max_page.max(1))
}

pub fn pick_index<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(rng.gen_range(0..len))
}

/// One element of the response's `results` array, unchanged.
pub fn pick_result<R: Rng + ?Sized>(rng: &mut R, response: &Value) -> Option<Value> {
    let results = response.get("results")?.as_array()?;
    let index = pick_index(rng, results.len())?;
    results.get(index).cloned()
}

/// Upstream `total_pages`, if it reports any.
pub fn total_pages(response: &Value) -> Option<u32> {
    response
        .get("total_pages")
        .and_then(|v| v.as_u64())
        .filter(|n| *n >= 1)
        .map(|n| n.min(u32::MAX as u64) as u32)
}

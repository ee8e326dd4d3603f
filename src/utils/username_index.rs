//! In-memory index of taken usernames used by registration.
//!
//! A cuckoo filter answers "definitely free" without touching the database,
//! a moka cache answers "definitely taken" for recently active accounts, and
//! everything else falls through to MySQL.

use anyhow::{Context, Result};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;
use std::time::Duration;

const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

static RECENT: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(500_000)
        .time_to_live(Duration::from_secs(86_400))
        .build()
});

#[inline]
fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

/// false means the username is certainly free
pub fn might_exist(username: &str) -> bool {
    let key = normalize(username);
    match FILTER.read() {
        Ok(filter) => filter.contains(&key),
        // poisoned filter: force the database check
        Err(_) => true,
    }
}

fn add_to_filter(keys: &[String]) {
    if let Ok(mut filter) = FILTER.write() {
        for key in keys {
            filter.add(key);
        }
    }
}

/// Record a freshly registered username
pub async fn mark_taken(username: &str) {
    let key = normalize(username);
    add_to_filter(std::slice::from_ref(&key));
    RECENT.insert(key, ()).await;
}

pub async fn is_recently_taken(username: &str) -> bool {
    RECENT.contains_key(&normalize(username))
}

/// true => available
pub async fn is_available(username: &str, pool: &MySqlPool) -> bool {
    if !might_exist(username) {
        return true;
    }

    if is_recently_taken(username).await {
        return false;
    }

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(username) = ? LIMIT 1)",
    )
    .bind(normalize(username))
    .fetch_one(pool)
    .await
    .unwrap_or(1);

    exists == 0
}

/// Load every username into the filter and recent logins into the cache
pub async fn warmup(pool: &MySqlPool, recent_days: u32, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT username,
               CAST(COALESCE(last_login_at >= NOW() - INTERVAL ? DAY, 0) AS SIGNED) AS recent
        FROM users
        "#,
    )
    .bind(recent_days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;
    let mut recent = 0usize;

    while let Some(row) = stream.next().await {
        let (username, is_recent) = row.context("username warmup row fetch failed")?;
        let key = normalize(&username);

        if is_recent != 0 {
            RECENT.insert(key.clone(), ()).await;
            recent += 1;
        }

        batch.push(key);
        total += 1;

        if batch.len() >= batch_size {
            add_to_filter(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        add_to_filter(&batch);
    }

    log::info!(
        "Username index warmup complete: {} users, {} active in the last {} days",
        total,
        recent,
        recent_days
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn marked_usernames_are_found_case_insensitively() {
        mark_taken("Grace.Hopper").await;

        assert!(might_exist("grace.hopper"));
        assert!(is_recently_taken("GRACE.HOPPER").await);
    }

    #[test]
    fn unknown_usernames_are_reported_free() {
        assert!(!might_exist("nobody-registered-this-name-0x5f3759df"));
    }
}

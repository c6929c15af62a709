//! Social corpus connector (one of three in C6).
//!
//! Ranked queries add an engagement bonus (`log(1+engagement)*0.05`) on top
//! of the FTS5 rank, per spec.

use crate::error::{Error, Result};
use crate::search::cache::{cache_key, CacheBackend};
use crate::search::{date_or_today, trim, SearchResult, SearchSnippet};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const TRIM_LEN: usize = 180;
const ENGAGEMENT_WEIGHT: f64 = 0.05;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialFilters {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub platform: Option<String>,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
}

pub struct SocialConnector {
    conn: Arc<Mutex<Connection>>,
    cache: Arc<dyn CacheBackend>,
    cache_ttl: Duration,
    fts_available: bool,
}

impl SocialConnector {
    pub fn new(conn: Arc<Mutex<Connection>>, cache: Arc<dyn CacheBackend>, cache_ttl: Duration) -> Self {
        let fts_available = table_exists(&conn, "posts_fts");
        Self {
            conn,
            cache,
            cache_ttl,
            fts_available,
        }
    }

    pub async fn query(&self, query: &str, filters: &SocialFilters, limit: usize) -> Result<SearchResult> {
        let key = cache_key(
            "social",
            &serde_json::json!({"q": query, "f": filters, "l": limit}),
        );
        if let Some(cached) = self.cache.get(&key).await {
            if let Ok(result) = serde_json::from_str::<SearchResult>(&cached) {
                return Ok(result);
            }
        }

        let result = self.run_query(query, filters, limit).unwrap_or_else(|e| {
            warn!(error = %e, "social corpus query failed, failing closed");
            SearchResult::default()
        });

        if let Ok(serialized) = serde_json::to_string(&result) {
            self.cache.set_with_ttl(&key, serialized, self.cache_ttl).await;
        }
        Ok(result)
    }

    fn run_query(&self, query: &str, filters: &SocialFilters, limit: usize) -> Result<SearchResult> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut snippets = Vec::new();

        if self.fts_available && !query.is_empty() {
            let mut stmt = conn
                .prepare(
                    "SELECT p.id, p.platform, p.content, p.ts, p.engagement,
                            (bm25(posts_fts) * -1.0) + (ln(1 + p.engagement) * ?3) AS rank
                     FROM posts p JOIN posts_fts f ON p.id = f.rowid
                     WHERE posts_fts MATCH ?1
                     ORDER BY rank DESC, p.ts DESC
                     LIMIT ?2",
                )
                .map_err(|e| Error::DataError(e.to_string()))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![query, limit as i64, ENGAGEMENT_WEIGHT],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    },
                )
                .map_err(|e| Error::DataError(e.to_string()))?;
            for row in rows {
                let (id, platform, content, ts, engagement) =
                    row.map_err(|e| Error::DataError(e.to_string()))?;
                snippets.push(to_snippet(id, platform, &content, ts, engagement));
            }
        } else {
            let mut sql =
                String::from("SELECT id, platform, content, ts, engagement FROM posts WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if !query.is_empty() {
                sql.push_str(" AND content LIKE ?");
                args.push(Box::new(format!("%{query}%")));
            }
            if let Some(platform) = &filters.platform {
                sql.push_str(" AND platform = ?");
                args.push(Box::new(platform.clone()));
            }
            if let Some(from) = filters.date_from {
                sql.push_str(" AND ts >= ?");
                args.push(Box::new(from.to_rfc3339()));
            }
            if let Some(to) = filters.date_to {
                sql.push_str(" AND ts <= ?");
                args.push(Box::new(to.to_rfc3339()));
            }
            sql.push_str(" ORDER BY ts DESC, engagement DESC LIMIT ?");
            args.push(Box::new(limit as i64));

            let mut stmt = conn.prepare(&sql).map_err(|e| Error::DataError(e.to_string()))?;
            let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
            let rows = stmt
                .query_map(param_refs.as_slice(), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })
                .map_err(|e| Error::DataError(e.to_string()))?;
            for row in rows {
                let (id, platform, content, ts, engagement) =
                    row.map_err(|e| Error::DataError(e.to_string()))?;
                snippets.push(to_snippet(id, platform, &content, ts, engagement));
            }
        }

        Ok(SearchResult { snippets })
    }
}

fn to_snippet(id: i64, platform: Option<String>, content: &str, ts: Option<String>, engagement: i64) -> SearchSnippet {
    let date = ts
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|d| d.date_naive().to_string())
        .unwrap_or_else(|| date_or_today(None));
    SearchSnippet {
        text: trim(content, TRIM_LEN),
        date,
        tags: Vec::new(),
        voice_terms: Vec::new(),
        attribution: format!("social://posts/{id}"),
        notes: String::new(),
        extra: serde_json::json!({"platform": platform, "engagement": engagement}),
    }
}

fn table_exists(conn: &Arc<Mutex<Connection>>, name: &str) -> bool {
    let conn = conn.lock().expect("sqlite connection lock poisoned");
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}

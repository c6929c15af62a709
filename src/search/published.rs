//! Published corpus connector (one of three in C6).
//!
//! Ranked queries add an authority bonus (`authority_score*0.1`) on top of
//! the FTS5 rank, per spec.

use crate::error::{Error, Result};
use crate::search::cache::{cache_key, CacheBackend};
use crate::search::{date_or_today, trim, SearchResult, SearchSnippet};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const TRIM_LEN: usize = 360;
const AUTHORITY_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishedFilters {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub tags: Vec<String>,
}

pub struct PublishedConnector {
    conn: Arc<Mutex<Connection>>,
    cache: Arc<dyn CacheBackend>,
    cache_ttl: Duration,
    fts_available: bool,
}

impl PublishedConnector {
    pub fn new(conn: Arc<Mutex<Connection>>, cache: Arc<dyn CacheBackend>, cache_ttl: Duration) -> Self {
        let fts_available = table_exists(&conn, "articles_fts");
        Self {
            conn,
            cache,
            cache_ttl,
            fts_available,
        }
    }

    pub async fn query(&self, query: &str, filters: &PublishedFilters, limit: usize) -> Result<SearchResult> {
        let key = cache_key(
            "published",
            &serde_json::json!({"q": query, "f": filters, "l": limit}),
        );
        if let Some(cached) = self.cache.get(&key).await {
            if let Ok(result) = serde_json::from_str::<SearchResult>(&cached) {
                return Ok(result);
            }
        }

        let result = self.run_query(query, filters, limit).unwrap_or_else(|e| {
            warn!(error = %e, "published corpus query failed, failing closed");
            SearchResult::default()
        });

        if let Ok(serialized) = serde_json::to_string(&result) {
            self.cache.set_with_ttl(&key, serialized, self.cache_ttl).await;
        }
        Ok(result)
    }

    fn run_query(&self, query: &str, filters: &PublishedFilters, limit: usize) -> Result<SearchResult> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut snippets = Vec::new();

        if self.fts_available && !query.is_empty() {
            let mut stmt = conn
                .prepare(
                    "SELECT a.id, a.author, a.content, a.ts,
                            (bm25(articles_fts) * -1.0) + (COALESCE(s.authority_score, 0.0) * ?3) AS rank
                     FROM articles a
                     JOIN articles_fts f ON a.id = f.rowid
                     LEFT JOIN sources s ON a.source_id = s.id
                     WHERE articles_fts MATCH ?1
                     ORDER BY rank DESC, a.ts DESC
                     LIMIT ?2",
                )
                .map_err(|e| Error::DataError(e.to_string()))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![query, limit as i64, AUTHORITY_WEIGHT],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .map_err(|e| Error::DataError(e.to_string()))?;
            for row in rows {
                let (id, author, content, ts) = row.map_err(|e| Error::DataError(e.to_string()))?;
                snippets.push(to_snippet(id, author, &content, ts));
            }
        } else {
            let mut sql =
                String::from("SELECT id, author, content, ts FROM articles WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if !query.is_empty() {
                sql.push_str(" AND content LIKE ?");
                args.push(Box::new(format!("%{query}%")));
            }
            if let Some(author) = &filters.author {
                sql.push_str(" AND author = ?");
                args.push(Box::new(author.clone()));
            }
            if let Some(from) = filters.date_from {
                sql.push_str(" AND ts >= ?");
                args.push(Box::new(from.to_rfc3339()));
            }
            if let Some(to) = filters.date_to {
                sql.push_str(" AND ts <= ?");
                args.push(Box::new(to.to_rfc3339()));
            }
            sql.push_str(" ORDER BY ts DESC LIMIT ?");
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
                    ))
                })
                .map_err(|e| Error::DataError(e.to_string()))?;
            for row in rows {
                let (id, author, content, ts) = row.map_err(|e| Error::DataError(e.to_string()))?;
                snippets.push(to_snippet(id, author, &content, ts));
            }
        }

        Ok(SearchResult { snippets })
    }
}

fn to_snippet(id: i64, author: Option<String>, content: &str, ts: Option<String>) -> SearchSnippet {
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
        attribution: format!("published://articles/{id}"),
        notes: String::new(),
        extra: serde_json::json!({"author": author}),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::cache::NoOpCache;
    use crate::search::schema::initialize_schema;

    fn seeded_connector() -> PublishedConnector {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO sources (id, domain, authority_score) VALUES (1, 'example.com', 0.9)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO articles (id, title, content, ts, author, source_id) VALUES (1, 't', 'hello world', '2024-01-01T00:00:00+00:00', 'jane', 1)",
            [],
        )
        .unwrap();
        PublishedConnector::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(NoOpCache),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn fallback_query_matches_substring() {
        let connector = seeded_connector();
        let result = connector
            .query("hello", &PublishedFilters::default(), 20)
            .await
            .unwrap();
        assert_eq!(result.snippets.len(), 1);
        assert_eq!(result.snippets[0].extra["author"], "jane");
    }

    #[tokio::test]
    async fn query_on_db_error_fails_closed() {
        let conn = Connection::open_in_memory().unwrap();
        let connector = PublishedConnector::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(NoOpCache),
            Duration::from_secs(60),
        );
        let result = connector
            .query("hello", &PublishedFilters::default(), 20)
            .await
            .unwrap();
        assert!(result.snippets.is_empty());
    }
}

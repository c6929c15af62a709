//! Personal corpus connector (one of three in C6).

use crate::error::{Error, Result};
use crate::search::cache::{cache_key, CacheBackend};
use crate::search::{date_or_today, trim, SearchResult, SearchSnippet};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const TRIM_LEN: usize = 240;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalFilters {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub role: Option<String>,
    pub source: Option<String>,
    pub thread_id: Option<String>,
    pub tags: Vec<String>,
}

pub struct PersonalConnector {
    conn: Arc<Mutex<Connection>>,
    cache: Arc<dyn CacheBackend>,
    cache_ttl: Duration,
    fts_available: bool,
}

impl PersonalConnector {
    pub fn new(conn: Arc<Mutex<Connection>>, cache: Arc<dyn CacheBackend>, cache_ttl: Duration) -> Self {
        let fts_available = table_exists(&conn, "messages_fts");
        Self {
            conn,
            cache,
            cache_ttl,
            fts_available,
        }
    }

    pub async fn query(&self, query: &str, filters: &PersonalFilters, limit: usize) -> Result<SearchResult> {
        let key = cache_key(
            "personal",
            &serde_json::json!({"q": query, "f": filters, "l": limit}),
        );
        if let Some(cached) = self.cache.get(&key).await {
            if let Ok(result) = serde_json::from_str::<SearchResult>(&cached) {
                return Ok(result);
            }
        }

        let result = self.run_query(query, filters, limit).unwrap_or_else(|e| {
            warn!(error = %e, "personal corpus query failed, failing closed");
            SearchResult::default()
        });

        if let Ok(serialized) = serde_json::to_string(&result) {
            self.cache.set_with_ttl(&key, serialized, self.cache_ttl).await;
        }
        Ok(result)
    }

    fn run_query(&self, query: &str, filters: &PersonalFilters, limit: usize) -> Result<SearchResult> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut snippets = Vec::new();

        if self.fts_available && !query.is_empty() {
            let mut stmt = conn
                .prepare(
                    "SELECT m.id, m.thread_id, m.content, m.ts
                     FROM messages m JOIN messages_fts f ON m.id = f.rowid
                     WHERE messages_fts MATCH ?1
                     ORDER BY rank, m.ts DESC
                     LIMIT ?2",
                )
                .map_err(|e| Error::DataError(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![query, limit as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })
                .map_err(|e| Error::DataError(e.to_string()))?;
            for row in rows {
                let (id, thread_id, content, ts) = row.map_err(|e| Error::DataError(e.to_string()))?;
                snippets.push(to_snippet(id, thread_id, &content, ts));
            }
        } else {
            let mut sql = String::from("SELECT id, thread_id, content, ts FROM messages WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if !query.is_empty() {
                sql.push_str(" AND content LIKE ?");
                args.push(Box::new(format!("%{query}%")));
            }
            if let Some(role) = &filters.role {
                sql.push_str(" AND role = ?");
                args.push(Box::new(role.clone()));
            }
            if let Some(thread_id) = &filters.thread_id {
                sql.push_str(" AND thread_id = ?");
                args.push(Box::new(thread_id.clone()));
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
                let (id, thread_id, content, ts) = row.map_err(|e| Error::DataError(e.to_string()))?;
                snippets.push(to_snippet(id, thread_id, &content, ts));
            }
        }

        Ok(SearchResult { snippets })
    }
}

fn to_snippet(id: i64, thread_id: Option<String>, content: &str, ts: Option<String>) -> SearchSnippet {
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
        attribution: format!("personal://messages/{id}"),
        notes: String::new(),
        extra: serde_json::json!({"thread_id": thread_id, "message_id": id.to_string()}),
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

    fn seeded_connector() -> PersonalConnector {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO messages (id, thread_id, role, content, ts) VALUES (1, 't1', 'user', 'hello world', '2024-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        PersonalConnector::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(NoOpCache),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn fallback_query_matches_substring() {
        let connector = seeded_connector();
        let result = connector
            .query("hello", &PersonalFilters::default(), 20)
            .await
            .unwrap();
        assert_eq!(result.snippets.len(), 1);
        assert_eq!(result.snippets[0].attribution, "personal://messages/1");
    }

    #[tokio::test]
    async fn fallback_query_on_db_error_fails_closed() {
        let conn = Connection::open_in_memory().unwrap();
        // Schema not initialized: querying "messages" will error.
        let connector = PersonalConnector::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(NoOpCache),
            Duration::from_secs(60),
        );
        let result = connector
            .query("hello", &PersonalFilters::default(), 20)
            .await
            .unwrap();
        assert!(result.snippets.is_empty());
    }
}

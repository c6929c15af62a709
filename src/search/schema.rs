//! Corpus schema provisioning (§6 "Corpus schema").
//!
//! This crate owns table creation and FTS5 migration, not ingestion —
//! importers that populate these tables are an external collaborator.

use rusqlite::{Connection, Result as SqliteResult};

pub const SCHEMA_VERSION: i32 = 1;

/// Create the personal/social/published tables (and their FTS5 shadow
/// tables, when FTS5 is available) if they do not already exist.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    apply_personal(conn)?;
    apply_social(conn)?;
    apply_published(conn)?;
    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    Ok(())
}

fn apply_personal(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS threads (
            thread_id TEXT PRIMARY KEY,
            title TEXT,
            participants TEXT,
            tags TEXT,
            started_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY,
            thread_id TEXT REFERENCES threads(thread_id),
            role TEXT,
            content TEXT NOT NULL,
            ts TEXT,
            source TEXT,
            channel TEXT,
            meta TEXT
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(ts)", [])?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attachments (
            id INTEGER PRIMARY KEY,
            message_id INTEGER REFERENCES messages(id),
            kind TEXT,
            url TEXT,
            meta TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
            content,
            content='messages',
            content_rowid='id'
        )",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
            INSERT INTO messages_fts(rowid, content) VALUES (NEW.id, NEW.content);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS messages_ad AFTER DELETE ON messages BEGIN
            INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS messages_au AFTER UPDATE ON messages BEGIN
            INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
            INSERT INTO messages_fts(rowid, content) VALUES (NEW.id, NEW.content);
        END",
        [],
    )?;
    Ok(())
}

fn apply_social(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            platform TEXT,
            content TEXT NOT NULL,
            ts TEXT,
            url TEXT,
            hashtags TEXT,
            mentions TEXT,
            engagement INTEGER DEFAULT 0,
            meta TEXT
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_posts_platform ON posts(platform)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_posts_ts ON posts(ts)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_posts_engagement ON posts(engagement)", [])?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY,
            post_id INTEGER REFERENCES posts(id),
            author TEXT,
            content TEXT,
            ts TEXT,
            engagement INTEGER DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS posts_fts USING fts5(
            content,
            content='posts',
            content_rowid='id'
        )",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS posts_ai AFTER INSERT ON posts BEGIN
            INSERT INTO posts_fts(rowid, content) VALUES (NEW.id, NEW.content);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS posts_ad AFTER DELETE ON posts BEGIN
            INSERT INTO posts_fts(posts_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS posts_au AFTER UPDATE ON posts BEGIN
            INSERT INTO posts_fts(posts_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
            INSERT INTO posts_fts(rowid, content) VALUES (NEW.id, NEW.content);
        END",
        [],
    )?;
    Ok(())
}

fn apply_published(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY,
            domain TEXT UNIQUE,
            authority_score REAL DEFAULT 0.0
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS articles (
            id INTEGER PRIMARY KEY,
            title TEXT,
            content TEXT NOT NULL,
            ts TEXT,
            author TEXT,
            url TEXT,
            tags TEXT,
            meta TEXT,
            source_id INTEGER REFERENCES sources(id)
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_articles_ts ON articles(ts)", [])?;

    conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts USING fts5(
            content,
            content='articles',
            content_rowid='id'
        )",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS articles_ai AFTER INSERT ON articles BEGIN
            INSERT INTO articles_fts(rowid, content) VALUES (NEW.id, NEW.content);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS articles_ad AFTER DELETE ON articles BEGIN
            INSERT INTO articles_fts(articles_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS articles_au AFTER UPDATE ON articles BEGIN
            INSERT INTO articles_fts(articles_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
            INSERT INTO articles_fts(rowid, content) VALUES (NEW.id, NEW.content);
        END",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn creates_all_corpus_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        for table in ["threads", "messages", "attachments", "posts", "comments", "sources", "articles"] {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}

// Per-repository code graph over SQLite

pub mod analysis;
pub mod schema;
pub mod store;

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::parser::model::{SymbolKind, Visibility};

pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Edge kinds stored in the graph. `Calls` and `Extends` connect symbols;
/// `Imports` connects files; `DependsOn` connects a file to an external
/// module marker (`ext:<module>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Imports,
    DependsOn,
    Extends,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Calls => "calls",
            EdgeKind::Imports => "imports",
            EdgeKind::DependsOn => "depends_on",
            EdgeKind::Extends => "extends",
        }
    }
}

/// Repository row: graph scope plus the last-synced watermark.
#[derive(Debug, Clone, Serialize)]
pub struct RepoRecord {
    pub id: i64,
    pub name: String,
    pub root: String,
    pub last_synced_ref: Option<String>,
}

/// Persisted projection of a parsed file.
#[derive(Debug, Clone, Serialize)]
pub struct FileNode {
    pub path: String,
    pub language: Option<String>,
    pub line_count: u32,
    pub content_hash: String,
}

/// Persisted projection of a parsed symbol, keyed by qualified name within
/// one repository.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolNode {
    pub qualified_name: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: Option<String>,
    pub visibility: Visibility,
    pub is_exported: bool,
    pub complexity: u32,
    pub parent: Option<String>,
}

impl SymbolNode {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_s: String = row.get("kind")?;
        let vis_s: String = row.get("visibility")?;
        Ok(Self {
            qualified_name: row.get("qualified_name")?,
            name: row.get("name")?,
            kind: parse_col(&kind_s, SymbolKind::parse)?,
            file: row.get("file")?,
            start_line: row.get("start_line")?,
            end_line: row.get("end_line")?,
            signature: row.get("signature")?,
            visibility: parse_col(&vis_s, Visibility::parse)?,
            is_exported: row.get("is_exported")?,
            complexity: row.get("complexity")?,
            parent: row.get("parent")?,
        })
    }
}

fn parse_col<T>(s: &str, parse: impl Fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unrecognized stored value: {}", s).into(),
        )
    })
}

/// Owns the graph database: connection pool, schema, repository records,
/// all write and read operations (split across `store` and `analysis`).
pub struct GraphManager {
    pool: ConnectionPool,
}

impl GraphManager {
    /// Open (or create) the graph database at `path` and bring the schema
    /// up to date.
    pub fn open(path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = Pool::builder().max_size(8).build(manager)?;
        let conn = pool.get()?;
        schema::init_schema(&conn)?;
        info!("graph database ready at {}", path.display());
        Ok(Self { pool })
    }

    pub(crate) fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Look up a repository by name, creating the row on first use.
    pub fn ensure_repo(&self, name: &str, root: &str) -> Result<RepoRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO repositories (name, root) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET root = excluded.root",
            params![name, root],
        )?;
        self.get_repo(name)?
            .ok_or_else(|| EngineError::RepoNotFound(name.to_string()))
    }

    pub fn get_repo(&self, name: &str) -> Result<Option<RepoRecord>> {
        let conn = self.conn()?;
        let repo = conn
            .query_row(
                "SELECT id, name, root, last_synced_ref FROM repositories WHERE name = ?1",
                params![name],
                |row| {
                    Ok(RepoRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        root: row.get(2)?,
                        last_synced_ref: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(repo)
    }

    pub fn watermark(&self, repo_id: i64) -> Result<Option<String>> {
        let conn = self.conn()?;
        let mark: Option<Option<String>> = conn
            .query_row(
                "SELECT last_synced_ref FROM repositories WHERE id = ?1",
                params![repo_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(mark.flatten())
    }

    pub fn set_watermark(&self, repo_id: i64, target_ref: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE repositories SET last_synced_ref = ?2 WHERE id = ?1",
            params![repo_id, target_ref],
        )?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_manager() -> (tempfile::TempDir, GraphManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = GraphManager::open(&dir.path().join("graph.db")).unwrap();
        (dir, manager)
    }

    #[test]
    fn ensure_repo_is_idempotent() {
        let (_dir, manager) = test_manager();
        let a = manager.ensure_repo("acme/api", "/srv/acme").unwrap();
        let b = manager.ensure_repo("acme/api", "/srv/acme").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn watermark_round_trip() {
        let (_dir, manager) = test_manager();
        let repo = manager.ensure_repo("acme/api", "/srv/acme").unwrap();
        assert!(manager.watermark(repo.id).unwrap().is_none());
        manager.set_watermark(repo.id, "abc123").unwrap();
        assert_eq!(manager.watermark(repo.id).unwrap().as_deref(), Some("abc123"));
    }
}

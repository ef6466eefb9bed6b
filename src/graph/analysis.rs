// Graph read operations and analysis algorithms
//
// Read queries are never gated by sync state; a graph mid-sync may mix pre-
// and post-sync files.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::types::ValueRef;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::error::Result;
use crate::parser::model::SymbolKind;

use super::{FileNode, GraphManager, SymbolNode};

/// Default hop bound for call-path search.
pub const DEFAULT_MAX_DEPTH: u32 = 10;
/// Default complexity threshold for hotspot reports.
pub const DEFAULT_HOTSPOT_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub files: i64,
    pub symbols: i64,
    pub edges: i64,
    pub symbols_by_kind: Vec<(String, i64)>,
    pub files_by_language: Vec<(String, i64)>,
    pub edges_by_kind: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolUsage {
    pub symbol: SymbolNode,
    pub callers: Vec<SymbolNode>,
    pub callees: Vec<SymbolNode>,
}

/// Closed set of named query shapes, safe for untrusted callers. `Custom`
/// runs verbatim; screening free-text input is the calling boundary's job.
#[derive(Debug, Clone)]
pub enum TypedQuery {
    Calls { symbol: String },
    CalledBy { symbol: String },
    Imports { file: String },
    ImportedBy { file: String },
    Defines { file: String },
    Inherits { class: String },
    Path { from: String, to: String, max_depth: u32 },
    Custom { sql: String },
}

impl GraphManager {
    pub fn get_stats(&self, repo_id: i64) -> Result<GraphStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<i64> {
            Ok(conn.query_row(sql, params![repo_id], |row| row.get(0))?)
        };
        let breakdown = |sql: &str| -> Result<Vec<(String, i64)>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params![repo_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        };
        Ok(GraphStats {
            files: count("SELECT COUNT(*) FROM files WHERE repo_id = ?1")?,
            symbols: count("SELECT COUNT(*) FROM symbols WHERE repo_id = ?1")?,
            edges: count("SELECT COUNT(*) FROM edges WHERE repo_id = ?1")?,
            symbols_by_kind: breakdown(
                "SELECT kind, COUNT(*) FROM symbols WHERE repo_id = ?1
                 GROUP BY kind ORDER BY COUNT(*) DESC, kind",
            )?,
            files_by_language: breakdown(
                "SELECT COALESCE(language, 'unknown'), COUNT(*) FROM files WHERE repo_id = ?1
                 GROUP BY language ORDER BY COUNT(*) DESC, language",
            )?,
            edges_by_kind: breakdown(
                "SELECT kind, COUNT(*) FROM edges WHERE repo_id = ?1
                 GROUP BY kind ORDER BY COUNT(*) DESC, kind",
            )?,
        })
    }

    /// Execute a caller-supplied read query verbatim and return rows as JSON
    /// objects. No content filtering happens here.
    pub fn query(&self, sql: &str) -> Result<Vec<JsonValue>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_json(row, &columns)?);
        }
        Ok(out)
    }

    /// Run one of the fixed query shapes against a repository graph.
    pub fn execute_query(&self, repo_id: i64, query: TypedQuery) -> Result<JsonValue> {
        match query {
            TypedQuery::Calls { symbol } => {
                Ok(serde_json::to_value(self.get_callees(repo_id, &symbol)?)?)
            }
            TypedQuery::CalledBy { symbol } => {
                Ok(serde_json::to_value(self.get_callers(repo_id, &symbol)?)?)
            }
            TypedQuery::Imports { file } => {
                Ok(serde_json::to_value(self.get_file_dependencies(repo_id, &file)?)?)
            }
            TypedQuery::ImportedBy { file } => {
                Ok(serde_json::to_value(self.get_file_dependents(repo_id, &file)?)?)
            }
            TypedQuery::Defines { file } => {
                Ok(serde_json::to_value(self.get_file_symbols(repo_id, &file)?)?)
            }
            TypedQuery::Inherits { class } => {
                let keys = self.resolve_symbol_keys(repo_id, &class)?;
                let conn = self.conn()?;
                let mut bases = Vec::new();
                let mut derived = Vec::new();
                for key in &keys {
                    let mut stmt = conn.prepare(
                        "SELECT to_key FROM edges
                         WHERE repo_id = ?1 AND from_key = ?2 AND kind = 'extends'
                         ORDER BY to_key",
                    )?;
                    let rows = stmt.query_map(params![repo_id, key], |row| row.get::<_, String>(0))?;
                    bases.extend(rows.collect::<rusqlite::Result<Vec<_>>>()?);

                    let mut stmt = conn.prepare(
                        "SELECT from_key FROM edges
                         WHERE repo_id = ?1 AND to_key = ?2 AND kind = 'extends'
                         ORDER BY from_key",
                    )?;
                    let rows = stmt.query_map(params![repo_id, key], |row| row.get::<_, String>(0))?;
                    derived.extend(rows.collect::<rusqlite::Result<Vec<_>>>()?);
                }
                Ok(json!({ "bases": bases, "derived": derived }))
            }
            TypedQuery::Path { from, to, max_depth } => {
                Ok(serde_json::to_value(self.find_call_paths(repo_id, &from, &to, max_depth)?)?)
            }
            TypedQuery::Custom { sql } => Ok(JsonValue::Array(self.query(&sql)?)),
        }
    }

    /// A symbol with its direct callers and callees, or `None` when the
    /// qualified name is unknown.
    pub fn get_symbol_usage(&self, repo_id: i64, qualified_name: &str) -> Result<Option<SymbolUsage>> {
        let Some(symbol) = self.get_symbol(repo_id, qualified_name)? else {
            return Ok(None);
        };
        Ok(Some(SymbolUsage {
            callers: self.get_callers(repo_id, qualified_name)?,
            callees: self.get_callees(repo_id, qualified_name)?,
            symbol,
        }))
    }

    pub fn get_symbol(&self, repo_id: i64, qualified_name: &str) -> Result<Option<SymbolNode>> {
        let conn = self.conn()?;
        let symbol = conn
            .query_row(
                "SELECT * FROM symbols WHERE repo_id = ?1 AND qualified_name = ?2",
                params![repo_id, qualified_name],
                SymbolNode::from_row,
            )
            .optional()?;
        Ok(symbol)
    }

    /// Symbols with a CALLS edge into the named symbol. Accepts a qualified
    /// name or a bare name (matching every symbol with that name).
    pub fn get_callers(&self, repo_id: i64, symbol: &str) -> Result<Vec<SymbolNode>> {
        self.call_neighbors(repo_id, symbol, "e.to_key", "e.from_key")
    }

    /// Symbols the named symbol has CALLS edges to.
    pub fn get_callees(&self, repo_id: i64, symbol: &str) -> Result<Vec<SymbolNode>> {
        self.call_neighbors(repo_id, symbol, "e.from_key", "e.to_key")
    }

    fn call_neighbors(
        &self,
        repo_id: i64,
        symbol: &str,
        match_col: &str,
        result_col: &str,
    ) -> Result<Vec<SymbolNode>> {
        let keys = self.resolve_symbol_keys(repo_id, symbol)?;
        let conn = self.conn()?;
        let sql = format!(
            "SELECT s.* FROM edges e
             JOIN symbols s ON s.repo_id = e.repo_id AND s.qualified_name = {result_col}
             WHERE e.repo_id = ?1 AND e.kind = 'calls' AND {match_col} = ?2"
        );
        let mut found: BTreeMap<String, SymbolNode> = BTreeMap::new();
        for key in keys {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![repo_id, key], SymbolNode::from_row)?;
            for node in rows {
                let node = node?;
                found.insert(node.qualified_name.clone(), node);
            }
        }
        Ok(found.into_values().collect())
    }

    /// Enumerate simple call paths from `from` to `to`, at most `max_depth`
    /// hops. Depth-bounded DFS with a per-path visited set: a node may appear
    /// on independent branches but never twice in one path, so the search
    /// terminates on cyclic graphs. Empty result means no path in bound.
    pub fn find_call_paths(
        &self,
        repo_id: i64,
        from: &str,
        to: &str,
        max_depth: u32,
    ) -> Result<Vec<Vec<String>>> {
        let starts = self.resolve_symbol_keys(repo_id, from)?;
        let targets: HashSet<String> =
            self.resolve_symbol_keys(repo_id, to)?.into_iter().collect();
        if starts.is_empty() || targets.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT from_key, to_key FROM edges
                 WHERE repo_id = ?1 AND kind = 'calls'
                 ORDER BY from_key, to_key",
            )?;
            let rows = stmt.query_map(params![repo_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for edge in rows {
                let (from_key, to_key) = edge?;
                adjacency.entry(from_key).or_default().push(to_key);
            }
        }

        let mut paths = Vec::new();
        for start in starts {
            let mut visited: HashSet<String> = HashSet::new();
            visited.insert(start.clone());
            let mut path = vec![start];
            dfs(&adjacency, &targets, max_depth, &mut path, &mut visited, &mut paths);
        }
        Ok(paths)
    }

    /// Non-exported symbols with no incoming CALLS edge. Exported symbols
    /// are potential external entry points and never reported.
    pub fn find_dead_code(&self, repo_id: i64) -> Result<Vec<SymbolNode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM symbols
             WHERE repo_id = ?1 AND is_exported = 0
               AND qualified_name NOT IN (
                   SELECT to_key FROM edges WHERE repo_id = ?1 AND kind = 'calls'
               )
             ORDER BY file, start_line",
        )?;
        let rows = stmt.query_map(params![repo_id], SymbolNode::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Symbols at or above the complexity threshold, most complex first.
    pub fn find_complexity_hotspots(&self, repo_id: i64, threshold: u32) -> Result<Vec<SymbolNode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM symbols
             WHERE repo_id = ?1 AND complexity >= ?2
             ORDER BY complexity DESC, qualified_name",
        )?;
        let rows = stmt.query_map(params![repo_id, threshold], SymbolNode::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get_file_node(&self, repo_id: i64, path: &str) -> Result<Option<FileNode>> {
        let conn = self.conn()?;
        let node = conn
            .query_row(
                "SELECT path, language, line_count, content_hash FROM files
                 WHERE repo_id = ?1 AND path = ?2",
                params![repo_id, path],
                |row| {
                    Ok(FileNode {
                        path: row.get(0)?,
                        language: row.get(1)?,
                        line_count: row.get(2)?,
                        content_hash: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(node)
    }

    pub fn get_file_symbols(&self, repo_id: i64, path: &str) -> Result<Vec<SymbolNode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM symbols WHERE repo_id = ?1 AND file = ?2 ORDER BY start_line",
        )?;
        let rows = stmt.query_map(params![repo_id, path], SymbolNode::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Files (and external module markers) this file imports.
    pub fn get_file_dependencies(&self, repo_id: i64, path: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT to_key FROM edges
             WHERE repo_id = ?1 AND from_key = ?2 AND kind IN ('imports', 'depends_on')
             ORDER BY to_key",
        )?;
        let rows = stmt.query_map(params![repo_id, path], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Files importing this file.
    pub fn get_file_dependents(&self, repo_id: i64, path: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT from_key FROM edges
             WHERE repo_id = ?1 AND to_key = ?2 AND kind = 'imports'
             ORDER BY from_key",
        )?;
        let rows = stmt.query_map(params![repo_id, path], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Substring search over symbol names, optionally narrowed by kind.
    pub fn search_symbols(
        &self,
        repo_id: i64,
        needle: &str,
        kind: Option<SymbolKind>,
        limit: u32,
    ) -> Result<Vec<SymbolNode>> {
        let conn = self.conn()?;
        let pattern = format!("%{}%", escape_like(needle));
        let sql = match kind {
            Some(_) => {
                "SELECT * FROM symbols
                 WHERE repo_id = ?1 AND name LIKE ?2 ESCAPE '\\' AND kind = ?3
                 ORDER BY name, qualified_name LIMIT ?4"
            }
            None => {
                "SELECT * FROM symbols
                 WHERE repo_id = ?1 AND name LIKE ?2 ESCAPE '\\'
                 ORDER BY name, qualified_name LIMIT ?3"
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = match kind {
            Some(k) => stmt.query_map(params![repo_id, pattern, k.as_str(), limit], SymbolNode::from_row)?,
            None => stmt.query_map(params![repo_id, pattern, limit], SymbolNode::from_row)?,
        };
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Expand a symbol reference into concrete qualified names: a name
    /// containing `::` is used as-is (when it exists), a bare name matches
    /// every symbol so named.
    fn resolve_symbol_keys(&self, repo_id: i64, symbol: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        if symbol.contains("::") {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT qualified_name FROM symbols
                     WHERE repo_id = ?1 AND qualified_name = ?2",
                    params![repo_id, symbol],
                    |row| row.get(0),
                )
                .optional()?;
            return Ok(exists.into_iter().collect());
        }
        let mut stmt = conn.prepare(
            "SELECT qualified_name FROM symbols
             WHERE repo_id = ?1 AND name = ?2 ORDER BY qualified_name",
        )?;
        let rows = stmt.query_map(params![repo_id, symbol], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

fn dfs(
    adjacency: &HashMap<String, Vec<String>>,
    targets: &HashSet<String>,
    max_depth: u32,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
    paths: &mut Vec<Vec<String>>,
) {
    let current = match path.last() {
        Some(node) => node.clone(),
        None => return,
    };
    if targets.contains(&current) && path.len() > 1 {
        paths.push(path.clone());
        return;
    }
    // path.len() - 1 hops used so far
    if path.len() as u32 > max_depth {
        return;
    }
    let Some(next) = adjacency.get(&current) else {
        return;
    };
    for neighbor in next {
        if !visited.insert(neighbor.clone()) {
            continue;
        }
        path.push(neighbor.clone());
        dfs(adjacency, targets, max_depth, path, visited, paths);
        path.pop();
        visited.remove(neighbor);
    }
}

fn row_to_json(row: &Row, columns: &[String]) -> rusqlite::Result<JsonValue> {
    let mut object = serde_json::Map::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => JsonValue::Null,
            ValueRef::Integer(n) => JsonValue::from(n),
            ValueRef::Real(f) => JsonValue::from(f),
            ValueRef::Text(t) => JsonValue::from(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => JsonValue::from(format!("<{} bytes>", b.len())),
        };
        object.insert(name.clone(), value);
    }
    Ok(JsonValue::Object(object))
}

/// Escape LIKE wildcards in user input.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_manager;
    use super::*;
    use crate::graph::GraphManager;
    use crate::parser::ParserFacade;

    fn loaded(sources: &[(&str, &str)]) -> (tempfile::TempDir, GraphManager, i64) {
        let (dir, manager) = test_manager();
        let repo = manager.ensure_repo("acme/api", "/tmp/acme").unwrap();
        let facade = ParserFacade::new();
        for (path, content) in sources {
            let parse = facade.parse(path, content);
            manager.apply_file(repo.id, &parse, "h").unwrap();
        }
        manager.relink(repo.id).unwrap();
        (dir, manager, repo.id)
    }

    #[test]
    fn call_paths_respect_depth_bound() {
        let (_dir, manager, repo) = loaded(&[(
            "app/chain.py",
            "def a():\n    b()\n\ndef b():\n    c()\n\ndef c():\n    pass\n",
        )]);

        let paths = manager
            .find_call_paths(repo, "a", "c", DEFAULT_MAX_DEPTH)
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(
            paths[0],
            vec![
                "app/chain.py::a".to_string(),
                "app/chain.py::b".to_string(),
                "app/chain.py::c".to_string(),
            ]
        );

        let bounded = manager.find_call_paths(repo, "a", "c", 1).unwrap();
        assert!(bounded.is_empty());
    }

    #[test]
    fn call_paths_terminate_on_cycles() {
        let (_dir, manager, repo) = loaded(&[(
            "app/cycle.py",
            "def a():\n    b()\n\ndef b():\n    a()\n    c()\n\ndef c():\n    pass\n",
        )]);
        let paths = manager
            .find_call_paths(repo, "a", "c", DEFAULT_MAX_DEPTH)
            .unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn dead_code_excludes_exported_and_called() {
        let (_dir, manager, repo) = loaded(&[(
            "app/main.py",
            "def main():\n    helper()\n\ndef helper():\n    pass\n\ndef _unused():\n    pass\n",
        )]);

        let dead = manager.find_dead_code(repo).unwrap();
        let names: Vec<_> = dead.iter().map(|s| s.name.as_str()).collect();
        // main has zero callers but is exported; helper is called
        assert_eq!(names, vec!["_unused"]);

        let callers = manager.get_callers(repo, "helper").unwrap();
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].name, "main");
    }

    #[test]
    fn hotspots_ordered_by_complexity() {
        let (_dir, manager, repo) = loaded(&[(
            "app/hot.py",
            "def tame():\n    pass\n\ndef spiky(x):\n    if x:\n        pass\n    for i in x:\n        while i:\n            if i:\n                pass\n",
        )]);
        let hotspots = manager.find_complexity_hotspots(repo, 2).unwrap();
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].name, "spiky");
        assert_eq!(hotspots[0].complexity, 5);
    }

    #[test]
    fn symbol_usage_and_not_found() {
        let (_dir, manager, repo) = loaded(&[(
            "app/main.py",
            "def main():\n    helper()\n\ndef helper():\n    pass\n",
        )]);
        let usage = manager
            .get_symbol_usage(repo, "app/main.py::helper")
            .unwrap()
            .unwrap();
        assert_eq!(usage.callers.len(), 1);
        assert!(usage.callees.is_empty());

        assert!(manager.get_symbol_usage(repo, "app/main.py::ghost").unwrap().is_none());
    }

    #[test]
    fn file_views_and_search() {
        let (_dir, manager, repo) = loaded(&[
            ("app/main.py", "from app.util import fetch_rows\n\ndef main():\n    pass\n"),
            ("app/util.py", "def fetch_rows():\n    pass\n"),
        ]);

        let deps = manager.get_file_dependencies(repo, "app/main.py").unwrap();
        assert_eq!(deps, vec!["app/util.py".to_string()]);
        let dependents = manager.get_file_dependents(repo, "app/util.py").unwrap();
        assert_eq!(dependents, vec!["app/main.py".to_string()]);

        let hits = manager.search_symbols(repo, "fetch", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "fetch_rows");
        let none = manager
            .search_symbols(repo, "fetch", Some(SymbolKind::Class), 10)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn raw_query_returns_json_rows() {
        let (_dir, manager, repo) = loaded(&[(
            "app/main.py",
            "def main():\n    pass\n",
        )]);
        let rows = manager
            .query("SELECT name, complexity FROM symbols ORDER BY name")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "main");
        assert_eq!(rows[0]["complexity"], 1);
        let _ = repo;
    }
}

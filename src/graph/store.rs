// Graph write operations
//
// All writes for one file happen in a single transaction so readers never
// observe a file's symbols without their defining file row, and a file's
// edges are always consistent with its current symbol set.

use rusqlite::{params, OptionalExtension, Transaction};
use tracing::debug;

use crate::error::Result;
use crate::parser::model::{CallInfo, ImportInfo, InheritInfo, ParseResult};

use super::{EdgeKind, GraphManager};

/// Row-creation counters for one applied file. Upserts that only refresh an
/// existing row do not count.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyOutcome {
    pub nodes_created: u64,
    pub edges_created: u64,
}

impl GraphManager {
    /// Stored content hash for a file, if the file is known.
    pub fn file_hash(&self, repo_id: i64, path: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let hash = conn
            .query_row(
                "SELECT content_hash FROM files WHERE repo_id = ?1 AND path = ?2",
                params![repo_id, path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// Apply one file's parse output as a single atomic unit: upsert the
    /// file node and its symbols, drop symbols that no longer exist, and
    /// rebuild the file's outgoing edges.
    pub fn apply_file(
        &self,
        repo_id: i64,
        parse: &ParseResult,
        content_hash: &str,
    ) -> Result<ApplyOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut outcome = ApplyOutcome::default();

        let existed: bool = tx
            .query_row(
                "SELECT 1 FROM files WHERE repo_id = ?1 AND path = ?2",
                params![repo_id, parse.path],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !existed {
            outcome.nodes_created += 1;
        }

        tx.execute(
            "INSERT INTO files (repo_id, path, language, line_count, content_hash, imports, inherits)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(repo_id, path) DO UPDATE SET
                language = excluded.language,
                line_count = excluded.line_count,
                content_hash = excluded.content_hash,
                imports = excluded.imports,
                inherits = excluded.inherits,
                updated_at = CURRENT_TIMESTAMP",
            params![
                repo_id,
                parse.path,
                parse.language.map(|l| l.as_str()),
                parse.line_count,
                content_hash,
                serde_json::to_string(&parse.imports)?,
                serde_json::to_string(&parse.inherits)?,
            ],
        )?;

        drop_stale_symbols(&tx, repo_id, parse)?;

        for symbol in &parse.symbols {
            let existed: bool = tx
                .query_row(
                    "SELECT 1 FROM symbols WHERE repo_id = ?1 AND qualified_name = ?2",
                    params![repo_id, symbol.qualified_name],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !existed {
                outcome.nodes_created += 1;
            }

            // Replaces prior attributes while keeping the node identity, so
            // inbound CALLS edges from other files stay attached.
            tx.execute(
                "INSERT INTO symbols (
                    repo_id, qualified_name, name, kind, file, start_line, end_line,
                    signature, docstring, return_type, parameters, visibility,
                    is_async, is_static, is_abstract, is_exported, complexity, calls, parent
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                 ON CONFLICT(repo_id, qualified_name) DO UPDATE SET
                    name = excluded.name,
                    kind = excluded.kind,
                    file = excluded.file,
                    start_line = excluded.start_line,
                    end_line = excluded.end_line,
                    signature = excluded.signature,
                    docstring = excluded.docstring,
                    return_type = excluded.return_type,
                    parameters = excluded.parameters,
                    visibility = excluded.visibility,
                    is_async = excluded.is_async,
                    is_static = excluded.is_static,
                    is_abstract = excluded.is_abstract,
                    is_exported = excluded.is_exported,
                    complexity = excluded.complexity,
                    calls = excluded.calls,
                    parent = excluded.parent,
                    updated_at = CURRENT_TIMESTAMP",
                params![
                    repo_id,
                    symbol.qualified_name,
                    symbol.name,
                    symbol.kind.as_str(),
                    symbol.file,
                    symbol.start_line,
                    symbol.end_line,
                    symbol.signature,
                    symbol.docstring,
                    symbol.return_type,
                    serde_json::to_string(&symbol.parameters)?,
                    symbol.visibility.as_str(),
                    symbol.flags.is_async,
                    symbol.flags.is_static,
                    symbol.flags.is_abstract,
                    symbol.flags.is_exported,
                    symbol.complexity,
                    serde_json::to_string(&symbol.calls)?,
                    symbol.parent,
                ],
            )?;
        }

        // Rebuild this file's outgoing edges from scratch.
        tx.execute(
            "DELETE FROM edges WHERE repo_id = ?1 AND file = ?2",
            params![repo_id, parse.path],
        )?;
        for symbol in &parse.symbols {
            outcome.edges_created +=
                link_calls(&tx, repo_id, &symbol.qualified_name, &symbol.file, &symbol.calls)?;
        }
        outcome.edges_created += link_imports(&tx, repo_id, &parse.path, &parse.imports)?;
        outcome.edges_created += link_inherits(&tx, repo_id, &parse.path, &parse.inherits)?;

        tx.commit()?;
        Ok(outcome)
    }

    /// Remove a file node, its symbols, and every edge touching them. Used
    /// by delta sync when a file is deleted.
    pub fn remove_file(&self, repo_id: i64, path: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM edges WHERE repo_id = ?1 AND (
                file = ?2
                OR to_key = ?2
                OR to_key IN (SELECT qualified_name FROM symbols WHERE repo_id = ?1 AND file = ?2)
            )",
            params![repo_id, path],
        )?;
        tx.execute(
            "DELETE FROM symbols WHERE repo_id = ?1 AND file = ?2",
            params![repo_id, path],
        )?;
        tx.execute(
            "DELETE FROM files WHERE repo_id = ?1 AND path = ?2",
            params![repo_id, path],
        )?;
        tx.commit()?;
        debug!("removed file {} from repo {}", path, repo_id);
        Ok(())
    }

    /// End-of-job pass: re-resolve every stored call/import/inherit list
    /// against the now-complete symbol set. Calls to symbols defined later
    /// in the same job become resolvable here. Returns edges created.
    pub fn relink(&self, repo_id: i64) -> Result<u64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut created = 0u64;

        let symbols: Vec<(String, String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT qualified_name, file, calls FROM symbols
                 WHERE repo_id = ?1 AND calls != '[]'",
            )?;
            let rows = stmt.query_map(params![repo_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        for (qualified_name, file, calls_json) in symbols {
            let calls: Vec<CallInfo> = serde_json::from_str(&calls_json)?;
            created += link_calls(&tx, repo_id, &qualified_name, &file, &calls)?;
        }

        let files: Vec<(String, String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT path, imports, inherits FROM files
                 WHERE repo_id = ?1 AND (imports != '[]' OR inherits != '[]')",
            )?;
            let rows = stmt.query_map(params![repo_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        for (path, imports_json, inherits_json) in files {
            let imports: Vec<ImportInfo> = serde_json::from_str(&imports_json)?;
            let inherits: Vec<InheritInfo> = serde_json::from_str(&inherits_json)?;
            created += link_imports(&tx, repo_id, &path, &imports)?;
            created += link_inherits(&tx, repo_id, &path, &inherits)?;
        }

        tx.commit()?;
        debug!("relink pass for repo {} created {} edges", repo_id, created);
        Ok(created)
    }
}

fn drop_stale_symbols(tx: &Transaction, repo_id: i64, parse: &ParseResult) -> Result<()> {
    let keep = serde_json::to_string(
        &parse.symbols.iter().map(|s| &s.qualified_name).collect::<Vec<_>>(),
    )?;
    tx.execute(
        "DELETE FROM edges WHERE repo_id = ?1 AND to_key IN (
            SELECT qualified_name FROM symbols
            WHERE repo_id = ?1 AND file = ?2
              AND qualified_name NOT IN (SELECT value FROM json_each(?3))
        )",
        params![repo_id, parse.path, keep],
    )?;
    tx.execute(
        "DELETE FROM symbols
         WHERE repo_id = ?1 AND file = ?2
           AND qualified_name NOT IN (SELECT value FROM json_each(?3))",
        params![repo_id, parse.path, keep],
    )?;
    Ok(())
}

/// Resolve a bare callee name to a symbol, preferring the caller's own file
/// and otherwise taking the lexicographically first match. `None` is a
/// resolution miss, expected and silent.
fn resolve_callable(
    tx: &Transaction,
    repo_id: i64,
    name: &str,
    caller_file: &str,
) -> Result<Option<String>> {
    let target = tx
        .query_row(
            "SELECT qualified_name FROM symbols
             WHERE repo_id = ?1 AND name = ?2
               AND kind IN ('function', 'method', 'class')
             ORDER BY CASE WHEN file = ?3 THEN 0 ELSE 1 END, file, qualified_name
             LIMIT 1",
            params![repo_id, name, caller_file],
            |row| row.get(0),
        )
        .optional()?;
    Ok(target)
}

fn insert_edge(
    tx: &Transaction,
    repo_id: i64,
    from_key: &str,
    to_key: &str,
    kind: EdgeKind,
    file: &str,
    line: u32,
    conditional: bool,
) -> Result<u64> {
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO edges (repo_id, from_key, to_key, kind, file, line, conditional)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![repo_id, from_key, to_key, kind.as_str(), file, line, conditional],
    )?;
    Ok(inserted as u64)
}

fn link_calls(
    tx: &Transaction,
    repo_id: i64,
    caller: &str,
    caller_file: &str,
    calls: &[CallInfo],
) -> Result<u64> {
    let mut created = 0u64;
    for call in calls {
        let Some(callee) = resolve_callable(tx, repo_id, &call.callee, caller_file)? else {
            continue;
        };
        created += insert_edge(
            tx,
            repo_id,
            caller,
            &callee,
            EdgeKind::Calls,
            caller_file,
            call.line,
            call.is_conditional,
        )?;
    }
    Ok(created)
}

/// A source that resolves to a known file gets an IMPORTS edge; an
/// absolute-looking source that does not gets a DEPENDS_ON edge to an
/// external marker. Resolution can succeed late (relink), in which case the
/// marker edge is replaced.
fn link_imports(
    tx: &Transaction,
    repo_id: i64,
    path: &str,
    imports: &[ImportInfo],
) -> Result<u64> {
    let mut created = 0u64;
    for import in imports {
        if let Some(target) = resolve_import_target(tx, repo_id, &import.source)? {
            if target == path {
                continue;
            }
            tx.execute(
                "DELETE FROM edges
                 WHERE repo_id = ?1 AND from_key = ?2 AND to_key = ?3 AND kind = 'depends_on'",
                params![repo_id, path, format!("ext:{}", import.source)],
            )?;
            created += insert_edge(
                tx,
                repo_id,
                path,
                &target,
                EdgeKind::Imports,
                path,
                import.line,
                false,
            )?;
            continue;
        }
        if import.is_external {
            created += insert_edge(
                tx,
                repo_id,
                path,
                &format!("ext:{}", import.source),
                EdgeKind::DependsOn,
                path,
                import.line,
                false,
            )?;
        }
    }
    Ok(created)
}

/// Best-effort module-to-file resolution: normalize separators, then look
/// for a known file whose path ends with the module path.
fn resolve_import_target(tx: &Transaction, repo_id: i64, source: &str) -> Result<Option<String>> {
    let normalized = source
        .trim_start_matches("./")
        .trim_start_matches('.')
        .replace("::", "/")
        .replace('.', "/");
    if normalized.is_empty() {
        return Ok(None);
    }
    let target = tx
        .query_row(
            "SELECT path FROM files
             WHERE repo_id = ?1 AND (
                path = ?2
                OR path LIKE ?2 || '.%'
                OR path LIKE '%/' || ?2 || '.%'
             )
             ORDER BY path LIMIT 1",
            params![repo_id, normalized],
            |row| row.get(0),
        )
        .optional()?;
    Ok(target)
}

fn link_inherits(
    tx: &Transaction,
    repo_id: i64,
    path: &str,
    inherits: &[InheritInfo],
) -> Result<u64> {
    let mut created = 0u64;
    for inherit in inherits {
        let base = tx
            .query_row(
                "SELECT qualified_name FROM symbols
                 WHERE repo_id = ?1 AND name = ?2
                   AND kind IN ('class', 'interface', 'enum')
                 ORDER BY CASE WHEN file = ?3 THEN 0 ELSE 1 END, file, qualified_name
                 LIMIT 1",
                params![repo_id, inherit.base, path],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        let Some(base) = base else {
            continue;
        };
        created += insert_edge(
            tx,
            repo_id,
            &inherit.class,
            &base,
            EdgeKind::Extends,
            path,
            inherit.line,
            false,
        )?;
    }
    Ok(created)
}

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::error::EngineError;
use crate::graph::analysis::TypedQuery;
use crate::parser::model::SymbolKind;

use super::ProjectContext;

pub async fn run_query(
    project: String,
    kind: String,
    target: String,
    to: Option<String>,
    max_depth: u32,
    format: String,
) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    let repo = ctx.repo()?;

    let query = match kind.as_str() {
        "calls" => TypedQuery::Calls { symbol: target },
        "called-by" => TypedQuery::CalledBy { symbol: target },
        "imports" => TypedQuery::Imports { file: target },
        "imported-by" => TypedQuery::ImportedBy { file: target },
        "defines" => TypedQuery::Defines { file: target },
        "inherits" => TypedQuery::Inherits { class: target },
        "path" => TypedQuery::Path {
            from: target,
            to: to.context("path queries need --to <symbol>")?,
            max_depth,
        },
        "usage" => {
            let usage = ctx
                .graph
                .get_symbol_usage(repo.id, &target)?
                .ok_or(EngineError::SymbolNotFound(target))?;
            print_json(&serde_json::to_value(&usage)?, &format)?;
            return Ok(());
        }
        other => bail!(
            "unknown query kind '{}' (expected calls, called-by, imports, imported-by, defines, inherits, path, usage)",
            other
        ),
    };

    let result = ctx.graph.execute_query(repo.id, query)?;
    print_json(&result, &format)?;
    Ok(())
}

/// Free-text queries reaching the engine from here are untrusted input;
/// this boundary rejects anything that looks mutating before the engine
/// runs it verbatim.
pub async fn run_raw_query(project: String, sql: String, format: String) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    screen_raw_query(&sql)?;
    let rows = ctx.graph.query(&sql)?;
    print_json(&serde_json::Value::Array(rows), &format)?;
    Ok(())
}

pub async fn run_search(
    project: String,
    pattern: String,
    kind: Option<String>,
    limit: u32,
) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    let repo = ctx.repo()?;
    let kind = match kind {
        Some(k) => {
            Some(SymbolKind::parse(&k).with_context(|| format!("unknown symbol kind: {}", k))?)
        }
        None => None,
    };

    let hits = ctx.graph.search_symbols(repo.id, &pattern, kind, limit)?;
    if hits.is_empty() {
        println!("No symbols matching '{}'", pattern);
        return Ok(());
    }
    for symbol in hits {
        println!(
            "{:<10} {}  ({}:{})",
            symbol.kind.as_str(),
            symbol.qualified_name,
            symbol.file,
            symbol.start_line
        );
    }
    Ok(())
}

fn screen_raw_query(sql: &str) -> Result<()> {
    let screen = Regex::new(
        r"(?i)\b(insert|update|delete|drop|alter|create|replace|attach|detach|pragma|vacuum|reindex|begin|commit)\b",
    )?;
    if let Some(found) = screen.find(sql) {
        return Err(
            EngineError::QueryRejected(format!("mutating keyword '{}'", found.as_str())).into(),
        );
    }
    Ok(())
}

fn print_json(value: &serde_json::Value, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(value)?),
        _ => match value {
            serde_json::Value::Array(items) if items.is_empty() => println!("(no results)"),
            serde_json::Value::Array(items) => {
                for item in items {
                    println!("{}", compact_line(item));
                }
            }
            other => println!("{}", serde_json::to_string_pretty(other)?),
        },
    }
    Ok(())
}

fn compact_line(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(qname)) = map.get("qualified_name") {
                qname.clone()
            } else {
                serde_json::to_string(value).unwrap_or_default()
            }
        }
        serde_json::Value::Array(path) => path
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" -> "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screening_rejects_mutations_and_allows_reads() {
        assert!(screen_raw_query("SELECT name FROM symbols").is_ok());
        assert!(screen_raw_query("select * from edges where kind = 'calls'").is_ok());
        assert!(screen_raw_query("DROP TABLE symbols").is_err());
        assert!(screen_raw_query("select 1; delete from files").is_err());
        assert!(screen_raw_query("PRAGMA journal_mode = DELETE").is_err());
    }
}

use anyhow::Result;

use super::{ProjectContext, DB_FILE};

pub async fn show_stats(project: String, verbose: bool) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    let repo = ctx.repo()?;
    let stats = ctx.graph.get_stats(repo.id)?;

    println!("Repository: {}", ctx.repo_name);
    if let Some(watermark) = &repo.last_synced_ref {
        println!("Last synced ref: {}", watermark);
    }

    println!("\n📊 Graph statistics:");
    println!("  Files: {}", stats.files);
    println!("  Symbols: {}", stats.symbols);
    println!("  Edges: {}", stats.edges);

    let db_path = ctx.state_dir().join(DB_FILE);
    if let Ok(metadata) = std::fs::metadata(&db_path) {
        println!("  Database size: {:.2} MB", metadata.len() as f64 / (1024.0 * 1024.0));
    }

    if verbose {
        if !stats.symbols_by_kind.is_empty() {
            println!("\n  Symbols by kind:");
            for (kind, count) in &stats.symbols_by_kind {
                println!("    {}: {}", kind, count);
            }
        }
        if !stats.files_by_language.is_empty() {
            println!("  Files by language:");
            for (language, count) in &stats.files_by_language {
                println!("    {}: {}", language, count);
            }
        }
        if !stats.edges_by_kind.is_empty() {
            println!("  Edges by kind:");
            for (kind, count) in &stats.edges_by_kind {
                println!("    {}: {}", kind, count);
            }
        }
    }

    Ok(())
}

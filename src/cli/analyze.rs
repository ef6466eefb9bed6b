use anyhow::Result;

use super::ProjectContext;

pub async fn run_dead_code(project: String) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    let repo = ctx.repo()?;
    let dead = ctx.graph.find_dead_code(repo.id)?;

    if dead.is_empty() {
        println!("No dead code found");
        return Ok(());
    }
    println!("🪦 {} unreferenced symbol(s) (exported symbols excluded):", dead.len());
    for symbol in dead {
        println!(
            "  {:<10} {}  ({}:{})",
            symbol.kind.as_str(),
            symbol.qualified_name,
            symbol.file,
            symbol.start_line
        );
    }
    Ok(())
}

pub async fn run_hotspots(project: String, threshold: Option<u32>) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    let repo = ctx.repo()?;
    let threshold = threshold.unwrap_or(ctx.config.sync.hotspot_threshold);
    let hotspots = ctx.graph.find_complexity_hotspots(repo.id, threshold)?;

    if hotspots.is_empty() {
        println!("No symbols at or above complexity {}", threshold);
        return Ok(());
    }
    println!("🔥 {} symbol(s) at or above complexity {}:", hotspots.len(), threshold);
    for symbol in hotspots {
        println!(
            "  {:>4}  {}  ({}:{})",
            symbol.complexity, symbol.qualified_name, symbol.file, symbol.start_line
        );
    }
    Ok(())
}

pub async fn run_paths(
    project: String,
    from: String,
    to: String,
    max_depth: Option<u32>,
) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    let repo = ctx.repo()?;
    let max_depth = max_depth.unwrap_or(ctx.config.sync.max_path_depth);
    let paths = ctx.graph.find_call_paths(repo.id, &from, &to, max_depth)?;

    if paths.is_empty() {
        println!("No call path from '{}' to '{}' within {} hops", from, to, max_depth);
        return Ok(());
    }
    println!("{} path(s) from '{}' to '{}':", paths.len(), from, to);
    for path in paths {
        println!("  {}", path.join(" -> "));
    }
    Ok(())
}

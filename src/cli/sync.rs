use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::parser::ParserFacade;
use crate::source::WorkspaceSource;
use crate::sync::orchestrator::SyncOrchestrator;
use crate::sync::queue::SyncWorker;
use crate::sync::{JobStatus, JobType};

use super::ProjectContext;

pub async fn run_sync(project: String, mode: String, target_ref: Option<String>) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    let job_type =
        JobType::parse(&mode).context("mode must be one of: full, delta, incremental")?;

    let parser = Arc::new(ParserFacade::new());
    let report = parser.initialize();
    for (language, error) in &report.failed {
        eprintln!("⚠️  {} adapter unavailable: {}", language.as_str(), error);
    }

    let orchestrator = Arc::new(SyncOrchestrator::new(
        ctx.graph.clone(),
        parser,
        ctx.config.clone(),
    ));
    let job = orchestrator
        .enqueue_sync(
            &ctx.repo_name,
            &ctx.project_dir.display().to_string(),
            job_type,
            target_ref.as_deref(),
        )
        .context("could not enqueue sync")?;
    println!("Sync job {} ({}) for {}", job.id, job_type.as_str(), ctx.repo_name);

    let source = Arc::new(WorkspaceSource::new(&ctx.project_dir, &ctx.state_dir())?);
    let worker = SyncWorker::new(orchestrator, &ctx.config.sync);
    worker.register_source(job.repo_id, source);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let job_id = job.id;
    let handle = tokio::spawn(async move { worker.run_until_idle().await });

    let finished = loop {
        let job = ctx
            .graph
            .get_job(job_id)?
            .context("sync job row disappeared")?;
        bar.set_position(job.progress as u64);
        bar.set_message(format!("{} ({}/{})", job.current_step, job.files_done, job.files_total));
        if job.status.is_terminal() {
            break job;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    };
    bar.finish_and_clear();
    handle.await??;

    match finished.status {
        JobStatus::Completed => {
            println!("✅ Sync complete");
            println!("  Files: {}", finished.files_done);
            println!("  Nodes created: {}", finished.nodes_created);
            println!("  Edges created: {}", finished.edges_created);
            if finished.vectors_created > 0 {
                println!("  Vectors created: {}", finished.vectors_created);
            }
        }
        JobStatus::Cancelled => println!("🚫 Sync cancelled"),
        _ => println!(
            "❌ Sync failed: {}",
            finished.error.as_deref().unwrap_or("unknown error")
        ),
    }

    if !finished.file_errors.is_empty() {
        println!("  {} file(s) had errors:", finished.file_errors.len());
        for error in finished.file_errors.iter().take(5) {
            println!("    {}", error);
        }
        if finished.file_errors.len() > 5 {
            println!("    ... and {} more", finished.file_errors.len() - 5);
        }
    }

    Ok(())
}

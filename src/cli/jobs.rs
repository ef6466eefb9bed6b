use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use super::ProjectContext;

pub async fn run_list(project: String, limit: u32) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    let repo = ctx.repo()?;
    let jobs = ctx.graph.list_recent_jobs(repo.id, limit)?;

    if jobs.is_empty() {
        println!("No sync jobs for {}", ctx.repo_name);
        return Ok(());
    }
    println!("{:<6} {:<12} {:<10} {:>5} {:<20}", "ID", "TYPE", "STATUS", "%", "CREATED");
    for job in jobs {
        println!(
            "{:<6} {:<12} {:<10} {:>4}% {:<20}",
            job.id,
            job.job_type.as_str(),
            job.status.as_str(),
            job.progress,
            job.created_at
        );
    }
    Ok(())
}

pub async fn run_status(project: String, job_id: i64) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    let job = ctx
        .graph
        .get_job(job_id)?
        .with_context(|| format!("no sync job with id {}", job_id))?;

    println!("Job {} ({})", job.id, job.job_type.as_str());
    println!("  Status: {}", job.status.as_str());
    println!(
        "  Progress: {}% ({}/{} files), step: {}",
        job.progress, job.files_done, job.files_total, job.current_step
    );
    if let (Some(started), Some(completed)) = (&job.started_at, &job.completed_at) {
        if let Some(duration) = job_duration(started, completed) {
            println!("  Duration: {}s", duration);
        }
    }
    println!("  Nodes created: {}", job.nodes_created);
    println!("  Edges created: {}", job.edges_created);
    println!("  Vectors created: {}", job.vectors_created);
    if job.cancel_requested && !job.status.is_terminal() {
        println!("  Cancellation requested");
    }
    if let Some(error) = &job.error {
        println!("  Error: {}", error);
    }
    if !job.file_errors.is_empty() {
        println!("  File errors ({}):", job.file_errors.len());
        for error in &job.file_errors {
            println!("    {}", error);
        }
    }
    Ok(())
}

/// Timestamps come back from SQLite as `YYYY-MM-DD HH:MM:SS` in UTC.
fn job_duration(started: &str, completed: &str) -> Option<i64> {
    let parse = |s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok();
    Some((parse(completed)? - parse(started)?).num_seconds())
}

pub async fn run_cancel(project: String, job_id: i64) -> Result<()> {
    let ctx = ProjectContext::open(&project)?;
    if ctx.graph.request_cancel(job_id)? {
        println!("Cancellation requested for job {}", job_id);
    } else {
        println!("Job {} is not active; nothing to cancel", job_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_stored_timestamps() {
        assert_eq!(job_duration("2026-08-28 10:00:00", "2026-08-28 10:01:30"), Some(90));
        assert_eq!(job_duration("garbage", "2026-08-28 10:01:30"), None);
    }
}

// Sync job lifecycle
//
// Job rows live in the same SQLite database as the graph; the row is the
// single source of truth for status, counters, and the cancellation flag.

pub mod orchestrator;
pub mod queue;

use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::graph::GraphManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Full,
    Delta,
    Incremental,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Full => "full",
            JobType::Delta => "delta",
            JobType::Incremental => "incremental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(JobType::Full),
            "delta" => Some(JobType::Delta),
            "incremental" => Some(JobType::Incremental),
            _ => None,
        }
    }
}

/// `Pending -> Running -> {Completed, Failed, Cancelled}`; terminal states
/// are set exactly once and never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncJob {
    pub id: i64,
    pub repo_id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub target_ref: Option<String>,
    pub progress: u8,
    pub current_step: String,
    pub files_total: u32,
    pub files_done: u32,
    pub nodes_created: u64,
    pub edges_created: u64,
    pub vectors_created: u64,
    pub error: Option<String>,
    /// Per-file non-fatal errors accumulated over the job.
    pub file_errors: Vec<String>,
    pub cancel_requested: bool,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl SyncJob {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let type_s: String = row.get("job_type")?;
        let status_s: String = row.get("status")?;
        let errors_json: String = row.get("file_errors")?;
        let parse_err = |what: &str| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unrecognized {}", what).into(),
            )
        };
        Ok(Self {
            id: row.get("id")?,
            repo_id: row.get("repo_id")?,
            job_type: JobType::parse(&type_s).ok_or_else(|| parse_err("job type"))?,
            status: JobStatus::parse(&status_s).ok_or_else(|| parse_err("job status"))?,
            target_ref: row.get("target_ref")?,
            progress: row.get("progress")?,
            current_step: row.get("current_step")?,
            files_total: row.get("files_total")?,
            files_done: row.get("files_done")?,
            nodes_created: row.get::<_, i64>("nodes_created")? as u64,
            edges_created: row.get::<_, i64>("edges_created")? as u64,
            vectors_created: row.get::<_, i64>("vectors_created")? as u64,
            error: row.get("error")?,
            file_errors: serde_json::from_str(&errors_json).unwrap_or_default(),
            cancel_requested: row.get("cancel_requested")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

impl GraphManager {
    /// Create a pending job. A repository with a job already in `pending` or
    /// `running` gets a conflict, not a second queued job.
    pub fn create_job(
        &self,
        repo_id: i64,
        job_type: JobType,
        target_ref: Option<&str>,
    ) -> Result<SyncJob> {
        let mut conn = self.conn()?;
        // Immediate so the active-job check and the insert are serialized
        // across connections.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let active: Option<i64> = tx
            .query_row(
                "SELECT id FROM sync_jobs
                 WHERE repo_id = ?1 AND status IN ('pending', 'running')
                 LIMIT 1",
                params![repo_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(job_id) = active {
            return Err(EngineError::JobConflict { job_id });
        }
        tx.execute(
            "INSERT INTO sync_jobs (repo_id, job_type, target_ref)
             VALUES (?1, ?2, ?3)",
            params![repo_id, job_type.as_str(), target_ref],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        info!("enqueued {} sync job {} for repo {}", job_type.as_str(), id, repo_id);
        self.get_job(id)?.ok_or(EngineError::JobNotFound(id))
    }

    pub fn get_job(&self, job_id: i64) -> Result<Option<SyncJob>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                "SELECT * FROM sync_jobs WHERE id = ?1",
                params![job_id],
                SyncJob::from_row,
            )
            .optional()?;
        Ok(job)
    }

    pub fn list_recent_jobs(&self, repo_id: i64, limit: u32) -> Result<Vec<SyncJob>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM sync_jobs WHERE repo_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![repo_id, limit], SyncJob::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Atomically claim the oldest pending job, moving it to `running`.
    pub fn claim_next_job(&self) -> Result<Option<SyncJob>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM sync_jobs WHERE status = 'pending' ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(None);
        };
        let claimed = tx.execute(
            "UPDATE sync_jobs
             SET status = 'running', started_at = CURRENT_TIMESTAMP, current_step = 'starting'
             WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        tx.commit()?;
        if claimed == 0 {
            return Ok(None);
        }
        self.get_job(id)
    }

    pub fn update_job_progress(
        &self,
        job_id: i64,
        progress: u8,
        current_step: &str,
        files_done: u32,
        files_total: u32,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sync_jobs
             SET progress = ?2, current_step = ?3, files_done = ?4, files_total = ?5
             WHERE id = ?1 AND status = 'running'",
            params![job_id, progress.min(100), current_step, files_done, files_total],
        )?;
        Ok(())
    }

    /// Counters accumulate monotonically across the job.
    pub fn add_job_counters(&self, job_id: i64, nodes: u64, edges: u64, vectors: u64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sync_jobs
             SET nodes_created = nodes_created + ?2,
                 edges_created = edges_created + ?3,
                 vectors_created = vectors_created + ?4
             WHERE id = ?1",
            params![job_id, nodes as i64, edges as i64, vectors as i64],
        )?;
        Ok(())
    }

    pub fn push_job_file_error(&self, job_id: i64, message: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let current: Option<String> = tx
            .query_row(
                "SELECT file_errors FROM sync_jobs WHERE id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(EngineError::JobNotFound(job_id));
        };
        let mut errors: Vec<String> = serde_json::from_str(&current).unwrap_or_default();
        errors.push(message.to_string());
        tx.execute(
            "UPDATE sync_jobs SET file_errors = ?2 WHERE id = ?1",
            params![job_id, serde_json::to_string(&errors)?],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Move a job to a terminal state. The guard on the current status makes
    /// the transition happen at most once; a later attempt is a no-op.
    pub fn finish_job(&self, job_id: i64, status: JobStatus, error: Option<&str>) -> Result<bool> {
        debug_assert!(status.is_terminal());
        let conn = self.conn()?;
        let progress = if status == JobStatus::Completed { 100 } else { -1 };
        let changed = conn.execute(
            "UPDATE sync_jobs
             SET status = ?2,
                 error = ?3,
                 current_step = ?2,
                 progress = CASE WHEN ?4 >= 0 THEN ?4 ELSE progress END,
                 completed_at = CURRENT_TIMESTAMP
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![job_id, status.as_str(), error, progress],
        )?;
        Ok(changed > 0)
    }

    /// Flag a job for cancellation. The orchestrator observes the flag
    /// between files; a pending job is cancelled outright on claim.
    pub fn request_cancel(&self, job_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sync_jobs SET cancel_requested = 1
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![job_id],
        )?;
        Ok(changed > 0)
    }

    pub fn is_cancel_requested(&self, job_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let flag: Option<bool> = conn
            .query_row(
                "SELECT cancel_requested FROM sync_jobs WHERE id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::test_manager;

    fn setup() -> (tempfile::TempDir, GraphManager, i64) {
        let (dir, manager) = test_manager();
        let repo = manager.ensure_repo("acme/api", "/tmp/acme").unwrap();
        (dir, manager, repo.id)
    }

    #[test]
    fn second_enqueue_conflicts_while_active() {
        let (_dir, manager, repo) = setup();
        let job = manager.create_job(repo, JobType::Full, None).unwrap();

        // conflict while pending
        let err = manager.create_job(repo, JobType::Delta, None).unwrap_err();
        assert!(matches!(err, EngineError::JobConflict { job_id } if job_id == job.id));

        // still a conflict once running
        manager.claim_next_job().unwrap().unwrap();
        let err = manager.create_job(repo, JobType::Delta, None).unwrap_err();
        assert!(matches!(err, EngineError::JobConflict { .. }));

        // only one row exists
        assert_eq!(manager.list_recent_jobs(repo, 10).unwrap().len(), 1);

        // allowed again after the job finishes
        manager.finish_job(job.id, JobStatus::Completed, None).unwrap();
        manager.create_job(repo, JobType::Delta, None).unwrap();
    }

    #[test]
    fn concurrent_enqueues_yield_one_job() {
        let (_dir, manager, repo) = setup();
        let manager = std::sync::Arc::new(manager);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.create_job(repo, JobType::Full, None))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(EngineError::JobConflict { .. }))));
        assert_eq!(manager.list_recent_jobs(repo, 10).unwrap().len(), 1);
    }

    #[test]
    fn claim_moves_pending_to_running() {
        let (_dir, manager, repo) = setup();
        let job = manager.create_job(repo, JobType::Full, None).unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let claimed = manager.claim_next_job().unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.started_at.is_some());

        assert!(manager.claim_next_job().unwrap().is_none());
    }

    #[test]
    fn terminal_state_is_set_once() {
        let (_dir, manager, repo) = setup();
        let job = manager.create_job(repo, JobType::Full, None).unwrap();
        manager.claim_next_job().unwrap().unwrap();

        assert!(manager.finish_job(job.id, JobStatus::Completed, None).unwrap());
        // a later transition attempt is a no-op
        assert!(!manager.finish_job(job.id, JobStatus::Cancelled, None).unwrap());

        let job = manager.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn counters_accumulate_and_errors_append() {
        let (_dir, manager, repo) = setup();
        let job = manager.create_job(repo, JobType::Full, None).unwrap();
        manager.add_job_counters(job.id, 3, 2, 1).unwrap();
        manager.add_job_counters(job.id, 1, 0, 0).unwrap();
        manager.push_job_file_error(job.id, "app/bad.py: parse error").unwrap();

        let job = manager.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.nodes_created, 4);
        assert_eq!(job.edges_created, 2);
        assert_eq!(job.vectors_created, 1);
        assert_eq!(job.file_errors.len(), 1);
    }

    #[test]
    fn cancel_flag_round_trip() {
        let (_dir, manager, repo) = setup();
        let job = manager.create_job(repo, JobType::Full, None).unwrap();
        assert!(!manager.is_cancel_requested(job.id).unwrap());
        assert!(manager.request_cancel(job.id).unwrap());
        assert!(manager.is_cancel_requested(job.id).unwrap());

        manager.finish_job(job.id, JobStatus::Cancelled, None).unwrap();
        // terminal jobs cannot be re-flagged
        assert!(!manager.request_cancel(job.id).unwrap());
    }
}

// Worker loop: claims pending jobs and supervises their execution

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::source::SourceProvider;

use super::orchestrator::SyncOrchestrator;
use super::JobStatus;

/// Claims pending jobs and runs them off the async runtime, enforcing the
/// configured whole-job timeout. The orchestrator itself never times out a
/// job; force-failing is this supervisor's responsibility.
pub struct SyncWorker {
    orchestrator: Arc<SyncOrchestrator>,
    sources: DashMap<i64, Arc<dyn SourceProvider>>,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl SyncWorker {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, config: &SyncConfig) -> Self {
        Self {
            orchestrator,
            sources: DashMap::new(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            job_timeout: Duration::from_secs(config.job_timeout_secs),
        }
    }

    /// Make a repository's source tree available to jobs. A claimed job for
    /// an unregistered repository fails immediately.
    pub fn register_source(&self, repo_id: i64, source: Arc<dyn SourceProvider>) {
        self.sources.insert(repo_id, source);
    }

    /// Process jobs until the queue is empty. Used for one-shot CLI syncs.
    pub async fn run_until_idle(&self) -> Result<()> {
        while self.process_one().await? {}
        Ok(())
    }

    /// Poll the queue indefinitely.
    pub async fn run(&self) -> Result<()> {
        info!("sync worker started");
        loop {
            if !self.process_one().await? {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    /// Claim and run at most one job. Returns false when the queue is empty.
    async fn process_one(&self) -> Result<bool> {
        let graph = self.orchestrator.graph();
        let Some(job) = graph.claim_next_job()? else {
            return Ok(false);
        };

        let Some(source) = self.sources.get(&job.repo_id).map(|s| s.clone()) else {
            warn!("job {}: no source registered for repo {}", job.id, job.repo_id);
            graph.finish_job(job.id, JobStatus::Failed, Some("no source registered"))?;
            return Ok(true);
        };

        let orchestrator = self.orchestrator.clone();
        let claimed = job.clone();
        let handle =
            tokio::task::spawn_blocking(move || orchestrator.run_job(&claimed, source.as_ref()));

        match tokio::time::timeout(self.job_timeout, handle).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                error!("job {} worker panicked: {}", job.id, join_error);
                graph.finish_job(job.id, JobStatus::Failed, Some("worker panicked"))?;
            }
            Err(_) => {
                // The blocking task may still be finishing a file; the
                // terminal-once guard makes its own later transition a no-op.
                warn!("job {} exceeded the job timeout, force-failing", job.id);
                graph.finish_job(job.id, JobStatus::Failed, Some("job timeout exceeded"))?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::GraphManager;
    use crate::parser::ParserFacade;
    use crate::source::{FixtureSource, SourceDiff};
    use crate::sync::JobType;

    fn worker(config: Config) -> (tempfile::TempDir, Arc<SyncOrchestrator>, SyncWorker) {
        let dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(GraphManager::open(&dir.path().join("graph.db")).unwrap());
        let parser = Arc::new(ParserFacade::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(graph, parser, config.clone()));
        let worker = SyncWorker::new(orchestrator.clone(), &config.sync);
        (dir, orchestrator, worker)
    }

    #[tokio::test]
    async fn worker_drains_the_queue() {
        let (_dir, orchestrator, worker) = worker(Config::default());
        let job = orchestrator
            .enqueue_sync("acme/api", "/tmp/acme", JobType::Full, None)
            .unwrap();
        let source = FixtureSource::single(&[("app/main.py", "def main():\n    pass\n")]);
        worker.register_source(job.repo_id, Arc::new(source));

        worker.run_until_idle().await.unwrap();

        let job = orchestrator.graph().get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn unregistered_repo_fails_the_job() {
        let (_dir, orchestrator, worker) = worker(Config::default());
        let job = orchestrator
            .enqueue_sync("acme/api", "/tmp/acme", JobType::Full, None)
            .unwrap();

        worker.run_until_idle().await.unwrap();

        let job = orchestrator.graph().get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    /// Source whose enumeration outlasts any short job timeout.
    struct SlowSource;

    impl crate::source::SourceProvider for SlowSource {
        fn head_ref(&self) -> crate::error::Result<String> {
            std::thread::sleep(Duration::from_millis(250));
            Ok("r1".to_string())
        }
        fn list_files(&self, _r: &str) -> crate::error::Result<Vec<String>> {
            Ok(vec![])
        }
        fn read_file(&self, _r: &str, _p: &str) -> crate::error::Result<Vec<u8>> {
            Ok(vec![])
        }
        fn diff(&self, _f: &str, _t: &str) -> crate::error::Result<SourceDiff> {
            Ok(SourceDiff::default())
        }
    }

    #[tokio::test]
    async fn supervisor_force_fails_on_timeout() {
        let mut config = Config::default();
        config.sync.job_timeout_secs = 0;
        let (_dir, orchestrator, worker) = worker(config);
        let job = orchestrator
            .enqueue_sync("acme/api", "/tmp/acme", JobType::Full, None)
            .unwrap();
        worker.register_source(job.repo_id, Arc::new(SlowSource));

        worker.run_until_idle().await.unwrap();

        let job = orchestrator.graph().get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("job timeout exceeded"));
    }
}

// Sync orchestration: file-set computation and the per-file pipeline

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chunk::chunk_file;
use crate::config::Config;
use crate::embed::{EmbeddingService, VectorPayload, VectorStore};
use crate::error::{EngineError, Result};
use crate::graph::GraphManager;
use crate::parser::ParserFacade;
use crate::source::SourceProvider;

use super::{JobStatus, JobType, SyncJob};

/// Upserts and deletes one job has to apply.
#[derive(Debug, Default)]
struct FileSet {
    upserts: Vec<String>,
    deletes: Vec<String>,
}

/// Drives one sync job: enumerates target files, runs the per-file
/// parse -> chunk -> graph -> embed pipeline, maintains job progress and
/// counters, and settles the job in a terminal state. Embedding and vector
/// collaborators are optional; without them vector indexing is skipped.
pub struct SyncOrchestrator {
    graph: Arc<GraphManager>,
    parser: Arc<ParserFacade>,
    config: Config,
    embedder: Option<Arc<dyn EmbeddingService>>,
    vectors: Option<Arc<dyn VectorStore>>,
}

impl SyncOrchestrator {
    pub fn new(graph: Arc<GraphManager>, parser: Arc<ParserFacade>, config: Config) -> Self {
        Self {
            graph,
            parser,
            config,
            embedder: None,
            vectors: None,
        }
    }

    pub fn with_embedding(
        mut self,
        embedder: Arc<dyn EmbeddingService>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        self.embedder = Some(embedder);
        self.vectors = Some(vectors);
        self
    }

    pub fn graph(&self) -> &GraphManager {
        &self.graph
    }

    /// Enqueue a sync job for a repository, registering the repository on
    /// first contact. Conflicts when a job is already active.
    pub fn enqueue_sync(
        &self,
        repo_name: &str,
        root: &str,
        job_type: JobType,
        target_ref: Option<&str>,
    ) -> Result<SyncJob> {
        let repo = self.graph.ensure_repo(repo_name, root)?;
        self.graph.create_job(repo.id, job_type, target_ref)
    }

    /// Run one claimed job to a terminal state. Blocking; the worker calls
    /// this off the async runtime. File-level failures are recorded on the
    /// job and never abort it; any error that escapes the per-file handling
    /// fails the job rather than leaving the row in `running`.
    pub fn run_job(&self, job: &SyncJob, source: &dyn SourceProvider) -> Result<()> {
        if let Err(e) = self.execute(job, source) {
            warn!("job {} aborted: {}", job.id, e);
            self.graph
                .finish_job(job.id, JobStatus::Failed, Some(&e.to_string()))?;
        }
        Ok(())
    }

    fn execute(&self, job: &SyncJob, source: &dyn SourceProvider) -> Result<()> {
        if self.graph.is_cancel_requested(job.id)? {
            self.graph.finish_job(job.id, JobStatus::Cancelled, None)?;
            return Ok(());
        }

        let target_ref = match &job.target_ref {
            Some(r) => r.clone(),
            None => match source.head_ref() {
                Ok(r) => r,
                Err(e) => {
                    self.graph
                        .finish_job(job.id, JobStatus::Failed, Some(&e.to_string()))?;
                    return Ok(());
                }
            },
        };

        let files = match self.compute_file_set(job, source, &target_ref) {
            Ok(files) => files,
            Err(e) => {
                // Total inability to enumerate the repository is the one
                // fatal condition.
                self.graph
                    .finish_job(job.id, JobStatus::Failed, Some(&e.to_string()))?;
                return Ok(());
            }
        };
        let total = files.upserts.len() as u32;
        info!(
            "job {}: {} files to sync, {} to delete (ref {})",
            job.id, total, files.deletes.len(), target_ref
        );
        self.graph.update_job_progress(job.id, 0, "syncing", 0, total)?;

        let mut done = 0u32;
        for path in &files.upserts {
            if self.graph.is_cancel_requested(job.id)? {
                info!("job {} cancelled after {} files", job.id, done);
                self.graph.finish_job(job.id, JobStatus::Cancelled, None)?;
                return Ok(());
            }
            if let Err(e) = self.process_file(job, source, &target_ref, path) {
                warn!("job {}: {} failed: {}", job.id, path, e);
                self.graph
                    .push_job_file_error(job.id, &format!("{}: {}", path, e))?;
            }
            done += 1;
            let progress = ((done as u64 * 100) / total.max(1) as u64) as u8;
            self.graph
                .update_job_progress(job.id, progress, path, done, total)?;
        }

        for path in &files.deletes {
            let repo_id = job.repo_id;
            let removed = self.with_retries("remove file", || self.graph.remove_file(repo_id, path));
            if let Err(e) = removed {
                warn!("job {}: removing {} failed: {}", job.id, path, e);
                self.graph
                    .push_job_file_error(job.id, &format!("{}: {}", path, e))?;
            }
        }

        // Callees defined later in the job become resolvable only now.
        self.graph
            .update_job_progress(job.id, 99, "linking calls", done, total)?;
        let linked = self.with_retries("relink", || self.graph.relink(job.repo_id))?;
        self.graph.add_job_counters(job.id, 0, linked, 0)?;

        // Ad hoc incremental refreshes never move the watermark.
        if matches!(job.job_type, JobType::Full | JobType::Delta) {
            self.graph.set_watermark(job.repo_id, &target_ref)?;
        }

        self.graph.finish_job(job.id, JobStatus::Completed, None)?;
        info!("job {} completed", job.id);
        Ok(())
    }

    fn compute_file_set(
        &self,
        job: &SyncJob,
        source: &dyn SourceProvider,
        target_ref: &str,
    ) -> Result<FileSet> {
        let trackable = |paths: Vec<String>| -> Vec<String> {
            paths
                .into_iter()
                .filter(|p| self.config.should_index_file(p))
                .collect()
        };

        match job.job_type {
            JobType::Full | JobType::Incremental => Ok(FileSet {
                upserts: trackable(source.list_files(target_ref)?),
                deletes: Vec::new(),
            }),
            JobType::Delta => {
                let Some(watermark) = self.graph.watermark(job.repo_id)? else {
                    // Nothing synced yet; a delta from nothing is a full sync.
                    debug!("job {}: no watermark, delta widens to full", job.id);
                    return Ok(FileSet {
                        upserts: trackable(source.list_files(target_ref)?),
                        deletes: Vec::new(),
                    });
                };
                let diff = source.diff(&watermark, target_ref)?;
                let mut upserts = trackable(diff.added);
                upserts.extend(trackable(diff.modified));
                Ok(FileSet {
                    upserts,
                    deletes: trackable(diff.deleted),
                })
            }
        }
    }

    /// One file through the pipeline. Returned errors are file-level.
    fn process_file(
        &self,
        job: &SyncJob,
        source: &dyn SourceProvider,
        target_ref: &str,
        path: &str,
    ) -> Result<()> {
        let bytes = source.read_file(target_ref, path)?;
        let content = String::from_utf8_lossy(&bytes);
        let content_hash = blake3::hash(&bytes).to_hex().to_string();

        // Unchanged content re-listed by the diff needs no work.
        if self.graph.file_hash(job.repo_id, path)?.as_deref() == Some(content_hash.as_str()) {
            debug!("job {}: {} unchanged, skipped", job.id, path);
            return Ok(());
        }

        let parse = self.parser.parse(path, &content);
        for error in &parse.errors {
            self.graph
                .push_job_file_error(job.id, &format!("{}: {}", path, error))?;
        }

        let outcome = self
            .with_retries("apply file", || {
                self.graph.apply_file(job.repo_id, &parse, &content_hash)
            })
            .map_err(|e| EngineError::GraphWrite(format!("{}: {}", path, e)))?;
        self.graph
            .add_job_counters(job.id, outcome.nodes_created, outcome.edges_created, 0)?;

        let (Some(embedder), Some(vectors)) = (&self.embedder, &self.vectors) else {
            return Ok(());
        };
        let mut vectors_created = 0u64;
        for chunk in chunk_file(&parse, &content) {
            let embedding = match self.with_retries("embed", || embedder.embed(&chunk.text)) {
                Ok(embedding) => embedding,
                Err(e) => {
                    // Vector indexing for this chunk is skipped, the file
                    // itself stays synced.
                    self.graph
                        .push_job_file_error(job.id, &format!("{}: {}", path, e))?;
                    continue;
                }
            };
            let payload = VectorPayload {
                repo_id: job.repo_id,
                chunk_id: chunk.id.clone(),
                file: chunk.file.clone(),
                qualified_name: chunk.qualified_name.clone(),
                kind: chunk.kind,
                start_line: chunk.start_line,
                end_line: chunk.end_line,
            };
            match self.with_retries("vector upsert", || {
                vectors.upsert(&payload, &embedding.vector, &embedding.model_id)
            }) {
                Ok(()) => vectors_created += 1,
                Err(e) => {
                    self.graph
                        .push_job_file_error(job.id, &format!("{}: {}", path, e))?;
                }
            }
        }
        self.graph.add_job_counters(job.id, 0, 0, vectors_created)?;
        Ok(())
    }

    fn with_retries<T>(&self, what: &str, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.sync.max_retries => {
                    attempt += 1;
                    warn!("{} failed (attempt {}): {}", what, attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::embed::fakes::{FailingEmbedder, RecordingVectorStore, StubEmbedder};
    use crate::source::FixtureSource;
    use crate::sync::JobStatus;

    fn orchestrator() -> (tempfile::TempDir, SyncOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(GraphManager::open(&dir.path().join("graph.db")).unwrap());
        let parser = Arc::new(ParserFacade::new());
        (dir, SyncOrchestrator::new(graph, parser, Config::default()))
    }

    fn run(orchestrator: &SyncOrchestrator, source: &FixtureSource, job_type: JobType) -> SyncJob {
        orchestrator
            .enqueue_sync("acme/api", "/tmp/acme", job_type, None)
            .unwrap();
        let job = orchestrator.graph().claim_next_job().unwrap().unwrap();
        orchestrator.run_job(&job, source).unwrap();
        orchestrator.graph().get_job(job.id).unwrap().unwrap()
    }

    const MAIN_PY: &str = "def main():\n    helper()\n\ndef helper():\n    pass\n";
    const UTIL_PY: &str = "def fetch():\n    return 1\n";

    #[test]
    fn full_sync_completes_and_advances_watermark() {
        let (_dir, orchestrator) = orchestrator();
        let source = FixtureSource::single(&[
            ("app/main.py", MAIN_PY),
            ("app/util.py", UTIL_PY),
            ("README.md", "# not source\n"),
        ]);

        let job = run(&orchestrator, &source, JobType::Full);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.files_total, 2); // README filtered out
        // 2 file nodes + 3 symbols
        assert_eq!(job.nodes_created, 5);
        assert!(job.edges_created >= 1);

        let repo = orchestrator.graph().get_repo("acme/api").unwrap().unwrap();
        assert_eq!(repo.last_synced_ref.as_deref(), Some("r1"));
    }

    #[test]
    fn delta_sync_touches_only_changed_files() {
        let (_dir, orchestrator) = orchestrator();
        let mut source = FixtureSource::single(&[
            ("app/main.py", MAIN_PY),
            ("app/util.py", UTIL_PY),
        ]);
        let first = run(&orchestrator, &source, JobType::Full);
        assert_eq!(first.status, JobStatus::Completed);

        // one modified file, one untouched, one deleted, one added
        let mut r2 = source.refs["r1"].clone();
        r2.insert("app/main.py".into(), "def main():\n    pass\n".into());
        r2.insert("app/extra.py".into(), "def extra():\n    pass\n".into());
        r2.remove("app/util.py");
        source.refs.insert("r2".into(), r2);
        source.head = "r2".into();

        let second = run(&orchestrator, &source, JobType::Delta);
        assert_eq!(second.status, JobStatus::Completed);
        assert_eq!(second.files_total, 2); // main.py modified, extra.py added
        // only extra.py contributes new nodes: its file node + one symbol
        assert_eq!(second.nodes_created, 2);

        let repo = orchestrator.graph().get_repo("acme/api").unwrap().unwrap();
        assert_eq!(repo.last_synced_ref.as_deref(), Some("r2"));
        // deleted file is gone from the graph
        assert!(orchestrator
            .graph()
            .get_file_node(repo.id, "app/util.py")
            .unwrap()
            .is_none());
        // helper was dropped from main.py
        let symbols = orchestrator.graph().get_file_symbols(repo.id, "app/main.py").unwrap();
        assert_eq!(symbols.len(), 1);
    }

    #[test]
    fn incremental_sync_leaves_watermark_alone() {
        let (_dir, orchestrator) = orchestrator();
        let source = FixtureSource::single(&[("app/main.py", MAIN_PY)]);

        let job = run(&orchestrator, &source, JobType::Incremental);
        assert_eq!(job.status, JobStatus::Completed);
        let repo = orchestrator.graph().get_repo("acme/api").unwrap().unwrap();
        assert!(repo.last_synced_ref.is_none());
    }

    #[test]
    fn cancellation_before_work_leaves_job_cancelled() {
        let (_dir, orchestrator) = orchestrator();
        let source = FixtureSource::single(&[("app/main.py", MAIN_PY)]);
        orchestrator
            .enqueue_sync("acme/api", "/tmp/acme", JobType::Full, None)
            .unwrap();
        let job = orchestrator.graph().claim_next_job().unwrap().unwrap();
        orchestrator.graph().request_cancel(job.id).unwrap();

        orchestrator.run_job(&job, &source).unwrap();
        let job = orchestrator.graph().get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.nodes_created, 0);
    }

    #[test]
    fn vectors_flow_through_configured_collaborators() {
        let (_dir, orchestrator) = orchestrator();
        let store = Arc::new(RecordingVectorStore::default());
        let orchestrator = orchestrator.with_embedding(Arc::new(StubEmbedder), store.clone());
        let source = FixtureSource::single(&[("app/main.py", MAIN_PY)]);

        let job = run(&orchestrator, &source, JobType::Full);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.vectors_created, 2); // main + helper
        assert_eq!(store.upserts.lock().len(), 2);
    }

    #[test]
    fn transient_vector_failures_are_retried() {
        let (_dir, orchestrator) = orchestrator();
        let store = Arc::new(RecordingVectorStore::default());
        store
            .failures_remaining
            .store(2, std::sync::atomic::Ordering::SeqCst);
        let orchestrator = orchestrator.with_embedding(Arc::new(StubEmbedder), store.clone());
        let source = FixtureSource::single(&[("app/main.py", MAIN_PY)]);

        let job = run(&orchestrator, &source, JobType::Full);
        assert_eq!(job.status, JobStatus::Completed);
        // two failures are absorbed by retries
        assert_eq!(job.vectors_created, 2);
        assert!(job.file_errors.is_empty());
    }

    #[test]
    fn embedding_failure_degrades_to_file_errors() {
        let (_dir, orchestrator) = orchestrator();
        let store = Arc::new(RecordingVectorStore::default());
        let orchestrator = orchestrator.with_embedding(Arc::new(FailingEmbedder), store);
        let source = FixtureSource::single(&[("app/main.py", MAIN_PY)]);

        let job = run(&orchestrator, &source, JobType::Full);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.vectors_created, 0);
        assert!(!job.file_errors.is_empty());
        // graph writes were unaffected
        assert_eq!(job.nodes_created, 3);
    }

    #[test]
    fn write_failure_after_enumeration_still_settles_the_job() {
        let (_dir, orchestrator) = orchestrator();
        let source = FixtureSource::single(&[("app/main.py", MAIN_PY)]);
        orchestrator
            .enqueue_sync("acme/api", "/tmp/acme", JobType::Full, None)
            .unwrap();
        let job = orchestrator.graph().claim_next_job().unwrap().unwrap();
        // Every edge write from here on fails, including the relink pass.
        orchestrator
            .graph()
            .conn()
            .unwrap()
            .execute("DROP TABLE edges", [])
            .unwrap();

        orchestrator.run_job(&job, &source).unwrap();

        let job = orchestrator.graph().get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
        // the repository is not blocked by a stranded running job
        orchestrator
            .enqueue_sync("acme/api", "/tmp/acme", JobType::Full, None)
            .unwrap();
    }

    #[test]
    fn unreadable_source_fails_the_job() {
        let (_dir, orchestrator) = orchestrator();
        let mut source = FixtureSource::single(&[("app/main.py", MAIN_PY)]);
        source.head = "missing".into();

        orchestrator
            .enqueue_sync("acme/api", "/tmp/acme", JobType::Full, None)
            .unwrap();
        let job = orchestrator.graph().claim_next_job().unwrap().unwrap();
        orchestrator.run_job(&job, &source).unwrap();

        let job = orchestrator.graph().get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
    }
}

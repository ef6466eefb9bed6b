// Engine error taxonomy

/// Unified error type for the graph engine.
///
/// Per-file parse failures are not represented here: they are collected as
/// strings on `ParseResult` and on the job's error log, and never abort a
/// multi-file sync.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("repository already has an active sync job (id {job_id})")]
    JobConflict { job_id: i64 },

    #[error("sync job not found: {0}")]
    JobNotFound(i64),

    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("graph write failed: {0}")]
    GraphWrite(String),

    #[error("source provider error: {0}")]
    Source(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("query rejected: {0}")]
    QueryRejected(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

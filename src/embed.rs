// Embedding and vector-store collaborator boundaries

use serde::Serialize;

use crate::error::Result;
use crate::parser::model::SymbolKind;

/// One embedded chunk: the vector plus the model that produced it.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model_id: String,
}

/// Optional collaborator. When no embedder is configured the orchestrator
/// skips vector indexing entirely; when a call fails, only that chunk's
/// vector is skipped.
pub trait EmbeddingService: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Metadata stored alongside each vector so search hits can be traced back
/// to a symbol.
#[derive(Debug, Clone, Serialize)]
pub struct VectorPayload {
    pub repo_id: i64,
    pub chunk_id: String,
    pub file: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
}

pub trait VectorStore: Send + Sync {
    fn upsert(&self, payload: &VectorPayload, vector: &[f32], model_id: &str) -> Result<()>;
}

#[cfg(test)]
pub mod fakes {
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::error::EngineError;

    /// Deterministic embedder: a fixed-size vector derived from text length.
    pub struct StubEmbedder;

    impl EmbeddingService for StubEmbedder {
        fn embed(&self, text: &str) -> Result<Embedding> {
            Ok(Embedding {
                vector: vec![text.len() as f32; 4],
                model_id: "stub-v1".to_string(),
            })
        }
    }

    /// Fails every call, for exercising the degrade path.
    pub struct FailingEmbedder;

    impl EmbeddingService for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Embedding> {
            Err(EngineError::Embedding("stub failure".to_string()))
        }
    }

    #[derive(Default)]
    pub struct RecordingVectorStore {
        pub upserts: Mutex<Vec<VectorPayload>>,
        pub failures_remaining: AtomicU32,
    }

    impl VectorStore for RecordingVectorStore {
        fn upsert(&self, payload: &VectorPayload, _vector: &[f32], _model_id: &str) -> Result<()> {
            if self.failures_remaining.load(Ordering::SeqCst) > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(EngineError::VectorStore("stub failure".to_string()));
            }
            self.upserts.lock().push(payload.clone());
            Ok(())
        }
    }
}

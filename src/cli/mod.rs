// CLI subcommands

pub mod analyze;
pub mod jobs;
pub mod query;
pub mod stats;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::graph::{GraphManager, RepoRecord};

pub const STATE_DIR: &str = ".repograph";
pub const DB_FILE: &str = "graph.db";

/// Everything a subcommand needs: config, the graph database, and the
/// project's repository name.
pub(crate) struct ProjectContext {
    pub project_dir: PathBuf,
    pub config: Config,
    pub graph: Arc<GraphManager>,
    pub repo_name: String,
}

impl ProjectContext {
    pub fn open(project: &str) -> Result<Self> {
        let project_dir = PathBuf::from(project);
        let config = Config::from_project_dir(&project_dir);
        let state_dir = project_dir.join(STATE_DIR);
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("cannot create {}", state_dir.display()))?;
        let graph = Arc::new(GraphManager::open(&state_dir.join(DB_FILE))?);
        let repo_name = resolve_repo_name(&project_dir, &config);
        Ok(Self {
            project_dir,
            config,
            graph,
            repo_name,
        })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project_dir.join(STATE_DIR)
    }

    /// The project's repository record. Read commands need a prior sync.
    pub fn repo(&self) -> Result<RepoRecord> {
        self.graph
            .get_repo(&self.repo_name)?
            .with_context(|| format!("repository '{}' has not been synced yet", self.repo_name))
    }
}

fn resolve_repo_name(project_dir: &Path, config: &Config) -> String {
    if config.project.name != "unnamed-project" {
        return config.project.name.clone();
    }
    project_dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| config.project.name.clone())
}

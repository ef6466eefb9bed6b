// Source tree collaborator boundary

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{EngineError, Result};

/// File-set difference between two refs.
#[derive(Debug, Clone, Default)]
pub struct SourceDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

/// Read-only view of a repository's files at a ref. The engine only ever
/// consumes this interface; what a "ref" is belongs to the provider.
pub trait SourceProvider: Send + Sync {
    /// Ref identifying the current state of the source tree.
    fn head_ref(&self) -> Result<String>;
    fn list_files(&self, r#ref: &str) -> Result<Vec<String>>;
    fn read_file(&self, r#ref: &str, path: &str) -> Result<Vec<u8>>;
    fn diff(&self, from_ref: &str, to_ref: &str) -> Result<SourceDiff>;
}

/// path -> blake3 content hash, sorted for a stable snapshot id.
type Manifest = BTreeMap<String, String>;

/// Directory-backed provider. A ref is a content-derived snapshot id; the
/// manifest behind each ref is persisted under the state directory so later
/// syncs can diff against it. A directory carries no history, so
/// `read_file` always serves the working tree.
pub struct WorkspaceSource {
    root: PathBuf,
    state_dir: PathBuf,
    cache: Mutex<BTreeMap<String, Manifest>>,
}

impl WorkspaceSource {
    pub fn new(root: &Path, state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir)?;
        Ok(Self {
            root: root.to_path_buf(),
            state_dir: state_dir.to_path_buf(),
            cache: Mutex::new(BTreeMap::new()),
        })
    }

    fn snapshot(&self) -> Result<(String, Manifest)> {
        let mut manifest = Manifest::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry.map_err(|e| EngineError::Source(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.starts_with(&self.state_dir) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let content = fs::read(path)?;
            let hash = blake3::hash(&content).to_hex().to_string();
            manifest.insert(normalize(relative), hash);
        }

        let mut hasher = blake3::Hasher::new();
        for (path, hash) in &manifest {
            hasher.update(path.as_bytes());
            hasher.update(b"\0");
            hasher.update(hash.as_bytes());
            hasher.update(b"\n");
        }
        // Truncated for readability; collisions at this length are not a concern.
        let snapshot_ref = hasher.finalize().to_hex()[..16].to_string();
        Ok((snapshot_ref, manifest))
    }

    fn manifest_path(&self, r#ref: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", r#ref))
    }

    fn persist_manifest(&self, r#ref: &str, manifest: &Manifest) -> Result<()> {
        let path = self.manifest_path(r#ref);
        if !path.exists() {
            fs::write(&path, serde_json::to_vec_pretty(manifest)?)?;
            debug!("persisted manifest for ref {}", r#ref);
        }
        self.cache.lock().insert(r#ref.to_string(), manifest.clone());
        Ok(())
    }

    fn load_manifest(&self, r#ref: &str) -> Result<Option<Manifest>> {
        if let Some(manifest) = self.cache.lock().get(r#ref) {
            return Ok(Some(manifest.clone()));
        }
        let path = self.manifest_path(r#ref);
        if !path.exists() {
            return Ok(None);
        }
        let manifest: Manifest = serde_json::from_slice(&fs::read(&path)?)?;
        self.cache.lock().insert(r#ref.to_string(), manifest.clone());
        Ok(Some(manifest))
    }

    fn manifest_for(&self, r#ref: &str) -> Result<Manifest> {
        if let Some(manifest) = self.load_manifest(r#ref)? {
            return Ok(manifest);
        }
        // The ref may simply be the current tree, not yet persisted.
        let (head, manifest) = self.snapshot()?;
        if head == r#ref {
            self.persist_manifest(&head, &manifest)?;
            return Ok(manifest);
        }
        Err(EngineError::Source(format!("unknown ref: {}", r#ref)))
    }
}

impl SourceProvider for WorkspaceSource {
    fn head_ref(&self) -> Result<String> {
        let (snapshot_ref, manifest) = self.snapshot()?;
        self.persist_manifest(&snapshot_ref, &manifest)?;
        Ok(snapshot_ref)
    }

    fn list_files(&self, r#ref: &str) -> Result<Vec<String>> {
        Ok(self.manifest_for(r#ref)?.into_keys().collect())
    }

    fn read_file(&self, _ref: &str, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.root.join(path))?)
    }

    fn diff(&self, from_ref: &str, to_ref: &str) -> Result<SourceDiff> {
        let to = self.manifest_for(to_ref)?;
        let Some(from) = self.load_manifest(from_ref)? else {
            // No baseline to compare against: treat everything as modified.
            warn!("manifest for ref {} unknown, degrading to full diff", from_ref);
            return Ok(SourceDiff {
                modified: to.into_keys().collect(),
                ..Default::default()
            });
        };
        Ok(diff_manifests(&from, &to))
    }
}

fn diff_manifests(from: &Manifest, to: &Manifest) -> SourceDiff {
    let mut diff = SourceDiff::default();
    for (path, hash) in to {
        match from.get(path) {
            None => diff.added.push(path.clone()),
            Some(old) if old != hash => diff.modified.push(path.clone()),
            Some(_) => {}
        }
    }
    for path in from.keys() {
        if !to.contains_key(path) {
            diff.deleted.push(path.clone());
        }
    }
    diff
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

fn normalize(path: &Path) -> String {
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// In-memory provider with explicit named refs, for exercising sync modes
/// without a working tree.
#[cfg(test)]
pub struct FixtureSource {
    pub head: String,
    pub refs: BTreeMap<String, BTreeMap<String, String>>,
}

#[cfg(test)]
impl FixtureSource {
    pub fn single(files: &[(&str, &str)]) -> Self {
        let mut tree = BTreeMap::new();
        for (path, content) in files {
            tree.insert(path.to_string(), content.to_string());
        }
        let mut refs = BTreeMap::new();
        refs.insert("r1".to_string(), tree);
        Self { head: "r1".to_string(), refs }
    }

    fn tree(&self, r#ref: &str) -> Result<&BTreeMap<String, String>> {
        self.refs
            .get(r#ref)
            .ok_or_else(|| EngineError::Source(format!("unknown ref: {}", r#ref)))
    }
}

#[cfg(test)]
impl SourceProvider for FixtureSource {
    fn head_ref(&self) -> Result<String> {
        Ok(self.head.clone())
    }

    fn list_files(&self, r#ref: &str) -> Result<Vec<String>> {
        Ok(self.tree(r#ref)?.keys().cloned().collect())
    }

    fn read_file(&self, r#ref: &str, path: &str) -> Result<Vec<u8>> {
        self.tree(r#ref)?
            .get(path)
            .map(|c| c.as_bytes().to_vec())
            .ok_or_else(|| EngineError::Source(format!("no such file: {}", path)))
    }

    fn diff(&self, from_ref: &str, to_ref: &str) -> Result<SourceDiff> {
        let hash_tree = |tree: &BTreeMap<String, String>| {
            tree.iter()
                .map(|(p, c)| (p.clone(), blake3::hash(c.as_bytes()).to_hex().to_string()))
                .collect::<Manifest>()
        };
        let from = hash_tree(self.tree(from_ref)?);
        let to = hash_tree(self.tree(to_ref)?);
        Ok(diff_manifests(&from, &to))
    }
}

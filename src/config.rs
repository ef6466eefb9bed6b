// Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::parser::Language;

pub const CONFIG_FILE: &str = ".repograph.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub languages: LanguagesConfig,
    pub indexing: IndexingConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguagesConfig {
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub exclude: Vec<String>,
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bounded retries for graph writes and collaborator calls.
    pub max_retries: u32,
    /// Whole-job timeout enforced by the worker supervisor, seconds.
    pub job_timeout_secs: u64,
    /// Worker poll interval when the queue is empty, milliseconds.
    pub poll_interval_ms: u64,
    pub max_path_depth: u32,
    pub hotspot_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            languages: LanguagesConfig::default(),
            indexing: IndexingConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
            root: ".".to_string(),
        }
    }
}

impl Default for LanguagesConfig {
    fn default() -> Self {
        Self {
            enabled: Language::ALL.iter().map(|l| l.as_str().to_string()).collect(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude: vec![
                "target/".to_string(),
                "node_modules/".to_string(),
                "vendor/".to_string(),
                ".git/".to_string(),
                ".repograph".to_string(),
            ],
            include: vec![],
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            job_timeout_secs: 3600,
            poll_interval_ms: 500,
            max_path_depth: 10,
            hotspot_threshold: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory, falling back to defaults
    /// when `.repograph.toml` is absent or unreadable.
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(CONFIG_FILE);

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::debug!("no config at {}: {}", config_path.display(), e);
                Self::default()
            }
        }
    }

    /// Whether a file is a trackable source file: matches the include/exclude
    /// patterns and carries an enabled language's extension.
    pub fn should_index_file(&self, file_path: &str) -> bool {
        for pattern in &self.indexing.exclude {
            if matches_pattern(file_path, pattern) {
                return false;
            }
        }

        if !self.indexing.include.is_empty()
            && !self.indexing.include.iter().any(|p| matches_pattern(file_path, p))
        {
            return false;
        }

        match Language::from_path(file_path) {
            Some(language) => self.languages.enabled.iter().any(|l| l == language.as_str()),
            None => false,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.name.is_empty() {
            anyhow::bail!("project name cannot be empty");
        }

        for lang in &self.languages.enabled {
            if Language::parse(lang).is_none() {
                anyhow::bail!("unsupported language: {}", lang);
            }
        }

        if self.sync.job_timeout_secs == 0 {
            anyhow::bail!("job timeout must be greater than 0");
        }
        if self.sync.max_path_depth == 0 {
            anyhow::bail!("max path depth must be greater than 0");
        }
        if self.sync.hotspot_threshold == 0 {
            anyhow::bail!("hotspot threshold must be greater than 0");
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("invalid log level: {}", self.logging.level);
        }
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("invalid log format: {}", self.logging.format);
        }

        Ok(())
    }
}

/// Simple glob-ish matching: trailing `/` marks a directory pattern, `*.`
/// a suffix pattern; anything else matches as a substring.
fn matches_pattern(file_path: &str, pattern: &str) -> bool {
    if let Some(dir) = pattern.strip_suffix('/') {
        file_path.starts_with(pattern) || file_path.contains(&format!("/{}/", dir))
    } else if let Some(suffix) = pattern.strip_prefix("*.") {
        file_path.ends_with(&format!(".{}", suffix))
    } else {
        file_path.contains(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.name, "unnamed-project");
        assert!(config.languages.enabled.contains(&"python".to_string()));
        assert!(config.indexing.exclude.contains(&"target/".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_should_index_file() {
        let config = Config::default();

        assert!(config.should_index_file("src/main.rs"));
        assert!(config.should_index_file("lib/utils.py"));

        // wrong extension
        assert!(!config.should_index_file("README.md"));
        // excluded directories
        assert!(!config.should_index_file("target/debug/build.rs"));
        assert!(!config.should_index_file("api/node_modules/mod.py"));
    }

    #[test]
    fn test_include_patterns_narrow_the_set() {
        let mut config = Config::default();
        config.indexing.include = vec!["src/".to_string()];
        assert!(config.should_index_file("src/main.rs"));
        assert!(!config.should_index_file("scripts/run.py"));
    }

    #[test]
    fn test_disabled_language_is_skipped() {
        let mut config = Config::default();
        config.languages.enabled = vec!["python".to_string()];
        assert!(config.should_index_file("lib/utils.py"));
        assert!(!config.should_index_file("src/main.rs"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.project.name = "".to_string();
        assert!(config.validate().is_err());
        config.project.name = "test".to_string();

        config.languages.enabled = vec!["cobol".to_string()];
        assert!(config.validate().is_err());
        config.languages.enabled = vec!["python".to_string()];

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "info".to_string();

        config.sync.max_path_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            "[project]\nname = \"acme\"\n\n[sync]\nmax_retries = 5\n",
        )
        .unwrap();
        assert_eq!(config.project.name, "acme");
        assert_eq!(config.sync.max_retries, 5);
        // untouched sections keep defaults
        assert_eq!(config.sync.hotspot_threshold, 10);
        assert_eq!(config.logging.level, "info");
    }
}

// Language detection and parse dispatch

pub mod model;

mod common;
mod go;
mod java;
mod python;
mod rust;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tree_sitter::Tree;

use model::{ExportInfo, ImportInfo, InheritInfo, ParseResult, Symbol};

/// Supported input languages. Dispatch is by this enum, never by runtime
/// type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Rust,
    Go,
    Java,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::Python, Language::Rust, Language::Go, Language::Java];

    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?;
        match ext {
            "py" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "python" => Some(Language::Python),
            "rust" => Some(Language::Rust),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            _ => None,
        }
    }
}

/// Raw adapter output before facade post-processing.
#[derive(Default)]
pub(crate) struct Extraction {
    pub symbols: Vec<Symbol>,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    pub inherits: Vec<InheritInfo>,
}

/// One adapter per language, all implementing the same five extraction
/// rules over their grammar's node kinds.
pub(crate) trait LanguageAdapter: Send + Sync {
    fn grammar(&self) -> tree_sitter::Language;
    fn extract(&self, tree: &Tree, content: &str, path: &str) -> Extraction;
}

/// Which adapters loaded. Partial availability is valid: a facade with some
/// grammars missing still serves the rest.
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub available: Vec<Language>,
    pub failed: Vec<(Language, String)>,
}

impl InitReport {
    pub fn is_available(&self, language: Language) -> bool {
        self.available.contains(&language)
    }
}

/// Dispatches files to language adapters and normalizes their output into
/// `ParseResult`. Owns no persistent state; construct once and pass by
/// reference.
pub struct ParserFacade {
    python: python::PythonAdapter,
    rust: rust::RustAdapter,
    go: go::GoAdapter,
    java: java::JavaAdapter,
    init: OnceLock<InitReport>,
}

impl Default for ParserFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserFacade {
    pub fn new() -> Self {
        Self {
            python: python::PythonAdapter,
            rust: rust::RustAdapter,
            go: go::GoAdapter,
            java: java::JavaAdapter,
            init: OnceLock::new(),
        }
    }

    fn adapter(&self, language: Language) -> &dyn LanguageAdapter {
        match language {
            Language::Python => &self.python,
            Language::Rust => &self.rust,
            Language::Go => &self.go,
            Language::Java => &self.java,
        }
    }

    /// Probe every grammar once. Idempotent; repeat calls return the first
    /// report.
    pub fn initialize(&self) -> &InitReport {
        self.init.get_or_init(|| {
            let mut report = InitReport::default();
            for language in Language::ALL {
                let mut parser = tree_sitter::Parser::new();
                match parser.set_language(&self.adapter(language).grammar()) {
                    Ok(()) => report.available.push(language),
                    Err(e) => {
                        warn!("adapter for {} failed to load: {}", language.as_str(), e);
                        report.failed.push((language, e.to_string()));
                    }
                }
            }
            debug!(
                "parser facade initialized: {} of {} languages available",
                report.available.len(),
                Language::ALL.len()
            );
            report
        })
    }

    /// Parse one file. Unknown extensions and unavailable adapters yield an
    /// empty result with no error; adapter failures yield an empty result
    /// whose error list describes the failure.
    pub fn parse(&self, path: &str, content: &str) -> ParseResult {
        let mut result = ParseResult::empty(path);
        result.line_count = content.lines().count() as u32;

        let Some(language) = Language::from_path(path) else {
            return result;
        };
        if !self.initialize().is_available(language) {
            return result;
        }
        result.language = Some(language);

        let adapter = self.adapter(language);
        let mut parser = tree_sitter::Parser::new();
        if let Err(e) = parser.set_language(&adapter.grammar()) {
            result.errors.push(format!("grammar load failed: {}", e));
            return result;
        }
        let Some(tree) = parser.parse(content, None) else {
            result.errors.push("tree-sitter returned no tree".to_string());
            return result;
        };

        // A misbehaving adapter must not take down a multi-file sync.
        match catch_unwind(AssertUnwindSafe(|| adapter.extract(&tree, content, path))) {
            Ok(extraction) => {
                result.symbols = dedup_qualified_names(extraction.symbols);
                result.imports = extraction.imports;
                result.exports = extraction.exports;
                result.inherits = extraction.inherits;
            }
            Err(_) => {
                result.errors.push(format!(
                    "{} adapter panicked while extracting {}",
                    language.as_str(),
                    path
                ));
            }
        }
        result
    }
}

/// Qualified names must be unique within one file's parse output; repeats
/// (e.g. Java overloads) get a positional suffix in source order.
fn dedup_qualified_names(symbols: Vec<Symbol>) -> Vec<Symbol> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    symbols
        .into_iter()
        .map(|mut s| {
            let n = counts.entry(s.qualified_name.clone()).or_insert(0);
            *n += 1;
            if *n > 1 {
                s.qualified_name = format!("{}#{}", s.qualified_name, n);
            }
            s
        })
        .collect()
}

// Common symbol model produced by every language adapter

use serde::{Deserialize, Serialize};

use super::Language;

/// A parsed declaration: function, method, class, etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    /// Deterministic identity: `path::name` or `path::parent::name` for
    /// methods. Stable across re-parses of unchanged code; used as the graph
    /// upsert key.
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub return_type: Option<String>,
    pub parameters: Vec<String>,
    pub visibility: Visibility,
    pub flags: SymbolFlags,
    /// Additive cyclomatic approximation, always >= 1.
    pub complexity: u32,
    pub calls: Vec<CallInfo>,
    /// Enclosing symbol name, set for methods.
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SymbolFlags {
    pub is_async: bool,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_exported: bool,
}

/// Symbol kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Enum,
    Variable,
    Constant,
    Property,
    Module,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Enum => "enum",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Property => "property",
            SymbolKind::Module => "module",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(SymbolKind::Function),
            "method" => Some(SymbolKind::Method),
            "class" => Some(SymbolKind::Class),
            "interface" => Some(SymbolKind::Interface),
            "type" => Some(SymbolKind::Type),
            "enum" => Some(SymbolKind::Enum),
            "variable" => Some(SymbolKind::Variable),
            "constant" => Some(SymbolKind::Constant),
            "property" => Some(SymbolKind::Property),
            "module" => Some(SymbolKind::Module),
            _ => None,
        }
    }
}

/// Visibility levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
            Visibility::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "protected" => Some(Visibility::Protected),
            "internal" => Some(Visibility::Internal),
            _ => None,
        }
    }
}

/// One call expression inside a symbol body.
///
/// Duplicate (callee, line) pairs within one symbol are collapsed to one
/// entry by the adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInfo {
    /// Unqualified callee name.
    pub callee: String,
    pub line: u32,
    /// True when any ancestor node up to the enclosing symbol is a
    /// conditional or branching construct.
    pub is_conditional: bool,
}

/// An import statement in a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Source path or module name, as written.
    pub source: String,
    pub symbols: Vec<String>,
    pub is_default: bool,
    pub is_namespace: bool,
    pub is_external: bool,
    pub line: u32,
}

/// An explicit re-export (languages with dedicated export syntax).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportInfo {
    pub symbols: Vec<String>,
    pub source: Option<String>,
    pub line: u32,
}

/// A class extending a base class, by bare base name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InheritInfo {
    /// Qualified name of the extending class.
    pub class: String,
    /// Unqualified base class name, resolved best-effort at link time.
    pub base: String,
    pub line: u32,
}

/// Per-file parse output. Transient: consumed by the orchestrator, never
/// persisted as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    pub path: String,
    pub language: Option<Language>,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    pub inherits: Vec<InheritInfo>,
    pub line_count: u32,
    /// Non-fatal parse errors. Empty for unknown file types: "file type I
    /// don't understand" is expected traffic, not a failure.
    pub errors: Vec<String>,
}

impl ParseResult {
    pub fn empty(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }
}

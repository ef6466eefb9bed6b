// Symbol-aligned chunking for embedding pipelines

use serde::{Deserialize, Serialize};

use crate::parser::model::{ParseResult, Symbol, SymbolKind};
use crate::parser::Language;

/// One embeddable unit of source text, aligned to a symbol's span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id: blake3 of path, qualified name and start line.
    pub id: String,
    pub file: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub language: Option<Language>,
    pub start_line: u32,
    pub end_line: u32,
    pub text: String,
    pub docstring: Option<String>,
}

/// Cut one chunk per symbol. Pure over its inputs: same parse result and
/// content always yield the same chunk ids.
pub fn chunk_file(result: &ParseResult, content: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    result
        .symbols
        .iter()
        .filter_map(|s| chunk_symbol(s, result.language, &lines))
        .collect()
}

fn chunk_symbol(symbol: &Symbol, language: Option<Language>, lines: &[&str]) -> Option<Chunk> {
    if symbol.start_line == 0 || symbol.start_line > symbol.end_line {
        return None;
    }
    let start = (symbol.start_line - 1) as usize;
    let end = (symbol.end_line as usize).min(lines.len());
    if start >= lines.len() {
        return None;
    }
    let text = lines[start..end].join("\n");

    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.file.as_bytes());
    hasher.update(b"\0");
    hasher.update(symbol.qualified_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(symbol.start_line.to_string().as_bytes());
    let id = hasher.finalize().to_hex().to_string();

    Some(Chunk {
        id,
        file: symbol.file.clone(),
        qualified_name: symbol.qualified_name.clone(),
        kind: symbol.kind,
        language,
        start_line: symbol.start_line,
        end_line: symbol.end_line,
        text,
        docstring: symbol.docstring.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserFacade;

    const SOURCE: &str = "def greet(name):\n    return f\"hi {name}\"\n\nTIMEOUT = 30\n\nclass Greeter:\n    def run(self):\n        pass\n";

    fn chunks() -> Vec<Chunk> {
        let facade = ParserFacade::new();
        let result = facade.parse("app/greet.py", SOURCE);
        chunk_file(&result, SOURCE)
    }

    #[test]
    fn one_chunk_per_symbol() {
        let chunks = chunks();
        let names: Vec<_> = chunks.iter().map(|c| c.qualified_name.as_str()).collect();
        assert!(names.contains(&"app/greet.py::greet"));
        assert!(names.contains(&"app/greet.py::TIMEOUT"));
        assert!(names.contains(&"app/greet.py::Greeter"));
        assert!(names.contains(&"app/greet.py::Greeter::run"));
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn chunk_text_matches_symbol_span() {
        let chunks = chunks();
        let greet = chunks
            .iter()
            .find(|c| c.qualified_name == "app/greet.py::greet")
            .unwrap();
        assert!(greet.text.starts_with("def greet"));
        assert!(greet.text.contains("return"));
    }

    #[test]
    fn ids_are_deterministic_and_position_sensitive() {
        let first = chunks();
        let second = chunks();
        assert_eq!(
            first.iter().map(|c| &c.id).collect::<Vec<_>>(),
            second.iter().map(|c| &c.id).collect::<Vec<_>>()
        );

        // Shifting a symbol to a different line changes its id.
        let facade = ParserFacade::new();
        let shifted = format!("# module docs\n\n{}", SOURCE);
        let result = facade.parse("app/greet.py", &shifted);
        let moved = chunk_file(&result, &shifted);
        let greet_before = first.iter().find(|c| c.qualified_name.ends_with("greet")).unwrap();
        let greet_after = moved.iter().find(|c| c.qualified_name.ends_with("greet")).unwrap();
        assert_ne!(greet_before.id, greet_after.id);
    }
}

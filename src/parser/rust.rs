// Rust adapter (tree-sitter-rust)

use tree_sitter::{Node, Tree};

use super::common::{
    complexity_of, docstring_above, end_line, field_text, node_text, start_line, CallCollector,
};
use super::model::{ExportInfo, ImportInfo, Symbol, SymbolFlags, SymbolKind, Visibility};
use super::{Extraction, LanguageAdapter};

pub(crate) struct RustAdapter;

const DOC_MARKERS: &[&str] = &["///", "//!", "//"];

fn is_branch(node: Node, kind: &str) -> bool {
    match kind {
        "if_expression" | "while_expression" | "for_expression" | "loop_expression"
        | "match_arm" => true,
        "binary_expression" => node
            .child_by_field_name("operator")
            .map(|op| matches!(op.kind(), "&&" | "||"))
            .unwrap_or(false),
        _ => false,
    }
}

impl LanguageAdapter for RustAdapter {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn extract(&self, tree: &Tree, content: &str, path: &str) -> Extraction {
        let mut out = Extraction::default();
        walk(tree.root_node(), content, path, &mut out, None);
        out
    }
}

fn walk(node: Node, content: &str, path: &str, out: &mut Extraction, parent_type: Option<&str>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_item" => {
                if let Some(symbol) = extract_function(child, content, path, parent_type) {
                    out.symbols.push(symbol);
                }
                // fn items nested inside fn bodies
                if let Some(body) = child.child_by_field_name("body") {
                    walk(body, content, path, out, None);
                }
            }
            "struct_item" | "union_item" => {
                push_type(child, content, path, SymbolKind::Class, out);
            }
            "enum_item" => push_type(child, content, path, SymbolKind::Enum, out),
            "trait_item" => {
                push_type(child, content, path, SymbolKind::Interface, out);
                if let Some(name) = field_text(child, "name", content) {
                    if let Some(body) = child.child_by_field_name("body") {
                        walk(body, content, path, out, Some(&name));
                    }
                }
            }
            "type_item" => push_type(child, content, path, SymbolKind::Type, out),
            "const_item" => push_type(child, content, path, SymbolKind::Constant, out),
            "static_item" => push_type(child, content, path, SymbolKind::Variable, out),
            "mod_item" => {
                push_type(child, content, path, SymbolKind::Module, out);
                if let Some(body) = child.child_by_field_name("body") {
                    walk(body, content, path, out, None);
                }
            }
            "impl_item" => {
                let type_name = field_text(child, "type", content)
                    .map(|t| t.split('<').next().unwrap_or(&t).to_string());
                if let Some(body) = child.child_by_field_name("body") {
                    walk(body, content, path, out, type_name.as_deref());
                }
            }
            "use_declaration" => extract_use(child, content, out),
            _ => walk(child, content, path, out, parent_type),
        }
    }
}

fn extract_function(
    node: Node,
    content: &str,
    path: &str,
    parent_type: Option<&str>,
) -> Option<Symbol> {
    let name = field_text(node, "name", content)?;
    let (kind, parent) = match parent_type {
        Some(t) => (SymbolKind::Method, Some(t.to_string())),
        None => (SymbolKind::Function, None),
    };
    let qualified_name = match &parent {
        Some(t) => format!("{}::{}::{}", path, t, name),
        None => format!("{}::{}", path, name),
    };

    let parameters = extract_parameters(node, content);
    let return_type = field_text(node, "return_type", content);
    let mut signature = format!("fn {}({})", name, parameters.join(", "));
    if let Some(ret) = &return_type {
        signature.push_str(&format!(" -> {}", ret));
    }

    let visibility = node_visibility(node, content);
    let flags = SymbolFlags {
        is_async: has_modifier(node, content, "async"),
        is_exported: visibility == Visibility::Public,
        ..Default::default()
    };

    let body = node.child_by_field_name("body");
    let complexity = body.map(|b| complexity_of(b, &is_branch)).unwrap_or(1);
    let calls = body.map(|b| collect_calls(b, content)).unwrap_or_default();

    Some(Symbol {
        name,
        qualified_name,
        kind,
        file: path.to_string(),
        start_line: start_line(node),
        end_line: end_line(node),
        signature: Some(signature),
        docstring: docstring_above(content, start_line(node), DOC_MARKERS),
        return_type,
        parameters,
        visibility,
        flags,
        complexity,
        calls,
        parent,
    })
}

fn push_type(node: Node, content: &str, path: &str, kind: SymbolKind, out: &mut Extraction) {
    let Some(name) = field_text(node, "name", content) else {
        return;
    };
    let visibility = node_visibility(node, content);
    out.symbols.push(Symbol {
        qualified_name: format!("{}::{}", path, name),
        kind,
        file: path.to_string(),
        start_line: start_line(node),
        end_line: end_line(node),
        signature: None,
        docstring: docstring_above(content, start_line(node), DOC_MARKERS),
        return_type: None,
        parameters: Vec::new(),
        visibility,
        flags: SymbolFlags {
            is_exported: visibility == Visibility::Public,
            ..Default::default()
        },
        complexity: 1,
        calls: Vec::new(),
        parent: None,
        name,
    });
}

fn extract_parameters(node: Node, content: &str) -> Vec<String> {
    let mut parameters = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            match child.kind() {
                "parameter" => {
                    if let Some(pattern) = child.child_by_field_name("pattern") {
                        parameters.push(node_text(pattern, content));
                    }
                }
                "self_parameter" => parameters.push(node_text(child, content)),
                _ => {}
            }
        }
    }
    parameters
}

fn collect_calls(body: Node, content: &str) -> Vec<crate::parser::model::CallInfo> {
    let mut collector = CallCollector::default();
    collect_calls_inner(body, content, false, &mut collector);
    collector.finish()
}

fn collect_calls_inner(node: Node, content: &str, conditional: bool, out: &mut CallCollector) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(child.kind(), "function_item" | "closure_expression") {
            continue;
        }
        if child.kind() == "call_expression" {
            if let Some(func) = child.child_by_field_name("function") {
                out.push(callee_name(func, content), start_line(child), conditional);
            }
        }
        let inside = conditional || is_branch(child, child.kind());
        collect_calls_inner(child, content, inside, out);
    }
}

fn callee_name(func: Node, content: &str) -> String {
    match func.kind() {
        "identifier" => node_text(func, content),
        "field_expression" => field_text(func, "field", content).unwrap_or_default(),
        "scoped_identifier" => field_text(func, "name", content).unwrap_or_default(),
        "generic_function" => func
            .child_by_field_name("function")
            .map(|f| callee_name(f, content))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn extract_use(node: Node, content: &str, out: &mut Extraction) {
    let Some(arg) = node.child_by_field_name("argument") else {
        return;
    };
    let text = node_text(arg, content);
    let line = start_line(node);

    let (source, symbols, is_namespace) = split_use_path(&text);
    let first = source.split("::").next().unwrap_or("");
    let is_external = !matches!(first, "crate" | "self" | "super");

    if node_visibility(node, content) == Visibility::Public {
        out.exports.push(ExportInfo {
            symbols: symbols.clone(),
            source: Some(source.clone()),
            line,
        });
    }
    out.imports.push(ImportInfo {
        source,
        symbols,
        is_default: false,
        is_namespace,
        is_external,
        line,
    });
}

/// Split `a::b::{c, d}` into (prefix, names) and flag glob imports.
fn split_use_path(text: &str) -> (String, Vec<String>, bool) {
    if let Some(open) = text.find('{') {
        let prefix = text[..open].trim_end_matches("::").to_string();
        let inner = text[open + 1..].trim_end_matches('}');
        let names = inner
            .split(',')
            .map(|s| s.trim().split("::").last().unwrap_or("").to_string())
            .filter(|s| !s.is_empty() && s != "*")
            .collect();
        (prefix, names, inner.contains('*'))
    } else if let Some(stripped) = text.strip_suffix("::*") {
        (stripped.to_string(), Vec::new(), true)
    } else {
        let last = text.split("::").last().unwrap_or("").to_string();
        let prefix = match text.rfind("::") {
            Some(pos) => text[..pos].to_string(),
            None => text.to_string(),
        };
        (prefix, vec![last], false)
    }
}

fn node_visibility(node: Node, content: &str) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            let text = node_text(child, content);
            return if text == "pub" {
                Visibility::Public
            } else if text.starts_with("pub(self") {
                Visibility::Private
            } else {
                // pub(crate), pub(super), pub(in ...)
                Visibility::Internal
            };
        }
    }
    Visibility::Private
}

fn has_modifier(node: Node, content: &str, modifier: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| {
        c.kind() == "function_modifiers" && node_text(c, content).contains(modifier)
    });
    found
}

#[cfg(test)]
mod tests {
    use crate::parser::model::{SymbolKind, Visibility};
    use crate::parser::ParserFacade;

    fn parse(content: &str) -> crate::parser::model::ParseResult {
        let facade = ParserFacade::new();
        facade.parse("src/lib.rs", content)
    }

    #[test]
    fn functions_methods_and_types() {
        let result = parse(
            "pub struct Engine;\n\nimpl Engine {\n    pub fn run(&self) {}\n}\n\nfn helper() {}\n",
        );
        let engine = result.symbols.iter().find(|s| s.name == "Engine").unwrap();
        assert_eq!(engine.kind, SymbolKind::Class);
        let run = result.symbols.iter().find(|s| s.name == "run").unwrap();
        assert_eq!(run.kind, SymbolKind::Method);
        assert_eq!(run.qualified_name, "src/lib.rs::Engine::run");
        let helper = result.symbols.iter().find(|s| s.name == "helper").unwrap();
        assert_eq!(helper.visibility, Visibility::Private);
        assert!(!helper.flags.is_exported);
    }

    #[test]
    fn complexity_counts_match_arms_and_short_circuit() {
        let result = parse(
            "fn f(x: i32, a: bool, b: bool) -> i32 {\n    if a && b {\n        return 0;\n    }\n    match x {\n        0 => 1,\n        _ => 2,\n    }\n}\n",
        );
        let f = result.symbols.iter().find(|s| s.name == "f").unwrap();
        // if + && + two match arms
        assert_eq!(f.complexity, 5);
    }

    #[test]
    fn loops_count_toward_complexity() {
        let result = parse(
            "fn f(n: u32) {\n    loop {\n        break;\n    }\n    for _ in 0..n {\n        work();\n    }\n}\n",
        );
        let f = result.symbols.iter().find(|s| s.name == "f").unwrap();
        // loop + for
        assert_eq!(f.complexity, 3);
    }

    #[test]
    fn nested_functions_are_discovered() {
        let result = parse("fn outer() {\n    fn inner() {}\n    inner();\n}\n");
        let inner = result.symbols.iter().find(|s| s.name == "inner").unwrap();
        assert_eq!(inner.kind, SymbolKind::Function);
        let outer = result.symbols.iter().find(|s| s.name == "outer").unwrap();
        assert!(outer.calls.iter().any(|c| c.callee == "inner"));
    }

    #[test]
    fn conditional_calls_inside_if() {
        let result = parse(
            "fn f(flag: bool) {\n    setup();\n    if flag {\n        teardown();\n    }\n}\n",
        );
        let f = result.symbols.iter().find(|s| s.name == "f").unwrap();
        assert!(!f.calls.iter().find(|c| c.callee == "setup").unwrap().is_conditional);
        assert!(f.calls.iter().find(|c| c.callee == "teardown").unwrap().is_conditional);
    }

    #[test]
    fn use_declarations_become_imports_and_exports() {
        let result = parse("pub use crate::engine::Engine;\nuse std::collections::HashMap;\n");
        assert_eq!(result.imports.len(), 2);
        assert!(!result.imports[0].is_external);
        assert!(result.imports[1].is_external);
        assert_eq!(result.exports.len(), 1);
        assert_eq!(result.exports[0].symbols, vec!["Engine".to_string()]);
    }

    #[test]
    fn doc_comments_are_collected() {
        let result = parse("/// Runs the thing.\n/// Slowly.\npub fn run() {}\n");
        let run = result.symbols.iter().find(|s| s.name == "run").unwrap();
        assert_eq!(run.docstring.as_deref(), Some("Runs the thing.\nSlowly."));
    }
}

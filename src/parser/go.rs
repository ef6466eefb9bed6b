// Go adapter (tree-sitter-go)

use tree_sitter::{Node, Tree};

use super::common::{
    complexity_of, docstring_above, end_line, field_text, node_text, start_line, CallCollector,
};
use super::model::{ImportInfo, Symbol, SymbolFlags, SymbolKind, Visibility};
use super::{Extraction, LanguageAdapter};

pub(crate) struct GoAdapter;

const DOC_MARKERS: &[&str] = &["//"];

fn is_branch(node: Node, kind: &str) -> bool {
    match kind {
        "if_statement" | "for_statement" | "expression_case" | "type_case"
        | "communication_case" => true,
        "binary_expression" => node
            .child_by_field_name("operator")
            .map(|op| matches!(op.kind(), "&&" | "||"))
            .unwrap_or(false),
        _ => false,
    }
}

impl LanguageAdapter for GoAdapter {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn extract(&self, tree: &Tree, content: &str, path: &str) -> Extraction {
        let mut out = Extraction::default();
        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "function_declaration" => {
                    if let Some(symbol) = extract_function(child, content, path, None) {
                        out.symbols.push(symbol);
                    }
                }
                "method_declaration" => {
                    let receiver = receiver_type(child, content);
                    if let Some(symbol) = extract_function(child, content, path, receiver.as_deref())
                    {
                        out.symbols.push(symbol);
                    }
                }
                "type_declaration" => extract_types(child, content, path, &mut out),
                "const_declaration" => {
                    extract_values(child, content, path, SymbolKind::Constant, &mut out)
                }
                "var_declaration" => {
                    extract_values(child, content, path, SymbolKind::Variable, &mut out)
                }
                "import_declaration" => extract_imports(child, content, &mut out),
                _ => {}
            }
        }
        out
    }
}

fn extract_function(
    node: Node,
    content: &str,
    path: &str,
    receiver: Option<&str>,
) -> Option<Symbol> {
    let name = field_text(node, "name", content)?;
    let (kind, parent) = match receiver {
        Some(r) => (SymbolKind::Method, Some(r.to_string())),
        None => (SymbolKind::Function, None),
    };
    let qualified_name = match &parent {
        Some(r) => format!("{}::{}::{}", path, r, name),
        None => format!("{}::{}", path, name),
    };

    let parameters = extract_parameters(node, content);
    let return_type = field_text(node, "result", content);
    let mut signature = format!("func {}({})", name, parameters.join(", "));
    if let Some(ret) = &return_type {
        signature.push_str(&format!(" {}", ret));
    }

    let visibility = name_visibility(&name);
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
        flags: SymbolFlags {
            is_exported: visibility == Visibility::Public,
            ..Default::default()
        },
        complexity,
        calls,
        parent,
    })
}

fn receiver_type(node: Node, content: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    first_of_kind(receiver, "type_identifier").map(|n| node_text(n, content))
}

fn extract_parameters(node: Node, content: &str) -> Vec<String> {
    let mut parameters = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            if child.kind() == "parameter_declaration"
                || child.kind() == "variadic_parameter_declaration"
            {
                let mut inner = child.walk();
                for part in child.children(&mut inner) {
                    if part.kind() == "identifier" {
                        parameters.push(node_text(part, content));
                    }
                }
            }
        }
    }
    parameters
}

fn extract_types(node: Node, content: &str, path: &str, out: &mut Extraction) {
    let mut cursor = node.walk();
    for spec in node.named_children(&mut cursor) {
        if spec.kind() != "type_spec" {
            continue;
        }
        let Some(name) = field_text(spec, "name", content) else {
            continue;
        };
        let kind = match spec.child_by_field_name("type").map(|t| t.kind()) {
            Some("struct_type") => SymbolKind::Class,
            Some("interface_type") => SymbolKind::Interface,
            _ => SymbolKind::Type,
        };
        let visibility = name_visibility(&name);
        out.symbols.push(Symbol {
            qualified_name: format!("{}::{}", path, name),
            kind,
            file: path.to_string(),
            start_line: start_line(spec),
            end_line: end_line(spec),
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
}

fn extract_values(node: Node, content: &str, path: &str, kind: SymbolKind, out: &mut Extraction) {
    let mut cursor = node.walk();
    for spec in node.named_children(&mut cursor) {
        if !matches!(spec.kind(), "const_spec" | "var_spec") {
            continue;
        }
        let mut inner = spec.walk();
        for part in spec.children(&mut inner) {
            if part.kind() != "identifier" {
                continue;
            }
            let name = node_text(part, content);
            let visibility = name_visibility(&name);
            out.symbols.push(Symbol {
                qualified_name: format!("{}::{}", path, name),
                kind,
                file: path.to_string(),
                start_line: start_line(spec),
                end_line: end_line(spec),
                signature: None,
                docstring: None,
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
    }
}

fn extract_imports(node: Node, content: &str, out: &mut Extraction) {
    let mut specs = Vec::new();
    collect_import_specs(node, &mut specs);
    for spec in specs {
        let Some(path_node) = spec.child_by_field_name("path") else {
            continue;
        };
        let source = node_text(path_node, content).trim_matches('"').to_string();
        let alias = field_text(spec, "name", content);
        out.imports.push(ImportInfo {
            is_external: !source.starts_with("./"),
            source,
            symbols: Vec::new(),
            is_default: false,
            is_namespace: alias.as_deref() != Some("_"),
            line: start_line(spec),
        });
    }
}

fn collect_import_specs<'a>(node: Node<'a>, out: &mut Vec<Node<'a>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "import_spec" {
            out.push(child);
        } else {
            collect_import_specs(child, out);
        }
    }
}

fn collect_calls(body: Node, content: &str) -> Vec<crate::parser::model::CallInfo> {
    let mut collector = CallCollector::default();
    collect_calls_inner(body, content, false, &mut collector);
    collector.finish()
}

fn collect_calls_inner(node: Node, content: &str, conditional: bool, out: &mut CallCollector) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "func_literal" {
            continue;
        }
        if child.kind() == "call_expression" {
            if let Some(func) = child.child_by_field_name("function") {
                let callee = match func.kind() {
                    "identifier" => node_text(func, content),
                    "selector_expression" => {
                        field_text(func, "field", content).unwrap_or_default()
                    }
                    _ => String::new(),
                };
                out.push(callee, start_line(child), conditional);
            }
        }
        let inside = conditional || is_branch(child, child.kind());
        collect_calls_inner(child, content, inside, out);
    }
}

fn name_visibility(name: &str) -> Visibility {
    if name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn first_of_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            return Some(child);
        }
        if let Some(found) = first_of_kind(child, kind) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use crate::parser::model::SymbolKind;
    use crate::parser::ParserFacade;

    fn parse(content: &str) -> crate::parser::model::ParseResult {
        let facade = ParserFacade::new();
        facade.parse("pkg/server.go", content)
    }

    #[test]
    fn functions_methods_and_export_by_case() {
        let result = parse(
            "package server\n\ntype Server struct{}\n\nfunc (s *Server) Start() {}\n\nfunc helper() {}\n",
        );
        let server = result.symbols.iter().find(|s| s.name == "Server").unwrap();
        assert_eq!(server.kind, SymbolKind::Class);
        assert!(server.flags.is_exported);
        let start = result.symbols.iter().find(|s| s.name == "Start").unwrap();
        assert_eq!(start.kind, SymbolKind::Method);
        assert_eq!(start.qualified_name, "pkg/server.go::Server::Start");
        let helper = result.symbols.iter().find(|s| s.name == "helper").unwrap();
        assert!(!helper.flags.is_exported);
    }

    #[test]
    fn complexity_counts_switch_cases() {
        let result = parse(
            "package main\n\nfunc f(x int) int {\n\tswitch x {\n\tcase 0:\n\t\treturn 1\n\tcase 1:\n\t\treturn 2\n\t}\n\tif x > 2 {\n\t\treturn 3\n\t}\n\treturn 0\n}\n",
        );
        let f = result.symbols.iter().find(|s| s.name == "f").unwrap();
        // two cases + one if
        assert_eq!(f.complexity, 4);
    }

    #[test]
    fn conditional_call_flag() {
        let result = parse(
            "package main\n\nfunc f(ok bool) {\n\tsetup()\n\tif ok {\n\t\tcleanup()\n\t}\n}\n",
        );
        let f = result.symbols.iter().find(|s| s.name == "f").unwrap();
        assert!(!f.calls.iter().find(|c| c.callee == "setup").unwrap().is_conditional);
        assert!(f.calls.iter().find(|c| c.callee == "cleanup").unwrap().is_conditional);
    }

    #[test]
    fn grouped_imports() {
        let result = parse(
            "package main\n\nimport (\n\t\"fmt\"\n\t\"net/http\"\n)\n",
        );
        assert_eq!(result.imports.len(), 2);
        assert_eq!(result.imports[0].source, "fmt");
        assert_eq!(result.imports[1].source, "net/http");
    }
}

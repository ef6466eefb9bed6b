// Java adapter (tree-sitter-java)

use tree_sitter::{Node, Tree};

use super::common::{
    complexity_of, docstring_above, end_line, field_text, node_text, start_line, CallCollector,
};
use super::model::{ImportInfo, InheritInfo, Symbol, SymbolFlags, SymbolKind, Visibility};
use super::{Extraction, LanguageAdapter};

pub(crate) struct JavaAdapter;

const DOC_MARKERS: &[&str] = &["/**", "/*", "//", "*"];

fn is_branch(node: Node, kind: &str) -> bool {
    match kind {
        "if_statement" | "while_statement" | "do_statement" | "for_statement"
        | "enhanced_for_statement" | "catch_clause" | "switch_block_statement_group"
        | "switch_rule" | "ternary_expression" => true,
        "binary_expression" => node
            .child_by_field_name("operator")
            .map(|op| matches!(op.kind(), "&&" | "||"))
            .unwrap_or(false),
        _ => false,
    }
}

impl LanguageAdapter for JavaAdapter {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn extract(&self, tree: &Tree, content: &str, path: &str) -> Extraction {
        let mut out = Extraction::default();
        walk(tree.root_node(), content, path, &mut out, None);
        out
    }
}

fn walk(node: Node, content: &str, path: &str, out: &mut Extraction, class: Option<&str>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_declaration" => extract_type(child, content, path, SymbolKind::Class, out),
            "interface_declaration" => {
                extract_type(child, content, path, SymbolKind::Interface, out)
            }
            "enum_declaration" => extract_type(child, content, path, SymbolKind::Enum, out),
            "method_declaration" | "constructor_declaration" => {
                if let Some(symbol) = extract_method(child, content, path, class) {
                    out.symbols.push(symbol);
                }
            }
            "field_declaration" => extract_fields(child, content, path, class, out),
            "import_declaration" => extract_import(child, content, out),
            _ => walk(child, content, path, out, class),
        }
    }
}

fn extract_type(node: Node, content: &str, path: &str, kind: SymbolKind, out: &mut Extraction) {
    let Some(name) = field_text(node, "name", content) else {
        return;
    };
    let qualified_name = format!("{}::{}", path, name);
    let (visibility, flags) = modifiers(node, content);

    // extends X
    if let Some(superclass) = node.child_by_field_name("superclass") {
        if let Some(base) = first_of_kind(superclass, "type_identifier") {
            out.inherits.push(InheritInfo {
                class: qualified_name.clone(),
                base: node_text(base, content),
                line: start_line(superclass),
            });
        }
    }
    // implements A, B
    if let Some(interfaces) = node.child_by_field_name("interfaces") {
        collect_type_identifiers(interfaces, content, &qualified_name, out);
    }

    out.symbols.push(Symbol {
        name: name.clone(),
        qualified_name,
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
            ..flags
        },
        complexity: 1,
        calls: Vec::new(),
        parent: None,
    });

    if let Some(body) = node.child_by_field_name("body") {
        walk(body, content, path, out, Some(&name));
    }
}

fn extract_method(node: Node, content: &str, path: &str, class: Option<&str>) -> Option<Symbol> {
    let name = field_text(node, "name", content)?;
    let parent = class.map(|c| c.to_string());
    let qualified_name = match &parent {
        Some(c) => format!("{}::{}::{}", path, c, name),
        None => format!("{}::{}", path, name),
    };

    let parameters = extract_parameters(node, content);
    let return_type = field_text(node, "type", content);
    let signature = match &return_type {
        Some(ret) => format!("{} {}({})", ret, name, parameters.join(", ")),
        None => format!("{}({})", name, parameters.join(", ")),
    };

    let (visibility, flags) = modifiers(node, content);
    let body = node.child_by_field_name("body");
    let complexity = body.map(|b| complexity_of(b, &is_branch)).unwrap_or(1);
    let calls = body.map(|b| collect_calls(b, content)).unwrap_or_default();

    Some(Symbol {
        name,
        qualified_name,
        kind: SymbolKind::Method,
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
            ..flags
        },
        complexity,
        calls,
        parent,
    })
}

fn extract_fields(node: Node, content: &str, path: &str, class: Option<&str>, out: &mut Extraction) {
    let (visibility, flags) = modifiers(node, content);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "variable_declarator" {
            continue;
        }
        let Some(name) = field_text(child, "name", content) else {
            continue;
        };
        let qualified_name = match class {
            Some(c) => format!("{}::{}::{}", path, c, name),
            None => format!("{}::{}", path, name),
        };
        out.symbols.push(Symbol {
            name,
            qualified_name,
            kind: SymbolKind::Property,
            file: path.to_string(),
            start_line: start_line(child),
            end_line: end_line(child),
            signature: None,
            docstring: None,
            return_type: field_text(node, "type", content),
            parameters: Vec::new(),
            visibility,
            flags: SymbolFlags {
                is_exported: visibility == Visibility::Public,
                ..flags
            },
            complexity: 1,
            calls: Vec::new(),
            parent: class.map(|c| c.to_string()),
        });
    }
}

fn extract_parameters(node: Node, content: &str) -> Vec<String> {
    let mut parameters = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            if matches!(child.kind(), "formal_parameter" | "spread_parameter") {
                if let Some(name) = field_text(child, "name", content) {
                    parameters.push(name);
                }
            }
        }
    }
    parameters
}

fn extract_import(node: Node, content: &str, out: &mut Extraction) {
    let Some(scoped) = first_of_kind(node, "scoped_identifier") else {
        return;
    };
    let source = node_text(scoped, content);
    let is_namespace = node_text(node, content).contains(".*");
    let symbols = if is_namespace {
        Vec::new()
    } else {
        source
            .rsplit('.')
            .next()
            .map(|s| vec![s.to_string()])
            .unwrap_or_default()
    };
    out.imports.push(ImportInfo {
        is_external: source.starts_with("java.") || source.starts_with("javax."),
        source,
        symbols,
        is_default: false,
        is_namespace,
        line: start_line(node),
    });
}

fn collect_type_identifiers(node: Node, content: &str, class_qname: &str, out: &mut Extraction) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "type_identifier" {
            out.inherits.push(InheritInfo {
                class: class_qname.to_string(),
                base: node_text(child, content),
                line: start_line(child),
            });
        } else {
            collect_type_identifiers(child, content, class_qname, out);
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
        if child.kind() == "lambda_expression" {
            continue;
        }
        match child.kind() {
            "method_invocation" => {
                if let Some(name) = field_text(child, "name", content) {
                    out.push(name, start_line(child), conditional);
                }
            }
            "object_creation_expression" => {
                if let Some(type_node) = child.child_by_field_name("type") {
                    let name = node_text(type_node, content);
                    let bare = name.split('<').next().unwrap_or(&name).to_string();
                    out.push(bare, start_line(child), conditional);
                }
            }
            _ => {}
        }
        let inside = conditional || is_branch(child, child.kind());
        collect_calls_inner(child, content, inside, out);
    }
}

/// Visibility plus static/abstract flags from a declaration's modifiers.
/// No modifier means package-private, mapped to `Internal`.
fn modifiers(node: Node, content: &str) -> (Visibility, SymbolFlags) {
    let mut visibility = Visibility::Internal;
    let mut flags = SymbolFlags::default();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "modifiers" {
            continue;
        }
        let text = node_text(child, content);
        if text.contains("public") {
            visibility = Visibility::Public;
        } else if text.contains("protected") {
            visibility = Visibility::Protected;
        } else if text.contains("private") {
            visibility = Visibility::Private;
        }
        flags.is_static = text.contains("static");
        flags.is_abstract = text.contains("abstract");
    }
    (visibility, flags)
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
    use crate::parser::model::{SymbolKind, Visibility};
    use crate::parser::ParserFacade;

    fn parse(content: &str) -> crate::parser::model::ParseResult {
        let facade = ParserFacade::new();
        facade.parse("src/App.java", content)
    }

    #[test]
    fn classes_methods_and_visibility() {
        let result = parse(
            "public class App {\n    private int count;\n    public void run() {}\n    void helper() {}\n}\n",
        );
        let app = result.symbols.iter().find(|s| s.name == "App").unwrap();
        assert_eq!(app.kind, SymbolKind::Class);
        assert!(app.flags.is_exported);
        let run = result.symbols.iter().find(|s| s.name == "run").unwrap();
        assert_eq!(run.qualified_name, "src/App.java::App::run");
        assert_eq!(run.visibility, Visibility::Public);
        let helper = result.symbols.iter().find(|s| s.name == "helper").unwrap();
        assert_eq!(helper.visibility, Visibility::Internal);
        let count = result.symbols.iter().find(|s| s.name == "count").unwrap();
        assert_eq!(count.kind, SymbolKind::Property);
    }

    #[test]
    fn complexity_counts_catch_and_ternary() {
        let result = parse(
            "class A {\n    int f(int x) {\n        try {\n            return x > 0 ? 1 : 2;\n        } catch (Exception e) {\n            return 0;\n        }\n    }\n}\n",
        );
        let f = result.symbols.iter().find(|s| s.name == "f").unwrap();
        // ternary + catch + comparison is not a branch
        assert_eq!(f.complexity, 3);
    }

    #[test]
    fn conditional_calls_and_inherits() {
        let result = parse(
            "class Child extends Base {\n    void f(boolean ok) {\n        setup();\n        if (ok) {\n            cleanup();\n        }\n    }\n}\n",
        );
        assert_eq!(result.inherits.len(), 1);
        assert_eq!(result.inherits[0].base, "Base");
        let f = result.symbols.iter().find(|s| s.name == "f").unwrap();
        assert!(!f.calls.iter().find(|c| c.callee == "setup").unwrap().is_conditional);
        assert!(f.calls.iter().find(|c| c.callee == "cleanup").unwrap().is_conditional);
    }

    #[test]
    fn javadoc_attaches_without_close_marker() {
        let result = parse("/**\n * Runs the app.\n */\npublic class App {}\n");
        let app = result.symbols.iter().find(|s| s.name == "App").unwrap();
        assert_eq!(app.docstring.as_deref(), Some("Runs the app."));
    }

    #[test]
    fn imports() {
        let result = parse("import java.util.List;\nimport com.acme.util.Helper;\n\nclass A {}\n");
        assert_eq!(result.imports.len(), 2);
        assert!(result.imports[0].is_external);
        assert!(!result.imports[1].is_external);
        assert_eq!(result.imports[1].symbols, vec!["Helper".to_string()]);
    }
}

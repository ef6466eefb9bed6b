// Python adapter (tree-sitter-python)

use tree_sitter::{Node, Tree};

use super::common::{
    complexity_of, docstring_above, end_line, field_text, node_text, start_line, CallCollector,
};
use super::model::{ImportInfo, InheritInfo, Symbol, SymbolFlags, SymbolKind, Visibility};
use super::{Extraction, LanguageAdapter};

pub(crate) struct PythonAdapter;

const DOC_MARKERS: &[&str] = &["#"];

fn is_branch(_node: Node, kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "elif_clause"
            | "conditional_expression"
            | "for_statement"
            | "while_statement"
            | "except_clause"
            | "case_clause"
            | "boolean_operator"
    )
}

impl LanguageAdapter for PythonAdapter {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract(&self, tree: &Tree, content: &str, path: &str) -> Extraction {
        let mut out = Extraction::default();
        walk(tree.root_node(), content, path, &mut out, &Scope::top());
        out
    }
}

#[derive(Clone, Default)]
struct Scope {
    class: Option<String>,
    in_function: bool,
    depth: usize,
}

impl Scope {
    fn top() -> Self {
        Self::default()
    }
}

fn walk(node: Node, content: &str, path: &str, out: &mut Extraction, scope: &Scope) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "decorated_definition" => {
                if let Some(def) = child.child_by_field_name("definition") {
                    handle_definition(def, Some(child), content, path, out, scope);
                }
            }
            "function_definition" | "class_definition" => {
                handle_definition(child, None, content, path, out, scope);
            }
            "import_statement" | "import_from_statement" => {
                extract_import(child, content, out);
            }
            "expression_statement" if scope.depth == 0 => {
                extract_module_assignment(child, content, path, out);
            }
            _ => walk(child, content, path, out, scope),
        }
    }
}

fn handle_definition(
    def: Node,
    decorated: Option<Node>,
    content: &str,
    path: &str,
    out: &mut Extraction,
    scope: &Scope,
) {
    match def.kind() {
        "function_definition" => {
            if let Some(symbol) = extract_function(def, decorated, content, path, scope) {
                let inner = Scope {
                    class: None,
                    in_function: true,
                    depth: scope.depth + 1,
                };
                if let Some(body) = def.child_by_field_name("body") {
                    walk(body, content, path, out, &inner);
                }
                out.symbols.push(symbol);
            }
        }
        "class_definition" => {
            if let Some(name) = field_text(def, "name", content) {
                let qualified_name = format!("{}::{}", path, name);
                extract_bases(def, content, &qualified_name, out);
                let symbol = Symbol {
                    name: name.clone(),
                    qualified_name,
                    kind: SymbolKind::Class,
                    file: path.to_string(),
                    start_line: start_line(def),
                    end_line: end_line(def),
                    signature: None,
                    docstring: docstring_above(content, start_line(def), DOC_MARKERS),
                    return_type: None,
                    parameters: Vec::new(),
                    visibility: name_visibility(&name),
                    flags: SymbolFlags {
                        is_exported: scope.depth == 0 && name_visibility(&name) == Visibility::Public,
                        ..Default::default()
                    },
                    complexity: 1,
                    calls: Vec::new(),
                    parent: None,
                };
                let inner = Scope {
                    class: Some(name),
                    in_function: false,
                    depth: scope.depth + 1,
                };
                if let Some(body) = def.child_by_field_name("body") {
                    walk(body, content, path, out, &inner);
                }
                out.symbols.push(symbol);
            }
        }
        _ => {}
    }
}

fn extract_function(
    def: Node,
    decorated: Option<Node>,
    content: &str,
    path: &str,
    scope: &Scope,
) -> Option<Symbol> {
    let name = field_text(def, "name", content)?;
    let is_method = scope.class.is_some() && !scope.in_function;
    let (kind, parent) = if is_method {
        (SymbolKind::Method, scope.class.clone())
    } else {
        (SymbolKind::Function, None)
    };
    let qualified_name = match &parent {
        Some(class) => format!("{}::{}::{}", path, class, name),
        None => format!("{}::{}", path, name),
    };

    let parameters = extract_parameters(def, content);
    let return_type = field_text(def, "return_type", content);
    let mut signature = format!("def {}({})", name, parameters.join(", "));
    if let Some(ret) = &return_type {
        signature.push_str(&format!(" -> {}", ret));
    }

    let visibility = name_visibility(&name);
    let mut flags = SymbolFlags {
        is_async: has_child_kind(def, "async"),
        is_exported: scope.depth == 0 && visibility == Visibility::Public,
        ..Default::default()
    };
    if let Some(wrapper) = decorated {
        let mut cursor = wrapper.walk();
        for deco in wrapper.children(&mut cursor) {
            if deco.kind() == "decorator" {
                let text = node_text(deco, content);
                if text.contains("staticmethod") {
                    flags.is_static = true;
                }
                if text.contains("abstractmethod") {
                    flags.is_abstract = true;
                }
            }
        }
    }

    let body = def.child_by_field_name("body");
    let complexity = body.map(|b| complexity_of(b, &is_branch)).unwrap_or(1);
    let calls = body.map(|b| collect_calls(b, content)).unwrap_or_default();

    Some(Symbol {
        name,
        qualified_name,
        kind,
        file: path.to_string(),
        start_line: start_line(def),
        end_line: end_line(def),
        signature: Some(signature),
        docstring: docstring_above(content, start_line(def), DOC_MARKERS),
        return_type,
        parameters,
        visibility,
        flags,
        complexity,
        calls,
        parent,
    })
}

fn extract_parameters(def: Node, content: &str) -> Vec<String> {
    let mut parameters = Vec::new();
    if let Some(params) = def.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            match child.kind() {
                "identifier" => parameters.push(node_text(child, content)),
                "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    if let Some(ident) = first_identifier(child) {
                        parameters.push(node_text(ident, content));
                    }
                }
                "default_parameter" | "typed_default_parameter" => {
                    if let Some(name) = field_text(child, "name", content) {
                        parameters.push(name);
                    }
                }
                _ => {}
            }
        }
    }
    parameters
}

fn extract_bases(def: Node, content: &str, class_qname: &str, out: &mut Extraction) {
    if let Some(bases) = def.child_by_field_name("superclasses") {
        let mut cursor = bases.walk();
        for base in bases.named_children(&mut cursor) {
            if matches!(base.kind(), "identifier" | "attribute") {
                let text = node_text(base, content);
                let bare = text.rsplit('.').next().unwrap_or(&text).to_string();
                out.inherits.push(InheritInfo {
                    class: class_qname.to_string(),
                    base: bare,
                    line: start_line(base),
                });
            }
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
        // Nested defs own their calls.
        if matches!(child.kind(), "function_definition" | "class_definition") {
            continue;
        }
        if child.kind() == "call" {
            if let Some(func) = child.child_by_field_name("function") {
                let callee = match func.kind() {
                    "attribute" => field_text(func, "attribute", content).unwrap_or_default(),
                    _ => node_text(func, content),
                };
                out.push(callee, start_line(child), conditional);
            }
        }
        let inside = conditional || is_branch(child, child.kind());
        collect_calls_inner(child, content, inside, out);
    }
}

fn extract_import(node: Node, content: &str, out: &mut Extraction) {
    let line = start_line(node);
    if node.kind() == "import_statement" {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let source = match child.kind() {
                "dotted_name" => node_text(child, content),
                "aliased_import" => field_text(child, "name", content).unwrap_or_default(),
                _ => continue,
            };
            if source.is_empty() {
                continue;
            }
            out.imports.push(ImportInfo {
                is_external: !source.starts_with('.'),
                source,
                symbols: Vec::new(),
                is_default: false,
                is_namespace: true,
                line,
            });
        }
    } else {
        let source = field_text(node, "module_name", content).unwrap_or_default();
        if source.is_empty() {
            return;
        }
        let mut symbols = Vec::new();
        let mut is_namespace = false;
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            match name.kind() {
                "dotted_name" => symbols.push(node_text(name, content)),
                "aliased_import" => {
                    if let Some(orig) = field_text(name, "name", content) {
                        symbols.push(orig);
                    }
                }
                _ => {}
            }
        }
        if has_child_kind(node, "wildcard_import") {
            is_namespace = true;
        }
        out.imports.push(ImportInfo {
            is_external: !source.starts_with('.'),
            source,
            symbols,
            is_default: false,
            is_namespace,
            line,
        });
    }
}

fn extract_module_assignment(stmt: Node, content: &str, path: &str, out: &mut Extraction) {
    let Some(assign) = stmt.named_child(0).filter(|n| n.kind() == "assignment") else {
        return;
    };
    let Some(left) = assign.child_by_field_name("left").filter(|n| n.kind() == "identifier") else {
        return;
    };
    let name = node_text(left, content);
    let kind = if name.chars().all(|c| !c.is_lowercase()) && name.chars().any(|c| c.is_uppercase())
    {
        SymbolKind::Constant
    } else {
        SymbolKind::Variable
    };
    out.symbols.push(Symbol {
        qualified_name: format!("{}::{}", path, name),
        kind,
        file: path.to_string(),
        start_line: start_line(assign),
        end_line: end_line(assign),
        signature: None,
        docstring: None,
        return_type: None,
        parameters: Vec::new(),
        visibility: name_visibility(&name),
        flags: SymbolFlags {
            is_exported: name_visibility(&name) == Visibility::Public,
            ..Default::default()
        },
        complexity: 1,
        calls: Vec::new(),
        parent: None,
        name,
    });
}

fn name_visibility(name: &str) -> Visibility {
    if name.starts_with("__") && name.ends_with("__") {
        Visibility::Public
    } else if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

fn has_child_kind(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

fn first_identifier(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "identifier" {
            return Some(child);
        }
        if let Some(found) = first_identifier(child) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use crate::parser::model::SymbolKind;
    use crate::parser::{Language, ParserFacade};

    fn parse(content: &str) -> crate::parser::model::ParseResult {
        let facade = ParserFacade::new();
        facade.parse("app/main.py", content)
    }

    #[test]
    fn extracts_functions_and_methods() {
        let result = parse(
            "def top():\n    pass\n\nclass Greeter:\n    def greet(self):\n        pass\n",
        );
        assert_eq!(result.language, Some(Language::Python));
        let top = result.symbols.iter().find(|s| s.name == "top").unwrap();
        assert_eq!(top.kind, SymbolKind::Function);
        assert_eq!(top.qualified_name, "app/main.py::top");
        let greet = result.symbols.iter().find(|s| s.name == "greet").unwrap();
        assert_eq!(greet.kind, SymbolKind::Method);
        assert_eq!(greet.qualified_name, "app/main.py::Greeter::greet");
        assert_eq!(greet.parent.as_deref(), Some("Greeter"));
    }

    #[test]
    fn complexity_is_one_plus_branches() {
        let result = parse(
            "def f(x):\n    if x:\n        pass\n    for i in x:\n        pass\n    while x:\n        x -= 1\n",
        );
        let f = &result.symbols[0];
        assert_eq!(f.complexity, 4);
    }

    #[test]
    fn conditional_call_flag() {
        let result = parse(
            "def f(x):\n    helper()\n    if x:\n        guarded()\n",
        );
        let f = &result.symbols[0];
        let plain = f.calls.iter().find(|c| c.callee == "helper").unwrap();
        let guarded = f.calls.iter().find(|c| c.callee == "guarded").unwrap();
        assert!(!plain.is_conditional);
        assert!(guarded.is_conditional);
    }

    #[test]
    fn underscore_is_private_and_not_exported() {
        let result = parse("def _hidden():\n    pass\n\ndef shown():\n    pass\n");
        let hidden = result.symbols.iter().find(|s| s.name == "_hidden").unwrap();
        let shown = result.symbols.iter().find(|s| s.name == "shown").unwrap();
        assert!(!hidden.flags.is_exported);
        assert!(shown.flags.is_exported);
    }

    #[test]
    fn imports_and_bases() {
        let result = parse(
            "import os\nfrom .util import helper\n\nclass Child(Base):\n    pass\n",
        );
        assert_eq!(result.imports.len(), 2);
        assert!(result.imports[0].is_external);
        assert!(!result.imports[1].is_external);
        assert_eq!(result.imports[1].symbols, vec!["helper".to_string()]);
        assert_eq!(result.inherits.len(), 1);
        assert_eq!(result.inherits[0].base, "Base");
    }

    #[test]
    fn docstring_from_preceding_comments() {
        let result = parse("# adds two numbers\ndef add(a, b):\n    return a + b\n");
        assert_eq!(result.symbols[0].docstring.as_deref(), Some("adds two numbers"));
    }
}

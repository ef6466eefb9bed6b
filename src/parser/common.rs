// Shared tree-walking helpers used by all language adapters

use std::collections::HashSet;

use tree_sitter::Node;

use super::model::CallInfo;

/// Text of a node, empty on any byte-range mishap.
pub(crate) fn node_text(node: Node, content: &str) -> String {
    content.get(node.byte_range()).unwrap_or("").to_string()
}

pub(crate) fn field_text(node: Node, field: &str, content: &str) -> Option<String> {
    node.child_by_field_name(field).map(|n| node_text(n, content))
}

/// 1-based line of a node's first byte.
pub(crate) fn start_line(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

pub(crate) fn end_line(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// Additive cyclomatic complexity: 1 plus one per descendant branching
/// construct. `is_branch` is the per-language node predicate.
pub(crate) fn complexity_of<F>(body: Node, is_branch: &F) -> u32
where
    F: Fn(Node, &str) -> bool,
{
    1 + count_branches(body, is_branch)
}

fn count_branches<F>(node: Node, is_branch: &F) -> u32
where
    F: Fn(Node, &str) -> bool,
{
    let mut count = 0;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if is_branch(child, child.kind()) {
            count += 1;
        }
        count += count_branches(child, is_branch);
    }
    count
}

/// Accumulates call sites, collapsing duplicate (callee, line) pairs.
#[derive(Default)]
pub(crate) struct CallCollector {
    calls: Vec<CallInfo>,
    seen: HashSet<(String, u32)>,
}

impl CallCollector {
    pub fn push(&mut self, callee: String, line: u32, is_conditional: bool) {
        if callee.is_empty() {
            return;
        }
        if self.seen.insert((callee.clone(), line)) {
            self.calls.push(CallInfo {
                callee,
                line,
                is_conditional,
            });
        }
    }

    pub fn finish(self) -> Vec<CallInfo> {
        self.calls
    }
}

/// Scan up to 10 lines above `symbol_line` (1-based) for a contiguous run of
/// comment lines. Markers are stripped, lines joined top-down. Blank lines
/// before the run are skipped; the first non-comment, non-blank line stops
/// the scan.
pub(crate) fn docstring_above(content: &str, symbol_line: u32, markers: &[&str]) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    if symbol_line < 2 {
        return None;
    }
    let mut collected: Vec<String> = Vec::new();
    let mut idx = symbol_line as usize - 1; // 0-based index of the symbol line
    let mut scanned = 0;
    while idx > 0 && scanned < 10 {
        idx -= 1;
        scanned += 1;
        let line = lines.get(idx).copied().unwrap_or("").trim();
        if line.is_empty() {
            if collected.is_empty() {
                continue;
            }
            break;
        }
        match strip_marker(line, markers) {
            Some(text) => collected.push(text.to_string()),
            None => break,
        }
    }
    if collected.is_empty() {
        return None;
    }
    collected.reverse();
    let joined = collected.join("\n").trim().to_string();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn strip_marker<'a>(line: &'a str, markers: &[&str]) -> Option<&'a str> {
    // The closing line of a block comment carries no text.
    if line == "*/" {
        return Some("");
    }
    // Longest marker first so "///" wins over "//".
    let mut sorted: Vec<&str> = markers.to_vec();
    sorted.sort_by_key(|m| std::cmp::Reverse(m.len()));
    for marker in sorted {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim().trim_end_matches("*/").trim_end());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docstring_contiguous_run() {
        let content = "fn other() {}\n\n// first line\n// second line\nfn target() {}\n";
        let doc = docstring_above(content, 5, &["//"]).unwrap();
        assert_eq!(doc, "first line\nsecond line");
    }

    #[test]
    fn docstring_stops_at_code() {
        let content = "// unrelated\nlet x = 1;\nfn target() {}\n";
        assert!(docstring_above(content, 3, &["//"]).is_none());
    }

    #[test]
    fn docstring_skips_blank_before_run() {
        let content = "# doc\n\ndef target():\n    pass\n";
        let doc = docstring_above(content, 3, &["#"]).unwrap();
        assert_eq!(doc, "doc");
    }

    #[test]
    fn docstring_block_close_leaves_no_residue() {
        let content = "/**\n * Does things.\n */\nvoid target() {}\n";
        let doc = docstring_above(content, 4, &["/**", "/*", "//", "*"]).unwrap();
        assert_eq!(doc, "Does things.");
    }

    #[test]
    fn docstring_scan_is_bounded() {
        let mut content = String::new();
        for i in 0..15 {
            content.push_str(&format!("# line {}\n", i));
        }
        content.push_str("def target():\n    pass\n");
        let doc = docstring_above(&content, 16, &["#"]).unwrap();
        // Only the 10 closest comment lines are scanned.
        assert_eq!(doc.lines().count(), 10);
        assert!(doc.starts_with("line 5"));
    }

    #[test]
    fn call_collector_dedupes_by_callee_and_line() {
        let mut c = CallCollector::default();
        c.push("f".to_string(), 3, false);
        c.push("f".to_string(), 3, true);
        c.push("f".to_string(), 4, false);
        let calls = c.finish();
        assert_eq!(calls.len(), 2);
    }
}

use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;

use super::{edge, is_class_like, is_string_like, unquote, AnalysisOutput, NodeMap};
use crate::models::{FileGraph, ParseRef, RelationshipType, SyntaxNode};

static CLASS_ATTRIBUTE: OnceLock<Option<Regex>> = OnceLock::new();

const COMPONENT_SUFFIXES: &[&str] = &["Component", "Container", "View", "Page", "Screen"];

struct Selector {
    target: ParseRef,
    text: String,
}

pub(super) fn analyze(graphs: &[FileGraph], node_map: &NodeMap<'_>) -> AnalysisOutput {
    let mut output = AnalysisOutput::default();
    let selectors = collect_selectors(node_map.graphs());
    if selectors.is_empty() {
        return output;
    }

    for graph in graphs.iter().filter(|g| g.is_script()) {
        for (id, node) in &graph.nodes {
            if !is_component(node) {
                continue;
            }
            for class_name in class_names_in_component(node, graph) {
                for selector in selectors.iter().filter(|s| selector_matches(&s.text, &class_name)) {
                    output.relationships.push(edge(
                        RelationshipType::Style,
                        graph,
                        id,
                        node,
                        selector.target.clone(),
                        "component_style",
                        format!("{} uses style class {class_name}", node.name),
                    ));
                }
            }
        }
    }

    output
}

/// Class-like, function-like declarations named like a UI component or a hook.
fn is_component(node: &SyntaxNode) -> bool {
    let declaration = is_class_like(&node.node_type)
        || matches!(
            node.node_type.as_str(),
            "function_declaration" | "function" | "arrow_function" | "function_definition"
        );
    if !declaration || !node.has_name() {
        return false;
    }

    let name = node.name.trim();
    let pascal_case = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    let hook = name
        .strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase());

    pascal_case || hook || COMPONENT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn collect_selectors(graphs: &[FileGraph]) -> Vec<Selector> {
    let mut selectors = Vec::new();
    for graph in graphs.iter().filter(|g| g.is_stylesheet()) {
        for (id, node) in &graph.nodes {
            if !node.node_type.contains("selector") {
                continue;
            }
            let text = if node.has_name() { node.name.trim() } else { node.text().trim() };
            if text.is_empty() {
                continue;
            }
            selectors.push(Selector {
                target: ParseRef::new(graph.file_path.clone(), id.clone()),
                text: text.to_string(),
            });
        }
    }
    selectors
}

/// Exact match on `.class` / `class`, or containment of the class name.
fn selector_matches(selector: &str, class_name: &str) -> bool {
    selector == class_name
        || selector.strip_prefix('.') == Some(class_name)
        || selector.contains(class_name)
}

fn is_class_attribute(node: &SyntaxNode) -> bool {
    let name = node.name.trim();
    (node.node_type == "jsx_attribute" && name == "className")
        || (node.node_type == "property_identifier" && name == "className")
        || (node.node_type.contains("attribute") && name == "class")
        || node.text().contains("className=")
        || node.text().contains("class=")
}

/// Class-name literals used in attribute-like positions below `component`,
/// deduplicated in discovery order.
fn class_names_in_component(component: &SyntaxNode, graph: &FileGraph) -> Vec<String> {
    let mut names = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<&str> = component.children.iter().rev().map(String::as_str).collect();

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = graph.node(id) else {
            continue;
        };
        if is_class_attribute(node) {
            collect_string_literals(node, graph, &mut names);
        }
        stack.extend(node.children.iter().rev().map(String::as_str));
    }

    if names.is_empty() {
        if let Some(regex) = CLASS_ATTRIBUTE
            .get_or_init(|| Regex::new(r#"class(?:Name)?\s*=\s*\{?\s*["'`]([^"'`]+)["'`]"#).ok())
            .as_ref()
        {
            for captures in regex.captures_iter(component.text()) {
                if let Some(value) = captures.get(1) {
                    push_class_list(value.as_str(), &mut names);
                }
            }
        }
    }

    let mut seen = HashSet::new();
    names.retain(|name| plausible_class_name(name) && seen.insert(name.clone()));
    names
}

fn collect_string_literals(attribute: &SyntaxNode, graph: &FileGraph, names: &mut Vec<String>) {
    let mut visited = HashSet::new();
    let mut stack: Vec<&str> = attribute.children.iter().map(String::as_str).collect();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = graph.node(id) else {
            continue;
        };
        if is_string_like(&node.node_type) {
            let raw = if node.text().is_empty() { node.name.as_str() } else { node.text() };
            push_class_list(unquote(raw), names);
        }
        stack.extend(node.children.iter().map(String::as_str));
    }
}

fn push_class_list(value: &str, names: &mut Vec<String>) {
    names.extend(value.split_whitespace().map(str::to_string));
}

fn plausible_class_name(name: &str) -> bool {
    name.len() > 1 && !name.contains(['(', ')', '{', '}', ';', '='])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::graph;

    fn run(graphs: &[FileGraph]) -> AnalysisOutput {
        let map = NodeMap::build(graphs);
        analyze(graphs, &map)
    }

    fn stylesheet() -> FileGraph {
        graph("/repo/src/app.css", "css", vec![
            ("1", SyntaxNode::new("rule_set", "").with_children(["2"]).with_text(".card {}")),
            ("2", SyntaxNode::new("class_selector", ".card")),
            ("3", SyntaxNode::new("class_selector", ".card-title")),
            ("4", SyntaxNode::new("id_selector", "#root")),
        ])
    }

    #[test]
    fn component_detection_covers_suffix_pascal_case_and_hooks() {
        assert!(is_component(&SyntaxNode::new("function_declaration", "Header")));
        assert!(is_component(&SyntaxNode::new("function_declaration", "useTheme")));
        assert!(is_component(&SyntaxNode::new("class_declaration", "listView")));
        assert!(!is_component(&SyntaxNode::new("function_declaration", "user")));
        assert!(!is_component(&SyntaxNode::new("call_expression", "Header")));
    }

    #[test]
    fn jsx_class_literals_match_exact_and_contained_selectors() {
        let graphs = vec![
            graph("/repo/src/Card.tsx", "typescript", vec![
                ("1", SyntaxNode::new("function_declaration", "Card").with_children(["2"])),
                ("2", SyntaxNode::new("jsx_attribute", "className").with_children(["3"])),
                ("3", SyntaxNode::new("string", "").with_text("\"card\"")),
            ]),
            stylesheet(),
        ];

        let output = run(&graphs);
        let targets: Vec<&str> = output
            .relationships
            .iter()
            .map(|r| r.to.node_id.as_str())
            .collect();
        assert_eq!(targets, vec!["2", "3"]);
        assert!(output.virtual_nodes.is_empty());
        for rel in &output.relationships {
            assert_eq!(rel.kind(), "component_style");
            assert_eq!(rel.to.file_path, "/repo/src/app.css");
        }
    }

    #[test]
    fn component_text_is_scanned_when_no_attribute_nodes() {
        let graphs = vec![
            graph("/repo/src/Title.jsx", "javascript", vec![(
                "1",
                SyntaxNode::new("function_declaration", "Title")
                    .with_text("function Title() { return <h1 className=\"card-title big\" /> }"),
            )]),
            stylesheet(),
        ];

        let output = run(&graphs);
        assert_eq!(output.relationships.len(), 1);
        assert_eq!(output.relationships[0].to.node_id, "3");
    }

    #[test]
    fn stylesheets_and_plain_strings_are_not_components() {
        let graphs = vec![
            graph("/repo/src/api.ts", "typescript", vec![
                ("1", SyntaxNode::new("function_declaration", "Fetch").with_children(["2"])),
                ("2", SyntaxNode::new("string", "").with_text("'card'")),
            ]),
            stylesheet(),
        ];
        assert!(run(&graphs).relationships.is_empty());
    }
}

use std::{collections::HashMap, sync::OnceLock};

use regex::Regex;

use super::{capture, edge, identifier_text, is_identifier_like, AnalysisOutput, NodeMap};
use crate::models::{FileGraph, ParseRef, RelationshipType, SyntaxNode};

static METHOD_CALL: OnceLock<Option<Regex>> = OnceLock::new();
static FUNCTION_CALL: OnceLock<Option<Regex>> = OnceLock::new();

pub(super) fn analyze(graphs: &[FileGraph], node_map: &NodeMap<'_>) -> AnalysisOutput {
    let mut output = AnalysisOutput::default();
    let declarations = function_declarations(node_map.graphs());

    for (graph_idx, graph) in graphs.iter().enumerate() {
        for (id, node) in &graph.nodes {
            if !is_call_like(node) {
                continue;
            }

            if let Some(method) = method_name(node, graph) {
                let target = output.synthesize(
                    graph_idx,
                    graph,
                    "virtual_method",
                    &method,
                    node.range,
                    format!("function {method}() {{}}"),
                );
                output.relationships.push(edge(
                    RelationshipType::Call,
                    graph,
                    id,
                    node,
                    target,
                    "method_call",
                    format!("calls method {method}"),
                ));
            }

            if node.node_type != "call_expression" {
                continue;
            }
            let Some(function) = called_function_name(node, graph) else {
                continue;
            };
            for target in declarations.get(function.as_str()).into_iter().flatten() {
                output.relationships.push(edge(
                    RelationshipType::Call,
                    graph,
                    id,
                    node,
                    target.clone(),
                    "function_call",
                    format!("calls function {function}"),
                ));
            }
        }
    }

    output
}

fn is_call_like(node: &SyntaxNode) -> bool {
    !node.is_virtual()
        && (node.node_type.contains("call") || node.node_type.contains("invocation"))
}

fn function_declarations(graphs: &[FileGraph]) -> HashMap<&str, Vec<ParseRef>> {
    let mut by_name: HashMap<&str, Vec<ParseRef>> = HashMap::new();
    for graph in graphs {
        for (id, node) in &graph.nodes {
            if node.node_type == "function_declaration" && node.has_name() {
                by_name
                    .entry(node.name.as_str())
                    .or_default()
                    .push(ParseRef::new(graph.file_path.clone(), id.clone()));
            }
        }
    }
    by_name
}

/// Node name, then `obj.name(` / `name(` in the source text, then the
/// first identifier child.
fn method_name(node: &SyntaxNode, graph: &FileGraph) -> Option<String> {
    if node.has_name() {
        return Some(node.name.trim().to_string());
    }
    capture(&METHOD_CALL, r"(?:(\w+)\.)?(\w+)\s*\(", node.text(), 2)
        .or_else(|| identifier_child(node, graph))
}

/// Node name, then the first identifier child, then `name(` in the text.
fn called_function_name(node: &SyntaxNode, graph: &FileGraph) -> Option<String> {
    if node.has_name() {
        return Some(node.name.trim().to_string());
    }
    identifier_child(node, graph).or_else(|| capture(&FUNCTION_CALL, r"(\w+)\s*\(", node.text(), 1))
}

fn identifier_child(node: &SyntaxNode, graph: &FileGraph) -> Option<String> {
    graph
        .children_of(node)
        .map(|(_, child)| child)
        .filter(|child| is_identifier_like(&child.node_type))
        .find_map(identifier_text)
}

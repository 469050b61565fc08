use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

use super::{
    capture, edge, find_descendant, is_identifier_like, is_string_like, unquote, AnalysisOutput,
    NodeMap,
};
use crate::models::{FileGraph, ParseRef, ParsedRelationship, RelationshipType, SyntaxNode};

static FROM_CLAUSE: OnceLock<Option<Regex>> = OnceLock::new();
static REQUIRE_CALL: OnceLock<Option<Regex>> = OnceLock::new();
static BARE_IMPORT: OnceLock<Option<Regex>> = OnceLock::new();
static TYPE_NAME: OnceLock<Option<Regex>> = OnceLock::new();

const TYPE_DECLARATIONS: &[&str] = &[
    "interface_declaration",
    "class_declaration",
    "type_alias_declaration",
    "enum_declaration",
    "abstract_class_declaration",
];

pub(super) fn analyze(graphs: &[FileGraph], node_map: &NodeMap<'_>) -> AnalysisOutput {
    let mut output = AnalysisOutput::default();

    for (graph_idx, graph) in graphs.iter().enumerate() {
        module_dependencies(graph_idx, graph, &mut output);
        interface_property_dependencies(graph, node_map, &mut output);
        signature_dependencies(graph, node_map, &mut output);
    }

    output.relationships = dedup_by_endpoints_and_kind(output.relationships);
    output
}

/// Keeps one edge per `(from, to, kind)`; a later duplicate replaces the
/// earlier one in place.
fn dedup_by_endpoints_and_kind(relationships: Vec<ParsedRelationship>) -> Vec<ParsedRelationship> {
    let mut unique: IndexMap<(ParseRef, ParseRef, String), ParsedRelationship> = IndexMap::new();
    for rel in relationships {
        let key = (rel.from.clone(), rel.to.clone(), rel.metadata.kind.clone());
        unique.insert(key, rel);
    }
    unique.into_values().collect()
}

fn is_import_like(node: &SyntaxNode) -> bool {
    !node.is_virtual()
        && (node.node_type.contains("import") || node.node_type.contains("require"))
}

fn module_dependencies(graph_idx: usize, graph: &FileGraph, output: &mut AnalysisOutput) {
    for (id, node) in &graph.nodes {
        if !is_import_like(node) {
            continue;
        }
        let Some(import_path) = find_import_path(node, graph) else {
            continue;
        };

        let target = output.synthesize(
            graph_idx,
            graph,
            "virtual_module",
            &import_path,
            node.range,
            format!("// module: {import_path}"),
        );
        output.relationships.push(edge(
            RelationshipType::Dependency,
            graph,
            id,
            node,
            target,
            "module_import",
            format!("{} imports {import_path}", graph.file_path),
        ));
    }
}

/// Parser-supplied import source, then a string-literal child, then the
/// `from '...'` / `require('...')` / `import '...'` forms in the node text.
fn find_import_path(node: &SyntaxNode, graph: &FileGraph) -> Option<String> {
    if let Some(source) = node.metadata.import_source.as_deref() {
        let source = unquote(source);
        if !source.is_empty() {
            return Some(source.to_string());
        }
    }

    let literal = graph
        .children_of(node)
        .map(|(_, child)| child)
        .filter(|child| is_string_like(&child.node_type))
        .find_map(|child| {
            let raw = if child.text().is_empty() { child.name.as_str() } else { child.text() };
            let value = unquote(raw);
            (!value.is_empty()).then(|| value.to_string())
        });
    if literal.is_some() {
        return literal;
    }

    let text = node.text();
    capture(&FROM_CLAUSE, r#"from\s+['"]([^'"]+)['"]"#, text, 1)
        .or_else(|| capture(&REQUIRE_CALL, r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#, text, 1))
        .or_else(|| capture(&BARE_IMPORT, r#"^\s*import\s+['"]([^'"]+)['"]"#, text, 1))
}

fn interface_property_dependencies(graph: &FileGraph, node_map: &NodeMap<'_>, output: &mut AnalysisOutput) {
    for (id, node) in &graph.nodes {
        if node.node_type != "interface_declaration" {
            continue;
        }
        for (_, property) in property_signatures(graph, node) {
            let Some(type_name) = property_type(property, graph) else {
                continue;
            };
            let Some(target) = resolve_type(&type_name, graph, id, node_map) else {
                continue;
            };
            output.relationships.push(edge(
                RelationshipType::Dependency,
                graph,
                id,
                property,
                target,
                "interface_property_type",
                format!(
                    "property {} of interface {} depends on type {type_name}",
                    property.name, node.name
                ),
            ));
        }
    }
}

/// Property signatures declared by `interface`, looking through an
/// intermediate body node when the parser emits one.
fn property_signatures<'a>(graph: &'a FileGraph, interface: &'a SyntaxNode) -> Vec<(&'a str, &'a SyntaxNode)> {
    let mut found = Vec::new();
    for (child_id, child) in graph.children_of(interface) {
        if child.node_type == "property_signature" {
            found.push((child_id, child));
        } else if child.node_type.contains("body") || child.node_type == "object_type" {
            found.extend(
                graph
                    .children_of(child)
                    .filter(|(_, grandchild)| grandchild.node_type == "property_signature"),
            );
        }
    }
    found
}

fn property_type(property: &SyntaxNode, graph: &FileGraph) -> Option<String> {
    let (_, annotation) = graph
        .children_of(property)
        .find(|(_, child)| child.node_type.contains("type"))?;

    if is_identifier_like(&annotation.node_type) && annotation.has_name() {
        return Some(annotation.name.clone());
    }
    find_descendant(graph, annotation, |n| is_identifier_like(&n.node_type) && n.has_name())
        .map(|(_, ident)| ident.name.clone())
        .or_else(|| type_name_from_text(annotation.text()))
}

fn signature_dependencies(graph: &FileGraph, node_map: &NodeMap<'_>, output: &mut AnalysisOutput) {
    for (id, node) in &graph.nodes {
        if !matches!(
            node.node_type.as_str(),
            "function_declaration" | "method_definition" | "arrow_function"
        ) {
            continue;
        }
        let function_name = if node.has_name() { node.name.as_str() } else { "<anonymous>" };

        for type_name in parameter_types(node, graph) {
            if let Some(target) = resolve_type(&type_name, graph, id, node_map) {
                output.relationships.push(edge(
                    RelationshipType::Dependency,
                    graph,
                    id,
                    node,
                    target,
                    "parameter_type",
                    format!("parameters of {function_name} depend on type {type_name}"),
                ));
            }
        }

        if let Some(type_name) = return_type(node, graph) {
            if let Some(target) = resolve_type(&type_name, graph, id, node_map) {
                output.relationships.push(edge(
                    RelationshipType::Dependency,
                    graph,
                    id,
                    node,
                    target,
                    "return_type",
                    format!("return value of {function_name} depends on type {type_name}"),
                ));
            }
        }
    }
}

fn parameter_types(function: &SyntaxNode, graph: &FileGraph) -> Vec<String> {
    let Some((_, parameters)) = graph.children_of(function).find(|(_, child)| {
        child.node_type == "formal_parameters" || child.node_type.contains("parameter")
    }) else {
        return Vec::new();
    };

    graph
        .children_of(parameters)
        .filter(|(_, param)| param.node_type.contains("parameter"))
        .filter_map(|(_, param)| {
            let (_, annotation) = graph
                .children_of(param)
                .find(|(_, child)| child.node_type.contains("type"))?;
            annotation_type_name(annotation, graph)
        })
        .collect()
}

fn return_type(function: &SyntaxNode, graph: &FileGraph) -> Option<String> {
    let (_, annotation) = graph.children_of(function).find(|(_, child)| {
        child.node_type == "return_type"
            || (child.node_type.contains("return") && child.node_type.contains("type"))
    })?;
    annotation_type_name(annotation, graph)
}

fn annotation_type_name(annotation: &SyntaxNode, graph: &FileGraph) -> Option<String> {
    if annotation.has_name() {
        return type_name_from_text(&annotation.name);
    }
    type_name_from_text(annotation.text()).or_else(|| {
        find_descendant(graph, annotation, |n| is_identifier_like(&n.node_type) && n.has_name())
            .map(|(_, ident)| ident.name.clone())
    })
}

/// Leading type identifier of an annotation such as `: User[]`.
fn type_name_from_text(text: &str) -> Option<String> {
    capture(&TYPE_NAME, r"^[\s:]*([A-Za-z_$][A-Za-z0-9_$]*)", text, 1)
}

fn resolve_type(type_name: &str, graph: &FileGraph, from_id: &str, node_map: &NodeMap<'_>) -> Option<ParseRef> {
    let found = node_map.find_declared(type_name, TYPE_DECLARATIONS)?;
    if found.graph.file_path == graph.file_path && found.id == from_id {
        return None;
    }
    Some(found.to_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::graph;

    fn run(graphs: &[FileGraph]) -> AnalysisOutput {
        let map = NodeMap::build(graphs);
        analyze(graphs, &map)
    }

    #[test]
    fn string_literal_child_wins_over_text() {
        let graphs = vec![graph("/repo/src/a.ts", "typescript", vec![
            (
                "1",
                SyntaxNode::new("import_statement", "")
                    .with_children(["2"])
                    .with_text("import { x } from './other'"),
            ),
            ("2", SyntaxNode::new("string", "").with_text("'./util'")),
        ])];

        let output = run(&graphs);
        assert_eq!(output.relationships.len(), 1);
        assert_eq!(output.relationships[0].kind(), "module_import");
        assert_eq!(output.virtual_nodes[0].node.node_type, "virtual_module");
        assert_eq!(output.virtual_nodes[0].node.name, "./util");
    }

    #[test]
    fn require_text_is_a_fallback() {
        let graphs = vec![graph("/repo/src/a.js", "javascript", vec![(
            "1",
            SyntaxNode::new("require_call", "").with_text("const fs = require( 'fs' )"),
        )])];

        let output = run(&graphs);
        assert_eq!(output.virtual_nodes.len(), 1);
        assert_eq!(output.virtual_nodes[0].node.name, "fs");
    }

    #[test]
    fn import_without_path_is_skipped() {
        let graphs = vec![graph("/repo/src/a.ts", "typescript", vec![(
            "1",
            SyntaxNode::new("import_specifier", "x").with_text("x"),
        )])];
        let output = run(&graphs);
        assert!(output.relationships.is_empty());
        assert!(output.virtual_nodes.is_empty());
    }

    #[test]
    fn interface_property_types_resolve_across_files() {
        let graphs = vec![
            graph("/repo/src/user.ts", "typescript", vec![
                ("1", SyntaxNode::new("interface_declaration", "User")),
            ]),
            graph("/repo/src/order.ts", "typescript", vec![
                ("1", SyntaxNode::new("interface_declaration", "Order").with_children(["2"])),
                ("2", SyntaxNode::new("object_type", "").with_children(["3"])),
                ("3", SyntaxNode::new("property_signature", "owner").with_children(["4"])),
                ("4", SyntaxNode::new("type_annotation", "").with_children(["5"])),
                ("5", SyntaxNode::new("type_identifier", "User")),
            ]),
        ];

        let output = run(&graphs);
        let rel = output
            .relationships
            .iter()
            .find(|r| r.kind() == "interface_property_type")
            .expect("property dependency");
        assert_eq!(rel.from, ParseRef::new("/repo/src/order.ts", "1"));
        assert_eq!(rel.to, ParseRef::new("/repo/src/user.ts", "1"));
    }

    #[test]
    fn parameter_and_return_types_are_deduplicated() {
        let graphs = vec![graph("/repo/src/svc.ts", "typescript", vec![
            ("1", SyntaxNode::new("interface_declaration", "User")),
            (
                "2",
                SyntaxNode::new("function_declaration", "merge").with_children(["3", "6"]),
            ),
            ("3", SyntaxNode::new("formal_parameters", "").with_children(["4", "5"])),
            ("4", SyntaxNode::new("required_parameter", "a").with_children(["7"])),
            ("5", SyntaxNode::new("required_parameter", "b").with_children(["8"])),
            ("6", SyntaxNode::new("return_type", "").with_text(": User")),
            ("7", SyntaxNode::new("type_annotation", "").with_text(": User")),
            ("8", SyntaxNode::new("type_annotation", "").with_text(": User")),
        ])];

        let output = run(&graphs);
        let kinds: Vec<&str> = output.relationships.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec!["parameter_type", "return_type"]);
        for rel in &output.relationships {
            assert_eq!(rel.to, ParseRef::new("/repo/src/svc.ts", "1"));
        }
    }

    #[test]
    fn colliding_parse_ids_in_different_files_are_not_merged() {
        let graphs = vec![
            graph("/repo/src/a.ts", "typescript", vec![(
                "1",
                SyntaxNode::new("import_statement", "").with_text("import a from './x'"),
            )]),
            graph("/repo/src/b.ts", "typescript", vec![(
                "1",
                SyntaxNode::new("import_statement", "").with_text("import b from './x'"),
            )]),
        ];
        assert_eq!(run(&graphs).relationships.len(), 2);
    }
}

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::{
    capture, edge, find_descendant, identifier_text, is_class_like, is_identifier_like,
    AnalysisOutput, NodeMap,
};
use crate::models::{FileGraph, ParseRef, RelationshipType, SyntaxNode};

static CLAUSE_EXTENDS: OnceLock<Option<Regex>> = OnceLock::new();
static HEADER_EXTENDS: OnceLock<Option<Regex>> = OnceLock::new();

const CLASS_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "class",
    "class_definition",
    "abstract_class_declaration",
];
const INTERFACE_DECLARATIONS: &[&str] = &["interface_declaration"];

#[derive(Clone, Copy)]
enum Declaration {
    Class,
    Interface,
}

impl Declaration {
    fn of(node: &SyntaxNode) -> Option<Self> {
        if node.node_type == "interface_declaration" {
            Some(Self::Interface)
        } else if is_class_like(&node.node_type) {
            Some(Self::Class)
        } else {
            None
        }
    }

    fn matches(&self, node: &SyntaxNode) -> bool {
        match self {
            Self::Class => is_class_like(&node.node_type),
            Self::Interface => node.node_type == "interface_declaration",
        }
    }

    fn lookup_types(&self) -> &'static [&'static str] {
        match self {
            Self::Class => CLASS_DECLARATIONS,
            Self::Interface => INTERFACE_DECLARATIONS,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Class => "class_extends",
            Self::Interface => "interface_extends",
        }
    }

    fn virtual_type(&self) -> &'static str {
        match self {
            Self::Class => "virtual_class",
            Self::Interface => "virtual_interface",
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
        }
    }
}

pub(super) fn analyze(graphs: &[FileGraph], node_map: &NodeMap<'_>) -> AnalysisOutput {
    let mut output = AnalysisOutput::default();

    for (graph_idx, graph) in graphs.iter().enumerate() {
        for (id, node) in &graph.nodes {
            let Some(declaration) = Declaration::of(node) else {
                continue;
            };
            let Some(parent_name) = find_extends(node, graph) else {
                continue;
            };

            let target = resolve_parent(graph, id, &parent_name, declaration, node_map)
                .unwrap_or_else(|| {
                    debug!(
                        file = %graph.file_path,
                        parent = %parent_name,
                        "synthesizing virtual parent"
                    );
                    output.synthesize(
                        graph_idx,
                        graph,
                        declaration.virtual_type(),
                        &parent_name,
                        node.range,
                        format!("{} {parent_name} {{}}", declaration.keyword()),
                    )
                });

            let child_name = if node.has_name() { node.name.as_str() } else { "<anonymous>" };
            output.relationships.push(edge(
                RelationshipType::Inheritance,
                graph,
                id,
                node,
                target,
                declaration.kind(),
                format!("{} {child_name} extends {parent_name}", declaration.keyword()),
            ));
        }
    }

    output
}

/// Same-file declaration first, then any declaration known to the node map.
fn resolve_parent(
    graph: &FileGraph,
    child_id: &str,
    parent_name: &str,
    declaration: Declaration,
    node_map: &NodeMap<'_>,
) -> Option<ParseRef> {
    let same_file = graph.nodes.iter().find(|(id, candidate)| {
        id.as_str() != child_id && candidate.name == parent_name && declaration.matches(candidate)
    });
    if let Some((id, _)) = same_file {
        return Some(ParseRef::new(graph.file_path.clone(), id.clone()));
    }

    node_map
        .find_declared(parent_name, declaration.lookup_types())
        .filter(|found| declaration.matches(found.node))
        .filter(|found| !(found.graph.file_path == graph.file_path && found.id == child_id))
        .map(|found| found.to_ref())
}

/// Name of the extended type: structural heritage clause first, then the
/// clause text, then the declaration header text.
fn find_extends(node: &SyntaxNode, graph: &FileGraph) -> Option<String> {
    let clause = graph
        .children_of(node)
        .map(|(_, child)| child)
        .find(|child| is_heritage_clause(child));

    if let Some(clause) = clause {
        let structural = find_descendant(graph, clause, |n| {
            is_identifier_like(&n.node_type) && n.name != "extends"
        })
        .and_then(|(_, ident)| identifier_text(ident));
        if structural.is_some() {
            return structural;
        }

        let textual = capture(&CLAUSE_EXTENDS, r"extends\s+([A-Za-z0-9_$]+)", clause.text(), 1);
        if textual.is_some() {
            return textual;
        }
    }

    capture(
        &HEADER_EXTENDS,
        r"^[^{]*?\bextends\s+([A-Za-z0-9_$]+)",
        node.text(),
        1,
    )
}

fn is_heritage_clause(node: &SyntaxNode) -> bool {
    matches!(
        node.node_type.as_str(),
        "extends_clause" | "extends" | "heritage_clause" | "class_heritage" | "extends_type_clause"
    ) || node.name == "extends"
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
    fn structural_clause_resolves_same_file_parent() {
        let graphs = vec![graph("/repo/src/shapes.ts", "typescript", vec![
            (
                "1",
                SyntaxNode::new("class_declaration", "Square")
                    .with_children(["2"])
                    .with_text("class Square extends Shape {}"),
            ),
            ("2", SyntaxNode::new("class_heritage", "").with_children(["3"])),
            ("3", SyntaxNode::new("extends_clause", "").with_children(["4"])),
            ("4", SyntaxNode::new("identifier", "Shape")),
            ("5", SyntaxNode::new("class_declaration", "Shape").with_text("class Shape {}")),
        ])];

        let output = run(&graphs);
        assert!(output.virtual_nodes.is_empty());
        assert_eq!(output.relationships.len(), 1);

        let rel = &output.relationships[0];
        assert_eq!(rel.kind(), "class_extends");
        assert_eq!(rel.from, ParseRef::new("/repo/src/shapes.ts", "1"));
        assert_eq!(rel.to, ParseRef::new("/repo/src/shapes.ts", "5"));
        assert_eq!(
            rel.metadata.source_code.as_deref(),
            Some("class Square extends Shape {}")
        );
    }

    #[test]
    fn clause_text_is_used_when_no_identifier_child() {
        let graphs = vec![graph("/repo/src/a.js", "javascript", vec![
            ("1", SyntaxNode::new("class_declaration", "Button").with_children(["2"])),
            ("2", SyntaxNode::new("class_heritage", "").with_text("extends BaseButton")),
        ])];

        let output = run(&graphs);
        assert_eq!(output.relationships.len(), 1);
        assert_eq!(output.virtual_nodes.len(), 1);
        let virtual_node = &output.virtual_nodes[0];
        assert_eq!(virtual_node.node.node_type, "virtual_class");
        assert_eq!(virtual_node.node.name, "BaseButton");
        assert_eq!(output.relationships[0].to.node_id, virtual_node.id);
    }

    #[test]
    fn header_regex_ignores_nested_bodies() {
        let graphs = vec![graph("/repo/src/a.ts", "typescript", vec![(
            "1",
            SyntaxNode::new("class_declaration", "Outer")
                .with_text("class Outer { build() { return class extends Inner {} } }"),
        )])];
        assert!(run(&graphs).relationships.is_empty());
    }

    #[test]
    fn cross_file_parent_resolves_through_node_map() {
        let graphs = vec![
            graph("/repo/src/base.ts", "typescript", vec![
                ("1", SyntaxNode::new("class_declaration", "Base")),
            ]),
            graph("/repo/src/impl.ts", "typescript", vec![(
                "1",
                SyntaxNode::new("class_declaration", "Impl").with_text("class Impl extends Base {}"),
            )]),
        ];

        let output = run(&graphs);
        assert!(output.virtual_nodes.is_empty());
        assert_eq!(output.relationships[0].to, ParseRef::new("/repo/src/base.ts", "1"));
    }

    #[test]
    fn interfaces_fall_back_to_virtual_interface() {
        let graphs = vec![graph("/repo/src/types.ts", "typescript", vec![(
            "1",
            SyntaxNode::new("interface_declaration", "Admin")
                .with_text("interface Admin extends Person { role: string }"),
        )])];

        let output = run(&graphs);
        assert_eq!(output.relationships.len(), 1);
        assert_eq!(output.relationships[0].kind(), "interface_extends");
        assert_eq!(output.virtual_nodes[0].node.node_type, "virtual_interface");
        assert_eq!(output.virtual_nodes[0].node.text(), "interface Person {}");
    }

    #[test]
    fn class_without_heritage_emits_nothing() {
        let graphs = vec![graph("/repo/src/a.ts", "typescript", vec![(
            "1",
            SyntaxNode::new("class_declaration", "Plain").with_text("class Plain {}"),
        )])];
        let output = run(&graphs);
        assert!(output.relationships.is_empty());
        assert!(output.virtual_nodes.is_empty());
    }
}

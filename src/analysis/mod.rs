//! Heuristic cross-file relationship inference.
//!
//! Every analyzer reads the same immutable set of [`FileGraph`]s plus a
//! [`NodeMap`] built once per run. Analyzers never touch the graphs; any
//! placeholder node they need comes back in [`AnalysisOutput::virtual_nodes`]
//! and is merged by [`analyze`] after the whole pipeline ran.

mod call;
mod dependency;
mod inheritance;
pub mod similarity;
mod style;

use std::{
    collections::{HashMap, HashSet},
    sync::OnceLock,
};

use regex::Regex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    FileGraph, NodeId, ParseRef, ParsedRelationship, Relationship, RelationshipMetadata,
    RelationshipPosition, RelationshipType, SourceRange, SyntaxNode,
};

pub use similarity::are_names_similar;

#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    pub graph: &'a FileGraph,
    pub id: &'a str,
    pub node: &'a SyntaxNode,
}

impl Located<'_> {
    pub fn to_ref(&self) -> ParseRef {
        ParseRef::new(self.graph.file_path.clone(), self.id)
    }
}

/// Session lookup keyed by node name and by `type:name`. Later entries
/// replace earlier ones under the same key.
#[derive(Debug)]
pub struct NodeMap<'a> {
    graphs: &'a [FileGraph],
    entries: HashMap<String, (usize, &'a str)>,
}

impl<'a> NodeMap<'a> {
    pub fn build(graphs: &'a [FileGraph]) -> Self {
        let mut entries = HashMap::new();
        for (graph_idx, graph) in graphs.iter().enumerate() {
            for (id, node) in &graph.nodes {
                if !node.has_name() {
                    continue;
                }
                entries.insert(node.name.clone(), (graph_idx, id.as_str()));
                entries.insert(
                    format!("{}:{}", node.node_type, node.name),
                    (graph_idx, id.as_str()),
                );
            }
        }
        Self { graphs, entries }
    }

    pub fn get(&self, key: &str) -> Option<Located<'a>> {
        let (graph_idx, id) = *self.entries.get(key)?;
        let graph = &self.graphs[graph_idx];
        let node = graph.nodes.get(id)?;
        Some(Located { graph, id, node })
    }

    /// Looks `name` up under each `type:name` key in order, then under the
    /// bare name.
    pub fn find_declared(&self, name: &str, declaration_types: &[&str]) -> Option<Located<'a>> {
        declaration_types
            .iter()
            .find_map(|ty| self.get(&format!("{ty}:{name}")))
            .or_else(|| self.get(name))
    }

    pub fn graphs(&self) -> &'a [FileGraph] {
        self.graphs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualNode {
    pub graph: usize,
    pub id: NodeId,
    pub node: SyntaxNode,
}

#[derive(Debug, Default)]
pub struct AnalysisOutput {
    pub relationships: Vec<ParsedRelationship>,
    pub virtual_nodes: Vec<VirtualNode>,
}

impl AnalysisOutput {
    /// Records a virtual node owned by `graphs[graph_idx]` and returns a
    /// reference to it.
    fn synthesize(
        &mut self,
        graph_idx: usize,
        graph: &FileGraph,
        node_type: &str,
        name: &str,
        range: SourceRange,
        text: String,
    ) -> ParseRef {
        let id = format!("{node_type}_{}", Uuid::new_v4().simple());
        let node = SyntaxNode::new(node_type, name)
            .with_range(range)
            .with_text(text);
        self.virtual_nodes.push(VirtualNode {
            graph: graph_idx,
            id: id.clone(),
            node,
        });
        ParseRef::new(graph.file_path.clone(), id)
    }
}

/// The fixed analyzer pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    Inheritance,
    Dependency,
    Call,
    Style,
}

impl Analyzer {
    pub const PIPELINE: [Analyzer; 4] = [
        Self::Inheritance,
        Self::Dependency,
        Self::Call,
        Self::Style,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Inheritance => "inheritance",
            Self::Dependency => "dependency",
            Self::Call => "call",
            Self::Style => "style",
        }
    }

    pub fn run(&self, graphs: &[FileGraph], node_map: &NodeMap<'_>) -> AnalysisOutput {
        match self {
            Self::Inheritance => inheritance::analyze(graphs, node_map),
            Self::Dependency => dependency::analyze(graphs, node_map),
            Self::Call => call::analyze(graphs, node_map),
            Self::Style => style::analyze(graphs, node_map),
        }
    }
}

#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub relationships: Vec<ParsedRelationship>,
    pub virtual_nodes: usize,
}

/// Runs every analyzer over `graphs`, then merges the synthesized virtual
/// nodes into their owning graphs. Relationships are concatenated in
/// pipeline order without cross-analyzer deduplication.
pub fn analyze(graphs: &mut [FileGraph]) -> AnalysisReport {
    let mut relationships = Vec::new();
    let mut virtual_nodes = Vec::new();

    {
        let node_map = NodeMap::build(graphs);
        debug!(graphs = graphs.len(), keys = node_map.len(), "node map built");

        for analyzer in Analyzer::PIPELINE {
            let output = analyzer.run(graphs, &node_map);
            info!(
                analyzer = analyzer.name(),
                relationships = output.relationships.len(),
                virtual_nodes = output.virtual_nodes.len(),
                "analyzer finished"
            );
            relationships.extend(output.relationships);
            virtual_nodes.extend(output.virtual_nodes);
        }
    }

    let synthesized = virtual_nodes.len();
    for virtual_node in virtual_nodes {
        if let Some(graph) = graphs.get_mut(virtual_node.graph) {
            graph.nodes.insert(virtual_node.id, virtual_node.node);
        }
    }

    info!(
        relationships = relationships.len(),
        virtual_nodes = synthesized,
        "relationship analysis complete"
    );

    AnalysisReport {
        relationships,
        virtual_nodes: synthesized,
    }
}

fn edge(
    relationship_type: RelationshipType,
    graph: &FileGraph,
    from_id: &str,
    node: &SyntaxNode,
    to: ParseRef,
    kind: &str,
    description: String,
) -> ParsedRelationship {
    let attribution = graph.attribution();
    Relationship {
        relationship_type,
        from: ParseRef::new(graph.file_path.clone(), from_id),
        to,
        metadata: RelationshipMetadata {
            kind: kind.to_string(),
            path: Some(graph.file_path.clone()),
            source_code: Some(node.text().to_string()),
            project_name: Some(attribution.project_name),
            file_name: Some(attribution.file_name),
            position: Some(RelationshipPosition {
                line: node.range.start.row,
                column: node.range.start.column,
            }),
            description: Some(description),
        },
    }
}

fn is_class_like(node_type: &str) -> bool {
    if node_type.starts_with("virtual_") {
        return false;
    }
    match node_type {
        "class_declaration" | "class" | "class.declaration" | "class_definition"
        | "abstract_class_declaration" => true,
        "class_selector" | "class_body" | "class_heritage" => false,
        other => {
            other.contains("class") && (other.contains("declaration") || other.contains("definition"))
        }
    }
}

fn is_identifier_like(node_type: &str) -> bool {
    node_type.contains("identifier")
        || matches!(node_type, "type_reference" | "class_name" | "name" | "method_name" | "function_name")
}

fn is_string_like(node_type: &str) -> bool {
    node_type.contains("string")
}

/// Identifier text of `node`: its name, else its raw text.
fn identifier_text(node: &SyntaxNode) -> Option<String> {
    let value = if node.has_name() {
        node.name.trim()
    } else {
        node.text().trim()
    };
    (!value.is_empty()).then(|| value.to_string())
}

/// Depth-first search below `start` (exclusive) for the first node that
/// satisfies `pred`. Cycles in child lists are tolerated.
fn find_descendant<'a, F>(graph: &'a FileGraph, start: &'a SyntaxNode, pred: F) -> Option<(&'a str, &'a SyntaxNode)>
where
    F: Fn(&SyntaxNode) -> bool,
{
    let mut visited = HashSet::new();
    let mut stack: Vec<&str> = start.children.iter().rev().map(String::as_str).collect();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some((key, node)) = graph.nodes.get_key_value(id) else {
            continue;
        };
        if pred(node) {
            return Some((key.as_str(), node));
        }
        stack.extend(node.children.iter().rev().map(String::as_str));
    }
    None
}

fn unquote(raw: &str) -> &str {
    let trimmed = raw.trim();
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

fn capture(lock: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str, group: usize) -> Option<String> {
    lock.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()?
        .captures(text)?
        .get(group)
        .map(|m| m.as_str().to_string())
}

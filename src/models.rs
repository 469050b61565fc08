use std::{fmt, path::Path, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type NodeId = String;

pub const SCRIPT_LANGUAGES: &[&str] = &["javascript", "typescript", "jsx", "tsx"];
pub const STYLESHEET_LANGUAGES: &[&str] = &["css", "scss", "less"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_type: Option<String>,
}

/// One element of the uniform node model produced by the external parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub range: SourceRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl SyntaxNode {
    pub fn new(node_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.metadata.node_text = Some(text.into());
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_range(mut self, range: SourceRange) -> Self {
        self.range = range;
        self
    }

    pub fn text(&self) -> &str {
        self.metadata.node_text.as_deref().unwrap_or_default()
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn is_virtual(&self) -> bool {
        self.node_type.starts_with("virtual_")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGraph {
    pub nodes: IndexMap<NodeId, SyntaxNode>,
    #[serde(default)]
    pub root_nodes: Vec<NodeId>,
    pub language: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
}

impl FileGraph {
    pub fn new(file_path: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            language: language.into(),
            ..Self::default()
        }
    }

    pub fn node(&self, id: &str) -> Option<&SyntaxNode> {
        self.nodes.get(id)
    }

    /// Children of `node` that exist in this graph, in declared order.
    pub fn children_of<'a>(
        &'a self,
        node: &'a SyntaxNode,
    ) -> impl Iterator<Item = (&'a str, &'a SyntaxNode)> + 'a {
        node.children
            .iter()
            .filter_map(move |id| self.nodes.get_key_value(id.as_str()))
            .map(|(id, child)| (id.as_str(), child))
    }

    pub fn is_script(&self) -> bool {
        SCRIPT_LANGUAGES.contains(&self.language.as_str())
    }

    pub fn is_stylesheet(&self) -> bool {
        STYLESHEET_LANGUAGES.contains(&self.language.as_str())
    }

    pub fn attribution(&self) -> Attribution {
        let file = Path::new(&self.file_path);
        let project_path = self.project_path.clone().unwrap_or_else(|| {
            file.parent()
                .and_then(Path::parent)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default()
        });
        let project_name = base_name(&project_path);
        let file_name = base_name(&self.file_path);
        let relative_path = self.relative_path.clone().unwrap_or_else(|| {
            file.strip_prefix(&project_path)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| self.file_path.clone())
        });

        Attribution {
            project_name,
            project_path,
            file_name,
            relative_path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    pub project_name: String,
    pub project_path: String,
    pub file_name: String,
    pub relative_path: String,
}

pub fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Coarse,
    #[default]
    Medium,
    Fine,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coarse => "coarse",
            Self::Medium => "medium",
            Self::Fine => "fine",
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coarse" => Ok(Self::Coarse),
            "medium" => Ok(Self::Medium),
            "fine" => Ok(Self::Fine),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

/// A syntax node enriched with tokens and attribution, as held by the
/// indexer and the node table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedNode {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub range: SourceRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub metadata: NodeMetadata,
    pub language: String,
    pub file_path: String,
    pub tokens: Vec<String>,
    pub project_name: String,
    pub project_path: String,
    pub file_name: String,
    pub relative_path: String,
    pub content: String,
    pub granularity: Granularity,
}

impl IndexedNode {
    pub fn from_syntax(
        id: &str,
        node: &SyntaxNode,
        graph: &FileGraph,
        attribution: &Attribution,
        tokens: Vec<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            node_id: None,
            node_type: node.node_type.clone(),
            name: node.name.clone(),
            range: node.range,
            parent_id: node.parent.clone(),
            children: node.children.clone(),
            metadata: node.metadata.clone(),
            language: graph.language.clone(),
            file_path: graph.file_path.clone(),
            tokens,
            project_name: attribution.project_name.clone(),
            project_path: attribution.project_path.clone(),
            file_name: attribution.file_name.clone(),
            relative_path: attribution.relative_path.clone(),
            content: node.text().to_string(),
            granularity: Granularity::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    Inheritance,
    Dependency,
    Call,
    Style,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 4] = [
        Self::Inheritance,
        Self::Dependency,
        Self::Call,
        Self::Style,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inheritance => "inheritance",
            Self::Dependency => "dependency",
            Self::Call => "call",
            Self::Style => "style",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inheritance" => Ok(Self::Inheritance),
            "dependency" => Ok(Self::Dependency),
            "call" => Ok(Self::Call),
            "style" => Ok(Self::Style),
            other => Err(format!("unknown relationship type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipPosition {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMetadata {
    #[serde(default = "unknown_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<RelationshipPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for RelationshipMetadata {
    fn default() -> Self {
        Self {
            kind: unknown_kind(),
            path: None,
            source_code: None,
            project_name: None,
            file_name: None,
            position: None,
            description: None,
        }
    }
}

fn unknown_kind() -> String {
    "unknown".to_string()
}

/// Endpoint of a relationship before persistence: the owning file plus the
/// parse-time node id, which is only unique within that file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRef {
    pub file_path: String,
    pub node_id: NodeId,
}

impl ParseRef {
    pub fn new(file_path: impl Into<String>, node_id: impl Into<NodeId>) -> Self {
        Self {
            file_path: file_path.into(),
            node_id: node_id.into(),
        }
    }
}

/// Typed edge between two nodes. `E` fixes the identity space of both
/// endpoints: [`ParseRef`] before persistence, durable ids after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship<E = NodeId> {
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub from: E,
    pub to: E,
    #[serde(default)]
    pub metadata: RelationshipMetadata,
}

pub type ParsedRelationship = Relationship<ParseRef>;

impl<E> Relationship<E> {
    pub fn map_endpoints<T, F>(self, mut f: F) -> Relationship<T>
    where
        F: FnMut(E) -> T,
    {
        Relationship {
            relationship_type: self.relationship_type,
            from: f(self.from),
            to: f(self.to),
            metadata: self.metadata,
        }
    }

    pub fn kind(&self) -> &str {
        &self.metadata.kind
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRelationship {
    pub id: String,
    #[serde(flatten)]
    pub relationship: Relationship<NodeId>,
}

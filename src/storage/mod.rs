//! SQLite persistence for nodes and relationships.
//!
//! Both tables are keyed by storage-minted ids. Importing a project writes
//! every node, then every relationship, inside one transaction.

mod nodes;
mod relationships;

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{CoreError, CoreResult},
    indexer::tokenize,
    models::{
        FileGraph, Granularity, IndexedNode, ParseRef, ParsedRelationship, StoredRelationship,
    },
};

pub use nodes::SnippetQuery;
pub use relationships::{RelationshipFilter, RelationshipStats};

const SCHEMA: &str = "
    PRAGMA foreign_keys = OFF;
    CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY,
        node_id TEXT,
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        content TEXT NOT NULL,
        language TEXT NOT NULL,
        granularity TEXT NOT NULL,
        metadata_json TEXT NOT NULL,
        parent_id TEXT,
        children_json TEXT NOT NULL,
        tokens_json TEXT NOT NULL,
        project_name TEXT NOT NULL,
        project_path TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        relative_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        start_column INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        end_column INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS relationships (
        id TEXT PRIMARY KEY,
        type TEXT NOT NULL,
        from_node TEXT NOT NULL REFERENCES nodes(id),
        to_node TEXT NOT NULL REFERENCES nodes(id),
        kind TEXT NOT NULL,
        source_code TEXT,
        path TEXT,
        line_number INTEGER,
        column_number INTEGER,
        project_name TEXT,
        file_name TEXT,
        metadata_json TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_nodes_node_id ON nodes(node_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_parent_id ON nodes(parent_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(type);
    CREATE INDEX IF NOT EXISTS idx_nodes_project ON nodes(project_name);
    CREATE INDEX IF NOT EXISTS idx_nodes_file_name ON nodes(file_name);
    CREATE INDEX IF NOT EXISTS idx_nodes_relative_path ON nodes(relative_path);
    CREATE INDEX IF NOT EXISTS idx_rel_type ON relationships(type);
    CREATE INDEX IF NOT EXISTS idx_rel_from ON relationships(from_node);
    CREATE INDEX IF NOT EXISTS idx_rel_to ON relationships(to_node);
    CREATE INDEX IF NOT EXISTS idx_rel_kind ON relationships(kind);
    CREATE INDEX IF NOT EXISTS idx_rel_project ON relationships(project_name);
";

/// Owned persistence context. Open one per import or request and close it
/// when done; nothing here is process-global.
#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

#[derive(Debug, Clone, Default)]
pub struct SavedProject {
    pub nodes: Vec<IndexedNode>,
    pub relationships: Vec<StoredRelationship>,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> CoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn reset(&self) -> CoreResult<()> {
        self.conn.execute_batch(
            "
            DROP TABLE IF EXISTS relationships;
            DROP TABLE IF EXISTS nodes;
            ",
        )?;
        self.conn.execute_batch(SCHEMA)?;
        info!("storage tables reset");
        Ok(())
    }

    pub fn close(self) -> CoreResult<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Persists a whole analyzed project atomically.
    ///
    /// Every node gets a fresh durable id, recorded against its
    /// `(file path, parse id)`. Relationships are rewritten through that map
    /// only after all nodes are written; an endpoint missing from the map is
    /// stored as its bare node id. Any failure rolls the whole batch back.
    pub fn save_project_data(
        &self,
        graphs: &[FileGraph],
        relationships: &[ParsedRelationship],
        granularity: Granularity,
    ) -> CoreResult<SavedProject> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = graphs.iter().find(|g| !seen.insert(g.file_path.as_str())) {
            return Err(CoreError::Input(format!(
                "file appears more than once in one import: {}",
                duplicate.file_path
            )));
        }

        let node_count: usize = graphs.iter().map(|g| g.nodes.len()).sum();
        info!(
            graphs = graphs.len(),
            nodes = node_count,
            relationships = relationships.len(),
            "persisting project"
        );

        let tx = self.conn.unchecked_transaction()?;
        match write_project(&tx, graphs, relationships, granularity) {
            Ok(saved) => {
                tx.commit()?;
                info!(
                    nodes = saved.nodes.len(),
                    relationships = saved.relationships.len(),
                    "project committed"
                );
                Ok(saved)
            }
            Err(err) => {
                warn!(error = %err, "project import failed, rolling back");
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// `LIMIT`/`OFFSET` suffix; values past `i64::MAX` are clamped.
fn page_clause(limit: Option<usize>, offset: Option<usize>) -> String {
    let clamp = |v: usize| i64::try_from(v).unwrap_or(i64::MAX);
    match (limit, offset) {
        (Some(limit), offset) => format!(" LIMIT {} OFFSET {}", clamp(limit), clamp(offset.unwrap_or(0))),
        (None, Some(offset)) => format!(" LIMIT -1 OFFSET {}", clamp(offset)),
        (None, None) => String::new(),
    }
}

fn write_project(
    conn: &Connection,
    graphs: &[FileGraph],
    relationships: &[ParsedRelationship],
    granularity: Granularity,
) -> CoreResult<SavedProject> {
    let mut id_map: HashMap<(&str, &str), String> = HashMap::new();
    for graph in graphs {
        for parse_id in graph.nodes.keys() {
            id_map.insert(
                (graph.file_path.as_str(), parse_id.as_str()),
                format!("node_{}", Uuid::new_v4().simple()),
            );
        }
    }

    let mut saved = SavedProject::default();

    for graph in graphs {
        let attribution = graph.attribution();
        let durable = |parse_id: &str| {
            id_map
                .get(&(graph.file_path.as_str(), parse_id))
                .cloned()
                .unwrap_or_else(|| parse_id.to_string())
        };

        for (parse_id, node) in &graph.nodes {
            let mut indexed = IndexedNode::from_syntax(
                &durable(parse_id),
                node,
                graph,
                &attribution,
                tokenize(&node.name),
            );
            indexed.node_id = Some(parse_id.clone());
            indexed.parent_id = node.parent.as_deref().map(durable);
            indexed.children = node.children.iter().map(|c| durable(c)).collect();
            indexed.granularity = granularity;

            nodes::insert_node(conn, &indexed)?;
            saved.nodes.push(indexed);
        }
    }

    let resolve = |endpoint: &ParseRef| {
        id_map
            .get(&(endpoint.file_path.as_str(), endpoint.node_id.as_str()))
            .cloned()
            .unwrap_or_else(|| endpoint.node_id.clone())
    };

    for relationship in relationships {
        let mapped = relationship.clone().map_endpoints(|endpoint| resolve(&endpoint));
        let stored = StoredRelationship {
            id: format!("rel_{}", Uuid::new_v4().simple()),
            relationship: mapped,
        };
        relationships::insert_relationship(conn, &stored)?;
        saved.relationships.push(stored);
    }

    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Position, Relationship, RelationshipMetadata, RelationshipType, SourceRange, SyntaxNode,
    };

    fn range(start: (usize, usize), end: (usize, usize)) -> SourceRange {
        SourceRange {
            start: Position {
                row: start.0,
                column: start.1,
            },
            end: Position {
                row: end.0,
                column: end.1,
            },
        }
    }

    fn graph(path: &str, ids: &[&str]) -> FileGraph {
        let mut graph = FileGraph::new(path, "typescript");
        graph.project_path = Some("/work/shop".to_string());
        for (i, id) in ids.iter().enumerate() {
            graph.nodes.insert(
                id.to_string(),
                SyntaxNode::new("class_declaration", format!("Class{i}"))
                    .with_range(range((i, 2), (i + 1, 1)))
                    .with_text(format!("class Class{i} {{}}")),
            );
        }
        graph
    }

    fn rel(from: ParseRef, to: ParseRef) -> ParsedRelationship {
        Relationship {
            relationship_type: RelationshipType::Inheritance,
            from,
            to,
            metadata: RelationshipMetadata {
                kind: "class_extends".to_string(),
                ..RelationshipMetadata::default()
            },
        }
    }

    #[test]
    fn nodes_round_trip_attribution_and_range() {
        let storage = Storage::open_in_memory().expect("storage");
        let mut graph = graph("/work/shop/src/a.ts", &["1", "2"]);
        graph.nodes.get_mut("2").expect("node").parent = Some("1".to_string());
        graph.nodes.get_mut("1").expect("node").children = vec!["2".to_string()];

        let saved = storage
            .save_project_data(&[graph], &[], Granularity::Fine)
            .expect("save");

        for expected in &saved.nodes {
            let loaded = storage
                .get_node_by_id(&expected.id)
                .expect("lookup")
                .expect("node present");
            assert_eq!(&loaded, expected);
            assert_eq!(loaded.project_name, "shop");
            assert_eq!(loaded.relative_path, "src/a.ts");
            assert_eq!(loaded.granularity, Granularity::Fine);
        }

        let child = &saved.nodes[1];
        assert_eq!(child.range, range((1, 2), (2, 1)));
        assert_eq!(child.parent_id.as_deref(), Some(saved.nodes[0].id.as_str()));
        assert!(child.id.starts_with("node_"));
    }

    #[test]
    fn lookup_falls_back_to_parse_time_id() {
        let storage = Storage::open_in_memory().expect("storage");
        storage
            .save_project_data(&[graph("/work/shop/src/a.ts", &["parse-7"])], &[], Granularity::Medium)
            .expect("save");

        let node = storage
            .get_node_by_id("parse-7")
            .expect("lookup")
            .expect("node present");
        assert_eq!(node.node_id.as_deref(), Some("parse-7"));
        assert!(storage.get_node_by_id("missing").expect("lookup").is_none());
    }

    #[test]
    fn colliding_parse_ids_map_to_their_own_file() {
        let storage = Storage::open_in_memory().expect("storage");
        let graphs = vec![
            graph("/work/shop/src/a.ts", &["1", "2"]),
            graph("/work/shop/src/b.ts", &["1", "2"]),
        ];
        let relationships = vec![
            rel(ParseRef::new("/work/shop/src/a.ts", "1"), ParseRef::new("/work/shop/src/a.ts", "2")),
            rel(ParseRef::new("/work/shop/src/b.ts", "1"), ParseRef::new("/work/shop/src/a.ts", "2")),
        ];

        let saved = storage
            .save_project_data(&graphs, &relationships, Granularity::Medium)
            .expect("save");
        assert_eq!(saved.nodes.len(), 4);

        let stored = storage
            .get_relationships(&RelationshipFilter::default(), None, None)
            .expect("relationships");
        assert_eq!(stored.len(), 2);

        for edge in &stored {
            let from = storage
                .get_node_by_id(&edge.relationship.from)
                .expect("lookup")
                .expect("from resolves");
            let to = storage
                .get_node_by_id(&edge.relationship.to)
                .expect("lookup")
                .expect("to resolves");
            assert_eq!(to.file_path, "/work/shop/src/a.ts");
            assert_eq!(to.node_id.as_deref(), Some("2"));
            assert_eq!(from.node_id.as_deref(), Some("1"));
        }
        assert_eq!(
            storage.get_node_by_id(&stored[1].relationship.from).expect("lookup").expect("node").file_path,
            "/work/shop/src/b.ts"
        );
    }

    #[test]
    fn unmapped_endpoints_pass_through_as_bare_ids() {
        let storage = Storage::open_in_memory().expect("storage");
        let relationships = vec![rel(
            ParseRef::new("/elsewhere.ts", "node_existing"),
            ParseRef::new("/elsewhere.ts", "x"),
        )];
        let saved = storage
            .save_project_data(&[], &relationships, Granularity::Medium)
            .expect("save");
        assert_eq!(saved.relationships[0].relationship.from, "node_existing");
        assert_eq!(saved.relationships[0].relationship.to, "x");
    }

    #[test]
    fn failure_mid_batch_rolls_back_everything() {
        let storage = Storage::open_in_memory().expect("storage");
        storage
            .connection()
            .execute_batch(
                "CREATE TRIGGER fail_third_node BEFORE INSERT ON nodes
                 WHEN (SELECT COUNT(*) FROM nodes) >= 2
                 BEGIN SELECT RAISE(ABORT, 'forced failure'); END;",
            )
            .expect("trigger");

        let graphs = vec![graph("/work/shop/src/a.ts", &["1", "2", "3", "4"])];
        let relationships = vec![rel(
            ParseRef::new("/work/shop/src/a.ts", "1"),
            ParseRef::new("/work/shop/src/a.ts", "2"),
        )];

        let err = storage
            .save_project_data(&graphs, &relationships, Granularity::Medium)
            .expect_err("forced failure");
        assert!(err.to_string().contains("forced failure"));

        for parse_id in ["1", "2", "3", "4"] {
            assert!(storage.get_node_by_id(parse_id).expect("lookup").is_none());
        }
        assert!(storage
            .snippets(&SnippetQuery::default())
            .expect("snippets")
            .is_empty());
        assert_eq!(
            storage
                .count_relationships(&RelationshipFilter::default())
                .expect("count"),
            0
        );
    }

    #[test]
    fn duplicate_file_paths_are_rejected_before_writing() {
        let storage = Storage::open_in_memory().expect("storage");
        let graphs = vec![
            graph("/work/shop/src/a.ts", &["1"]),
            graph("/work/shop/src/b.ts", &["1"]),
            graph("/work/shop/src/a.ts", &["1"]),
        ];

        let err = storage
            .save_project_data(&graphs, &[], Granularity::Medium)
            .expect_err("duplicate file");
        assert!(matches!(err, CoreError::Input(_)));
        assert!(err.is_client_error());
        assert!(storage
            .snippets(&SnippetQuery::default())
            .expect("snippets")
            .is_empty());
    }

    #[test]
    fn page_clause_clamps_oversized_values() {
        assert_eq!(page_clause(None, None), "");
        assert_eq!(page_clause(Some(5), None), " LIMIT 5 OFFSET 0");
        assert_eq!(page_clause(None, Some(3)), " LIMIT -1 OFFSET 3");
        assert_eq!(
            page_clause(Some(usize::MAX), Some(usize::MAX)),
            format!(" LIMIT {} OFFSET {}", i64::MAX, i64::MAX)
        );
    }

    #[test]
    fn reset_clears_both_tables() {
        let storage = Storage::open_in_memory().expect("storage");
        let graphs = vec![graph("/work/shop/src/a.ts", &["1", "2"])];
        let relationships = vec![rel(
            ParseRef::new("/work/shop/src/a.ts", "1"),
            ParseRef::new("/work/shop/src/a.ts", "2"),
        )];
        storage
            .save_project_data(&graphs, &relationships, Granularity::Medium)
            .expect("save");

        storage.reset().expect("reset");
        assert!(storage.snippets(&SnippetQuery::default()).expect("snippets").is_empty());
        assert_eq!(
            storage.count_relationships(&RelationshipFilter::default()).expect("count"),
            0
        );
        storage.close().expect("close");
    }
}

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{page_clause, Storage};
use crate::{
    error::CoreResult,
    models::{IndexedNode, Position, SourceRange},
};

const NODE_COLUMNS: &str = "id,node_id,type,name,content,language,granularity,metadata_json,parent_id,children_json,tokens_json,project_name,project_path,file_name,file_path,relative_path,start_line,start_column,end_line,end_column";

/// Filters for searching persisted nodes. String filters marked as
/// substring use `LIKE '%…%'`; the others are exact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetQuery {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

pub(super) fn insert_node(conn: &Connection, node: &IndexedNode) -> CoreResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO nodes({NODE_COLUMNS}) VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)"
        ),
        params![
            node.id,
            node.node_id,
            node.node_type,
            node.name,
            node.content,
            node.language,
            node.granularity.as_str(),
            serde_json::to_string(&node.metadata)?,
            node.parent_id,
            serde_json::to_string(&node.children)?,
            serde_json::to_string(&node.tokens)?,
            node.project_name,
            node.project_path,
            node.file_name,
            node.file_path,
            node.relative_path,
            node.range.start.row as i64,
            node.range.start.column as i64,
            node.range.end.row as i64,
            node.range.end.column as i64,
        ],
    )?;
    Ok(())
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<IndexedNode> {
    let metadata_json: String = row.get(7)?;
    let children_json: String = row.get(9)?;
    let tokens_json: String = row.get(10)?;
    let granularity: String = row.get(6)?;

    Ok(IndexedNode {
        id: row.get(0)?,
        node_id: row.get(1)?,
        node_type: row.get(2)?,
        name: row.get(3)?,
        content: row.get(4)?,
        language: row.get(5)?,
        granularity: granularity.parse().unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        parent_id: row.get(8)?,
        children: serde_json::from_str(&children_json).unwrap_or_default(),
        tokens: serde_json::from_str(&tokens_json).unwrap_or_default(),
        project_name: row.get(11)?,
        project_path: row.get(12)?,
        file_name: row.get(13)?,
        file_path: row.get(14)?,
        relative_path: row.get(15)?,
        range: SourceRange {
            start: Position {
                row: row.get::<_, i64>(16)? as usize,
                column: row.get::<_, i64>(17)? as usize,
            },
            end: Position {
                row: row.get::<_, i64>(18)? as usize,
                column: row.get::<_, i64>(19)? as usize,
            },
        },
    })
}

impl Storage {
    /// Looks `id` up as a durable id first, then as a parse-time id.
    pub fn get_node_by_id(&self, id: &str) -> CoreResult<Option<IndexedNode>> {
        let conn = self.connection();
        let durable = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![id],
                node_from_row,
            )
            .optional()?;
        if durable.is_some() {
            return Ok(durable);
        }

        let parsed = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE node_id = ?1 ORDER BY rowid LIMIT 1"),
                params![id],
                node_from_row,
            )
            .optional()?;
        Ok(parsed)
    }

    pub fn snippets(&self, query: &SnippetQuery) -> CoreResult<Vec<IndexedNode>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        let exact = [
            ("id = ?", &query.id),
            ("type = ?", &query.node_type),
            ("language = ?", &query.language),
            ("granularity = ?", &query.granularity),
            ("project_name = ?", &query.project_name),
            ("file_name = ?", &query.file_name),
        ];
        for (condition, value) in exact {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                conditions.push(condition);
                values.push(value.to_string());
            }
        }

        let substring = [
            ("name LIKE ?", &query.name),
            ("content LIKE ?", &query.content),
            ("file_path LIKE ?", &query.file_path),
        ];
        for (condition, value) in substring {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                conditions.push(condition);
                values.push(format!("%{value}%"));
            }
        }

        let mut sql = format!("SELECT {NODE_COLUMNS} FROM nodes");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY rowid");
        sql.push_str(&page_clause(query.limit, query.offset));

        let mut stmt = self.connection().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), node_from_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }
}

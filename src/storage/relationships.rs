use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{page_clause, Storage};
use crate::{
    error::CoreResult,
    models::{
        Relationship, RelationshipMetadata, RelationshipPosition, RelationshipType,
        StoredRelationship,
    },
};

const RELATIONSHIP_COLUMNS: &str = "id,type,from_node,to_node,kind,source_code,path,line_number,column_number,project_name,file_name,metadata_json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipFilter {
    #[serde(default, rename = "type")]
    pub relationship_type: Option<RelationshipType>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl RelationshipFilter {
    fn where_clause(&self) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();
        if let Some(relationship_type) = self.relationship_type {
            conditions.push("type = ?");
            values.push(relationship_type.as_str().to_string());
        }
        if let Some(from) = self.from.as_deref().filter(|v| !v.is_empty()) {
            conditions.push("from_node = ?");
            values.push(from.to_string());
        }
        if let Some(to) = self.to.as_deref().filter(|v| !v.is_empty()) {
            conditions.push("to_node = ?");
            values.push(to.to_string());
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_kind: BTreeMap<String, usize>,
}

pub(super) fn insert_relationship(conn: &Connection, stored: &StoredRelationship) -> CoreResult<()> {
    let rel = &stored.relationship;
    let metadata = &rel.metadata;
    let line = metadata.position.map(|p| p.line as i64);
    let column = metadata.position.map(|p| p.column as i64);

    conn.execute(
        &format!(
            "INSERT INTO relationships({RELATIONSHIP_COLUMNS},created_at) VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)"
        ),
        params![
            stored.id,
            rel.relationship_type.as_str(),
            rel.from,
            rel.to,
            metadata.kind,
            metadata.source_code.as_deref().unwrap_or_default(),
            metadata.path.as_deref().unwrap_or_default(),
            line,
            column,
            metadata.project_name.as_deref().unwrap_or_default(),
            metadata.file_name.as_deref().unwrap_or_default(),
            serde_json::to_string(metadata)?,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Promoted columns win over the JSON blob; the blob fills in the rest.
fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRelationship> {
    let type_raw: String = row.get(1)?;
    let kind: Option<String> = row.get(4)?;
    let metadata_json: Option<String> = row.get(11)?;

    let mut metadata: RelationshipMetadata = metadata_json
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    metadata.kind = kind
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| metadata.kind.clone());
    if metadata.kind.is_empty() {
        metadata.kind = "unknown".to_string();
    }
    if let Some(source_code) = non_empty(row.get(5)?) {
        metadata.source_code = Some(source_code);
    }
    if let Some(path) = non_empty(row.get(6)?) {
        metadata.path = Some(path);
    }
    if let Some(project_name) = non_empty(row.get(9)?) {
        metadata.project_name = Some(project_name);
    }
    if let Some(file_name) = non_empty(row.get(10)?) {
        metadata.file_name = Some(file_name);
    }
    let line: Option<i64> = row.get(7)?;
    let column: Option<i64> = row.get(8)?;
    if line.is_some() || column.is_some() {
        metadata.position = Some(RelationshipPosition {
            line: line.unwrap_or(0) as usize,
            column: column.unwrap_or(0) as usize,
        });
    }

    Ok(StoredRelationship {
        id: row.get(0)?,
        relationship: Relationship {
            relationship_type: type_raw.parse().unwrap_or(RelationshipType::Dependency),
            from: row.get(2)?,
            to: row.get(3)?,
            metadata,
        },
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl Storage {
    pub fn get_relationships(
        &self,
        filter: &RelationshipFilter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> CoreResult<Vec<StoredRelationship>> {
        let (where_clause, values) = filter.where_clause();
        let mut sql = format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships{where_clause} ORDER BY rowid");
        sql.push_str(&page_clause(limit, offset));
        self.collect_relationships(&sql, values)
    }

    pub fn count_relationships(&self, filter: &RelationshipFilter) -> CoreResult<usize> {
        let (where_clause, values) = filter.where_clause();
        let count: i64 = self.connection().query_row(
            &format!("SELECT COUNT(*) FROM relationships{where_clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn get_relationship_by_id(&self, id: &str) -> CoreResult<Option<StoredRelationship>> {
        let found = self
            .connection()
            .query_row(
                &format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE id = ?1"),
                params![id],
                relationship_from_row,
            )
            .optional()?;
        Ok(found)
    }

    pub fn get_relationships_between(&self, a: &str, b: &str) -> CoreResult<Vec<StoredRelationship>> {
        self.collect_relationships(
            &format!(
                "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE (from_node = ?1 AND to_node = ?2) OR (from_node = ?2 AND to_node = ?1) ORDER BY rowid"
            ),
            vec![a.to_string(), b.to_string()],
        )
    }

    pub fn relationship_stats(&self) -> CoreResult<RelationshipStats> {
        let conn = self.connection();
        let mut stats = RelationshipStats::default();

        let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM relationships GROUP BY type")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (relationship_type, count) = row?;
            stats.total += count as usize;
            stats.by_type.insert(relationship_type, count as usize);
        }

        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM relationships GROUP BY kind")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (kind, count) = row?;
            stats.by_kind.insert(kind, count as usize);
        }

        Ok(stats)
    }

    fn collect_relationships(&self, sql: &str, values: Vec<String>) -> CoreResult<Vec<StoredRelationship>> {
        let mut stmt = self.connection().prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), relationship_from_row)?;
        let mut relationships = Vec::new();
        for row in rows {
            relationships.push(row?);
        }
        Ok(relationships)
    }
}

use serde::{Deserialize, Serialize};

use crate::{analysis::are_names_similar, indexer::Indexer, models::IndexedNode};

pub const DEFAULT_QUERY_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub relative_path: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub nodes: Vec<IndexedNode>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    indexer: &'a Indexer,
    default_limit: usize,
}

impl<'a> QueryEngine<'a> {
    pub fn new(indexer: &'a Indexer) -> Self {
        Self {
            indexer,
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        if limit > 0 {
            self.default_limit = limit;
        }
        self
    }

    pub fn query(&self, options: &QueryOptions) -> QueryResult {
        let mut candidates = self.select(options);

        if let Some(project_name) = present(&options.project_name) {
            candidates.retain(|node| node.project_name == project_name);
        }
        if let Some(file_name) = present(&options.file_name) {
            candidates.retain(|node| node.file_name == file_name);
        }
        if let Some(relative_path) = present(&options.relative_path) {
            candidates.retain(|node| node.relative_path.contains(relative_path));
        }

        let total = candidates.len();
        let limit = options
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(self.default_limit);
        let offset = options.offset.unwrap_or(0);

        let nodes = candidates
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        QueryResult {
            nodes,
            total,
            limit,
            offset,
        }
    }

    /// First present selector wins: name, type, file path, language, text.
    fn select(&self, options: &QueryOptions) -> Vec<&'a IndexedNode> {
        if let Some(name) = present(&options.name) {
            self.indexer.query_by_name(name)
        } else if let Some(node_type) = present(&options.node_type) {
            self.indexer.query_by_type(node_type)
        } else if let Some(file_path) = present(&options.file_path) {
            self.indexer.query_by_file(file_path)
        } else if let Some(language) = present(&options.language) {
            self.indexer.query_by_language(language)
        } else if let Some(text) = present(&options.text) {
            self.indexer.search_by_text(text)
        } else {
            self.indexer.all_nodes().iter().collect()
        }
    }

    pub fn similar(&self, name: &str, limit: usize) -> Vec<IndexedNode> {
        let name = name.trim();
        if name.is_empty() {
            return Vec::new();
        }
        self.indexer
            .all_nodes()
            .iter()
            .filter(|node| !node.name.trim().is_empty() && are_names_similar(name, &node.name))
            .take(limit)
            .cloned()
            .collect()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileGraph, SyntaxNode};

    fn corpus(count: usize) -> Indexer {
        let mut graph = FileGraph::new("/work/shop/src/items.ts", "typescript");
        for i in 0..count {
            let node_type = if i % 2 == 0 { "function_declaration" } else { "variable_declarator" };
            graph
                .nodes
                .insert(format!("n{i}"), SyntaxNode::new(node_type, format!("item{i}")));
        }
        let mut indexer = Indexer::new();
        indexer.add_graph(&graph);
        indexer
    }

    #[test]
    fn pagination_slices_after_counting() {
        let indexer = corpus(35);
        let engine = QueryEngine::new(&indexer);

        let all = engine.query(&QueryOptions {
            limit: Some(1000),
            ..QueryOptions::default()
        });
        let page = engine.query(&QueryOptions {
            limit: Some(10),
            offset: Some(20),
            ..QueryOptions::default()
        });

        assert_eq!(page.total, 35);
        assert_eq!(page.nodes.len(), 10);
        assert_eq!(page.limit, 10);
        assert_eq!(page.offset, 20);
        assert_eq!(page.nodes, all.nodes[20..30].to_vec());
    }

    #[test]
    fn defaults_apply_when_absent() {
        let indexer = corpus(3);
        let result = QueryEngine::new(&indexer).query(&QueryOptions::default());
        assert_eq!(result.limit, DEFAULT_QUERY_LIMIT);
        assert_eq!(result.offset, 0);
        assert_eq!(result.total, 3);

        let result = QueryEngine::new(&indexer)
            .with_default_limit(2)
            .query(&QueryOptions::default());
        assert_eq!(result.nodes.len(), 2);
    }

    #[test]
    fn first_selector_wins_and_secondary_filters_narrow() {
        let indexer = corpus(6);
        let engine = QueryEngine::new(&indexer);

        let by_type = engine.query(&QueryOptions {
            node_type: Some("function_declaration".to_string()),
            language: Some("python".to_string()),
            ..QueryOptions::default()
        });
        assert_eq!(by_type.total, 3);

        let narrowed = engine.query(&QueryOptions {
            node_type: Some("function_declaration".to_string()),
            project_name: Some("shop".to_string()),
            relative_path: Some("src/".to_string()),
            ..QueryOptions::default()
        });
        assert_eq!(narrowed.total, 3);

        let none = engine.query(&QueryOptions {
            file_name: Some("other.ts".to_string()),
            ..QueryOptions::default()
        });
        assert_eq!(none.total, 0);
        assert!(none.nodes.is_empty());
    }

    #[test]
    fn similar_names_in_index_order() {
        let mut graph = FileGraph::new("/work/app/src/user.ts", "typescript");
        for (id, name) in [("1", "getUserName"), ("2", "Dog"), ("3", "userNameView"), ("4", "")] {
            graph.nodes.insert(id.to_string(), SyntaxNode::new("identifier", name));
        }
        let mut indexer = Indexer::new();
        indexer.add_graph(&graph);

        let names: Vec<String> = QueryEngine::new(&indexer)
            .similar("userName", 10)
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["getUserName", "userNameView"]);
    }
}

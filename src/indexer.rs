use std::collections::HashMap;

use crate::models::{FileGraph, IndexedNode};

/// In-memory multi-index over ingested nodes.
///
/// `nodes` is the single source of truth. The name/type/file/language maps
/// only hold slot positions into it and are rebuilt or patched whenever a
/// slot changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Indexer {
    nodes: Vec<IndexedNode>,
    node_by_id: HashMap<String, usize>,
    nodes_by_name: HashMap<String, Vec<usize>>,
    nodes_by_type: HashMap<String, Vec<usize>>,
    nodes_by_file: HashMap<String, Vec<usize>>,
    nodes_by_language: HashMap<String, Vec<usize>>,
}

impl Indexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_graph(&mut self, graph: &FileGraph) -> usize {
        let attribution = graph.attribution();
        let mut added = 0;
        for (id, node) in &graph.nodes {
            let tokens = tokenize(&node.name);
            self.insert(IndexedNode::from_syntax(
                id,
                node,
                graph,
                &attribution,
                tokens,
            ));
            added += 1;
        }
        added
    }

    pub fn extend<I>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = IndexedNode>,
    {
        for node in nodes {
            self.insert(node);
        }
    }

    pub fn insert(&mut self, mut node: IndexedNode) {
        if node.tokens.is_empty() {
            node.tokens = tokenize(&node.name);
        }

        let idx = match self.node_by_id.get(&node.id).copied() {
            Some(idx) => {
                self.detach(idx);
                self.nodes[idx] = node;
                idx
            }
            None => {
                let idx = self.nodes.len();
                self.node_by_id.insert(node.id.clone(), idx);
                self.nodes.push(node);
                idx
            }
        };

        let node = &self.nodes[idx];
        self.nodes_by_name
            .entry(node.name.clone())
            .or_default()
            .push(idx);
        self.nodes_by_type
            .entry(node.node_type.clone())
            .or_default()
            .push(idx);
        self.nodes_by_file
            .entry(node.file_path.clone())
            .or_default()
            .push(idx);
        self.nodes_by_language
            .entry(node.language.clone())
            .or_default()
            .push(idx);
    }

    fn detach(&mut self, idx: usize) {
        let old = &self.nodes[idx];
        remove_slot(&mut self.nodes_by_name, &old.name, idx);
        remove_slot(&mut self.nodes_by_type, &old.node_type, idx);
        remove_slot(&mut self.nodes_by_file, &old.file_path, idx);
        remove_slot(&mut self.nodes_by_language, &old.language, idx);
    }

    pub fn get(&self, id: &str) -> Option<&IndexedNode> {
        self.node_by_id.get(id).map(|idx| &self.nodes[*idx])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn all_nodes(&self) -> &[IndexedNode] {
        &self.nodes
    }

    pub fn query_by_name(&self, name: &str) -> Vec<&IndexedNode> {
        self.lookup(&self.nodes_by_name, name)
    }

    pub fn query_by_type(&self, node_type: &str) -> Vec<&IndexedNode> {
        self.lookup(&self.nodes_by_type, node_type)
    }

    pub fn query_by_file(&self, file_path: &str) -> Vec<&IndexedNode> {
        self.lookup(&self.nodes_by_file, file_path)
    }

    pub fn query_by_language(&self, language: &str) -> Vec<&IndexedNode> {
        self.lookup(&self.nodes_by_language, language)
    }

    fn lookup<'a>(&'a self, bucket: &HashMap<String, Vec<usize>>, key: &str) -> Vec<&'a IndexedNode> {
        bucket
            .get(key)
            .map(|slots| slots.iter().map(|idx| &self.nodes[*idx]).collect())
            .unwrap_or_default()
    }

    pub fn search_by_text(&self, text: &str) -> Vec<&IndexedNode> {
        let query = tokenize(text);
        if query.is_empty() {
            return Vec::new();
        }
        self.nodes
            .iter()
            .filter(|node| node.tokens.iter().any(|t| query.contains(t)))
            .collect()
    }

    /// A node matches when any non-blank line of `rules` is a substring of
    /// its type. Untyped nodes never match.
    pub fn nodes_matching_rules(&self, rules: &str) -> Vec<&IndexedNode> {
        let lines: Vec<&str> = rules
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            return Vec::new();
        }
        self.nodes
            .iter()
            .filter(|node| !node.node_type.is_empty())
            .filter(|node| lines.iter().any(|line| node.node_type.contains(*line)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.node_by_id.clear();
        self.nodes_by_name.clear();
        self.nodes_by_type.clear();
        self.nodes_by_file.clear();
        self.nodes_by_language.clear();
    }
}

fn remove_slot(bucket: &mut HashMap<String, Vec<usize>>, key: &str, idx: usize) {
    if let Some(slots) = bucket.get_mut(key) {
        slots.retain(|slot| *slot != idx);
        if slots.is_empty() {
            bucket.remove(key);
        }
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyntaxNode;

    fn sample_graph(path: &str) -> FileGraph {
        let mut graph = FileGraph::new(path, "typescript");
        graph.nodes.insert(
            "1".to_string(),
            SyntaxNode::new("class_declaration", "UserService").with_children(["2"]),
        );
        graph
            .nodes
            .insert("2".to_string(), SyntaxNode::new("method_definition", "get_user"));
        graph
            .nodes
            .insert("3".to_string(), SyntaxNode::new("function_declaration", "formatDate"));
        graph.root_nodes = vec!["1".to_string(), "3".to_string()];
        graph
    }

    fn secondary_slots(indexer: &Indexer) -> Vec<usize> {
        [
            &indexer.nodes_by_name,
            &indexer.nodes_by_type,
            &indexer.nodes_by_file,
            &indexer.nodes_by_language,
        ]
        .iter()
        .flat_map(|bucket| bucket.values().flatten().copied())
        .collect()
    }

    #[test]
    fn tokenize_splits_on_non_alphanumerics() {
        assert_eq!(tokenize("get_User-Name2"), vec!["get", "user", "name2"]);
        assert!(tokenize("  ").is_empty());
    }

    #[test]
    fn secondary_indices_point_into_primary_map() {
        let mut indexer = Indexer::new();
        indexer.add_graph(&sample_graph("/p/src/a.ts"));
        indexer.add_graph(&sample_graph("/p/src/a.ts"));

        let slots = secondary_slots(&indexer);
        assert!(!slots.is_empty());
        for slot in slots {
            let node = &indexer.nodes[slot];
            assert_eq!(indexer.get(&node.id), Some(node));
        }
    }

    #[test]
    fn re_adding_an_id_overwrites_without_duplicates() {
        let mut indexer = Indexer::new();
        indexer.add_graph(&sample_graph("/p/src/a.ts"));
        indexer.add_graph(&sample_graph("/p/src/b.ts"));

        assert_eq!(indexer.len(), 3);
        assert!(indexer.query_by_file("/p/src/a.ts").is_empty());
        assert_eq!(indexer.query_by_file("/p/src/b.ts").len(), 3);
        assert_eq!(indexer.query_by_name("UserService").len(), 1);
    }

    #[test]
    fn clear_then_re_add_is_idempotent() {
        let graphs = [sample_graph("/p/src/a.ts")];
        let mut indexer = Indexer::new();
        for graph in &graphs {
            indexer.add_graph(graph);
        }
        let snapshot = indexer.clone();

        indexer.clear();
        assert!(indexer.is_empty());
        for graph in &graphs {
            indexer.add_graph(graph);
        }
        assert_eq!(indexer, snapshot);
    }

    #[test]
    fn unknown_keys_yield_empty_results() {
        let mut indexer = Indexer::new();
        indexer.add_graph(&sample_graph("/p/src/a.ts"));
        assert!(indexer.query_by_name("Missing").is_empty());
        assert!(indexer.query_by_type("enum_declaration").is_empty());
        assert!(indexer.query_by_language("python").is_empty());
    }

    #[test]
    fn text_search_uses_or_semantics() {
        let mut indexer = Indexer::new();
        indexer.add_graph(&sample_graph("/p/src/a.ts"));
        let names: Vec<&str> = indexer
            .search_by_text("user formatdate")
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names, vec!["get_user", "formatDate"]);
    }

    #[test]
    fn rule_lines_match_type_substrings() {
        let mut indexer = Indexer::new();
        let mut graph = sample_graph("/p/src/a.ts");
        graph.nodes.insert("4".to_string(), SyntaxNode::new("", "untyped"));
        indexer.add_graph(&graph);

        let matched = indexer.nodes_matching_rules("class\n\n");
        let names: Vec<&str> = matched.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["UserService"]);

        let matched = indexer.nodes_matching_rules("  _definition \nfunction");
        let names: Vec<&str> = matched.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["get_user", "formatDate"]);

        assert!(indexer.nodes_matching_rules("(class_declaration name: @name)").is_empty());
        assert!(indexer.nodes_matching_rules("   \n").is_empty());
    }

    #[test]
    fn attribution_is_derived_from_the_path() {
        let mut indexer = Indexer::new();
        indexer.add_graph(&sample_graph("/work/shop/src/a.ts"));
        let node = indexer.get("1").expect("indexed node");
        assert_eq!(node.project_name, "shop");
        assert_eq!(node.file_name, "a.ts");
        assert_eq!(node.relative_path, "src/a.ts");
        assert_eq!(node.tokens, vec!["userservice"]);
    }
}

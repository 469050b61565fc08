//! Whole-project import: scan, parse each file, analyze, persist.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    analysis,
    error::CoreResult,
    models::{FileGraph, Granularity, IndexedNode, StoredRelationship},
    parser::SourceParser,
    scanner::{self, ScanOptions},
    storage::Storage,
};

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub scan: ScanOptions,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    /// Analyzed graphs, virtual nodes included.
    pub graphs: Vec<FileGraph>,
    pub relationships: Vec<StoredRelationship>,
    pub nodes: Vec<IndexedNode>,
    pub virtual_nodes: usize,
    pub skipped: Vec<SkippedFile>,
}

pub struct Importer<'p> {
    parser: &'p dyn SourceParser,
    options: ImportOptions,
}

impl<'p> Importer<'p> {
    pub fn new(parser: &'p dyn SourceParser, options: ImportOptions) -> Self {
        Self { parser, options }
    }

    /// Imports `root` into the database at `db_path`. Storage is opened for
    /// this import only and closed again whether or not it succeeded.
    pub fn import_project(&self, root: &Path, db_path: &Path) -> CoreResult<ImportOutcome> {
        let storage = Storage::open(db_path)?;
        let result = self.import_into(root, &storage);
        if let Err(err) = storage.close() {
            warn!(error = %err, "failed to close storage after import");
        }
        result
    }

    pub fn import_into(&self, root: &Path, storage: &Storage) -> CoreResult<ImportOutcome> {
        let files = scanner::scan_project(root, &self.options.scan)?;
        info!(project = %root.display(), files = files.len(), "project scanned");

        let mut graphs = Vec::with_capacity(files.len());
        let mut skipped = Vec::new();
        for file in files {
            match self.parse_one(root, &file) {
                Ok(graph) => graphs.push(graph),
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "skipping file");
                    skipped.push(SkippedFile {
                        path: file,
                        reason: err.to_string(),
                    });
                }
            }
        }
        info!(
            project = %root.display(),
            parsed = graphs.len(),
            skipped = skipped.len(),
            "project parsed"
        );

        let mut outcome = import_graphs(graphs, storage, self.options.granularity)?;
        outcome.skipped = skipped;
        Ok(outcome)
    }

    fn parse_one(&self, root: &Path, file: &Path) -> CoreResult<FileGraph> {
        let language = scanner::language_for_path(file)?;
        let content = std::fs::read_to_string(file)?;
        let mut graph = self.parser.parse_file(file, language, &content)?;

        graph.project_path = Some(root.display().to_string());
        graph.relative_path = file
            .strip_prefix(root)
            .ok()
            .map(|relative| relative.display().to_string());
        Ok(graph)
    }
}

pub fn import_graphs(
    mut graphs: Vec<FileGraph>,
    storage: &Storage,
    granularity: Granularity,
) -> CoreResult<ImportOutcome> {
    let report = analysis::analyze(&mut graphs);
    let saved = storage.save_project_data(&graphs, &report.relationships, granularity)?;

    Ok(ImportOutcome {
        graphs,
        relationships: saved.relationships,
        nodes: saved.nodes,
        virtual_nodes: report.virtual_nodes,
        skipped: Vec::new(),
    })
}

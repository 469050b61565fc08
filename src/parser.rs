use std::{
    io::{self, Write},
    path::Path,
    process::{Command, Stdio},
    thread,
};

use tracing::debug;

use crate::{
    error::{CoreError, CoreResult},
    models::FileGraph,
};

pub trait SourceParser {
    fn parse_file(&self, path: &Path, language: &str, content: &str) -> CoreResult<FileGraph>;
}

/// Delegates parsing to an external program invoked as
/// `<program> [args..] <path> <language>` with the file content on stdin
/// and one FileGraph JSON document expected on stdout.
#[derive(Debug, Clone)]
pub struct ExternalCommandParser {
    program: String,
    args: Vec<String>,
}

impl ExternalCommandParser {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_command_line(command_line: &str) -> CoreResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            return Err(CoreError::Input("parser command is empty".to_string()));
        };
        Ok(Self::new(program, parts.collect()))
    }
}

impl SourceParser for ExternalCommandParser {
    fn parse_file(&self, path: &Path, language: &str, content: &str) -> CoreResult<FileGraph> {
        let path_display = path.display().to_string();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .arg(language)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| CoreError::parse(&path_display, format!("failed to run {}: {err}", self.program)))?;

        // Feed stdin on its own thread while both output pipes drain.
        let stdin = child.stdin.take();
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(move || -> io::Result<()> {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(content.as_bytes())?;
                }
                Ok(())
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
            (written, output)
        });

        let output = output
            .map_err(|err| CoreError::parse(&path_display, format!("failed waiting for parser: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::parse(
                &path_display,
                format!("parser exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        written.map_err(|err| CoreError::parse(&path_display, format!("failed writing source to parser: {err}")))?;

        let mut graph: FileGraph = serde_json::from_slice(&output.stdout)
            .map_err(|err| CoreError::parse(&path_display, format!("invalid parser output: {err}")))?;
        graph.file_path = path_display;
        if graph.language.is_empty() {
            graph.language = language.to_string();
        }

        debug!(file = %graph.file_path, nodes = graph.nodes.len(), "file parsed");
        Ok(graph)
    }
}

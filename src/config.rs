use std::{env, fs, net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use code_relations_api::{
    models::Granularity,
    query::DEFAULT_QUERY_LIMIT,
    scanner::{ScanOptions, DEFAULT_EXTENSIONS, DEFAULT_IGNORED_DIRS},
};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    /// Bearer key; `None` leaves the API open.
    pub api_key: Option<String>,
    pub reset_on_start: bool,
    pub parser_cmd: Option<String>,
    pub scan: ScanOptions,
    pub granularity: Granularity,
    pub default_query_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_raw =
            env::var("CODEGRAPH_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_normalized = bind_raw
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .to_string();
        let bind_addr = bind_normalized
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let db_path = PathBuf::from(
            env::var("CODEGRAPH_DB_PATH").unwrap_or_else(|_| "code_snippets.db".to_string()),
        );

        let reset_on_start = env::var("CODEGRAPH_RESET_ON_START")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let parser_cmd = env::var("CODEGRAPH_PARSER_CMD")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let extensions = env::var("CODEGRAPH_EXTENSIONS")
            .ok()
            .map(|v| split_list(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|v| v.to_string()).collect());

        let ignored_dirs = env::var("CODEGRAPH_IGNORED_DIRS")
            .ok()
            .map(|v| split_list(&v))
            .unwrap_or_else(|| DEFAULT_IGNORED_DIRS.iter().map(|v| v.to_string()).collect());

        let granularity = match env::var("CODEGRAPH_GRANULARITY") {
            Ok(raw) => raw
                .trim()
                .parse::<Granularity>()
                .map_err(anyhow::Error::msg)
                .context("invalid CODEGRAPH_GRANULARITY")?,
            Err(_) => Granularity::default(),
        };

        let default_query_limit = env::var("CODEGRAPH_DEFAULT_QUERY_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_QUERY_LIMIT);

        Ok(Self {
            bind_addr,
            db_path,
            api_key: resolve_api_key(),
            reset_on_start,
            parser_cmd,
            scan: ScanOptions {
                extensions,
                ignored_dirs,
            },
            granularity,
            default_query_limit,
        })
    }
}

fn resolve_api_key() -> Option<String> {
    if let Ok(value) = env::var("CODEGRAPH_API_KEY") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    let key_file = env::var("CODEGRAPH_API_KEY_FILE").ok()?;
    match fs::read_to_string(&key_file) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                warn!(path = %key_file, "CODEGRAPH_API_KEY_FILE is empty, API is unauthenticated");
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(err) => {
            warn!(path = %key_file, error = %err, "failed reading CODEGRAPH_API_KEY_FILE, API is unauthenticated");
            None
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_truthy_spellings() {
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("on"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn lists_are_trimmed_and_skip_blanks() {
        assert_eq!(split_list(".ts, .css,,"), vec![".ts", ".css"]);
        assert!(split_list(" , ").is_empty());
    }
}

//! Engine backed by the `grew` command-line tool
//!
//! Each query writes its pattern to a fresh scratch file and runs
//! `grew grep` or `grew count` on the configured corpus. The scratch file is
//! removed when the query returns.

use crate::engine::{EngineError, Match, QueryEngine};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

/// `grew` executable plus the corpus it is queried on
#[derive(Debug, Clone)]
pub struct GrewCli {
    binary: PathBuf,
    corpus: PathBuf,
}

#[derive(Debug, Deserialize)]
struct GrepRecord {
    sent_id: String,
    matching: Matching,
}

#[derive(Debug, Deserialize)]
struct Matching {
    nodes: BTreeMap<String, String>,
}

impl GrewCli {
    pub fn new(binary: impl Into<PathBuf>, corpus: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            corpus: corpus.into(),
        }
    }

    /// Run `grew <subcommand> -pattern <scratch> -i <corpus>` and return stdout
    fn run(&self, subcommand: &str, pattern: &str) -> Result<String, EngineError> {
        let mut scratch = tempfile::Builder::new()
            .prefix("treerules-")
            .suffix(".pat")
            .tempfile()?;
        scratch.write_all(pattern.as_bytes())?;
        scratch.flush()?;

        let output = self.command(subcommand, &scratch).output().map_err(|source| {
            EngineError::Spawn {
                program: self.binary.display().to_string(),
                source,
            }
        })?;

        if !output.status.success() {
            return Err(EngineError::Process {
                program: self.binary.display().to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::trace!(subcommand, pattern, "grew query");
        String::from_utf8(output.stdout)
            .map_err(|e| EngineError::Output(format!("invalid UTF-8: {e}")))
    }

    fn command(&self, subcommand: &str, scratch: &NamedTempFile) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg(subcommand)
            .arg("-pattern")
            .arg(scratch.path())
            .arg("-i")
            .arg(&self.corpus);
        command
    }

    pub fn corpus(&self) -> &Path {
        &self.corpus
    }
}

impl QueryEngine for GrewCli {
    fn count(&self, pattern: &str) -> Result<usize, EngineError> {
        parse_count_output(&self.run("count", pattern)?)
    }

    fn search(&self, pattern: &str) -> Result<Vec<Match>, EngineError> {
        parse_grep_output(&self.run("grep", pattern)?)
    }
}

/// `grew count` prints a TSV table; the count is the last column of the last row
fn parse_count_output(output: &str) -> Result<usize, EngineError> {
    let row = output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| EngineError::Output("empty count output".to_string()))?;
    let cell = row.rsplit('\t').next().unwrap_or(row).trim();
    cell.parse()
        .map_err(|_| EngineError::Output(format!("not a count: {cell:?}")))
}

/// `grew grep` prints a JSON array of `{sent_id, matching: {nodes}}` records
fn parse_grep_output(output: &str) -> Result<Vec<Match>, EngineError> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<GrepRecord> = serde_json::from_str(output)
        .map_err(|e| EngineError::Output(format!("invalid grep output: {e}")))?;

    records
        .into_iter()
        .map(|record| {
            let nodes = record
                .matching
                .nodes
                .into_iter()
                .map(|(name, id)| {
                    let token = id
                        .parse()
                        .map_err(|_| EngineError::Output(format!("invalid node id: {id:?}")))?;
                    Ok((name, token))
                })
                .collect::<Result<Vec<_>, EngineError>>()?;
            Ok(Match {
                sent_id: record.sent_id,
                nodes,
            })
        })
        .collect()
}

//! Query engines
//!
//! The extraction pipeline only needs two operations from a graph-query
//! engine: the number of matches of a pattern and the matches themselves.
//! [`NativeEngine`] answers them in process; [`GrewCli`](crate::grew_cli::GrewCli)
//! delegates to the `grew` executable.

use crate::matcher::Matcher;
use crate::query::{QueryError, parse_query};
use crate::tree::TokenId;
use crate::treebank::Treebank;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Process {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Unexpected engine output: {0}")]
    Output(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One occurrence of a pattern: the sentence and the token bound to each node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub sent_id: String,
    pub nodes: Vec<(String, TokenId)>,
}

impl Match {
    /// Token bound to the node `name`
    pub fn get(&self, name: &str) -> Option<TokenId> {
        self.nodes
            .iter()
            .find_map(|(node, id)| (node == name).then_some(*id))
    }
}

/// A graph-query engine over one corpus
///
/// All counts of one extraction run must come from the same engine.
pub trait QueryEngine {
    /// Number of distinct matches of `pattern`
    fn count(&self, pattern: &str) -> Result<usize, EngineError>;

    /// Every match of `pattern`, in corpus order
    fn search(&self, pattern: &str) -> Result<Vec<Match>, EngineError>;
}

/// In-process engine over a loaded treebank
#[derive(Debug, Clone, Copy)]
pub struct NativeEngine<'a> {
    treebank: &'a Treebank,
}

impl<'a> NativeEngine<'a> {
    pub fn new(treebank: &'a Treebank) -> Self {
        Self { treebank }
    }

    fn compile(&self, pattern: &str) -> Result<Matcher, EngineError> {
        let parsed = parse_query(pattern)?;
        Ok(Matcher::new(&parsed, self.treebank)?)
    }
}

impl QueryEngine for NativeEngine<'_> {
    fn count(&self, pattern: &str) -> Result<usize, EngineError> {
        let matcher = self.compile(pattern)?;
        Ok(self
            .treebank
            .sentences()
            .iter()
            .map(|sentence| matcher.count(sentence))
            .sum())
    }

    fn search(&self, pattern: &str) -> Result<Vec<Match>, EngineError> {
        let matcher = self.compile(pattern)?;
        let mut matches = Vec::new();
        for sentence in self.treebank.sentences() {
            for ids in matcher.matches(sentence) {
                matches.push(Match {
                    sent_id: sentence.sent_id.clone(),
                    nodes: matcher.var_names().iter().cloned().zip(ids).collect(),
                });
            }
        }
        Ok(matches)
    }
}

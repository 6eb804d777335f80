//! Extraction settings
//!
//! Settings can be loaded from a JSON file; the command line overrides any
//! field given there.

use crate::combination::Strategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing setting: {0}")]
    Missing(&'static str),
}

/// Which engine answers the queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// Built-in matcher over the loaded treebank
    #[default]
    Native,
    /// External `grew` executable
    Grew,
}

/// One extraction run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    /// CoNLL-U treebank (attribute store, and corpus of the native engine)
    pub treebank_path: Option<PathBuf>,
    /// P1
    pub base: String,
    /// P2
    pub outcome: String,
    /// P3
    pub predictors: String,
    /// Every non-empty combination instead of the largest one
    pub exhaustive: bool,
    pub strategy: Strategy,
    /// Drop rules dominated by one of their supersets
    pub prune: bool,
    /// Decide P2 per match of P1 and count locally (key references only)
    pub local_outcome: bool,
    pub engine: EngineKind,
    /// Corpus given to `grew` (defaults to the treebank)
    pub corpus: Option<PathBuf>,
    pub grew_binary: PathBuf,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            treebank_path: None,
            base: String::new(),
            outcome: String::new(),
            predictors: String::new(),
            exhaustive: false,
            strategy: Strategy::default(),
            prune: true,
            local_outcome: false,
            engine: EngineKind::default(),
            corpus: None,
            grew_binary: PathBuf::from("grew"),
        }
    }
}

impl ExtractionConfig {
    pub fn new(
        base: impl Into<String>,
        outcome: impl Into<String>,
        predictors: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into(),
            outcome: outcome.into(),
            predictors: predictors.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check that the three patterns are set
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base.trim().is_empty() {
            return Err(ConfigError::Missing("base"));
        }
        if self.outcome.trim().is_empty() {
            return Err(ConfigError::Missing("outcome"));
        }
        if self.predictors.trim().is_empty() {
            return Err(ConfigError::Missing("predictors"));
        }
        Ok(())
    }

    /// Corpus for the `grew` engine
    pub fn grew_corpus(&self) -> Option<&Path> {
        self.corpus.as_deref().or(self.treebank_path.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "treebank_path": "fr_gsd.conllu",
                "base": "e:X->Y; X[upos=NOUN]",
                "outcome": "X.Number = Y.Number",
                "predictors": "e.label; Y.upos",
                "strategy": "value-product"
            }}"#
        )
        .unwrap();

        let config = ExtractionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base, "e:X->Y; X[upos=NOUN]");
        assert_eq!(config.strategy, Strategy::ValueProduct);
        assert!(config.prune);
        assert!(!config.exhaustive);
        assert!(!config.local_outcome);
        assert_eq!(config.engine, EngineKind::Native);
        assert_eq!(config.grew_corpus(), Some(Path::new("fr_gsd.conllu")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"base": "X[]", "pruning": false}}"#).unwrap();
        assert!(matches!(
            ExtractionConfig::from_file(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_validate() {
        let config = ExtractionConfig::new("X->Y", "", "X.upos");
        assert!(matches!(config.validate(), Err(ConfigError::Missing("outcome"))));
        assert!(matches!(
            ExtractionConfig::from_file("/nonexistent/config.json"),
            Err(ConfigError::Read { .. })
        ));
    }
}

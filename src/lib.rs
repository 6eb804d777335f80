//! Treerules: significant grammar rules from dependency treebanks
//!
//! Given a base pattern (P1), an outcome (P2) and candidate predictors (P3),
//! finds the predictor combinations that make the outcome significantly more
//! likely, using a one-sided Fisher exact test on match counts.

// Attribute store
pub mod conllu; // CoNLL-U file parsing
pub mod tree; // Sentences and tokens
pub mod treebank; // Interned treebank indexed by sentence id

// Query engines
pub mod engine; // QueryEngine trait and the native engine
pub mod grew_cli; // `grew` command-line adapter
pub mod matcher; // Pattern compilation and backtracking search
pub mod pattern; // Pattern AST
pub mod query; // Pattern language parser

// Extraction pipeline
pub mod combination; // Candidate generation
pub mod config;
pub mod extract; // End-to-end run (predictors -> candidates -> scores -> filter)
pub mod filter; // Subsumption pruning and ranking
pub mod predictor; // P3 classification and fragment synthesis
pub mod report; // TSV output
pub mod stats; // Contingency tables and Fisher exact test

// Re-exports for convenience
pub use combination::{Candidate, CandidateSet, Strategy, Support};
pub use config::{EngineKind, ExtractionConfig};
pub use engine::{EngineError, Match, NativeEngine, QueryEngine};
pub use extract::{Extraction, ExtractionError, RuleExtractor, extract};
pub use filter::Rule;
pub use grew_cli::GrewCli;
pub use query::{compose, parse_query};
pub use stats::{Assessment, SIGNIFICANCE_THRESHOLD, Significance};
pub use treebank::Treebank;

//! Rule extraction pipeline
//!
//! P1 selects the contexts, P2 the outcome and P3 the predictors. Every
//! candidate built from P3 is scored with four counts from one engine:
//!
//! - M = count(P1)
//! - n = count(P1 & P2)
//! - N = count(P1 & candidate), observed directly for per-match candidates
//! - k = count(P1 & P2 & candidate)
//!
//! With `local_outcome` the outcome is decided per match of P1 instead, and
//! all four counts come from two searches.

use crate::combination::{Candidate, CandidateSet, Strategy, Support};
use crate::config::{ConfigError, ExtractionConfig};
use crate::engine::{EngineError, Match, QueryEngine};
use crate::filter::{self, Rule};
use crate::predictor::{self, PredictorError, Predictors};
use crate::query::compose;
use crate::stats::{ContingencyError, Evaluator};
use crate::tree::TokenId;
use crate::treebank::{Treebank, TreebankError};
use rustc_hash::FxHashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Predictor(#[from] PredictorError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Treebank(#[from] TreebankError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Local outcome counting needs key references and the per-match strategy")]
    LocalOutcome,
}

/// Outcome of one run
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// M
    pub total: usize,
    /// n
    pub outcome: usize,
    /// Every scored candidate, in generation order
    pub evaluations: Vec<Rule>,
    /// Significant rules, pruned if requested, ranked
    pub records: Vec<Rule>,
    /// Candidates whose counts do not form a valid table
    pub anomalies: Vec<(Candidate, ContingencyError)>,
}

/// Runs one configuration against one engine
///
/// The treebank is the attribute store that key references are read from;
/// with the native engine it is also the corpus being queried.
pub struct RuleExtractor<'a, E: QueryEngine + ?Sized> {
    engine: &'a E,
    treebank: &'a Treebank,
    config: &'a ExtractionConfig,
}

impl<'a, E: QueryEngine + ?Sized> RuleExtractor<'a, E> {
    pub fn new(engine: &'a E, treebank: &'a Treebank, config: &'a ExtractionConfig) -> Self {
        Self {
            engine,
            treebank,
            config,
        }
    }

    /// Build the candidate set for the configured predictors
    pub fn candidates(&self) -> Result<CandidateSet, ExtractionError> {
        let config = self.config;
        let predictors = predictor::resolve(&config.base, &config.predictors)?;

        let candidates = match predictors {
            Predictors::Literal(fragments) => {
                CandidateSet::from_literals(&fragments, config.exhaustive)
            }
            Predictors::Keyed(keyed) => {
                let matches = self.engine.search(&compose(&[config.base.as_str()]))?;
                tracing::debug!(matches = matches.len(), "base pattern matches");

                match config.strategy {
                    Strategy::PerMatch => CandidateSet::from_matches(
                        matches.iter().map(|m| keyed.synthesize(m, self.treebank)),
                        config.exhaustive,
                    ),
                    Strategy::ValueProduct => {
                        let groups: Vec<Vec<String>> = keyed
                            .specs()
                            .map(|spec| {
                                let mut values: Vec<String> = Vec::new();
                                for m in &matches {
                                    if let Some(fragment) = spec.synthesize(m, self.treebank) {
                                        if !values.contains(&fragment) {
                                            values.push(fragment);
                                        }
                                    }
                                }
                                values
                            })
                            .filter(|values| !values.is_empty())
                            .collect();
                        CandidateSet::from_value_groups(&groups, config.exhaustive)
                    }
                }
            }
        };

        tracing::info!(
            candidates = candidates.len(),
            exhaustive = config.exhaustive,
            "candidates generated"
        );
        Ok(candidates)
    }

    pub fn run(&self) -> Result<Extraction, ExtractionError> {
        if self.config.local_outcome {
            return self.run_local();
        }

        let candidates = self.candidates()?;
        let base = self.config.base.as_str();
        let outcome_pattern = self.config.outcome.as_str();

        let total = self.engine.count(&compose(&[base]))?;
        let outcome = self.engine.count(&compose(&[base, outcome_pattern]))?;
        tracing::info!(total, outcome, "base counts");

        let counted = candidates.iter().map(|(candidate, support)| {
            let pattern = candidate.pattern();
            let predictor = match support {
                Support::Observed(count) => count,
                Support::Query => self.engine.count(&compose(&[base, &pattern]))?,
            };
            let joint = self
                .engine
                .count(&compose(&[base, outcome_pattern, &pattern]))?;
            Ok::<_, ExtractionError>((candidate.clone(), predictor, joint))
        });
        self.score(total, outcome, counted)
    }

    /// Decide the outcome per match of P1 and count everything locally
    ///
    /// A match of P1 is a success when the same nodes also match P1 & P2.
    /// Only two searches are issued; N and k are read off the fragments of
    /// all matches and of the successful ones.
    pub fn run_local(&self) -> Result<Extraction, ExtractionError> {
        let config = self.config;
        let Predictors::Keyed(keyed) = predictor::resolve(&config.base, &config.predictors)?
        else {
            return Err(ExtractionError::LocalOutcome);
        };
        if config.strategy != Strategy::PerMatch {
            return Err(ExtractionError::LocalOutcome);
        }

        let base = config.base.as_str();
        let matches = self.engine.search(&compose(&[base]))?;
        let successes: FxHashSet<(String, Vec<(String, TokenId)>)> = self
            .engine
            .search(&compose(&[base, config.outcome.as_str()]))?
            .into_iter()
            .map(|m| {
                let nodes = match matches.first() {
                    Some(first) => binding(&m, first),
                    None => Vec::new(),
                };
                (m.sent_id, nodes)
            })
            .collect();

        let mut all = Vec::with_capacity(matches.len());
        let mut outcome_lists = Vec::new();
        for m in &matches {
            let fragments = keyed.synthesize(m, self.treebank);
            if successes.contains(&(m.sent_id.clone(), binding(m, m))) {
                outcome_lists.push(fragments.clone());
            }
            all.push(fragments);
        }

        let total = matches.len();
        let outcome = outcome_lists.len();
        tracing::info!(total, outcome, "local counts");

        let candidates = CandidateSet::from_matches(all, config.exhaustive);
        tracing::info!(
            candidates = candidates.len(),
            exhaustive = config.exhaustive,
            "candidates generated"
        );

        let counted = candidates.iter().map(|(candidate, support)| {
            let predictor = match support {
                Support::Observed(count) => count,
                Support::Query => 0,
            };
            let joint = outcome_lists
                .iter()
                .filter(|fragments| {
                    candidate
                        .fragments()
                        .iter()
                        .all(|fragment| fragments.contains(fragment))
                })
                .count();
            Ok((candidate.clone(), predictor, joint))
        });
        self.score(total, outcome, counted)
    }

    /// Assess counted candidates, then keep the significant ones
    fn score<I>(
        &self,
        total: usize,
        outcome: usize,
        counted: I,
    ) -> Result<Extraction, ExtractionError>
    where
        I: Iterator<Item = Result<(Candidate, usize, usize), ExtractionError>>,
    {
        let evaluator = Evaluator::new(total, outcome);
        let mut extraction = Extraction {
            total,
            outcome,
            ..Extraction::default()
        };

        for counts in counted {
            let (candidate, predictor, joint) = counts?;
            match evaluator.assess(predictor, joint) {
                Ok(assessment) => {
                    tracing::debug!(
                        %candidate,
                        predictor,
                        joint,
                        p_value = assessment.p_value,
                        "candidate scored"
                    );
                    extraction.evaluations.push(Rule {
                        candidate,
                        assessment,
                    });
                }
                Err(err) => {
                    tracing::warn!(%candidate, error = %err, "malformed contingency table");
                    extraction.anomalies.push((candidate, err));
                }
            }
        }

        let significant: Vec<Rule> = extraction
            .evaluations
            .iter()
            .filter(|rule| rule.assessment.is_significant())
            .cloned()
            .collect();
        let found = significant.len();
        extraction.records = if self.config.prune {
            filter::prune(significant)
        } else {
            filter::rank(significant)
        };

        tracing::info!(
            significant = found,
            retained = extraction.records.len(),
            anomalies = extraction.anomalies.len(),
            "extraction done"
        );
        Ok(extraction)
    }
}

/// Nodes of `m` that `reference` binds, sorted by name
fn binding(m: &Match, reference: &Match) -> Vec<(String, TokenId)> {
    let mut nodes: Vec<(String, TokenId)> = m
        .nodes
        .iter()
        .filter(|(name, _)| reference.get(name).is_some())
        .cloned()
        .collect();
    nodes.sort();
    nodes
}

/// Run `config` against `engine`, reading key references from `treebank`
pub fn extract<E: QueryEngine + ?Sized>(
    engine: &E,
    treebank: &Treebank,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractionError> {
    config.validate()?;
    RuleExtractor::new(engine, treebank, config).run()
}

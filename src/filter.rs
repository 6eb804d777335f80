//! Pruning and ranking of significant rules
//!
//! A rule whose fragments are a subset of another rule's fragments says less
//! about the same matches. It is dropped when some such superset is a
//! strictly better predictor (lower p-value, or the same p-value with a
//! higher probability ratio). Every other rule is kept.

use crate::combination::Candidate;
use crate::stats::Assessment;
use std::cmp::Ordering;

/// A scored candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub candidate: Candidate,
    pub assessment: Assessment,
}

impl Rule {
    /// `self` is a strictly better predictor than `other`
    pub fn dominates(&self, other: &Rule) -> bool {
        let (mine, theirs) = (&self.assessment, &other.assessment);
        mine.p_value < theirs.p_value
            || (mine.p_value == theirs.p_value
                && mine.probability_ratio > theirs.probability_ratio)
    }
}

/// Drop every rule dominated by one of its supersets, then rank the survivors
///
/// Dominance is judged on the input set, so the outcome does not depend on
/// the input order and a second pass removes nothing.
pub fn prune(rules: Vec<Rule>) -> Vec<Rule> {
    let dominated: Vec<bool> = rules
        .iter()
        .map(|sub| {
            rules.iter().any(|sup| {
                sub.candidate.is_proper_subset_of(&sup.candidate) && sup.dominates(sub)
            })
        })
        .collect();

    let kept = rules
        .into_iter()
        .zip(dominated)
        .filter_map(|(rule, dominated)| (!dominated).then_some(rule))
        .collect();
    rank(kept)
}

/// Sort by ascending p-value, then descending probability ratio
pub fn rank(mut rules: Vec<Rule>) -> Vec<Rule> {
    rules.sort_by(|a, b| compare(&a.assessment, &b.assessment));
    rules
}

fn compare(a: &Assessment, b: &Assessment) -> Ordering {
    a.p_value
        .total_cmp(&b.p_value)
        .then_with(|| b.probability_ratio.total_cmp(&a.probability_ratio))
}

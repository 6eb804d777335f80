//! Candidate generation
//!
//! Turns predictor fragments into the candidate conjunctions that get
//! scored. Per-match candidates carry the number of base matches whose
//! fragments include them, which is exactly their co-occurrence count with
//! the base pattern; every other candidate has to be counted by the engine.

use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A conjunction of pattern fragments
///
/// Fragments are kept in first-appearance order and never repeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    fragments: Vec<String>,
}

impl Candidate {
    /// None for an empty fragment list
    pub fn new<I, S>(fragments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for fragment in fragments {
            let fragment = fragment.into();
            if !unique.contains(&fragment) {
                unique.push(fragment);
            }
        }
        (!unique.is_empty()).then_some(Self { fragments: unique })
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Clauses joined for use inside a pattern block
    pub fn pattern(&self) -> String {
        self.fragments.join("; ")
    }

    /// Every fragment of `self` is also a fragment of `other`
    pub fn is_subset_of(&self, other: &Candidate) -> bool {
        self.fragments.iter().all(|f| other.fragments.contains(f))
    }

    pub fn is_proper_subset_of(&self, other: &Candidate) -> bool {
        self.len() < other.len() && self.is_subset_of(other)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern())
    }
}

/// How the P1 & P3 count of a candidate is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    /// Number of base matches whose fragments include the candidate
    Observed(usize),
    /// Must be counted by the engine
    Query,
}

/// Candidate generation in keyed mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Combine the fragments read off each match
    #[default]
    PerMatch,
    /// Cross the values observed for each key reference
    ValueProduct,
}

/// Candidates in first-seen order
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    entries: Vec<(Candidate, Support)>,
    index: FxHashMap<Candidate, usize>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyed mode, per match: one fragment list per match of the base pattern
    ///
    /// Largest mode yields the full list of each match, exhaustive mode every
    /// non-empty subset of it. Matches without fragments yield nothing. The
    /// support of a candidate is the number of matches whose list contains
    /// all of its fragments.
    pub fn from_matches<I>(fragment_lists: I, exhaustive: bool) -> Self
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut set = Self::new();
        let mut largest_per_match = Vec::new();
        for fragments in fragment_lists {
            let Some(largest) = Candidate::new(fragments) else {
                continue;
            };
            if exhaustive {
                for subset in largest.fragments.iter().cloned().powerset() {
                    if let Some(candidate) = Candidate::new(subset) {
                        set.observe(candidate);
                    }
                }
            } else {
                set.insert(largest.clone(), Support::Observed(0));
                largest_per_match.push(largest);
            }
        }

        if !exhaustive {
            for (candidate, support) in &mut set.entries {
                let count = largest_per_match
                    .iter()
                    .filter(|other| candidate.is_subset_of(other))
                    .count();
                *support = Support::Observed(count);
            }
        }
        set
    }

    /// Keyed mode, value product: one group of alternative fragments per key
    ///
    /// Largest mode crosses all groups; exhaustive mode crosses every
    /// non-empty subset of groups.
    pub fn from_value_groups(groups: &[Vec<String>], exhaustive: bool) -> Self {
        let mut set = Self::new();
        let subsets: Vec<Vec<&Vec<String>>> = if exhaustive {
            groups.iter().powerset().filter(|s| !s.is_empty()).collect()
        } else if groups.is_empty() {
            Vec::new()
        } else {
            vec![groups.iter().collect()]
        };

        for subset in subsets {
            for combination in subset
                .into_iter()
                .map(|group| group.iter())
                .multi_cartesian_product()
            {
                if let Some(candidate) = Candidate::new(combination.into_iter().cloned()) {
                    set.insert(candidate, Support::Query);
                }
            }
        }
        set
    }

    /// Literal mode: the whole list, or every non-empty subset of it
    pub fn from_literals(fragments: &[String], exhaustive: bool) -> Self {
        let mut set = Self::new();
        if exhaustive {
            for subset in fragments.iter().cloned().powerset() {
                if let Some(candidate) = Candidate::new(subset) {
                    set.insert(candidate, Support::Query);
                }
            }
        } else if let Some(candidate) = Candidate::new(fragments.iter().cloned()) {
            set.insert(candidate, Support::Query);
        }
        set
    }

    /// Count one more occurrence of a per-match candidate
    fn observe(&mut self, candidate: Candidate) {
        match self.index.get(&candidate) {
            Some(&idx) => {
                if let Support::Observed(count) = &mut self.entries[idx].1 {
                    *count += 1;
                }
            }
            None => self.insert(candidate, Support::Observed(1)),
        }
    }

    fn insert(&mut self, candidate: Candidate, support: Support) {
        if self.index.contains_key(&candidate) {
            return;
        }
        self.index.insert(candidate.clone(), self.entries.len());
        self.entries.push((candidate, support));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Candidate, Support)> {
        self.entries.iter().map(|(candidate, support)| (candidate, *support))
    }

    pub fn support(&self, candidate: &Candidate) -> Option<Support> {
        self.index.get(candidate).map(|&idx| self.entries[idx].1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn candidate(items: &[&str]) -> Candidate {
        Candidate::new(items.iter().copied()).unwrap()
    }

    #[test]
    fn test_candidate_basics() {
        let c = candidate(&["X[upos=NOUN]", "X-[det]->Y", "X[upos=NOUN]"]);
        assert_eq!(c.len(), 2);
        assert_eq!(c.pattern(), "X[upos=NOUN]; X-[det]->Y");
        assert!(candidate(&["X-[det]->Y"]).is_subset_of(&c));
        assert!(!c.is_subset_of(&candidate(&["X-[det]->Y"])));
        assert!(candidate(&["X-[det]->Y"]).is_proper_subset_of(&c));
        assert!(!c.is_proper_subset_of(&candidate(&["X-[det]->Y", "X[upos=NOUN]"])));
        assert!(Candidate::new(Vec::<String>::new()).is_none());
    }

    #[test]
    fn test_largest_per_match_counts_matches() {
        let lists = vec![
            strings(&["X[upos=DET]", "X-[det]->Y"]),
            strings(&["X[upos=DET]", "X-[det]->Y"]),
            strings(&["X[upos=ADJ]", "X-[amod]->Y"]),
            Vec::new(),
        ];
        let set = CandidateSet::from_matches(lists, false);

        assert_eq!(set.len(), 2);
        let support = set.support(&candidate(&["X[upos=DET]", "X-[det]->Y"]));
        assert_eq!(support, Some(Support::Observed(2)));
        let order: Vec<_> = set.iter().map(|(c, _)| c.pattern()).collect();
        assert_eq!(order[1], "X[upos=ADJ]; X-[amod]->Y");
    }

    #[test]
    fn test_largest_support_includes_richer_matches() {
        // The third noun has no Gender
        let lists = vec![
            strings(&["Y[Gender=Masc]", "Y[upos=NOUN]"]),
            strings(&["Y[Gender=Fem]", "Y[upos=NOUN]"]),
            strings(&["Y[upos=NOUN]"]),
        ];
        let set = CandidateSet::from_matches(lists, false);

        assert_eq!(set.len(), 3);
        assert_eq!(set.support(&candidate(&["Y[upos=NOUN]"])), Some(Support::Observed(3)));
        assert_eq!(
            set.support(&candidate(&["Y[Gender=Fem]", "Y[upos=NOUN]"])),
            Some(Support::Observed(1))
        );
    }

    #[test]
    fn test_exhaustive_per_match_counts_subsets() {
        let lists = vec![strings(&["A", "B"]), strings(&["A", "C"])];
        let set = CandidateSet::from_matches(lists, true);

        // {A}, {B}, {A,B}, {C}, {A,C}
        assert_eq!(set.len(), 5);
        assert_eq!(set.support(&candidate(&["A"])), Some(Support::Observed(2)));
        assert_eq!(set.support(&candidate(&["A", "C"])), Some(Support::Observed(1)));
    }

    #[test]
    fn test_value_groups() {
        let groups = vec![strings(&["X[Number=Sing]", "X[Number=Plur]"]), strings(&["X-[det]->Y"])];

        let largest = CandidateSet::from_value_groups(&groups, false);
        let patterns: Vec<_> = largest.iter().map(|(c, _)| c.pattern()).collect();
        assert_eq!(
            patterns,
            vec!["X[Number=Sing]; X-[det]->Y", "X[Number=Plur]; X-[det]->Y"]
        );
        assert!(largest.iter().all(|(_, s)| s == Support::Query));

        let exhaustive = CandidateSet::from_value_groups(&groups, true);
        // 2 + 1 + 2
        assert_eq!(exhaustive.len(), 5);

        assert!(CandidateSet::from_value_groups(&[], false).is_empty());
    }

    #[test]
    fn test_literals() {
        let fragments = strings(&["X[upos=NOUN]", "X << Y"]);
        let largest = CandidateSet::from_literals(&fragments, false);
        assert_eq!(largest.len(), 1);
        assert_eq!(
            largest.support(&candidate(&["X[upos=NOUN]", "X << Y"])),
            Some(Support::Query)
        );
        assert_eq!(CandidateSet::from_literals(&fragments, true).len(), 3);
        assert!(CandidateSet::from_literals(&[], true).is_empty());
    }

    #[test]
    fn test_strategy_serde_names() {
        // proptest's prelude exports its own `Strategy`
        let strategy: super::Strategy = serde_json::from_str("\"value-product\"").unwrap();
        assert_eq!(strategy, super::Strategy::ValueProduct);
        assert_eq!(
            serde_json::to_string(&super::Strategy::PerMatch).unwrap(),
            "\"per-match\""
        );
    }

    proptest! {
        #[test]
        fn prop_exhaustive_literals_are_all_nonempty_subsets(n in 1usize..8) {
            let fragments: Vec<String> = (0..n).map(|i| format!("X{i}[]")).collect();
            let set = CandidateSet::from_literals(&fragments, true);
            prop_assert_eq!(set.len(), (1usize << n) - 1);
        }

        #[test]
        fn prop_largest_mode_one_candidate_per_match(
            lists in prop::collection::vec(prop::collection::vec(0u8..4, 0..4), 0..20)
        ) {
            let lists: Vec<Vec<String>> = lists
                .into_iter()
                .map(|l| l.into_iter().map(|v| format!("X[a={v}]")).collect())
                .collect();
            let set = CandidateSet::from_matches(lists.clone(), false);

            for list in &lists {
                if let Some(own) = Candidate::new(list.iter().cloned()) {
                    prop_assert!(set.support(&own).is_some());
                }
            }
            for (candidate, support) in set.iter() {
                let containing = lists
                    .iter()
                    .filter(|l| candidate.fragments().iter().all(|f| l.contains(f)))
                    .count();
                prop_assert_eq!(support, Support::Observed(containing));
            }
        }
    }
}

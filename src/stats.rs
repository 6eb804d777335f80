//! Significance of a candidate
//!
//! Each candidate is scored on the 2x2 table
//!
//! ```text
//!                    outcome    no outcome
//!   candidate        k          N - k
//!   no candidate     n - k      M - n - N + k
//! ```
//!
//! with a one-sided Fisher exact test: the probability of seeing at least `k`
//! joint occurrences if candidate and outcome were independent.

use std::fmt;
use thiserror::Error;

/// Largest p-value reported as significant
///
/// Fixed; no correction for the number of candidates tested.
pub const SIGNIFICANCE_THRESHOLD: f64 = 0.01;

/// The four counts of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    /// M: matches of P1
    pub total: usize,
    /// n: matches of P1 & P2
    pub outcome: usize,
    /// N: matches of P1 & candidate
    pub predictor: usize,
    /// k: matches of P1 & P2 & candidate
    pub joint: usize,
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "M={}, n={}, N={}, k={}",
            self.total, self.outcome, self.predictor, self.joint
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContingencyError {
    #[error("joint count exceeds a marginal ({0})")]
    JointExceedsMarginal(Counts),

    #[error("marginal exceeds the total ({0})")]
    MarginalExceedsTotal(Counts),

    #[error("negative cell M - n - N + k ({0})")]
    NegativeCell(Counts),
}

/// A validated 2x2 table `[[a, b], [c, d]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContingencyTable {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

impl ContingencyTable {
    pub fn from_counts(counts: Counts) -> Result<Self, ContingencyError> {
        let Counts {
            total,
            outcome,
            predictor,
            joint,
        } = counts;

        if joint > outcome || joint > predictor {
            return Err(ContingencyError::JointExceedsMarginal(counts));
        }
        if outcome.min(predictor) > total {
            return Err(ContingencyError::MarginalExceedsTotal(counts));
        }
        let d = (total + joint)
            .checked_sub(outcome + predictor)
            .ok_or(ContingencyError::NegativeCell(counts))?;

        Ok(Self {
            a: joint as u64,
            b: (outcome - joint) as u64,
            c: (predictor - joint) as u64,
            d: d as u64,
        })
    }

    pub fn cells(&self) -> [[u64; 2]; 2] {
        [[self.a, self.b], [self.c, self.d]]
    }

    /// Sample odds ratio `ad / bc`; infinite or NaN when `bc = 0`
    pub fn odds_ratio(&self) -> f64 {
        (self.a as f64 * self.d as f64) / (self.b as f64 * self.c as f64)
    }
}

/// Scores of one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub counts: Counts,
    pub p_value: f64,
    pub odds_ratio: f64,
    /// `(k/N) / ((n-k)/(M-N))`
    pub probability_ratio: f64,
    /// `100 k/n`
    pub percent_outcome: f64,
    /// `100 k/N`
    pub percent_predictor: f64,
}

impl Assessment {
    pub fn is_significant(&self) -> bool {
        self.p_value < SIGNIFICANCE_THRESHOLD
    }

    pub fn significance(&self) -> Significance {
        Significance::of(self.p_value)
    }
}

/// Scores candidates against fixed M and n
///
/// Log-factorials up to M are tabulated once, so each test costs one pass
/// over the tail of the distribution.
#[derive(Debug, Clone)]
pub struct Evaluator {
    total: usize,
    outcome: usize,
    ln_factorial: Vec<f64>,
}

impl Evaluator {
    pub fn new(total: usize, outcome: usize) -> Self {
        // Neumaier-compensated running sum
        let mut ln_factorial = Vec::with_capacity(total + 1);
        ln_factorial.push(0.0);
        let (mut sum, mut compensation) = (0.0_f64, 0.0_f64);
        for i in 1..=total {
            let term = (i as f64).ln();
            let next = sum + term;
            compensation += if sum.abs() >= term.abs() {
                (sum - next) + term
            } else {
                (term - next) + sum
            };
            sum = next;
            ln_factorial.push(sum + compensation);
        }
        Self {
            total,
            outcome,
            ln_factorial,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn outcome(&self) -> usize {
        self.outcome
    }

    pub fn assess(&self, predictor: usize, joint: usize) -> Result<Assessment, ContingencyError> {
        let counts = Counts {
            total: self.total,
            outcome: self.outcome,
            predictor,
            joint,
        };
        let table = ContingencyTable::from_counts(counts)?;

        let (m, n, big_n, k) = (
            self.total as f64,
            self.outcome as f64,
            predictor as f64,
            joint as f64,
        );

        Ok(Assessment {
            counts,
            p_value: self.upper_tail(predictor, joint),
            odds_ratio: table.odds_ratio(),
            probability_ratio: (k / big_n) / ((n - k) / (m - big_n)),
            percent_outcome: 100.0 * k / n,
            percent_predictor: 100.0 * k / big_n,
        })
    }

    /// Hypergeometric P(X >= k): population M, n successes, N draws
    fn upper_tail(&self, predictor: usize, joint: usize) -> f64 {
        let upper = self.outcome.min(predictor);
        let ln_denominator = self.ln_choose(self.total, predictor);
        let p: f64 = (joint..=upper)
            .map(|x| {
                (self.ln_choose(self.outcome, x)
                    + self.ln_choose(self.total - self.outcome, predictor - x)
                    - ln_denominator)
                    .exp()
            })
            .sum();
        p.min(1.0)
    }

    fn ln_choose(&self, n: usize, k: usize) -> f64 {
        self.ln_factorial[n] - self.ln_factorial[k] - self.ln_factorial[n - k]
    }
}

/// Compact rendering of a p-value
///
/// The number of zeros after the decimal point (`0.00043` -> 3), or the
/// exponent magnitude once the value is printed in scientific notation
/// (`4.3e-05` -> 5). Display only; ranking uses the raw p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Significance {
    Finite(u32),
    Infinite,
}

impl Significance {
    pub fn of(p_value: f64) -> Self {
        if p_value == 0.0 {
            return Significance::Infinite;
        }
        let exponent = format!("{p_value:e}")
            .split_once('e')
            .and_then(|(_, e)| e.parse::<i32>().ok())
            .unwrap_or(0);
        let digits = match exponent {
            e if e < -4 => -e,
            e if e < 0 => -e - 1,
            _ => 0,
        };
        Significance::Finite(digits.unsigned_abs())
    }
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Significance::Finite(digits) => write!(f, "{digits}"),
            Significance::Infinite => f.write_str("inf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_ln_factorial_at_corpus_scale() {
        let n = 400_000usize;
        let evaluator = Evaluator::new(n, n / 2);
        let x = n as f64;
        let stirling = x * x.ln() - x + 0.5 * (2.0 * std::f64::consts::PI * x).ln()
            + 1.0 / (12.0 * x)
            - 1.0 / (360.0 * x.powi(3));
        approx::assert_abs_diff_eq!(evaluator.ln_factorial[n], stirling, epsilon = 1e-8);

        let assessment = evaluator.assess(1000, 560).unwrap();
        assert_relative_eq!(assessment.p_value, 8.0982796e-5, max_relative = 1e-7);
    }

    #[test]
    fn test_reference_table() {
        let evaluator = Evaluator::new(100, 40);
        let assessment = evaluator.assess(30, 20).unwrap();

        let table = ContingencyTable::from_counts(assessment.counts).unwrap();
        assert_eq!(table.cells(), [[20, 20], [10, 50]]);
        assert_relative_eq!(
            assessment.p_value,
            0.0004310625524240636,
            max_relative = 1e-9
        );
        assert_relative_eq!(assessment.odds_ratio, 5.0);
        assert_relative_eq!(
            assessment.probability_ratio,
            2.3333333333333335,
            max_relative = 1e-12
        );
        assert_relative_eq!(assessment.percent_outcome, 50.0);
        assert_relative_eq!(assessment.percent_predictor, 200.0 / 3.0);
        assert!(assessment.is_significant());
        assert_eq!(assessment.significance(), Significance::Finite(3));
    }

    #[test]
    fn test_exact_small_tail() {
        // Perfect association: p = 1 / C(20, 10)
        let assessment = Evaluator::new(20, 10).assess(10, 10).unwrap();
        assert_relative_eq!(assessment.p_value, 1.0 / 184756.0, max_relative = 1e-9);
        assert!(assessment.probability_ratio.is_infinite());
        assert!(assessment.odds_ratio.is_infinite());
    }

    #[test]
    fn test_zero_joint_is_certain() {
        let assessment = Evaluator::new(10, 4).assess(3, 0).unwrap();
        assert_relative_eq!(assessment.p_value, 1.0, max_relative = 1e-9);
        assert!(!assessment.is_significant());
    }

    #[test]
    fn test_degenerate_ratios() {
        // N = 0: k/N is 0/0
        let assessment = Evaluator::new(5, 2).assess(0, 0).unwrap();
        assert!(assessment.percent_predictor.is_nan());
        assert!(assessment.probability_ratio.is_nan());
    }

    #[test]
    fn test_inconsistent_counts() {
        let evaluator = Evaluator::new(10, 4);
        assert!(matches!(
            evaluator.assess(3, 4),
            Err(ContingencyError::JointExceedsMarginal(_))
        ));
        assert!(matches!(
            evaluator.assess(9, 1),
            Err(ContingencyError::NegativeCell(_))
        ));
        assert!(matches!(
            Evaluator::new(3, 5).assess(4, 2),
            Err(ContingencyError::MarginalExceedsTotal(_))
        ));
    }

    #[test]
    fn test_significance_display() {
        assert_eq!(Significance::of(0.00043), Significance::Finite(3));
        assert_eq!(Significance::of(0.0001), Significance::Finite(3));
        assert_eq!(Significance::of(0.005), Significance::Finite(2));
        assert_eq!(Significance::of(4.3e-5), Significance::Finite(5));
        assert_eq!(Significance::of(1.2e-120), Significance::Finite(120));
        assert_eq!(Significance::of(0.5), Significance::Finite(0));
        assert_eq!(Significance::of(0.0), Significance::Infinite);
        assert_eq!(Significance::Infinite.to_string(), "inf");
        assert_eq!(Significance::Finite(7).to_string(), "7");
    }

    proptest! {
        #[test]
        fn prop_valid_counts_give_non_negative_cells(
            a in 0usize..60,
            b in 0usize..60,
            c in 0usize..60,
            d in 0usize..60,
        ) {
            // Draw cells, derive the counts
            let total = a + b + c + d;
            let counts = Counts { total, outcome: a + b, predictor: a + c, joint: a };
            let table = ContingencyTable::from_counts(counts).unwrap();
            prop_assert_eq!(table.a + table.b + table.c + table.d, total as u64);

            let p = Evaluator::new(total, a + b).assess(a + c, a).unwrap().p_value;
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}

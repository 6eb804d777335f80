//! TSV report

use crate::extract::Extraction;
use crate::filter::Rule;
use std::io::{self, Write};

pub const HEADER: [&str; 5] = [
    "pattern",
    "p-value",
    "probability ratio",
    "% of P1&P2",
    "% of P1&P3",
];

/// Rendering of the p-value column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PValueStyle {
    #[default]
    Raw,
    /// Leading-zero count, see [`Significance`](crate::stats::Significance)
    Significance,
}

/// Write retained rules, then one `undefined` row per malformed candidate
pub fn write_report<W: Write>(
    out: &mut W,
    extraction: &Extraction,
    style: PValueStyle,
) -> io::Result<()> {
    writeln!(out, "{}", HEADER.join("\t"))?;
    for rule in &extraction.records {
        write_rule(out, rule, style)?;
    }
    for (candidate, _) in &extraction.anomalies {
        writeln!(out, "{candidate}\tundefined\tundefined\tundefined\tundefined")?;
    }
    Ok(())
}

fn write_rule<W: Write>(out: &mut W, rule: &Rule, style: PValueStyle) -> io::Result<()> {
    let a = &rule.assessment;
    let p_value = match style {
        PValueStyle::Raw => a.p_value.to_string(),
        PValueStyle::Significance => a.significance().to_string(),
    };
    writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}",
        rule.candidate, p_value, a.probability_ratio, a.percent_outcome, a.percent_predictor
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::Candidate;
    use crate::stats::{ContingencyError, Counts, Evaluator};

    fn extraction() -> Extraction {
        let evaluator = Evaluator::new(100, 40);
        let rule = Rule {
            candidate: Candidate::new(["X[upos=NOUN]", "X-[det]->Y"]).unwrap(),
            assessment: evaluator.assess(30, 20).unwrap(),
        };
        let bad = Counts {
            total: 100,
            outcome: 40,
            predictor: 3,
            joint: 5,
        };
        Extraction {
            total: 100,
            outcome: 40,
            evaluations: vec![rule.clone()],
            records: vec![rule],
            anomalies: vec![(
                Candidate::new(["Y[upos=ADJ]"]).unwrap(),
                ContingencyError::JointExceedsMarginal(bad),
            )],
        }
    }

    #[test]
    fn test_raw_report() {
        let mut out = Vec::new();
        write_report(&mut out, &extraction(), PValueStyle::Raw).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(
            lines[0],
            "pattern\tp-value\tprobability ratio\t% of P1&P2\t% of P1&P3"
        );
        let cells: Vec<_> = lines[1].split('\t').collect();
        assert_eq!(cells[0], "X[upos=NOUN]; X-[det]->Y");
        assert!(cells[1].starts_with("0.00043106"));
        assert_eq!(cells[3], "50");
        assert_eq!(lines[2], "Y[upos=ADJ]\tundefined\tundefined\tundefined\tundefined");
    }

    #[test]
    fn test_significance_report() {
        let mut out = Vec::new();
        write_report(&mut out, &extraction(), PValueStyle::Significance).unwrap();
        let text = String::from_utf8(out).unwrap();
        let cells: Vec<_> = text.lines().nth(1).unwrap().split('\t').collect();
        assert_eq!(cells[1], "3");
    }
}

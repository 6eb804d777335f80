//! Predictor resolution
//!
//! P3 is a `;`-separated list. Either every element is a key reference
//! (`X.Number`, `e.label`) whose values are read off each match of P1, or
//! every element is a literal pattern clause used as is.

use crate::engine::Match;
use crate::treebank::{DEPREL, Treebank};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref KEY_REFERENCE: Regex =
        Regex::new(r"^([A-Za-z_]\w*)\.([A-Za-z_]\w*)$").expect("Invalid key reference regex");
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PredictorError {
    #[error("No predictor given")]
    Empty,

    #[error("Cannot mix key references ({keyed}) and literal clauses ({literal}) in predictors")]
    MixedPredictors { keyed: String, literal: String },

    #[error("{0}.label does not name an edge of the base pattern")]
    UnresolvedLabel(String),
}

/// How one key reference turns a match into a pattern clause
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FragmentSpec {
    /// `node[attribute=value]`
    Attribute { node: String, attribute: String },
    /// `head-[label]->dep`, label read from the dependent token
    EdgeLabel { head: String, dep: String },
}

impl FragmentSpec {
    /// Node the fragment is read from
    pub fn node(&self) -> &str {
        match self {
            FragmentSpec::Attribute { node, .. } => node,
            FragmentSpec::EdgeLabel { dep, .. } => dep,
        }
    }

    /// Concrete clause for one match
    ///
    /// None when the node is not bound by the match or its token lacks the
    /// attribute.
    pub fn synthesize(&self, m: &Match, treebank: &Treebank) -> Option<String> {
        let token = m.get(self.node())?;
        match self {
            FragmentSpec::Attribute { node, attribute } => {
                let value = treebank.attribute(&m.sent_id, token, attribute)?;
                Some(format!("{node}[{attribute}={}]", quote_value(value)))
            }
            FragmentSpec::EdgeLabel { head, dep } => {
                let label = treebank.attribute(&m.sent_id, token, DEPREL)?;
                Some(format!("{head}-[{label}]->{dep}"))
            }
        }
    }
}

/// Values outside `[A-Za-z0-9_]` are double-quoted, with `"` and `\` escaped
fn quote_value(value: &str) -> String {
    if value.chars().all(|c| c.is_alphanumeric() || c == '_') {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Key references grouped by node, in order of first appearance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyedPredictors {
    groups: Vec<(String, Vec<FragmentSpec>)>,
}

impl KeyedPredictors {
    fn push(&mut self, spec: FragmentSpec) {
        let node = spec.node().to_string();
        match self.groups.iter_mut().find(|(name, _)| *name == node) {
            Some((_, specs)) => {
                if !specs.contains(&spec) {
                    specs.push(spec);
                }
            }
            None => self.groups.push((node, vec![spec])),
        }
    }

    pub fn groups(&self) -> &[(String, Vec<FragmentSpec>)] {
        &self.groups
    }

    /// All specs, node by node
    pub fn specs(&self) -> impl Iterator<Item = &FragmentSpec> {
        self.groups.iter().flat_map(|(_, specs)| specs)
    }

    /// Fragments of one match, skipping the ones that cannot be synthesized
    pub fn synthesize(&self, m: &Match, treebank: &Treebank) -> Vec<String> {
        self.specs()
            .filter_map(|spec| spec.synthesize(m, treebank))
            .collect()
    }
}

/// Resolved P3
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predictors {
    Keyed(KeyedPredictors),
    Literal(Vec<String>),
}

/// Classify and resolve the predictor list against the base pattern
pub fn resolve(base: &str, predictors: &str) -> Result<Predictors, PredictorError> {
    let mut elements: Vec<&str> = Vec::new();
    for element in predictors.split(';').map(str::trim) {
        if !element.is_empty() && !elements.contains(&element) {
            elements.push(element);
        }
    }
    if elements.is_empty() {
        return Err(PredictorError::Empty);
    }

    let (keyed, literal): (Vec<&str>, Vec<&str>) = elements
        .iter()
        .partition(|element| KEY_REFERENCE.is_match(element));

    match (keyed.first(), literal.first()) {
        (Some(k), Some(l)) => Err(PredictorError::MixedPredictors {
            keyed: k.to_string(),
            literal: l.to_string(),
        }),
        (None, _) => Ok(Predictors::Literal(
            literal.into_iter().map(str::to_string).collect(),
        )),
        (Some(_), None) => {
            let mut resolved = KeyedPredictors::default();
            for element in keyed {
                let Some(captures) = KEY_REFERENCE.captures(element) else {
                    continue;
                };
                let (name, attribute) = (&captures[1], &captures[2]);
                let spec = if attribute == "label" {
                    let (head, dep) = find_edge(base, name)
                        .ok_or_else(|| PredictorError::UnresolvedLabel(name.to_string()))?;
                    FragmentSpec::EdgeLabel { head, dep }
                } else {
                    FragmentSpec::Attribute {
                        node: name.to_string(),
                        attribute: attribute.to_string(),
                    }
                };
                resolved.push(spec);
            }
            Ok(Predictors::Keyed(resolved))
        }
    }
}

/// Head and dependent of the edge `name` in the base pattern
///
/// `name` is first looked up as an edge binding (`name:H->D`), then as the
/// dependent node of an edge (`H->name`).
fn find_edge(base: &str, name: &str) -> Option<(String, String)> {
    let escaped = regex::escape(name);
    let arrow = r"\s*-(?:\[[^\]]*\]-)?>\s*";

    let bound = Regex::new(&format!(r"(?:^|[^\w]){escaped}\s*:\s*(\w+){arrow}(\w+)")).ok()?;
    if let Some(captures) = bound.captures(base) {
        return Some((captures[1].to_string(), captures[2].to_string()));
    }

    let incoming = Regex::new(&format!(r"(\w+){arrow}{escaped}\b")).ok()?;
    incoming
        .captures(base)
        .map(|captures| (captures[1].to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::QueryEngine;

    const CORPUS: &str = "# sent_id = s1\n\
        1\tl'homme\tl'homme\tNOUN\t_\tNumber=Sing\t2\tnsubj\t_\t_\n\
        2\tdort\tdormir\tVERB\t_\tNumber=Sing\t0\troot\t_\t_\n\n";

    fn sample_match() -> Match {
        Match {
            sent_id: "s1".to_string(),
            nodes: vec![("X".to_string(), 2), ("Y".to_string(), 1)],
        }
    }

    #[test]
    fn test_literal_predictors() {
        let resolved = resolve("X->Y", " Y[upos=NOUN] ; X << Y;;Y[upos=NOUN]").unwrap();
        assert_eq!(
            resolved,
            Predictors::Literal(vec!["Y[upos=NOUN]".to_string(), "X << Y".to_string()])
        );
    }

    #[test]
    fn test_keyed_predictors_grouped_by_node() {
        let resolved = resolve("e:X->Y", "Y.upos; X.lemma; e.label; Y.Number; Y.upos").unwrap();
        let Predictors::Keyed(keyed) = resolved else {
            panic!("expected keyed predictors");
        };

        let nodes: Vec<_> = keyed.groups().iter().map(|(node, _)| node.as_str()).collect();
        assert_eq!(nodes, vec!["Y", "X"]);
        assert_eq!(keyed.groups()[0].1.len(), 3);
        assert_eq!(
            keyed.groups()[0].1[1],
            FragmentSpec::EdgeLabel {
                head: "X".to_string(),
                dep: "Y".to_string()
            }
        );
    }

    #[test]
    fn test_label_lookup() {
        assert_eq!(
            find_edge("X[upos=VERB]; rel: X -[nsubj|obj]-> Y", "rel"),
            Some(("X".to_string(), "Y".to_string()))
        );
        // Node name: the edge ending at that node
        assert_eq!(
            find_edge("V->N; N[upos=NOUN]", "N"),
            Some(("V".to_string(), "N".to_string()))
        );
        // An edge binding is not mistaken for a longer name
        assert_eq!(find_edge("pe:X->Y", "e"), None);
        assert_eq!(
            resolve("X[upos=VERB]", "e.label"),
            Err(PredictorError::UnresolvedLabel("e".to_string()))
        );
    }

    #[test]
    fn test_mixed_and_empty() {
        assert!(matches!(
            resolve("X->Y", "X.upos; Y[upos=NOUN]"),
            Err(PredictorError::MixedPredictors { .. })
        ));
        assert_eq!(resolve("X->Y", " ; "), Err(PredictorError::Empty));
    }

    #[test]
    fn test_synthesize() {
        let treebank = Treebank::from_string(CORPUS).unwrap();
        let m = sample_match();

        let label = FragmentSpec::EdgeLabel {
            head: "X".to_string(),
            dep: "Y".to_string(),
        };
        assert_eq!(label.synthesize(&m, &treebank).as_deref(), Some("X-[nsubj]->Y"));

        let upos = FragmentSpec::Attribute {
            node: "Y".to_string(),
            attribute: "upos".to_string(),
        };
        assert_eq!(upos.synthesize(&m, &treebank).as_deref(), Some("Y[upos=NOUN]"));

        let lemma = FragmentSpec::Attribute {
            node: "Y".to_string(),
            attribute: "lemma".to_string(),
        };
        assert_eq!(
            lemma.synthesize(&m, &treebank).as_deref(),
            Some("Y[lemma=\"l'homme\"]")
        );

        let missing = FragmentSpec::Attribute {
            node: "X".to_string(),
            attribute: "Gender".to_string(),
        };
        assert_eq!(missing.synthesize(&m, &treebank), None);

        let unbound = FragmentSpec::Attribute {
            node: "Z".to_string(),
            attribute: "upos".to_string(),
        };
        assert_eq!(unbound.synthesize(&m, &treebank), None);
    }

    #[test]
    fn test_quote_value() {
        assert_eq!(quote_value("Plur"), "Plur");
        assert_eq!(quote_value("l'homme"), "\"l'homme\"");
        assert_eq!(quote_value("\""), r#""\"""#);
        assert_eq!(quote_value("a\\b"), r#""a\\b""#);
    }

    #[test]
    fn test_quoted_fragment_matches_its_token() {
        let conllu = "# sent_id = q\n\
                      1\t\"\t\"\tPUNCT\t_\t_\t2\tpunct\t_\t_\n\
                      2\tdit\tdire\tVERB\t_\t_\t0\troot\t_\t_\n\n";
        let treebank = Treebank::from_string(conllu).unwrap();
        let engine = crate::engine::NativeEngine::new(&treebank);
        let m = &engine.search("pattern { V -> P }").unwrap()[0];

        let form = FragmentSpec::Attribute {
            node: "P".to_string(),
            attribute: "form".to_string(),
        };
        let fragment = form.synthesize(m, &treebank).unwrap();
        assert_eq!(fragment, r#"P[form="\""]"#);
        let query = crate::query::compose(&["V -> P", &fragment]);
        assert_eq!(engine.count(&query).unwrap(), 1);
    }

    #[test]
    fn test_synthesize_skips_missing() {
        let treebank = Treebank::from_string(CORPUS).unwrap();
        let Predictors::Keyed(keyed) = resolve("X->Y", "X.Gender; X.Number; Y.upos").unwrap()
        else {
            panic!("expected keyed predictors");
        };
        assert_eq!(
            keyed.synthesize(&sample_match(), &treebank),
            vec!["X[Number=Sing]", "Y[upos=NOUN]"]
        );
    }
}

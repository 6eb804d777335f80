//! Treebank: the attribute store behind pattern matching and fragment synthesis
//!
//! Sentences are kept in file order and indexed by `sent_id`. All attribute
//! names and values share one string pool, so the matcher compares symbols
//! instead of strings.

use crate::conllu::{CoNLLUReader, ParseError, SentenceRecord};
use crate::tree::{Sentence, Sym, Token, TokenId};
use lasso::Rodeo;
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Attribute names of the core CoNLL-U columns
pub const FORM: &str = "form";
pub const LEMMA: &str = "lemma";
pub const UPOS: &str = "upos";
pub const XPOS: &str = "xpos";
pub const DEPREL: &str = "deprel";

#[derive(Debug, Error)]
pub enum TreebankError {
    #[error("Failed to open {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Duplicate sentence id: {0}")]
    DuplicateSentenceId(String),
}

/// An in-memory treebank
pub struct Treebank {
    sentences: Vec<Sentence>,
    by_id: FxHashMap<String, usize>,
    strings: Rodeo,
}

impl Treebank {
    pub fn new() -> Self {
        Self {
            sentences: Vec::new(),
            by_id: FxHashMap::default(),
            strings: Rodeo::default(),
        }
    }

    /// Load from in-memory CoNLL-U text
    pub fn from_string(text: &str) -> Result<Self, TreebankError> {
        let mut treebank = Self::new();
        for record in CoNLLUReader::from_string(text) {
            treebank.push(record?)?;
        }
        Ok(treebank)
    }

    /// Load from a CoNLL-U file (plain or gzipped)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TreebankError> {
        let path = path.as_ref();
        let reader = CoNLLUReader::from_file(path).map_err(|source| TreebankError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let mut treebank = Self::new();
        for record in reader {
            treebank.push(record?)?;
        }
        tracing::info!(
            path = %path.display(),
            sentences = treebank.len(),
            "treebank loaded"
        );
        Ok(treebank)
    }

    /// Intern a parsed sentence and append it
    ///
    /// Sentences without a `sent_id` comment are named by their 1-based
    /// position in the treebank.
    pub fn push(&mut self, record: SentenceRecord) -> Result<(), TreebankError> {
        let sent_id = record
            .sent_id
            .unwrap_or_else(|| (self.sentences.len() + 1).to_string());
        if self.by_id.contains_key(&sent_id) {
            return Err(TreebankError::DuplicateSentenceId(sent_id));
        }

        let form = self.strings.get_or_intern_static(FORM);
        let lemma = self.strings.get_or_intern_static(LEMMA);
        let upos = self.strings.get_or_intern_static(UPOS);
        let xpos = self.strings.get_or_intern_static(XPOS);
        let deprel = self.strings.get_or_intern_static(DEPREL);

        let tokens = record
            .tokens
            .into_iter()
            .map(|t| {
                let mut attrs = Vec::with_capacity(5 + t.feats.len());
                attrs.push((form, self.strings.get_or_intern(&t.form)));
                attrs.push((lemma, self.strings.get_or_intern(&t.lemma)));
                attrs.push((upos, self.strings.get_or_intern(&t.upos)));
                if let Some(value) = &t.xpos {
                    attrs.push((xpos, self.strings.get_or_intern(value)));
                }
                attrs.push((deprel, self.strings.get_or_intern(&t.deprel)));
                for (key, value) in &t.feats {
                    attrs.push((
                        self.strings.get_or_intern(key),
                        self.strings.get_or_intern(value),
                    ));
                }
                Token::new(t.id, t.head, attrs)
            })
            .collect();

        self.by_id.insert(sent_id.clone(), self.sentences.len());
        self.sentences
            .push(Sentence::new(sent_id, record.text, tokens));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn sentence(&self, sent_id: &str) -> Option<&Sentence> {
        self.by_id.get(sent_id).map(|&idx| &self.sentences[idx])
    }

    /// Symbol of a string already present in the pool
    ///
    /// A string that was never interned cannot be the value of any token.
    #[inline]
    pub fn symbol(&self, s: &str) -> Option<Sym> {
        self.strings.get(s)
    }

    #[inline]
    pub fn resolve(&self, sym: Sym) -> &str {
        self.strings.resolve(&sym)
    }

    /// Value of `name` on token `token` of sentence `sent_id`
    ///
    /// Returns None when the sentence or token is unknown or the token does
    /// not carry the attribute.
    pub fn attribute(&self, sent_id: &str, token: TokenId, name: &str) -> Option<&str> {
        let key = self.symbol(name)?;
        let value = self.sentence(sent_id)?.token(token)?.get(key)?;
        Some(self.resolve(value))
    }
}

impl Default for Treebank {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Treebank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Treebank")
            .field("sentences", &self.sentences.len())
            .field("strings", &self.strings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SENTENCES: &str = "# sent_id = s1\n\
        1\tles\tle\tDET\t_\tNumber=Plur\t2\tdet\t_\t_\n\
        2\tchats\tchat\tNOUN\t_\tGender=Masc|Number=Plur\t3\tnsubj\t_\t_\n\
        3\tdorment\tdormir\tVERB\t_\tNumber=Plur\t0\troot\t_\t_\n\
        \n\
        # sent_id = s2\n\
        1\tDors\tdormir\tVERB\t_\t_\t0\troot\t_\t_\n\n";

    #[test]
    fn test_attribute_lookup() {
        let treebank = Treebank::from_string(TWO_SENTENCES).unwrap();

        assert_eq!(treebank.len(), 2);
        assert_eq!(treebank.attribute("s1", 2, "lemma"), Some("chat"));
        assert_eq!(treebank.attribute("s1", 2, "Gender"), Some("Masc"));
        assert_eq!(treebank.attribute("s1", 2, "deprel"), Some("nsubj"));
        assert_eq!(treebank.attribute("s1", 1, "upos"), Some("DET"));
    }

    #[test]
    fn test_absent_attributes() {
        let treebank = Treebank::from_string(TWO_SENTENCES).unwrap();

        // Feature present elsewhere but not on this token
        assert_eq!(treebank.attribute("s1", 1, "Gender"), None);
        // Empty xpos column is not an attribute
        assert_eq!(treebank.attribute("s1", 1, "xpos"), None);
        // Unknown names, tokens and sentences
        assert_eq!(treebank.attribute("s1", 1, "Mood"), None);
        assert_eq!(treebank.attribute("s1", 9, "upos"), None);
        assert_eq!(treebank.attribute("s9", 1, "upos"), None);
        // The synthetic root carries nothing
        assert_eq!(treebank.attribute("s2", 0, "form"), None);
    }

    #[test]
    fn test_missing_sent_id_uses_position() {
        let conllu = "1\ta\ta\tX\t_\t_\t0\troot\t_\t_\n\n1\tb\tb\tX\t_\t_\t0\troot\t_\t_\n";
        let treebank = Treebank::from_string(conllu).unwrap();
        assert_eq!(treebank.attribute("2", 1, "form"), Some("b"));
    }

    #[test]
    fn test_duplicate_sent_id() {
        let conllu = "# sent_id = a\n1\ta\ta\tX\t_\t_\t0\troot\t_\t_\n\n\
                      # sent_id = a\n1\tb\tb\tX\t_\t_\t0\troot\t_\t_\n";
        let result = Treebank::from_string(conllu);
        assert!(matches!(result, Err(TreebankError::DuplicateSentenceId(id)) if id == "a"));
    }

    #[test]
    fn test_missing_file() {
        let result = Treebank::from_file("/nonexistent/treebank.conllu");
        assert!(matches!(result, Err(TreebankError::FileOpen { .. })));
    }
}

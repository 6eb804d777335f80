//! Sentence and token records
//!
//! A sentence is the unit the query engine matches against: an ordered list
//! of tokens (position 0 is the synthetic root) with interned attributes and
//! precomputed children lists for edge traversal.

use lasso::Spur;

/// Numeric CoNLL-U token id (1-based; 0 is the synthetic root)
pub type TokenId = usize;

/// Interned attribute name or value
pub type Sym = Spur;

/// A single token: interned `name -> value` attribute pairs
///
/// The core columns (`form`, `lemma`, `upos`, `deprel`, and `xpos` when
/// given) are stored alongside the FEATS pairs, so every attribute is looked
/// up the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: TokenId,
    /// Head token id, 0 for the root's dependents
    pub head: TokenId,
    attrs: Vec<(Sym, Sym)>,
}

impl Token {
    pub fn new(id: TokenId, head: TokenId, attrs: Vec<(Sym, Sym)>) -> Self {
        Self { id, head, attrs }
    }

    /// The synthetic root token (id 0, no attributes)
    pub fn root() -> Self {
        Self {
            id: 0,
            head: 0,
            attrs: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == 0
    }

    /// Value of an attribute, if the token carries it
    #[inline]
    pub fn get(&self, name: Sym) -> Option<Sym> {
        self.attrs
            .iter()
            .find_map(|&(key, value)| (key == name).then_some(value))
    }

    pub fn attrs(&self) -> &[(Sym, Sym)] {
        &self.attrs
    }
}

/// One sentence of a treebank
#[derive(Debug, Clone)]
pub struct Sentence {
    pub sent_id: String,
    pub text: Option<String>,
    tokens: Vec<Token>,
    children: Vec<Vec<usize>>,
}

impl Sentence {
    /// Build a sentence from its real tokens (the root is added here)
    ///
    /// Tokens are sorted by id; heads pointing outside the sentence are left
    /// without a parent link.
    pub fn new(sent_id: String, text: Option<String>, mut tokens: Vec<Token>) -> Self {
        tokens.sort_by_key(|t| t.id);
        tokens.insert(0, Token::root());

        let mut children = vec![Vec::new(); tokens.len()];
        for (pos, token) in tokens.iter().enumerate().skip(1) {
            if let Ok(head_pos) = tokens.binary_search_by_key(&token.head, |t| t.id) {
                children[head_pos].push(pos);
            }
        }

        Self {
            sent_id,
            text,
            tokens,
            children,
        }
    }

    /// All tokens, root first
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Real tokens only (the synthetic root is excluded)
    pub fn words(&self) -> &[Token] {
        &self.tokens[1..]
    }

    /// Number of real tokens
    pub fn len(&self) -> usize {
        self.tokens.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of a token id in `tokens()`
    #[inline]
    pub fn position(&self, id: TokenId) -> Option<usize> {
        self.tokens.binary_search_by_key(&id, |t| t.id).ok()
    }

    pub fn token(&self, id: TokenId) -> Option<&Token> {
        self.position(id).map(|pos| &self.tokens[pos])
    }

    #[inline]
    pub fn token_at(&self, pos: usize) -> &Token {
        &self.tokens[pos]
    }

    /// Positions of the dependents of the token at `pos`
    #[inline]
    pub fn children_at(&self, pos: usize) -> &[usize] {
        &self.children[pos]
    }

    /// Position of the head of the token at `pos` (None for root dependents)
    #[inline]
    pub fn head_at(&self, pos: usize) -> Option<usize> {
        let token = &self.tokens[pos];
        if token.is_root() || token.head == 0 {
            return None;
        }
        self.position(token.head)
    }
}

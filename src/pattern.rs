//! Pattern representation
//!
//! AST for the grew-style patterns matched by the native engine. A pattern is
//! one positive block plus any number of `without` blocks; each block is a
//! conjunction of node, edge, order and comparison clauses.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Type alias for pattern variable identifiers (indices into Block.var_names)
pub type VarId = usize;

/// Test on one attribute of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrTest {
    /// `X[upos=NOUN|PROPN]`
    OneOf(Vec<String>),
    /// `X[upos<>NOUN]`; also satisfied when the attribute is absent
    NoneOf(Vec<String>),
    /// `X[Number]`
    Present,
    /// `X[!Number]`
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTest {
    pub name: String,
    pub test: AttrTest,
}

/// Label test on a dependency edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelTest {
    Any,
    /// `-[nsubj|obj]->`
    OneOf(Vec<String>),
    /// `-[^punct]->`
    NoneOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeClause {
    /// Edge binding name (`e` in `e:X->Y`)
    pub name: Option<String>,
    pub head: String,
    pub dep: String,
    pub label: LabelTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRelation {
    /// `X << Y`
    Precedes,
    /// `X < Y`
    ImmediatelyPrecedes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub first: String,
    pub second: String,
    pub relation: OrderRelation,
}

/// `X.Number` or `e.label`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrRef {
    pub owner: String,
    pub attribute: String,
}

/// `X.Number = Y.Number` or `X.lemma <> Y.lemma`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub left: AttrRef,
    pub right: AttrRef,
    pub equal: bool,
}

/// A conjunction of clauses
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub var_ids: HashMap<String, VarId>,
    pub var_names: Vec<String>,
    pub var_tests: Vec<Vec<FeatureTest>>,
    pub edges: Vec<EdgeClause>,
    pub orders: Vec<OrderClause>,
    pub comparisons: Vec<Comparison>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node, merging tests into an earlier declaration
    pub fn add_var(&mut self, var_name: &str, tests: Vec<FeatureTest>) -> VarId {
        match self.var_ids.entry(var_name.to_owned()) {
            Entry::Occupied(e) => {
                let id = *e.get();
                self.var_tests[id].extend(tests);
                id
            }
            Entry::Vacant(e) => {
                let var_id = self.var_names.len();
                e.insert(var_id);
                self.var_names.push(var_name.to_string());
                self.var_tests.push(tests);
                var_id
            }
        }
    }

    pub fn add_edge(&mut self, edge: EdgeClause) {
        self.add_var(&edge.head, Vec::new());
        self.add_var(&edge.dep, Vec::new());
        self.edges.push(edge);
    }

    pub fn add_order(&mut self, order: OrderClause) {
        self.add_var(&order.first, Vec::new());
        self.add_var(&order.second, Vec::new());
        self.orders.push(order);
    }

    /// Comparisons may name edges, so their operands are resolved later
    pub fn add_comparison(&mut self, comparison: Comparison) {
        self.comparisons.push(comparison);
    }

    /// Append all clauses of another block
    pub fn merge(&mut self, other: Block) {
        for (name, tests) in other.var_names.into_iter().zip(other.var_tests) {
            self.add_var(&name, tests);
        }
        self.edges.extend(other.edges);
        self.orders.extend(other.orders);
        self.comparisons.extend(other.comparisons);
    }

    pub fn n_vars(&self) -> usize {
        self.var_names.len()
    }

    /// Find the edge bound to `name`
    pub fn edge_named(&self, name: &str) -> Option<&EdgeClause> {
        self.edges
            .iter()
            .find(|edge| edge.name.as_deref() == Some(name))
    }
}

/// A complete pattern: a positive block and its negative application conditions
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub match_block: Block,
    pub without_blocks: Vec<Block>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test(name: &str, value: &str) -> FeatureTest {
        FeatureTest {
            name: name.to_string(),
            test: AttrTest::OneOf(vec![value.to_string()]),
        }
    }

    #[test]
    fn test_repeated_declarations_merge() {
        let mut block = Block::new();
        let x = block.add_var("X", vec![test("upos", "NOUN")]);
        block.add_edge(EdgeClause {
            name: Some("e".to_string()),
            head: "X".to_string(),
            dep: "Y".to_string(),
            label: LabelTest::Any,
        });
        let x_again = block.add_var("X", vec![test("Number", "Plur")]);

        assert_eq!(x, x_again);
        assert_eq!(block.n_vars(), 2);
        assert_eq!(block.var_tests[x].len(), 2);
        assert!(block.edge_named("e").is_some());
        assert!(block.edge_named("f").is_none());
    }

    #[test]
    fn test_merge_blocks() {
        let mut first = Block::new();
        first.add_var("X", vec![test("upos", "VERB")]);

        let mut second = Block::new();
        second.add_var("Y", Vec::new());
        second.add_var("X", vec![test("Mood", "Sub")]);
        second.add_order(OrderClause {
            first: "Y".to_string(),
            second: "X".to_string(),
            relation: OrderRelation::Precedes,
        });

        first.merge(second);
        assert_eq!(first.var_names, vec!["X", "Y"]);
        assert_eq!(first.var_tests[0].len(), 2);
        assert_eq!(first.orders.len(), 1);
    }
}

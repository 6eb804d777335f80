//! Pattern compilation and matching
//!
//! A parsed [`Pattern`] is compiled against the string pool of a treebank:
//! attribute names and values become symbols and every clause is attached to
//! the search step at which all of its nodes are bound. Matching is a
//! backtracking search over token positions, guided by the dependency edges
//! of the pattern.

use crate::pattern::{
    AttrTest, Block, EdgeClause, LabelTest, OrderRelation, Pattern, VarId,
};
use crate::query::QueryError;
use crate::tree::{Sentence, Sym, TokenId};
use crate::treebank::{DEPREL, Treebank};

/// Selectivity estimate for choosing the binding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Selectivity {
    Low = 1,
    Medium = 2,
    High = 3,
}

/// Node test with resolved symbols
///
/// A `None` name or a missing value symbol means the string never occurs in
/// the treebank.
#[derive(Debug, Clone)]
enum NodeTest {
    OneOf(Option<Sym>, Vec<Sym>),
    NoneOf(Option<Sym>, Vec<Sym>),
    Present(Option<Sym>),
    Absent(Option<Sym>),
}

impl NodeTest {
    fn selectivity(&self) -> Selectivity {
        match self {
            NodeTest::OneOf(..) => Selectivity::High,
            NodeTest::Present(_) | NodeTest::Absent(_) => Selectivity::Medium,
            NodeTest::NoneOf(..) => Selectivity::Low,
        }
    }
}

#[derive(Debug, Clone)]
enum LabelCheck {
    Any,
    OneOf(Vec<Sym>),
    NoneOf(Vec<Sym>),
}

#[derive(Debug, Clone)]
struct EdgeCheck {
    head: VarId,
    dep: VarId,
    label: LabelCheck,
}

#[derive(Debug, Clone)]
struct OrderCheck {
    first: VarId,
    second: VarId,
    immediate: bool,
}

/// One side of a comparison
#[derive(Debug, Clone)]
enum Operand {
    Attr(VarId, Option<Sym>),
    /// Label of the edge whose dependent is bound to the variable
    Label(VarId),
}

impl Operand {
    fn var(&self) -> VarId {
        match self {
            Operand::Attr(var, _) | Operand::Label(var) => *var,
        }
    }
}

#[derive(Debug, Clone)]
struct ComparisonCheck {
    left: Operand,
    right: Operand,
    equal: bool,
}

/// How candidate positions for a variable are generated
#[derive(Debug, Clone, Copy)]
enum Anchor {
    /// Dependents of the token bound to the variable
    Children(VarId),
    /// Head of the token bound to the variable
    Head(VarId),
    /// Every real token of the sentence
    Scan,
}

/// Clauses to verify once a set of variables is bound
#[derive(Debug, Clone, Default)]
struct Checks {
    tests: Vec<(VarId, NodeTest)>,
    edges: Vec<EdgeCheck>,
    orders: Vec<OrderCheck>,
    comparisons: Vec<ComparisonCheck>,
}

#[derive(Debug, Clone)]
struct Step {
    var: VarId,
    anchor: Anchor,
    checks: Checks,
}

/// A compiled block
///
/// Variables `0..n_bound` are bound before the search starts (the outer
/// pattern's nodes, for a `without` block).
#[derive(Debug, Clone)]
struct Program {
    n_vars: usize,
    n_bound: usize,
    initial: Checks,
    steps: Vec<Step>,
    deprel: Option<Sym>,
}

/// Compiled pattern: the positive block and its negative conditions
#[derive(Debug, Clone)]
pub struct Matcher {
    positive: Program,
    negatives: Vec<Program>,
    var_names: Vec<String>,
}

impl Matcher {
    pub fn new(pattern: &Pattern, treebank: &Treebank) -> Result<Self, QueryError> {
        let outer = &pattern.match_block;
        let positive = compile_block(outer, 0, &[], treebank)?;

        let negatives = pattern
            .without_blocks
            .iter()
            .map(|without| {
                let mut combined = Block::new();
                for name in &outer.var_names {
                    combined.add_var(name, Vec::new());
                }
                combined.merge(without.clone());
                compile_block(&combined, outer.n_vars(), &outer.edges, treebank)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            positive,
            negatives,
            var_names: outer.var_names.clone(),
        })
    }

    /// Node names of the positive block, in declaration order
    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    /// Call `visit` with the token positions of every match in `sentence`
    pub fn for_each_match(&self, sentence: &Sentence, mut visit: impl FnMut(&[usize])) {
        let mut assignment = vec![0; self.positive.n_vars];
        self.positive.search(sentence, &mut assignment, 0, &mut |bound| {
            let rejected = self.negatives.iter().any(|negative| {
                let mut extended = vec![0; negative.n_vars];
                extended[..bound.len()].copy_from_slice(bound);
                negative.exists(sentence, &mut extended)
            });
            if !rejected {
                visit(bound);
            }
            true
        });
    }

    pub fn count(&self, sentence: &Sentence) -> usize {
        let mut count = 0;
        self.for_each_match(sentence, |_| count += 1);
        count
    }

    /// Token ids of every match, one entry per node in `var_names` order
    pub fn matches(&self, sentence: &Sentence) -> Vec<Vec<TokenId>> {
        let mut matches = Vec::new();
        self.for_each_match(sentence, |positions| {
            matches.push(
                positions
                    .iter()
                    .map(|&pos| sentence.token_at(pos).id)
                    .collect(),
            );
        });
        matches
    }
}

impl Program {
    /// Depth-first search; `visit` returns false to stop
    fn search(
        &self,
        sentence: &Sentence,
        assignment: &mut [usize],
        step_idx: usize,
        visit: &mut dyn FnMut(&[usize]) -> bool,
    ) -> bool {
        if step_idx == 0 && !self.initial.hold(sentence, assignment, self.deprel) {
            return true;
        }
        let Some(step) = self.steps.get(step_idx) else {
            return visit(assignment);
        };

        let mut try_position = |pos: usize, assignment: &mut [usize]| -> bool {
            if self.is_used(assignment, step_idx, pos) {
                return true;
            }
            assignment[step.var] = pos;
            if !step.checks.hold(sentence, assignment, self.deprel) {
                return true;
            }
            self.search(sentence, assignment, step_idx + 1, visit)
        };

        match step.anchor {
            Anchor::Children(head) => {
                for &pos in sentence.children_at(assignment[head]) {
                    if !try_position(pos, assignment) {
                        return false;
                    }
                }
            }
            Anchor::Head(dep) => {
                if let Some(pos) = sentence.head_at(assignment[dep]) {
                    if !try_position(pos, assignment) {
                        return false;
                    }
                }
            }
            Anchor::Scan => {
                for pos in 1..=sentence.len() {
                    if !try_position(pos, assignment) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Whether the bound prefix has at least one extension
    fn exists(&self, sentence: &Sentence, assignment: &mut [usize]) -> bool {
        let mut found = false;
        self.search(sentence, assignment, 0, &mut |_| {
            found = true;
            false
        });
        found
    }

    /// Injectivity: `pos` is already taken by a variable bound before this step
    fn is_used(&self, assignment: &[usize], step_idx: usize, pos: usize) -> bool {
        assignment[..self.n_bound].contains(&pos)
            || self.steps[..step_idx]
                .iter()
                .any(|step| assignment[step.var] == pos)
    }
}

impl Checks {
    fn hold(&self, sentence: &Sentence, assignment: &[usize], deprel: Option<Sym>) -> bool {
        self.tests
            .iter()
            .all(|(var, test)| test_node(sentence, assignment[*var], test))
            && self
                .edges
                .iter()
                .all(|edge| test_edge(sentence, assignment, edge, deprel))
            && self.orders.iter().all(|order| {
                let (first, second) = (assignment[order.first], assignment[order.second]);
                if order.immediate {
                    second == first + 1
                } else {
                    first < second
                }
            })
            && self.comparisons.iter().all(|comparison| {
                let left = operand_value(sentence, assignment, &comparison.left, deprel);
                let right = operand_value(sentence, assignment, &comparison.right, deprel);
                match (left, right) {
                    (Some(l), Some(r)) => (l == r) == comparison.equal,
                    _ => !comparison.equal,
                }
            })
    }
}

fn test_node(sentence: &Sentence, pos: usize, test: &NodeTest) -> bool {
    let token = sentence.token_at(pos);
    let value = |name: &Option<Sym>| name.and_then(|n| token.get(n));
    match test {
        NodeTest::OneOf(name, values) => value(name).is_some_and(|v| values.contains(&v)),
        NodeTest::NoneOf(name, values) => value(name).is_none_or(|v| !values.contains(&v)),
        NodeTest::Present(name) => value(name).is_some(),
        NodeTest::Absent(name) => value(name).is_none(),
    }
}

fn test_edge(sentence: &Sentence, assignment: &[usize], edge: &EdgeCheck, deprel: Option<Sym>) -> bool {
    let dep = assignment[edge.dep];
    if sentence.head_at(dep) != Some(assignment[edge.head]) {
        return false;
    }
    let label = deprel.and_then(|d| sentence.token_at(dep).get(d));
    match &edge.label {
        LabelCheck::Any => true,
        LabelCheck::OneOf(labels) => label.is_some_and(|l| labels.contains(&l)),
        LabelCheck::NoneOf(labels) => label.is_none_or(|l| !labels.contains(&l)),
    }
}

fn operand_value(
    sentence: &Sentence,
    assignment: &[usize],
    operand: &Operand,
    deprel: Option<Sym>,
) -> Option<Sym> {
    let (var, name) = match operand {
        Operand::Attr(var, name) => (*var, *name),
        Operand::Label(var) => (*var, deprel),
    };
    sentence.token_at(assignment[var]).get(name?)
}

fn compile_block(
    block: &Block,
    n_bound: usize,
    outer_edges: &[EdgeClause],
    treebank: &Treebank,
) -> Result<Program, QueryError> {
    let symbols = |values: &[String]| -> Vec<Sym> {
        values.iter().filter_map(|v| treebank.symbol(v)).collect()
    };
    let var = |name: &str| -> Result<VarId, QueryError> {
        block
            .var_ids
            .get(name)
            .copied()
            .ok_or_else(|| QueryError::UnknownReference(name.to_string()))
    };

    let tests: Vec<Vec<NodeTest>> = block
        .var_tests
        .iter()
        .map(|tests| {
            tests
                .iter()
                .map(|feature| {
                    let name = treebank.symbol(&feature.name);
                    match &feature.test {
                        AttrTest::OneOf(values) => NodeTest::OneOf(name, symbols(values)),
                        AttrTest::NoneOf(values) => NodeTest::NoneOf(name, symbols(values)),
                        AttrTest::Present => NodeTest::Present(name),
                        AttrTest::Absent => NodeTest::Absent(name),
                    }
                })
                .collect()
        })
        .collect();

    let edges = block
        .edges
        .iter()
        .map(|edge| {
            Ok(EdgeCheck {
                head: var(&edge.head)?,
                dep: var(&edge.dep)?,
                label: match &edge.label {
                    LabelTest::Any => LabelCheck::Any,
                    LabelTest::OneOf(labels) => LabelCheck::OneOf(symbols(labels)),
                    LabelTest::NoneOf(labels) => LabelCheck::NoneOf(symbols(labels)),
                },
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    let orders = block
        .orders
        .iter()
        .map(|order| {
            Ok(OrderCheck {
                first: var(&order.first)?,
                second: var(&order.second)?,
                immediate: order.relation == OrderRelation::ImmediatelyPrecedes,
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    let comparisons = block
        .comparisons
        .iter()
        .map(|comparison| {
            let operand = |owner: &str, attribute: &str| -> Result<Operand, QueryError> {
                let edge = block
                    .edge_named(owner)
                    .or_else(|| outer_edges.iter().find(|e| e.name.as_deref() == Some(owner)));
                match edge {
                    Some(edge) => Ok(Operand::Label(var(&edge.dep)?)),
                    None => Ok(Operand::Attr(
                        var(owner).map_err(|_| {
                            QueryError::UnknownReference(format!("{owner}.{attribute}"))
                        })?,
                        treebank.symbol(attribute),
                    )),
                }
            };
            Ok(ComparisonCheck {
                left: operand(&comparison.left.owner, &comparison.left.attribute)?,
                right: operand(&comparison.right.owner, &comparison.right.attribute)?,
                equal: comparison.equal,
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    // Binding order: bound variables first, then greedily the unbound
    // variable reachable by an edge from a bound one, most selective first
    let n_vars = block.n_vars();
    let mut bound: Vec<bool> = (0..n_vars).map(|v| v < n_bound).collect();
    let mut sequence: Vec<(VarId, Anchor)> = Vec::with_capacity(n_vars - n_bound);

    while sequence.len() + n_bound < n_vars {
        let mut best: Option<(VarId, Anchor, (bool, Selectivity))> = None;
        for v in (0..n_vars).filter(|&v| !bound[v]) {
            let anchor = edges
                .iter()
                .find_map(|edge| {
                    if edge.dep == v && edge.head != v && bound[edge.head] {
                        Some(Anchor::Children(edge.head))
                    } else if edge.head == v && edge.dep != v && bound[edge.dep] {
                        Some(Anchor::Head(edge.dep))
                    } else {
                        None
                    }
                })
                .unwrap_or(Anchor::Scan);
            let selectivity = tests[v]
                .iter()
                .map(NodeTest::selectivity)
                .max()
                .unwrap_or(Selectivity::Low);
            let score = (!matches!(anchor, Anchor::Scan), selectivity);
            if best.as_ref().is_none_or(|(_, _, s)| score > *s) {
                best = Some((v, anchor, score));
            }
        }
        let Some((v, anchor, _)) = best else {
            break;
        };
        bound[v] = true;
        sequence.push((v, anchor));
    }

    // Rank of each variable in the binding order (bound ones share rank 0)
    let mut rank = vec![0; n_vars];
    for (idx, (v, _)) in sequence.iter().enumerate() {
        rank[*v] = idx + 1;
    }
    let slot = |vars: &[VarId]| vars.iter().map(|v| rank[*v]).max().unwrap_or(0);

    let mut buckets: Vec<Checks> = vec![Checks::default(); sequence.len() + 1];
    for (v, var_tests) in tests.into_iter().enumerate() {
        for test in var_tests {
            buckets[rank[v]].tests.push((v, test));
        }
    }
    for edge in edges {
        buckets[slot(&[edge.head, edge.dep])].edges.push(edge);
    }
    for order in orders {
        buckets[slot(&[order.first, order.second])].orders.push(order);
    }
    for comparison in comparisons {
        buckets[slot(&[comparison.left.var(), comparison.right.var()])]
            .comparisons
            .push(comparison);
    }

    let mut buckets = buckets.into_iter();
    let initial = buckets.next().unwrap_or_default();
    let steps = sequence
        .into_iter()
        .zip(buckets)
        .map(|((var, anchor), checks)| Step { var, anchor, checks })
        .collect();

    Ok(Program {
        n_vars,
        n_bound,
        initial,
        steps,
        deprel: treebank.symbol(DEPREL),
    })
}

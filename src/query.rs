//! Query language parser
//!
//! Parses grew-style pattern strings into the Pattern AST using a pest grammar.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use thiserror::Error;

use crate::pattern::{
    AttrRef, AttrTest, Block, Comparison, EdgeClause, FeatureTest, LabelTest, OrderClause,
    OrderRelation, Pattern,
};

#[derive(Parser)]
#[grammar = "query_grammar.pest"]
struct QueryParser;

/// Error type for query parsing failures
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query error: {0}")]
    ParseError(#[from] Box<pest::error::Error<Rule>>),

    #[error("Query error: a request needs a pattern block")]
    MissingPatternBlock,

    #[error("Query error: unknown node or edge in {0}")]
    UnknownReference(String),
}

impl From<pest::error::Error<Rule>> for QueryError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        QueryError::ParseError(Box::new(err))
    }
}

/// Join clauses into a single pattern request: `pattern { a; b; c }`
pub fn compose(parts: &[&str]) -> String {
    format!("pattern {{ {} }}", parts.join("; "))
}

/// Parse a query string into a Pattern
///
/// Several `pattern` blocks are merged into one; each `without` block is a
/// separate negative condition.
pub fn parse_query(input: &str) -> Result<Pattern, QueryError> {
    let mut pairs = QueryParser::parse(Rule::query, input)?;
    let Some(query_pair) = pairs.next() else {
        return Err(QueryError::MissingPatternBlock);
    };

    let mut pattern = Pattern::default();
    let mut has_pattern_block = false;

    for block in query_pair.into_inner() {
        if block.as_rule() != Rule::block {
            continue; // EOI
        }
        let mut inner = block.into_inner();
        let kind = next_pair(&mut inner)?.as_str();
        let body = parse_body(next_pair(&mut inner)?)?;

        if kind == "pattern" {
            has_pattern_block = true;
            pattern.match_block.merge(body);
        } else {
            pattern.without_blocks.push(body);
        }
    }

    if !has_pattern_block {
        return Err(QueryError::MissingPatternBlock);
    }
    Ok(pattern)
}

/// Next child of a rule
fn next_pair<'a>(pairs: &mut pest::iterators::Pairs<'a, Rule>) -> Result<Pair<'a, Rule>, QueryError> {
    pairs
        .next()
        .ok_or_else(|| QueryError::UnknownReference("<truncated clause>".to_string()))
}

fn parse_body(pair: Pair<Rule>) -> Result<Block, QueryError> {
    let mut block = Block::new();

    for statement in pair.into_inner() {
        let inner = next_pair(&mut statement.into_inner())?;
        match inner.as_rule() {
            Rule::node_decl => {
                let (name, tests) = parse_node_decl(inner)?;
                block.add_var(&name, tests);
            }
            Rule::edge_decl => block.add_edge(parse_edge_decl(inner)?),
            Rule::order_decl => block.add_order(parse_order_decl(inner)?),
            Rule::comparison => block.add_comparison(parse_comparison(inner)?),
            _ => {}
        }
    }

    Ok(block)
}

/// Parse a node declaration: Name [feature, feature]
fn parse_node_decl(pair: Pair<Rule>) -> Result<(String, Vec<FeatureTest>), QueryError> {
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner)?.as_str().to_string();

    let tests = match inner.next() {
        Some(feature_list) => feature_list
            .into_inner()
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok((name, tests))
}

fn parse_feature(pair: Pair<Rule>) -> Result<FeatureTest, QueryError> {
    let feature = next_pair(&mut pair.into_inner())?;
    let rule = feature.as_rule();
    let mut inner = feature.into_inner();
    let name = next_pair(&mut inner)?.as_str().to_string();

    let test = match rule {
        Rule::absent_feature => AttrTest::Absent,
        Rule::present_feature => AttrTest::Present,
        _ => {
            let operator = next_pair(&mut inner)?.as_str();
            let values = parse_values(next_pair(&mut inner)?)?;
            if operator == "=" {
                AttrTest::OneOf(values)
            } else {
                AttrTest::NoneOf(values)
            }
        }
    };

    Ok(FeatureTest { name, test })
}

fn parse_values(pair: Pair<Rule>) -> Result<Vec<String>, QueryError> {
    pair.into_inner()
        .map(|value| {
            let inner = next_pair(&mut value.into_inner())?;
            Ok(match inner.as_rule() {
                Rule::quoted => unescape(inner.into_inner().as_str()),
                _ => inner.as_str().to_string(),
            })
        })
        .collect()
}

/// Drop the backslash of `\"` and `\\` inside a quoted value
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Parse edge declaration: [name:] Source -[label]-> Target or Source -> Target
fn parse_edge_decl(pair: Pair<Rule>) -> Result<EdgeClause, QueryError> {
    let mut inner = pair.into_inner().peekable();

    let name = match inner.peek() {
        Some(p) if p.as_rule() == Rule::edge_name => {
            inner.next().map(|p| p.as_str().to_string())
        }
        _ => None,
    };

    let head = inner
        .next()
        .ok_or_else(|| QueryError::UnknownReference("edge head".to_string()))?
        .as_str()
        .to_string();
    let arrow = inner
        .next()
        .ok_or_else(|| QueryError::UnknownReference("edge arrow".to_string()))?;
    let dep = inner
        .next()
        .ok_or_else(|| QueryError::UnknownReference("edge dependent".to_string()))?
        .as_str()
        .to_string();

    Ok(EdgeClause {
        name,
        head,
        dep,
        label: parse_arrow(arrow)?,
    })
}

fn parse_arrow(pair: Pair<Rule>) -> Result<LabelTest, QueryError> {
    let arrow = next_pair(&mut pair.into_inner())?;
    if arrow.as_rule() == Rule::plain_arrow {
        return Ok(LabelTest::Any);
    }

    let mut negated = false;
    let mut labels = Vec::new();
    for part in arrow.into_inner() {
        match part.as_rule() {
            Rule::negation => negated = true,
            Rule::label_list => {
                labels.extend(part.into_inner().map(|label| label.as_str().to_string()))
            }
            _ => {}
        }
    }

    Ok(if negated {
        LabelTest::NoneOf(labels)
    } else {
        LabelTest::OneOf(labels)
    })
}

/// Parse precedence declaration: First << Second; or First < Second;
fn parse_order_decl(pair: Pair<Rule>) -> Result<OrderClause, QueryError> {
    let mut inner = pair.into_inner();

    let first = next_pair(&mut inner)?.as_str().to_string();
    let relation = match next_pair(&mut inner)?.as_str() {
        "<<" => OrderRelation::Precedes,
        _ => OrderRelation::ImmediatelyPrecedes,
    };
    let second = next_pair(&mut inner)?.as_str().to_string();

    Ok(OrderClause {
        first,
        second,
        relation,
    })
}

fn parse_comparison(pair: Pair<Rule>) -> Result<Comparison, QueryError> {
    let mut inner = pair.into_inner();

    let left = parse_attr_ref(next_pair(&mut inner)?)?;
    let equal = next_pair(&mut inner)?.as_str() == "=";
    let right = parse_attr_ref(next_pair(&mut inner)?)?;

    Ok(Comparison { left, right, equal })
}

fn parse_attr_ref(pair: Pair<Rule>) -> Result<AttrRef, QueryError> {
    let mut inner = pair.into_inner();
    let owner = next_pair(&mut inner)?.as_str().to_string();
    let attribute = next_pair(&mut inner)?.as_str().to_string();
    Ok(AttrRef { owner, attribute })
}

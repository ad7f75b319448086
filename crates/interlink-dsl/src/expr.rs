//! Specification grammar (expression-parsing capability).
//!
//! The textual surface syntax nests binary operators over atomic measures:
//!
//! ```text
//! OP(term1|threshold1, term2|threshold2)
//! ```
//!
//! - `OP` is one of `AND`, `OR`, `XOR`, `MINUS`, `MIN`, `MAX`, `ADD`
//!   (case-insensitive).
//! - a term is either another `OP(...)` expression or an atomic measure
//!   `measureName(attributePath1, attributePath2)`.
//! - a term may carry a coefficient prefix `c*term`; only `ADD` gives the
//!   coefficients a meaning (`c1·sim(t1) + c2·sim(t2)`), the other operators
//!   ignore them. An absent coefficient is `1`.
//!
//! The parser is *shallow*: it reports the top-level shape of one expression
//! and hands back the verbatim text of its two terms. Callers recurse on the
//! term text themselves (see `LinkSpecification::parse_with`).

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char as pchar, multispace0},
    combinator::{all_consuming, map, opt, recognize, verify},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// AST
// ============================================================================

/// Operator keyword as written in the grammar.
///
/// `MIN`, `MAX` and `ADD` are surface sugar: they map onto the boolean-like
/// operators of the specification tree but change how thresholds propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpecOperator {
    And,
    Or,
    Xor,
    Minus,
    Min,
    Max,
    Add,
}

impl SpecOperator {
    pub const ALL: [SpecOperator; 7] = [
        SpecOperator::And,
        SpecOperator::Or,
        SpecOperator::Xor,
        SpecOperator::Minus,
        SpecOperator::Min,
        SpecOperator::Max,
        SpecOperator::Add,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            SpecOperator::And => "AND",
            SpecOperator::Or => "OR",
            SpecOperator::Xor => "XOR",
            SpecOperator::Minus => "MINUS",
            SpecOperator::Min => "MIN",
            SpecOperator::Max => "MAX",
            SpecOperator::Add => "ADD",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.keyword().eq_ignore_ascii_case(keyword))
    }
}

impl std::fmt::Display for SpecOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// An atomic measure call: `measure(arg1, arg2, ...)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicExpr {
    pub measure: String,
    pub arguments: Vec<String>,
}

/// Top-level view of a composite expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeExpr {
    pub operator: SpecOperator,
    /// Verbatim (trimmed) text of the left term, without coefficient and threshold.
    pub term1: String,
    pub term2: String,
    pub threshold1: f64,
    pub threshold2: f64,
    pub coef1: f64,
    pub coef2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedExpression {
    Atomic(AtomicExpr),
    Composite(CompositeExpr),
}

impl ParsedExpression {
    pub fn is_atomic(&self) -> bool {
        matches!(self, ParsedExpression::Atomic(_))
    }
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpecParseError {
    #[error("malformed specification expression: `{expression}`")]
    Malformed { expression: String },
    #[error("threshold `{value}` in `{expression}` is not a finite number")]
    InvalidThreshold { expression: String, value: f64 },
    #[error("ADD coefficient `{value}` in `{expression}` must be a positive finite number")]
    InvalidCoefficient { expression: String, value: f64 },
}

/// Expression-parsing capability consumed by `LinkSpecification::parse_with`.
///
/// `threshold` is the target threshold the caller is about to assign to the
/// expression; grammar-based parsers do not need it, but parsers that
/// rewrite expressions (e.g. for a particular measure family) may.
pub trait ExpressionParser {
    fn parse(&self, expression: &str, threshold: f64) -> Result<ParsedExpression, SpecParseError>;
}

/// The grammar described at the top of this module.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrammarParser;

impl ExpressionParser for GrammarParser {
    fn parse(&self, expression: &str, _threshold: f64) -> Result<ParsedExpression, SpecParseError> {
        parse_expression(expression)
    }
}

/// Parse the top-level shape of one specification expression.
pub fn parse_expression(text: &str) -> Result<ParsedExpression, SpecParseError> {
    let trimmed = text.trim();
    let parsed = all_consuming(delimited(
        multispace0,
        alt((
            map(composite, ParsedExpression::Composite),
            map(atomic, ParsedExpression::Atomic),
        )),
        multispace0,
    ))(trimmed)
    .map(|(_, v)| v)
    .map_err(|_| SpecParseError::Malformed {
        expression: trimmed.to_string(),
    })?;

    if let ParsedExpression::Composite(c) = &parsed {
        for value in [c.threshold1, c.threshold2] {
            if !value.is_finite() {
                return Err(SpecParseError::InvalidThreshold {
                    expression: trimmed.to_string(),
                    value,
                });
            }
        }
        if c.operator == SpecOperator::Add {
            for value in [c.coef1, c.coef2] {
                if !value.is_finite() || value <= 0.0 {
                    return Err(SpecParseError::InvalidCoefficient {
                        expression: trimmed.to_string(),
                        value,
                    });
                }
            }
        }
    }

    Ok(parsed)
}

/// Parse an atomic measure call, e.g. `trigrams(x.name, y.label)`.
pub fn parse_atomic(text: &str) -> Result<AtomicExpr, SpecParseError> {
    let trimmed = text.trim();
    all_consuming(delimited(multispace0, atomic, multispace0))(trimmed)
        .map(|(_, v)| v)
        .map_err(|_| SpecParseError::Malformed {
            expression: trimmed.to_string(),
        })
}

/// Measure names of every atomic term in `text`, left to right.
pub fn measure_names(text: &str) -> Result<Vec<String>, SpecParseError> {
    let mut out = Vec::new();
    collect_measure_names(text, &mut out)?;
    Ok(out)
}

fn collect_measure_names(text: &str, out: &mut Vec<String>) -> Result<(), SpecParseError> {
    match parse_expression(text)? {
        ParsedExpression::Atomic(atom) => out.push(atom.measure),
        ParsedExpression::Composite(c) => {
            collect_measure_names(&c.term1, out)?;
            collect_measure_names(&c.term2, out)?;
        }
    }
    Ok(())
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn parse_ident(input: &str) -> IResult<&str, &str> {
    take_while1(is_ident_char)(input)
}

fn argument(input: &str) -> IResult<&str, &str> {
    map(
        verify(
            take_while1(|c: char| c != ',' && c != '(' && c != ')' && c != '|'),
            |s: &str| !s.trim().is_empty(),
        ),
        str::trim,
    )(input)
}

fn atomic(input: &str) -> IResult<&str, AtomicExpr> {
    let (input, measure) = parse_ident(input)?;
    let (input, _) = preceded(multispace0, pchar('('))(input)?;
    let (input, arguments) = separated_list1(pchar(','), argument)(input)?;
    let (input, _) = pchar(')')(input)?;
    Ok((
        input,
        AtomicExpr {
            measure: measure.to_string(),
            arguments: arguments.into_iter().map(str::to_string).collect(),
        },
    ))
}

fn keyword(input: &str) -> IResult<&str, SpecOperator> {
    let (rest, word) = parse_ident(input)?;
    match SpecOperator::from_keyword(word) {
        Some(op) => Ok((rest, op)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

/// Any expression, recognized but not interpreted (used to slice term text).
fn any_expression(input: &str) -> IResult<&str, &str> {
    recognize(alt((map(composite, |_| ()), map(atomic, |_| ()))))(input)
}

/// `[coef *] term | threshold`
fn weighted_term(input: &str) -> IResult<&str, (f64, &str, f64)> {
    let (input, _) = multispace0(input)?;
    let (input, coef) = opt(terminated(double, preceded(multispace0, pchar('*'))))(input)?;
    let (input, term) = preceded(multispace0, any_expression)(input)?;
    let (input, threshold) = preceded(
        tuple((multispace0, pchar('|'), multispace0)),
        double,
    )(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, (coef.unwrap_or(1.0), term, threshold)))
}

fn composite(input: &str) -> IResult<&str, CompositeExpr> {
    let (input, operator) = keyword(input)?;
    let (input, _) = preceded(multispace0, pchar('('))(input)?;
    let (input, (coef1, term1, threshold1)) = weighted_term(input)?;
    let (input, _) = pchar(',')(input)?;
    let (input, (coef2, term2, threshold2)) = weighted_term(input)?;
    let (input, _) = pchar(')')(input)?;
    Ok((
        input,
        CompositeExpr {
            operator,
            term1: term1.trim().to_string(),
            term2: term2.trim().to_string(),
            threshold1,
            threshold2,
            coef1,
            coef2,
        },
    ))
}

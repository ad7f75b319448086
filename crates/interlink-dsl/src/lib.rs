//! Interlink link-specification language
//!
//! A link specification states when two entities from different knowledge
//! bases describe the same thing: atomic similarity predicates
//! (`trigrams(x.name, y.label)`) combined with boolean-like operators, each
//! node carrying the minimum confidence it has to reach.
//!
//! This crate provides the textual grammar (`expr`), the specification tree
//! with its threshold-propagation algebra (`link_spec`), and stable digests
//! for specification trees (`digest`).

pub mod digest;
pub mod expr;
pub mod link_spec;

pub use digest::{spec_digest_v1, Fnv1a64, SPEC_DIGEST_V1_PREFIX};
pub use expr::{
    measure_names, parse_atomic, parse_expression, AtomicExpr, CompositeExpr, ExpressionParser,
    GrammarParser, ParsedExpression, SpecOperator, SpecParseError,
};
pub use link_spec::{LinkSpecification, LogicOperator, THRESHOLD_TOLERANCE};

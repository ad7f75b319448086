//! Atomic similarity measures and their registry.
//!
//! Two capabilities meet here:
//! - [`Measure`]: pointwise similarity of two attribute values in `[0, 1]`;
//! - [`AtomicMapper`]: the bulk computation behind `RUN`, producing every
//!   pair of a source and target collection at or above a threshold.
//!
//! A [`MeasureRegistry`] is an explicit object handed to the engine and the
//! filter. Names resolve case-insensitively. Registering a measure also
//! registers a [`NaiveMapper`] for it unless a dedicated mapper is supplied.
//!
//! Expressions are compiled once per instruction into a [`CompiledExpr`]
//! tree and then scored per pair.

mod naive;
mod string;

pub use naive::NaiveMapper;
pub use string::{ExactMatch, Jaccard, Levenshtein, Trigrams};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use interlink_dsl::{parse_atomic, parse_expression, ParsedExpression, SpecOperator, SpecParseError};
use thiserror::Error;

use crate::cache::{Cache, Instance};
use crate::mapping::Mapping;

/// Pointwise similarity of two attribute values.
pub trait Measure: Send + Sync {
    fn name(&self) -> &str;

    /// Similarity of two single values, in `[0, 1]`.
    fn similarity(&self, a: &str, b: &str) -> f64;

    /// Similarity of two value sets: the best pairwise similarity, `0` when
    /// either side has no value.
    fn set_similarity(&self, a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
        let mut best = 0.0_f64;
        for x in a {
            for y in b {
                best = best.max(self.similarity(x, y));
                if best >= 1.0 {
                    return best;
                }
            }
        }
        best
    }
}

/// The two collections being linked, plus the variables that name them in
/// measure expressions.
#[derive(Debug, Clone, Copy)]
pub struct LinkInputs<'a> {
    pub source: &'a Cache,
    pub target: &'a Cache,
    pub source_var: &'a str,
    pub target_var: &'a str,
}

/// Bulk computation behind `RUN`.
///
/// Implementations may parallelize internally but must return one complete
/// mapping holding exactly the pairs judged at or above `threshold`.
pub trait AtomicMapper: Send + Sync {
    fn compute(
        &self,
        inputs: LinkInputs<'_>,
        expression: &str,
        threshold: f64,
    ) -> anyhow::Result<Mapping>;
}

#[derive(Debug, Error)]
pub enum MeasureError {
    #[error(transparent)]
    Parse(#[from] SpecParseError),
    #[error("unknown measure `{0}`")]
    UnknownMeasure(String),
    #[error("measure expression `{0}` needs exactly two property paths")]
    Arity(String),
}

/// An atomic expression with its property paths resolved against the
/// source and target variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAtom {
    pub measure: String,
    pub source_property: String,
    pub target_property: String,
}

/// Resolve `measure(x.prop1, y.prop2)` into a measure name and bare properties.
pub fn resolve_atomic(
    expression: &str,
    source_var: &str,
    target_var: &str,
) -> Result<ResolvedAtom, MeasureError> {
    let atom = parse_atomic(expression)?;
    let [first, second] = atom.arguments.as_slice() else {
        return Err(MeasureError::Arity(expression.trim().to_string()));
    };
    Ok(ResolvedAtom {
        measure: atom.measure,
        source_property: strip_var(first, source_var).to_string(),
        target_property: strip_var(second, target_var).to_string(),
    })
}

/// Strip a `var.` prefix (with or without the leading `?`) from a property path.
pub fn strip_var<'a>(path: &'a str, var: &str) -> &'a str {
    let bare = var.trim_start_matches('?');
    let path = path.trim();
    let unprefixed = path.strip_prefix('?').unwrap_or(path);
    if bare.is_empty() {
        return path;
    }
    match unprefixed.strip_prefix(bare).and_then(|rest| rest.strip_prefix('.')) {
        Some(property) => property,
        None => path,
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Clone, Default)]
pub struct MeasureRegistry {
    measures: BTreeMap<String, Arc<dyn Measure>>,
    mappers: BTreeMap<String, Arc<dyn AtomicMapper>>,
}

impl std::fmt::Debug for MeasureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasureRegistry")
            .field("measures", &self.measures.keys().collect::<Vec<_>>())
            .field("mappers", &self.mappers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MeasureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `exactmatch`, `jaccard`, `trigrams` (alias `trigram`) and `levenshtein`,
    /// each served by a naive pairwise mapper.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_measure(Arc::new(ExactMatch));
        registry.register_measure(Arc::new(Jaccard));
        registry.register_measure(Arc::new(Levenshtein));
        let trigrams: Arc<dyn Measure> = Arc::new(Trigrams);
        registry.register_measure(trigrams.clone());
        registry.register_measure_as("trigram", trigrams);
        registry
    }

    /// Register `measure` under its own name.
    pub fn register_measure(&mut self, measure: Arc<dyn Measure>) {
        let name = measure.name().to_string();
        self.register_measure_as(&name, measure);
    }

    /// Register `measure` under `name`, with a naive mapper unless one is
    /// already registered for that name.
    pub fn register_measure_as(&mut self, name: &str, measure: Arc<dyn Measure>) {
        let key = name.to_ascii_lowercase();
        self.mappers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(NaiveMapper::new(measure.clone())));
        self.measures.insert(key, measure);
    }

    /// Serve `RUN` for `name` with a dedicated mapper.
    pub fn register_mapper(&mut self, name: &str, mapper: Arc<dyn AtomicMapper>) {
        self.mappers.insert(name.to_ascii_lowercase(), mapper);
    }

    pub fn measure(&self, name: &str) -> Option<Arc<dyn Measure>> {
        self.measures.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn mapper(&self, name: &str) -> Option<Arc<dyn AtomicMapper>> {
        self.mappers.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.measures.keys().map(String::as_str)
    }

    /// Measure names used by `expression` that have no registered measure.
    pub fn unresolved_measures(&self, expression: &str) -> Result<Vec<String>, SpecParseError> {
        Ok(interlink_dsl::measure_names(expression)?
            .into_iter()
            .filter(|name| self.measure(name).is_none())
            .collect())
    }

    /// Compile a (possibly composite) expression for pointwise scoring.
    pub fn compile(
        &self,
        expression: &str,
        source_var: &str,
        target_var: &str,
    ) -> Result<CompiledExpr, MeasureError> {
        match parse_expression(expression)? {
            ParsedExpression::Atomic(_) => {
                let atom = resolve_atomic(expression, source_var, target_var)?;
                let measure = self
                    .measure(&atom.measure)
                    .ok_or_else(|| MeasureError::UnknownMeasure(atom.measure.clone()))?;
                Ok(CompiledExpr::Atom {
                    measure,
                    source_property: atom.source_property,
                    target_property: atom.target_property,
                })
            }
            ParsedExpression::Composite(c) => Ok(CompiledExpr::Composite {
                operator: c.operator,
                left: Box::new(self.compile(&c.term1, source_var, target_var)?),
                right: Box::new(self.compile(&c.term2, source_var, target_var)?),
                threshold1: c.threshold1,
                threshold2: c.threshold2,
                coef1: c.coef1,
                coef2: c.coef2,
            }),
        }
    }
}

// ============================================================================
// Pointwise scoring
// ============================================================================

#[derive(Clone)]
pub enum CompiledExpr {
    Atom {
        measure: Arc<dyn Measure>,
        source_property: String,
        target_property: String,
    },
    Composite {
        operator: SpecOperator,
        left: Box<CompiledExpr>,
        right: Box<CompiledExpr>,
        threshold1: f64,
        threshold2: f64,
        coef1: f64,
        coef2: f64,
    },
}

impl std::fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompiledExpr::Atom {
                measure,
                source_property,
                target_property,
            } => write!(f, "{}({source_property}, {target_property})", measure.name()),
            CompiledExpr::Composite {
                operator,
                left,
                right,
                threshold1,
                threshold2,
                ..
            } => write!(f, "{operator}({left:?}|{threshold1}, {right:?}|{threshold2})"),
        }
    }
}

impl CompiledExpr {
    /// Score one pair of instances.
    ///
    /// Composite terms must meet their own written thresholds to count:
    /// - AND: min of both scores if both qualify, else 0
    /// - OR: max of the qualifying scores, else 0
    /// - XOR: the score of the single qualifying term, else 0
    /// - MINUS: the left score if only the left term qualifies, else 0
    /// - MIN / MAX: min / max of both scores
    /// - ADD: `coef1·s1 + coef2·s2`
    pub fn score(&self, source: &Instance, target: &Instance) -> f64 {
        match self {
            CompiledExpr::Atom {
                measure,
                source_property,
                target_property,
            } => match (
                source.properties.get(source_property),
                target.properties.get(target_property),
            ) {
                (Some(a), Some(b)) => measure.set_similarity(a, b),
                _ => 0.0,
            },
            CompiledExpr::Composite {
                operator,
                left,
                right,
                threshold1,
                threshold2,
                coef1,
                coef2,
            } => {
                let s1 = left.score(source, target);
                let s2 = right.score(source, target);
                let q1 = s1 >= *threshold1;
                let q2 = s2 >= *threshold2;
                match operator {
                    SpecOperator::And => {
                        if q1 && q2 {
                            s1.min(s2)
                        } else {
                            0.0
                        }
                    }
                    SpecOperator::Or => match (q1, q2) {
                        (true, true) => s1.max(s2),
                        (true, false) => s1,
                        (false, true) => s2,
                        (false, false) => 0.0,
                    },
                    SpecOperator::Xor => match (q1, q2) {
                        (true, false) => s1,
                        (false, true) => s2,
                        _ => 0.0,
                    },
                    SpecOperator::Minus => {
                        if q1 && !q2 {
                            s1
                        } else {
                            0.0
                        }
                    }
                    SpecOperator::Min => s1.min(s2),
                    SpecOperator::Max => s1.max(s2),
                    SpecOperator::Add => coef1 * s1 + coef2 * s2,
                }
            }
        }
    }
}

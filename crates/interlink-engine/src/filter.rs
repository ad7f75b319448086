//! Filtering capability behind the `FILTER` opcode.
//!
//! Three modes, selected by the engine from the instruction's operands:
//! - (a) no expression: keep pairs with confidence `>= threshold`;
//! - (b) expression: re-score every pair, keep it when the score reaches
//!   `threshold`, and store the score;
//! - (c) expression and main threshold: as (b), but the stored confidence
//!   is `min(incoming, score)` and must also reach the main threshold.

use std::sync::Arc;

use anyhow::Context;

use crate::mapping::Mapping;
use crate::measures::{LinkInputs, MeasureRegistry};

pub trait MappingFilter: Send + Sync {
    /// Mode (a).
    fn filter(&self, mapping: &Mapping, threshold: f64) -> Mapping;

    /// Modes (b) and (c).
    fn filter_by_expression(
        &self,
        mapping: &Mapping,
        expression: &str,
        threshold: f64,
        main_threshold: Option<f64>,
        inputs: LinkInputs<'_>,
    ) -> anyhow::Result<Mapping>;
}

/// Scores pairs one by one with measures taken from a registry.
#[derive(Debug, Clone)]
pub struct LinearFilter {
    registry: Arc<MeasureRegistry>,
}

impl LinearFilter {
    pub fn new(registry: Arc<MeasureRegistry>) -> Self {
        Self { registry }
    }
}

impl MappingFilter for LinearFilter {
    fn filter(&self, mapping: &Mapping, threshold: f64) -> Mapping {
        mapping.sub_map(threshold)
    }

    fn filter_by_expression(
        &self,
        mapping: &Mapping,
        expression: &str,
        threshold: f64,
        main_threshold: Option<f64>,
        inputs: LinkInputs<'_>,
    ) -> anyhow::Result<Mapping> {
        let compiled = self
            .registry
            .compile(expression, inputs.source_var, inputs.target_var)
            .with_context(|| format!("compiling filter expression `{expression}`"))?;

        let mut out = Mapping::with_predicate(mapping.predicate());
        for (s, t, confidence) in mapping.iter() {
            let (Some(source), Some(target)) = (inputs.source.instance(s), inputs.target.instance(t))
            else {
                continue;
            };
            let score = compiled.score(source, target);
            if score < threshold {
                continue;
            }
            match main_threshold {
                None => out.add(s, t, score),
                Some(main) => {
                    let combined = confidence.min(score);
                    if combined >= main {
                        out.add(s, t, combined);
                    }
                }
            }
        }
        Ok(out)
    }
}

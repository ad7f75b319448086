//! Full pairwise scan over both collections.

use std::sync::Arc;

use rayon::prelude::*;

use super::{resolve_atomic, AtomicMapper, LinkInputs, Measure};
use crate::cache::Instance;
use crate::mapping::Mapping;

/// Scores every source × target pair with one measure.
///
/// Source instances are split across the rayon pool; per-source hits are
/// merged into the result afterwards, so the returned mapping does not
/// depend on scheduling.
#[derive(Clone)]
pub struct NaiveMapper {
    measure: Arc<dyn Measure>,
}

impl NaiveMapper {
    pub fn new(measure: Arc<dyn Measure>) -> Self {
        Self { measure }
    }
}

impl std::fmt::Debug for NaiveMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NaiveMapper")
            .field("measure", &self.measure.name())
            .finish()
    }
}

impl AtomicMapper for NaiveMapper {
    fn compute(
        &self,
        inputs: LinkInputs<'_>,
        expression: &str,
        threshold: f64,
    ) -> anyhow::Result<Mapping> {
        let atom = resolve_atomic(expression, inputs.source_var, inputs.target_var)?;
        let sources: Vec<&Instance> = inputs.source.instances().collect();
        let targets: Vec<&Instance> = inputs.target.instances().collect();

        let hits: Vec<(String, String, f64)> = sources
            .par_iter()
            .flat_map_iter(|s| {
                let values = s.properties.get(&atom.source_property);
                let target_property = &atom.target_property;
                targets.iter().filter_map(move |t| {
                    let score = match (values, t.properties.get(target_property)) {
                        (Some(a), Some(b)) => self.measure.set_similarity(a, b),
                        _ => 0.0,
                    };
                    (score >= threshold).then(|| (s.uri.clone(), t.uri.clone(), score))
                })
            })
            .collect();

        Ok(hits.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::measures::ExactMatch;

    #[test]
    fn returns_exactly_the_pairs_above_threshold() {
        let mut source = Cache::new();
        source.add_triple("s1", "name", "Berlin");
        source.add_triple("s2", "name", "Paris");
        source.add_triple("s3", "label", "Berlin");
        let mut target = Cache::new();
        target.add_triple("t1", "name", "Berlin");
        target.add_triple("t2", "name", "Rome");

        let mapper = NaiveMapper::new(Arc::new(ExactMatch));
        let inputs = LinkInputs {
            source: &source,
            target: &target,
            source_var: "?x",
            target_var: "?y",
        };
        let m = mapper
            .compute(inputs, "exactmatch(x.name,y.name)", 0.5)
            .unwrap();
        assert_eq!(m.size(), 1);
        assert_eq!(m.confidence("s1", "t1"), 1.0);
    }

    #[test]
    fn malformed_expression_is_an_error() {
        let empty = Cache::new();
        let mapper = NaiveMapper::new(Arc::new(ExactMatch));
        let inputs = LinkInputs {
            source: &empty,
            target: &empty,
            source_var: "?x",
            target_var: "?y",
        };
        assert!(mapper.compute(inputs, "exactmatch(", 0.5).is_err());
    }
}

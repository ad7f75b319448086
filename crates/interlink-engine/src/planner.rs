//! Canonical (non-optimizing) planning.
//!
//! Every specification node becomes exactly one nested plan:
//!
//! ```text
//! leaf  measure(p1,p2) | θ     →  atomic [RUN measure(p1,p2) θ]
//! node  OP(c1, c2)     | θ     →  composite(set-op(OP), [plan(c1), plan(c2)], FILTER θ)
//! ```
//!
//! with AND → INTERSECTION, OR → UNION, XOR → XOR, MINUS → DIFF. Negative
//! thresholds (trivially satisfied children, e.g. from ADD) run at `0`;
//! thresholds above `1` are kept and simply yield no pairs.
//!
//! A weighted (`ADD`) node intersects its children like `AND`, then
//! re-scores the survivors with its weighted expression:
//!
//! ```text
//! node  ADD(c1*t1, c2*t2) | θ  →  composite(INTERSECTION, [plan(t1), plan(t2)],
//!                                           FILTER ADD(c1*t1, c2*t2) θ)
//! ```

use interlink_dsl::{LinkSpecification, LogicOperator};

use crate::plan::{Instruction, NestedPlan, SetOperator};

/// Set operator implementing a specification operator.
pub fn set_operator_for(operator: LogicOperator) -> SetOperator {
    match operator {
        LogicOperator::And => SetOperator::Intersection,
        LogicOperator::Or => SetOperator::Union,
        LogicOperator::Xor => SetOperator::Xor,
        LogicOperator::Minus => SetOperator::Diff,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalPlanner;

impl CanonicalPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, spec: &LinkSpecification) -> NestedPlan {
        if spec.filter_expression().is_none() && spec.children().is_empty() {
            return NestedPlan::new();
        }
        let threshold = spec.threshold().max(0.0);

        if spec.is_atomic() {
            let expression = spec.filter_expression().unwrap_or_default();
            return NestedPlan::atomic(vec![Instruction::run(expression, threshold)]);
        }

        let sub_plans = spec.children().iter().map(|child| self.plan(child)).collect();
        let filter = match spec.weighted_expression() {
            Some(expression) => Instruction::filtering_by_expression(expression, threshold),
            None => Instruction::filtering(threshold),
        };
        NestedPlan::composite(spec.operator().map(set_operator_for), sub_plans, Some(filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Command;

    #[test]
    fn empty_specification_gives_empty_plan() {
        assert!(CanonicalPlanner.plan(&LinkSpecification::new()).is_empty());
    }

    #[test]
    fn leaf_becomes_single_run() {
        let spec = LinkSpecification::parse("trigrams(x.name,y.label)", 0.8).unwrap();
        let plan = CanonicalPlanner.plan(&spec);
        assert!(plan.is_atomic());
        let run = &plan.instructions()[0];
        assert_eq!(run.command, Command::Run);
        assert_eq!(run.measure_expression.as_deref(), Some("trigrams(x.name,y.label)"));
        assert_eq!(run.threshold, Some(0.8));
    }

    #[test]
    fn operators_map_to_set_operations() {
        for (keyword, op) in [
            ("AND", SetOperator::Intersection),
            ("OR", SetOperator::Union),
            ("XOR", SetOperator::Xor),
            ("MINUS", SetOperator::Diff),
        ] {
            let spec = LinkSpecification::parse(
                &format!("{keyword}(a(x.p,y.p)|0.5, b(x.q,y.q)|0.6)"),
                0.7,
            )
            .unwrap();
            let plan = CanonicalPlanner.plan(&spec);
            assert_eq!(plan.operator(), Some(op));
            assert_eq!(plan.sub_plans().len(), 2);
            assert_eq!(plan.threshold(), 0.7);
            assert_eq!(plan.sub_plans()[1].instructions()[0].threshold, Some(0.6));
        }
    }

    #[test]
    fn negative_add_bounds_run_at_zero() {
        // θ = 0.5, c1 = c2 = 1  ⇒  child thresholds = -0.5
        let spec = LinkSpecification::parse("ADD(a(x.p,y.p)|0.5, b(x.q,y.q)|0.5)", 0.5).unwrap();
        let plan = CanonicalPlanner.plan(&spec);
        for sub in plan.sub_plans() {
            assert_eq!(sub.instructions()[0].threshold, Some(0.0));
        }
    }

    #[test]
    fn add_filters_with_its_weighted_sum() {
        let spec =
            LinkSpecification::parse("ADD(0.5*a(x.p,y.p)|0.0, 0.5*b(x.q,y.q)|0.0)", 0.8).unwrap();
        let plan = CanonicalPlanner.plan(&spec);
        assert_eq!(plan.operator(), Some(SetOperator::Intersection));

        let filter = plan.filtering_instruction().unwrap();
        assert_eq!(filter.command, Command::Filter);
        assert_eq!(filter.measure_expression.as_deref(), spec.weighted_expression());
        assert_eq!(filter.threshold, Some(0.8));
        assert_eq!(filter.main_threshold, None);
        assert_eq!(filter.source_slot, None);

        let and = LinkSpecification::parse("AND(a(x.p,y.p)|0.6, b(x.q,y.q)|0.6)", 0.8).unwrap();
        let filter = CanonicalPlanner.plan(&and).filtering_instruction().cloned().unwrap();
        assert_eq!(filter.measure_expression, None);
    }

    #[test]
    fn flattened_order_follows_leaves() {
        let spec = LinkSpecification::parse(
            "OR(AND(a(x.p,y.p)|0.5, b(x.q,y.q)|0.6)|0.7, c(x.r,y.r)|0.8)",
            0.4,
        )
        .unwrap();
        let plan = CanonicalPlanner.plan(&spec);
        let measures: Vec<_> = plan
            .flatten()
            .instructions()
            .iter()
            .filter_map(|i| i.measure_expression.clone())
            .collect();
        assert_eq!(measures, vec!["a(x.p,y.p)", "b(x.q,y.q)", "c(x.r,y.r)"]);
        assert_eq!(plan.all_measures(), vec!["a", "b", "c"]);
    }
}

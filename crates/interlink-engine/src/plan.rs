//! Executable encodings of a specification.
//!
//! - [`Instruction`]: one opcode plus operands.
//! - [`Plan`]: a flat, ordered instruction list interpreted against a
//!   slot-indexed buffer of mappings.
//! - [`NestedPlan`]: a tree of plans. Atomic plans carry instructions only;
//!   composite plans combine their sub-plans' results with a set operator
//!   and may post-filter the combined result.
//!
//! All types are plain values: `clone()` is a deep copy with no shared
//! sub-plans, so rewrites of a clone never touch the original.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Run,
    Filter,
    Intersection,
    Union,
    Diff,
    Xor,
    Return,
}

impl Command {
    pub fn keyword(self) -> &'static str {
        match self {
            Command::Run => "RUN",
            Command::Filter => "FILTER",
            Command::Intersection => "INTERSECTION",
            Command::Union => "UNION",
            Command::Diff => "DIFF",
            Command::Xor => "XOR",
            Command::Return => "RETURN",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Set operation combining the results of a composite plan's sub-plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SetOperator {
    Intersection,
    Union,
    Diff,
    Xor,
}

impl SetOperator {
    pub fn command(self) -> Command {
        match self {
            SetOperator::Intersection => Command::Intersection,
            SetOperator::Union => Command::Union,
            SetOperator::Diff => Command::Diff,
            SetOperator::Xor => Command::Xor,
        }
    }

    /// Name used in plan summaries.
    pub fn label(self) -> &'static str {
        match self {
            SetOperator::Intersection => "INTERSECTION",
            SetOperator::Union => "UNION",
            SetOperator::Diff => "DIFFERENCE",
            SetOperator::Xor => "XOR",
        }
    }
}

// ============================================================================
// Instruction
// ============================================================================

/// One opcode with its operands.
///
/// Slot semantics:
/// - `source_slot` / `target_slot`: buffer entries read by FILTER, set
///   operations and RETURN;
/// - `result_slot`: where the result is placed; `None` appends to the end
///   of the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_slot: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_slot: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_slot: Option<usize>,
}

impl Instruction {
    fn bare(command: Command) -> Self {
        Self {
            command,
            measure_expression: None,
            threshold: None,
            main_threshold: None,
            source_slot: None,
            target_slot: None,
            result_slot: None,
        }
    }

    /// `RUN(measure_expression, threshold)`.
    pub fn run(measure_expression: impl Into<String>, threshold: f64) -> Self {
        Self {
            measure_expression: Some(measure_expression.into()),
            threshold: Some(threshold),
            ..Self::bare(Command::Run)
        }
    }

    /// Pure confidence cut of `source_slot` (filter mode a).
    pub fn filter(source_slot: usize, threshold: f64) -> Self {
        Self {
            threshold: Some(threshold),
            source_slot: Some(source_slot),
            ..Self::bare(Command::Filter)
        }
    }

    /// Re-score `source_slot` against an expression (filter modes b and c).
    pub fn filter_by_expression(
        source_slot: usize,
        measure_expression: impl Into<String>,
        threshold: f64,
        main_threshold: Option<f64>,
    ) -> Self {
        Self {
            measure_expression: Some(measure_expression.into()),
            threshold: Some(threshold),
            main_threshold,
            source_slot: Some(source_slot),
            ..Self::bare(Command::Filter)
        }
    }

    /// A post-filter without a source slot, as carried by composite plans.
    pub fn filtering(threshold: f64) -> Self {
        Self {
            threshold: Some(threshold),
            ..Self::bare(Command::Filter)
        }
    }

    /// A composite post-filter that re-scores against an expression.
    pub fn filtering_by_expression(measure_expression: impl Into<String>, threshold: f64) -> Self {
        Self {
            measure_expression: Some(measure_expression.into()),
            threshold: Some(threshold),
            ..Self::bare(Command::Filter)
        }
    }

    pub fn set_operation(operator: SetOperator, source_slot: usize, target_slot: usize) -> Self {
        Self {
            source_slot: Some(source_slot),
            target_slot: Some(target_slot),
            ..Self::bare(operator.command())
        }
    }

    /// `RETURN(slot?)`; `None` returns the last buffer entry.
    pub fn ret(slot: Option<usize>) -> Self {
        Self {
            source_slot: slot,
            ..Self::bare(Command::Return)
        }
    }

    pub fn with_result_slot(mut self, slot: usize) -> Self {
        self.result_slot = Some(slot);
        self
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        if let Some(expr) = &self.measure_expression {
            write!(f, " {expr}")?;
        }
        if let Some(t) = self.threshold {
            write!(f, " |{t}")?;
        }
        if let Some(t) = self.main_threshold {
            write!(f, " main={t}")?;
        }
        match (self.source_slot, self.target_slot) {
            (Some(s), Some(t)) => write!(f, " [{s}, {t}]")?,
            (Some(s), None) => write!(f, " [{s}]")?,
            _ => {}
        }
        match self.result_slot {
            Some(r) => write!(f, " -> {r}"),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    instructions: Vec<Instruction>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instruction(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Remove the first instruction equal to `instruction`.
    pub fn remove_instruction(&mut self, instruction: &Instruction) -> bool {
        match self.instructions.iter().position(|i| i == instruction) {
            Some(index) => {
                self.instructions.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn size(&self) -> usize {
        self.instructions.len()
    }
}

impl FromIterator<Instruction> for Plan {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self {
            instructions: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// NestedPlan
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NestedPlan {
    #[serde(default)]
    instructions: Vec<Instruction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sub_plans: Vec<NestedPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operator: Option<SetOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filtering_instruction: Option<Instruction>,
}

/// Labeled tree view of a plan, for external rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTree {
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanTree>,
}

impl NestedPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// An atomic plan holding `instructions`.
    pub fn atomic(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }

    /// A composite plan over `sub_plans`.
    pub fn composite(
        operator: Option<SetOperator>,
        sub_plans: Vec<NestedPlan>,
        filtering_instruction: Option<Instruction>,
    ) -> Self {
        Self {
            instructions: Vec::new(),
            sub_plans,
            operator,
            filtering_instruction,
        }
    }

    pub fn add_instruction(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn add_sub_plan(&mut self, plan: NestedPlan) {
        self.sub_plans.push(plan);
    }

    pub fn set_operator(&mut self, operator: Option<SetOperator>) {
        self.operator = operator;
    }

    pub fn set_filtering_instruction(&mut self, instruction: Option<Instruction>) {
        self.filtering_instruction = instruction;
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn sub_plans(&self) -> &[NestedPlan] {
        &self.sub_plans
    }

    pub fn operator(&self) -> Option<SetOperator> {
        self.operator
    }

    pub fn filtering_instruction(&self) -> Option<&Instruction> {
        self.filtering_instruction.as_ref()
    }

    /// No instructions, no sub-plans and no filtering instruction.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
            && self.sub_plans.is_empty()
            && self.filtering_instruction.is_none()
    }

    /// A plan without sub-plans, whatever its instruction list holds.
    pub fn is_atomic(&self) -> bool {
        self.sub_plans.is_empty()
    }

    /// Own instructions first, then every sub-plan's flattened instructions
    /// in sub-plan order (depth-first).
    pub fn flatten(&self) -> Plan {
        let mut plan = Plan::new();
        self.flatten_into(&mut plan);
        plan
    }

    fn flatten_into(&self, plan: &mut Plan) {
        for instruction in &self.instructions {
            plan.add_instruction(instruction.clone());
        }
        for sub in &self.sub_plans {
            sub.flatten_into(plan);
        }
    }

    /// Number of instructions in the flattened plan.
    pub fn size(&self) -> usize {
        self.instructions.len() + self.sub_plans.iter().map(NestedPlan::size).sum::<usize>()
    }

    /// Measure names referenced anywhere in the plan, in traversal order.
    ///
    /// Expressions the grammar rejects contribute nothing.
    pub fn all_measures(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_measures(&mut out);
        out
    }

    fn collect_measures(&self, out: &mut Vec<String>) {
        let expressions = self
            .filtering_instruction
            .iter()
            .chain(self.instructions.iter())
            .filter_map(|i| i.measure_expression.as_deref());
        for expression in expressions {
            if let Ok(names) = interlink_dsl::measure_names(expression) {
                out.extend(names);
            }
        }
        for sub in &self.sub_plans {
            sub.collect_measures(out);
        }
    }

    /// Threshold of the filtering instruction, `0` without one.
    pub fn threshold(&self) -> f64 {
        self.filtering_instruction
            .as_ref()
            .and_then(|i| i.threshold)
            .unwrap_or(0.0)
    }

    /// Line-oriented summary: `RUN:` lines for atomic children, the
    /// combining operator and the post-filter of each composite plan.
    pub fn final_plan(&self) -> String {
        if self.is_empty() {
            return "Empty plan".to_string();
        }
        if self.is_atomic() {
            return match self.instructions.first() {
                Some(first) => format!(
                    "{}-{}",
                    first.measure_expression.as_deref().unwrap_or(first.command.keyword()),
                    first.threshold.unwrap_or(0.0)
                ),
                None => self
                    .filtering_instruction
                    .as_ref()
                    .map(filter_line)
                    .unwrap_or_default(),
            };
        }

        let mut out = String::new();
        for sub in &self.sub_plans {
            if sub.is_atomic() {
                out.push_str("RUN:");
                out.push_str(&sub.final_plan());
                out.push('\n');
            } else {
                out.push_str(&sub.final_plan());
            }
        }
        if let Some(op) = self.operator {
            out.push_str(op.label());
            out.push('\n');
        }
        if let Some(filter) = &self.filtering_instruction {
            out.push_str(&filter_line(filter));
            out.push('\n');
            if let Some(main) = filter.main_threshold {
                out.push_str(&format!("FILTER:{main}\n"));
            }
        }
        out
    }

    pub fn to_tree(&self) -> PlanTree {
        if self.is_atomic() {
            let label = if self.instructions.is_empty() {
                "EMPTY".to_string()
            } else {
                self.instructions
                    .iter()
                    .map(Instruction::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return PlanTree {
                label,
                children: Vec::new(),
            };
        }
        let mut label = self
            .operator
            .map(|op| op.label().to_string())
            .unwrap_or_else(|| "SINGLE".to_string());
        if let Some(filter) = &self.filtering_instruction {
            label.push_str(" | ");
            label.push_str(&filter_line(filter));
        }
        PlanTree {
            label,
            children: self.sub_plans.iter().map(NestedPlan::to_tree).collect(),
        }
    }
}

fn filter_line(filter: &Instruction) -> String {
    match &filter.measure_expression {
        Some(expr) => format!("FILTER:{expr}-{}", filter.threshold.unwrap_or(0.0)),
        None => format!("FILTER:{}", filter.threshold.unwrap_or(0.0)),
    }
}

impl PartialEq for NestedPlan {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_atomic(), other.is_atomic()) {
            (true, true) => self.instructions == other.instructions,
            (false, false) => {
                self.operator == other.operator
                    && self.filtering_instruction == other.filtering_instruction
                    && self.instructions == other.instructions
                    && self.sub_plans == other.sub_plans
            }
            _ => false,
        }
    }
}

impl fmt::Display for NestedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.final_plan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(expr: &str, threshold: f64) -> NestedPlan {
        NestedPlan::atomic(vec![Instruction::run(expr, threshold)])
    }

    #[test]
    fn plan_add_and_remove() {
        let mut plan = Plan::new();
        assert!(plan.is_empty());
        let run = Instruction::run("trigrams(x.p,y.p)", 0.5);
        plan.add_instruction(run.clone());
        plan.add_instruction(Instruction::ret(None));
        assert_eq!(plan.size(), 2);
        assert!(plan.remove_instruction(&run));
        assert!(!plan.remove_instruction(&run));
        assert_eq!(plan.instructions()[0].command, Command::Return);
    }

    #[test]
    fn empty_and_atomic_are_distinct_notions() {
        let empty = NestedPlan::new();
        assert!(empty.is_empty());
        assert!(empty.is_atomic());

        let mut filtered = NestedPlan::new();
        filtered.set_filtering_instruction(Some(Instruction::filtering(0.3)));
        assert!(!filtered.is_empty());
        assert!(filtered.is_atomic());
    }

    #[test]
    fn flatten_is_depth_first_own_instructions_first() {
        let mut root = NestedPlan::composite(
            Some(SetOperator::Union),
            vec![
                NestedPlan::composite(
                    Some(SetOperator::Intersection),
                    vec![leaf("a(x.p,y.p)", 0.1), leaf("b(x.p,y.p)", 0.2)],
                    None,
                ),
                leaf("c(x.p,y.p)", 0.3),
            ],
            None,
        );
        root.add_instruction(Instruction::run("root(x.p,y.p)", 0.0));

        let order: Vec<_> = root
            .flatten()
            .instructions()
            .iter()
            .map(|i| i.measure_expression.clone().unwrap())
            .collect();
        assert_eq!(
            order,
            vec!["root(x.p,y.p)", "a(x.p,y.p)", "b(x.p,y.p)", "c(x.p,y.p)"]
        );
        assert_eq!(root.size(), 4);
    }

    #[test]
    fn clones_are_independent() {
        let original = NestedPlan::composite(
            Some(SetOperator::Union),
            vec![leaf("a(x.p,y.p)", 0.1), leaf("b(x.p,y.p)", 0.2)],
            Some(Instruction::filtering(0.4)),
        );
        let mut copy = original.clone();
        assert_eq!(copy, original);

        copy.sub_plans[0].add_instruction(Instruction::ret(None));
        copy.set_filtering_instruction(Some(Instruction::filtering(0.9)));
        assert_ne!(copy, original);
        assert_eq!(original.sub_plans()[0].instructions().len(), 1);
        assert_eq!(original.threshold(), 0.4);
    }

    #[test]
    fn equality_of_composites_checks_operator() {
        let a = NestedPlan::composite(
            Some(SetOperator::Union),
            vec![leaf("a(x.p,y.p)", 0.1), leaf("b(x.p,y.p)", 0.2)],
            None,
        );
        let mut b = a.clone();
        b.set_operator(Some(SetOperator::Xor));
        assert_ne!(a, b);
        assert_ne!(a, leaf("a(x.p,y.p)", 0.1));
    }

    #[test]
    fn all_measures_collects_from_every_level() {
        let plan = NestedPlan::composite(
            Some(SetOperator::Diff),
            vec![leaf("trigrams(x.p,y.p)", 0.1), leaf("jaccard(x.p,y.p)", 0.2)],
            Some(Instruction::filter_by_expression(
                0,
                "levenshtein(x.q,y.q)",
                0.5,
                None,
            )),
        );
        assert_eq!(
            plan.all_measures(),
            vec!["levenshtein", "trigrams", "jaccard"]
        );
    }

    #[test]
    fn final_plan_summarizes_composites() {
        let plan = NestedPlan::composite(
            Some(SetOperator::Diff),
            vec![leaf("a(x.p,y.p)", 0.5), leaf("b(x.q,y.q)", 0.7)],
            Some(Instruction::filtering(0.6)),
        );
        assert_eq!(
            plan.final_plan(),
            "RUN:a(x.p,y.p)-0.5\nRUN:b(x.q,y.q)-0.7\nDIFFERENCE\nFILTER:0.6\n"
        );
        assert_eq!(NestedPlan::new().final_plan(), "Empty plan");
    }

    #[test]
    fn tree_mirrors_structure() {
        let plan = NestedPlan::composite(
            Some(SetOperator::Union),
            vec![leaf("a(x.p,y.p)", 0.5), leaf("b(x.q,y.q)", 0.7)],
            Some(Instruction::filtering(0.6)),
        );
        let tree = plan.to_tree();
        assert_eq!(tree.label, "UNION | FILTER:0.6");
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].label, "RUN a(x.p,y.p) |0.5");
    }

    #[test]
    fn instruction_serde_uses_uppercase_commands() {
        let json = serde_json::to_value(Instruction::filter(0, 0.5).with_result_slot(3)).unwrap();
        assert_eq!(json["command"], "FILTER");
        assert_eq!(json["result_slot"], 3);
        assert!(json.get("measure_expression").is_none());
    }
}

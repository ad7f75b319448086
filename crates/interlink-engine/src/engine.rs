//! Plan interpreter.
//!
//! One piece of mutable state per call: a [`SlotBuffer`] of mappings. Every
//! non-RETURN instruction produces one fresh mapping and places it in the
//! buffer; RETURN hands one buffer entry back to the caller.
//!
//! Degradations are reported, not raised: an unresolved measure or a read
//! of a slot the buffer does not hold yields an empty mapping plus an
//! [`ExecutionWarning`]. Missing operands and mapper failures are errors
//! and abort the plan.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::error::{EngineError, Result};
use crate::filter::{LinearFilter, MappingFilter};
use crate::mapping::Mapping;
use crate::measures::{resolve_atomic, LinkInputs, MeasureError, MeasureRegistry};
use crate::plan::{Command, Instruction, NestedPlan, Plan, SetOperator};

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionWarning {
    /// No measure or mapper is registered under this name.
    UnresolvedMeasure {
        position: Option<usize>,
        measure: String,
    },
    /// An instruction read a slot past the end of the buffer.
    MissingSlot {
        position: usize,
        slot: usize,
        buffer_len: usize,
    },
}

impl fmt::Display for ExecutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionWarning::UnresolvedMeasure {
                position: Some(p),
                measure,
            } => write!(f, "instruction {p}: unresolved measure `{measure}`, result is empty"),
            ExecutionWarning::UnresolvedMeasure {
                position: None,
                measure,
            } => write!(f, "plan filter: unresolved measure `{measure}`, result is empty"),
            ExecutionWarning::MissingSlot {
                position,
                slot,
                buffer_len,
            } => write!(
                f,
                "instruction {position}: slot {slot} is not populated (buffer holds {buffer_len}), read as empty"
            ),
        }
    }
}

/// The mapping a plan produced, plus every degradation met on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    pub mapping: Mapping,
    pub warnings: Vec<ExecutionWarning>,
}

impl Execution {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

// ============================================================================
// Buffer
// ============================================================================

/// Slot-indexed, append-only result buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotBuffer {
    slots: Vec<Mapping>,
}

impl SlotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `mapping` according to `result_slot` and return its index.
    ///
    /// - `None`, or a slot already inside the buffer: append (existing
    ///   entries are never overwritten);
    /// - a slot past the end: pad with empty mappings and place it exactly
    ///   at that slot.
    pub fn place(&mut self, result_slot: Option<usize>, mapping: Mapping) -> usize {
        if let Some(slot) = result_slot {
            if slot > self.slots.len() {
                self.slots.resize_with(slot, Mapping::new);
            }
        }
        self.slots.push(mapping);
        self.slots.len() - 1
    }

    pub fn get(&self, slot: usize) -> Option<&Mapping> {
        self.slots.get(slot)
    }

    pub fn last(&self) -> Option<&Mapping> {
        self.slots.last()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Mapping] {
        &self.slots
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Single-threaded, synchronous plan interpreter over two entity collections.
#[derive(Clone)]
pub struct SimpleExecutionEngine {
    source: Arc<Cache>,
    target: Arc<Cache>,
    source_var: String,
    target_var: String,
    registry: Arc<MeasureRegistry>,
    filter: Arc<dyn MappingFilter>,
}

impl fmt::Debug for SimpleExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleExecutionEngine")
            .field("source", &self.source.size())
            .field("target", &self.target.size())
            .field("source_var", &self.source_var)
            .field("target_var", &self.target_var)
            .field("registry", &self.registry)
            .finish()
    }
}

impl SimpleExecutionEngine {
    /// Engine with the default measures and a [`LinearFilter`].
    pub fn new(
        source: Arc<Cache>,
        target: Arc<Cache>,
        source_var: impl Into<String>,
        target_var: impl Into<String>,
    ) -> Self {
        let registry = Arc::new(MeasureRegistry::with_defaults());
        Self {
            source,
            target,
            source_var: source_var.into(),
            target_var: target_var.into(),
            filter: Arc::new(LinearFilter::new(registry.clone())),
            registry,
        }
    }

    /// Replace the registry; the filter becomes a [`LinearFilter`] over it.
    pub fn with_registry(mut self, registry: Arc<MeasureRegistry>) -> Self {
        self.filter = Arc::new(LinearFilter::new(registry.clone()));
        self.registry = registry;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn MappingFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn registry(&self) -> &MeasureRegistry {
        &self.registry
    }

    fn inputs(&self) -> LinkInputs<'_> {
        LinkInputs {
            source: &self.source,
            target: &self.target,
            source_var: &self.source_var,
            target_var: &self.target_var,
        }
    }

    /// Interpret a flat plan.
    pub fn execute(&self, plan: &Plan) -> Result<Execution> {
        self.execute_traced(plan).map(|(execution, _)| execution)
    }

    /// Interpret a flat plan and also hand back the final buffer.
    pub fn execute_traced(&self, plan: &Plan) -> Result<(Execution, SlotBuffer)> {
        let mut buffer = SlotBuffer::new();
        let mut warnings = Vec::new();

        if plan.is_empty() {
            tracing::info!("plan is empty, returning an empty mapping");
            return Ok((Execution::default(), buffer));
        }

        for (position, instruction) in plan.instructions().iter().enumerate() {
            if instruction.command == Command::Return {
                tracing::info!(position, "reached RETURN");
                let mapping = if buffer.is_empty() {
                    Mapping::new()
                } else {
                    match instruction.source_slot {
                        None => buffer.last().cloned().unwrap_or_default(),
                        Some(slot) => read_slot(&buffer, slot, position, &mut warnings).into_owned(),
                    }
                };
                return Ok((Execution { mapping, warnings }, buffer));
            }

            let result = self.step(instruction, position, &buffer, &mut warnings)?;
            let pairs = result.size();
            let index = buffer.place(instruction.result_slot, result);
            tracing::debug!(
                position,
                command = %instruction.command,
                slot = index,
                pairs,
                "executed instruction"
            );
        }

        let mapping = buffer.last().cloned().unwrap_or_default();
        Ok((Execution { mapping, warnings }, buffer))
    }

    fn step(
        &self,
        instruction: &Instruction,
        position: usize,
        buffer: &SlotBuffer,
        warnings: &mut Vec<ExecutionWarning>,
    ) -> Result<Mapping> {
        match instruction.command {
            Command::Run => {
                let expression = required(
                    instruction.measure_expression.as_deref(),
                    instruction,
                    position,
                    "measure expression",
                )?;
                let threshold = required(instruction.threshold, instruction, position, "threshold")?;
                self.run(expression, threshold, position, warnings)
            }
            Command::Filter => {
                let slot = required(instruction.source_slot, instruction, position, "source slot")?;
                let input = read_slot(buffer, slot, position, warnings);
                self.apply_filter(instruction, &input, Some(position), warnings)
            }
            Command::Intersection => {
                self.set_step(SetOperator::Intersection, instruction, position, buffer, warnings)
            }
            Command::Union => self.set_step(SetOperator::Union, instruction, position, buffer, warnings),
            Command::Diff => self.set_step(SetOperator::Diff, instruction, position, buffer, warnings),
            Command::Xor => self.set_step(SetOperator::Xor, instruction, position, buffer, warnings),
            Command::Return => Err(EngineError::InvalidInstruction {
                command: instruction.command.keyword(),
                position,
                message: "RETURN does not produce a buffer entry".to_string(),
            }),
        }
    }

    fn set_step(
        &self,
        operator: SetOperator,
        instruction: &Instruction,
        position: usize,
        buffer: &SlotBuffer,
        warnings: &mut Vec<ExecutionWarning>,
    ) -> Result<Mapping> {
        let left = required(instruction.source_slot, instruction, position, "source slot")?;
        let right = required(instruction.target_slot, instruction, position, "target slot")?;
        let left = read_slot(buffer, left, position, warnings);
        let right = read_slot(buffer, right, position, warnings);
        Ok(combine(operator, &left, &right))
    }

    fn run(
        &self,
        expression: &str,
        threshold: f64,
        position: usize,
        warnings: &mut Vec<ExecutionWarning>,
    ) -> Result<Mapping> {
        let measure = resolve_atomic(expression, &self.source_var, &self.target_var)
            .map_err(|err| match err {
                MeasureError::Parse(err) => EngineError::Spec(err),
                other => EngineError::InvalidInstruction {
                    command: Command::Run.keyword(),
                    position,
                    message: other.to_string(),
                },
            })?
            .measure;
        let Some(mapper) = self.registry.mapper(&measure) else {
            warn(
                warnings,
                ExecutionWarning::UnresolvedMeasure {
                    position: Some(position),
                    measure,
                },
            );
            return Ok(Mapping::new());
        };
        mapper
            .compute(self.inputs(), expression, threshold)
            .map_err(|source| EngineError::DataAccess { measure, source })
    }

    /// FILTER semantics shared by flat plans and composite post-filters.
    fn apply_filter(
        &self,
        instruction: &Instruction,
        input: &Mapping,
        position: Option<usize>,
        warnings: &mut Vec<ExecutionWarning>,
    ) -> Result<Mapping> {
        let threshold = match (instruction.threshold, position) {
            (Some(threshold), _) => threshold,
            (None, Some(position)) => required(None, instruction, position, "threshold")?,
            (None, None) => {
                return Err(EngineError::InvalidFilter("missing threshold".to_string()))
            }
        };
        let Some(expression) = instruction.measure_expression.as_deref() else {
            return Ok(self.filter.filter(input, threshold));
        };

        let unresolved = self.registry.unresolved_measures(expression)?;
        if !unresolved.is_empty() {
            for measure in unresolved {
                warn(warnings, ExecutionWarning::UnresolvedMeasure { position, measure });
            }
            return Ok(Mapping::new());
        }

        self.filter
            .filter_by_expression(
                input,
                expression,
                threshold,
                instruction.main_threshold,
                self.inputs(),
            )
            .map_err(|source| EngineError::DataAccess {
                measure: expression.to_string(),
                source,
            })
    }

    /// Interpret a nested plan.
    ///
    /// Atomic plans run flat. Composite plans run every sub-plan in order,
    /// left-fold the results with the plan operator and then apply the
    /// filtering instruction, if any.
    pub fn execute_nested(&self, plan: &NestedPlan) -> Result<Execution> {
        let mut warnings = Vec::new();
        let mapping = self.run_nested(plan, &mut warnings)?;
        Ok(Execution { mapping, warnings })
    }

    fn run_nested(&self, plan: &NestedPlan, warnings: &mut Vec<ExecutionWarning>) -> Result<Mapping> {
        if plan.is_empty() {
            tracing::info!("nested plan is empty, returning an empty mapping");
            return Ok(Mapping::new());
        }
        if plan.is_atomic() {
            let execution = self.execute(&plan.flatten())?;
            warnings.extend(execution.warnings);
            return Ok(execution.mapping);
        }

        let sub_plans = plan.sub_plans();
        if plan.operator().is_none() && sub_plans.len() > 1 {
            return Err(EngineError::InvalidPlan(format!(
                "{} sub-plans but no operator to combine them",
                sub_plans.len()
            )));
        }

        let mut results = Vec::with_capacity(sub_plans.len());
        for sub in sub_plans {
            results.push(self.run_nested(sub, warnings)?);
        }
        let mut results = results.into_iter();
        let mut mapping = results.next().unwrap_or_default();
        if let Some(operator) = plan.operator() {
            for next in results {
                mapping = combine(operator, &mapping, &next);
            }
        }

        if let Some(filter) = plan.filtering_instruction() {
            mapping = self.apply_filter(filter, &mapping, None, warnings)?;
        }
        tracing::debug!(
            operator = ?plan.operator(),
            pairs = mapping.size(),
            "combined sub-plans"
        );
        Ok(mapping)
    }
}

fn combine(operator: SetOperator, left: &Mapping, right: &Mapping) -> Mapping {
    match operator {
        SetOperator::Intersection => left.intersection(right),
        SetOperator::Union => left.union(right),
        SetOperator::Diff => left.difference(right),
        SetOperator::Xor => left.symmetric_difference(right),
    }
}

/// Buffer entry at `slot`, or an empty mapping plus a warning past the end.
fn read_slot<'a>(
    buffer: &'a SlotBuffer,
    slot: usize,
    position: usize,
    warnings: &mut Vec<ExecutionWarning>,
) -> Cow<'a, Mapping> {
    match buffer.get(slot) {
        Some(mapping) => Cow::Borrowed(mapping),
        None => {
            warn(
                warnings,
                ExecutionWarning::MissingSlot {
                    position,
                    slot,
                    buffer_len: buffer.len(),
                },
            );
            Cow::Owned(Mapping::new())
        }
    }
}

fn required<T>(value: Option<T>, instruction: &Instruction, position: usize, what: &str) -> Result<T> {
    value.ok_or_else(|| EngineError::InvalidInstruction {
        command: instruction.command.keyword(),
        position,
        message: format!("missing {what}"),
    })
}

fn warn(warnings: &mut Vec<ExecutionWarning>, warning: ExecutionWarning) {
    tracing::warn!(%warning, "degraded execution");
    warnings.push(warning);
}

//! Interlink execution core
//!
//! Turns link specifications into scored links between two knowledge bases:
//!
//! ```text
//! LinkSpecification ──CanonicalPlanner──▶ NestedPlan ──SimpleExecutionEngine──▶ Mapping
//! ```
//!
//! ## Module Organization
//!
//! - `mapping`: the scored source → target relation and its set algebra
//! - `plan`: instructions, flat plans, nested plans, plan trees
//! - `engine`: the slot-buffer interpreter and its warnings
//! - `measures`: similarity measures, atomic mappers, the measure registry
//! - `filter`: re-scoring and threshold filters behind `FILTER`
//! - `planner`: one-to-one translation of specifications into plans
//! - `cache` / `kb`: entity collections and knowledge-base descriptors
//! - `config`: run configuration

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod kb;
pub mod mapping;
pub mod measures;
pub mod plan;
pub mod planner;

// Re-export key types
pub use cache::{Cache, Instance};
pub use config::RunConfig;
pub use engine::{Execution, ExecutionWarning, SimpleExecutionEngine, SlotBuffer};
pub use error::{EngineError, Result};
pub use filter::{LinearFilter, MappingFilter};
pub use kb::KbInfo;
pub use mapping::{ConfidenceKey, Mapping, ReversedIndex, OWL_SAME_AS};
pub use measures::{
    AtomicMapper, CompiledExpr, LinkInputs, Measure, MeasureError, MeasureRegistry, NaiveMapper,
};
pub use plan::{Command, Instruction, NestedPlan, Plan, PlanTree, SetOperator};
pub use planner::CanonicalPlanner;

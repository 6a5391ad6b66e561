//! Behavior authoring core: expressions, effects and the goal planner.
//!
//! Designers describe goals and actions in JSON. This crate compiles that
//! content once into models and turns it into plans for autonomous actors
//! living on a shared, versioned world.
//!
//! # Architecture
//!
//! ```text
//! content.json ──▶ ActionModel / GoalModel ──▶ JsonDrivenPlanner::plan
//!                        │                              │
//!                   Expr, EffectOp                Plan / PlanStep
//!                                                       │
//!                                  PlanStep::build_batch ─▶ EffectBatch ─▶ World::try_commit
//! ```
//!
//! # Modules
//!
//! - [`expr`]: Tokenizer, parser and evaluator for the expression language
//! - [`effects`]: Effect operators compiled from JSON effect descriptors
//! - [`model`]: Load-time compiled actions, goals and target selectors
//! - [`planner`]: Goal ranking, schedule fallback and plan construction
//! - [`content`]: Serde records for actions and goals
//! - [`config`]: Planner tuning loaded from TOML

pub mod config;
pub mod content;
pub mod effects;
pub mod error;
pub mod expr;
pub mod model;
pub mod planner;

// Re-export error types
pub use error::{ConfigError, ContentError, ExprError, PlanError, TomlSerializeError};

// Re-export config types
pub use config::{default_config_toml, PlannerConfig, PlanningConfig, ScheduleConfig, TargetingConfig};

// Re-export content types
pub use content::{
    ActionConfig, ContentSet, EffectConfig, ExprSource, GoalActionConfig, GoalConfig,
    ReservationConfig, ReservationMode, TargetSelectorConfig,
};

// Re-export expression types
pub use expr::{EvalContext, Expr, FunctionRegistry, Value};

// Re-export effect types
pub use effects::{CompiledEffect, EffectKind, EffectOp, TargetRef};

// Re-export model types
pub use model::{ActionModel, GoalActionModel, GoalModel, SelectorStrategy, TargetSelectorModel};

// Re-export planner types
pub use planner::{
    JsonDrivenPlanner, Plan, PlanOutline, PlanStep, Reservation, ScheduleBlock, ScheduleSource,
    StaticSchedule, StepKind, StepOutline,
};

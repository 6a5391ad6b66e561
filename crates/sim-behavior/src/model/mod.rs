//! Load-time models.
//!
//! Every expression in an action or goal config is compiled exactly once,
//! when the planner is built; planning and execution only evaluate.

pub mod action;
pub mod goal;
pub mod selector;

pub use action::{ActionModel, ReservationModel};
pub use goal::{GoalActionModel, GoalModel};
pub use selector::{SelectorStrategy, TargetSelectorModel};

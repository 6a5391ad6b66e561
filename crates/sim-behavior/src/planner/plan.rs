//! Plans and plan steps.
//!
//! A step captures the actor and target resolved at planning time. Its
//! precondition, duration, cost and effects are evaluated against whatever
//! snapshot is passed when the host executes it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use sim_world::{EffectBatch, Services, ThingId, WorldSnapshot};

use crate::content::ReservationMode;
use crate::expr::{EvalContext, FunctionRegistry};
use crate::model::ActionModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Walk towards the step target
    Move,
    Action,
}

/// A claim a step holds while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub thing: ThingId,
    pub mode: ReservationMode,
}

/// What steps need at execution time besides the snapshot.
#[derive(Debug)]
pub(crate) struct StepRuntime {
    pub services: Services,
    pub functions: Option<Arc<FunctionRegistry>>,
    pub max_duration: f64,
    pub default_cost: f64,
}

impl StepRuntime {
    fn context<'a>(
        &'a self,
        snapshot: &'a dyn WorldSnapshot,
        actor: &ThingId,
        target: Option<&ThingId>,
    ) -> EvalContext<'a> {
        let ctx = EvalContext::new(snapshot, &self.services);
        let ctx = match &self.functions {
            Some(functions) => ctx.with_functions(functions),
            None => ctx,
        };
        ctx.with_self(actor).with_target(target)
    }
}

/// One executable step of a plan.
#[derive(Clone)]
pub struct PlanStep {
    actor: ThingId,
    target: Option<ThingId>,
    kind: StepKind,
    action: Arc<ActionModel>,
    reservations: Vec<Reservation>,
    runtime: Arc<StepRuntime>,
}

impl PlanStep {
    pub(crate) fn new(
        actor: ThingId,
        target: Option<ThingId>,
        kind: StepKind,
        action: Arc<ActionModel>,
        reservations: Vec<Reservation>,
        runtime: Arc<StepRuntime>,
    ) -> Self {
        Self {
            actor,
            target,
            kind,
            action,
            reservations,
            runtime,
        }
    }

    pub fn actor(&self) -> &ThingId {
        &self.actor
    }

    pub fn target(&self) -> Option<&ThingId> {
        self.target.as_ref()
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn action_id(&self) -> &str {
        self.action.id()
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn has_precondition(&self) -> bool {
        self.action.has_preconditions()
    }

    pub fn has_duration(&self) -> bool {
        self.action.has_duration()
    }

    /// Whether the step may run against `snapshot`.
    ///
    /// A target that has disappeared since planning fails the check.
    pub fn precondition(&self, snapshot: &dyn WorldSnapshot) -> bool {
        if let Some(target) = &self.target {
            if !snapshot.contains(target) {
                return false;
            }
        }
        let ctx = self.runtime.context(snapshot, &self.actor, self.target.as_ref());
        self.action.preconditions_hold(&ctx)
    }

    /// Duration in minutes, clamped to the configured maximum.
    pub fn duration(&self, snapshot: &dyn WorldSnapshot) -> f64 {
        let ctx = self.runtime.context(snapshot, &self.actor, self.target.as_ref());
        self.action.duration(&ctx, self.runtime.max_duration)
    }

    pub fn cost(&self, snapshot: &dyn WorldSnapshot) -> f64 {
        let ctx = self.runtime.context(snapshot, &self.actor, self.target.as_ref());
        self.action.cost(&ctx, self.runtime.default_cost)
    }

    /// Builds the step's effect batch against `snapshot`.
    ///
    /// The batch's read set covers every thing it writes or operates on.
    pub fn build_batch(&self, snapshot: &dyn WorldSnapshot) -> EffectBatch {
        let ctx = self.runtime.context(snapshot, &self.actor, self.target.as_ref());
        let mut batch = EffectBatch::new(snapshot.version());
        self.action.apply_effects(&ctx, &mut batch);
        batch.ensure_read_closure(snapshot);
        batch
    }

    pub fn outline(&self) -> StepOutline {
        StepOutline {
            action: self.action_id().to_string(),
            kind: self.kind,
            actor: self.actor.clone(),
            target: self.target.clone(),
            reservations: self.reservations.clone(),
        }
    }
}

impl fmt::Debug for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanStep")
            .field("action", &self.action_id())
            .field("kind", &self.kind)
            .field("actor", &self.actor)
            .field("target", &self.target)
            .field("reservations", &self.reservations)
            .finish()
    }
}

/// Serializable summary of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutline {
    pub action: String,
    pub kind: StepKind,
    pub actor: ThingId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ThingId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reservations: Vec<Reservation>,
}

/// An ordered list of steps, tagged with the goal it serves.
///
/// An empty plan means there is nothing to do.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    goal_id: Option<String>,
    priority: f64,
    steps: Vec<PlanStep>,
}

impl Plan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn goal_id(&self) -> Option<&str> {
        self.goal_id.as_deref()
    }

    /// Priority the plan was selected with (0 for explicit requests).
    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub(crate) fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Appends a step; the first step tags the plan with `goal_id`.
    pub(crate) fn push(&mut self, goal_id: &str, step: PlanStep) {
        if self.goal_id.is_none() {
            self.goal_id = Some(goal_id.to_string());
        }
        self.steps.push(step);
    }

    /// Index of the first step whose precondition fails against `snapshot`.
    ///
    /// A host that hits a blocked step abandons the rest of the plan and
    /// plans again from a fresh snapshot.
    pub fn first_blocked_step(&self, snapshot: &dyn WorldSnapshot) -> Option<usize> {
        self.steps.iter().position(|s| !s.precondition(snapshot))
    }

    pub fn outline(&self) -> PlanOutline {
        PlanOutline {
            goal: self.goal_id.clone(),
            priority: self.priority,
            steps: self.steps.iter().map(PlanStep::outline).collect(),
        }
    }
}

impl IntoIterator for Plan {
    type Item = PlanStep;
    type IntoIter = std::vec::IntoIter<PlanStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

/// Serializable summary of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub priority: f64,
    pub steps: Vec<StepOutline>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::content::ActionConfig;
    use sim_world::memory::MemoryWorld;
    use sim_world::{ThingView, World};

    fn runtime() -> Arc<StepRuntime> {
        Arc::new(StepRuntime {
            services: Services::new(),
            functions: None,
            max_duration: 120.0,
            default_cost: 1.0,
        })
    }

    fn step(preconditions: &[&str], target: Option<&str>) -> PlanStep {
        let mut config = ActionConfig::new("chat");
        config.preconditions = preconditions.iter().map(|p| p.to_string()).collect();
        let action = ActionModel::compile(&config, &PlanningConfig::default()).unwrap();
        PlanStep::new(
            ThingId::from("npc"),
            target.map(ThingId::from),
            StepKind::Action,
            Arc::new(action),
            vec![],
            runtime(),
        )
    }

    #[test]
    fn test_empty_plan() {
        let plan = Plan::empty();
        assert!(plan.is_empty());
        assert_eq!(plan.goal_id(), None);
        assert!(plan.outline().steps.is_empty());
    }

    #[test]
    fn test_first_goal_tags_the_plan() {
        let mut plan = Plan::empty();
        plan.push("social", step(&[], None));
        plan.push("other", step(&[], None));
        assert_eq!(plan.goal_id(), Some("social"));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_first_blocked_step() {
        let mut world = MemoryWorld::new(4, 4);
        world.insert(ThingView::new("npc", "actor").with_attr("energy", 0.2));
        world.insert(ThingView::new("bob", "actor"));
        let snap = world.snap();

        let mut plan = Plan::empty();
        plan.push("g", step(&["attr('energy') > 0.1"], Some("bob")));
        plan.push("g", step(&["attr('energy') > 0.5"], Some("bob")));
        assert_eq!(plan.first_blocked_step(&snap), Some(1));

        // the target vanished after planning
        let mut plan = Plan::empty();
        plan.push("g", step(&[], Some("ghost")));
        assert_eq!(plan.first_blocked_step(&snap), Some(0));
    }

    #[test]
    fn test_outline_serializes() {
        let mut plan = Plan::empty();
        plan.push("g", step(&[], Some("bob")));
        let json = serde_json::to_value(plan.outline()).unwrap();
        assert_eq!(json["goal"], "g");
        assert_eq!(json["steps"][0]["action"], "chat");
        assert_eq!(json["steps"][0]["kind"], "action");
        assert_eq!(json["steps"][0]["target"], "bob");
    }
}

//! Goal-driven planner over JSON-authored content.
//!
//! A planning call is a pure function of `(snapshot, actor, goal)`: it reads
//! the snapshot, never mutates anything, and keeps no memory between calls,
//! so re-planning against a newer snapshot after a commit conflict is always
//! safe.
//!
//! # Selection
//!
//! 1. An explicitly requested goal that is not yet satisfied is planned
//!    directly, bypassing priorities.
//! 2. If a schedule source is wired, the actor's active or upcoming block
//!    yields a fallback plan with a heuristic priority.
//! 3. Every unsatisfied goal with a positive priority is ranked, highest
//!    first, with optional jitter for tie-breaking.
//! 4. Goals are tried in order; the schedule plan wins as soon as its
//!    priority reaches the current goal's. The first non-empty goal plan is
//!    returned, then the schedule plan, then an empty plan.

pub mod plan;
pub mod schedule;
pub mod targets;

pub use plan::{Plan, PlanOutline, PlanStep, Reservation, StepKind, StepOutline};
pub use schedule::{
    current_block, schedule_priority, BlockPhase, ScheduleBlock, ScheduleSource, StaticSchedule,
};
pub use targets::{social_preference, TargetQuery, PREFERENCE_EPSILON};

use rand::{Rng, RngCore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sim_world::{Services, ThingId, WorldSnapshot};

use crate::config::PlannerConfig;
use crate::content::{ContentSet, ReservationMode};
use crate::effects::TargetRef;
use crate::error::{ContentError, ExprError, PlanError};
use crate::expr::{EvalContext, FunctionRegistry};
use crate::model::{ActionModel, GoalActionModel, GoalModel};
use plan::StepRuntime;

/// Plans for actors from compiled goals and actions.
///
/// Built once from content; immutable afterwards and safe to share between
/// threads planning for different actors.
pub struct JsonDrivenPlanner {
    actions: HashMap<String, Arc<ActionModel>>,
    goals: Vec<GoalModel>,
    config: PlannerConfig,
    runtime: Arc<StepRuntime>,
    schedule: Option<Arc<dyn ScheduleSource>>,
}

impl JsonDrivenPlanner {
    /// Compiles every action and goal in `content`.
    ///
    /// Duplicate ids, goals referencing unknown actions, unresolvable effects
    /// and goals that walk to targets without a configured move action are
    /// all rejected here.
    pub fn new(content: ContentSet, config: PlannerConfig, services: Services) -> Result<Self, ContentError> {
        let mut actions = HashMap::with_capacity(content.actions.len());
        for action_config in &content.actions {
            let model = ActionModel::compile(action_config, &config.planner)?;
            let id = model.id().to_string();
            if actions.insert(id.clone(), Arc::new(model)).is_some() {
                return Err(ContentError::DuplicateAction(id));
            }
        }

        let mut seen = HashSet::new();
        let mut goals = Vec::with_capacity(content.goals.len());
        for goal_config in &content.goals {
            let goal = GoalModel::compile(goal_config, &actions, &config.targeting)?;
            if !seen.insert(goal.id().to_string()) {
                return Err(ContentError::DuplicateGoal(goal.id().to_string()));
            }
            if goal.uses_move_to() {
                let move_action = config.planner.move_action().unwrap_or_default();
                if !actions.contains_key(move_action) {
                    return Err(ContentError::UnknownAction {
                        goal: goal.id().to_string(),
                        action: move_action.to_string(),
                    });
                }
            }
            goals.push(goal);
        }

        tracing::debug!(actions = actions.len(), goals = goals.len(), "planner content compiled");

        let runtime = Arc::new(StepRuntime {
            services,
            functions: None,
            max_duration: config.planner.max_step_duration,
            default_cost: config.planner.default_cost,
        });

        Ok(Self {
            actions,
            goals,
            config,
            runtime,
            schedule: None,
        })
    }

    /// Builder: wire a schedule source for the fallback plan.
    pub fn with_schedule(mut self, schedule: Arc<dyn ScheduleSource>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Builder: evaluate expressions with a custom builtin registry.
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        let runtime = StepRuntime {
            services: self.runtime.services.clone(),
            functions: Some(Arc::new(functions)),
            max_duration: self.runtime.max_duration,
            default_cost: self.runtime.default_cost,
        };
        self.runtime = Arc::new(runtime);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.runtime.services
    }

    pub fn goals(&self) -> &[GoalModel] {
        &self.goals
    }

    pub fn goal(&self, id: &str) -> Option<&GoalModel> {
        self.goals.iter().find(|g| g.id() == id)
    }

    pub fn action(&self, id: &str) -> Option<&Arc<ActionModel>> {
        self.actions.get(id)
    }

    fn context<'a>(&'a self, snapshot: &'a dyn WorldSnapshot, actor: &ThingId) -> EvalContext<'a> {
        let ctx = EvalContext::new(snapshot, &self.runtime.services);
        let ctx = match &self.runtime.functions {
            Some(functions) => ctx.with_functions(functions),
            None => ctx,
        };
        ctx.with_self(actor).with_target(None)
    }

    /// Plans for `actor`.
    ///
    /// `goal` requests a specific goal. `jitter` scales uniform noise added
    /// to goal priorities when `rng` is given. Errors come only from goal
    /// priority or satisfaction expressions that fail to evaluate.
    pub fn plan(
        &self,
        snapshot: &dyn WorldSnapshot,
        actor: &ThingId,
        goal: Option<&str>,
        jitter: f64,
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Plan, PlanError> {
        let ctx = self.context(snapshot, actor);

        if let Some(goal_id) = goal {
            let goal = self
                .goal(goal_id)
                .ok_or_else(|| PlanError::UnknownGoal(goal_id.to_string()))?;
            if goal.is_satisfied(&ctx).map_err(|e| goal_error(goal, e))? {
                tracing::debug!(%actor, goal = goal_id, "requested goal already satisfied");
                return Ok(Plan::empty());
            }
            return Ok(self.build_goal_plan(snapshot, actor, goal));
        }

        let schedule_plan = self.schedule_plan(snapshot, actor);

        let mut ranked: Vec<(&GoalModel, f64)> = Vec::new();
        let mut rng = rng;
        for goal in &self.goals {
            if goal.is_satisfied(&ctx).map_err(|e| goal_error(goal, e))? {
                continue;
            }
            let raw = goal.priority(&ctx).map_err(|e| goal_error(goal, e))?;
            let mut priority = if raw.is_finite() { raw.max(0.0) } else { 0.0 };
            if priority <= 0.0 {
                continue;
            }
            if jitter > 0.0 {
                if let Some(rng) = rng.as_deref_mut() {
                    priority += rng.gen::<f64>() * jitter;
                }
            }
            ranked.push((goal, priority));
        }
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (goal, priority) in ranked {
            if let Some(schedule) = &schedule_plan {
                if schedule.priority() >= priority {
                    tracing::debug!(%actor, goal = goal.id(), priority, "schedule outranks goal");
                    return Ok(schedule.clone());
                }
            }
            let plan = self.build_goal_plan(snapshot, actor, goal);
            if !plan.is_empty() {
                tracing::debug!(%actor, goal = goal.id(), priority, steps = plan.len(), "goal selected");
                return Ok(plan.with_priority(priority));
            }
            tracing::debug!(%actor, goal = goal.id(), "goal produced no steps");
        }

        Ok(schedule_plan.unwrap_or_default())
    }

    /// Builds the steps for one goal.
    ///
    /// Entries whose required target cannot be resolved are skipped; if every
    /// entry is skipped the plan is empty.
    pub fn build_goal_plan(&self, snapshot: &dyn WorldSnapshot, actor: &ThingId, goal: &GoalModel) -> Plan {
        let query = TargetQuery {
            snapshot,
            services: &self.runtime.services,
            functions: self.runtime.functions.as_deref(),
            actor,
            relationship_prefix: &self.config.planner.relationship_prefix,
        };

        let mut plan = Plan::empty();
        for entry in goal.actions() {
            let target = match &entry.target {
                None => Some(actor.clone()),
                Some(selector) => match query.resolve(selector) {
                    Some(target) => Some(target),
                    None if selector.required => {
                        tracing::debug!(%actor, goal = goal.id(), action = entry.action.id(), "no target; skipping action");
                        continue;
                    }
                    None => None,
                },
            };
            self.push_entry(&mut plan, goal.id(), actor, target, entry);
        }
        plan
    }

    fn push_entry(
        &self,
        plan: &mut Plan,
        goal_id: &str,
        actor: &ThingId,
        target: Option<ThingId>,
        entry: &GoalActionModel,
    ) {
        if entry.move_to_target && target.as_ref().is_some_and(|t| t != actor) {
            if let Some(move_action) = self.move_action() {
                plan.push(goal_id, self.step(actor, target.clone(), StepKind::Move, move_action));
            }
        }
        plan.push(goal_id, self.step(actor, target, StepKind::Action, &entry.action));
    }

    fn move_action(&self) -> Option<&Arc<ActionModel>> {
        self.config.planner.move_action().and_then(|id| self.actions.get(id))
    }

    fn step(&self, actor: &ThingId, target: Option<ThingId>, kind: StepKind, action: &Arc<ActionModel>) -> PlanStep {
        let reservations = resolve_reservations(action, actor, target.as_ref());
        PlanStep::new(actor.clone(), target, kind, action.clone(), reservations, self.runtime.clone())
    }

    /// The schedule fallback plan, with its heuristic priority.
    ///
    /// Upcoming blocks travel to the block target; active blocks travel and
    /// then perform the task.
    fn schedule_plan(&self, snapshot: &dyn WorldSnapshot, actor: &ThingId) -> Option<Plan> {
        let source = self.schedule.as_ref()?;
        let blocks = source.blocks(actor);
        let (block, phase) = current_block(&blocks, snapshot.time(), &self.config.schedule)?;
        let priority = schedule_priority(phase, snapshot.thing(actor), &self.config.schedule);
        if priority <= 0.0 {
            return None;
        }

        let plan_id = format!("schedule:{}", block.task);
        let task = self.actions.get(&block.task);
        if task.is_none() {
            tracing::debug!(%actor, task = %block.task, "schedule task is not a known action");
        }
        let target = snapshot.contains(&block.target).then(|| block.target.clone());

        let mut plan = Plan::empty();
        if let (Some(move_action), Some(target)) = (self.move_action(), &target) {
            if target != actor {
                plan.push(&plan_id, self.step(actor, Some(target.clone()), StepKind::Move, move_action));
            }
        }
        if phase.is_active() || plan.is_empty() {
            if let Some(task) = task {
                plan.push(&plan_id, self.step(actor, target, StepKind::Action, task));
            }
        }

        (!plan.is_empty()).then(|| plan.with_priority(priority))
    }
}

impl std::fmt::Debug for JsonDrivenPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDrivenPlanner")
            .field("actions", &self.actions.len())
            .field("goals", &self.goals.len())
            .field("config", &self.config)
            .field("schedule", &self.schedule.is_some())
            .finish()
    }
}

fn goal_error(goal: &GoalModel, source: ExprError) -> PlanError {
    PlanError::GoalExpression {
        goal: goal.id().to_string(),
        source,
    }
}

/// Resolves an action's reservation templates for one step.
///
/// With nothing configured the step holds a soft reservation on the actor.
fn resolve_reservations(action: &ActionModel, actor: &ThingId, target: Option<&ThingId>) -> Vec<Reservation> {
    if action.reservations().is_empty() {
        return vec![Reservation {
            thing: actor.clone(),
            mode: ReservationMode::Soft,
        }];
    }
    action
        .reservations()
        .iter()
        .filter_map(|r| {
            let thing = match &r.target {
                TargetRef::SelfRef => Some(actor.clone()),
                TargetRef::Target => target.cloned(),
                TargetRef::Literal(id) if id.is_empty() => None,
                TargetRef::Literal(id) => Some(id.clone()),
            }?;
            Some(Reservation { thing, mode: r.mode })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use sim_world::memory::MemoryWorld;
    use sim_world::{ThingView, World, WorldTime};

    const CONTENT: &str = r#"{
        "actions": [
            { "id": "move_to", "effects": [{ "type": "move", "to": "$target" }] },
            { "id": "eat", "duration": 15, "effects": [{ "op": "add", "attr": "hunger", "value": -0.5 }] },
            { "id": "chat", "reservations": [{ "target": "$target", "mode": "hard" }, { "target": "$self" }] },
            { "id": "rest", "duration": "200" },
            { "id": "work" }
        ],
        "goals": [
            {
                "id": "sate",
                "priority": "attr('hunger') * 10",
                "satisfiedWhen": ["attr('hunger') < 0.2"],
                "actions": [{ "action": "eat" }]
            },
            {
                "id": "socialize",
                "priority": 3,
                "actions": [{ "action": "chat", "target": { "type": "nearestTag", "tag": "villager" }, "moveToTarget": true }]
            },
            { "id": "sleep", "priority": "-4", "actions": [{ "action": "rest" }] }
        ]
    }"#;

    fn planner() -> JsonDrivenPlanner {
        let content = ContentSet::from_json_str(CONTENT).unwrap();
        JsonDrivenPlanner::new(content, PlannerConfig::default(), Services::new()).unwrap()
    }

    fn world(hunger: f64) -> MemoryWorld {
        let mut world = MemoryWorld::new(10, 10);
        world.insert(ThingView::new("npc", "actor").at(0, 0).tagged("villager").with_attr("hunger", hunger));
        world.insert(ThingView::new("bob", "actor").at(3, 0).tagged("villager"));
        world
    }

    #[test]
    fn test_highest_priority_goal_wins() {
        let planner = planner();
        let snap = world(0.9).snap();
        let plan = planner.plan(&snap, &ThingId::from("npc"), None, 0.0, None).unwrap();
        assert_eq!(plan.goal_id(), Some("sate"));
        assert_eq!(plan.steps()[0].action_id(), "eat");
        assert_eq!(plan.steps()[0].duration(&snap), 15.0);
        assert!((plan.priority() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_satisfied_goal_is_skipped() {
        let planner = planner();
        let snap = world(0.1).snap();
        let plan = planner.plan(&snap, &ThingId::from("npc"), None, 0.0, None).unwrap();
        assert_eq!(plan.goal_id(), Some("socialize"));

        let steps: Vec<_> = plan.steps().iter().map(|s| (s.action_id(), s.kind())).collect();
        assert_eq!(steps, vec![("move_to", StepKind::Move), ("chat", StepKind::Action)]);
        assert_eq!(plan.steps()[1].target(), Some(&ThingId::from("bob")));
    }

    #[test]
    fn test_explicit_goal() {
        let planner = planner();
        let snap = world(0.1).snap();
        let npc = ThingId::from("npc");

        // already satisfied
        assert!(planner.plan(&snap, &npc, Some("sate"), 0.0, None).unwrap().is_empty());

        // negative priority does not matter for explicit requests
        let plan = planner.plan(&snap, &npc, Some("sleep"), 0.0, None).unwrap();
        assert_eq!(plan.steps()[0].action_id(), "rest");
        assert_eq!(plan.steps()[0].duration(&snap), 120.0);

        assert!(matches!(
            planner.plan(&snap, &npc, Some("fly"), 0.0, None),
            Err(PlanError::UnknownGoal(_))
        ));
    }

    #[test]
    fn test_reservations() {
        let planner = planner();
        let snap = world(0.1).snap();
        let npc = ThingId::from("npc");
        let plan = planner.plan(&snap, &npc, Some("socialize"), 0.0, None).unwrap();

        // move_to has none configured: soft self-reservation
        assert_eq!(
            plan.steps()[0].reservations(),
            &[Reservation { thing: npc.clone(), mode: ReservationMode::Soft }]
        );
        assert_eq!(
            plan.steps()[1].reservations(),
            &[
                Reservation { thing: ThingId::from("bob"), mode: ReservationMode::Hard },
                Reservation { thing: npc, mode: ReservationMode::Soft },
            ]
        );
    }

    #[test]
    fn test_unresolvable_target_yields_empty_plan() {
        let planner = planner();
        let mut world = MemoryWorld::new(10, 10);
        world.insert(ThingView::new("npc", "actor").at(0, 0).tagged("villager").with_attr("hunger", 0.1));
        let snap = world.snap();
        let plan = planner.plan(&snap, &ThingId::from("npc"), None, 0.0, None).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_jitter_is_reproducible() {
        let planner = planner();
        let snap = world(0.3).snap();
        let npc = ThingId::from("npc");

        let mut a = SmallRng::seed_from_u64(7);
        let mut b = SmallRng::seed_from_u64(7);
        let first = planner.plan(&snap, &npc, None, 5.0, Some(&mut a)).unwrap();
        let second = planner.plan(&snap, &npc, None, 5.0, Some(&mut b)).unwrap();
        assert_eq!(first.goal_id(), second.goal_id());
        assert_eq!(first.priority(), second.priority());
    }

    #[test]
    fn test_goal_expression_error_propagates() {
        let content = ContentSet::from_json_str(
            r#"{ "actions": [{ "id": "a" }], "goals": [{ "id": "g", "priority": "1 +", "actions": [{ "action": "a" }] }] }"#,
        )
        .unwrap();
        let planner = JsonDrivenPlanner::new(content, PlannerConfig::default(), Services::new()).unwrap();
        let snap = world(0.5).snap();
        let err = planner.plan(&snap, &ThingId::from("npc"), None, 0.0, None).unwrap_err();
        assert!(matches!(err, PlanError::GoalExpression { ref goal, .. } if goal == "g"));
    }

    #[test]
    fn test_content_validation() {
        let dup = r#"{ "actions": [{ "id": "a" }, { "id": "a" }] }"#;
        assert!(matches!(
            JsonDrivenPlanner::new(ContentSet::from_json_str(dup).unwrap(), PlannerConfig::default(), Services::new()),
            Err(ContentError::DuplicateAction(_))
        ));

        let no_move = r#"{ "actions": [{ "id": "a" }], "goals": [{ "id": "g", "actions": [{ "action": "a", "moveToTarget": true }] }] }"#;
        assert!(matches!(
            JsonDrivenPlanner::new(ContentSet::from_json_str(no_move).unwrap(), PlannerConfig::default(), Services::new()),
            Err(ContentError::UnknownAction { ref action, .. }) if action == "move_to"
        ));
    }

    #[test]
    fn test_schedule_outranks_weak_goal() {
        let schedule = StaticSchedule::new().with_block(
            "npc",
            ScheduleBlock {
                start_hour: 8.0,
                end_hour: 12.0,
                target: ThingId::from("bob"),
                task: "work".into(),
            },
        );
        let planner = planner().with_schedule(Arc::new(schedule));

        let mut calm = world(0.1);
        calm.set_time(WorldTime::from_parts(0, 9, 0));
        let snap = calm.snap();
        let plan = planner.plan(&snap, &ThingId::from("npc"), None, 0.0, None).unwrap();

        // active for 60 minutes: 4 + min(2, 3) = 6 beats socialize at 3
        assert_eq!(plan.goal_id(), Some("schedule:work"));
        assert!((plan.priority() - 6.0).abs() < 1e-9);
        let steps: Vec<_> = plan.steps().iter().map(|s| s.action_id()).collect();
        assert_eq!(steps, vec!["move_to", "work"]);

        // a hungry actor still eats first
        let mut hungry = world(0.9);
        hungry.set_time(WorldTime::from_parts(0, 9, 0));
        let snap = hungry.snap();
        let plan = planner.plan(&snap, &ThingId::from("npc"), None, 0.0, None).unwrap();
        assert_eq!(plan.goal_id(), Some("sate"));
    }

    #[test]
    fn test_upcoming_block_only_travels() {
        let schedule = StaticSchedule::new().with_block(
            "npc",
            ScheduleBlock {
                start_hour: 10.0,
                end_hour: 12.0,
                target: ThingId::from("bob"),
                task: "work".into(),
            },
        );
        let planner = planner().with_schedule(Arc::new(schedule));
        let mut w = world(0.1);
        w.set_time(WorldTime::from_parts(0, 9, 30));
        let snap = w.snap();

        // 2.5 - 30/60 = 2.0 is below socialize
        let plan = planner.plan(&snap, &ThingId::from("npc"), None, 0.0, None).unwrap();
        assert_eq!(plan.goal_id(), Some("socialize"));

        let plan = planner.schedule_plan(&snap, &ThingId::from("npc")).unwrap();
        let steps: Vec<_> = plan.steps().iter().map(|s| s.kind()).collect();
        assert_eq!(steps, vec![StepKind::Move]);
    }
}

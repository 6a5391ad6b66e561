//! Compiled actions.

use sim_world::EffectBatch;

use crate::config::PlanningConfig;
use crate::content::{ActionConfig, ReservationMode};
use crate::effects::{CompiledEffect, TargetRef};
use crate::error::ContentError;
use crate::expr::{EvalContext, Expr};

/// A reservation template, resolved against the step's actor and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationModel {
    pub target: TargetRef,
    pub mode: ReservationMode,
}

/// An action with every expression compiled once at load time.
///
/// Immutable after construction and shared by every plan that uses it.
#[derive(Debug, Clone)]
pub struct ActionModel {
    id: String,
    duration: Option<Expr>,
    cost: Option<Expr>,
    preconditions: Vec<Expr>,
    effects: Vec<CompiledEffect>,
    reservations: Vec<ReservationModel>,
}

impl ActionModel {
    /// Compiles an action config.
    ///
    /// Fails on an empty id or on any effect that does not resolve to a
    /// known operator. Expressions that do not parse are logged and kept;
    /// they fail every evaluation.
    pub fn compile(config: &ActionConfig, planning: &PlanningConfig) -> Result<Self, ContentError> {
        let id = config.id.trim();
        if id.is_empty() {
            return Err(ContentError::EmptyId { context: "action" });
        }

        let effects = config
            .effects
            .iter()
            .map(|effect| CompiledEffect::compile(id, effect, planning))
            .collect::<Result<Vec<_>, _>>()?;

        let preconditions: Vec<Expr> = config
            .preconditions
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| Expr::compile(p))
            .collect();

        let duration = config.duration.as_ref().map(|d| d.compile());
        let cost = config.cost.as_ref().map(|c| c.compile());

        for expr in preconditions.iter().chain(duration.iter()).chain(cost.iter()) {
            if let Some(error) = expr.diagnostic() {
                tracing::warn!(action = id, expr = expr.source(), %error, "action expression does not parse");
            }
        }

        let reservations = config
            .reservations
            .iter()
            .map(|r| ReservationModel {
                target: TargetRef::parse(&r.target),
                mode: r.mode,
            })
            .collect();

        Ok(Self {
            id: id.to_string(),
            duration,
            cost,
            preconditions,
            effects,
            reservations,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn effects(&self) -> &[CompiledEffect] {
        &self.effects
    }

    pub fn reservations(&self) -> &[ReservationModel] {
        &self.reservations
    }

    pub fn has_preconditions(&self) -> bool {
        !self.preconditions.is_empty()
    }

    pub fn has_duration(&self) -> bool {
        self.duration.is_some()
    }

    /// All preconditions hold. Evaluation errors count as not holding.
    pub fn preconditions_hold(&self, ctx: &EvalContext<'_>) -> bool {
        self.preconditions.iter().all(|p| match p.eval_bool(ctx) {
            Ok(holds) => holds,
            Err(error) => {
                tracing::debug!(action = %self.id, expr = p.source(), %error, "precondition failed to evaluate");
                false
            }
        })
    }

    /// Step duration in minutes, clamped to `[0, max]`.
    ///
    /// No duration, a failed evaluation or a non-finite result all give `0`.
    pub fn duration(&self, ctx: &EvalContext<'_>, max: f64) -> f64 {
        let Some(expr) = &self.duration else {
            return 0.0;
        };
        match expr.eval_number(ctx) {
            Ok(v) if v.is_finite() => v.clamp(0.0, max.max(0.0)),
            _ => 0.0,
        }
    }

    /// Step cost; `default` when unset, negative or not finite.
    pub fn cost(&self, ctx: &EvalContext<'_>, default: f64) -> f64 {
        match self.cost.as_ref().map(|c| c.eval_number(ctx)) {
            Some(Ok(v)) if v.is_finite() && v >= 0.0 => v,
            _ => default,
        }
    }

    /// Applies every effect whose guard passes into `batch`.
    ///
    /// A failing effect is skipped and reported to the failure observer;
    /// the remaining effects still apply.
    pub fn apply_effects(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) {
        for (index, effect) in self.effects.iter().enumerate() {
            if !effect.should_apply(ctx) {
                continue;
            }
            if let Err(error) = effect.apply(ctx, batch) {
                tracing::warn!(
                    action = %self.id,
                    effect = effect.kind().name(),
                    index,
                    %error,
                    "effect application failed; skipping"
                );
                if let Some(observer) = &ctx.services.failures {
                    observer.effect_failed(&self.id, index, &error.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{EffectConfig, ExprSource, ReservationConfig};
    use serde_json::json;
    use sim_world::memory::{FailureCounter, MemoryWorld};
    use sim_world::{Services, ThingId, ThingView, World, WorldSnapshot};
    use std::sync::Arc;

    fn effect(value: serde_json::Value) -> EffectConfig {
        serde_json::from_value(value).unwrap()
    }

    fn world() -> MemoryWorld {
        let mut world = MemoryWorld::new(4, 4);
        world.insert(ThingView::new("npc", "actor").at(0, 0).with_attr("hunger", 0.8));
        world
    }

    #[test]
    fn test_compile_rejects_empty_id() {
        let err = ActionModel::compile(&ActionConfig::new("  "), &PlanningConfig::default()).unwrap_err();
        assert!(matches!(err, ContentError::EmptyId { context: "action" }));
    }

    #[test]
    fn test_compile_rejects_unknown_effect() {
        let mut config = ActionConfig::new("dance");
        config.effects.push(effect(json!({ "op": "boogie" })));
        let err = ActionModel::compile(&config, &PlanningConfig::default()).unwrap_err();
        assert!(matches!(err, ContentError::UnknownEffect { .. }));
    }

    #[test]
    fn test_duration_is_clamped() {
        let world = world();
        let snap = world.snap();
        let services = Services::new();
        let ctx = EvalContext::new(&snap, &services).with_self(&ThingId::from("npc"));

        let mut config = ActionConfig::new("nap");
        config.duration = Some(ExprSource::from("attr($self, 'hunger') * 1000"));
        let action = ActionModel::compile(&config, &PlanningConfig::default()).unwrap();
        assert_eq!(action.duration(&ctx, 120.0), 120.0);

        config.duration = Some(ExprSource::from("-5"));
        let action = ActionModel::compile(&config, &PlanningConfig::default()).unwrap();
        assert_eq!(action.duration(&ctx, 120.0), 0.0);

        config.duration = Some(ExprSource::from("(1 +"));
        let action = ActionModel::compile(&config, &PlanningConfig::default()).unwrap();
        assert_eq!(action.duration(&ctx, 120.0), 0.0);

        let action = ActionModel::compile(&ActionConfig::new("idle"), &PlanningConfig::default()).unwrap();
        assert_eq!(action.duration(&ctx, 120.0), 0.0);
        assert_eq!(action.cost(&ctx, 1.0), 1.0);
    }

    #[test]
    fn test_preconditions_are_conjunctive() {
        let world = world();
        let snap = world.snap();
        let services = Services::new();
        let ctx = EvalContext::new(&snap, &services).with_self(&ThingId::from("npc"));

        let mut config = ActionConfig::new("eat");
        config.preconditions = vec!["attr($self, 'hunger') > 0.5".into(), "1 == 1".into()];
        assert!(ActionModel::compile(&config, &PlanningConfig::default()).unwrap().preconditions_hold(&ctx));

        config.preconditions.push("attr($self, 'hunger') > 0.9".into());
        assert!(!ActionModel::compile(&config, &PlanningConfig::default()).unwrap().preconditions_hold(&ctx));

        config.preconditions = vec!["((".into()];
        assert!(!ActionModel::compile(&config, &PlanningConfig::default()).unwrap().preconditions_hold(&ctx));
    }

    #[test]
    fn test_reservations_compile_to_refs() {
        let mut config = ActionConfig::new("sit");
        config.reservations.push(ReservationConfig {
            target: "bench_1".into(),
            mode: ReservationMode::Hard,
        });
        let action = ActionModel::compile(&config, &PlanningConfig::default()).unwrap();
        assert_eq!(action.reservations()[0].target, TargetRef::Literal(ThingId::from("bench_1")));
        assert_eq!(action.reservations()[0].mode, ReservationMode::Hard);
    }

    #[test]
    fn test_failed_effect_is_reported_and_skipped() {
        let world = world();
        let snap = world.snap();
        let counter = Arc::new(FailureCounter::new());
        let services = Services::new().with_failure_observer(counter.clone());
        let ctx = EvalContext::new(&snap, &services).with_self(&ThingId::from("npc"));

        let mut config = ActionConfig::new("eat");
        config.effects.push(effect(json!({ "op": "add", "attr": "hunger", "value": "(0.1" })));
        config.effects.push(effect(json!({ "op": "set", "attr": "energy", "value": 0.5 })));
        let action = ActionModel::compile(&config, &PlanningConfig::default()).unwrap();

        let mut batch = EffectBatch::new(snap.version());
        action.apply_effects(&ctx, &mut batch);

        assert_eq!(counter.count(), 1);
        assert_eq!(batch.writes.len(), 1);
        assert_eq!(batch.writes[0].attr, "energy");
    }
}

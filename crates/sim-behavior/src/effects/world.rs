//! World-state effects: attributes, facts, spawning, consumption,
//! movement and plan cooldowns.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as JsonValue;
use sim_world::{
    EffectBatch, FactDelta, PlanCooldownRequest, SpawnRequest, ThingId, MOVE_X_ATTR, MOVE_Y_ATTR,
};
use uuid::Uuid;

use super::target::TargetRef;
use super::EffectSource;
use crate::error::{ContentError, ExprError};
use crate::expr::{is_available_item, EvalContext, Expr, CONSUMED_ATTR, HELD_ATTR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMode {
    Add,
    Subtract,
    Set,
}

/// Adds to, subtracts from or sets a numeric attribute.
///
/// Results are clamped to `[0, 1]` unless the attribute is engine-internal
/// (`@` prefix) or the effect sets `clamp: false`.
#[derive(Debug, Clone)]
pub struct WriteAttrEffect {
    pub target: TargetRef,
    pub attr: String,
    pub value: Expr,
    pub mode: AttrMode,
    pub clamp: bool,
    /// Value assumed when the attribute is absent
    pub default_value: f64,
}

impl WriteAttrEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let attr = src.required_str(&["attr", "attribute", "key", "name"])?;
        let op = src.op().unwrap_or_default();
        let mode = match src.keyword(&["mode"]).unwrap_or(op).as_str() {
            "set" | "assign" => AttrMode::Set,
            "sub" | "subtract" | "dec" | "decrement" => AttrMode::Subtract,
            _ => AttrMode::Add,
        };
        let default_value = match src.config.first_field(&["default"]).and_then(JsonValue::as_f64) {
            Some(v) => v,
            None if attr == "health" => 1.0,
            None => 0.0,
        };
        Ok(Self {
            target: src.target_field(&["target", "thing"], TargetRef::SelfRef),
            value: src.expr_or(&["value", "amount", "delta"], 0.0),
            mode,
            clamp: src.bool_field(&["clamp"]).unwrap_or(true) && !attr.starts_with('@'),
            default_value,
            attr,
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let Some(target) = self.target.resolve_existing(ctx) else {
            return Ok(());
        };
        let value = self.value.eval_number(ctx)?;

        let next = match self.mode {
            AttrMode::Set => {
                batch.read_thing(ctx.snapshot, &target);
                value
            }
            AttrMode::Add | AttrMode::Subtract => {
                let current = batch
                    .read_attr(ctx.snapshot, &target, &self.attr)
                    .unwrap_or(self.default_value);
                if self.mode == AttrMode::Add {
                    current + value
                } else {
                    current - value
                }
            }
        };
        if !next.is_finite() {
            tracing::debug!(attr = %self.attr, "non-finite attribute value; skipping write");
            return Ok(());
        }

        let next = if self.clamp { next.clamp(0.0, 1.0) } else { next };
        batch.write_attr(&target, self.attr.clone(), next);
        Ok(())
    }
}

/// Adds or removes a `(predicate, subject, object)` fact.
#[derive(Debug, Clone)]
pub struct WriteFactEffect {
    pub predicate: String,
    pub subject: TargetRef,
    pub object: Option<TargetRef>,
    pub add: bool,
}

impl WriteFactEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let removing = src.op().is_some_and(|op| {
            ["remove", "retract", "delete", "clear"]
                .iter()
                .any(|verb| op.contains(verb))
        });
        Ok(Self {
            predicate: src.required_str(&["predicate", "fact", "pred"])?,
            subject: src.target_field(&["subject", "a"], TargetRef::SelfRef),
            object: src.str_field(&["object", "b"]).map(|s| TargetRef::parse(&s)),
            add: src.bool_field(&["add"]).unwrap_or(!removing),
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let Some(subject) = self.subject.resolve(ctx) else {
            return Ok(());
        };
        let object = match &self.object {
            None => ThingId::default(),
            Some(r) => match r.resolve(ctx) {
                Some(id) => id,
                None => return Ok(()),
            },
        };
        batch.facts.push(FactDelta {
            predicate: self.predicate.clone(),
            subject,
            object,
            add: self.add,
        });
        Ok(())
    }
}

/// Creates a new thing next to an anchor.
#[derive(Debug, Clone)]
pub struct SpawnEffect {
    pub kind: String,
    /// Spawned ids are `{prefix}-{uuid}`
    pub prefix: String,
    pub anchor: TargetRef,
    pub tags: Vec<String>,
    pub attrs: Vec<(String, Expr)>,
}

impl SpawnEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let tags = match src.config.first_field(&["tags", "tag"]) {
            None => vec!["item".to_string()],
            Some(JsonValue::String(tag)) => vec![tag.clone()],
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| src.invalid("tags must be strings"))
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(src.invalid("tags must be a string or an array")),
        };

        let attrs = match src.config.first_field(&["attrs", "attributes"]) {
            None => Vec::new(),
            Some(JsonValue::Object(map)) => map
                .iter()
                .map(|(name, v)| {
                    let expr = match v {
                        JsonValue::Number(n) => n.as_f64().map(Expr::constant),
                        JsonValue::String(s) => Some(Expr::compile(s)),
                        JsonValue::Bool(b) => Some(Expr::constant(if *b { 1.0 } else { 0.0 })),
                        _ => None,
                    };
                    expr.map(|e| (name.clone(), e))
                        .ok_or_else(|| src.invalid(format!("attribute '{}' is not numeric", name)))
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(src.invalid("attrs must be an object")),
        };

        Ok(Self {
            kind: src.str_field(&["kind", "item", "thing_kind"]).unwrap_or_else(|| "item".to_string()),
            prefix: src.str_field(&["prefix", "id_prefix"]).unwrap_or_else(|| "item".to_string()),
            anchor: src.target_field(&["at", "anchor", "target"], TargetRef::SelfRef),
            tags,
            attrs,
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let Some(anchor) = self.anchor.resolve(ctx) else {
            return Ok(());
        };
        let Some(position) = ctx.snapshot.thing(&anchor).and_then(|t| t.position) else {
            return Ok(());
        };

        let mut attrs = BTreeMap::new();
        for (name, expr) in &self.attrs {
            attrs.insert(name.clone(), expr.eval_number(ctx)?);
        }

        batch.read_thing(ctx.snapshot, &anchor);
        batch.spawns.push(SpawnRequest {
            id: ThingId::new(format!("{}-{}", self.prefix, Uuid::new_v4())),
            kind: self.kind.clone(),
            tags: self.tags.iter().cloned().collect::<BTreeSet<_>>(),
            attrs,
            position,
            anchor,
        });
        Ok(())
    }
}

/// Marks the nearest available tagged item around an anchor as consumed.
#[derive(Debug, Clone)]
pub struct ConsumeNearbyEffect {
    pub tag: String,
    pub radius: i32,
    pub anchor: TargetRef,
    /// Also mark the item as held
    pub hold: bool,
}

impl ConsumeNearbyEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let radius = match src.config.first_field(&["radius", "range"]) {
            None => 1,
            Some(v) => v
                .as_f64()
                .filter(|r| *r >= 0.0)
                .map(|r| r as i32)
                .ok_or_else(|| src.invalid("radius must be a non-negative number"))?,
        };
        Ok(Self {
            tag: src.str_field(&["tag"]).unwrap_or_else(|| "food".to_string()),
            radius,
            anchor: src.target_field(&["anchor", "at", "target"], TargetRef::SelfRef),
            hold: src.bool_field(&["hold", "held", "mark_held"]).unwrap_or(false),
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let Some(anchor) = self.anchor.resolve(ctx) else {
            return Ok(());
        };
        let Some(center) = ctx.snapshot.thing(&anchor).and_then(|t| t.position) else {
            return Ok(());
        };

        let nearest = ctx
            .snapshot
            .query_by_tag(&self.tag)
            .into_iter()
            .filter(|t| is_available_item(t))
            .filter_map(|t| {
                let d = t.position?.manhattan(center);
                (d <= self.radius).then(|| (d, t.id.clone()))
            })
            .min();
        let Some((_, item)) = nearest else {
            return Ok(());
        };

        batch.read_attr(ctx.snapshot, &item, CONSUMED_ATTR);
        batch.read_attr(ctx.snapshot, &item, HELD_ATTR);
        batch.write_attr(&item, CONSUMED_ATTR, 1.0);
        if self.hold {
            batch.write_attr(&item, HELD_ATTR, 1.0);
        }
        Ok(())
    }
}

/// Removes a thing from the world.
#[derive(Debug, Clone)]
pub struct DespawnEffect {
    pub target: TargetRef,
}

impl DespawnEffect {
    pub fn compile(src: &EffectSource<'_>) -> Self {
        Self {
            target: src.target_field(&["target", "thing"], TargetRef::Target),
        }
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        if let Some(target) = self.target.resolve_existing(ctx) {
            batch.read_thing(ctx.snapshot, &target);
            batch.despawns.push(target);
        }
        Ok(())
    }
}

/// Moves a thing one tile along a shortest path towards a destination.
#[derive(Debug, Clone)]
pub struct MoveStepEffect {
    pub mover: TargetRef,
    pub destination: TargetRef,
    /// No step is taken once within this Manhattan distance
    pub stop_within: i32,
}

impl MoveStepEffect {
    pub fn compile(src: &EffectSource<'_>, default_stop_within: i32) -> Result<Self, ContentError> {
        let stop_within = match src.config.first_field(&["stop_within", "stopWithin"]) {
            None => default_stop_within,
            Some(v) => v
                .as_f64()
                .filter(|r| *r >= 0.0)
                .map(|r| r as i32)
                .ok_or_else(|| src.invalid("stop_within must be a non-negative number"))?,
        };
        Ok(Self {
            mover: src.target_field(&["mover", "who"], TargetRef::SelfRef),
            destination: src.target_field(&["to", "destination", "target"], TargetRef::Target),
            stop_within,
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let (Some(mover), Some(destination)) = (self.mover.resolve(ctx), self.destination.resolve(ctx))
        else {
            return Ok(());
        };
        let Some(from) = ctx.snapshot.thing(&mover).and_then(|t| t.position) else {
            return Ok(());
        };
        let Some(goal) = ctx
            .snapshot
            .thing(&destination)
            .and_then(|t| t.approach_point(from))
        else {
            return Ok(());
        };

        if from.manhattan(goal) <= self.stop_within {
            return Ok(());
        }
        let Some(next) = ctx.snapshot.next_step(from, goal) else {
            tracing::debug!(%mover, %destination, "no path to destination");
            return Ok(());
        };

        batch.read_thing(ctx.snapshot, &mover);
        batch.read_thing(ctx.snapshot, &destination);
        batch.write_attr(&mover, MOVE_X_ATTR, f64::from(next.x));
        batch.write_attr(&mover, MOVE_Y_ATTR, f64::from(next.y));
        Ok(())
    }
}

/// Stops the scope from re-planning an action for a while.
#[derive(Debug, Clone)]
pub struct PlanCooldownEffect {
    pub scope: TargetRef,
    pub key: String,
    pub seconds: Option<Expr>,
    /// Ignored when `seconds` is given
    pub use_step_duration: bool,
}

impl PlanCooldownEffect {
    pub fn compile(src: &EffectSource<'_>) -> Self {
        let seconds = src.expr_field(&["seconds", "value", "duration"]);
        let use_step_duration = seconds.is_none()
            && src
                .bool_field(&["use_step_duration", "useStepDuration"])
                .unwrap_or(true);
        Self {
            scope: src.target_field(&["scope", "target"], TargetRef::SelfRef),
            key: src
                .str_field(&["key", "action"])
                .unwrap_or_else(|| src.action_id.to_string()),
            seconds,
            use_step_duration,
        }
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let Some(scope) = self.scope.resolve(ctx) else {
            return Ok(());
        };
        let seconds = match &self.seconds {
            Some(expr) => {
                let v = expr.eval_number(ctx)?;
                if v.is_finite() {
                    v.max(0.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        batch.plan_cooldowns.push(PlanCooldownRequest {
            scope,
            key: self.key.clone(),
            seconds,
            use_step_duration: self.use_step_duration,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::content::EffectConfig;
    use crate::effects::{CompiledEffect, EffectOp};
    use serde_json::json;
    use sim_world::memory::MemoryWorld;
    use sim_world::{GridPos, Services, ThingView, World, WorldSnapshot};

    fn compile(action: &str, value: serde_json::Value) -> CompiledEffect {
        let config: EffectConfig = serde_json::from_value(value).unwrap();
        CompiledEffect::compile(action, &config, &PlanningConfig::default()).unwrap()
    }

    fn world() -> MemoryWorld {
        let mut world = MemoryWorld::new(8, 8);
        world.insert(
            ThingView::new("npc", "actor")
                .at(0, 0)
                .with_attr("energy", 0.9)
                .with_attr("hunger", 0.3),
        );
        world.insert(ThingView::new("well", "well").tagged("well").at(3, 0));
        world.insert(ThingView::new("bread", "item").tagged("food").at(1, 0));
        world.insert(ThingView::new("cake", "item").tagged("food").at(0, 1));
        world.insert(
            ThingView::new("crumbs", "item")
                .tagged("food")
                .at(0, 0)
                .with_attr(CONSUMED_ATTR, 1.0),
        );
        world
    }

    fn run(effect: &CompiledEffect, world: &MemoryWorld, target: Option<&str>) -> EffectBatch {
        let snap = world.snap();
        let services = Services::new();
        let target = target.map(ThingId::from);
        let ctx = EvalContext::new(&snap, &services)
            .with_self(&ThingId::from("npc"))
            .with_target(target.as_ref());
        let mut batch = EffectBatch::new(snap.version());
        effect.apply(&ctx, &mut batch).unwrap();
        batch
    }

    #[test]
    fn test_write_attr_add_clamps() {
        let effect = compile("rest", json!({ "op": "add", "attr": "energy", "value": 0.5 }));
        let batch = run(&effect, &world(), None);
        assert_eq!(batch.writes.len(), 1);
        assert_eq!(batch.writes[0].value, 1.0);
        assert_eq!(batch.reads[0].expected, Some(0.9));
    }

    #[test]
    fn test_write_attr_subtract_and_set() {
        let effect = compile("work", json!({ "op": "subtract", "attr": "energy", "value": "0.2 * 2" }));
        let batch = run(&effect, &world(), None);
        assert!((batch.writes[0].value - 0.5).abs() < 1e-9);

        let effect = compile("reset", json!({ "type": "write_attr", "op": "set", "attr": "hunger", "value": -3 }));
        let batch = run(&effect, &world(), None);
        assert_eq!(batch.writes[0].value, 0.0);
    }

    #[test]
    fn test_write_attr_mode_ignores_case() {
        let effect = compile("reset", json!({ "type": "write_attr", "mode": "Set", "attr": "energy", "value": 0.25 }));
        let batch = run(&effect, &world(), None);
        assert_eq!(batch.writes[0].value, 0.25);

        let effect = compile("tire", json!({ "op": "SUBTRACT", "attr": "energy", "value": 0.4 }));
        let batch = run(&effect, &world(), None);
        assert!((batch.writes[0].value - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_write_attr_unclamped() {
        let effect = compile("walk", json!({ "op": "set", "attr": "@move.x", "value": 7 }));
        let batch = run(&effect, &world(), None);
        assert_eq!(batch.writes[0].value, 7.0);

        let effect = compile("earn", json!({ "op": "add", "attr": "score", "value": 5, "clamp": false }));
        let batch = run(&effect, &world(), None);
        assert_eq!(batch.writes[0].value, 5.0);
    }

    #[test]
    fn test_write_attr_health_defaults_to_full() {
        let effect = compile("hurt", json!({ "op": "add", "attr": "health", "value": -0.25, "clamp": false }));
        let batch = run(&effect, &world(), None);
        assert_eq!(batch.writes[0].value, 0.75);
    }

    #[test]
    fn test_write_attr_missing_target_is_noop() {
        let effect = compile("poke", json!({ "op": "add", "attr": "energy", "target": "$target", "value": 1 }));
        let batch = run(&effect, &world(), None);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_write_fact() {
        let effect = compile("greet", json!({ "op": "add_fact", "predicate": "met", "object": "$target" }));
        let batch = run(&effect, &world(), Some("well"));
        assert_eq!(batch.facts[0].subject, ThingId::from("npc"));
        assert_eq!(batch.facts[0].object, ThingId::from("well"));
        assert!(batch.facts[0].add);

        let effect = compile("forget", json!({ "op": "retract", "predicate": "awake" }));
        let batch = run(&effect, &world(), None);
        assert!(batch.facts[0].object.is_empty());
        assert!(!batch.facts[0].add);
    }

    #[test]
    fn test_spawn() {
        let effect = compile(
            "bake",
            json!({ "op": "spawn", "kind": "bread", "prefix": "bread", "tags": ["food", "item"], "attrs": { "freshness": "0.5 + 0.5" } }),
        );
        let batch = run(&effect, &world(), None);
        let spawn = &batch.spawns[0];
        assert!(spawn.id.as_str().starts_with("bread-"));
        assert_eq!(spawn.position, GridPos::new(0, 0));
        assert_eq!(spawn.anchor, ThingId::from("npc"));
        assert!(spawn.tags.contains("food"));
        assert_eq!(spawn.attrs.get("freshness"), Some(&1.0));
    }

    #[test]
    fn test_spawn_defaults() {
        let effect = compile("drop", json!({ "type": "spawn" }));
        let batch = run(&effect, &world(), None);
        assert!(batch.spawns[0].id.as_str().starts_with("item-"));
        assert!(batch.spawns[0].tags.contains("item"));
    }

    #[test]
    fn test_consume_nearby_picks_nearest_by_id() {
        let effect = compile("eat", json!({ "op": "consume_nearby", "hold": true }));
        let batch = run(&effect, &world(), None);
        // bread and cake are both one tile away; crumbs are already consumed
        assert_eq!(batch.writes.len(), 2);
        assert_eq!(batch.writes[0].thing, ThingId::from("bread"));
        assert_eq!(batch.writes[0].attr, CONSUMED_ATTR);
        assert_eq!(batch.writes[1].attr, HELD_ATTR);
    }

    #[test]
    fn test_consume_nearby_nothing_in_range() {
        let effect = compile("drink", json!({ "op": "consume", "tag": "water", "radius": 5 }));
        assert!(run(&effect, &world(), None).is_empty());
    }

    #[test]
    fn test_despawn_defaults_to_target() {
        let effect = compile("pick", json!({ "type": "despawn" }));
        let batch = run(&effect, &world(), Some("bread"));
        assert_eq!(batch.despawns, vec![ThingId::from("bread")]);
        assert!(run(&effect, &world(), Some("ghost")).is_empty());
    }

    #[test]
    fn test_move_step_toward_target() {
        let effect = compile("move_to", json!({ "type": "move" }));
        let batch = run(&effect, &world(), Some("well"));
        let x = batch.writes.iter().find(|w| w.attr == MOVE_X_ATTR).unwrap();
        let y = batch.writes.iter().find(|w| w.attr == MOVE_Y_ATTR).unwrap();
        assert_eq!((x.value, y.value), (1.0, 0.0));
    }

    #[test]
    fn test_move_step_within_stop_radius() {
        let effect = compile("move_to", json!({ "type": "move", "stop_within": 3 }));
        assert!(run(&effect, &world(), Some("well")).is_empty());
    }

    #[test]
    fn test_plan_cooldown_uses_step_duration() {
        let effect = compile("nap", json!({ "type": "plan_cooldown", "useStepDuration": true }));
        let batch = run(&effect, &world(), None);
        let req = &batch.plan_cooldowns[0];
        assert!(req.use_step_duration);
        assert_eq!(req.seconds, 0.0);
        assert_eq!(req.key, "nap");
        assert_eq!(req.scope, ThingId::from("npc"));
    }

    #[test]
    fn test_plan_cooldown_explicit_seconds() {
        let effect = compile("nap", json!({ "op": "cooldown", "value": "30 * 2", "key": "sleep" }));
        let batch = run(&effect, &world(), None);
        let req = &batch.plan_cooldowns[0];
        assert!(!req.use_step_duration);
        assert_eq!(req.seconds, 60.0);
        assert_eq!(req.key, "sleep");
    }

    #[test]
    fn test_compiled_variants() {
        assert!(matches!(
            compile("x", json!({ "op": "set", "attr": "a" })).op(),
            EffectOp::WriteAttr(WriteAttrEffect { mode: AttrMode::Set, .. })
        ));
    }
}

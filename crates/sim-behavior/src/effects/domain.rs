//! Domain subsystem effects.
//!
//! Each of these parses the free-form `value` payload (a string, a number
//! or an object) into a typed operation when the content is loaded.

use serde_json::{Map, Value as JsonValue};
use sim_world::{
    AnimalAction, AnimalOp, CropAction, CropOp, EffectBatch, FishingOp, ForagingOp, MiningOp,
    QuestAction, QuestOp,
};

use super::target::TargetRef;
use super::EffectSource;
use crate::error::{ContentError, ExprError};
use crate::expr::{EvalContext, Expr};

/// The payload's verb: a string payload, an object's `action` key, or the
/// last segment of `op`. Other payload shapes are rejected.
fn payload_verb(src: &EffectSource<'_>) -> Result<Option<String>, ContentError> {
    Ok(match src.payload() {
        Some(JsonValue::String(s)) => Some(s.trim().to_ascii_lowercase()),
        Some(JsonValue::Object(map)) => map
            .get("action")
            .and_then(JsonValue::as_str)
            .map(|s| s.trim().to_ascii_lowercase())
            .or_else(|| src.op_verb()),
        Some(JsonValue::Number(_)) | Some(JsonValue::Bool(_)) | Some(JsonValue::Array(_)) => {
            return Err(src.invalid("payload must be a string or an object"));
        }
        _ => src.op_verb(),
    })
}

fn payload_object<'c>(src: &EffectSource<'c>) -> Option<&'c Map<String, JsonValue>> {
    src.payload().and_then(JsonValue::as_object)
}

/// A string from the payload object, falling back to top-level fields.
fn payload_str(src: &EffectSource<'_>, names: &[&str]) -> Option<String> {
    payload_object(src)
        .and_then(|map| names.iter().find_map(|n| map.get(*n)?.as_str()))
        .map(str::to_string)
        .or_else(|| src.str_field(names))
}

/// Till, plant, water or harvest a plot.
#[derive(Debug, Clone)]
pub struct CropEffect {
    pub actor: TargetRef,
    pub plot: TargetRef,
    pub action: CropAction,
}

impl CropEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let verb = payload_verb(src)?.ok_or_else(|| src.invalid("missing crop action"))?;
        let action = match verb.as_str() {
            "till" | "hoe" => CropAction::Till,
            "water" => CropAction::Water,
            "harvest" => CropAction::Harvest,
            "plant" | "sow" => CropAction::Plant {
                seed: payload_str(src, &["seed", "crop"])
                    .ok_or_else(|| src.invalid("plant requires a seed"))?,
            },
            other => return Err(src.invalid(format!("unknown crop action '{}'", other))),
        };
        Ok(Self {
            actor: src.target_field(&["actor"], TargetRef::SelfRef),
            plot: src.target_field(&["plot", "target"], TargetRef::Target),
            action,
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let (Some(actor), Some(plot)) = (self.actor.resolve(ctx), self.plot.resolve_existing(ctx)) else {
            return Ok(());
        };
        batch.crop_ops.push(CropOp {
            actor,
            plot,
            action: self.action.clone(),
        });
        Ok(())
    }
}

/// Feed, brush or collect from an animal.
#[derive(Debug, Clone)]
pub struct AnimalEffect {
    pub actor: TargetRef,
    pub animal: TargetRef,
    pub action: AnimalAction,
}

impl AnimalEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let verb = payload_verb(src)?.ok_or_else(|| src.invalid("missing animal action"))?;
        let action = match verb.as_str() {
            "feed" => AnimalAction::Feed {
                item: payload_str(src, &["item", "feed"]),
            },
            "brush" | "groom" | "pet" => AnimalAction::Brush,
            "collect" | "milk" | "shear" | "gather" => AnimalAction::Collect,
            other => return Err(src.invalid(format!("unknown animal action '{}'", other))),
        };
        Ok(Self {
            actor: src.target_field(&["actor"], TargetRef::SelfRef),
            animal: src.target_field(&["animal", "target"], TargetRef::Target),
            action,
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let (Some(actor), Some(animal)) = (self.actor.resolve(ctx), self.animal.resolve_existing(ctx))
        else {
            return Ok(());
        };
        batch.animal_ops.push(AnimalOp {
            actor,
            animal,
            action: self.action.clone(),
        });
        Ok(())
    }
}

/// Cast a line at a fishing spot.
#[derive(Debug, Clone)]
pub struct FishingEffect {
    pub actor: TargetRef,
    pub spot: TargetRef,
    pub bait: Option<String>,
}

impl FishingEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        match payload_verb(src)?.as_deref() {
            None | Some("cast") | Some("fish") | Some("fishing") => {}
            Some(other) => return Err(src.invalid(format!("unknown fishing action '{}'", other))),
        }
        Ok(Self {
            actor: src.target_field(&["actor"], TargetRef::SelfRef),
            spot: src.target_field(&["spot", "target"], TargetRef::Target),
            bait: payload_str(src, &["bait"]),
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let (Some(actor), Some(spot)) = (self.actor.resolve(ctx), self.spot.resolve_existing(ctx)) else {
            return Ok(());
        };
        batch.fishing_ops.push(FishingOp {
            actor,
            spot,
            bait: self.bait.clone(),
        });
        Ok(())
    }
}

/// Where a mining op's tool tier comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolTier {
    /// Best held tool carrying this flag
    Inventory(String),
    Fixed(u32),
}

/// Extract from a mining node.
///
/// Skipped when the resolved tool tier is below the node's requirement.
#[derive(Debug, Clone)]
pub struct MiningEffect {
    pub actor: TargetRef,
    pub node: TargetRef,
    pub tier: ToolTier,
}

impl MiningEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let tier = match src.payload() {
            Some(JsonValue::Number(n)) => {
                let tier = n
                    .as_u64()
                    .and_then(|t| u32::try_from(t).ok())
                    .ok_or_else(|| src.invalid("tool tier must be a non-negative integer"))?;
                ToolTier::Fixed(tier)
            }
            Some(JsonValue::String(s))
                if !matches!(s.trim().to_ascii_lowercase().as_str(), "mine" | "extract" | "mining") =>
            {
                return Err(src.invalid(format!("unknown mining action '{}'", s)));
            }
            _ => ToolTier::Inventory(
                payload_str(src, &["tool", "tool_flag"]).unwrap_or_else(|| "pickaxe".to_string()),
            ),
        };
        Ok(Self {
            actor: src.target_field(&["actor"], TargetRef::SelfRef),
            node: src.target_field(&["node", "target"], TargetRef::Target),
            tier,
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let (Some(actor), Some(node)) = (self.actor.resolve(ctx), self.node.resolve_existing(ctx)) else {
            return Ok(());
        };
        let tool_tier = match &self.tier {
            ToolTier::Fixed(t) => *t,
            ToolTier::Inventory(flag) => ctx
                .services
                .inventory
                .as_ref()
                .map_or(0, |inv| inv.tool_tier(&actor, flag)),
        };
        if let Some(state) = ctx.services.mining.as_ref().and_then(|m| m.mining_node(&node)) {
            if state.is_depleted() || tool_tier < state.required_tier {
                tracing::debug!(%actor, %node, tool_tier, required = state.required_tier, "cannot mine node");
                return Ok(());
            }
        }
        batch.mining_ops.push(MiningOp {
            actor,
            node,
            tool_tier,
        });
        Ok(())
    }
}

/// Harvest a forage node.
#[derive(Debug, Clone)]
pub struct ForagingEffect {
    pub actor: TargetRef,
    pub node: TargetRef,
}

impl ForagingEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        match payload_verb(src)?.as_deref() {
            None | Some("forage") | Some("harvest") | Some("gather") | Some("foraging") => {}
            Some(other) => return Err(src.invalid(format!("unknown foraging action '{}'", other))),
        }
        Ok(Self {
            actor: src.target_field(&["actor"], TargetRef::SelfRef),
            node: src.target_field(&["node", "target"], TargetRef::Target),
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let (Some(actor), Some(node)) = (self.actor.resolve(ctx), self.node.resolve_existing(ctx)) else {
            return Ok(());
        };
        let ready = ctx
            .services
            .foraging
            .as_ref()
            .and_then(|f| f.forage_node(&node))
            .map_or(true, |n| n.ready);
        if ready {
            batch.foraging_ops.push(ForagingOp { actor, node });
        }
        Ok(())
    }
}

/// Accept, progress or claim a quest.
#[derive(Debug, Clone)]
pub struct QuestEffect {
    pub actor: TargetRef,
    pub quest_id: String,
    pub action: QuestAction,
}

impl QuestEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let quest_id = payload_str(src, &["quest", "quest_id", "id"])
            .ok_or_else(|| src.invalid("missing quest id"))?;

        let action = match src.payload() {
            Some(JsonValue::Number(n)) => QuestAction::Progress {
                objective: src.str_field(&["objective"]),
                amount: quest_amount(src, n.as_f64())?,
            },
            _ => {
                let verb = payload_verb(src)?.ok_or_else(|| src.invalid("missing quest action"))?;
                let verb = verb.strip_prefix("quest_").unwrap_or(&verb).to_string();
                match verb.as_str() {
                    "accept" | "start" => QuestAction::Accept,
                    "claim" | "complete" | "turn_in" => QuestAction::Claim,
                    "progress" | "advance" => {
                        let amount = payload_object(src)
                            .and_then(|m| m.get("amount"))
                            .and_then(JsonValue::as_f64)
                            .or_else(|| src.config.first_field(&["amount"]).and_then(JsonValue::as_f64));
                        QuestAction::Progress {
                            objective: payload_str(src, &["objective"]),
                            amount: quest_amount(src, amount)?,
                        }
                    }
                    other => return Err(src.invalid(format!("unknown quest action '{}'", other))),
                }
            }
        };
        Ok(Self {
            actor: src.target_field(&["actor", "target"], TargetRef::SelfRef),
            quest_id,
            action,
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let Some(actor) = self.actor.resolve(ctx) else {
            return Ok(());
        };
        batch.quest_ops.push(QuestOp {
            actor,
            quest_id: self.quest_id.clone(),
            action: self.action.clone(),
        });
        Ok(())
    }
}

fn quest_amount(src: &EffectSource<'_>, amount: Option<f64>) -> Result<i32, ContentError> {
    match amount {
        None => Ok(1),
        Some(a) if a.is_finite() && a.fract() == 0.0 && a.abs() <= f64::from(i32::MAX) => Ok(a as i32),
        Some(a) => Err(src.invalid(format!("quest progress amount {} is not a whole number", a))),
    }
}

/// Grants skill experience immediately through the skill service.
///
/// This is a side channel: nothing is queued in the batch, and the grant is
/// not undone when the batch later conflicts. Every `build_batch` grants
/// again, so hosts that retry a conflicted step must rebuild only after
/// re-planning, or grant XP themselves and leave this effect out.
#[derive(Debug, Clone)]
pub struct SkillXpEffect {
    pub actor: TargetRef,
    pub skill: String,
    pub amount: Expr,
}

impl SkillXpEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        Ok(Self {
            actor: src.target_field(&["actor", "target"], TargetRef::SelfRef),
            skill: src.required_str(&["skill"])?,
            amount: src.expr_or(&["amount", "xp", "value"], 1.0),
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, _batch: &mut EffectBatch) -> Result<(), ExprError> {
        let (Some(actor), Some(skills)) = (self.actor.resolve(ctx), &ctx.services.skills) else {
            return Ok(());
        };
        let amount = self.amount.eval_number(ctx)?;
        if amount.is_finite() && amount > 0.0 {
            skills.grant_xp(&actor, &self.skill, amount);
        }
        Ok(())
    }
}

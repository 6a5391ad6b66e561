//! Effect operators.
//!
//! An [`EffectConfig`] is resolved once, at content load, into a
//! [`CompiledEffect`]: an optional guard plus one closed [`EffectOp`]
//! variant with its fields already parsed. Applying it against an
//! [`EvalContext`] appends typed operations to an [`EffectBatch`].
//!
//! # Modules
//!
//! - [`world`]: attributes, facts, spawning, consumption, movement, cooldowns
//! - [`economy`]: inventory, crafting, currency, shops, relationships
//! - [`domain`]: crops, animals, fishing, mining, foraging, quests, skills
//! - [`target`]: symbolic `$self` / `$target` references

pub mod domain;
pub mod economy;
pub mod target;
pub mod world;

pub use domain::{
    AnimalEffect, CropEffect, FishingEffect, ForagingEffect, MiningEffect, QuestEffect,
    SkillXpEffect, ToolTier,
};
pub use economy::{
    CraftingEffect, CurrencyEffect, CurrencyMode, InventoryEffect, InventoryMode,
    RelationshipEffect, ShopTransactionEffect,
};
pub use target::TargetRef;
pub use world::{
    AttrMode, ConsumeNearbyEffect, DespawnEffect, MoveStepEffect, PlanCooldownEffect, SpawnEffect,
    WriteAttrEffect, WriteFactEffect,
};

use serde_json::Value as JsonValue;
use sim_world::EffectBatch;

use crate::config::PlanningConfig;
use crate::content::EffectConfig;
use crate::error::{ContentError, ExprError};
use crate::expr::{EvalContext, Expr};

/// Every effect operator the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    WriteAttr,
    WriteFact,
    Spawn,
    ConsumeNearby,
    Despawn,
    MoveStep,
    PlanCooldown,
    Inventory,
    Crafting,
    Currency,
    ShopTransaction,
    Relationship,
    Crop,
    Animal,
    Fishing,
    Mining,
    Foraging,
    Quest,
    SkillXp,
}

/// Lower-cases and drops separators so `write_attr`, `writeAttr` and
/// `write-attr` compare equal.
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' ' | '.'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl EffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::WriteAttr => "write_attr",
            EffectKind::WriteFact => "write_fact",
            EffectKind::Spawn => "spawn",
            EffectKind::ConsumeNearby => "consume_nearby",
            EffectKind::Despawn => "despawn",
            EffectKind::MoveStep => "move_step",
            EffectKind::PlanCooldown => "plan_cooldown",
            EffectKind::Inventory => "inventory",
            EffectKind::Crafting => "crafting",
            EffectKind::Currency => "currency",
            EffectKind::ShopTransaction => "shop_transaction",
            EffectKind::Relationship => "relationship",
            EffectKind::Crop => "crop",
            EffectKind::Animal => "animal",
            EffectKind::Fishing => "fishing",
            EffectKind::Mining => "mining",
            EffectKind::Foraging => "foraging",
            EffectKind::Quest => "quest",
            EffectKind::SkillXp => "skill_xp",
        }
    }

    /// Leading words an `op` may carry before its verb (`crop_till`).
    fn op_prefixes(&self) -> &'static [&'static str] {
        match self {
            EffectKind::Crop => &["crops_", "crop_"],
            EffectKind::Animal => &["animals_", "animal_"],
            EffectKind::Fishing => &["fishing_", "fish_"],
            EffectKind::Mining => &["mining_", "mine_"],
            EffectKind::Foraging => &["foraging_", "forage_"],
            EffectKind::Quest => &["quests_", "quest_"],
            EffectKind::ShopTransaction => &["shop_"],
            _ => &[],
        }
    }

    /// Looks up an explicit `type` value, accepting the usual synonyms.
    pub fn from_type(kind: &str) -> Option<Self> {
        let kind = match normalize(kind).as_str() {
            "writeattr" | "attr" | "attribute" | "setattr" | "stat" => EffectKind::WriteAttr,
            "writefact" | "fact" => EffectKind::WriteFact,
            "spawn" | "spawnitem" | "create" => EffectKind::Spawn,
            "consumenearby" | "consumenearbyitem" | "consume" => EffectKind::ConsumeNearby,
            "despawn" | "destroy" => EffectKind::Despawn,
            "move" | "movestep" | "moveto" => EffectKind::MoveStep,
            "plancooldown" | "cooldown" => EffectKind::PlanCooldown,
            "inventory" | "item" | "items" => EffectKind::Inventory,
            "craft" | "crafting" | "recipe" => EffectKind::Crafting,
            "currency" | "money" | "gold" | "wallet" => EffectKind::Currency,
            "shop" | "shoptransaction" | "trade" => EffectKind::ShopTransaction,
            "relationship" | "social" | "gift" => EffectKind::Relationship,
            "crop" | "crops" | "farming" | "farm" => EffectKind::Crop,
            "animal" | "animals" | "livestock" => EffectKind::Animal,
            "fish" | "fishing" => EffectKind::Fishing,
            "mine" | "mining" => EffectKind::Mining,
            "forage" | "foraging" => EffectKind::Foraging,
            "quest" | "quests" => EffectKind::Quest,
            "skill" | "skillxp" | "xp" | "experience" => EffectKind::SkillXp,
            _ => return None,
        };
        Some(kind)
    }

    /// Infers the operator from an `op` string by keyword and prefix.
    ///
    /// More specific keywords are tested first; bare arithmetic ops such as
    /// `add` and `set` fall through to attribute writes.
    pub fn infer_from_op(op: &str) -> Option<Self> {
        let op = op.trim().to_ascii_lowercase();
        let has = |needle: &str| op.contains(needle);
        let starts = |prefix: &str| op.starts_with(prefix);

        let kind = if has("cooldown") {
            EffectKind::PlanCooldown
        } else if has("consume") {
            EffectKind::ConsumeNearby
        } else if starts("despawn") || starts("destroy") {
            EffectKind::Despawn
        } else if starts("spawn") {
            EffectKind::Spawn
        } else if starts("move") {
            EffectKind::MoveStep
        } else if has("fact") || op == "assert" || op == "retract" {
            EffectKind::WriteFact
        } else if starts("craft") {
            EffectKind::Crafting
        } else if starts("shop") || op == "buy" || op == "sell" {
            EffectKind::ShopTransaction
        } else if has("currency") || has("money") || has("gold") || op == "earn" || op == "spend" || op == "pay" {
            EffectKind::Currency
        } else if has("relationship") || has("gift") || has("friendship") {
            EffectKind::Relationship
        } else if starts("inventory") || has("item") {
            EffectKind::Inventory
        } else if starts("crop") || matches!(op.as_str(), "till" | "plant" | "water" | "harvest") {
            EffectKind::Crop
        } else if starts("animal") || matches!(op.as_str(), "feed" | "brush" | "collect") {
            EffectKind::Animal
        } else if starts("fish") || op == "cast" {
            EffectKind::Fishing
        } else if starts("mine") || starts("mining") || op == "extract" {
            EffectKind::Mining
        } else if starts("forag") {
            EffectKind::Foraging
        } else if has("quest") {
            EffectKind::Quest
        } else if has("xp") || has("experience") || starts("skill") {
            EffectKind::SkillXp
        } else if matches!(
            normalize(&op).as_str(),
            "add" | "set" | "sub" | "subtract" | "inc" | "increment" | "dec" | "decrement" | "writeattr"
        ) {
            EffectKind::WriteAttr
        } else {
            return None;
        };
        Some(kind)
    }

    /// Explicit `type` wins; otherwise the kind is inferred from `op`.
    pub fn resolve(kind: Option<&str>, op: Option<&str>) -> Option<Self> {
        match kind {
            Some(k) if !k.trim().is_empty() => Self::from_type(k),
            _ => op.and_then(Self::infer_from_op),
        }
    }
}

/// One resolved effect operator with its parsed fields.
#[derive(Debug, Clone)]
pub enum EffectOp {
    WriteAttr(WriteAttrEffect),
    WriteFact(WriteFactEffect),
    Spawn(SpawnEffect),
    ConsumeNearby(ConsumeNearbyEffect),
    Despawn(DespawnEffect),
    MoveStep(MoveStepEffect),
    PlanCooldown(PlanCooldownEffect),
    Inventory(InventoryEffect),
    Crafting(CraftingEffect),
    Currency(CurrencyEffect),
    ShopTransaction(ShopTransactionEffect),
    Relationship(RelationshipEffect),
    Crop(CropEffect),
    Animal(AnimalEffect),
    Fishing(FishingEffect),
    Mining(MiningEffect),
    Foraging(ForagingEffect),
    Quest(QuestEffect),
    SkillXp(SkillXpEffect),
}

impl EffectOp {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectOp::WriteAttr(_) => EffectKind::WriteAttr,
            EffectOp::WriteFact(_) => EffectKind::WriteFact,
            EffectOp::Spawn(_) => EffectKind::Spawn,
            EffectOp::ConsumeNearby(_) => EffectKind::ConsumeNearby,
            EffectOp::Despawn(_) => EffectKind::Despawn,
            EffectOp::MoveStep(_) => EffectKind::MoveStep,
            EffectOp::PlanCooldown(_) => EffectKind::PlanCooldown,
            EffectOp::Inventory(_) => EffectKind::Inventory,
            EffectOp::Crafting(_) => EffectKind::Crafting,
            EffectOp::Currency(_) => EffectKind::Currency,
            EffectOp::ShopTransaction(_) => EffectKind::ShopTransaction,
            EffectOp::Relationship(_) => EffectKind::Relationship,
            EffectOp::Crop(_) => EffectKind::Crop,
            EffectOp::Animal(_) => EffectKind::Animal,
            EffectOp::Fishing(_) => EffectKind::Fishing,
            EffectOp::Mining(_) => EffectKind::Mining,
            EffectOp::Foraging(_) => EffectKind::Foraging,
            EffectOp::Quest(_) => EffectKind::Quest,
            EffectOp::SkillXp(_) => EffectKind::SkillXp,
        }
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        match self {
            EffectOp::WriteAttr(e) => e.apply(ctx, batch),
            EffectOp::WriteFact(e) => e.apply(ctx, batch),
            EffectOp::Spawn(e) => e.apply(ctx, batch),
            EffectOp::ConsumeNearby(e) => e.apply(ctx, batch),
            EffectOp::Despawn(e) => e.apply(ctx, batch),
            EffectOp::MoveStep(e) => e.apply(ctx, batch),
            EffectOp::PlanCooldown(e) => e.apply(ctx, batch),
            EffectOp::Inventory(e) => e.apply(ctx, batch),
            EffectOp::Crafting(e) => e.apply(ctx, batch),
            EffectOp::Currency(e) => e.apply(ctx, batch),
            EffectOp::ShopTransaction(e) => e.apply(ctx, batch),
            EffectOp::Relationship(e) => e.apply(ctx, batch),
            EffectOp::Crop(e) => e.apply(ctx, batch),
            EffectOp::Animal(e) => e.apply(ctx, batch),
            EffectOp::Fishing(e) => e.apply(ctx, batch),
            EffectOp::Mining(e) => e.apply(ctx, batch),
            EffectOp::Foraging(e) => e.apply(ctx, batch),
            EffectOp::Quest(e) => e.apply(ctx, batch),
            EffectOp::SkillXp(e) => e.apply(ctx, batch),
        }
    }
}

/// A guard plus an operator, compiled once per action.
#[derive(Debug, Clone)]
pub struct CompiledEffect {
    guard: Option<Expr>,
    op: EffectOp,
}

impl CompiledEffect {
    /// Resolves the operator kind and parses its fields.
    ///
    /// Unresolvable kinds and malformed payloads are content errors.
    pub fn compile(
        action_id: &str,
        config: &EffectConfig,
        planning: &PlanningConfig,
    ) -> Result<Self, ContentError> {
        let kind = EffectKind::resolve(config.kind.as_deref(), config.op.as_deref()).ok_or_else(
            || ContentError::UnknownEffect {
                action: action_id.to_string(),
                kind: config.kind.clone(),
                op: config.op.clone(),
            },
        )?;

        let src = EffectSource {
            action_id,
            config,
            kind,
        };
        let op = match kind {
            EffectKind::WriteAttr => EffectOp::WriteAttr(WriteAttrEffect::compile(&src)?),
            EffectKind::WriteFact => EffectOp::WriteFact(WriteFactEffect::compile(&src)?),
            EffectKind::Spawn => EffectOp::Spawn(SpawnEffect::compile(&src)?),
            EffectKind::ConsumeNearby => EffectOp::ConsumeNearby(ConsumeNearbyEffect::compile(&src)?),
            EffectKind::Despawn => EffectOp::Despawn(DespawnEffect::compile(&src)),
            EffectKind::MoveStep => {
                EffectOp::MoveStep(MoveStepEffect::compile(&src, planning.default_stop_within)?)
            }
            EffectKind::PlanCooldown => EffectOp::PlanCooldown(PlanCooldownEffect::compile(&src)),
            EffectKind::Inventory => EffectOp::Inventory(InventoryEffect::compile(&src)?),
            EffectKind::Crafting => EffectOp::Crafting(CraftingEffect::compile(&src)?),
            EffectKind::Currency => EffectOp::Currency(CurrencyEffect::compile(&src)),
            EffectKind::ShopTransaction => {
                EffectOp::ShopTransaction(ShopTransactionEffect::compile(&src)?)
            }
            EffectKind::Relationship => EffectOp::Relationship(RelationshipEffect::compile(&src)),
            EffectKind::Crop => EffectOp::Crop(CropEffect::compile(&src)?),
            EffectKind::Animal => EffectOp::Animal(AnimalEffect::compile(&src)?),
            EffectKind::Fishing => EffectOp::Fishing(FishingEffect::compile(&src)?),
            EffectKind::Mining => EffectOp::Mining(MiningEffect::compile(&src)?),
            EffectKind::Foraging => EffectOp::Foraging(ForagingEffect::compile(&src)?),
            EffectKind::Quest => EffectOp::Quest(QuestEffect::compile(&src)?),
            EffectKind::SkillXp => EffectOp::SkillXp(SkillXpEffect::compile(&src)?),
        };

        let guard = config
            .when
            .as_deref()
            .filter(|w| !w.trim().is_empty())
            .map(Expr::compile);
        if let Some(error) = guard.as_ref().and_then(Expr::diagnostic) {
            tracing::warn!(action = action_id, effect = kind.name(), %error, "effect guard does not parse and will never pass");
        }

        Ok(Self { guard, op })
    }

    pub fn new(op: EffectOp) -> Self {
        Self { guard: None, op }
    }

    pub fn with_guard(mut self, guard: Expr) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn kind(&self) -> EffectKind {
        self.op.kind()
    }

    pub fn op(&self) -> &EffectOp {
        &self.op
    }

    /// Guard truthiness; no guard passes, a failing guard does not.
    pub fn should_apply(&self, ctx: &EvalContext<'_>) -> bool {
        match &self.guard {
            None => true,
            Some(guard) => guard.eval_bool(ctx).unwrap_or(false),
        }
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        self.op.apply(ctx, batch)
    }
}

/// What an operator sees while compiling.
pub struct EffectSource<'c> {
    pub action_id: &'c str,
    pub config: &'c EffectConfig,
    pub kind: EffectKind,
}

impl<'c> EffectSource<'c> {
    pub fn invalid(&self, reason: impl Into<String>) -> ContentError {
        ContentError::InvalidEffect {
            action: self.action_id.to_string(),
            effect: self.kind.name(),
            reason: reason.into(),
        }
    }

    /// The lower-cased `op`, if any.
    pub fn op(&self) -> Option<String> {
        self.config
            .op
            .as_deref()
            .map(|o| o.trim().to_ascii_lowercase())
            .filter(|o| !o.is_empty())
    }

    /// The verb of `op`: its last segment with the kind's own prefix
    /// removed (`crop.plant` and `crop_plant` → `plant`).
    pub fn op_verb(&self) -> Option<String> {
        self.op().map(|op| {
            let verb = op.rsplit(['.', ':', '/']).next().unwrap_or_default();
            self.kind
                .op_prefixes()
                .iter()
                .find_map(|prefix| verb.strip_prefix(prefix).filter(|rest| !rest.is_empty()))
                .unwrap_or(verb)
                .to_string()
        })
    }

    pub fn str_field(&self, names: &[&str]) -> Option<String> {
        self.config
            .str_field(names)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// A lower-cased keyword field such as `mode`.
    pub fn keyword(&self, names: &[&str]) -> Option<String> {
        self.str_field(names).map(|s| s.to_ascii_lowercase())
    }

    pub fn required_str(&self, names: &[&str]) -> Result<String, ContentError> {
        self.str_field(names)
            .ok_or_else(|| self.invalid(format!("missing '{}'", names.first().copied().unwrap_or("value"))))
    }

    pub fn target_field(&self, names: &[&str], default: TargetRef) -> TargetRef {
        self.str_field(names)
            .map(|s| TargetRef::parse(&s))
            .unwrap_or(default)
    }

    pub fn expr_field(&self, names: &[&str]) -> Option<Expr> {
        let expr = self.config.expr_field(names)?;
        if let Some(error) = expr.diagnostic() {
            tracing::warn!(action = self.action_id, effect = self.kind.name(), %error, "effect expression does not parse");
        }
        Some(expr)
    }

    pub fn expr_or(&self, names: &[&str], default: f64) -> Expr {
        self.expr_field(names).unwrap_or_else(|| Expr::constant(default))
    }

    pub fn bool_field(&self, names: &[&str]) -> Option<bool> {
        self.config.bool_field(names)
    }

    /// The free-form `value` payload.
    pub fn payload(&self) -> Option<&'c JsonValue> {
        self.config.field("value")
    }
}

/// Evaluates a quantity expression, rounding to the nearest whole number.
/// Non-finite results count as zero.
pub(crate) fn eval_quantity(expr: &Expr, ctx: &EvalContext<'_>) -> Result<i64, ExprError> {
    let v = expr.eval_number(ctx)?;
    Ok(if v.is_finite() { v.round() as i64 } else { 0 })
}

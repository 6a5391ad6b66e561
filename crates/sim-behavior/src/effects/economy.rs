//! Inventory, crafting, currency, shop and relationship effects.

use sim_world::{
    CurrencyOp, EffectBatch, InventoryOp, RelationshipOp, RelationshipOpKind, ShopTransaction,
    ShopTransactionKind,
};

use super::target::TargetRef;
use super::{eval_quantity, EffectSource};
use crate::error::{ContentError, ExprError};
use crate::expr::{craftable_recipe, EvalContext, Expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryMode {
    Add,
    Remove,
}

/// Adds items to or removes items from an owner's inventory.
///
/// Removal is skipped entirely when the owner does not hold enough.
#[derive(Debug, Clone)]
pub struct InventoryEffect {
    pub owner: TargetRef,
    pub item: String,
    pub quantity: Expr,
    pub mode: InventoryMode,
}

impl InventoryEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let removing = |verb: &str| ["remove", "take", "use", "consume", "drop"].iter().any(|v| verb.contains(v));
        let mode = match src.keyword(&["mode"]).or_else(|| src.op()) {
            Some(verb) if removing(&verb) => InventoryMode::Remove,
            _ => InventoryMode::Add,
        };
        Ok(Self {
            owner: src.target_field(&["owner", "target"], TargetRef::SelfRef),
            item: src.required_str(&["item", "id"])?,
            quantity: src.expr_or(&["quantity", "qty", "amount", "count"], 1.0),
            mode,
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let Some(owner) = self.owner.resolve(ctx) else {
            return Ok(());
        };
        let quantity = eval_quantity(&self.quantity, ctx)?;
        if quantity <= 0 {
            return Ok(());
        }

        let delta = match self.mode {
            InventoryMode::Add => quantity,
            InventoryMode::Remove => {
                let held = ctx
                    .services
                    .inventory
                    .as_ref()
                    .map_or(0, |inv| inv.count(&owner, &self.item));
                if held < quantity {
                    tracing::debug!(%owner, item = %self.item, held, quantity, "not enough items to remove");
                    return Ok(());
                }
                -quantity
            }
        };
        batch.inventory_ops.push(InventoryOp {
            owner,
            item: self.item.clone(),
            delta,
        });
        Ok(())
    }
}

/// Crafts a recipe: consumes every ingredient and grants every output.
///
/// Nothing at all is emitted unless the whole recipe can be crafted.
#[derive(Debug, Clone)]
pub struct CraftingEffect {
    pub recipe: String,
    pub crafter: TargetRef,
    pub station: TargetRef,
    pub times: Expr,
}

impl CraftingEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        Ok(Self {
            recipe: src.required_str(&["recipe", "value", "id"])?,
            crafter: src.target_field(&["crafter", "actor"], TargetRef::SelfRef),
            station: src.target_field(&["station", "target"], TargetRef::Target),
            times: src.expr_or(&["quantity", "times", "count"], 1.0),
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let Some(crafter) = self.crafter.resolve(ctx) else {
            return Ok(());
        };
        let times = eval_quantity(&self.times, ctx)?;
        let Ok(times) = u32::try_from(times) else {
            return Ok(());
        };
        if times == 0 {
            return Ok(());
        }
        let station = self.station.resolve(ctx);

        let Some(recipe) = craftable_recipe(ctx, &self.recipe, &crafter, station.as_ref(), times) else {
            tracing::debug!(%crafter, recipe = %self.recipe, "recipe cannot be crafted; skipping");
            return Ok(());
        };

        let times = i64::from(times);
        for stack in &recipe.ingredients {
            batch.inventory_ops.push(InventoryOp {
                owner: crafter.clone(),
                item: stack.item.clone(),
                delta: -i64::from(stack.quantity) * times,
            });
        }
        for stack in &recipe.outputs {
            batch.inventory_ops.push(InventoryOp {
                owner: crafter.clone(),
                item: stack.item.clone(),
                delta: i64::from(stack.quantity) * times,
            });
        }
        if let Some(station) = station.filter(|_| recipe.station.is_some()) {
            batch.read_thing(ctx.snapshot, &station);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencyMode {
    Add,
    Spend,
}

/// Credits or debits a wallet. Spending more than the balance is skipped.
#[derive(Debug, Clone)]
pub struct CurrencyEffect {
    pub owner: TargetRef,
    pub amount: Expr,
    pub mode: CurrencyMode,
}

impl CurrencyEffect {
    pub fn compile(src: &EffectSource<'_>) -> Self {
        let spending = |verb: &str| ["spend", "pay", "remove", "sub", "deduct"].iter().any(|v| verb.contains(v));
        let mode = match src.keyword(&["mode"]).or_else(|| src.op()) {
            Some(verb) if spending(&verb) => CurrencyMode::Spend,
            _ => CurrencyMode::Add,
        };
        Self {
            owner: src.target_field(&["owner", "target"], TargetRef::SelfRef),
            amount: src.expr_or(&["amount", "value", "delta"], 1.0),
            mode,
        }
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let Some(owner) = self.owner.resolve(ctx) else {
            return Ok(());
        };
        let amount = self.amount.eval_number(ctx)?;
        if !amount.is_finite() || amount == 0.0 {
            return Ok(());
        }

        let delta = match self.mode {
            CurrencyMode::Add => amount,
            CurrencyMode::Spend => {
                let cost = amount.abs();
                let balance = ctx
                    .services
                    .inventory
                    .as_ref()
                    .map_or(0.0, |inv| inv.currency(&owner));
                if balance < cost {
                    tracing::debug!(%owner, balance, cost, "insufficient funds");
                    return Ok(());
                }
                -cost
            }
        };
        batch.currency_ops.push(CurrencyOp { owner, delta });
        Ok(())
    }
}

/// Buys from or sells to a shop.
#[derive(Debug, Clone)]
pub struct ShopTransactionEffect {
    pub shop: TargetRef,
    pub customer: TargetRef,
    pub item: String,
    pub quantity: Expr,
    pub kind: ShopTransactionKind,
}

impl ShopTransactionEffect {
    pub fn compile(src: &EffectSource<'_>) -> Result<Self, ContentError> {
        let kind = match src
            .keyword(&["mode", "transaction"])
            .or_else(|| src.op_verb())
            .as_deref()
        {
            Some("sell") => ShopTransactionKind::Sell,
            Some("buy") | None => ShopTransactionKind::Buy,
            Some(other) if other.contains("sell") => ShopTransactionKind::Sell,
            Some(_) => ShopTransactionKind::Buy,
        };
        Ok(Self {
            shop: src.target_field(&["shop", "target"], TargetRef::Target),
            customer: src.target_field(&["customer", "buyer"], TargetRef::SelfRef),
            item: src.required_str(&["item", "id"])?,
            quantity: src.expr_or(&["quantity", "qty", "amount", "count"], 1.0),
            kind,
        })
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let (Some(shop), Some(customer)) = (self.shop.resolve(ctx), self.customer.resolve(ctx)) else {
            return Ok(());
        };
        let Ok(quantity) = u32::try_from(eval_quantity(&self.quantity, ctx)?) else {
            return Ok(());
        };
        if quantity == 0 {
            return Ok(());
        }
        batch.shop_transactions.push(ShopTransaction {
            shop,
            customer,
            item: self.item.clone(),
            quantity,
            kind: self.kind,
        });
        Ok(())
    }
}

/// Adjusts or sets a named relationship value between two parties.
#[derive(Debug, Clone)]
pub struct RelationshipEffect {
    pub from: TargetRef,
    pub to: TargetRef,
    pub relationship: String,
    pub value: Expr,
    pub kind: RelationshipOpKind,
    pub gift_item: Option<String>,
}

impl RelationshipEffect {
    pub fn compile(src: &EffectSource<'_>) -> Self {
        let kind = match src.op_verb().as_deref() {
            Some(verb) if verb.starts_with("set") => RelationshipOpKind::Set,
            _ => RelationshipOpKind::Adjust,
        };
        Self {
            from: src.target_field(&["from", "source"], TargetRef::SelfRef),
            to: src.target_field(&["to", "with", "target"], TargetRef::Target),
            relationship: src
                .str_field(&["relationship", "stat", "name"])
                .unwrap_or_else(|| "friendship".to_string()),
            value: src.expr_or(&["value", "amount", "delta"], 1.0),
            kind,
            gift_item: src.str_field(&["gift", "gift_item", "item"]),
        }
    }

    pub fn apply(&self, ctx: &EvalContext<'_>, batch: &mut EffectBatch) -> Result<(), ExprError> {
        let (Some(from), Some(to)) = (self.from.resolve(ctx), self.to.resolve(ctx)) else {
            return Ok(());
        };
        let value = self.value.eval_number(ctx)?;
        if !value.is_finite() {
            return Ok(());
        }
        batch.relationship_ops.push(RelationshipOp {
            from,
            to,
            relationship: self.relationship.clone(),
            kind: self.kind,
            value,
            gift_item: self.gift_item.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::content::EffectConfig;
    use crate::effects::CompiledEffect;
    use serde_json::json;
    use sim_world::memory::{MemoryServices, MemoryWorld, ServicesFixture};
    use sim_world::{ItemStack, Recipe, Services, ThingId, ThingView, World, WorldSnapshot};
    use std::sync::Arc;

    fn compile(value: serde_json::Value) -> CompiledEffect {
        let config: EffectConfig = serde_json::from_value(value).unwrap();
        CompiledEffect::compile("test", &config, &PlanningConfig::default()).unwrap()
    }

    fn world() -> MemoryWorld {
        let mut world = MemoryWorld::new(4, 4);
        world.insert(ThingView::new("npc", "actor").at(0, 0));
        world.insert(ThingView::new("bench", "workbench").tagged("workbench").at(1, 0));
        world.insert(ThingView::new("store", "shop").at(2, 0));
        world
    }

    fn services(wood: i64, gold: f64) -> Services {
        let mut f = ServicesFixture::default();
        f.inventories.insert(
            ThingId::from("npc"),
            [("wood".to_string(), wood)].into_iter().collect(),
        );
        f.wallets.insert(ThingId::from("npc"), gold);
        f.recipes.insert(
            "plank".into(),
            Recipe {
                id: "plank".into(),
                ingredients: vec![ItemStack { item: "wood".into(), quantity: 2 }],
                outputs: vec![ItemStack { item: "plank".into(), quantity: 4 }],
                station: Some("workbench".into()),
                ..Default::default()
            },
        );
        Arc::new(MemoryServices::new(f)).into_services()
    }

    fn run(effect: &CompiledEffect, services: &Services, target: Option<&str>) -> EffectBatch {
        let world = world();
        let snap = world.snap();
        let target = target.map(ThingId::from);
        let ctx = EvalContext::new(&snap, services)
            .with_self(&ThingId::from("npc"))
            .with_target(target.as_ref());
        let mut batch = EffectBatch::new(snap.version());
        effect.apply(&ctx, &mut batch).unwrap();
        batch
    }

    #[test]
    fn test_inventory_add_and_remove() {
        let add = compile(json!({ "op": "add_item", "item": "apple", "quantity": "1 + 1" }));
        let batch = run(&add, &services(0, 0.0), None);
        assert_eq!(batch.inventory_ops[0].delta, 2);

        let remove = compile(json!({ "type": "inventory", "op": "remove", "item": "wood", "quantity": 3 }));
        let batch = run(&remove, &services(3, 0.0), None);
        assert_eq!(batch.inventory_ops[0].delta, -3);

        // insufficient stock
        let batch = run(&remove, &services(2, 0.0), None);
        assert!(batch.inventory_ops.is_empty());
    }

    #[test]
    fn test_crafting_consumes_and_grants() {
        let craft = compile(json!({ "type": "crafting", "recipe": "plank" }));
        let batch = run(&craft, &services(5, 0.0), Some("bench"));
        assert_eq!(batch.inventory_ops.len(), 2);
        assert_eq!(batch.inventory_ops[0].item, "wood");
        assert_eq!(batch.inventory_ops[0].delta, -2);
        assert_eq!(batch.inventory_ops[1].item, "plank");
        assert_eq!(batch.inventory_ops[1].delta, 4);
    }

    #[test]
    fn test_crafting_with_insufficient_ingredients_emits_nothing() {
        let craft = compile(json!({ "type": "crafting", "recipe": "plank" }));
        let batch = run(&craft, &services(1, 0.0), Some("bench"));
        assert!(batch.inventory_ops.is_empty());
        assert!(batch.is_empty());
    }

    #[test]
    fn test_crafting_requires_matching_station() {
        let craft = compile(json!({ "type": "crafting", "recipe": "plank" }));
        assert!(run(&craft, &services(5, 0.0), Some("store")).is_empty());
        assert!(run(&craft, &services(5, 0.0), None).is_empty());
    }

    #[test]
    fn test_crafting_multiple_times() {
        let craft = compile(json!({ "type": "craft", "recipe": "plank", "times": 2 }));
        let batch = run(&craft, &services(4, 0.0), Some("bench"));
        assert_eq!(batch.inventory_ops[0].delta, -4);
        assert_eq!(batch.inventory_ops[1].delta, 8);
    }

    #[test]
    fn test_currency() {
        let earn = compile(json!({ "op": "earn_gold", "amount": 15 }));
        let batch = run(&earn, &services(0, 0.0), None);
        assert_eq!(batch.currency_ops[0].delta, 15.0);

        let spend = compile(json!({ "type": "currency", "op": "spend", "amount": 10 }));
        assert_eq!(run(&spend, &services(0, 12.0), None).currency_ops[0].delta, -10.0);
        assert!(run(&spend, &services(0, 9.0), None).currency_ops.is_empty());
    }

    #[test]
    fn test_shop_transaction() {
        let sell = compile(json!({ "op": "sell", "item": "plank", "quantity": 3 }));
        let batch = run(&sell, &services(0, 0.0), Some("store"));
        let tx = &batch.shop_transactions[0];
        assert_eq!(tx.kind, ShopTransactionKind::Sell);
        assert_eq!(tx.shop, ThingId::from("store"));
        assert_eq!(tx.customer, ThingId::from("npc"));
        assert_eq!(tx.quantity, 3);

        let buy = compile(json!({ "type": "shop", "item": "seed" }));
        let batch = run(&buy, &services(0, 0.0), Some("store"));
        assert_eq!(batch.shop_transactions[0].kind, ShopTransactionKind::Buy);
    }

    #[test]
    fn test_relationship() {
        let gift = compile(json!({ "op": "give_gift", "to": "$target", "gift": "flower", "value": 0.1 }));
        let batch = run(&gift, &services(0, 0.0), Some("store"));
        let op = &batch.relationship_ops[0];
        assert_eq!(op.kind, RelationshipOpKind::Adjust);
        assert_eq!(op.relationship, "friendship");
        assert_eq!(op.gift_item.as_deref(), Some("flower"));

        let set = compile(json!({ "type": "relationship", "op": "set", "relationship": "romance", "value": 0 }));
        let batch = run(&set, &services(0, 0.0), Some("store"));
        assert_eq!(batch.relationship_ops[0].kind, RelationshipOpKind::Set);
    }
}

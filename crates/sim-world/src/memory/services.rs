//! In-memory domain services backed by a serializable fixture.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::batch::EffectBatch;
use crate::queries::{
    AnimalQuery, AnimalState, CraftingQuery, CropQuery, CropState, EffectFailureObserver,
    FishingQuery, FishingSpotState, ForageNodeState, ForagingQuery, InventoryQuery, MiningNodeState,
    MiningQuery, QuestQuery, QuestStatus, Recipe, ReservationQuery, Services, SkillProgression,
    WeatherQuery, WeatherState,
};
use crate::thing::ThingId;

/// An item that counts as a tool for some tool flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub flag: String,
    pub tier: u32,
}

/// Serializable state for every in-memory domain service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesFixture {
    /// thing -> holder
    pub reservations: BTreeMap<ThingId, ThingId>,
    pub inventories: BTreeMap<ThingId, BTreeMap<String, i64>>,
    pub wallets: BTreeMap<ThingId, f64>,
    /// item id -> tool data
    pub tools: BTreeMap<String, ToolSpec>,
    pub crops: BTreeMap<ThingId, CropState>,
    pub animals: BTreeMap<ThingId, AnimalState>,
    pub fishing_spots: BTreeMap<ThingId, FishingSpotState>,
    pub mining_nodes: BTreeMap<ThingId, MiningNodeState>,
    pub forage_nodes: BTreeMap<ThingId, ForageNodeState>,
    /// actor -> quest id -> status
    pub quests: BTreeMap<ThingId, BTreeMap<String, QuestStatus>>,
    pub weather: WeatherState,
    pub recipes: BTreeMap<String, Recipe>,
    /// actor -> skill -> level
    pub skills: BTreeMap<ThingId, BTreeMap<String, u32>>,
}

/// Implements every domain query over a `ServicesFixture`.
#[derive(Debug, Default)]
pub struct MemoryServices {
    data: RwLock<ServicesFixture>,
    xp: Mutex<BTreeMap<(ThingId, String), f64>>,
}

impl MemoryServices {
    pub fn new(fixture: ServicesFixture) -> Self {
        Self {
            data: RwLock::new(fixture),
            xp: Mutex::new(BTreeMap::new()),
        }
    }

    /// Wires this instance into every slot of a `Services` bundle.
    pub fn into_services(self: Arc<Self>) -> Services {
        Services::new()
            .with_reservations(self.clone())
            .with_inventory(self.clone())
            .with_crops(self.clone())
            .with_animals(self.clone())
            .with_fishing(self.clone())
            .with_mining(self.clone())
            .with_foraging(self.clone())
            .with_quests(self.clone())
            .with_weather(self.clone())
            .with_crafting(self.clone())
            .with_skills(self)
    }

    fn read<T>(&self, f: impl FnOnce(&ServicesFixture) -> T) -> T {
        match self.data.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut ServicesFixture) -> T) -> T {
        match self.data.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Reserves `thing` for `holder` (replacing any existing holder).
    pub fn reserve(&self, thing: &ThingId, holder: &ThingId) {
        self.write(|d| {
            d.reservations.insert(thing.clone(), holder.clone());
        });
    }

    pub fn release(&self, thing: &ThingId) {
        self.write(|d| {
            d.reservations.remove(thing);
        });
    }

    /// Applies the inventory and currency ops of a committed batch.
    pub fn apply_economy_ops(&self, batch: &EffectBatch) {
        self.write(|d| {
            for op in &batch.inventory_ops {
                let stack = d
                    .inventories
                    .entry(op.owner.clone())
                    .or_default()
                    .entry(op.item.clone())
                    .or_insert(0);
                *stack = (*stack + op.delta).max(0);
            }
            for op in &batch.currency_ops {
                *d.wallets.entry(op.owner.clone()).or_insert(0.0) += op.delta;
            }
        });
    }

    /// Total experience granted through the side channel.
    pub fn xp(&self, actor: &ThingId, skill: &str) -> f64 {
        let key = (actor.clone(), skill.to_string());
        match self.xp.lock() {
            Ok(guard) => guard.get(&key).copied().unwrap_or(0.0),
            Err(poisoned) => poisoned.into_inner().get(&key).copied().unwrap_or(0.0),
        }
    }
}

impl ReservationQuery for MemoryServices {
    fn holder(&self, thing: &ThingId) -> Option<ThingId> {
        self.read(|d| d.reservations.get(thing).cloned())
    }
}

impl InventoryQuery for MemoryServices {
    fn count(&self, owner: &ThingId, item: &str) -> i64 {
        self.read(|d| {
            d.inventories
                .get(owner)
                .and_then(|inv| inv.get(item))
                .copied()
                .unwrap_or(0)
        })
    }

    fn currency(&self, owner: &ThingId) -> f64 {
        self.read(|d| d.wallets.get(owner).copied().unwrap_or(0.0))
    }

    fn tool_tier(&self, owner: &ThingId, tool_flag: &str) -> u32 {
        self.read(|d| {
            let Some(inv) = d.inventories.get(owner) else {
                return 0;
            };
            inv.iter()
                .filter(|(_, qty)| **qty > 0)
                .filter_map(|(item, _)| d.tools.get(item))
                .filter(|tool| tool.flag == tool_flag)
                .map(|tool| tool.tier)
                .max()
                .unwrap_or(0)
        })
    }
}

impl CropQuery for MemoryServices {
    fn crop_state(&self, plot: &ThingId) -> Option<CropState> {
        self.read(|d| d.crops.get(plot).cloned())
    }
}

impl AnimalQuery for MemoryServices {
    fn animal_state(&self, animal: &ThingId) -> Option<AnimalState> {
        self.read(|d| d.animals.get(animal).cloned())
    }
}

impl FishingQuery for MemoryServices {
    fn fishing_spot(&self, spot: &ThingId) -> Option<FishingSpotState> {
        self.read(|d| d.fishing_spots.get(spot).cloned())
    }
}

impl MiningQuery for MemoryServices {
    fn mining_node(&self, node: &ThingId) -> Option<MiningNodeState> {
        self.read(|d| d.mining_nodes.get(node).cloned())
    }
}

impl ForagingQuery for MemoryServices {
    fn forage_node(&self, node: &ThingId) -> Option<ForageNodeState> {
        self.read(|d| d.forage_nodes.get(node).cloned())
    }
}

impl QuestQuery for MemoryServices {
    fn quest_status(&self, actor: &ThingId, quest_id: &str) -> Option<QuestStatus> {
        self.read(|d| d.quests.get(actor).and_then(|q| q.get(quest_id)).cloned())
    }
}

impl WeatherQuery for MemoryServices {
    fn current_weather(&self) -> WeatherState {
        self.read(|d| d.weather.clone())
    }
}

impl CraftingQuery for MemoryServices {
    fn recipe(&self, recipe_id: &str) -> Option<Recipe> {
        self.read(|d| d.recipes.get(recipe_id).cloned())
    }
}

impl SkillProgression for MemoryServices {
    fn skill_level(&self, actor: &ThingId, skill: &str) -> u32 {
        self.read(|d| {
            d.skills
                .get(actor)
                .and_then(|s| s.get(skill))
                .copied()
                .unwrap_or(0)
        })
    }

    fn grant_xp(&self, actor: &ThingId, skill: &str, amount: f64) {
        let key = (actor.clone(), skill.to_string());
        let mut guard = match self.xp.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard.entry(key).or_insert(0.0) += amount;
    }
}

/// Counts swallowed effect failures and remembers the most recent one.
#[derive(Debug, Default)]
pub struct FailureCounter {
    count: AtomicU64,
    last: Mutex<Option<String>>,
}

impl FailureCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        match self.last.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EffectFailureObserver for FailureCounter {
    fn effect_failed(&self, action_id: &str, effect_index: usize, error: &str) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let message = format!("{}#{}: {}", action_id, effect_index, error);
        match self.last.lock() {
            Ok(mut guard) => *guard = Some(message),
            Err(poisoned) => *poisoned.into_inner() = Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{CurrencyOp, InventoryOp};

    fn fixture() -> ServicesFixture {
        let mut f = ServicesFixture::default();
        f.inventories.insert(
            ThingId::from("miner"),
            [("copper_pickaxe".to_string(), 1), ("iron_pickaxe".to_string(), 1), ("wood".to_string(), 3)]
                .into_iter()
                .collect(),
        );
        f.tools.insert("copper_pickaxe".into(), ToolSpec { flag: "pickaxe".into(), tier: 1 });
        f.tools.insert("iron_pickaxe".into(), ToolSpec { flag: "pickaxe".into(), tier: 2 });
        f
    }

    #[test]
    fn test_tool_tier_picks_best_held_tool() {
        let services = MemoryServices::new(fixture());
        let miner = ThingId::from("miner");
        assert_eq!(services.tool_tier(&miner, "pickaxe"), 2);
        assert_eq!(services.tool_tier(&miner, "axe"), 0);
        assert_eq!(services.tool_tier(&ThingId::from("nobody"), "pickaxe"), 0);
    }

    #[test]
    fn test_apply_economy_ops() {
        let services = MemoryServices::new(fixture());
        let miner = ThingId::from("miner");
        let mut batch = EffectBatch::new(0);
        batch.inventory_ops.push(InventoryOp { owner: miner.clone(), item: "wood".into(), delta: -2 });
        batch.currency_ops.push(CurrencyOp { owner: miner.clone(), delta: 15.0 });
        services.apply_economy_ops(&batch);

        assert_eq!(services.count(&miner, "wood"), 1);
        assert_eq!(services.currency(&miner), 15.0);
    }

    #[test]
    fn test_reservations() {
        let services = MemoryServices::default();
        let bed = ThingId::from("bed");
        let a = ThingId::from("a");
        let b = ThingId::from("b");
        services.reserve(&bed, &a);
        assert!(services.has_active_reservation(&bed));
        assert!(!services.is_reserved_by_other(&bed, &a));
        assert!(services.is_reserved_by_other(&bed, &b));
        services.release(&bed);
        assert!(!services.has_active_reservation(&bed));
    }

    #[test]
    fn test_grant_xp_accumulates() {
        let services = MemoryServices::default();
        let npc = ThingId::from("npc");
        services.grant_xp(&npc, "fishing", 5.0);
        services.grant_xp(&npc, "fishing", 2.5);
        assert_eq!(services.xp(&npc, "fishing"), 7.5);
    }

    #[test]
    fn test_failure_counter() {
        let counter = FailureCounter::new();
        counter.effect_failed("eat", 1, "unexpected end of expression");
        counter.effect_failed("eat", 2, "boom");
        assert_eq!(counter.count(), 2);
        assert_eq!(counter.last_error().as_deref(), Some("eat#2: boom"));
    }
}

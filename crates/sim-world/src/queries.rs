//! Domain Query Contracts
//!
//! Read-only interfaces onto the domain subsystems (inventory, crops, animals,
//! quests, ...). Expressions and effects consult them through [`Services`];
//! every one is optional, and a missing service reads as "nothing there".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::thing::ThingId;

/// Soft/hard claims on things.
pub trait ReservationQuery: Send + Sync {
    /// The actor currently holding a reservation on `thing`, if any.
    fn holder(&self, thing: &ThingId) -> Option<ThingId>;

    fn has_active_reservation(&self, thing: &ThingId) -> bool {
        self.holder(thing).is_some()
    }

    /// Reserved by someone other than `actor`.
    fn is_reserved_by_other(&self, thing: &ThingId, actor: &ThingId) -> bool {
        matches!(self.holder(thing), Some(holder) if &holder != actor)
    }
}

pub trait InventoryQuery: Send + Sync {
    /// Quantity of `item` held by `owner`.
    fn count(&self, owner: &ThingId, item: &str) -> i64;

    /// Wallet balance of `owner`.
    fn currency(&self, owner: &ThingId) -> f64;

    /// Highest tier among held items flagged with `tool_flag` (0 if none).
    fn tool_tier(&self, owner: &ThingId, tool_flag: &str) -> u32;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropState {
    pub tilled: bool,
    pub crop: Option<String>,
    pub watered: bool,
    /// Growth progress in `[0, 1]`.
    pub growth: f64,
    pub ready: bool,
}

pub trait CropQuery: Send + Sync {
    fn crop_state(&self, plot: &ThingId) -> Option<CropState>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimalState {
    pub fed_today: bool,
    pub brushed_today: bool,
    pub product_ready: bool,
    pub happiness: f64,
}

pub trait AnimalQuery: Send + Sync {
    fn animal_state(&self, animal: &ThingId) -> Option<AnimalState>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FishingSpotState {
    pub available: bool,
    pub remaining: u32,
}

pub trait FishingQuery: Send + Sync {
    fn fishing_spot(&self, spot: &ThingId) -> Option<FishingSpotState>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningNodeState {
    pub required_tier: u32,
    pub remaining_hits: u32,
}

impl MiningNodeState {
    pub fn is_depleted(&self) -> bool {
        self.remaining_hits == 0
    }
}

pub trait MiningQuery: Send + Sync {
    fn mining_node(&self, node: &ThingId) -> Option<MiningNodeState>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForageNodeState {
    pub ready: bool,
    pub item: String,
}

pub trait ForagingQuery: Send + Sync {
    fn forage_node(&self, node: &ThingId) -> Option<ForageNodeState>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuestStatus {
    Available,
    Active { progress: f64 },
    Completed,
    Claimed,
}

pub trait QuestQuery: Send + Sync {
    fn quest_status(&self, actor: &ThingId, quest_id: &str) -> Option<QuestStatus>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherState {
    pub kind: String,
    pub temperature: f64,
    pub precipitation: f64,
}

impl WeatherState {
    pub fn is_raining(&self) -> bool {
        self.precipitation > 0.0 || matches!(self.kind.as_str(), "rain" | "storm")
    }
}

pub trait WeatherQuery: Send + Sync {
    fn current_weather(&self) -> WeatherState;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    #[serde(default)]
    pub ingredients: Vec<ItemStack>,
    #[serde(default)]
    pub outputs: Vec<ItemStack>,
    /// Tag (or kind) the crafting station must carry.
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default)]
    pub skill: Option<String>,
    #[serde(default)]
    pub min_level: u32,
    /// Crafting time in minutes.
    #[serde(default)]
    pub minutes: f64,
}

pub trait CraftingQuery: Send + Sync {
    fn recipe(&self, recipe_id: &str) -> Option<Recipe>;
}

/// Skill levels plus the experience side channel.
pub trait SkillProgression: Send + Sync {
    fn skill_level(&self, actor: &ThingId, skill: &str) -> u32;

    /// Grants experience immediately, outside of any effect batch.
    fn grant_xp(&self, actor: &ThingId, skill: &str, amount: f64);
}

/// Telemetry hook for effect applications that failed and were skipped.
pub trait EffectFailureObserver: Send + Sync {
    fn effect_failed(&self, action_id: &str, effect_index: usize, error: &str);
}

/// The domain services wired into a planner. Every field is optional.
#[derive(Clone, Default)]
pub struct Services {
    pub reservations: Option<Arc<dyn ReservationQuery>>,
    pub inventory: Option<Arc<dyn InventoryQuery>>,
    pub crops: Option<Arc<dyn CropQuery>>,
    pub animals: Option<Arc<dyn AnimalQuery>>,
    pub fishing: Option<Arc<dyn FishingQuery>>,
    pub mining: Option<Arc<dyn MiningQuery>>,
    pub foraging: Option<Arc<dyn ForagingQuery>>,
    pub quests: Option<Arc<dyn QuestQuery>>,
    pub weather: Option<Arc<dyn WeatherQuery>>,
    pub crafting: Option<Arc<dyn CraftingQuery>>,
    pub skills: Option<Arc<dyn SkillProgression>>,
    pub failures: Option<Arc<dyn EffectFailureObserver>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reservations(mut self, q: Arc<dyn ReservationQuery>) -> Self {
        self.reservations = Some(q);
        self
    }

    pub fn with_inventory(mut self, q: Arc<dyn InventoryQuery>) -> Self {
        self.inventory = Some(q);
        self
    }

    pub fn with_crops(mut self, q: Arc<dyn CropQuery>) -> Self {
        self.crops = Some(q);
        self
    }

    pub fn with_animals(mut self, q: Arc<dyn AnimalQuery>) -> Self {
        self.animals = Some(q);
        self
    }

    pub fn with_fishing(mut self, q: Arc<dyn FishingQuery>) -> Self {
        self.fishing = Some(q);
        self
    }

    pub fn with_mining(mut self, q: Arc<dyn MiningQuery>) -> Self {
        self.mining = Some(q);
        self
    }

    pub fn with_foraging(mut self, q: Arc<dyn ForagingQuery>) -> Self {
        self.foraging = Some(q);
        self
    }

    pub fn with_quests(mut self, q: Arc<dyn QuestQuery>) -> Self {
        self.quests = Some(q);
        self
    }

    pub fn with_weather(mut self, q: Arc<dyn WeatherQuery>) -> Self {
        self.weather = Some(q);
        self
    }

    pub fn with_crafting(mut self, q: Arc<dyn CraftingQuery>) -> Self {
        self.crafting = Some(q);
        self
    }

    pub fn with_skills(mut self, q: Arc<dyn SkillProgression>) -> Self {
        self.skills = Some(q);
        self
    }

    pub fn with_failure_observer(mut self, observer: Arc<dyn EffectFailureObserver>) -> Self {
        self.failures = Some(observer);
        self
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("reservations", &self.reservations.is_some())
            .field("inventory", &self.inventory.is_some())
            .field("crops", &self.crops.is_some())
            .field("animals", &self.animals.is_some())
            .field("fishing", &self.fishing.is_some())
            .field("mining", &self.mining.is_some())
            .field("foraging", &self.foraging.is_some())
            .field("quests", &self.quests.is_some())
            .field("weather", &self.weather.is_some())
            .field("crafting", &self.crafting.is_some())
            .field("skills", &self.skills.is_some())
            .field("failures", &self.failures.is_some())
            .finish()
    }
}

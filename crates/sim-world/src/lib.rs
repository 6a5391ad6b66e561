//! Shared world contracts for the behavior engine.
//!
//! This crate contains data structures and trait contracts with no behavior
//! logic: thing identity and views, the immutable snapshot interface, the
//! `EffectBatch` a plan step produces, and the domain query interfaces.
//! The `memory` module provides reference implementations used in tests.

pub mod batch;
pub mod memory;
pub mod queries;
pub mod snapshot;
pub mod thing;
pub mod time;

// Re-export time types
pub use time::{ParseTimeError, WorldTime, DAYS_PER_WEEK, MINUTES_PER_DAY};

// Re-export thing types
pub use thing::{BuildingInfo, GridPos, ThingId, ThingView};

// Re-export snapshot contracts
pub use snapshot::{CommitResult, World, WorldSnapshot};

// Re-export batch types
pub use batch::{
    AnimalAction, AnimalOp, CropAction, CropOp, CurrencyOp, EffectBatch, FactDelta, FishingOp,
    ForagingOp, InventoryOp, MiningOp, PlanCooldownRequest, QuestAction, QuestOp, ReadSetEntry,
    RelationshipOp, RelationshipOpKind, ShopTransaction, ShopTransactionKind, SpawnRequest,
    WriteSetEntry, MOVE_X_ATTR, MOVE_Y_ATTR,
};

// Re-export query contracts
pub use queries::{
    AnimalQuery, AnimalState, CraftingQuery, CropQuery, CropState, EffectFailureObserver,
    FishingQuery, FishingSpotState, ForageNodeState, ForagingQuery, InventoryQuery, ItemStack,
    MiningNodeState, MiningQuery, QuestQuery, QuestStatus, Recipe, ReservationQuery, Services,
    SkillProgression, WeatherQuery, WeatherState,
};

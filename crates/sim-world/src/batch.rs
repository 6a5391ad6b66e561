//! Effect Batch Types
//!
//! An `EffectBatch` is the complete, self-contained set of reads, writes and
//! domain operations produced by one plan step. The world validates the read
//! set against live state and applies the rest atomically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::snapshot::WorldSnapshot;
use crate::thing::{GridPos, ThingId};

/// Attribute names that move a thing one tile when written. Values are the
/// absolute destination coordinates.
pub const MOVE_X_ATTR: &str = "@move.x";
pub const MOVE_Y_ATTR: &str = "@move.y";

/// A dependency recorded while computing a batch.
///
/// `attr: None` records only whether the thing existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadSetEntry {
    pub thing: ThingId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    /// Attribute value observed at read time (`None` if the attribute was absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<f64>,
    /// Whether the thing existed at read time.
    pub existed: bool,
}

/// Numeric attribute assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteSetEntry {
    pub thing: ThingId,
    pub attr: String,
    pub value: f64,
}

/// Add or remove a (predicate, subject, object) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactDelta {
    pub predicate: String,
    pub subject: ThingId,
    /// Empty when the fact has no object.
    #[serde(default)]
    pub object: ThingId,
    pub add: bool,
}

/// Request to create a new thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub id: ThingId,
    pub kind: String,
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub attrs: std::collections::BTreeMap<String, f64>,
    pub position: GridPos,
    /// The thing whose position anchored the spawn.
    pub anchor: ThingId,
}

/// Cooldown on re-planning a given action for a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCooldownRequest {
    pub scope: ThingId,
    pub key: String,
    pub seconds: f64,
    /// When set, the executor substitutes the step's own duration for `seconds`.
    pub use_step_duration: bool,
}

/// Signed change to an item stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryOp {
    pub owner: ThingId,
    pub item: String,
    pub delta: i64,
}

/// Signed change to a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyOp {
    pub owner: ThingId,
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopTransactionKind {
    Buy,
    Sell,
}

/// Buy or sell a quantity of an item between a shop and a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopTransaction {
    pub shop: ThingId,
    pub customer: ThingId,
    pub item: String,
    pub quantity: u32,
    pub kind: ShopTransactionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipOpKind {
    Adjust,
    Set,
}

/// Change to a named relationship value between two parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipOp {
    pub from: ThingId,
    pub to: ThingId,
    pub relationship: String,
    pub kind: RelationshipOpKind,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift_item: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CropAction {
    Till,
    Plant { seed: String },
    Water,
    Harvest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropOp {
    pub actor: ThingId,
    pub plot: ThingId,
    pub action: CropAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AnimalAction {
    Feed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item: Option<String>,
    },
    Brush,
    Collect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimalOp {
    pub actor: ThingId,
    pub animal: ThingId,
    pub action: AnimalAction,
}

/// Cast a line at a fishing spot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FishingOp {
    pub actor: ThingId,
    pub spot: ThingId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bait: Option<String>,
}

/// Extract from a mining node with the given tool tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningOp {
    pub actor: ThingId,
    pub node: ThingId,
    pub tool_tier: u32,
}

/// Harvest a forage node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForagingOp {
    pub actor: ThingId,
    pub node: ThingId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QuestAction {
    Accept,
    Progress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        objective: Option<String>,
        amount: i32,
    },
    Claim,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestOp {
    pub actor: ThingId,
    pub quest_id: String,
    pub action: QuestAction,
}

/// Everything one plan step wants to change, plus what it read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectBatch {
    /// Snapshot version the batch was computed against.
    pub base_version: u64,
    #[serde(default)]
    pub reads: Vec<ReadSetEntry>,
    #[serde(default)]
    pub writes: Vec<WriteSetEntry>,
    #[serde(default)]
    pub facts: Vec<FactDelta>,
    #[serde(default)]
    pub spawns: Vec<SpawnRequest>,
    #[serde(default)]
    pub despawns: Vec<ThingId>,
    #[serde(default)]
    pub plan_cooldowns: Vec<PlanCooldownRequest>,
    #[serde(default)]
    pub inventory_ops: Vec<InventoryOp>,
    #[serde(default)]
    pub currency_ops: Vec<CurrencyOp>,
    #[serde(default)]
    pub shop_transactions: Vec<ShopTransaction>,
    #[serde(default)]
    pub relationship_ops: Vec<RelationshipOp>,
    #[serde(default)]
    pub crop_ops: Vec<CropOp>,
    #[serde(default)]
    pub animal_ops: Vec<AnimalOp>,
    #[serde(default)]
    pub mining_ops: Vec<MiningOp>,
    #[serde(default)]
    pub fishing_ops: Vec<FishingOp>,
    #[serde(default)]
    pub foraging_ops: Vec<ForagingOp>,
    #[serde(default)]
    pub quest_ops: Vec<QuestOp>,
}

impl EffectBatch {
    /// Creates an empty batch against the given snapshot version.
    pub fn new(base_version: u64) -> Self {
        Self {
            base_version,
            ..Default::default()
        }
    }

    /// Records that the batch depends on `thing` existing (or not).
    pub fn read_thing(&mut self, snapshot: &dyn WorldSnapshot, thing: &ThingId) {
        if self
            .reads
            .iter()
            .any(|r| &r.thing == thing && r.attr.is_none())
        {
            return;
        }
        self.reads.push(ReadSetEntry {
            thing: thing.clone(),
            attr: None,
            expected: None,
            existed: snapshot.contains(thing),
        });
    }

    /// Records the current value of an attribute and returns it.
    pub fn read_attr(
        &mut self,
        snapshot: &dyn WorldSnapshot,
        thing: &ThingId,
        attr: &str,
    ) -> Option<f64> {
        let view = snapshot.thing(thing);
        let value = view.and_then(|t| t.attr(attr));
        let already = self
            .reads
            .iter()
            .any(|r| &r.thing == thing && r.attr.as_deref() == Some(attr));
        if !already {
            self.reads.push(ReadSetEntry {
                thing: thing.clone(),
                attr: Some(attr.to_string()),
                expected: value,
                existed: view.is_some(),
            });
        }
        value
    }

    /// Queues an attribute write.
    pub fn write_attr(&mut self, thing: &ThingId, attr: impl Into<String>, value: f64) {
        self.writes.push(WriteSetEntry {
            thing: thing.clone(),
            attr: attr.into(),
            value,
        });
    }

    /// Every existing thing the batch writes to or operates on.
    ///
    /// Spawned ids are excluded: they do not exist yet. Their anchors are included.
    pub fn touched_things(&self) -> BTreeSet<ThingId> {
        let mut out = BTreeSet::new();
        out.extend(self.writes.iter().map(|w| w.thing.clone()));
        for fact in &self.facts {
            out.insert(fact.subject.clone());
            if !fact.object.is_empty() {
                out.insert(fact.object.clone());
            }
        }
        out.extend(self.spawns.iter().map(|s| s.anchor.clone()));
        out.extend(self.despawns.iter().cloned());
        out.extend(self.plan_cooldowns.iter().map(|c| c.scope.clone()));
        out.extend(self.inventory_ops.iter().map(|o| o.owner.clone()));
        out.extend(self.currency_ops.iter().map(|o| o.owner.clone()));
        for tx in &self.shop_transactions {
            out.insert(tx.shop.clone());
            out.insert(tx.customer.clone());
        }
        for op in &self.relationship_ops {
            out.insert(op.from.clone());
            out.insert(op.to.clone());
        }
        for op in &self.crop_ops {
            out.insert(op.actor.clone());
            out.insert(op.plot.clone());
        }
        for op in &self.animal_ops {
            out.insert(op.actor.clone());
            out.insert(op.animal.clone());
        }
        for op in &self.mining_ops {
            out.insert(op.actor.clone());
            out.insert(op.node.clone());
        }
        for op in &self.fishing_ops {
            out.insert(op.actor.clone());
            out.insert(op.spot.clone());
        }
        for op in &self.foraging_ops {
            out.insert(op.actor.clone());
            out.insert(op.node.clone());
        }
        out.extend(self.quest_ops.iter().map(|o| o.actor.clone()));
        out
    }

    /// Things in the read set (with or without an attribute).
    pub fn read_things(&self) -> BTreeSet<ThingId> {
        self.reads.iter().map(|r| r.thing.clone()).collect()
    }

    /// Adds an existence read for every touched thing not already read.
    pub fn ensure_read_closure(&mut self, snapshot: &dyn WorldSnapshot) {
        let read = self.read_things();
        for thing in self.touched_things() {
            if !read.contains(&thing) {
                self.read_thing(snapshot, &thing);
            }
        }
    }

    /// Whether `reads ⊇ touched_things()` holds.
    pub fn has_read_closure(&self) -> bool {
        let read = self.read_things();
        self.touched_things().iter().all(|t| read.contains(t))
    }

    /// True when the batch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
            && self.facts.is_empty()
            && self.spawns.is_empty()
            && self.despawns.is_empty()
            && self.plan_cooldowns.is_empty()
            && self.inventory_ops.is_empty()
            && self.currency_ops.is_empty()
            && self.shop_transactions.is_empty()
            && self.relationship_ops.is_empty()
            && self.crop_ops.is_empty()
            && self.animal_ops.is_empty()
            && self.mining_ops.is_empty()
            && self.fishing_ops.is_empty()
            && self.foraging_ops.is_empty()
            && self.quest_ops.is_empty()
    }
}

//! Snapshot and World Contracts
//!
//! A snapshot is an immutable, versioned, point-in-time view of world state.
//! Behavior code only ever reads snapshots; the world applies `EffectBatch`es
//! under optimistic concurrency.

use serde::{Deserialize, Serialize};

use crate::batch::EffectBatch;
use crate::thing::{GridPos, ThingId, ThingView};
use crate::time::WorldTime;

/// Immutable read view of the world.
pub trait WorldSnapshot {
    /// Monotonic version; bumped by every successful commit.
    fn version(&self) -> u64;

    /// Current simulation time.
    fn time(&self) -> WorldTime;

    /// Grid width in tiles.
    fn width(&self) -> i32;

    /// Grid height in tiles.
    fn height(&self) -> i32;

    /// Looks up a thing by id.
    fn thing(&self, id: &ThingId) -> Option<&ThingView>;

    /// Every thing in the world, in id order.
    fn all_things(&self) -> Vec<&ThingView>;

    /// Every thing carrying `tag`, in id order.
    fn query_by_tag(&self, tag: &str) -> Vec<&ThingView> {
        self.all_things()
            .into_iter()
            .filter(|t| t.has_tag(tag))
            .collect()
    }

    /// Whether the (predicate, subject, object) fact currently holds.
    fn has_fact(&self, predicate: &str, subject: &ThingId, object: &ThingId) -> bool;

    /// Manhattan distance between two positioned things.
    fn distance(&self, a: &ThingId, b: &ThingId) -> Option<i32> {
        let pa = self.thing(a)?.position?;
        let pb = self.thing(b)?.position?;
        Some(pa.manhattan(pb))
    }

    /// Whether an agent may stand on the tile.
    fn is_walkable(&self, pos: GridPos) -> bool;

    /// First tile of a shortest walkable path from `from` towards `to`.
    ///
    /// Returns `None` when `from == to` or no path exists.
    fn next_step(&self, from: GridPos, to: GridPos) -> Option<GridPos>;

    /// Convenience: whether a thing with this id exists.
    fn contains(&self, id: &ThingId) -> bool {
        self.thing(id).is_some()
    }
}

/// Outcome of submitting an `EffectBatch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitResult {
    /// The batch was applied; the world is now at `version`.
    Committed { version: u64 },
    /// A read no longer matches the live world; the caller should re-plan.
    Conflict { reason: String },
}

impl CommitResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::Committed { .. })
    }
}

/// A mutable, versioned world store.
pub trait World {
    type Snapshot: WorldSnapshot;

    /// Takes an immutable snapshot of the current state.
    fn snap(&self) -> Self::Snapshot;

    /// Validates the batch's reads against live state and applies it atomically.
    fn try_commit(&mut self, batch: &EffectBatch) -> CommitResult;
}

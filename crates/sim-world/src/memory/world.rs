//! In-memory world store with optimistic-concurrency commits.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use crate::batch::{EffectBatch, MOVE_X_ATTR, MOVE_Y_ATTR};
use crate::snapshot::{CommitResult, World, WorldSnapshot};
use crate::thing::{GridPos, ThingId, ThingView};
use crate::time::WorldTime;

const READ_EPSILON: f64 = 1e-9;

/// A (predicate, subject, object) triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: String,
    pub subject: ThingId,
    #[serde(default)]
    pub object: ThingId,
}

/// Serializable description of a world, used to seed `MemoryWorld`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldFixture {
    #[serde(default)]
    pub time: WorldTime,
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub things: Vec<ThingView>,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub blocked: Vec<GridPos>,
}

/// Errors loading a world fixture.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default)]
struct WorldState {
    version: u64,
    time: WorldTime,
    width: i32,
    height: i32,
    things: BTreeMap<ThingId, ThingView>,
    facts: BTreeSet<Fact>,
    blocked: BTreeSet<GridPos>,
}

/// Cheap, shareable snapshot of a `MemoryWorld`.
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    state: Arc<WorldState>,
}

impl WorldSnapshot for MemorySnapshot {
    fn version(&self) -> u64 {
        self.state.version
    }

    fn time(&self) -> WorldTime {
        self.state.time
    }

    fn width(&self) -> i32 {
        self.state.width
    }

    fn height(&self) -> i32 {
        self.state.height
    }

    fn thing(&self, id: &ThingId) -> Option<&ThingView> {
        self.state.things.get(id)
    }

    fn all_things(&self) -> Vec<&ThingView> {
        self.state.things.values().collect()
    }

    fn has_fact(&self, predicate: &str, subject: &ThingId, object: &ThingId) -> bool {
        self.state.facts.contains(&Fact {
            predicate: predicate.to_string(),
            subject: subject.clone(),
            object: object.clone(),
        })
    }

    fn is_walkable(&self, pos: GridPos) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && pos.x < self.state.width
            && pos.y < self.state.height
            && !self.state.blocked.contains(&pos)
    }

    fn next_step(&self, from: GridPos, to: GridPos) -> Option<GridPos> {
        if from == to {
            return None;
        }

        // Breadth-first search; the goal tile itself may be unwalkable (e.g. a counter).
        let mut parent: HashMap<GridPos, GridPos> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);
        parent.insert(from, from);

        while let Some(current) = queue.pop_front() {
            for next in current.neighbours() {
                if parent.contains_key(&next) {
                    continue;
                }
                if next != to && !self.is_walkable(next) {
                    continue;
                }
                parent.insert(next, current);
                if next == to {
                    return Some(first_step(&parent, from, to));
                }
                queue.push_back(next);
            }
        }

        None
    }
}

fn first_step(parent: &HashMap<GridPos, GridPos>, from: GridPos, to: GridPos) -> GridPos {
    let mut step = to;
    while let Some(&prev) = parent.get(&step) {
        if prev == from {
            break;
        }
        step = prev;
    }
    step
}

/// Reference world store used by tests and the CLI.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorld {
    state: Arc<WorldState>,
    journal: Vec<EffectBatch>,
}

impl MemoryWorld {
    /// Creates an empty world of the given size at version 0.
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            state: Arc::new(WorldState {
                width,
                height,
                ..Default::default()
            }),
            journal: Vec::new(),
        }
    }

    /// Builds a world from a fixture description.
    pub fn from_fixture(fixture: WorldFixture) -> Self {
        let mut world = Self::new(fixture.width, fixture.height);
        {
            let state = Arc::make_mut(&mut world.state);
            state.time = fixture.time;
            state.facts = fixture.facts.into_iter().collect();
            state.blocked = fixture.blocked.into_iter().collect();
            for thing in fixture.things {
                state.things.insert(thing.id.clone(), thing);
            }
        }
        world
    }

    /// Parses a fixture from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, FixtureError> {
        let fixture: WorldFixture = serde_json::from_str(json)?;
        Ok(Self::from_fixture(fixture))
    }

    /// Loads a fixture from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Inserts or replaces a thing without bumping the version (setup only).
    pub fn insert(&mut self, thing: ThingView) {
        Arc::make_mut(&mut self.state)
            .things
            .insert(thing.id.clone(), thing);
    }

    /// Adds a fact without bumping the version (setup only).
    pub fn add_fact(&mut self, predicate: &str, subject: &str, object: &str) {
        Arc::make_mut(&mut self.state).facts.insert(Fact {
            predicate: predicate.to_string(),
            subject: ThingId::from(subject),
            object: ThingId::from(object),
        });
    }

    /// Marks a tile as unwalkable (setup only).
    pub fn block(&mut self, pos: GridPos) {
        Arc::make_mut(&mut self.state).blocked.insert(pos);
    }

    pub fn set_time(&mut self, time: WorldTime) {
        Arc::make_mut(&mut self.state).time = time;
    }

    /// Advances the clock; does not count as a commit.
    pub fn advance_minutes(&mut self, minutes: u64) {
        let state = Arc::make_mut(&mut self.state);
        state.time = state.time.plus_minutes(minutes);
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Batches committed so far, oldest first.
    pub fn journal(&self) -> &[EffectBatch] {
        &self.journal
    }

    fn validate_reads(&self, batch: &EffectBatch) -> Result<(), String> {
        for read in &batch.reads {
            let current = self.state.things.get(&read.thing);
            if current.is_some() != read.existed {
                return Err(format!("existence of '{}' changed", read.thing));
            }
            let Some(attr) = &read.attr else {
                continue;
            };
            let value = current.and_then(|t| t.attr(attr));
            let matches = match (value, read.expected) {
                (None, None) => true,
                (Some(a), Some(b)) => (a - b).abs() <= READ_EPSILON,
                _ => false,
            };
            if !matches {
                return Err(format!("'{}.{}' changed since read", read.thing, attr));
            }
        }
        Ok(())
    }
}

impl World for MemoryWorld {
    type Snapshot = MemorySnapshot;

    fn snap(&self) -> MemorySnapshot {
        MemorySnapshot {
            state: Arc::clone(&self.state),
        }
    }

    fn try_commit(&mut self, batch: &EffectBatch) -> CommitResult {
        if batch.base_version != self.state.version {
            if let Err(reason) = self.validate_reads(batch) {
                tracing::debug!(base = batch.base_version, live = self.state.version, %reason, "commit conflict");
                return CommitResult::Conflict { reason };
            }
        }

        let state = Arc::make_mut(&mut self.state);

        for write in &batch.writes {
            let Some(thing) = state.things.get_mut(&write.thing) else {
                continue;
            };
            thing.attrs.insert(write.attr.clone(), write.value);
            if write.attr == MOVE_X_ATTR || write.attr == MOVE_Y_ATTR {
                let pos = thing.position.get_or_insert_with(GridPos::default);
                if write.attr == MOVE_X_ATTR {
                    pos.x = write.value.round() as i32;
                } else {
                    pos.y = write.value.round() as i32;
                }
            }
        }

        for delta in &batch.facts {
            let fact = Fact {
                predicate: delta.predicate.clone(),
                subject: delta.subject.clone(),
                object: delta.object.clone(),
            };
            if delta.add {
                state.facts.insert(fact);
            } else {
                state.facts.remove(&fact);
            }
        }

        for spawn in &batch.spawns {
            let thing = ThingView {
                id: spawn.id.clone(),
                kind: spawn.kind.clone(),
                tags: spawn.tags.clone(),
                attrs: spawn.attrs.clone(),
                position: Some(spawn.position),
                building: None,
            };
            state.things.insert(spawn.id.clone(), thing);
        }

        for id in &batch.despawns {
            state.things.remove(id);
        }

        state.version += 1;
        let version = state.version;
        self.journal.push(batch.clone());

        CommitResult::Committed { version }
    }
}

//! Role schedules and the schedule fallback heuristic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use sim_world::{ThingId, ThingView, WorldTime, MINUTES_PER_DAY};

use crate::config::ScheduleConfig;
use crate::error::ContentError;

/// A block of an actor's daily routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleBlock {
    /// Fractional hour of day the block starts
    pub start_hour: f64,
    /// End hour; less than `start_hour` for blocks running past midnight
    pub end_hour: f64,
    /// Where the task happens
    pub target: ThingId,
    /// Action id performed at the target
    pub task: String,
}

impl ScheduleBlock {
    fn start_minute(&self) -> f64 {
        self.start_hour * 60.0
    }

    fn span_minutes(&self) -> f64 {
        let span = (self.end_hour - self.start_hour) * 60.0;
        if span <= 0.0 {
            span + MINUTES_PER_DAY as f64
        } else {
            span
        }
    }

    /// Where `minute_of_day` falls relative to this block, if anywhere
    /// within `window` minutes.
    pub fn phase(&self, minute_of_day: f64, window: f64) -> Option<BlockPhase> {
        let day = MINUTES_PER_DAY as f64;
        let since_start = (minute_of_day - self.start_minute()).rem_euclid(day);
        if since_start < self.span_minutes() {
            return Some(BlockPhase::Active {
                minutes_in: since_start,
            });
        }
        let until_start = (self.start_minute() - minute_of_day).rem_euclid(day);
        (until_start <= window).then_some(BlockPhase::Upcoming {
            minutes_until: until_start,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockPhase {
    Active { minutes_in: f64 },
    Upcoming { minutes_until: f64 },
}

impl BlockPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, BlockPhase::Active { .. })
    }
}

/// Supplies each actor's schedule blocks.
pub trait ScheduleSource: Send + Sync {
    fn blocks(&self, actor: &ThingId) -> Vec<ScheduleBlock>;
}

/// The block that applies at `time`: an active block wins, otherwise the
/// soonest block starting within the upcoming window.
pub fn current_block(
    blocks: &[ScheduleBlock],
    time: WorldTime,
    config: &ScheduleConfig,
) -> Option<(ScheduleBlock, BlockPhase)> {
    let minute = time.minute_of_day() as f64;
    let phased: Vec<(&ScheduleBlock, BlockPhase)> = blocks
        .iter()
        .filter_map(|b| b.phase(minute, config.upcoming_window_minutes).map(|p| (b, p)))
        .collect();

    let active = phased.iter().find(|(_, p)| p.is_active());
    let upcoming = || {
        phased.iter().min_by(|a, b| match (a.1, b.1) {
            (BlockPhase::Upcoming { minutes_until: x }, BlockPhase::Upcoming { minutes_until: y }) => {
                x.total_cmp(&y)
            }
            _ => std::cmp::Ordering::Equal,
        })
    };
    active
        .or_else(upcoming)
        .map(|(block, phase)| ((*block).clone(), *phase))
}

/// Priority of following the schedule, damped by low health or high hunger.
///
/// Active blocks start at `active_base` and grow with time spent in the
/// block; upcoming blocks decay with time until they start.
pub fn schedule_priority(phase: BlockPhase, actor: Option<&ThingView>, config: &ScheduleConfig) -> f64 {
    let ramp = config.active_ramp_minutes.max(f64::EPSILON);
    let decay = config.upcoming_decay_minutes.max(f64::EPSILON);
    let mut priority = match phase {
        BlockPhase::Active { minutes_in } => {
            config.active_base + (minutes_in / ramp).min(config.active_bonus_cap)
        }
        BlockPhase::Upcoming { minutes_until } => (config.upcoming_base - minutes_until / decay).max(0.0),
    };

    if let Some(actor) = actor {
        if actor
            .attr(&config.health_attr)
            .is_some_and(|h| h < config.low_health_threshold)
        {
            priority *= config.low_health_factor;
        }
        if actor
            .attr(&config.hunger_attr)
            .is_some_and(|h| h > config.high_hunger_threshold)
        {
            priority *= config.high_hunger_factor;
        }
    }
    priority
}

/// Fixed schedules keyed by actor, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticSchedule {
    pub blocks: BTreeMap<ThingId, Vec<ScheduleBlock>>,
}

impl StaticSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a block for `actor`.
    pub fn with_block(mut self, actor: impl Into<ThingId>, block: ScheduleBlock) -> Self {
        self.blocks.entry(actor.into()).or_default().push(block);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ContentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ContentError> {
        let content = std::fs::read_to_string(path).map_err(|source| ContentError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }
}

impl ScheduleSource for StaticSchedule {
    fn blocks(&self, actor: &ThingId) -> Vec<ScheduleBlock> {
        self.blocks.get(actor).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: f64, end: f64) -> ScheduleBlock {
        ScheduleBlock {
            start_hour: start,
            end_hour: end,
            target: ThingId::from("shop"),
            task: "work".into(),
        }
    }

    fn at(hour: u64, minute: u64) -> WorldTime {
        WorldTime::from_minutes(hour * 60 + minute)
    }

    #[test]
    fn test_phase() {
        let b = block(9.0, 17.0);
        assert_eq!(b.phase(9.0 * 60.0 + 30.0, 120.0), Some(BlockPhase::Active { minutes_in: 30.0 }));
        assert_eq!(b.phase(8.0 * 60.0, 120.0), Some(BlockPhase::Upcoming { minutes_until: 60.0 }));
        assert_eq!(b.phase(6.0 * 60.0, 120.0), None);
        assert_eq!(b.phase(17.0 * 60.0, 120.0), None);

        let night = block(22.0, 2.0);
        assert!(night.phase(60.0, 120.0).is_some_and(|p| p.is_active()));
    }

    #[test]
    fn test_active_block_wins() {
        let blocks = vec![block(10.0, 11.0), block(8.0, 12.0)];
        let (b, phase) = current_block(&blocks, at(9, 0), &ScheduleConfig::default()).unwrap();
        assert_eq!(b.start_hour, 8.0);
        assert!(phase.is_active());
    }

    #[test]
    fn test_priority_heuristic() {
        let config = ScheduleConfig::default();
        let active = |m| schedule_priority(BlockPhase::Active { minutes_in: m }, None, &config);
        assert!((active(0.0) - 4.0).abs() < 1e-9);
        assert!((active(20.0) - 5.0).abs() < 1e-9);
        assert!((active(300.0) - 6.0).abs() < 1e-9);

        let upcoming = |m| schedule_priority(BlockPhase::Upcoming { minutes_until: m }, None, &config);
        assert!((upcoming(0.0) - 2.5).abs() < 1e-9);
        assert!((upcoming(60.0) - 1.5).abs() < 1e-9);
        assert_eq!(upcoming(200.0), 0.0);
    }

    #[test]
    fn test_priority_dampening() {
        let config = ScheduleConfig::default();
        let phase = BlockPhase::Active { minutes_in: 0.0 };
        let weak = ThingView::new("npc", "actor").with_attr("health", 0.2);
        assert!((schedule_priority(phase, Some(&weak), &config) - 2.0).abs() < 1e-9);

        let starving = ThingView::new("npc", "actor").with_attr("health", 0.2).with_attr("hunger", 0.9);
        assert!((schedule_priority(phase, Some(&starving), &config) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_static_schedule_from_json() {
        let schedule = StaticSchedule::from_json_str(
            r#"{ "smith": [{ "start_hour": 8, "end_hour": 16, "target": "forge", "task": "smith" }] }"#,
        )
        .unwrap();
        assert_eq!(schedule.blocks(&ThingId::from("smith")).len(), 1);
        assert!(schedule.blocks(&ThingId::from("nobody")).is_empty());
    }
}

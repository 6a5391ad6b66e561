//! Planner tuning loaded from TOML.
//!
//! Every section and field is optional; anything left out takes the default
//! shown by [`default_config_toml`].

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::error::{ConfigError, TomlSerializeError};

/// Complete planner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Plan construction settings
    #[serde(default)]
    pub planner: PlanningConfig,
    /// Target selector defaults
    #[serde(default)]
    pub targeting: TargetingConfig,
    /// Schedule fallback heuristic
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl PlannerConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, TomlSerializeError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Plan construction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Attribute prefix for social preference, read as `<prefix>.<candidate id>`
    pub relationship_prefix: String,
    /// Action used for move-to-target steps; empty disables them
    pub move_to_action: String,
    /// Upper bound for step durations, in minutes
    pub max_step_duration: f64,
    /// Stop-within radius for move effects that do not set one
    pub default_stop_within: i32,
    /// Cost of a step whose action has no cost expression
    pub default_cost: f64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            relationship_prefix: "rel".to_string(),
            move_to_action: "move_to".to_string(),
            max_step_duration: 120.0,
            default_stop_within: 1,
            default_cost: 1.0,
        }
    }
}

impl PlanningConfig {
    pub fn move_action(&self) -> Option<&str> {
        let id = self.move_to_action.trim();
        (!id.is_empty()).then_some(id)
    }
}

/// Defaults for target selectors that leave these flags unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetingConfig {
    /// Never pick the planning actor itself
    pub exclude_self: bool,
    /// Skip things reserved by another actor
    pub skip_reserved: bool,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            exclude_self: true,
            skip_reserved: true,
        }
    }
}

/// Constants of the schedule priority heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Base priority of an active block
    pub active_base: f64,
    /// Minutes into a block per point of bonus
    pub active_ramp_minutes: f64,
    /// Cap on the active block bonus
    pub active_bonus_cap: f64,
    /// How far ahead upcoming blocks are considered, in minutes
    pub upcoming_window_minutes: f64,
    /// Priority of a block starting right now
    pub upcoming_base: f64,
    /// Minutes until start per point of priority lost
    pub upcoming_decay_minutes: f64,
    pub health_attr: String,
    pub low_health_threshold: f64,
    pub low_health_factor: f64,
    pub hunger_attr: String,
    pub high_hunger_threshold: f64,
    pub high_hunger_factor: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            active_base: 4.0,
            active_ramp_minutes: 20.0,
            active_bonus_cap: 2.0,
            upcoming_window_minutes: 120.0,
            upcoming_base: 2.5,
            upcoming_decay_minutes: 60.0,
            health_attr: "health".to_string(),
            low_health_threshold: 0.35,
            low_health_factor: 0.5,
            hunger_attr: "hunger".to_string(),
            high_hunger_threshold: 0.85,
            high_hunger_factor: 0.6,
        }
    }
}

/// Generates a default configuration file content.
pub fn default_config_toml() -> String {
    r#"# Behavior Planner Configuration

[planner]
relationship_prefix = "rel"
move_to_action = "move_to"
max_step_duration = 120.0
default_stop_within = 1
default_cost = 1.0

[targeting]
exclude_self = true
skip_reserved = true

[schedule]
active_base = 4.0
active_ramp_minutes = 20.0
active_bonus_cap = 2.0
upcoming_window_minutes = 120.0
upcoming_base = 2.5
upcoming_decay_minutes = 60.0
health_attr = "health"
low_health_threshold = 0.35
low_health_factor = 0.5
hunger_attr = "hunger"
high_hunger_threshold = 0.85
high_hunger_factor = 0.6
"#
    .to_string()
}

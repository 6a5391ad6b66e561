//! Authoring records for actions and goals, as read from JSON.
//!
//! These are loosely typed on purpose: effect fields are free-form and only
//! interpreted when the owning action is compiled into a model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;

use crate::error::ContentError;
use crate::expr::Expr;

/// A number or an expression string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprSource {
    Number(f64),
    Text(String),
}

impl ExprSource {
    pub fn compile(&self) -> Expr {
        match self {
            ExprSource::Number(n) => Expr::constant(*n),
            ExprSource::Text(s) => Expr::compile(s),
        }
    }
}

impl From<f64> for ExprSource {
    fn from(n: f64) -> Self {
        ExprSource::Number(n)
    }
}

impl From<&str> for ExprSource {
    fn from(s: &str) -> Self {
        ExprSource::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationMode {
    #[default]
    Soft,
    Hard,
}

/// A claim the step takes while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// `$self`, `$target` or a literal thing id
    #[serde(default = "default_reservation_target")]
    pub target: String,
    #[serde(default)]
    pub mode: ReservationMode,
}

fn default_reservation_target() -> String {
    "$target".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub id: String,
    /// Step duration in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<ExprSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<ExprSource>,
    /// All must hold for the step to run
    #[serde(default, alias = "precondition")]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub effects: Vec<EffectConfig>,
    #[serde(default)]
    pub reservations: Vec<ReservationConfig>,
}

impl ActionConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            duration: None,
            cost: None,
            preconditions: Vec::new(),
            effects: Vec::new(),
            reservations: Vec::new(),
        }
    }
}

/// A generic effect descriptor.
///
/// `type` and `op` select the operator; every other key is collected into
/// `fields` and read by the operator that claims it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Guard expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl EffectConfig {
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// First present field among `names`.
    pub fn first_field(&self, names: &[&str]) -> Option<&JsonValue> {
        names.iter().find_map(|n| self.field(n))
    }

    pub fn str_field(&self, names: &[&str]) -> Option<&str> {
        self.first_field(names).and_then(JsonValue::as_str)
    }

    pub fn bool_field(&self, names: &[&str]) -> Option<bool> {
        match self.first_field(names)? {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::Number(n) => n.as_f64().map(|v| v != 0.0),
            JsonValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// A numeric field, given either as a number or as an expression string.
    pub fn expr_field(&self, names: &[&str]) -> Option<Expr> {
        match self.first_field(names)? {
            JsonValue::Number(n) => n.as_f64().map(Expr::constant),
            JsonValue::String(s) => Some(Expr::compile(s)),
            JsonValue::Bool(b) => Some(Expr::constant(if *b { 1.0 } else { 0.0 })),
            _ => None,
        }
    }
}

/// How a goal action picks its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSelectorConfig {
    /// `self`, `nearestTag` / `nearest_tag`, or `randomTag` / `random_tag`
    #[serde(rename = "type", alias = "strategy", default = "default_selector")]
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Filter evaluated with `$target` bound to each candidate
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, alias = "excludeSelf", skip_serializing_if = "Option::is_none")]
    pub exclude_self: Option<bool>,
    #[serde(default, alias = "skipReserved", skip_serializing_if = "Option::is_none")]
    pub skip_reserved: Option<bool>,
    /// When a required target cannot be resolved the action is skipped
    #[serde(default = "default_true")]
    pub required: bool,
}

impl Default for TargetSelectorConfig {
    fn default() -> Self {
        Self {
            strategy: default_selector(),
            tag: None,
            filter: None,
            exclude_self: None,
            skip_reserved: None,
            required: true,
        }
    }
}

fn default_selector() -> String {
    "self".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalActionConfig {
    #[serde(alias = "id")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetSelectorConfig>,
    /// Prepend a step walking to the resolved target
    #[serde(default, alias = "moveToTarget")]
    pub move_to_target: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<ExprSource>,
    /// All must hold for the goal to count as satisfied; empty never does
    #[serde(default, alias = "satisfiedWhen")]
    pub satisfied_when: Vec<String>,
    #[serde(default)]
    pub actions: Vec<GoalActionConfig>,
}

/// A full content file: `{ "actions": [...], "goals": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSet {
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    #[serde(default)]
    pub goals: Vec<GoalConfig>,
}

impl ContentSet {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONTENT: &str = r#"{
        "actions": [
            {
                "id": "eat",
                "duration": "10 + attr('hunger') * 5",
                "cost": 2,
                "preconditions": ["has('bread')"],
                "effects": [
                    { "type": "inventory", "op": "remove", "item": "bread", "quantity": 1 },
                    { "op": "add", "attr": "hunger", "value": -0.5, "when": "attr('hunger') > 0" }
                ],
                "reservations": [{ "target": "$self", "mode": "hard" }]
            }
        ],
        "goals": [
            {
                "id": "sate_hunger",
                "priority": "attr('hunger') * 10",
                "satisfiedWhen": ["attr('hunger') < 0.2"],
                "actions": [
                    { "action": "eat", "target": { "type": "nearestTag", "tag": "table", "where": "distance() < 5" }, "moveToTarget": true }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_content() {
        let content = ContentSet::from_json_str(CONTENT).unwrap();
        assert_eq!(content.actions.len(), 1);
        assert_eq!(content.goals.len(), 1);

        let eat = &content.actions[0];
        assert_eq!(eat.cost, Some(ExprSource::Number(2.0)));
        assert_eq!(eat.reservations[0].mode, ReservationMode::Hard);
        assert_eq!(eat.effects[0].kind.as_deref(), Some("inventory"));
        assert_eq!(eat.effects[0].str_field(&["item"]), Some("bread"));
        assert_eq!(eat.effects[1].when.as_deref(), Some("attr('hunger') > 0"));

        let goal = &content.goals[0];
        assert_eq!(goal.satisfied_when.len(), 1);
        let selector = goal.actions[0].target.as_ref().unwrap();
        assert_eq!(selector.strategy, "nearestTag");
        assert_eq!(selector.filter.as_deref(), Some("distance() < 5"));
        assert!(selector.required);
        assert!(goal.actions[0].move_to_target);
    }

    #[test]
    fn test_effect_field_helpers() {
        let effect: EffectConfig = serde_json::from_str(
            r#"{ "type": "write_attr", "attr": "energy", "value": "0.5 * 2", "clamp": "false", "stop": null }"#,
        )
        .unwrap();

        assert_eq!(effect.bool_field(&["clamp"]), Some(false));
        assert!(effect.field("stop").is_none());
        assert_eq!(effect.str_field(&["attribute", "attr"]), Some("energy"));
        assert_eq!(effect.expr_field(&["value"]).unwrap().source(), "0.5 * 2");
    }

    #[test]
    fn test_reservation_defaults() {
        let r: ReservationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(r.target, "$target");
        assert_eq!(r.mode, ReservationMode::Soft);
    }

    #[test]
    fn test_from_file_errors() {
        let err = ContentSet::from_file(Path::new("/no/such/content.json")).unwrap_err();
        assert!(matches!(err, ContentError::IoError { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = ContentSet::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ContentError::JsonError(_)));
    }
}

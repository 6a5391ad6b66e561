//! Compiled target selectors.

use crate::config::TargetingConfig;
use crate::content::TargetSelectorConfig;
use crate::error::ContentError;
use crate::expr::Expr;

/// How candidates are gathered and ranked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorStrategy {
    /// The planning actor itself
    SelfRef,
    /// Highest social preference among tagged things, then nearest
    NearestTag(String),
    /// Lowest id among tagged things; deterministic so plans are repeatable
    RandomTag(String),
}

/// A selector with its `where` filter compiled.
#[derive(Debug, Clone)]
pub struct TargetSelectorModel {
    pub strategy: SelectorStrategy,
    /// Evaluated with `$target` bound to each candidate
    pub filter: Option<Expr>,
    pub exclude_self: bool,
    pub skip_reserved: bool,
    /// When a required target cannot be resolved the action is skipped
    pub required: bool,
}

impl TargetSelectorModel {
    pub fn compile(
        goal_id: &str,
        config: &TargetSelectorConfig,
        targeting: &TargetingConfig,
    ) -> Result<Self, ContentError> {
        let strategy_name: String = config
            .strategy
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let tag = || {
            config
                .tag
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .ok_or(ContentError::EmptyId {
                    context: "target selector tag",
                })
        };

        let strategy = match strategy_name.trim() {
            "" | "self" => SelectorStrategy::SelfRef,
            "nearesttag" | "nearest" => SelectorStrategy::NearestTag(tag()?),
            "randomtag" | "random" => SelectorStrategy::RandomTag(tag()?),
            _ => {
                return Err(ContentError::UnknownSelector {
                    goal: goal_id.to_string(),
                    selector: config.strategy.clone(),
                })
            }
        };

        let filter = config
            .filter
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(Expr::compile);
        if let Some(error) = filter.as_ref().and_then(Expr::diagnostic) {
            tracing::warn!(goal = goal_id, %error, "target filter does not parse and will match nothing");
        }

        Ok(Self {
            strategy,
            filter,
            exclude_self: config.exclude_self.unwrap_or(targeting.exclude_self),
            skip_reserved: config.skip_reserved.unwrap_or(targeting.skip_reserved),
            required: config.required,
        })
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.strategy {
            SelectorStrategy::SelfRef => None,
            SelectorStrategy::NearestTag(tag) | SelectorStrategy::RandomTag(tag) => Some(tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(value: serde_json::Value) -> Result<TargetSelectorModel, ContentError> {
        let config: TargetSelectorConfig = serde_json::from_value(value).unwrap();
        TargetSelectorModel::compile("g", &config, &TargetingConfig::default())
    }

    #[test]
    fn test_strategy_spellings() {
        let s = compile(json!({ "type": "nearestTag", "tag": "food" })).unwrap();
        assert_eq!(s.strategy, SelectorStrategy::NearestTag("food".into()));
        let s = compile(json!({ "strategy": "nearest_tag", "tag": "food" })).unwrap();
        assert_eq!(s.tag(), Some("food"));
        let s = compile(json!({ "type": "random_tag", "tag": "bench" })).unwrap();
        assert_eq!(s.strategy, SelectorStrategy::RandomTag("bench".into()));
        assert_eq!(compile(json!({})).unwrap().strategy, SelectorStrategy::SelfRef);
    }

    #[test]
    fn test_flags_fall_back_to_targeting_defaults() {
        let s = compile(json!({ "type": "nearestTag", "tag": "npc", "excludeSelf": false })).unwrap();
        assert!(!s.exclude_self);
        assert!(s.skip_reserved);
        assert!(s.required);
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(matches!(
            compile(json!({ "type": "farthest", "tag": "x" })),
            Err(ContentError::UnknownSelector { .. })
        ));
        assert!(matches!(
            compile(json!({ "type": "nearestTag" })),
            Err(ContentError::EmptyId { .. })
        ));
    }
}

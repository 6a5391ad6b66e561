//! Compiled goals.

use std::collections::HashMap;
use std::sync::Arc;

use super::action::ActionModel;
use super::selector::TargetSelectorModel;
use crate::config::TargetingConfig;
use crate::content::GoalConfig;
use crate::error::{ContentError, ExprError};
use crate::expr::{EvalContext, Expr};

/// One entry of a goal's action list.
#[derive(Debug, Clone)]
pub struct GoalActionModel {
    pub action: Arc<ActionModel>,
    /// `None` targets the actor itself
    pub target: Option<TargetSelectorModel>,
    pub move_to_target: bool,
}

/// A goal with its priority and satisfaction expressions compiled.
#[derive(Debug, Clone)]
pub struct GoalModel {
    id: String,
    priority: Option<Expr>,
    satisfied_when: Vec<Expr>,
    actions: Vec<GoalActionModel>,
}

impl GoalModel {
    /// Compiles a goal config, linking each entry to its action model.
    ///
    /// Referencing an action id that is not in `actions` is an error.
    pub fn compile(
        config: &GoalConfig,
        actions: &HashMap<String, Arc<ActionModel>>,
        targeting: &TargetingConfig,
    ) -> Result<Self, ContentError> {
        let id = config.id.trim();
        if id.is_empty() {
            return Err(ContentError::EmptyId { context: "goal" });
        }

        let mut entries = Vec::with_capacity(config.actions.len());
        for entry in &config.actions {
            let action = actions
                .get(entry.action.trim())
                .cloned()
                .ok_or_else(|| ContentError::UnknownAction {
                    goal: id.to_string(),
                    action: entry.action.clone(),
                })?;
            let target = entry
                .target
                .as_ref()
                .map(|t| TargetSelectorModel::compile(id, t, targeting))
                .transpose()?;
            entries.push(GoalActionModel {
                action,
                target,
                move_to_target: entry.move_to_target,
            });
        }

        let priority = config.priority.as_ref().map(|p| p.compile());
        let satisfied_when: Vec<Expr> = config
            .satisfied_when
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| Expr::compile(s))
            .collect();
        for expr in priority.iter().chain(satisfied_when.iter()) {
            if let Some(error) = expr.diagnostic() {
                tracing::warn!(goal = id, expr = expr.source(), %error, "goal expression does not parse");
            }
        }

        Ok(Self {
            id: id.to_string(),
            priority,
            satisfied_when,
            actions: entries,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn actions(&self) -> &[GoalActionModel] {
        &self.actions
    }

    /// Whether any entry walks to its target first.
    pub fn uses_move_to(&self) -> bool {
        self.actions.iter().any(|a| a.move_to_target)
    }

    /// All satisfaction expressions hold. A goal without any is never satisfied.
    pub fn is_satisfied(&self, ctx: &EvalContext<'_>) -> Result<bool, ExprError> {
        if self.satisfied_when.is_empty() {
            return Ok(false);
        }
        for expr in &self.satisfied_when {
            if !expr.eval_bool(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Raw priority; `1.0` when the goal has no priority expression.
    pub fn priority(&self, ctx: &EvalContext<'_>) -> Result<f64, ExprError> {
        match &self.priority {
            Some(expr) => expr.eval_number(ctx),
            None => Ok(1.0),
        }
    }
}

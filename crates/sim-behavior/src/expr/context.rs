//! Per-evaluation context.

use std::collections::HashMap;

use sim_world::{Services, ThingId, WorldSnapshot};

use super::builtins::FunctionRegistry;
use super::eval::Value;

pub const SELF_VAR: &str = "self";
pub const TARGET_VAR: &str = "target";

/// Everything an expression can see: a snapshot, variable bindings, the
/// domain services and the builtin registry. Built fresh for every
/// evaluation and never shared.
pub struct EvalContext<'a> {
    pub snapshot: &'a dyn WorldSnapshot,
    pub services: &'a Services,
    vars: HashMap<String, Value>,
    functions: &'a FunctionRegistry,
}

impl<'a> EvalContext<'a> {
    /// A context using the standard builtin set.
    pub fn new(snapshot: &'a dyn WorldSnapshot, services: &'a Services) -> Self {
        Self {
            snapshot,
            services,
            vars: HashMap::new(),
            functions: FunctionRegistry::standard(),
        }
    }

    pub fn with_functions(mut self, functions: &'a FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_self(mut self, actor: &ThingId) -> Self {
        self.bind(SELF_VAR, Value::text(actor.as_str()));
        self
    }

    /// Binds `$target`, or removes the binding for `None`.
    pub fn with_target(mut self, target: Option<&ThingId>) -> Self {
        match target {
            Some(t) => self.bind(TARGET_VAR, Value::text(t.as_str())),
            None => {
                self.vars.remove(TARGET_VAR);
            }
        }
        self
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// A variable interpreted as a thing id (text values only).
    pub fn thing_var(&self, name: &str) -> Option<ThingId> {
        self.var(name)
            .and_then(Value::as_text)
            .filter(|s| !s.is_empty())
            .map(ThingId::from)
    }

    pub fn self_id(&self) -> Option<ThingId> {
        self.thing_var(SELF_VAR)
    }

    pub fn target_id(&self) -> Option<ThingId> {
        self.thing_var(TARGET_VAR)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        self.functions
    }

    /// Invokes a builtin; unknown names evaluate to `0.0`.
    pub fn call(&self, name: &str, args: &[Value]) -> f64 {
        match self.functions.call(name, self, args) {
            Some(v) if v.is_nan() => 0.0,
            Some(v) => v,
            None => {
                tracing::debug!(function = name, "unknown expression function");
                0.0
            }
        }
    }
}

//! Symbolic thing references used by effect descriptors.

use std::fmt;

use sim_world::ThingId;

use crate::expr::EvalContext;

/// `$self`, `$target`, or a literal thing id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    SelfRef,
    Target,
    Literal(ThingId),
}

impl TargetRef {
    /// `"$self"` / `"self"` and `"$target"` / `"target"` are symbolic
    /// (case-insensitive); anything else is a literal id.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let symbol = trimmed.strip_prefix('$').unwrap_or(trimmed);
        if symbol.eq_ignore_ascii_case("self") {
            TargetRef::SelfRef
        } else if symbol.eq_ignore_ascii_case("target") {
            TargetRef::Target
        } else {
            TargetRef::Literal(ThingId::from(trimmed))
        }
    }

    /// The bound id, or `None` when the symbol is unbound or the literal empty.
    pub fn resolve(&self, ctx: &EvalContext<'_>) -> Option<ThingId> {
        match self {
            TargetRef::SelfRef => ctx.self_id(),
            TargetRef::Target => ctx.target_id(),
            TargetRef::Literal(id) if id.is_empty() => None,
            TargetRef::Literal(id) => Some(id.clone()),
        }
    }

    /// Resolves and additionally requires the thing to exist in the snapshot.
    pub fn resolve_existing(&self, ctx: &EvalContext<'_>) -> Option<ThingId> {
        self.resolve(ctx).filter(|id| ctx.snapshot.contains(id))
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRef::SelfRef => f.write_str("$self"),
            TargetRef::Target => f.write_str("$target"),
            TargetRef::Literal(id) => write!(f, "{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_world::memory::MemoryWorld;
    use sim_world::{Services, ThingView, World};

    #[test]
    fn test_parse() {
        assert_eq!(TargetRef::parse("$self"), TargetRef::SelfRef);
        assert_eq!(TargetRef::parse("SELF"), TargetRef::SelfRef);
        assert_eq!(TargetRef::parse(" $Target "), TargetRef::Target);
        assert_eq!(TargetRef::parse("well_1"), TargetRef::Literal(ThingId::from("well_1")));
    }

    #[test]
    fn test_resolve() {
        let mut world = MemoryWorld::new(2, 2);
        world.insert(ThingView::new("npc", "actor"));
        let snap = world.snap();
        let services = Services::new();
        let ctx = EvalContext::new(&snap, &services).with_self(&ThingId::from("npc"));

        assert_eq!(TargetRef::SelfRef.resolve(&ctx), Some(ThingId::from("npc")));
        // unbound $target is a no-op, not an error
        assert_eq!(TargetRef::Target.resolve(&ctx), None);
        assert_eq!(TargetRef::parse("").resolve(&ctx), None);
        assert_eq!(TargetRef::parse("ghost").resolve(&ctx), Some(ThingId::from("ghost")));
        assert_eq!(TargetRef::parse("ghost").resolve_existing(&ctx), None);
    }
}

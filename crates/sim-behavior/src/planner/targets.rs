//! Target resolution for goal actions.

use std::cmp::Ordering;

use sim_world::{Services, ThingId, ThingView, WorldSnapshot};

use crate::expr::{EvalContext, FunctionRegistry};
use crate::model::{SelectorStrategy, TargetSelectorModel};

/// Preference differences smaller than this count as a tie.
pub const PREFERENCE_EPSILON: f64 = 1e-6;

/// What a resolution call can see.
pub struct TargetQuery<'a> {
    pub snapshot: &'a dyn WorldSnapshot,
    pub services: &'a Services,
    pub functions: Option<&'a FunctionRegistry>,
    pub actor: &'a ThingId,
    /// Attribute prefix for social preference
    pub relationship_prefix: &'a str,
}

impl<'a> TargetQuery<'a> {
    fn context(&self, target: &ThingId) -> EvalContext<'a> {
        let ctx = EvalContext::new(self.snapshot, self.services);
        let ctx = match self.functions {
            Some(functions) => ctx.with_functions(functions),
            None => ctx,
        };
        ctx.with_self(self.actor).with_target(Some(target))
    }

    /// Resolves a selector to a single thing, or `None` when nothing qualifies.
    pub fn resolve(&self, selector: &TargetSelectorModel) -> Option<ThingId> {
        match &selector.strategy {
            SelectorStrategy::SelfRef => Some(self.actor.clone()),
            SelectorStrategy::RandomTag(tag) => self
                .candidates(selector, tag)
                .into_iter()
                .map(|t| t.id.clone())
                .min(),
            SelectorStrategy::NearestTag(tag) => {
                let actor = self.snapshot.thing(self.actor);
                self.candidates(selector, tag)
                    .into_iter()
                    .map(|t| {
                        let preference = actor.map_or(0.0, |a| social_preference(a, &t.id, self.relationship_prefix));
                        let distance = actor
                            .and_then(|a| a.position)
                            .zip(t.position)
                            .map_or(i32::MAX, |(a, b)| a.manhattan(b));
                        (t, preference, distance)
                    })
                    .min_by(|a, b| compare_candidates(a.1, a.2, b.1, b.2).then_with(|| a.0.id.cmp(&b.0.id)))
                    .map(|(t, ..)| t.id.clone())
            }
        }
    }

    /// Tagged things passing the selector's exclusions and `where` filter.
    fn candidates(&self, selector: &TargetSelectorModel, tag: &str) -> Vec<&'a ThingView> {
        let reservations = self.services.reservations.as_ref().filter(|_| selector.skip_reserved);
        self.snapshot
            .query_by_tag(tag)
            .into_iter()
            .filter(|t| !(selector.exclude_self && &t.id == self.actor))
            .filter(|t| !reservations.is_some_and(|r| r.is_reserved_by_other(&t.id, self.actor)))
            .filter(|t| match &selector.filter {
                None => true,
                Some(filter) => filter.eval_bool(&self.context(&t.id)).unwrap_or_else(|error| {
                    tracing::debug!(candidate = %t.id, %error, "target filter failed to evaluate");
                    false
                }),
            })
            .collect()
    }
}

/// Orders by higher preference first, then smaller distance.
fn compare_candidates(pref_a: f64, dist_a: i32, pref_b: f64, dist_b: i32) -> Ordering {
    if (pref_a - pref_b).abs() > PREFERENCE_EPSILON {
        // higher preference sorts first
        pref_b.total_cmp(&pref_a)
    } else {
        dist_a.cmp(&dist_b)
    }
}

/// The actor's `<prefix>.<candidate>` attribute; the whole key after the
/// prefix is the candidate id, dots included. `0.0` when absent.
pub fn social_preference(actor: &ThingView, candidate: &ThingId, prefix: &str) -> f64 {
    actor
        .attr(&format!("{}.{}", prefix, candidate.as_str()))
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetingConfig;
    use crate::content::TargetSelectorConfig;
    use serde_json::json;
    use sim_world::memory::{MemoryServices, MemoryWorld, ServicesFixture};
    use sim_world::World;
    use std::sync::Arc;

    fn selector(value: serde_json::Value) -> TargetSelectorModel {
        let config: TargetSelectorConfig = serde_json::from_value(value).unwrap();
        TargetSelectorModel::compile("g", &config, &TargetingConfig::default()).unwrap()
    }

    fn query<'a>(snapshot: &'a dyn WorldSnapshot, services: &'a Services, actor: &'a ThingId) -> TargetQuery<'a> {
        TargetQuery {
            snapshot,
            services,
            functions: None,
            actor,
            relationship_prefix: "rel",
        }
    }

    #[test]
    fn test_social_preference_matches_whole_key() {
        let actor = ThingView::new("npc", "actor")
            .with_attr("rel.bob", 0.8)
            .with_attr("rel.trust.bob", 0.4)
            .with_attr("rel.bench.1", 0.9)
            .with_attr("bob", 5.0);
        assert!((social_preference(&actor, &ThingId::from("bob"), "rel") - 0.8).abs() < 1e-9);
        assert!((social_preference(&actor, &ThingId::from("bench.1"), "rel") - 0.9).abs() < 1e-9);
        // a leading segment is not a candidate id
        assert_eq!(social_preference(&actor, &ThingId::from("trust"), "rel"), 0.0);
        assert_eq!(social_preference(&actor, &ThingId::from("bench"), "rel"), 0.0);
        assert_eq!(social_preference(&actor, &ThingId::from("cid"), "rel"), 0.0);
    }

    #[test]
    fn test_nearest_tag_prefers_affinity_then_distance() {
        let mut world = MemoryWorld::new(10, 10);
        world.insert(ThingView::new("npc", "actor").at(0, 0).tagged("villager").with_attr("rel.far", 0.9));
        world.insert(ThingView::new("near", "actor").at(1, 0).tagged("villager"));
        world.insert(ThingView::new("far", "actor").at(6, 0).tagged("villager"));
        world.insert(ThingView::new("mid", "actor").at(3, 0).tagged("villager"));
        let snap = world.snap();
        let services = Services::new();
        let actor = ThingId::from("npc");
        let q = query(&snap, &services, &actor);

        let pick = q.resolve(&selector(json!({ "type": "nearestTag", "tag": "villager" })));
        assert_eq!(pick, Some(ThingId::from("far")));

        let pick = q.resolve(&selector(json!({ "type": "nearestTag", "tag": "villager", "where": "target_is_not('far')" })));
        // unknown function is 0, so the filter rejects everything
        assert_eq!(pick, None);

        let pick = q.resolve(&selector(json!({ "type": "nearestTag", "tag": "villager", "where": "distance() < 5" })));
        assert_eq!(pick, Some(ThingId::from("near")));
    }

    #[test]
    fn test_equal_preference_breaks_tie_on_distance() {
        let mut world = MemoryWorld::new(10, 10);
        world.insert(ThingView::new("npc", "actor").at(5, 5).with_attr("rel.a", 0.5).with_attr("rel.b", 0.5));
        world.insert(ThingView::new("a", "well").at(9, 5).tagged("well"));
        world.insert(ThingView::new("b", "well").at(5, 7).tagged("well"));
        let snap = world.snap();
        let services = Services::new();
        let actor = ThingId::from("npc");

        let pick = query(&snap, &services, &actor).resolve(&selector(json!({ "type": "nearestTag", "tag": "well" })));
        assert_eq!(pick, Some(ThingId::from("b")));
    }

    #[test]
    fn test_random_tag_is_lexicographic() {
        let mut world = MemoryWorld::new(10, 10);
        world.insert(ThingView::new("npc", "actor").at(0, 0));
        world.insert(ThingView::new("bench_b", "bench").at(1, 0).tagged("bench"));
        world.insert(ThingView::new("bench_a", "bench").at(9, 9).tagged("bench"));
        let snap = world.snap();
        let services = Services::new();
        let actor = ThingId::from("npc");

        let pick = query(&snap, &services, &actor).resolve(&selector(json!({ "type": "randomTag", "tag": "bench" })));
        assert_eq!(pick, Some(ThingId::from("bench_a")));
    }

    #[test]
    fn test_exclusions() {
        let mut world = MemoryWorld::new(10, 10);
        world.insert(ThingView::new("npc", "actor").at(0, 0).tagged("villager"));
        world.insert(ThingView::new("bob", "actor").at(2, 0).tagged("villager"));
        let snap = world.snap();
        let memory = Arc::new(MemoryServices::new(ServicesFixture::default()));
        memory.reserve(&ThingId::from("bob"), &ThingId::from("eve"));
        let services = memory.clone().into_services();
        let actor = ThingId::from("npc");
        let q = query(&snap, &services, &actor);

        // bob is reserved by eve and npc is excluded as self
        assert_eq!(q.resolve(&selector(json!({ "type": "nearestTag", "tag": "villager" }))), None);

        let pick = q.resolve(&selector(json!({ "type": "nearestTag", "tag": "villager", "skipReserved": false })));
        assert_eq!(pick, Some(ThingId::from("bob")));

        let pick = q.resolve(&selector(json!({ "type": "nearestTag", "tag": "villager", "excludeSelf": false })));
        assert_eq!(pick, Some(ThingId::from("npc")));

        // reserved by the actor itself is fine
        memory.reserve(&ThingId::from("bob"), &actor);
        assert_eq!(
            q.resolve(&selector(json!({ "type": "nearestTag", "tag": "villager" }))),
            Some(ThingId::from("bob"))
        );
    }
}

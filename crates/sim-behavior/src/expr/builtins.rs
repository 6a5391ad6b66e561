//! Builtin expression functions.
//!
//! Every builtin is total: missing or ill-typed arguments, unknown ids and
//! unwired services all evaluate to `0.0`. Thing arguments default to
//! `$target` (or `$self` for actor-centric queries) when omitted.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use sim_world::{QuestStatus, Recipe, ThingId};

use super::context::{EvalContext, SELF_VAR, TARGET_VAR};
use super::eval::Value;

/// Signature shared by every builtin.
pub type Builtin = Arc<dyn Fn(&EvalContext<'_>, &[Value]) -> f64 + Send + Sync>;

/// Attribute marking an item as already eaten or used up.
pub const CONSUMED_ATTR: &str = "consumed";
/// Attribute marking an item as carried by someone.
pub const HELD_ATTR: &str = "held";

/// Name → builtin lookup. Names are matched case-insensitively.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Builtin>,
}

impl FunctionRegistry {
    /// A registry with no functions at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The shared standard registry, built on first use.
    pub fn standard() -> &'static FunctionRegistry {
        static STANDARD: OnceLock<FunctionRegistry> = OnceLock::new();
        STANDARD.get_or_init(build_standard)
    }

    /// An owned copy of the standard set, for hosts that register extras.
    pub fn extended() -> Self {
        Self::standard().clone()
    }

    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&EvalContext<'_>, &[Value]) -> f64 + Send + Sync + 'static,
    {
        self.functions.insert(name.to_ascii_lowercase(), Arc::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_lowercase())
    }

    /// Calls `name`, or returns `None` when it is not registered.
    pub fn call(&self, name: &str, ctx: &EvalContext<'_>, args: &[Value]) -> Option<f64> {
        let f = match self.functions.get(name) {
            Some(f) => f,
            None => self.functions.get(&name.to_ascii_lowercase())?,
        };
        Some(f(ctx, args))
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

fn build_standard() -> FunctionRegistry {
    let mut r = FunctionRegistry::empty();

    // time and buildings
    r.register("time_hours", |ctx, _| ctx.snapshot.time().hours_of_day());
    r.register("day_of_week", |ctx, _| ctx.snapshot.time().day_of_week() as f64);
    r.register("is_open", is_open);

    // crops
    r.register("crop_ready", |ctx, args| crop(ctx, args, |s| flag(s.ready)));
    r.register("crop_growth", |ctx, args| crop(ctx, args, |s| s.growth));
    r.register("crop_watered", |ctx, args| crop(ctx, args, |s| flag(s.watered)));
    r.register("plot_tilled", |ctx, args| crop(ctx, args, |s| flag(s.tilled)));
    r.register("plot_empty", |ctx, args| crop(ctx, args, |s| flag(s.crop.is_none())));

    // animals
    r.register("animal_fed", |ctx, args| animal(ctx, args, |s| flag(s.fed_today)));
    r.register("animal_brushed", |ctx, args| animal(ctx, args, |s| flag(s.brushed_today)));
    r.register("animal_product_ready", |ctx, args| {
        animal(ctx, args, |s| flag(s.product_ready))
    });
    r.register("animal_happiness", |ctx, args| animal(ctx, args, |s| s.happiness));

    // fishing, mining, foraging
    r.register("fish_available", fish_available);
    r.register("mine_ready", |ctx, args| {
        mining_node(ctx, args, |n| flag(!n.is_depleted()))
    });
    r.register("mine_required_tier", |ctx, args| {
        mining_node(ctx, args, |n| n.required_tier as f64)
    });
    r.register("can_mine", can_mine);
    r.register("forage_ready", forage_ready);

    // quests
    r.register("quest_available", |ctx, args| {
        quest(ctx, args, |q| flag(matches!(q, QuestStatus::Available)))
    });
    r.register("quest_active", |ctx, args| {
        quest(ctx, args, |q| flag(matches!(q, QuestStatus::Active { .. })))
    });
    r.register("quest_completed", |ctx, args| {
        quest(ctx, args, |q| {
            flag(matches!(q, QuestStatus::Completed | QuestStatus::Claimed))
        })
    });
    r.register("quest_progress", |ctx, args| {
        quest(ctx, args, |q| match q {
            QuestStatus::Active { progress } => *progress,
            QuestStatus::Completed | QuestStatus::Claimed => 1.0,
            QuestStatus::Available => 0.0,
        })
    });

    // social and spatial
    r.register("distance", distance);
    r.register("attr", attr);
    r.register("fact", fact);
    r.register("has_active_reservation", has_active_reservation);
    r.register("reserved", reserved);
    r.register("count_food_available", count_food_available);

    // inventory and economy
    r.register("has", has);
    r.register("count", count);
    r.register("currency", currency);
    r.register("wallet", currency);
    r.register("can_craft", can_craft);
    r.register("recipe_time", recipe_time);
    r.register("craft_time", recipe_time);

    // weather
    r.register("is_raining", |ctx, _| {
        ctx.services
            .weather
            .as_ref()
            .map_or(0.0, |w| flag(w.current_weather().is_raining()))
    });
    r.register("weather", weather);
    r.register("temperature", |ctx, _| {
        ctx.services
            .weather
            .as_ref()
            .map_or(0.0, |w| w.current_weather().temperature)
    });

    // math
    r.register("clamp", clamp);
    r.register("min", |_, args| fold_numbers(args, f64::min));
    r.register("max", |_, args| fold_numbers(args, f64::max));
    r.register("abs", |_, args| num_arg(args, 0).map_or(0.0, f64::abs));

    r
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn num_arg(args: &[Value], idx: usize) -> Option<f64> {
    args.get(idx).map(Value::as_number)
}

fn text_arg(args: &[Value], idx: usize) -> Option<&str> {
    args.get(idx).and_then(Value::as_text).filter(|s| !s.is_empty())
}

/// Resolves a thing argument: a text value is an id, a missing argument
/// falls back to the named variable. Numbers never name things.
fn thing_arg(ctx: &EvalContext<'_>, args: &[Value], idx: usize, default_var: &str) -> Option<ThingId> {
    match args.get(idx) {
        Some(v) => v.as_text().filter(|s| !s.is_empty()).map(ThingId::from),
        None => ctx.thing_var(default_var),
    }
}

/// Like [`thing_arg`], but only yields ids present in the snapshot.
fn existing_thing(
    ctx: &EvalContext<'_>,
    args: &[Value],
    idx: usize,
    default_var: &str,
) -> Option<ThingId> {
    thing_arg(ctx, args, idx, default_var).filter(|id| ctx.snapshot.contains(id))
}

fn is_open(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let Some(id) = thing_arg(ctx, args, 0, TARGET_VAR) else {
        return 0.0;
    };
    match ctx.snapshot.thing(&id) {
        Some(view) => match &view.building {
            Some(building) => flag(building.is_open_at(ctx.snapshot.time().hours_of_day())),
            None => 1.0,
        },
        None => 0.0,
    }
}

fn crop(ctx: &EvalContext<'_>, args: &[Value], f: impl Fn(&sim_world::CropState) -> f64) -> f64 {
    let (Some(plot), Some(crops)) = (existing_thing(ctx, args, 0, TARGET_VAR), &ctx.services.crops)
    else {
        return 0.0;
    };
    crops.crop_state(&plot).map_or(0.0, |s| f(&s))
}

fn animal(ctx: &EvalContext<'_>, args: &[Value], f: impl Fn(&sim_world::AnimalState) -> f64) -> f64 {
    let (Some(id), Some(animals)) = (existing_thing(ctx, args, 0, TARGET_VAR), &ctx.services.animals)
    else {
        return 0.0;
    };
    animals.animal_state(&id).map_or(0.0, |s| f(&s))
}

fn fish_available(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(spot), Some(fishing)) = (existing_thing(ctx, args, 0, TARGET_VAR), &ctx.services.fishing)
    else {
        return 0.0;
    };
    fishing
        .fishing_spot(&spot)
        .map_or(0.0, |s| flag(s.available && s.remaining > 0))
}

fn mining_node(
    ctx: &EvalContext<'_>,
    args: &[Value],
    f: impl Fn(&sim_world::MiningNodeState) -> f64,
) -> f64 {
    let (Some(node), Some(mining)) = (existing_thing(ctx, args, 0, TARGET_VAR), &ctx.services.mining)
    else {
        return 0.0;
    };
    mining.mining_node(&node).map_or(0.0, |n| f(&n))
}

/// `can_mine(node = $target, tool_flag = "pickaxe")`
fn can_mine(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let tool_flag = text_arg(args, 1).unwrap_or("pickaxe");
    let (Some(node), Some(actor), Some(mining), Some(inventory)) = (
        existing_thing(ctx, args, 0, TARGET_VAR),
        ctx.self_id(),
        &ctx.services.mining,
        &ctx.services.inventory,
    ) else {
        return 0.0;
    };
    let Some(state) = mining.mining_node(&node) else {
        return 0.0;
    };
    flag(!state.is_depleted() && inventory.tool_tier(&actor, tool_flag) >= state.required_tier)
}

fn forage_ready(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(node), Some(foraging)) = (existing_thing(ctx, args, 0, TARGET_VAR), &ctx.services.foraging)
    else {
        return 0.0;
    };
    foraging.forage_node(&node).map_or(0.0, |n| flag(n.ready))
}

/// `quest_*(quest_id, actor = $self)`
fn quest(ctx: &EvalContext<'_>, args: &[Value], f: impl Fn(&QuestStatus) -> f64) -> f64 {
    let (Some(quest_id), Some(actor), Some(quests)) = (
        text_arg(args, 0),
        existing_thing(ctx, args, 1, SELF_VAR),
        &ctx.services.quests,
    ) else {
        return 0.0;
    };
    quests.quest_status(&actor, quest_id).map_or(0.0, |q| f(&q))
}

/// `distance()`: `$self` to `$target`; `distance(b)`: `$self` to `b`;
/// `distance(a, b)`: `a` to `b`. Buildings are measured to their nearest
/// service point.
fn distance(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (from, to) = match args.len() {
        0 => (ctx.self_id(), ctx.target_id()),
        1 => (ctx.self_id(), thing_arg(ctx, args, 0, TARGET_VAR)),
        _ => (thing_arg(ctx, args, 0, SELF_VAR), thing_arg(ctx, args, 1, TARGET_VAR)),
    };
    let (Some(from), Some(to)) = (from, to) else {
        return 0.0;
    };
    let (Some(a), Some(b)) = (ctx.snapshot.thing(&from), ctx.snapshot.thing(&to)) else {
        return 0.0;
    };
    let Some(start) = a.position else {
        return 0.0;
    };
    b.approach_point(start)
        .map_or(0.0, |end| start.manhattan(end) as f64)
}

/// `attr(name)` on `$self`, or `attr(thing, name)`.
fn attr(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (thing, name) = if args.len() >= 2 {
        (thing_arg(ctx, args, 0, SELF_VAR), text_arg(args, 1))
    } else {
        (ctx.self_id(), text_arg(args, 0))
    };
    let (Some(thing), Some(name)) = (thing, name) else {
        return 0.0;
    };
    ctx.snapshot
        .thing(&thing)
        .and_then(|t| t.attr(name))
        .unwrap_or(0.0)
}

/// `fact(predicate, subject = $self, object = "")`
fn fact(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let Some(predicate) = text_arg(args, 0) else {
        return 0.0;
    };
    let Some(subject) = thing_arg(ctx, args, 1, SELF_VAR) else {
        return 0.0;
    };
    let object = text_arg(args, 2).map(ThingId::from).unwrap_or_default();
    flag(ctx.snapshot.has_fact(predicate, &subject, &object))
}

fn has_active_reservation(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(thing), Some(reservations)) = (thing_arg(ctx, args, 0, TARGET_VAR), &ctx.services.reservations)
    else {
        return 0.0;
    };
    flag(reservations.has_active_reservation(&thing))
}

/// Reserved by someone other than `$self`.
fn reserved(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(thing), Some(reservations)) = (thing_arg(ctx, args, 0, TARGET_VAR), &ctx.services.reservations)
    else {
        return 0.0;
    };
    match ctx.self_id() {
        Some(actor) => flag(reservations.is_reserved_by_other(&thing, &actor)),
        None => flag(reservations.has_active_reservation(&thing)),
    }
}

/// Things tagged `food` within Manhattan radius 1 of the anchor that nobody
/// has consumed or picked up.
fn count_food_available(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let Some(anchor) = thing_arg(ctx, args, 0, SELF_VAR) else {
        return 0.0;
    };
    let Some(center) = ctx.snapshot.thing(&anchor).and_then(|t| t.position) else {
        return 0.0;
    };
    ctx.snapshot
        .query_by_tag("food")
        .into_iter()
        .filter(|t| is_available_item(t))
        .filter(|t| t.position.is_some_and(|p| p.manhattan(center) <= 1))
        .count() as f64
}

/// Not consumed and not held.
pub fn is_available_item(view: &sim_world::ThingView) -> bool {
    let set = |name: &str| view.attr(name).is_some_and(|v| v > 0.5);
    !set(CONSUMED_ATTR) && !set(HELD_ATTR)
}

/// `has(item, quantity = 1, owner = $self)`
fn has(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(item), Some(inventory)) = (text_arg(args, 0), &ctx.services.inventory) else {
        return 0.0;
    };
    let quantity = num_arg(args, 1).unwrap_or(1.0);
    let Some(owner) = thing_arg(ctx, args, 2, SELF_VAR) else {
        return 0.0;
    };
    flag(inventory.count(&owner, item) as f64 >= quantity)
}

/// `count(item, owner = $self)`
fn count(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(item), Some(inventory)) = (text_arg(args, 0), &ctx.services.inventory) else {
        return 0.0;
    };
    thing_arg(ctx, args, 1, SELF_VAR).map_or(0.0, |owner| inventory.count(&owner, item) as f64)
}

/// `currency(owner = $self)`
fn currency(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(owner), Some(inventory)) = (thing_arg(ctx, args, 0, SELF_VAR), &ctx.services.inventory)
    else {
        return 0.0;
    };
    inventory.currency(&owner)
}

/// `can_craft(recipe, times = 1)`, with `$target` as the crafting station.
fn can_craft(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(recipe_id), Some(actor)) = (text_arg(args, 0), ctx.self_id()) else {
        return 0.0;
    };
    let times = num_arg(args, 1).map_or(1, |n| n.max(1.0) as u32);
    let station = ctx.target_id();
    flag(craftable_recipe(ctx, recipe_id, &actor, station.as_ref(), times).is_some())
}

/// Looks up `recipe_id` and checks that `actor` could craft it `times` times
/// right now: every ingredient in stock, skill level met, and `station`
/// matching the recipe's station tag or kind.
pub fn craftable_recipe(
    ctx: &EvalContext<'_>,
    recipe_id: &str,
    actor: &ThingId,
    station: Option<&ThingId>,
    times: u32,
) -> Option<Recipe> {
    let recipe = ctx.services.crafting.as_ref()?.recipe(recipe_id)?;
    let inventory = ctx.services.inventory.as_ref()?;

    let stocked = recipe
        .ingredients
        .iter()
        .all(|stack| inventory.count(actor, &stack.item) >= i64::from(stack.quantity) * i64::from(times));
    if !stocked {
        return None;
    }

    if let Some(skill) = &recipe.skill {
        if recipe.min_level > 0 {
            let level = ctx
                .services
                .skills
                .as_ref()
                .map_or(0, |s| s.skill_level(actor, skill));
            if level < recipe.min_level {
                return None;
            }
        }
    }

    if let Some(required) = &recipe.station {
        let view = station.and_then(|s| ctx.snapshot.thing(s))?;
        if !view.has_tag(required) && &view.kind != required {
            return None;
        }
    }

    Some(recipe)
}

fn recipe_time(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(recipe_id), Some(crafting)) = (text_arg(args, 0), &ctx.services.crafting) else {
        return 0.0;
    };
    crafting.recipe(recipe_id).map_or(0.0, |r| r.minutes)
}

/// `weather(kind)` is 1 when the current weather matches; `weather()` is the
/// precipitation level.
fn weather(ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let Some(service) = &ctx.services.weather else {
        return 0.0;
    };
    let current = service.current_weather();
    match text_arg(args, 0) {
        Some(kind) => flag(current.kind.eq_ignore_ascii_case(kind)),
        None => current.precipitation,
    }
}

/// `clamp(v, lo, hi)`
fn clamp(_ctx: &EvalContext<'_>, args: &[Value]) -> f64 {
    let (Some(v), Some(lo), Some(hi)) = (num_arg(args, 0), num_arg(args, 1), num_arg(args, 2)) else {
        return 0.0;
    };
    if lo > hi {
        return lo;
    }
    v.max(lo).min(hi)
}

fn fold_numbers(args: &[Value], f: fn(f64, f64) -> f64) -> f64 {
    args.iter().map(Value::as_number).reduce(f).unwrap_or(0.0)
}

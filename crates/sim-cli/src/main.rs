//! Behavior Simulation Driver
//!
//! Loads authored content, a world fixture and optional service fixtures,
//! plans for one or more actors and optionally executes the plans against
//! the in-memory world.

use clap::Parser;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use sim_behavior::{
    ContentSet, JsonDrivenPlanner, Plan, PlanOutline, PlanStep, PlannerConfig, ReservationMode,
    StaticSchedule, StepKind,
};
use sim_world::memory::{MemoryServices, MemoryWorld, ServicesFixture};
use sim_world::{CommitResult, ThingId, World, WorldSnapshot, MOVE_X_ATTR};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upper bound on move steps taken towards a single target.
const MAX_MOVE_TICKS: usize = 256;

/// Command line arguments for the behavior driver
#[derive(Parser, Debug)]
#[command(name = "behavior_sim")]
#[command(about = "Plan and run JSON-authored behaviors against a world fixture")]
struct Args {
    /// Actions and goals JSON
    #[arg(long)]
    content: PathBuf,

    /// World fixture JSON
    #[arg(long)]
    world: PathBuf,

    /// Planner tuning TOML (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Service fixture JSON (inventories, recipes, quests, ...)
    #[arg(long)]
    services: Option<PathBuf>,

    /// Role schedules JSON
    #[arg(long)]
    schedule: Option<PathBuf>,

    /// Actors to plan for; every `actor`-tagged thing when omitted
    #[arg(long = "actor")]
    actors: Vec<String>,

    /// Plan for this goal instead of ranking all goals
    #[arg(long)]
    goal: Option<String>,

    /// Random seed for priority jitter
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Maximum priority jitter added to each goal
    #[arg(long, default_value_t = 0.0)]
    jitter: f64,

    /// Execute plans and commit their batches
    #[arg(long)]
    execute: bool,

    /// Print the default planner config and exit
    #[arg(long)]
    print_default_config: bool,
}

/// What happened to one actor.
#[derive(Debug, Serialize)]
struct ActorReport {
    actor: ThingId,
    plan: PlanOutline,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution: Option<ExecutionReport>,
}

#[derive(Debug, Default, Serialize)]
struct ExecutionReport {
    committed: usize,
    conflicts: usize,
    blocked: usize,
    replanned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_goal: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.print_default_config {
        print!("{}", sim_behavior::default_config_toml());
        return;
    }

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let content = ContentSet::from_file(&args.content)?;
    let config = match &args.config {
        Some(path) => PlannerConfig::from_file(path)?,
        None => PlannerConfig::default(),
    };
    let mut world = MemoryWorld::from_file(&args.world)?;
    let memory = Arc::new(MemoryServices::new(load_services(args.services.as_deref())?));

    let mut planner = JsonDrivenPlanner::new(content, config, memory.clone().into_services())?;
    if let Some(path) = &args.schedule {
        planner = planner.with_schedule(Arc::new(StaticSchedule::from_file(path)?));
    }

    let actors: Vec<ThingId> = if args.actors.is_empty() {
        world.snap().query_by_tag("actor").iter().map(|t| t.id.clone()).collect()
    } else {
        args.actors.iter().map(|a| ThingId::from(a.as_str())).collect()
    };

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let mut reports = Vec::with_capacity(actors.len());

    for actor in actors {
        let snapshot = world.snap();
        if !snapshot.contains(&actor) {
            tracing::warn!(%actor, "actor not found in world; skipping");
            continue;
        }
        let plan = planner.plan(&snapshot, &actor, args.goal.as_deref(), args.jitter, Some(&mut rng))?;
        tracing::info!(%actor, goal = ?plan.goal_id(), steps = plan.len(), "planned");

        let execution = if args.execute {
            Some(execute(&planner, &mut world, &memory, &actor, &plan, args)?)
        } else {
            None
        };
        reports.push(ActorReport {
            actor,
            plan: plan.outline(),
            execution,
        });
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn load_services(path: Option<&Path>) -> Result<ServicesFixture, Box<dyn Error>> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(ServicesFixture::default()),
    }
}

/// Runs a plan step by step; on the first conflict re-plans once and runs the
/// fresh plan instead.
fn execute(
    planner: &JsonDrivenPlanner,
    world: &mut MemoryWorld,
    memory: &MemoryServices,
    actor: &ThingId,
    plan: &Plan,
    args: &Args,
) -> Result<ExecutionReport, Box<dyn Error>> {
    let mut report = ExecutionReport {
        final_goal: plan.goal_id().map(str::to_string),
        ..Default::default()
    };

    if run_steps(world, memory, plan, &mut report) {
        return Ok(report);
    }

    let replan = planner.plan(&world.snap(), actor, args.goal.as_deref(), 0.0, None)?;
    tracing::info!(%actor, goal = ?replan.goal_id(), "re-planned after conflict");
    report.replanned = true;
    report.final_goal = replan.goal_id().map(str::to_string);
    run_steps(world, memory, &replan, &mut report);
    Ok(report)
}

/// Returns false when a commit conflicted.
fn run_steps(world: &mut MemoryWorld, memory: &MemoryServices, plan: &Plan, report: &mut ExecutionReport) -> bool {
    for step in plan.steps() {
        let outcome = match step.kind() {
            StepKind::Move => walk(world, step),
            StepKind::Action => perform(world, memory, step),
        };
        match outcome {
            StepOutcome::Done(commits) => report.committed += commits,
            StepOutcome::Blocked => {
                report.blocked += 1;
                return true;
            }
            StepOutcome::Conflict(reason) => {
                tracing::info!(actor = %step.actor(), action = step.action_id(), %reason, "commit conflict");
                report.conflicts += 1;
                return false;
            }
        }
    }
    true
}

enum StepOutcome {
    Done(usize),
    Blocked,
    Conflict(String),
}

fn walk(world: &mut MemoryWorld, step: &PlanStep) -> StepOutcome {
    let mut commits = 0;
    for _ in 0..MAX_MOVE_TICKS {
        let snapshot = world.snap();
        if !step.precondition(&snapshot) {
            return StepOutcome::Blocked;
        }
        let batch = step.build_batch(&snapshot);
        let moving = batch
            .writes
            .iter()
            .any(|w| &w.thing == step.actor() && w.attr == MOVE_X_ATTR);
        if !moving {
            return StepOutcome::Done(commits);
        }
        match world.try_commit(&batch) {
            CommitResult::Committed { .. } => commits += 1,
            CommitResult::Conflict { reason } => return StepOutcome::Conflict(reason),
        }
        // one tile per minute
        world.advance_minutes(1);
    }
    tracing::warn!(actor = %step.actor(), "gave up walking after {} steps", MAX_MOVE_TICKS);
    StepOutcome::Blocked
}

fn perform(world: &mut MemoryWorld, memory: &MemoryServices, step: &PlanStep) -> StepOutcome {
    let snapshot = world.snap();
    if !step.precondition(&snapshot) {
        tracing::info!(actor = %step.actor(), action = step.action_id(), "precondition failed");
        return StepOutcome::Blocked;
    }
    for reservation in step.reservations() {
        if reservation.mode == ReservationMode::Hard {
            memory.reserve(&reservation.thing, step.actor());
        }
    }

    let batch = step.build_batch(&snapshot);
    let minutes = step.duration(&snapshot).round().max(0.0) as u64;
    let result = world.try_commit(&batch);

    for reservation in step.reservations() {
        if reservation.mode == ReservationMode::Hard {
            memory.release(&reservation.thing);
        }
    }

    match result {
        CommitResult::Committed { version } => {
            memory.apply_economy_ops(&batch);
            world.advance_minutes(minutes);
            tracing::debug!(actor = %step.actor(), action = step.action_id(), version, minutes, "step committed");
            StepOutcome::Done(1)
        }
        CommitResult::Conflict { reason } => StepOutcome::Conflict(reason),
    }
}

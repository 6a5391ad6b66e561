//! In-memory reference implementations of the world and domain services.
//!
//! Used by tests across the workspace and by the CLI; a real host supplies
//! its own store and subsystems.

mod services;
mod world;

pub use services::{FailureCounter, MemoryServices, ServicesFixture, ToolSpec};
pub use world::{Fact, FixtureError, MemorySnapshot, MemoryWorld, WorldFixture};

//! Safe expression language.
//!
//! Source text is tokenized and parsed into an AST once by [`Expr::compile`];
//! evaluation walks the tree against an [`EvalContext`]. Results are numbers,
//! with booleans encoded as `1.0` / `0.0`.
//!
//! ```
//! use sim_behavior::expr::{EvalContext, Expr};
//! use sim_world::memory::MemoryWorld;
//! use sim_world::{Services, World};
//!
//! let world = MemoryWorld::new(4, 4);
//! let snapshot = world.snap();
//! let services = Services::new();
//! let ctx = EvalContext::new(&snapshot, &services);
//!
//! let expr = Expr::compile("clamp(2 * 3, 0, 5) >= 5 && !false");
//! assert!(expr.eval_bool(&ctx).unwrap());
//! ```

pub mod ast;
pub mod builtins;
pub mod context;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use builtins::{craftable_recipe, is_available_item, Builtin, FunctionRegistry, CONSUMED_ATTR, HELD_ATTR};
pub use context::{EvalContext, SELF_VAR, TARGET_VAR};
pub use eval::{is_truthy, Expr, Value};

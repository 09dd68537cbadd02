//! Task graph executor.
//!
//! Provides a generic superstep loop: run every ready task concurrently →
//! combine sibling updates → reduce once → route → repeat until settled.
//! Tasks never touch shared state; they read an immutable snapshot and
//! return a partial update that only the scheduler applies.
//!
//! Consumers define their domain by implementing `Task` (async bodies that
//! may do I/O) and `Reducer` (pure merge rules for partial updates).

pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod join;
pub mod reducers;
pub mod trace;
pub mod traits;

pub use context::TaskContext;
pub use engine::{Engine, EngineConfig, Outcome};
pub use error::{ExecutionError, GraphError, ReduceError};
pub use graph::{Graph, GraphBuilder, Route};
pub use join::Join;
pub use trace::{LogTraceSink, MemoryTraceSink, TraceEvent, TraceKind, TraceSink};
pub use traits::{task_fn, FnTask, Reducer, Task};

//! Event fan-out engine for Flux.
//!
//! [`EventProcessor`] turns submitted events into collection mutations:
//! rules are matched by action class, target paths are resolved against
//! the current store contents, and each event's mutations are committed in
//! one atomic write. [`QueryService`] serves the read side.

mod applier;
mod error;
mod processor;
mod query;
mod resolver;

pub use applier::{apply_plan, EventPlan, PlanStep};
pub use error::{FanoutError, QueryError};
pub use processor::{BatchReport, EventFailure, EventProcessor};
pub use query::{QueryResult, QueryService};
pub use resolver::{resolve, resolve_all};

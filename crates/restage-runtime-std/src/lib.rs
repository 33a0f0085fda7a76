//! Standard-library runtime for restage: a serialized update scheduler
//! that reconciles snapshot transitions inline or on a background
//! worker thread and hands the staged changeset back on an injected
//! apply context.
//!
//! The engine itself lives in `restage-core`; this crate only adds the
//! threading glue around it.

pub mod scheduler;
pub mod transition;

pub use scheduler::{UpdateScheduler, DEFAULT_BACKGROUND_THRESHOLD};
pub use transition::{Transition, TransitionOutcome};

#![doc = r"Keyed diffing and snapshot reconciliation core for Restage.

Everything in this crate is pure, in-process data manipulation: build a
[`Snapshot`] or [`TreeSnapshot`] describing the desired state, hand it
to [`reconcile`] together with the previous state, and apply the
returned [`StagedChangeset`] to whatever rendering primitive the host
owns. Scheduling and thread routing live in `restage-runtime-std`."]

pub mod changeset;
pub mod collections;
pub mod diff;
pub mod hash;
pub mod platform;
pub mod reconcile;
pub mod snapshot;
pub mod tree;


pub use changeset::{ItemPosition, StagedChangeset};
pub use diff::{diff, DiffResult};
pub use platform::{ApplyContext, InlineApplyContext};
pub use reconcile::{reconcile, reconcile_items};
pub use snapshot::Snapshot;
pub use tree::TreeSnapshot;

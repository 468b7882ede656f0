//! zset-engine: the in-memory structures behind a sorted-set store.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: O(1) lookup of a member by name together with O(log n) ordered
//!   insert, delete, range, rank and count by (score, name), using one
//!   allocation per member.
//! - Layers:
//!   - `avl`: order-statistics AVL tree. Nodes carry subtree height and
//!     size; the tree is generic over any arena that can resolve a key to
//!     its `AvlLink`.
//!   - `progressive_map`: chained hash index whose resizes migrate a bounded
//!     number of entries per operation instead of rehashing at once. Generic
//!     over any arena that can resolve a key to its `HashLink`; equality is a
//!     per-call closure.
//!   - `SortedSet`: composes both over a single `SlotMap` of members. Each
//!     member embeds a tree link and a chain link.
//!
//! Constraints
//! - Single-threaded and synchronous; callers serialize access externally.
//! - No `unsafe`: links are generational slot keys, and the parent link is a
//!   plain back-reference that never owns.
//! - Every operation is O(log n) or amortized O(1) and always completes.
//!
//! Ownership
//! - The `SlotMap` is the only owner of members. Tree and index hold keys.
//! - Successor-based tree deletion moves the successor's slot into the
//!   deleted node's position by copying links; member payloads never move.
//! - `pop` unlinks a member from both structures before returning it by value.
//!
//! Failure model
//! - Absence is `None` (or rank 0), never an error.
//! - The only recoverable error is a NaN score passed to `SortedSet::add`.
//! - Broken structural invariants are engine bugs. `validate` methods report
//!   the first one found as an `InvariantViolation` for tests and audits.
//!
//! Logging
//! - Resize start and finish are `tracing` debug events; each migration step
//!   is a trace event. The crate installs no subscriber.

pub mod avl;
mod invariant;
pub mod progressive_map;
pub mod sorted_set;
mod sorted_set_proptest;

// Public surface
pub use invariant::InvariantViolation;
pub use progressive_map::{ProgressiveMap, ResizePolicy};
pub use sorted_set::{AddError, AddOutcome, Member, MemberKey, SortedSet};

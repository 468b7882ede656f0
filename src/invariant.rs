//! Structural invariant reports.
//!
//! The engine never returns these from ordinary operations: a violation is a
//! bug in the engine itself. Validators exist so tests (and callers that want
//! to audit a structure during development) can get a precise description of
//! what went wrong instead of a bare panic.

use core::fmt;

/// First broken invariant found by a `validate` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Child heights differ by more than one.
    Unbalanced { left: u32, right: u32 },
    /// Stored height disagrees with the children.
    StaleHeight { stored: u32, actual: u32 },
    /// Stored subtree size disagrees with the children.
    StaleSize { stored: usize, actual: usize },
    /// A child's parent link does not point back at its parent, or the root
    /// has a parent.
    BrokenParentLink,
    /// A hash entry is chained in a bucket its hash does not select.
    MisplacedEntry { bucket: usize, expected: usize },
    /// A table's live count disagrees with its chains.
    TableSize { recorded: usize, counted: usize },
    /// In-order traversal is not strictly increasing.
    OutOfOrder { position: usize },
    /// Tree, hash map and arena do not hold the same members.
    Unreachable {
        tree: usize,
        index: usize,
        arena: usize,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::Unbalanced { left, right } => {
                write!(f, "unbalanced node: left height {left}, right height {right}")
            }
            InvariantViolation::StaleHeight { stored, actual } => {
                write!(f, "stale height: stored {stored}, actual {actual}")
            }
            InvariantViolation::StaleSize { stored, actual } => {
                write!(f, "stale subtree size: stored {stored}, actual {actual}")
            }
            InvariantViolation::BrokenParentLink => f.write_str("broken parent link"),
            InvariantViolation::MisplacedEntry { bucket, expected } => {
                write!(f, "hash entry in bucket {bucket}, expected bucket {expected}")
            }
            InvariantViolation::TableSize { recorded, counted } => {
                write!(f, "table records {recorded} entries but chains hold {counted}")
            }
            InvariantViolation::OutOfOrder { position } => {
                write!(f, "members out of order at position {position}")
            }
            InvariantViolation::Unreachable { tree, index, arena } => write!(
                f,
                "member reachability mismatch: tree {tree}, index {index}, arena {arena}"
            ),
        }
    }
}

impl std::error::Error for InvariantViolation {}

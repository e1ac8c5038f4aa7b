//! Settings Tree
//!
//! Hierarchical storage addressed by dot paths. Group nodes contain named
//! children, leaf nodes hold a single value.
//!
//! # Structure rules
//!
//! 1. Writes create every missing intermediate group (auto-vivification).
//! 2. A leaf standing where a write needs a group is replaced by an empty
//!    group. This is the only implicit tag change; a group is never turned
//!    back into a leaf by a scalar write.
//! 3. A write whose value equals the stored one changes nothing and reports
//!    no change. Everything downstream (cache invalidation, notifications,
//!    reactive re-runs) keys off that report.

mod lookup;
mod node;
mod path;

pub use lookup::{GroupView, Lookup, Missing};
pub use node::{Children, Node, NodeKind, PathTree, WriteOutcome};
pub use path::{Path, SEPARATOR};

//! Repository tree: leaves, composites and the registry that owns them.
//!
//! # Architecture
//!
//! ```text
//!                    RepositoryTree (one Mutex)
//!                 ┌────────────────────────────────┐
//!                 │  id ──► Node::Composite(app)   │
//!                 │           locals: [lib, res]   │
//!                 │  id ──► Node::Composite(lib)   │
//!                 │           locals: [aar]        │
//!                 │  id ──► Node::Leaf(res)        │
//!                 │  id ──► Node::Leaf(aar)        │
//!                 └────────────────────────────────┘
//! ```
//!
//! Nodes refer to each other by [`RepositoryId`] only. A child records the
//! composites that depend on it as ids, so an invalidation travels upward
//! through the arena without any node holding a reference to another.
//!
//! Leaves own items. Composites own merged views over the leaves below
//! them, rebuilt on first read and then repaired incrementally: a leaf that
//! changed is marked stale in every dependent's cached slices, and the next
//! read of such a slice retracts and re-adds that leaf's contribution only.
//!
//! # Lock ordering
//!
//! The whole tree is guarded by a single lock, taken by every operation
//! for its full duration. Callers holding an outer lock of their own (an
//! IDE read/write action lock, a build lock) must take it *before* any
//! call into the tree, and never call out to code that acquires such a
//! lock from inside a tree callback. Violating this order can deadlock the
//! host; the tree has no way to detect it.

mod composite;
mod error;
mod handle;
mod id;
mod leaf;
mod pending;
mod tree;
mod view;
mod visitor;

pub use error::{RepositoryError, RepositoryResult};
pub use handle::Repository;
pub use id::RepositoryId;
pub use leaf::{LeafRepository, SingleNamespaceRepository};
pub use pending::{Callback, DirectExecutor, Executor};
pub use tree::{RepositoryKind, RepositoryTree};
pub use visitor::{ResourceVisitor, VisitResult};

//! # repokit-core: Pure Query Description for repokit
//!
//! This crate holds everything a repository query is made of, with no way
//! to run one. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        repokit Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  Application / service code                     │   │
//! │  │    uow.repository::<Widget>() ──► list(&spec) ──► complete()    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             repokit-db (Database Layer)                         │   │
//! │  │   UnitOfWork, Repository<E>, SQL rendering, change tracking     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ repokit-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  filter   │  │   spec    │  │ evaluator │  │  paging   │  │   │
//! │  │   │  Filter   │  │ Spec<T>   │  │ evaluate  │  │ PageReq   │  │   │
//! │  │   │  Value    │  │ OrderBy   │  │ QueryPlan │  │ SeekPage  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO ASYNC • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`value`] - SQL scalar values
//! - [`filter`] - Predicate expression trees
//! - [`specification`] - Criteria, ordering, includes and paging for one query
//! - [`plan`] - Declarative SELECT description
//! - [`evaluator`] - Folds a specification into a plan
//! - [`paging`] - Offset and seek pagination
//! - [`error`] - Query shape errors
//!
//! ## Example Usage
//!
//! ```rust
//! use repokit_core::{evaluate, Filter, QueryPlan, Specification};
//!
//! struct Widget;
//!
//! let spec = Specification::<Widget>::new()
//!     .with_criteria(Filter::eq("category", "tools"))
//!     .order_by("name")
//!     .apply_paging(20, 10);
//!
//! let plan = evaluate(QueryPlan::new(), &spec);
//! assert_eq!(plan.offset(), Some(20));
//! assert_eq!(plan.limit(), Some(10));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod evaluator;
pub mod filter;
pub mod paging;
pub mod plan;
pub mod specification;
pub mod value;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{QueryError, QueryResult};
pub use evaluator::evaluate;
pub use filter::{ComparisonOp, Filter};
pub use paging::{PageRequest, PaginatedResult, SeekPage, DEFAULT_PAGE_SIZE};
pub use plan::{QueryPlan, Tracking};
pub use specification::{OrderBy, SortDirection, Specification};
pub use value::Value;

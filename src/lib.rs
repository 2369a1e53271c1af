// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # annolog
//!
//! A graph-based annotated-logic reasoner. Every node and edge carries, per
//! label, a truth interval `[lower, upper]` over `[0, 1]`. Facts seed those
//! intervals over time windows; rules propagate them forward through discrete
//! timesteps until a fixed point or a timestep budget is reached.
//!
//! ## Architecture
//!
//! - **Intervals and worlds** (`interval`, `label`, `world`): per-entity label
//!   bounds that only ever tighten
//! - **Graph** (`graph`): petgraph topology plus label-to-entity indices
//! - **Grounding** (`grounding`, `threshold`, `annotation`): read-only rule
//!   evaluation with quantifier thresholds, optionally in parallel via rayon
//! - **Consistency** (`consistency`): the single committer, with annihilation
//!   and mutually exclusive label pairs
//! - **Scheduler** (`reasoner`): timesteps, delays, the `again` sub-loop and
//!   convergence detection
//! - **Results** (`query`, `trace`): point queries, filter tables and the
//!   provenance trace
//!
//! ## Library usage
//!
//! ```no_run
//! use annolog::fact::Fact;
//! use annolog::graph::GraphSnapshot;
//! use annolog::interval::Interval;
//! use annolog::query::Query;
//! use annolog::reasoner::Reasoner;
//! use annolog::rule::Rule;
//!
//! let mut reasoner = Reasoner::builder()
//!     .graph(GraphSnapshot::new().edge("A", "B").edge("B", "C"))
//!     .fact(Fact::edge("A", "B", "connected", Interval::TRUE))
//!     .fact(Fact::edge("B", "C", "connected", Interval::TRUE))
//!     .rule(
//!         Rule::new("transitive", "connected", ["x", "z"])
//!             .edge_clause("connected", "x", "y")
//!             .edge_clause("connected", "y", "z")
//!             .infer_edges(),
//!     )
//!     .build()
//!     .unwrap();
//! reasoner.reason(None).unwrap();
//! let answer = reasoner
//!     .query(&Query::edge("A", "C", "connected").is_true(), 0)
//!     .unwrap();
//! assert_eq!(answer.as_bool(), Some(true));
//! ```

pub mod annotation;
pub mod bridge;
pub mod config;
pub mod consistency;
pub mod error;
pub mod fact;
pub mod graph;
pub mod grounding;
pub mod interpretation;
pub mod interval;
pub mod label;
pub mod query;
pub mod reasoner;
pub mod rule;
pub mod scenario;
pub mod threshold;
pub mod trace;
pub mod world;

pub use config::ReasonerConfig;
pub use error::{AnnologError, AnnologResult};
pub use fact::Fact;
pub use interpretation::Interpretation;
pub use interval::Interval;
pub use label::Label;
pub use reasoner::{ReasonOutcome, Reasoner, ReasonerBuilder, StopReason};
pub use rule::{Rule, RuleSet};

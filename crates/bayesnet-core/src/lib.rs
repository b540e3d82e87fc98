//! Exact inference over discrete Bayesian networks.
//!
//! ```text
//!   add_variable / add_edge / set_cpt
//!                 │
//!                 ▼
//!        ┌─────────────────┐   cycle check + rollback,
//!        │  NetworkGraph   │   topological order rebuilt
//!        └────────┬────────┘   on every mutation
//!                 │
//!   ┌─────────────┼──────────────────┬─────────────────────┐
//!   ▼             ▼                  ▼                     ▼
//! joint     variable_elimination   belief_propagation   reverse_belief_propagation
//! P(x)      P(Q | e), exact        beliefs + influence traces
//! ```
//!
//! ## Modules
//!
//! - `variable`: ids, state sets, assignments
//! - `cpt`: dense strided conditional probability tables
//! - `odometer`: iterative Cartesian-product enumeration
//! - `graph`: the DAG, its invariants, conditional and joint probability
//! - `elimination`: brute-force exact inference
//! - `propagation`: two-pass message passing and influence tracing
//! - `persistence`: text and JSON encodings
//! - `shared`: `Arc<RwLock<_>>` handle for multi-threaded callers
//! - `catalog`: small reference networks

pub mod catalog;
pub mod cpt;
pub mod elimination;
pub mod error;
pub mod graph;
pub mod odometer;
pub mod persistence;
pub mod propagation;
pub mod shared;
pub mod variable;

pub use cpt::{ConditionalProbabilityTable, NORMALIZATION_EPSILON, VALIDITY_TOLERANCE};
pub use elimination::Posterior;
pub use error::{NetworkError, Result};
pub use graph::NetworkGraph;
pub use persistence::{FormatError, NetworkDocument, NetworkFormat};
pub use propagation::{Belief, InfluenceTrace, PropagationDirection, PropagationResult};
pub use shared::SharedNetwork;
pub use variable::{assignment, Assignment, Variable, VariableId};

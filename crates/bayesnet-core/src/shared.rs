//! A network shared between threads.
//!
//! Queries run under the read lock and may overlap each other; structural
//! mutations take the write lock and therefore never overlap a query.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cpt::ConditionalProbabilityTable;
use crate::elimination::Posterior;
use crate::error::Result;
use crate::graph::NetworkGraph;
use crate::propagation::{PropagationDirection, PropagationResult};
use crate::variable::{Assignment, VariableId};

/// Cloneable handle; every clone refers to the same network.
#[derive(Debug, Clone, Default)]
pub struct SharedNetwork {
    inner: Arc<RwLock<NetworkGraph>>,
}

impl SharedNetwork {
    pub fn new(graph: NetworkGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, NetworkGraph> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, NetworkGraph> {
        self.inner.write()
    }

    /// Copy of the current network.
    pub fn snapshot(&self) -> NetworkGraph {
        self.inner.read().clone()
    }

    // ========================================================================
    // Mutations (write lock)
    // ========================================================================

    pub fn add_variable(
        &self,
        id: impl Into<VariableId>,
        name: impl Into<String>,
        states: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<()> {
        self.inner.write().add_variable(id, name, states)
    }

    pub fn add_edge(&self, parent: impl Into<VariableId>, child: impl Into<VariableId>) -> Result<()> {
        self.inner.write().add_edge(parent, child)
    }

    pub fn set_cpt(&self, id: &str, cpt: ConditionalProbabilityTable) -> Result<()> {
        self.inner.write().set_cpt(id, cpt)
    }

    // ========================================================================
    // Queries (read lock)
    // ========================================================================

    pub fn compute_joint_probability(&self, assignment: &Assignment) -> Result<f64> {
        self.inner.read().compute_joint_probability(assignment)
    }

    pub fn variable_elimination<Q: AsRef<str>>(
        &self,
        query: &[Q],
        evidence: &Assignment,
    ) -> Result<Posterior> {
        self.inner.read().variable_elimination(query, evidence)
    }

    pub fn propagate<Q: AsRef<str>>(
        &self,
        query: &[Q],
        evidence: &Assignment,
        trace: bool,
        direction: PropagationDirection,
    ) -> Result<PropagationResult> {
        self.inner.read().propagate(query, evidence, trace, direction)
    }
}

impl From<NetworkGraph> for SharedNetwork {
    fn from(graph: NetworkGraph) -> Self {
        Self::new(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::variable::assignment;

    fn coin() -> SharedNetwork {
        let shared = SharedNetwork::default();
        shared.add_variable("Coin", "Coin", ["Heads", "Tails"]).unwrap();
        shared
            .set_cpt(
                "Coin",
                ConditionalProbabilityTable::from_table(vec![2], vec![0.5, 0.5]).unwrap(),
            )
            .unwrap();
        shared
    }

    #[test]
    fn test_clones_share_state() {
        let shared = coin();
        let other = shared.clone();
        other.add_variable("Die", "Die", ["1", "2", "3", "4", "5", "6"]).unwrap();
        assert_eq!(shared.read().len(), 2);
        assert_eq!(
            shared.add_edge("Coin", "Coin"),
            Err(NetworkError::SelfLoop { id: "Coin".into() })
        );
    }

    #[test]
    fn test_concurrent_readers() {
        let shared = coin();
        let results: Vec<f64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let shared = shared.clone();
                    scope.spawn(move || {
                        shared
                            .compute_joint_probability(&assignment([("Coin", "Tails")]))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results, vec![0.5; 4]);
    }

    #[test]
    fn test_writer_between_readers() {
        let shared = coin();
        std::thread::scope(|scope| {
            let writer = shared.clone();
            scope.spawn(move || {
                writer.add_variable("Flag", "Flag", ["Off", "On"]).unwrap();
            });
            let reader = shared.clone();
            scope.spawn(move || {
                let graph = reader.read();
                // Either before or after the writer; never half-applied.
                assert_eq!(graph.topological_order().len(), graph.len());
            });
        });
        assert!(shared.snapshot().contains("Flag"));
    }
}

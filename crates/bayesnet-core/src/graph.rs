//! The network: variables, their CPTs, and the DAG invariants that tie them.
//!
//! Every structural mutation re-derives the topological order from scratch
//! (Kahn's algorithm, ties broken by id). Edge insertion is tentative: if the
//! re-derivation finds a cycle the parent is removed again before returning,
//! so callers never observe a cyclic graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::cpt::ConditionalProbabilityTable;
use crate::error::{NetworkError, Result};
use crate::variable::{Assignment, Variable, VariableId};

// ============================================================================
// NetworkGraph
// ============================================================================

/// A discrete Bayesian network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkGraph {
    variables: BTreeMap<VariableId, Variable>,
    cpts: BTreeMap<VariableId, ConditionalProbabilityTable>,
    topological_order: Vec<VariableId>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Add a parentless variable with ordered, unique state names.
    pub fn add_variable(
        &mut self,
        id: impl Into<VariableId>,
        name: impl Into<String>,
        states: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<()> {
        let id = id.into();
        if self.variables.contains_key(&id) {
            return Err(NetworkError::DuplicateId { id });
        }
        let states: Vec<String> = states.into_iter().map(Into::into).collect();
        let variable = Variable::new(id.clone(), name, states)?;
        tracing::debug!(variable = %id, states = variable.num_states(), "added variable");
        self.variables.insert(id, variable);

        // A parentless newcomer cannot close a cycle.
        let acyclic = self.rebuild_order();
        debug_assert!(acyclic, "adding a variable cannot introduce a cycle");
        Ok(())
    }

    /// Add the edge `parent -> child`, rolling back if it would close a cycle.
    ///
    /// Re-adding an existing edge is a no-op.
    ///
    /// A new edge changes [`NetworkGraph::cpt_shape`] of `child`, so a CPT
    /// already attached to `child` is detached (logged at `warn`). Check
    /// [`NetworkGraph::cpt`] afterwards and call [`NetworkGraph::set_cpt`]
    /// with a table of the new shape; until then the child has no CPT and
    /// queries treat it as unparameterized.
    pub fn add_edge(
        &mut self,
        parent: impl Into<VariableId>,
        child: impl Into<VariableId>,
    ) -> Result<()> {
        let parent = parent.into();
        let child = child.into();
        if parent == child {
            return Err(NetworkError::SelfLoop { id: parent });
        }
        if !self.variables.contains_key(&parent) {
            return Err(NetworkError::UnknownVariable { id: parent });
        }
        let Some(child_var) = self.variables.get_mut(&child) else {
            return Err(NetworkError::UnknownVariable { id: child });
        };
        if !child_var.insert_parent(parent.clone()) {
            return Ok(());
        }

        if !self.rebuild_order() {
            if let Some(child_var) = self.variables.get_mut(&child) {
                child_var.remove_parent(parent.as_str());
            }
            tracing::debug!(%parent, %child, "rejected edge: cycle");
            return Err(NetworkError::CycleDetected { parent, child });
        }

        if self.cpts.remove(&child).is_some() {
            tracing::warn!(
                %parent,
                %child,
                "detached stale CPT: shape no longer matches the parent set"
            );
        }
        tracing::debug!(%parent, %child, "added edge");
        Ok(())
    }

    /// Attach (or replace) the CPT of `id`. Its dimensions must equal
    /// [`NetworkGraph::cpt_shape`].
    pub fn set_cpt(&mut self, id: &str, cpt: ConditionalProbabilityTable) -> Result<()> {
        let expected = self.cpt_shape(id)?;
        let variable = self.require_variable(id)?.id().clone();
        if cpt.dimensions() != expected.as_slice() {
            return Err(NetworkError::ShapeMismatch {
                id: variable,
                expected,
                actual: cpt.dimensions().to_vec(),
            });
        }
        tracing::debug!(variable = %variable, entries = cpt.len(), "attached CPT");
        self.cpts.insert(variable, cpt);
        Ok(())
    }

    /// Normalize every attached CPT in place. Returns how many were touched.
    pub fn normalize_cpts(&mut self) -> usize {
        for cpt in self.cpts.values_mut() {
            cpt.normalize();
        }
        self.cpts.len()
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.variables.contains_key(id)
    }

    /// All variable ids, sorted.
    pub fn variable_ids(&self) -> impl Iterator<Item = &VariableId> + '_ {
        self.variables.keys()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.variables.values()
    }

    pub fn variable(&self, id: &str) -> Option<&Variable> {
        self.variables.get(id)
    }

    pub fn require_variable(&self, id: &str) -> Result<&Variable> {
        self.variables
            .get(id)
            .ok_or_else(|| NetworkError::UnknownVariable { id: id.into() })
    }

    pub fn cpt(&self, id: &str) -> Option<&ConditionalProbabilityTable> {
        self.cpts.get(id)
    }

    /// Variables that list `id` as a parent, in id order.
    pub fn children(&self, id: &str) -> Vec<&VariableId> {
        self.variables
            .values()
            .filter(|v| v.has_parent(id))
            .map(Variable::id)
            .collect()
    }

    /// Every `(parent, child)` edge, ordered by child then parent.
    pub fn edges(&self) -> Vec<(VariableId, VariableId)> {
        self.variables
            .values()
            .flat_map(|v| v.parents().iter().map(move |p| (p.clone(), v.id().clone())))
            .collect()
    }

    /// Parents strictly before children; ties broken by id.
    pub fn topological_order(&self) -> &[VariableId] {
        &self.topological_order
    }

    /// Dimensions a CPT for `id` must have: each parent's state count in
    /// parent order, then the variable's own state count.
    pub fn cpt_shape(&self, id: &str) -> Result<Vec<usize>> {
        let variable = self.require_variable(id)?;
        let mut shape = Vec::with_capacity(variable.parents().len() + 1);
        for parent in variable.parents() {
            shape.push(self.require_variable(parent.as_str())?.num_states());
        }
        shape.push(variable.num_states());
        Ok(shape)
    }

    // ------------------------------------------------------------------------
    // Probability queries
    // ------------------------------------------------------------------------

    /// P(`id` = `own_state` | parents as given in `parent_states`).
    ///
    /// `parent_states` may carry extra entries; only the parents of `id` are read.
    pub fn get_conditional_probability(
        &self,
        id: &str,
        own_state: &str,
        parent_states: &Assignment,
    ) -> Result<f64> {
        let variable = self.require_variable(id)?;
        let cpt = self
            .cpts
            .get(id)
            .ok_or_else(|| NetworkError::MissingCpt { id: variable.id().clone() })?;

        let mut parent_indices = Vec::with_capacity(variable.parents().len());
        for parent_id in variable.parents() {
            let state = parent_states.get(parent_id).ok_or_else(|| {
                NetworkError::MissingParentAssignment {
                    id: variable.id().clone(),
                    parent: parent_id.clone(),
                }
            })?;
            let parent = self.require_variable(parent_id.as_str())?;
            parent_indices.push(parent.require_state(state)?);
        }
        let own_index = variable.require_state(own_state)?;
        cpt.get_probability(&parent_indices, own_index)
    }

    /// Probability of a full assignment: the product of every variable's
    /// conditional probability given its parents, in topological order.
    pub fn compute_joint_probability(&self, assignment: &Assignment) -> Result<f64> {
        if let Some(unknown) = assignment.keys().find(|id| !self.variables.contains_key(*id)) {
            return Err(NetworkError::UnknownVariable { id: unknown.clone() });
        }
        let mut joint = 1.0;
        for id in &self.topological_order {
            let state = assignment
                .get(id)
                .ok_or_else(|| NetworkError::MissingAssignment { id: id.clone() })?;
            joint *= self.get_conditional_probability(id.as_str(), state, assignment)?;
        }
        Ok(joint)
    }

    /// Resolve query ids to variables, dropping repeats (first occurrence wins).
    pub(crate) fn resolve_query<Q: AsRef<str>>(&self, query: &[Q]) -> Result<Vec<&Variable>> {
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::with_capacity(query.len());
        for id in query {
            let variable = self.require_variable(id.as_ref())?;
            if seen.insert(variable.id()) {
                resolved.push(variable);
            }
        }
        Ok(resolved)
    }

    /// Every evidence id must name a variable and every observed state must
    /// be one of its states.
    pub(crate) fn validate_evidence(&self, evidence: &Assignment) -> Result<()> {
        for (id, state) in evidence {
            self.require_variable(id.as_str())?.require_state(state)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Topological order
    // ------------------------------------------------------------------------

    /// Recompute the cached order. Returns false (leaving the cache as it was)
    /// if the parent relation is cyclic.
    fn rebuild_order(&mut self) -> bool {
        match self.topological_sort() {
            Some(order) => {
                self.topological_order = order;
                true
            }
            None => false,
        }
    }

    fn topological_sort(&self) -> Option<Vec<VariableId>> {
        let mut children: BTreeMap<&VariableId, Vec<&VariableId>> = BTreeMap::new();
        let mut in_degree: BTreeMap<&VariableId, usize> = BTreeMap::new();
        for (id, variable) in &self.variables {
            in_degree.insert(id, variable.parents().len());
            for parent in variable.parents() {
                children.entry(parent).or_default().push(id);
            }
        }

        let mut ready: BTreeSet<&VariableId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.variables.len());

        while let Some(current) = ready.pop_first() {
            order.push(current.clone());
            for &child in children.get(current).map(Vec::as_slice).unwrap_or(&[]) {
                let degree = in_degree.get_mut(child)?;
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(child);
                }
            }
        }

        (order.len() == self.variables.len()).then_some(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::assignment;

    fn binary(graph: &mut NetworkGraph, id: &str) {
        graph.add_variable(id, id, ["F", "T"]).unwrap();
    }

    fn prior(p_true: f64) -> ConditionalProbabilityTable {
        ConditionalProbabilityTable::from_table(vec![2], vec![1.0 - p_true, p_true]).unwrap()
    }

    fn copy_of_parent() -> ConditionalProbabilityTable {
        ConditionalProbabilityTable::from_table(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap()
    }

    #[test]
    fn test_add_variable() {
        let mut graph = NetworkGraph::new();
        graph.add_variable("A", "Cause", ["False", "True"]).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.variable("A").unwrap().name(), "Cause");
        assert_eq!(graph.topological_order(), &[VariableId::from("A")]);

        assert_eq!(
            graph.add_variable("A", "Again", ["x"]),
            Err(NetworkError::DuplicateId { id: "A".into() })
        );
        assert_eq!(graph.variable("A").unwrap().name(), "Cause");
    }

    #[test]
    fn test_add_edge_and_order() {
        let mut graph = NetworkGraph::new();
        for id in ["C", "B", "A"] {
            binary(&mut graph, id);
        }
        graph.add_edge("A", "B").unwrap();
        graph.add_edge("B", "C").unwrap();

        let order: Vec<&str> = graph.topological_order().iter().map(VariableId::as_str).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(graph.children("A"), vec![&VariableId::from("B")]);
        assert_eq!(
            graph.edges(),
            vec![
                (VariableId::from("A"), VariableId::from("B")),
                (VariableId::from("B"), VariableId::from("C")),
            ]
        );

        // Idempotent re-insertion.
        graph.add_edge("A", "B").unwrap();
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn test_ties_are_broken_by_id() {
        let mut graph = NetworkGraph::new();
        for id in ["Z", "M", "A", "Q"] {
            binary(&mut graph, id);
        }
        graph.add_edge("Z", "A").unwrap();
        let order: Vec<&str> = graph.topological_order().iter().map(VariableId::as_str).collect();
        assert_eq!(order, vec!["M", "Q", "Z", "A"]);
    }

    #[test]
    fn test_cycle_is_rejected_and_rolled_back() {
        let mut graph = NetworkGraph::new();
        for id in ["A", "B", "C"] {
            binary(&mut graph, id);
        }
        graph.add_edge("A", "B").unwrap();
        graph.add_edge("B", "C").unwrap();
        let before = graph.clone();

        assert_eq!(
            graph.add_edge("C", "A"),
            Err(NetworkError::CycleDetected {
                parent: "C".into(),
                child: "A".into()
            })
        );
        assert_eq!(graph, before);
        assert!(!graph.variable("A").unwrap().has_parent("C"));
    }

    #[test]
    fn test_self_loop_and_unknown_ids() {
        let mut graph = NetworkGraph::new();
        binary(&mut graph, "X");
        assert_eq!(
            graph.add_edge("X", "X"),
            Err(NetworkError::SelfLoop { id: "X".into() })
        );
        assert_eq!(
            graph.add_edge("Nope", "Nope"),
            Err(NetworkError::SelfLoop { id: "Nope".into() })
        );
        assert!(matches!(
            graph.add_edge("X", "Y"),
            Err(NetworkError::UnknownVariable { id }) if id.as_str() == "Y"
        ));
        assert!(matches!(
            graph.add_edge("Y", "X"),
            Err(NetworkError::UnknownVariable { id }) if id.as_str() == "Y"
        ));
    }

    #[test]
    fn test_set_cpt_checks_shape() {
        let mut graph = NetworkGraph::new();
        graph.add_variable("D", "Disease", ["None", "Cold", "Flu"]).unwrap();
        binary(&mut graph, "S");
        graph.add_edge("D", "S").unwrap();
        assert_eq!(graph.cpt_shape("S").unwrap(), vec![3, 2]);

        let wrong = ConditionalProbabilityTable::new(vec![2, 2]).unwrap();
        assert!(matches!(
            graph.set_cpt("S", wrong),
            Err(NetworkError::ShapeMismatch { expected, actual, .. })
                if expected == vec![3, 2] && actual == vec![2, 2]
        ));
        assert!(graph.cpt("S").is_none());

        graph
            .set_cpt("S", ConditionalProbabilityTable::new(vec![3, 2]).unwrap())
            .unwrap();
        assert!(graph.cpt("S").is_some());
        assert!(matches!(
            graph.set_cpt("Missing", prior(0.5)),
            Err(NetworkError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_new_parent_detaches_stale_cpt() {
        let mut graph = NetworkGraph::new();
        binary(&mut graph, "A");
        binary(&mut graph, "B");
        graph.set_cpt("B", prior(0.4)).unwrap();
        graph.add_edge("A", "B").unwrap();
        assert!(graph.cpt("B").is_none());
        assert!(matches!(
            graph.get_conditional_probability("B", "T", &assignment([("A", "F")])),
            Err(NetworkError::MissingCpt { .. })
        ));

        // Reattaching with the new shape sticks; repeating the edge keeps it.
        assert_eq!(graph.cpt_shape("B").unwrap(), vec![2, 2]);
        graph.set_cpt("B", copy_of_parent()).unwrap();
        graph.add_edge("A", "B").unwrap();
        assert!(graph.cpt("B").is_some());
    }

    #[test]
    fn test_conditional_probability_errors() {
        let mut graph = NetworkGraph::new();
        binary(&mut graph, "A");
        binary(&mut graph, "B");
        graph.add_edge("A", "B").unwrap();

        assert!(matches!(
            graph.get_conditional_probability("B", "T", &assignment([("A", "T")])),
            Err(NetworkError::MissingCpt { .. })
        ));

        graph.set_cpt("B", copy_of_parent()).unwrap();
        assert!(matches!(
            graph.get_conditional_probability("B", "T", &Assignment::new()),
            Err(NetworkError::MissingParentAssignment { parent, .. }) if parent.as_str() == "A"
        ));
        assert!(matches!(
            graph.get_conditional_probability("B", "T", &assignment([("A", "Maybe")])),
            Err(NetworkError::InvalidState { id, .. }) if id.as_str() == "A"
        ));
        assert!(matches!(
            graph.get_conditional_probability("B", "Maybe", &assignment([("A", "T")])),
            Err(NetworkError::InvalidState { id, .. }) if id.as_str() == "B"
        ));
        assert_eq!(
            graph
                .get_conditional_probability("B", "T", &assignment([("A", "T")]))
                .unwrap(),
            1.0
        );
    }

    #[test]
    fn test_joint_probability_deterministic_chain() {
        let mut graph = NetworkGraph::new();
        for id in ["A", "B", "C"] {
            binary(&mut graph, id);
        }
        graph.add_edge("A", "B").unwrap();
        graph.add_edge("B", "C").unwrap();
        graph.set_cpt("A", prior(1.0)).unwrap();
        graph.set_cpt("B", copy_of_parent()).unwrap();
        graph.set_cpt("C", copy_of_parent()).unwrap();

        let consistent = assignment([("A", "T"), ("B", "T"), ("C", "T")]);
        let broken = assignment([("A", "T"), ("B", "F"), ("C", "F")]);
        assert_eq!(graph.compute_joint_probability(&consistent).unwrap(), 1.0);
        assert_eq!(graph.compute_joint_probability(&broken).unwrap(), 0.0);

        assert!(matches!(
            graph.compute_joint_probability(&assignment([("A", "T"), ("B", "T")])),
            Err(NetworkError::MissingAssignment { id }) if id.as_str() == "C"
        ));
        let mut extra = consistent.clone();
        extra.insert("Z".into(), "T".into());
        assert!(matches!(
            graph.compute_joint_probability(&extra),
            Err(NetworkError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_joint_probability_multiplies_conditionals() {
        let mut graph = NetworkGraph::new();
        binary(&mut graph, "A");
        binary(&mut graph, "B");
        graph.add_edge("A", "B").unwrap();
        graph.set_cpt("A", prior(0.3)).unwrap();
        graph
            .set_cpt(
                "B",
                ConditionalProbabilityTable::from_table(vec![2, 2], vec![0.8, 0.2, 0.3, 0.7])
                    .unwrap(),
            )
            .unwrap();

        let p = graph
            .compute_joint_probability(&assignment([("A", "T"), ("B", "F")]))
            .unwrap();
        approx::assert_relative_eq!(p, 0.3 * 0.3, epsilon = 1e-12);
    }
}

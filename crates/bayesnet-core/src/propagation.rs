//! Two-pass sum-product message passing over the DAG.
//!
//! Messages live in one map keyed by `(from, to)` and always hold a normalized
//! distribution over the states of the receiving variable:
//!
//! - upward (child → parent), `λ_{X→U}(u) = Σ_x P(x | U=u, rest) · λ_X(x)`
//!   where `λ_X` is X's evidence indicator times the messages from its children;
//! - downward (parent → child), `π_{X→C}(c) = Σ_x P(c | X=x, rest) · support_X(x)`.
//!
//! "rest" fixes every other parent of the CPT to a single state: its observed
//! state if it is evidence, otherwise a heuristic state (see
//! [`PropagationDirection`]). Summing over one parent at a time keeps each
//! message linear in the CPT size; with at most one parent per variable nothing
//! is fixed and both directions compute exact marginals. On networks where
//! variables share several unobserved parents the results are approximations.
//!
//! Forward propagation runs upward then downward. Reverse propagation runs
//! downward first and upward last, so evidence from descendants is combined at
//! the end.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cpt::{normalize_in_place, NORMALIZATION_EPSILON};
use crate::error::Result;
use crate::graph::NetworkGraph;
use crate::variable::{Assignment, Variable, VariableId};

// ============================================================================
// Results
// ============================================================================

/// Which schedule produced a [`PropagationResult`].
///
/// - `Forward`: upward then downward pass. While sending upward, the other
///   unobserved parents of a CPT are fixed to their first state.
/// - `Reverse`: downward then upward pass. While sending upward, the other
///   unobserved parents are fixed to their most likely state under the
///   predictive support computed by the downward pass.
///
/// Downward messages fix other parents to their most likely state in both
/// schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationDirection {
    Forward,
    Reverse,
}

impl PropagationDirection {
    /// Separator used when rendering an influence path.
    pub fn arrow(self) -> &'static str {
        match self {
            PropagationDirection::Forward => "->",
            PropagationDirection::Reverse => "<-",
        }
    }
}

impl fmt::Display for PropagationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropagationDirection::Forward => f.write_str("forward"),
            PropagationDirection::Reverse => f.write_str("reverse"),
        }
    }
}

/// Marginal distribution of one variable, in its canonical state order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    pub states: Vec<String>,
    pub probabilities: Vec<f64>,
}

impl Belief {
    pub fn get(&self, state: &str) -> Option<f64> {
        self.states
            .iter()
            .position(|s| s == state)
            .map(|i| self.probabilities[i])
    }

    pub fn sum(&self) -> f64 {
        self.probabilities.iter().sum()
    }

    /// Mean of the per-state values.
    pub fn mean(&self) -> f64 {
        if self.probabilities.is_empty() {
            0.0
        } else {
            self.sum() / self.probabilities.len() as f64
        }
    }

    /// True when no mass is left (for example a variable without a CPT).
    pub fn is_degenerate(&self) -> bool {
        self.sum() <= NORMALIZATION_EPSILON
    }

    /// The most probable state; ties go to the earlier state.
    pub fn most_likely(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (state, &p) in self.states.iter().zip(&self.probabilities) {
            if best.map_or(true, |(_, b)| p > b) {
                best = Some((state.as_str(), p));
            }
        }
        best
    }
}

/// One directed path from an evidence variable to a query variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceTrace {
    pub source: VariableId,
    pub target: VariableId,
    /// Rendered path, e.g. `A->B->C` or `C<-B<-A`.
    pub path: String,
    pub nodes: Vec<VariableId>,
    pub direction: PropagationDirection,
    /// Mean of the target's belief values. A coarse summary, not a
    /// sensitivity measure.
    pub influence_strength: f64,
    /// The target's full belief, state by state.
    pub state_influences: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropagationResult {
    /// Beliefs for every variable of the network.
    pub beliefs: BTreeMap<VariableId, Belief>,
    pub traces: Vec<InfluenceTrace>,
}

impl PropagationResult {
    pub fn belief(&self, id: &str) -> Option<&Belief> {
        self.beliefs.get(id)
    }
}

// ============================================================================
// Entry points
// ============================================================================

impl NetworkGraph {
    /// Forward belief propagation. `query` selects the targets of influence
    /// tracing; beliefs are reported for every variable.
    ///
    /// Unknown ids and unknown evidence states fail up front. A variable
    /// without a CPT gets an all-zero belief instead of an error.
    pub fn belief_propagation<Q: AsRef<str>>(
        &self,
        query: &[Q],
        evidence: &Assignment,
        trace: bool,
    ) -> Result<PropagationResult> {
        self.propagate(query, evidence, trace, PropagationDirection::Forward)
    }

    /// Diagnostic variant of [`NetworkGraph::belief_propagation`]: downward
    /// pass first, upward last, traces follow edges backwards.
    pub fn reverse_belief_propagation<Q: AsRef<str>>(
        &self,
        query: &[Q],
        evidence: &Assignment,
        trace: bool,
    ) -> Result<PropagationResult> {
        self.propagate(query, evidence, trace, PropagationDirection::Reverse)
    }

    pub fn propagate<Q: AsRef<str>>(
        &self,
        query: &[Q],
        evidence: &Assignment,
        trace: bool,
        direction: PropagationDirection,
    ) -> Result<PropagationResult> {
        let query_vars = self.resolve_query(query)?;
        let mut passing = MessagePassing::new(self, evidence, direction)?;
        passing.run()?;
        let beliefs = passing.beliefs()?;

        let mut traces = Vec::new();
        if trace {
            for source in passing.observed.keys() {
                for target in &query_vars {
                    if *source == target.id() {
                        continue;
                    }
                    let Some(belief) = beliefs.get(target.id()) else {
                        continue;
                    };
                    for nodes in self.influence_paths(source, target.id(), direction) {
                        traces.push(InfluenceTrace {
                            source: (*source).clone(),
                            target: target.id().clone(),
                            path: render_path(&nodes, direction),
                            nodes,
                            direction,
                            influence_strength: belief.mean(),
                            state_influences: belief
                                .states
                                .iter()
                                .cloned()
                                .zip(belief.probabilities.iter().copied())
                                .collect(),
                        });
                    }
                }
            }
        }

        tracing::debug!(
            %direction,
            evidence = evidence.len(),
            messages = passing.messages.len(),
            traces = traces.len(),
            "belief propagation finished"
        );
        Ok(PropagationResult { beliefs, traces })
    }

    /// Every simple directed path from `source` to `target`. Forward follows
    /// parent → child edges, reverse follows child → parent edges.
    pub fn influence_paths(
        &self,
        source: &VariableId,
        target: &VariableId,
        direction: PropagationDirection,
    ) -> Vec<Vec<VariableId>> {
        let mut results = Vec::new();
        let mut stack: Vec<Vec<&VariableId>> = vec![vec![source]];

        while let Some(path) = stack.pop() {
            let Some(&current) = path.last() else {
                continue;
            };
            let next: Vec<&VariableId> = match direction {
                PropagationDirection::Forward => self.children(current.as_str()),
                PropagationDirection::Reverse => self
                    .variable(current.as_str())
                    .map(|v| v.parents().iter().collect())
                    .unwrap_or_default(),
            };
            // Pushed in reverse so paths pop out in id order.
            for step in next.into_iter().rev() {
                if path.contains(&step) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(step);
                if step == target {
                    results.push(extended.into_iter().cloned().collect());
                } else {
                    stack.push(extended);
                }
            }
        }

        results
    }
}

fn render_path(nodes: &[VariableId], direction: PropagationDirection) -> String {
    nodes
        .iter()
        .map(VariableId::as_str)
        .collect::<Vec<_>>()
        .join(direction.arrow())
}

// ============================================================================
// Message passing
// ============================================================================

#[derive(Debug, Clone)]
struct Message {
    values: Vec<f64>,
}

impl Message {
    fn ones(size: usize) -> Self {
        Self {
            values: vec![1.0; size],
        }
    }

    fn one_hot(size: usize, index: usize) -> Self {
        let mut values = vec![0.0; size];
        values[index] = 1.0;
        Self { values }
    }

    fn normalize(&mut self) {
        normalize_in_place(&mut self.values);
    }

    fn multiply(&mut self, other: &Message) {
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a *= b;
        }
    }

    /// Index of the largest value; ties go to the earlier index.
    fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &v) in self.values.iter().enumerate() {
            if v > self.values[best] {
                best = i;
            }
        }
        best
    }
}

struct MessagePassing<'g> {
    graph: &'g NetworkGraph,
    direction: PropagationDirection,
    observed: BTreeMap<&'g VariableId, usize>,
    messages: HashMap<(VariableId, VariableId), Message>,
}

impl<'g> MessagePassing<'g> {
    fn new(
        graph: &'g NetworkGraph,
        evidence: &Assignment,
        direction: PropagationDirection,
    ) -> Result<Self> {
        let mut observed = BTreeMap::new();
        for (id, state) in evidence {
            let variable = graph.require_variable(id.as_str())?;
            observed.insert(variable.id(), variable.require_state(state)?);
        }
        Ok(Self {
            graph,
            direction,
            observed,
            messages: HashMap::new(),
        })
    }

    fn run(&mut self) -> Result<()> {
        match self.direction {
            PropagationDirection::Forward => {
                self.upward_pass()?;
                self.downward_pass()
            }
            PropagationDirection::Reverse => {
                self.downward_pass()?;
                self.upward_pass()
            }
        }
    }

    /// Children to parents, in reverse topological order.
    fn upward_pass(&mut self) -> Result<()> {
        let graph = self.graph;
        for child_id in graph.topological_order().iter().rev() {
            let (Some(child), Some(cpt)) =
                (graph.variable(child_id.as_str()), graph.cpt(child_id.as_str()))
            else {
                continue;
            };
            let lambda = self.evidence_support(child);
            let base_fill = self.upward_fill(child)?;

            for (axis, parent_id) in child.parents().iter().enumerate() {
                if self.observed.contains_key(parent_id) {
                    continue;
                }
                let parent = graph.require_variable(parent_id.as_str())?;
                let mut fill = base_fill.clone();
                let mut message = Message::ones(parent.num_states());
                for (u, value) in message.values.iter_mut().enumerate() {
                    fill[axis] = u;
                    let row = cpt.distribution(&fill)?;
                    *value = row.iter().zip(&lambda.values).map(|(p, l)| p * l).sum();
                }
                message.normalize();
                self.messages
                    .insert((child_id.clone(), parent_id.clone()), message);
            }
        }
        Ok(())
    }

    /// Parents to children, in topological order.
    fn downward_pass(&mut self) -> Result<()> {
        let graph = self.graph;
        for parent_id in graph.topological_order() {
            let parent = graph.require_variable(parent_id.as_str())?;
            for child_id in graph.children(parent_id.as_str()) {
                if self.observed.contains_key(child_id) {
                    continue;
                }
                let (Some(child), Some(cpt)) =
                    (graph.variable(child_id.as_str()), graph.cpt(child_id.as_str()))
                else {
                    continue;
                };
                let Some(axis) = child.parents().iter().position(|p| p == parent_id) else {
                    continue;
                };

                let support = self.support(parent, Some(child_id))?;
                let mut fill = self.downward_fill(child)?;
                let mut message = Message {
                    values: vec![0.0; child.num_states()],
                };
                for (x, &weight) in support.values.iter().enumerate() {
                    if weight == 0.0 {
                        continue;
                    }
                    fill[axis] = x;
                    let row = cpt.distribution(&fill)?;
                    for (value, p) in message.values.iter_mut().zip(row) {
                        *value += p * weight;
                    }
                }
                message.normalize();
                self.messages
                    .insert((parent_id.clone(), child_id.clone()), message);
            }
        }
        Ok(())
    }

    /// Evidence indicator of `variable` times every message from its children.
    fn evidence_support(&self, variable: &Variable) -> Message {
        let id = variable.id();
        let mut lambda = match self.observed.get(id) {
            Some(&index) => Message::one_hot(variable.num_states(), index),
            None => Message::ones(variable.num_states()),
        };
        for child in self.graph.children(id.as_str()) {
            if let Some(incoming) = self.messages.get(&(child.clone(), id.clone())) {
                lambda.multiply(incoming);
            }
        }
        lambda
    }

    /// What `variable` currently believes about itself, as seen by
    /// `exclude` (whose own message is left out).
    ///
    /// Observed variables are one-hot. Otherwise: the prior for roots, times
    /// messages from parents, times (forward only) messages from children.
    fn support(&self, variable: &Variable, exclude: Option<&VariableId>) -> Result<Message> {
        let id = variable.id();
        if let Some(&index) = self.observed.get(id) {
            return Ok(Message::one_hot(variable.num_states(), index));
        }

        let mut support = self.prior(variable)?;
        for parent in variable.parents() {
            if let Some(incoming) = self.messages.get(&(parent.clone(), id.clone())) {
                support.multiply(incoming);
            }
        }
        if self.direction == PropagationDirection::Forward {
            for child in self.graph.children(id.as_str()) {
                if Some(child) == exclude {
                    continue;
                }
                if let Some(incoming) = self.messages.get(&(child.clone(), id.clone())) {
                    support.multiply(incoming);
                }
            }
        }
        support.normalize();
        Ok(support)
    }

    /// CPT prior for roots that have one, ones otherwise.
    fn prior(&self, variable: &Variable) -> Result<Message> {
        match self.graph.cpt(variable.id().as_str()) {
            Some(cpt) if variable.parents().is_empty() => Ok(Message {
                values: cpt.distribution(&[])?.to_vec(),
            }),
            _ => Ok(Message::ones(variable.num_states())),
        }
    }

    fn fixed_state(&self, parent: &VariableId) -> Option<usize> {
        self.observed.get(parent).copied()
    }

    fn upward_fill(&self, child: &Variable) -> Result<Vec<usize>> {
        child
            .parents()
            .iter()
            .map(|parent| match (self.fixed_state(parent), self.direction) {
                (Some(index), _) => Ok(index),
                (None, PropagationDirection::Forward) => Ok(0),
                (None, PropagationDirection::Reverse) => {
                    let variable = self.graph.require_variable(parent.as_str())?;
                    Ok(self.support(variable, None)?.argmax())
                }
            })
            .collect()
    }

    fn downward_fill(&self, child: &Variable) -> Result<Vec<usize>> {
        child
            .parents()
            .iter()
            .map(|parent| match self.fixed_state(parent) {
                Some(index) => Ok(index),
                None => {
                    let variable = self.graph.require_variable(parent.as_str())?;
                    Ok(self.support(variable, None)?.argmax())
                }
            })
            .collect()
    }

    fn beliefs(&self) -> Result<BTreeMap<VariableId, Belief>> {
        let mut beliefs = BTreeMap::new();
        for variable in self.graph.variables() {
            let id = variable.id();
            let size = variable.num_states();
            let probabilities = if let Some(&index) = self.observed.get(id) {
                Message::one_hot(size, index).values
            } else if self.graph.cpt(id.as_str()).is_none() {
                vec![0.0; size]
            } else {
                let mut belief = self.prior(variable)?;
                for parent in variable.parents() {
                    if let Some(incoming) = self.messages.get(&(parent.clone(), id.clone())) {
                        belief.multiply(incoming);
                    }
                }
                for child in self.graph.children(id.as_str()) {
                    if let Some(incoming) = self.messages.get(&(child.clone(), id.clone())) {
                        belief.multiply(incoming);
                    }
                }
                belief.normalize();
                belief.values
            };
            beliefs.insert(
                id.clone(),
                Belief {
                    states: variable.states().to_vec(),
                    probabilities,
                },
            );
        }
        Ok(beliefs)
    }
}

//! Discrete random variables.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{NetworkError, Result};

/// Stable identifier of a variable within one network.
///
/// Ordered so that every map keyed by it iterates deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableId(String);

impl VariableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for VariableId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VariableId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VariableId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for VariableId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&VariableId> for VariableId {
    fn from(id: &VariableId) -> Self {
        id.clone()
    }
}

/// Variable → state name. Used for evidence, parent states, joint
/// assignments and query result keys.
pub type Assignment = BTreeMap<VariableId, String>;

/// Build an [`Assignment`] from `(id, state)` pairs.
pub fn assignment<I, K, S>(pairs: I) -> Assignment
where
    I: IntoIterator<Item = (K, S)>,
    K: Into<VariableId>,
    S: Into<String>,
{
    pairs
        .into_iter()
        .map(|(id, state)| (id.into(), state.into()))
        .collect()
}

/// A node of the network: a finite, ordered state set plus its parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    id: VariableId,
    name: String,
    states: Vec<String>,
    parents: BTreeSet<VariableId>,
}

impl Variable {
    /// Create a parentless variable. State names must be non-empty and unique;
    /// their order is the canonical state order.
    pub fn new(id: VariableId, name: impl Into<String>, states: Vec<String>) -> Result<Self> {
        if states.is_empty() {
            return Err(NetworkError::EmptyStates { id });
        }
        let mut seen = BTreeSet::new();
        for state in &states {
            if !seen.insert(state.as_str()) {
                return Err(NetworkError::DuplicateState {
                    id,
                    state: state.clone(),
                });
            }
        }
        Ok(Self {
            id,
            name: name.into(),
            states,
            parents: BTreeSet::new(),
        })
    }

    pub fn id(&self) -> &VariableId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Parents in id order; this is also the order of the CPT's parent axes.
    pub fn parents(&self) -> &BTreeSet<VariableId> {
        &self.parents
    }

    pub fn has_parent(&self, id: &str) -> bool {
        self.parents.contains(id)
    }

    pub fn state_index(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.state_index(state).is_some()
    }

    /// Resolve a state name, reporting `InvalidState` for unknown names.
    pub fn require_state(&self, state: &str) -> Result<usize> {
        self.state_index(state)
            .ok_or_else(|| NetworkError::InvalidState {
                id: self.id.clone(),
                state: state.to_string(),
            })
    }

    pub(crate) fn insert_parent(&mut self, parent: VariableId) -> bool {
        self.parents.insert(parent)
    }

    pub(crate) fn remove_parent(&mut self, parent: &str) -> bool {
        self.parents.remove(parent)
    }
}

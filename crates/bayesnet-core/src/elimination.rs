//! Exact inference by enumeration.
//!
//! Each query assignment is scored by summing the full joint probability over
//! every assignment of the remaining (non-query, non-evidence) variables. No
//! elimination ordering or factor caching is attempted: the result is exact and
//! the cost is `O(∏|query states| · ∏|summed states| · |V|)`.

use std::collections::BTreeMap;

use crate::cpt::NORMALIZATION_EPSILON;
use crate::error::Result;
use crate::graph::NetworkGraph;
use crate::odometer::StateOdometer;
use crate::variable::{Assignment, Variable};

/// Posterior over query assignments. Keys carry exactly the (deduplicated)
/// query variables.
pub type Posterior = BTreeMap<Assignment, f64>;

impl NetworkGraph {
    /// P(query | evidence) for every joint assignment of the query variables.
    ///
    /// Unknown ids and unknown evidence states fail before any enumeration.
    /// An enumerated assignment that cannot be scored because a CPT or a state
    /// is missing contributes zero mass. If the total mass is at most
    /// [`NORMALIZATION_EPSILON`] (impossible evidence) every weight stays 0.
    pub fn variable_elimination<Q: AsRef<str>>(
        &self,
        query: &[Q],
        evidence: &Assignment,
    ) -> Result<Posterior> {
        let query_vars = self.resolve_query(query)?;
        self.validate_evidence(evidence)?;

        let sum_vars: Vec<&Variable> = self
            .variables()
            .filter(|v| !evidence.contains_key(v.id()))
            .filter(|v| !query_vars.iter().any(|q| q.id() == v.id()))
            .collect();

        let mut posterior = Posterior::new();
        let mut skipped = 0usize;
        for query_digits in StateOdometer::new(radices(&query_vars)) {
            let query_assignment = bind(&query_vars, &query_digits);
            let contradicts = query_assignment
                .iter()
                .any(|(id, state)| evidence.get(id).is_some_and(|observed| observed != state));
            if contradicts {
                posterior.insert(query_assignment, 0.0);
                continue;
            }

            let mut base = evidence.clone();
            base.extend(query_assignment.iter().map(|(k, v)| (k.clone(), v.clone())));

            let mut weight = 0.0;
            for sum_digits in StateOdometer::new(radices(&sum_vars)) {
                let mut complete = base.clone();
                complete.extend(bind(&sum_vars, &sum_digits));
                match self.compute_joint_probability(&complete) {
                    Ok(p) => weight += p,
                    Err(err) if err.is_assignment_gap() => {
                        skipped += 1;
                        tracing::trace!(error = %err, "assignment contributes no mass");
                    }
                    Err(err) => return Err(err),
                }
            }
            posterior.insert(query_assignment, weight);
        }

        let total: f64 = posterior.values().sum();
        if total > NORMALIZATION_EPSILON {
            for weight in posterior.values_mut() {
                *weight /= total;
            }
        }
        tracing::debug!(
            query = query_vars.len(),
            evidence = evidence.len(),
            summed = sum_vars.len(),
            skipped,
            total,
            "variable elimination finished"
        );
        Ok(posterior)
    }
}

fn radices(vars: &[&Variable]) -> Vec<usize> {
    vars.iter().map(|v| v.num_states()).collect()
}

fn bind(vars: &[&Variable], digits: &[usize]) -> Assignment {
    vars.iter()
        .zip(digits)
        .map(|(v, &d)| (v.id().clone(), v.states()[d].clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpt::ConditionalProbabilityTable;
    use crate::error::NetworkError;
    use crate::variable::assignment;
    use approx::assert_relative_eq;

    fn sprinkler() -> NetworkGraph {
        let mut graph = NetworkGraph::new();
        graph.add_variable("Rain", "Rain", ["F", "T"]).unwrap();
        graph.add_variable("Grass", "Wet grass", ["Dry", "Wet"]).unwrap();
        graph.add_edge("Rain", "Grass").unwrap();
        graph
            .set_cpt(
                "Rain",
                ConditionalProbabilityTable::from_table(vec![2], vec![0.8, 0.2]).unwrap(),
            )
            .unwrap();
        graph
            .set_cpt(
                "Grass",
                ConditionalProbabilityTable::from_table(vec![2, 2], vec![0.9, 0.1, 0.1, 0.9])
                    .unwrap(),
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_prior_marginal() {
        let graph = sprinkler();
        let posterior = graph.variable_elimination(&["Grass"], &Assignment::new()).unwrap();
        assert_eq!(posterior.len(), 2);
        // 0.8 * 0.1 + 0.2 * 0.9
        assert_relative_eq!(
            posterior[&assignment([("Grass", "Wet")])],
            0.26,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_diagnostic_query() {
        let graph = sprinkler();
        let posterior = graph
            .variable_elimination(&["Rain"], &assignment([("Grass", "Wet")]))
            .unwrap();
        assert_relative_eq!(
            posterior[&assignment([("Rain", "T")])],
            0.18 / 0.26,
            epsilon = 1e-12
        );
        assert_relative_eq!(posterior.values().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_joint_query_keys_and_duplicates() {
        let graph = sprinkler();
        let posterior = graph
            .variable_elimination(&["Rain", "Grass", "Rain"], &Assignment::new())
            .unwrap();
        assert_eq!(posterior.len(), 4);
        assert!(posterior.keys().all(|k| k.len() == 2));
        assert_relative_eq!(
            posterior[&assignment([("Rain", "T"), ("Grass", "Wet")])],
            0.18,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_observed_query_variable() {
        let graph = sprinkler();
        let posterior = graph
            .variable_elimination(&["Rain"], &assignment([("Rain", "T")]))
            .unwrap();
        assert_eq!(posterior[&assignment([("Rain", "F")])], 0.0);
        assert_relative_eq!(posterior[&assignment([("Rain", "T")])], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_ids_fail_fast() {
        let graph = sprinkler();
        assert!(matches!(
            graph.variable_elimination(&["Snow"], &Assignment::new()),
            Err(NetworkError::UnknownVariable { .. })
        ));
        assert!(matches!(
            graph.variable_elimination(&["Rain"], &assignment([("Snow", "T")])),
            Err(NetworkError::UnknownVariable { .. })
        ));
        assert!(matches!(
            graph.variable_elimination(&["Rain"], &assignment([("Grass", "Muddy")])),
            Err(NetworkError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_missing_cpt_degrades_to_zero() {
        let mut graph = NetworkGraph::new();
        graph.add_variable("A", "A", ["F", "T"]).unwrap();
        graph.add_variable("B", "B", ["F", "T"]).unwrap();
        graph.add_edge("A", "B").unwrap();
        let posterior = graph.variable_elimination(&["A"], &Assignment::new()).unwrap();
        assert!(posterior.values().all(|&p| p == 0.0));
    }

    #[test]
    fn test_impossible_evidence_is_all_zero() {
        let mut graph = NetworkGraph::new();
        graph.add_variable("A", "A", ["F", "T"]).unwrap();
        graph.add_variable("B", "B", ["F", "T"]).unwrap();
        graph.add_edge("A", "B").unwrap();
        graph
            .set_cpt("A", ConditionalProbabilityTable::from_table(vec![2], vec![1.0, 0.0]).unwrap())
            .unwrap();
        graph
            .set_cpt(
                "B",
                ConditionalProbabilityTable::from_table(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0])
                    .unwrap(),
            )
            .unwrap();
        let posterior = graph
            .variable_elimination(&["A"], &assignment([("B", "T")]))
            .unwrap();
        assert!(posterior.values().all(|&p| p == 0.0));
    }
}

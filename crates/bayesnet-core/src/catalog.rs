//! Well-known small networks, used by the command-line demos and the tests.

use crate::cpt::ConditionalProbabilityTable;
use crate::error::Result;
use crate::graph::NetworkGraph;

/// Names accepted by [`by_name`].
pub const NAMES: [&str; 3] = ["medical", "alarm", "chain"];

pub fn by_name(name: &str) -> Option<Result<NetworkGraph>> {
    match name {
        "medical" => Some(medical_diagnosis()),
        "alarm" => Some(alarm()),
        "chain" => Some(chain()),
        _ => None,
    }
}

/// `Disease -> Symptom1 (Fever)`, `Disease -> Symptom2 (Cough)`.
pub fn medical_diagnosis() -> Result<NetworkGraph> {
    let mut graph = NetworkGraph::new();
    graph.add_variable("Disease", "Disease", ["None", "Cold", "Flu"])?;
    graph.add_variable("Symptom1", "Fever", ["No", "Yes"])?;
    graph.add_variable("Symptom2", "Cough", ["No", "Yes"])?;
    graph.add_edge("Disease", "Symptom1")?;
    graph.add_edge("Disease", "Symptom2")?;

    graph.set_cpt(
        "Disease",
        ConditionalProbabilityTable::from_table(vec![3], vec![0.7, 0.2, 0.1])?,
    )?;
    graph.set_cpt(
        "Symptom1",
        ConditionalProbabilityTable::from_table(vec![3, 2], vec![0.9, 0.1, 0.7, 0.3, 0.2, 0.8])?,
    )?;
    graph.set_cpt(
        "Symptom2",
        ConditionalProbabilityTable::from_table(
            vec![3, 2],
            vec![0.95, 0.05, 0.3, 0.7, 0.4, 0.6],
        )?,
    )?;
    Ok(graph)
}

/// Pearl's burglary alarm: `Burglary, Earthquake -> Alarm -> JohnCalls, MaryCalls`.
pub fn alarm() -> Result<NetworkGraph> {
    let mut graph = NetworkGraph::new();
    for id in ["Burglary", "Earthquake", "Alarm", "JohnCalls", "MaryCalls"] {
        graph.add_variable(id, id, ["False", "True"])?;
    }
    graph.add_edge("Burglary", "Alarm")?;
    graph.add_edge("Earthquake", "Alarm")?;
    graph.add_edge("Alarm", "JohnCalls")?;
    graph.add_edge("Alarm", "MaryCalls")?;

    graph.set_cpt(
        "Burglary",
        ConditionalProbabilityTable::from_table(vec![2], vec![0.999, 0.001])?,
    )?;
    graph.set_cpt(
        "Earthquake",
        ConditionalProbabilityTable::from_table(vec![2], vec![0.998, 0.002])?,
    )?;
    // Parent axes are (Burglary, Earthquake).
    graph.set_cpt(
        "Alarm",
        ConditionalProbabilityTable::from_table(
            vec![2, 2, 2],
            vec![0.999, 0.001, 0.71, 0.29, 0.06, 0.94, 0.05, 0.95],
        )?,
    )?;
    graph.set_cpt(
        "JohnCalls",
        ConditionalProbabilityTable::from_table(vec![2, 2], vec![0.95, 0.05, 0.1, 0.9])?,
    )?;
    graph.set_cpt(
        "MaryCalls",
        ConditionalProbabilityTable::from_table(vec![2, 2], vec![0.99, 0.01, 0.3, 0.7])?,
    )?;
    Ok(graph)
}

/// `A (Cause) -> B (Intermediate) -> C (Effect)`.
pub fn chain() -> Result<NetworkGraph> {
    let mut graph = NetworkGraph::new();
    graph.add_variable("A", "Cause", ["False", "True"])?;
    graph.add_variable("B", "Intermediate", ["Low", "High"])?;
    graph.add_variable("C", "Effect", ["Negative", "Positive"])?;
    graph.add_edge("A", "B")?;
    graph.add_edge("B", "C")?;

    graph.set_cpt("A", ConditionalProbabilityTable::from_table(vec![2], vec![0.7, 0.3])?)?;
    graph.set_cpt(
        "B",
        ConditionalProbabilityTable::from_table(vec![2, 2], vec![0.8, 0.2, 0.3, 0.7])?,
    )?;
    graph.set_cpt(
        "C",
        ConditionalProbabilityTable::from_table(vec![2, 2], vec![0.9, 0.1, 0.2, 0.8])?,
    )?;
    Ok(graph)
}

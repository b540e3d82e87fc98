//! Text and JSON rendering of query results.

use anyhow::Result;
use bayesnet_core::{
    Assignment, NetworkGraph, Posterior, PropagationResult, VariableId, NORMALIZATION_EPSILON,
};
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write as _;

use crate::config::CliConfig;

const PRECISION: usize = 4;

fn render_assignment(assignment: &Assignment) -> String {
    assignment
        .iter()
        .map(|(id, state)| format!("{id}={state}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn probability(p: f64) -> String {
    format!("{p:.prec$}", prec = PRECISION)
}

// ============================================================================
// Posterior (variable elimination)
// ============================================================================

#[derive(Serialize)]
struct PosteriorEntry<'a> {
    assignment: &'a Assignment,
    probability: f64,
}

#[derive(Serialize)]
struct PosteriorReport<'a> {
    method: &'static str,
    evidence: &'a Assignment,
    degenerate: bool,
    results: Vec<PosteriorEntry<'a>>,
}

pub fn is_degenerate(posterior: &Posterior) -> bool {
    posterior.values().sum::<f64>() <= NORMALIZATION_EPSILON
}

pub fn posterior(config: &CliConfig, evidence: &Assignment, posterior: &Posterior) -> Result<String> {
    if config.is_json() {
        let report = PosteriorReport {
            method: "variable-elimination",
            evidence,
            degenerate: is_degenerate(posterior),
            results: posterior
                .iter()
                .map(|(assignment, &probability)| PosteriorEntry {
                    assignment,
                    probability,
                })
                .collect(),
        };
        return Ok(serde_json::to_string_pretty(&report)?);
    }

    let mut out = String::new();
    writeln!(out, "{}", "Results:".bold())?;
    for (assignment, &p) in posterior {
        writeln!(
            out,
            "  P({}) = {}",
            render_assignment(assignment),
            probability(p).cyan()
        )?;
    }
    Ok(out)
}

// ============================================================================
// Message passing
// ============================================================================

pub fn propagation(
    config: &CliConfig,
    query: &[VariableId],
    result: &PropagationResult,
) -> Result<String> {
    if config.is_json() {
        return Ok(serde_json::to_string_pretty(result)?);
    }

    let mut out = String::new();
    writeln!(out, "{}", "Beliefs:".bold())?;
    for (id, belief) in &result.beliefs {
        let label = if query.contains(id) {
            id.as_str().bold().to_string()
        } else {
            id.to_string()
        };
        writeln!(out, "  {label}:")?;
        if belief.is_degenerate() {
            writeln!(out, "    {}", "(no distribution: CPT missing)".yellow())?;
            continue;
        }
        for (state, &p) in belief.states.iter().zip(&belief.probabilities) {
            writeln!(out, "    P({id}={state}) = {}", probability(p).cyan())?;
        }
    }

    if !result.traces.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", "Influence traces:".bold())?;
        for trace in &result.traces {
            writeln!(out, "  {} -> {}", trace.source, trace.target)?;
            writeln!(out, "    path: {}", trace.path)?;
            writeln!(
                out,
                "    strength: {}",
                probability(trace.influence_strength)
            )?;
            for (state, p) in &trace.state_influences {
                writeln!(out, "    {state}: {}", probability(*p))?;
            }
        }
    }
    Ok(out)
}

// ============================================================================
// Joint probability
// ============================================================================

#[derive(Serialize)]
struct JointReport<'a> {
    assignment: &'a Assignment,
    probability: f64,
}

pub fn joint(config: &CliConfig, assignment: &Assignment, p: f64) -> Result<String> {
    if config.is_json() {
        return Ok(serde_json::to_string_pretty(&JointReport {
            assignment,
            probability: p,
        })?);
    }
    Ok(format!(
        "P({}) = {}\n",
        render_assignment(assignment),
        probability(p).cyan()
    ))
}

// ============================================================================
// Inspection
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CptStatus {
    Valid,
    Unnormalized,
    Missing,
}

impl CptStatus {
    fn of(graph: &NetworkGraph, id: &str) -> Self {
        match graph.cpt(id) {
            Some(cpt) if cpt.is_valid() => CptStatus::Valid,
            Some(_) => CptStatus::Unnormalized,
            None => CptStatus::Missing,
        }
    }

    fn label(&self) -> String {
        match self {
            CptStatus::Valid => "valid".green().to_string(),
            CptStatus::Unnormalized => "unnormalized".yellow().to_string(),
            CptStatus::Missing => "missing".red().to_string(),
        }
    }
}

#[derive(Serialize)]
struct VariableReport<'a> {
    id: &'a VariableId,
    name: &'a str,
    states: &'a [String],
    parents: Vec<&'a VariableId>,
    children: Vec<&'a VariableId>,
    cpt: CptStatus,
}

#[derive(Serialize)]
struct InspectReport<'a> {
    variables: Vec<VariableReport<'a>>,
    edges: Vec<(VariableId, VariableId)>,
    topological_order: &'a [VariableId],
}

pub fn inspect(config: &CliConfig, graph: &NetworkGraph) -> Result<String> {
    let report = InspectReport {
        variables: graph
            .variables()
            .map(|v| VariableReport {
                id: v.id(),
                name: v.name(),
                states: v.states(),
                parents: v.parents().iter().collect(),
                children: graph.children(v.id().as_str()),
                cpt: CptStatus::of(graph, v.id().as_str()),
            })
            .collect(),
        edges: graph.edges(),
        topological_order: graph.topological_order(),
    };
    if config.is_json() {
        return Ok(serde_json::to_string_pretty(&report)?);
    }

    let mut out = String::new();
    writeln!(out, "{}", format!("Variables ({}):", report.variables.len()).bold())?;
    for v in &report.variables {
        let parents = if v.parents.is_empty() {
            "-".to_string()
        } else {
            join_ids(&v.parents)
        };
        writeln!(
            out,
            "  {} ({}) [{}] parents: {} cpt: {}",
            v.id,
            v.name,
            v.states.join(", "),
            parents,
            v.cpt.label()
        )?;
    }
    writeln!(out, "{}", format!("Edges ({}):", report.edges.len()).bold())?;
    for (parent, child) in &report.edges {
        writeln!(out, "  {parent} -> {child}")?;
    }
    let order: Vec<&VariableId> = report.topological_order.iter().collect();
    writeln!(out, "{} {}", "Topological order:".bold(), join_ids(&order))?;
    Ok(out)
}

fn join_ids(ids: &[&VariableId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bayesnet_core::{assignment, catalog};

    fn plain() -> CliConfig {
        CliConfig::from_parts(false, true, 0, None)
    }

    fn json() -> CliConfig {
        CliConfig::from_parts(true, false, 0, None)
    }

    #[test]
    fn test_posterior_text() {
        colored::control::set_override(false);
        let graph = catalog::chain().unwrap();
        let evidence = assignment([("C", "Positive")]);
        let posterior = graph.variable_elimination(&["A"], &evidence).unwrap();
        let text = super::posterior(&plain(), &evidence, &posterior).unwrap();
        assert!(text.contains("P(A=True) = 0.5130"), "{text}");
        assert!(text.contains("P(A=False) = 0.4870"), "{text}");
    }

    #[test]
    fn test_posterior_json() {
        let graph = catalog::medical_diagnosis().unwrap();
        let evidence = assignment([("Symptom1", "Yes")]);
        let posterior = graph.variable_elimination(&["Disease"], &evidence).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&super::posterior(&json(), &evidence, &posterior).unwrap())
                .unwrap();
        assert_eq!(value["method"], "variable-elimination");
        assert_eq!(value["degenerate"], false);
        assert_eq!(value["results"].as_array().unwrap().len(), 3);
        assert_eq!(value["evidence"]["Symptom1"], "Yes");
    }

    #[test]
    fn test_inspect_reports_missing_cpt() {
        colored::control::set_override(false);
        let mut graph = catalog::chain().unwrap();
        graph.add_variable("D", "Extra", ["x", "y"]).unwrap();
        graph.add_edge("C", "D").unwrap();

        let text = inspect(&plain(), &graph).unwrap();
        assert!(text.contains("Variables (4):"));
        assert!(text.contains("D (Extra) [x, y] parents: C cpt: missing"), "{text}");
        assert!(text.contains("Topological order: A, B, C, D"));

        let value: serde_json::Value =
            serde_json::from_str(&inspect(&json(), &graph).unwrap()).unwrap();
        assert_eq!(value["variables"][3]["cpt"], "missing");
        assert_eq!(value["variables"][0]["cpt"], "valid");
    }
}

//! Saving and loading networks.
//!
//! Two encodings are supported:
//!
//! - a line-oriented text format with `NODES`, `EDGES` and `CPTS` sections:
//!
//!   ```text
//!   # bayesnet network v1
//!   NODES
//!   <id> <name> <state-count> <state>...
//!   EDGES
//!   <parent> -> <child>
//!   CPTS
//!   <id>
//!   <dim-count> <dim>...
//!   <p> <p> ...   (one line per parent configuration, row-major)
//!   ```
//!
//! - a JSON [`NetworkDocument`].
//!
//! Both are lossless: text values use the shortest `f64` rendering that parses
//! back to the same bits. Loading replays `add_variable`, `add_edge` and
//! `set_cpt`, so a loaded graph satisfies every invariant a built one does.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpt::{table_size, ConditionalProbabilityTable};
use crate::error::NetworkError;
use crate::graph::NetworkGraph;
use crate::variable::VariableId;

pub const TEXT_HEADER: &str = "# bayesnet network v1";

const SECTION_NODES: &str = "NODES";
const SECTION_EDGES: &str = "EDGES";
const SECTION_CPTS: &str = "CPTS";
const EDGE_ARROW: &str = "->";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("parse error on line {line}: {message}")]
    Line { line: usize, message: String },

    #[error("cannot write {what} `{token}`: tokens must be non-empty, without whitespace or `#`, and not a section name")]
    Unrepresentable { what: &'static str, token: String },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk encoding, chosen from the file extension by
/// [`NetworkFormat::from_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFormat {
    Text,
    Json,
}

impl NetworkFormat {
    /// `.json` selects JSON; anything else is the text format.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => NetworkFormat::Json,
            _ => NetworkFormat::Text,
        }
    }
}

pub fn save_to_file(graph: &NetworkGraph, path: impl AsRef<Path>) -> Result<(), FormatError> {
    let path = path.as_ref();
    let contents = match NetworkFormat::from_path(path) {
        NetworkFormat::Text => to_text(graph)?,
        NetworkFormat::Json => to_json(graph)?,
    };
    fs::write(path, contents)?;
    tracing::debug!(path = %path.display(), variables = graph.len(), "saved network");
    Ok(())
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<NetworkGraph, FormatError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let graph = match NetworkFormat::from_path(path) {
        NetworkFormat::Text => from_text(&contents)?,
        NetworkFormat::Json => from_json(&contents)?,
    };
    tracing::debug!(path = %path.display(), variables = graph.len(), "loaded network");
    Ok(graph)
}

// ============================================================================
// Text format: writer
// ============================================================================

pub fn to_text(graph: &NetworkGraph) -> Result<String, FormatError> {
    let mut out = String::new();
    out.push_str(TEXT_HEADER);
    out.push_str("\n\n");

    out.push_str(SECTION_NODES);
    out.push('\n');
    for variable in graph.variables() {
        let id = token("variable id", variable.id().as_str())?;
        let name = token("variable name", variable.name())?;
        out.push_str(&format!("{id} {name} {}", variable.num_states()));
        for state in variable.states() {
            out.push(' ');
            out.push_str(token("state name", state)?);
        }
        out.push('\n');
    }

    out.push('\n');
    out.push_str(SECTION_EDGES);
    out.push('\n');
    for (parent, child) in graph.edges() {
        out.push_str(&format!("{parent} {EDGE_ARROW} {child}\n"));
    }

    out.push('\n');
    out.push_str(SECTION_CPTS);
    out.push('\n');
    for id in graph.variable_ids() {
        let Some(cpt) = graph.cpt(id.as_str()) else {
            continue;
        };
        out.push_str(id.as_str());
        out.push('\n');
        out.push_str(&cpt.dimensions().len().to_string());
        for dim in cpt.dimensions() {
            out.push_str(&format!(" {dim}"));
        }
        out.push('\n');
        for row in cpt.values().chunks(cpt.num_states()) {
            let rendered: Vec<String> = row.iter().map(f64::to_string).collect();
            out.push_str(&rendered.join(" "));
            out.push('\n');
        }
    }

    Ok(out)
}

fn token<'a>(what: &'static str, value: &'a str) -> Result<&'a str, FormatError> {
    let representable = !value.is_empty()
        && !value.contains(|c: char| c.is_whitespace() || c == '#')
        && ![SECTION_NODES, SECTION_EDGES, SECTION_CPTS].contains(&value);
    if representable {
        Ok(value)
    } else {
        Err(FormatError::Unrepresentable {
            what,
            token: value.to_string(),
        })
    }
}

// ============================================================================
// Text format: parser
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Nodes,
    Edges,
    Cpts,
}

/// Progress through one CPT block of the `CPTS` section.
#[derive(Debug)]
enum CptBlock {
    ExpectId,
    ExpectDimensions {
        id: String,
    },
    Rows {
        id: String,
        dimensions: Vec<usize>,
        values: Vec<f64>,
        remaining: usize,
    },
}

pub fn from_text(text: &str) -> Result<NetworkGraph, FormatError> {
    let mut graph = NetworkGraph::new();
    let mut section = Section::None;
    let mut block = CptBlock::ExpectId;
    let mut last_line = 0usize;

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        last_line = line_no;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let at_line = |message: String| FormatError::Line {
            line: line_no,
            message,
        };

        // --------------------------------------------------------------------
        // Section headers
        // --------------------------------------------------------------------
        let header = match line {
            SECTION_NODES => Some(Section::Nodes),
            SECTION_EDGES => Some(Section::Edges),
            SECTION_CPTS => Some(Section::Cpts),
            _ => None,
        };
        if let Some(next) = header {
            if let CptBlock::ExpectDimensions { id } | CptBlock::Rows { id, .. } = &block {
                return Err(at_line(format!("CPT for `{id}` is incomplete")));
            }
            section = next;
            continue;
        }

        // --------------------------------------------------------------------
        // Section bodies
        // --------------------------------------------------------------------
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match section {
            Section::None => {
                return Err(at_line(format!(
                    "expected a section header ({SECTION_NODES}, {SECTION_EDGES}, {SECTION_CPTS})"
                )));
            }
            Section::Nodes => {
                let [id, name, count, states @ ..] = tokens.as_slice() else {
                    return Err(at_line("expected `<id> <name> <state-count> <state>...`".into()));
                };
                let count: usize = count
                    .parse()
                    .map_err(|_| at_line(format!("invalid state count `{count}`")))?;
                if count != states.len() {
                    return Err(at_line(format!(
                        "declared {count} states but listed {}",
                        states.len()
                    )));
                }
                graph
                    .add_variable(*id, *name, states.iter().copied())
                    .map_err(|err| at_line(err.to_string()))?;
            }
            Section::Edges => {
                let [parent, arrow, child] = tokens.as_slice() else {
                    return Err(at_line("expected `<parent> -> <child>`".into()));
                };
                if *arrow != EDGE_ARROW {
                    return Err(at_line(format!("expected `{EDGE_ARROW}`, found `{arrow}`")));
                }
                graph
                    .add_edge(*parent, *child)
                    .map_err(|err| at_line(err.to_string()))?;
            }
            Section::Cpts => {
                block = match block {
                    CptBlock::ExpectId => {
                        let [id] = tokens.as_slice() else {
                            return Err(at_line("expected a variable id".into()));
                        };
                        CptBlock::ExpectDimensions { id: id.to_string() }
                    }
                    CptBlock::ExpectDimensions { id } => {
                        let dimensions = parse_dimensions(&tokens).map_err(at_line)?;
                        // Rows are collected as they are read; the declared
                        // shape only bounds how many are expected.
                        let configurations = table_size(&dimensions)
                            .ok()
                            .and_then(|size| dimensions.last().map(|&own| size / own))
                            .ok_or_else(|| {
                                at_line(format!("invalid CPT shape {dimensions:?} for `{id}`"))
                            })?;
                        CptBlock::Rows {
                            id,
                            values: Vec::new(),
                            dimensions,
                            remaining: configurations,
                        }
                    }
                    CptBlock::Rows {
                        id,
                        dimensions,
                        mut values,
                        remaining,
                    } => {
                        let own = dimensions.last().copied().unwrap_or(0);
                        if tokens.len() != own {
                            return Err(at_line(format!(
                                "expected {own} probabilities for `{id}`, got {}",
                                tokens.len()
                            )));
                        }
                        for value in &tokens {
                            values.push(
                                value
                                    .parse::<f64>()
                                    .map_err(|_| at_line(format!("invalid probability `{value}`")))?,
                            );
                        }
                        if remaining > 1 {
                            CptBlock::Rows {
                                id,
                                dimensions,
                                values,
                                remaining: remaining - 1,
                            }
                        } else {
                            let cpt = ConditionalProbabilityTable::from_table(dimensions, values)
                                .map_err(|err| at_line(err.to_string()))?;
                            graph
                                .set_cpt(&id, cpt)
                                .map_err(|err| at_line(err.to_string()))?;
                            CptBlock::ExpectId
                        }
                    }
                };
            }
        }
    }

    if let CptBlock::ExpectDimensions { id } | CptBlock::Rows { id, .. } = &block {
        return Err(FormatError::Line {
            line: last_line,
            message: format!("unexpected end of input: CPT for `{id}` is incomplete"),
        });
    }
    Ok(graph)
}

fn parse_dimensions(tokens: &[&str]) -> Result<Vec<usize>, String> {
    let mut numbers = Vec::with_capacity(tokens.len());
    for token in tokens {
        numbers.push(
            token
                .parse::<usize>()
                .map_err(|_| format!("invalid dimension `{token}`"))?,
        );
    }
    let Some((&count, dimensions)) = numbers.split_first() else {
        return Err("expected `<dim-count> <dim>...`".to_string());
    };
    if count != dimensions.len() {
        return Err(format!(
            "declared {count} dimensions but listed {}",
            dimensions.len()
        ));
    }
    Ok(dimensions.to_vec())
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

// ============================================================================
// JSON document
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDocument {
    pub id: VariableId,
    pub name: String,
    pub states: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDocument {
    pub parent: VariableId,
    pub child: VariableId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CptDocument {
    pub variable: VariableId,
    pub dimensions: Vec<usize>,
    /// Flat row-major table.
    pub values: Vec<f64>,
}

/// Serializable snapshot of a network.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkDocument {
    pub variables: Vec<VariableDocument>,
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
    #[serde(default)]
    pub cpts: Vec<CptDocument>,
}

impl NetworkDocument {
    pub fn from_graph(graph: &NetworkGraph) -> Self {
        let variables = graph
            .variables()
            .map(|v| VariableDocument {
                id: v.id().clone(),
                name: v.name().to_string(),
                states: v.states().to_vec(),
            })
            .collect();
        let edges = graph
            .edges()
            .into_iter()
            .map(|(parent, child)| EdgeDocument { parent, child })
            .collect();
        let cpts = graph
            .variable_ids()
            .filter_map(|id| {
                graph.cpt(id.as_str()).map(|cpt| CptDocument {
                    variable: id.clone(),
                    dimensions: cpt.dimensions().to_vec(),
                    values: cpt.values().to_vec(),
                })
            })
            .collect();
        Self {
            variables,
            edges,
            cpts,
        }
    }

    /// Rebuild the graph through the construction API.
    pub fn into_graph(self) -> Result<NetworkGraph, NetworkError> {
        let mut graph = NetworkGraph::new();
        for variable in self.variables {
            graph.add_variable(variable.id, variable.name, variable.states)?;
        }
        for edge in self.edges {
            graph.add_edge(edge.parent, edge.child)?;
        }
        for cpt in self.cpts {
            let table = ConditionalProbabilityTable::from_table(cpt.dimensions, cpt.values)?;
            graph.set_cpt(cpt.variable.as_str(), table)?;
        }
        Ok(graph)
    }
}

pub fn to_json(graph: &NetworkGraph) -> Result<String, FormatError> {
    Ok(serde_json::to_string_pretty(&NetworkDocument::from_graph(graph))?)
}

pub fn from_json(text: &str) -> Result<NetworkGraph, FormatError> {
    let document: NetworkDocument = serde_json::from_str(text)?;
    Ok(document.into_graph()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NetworkGraph {
        let mut graph = NetworkGraph::new();
        graph.add_variable("Disease", "Disease", ["None", "Cold", "Flu"]).unwrap();
        graph.add_variable("Fever", "Fever", ["No", "Yes"]).unwrap();
        graph.add_variable("Orphan", "Orphan", ["x"]).unwrap();
        graph.add_edge("Disease", "Fever").unwrap();
        graph
            .set_cpt(
                "Disease",
                ConditionalProbabilityTable::from_table(vec![3], vec![0.7, 0.2, 0.1]).unwrap(),
            )
            .unwrap();
        graph
            .set_cpt(
                "Fever",
                ConditionalProbabilityTable::from_table(
                    vec![3, 2],
                    vec![0.9, 0.1, 0.7, 0.3, 0.2, 0.8],
                )
                .unwrap(),
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_text_layout() {
        let text = to_text(&sample()).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(
            lines,
            vec![
                TEXT_HEADER,
                "NODES",
                "Disease Disease 3 None Cold Flu",
                "Fever Fever 2 No Yes",
                "Orphan Orphan 1 x",
                "EDGES",
                "Disease -> Fever",
                "CPTS",
                "Disease",
                "1 3",
                "0.7 0.2 0.1",
                "Fever",
                "2 3 2",
                "0.9 0.1",
                "0.7 0.3",
                "0.2 0.8",
            ]
        );
    }

    #[test]
    fn test_text_round_trip_is_exact() {
        let mut graph = sample();
        graph
            .set_cpt(
                "Disease",
                ConditionalProbabilityTable::from_table(
                    vec![3],
                    vec![1.0 / 3.0, 1.0 / 7.0, 1.0 - 1.0 / 3.0 - 1.0 / 7.0],
                )
                .unwrap(),
            )
            .unwrap();
        let loaded = from_text(&to_text(&graph).unwrap()).unwrap();
        assert_eq!(loaded, graph);
    }

    #[test]
    fn test_json_round_trip() {
        let graph = sample();
        let loaded = from_json(&to_json(&graph).unwrap()).unwrap();
        assert_eq!(loaded, graph);
    }

    #[test]
    fn test_file_format_follows_extension() {
        let dir = tempfile::tempdir().unwrap();
        let graph = sample();
        for name in ["net.bn", "net.json"] {
            let path = dir.path().join(name);
            save_to_file(&graph, &path).unwrap();
            assert_eq!(load_from_file(&path).unwrap(), graph);
        }
        let json = fs::read_to_string(dir.path().join("net.json")).unwrap();
        assert!(json.trim_start().starts_with('{'));
    }

    #[test]
    fn test_unrepresentable_tokens() {
        let mut graph = NetworkGraph::new();
        graph.add_variable("W", "Wet grass", ["Dry", "Wet"]).unwrap();
        assert!(matches!(
            to_text(&graph),
            Err(FormatError::Unrepresentable { token, .. }) if token == "Wet grass"
        ));
        // JSON has no such restriction.
        assert!(to_json(&graph).is_ok());
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let cases = [
            ("A A 2 F T\n", 1),
            ("NODES\nA A 3 F T\n", 2),
            ("NODES\nA A 2 F T\nEDGES\nA => A\n", 4),
            ("NODES\nA A 2 F T\nEDGES\nA -> A\n", 4),
            ("NODES\nA A 2 F T\nCPTS\nA\n1 2\n0.5 oops\n", 6),
            ("NODES\nA A 2 F T\nCPTS\nA\n1 2\n0.5 1.5\n", 6),
            ("NODES\nA A 2 F T\nCPTS\nA\n2 2\n", 5),
            ("NODES\nA A 2 F T\nCPTS\nA\n1 3\n0.2 0.3 0.5\n", 6),
            ("NODES\nA A 2 F T\nCPTS\nA\n1 2\n", 5),
        ];
        for (text, expected) in cases {
            match from_text(text) {
                Err(FormatError::Line { line, .. }) => {
                    assert_eq!(line, expected, "wrong line for {text:?}")
                }
                other => panic!("expected a line error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_oversized_cpt_shapes_are_rejected() {
        // Huge but representable: rejected once the input runs out of rows.
        match from_text("NODES\nA A 2 F T\nCPTS\nA\n2 1000000000000 2\n0.5 0.5\n") {
            Err(FormatError::Line { line, message }) => {
                assert_eq!(line, 6);
                assert!(message.contains("incomplete"), "{message}");
            }
            other => panic!("expected a line error, got {other:?}"),
        }

        // Size overflows usize.
        match from_text("NODES\nA A 2 F T\nCPTS\nA\n3 4294967296 4294967296 2\n0.5 0.5\n") {
            Err(FormatError::Line { line, message }) => {
                assert_eq!(line, 5);
                assert!(message.contains("invalid CPT shape"), "{message}");
            }
            other => panic!("expected a line error, got {other:?}"),
        }

        let json = r#"{
            "variables": [{"id": "A", "name": "A", "states": ["F", "T"]}],
            "cpts": [{"variable": "A", "dimensions": [1000000000000, 2], "values": [0.5, 0.5]}]
        }"#;
        assert!(matches!(
            from_json(json),
            Err(FormatError::Network(NetworkError::IndexError(_)))
        ));
    }

    #[test]
    fn test_comments_and_blank_lines_are_ignored() {
        let text = "# hand written\n\nNODES\nA A 2 F T # binary\n\nCPTS\nA\n1 2\n0.25 0.75\n";
        let graph = from_text(text).unwrap();
        assert_eq!(
            graph.cpt("A").unwrap().values(),
            &[0.25, 0.75]
        );
    }
}

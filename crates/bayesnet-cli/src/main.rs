//! Bayesnet CLI
//!
//! Command-line driver for the inference engine:
//! - Running the bundled reference networks (`demo`)
//! - Posterior queries by exact elimination or message passing (`query`)
//! - Joint probability of a complete assignment (`joint`)
//! - Inspecting, normalizing and converting network files
//!
//! Network files use the text encoding unless their extension is `.json`.

use anyhow::{Context, Result};
use bayesnet_core::persistence;
use bayesnet_core::{Assignment, NetworkGraph, PropagationDirection, VariableId};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};

mod config;
mod demo;
mod render;

use config::CliConfig;
use demo::{DemoName, Scenario};

#[derive(Parser)]
#[command(name = "bayesnet")]
#[command(
    author,
    version,
    about = "Exact inference over discrete Bayesian networks"
)]
struct Cli {
    /// Emit JSON on stdout instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Disable coloured output (`NO_COLOR` is honoured too).
    #[arg(long, global = true)]
    no_color: bool,

    /// Log verbosity: `-v` debug, `-vv` trace. Otherwise `BAYESNET_LOG` / `RUST_LOG`.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one of the bundled reference networks.
    Demo {
        #[arg(value_enum)]
        name: DemoName,
        /// Also write the demo network to this file.
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Posterior of the query variables given evidence.
    Query {
        /// Network file
        network: PathBuf,
        /// Query variable ids (repeat or separate with commas)
        #[arg(short, long, value_delimiter = ',', required = true)]
        query: Vec<String>,
        /// Observed state, as `ID=STATE` (repeatable)
        #[arg(short, long, value_parser = parse_binding)]
        evidence: Vec<(String, String)>,
        /// Inference method
        #[arg(short, long, value_enum, default_value_t = Method::Ve)]
        method: Method,
        /// Report influence paths from evidence to query variables (message passing only)
        #[arg(long)]
        trace: bool,
    },

    /// Probability of one complete assignment.
    Joint {
        /// Network file
        network: PathBuf,
        /// State of every variable, as `ID=STATE` (repeatable)
        #[arg(short, long, value_parser = parse_binding, required = true)]
        assign: Vec<(String, String)>,
    },

    /// List variables, edges, topological order and CPT status.
    Inspect {
        /// Network file
        network: PathBuf,
    },

    /// Rescale every CPT row to sum to 1.
    Normalize {
        /// Network file
        network: PathBuf,
        /// Output file (defaults to rewriting the input)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Re-encode a network file (`.json` ↔ text, chosen by extension).
    Convert { input: PathBuf, output: PathBuf },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Exact variable elimination
    Ve,
    /// Forward belief propagation
    Bp,
    /// Reverse (diagnostic) belief propagation
    ReverseBp,
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    let (id, state) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=STATE, got `{raw}`"))?;
    let (id, state) = (id.trim(), state.trim());
    if id.is_empty() || state.is_empty() {
        return Err(format!("expected ID=STATE, got `{raw}`"));
    }
    Ok((id.to_string(), state.to_string()))
}

fn to_assignment(bindings: &[(String, String)]) -> Assignment {
    bayesnet_core::assignment(bindings.iter().cloned())
}

fn load(path: &Path) -> Result<NetworkGraph> {
    persistence::load_from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn save(graph: &NetworkGraph, path: &Path) -> Result<()> {
    persistence::save_to_file(graph, path).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::resolve(cli.json, cli.no_color, cli.verbose);
    config.apply_color();
    config::init_logging(&config)?;

    match cli.command {
        Commands::Demo { name, save: out } => cmd_demo(&config, name, out.as_deref()),
        Commands::Query {
            network,
            query,
            evidence,
            method,
            trace,
        } => {
            let graph = load(&network)?;
            run_query(&config, &graph, &query, &to_assignment(&evidence), method, trace)
        }
        Commands::Joint { network, assign } => {
            let graph = load(&network)?;
            let assignment = to_assignment(&assign);
            let p = graph
                .compute_joint_probability(&assignment)
                .context("joint probability")?;
            print!("{}", render::joint(&config, &assignment, p)?);
            Ok(())
        }
        Commands::Inspect { network } => {
            let graph = load(&network)?;
            print!("{}", render::inspect(&config, &graph)?);
            Ok(())
        }
        Commands::Normalize { network, out } => {
            let mut graph = load(&network)?;
            let touched = graph.normalize_cpts();
            let out = out.unwrap_or(network);
            save(&graph, &out)?;
            eprintln!(
                "{} normalized {touched} CPTs → {}",
                "ok".green().bold(),
                out.display()
            );
            Ok(())
        }
        Commands::Convert { input, output } => {
            let graph = load(&input)?;
            save(&graph, &output)?;
            eprintln!("{} {}", "wrote".green().bold(), output.display().to_string().bold());
            Ok(())
        }
    }
}

fn cmd_demo(config: &CliConfig, name: DemoName, out: Option<&Path>) -> Result<()> {
    let scenario = Scenario::load(name)?;
    if let Some(path) = out {
        save(&scenario.network, path)?;
        eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    }
    if !config.is_json() {
        println!("{}", format!("=== {} ===", scenario.title).bold());
        println!("{}\n", scenario.question);
    }
    run_query(
        config,
        &scenario.network,
        &scenario.query,
        &scenario.evidence,
        scenario.method,
        scenario.trace,
    )
}

fn run_query(
    config: &CliConfig,
    graph: &NetworkGraph,
    query: &[String],
    evidence: &Assignment,
    method: Method,
    trace: bool,
) -> Result<()> {
    let direction = match method {
        Method::Ve => {
            if trace {
                tracing::warn!("--trace only applies to belief propagation; ignored");
            }
            let posterior = graph
                .variable_elimination(query, evidence)
                .context("variable elimination")?;
            if render::is_degenerate(&posterior) {
                eprintln!(
                    "{} evidence has zero probability or CPTs are missing; all results are 0",
                    "warning:".yellow().bold()
                );
            }
            print!("{}", render::posterior(config, evidence, &posterior)?);
            return Ok(());
        }
        Method::Bp => PropagationDirection::Forward,
        Method::ReverseBp => PropagationDirection::Reverse,
    };

    let result = graph
        .propagate(query, evidence, trace, direction)
        .with_context(|| format!("{direction} belief propagation"))?;
    let query_ids: Vec<VariableId> = query.iter().map(|q| VariableId::from(q.as_str())).collect();
    print!("{}", render::propagation(config, &query_ids, &result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binding() {
        assert_eq!(
            parse_binding("Disease=Flu"),
            Ok(("Disease".to_string(), "Flu".to_string()))
        );
        assert_eq!(
            parse_binding(" A = True "),
            Ok(("A".to_string(), "True".to_string()))
        );
        assert!(parse_binding("Disease").is_err());
        assert!(parse_binding("=Flu").is_err());
    }

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from([
            "bayesnet", "--json", "query", "net.bn", "-q", "A,B", "-e", "C=Positive",
            "--method", "reverse-bp", "--trace",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Query {
                query,
                evidence,
                method,
                trace,
                ..
            } => {
                assert_eq!(query, vec!["A", "B"]);
                assert_eq!(evidence, vec![("C".to_string(), "Positive".to_string())]);
                assert_eq!(method, Method::ReverseBp);
                assert!(trace);
            }
            _ => panic!("expected query"),
        }
    }
}

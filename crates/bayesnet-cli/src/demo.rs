//! Guided runs of the bundled reference networks.

use anyhow::Result;
use bayesnet_core::{assignment, catalog, Assignment, NetworkGraph};
use clap::ValueEnum;

use crate::Method;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoName {
    /// Disease with two symptoms; exact posterior given both symptoms.
    Medical,
    /// Burglary alarm; P(Burglary) given that both neighbours call.
    Alarm,
    /// A -> B -> C; message passing with influence traces.
    Chain,
}

pub struct Scenario {
    pub title: &'static str,
    pub question: &'static str,
    pub network: NetworkGraph,
    pub query: Vec<String>,
    pub evidence: Assignment,
    pub method: Method,
    pub trace: bool,
}

impl Scenario {
    pub fn load(name: DemoName) -> Result<Self> {
        let scenario = match name {
            DemoName::Medical => Scenario {
                title: "Medical diagnosis",
                question: "Given Fever=Yes and Cough=Yes, what is P(Disease)?",
                network: catalog::medical_diagnosis()?,
                query: vec!["Disease".into()],
                evidence: assignment([("Symptom1", "Yes"), ("Symptom2", "Yes")]),
                method: Method::Ve,
                trace: false,
            },
            DemoName::Alarm => Scenario {
                title: "Alarm network",
                question: "Given JohnCalls=True and MaryCalls=True, what is P(Burglary)?",
                network: catalog::alarm()?,
                query: vec!["Burglary".into()],
                evidence: assignment([("JohnCalls", "True"), ("MaryCalls", "True")]),
                method: Method::Ve,
                trace: false,
            },
            DemoName::Chain => Scenario {
                title: "Belief propagation with influence tracing",
                question: "Given C=Positive, what are P(A) and P(B), and how does C reach them?",
                network: catalog::chain()?,
                query: vec!["A".into(), "B".into()],
                evidence: assignment([("C", "Positive")]),
                method: Method::Bp,
                trace: true,
            },
        };
        Ok(scenario)
    }
}

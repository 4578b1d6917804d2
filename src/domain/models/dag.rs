//! Domain dependency graph
//!
//! Models the fixed data-flow dependencies between planning domains as a
//! directed acyclic graph. Edges point from the upstream domain to the
//! domain that reads its state.

use serde::{Deserialize, Serialize};

use super::domain_state::Domain;

/// An edge in the domain DAG representing a data dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagEdge {
    /// The upstream domain (the dependency)
    pub from: Domain,
    /// The downstream domain (the dependent)
    pub to: Domain,
}

impl DagEdge {
    pub fn new(from: Domain, to: Domain) -> Self {
        Self { from, to }
    }
}

/// Dependency graph over planning domains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDag {
    pub nodes: Vec<Domain>,
    pub edges: Vec<DagEdge>,
}

impl DomainDag {
    pub fn new(nodes: Vec<Domain>, edges: Vec<DagEdge>) -> Self {
        Self { nodes, edges }
    }

    /// The planning graph: lodging needs transport arrivals (and the
    /// entry-requirement shifted window through transport), activities need
    /// lodging stays.
    pub fn standard() -> Self {
        Self::new(
            Domain::ALL.to_vec(),
            vec![
                DagEdge::new(Domain::EntryRequirements, Domain::Lodging),
                DagEdge::new(Domain::Transport, Domain::Lodging),
                DagEdge::new(Domain::Lodging, Domain::Activities),
            ],
        )
    }

    /// Direct upstream domains of `domain`, sorted.
    pub fn dependencies_of(&self, domain: Domain) -> Vec<Domain> {
        let mut deps: Vec<Domain> = self
            .edges
            .iter()
            .filter(|e| e.to == domain)
            .map(|e| e.from)
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Domains reachable downstream of `domain`, sorted.
    pub fn transitive_dependents_of(&self, domain: Domain) -> Vec<Domain> {
        let mut found = Vec::new();
        let mut stack = vec![domain];
        while let Some(current) = stack.pop() {
            for edge in self.edges.iter().filter(|e| e.from == current) {
                if !found.contains(&edge.to) {
                    found.push(edge.to);
                    stack.push(edge.to);
                }
            }
        }
        found.sort_unstable();
        found
    }
}

impl Default for DomainDag {
    fn default() -> Self {
        Self::standard()
    }
}

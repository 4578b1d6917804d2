use std::collections::{BTreeMap, BTreeSet};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Domain, DomainDag};

/// Service for validating the domain DAG and grouping it into execution waves
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

/// Depth-first walk from `node`. On a back edge, `path` is trimmed to the cycle.
fn walk_for_cycle(
    node: Domain,
    graph: &BTreeMap<Domain, Vec<Domain>>,
    visited: &mut BTreeSet<Domain>,
    rec_stack: &mut BTreeSet<Domain>,
    path: &mut Vec<Domain>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                if walk_for_cycle(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&neighbor) {
                if let Some(cycle_start) = path.iter().position(|&d| d == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Check every edge references a node of the graph
    pub fn validate_edges(&self, dag: &DomainDag) -> DomainResult<()> {
        for edge in &dag.edges {
            for end in [edge.from, edge.to] {
                if !dag.nodes.contains(&end) {
                    return Err(DomainError::ValidationFailed(format!(
                        "edge {} -> {} references unknown domain {end}",
                        edge.from, edge.to
                    )));
                }
            }
        }
        Ok(())
    }

    /// Detect circular dependencies in the graph
    pub fn detect_cycle(&self, dag: &DomainDag) -> Option<Vec<Domain>> {
        let mut graph: BTreeMap<Domain, Vec<Domain>> = BTreeMap::new();
        for node in &dag.nodes {
            graph.entry(*node).or_default();
        }
        for edge in &dag.edges {
            graph.entry(edge.from).or_default().push(edge.to);
        }

        let mut visited = BTreeSet::new();
        let mut rec_stack = BTreeSet::new();
        let mut path = Vec::new();

        for node in graph.keys() {
            if !visited.contains(node)
                && walk_for_cycle(*node, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }

        None
    }

    /// Group domains into waves with Kahn's algorithm.
    ///
    /// Every domain in a wave depends only on domains of earlier waves, so
    /// the members of one wave may run concurrently. Waves are sorted so the
    /// schedule is deterministic.
    pub fn execution_waves(&self, dag: &DomainDag) -> DomainResult<Vec<Vec<Domain>>> {
        self.validate_edges(dag)?;
        if let Some(cycle) = self.detect_cycle(dag) {
            return Err(DomainError::DagCycle(cycle));
        }

        let mut in_degree: BTreeMap<Domain, usize> = dag.nodes.iter().map(|&d| (d, 0)).collect();
        let mut graph: BTreeMap<Domain, Vec<Domain>> = BTreeMap::new();
        for edge in &dag.edges {
            graph.entry(edge.from).or_default().push(edge.to);
            *in_degree.entry(edge.to).or_insert(0) += 1;
        }

        let mut ready: Vec<Domain> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&d, _)| d)
            .collect();

        let mut waves = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            ready.sort_unstable();
            let mut next = Vec::new();
            for node in &ready {
                if let Some(neighbors) = graph.get(node) {
                    for neighbor in neighbors {
                        if let Some(degree) = in_degree.get_mut(neighbor) {
                            *degree -= 1;
                            if *degree == 0 {
                                next.push(*neighbor);
                            }
                        }
                    }
                }
            }
            placed += ready.len();
            waves.push(std::mem::replace(&mut ready, next));
        }

        if placed != in_degree.len() {
            return Err(DomainError::ValidationFailed(
                "wave grouping failed: possible cycle or disconnected graph".to_string(),
            ));
        }

        Ok(waves)
    }

    /// Length of the longest dependency chain above `domain`
    pub fn calculate_depth(&self, dag: &DomainDag, domain: Domain) -> DomainResult<u32> {
        let mut visited = BTreeSet::new();
        calculate_depth_recursive(dag, domain, &mut visited)
    }
}

/// Longest upstream chain; `visited` holds the current path.
fn calculate_depth_recursive(
    dag: &DomainDag,
    domain: Domain,
    visited: &mut BTreeSet<Domain>,
) -> DomainResult<u32> {
    if !visited.insert(domain) {
        return Err(DomainError::DagCycle(visited.iter().copied().collect()));
    }

    let mut depth = 0;
    for dep in dag.dependencies_of(domain) {
        depth = depth.max(calculate_depth_recursive(dag, dep, visited)? + 1);
    }

    visited.remove(&domain);
    Ok(depth)
}

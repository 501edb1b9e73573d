use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Dependency graph over unit names.
///
/// Nodes keep their insertion order so that every traversal is deterministic.
/// The graph is kept acyclic: [`Graph::add_edge`] rejects (and rolls back) any
/// edge that would close a cycle.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<String>,
    known: HashSet<String>,
    /// `edges[A] = [B, C]` means A depends on B and C
    edges: HashMap<String, Vec<String>>,
    /// `reverse[A] = [B, C]` means B and C depend on A
    reverse: HashMap<String, Vec<String>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph. Adding an existing node is a no-op.
    pub fn add_node(&mut self, name: &str) {
        if self.known.insert(name.to_string()) {
            self.nodes.push(name.to_string());
            self.edges.entry(name.to_string()).or_default();
            self.reverse.entry(name.to_string()).or_default();
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    /// Add a dependency edge (`from` depends on `to`).
    ///
    /// Returns `Ok(false)` when the edge already existed. If the edge closes
    /// a cycle it is removed again and `Error::CircularDependency` carries the
    /// offending chain, starting at `from` and ending at the repeated node.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<bool> {
        self.add_node(from);
        self.add_node(to);

        if self.has_edge(from, to) {
            return Ok(false);
        }

        self.edges.entry(from.to_string()).or_default().push(to.to_string());
        self.reverse.entry(to.to_string()).or_default().push(from.to_string());

        if let Some(cycle) = self.find_cycle_from(from) {
            self.remove_edge(from, to);
            return Err(Error::CircularDependency(cycle));
        }

        Ok(true)
    }

    /// Remove a dependency edge. Returns whether it existed.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let removed = match self.edges.get_mut(from) {
            Some(deps) => {
                let before = deps.len();
                deps.retain(|d| d.as_str() != to);
                deps.len() != before
            }
            None => false,
        };
        if let Some(dependents) = self.reverse.get_mut(to) {
            dependents.retain(|d| d.as_str() != from);
        }
        removed
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges
            .get(from)
            .is_some_and(|deps| deps.iter().any(|d| d.as_str() == to))
    }

    /// Get direct dependencies of a node
    pub fn direct_dependencies(&self, node: &str) -> Vec<String> {
        self.edges.get(node).cloned().unwrap_or_default()
    }

    /// Get nodes that depend on the given node
    pub fn dependents(&self, node: &str) -> Vec<String> {
        self.reverse.get(node).cloned().unwrap_or_default()
    }

    /// All transitive dependencies of a node, dependencies first.
    /// The node itself is not included.
    pub fn transitive_dependencies(&self, node: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        self.postorder(node, &mut visited, &mut result);
        result.retain(|n| n.as_str() != node);
        result
    }

    fn postorder(&self, node: &str, visited: &mut HashSet<String>, result: &mut Vec<String>) {
        if !visited.insert(node.to_string()) {
            return;
        }

        // Visit dependencies first (post-order for topological sort)
        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                self.postorder(dep, visited, result);
            }
        }

        result.push(node.to_string());
    }

    /// Walk depth-first from `start` and return the first chain that revisits
    /// a node on the current path.
    ///
    /// Only edges reachable from `start` are examined.
    pub fn find_cycle_from(&self, start: &str) -> Option<Vec<String>> {
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut done = HashSet::new();
        self.cycle_dfs(start, &mut path, &mut on_path, &mut done)
    }

    fn cycle_dfs(
        &self,
        node: &str,
        path: &mut Vec<String>,
        on_path: &mut HashSet<String>,
        done: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        path.push(node.to_string());
        on_path.insert(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if on_path.contains(dep) {
                    let mut chain = path.clone();
                    chain.push(dep.clone());
                    return Some(chain);
                }
                if done.contains(dep) {
                    continue;
                }
                if let Some(cycle) = self.cycle_dfs(dep, path, on_path, done) {
                    return Some(cycle);
                }
            }
        }

        on_path.remove(node);
        path.pop();
        done.insert(node.to_string());
        None
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.nodes.iter().any(|n| self.find_cycle_from(n).is_some())
    }

    /// Topological order over all nodes (dependencies first), computed as a
    /// depth-first postorder in node insertion order.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        self.topological_sort_of(&self.nodes)
    }

    /// Topological order restricted to `roots` and everything they depend on.
    pub fn topological_sort_of(&self, roots: &[String]) -> Result<Vec<String>> {
        for root in roots {
            if let Some(cycle) = self.find_cycle_from(root) {
                return Err(Error::CircularDependency(cycle));
            }
        }

        let mut visited = HashSet::new();
        let mut result = Vec::new();
        for root in roots {
            self.postorder(root, &mut visited, &mut result);
        }
        Ok(result)
    }

    /// Group `members` into layers that can be processed in parallel. Every
    /// node lands in a later group than all of its dependencies; edges to
    /// nodes outside `members` are ignored.
    pub fn parallel_groups_of(&self, members: &[String]) -> Result<Vec<Vec<String>>> {
        let member_set: HashSet<&String> = members.iter().collect();

        let mut in_degree: HashMap<&String, usize> = HashMap::new();
        for node in members {
            let degree = self
                .edges
                .get(node)
                .map_or(0, |deps| deps.iter().filter(|d| member_set.contains(d)).count());
            in_degree.insert(node, degree);
        }

        let mut groups = Vec::new();
        let mut processed: HashSet<&String> = HashSet::new();

        while processed.len() < members.len() {
            // Find all nodes that can be processed now
            let current_group: Vec<&String> = members
                .iter()
                .filter(|node| {
                    !processed.contains(node) && in_degree.get(node).copied().unwrap_or(0) == 0
                })
                .collect();

            if current_group.is_empty() {
                let cycle = members
                    .iter()
                    .find_map(|n| self.find_cycle_from(n))
                    .unwrap_or_default();
                return Err(Error::CircularDependency(cycle));
            }

            // Mark these nodes as processed and reduce in-degree of dependents
            for node in &current_group {
                processed.insert(*node);
                if let Some(dependents) = self.reverse.get(*node) {
                    for dependent in dependents {
                        if let Some(degree) = in_degree.get_mut(dependent) {
                            *degree = degree.saturating_sub(1);
                        }
                    }
                }
            }

            groups.push(current_group.into_iter().cloned().collect());
        }

        Ok(groups)
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }
}

//! Registry of resource kinds.
//!
//! Built once at startup, validated, set up with the run configuration and
//! then handed to the orchestrator, which only reads it.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

use crate::{BackendError, Resource, TeardownConfig};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a resource with the name {0} already exists")]
    Conflict(String),

    #[error("resource {kind} depends on unknown resource {dependency}")]
    UnknownDependency { kind: String, dependency: String },

    #[error("cycle detected in resource dependencies: {0}")]
    Cycle(String),

    #[error("setup failed for resource {kind}: {source}")]
    Setup {
        kind: String,
        #[source]
        source: BackendError,
    },
}

/// Table of resource kinds keyed by name.
#[derive(Default)]
pub struct Registry {
    kinds: BTreeMap<String, Box<dyn Resource>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource kind. Names must be unique.
    pub fn register(&mut self, kind: impl Resource + 'static) -> Result<(), RegistryError> {
        self.register_boxed(Box::new(kind))
    }

    pub fn register_boxed(&mut self, kind: Box<dyn Resource>) -> Result<(), RegistryError> {
        let name = kind.name().to_string();
        if self.kinds.contains_key(&name) {
            return Err(RegistryError::Conflict(name));
        }
        debug!(kind = %name, "Registered resource kind");
        self.kinds.insert(name, kind);
        Ok(())
    }

    /// Remove a kind before the run starts.
    pub fn deregister(&mut self, name: &str) -> Option<Box<dyn Resource>> {
        self.kinds.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Resource> {
        self.kinds.get(name).map(|k| k.as_ref())
    }

    /// All kinds, in name order.
    pub fn get_all(&self) -> impl Iterator<Item = (&str, &dyn Resource)> {
        self.kinds.iter().map(|(n, k)| (n.as_str(), k.as_ref()))
    }

    pub fn names(&self) -> Vec<String> {
        self.kinds.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Dependency edges of every kind, in name order.
    pub fn dependency_graph(&self) -> BTreeMap<String, Vec<String>> {
        self.kinds
            .iter()
            .map(|(name, kind)| (name.clone(), kind.dependencies()))
            .collect()
    }

    /// Check that every dependency resolves and that the graph has no cycles.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let graph = self.dependency_graph();

        for (kind, deps) in &graph {
            for dep in deps {
                if !graph.contains_key(dep) {
                    return Err(RegistryError::UnknownDependency {
                        kind: kind.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if let Err(cycle) = detect_cycle(&graph) {
            return Err(RegistryError::Cycle(cycle));
        }

        Ok(())
    }

    /// Call `setup` on every kind, in name order.
    pub async fn setup_all(&mut self, config: &TeardownConfig) -> Result<(), RegistryError> {
        info!(project = %config.project, kinds = self.kinds.len(), "Setting up resource kinds");
        for (name, kind) in self.kinds.iter_mut() {
            kind.setup(config)
                .await
                .map_err(|source| RegistryError::Setup {
                    kind: name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Detect cycles in the dependency graph using DFS.
///
/// On failure returns the cycle as `a -> b -> a`.
fn detect_cycle(graph: &BTreeMap<String, Vec<String>>) -> Result<(), String> {
    let mut visited = HashMap::new();
    let mut path = Vec::new();

    for name in graph.keys() {
        if !visited.contains_key(name.as_str()) {
            if let Some(cycle) = dfs_detect_cycle(name, graph, &mut visited, &mut path) {
                return Err(cycle);
            }
        }
    }
    Ok(())
}

fn dfs_detect_cycle<'a>(
    node: &'a str,
    graph: &'a BTreeMap<String, Vec<String>>,
    visited: &mut HashMap<&'a str, bool>,
    path: &mut Vec<&'a str>,
) -> Option<String> {
    // true while the node is on the current DFS path
    visited.insert(node, true);
    path.push(node);

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            let dep_str: &'a str = dep.as_str();
            match visited.get(dep_str).copied() {
                None => {
                    if let Some(cycle) = dfs_detect_cycle(dep_str, graph, visited, path) {
                        return Some(cycle);
                    }
                }
                Some(true) => {
                    let start = path.iter().position(|n| *n == dep_str).unwrap_or(0);
                    let mut cycle: Vec<&str> = path[start..].to_vec();
                    cycle.push(dep_str);
                    return Some(cycle.join(" -> "));
                }
                Some(false) => {}
            }
        }
    }

    path.pop();
    visited.insert(node, false);
    None
}

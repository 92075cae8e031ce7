//! Dependency-ordered service startup

use crate::definitions::Definitions;
use crate::link::ChainContext;
use crate::service::ServiceLifecycle;
use crate::{Error, Resource, Result};
use container_engine::ContainerLink;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Deepest dependency chain a walk follows
pub const MAX_DEPTH: usize = 32;

/// Service name to direct dependency names
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service and its dependencies in declaration order
    pub fn add(&mut self, service: impl Into<String>, dependencies: Vec<String>) {
        self.edges.insert(service.into(), dependencies);
    }

    /// Build the graph reachable from `root` through `definitions`
    pub fn load(definitions: &Definitions, root: &str) -> Result<Self> {
        let mut graph = Self::new();
        let mut pending = vec![root.to_string()];
        while let Some(name) = pending.pop() {
            if graph.edges.contains_key(&name) {
                continue;
            }
            let definition = definitions.service(&name)?;
            pending.extend(definition.dependencies.iter().cloned());
            graph.add(name, definition.dependencies);
        }
        Ok(graph)
    }

    /// Order in which to start `root` and everything it depends on
    ///
    /// Dependencies come first, in declaration order, each at most once.
    pub fn start_order(&self, root: &str) -> Result<Vec<String>> {
        let mut stack = Vec::new();
        let mut done = HashSet::new();
        let mut order = Vec::new();
        self.visit(root, &mut stack, &mut done, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|s| s == name) {
            let mut path = stack[pos..].to_vec();
            path.push(name.to_string());
            return Err(Error::DependencyCycle { path });
        }
        if stack.len() >= MAX_DEPTH {
            let mut path = stack.clone();
            path.push(name.to_string());
            return Err(Error::DependencyCycle { path });
        }

        let dependencies = self
            .edges
            .get(name)
            .ok_or_else(|| Error::not_found(Resource::Service, name))?;

        stack.push(name.to_string());
        for dependency in dependencies {
            self.visit(dependency, stack, done, order)?;
        }
        stack.pop();

        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }
}

/// Result of a dependency walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Services started by this walk, in start order
    pub started: Vec<String>,
    /// Services that were already running
    pub already_running: Vec<String>,
    /// Links of every visited service, in visit order
    pub links: Vec<ContainerLink>,
}

/// Starts a service after everything it depends on
pub struct DependencyWalker {
    definitions: Arc<Definitions>,
    services: Arc<ServiceLifecycle>,
}

impl DependencyWalker {
    /// Create a walker
    pub fn new(definitions: Arc<Definitions>, services: Arc<ServiceLifecycle>) -> Self {
        Self {
            definitions,
            services,
        }
    }

    /// Start `service` and its prerequisites
    ///
    /// The whole graph is checked before anything starts. A failing service
    /// aborts the walk; services started before it keep running.
    pub async fn start(&self, service: &str, ctx: &ChainContext) -> Result<WalkReport> {
        let graph = DependencyGraph::load(&self.definitions, service)?;
        let order = graph.start_order(service)?;
        debug!("Start order for '{}': {:?}", service, order);

        let mut report = WalkReport::default();
        for name in order {
            let definition = self.definitions.service(&name)?;
            let outcome = self.services.start(&definition, ctx).await?;
            report.links.extend(outcome.links);
            if outcome.already_running {
                report.already_running.push(name);
            } else {
                report.started.push(name);
            }
        }

        info!(
            "Service '{}' ready ({} started, {} already running)",
            service,
            report.started.len(),
            report.already_running.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, deps) in edges {
            graph.add(*name, deps.iter().map(|d| d.to_string()).collect());
        }
        graph
    }

    #[test]
    fn test_dependencies_first_in_declaration_order() {
        let g = graph(&[
            ("app", &["db", "cache"]),
            ("db", &["keys"]),
            ("cache", &["keys"]),
            ("keys", &[]),
        ]);
        assert_eq!(g.start_order("app").unwrap(), vec!["keys", "db", "cache", "app"]);
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        match g.start_order("a").unwrap_err() {
            Error::DependencyCycle { path } => assert_eq!(path, vec!["a", "b", "c", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        assert!(matches!(
            g.start_order("a").unwrap_err(),
            Error::DependencyCycle { .. }
        ));
    }

    #[test]
    fn test_depth_bound() {
        let names: Vec<String> = (0..=MAX_DEPTH + 1).map(|i| format!("s{i}")).collect();
        let mut g = DependencyGraph::new();
        for pair in names.windows(2) {
            g.add(pair[0].clone(), vec![pair[1].clone()]);
        }
        g.add(names[names.len() - 1].clone(), Vec::new());

        match g.start_order("s0").unwrap_err() {
            Error::DependencyCycle { path } => assert_eq!(path.len(), MAX_DEPTH + 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let g = graph(&[("a", &["ghost"])]);
        assert!(matches!(
            g.start_order("a").unwrap_err(),
            Error::NotFound {
                kind: Resource::Service,
                ..
            }
        ));
    }
}

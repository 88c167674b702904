//! Graph - Dependency analysis and ordering of resources
//!
//! Edges come from two places: attribute references (`ResourceRef`) and
//! explicit `depends_on` declarations. A resource may only be applied after
//! every binding it depends on.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::resource::Resource;

/// Attribute name recorded for edges declared through `depends_on`
pub const EXPLICIT_EDGE: &str = "depends_on";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("{from} depends on unknown binding '{target}'")]
    UnknownDependency { from: String, target: String },

    #[error("dependency cycle through '{0}'")]
    Cycle(String),

    #[error("{from} is ordered before its dependency '{target}'")]
    OrderViolation { from: String, target: String },

    #[error("binding '{0}' is declared more than once")]
    DuplicateBinding(String),
}

/// Dependency between resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Target resource binding name
    pub target: String,
    /// Referenced attribute (e.g., "arn"); empty for explicit edges
    pub attribute: String,
    /// Where this reference is used (e.g., "load_balancer_arn")
    pub used_in: String,
}

/// Dependency graph over resource bindings
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Resource binding name -> list of dependencies
    pub edges: HashMap<String, Vec<Dependency>>,
    /// Reverse edges: target -> list of resources that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,
    nodes: Vec<String>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a set of resources
    pub fn from_resources(resources: &[Resource]) -> Self {
        let mut graph = Self::new();
        for resource in resources {
            graph.add_node(&resource.binding);

            let mut seen = HashSet::new();
            let mut keys: Vec<&String> = resource.attributes.keys().collect();
            keys.sort();
            for key in keys {
                let mut refs = Vec::new();
                resource.attributes[key].collect_refs(&mut refs);
                for (target, attribute) in refs {
                    if target == resource.binding || !seen.insert((target.clone(), attribute.clone()))
                    {
                        continue;
                    }
                    graph.add_edge(
                        resource.binding.clone(),
                        Dependency {
                            target,
                            attribute,
                            used_in: key.clone(),
                        },
                    );
                }
            }

            for target in &resource.depends_on {
                graph.add_edge(
                    resource.binding.clone(),
                    Dependency {
                        target: target.clone(),
                        attribute: String::new(),
                        used_in: EXPLICIT_EDGE.to_string(),
                    },
                );
            }
        }
        graph
    }

    fn add_node(&mut self, binding: &str) {
        if !self.nodes.iter().any(|n| n == binding) {
            self.nodes.push(binding.to_string());
        }
    }

    /// Add a dependency edge
    pub fn add_edge(&mut self, from: String, dependency: Dependency) {
        let target = dependency.target.clone();
        self.add_node(&from);
        self.edges.entry(from.clone()).or_default().push(dependency);
        self.reverse_edges.entry(target).or_default().push(from);
    }

    /// Bindings in insertion order
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Get bindings that depend on nothing
    pub fn root_resources(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| self.dependencies_of(n).is_empty())
            .cloned()
            .collect()
    }

    /// Get direct dependencies of a resource
    pub fn dependencies_of(&self, resource: &str) -> &[Dependency] {
        self.edges.get(resource).map_or(&[], |v| v.as_slice())
    }

    /// Get resources that depend on this resource
    pub fn dependents_of(&self, resource: &str) -> &[String] {
        self.reverse_edges
            .get(resource)
            .map_or(&[], |v| v.as_slice())
    }

    /// Whether `from` reaches `target` through one or more edges
    pub fn depends_transitively(&self, from: &str, target: &str) -> bool {
        let mut stack = vec![from.to_string()];
        let mut visited = HashSet::new();
        while let Some(node) = stack.pop() {
            for dep in self.dependencies_of(&node) {
                if dep.target == target {
                    return true;
                }
                if visited.insert(dep.target.clone()) {
                    stack.push(dep.target.clone());
                }
            }
        }
        false
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    fn find_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node in &self.nodes {
            if let Some(at) = self.find_cycle_util(node, &mut visited, &mut rec_stack) {
                return Some(at);
            }
        }
        None
    }

    fn find_cycle_util(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> Option<String> {
        if rec_stack.contains(node) {
            return Some(node.to_string());
        }
        if visited.contains(node) {
            return None;
        }

        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());

        for dep in self.dependencies_of(node) {
            if let Some(at) = self.find_cycle_util(&dep.target, visited, rec_stack) {
                return Some(at);
            }
        }

        rec_stack.remove(node);
        None
    }
}

fn check_bindings(resources: &[Resource]) -> Result<HashMap<&str, &Resource>, GraphError> {
    let mut by_binding: HashMap<&str, &Resource> = HashMap::new();
    for resource in resources {
        if by_binding.insert(&resource.binding, resource).is_some() {
            return Err(GraphError::DuplicateBinding(resource.binding.clone()));
        }
    }
    for resource in resources {
        for target in resource.dependencies() {
            if !by_binding.contains_key(target.as_str()) {
                return Err(GraphError::UnknownDependency {
                    from: resource.binding.clone(),
                    target,
                });
            }
        }
    }
    Ok(by_binding)
}

/// Sort resources so that every dependency precedes its dependents.
///
/// Independent resources keep their relative input order.
pub fn topological_order(resources: &[Resource]) -> Result<Vec<Resource>, GraphError> {
    let by_binding = check_bindings(resources)?;

    let mut sorted = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut visiting: HashSet<String> = HashSet::new();

    fn visit(
        resource: &Resource,
        by_binding: &HashMap<&str, &Resource>,
        visited: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        sorted: &mut Vec<Resource>,
    ) -> Result<(), GraphError> {
        if visited.contains(&resource.binding) {
            return Ok(());
        }
        if !visiting.insert(resource.binding.clone()) {
            return Err(GraphError::Cycle(resource.binding.clone()));
        }

        // Visit dependencies first
        for dep in resource.dependencies() {
            if let Some(dep_resource) = by_binding.get(dep.as_str()) {
                visit(dep_resource, by_binding, visited, visiting, sorted)?;
            }
        }

        visiting.remove(&resource.binding);
        visited.insert(resource.binding.clone());
        sorted.push(resource.clone());
        Ok(())
    }

    for resource in resources {
        visit(
            resource,
            &by_binding,
            &mut visited,
            &mut visiting,
            &mut sorted,
        )?;
    }

    log::debug!("ordered {} resources", sorted.len());
    Ok(sorted)
}

/// Check that `resources` is already a valid application order
pub fn verify_order(resources: &[Resource]) -> Result<(), GraphError> {
    check_bindings(resources)?;

    let mut applied: HashSet<&str> = HashSet::new();
    for resource in resources {
        for target in resource.dependencies() {
            if !applied.contains(target.as_str()) {
                return Err(GraphError::OrderViolation {
                    from: resource.binding.clone(),
                    target,
                });
            }
        }
        applied.insert(&resource.binding);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Value;

    fn res(binding: &str) -> Resource {
        Resource::new("test", binding)
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(
            "a".to_string(),
            Dependency {
                target: "b".to_string(),
                attribute: "id".to_string(),
                used_in: "b_id".to_string(),
            },
        );
        graph.add_edge(
            "b".to_string(),
            Dependency {
                target: "a".to_string(),
                attribute: "id".to_string(),
                used_in: "a_id".to_string(),
            },
        );
        assert!(graph.has_cycle());
    }

    #[test]
    fn graph_records_ref_and_explicit_edges() {
        let resources = vec![
            res("lb"),
            res("listener").with_attribute("load_balancer_arn", Value::reference("lb", "arn")),
            res("service").depends_on("listener"),
        ];
        let graph = DependencyGraph::from_resources(&resources);

        assert!(!graph.has_cycle());
        assert_eq!(graph.root_resources(), vec!["lb"]);
        assert_eq!(graph.dependencies_of("listener")[0].used_in, "load_balancer_arn");
        assert_eq!(graph.dependencies_of("service")[0].used_in, EXPLICIT_EDGE);
        assert_eq!(graph.dependents_of("listener"), &["service".to_string()]);
        assert!(graph.depends_transitively("service", "lb"));
        assert!(!graph.depends_transitively("lb", "service"));
    }

    #[test]
    fn topological_order_moves_dependencies_first() {
        let resources = vec![
            res("service").depends_on("listener"),
            res("listener").with_attribute("load_balancer_arn", Value::reference("lb", "arn")),
            res("lb"),
            res("cluster"),
        ];

        let sorted = topological_order(&resources).unwrap();
        let order: Vec<_> = sorted.iter().map(|r| r.binding.as_str()).collect();
        assert_eq!(order, vec!["lb", "listener", "service", "cluster"]);
        assert!(verify_order(&sorted).is_ok());
    }

    #[test]
    fn topological_order_rejects_cycles_and_unknowns() {
        let cyclic = vec![res("a").depends_on("b"), res("b").depends_on("a")];
        assert!(matches!(
            topological_order(&cyclic),
            Err(GraphError::Cycle(_))
        ));

        let dangling = vec![res("a").depends_on("ghost")];
        assert_eq!(
            topological_order(&dangling),
            Err(GraphError::UnknownDependency {
                from: "a".to_string(),
                target: "ghost".to_string()
            })
        );
    }

    #[test]
    fn verify_order_flags_dependents_placed_early() {
        let resources = vec![res("service").depends_on("listener"), res("listener")];
        assert_eq!(
            verify_order(&resources),
            Err(GraphError::OrderViolation {
                from: "service".to_string(),
                target: "listener".to_string()
            })
        );
    }

    #[test]
    fn duplicate_bindings_are_rejected() {
        let resources = vec![res("a"), res("a")];
        assert_eq!(
            verify_order(&resources),
            Err(GraphError::DuplicateBinding("a".to_string()))
        );
    }
}

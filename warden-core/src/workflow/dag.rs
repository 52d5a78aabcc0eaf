//! Dependency graph construction and validation

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{Result, WardenError};
use crate::security::SecureExecutor;

/// A named tool invocation inside a dependency graph
#[derive(Debug, Clone)]
pub struct DagNode {
    pub name: String,
    pub executor: Arc<SecureExecutor>,
    /// Names of nodes that must resolve first
    pub depends_on: Vec<String>,
}

impl DagNode {
    pub fn new(name: impl Into<String>, executor: Arc<SecureExecutor>) -> Self {
        Self {
            name: name.into(),
            executor,
            depends_on: Vec::new(),
        }
    }

    /// Add a dependency
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }
}

/// Validated adjacency of a node list, indexed by declaration order
#[derive(Debug, Clone)]
pub(crate) struct DependencyGraph {
    pub names: Vec<String>,
    /// Dependencies of each node, in declaration order
    pub dependencies: Vec<Vec<usize>>,
    /// Nodes waiting on each node, in declaration order
    pub dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Merge `depends_on` with the external map and validate
    ///
    /// Fails on duplicate names, unknown dependencies or a cycle; nothing is
    /// scheduled in that case.
    pub fn build(nodes: &[DagNode], dependency_map: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.as_str(), i).is_some() {
                return Err(WardenError::DuplicateNode(node.name.clone()));
            }
        }

        let mut edges: Vec<HashSet<usize>> = vec![HashSet::new(); nodes.len()];
        let link = |node: &str, dependency: &str, edges: &mut Vec<HashSet<usize>>| {
            let Some(&from) = index.get(node) else {
                return Err(WardenError::Configuration(format!(
                    "dependency map names unknown node '{}'",
                    node
                )));
            };
            let Some(&to) = index.get(dependency) else {
                return Err(WardenError::UnknownDependency {
                    node: node.to_string(),
                    dependency: dependency.to_string(),
                });
            };
            edges[from].insert(to);
            Ok(())
        };

        for node in nodes {
            for dependency in &node.depends_on {
                link(&node.name, dependency, &mut edges)?;
            }
        }
        let mut mapped: Vec<&String> = dependency_map.keys().collect();
        mapped.sort();
        for node in mapped {
            for dependency in &dependency_map[node] {
                link(node, dependency, &mut edges)?;
            }
        }

        let dependencies: Vec<Vec<usize>> = edges
            .into_iter()
            .map(|set| {
                let mut deps: Vec<usize> = set.into_iter().collect();
                deps.sort_unstable();
                deps
            })
            .collect();

        let mut dependents = vec![Vec::new(); nodes.len()];
        for (node, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let graph = Self {
            names: nodes.iter().map(|n| n.name.clone()).collect(),
            dependencies,
            dependents,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Kahn's algorithm; reports every node left on a cycle or behind one
    fn check_acyclic(&self) -> Result<()> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut visited = 0;
        while let Some(node) = queue.pop_front() {
            visited += 1;
            for &dependent in &self.dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if visited == self.names.len() {
            return Ok(());
        }

        let stuck: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d > 0)
            .map(|(i, _)| self.names[i].clone())
            .collect();
        Err(WardenError::CyclicDependency(stuck))
    }

    /// Nodes with no dependencies, in declaration order
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.dependencies
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{AgentContext, ToolCapabilities};
    use crate::tools::{FnTool, ToolMetadata};

    fn node(name: &str) -> DagNode {
        let tool = Arc::new(FnTool::new(ToolMetadata::new(name, "test"), |input| async move {
            Ok(input)
        }));
        DagNode::new(
            name,
            Arc::new(SecureExecutor::new(
                tool,
                ToolCapabilities::none(),
                AgentContext::new("agent"),
            )),
        )
    }

    #[test]
    fn test_merges_depends_on_and_map() {
        let nodes = vec![node("a"), node("b").depends_on("a"), node("c")];
        let map = HashMap::from([("c".to_string(), vec!["a".to_string(), "b".to_string()])]);

        let graph = DependencyGraph::build(&nodes, &map).unwrap();
        assert_eq!(graph.dependencies[1], vec![0]);
        assert_eq!(graph.dependencies[2], vec![0, 1]);
        assert_eq!(graph.dependents[0], vec![1, 2]);
        assert_eq!(graph.roots().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let nodes = vec![node("a"), node("b").depends_on("a").depends_on("a")];
        let map = HashMap::from([("b".to_string(), vec!["a".to_string()])]);

        let graph = DependencyGraph::build(&nodes, &map).unwrap();
        assert_eq!(graph.dependencies[1], vec![0]);
    }

    #[test]
    fn test_cycle_detected() {
        let nodes = vec![
            node("a").depends_on("c"),
            node("b").depends_on("a"),
            node("c").depends_on("b"),
            node("d"),
        ];

        let err = DependencyGraph::build(&nodes, &HashMap::new()).unwrap_err();
        match err {
            WardenError::CyclicDependency(names) => assert_eq!(names, vec!["a", "b", "c"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let nodes = vec![node("a").depends_on("a")];
        assert!(matches!(
            DependencyGraph::build(&nodes, &HashMap::new()),
            Err(WardenError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let nodes = vec![node("a").depends_on("ghost")];
        assert!(matches!(
            DependencyGraph::build(&nodes, &HashMap::new()),
            Err(WardenError::UnknownDependency { .. })
        ));

        let map = HashMap::from([("ghost".to_string(), vec!["a".to_string()])]);
        assert!(matches!(
            DependencyGraph::build(&[node("a")], &map),
            Err(WardenError::Configuration(_))
        ));
    }

    #[test]
    fn test_duplicate_names() {
        let nodes = vec![node("a"), node("a")];
        assert!(matches!(
            DependencyGraph::build(&nodes, &HashMap::new()),
            Err(WardenError::DuplicateNode(name)) if name == "a"
        ));
    }
}

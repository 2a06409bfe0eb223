/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Pipeline Graph
//!
//! A pipeline is a directed acyclic graph of named tasks with declared
//! dependencies. The graph defines execution order and, together with each
//! task's trigger rule, which tasks run unconditionally versus only on a
//! particular upstream outcome.
//!
//! ## Core components
//!
//! - [`Pipeline`]: the immutable task graph handed to a runner
//! - [`DependencyGraph`]: low-level dependency tracking and cycle detection
//! - [`PipelineBuilder`]: fluent construction with per-step validation
//!
//! There is no process-wide pipeline registry: a `Pipeline` is an explicit
//! value, built once, validated at registration time, and passed to the
//! runner at run-creation time.
//!
//! ## Validation
//!
//! Structural defects are static configuration errors and fail before any
//! run starts: duplicate task names and cycles at [`Pipeline::add_task`],
//! unknown dependencies and empty pipelines at [`Pipeline::validate`].

use std::collections::{HashMap, HashSet};

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::{Directed, Graph};

use crate::error::GraphError;
use crate::task::TaskDefinition;

/// Low-level representation of task dependencies.
///
/// Nodes are task names; an edge records that one task depends on another.
/// Cycle detection and topological sorting are delegated to petgraph over a
/// transient graph built from this adjacency map.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashSet<String>,
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node (task) to the graph.
    pub fn add_node(&mut self, node: String) {
        self.nodes.insert(node.clone());
        self.edges.entry(node).or_default();
    }

    /// Add an edge recording that `from` depends on `to`.
    pub fn add_edge(&mut self, from: String, to: String) {
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());
        self.edges.entry(from).or_default().push(to);
    }

    /// Dependencies of a task, if the task is known.
    pub fn dependencies(&self, node: &str) -> Option<&Vec<String>> {
        self.edges.get(node)
    }

    /// Tasks that depend on the given task.
    pub fn dependents(&self, node: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter_map(|(name, deps)| {
                if deps.iter().any(|d| d == node) {
                    Some(name.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Whether the graph contains a dependency cycle.
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.to_petgraph().0)
    }

    /// Tasks in a dependency-safe execution order.
    pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
        let (graph, _) = self.to_petgraph();
        match toposort(&graph, None) {
            Ok(sorted) => Ok(sorted.into_iter().map(|idx| graph[idx].clone()).collect()),
            Err(_) => Err(GraphError::CyclicDependency {
                cycle: self.find_cycle().unwrap_or_default(),
            }),
        }
    }

    /// Build a petgraph representation with edges oriented dependency ->
    /// dependent, so a topological sort yields execution order directly.
    fn to_petgraph(
        &self,
    ) -> (
        Graph<String, (), Directed>,
        HashMap<String, petgraph::graph::NodeIndex>,
    ) {
        let mut graph = Graph::<String, (), Directed>::new();
        let mut indices = HashMap::new();

        for node in &self.nodes {
            let index = graph.add_node(node.clone());
            indices.insert(node.clone(), index);
        }

        for (from, deps) in &self.edges {
            if let Some(&from_index) = indices.get(from) {
                for dep in deps {
                    if let Some(&dep_index) = indices.get(dep) {
                        graph.add_edge(dep_index, from_index, ());
                    }
                }
            }
        }

        (graph, indices)
    }

    /// Locate one cycle for error reporting, if any exists.
    pub(crate) fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        let mut nodes: Vec<_> = self.nodes.iter().collect();
        nodes.sort();

        for node in nodes {
            if !visited.contains(node) {
                if let Some(cycle) = self.dfs_cycle(node, &mut visited, &mut rec_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let start = path.iter().position(|x| x == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        rec_stack.remove(node);
        path.pop();
        None
    }
}

/// An immutable directed acyclic graph of tasks.
///
/// Tasks are defined once at registration time via [`TaskDefinition`]
/// records; each run instantiates independent per-task state. The pipeline
/// guarantees a valid execution order consistent with declared dependencies;
/// independent tasks may run in any order or concurrently.
///
/// # Examples
///
/// ```rust,ignore
/// let pipeline = Pipeline::builder("my_python_operator_dag")
///     .add_task(TaskDefinition::new("run_python_script", script_op))?
///     .add_task(
///         TaskDefinition::new("email_notification", notifier_op)
///             .depends_on(["run_python_script"])
///             .with_trigger_rule(TriggerRule::AllDone),
///     )?
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    tasks: HashMap<String, TaskDefinition>,
    graph: DependencyGraph,
}

impl Pipeline {
    /// Create an empty pipeline with the given name.
    ///
    /// Most callers should use [`Pipeline::builder`] instead.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tasks: HashMap::new(),
            graph: DependencyGraph::new(),
        }
    }

    /// Create a builder for fluent pipeline construction.
    pub fn builder(name: &str) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// The pipeline name, as used in notification subject lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a task definition to the pipeline.
    ///
    /// Fails with [`GraphError::DuplicateTask`] if a task with the same name
    /// exists, and with [`GraphError::CyclicDependency`] if the task's
    /// dependency edges would close a cycle. Dependencies on tasks that have
    /// not been added yet are allowed here and checked by [`validate`].
    ///
    /// [`validate`]: Pipeline::validate
    pub fn add_task(&mut self, task: TaskDefinition) -> Result<(), GraphError> {
        let name = task.name().to_string();

        if self.tasks.contains_key(&name) {
            return Err(GraphError::DuplicateTask(name));
        }

        // Probe on a copy so a rejected task leaves the graph untouched.
        let mut probe = self.graph.clone();
        probe.add_node(name.clone());
        for dep in task.dependencies() {
            probe.add_edge(name.clone(), dep.clone());
        }
        if probe.has_cycles() {
            return Err(GraphError::CyclicDependency {
                cycle: probe.find_cycle().unwrap_or_default(),
            });
        }

        self.graph = probe;
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Validate the pipeline structure.
    ///
    /// Checks for empty pipelines, unknown dependency names, and cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.tasks.is_empty() {
            return Err(GraphError::EmptyPipeline);
        }

        for (name, task) in &self.tasks {
            for dependency in task.dependencies() {
                if !self.tasks.contains_key(dependency) {
                    return Err(GraphError::UnknownDependency {
                        task: name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        if self.graph.has_cycles() {
            return Err(GraphError::CyclicDependency {
                cycle: self.graph.find_cycle().unwrap_or_default(),
            });
        }

        Ok(())
    }

    /// Tasks in a dependency-safe execution order.
    pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
        self.validate()?;
        self.graph.topological_sort()
    }

    /// Tasks grouped by execution level.
    ///
    /// All tasks within a level have no dependency relationship with each
    /// other and may run concurrently; every task's dependencies sit in
    /// earlier levels.
    pub fn execution_levels(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let sorted = self.topological_sort()?;
        let mut levels = Vec::new();
        let mut remaining: HashSet<String> = sorted.into_iter().collect();
        let mut completed: HashSet<String> = HashSet::new();

        while !remaining.is_empty() {
            let mut current: Vec<String> = remaining
                .iter()
                .filter(|name| {
                    self.tasks[*name]
                        .dependencies()
                        .iter()
                        .all(|dep| completed.contains(dep))
                })
                .cloned()
                .collect();
            current.sort();

            for name in &current {
                remaining.remove(name);
                completed.insert(name.clone());
            }
            levels.push(current);
        }

        Ok(levels)
    }

    /// Look up a task definition by name.
    pub fn task(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    /// All task names in the pipeline, unordered.
    pub fn task_names(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Number of tasks in the pipeline.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the pipeline has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks with no dependencies.
    pub fn roots(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, task)| task.dependencies().is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Tasks no other task depends on.
    pub fn leaves(&self) -> Vec<String> {
        let all_dependencies: HashSet<&String> = self
            .tasks
            .values()
            .flat_map(|task| task.dependencies().iter())
            .collect();

        self.tasks
            .keys()
            .filter(|name| !all_dependencies.contains(name))
            .cloned()
            .collect()
    }

    /// Tasks that depend on the given task.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.graph.dependents(name)
    }
}

/// Builder pattern for convenient and fluent pipeline construction.
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    /// Create a new builder.
    pub fn new(name: &str) -> Self {
        Self {
            pipeline: Pipeline::new(name),
        }
    }

    /// Add a task to the pipeline under construction.
    pub fn add_task(mut self, task: TaskDefinition) -> Result<Self, GraphError> {
        self.pipeline.add_task(task)?;
        Ok(self)
    }

    /// Validate and return the finished pipeline.
    pub fn build(self) -> Result<Pipeline, GraphError> {
        self.pipeline.validate()?;
        Ok(self.pipeline)
    }
}

//! Task dependency graph for scheduling.
//!
//! This module provides `TaskGraph`, the validated DAG over a
//! workflow's tasks. Nodes carry task ids only; dependency edges point
//! from a dependency to its dependent. Task records stay in an arena
//! keyed by id, so the graph is plain data with no ownership cycles.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::core::task::{TaskId, TaskStatus, WorkflowTask};
use crate::error::{Error, Result};
use crate::workflow::ExecutionStrategy;

/// The dependency graph for one workflow's tasks.
pub struct TaskGraph {
    /// The underlying directed graph; edges run dependency → dependent.
    graph: DiGraph<TaskId, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Build a graph from materialized tasks.
    ///
    /// Duplicate dependency entries are collapsed. Every dependency id
    /// must refer to a sibling task in the same slice.
    pub fn build(tasks: &[WorkflowTask]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for task in tasks {
            let node = graph.add_node(task.id);
            index.insert(task.id, node);
        }

        for task in tasks {
            let to = index[&task.id];
            let mut seen = HashSet::new();
            for dep in &task.depends_on {
                if !seen.insert(*dep) {
                    continue;
                }
                let from = *index.get(dep).ok_or_else(|| {
                    Error::Validation(format!(
                        "task {} depends on unknown task {}",
                        task.id.short(),
                        dep.short()
                    ))
                })?;
                graph.add_edge(from, to, ());
            }
        }

        Ok(Self { graph, index })
    }

    /// Validate acyclicity and compute the topological layering.
    ///
    /// Runs Kahn's algorithm: repeatedly remove nodes with in-degree
    /// zero, one wavefront layer at a time. If nodes remain once no
    /// more removals are possible, that remaining set is the cycle and
    /// is reported verbatim in the error. A self-dependency is a cycle
    /// of one.
    pub fn validate(&self) -> Result<Vec<Vec<TaskId>>> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();

        let mut current: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n] == 0)
            .collect();

        let mut layers = Vec::new();
        let mut removed = 0usize;

        while !current.is_empty() {
            let mut next = VecDeque::new();
            let mut layer = Vec::with_capacity(current.len());

            for node in current.drain(..) {
                layer.push(self.graph[node]);
                removed += 1;
                for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    let deg = in_degree.get_mut(&succ).expect("successor tracked");
                    *deg -= 1;
                    if *deg == 0 {
                        next.push_back(succ);
                    }
                }
            }

            layers.push(layer);
            current = next;
        }

        if removed < self.graph.node_count() {
            let cycle: Vec<TaskId> = self
                .graph
                .node_indices()
                .filter(|n| in_degree[n] > 0)
                .map(|n| self.graph[n])
                .collect();
            return Err(Error::CyclicPlan { cycle });
        }

        Ok(layers)
    }

    /// Direct dependencies of a task (its upstream tasks).
    pub fn dependencies(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct dependents of a task (its downstream tasks).
    pub fn dependents(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, dir: Direction) -> Vec<TaskId> {
        match self.index.get(id) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, dir)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        }
    }

    /// All tasks transitively reachable from `id` via dependency edges.
    ///
    /// Used for failure propagation: when a task fails, every
    /// descendant is skipped without ever being dispatched.
    pub fn descendants(&self, id: &TaskId) -> HashSet<TaskId> {
        let mut result = HashSet::new();
        let Some(&start) = self.index.get(id) else {
            return result;
        };

        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if result.insert(self.graph[succ]) {
                    queue.push_back(succ);
                }
            }
        }
        result
    }

    /// Compute the current ready set.
    ///
    /// A task is ready iff it is still schedulable (`Pending` or
    /// `Ready`) and every dependency is `Completed`. Recomputed on
    /// every state change rather than cached; the graphs here are tens
    /// of tasks, so the cost is negligible.
    pub fn ready_tasks(&self, statuses: &HashMap<TaskId, TaskStatus>) -> Vec<TaskId> {
        self.graph
            .node_indices()
            .filter(|&node| {
                let id = self.graph[node];
                match statuses.get(&id) {
                    Some(TaskStatus::Pending) | Some(TaskStatus::Ready) => self
                        .graph
                        .neighbors_directed(node, Direction::Incoming)
                        .all(|dep| {
                            statuses.get(&self.graph[dep]) == Some(&TaskStatus::Completed)
                        }),
                    _ => false,
                }
            })
            .map(|node| self.graph[node])
            .collect()
    }

    /// Infer the execution strategy from the dependency shape.
    ///
    /// No edges means every task is independent; chains (every node
    /// with at most one predecessor and one successor) run
    /// sequentially; anything else is a general DAG wavefront.
    pub fn infer_strategy(&self) -> ExecutionStrategy {
        if self.graph.edge_count() == 0 {
            return ExecutionStrategy::Parallel;
        }

        let is_chain = self.graph.node_indices().all(|n| {
            self.graph.neighbors_directed(n, Direction::Incoming).count() <= 1
                && self.graph.neighbors_directed(n, Direction::Outgoing).count() <= 1
        });

        if is_chain {
            ExecutionStrategy::Sequential
        } else {
            ExecutionStrategy::Dag
        }
    }

    /// Number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the graph contains a task.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

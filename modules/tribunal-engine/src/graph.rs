//! Graph construction and validation.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::GraphError;
use crate::traits::Task;

/// Routing decision returned by a conditional edge's selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Activate these declared branches.
    To(Vec<String>),
    /// Activate nothing; this path of the run is finished.
    End,
}

impl Route {
    pub fn to(task: impl Into<String>) -> Self {
        Route::To(vec![task.into()])
    }

    pub fn all<I, T>(tasks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Route::To(tasks.into_iter().map(Into::into).collect())
    }
}

pub(crate) type Selector<S> = Arc<dyn Fn(&S) -> Route + Send + Sync>;

pub(crate) struct Node<S, U> {
    pub name: String,
    pub task: Arc<dyn Task<S, U>>,
}

pub(crate) struct Conditional<S> {
    pub branches: Vec<usize>,
    pub selector: Selector<S>,
}

/// Accumulates tasks and edges. Every call validates eagerly: unknown
/// names and cycles are rejected at the call that introduces them.
pub struct GraphBuilder<S, U> {
    nodes: Vec<Node<S, U>>,
    index: HashMap<String, usize>,
    direct: Vec<Vec<usize>>,
    conditional: HashMap<usize, Conditional<S>>,
    predecessors: Vec<BTreeSet<usize>>,
}

impl<S, U> Default for GraphBuilder<S, U>
where
    S: Send + Sync + 'static,
    U: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, U> GraphBuilder<S, U>
where
    S: Send + Sync + 'static,
    U: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            direct: Vec::new(),
            conditional: HashMap::new(),
            predecessors: Vec::new(),
        }
    }

    /// Register a task. Each name in `inputs` must already be registered and
    /// becomes an unconditional edge into the new task.
    pub fn register(
        &mut self,
        name: &str,
        task: impl Task<S, U> + 'static,
        inputs: &[&str],
    ) -> Result<&mut Self, GraphError> {
        if self.index.contains_key(name) {
            return Err(GraphError::DuplicateTask(name.to_string()));
        }
        let inputs = inputs
            .iter()
            .map(|input| self.lookup(input))
            .collect::<Result<Vec<_>, _>>()?;

        let id = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            task: Arc::new(task),
        });
        self.index.insert(name.to_string(), id);
        self.direct.push(Vec::new());
        self.predecessors.push(BTreeSet::new());

        for from in inputs {
            self.link(from, id)?;
        }
        Ok(self)
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<&mut Self, GraphError> {
        let from = self.lookup(from)?;
        let to = self.lookup(to)?;
        self.link(from, to)?;
        Ok(self)
    }

    /// Attach a routing decision to `from`. The selector must be pure and may
    /// only name tasks listed in `branches`.
    pub fn add_conditional_edge(
        &mut self,
        from: &str,
        branches: &[&str],
        selector: impl Fn(&S) -> Route + Send + Sync + 'static,
    ) -> Result<&mut Self, GraphError> {
        let from_id = self.lookup(from)?;
        let branch_ids = branches
            .iter()
            .map(|b| self.lookup(b))
            .collect::<Result<Vec<_>, _>>()?;

        if self.conditional.contains_key(&from_id) {
            return Err(GraphError::DuplicateEdge {
                from: from.to_string(),
                to: "<conditional>".to_string(),
            });
        }
        for &to in &branch_ids {
            self.check_new_edge(from_id, to)?;
        }
        for &to in &branch_ids {
            self.predecessors[to].insert(from_id);
        }
        self.conditional.insert(
            from_id,
            Conditional {
                branches: branch_ids,
                selector: Arc::new(selector),
            },
        );
        Ok(self)
    }

    /// Freeze the builder into an executable graph rooted at `entry`.
    pub fn compile(self, entry: &str) -> Result<Graph<S, U>, GraphError> {
        let entry_id = self.lookup(entry)?;
        if !self.predecessors[entry_id].is_empty() {
            return Err(GraphError::EntryHasInputs(entry.to_string()));
        }

        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = vec![entry_id];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut reachable[id], true) {
                continue;
            }
            stack.extend(self.successors_of(id));
        }
        if let Some(id) = reachable.iter().position(|r| !r) {
            return Err(GraphError::Unreachable(self.nodes[id].name.clone()));
        }

        Ok(Graph {
            nodes: self.nodes,
            direct: self.direct,
            conditional: self.conditional,
            predecessors: self.predecessors,
            entry: entry_id,
        })
    }

    fn lookup(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    fn link(&mut self, from: usize, to: usize) -> Result<(), GraphError> {
        self.check_new_edge(from, to)?;
        self.direct[from].push(to);
        self.predecessors[to].insert(from);
        Ok(())
    }

    fn check_new_edge(&self, from: usize, to: usize) -> Result<(), GraphError> {
        if self.predecessors[to].contains(&from) {
            return Err(GraphError::DuplicateEdge {
                from: self.nodes[from].name.clone(),
                to: self.nodes[to].name.clone(),
            });
        }
        if let Some(mut path) = self.path_between(to, from) {
            path.push(self.nodes[to].name.clone());
            return Err(GraphError::Cycle { path });
        }
        Ok(())
    }

    /// Names along some existing path `start` → … → `goal`, if any.
    fn path_between(&self, start: usize, goal: usize) -> Option<Vec<String>> {
        let mut parent: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![start];
        visited[start] = true;

        while let Some(id) = stack.pop() {
            if id == goal {
                let mut path = vec![self.nodes[id].name.clone()];
                let mut cursor = id;
                while let Some(prev) = parent[cursor] {
                    path.push(self.nodes[prev].name.clone());
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.successors_of(id) {
                if !visited[next] {
                    visited[next] = true;
                    parent[next] = Some(id);
                    stack.push(next);
                }
            }
        }
        None
    }

    fn successors_of(&self, id: usize) -> Vec<usize> {
        let mut out = self.direct[id].clone();
        if let Some(cond) = self.conditional.get(&id) {
            out.extend(cond.branches.iter().copied());
        }
        out
    }
}

/// Immutable, validated task graph.
pub struct Graph<S, U> {
    pub(crate) nodes: Vec<Node<S, U>>,
    pub(crate) direct: Vec<Vec<usize>>,
    pub(crate) conditional: HashMap<usize, Conditional<S>>,
    pub(crate) predecessors: Vec<BTreeSet<usize>>,
    pub(crate) entry: usize,
}

impl<S, U> Graph<S, U> {
    /// Task names in registration order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub(crate) fn name(&self, id: usize) -> &str {
        &self.nodes[id].name
    }
}

impl<S, U> fmt::Debug for Graph<S, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("tasks", &self.task_names().collect::<Vec<_>>())
            .field("entry", &self.name(self.entry))
            .finish()
    }
}

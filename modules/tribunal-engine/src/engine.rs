//! The superstep loop.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tracing::{info, Instrument};

use crate::context::TaskContext;
use crate::error::ExecutionError;
use crate::graph::{Graph, Route};
use crate::trace::{LogTraceSink, TraceEvent, TraceKind, TraceSink};
use crate::traits::Reducer;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Upper bound on any single task. `None` waits indefinitely.
    pub task_timeout: Option<Duration>,
}

/// Final state plus the ordered trace of the run.
#[derive(Debug)]
pub struct Outcome<S> {
    pub state: S,
    pub trace: Vec<TraceEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pending,
    Activated,
    Done,
    Skipped,
}

impl Status {
    fn settled(self) -> bool {
        matches!(self, Status::Done | Status::Skipped)
    }
}

enum Failure {
    Error(anyhow::Error),
    Panicked(String),
    TimedOut(Duration),
}

/// Generic task graph executor.
///
/// Run ready tasks concurrently → combine → reduce → route → repeat.
/// A task is ready once some predecessor routed to it and every
/// predecessor has settled, so every join is all-of.
pub struct Engine<S, U, R> {
    graph: Arc<Graph<S, U>>,
    reducer: R,
    sink: Arc<dyn TraceSink>,
    config: EngineConfig,
    labels: Arc<BTreeMap<String, String>>,
}

impl<S, U, R> Engine<S, U, R>
where
    S: Clone + Send + Sync + 'static,
    U: Send + 'static,
    R: Reducer<S, U>,
{
    pub fn new(graph: Graph<S, U>, reducer: R) -> Self {
        Self {
            graph: Arc::new(graph),
            reducer,
            sink: Arc::new(LogTraceSink),
            config: EngineConfig::default(),
            labels: Arc::new(BTreeMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a label that every task context carries.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.labels).insert(key.into(), value.into());
        self
    }

    /// Execute the graph from its entry task until no task is ready.
    pub async fn run(&self, initial: S, run_id: &str) -> Result<Outcome<S>, ExecutionError> {
        let graph = &self.graph;
        let mut tracer = Tracer::new(run_id, self.sink.clone());
        let mut status = vec![Status::Pending; graph.nodes.len()];
        status[graph.entry] = Status::Activated;
        let mut state = initial;
        let mut superstep = 0usize;

        loop {
            self.skip_unreachable(&mut status, &mut tracer, superstep);

            let ready: Vec<usize> = (0..graph.nodes.len())
                .filter(|&id| {
                    status[id] == Status::Activated
                        && graph.predecessors[id].iter().all(|&p| status[p].settled())
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            superstep += 1;

            info!(
                run_id,
                superstep,
                tasks = ?ready.iter().map(|&id| graph.name(id)).collect::<Vec<_>>(),
                "Starting superstep"
            );

            let mut updates = self
                .execute_superstep(&ready, &state, run_id, superstep, &mut tracer)
                .await?;

            // Combine in registration order so results never depend on
            // completion timing.
            let mut combined: Option<U> = None;
            for &id in &ready {
                let Some(update) = updates.remove(&id) else {
                    continue;
                };
                match combined.as_mut() {
                    None => combined = Some(update),
                    Some(acc) => {
                        self.reducer
                            .combine(acc, update)
                            .map_err(|source| ExecutionError::Contract {
                                task: graph.name(id).to_string(),
                                source,
                            })?;
                    }
                }
            }
            if let Some(update) = combined {
                self.reducer
                    .reduce(&mut state, update)
                    .map_err(|source| ExecutionError::Contract {
                        task: ready
                            .iter()
                            .map(|&id| graph.name(id))
                            .collect::<Vec<_>>()
                            .join(", "),
                        source,
                    })?;
            }

            for &id in &ready {
                status[id] = Status::Done;
            }
            for &id in &ready {
                self.route(id, &state, &mut status, &mut tracer, superstep)?;
            }
        }

        info!(run_id, supersteps = superstep, "Run settled");
        Ok(Outcome {
            state,
            trace: tracer.into_events(),
        })
    }

    /// Spawn every ready task against one snapshot and wait for all of them.
    /// The first failure aborts the rest.
    async fn execute_superstep(
        &self,
        ready: &[usize],
        state: &S,
        run_id: &str,
        superstep: usize,
        tracer: &mut Tracer,
    ) -> Result<HashMap<usize, U>, ExecutionError> {
        let snapshot = Arc::new(state.clone());
        let run_id: Arc<str> = Arc::from(run_id);
        let mut set = JoinSet::new();
        let mut spawned = HashMap::with_capacity(ready.len());

        for &id in ready {
            let node = &self.graph.nodes[id];
            let task = node.task.clone();
            let ctx = TaskContext::new(run_id.clone(), node.name.clone())
                .with_superstep(superstep)
                .with_labels(self.labels.clone());
            let snapshot = snapshot.clone();
            let timeout = self.config.task_timeout;
            tracer.record(superstep, &node.name, TraceKind::Started);

            let handle = set.spawn(async move {
                let started = Instant::now();
                let span = ctx.span();
                let body = AssertUnwindSafe(task.run(snapshot, ctx).instrument(span)).catch_unwind();
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, body).await {
                        Ok(result) => result,
                        Err(_) => return (id, started.elapsed(), Err(Failure::TimedOut(limit))),
                    },
                    None => body.await,
                };
                let result = match outcome {
                    Ok(Ok(update)) => Ok(update),
                    Ok(Err(err)) => Err(Failure::Error(err)),
                    Err(panic) => Err(Failure::Panicked(panic_message(panic.as_ref()))),
                };
                (id, started.elapsed(), result)
            });
            spawned.insert(handle.id(), id);
        }

        let mut updates = HashMap::with_capacity(ready.len());
        while let Some(joined) = set.join_next().await {
            let (id, elapsed, result) = settle(joined, &spawned);
            let name = self.graph.name(id).to_string();
            match result {
                Ok(update) => {
                    tracer.record(
                        superstep,
                        &name,
                        TraceKind::Completed {
                            elapsed_ms: elapsed.as_millis() as u64,
                        },
                    );
                    updates.insert(id, update);
                }
                Err(failure) => {
                    set.shutdown().await;
                    let error = match failure {
                        Failure::Error(source) => ExecutionError::Task { task: name.clone(), source },
                        Failure::Panicked(message) => ExecutionError::Panicked {
                            task: name.clone(),
                            message,
                        },
                        Failure::TimedOut(after) => ExecutionError::TimedOut {
                            task: name.clone(),
                            after,
                        },
                    };
                    tracer.record(
                        superstep,
                        &name,
                        TraceKind::Failed {
                            error: error.to_string(),
                        },
                    );
                    for &other in ready {
                        if other != id && !updates.contains_key(&other) {
                            tracer.record(superstep, self.graph.name(other), TraceKind::Cancelled);
                        }
                    }
                    return Err(error);
                }
            }
        }
        Ok(updates)
    }

    fn route(
        &self,
        id: usize,
        state: &S,
        status: &mut [Status],
        tracer: &mut Tracer,
        superstep: usize,
    ) -> Result<(), ExecutionError> {
        let graph = &self.graph;
        let mut targets = graph.direct[id].clone();

        if let Some(cond) = graph.conditional.get(&id) {
            if let Route::To(names) = (cond.selector)(state) {
                for target in names {
                    let branch = cond
                        .branches
                        .iter()
                        .copied()
                        .find(|&b| graph.name(b) == target)
                        .ok_or_else(|| ExecutionError::UnknownRoute {
                            task: graph.name(id).to_string(),
                            target: target.clone(),
                        })?;
                    targets.push(branch);
                }
            }
        }

        for &target in &targets {
            if status[target] == Status::Pending {
                status[target] = Status::Activated;
            }
        }
        tracer.record(
            superstep,
            graph.name(id),
            TraceKind::Routed {
                targets: targets.iter().map(|&t| graph.name(t).to_string()).collect(),
            },
        );
        Ok(())
    }

    /// Mark pending tasks whose predecessors have all settled without
    /// routing to them. Repeats until nothing changes so skips propagate.
    fn skip_unreachable(&self, status: &mut [Status], tracer: &mut Tracer, superstep: usize) {
        let graph = &self.graph;
        loop {
            let mut changed = false;
            for id in 0..graph.nodes.len() {
                if status[id] == Status::Pending
                    && !graph.predecessors[id].is_empty()
                    && graph.predecessors[id].iter().all(|&p| status[p].settled())
                {
                    status[id] = Status::Skipped;
                    tracer.record(superstep, graph.name(id), TraceKind::Skipped);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

type Settled<U> = (usize, Duration, Result<U, Failure>);

/// Panics are caught inside the task, so a `JoinError` can only be a
/// cancellation the engine did not request. It fails the task it belongs to.
fn settle<U>(joined: Result<Settled<U>, JoinError>, spawned: &HashMap<TaskId, usize>) -> Settled<U> {
    match joined {
        Ok(settled) => settled,
        Err(err) => {
            // Every task in the set was registered in `spawned` when spawned.
            let id = spawned[&err.id()];
            let source = anyhow::Error::new(err).context("task did not run to completion");
            (id, Duration::ZERO, Err(Failure::Error(source)))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

struct Tracer {
    run_id: String,
    seq: u64,
    sink: Arc<dyn TraceSink>,
    events: Vec<TraceEvent>,
}

impl Tracer {
    fn new(run_id: &str, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            run_id: run_id.to_string(),
            seq: 0,
            sink,
            events: Vec::new(),
        }
    }

    fn record(&mut self, superstep: usize, task: &str, kind: TraceKind) {
        self.seq += 1;
        let event = TraceEvent {
            run_id: self.run_id.clone(),
            seq: self.seq,
            superstep,
            task: task.to_string(),
            kind,
            at: Utc::now(),
        };
        self.sink.record(&event);
        self.events.push(event);
    }

    fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

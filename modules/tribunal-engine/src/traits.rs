//! Core traits for the task engine.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::context::TaskContext;
use crate::error::ReduceError;

/// A unit of work in the graph. May perform I/O.
///
/// Receives a read-only snapshot of the state as it stood when the
/// superstep began and returns a partial update. Tasks never mutate
/// shared state.
#[async_trait]
pub trait Task<S, U>: Send + Sync
where
    S: Send + Sync + 'static,
    U: Send + 'static,
{
    async fn run(&self, state: Arc<S>, ctx: TaskContext) -> Result<U>;
}

/// Pure merge rules for partial updates. No I/O, no side effects.
///
/// `combine` folds the updates of tasks that ran in the same superstep, in
/// registration order, and is where concurrent-write contracts are checked.
/// `reduce` applies the combined update to the state once per superstep.
pub trait Reducer<S, U>: Send + Sync {
    fn combine(&self, acc: &mut U, next: U) -> Result<(), ReduceError>;

    fn reduce(&self, state: &mut S, update: U) -> Result<(), ReduceError>;
}

impl<S, U, R: Reducer<S, U> + ?Sized> Reducer<S, U> for Arc<R> {
    fn combine(&self, acc: &mut U, next: U) -> Result<(), ReduceError> {
        (**self).combine(acc, next)
    }

    fn reduce(&self, state: &mut S, update: U) -> Result<(), ReduceError> {
        (**self).reduce(state, update)
    }
}

// ---------------------------------------------------------------------------
// Closure adapter
// ---------------------------------------------------------------------------

/// Adapts an async closure into a `Task`.
pub struct FnTask<F, S, U> {
    body: F,
    _phantom: PhantomData<fn() -> (S, U)>,
}

pub fn task_fn<F, Fut, S, U>(body: F) -> FnTask<F, S, U>
where
    F: Fn(Arc<S>, TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<U>> + Send,
{
    FnTask {
        body,
        _phantom: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, S, U> Task<S, U> for FnTask<F, S, U>
where
    F: Fn(Arc<S>, TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<U>> + Send,
    S: Send + Sync + 'static,
    U: Send + 'static,
{
    async fn run(&self, state: Arc<S>, ctx: TaskContext) -> Result<U> {
        (self.body)(state, ctx).await
    }
}

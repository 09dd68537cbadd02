//! Fan-in barrier.

use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::context::TaskContext;
use crate::traits::Task;

/// A task meant to sit where parallel branches meet.
///
/// The engine already holds every task until all of its inputs have
/// settled, so a `Join` only adds the synchronous step that runs once the
/// barrier releases: verify the merged state and optionally contribute a
/// follow-up update. Its body must be pure.
pub struct Join<S, U> {
    body: Box<dyn Fn(&S, &TaskContext) -> Result<U> + Send + Sync>,
    _phantom: PhantomData<fn() -> U>,
}

impl<S, U> Join<S, U> {
    pub fn new(body: impl Fn(&S, &TaskContext) -> Result<U> + Send + Sync + 'static) -> Self {
        Self {
            body: Box::new(body),
            _phantom: PhantomData,
        }
    }
}

impl<S, U: Default> Join<S, U> {
    /// A barrier that only checks a precondition and contributes nothing.
    pub fn check(check: impl Fn(&S) -> Result<()> + Send + Sync + 'static) -> Self {
        Self::new(move |state, _ctx| {
            check(state)?;
            Ok(U::default())
        })
    }
}

#[async_trait]
impl<S, U> Task<S, U> for Join<S, U>
where
    S: Send + Sync + 'static,
    U: Send + 'static,
{
    async fn run(&self, state: Arc<S>, ctx: TaskContext) -> Result<U> {
        info!(run_id = ctx.run_id(), join = ctx.task(), "Barrier released");
        (self.body)(&state, &ctx)
    }
}

//! Per job type handlers run by workers.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use queue_core::LeaseRecord;

/// `Err` carries the failure reason; the worker requeues the job.
pub type HandlerResult = Result<(), String>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Work done for one `job_type`.
///
/// Returning `Ok` completes the lease right away, so whatever the job
/// stands for must already be durable by then.
pub trait JobHandler: Send + Sync + 'static {
    /// The `job_type` tag this handler accepts.
    fn job_type(&self) -> &str;

    fn handle(&self, lease: &LeaseRecord) -> HandlerFuture;
}

/// Handlers keyed by `job_type`, shared read-only by every worker.
///
/// A leased job whose type has no entry is requeued untouched.
#[derive(Default)]
pub struct JobHandlerRegistry {
    by_type: BTreeMap<String, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler`, replacing any earlier one for its job type.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        let job_type = handler.job_type().to_string();
        if self.by_type.insert(job_type.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(%job_type, "replaced job handler");
        }
    }

    pub fn handler_for(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.by_type.get(job_type).cloned()
    }

    pub fn handles(&self, job_type: &str) -> bool {
        self.by_type.contains_key(job_type)
    }

    /// Job types with a handler, in sorted order.
    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }
}

/// Wraps a plain function or closure as a [`JobHandler`].
pub struct FnHandler<F> {
    job_type: String,
    run: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&LeaseRecord) -> HandlerFuture + Send + Sync + 'static,
{
    pub fn new(job_type: impl Into<String>, run: F) -> Self {
        Self {
            job_type: job_type.into(),
            run,
        }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&LeaseRecord) -> HandlerFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn handle(&self, lease: &LeaseRecord) -> HandlerFuture {
        (self.run)(lease)
    }
}

//! Job handlers installed by the server binary.

use actors::{FnHandler, HandlerFuture, JobHandlerRegistry};
use queue_core::LeaseRecord;

/// Handlers for every job type this server understands.
///
/// `vcon_uuid` jobs are logged and acknowledged; processing pipelines
/// register their own handler in place of this one.
pub fn default_handlers() -> JobHandlerRegistry {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(FnHandler::new("vcon_uuid", log_vcon_job));
    handlers
}

fn log_vcon_job(lease: &LeaseRecord) -> HandlerFuture {
    let job_id = lease.job_id;
    let queue = lease.queue.clone();
    let uuids = lease.job.vcon_uuid_list().to_vec();
    Box::pin(async move {
        tracing::info!(%job_id, queue = %queue, vcon_uuids = ?uuids, "processing vCon job");
        Ok(())
    })
}

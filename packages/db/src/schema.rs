//! Database schema definitions using SurrealQL.
//!
//! Every queue operation that touches more than one record is a stored
//! function. A function call is a single statement and therefore runs in a
//! single transaction, so its steps commit together or not at all; a
//! `THROW` rolls back everything before it.
//!
//! Each function takes its records with one conditional `UPDATE` or
//! `DELETE ... RETURN BEFORE` rather than a read followed by a write, so a
//! caller only succeeds if its own statement removed the job or lease.
//! Failures are raised with `THROW "<code>:<detail>"`; see
//! [`crate::repositories`] for the mapping back to typed errors.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates all tables and (re)defines the stored functions. Safe to
/// run from every process sharing the database.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(TABLE_SCHEMA).await?.check()?;
    db.query(QUEUE_FUNCTIONS).await?.check()?;
    db.query(LEASE_FUNCTIONS).await?.check()?;
    db.query(SERVER_FUNCTIONS).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Tables backing the queue registry, FIFO lists, job id counter,
/// in-progress ledger and server registry.
const TABLE_SCHEMA: &str = r#"
-- One record per registered queue; the record id is the queue name.
-- `jobs` holds JSON encoded job payloads, head first.
DEFINE TABLE IF NOT EXISTS job_queue SCHEMALESS;

-- Single counter record job_counter:jobid
DEFINE TABLE IF NOT EXISTS job_counter SCHEMALESS;

-- One record per active lease; the record id is the job id.
DEFINE TABLE IF NOT EXISTS in_progress SCHEMALESS;

-- One record per live server; the record id is the server key.
DEFINE TABLE IF NOT EXISTS server SCHEMALESS;
"#;

/// Queue registry and FIFO list functions.
const QUEUE_FUNCTIONS: &str = r#"
DEFINE FUNCTION OVERWRITE fn::create_queue($name: string) {
    LET $queue = type::thing("job_queue", $name);
    IF record::exists($queue) {
        THROW "queue_exists:" + $name;
    };
    CREATE $queue CONTENT { name: $name, jobs: [] };
    RETURN array::len((SELECT VALUE id FROM job_queue));
};

DEFINE FUNCTION OVERWRITE fn::delete_queue($name: string) {
    LET $before = (DELETE ONLY type::thing("job_queue", $name) RETURN BEFORE);
    IF $before = NONE {
        THROW "queue_not_found:" + $name;
    };
    RETURN $before.jobs;
};

DEFINE FUNCTION OVERWRITE fn::queue_jobs($name: string) {
    LET $queue = type::thing("job_queue", $name);
    IF !record::exists($queue) {
        THROW "queue_not_found:" + $name;
    };
    RETURN (SELECT VALUE jobs FROM ONLY $queue);
};

DEFINE FUNCTION OVERWRITE fn::push_job($name: string, $job: string) {
    LET $queue = type::thing("job_queue", $name);
    LET $after = (UPDATE ONLY $queue SET jobs = array::append(jobs, $job) RETURN AFTER);
    IF $after = NONE {
        THROW "queue_not_found:" + $name;
    };
    RETURN array::len($after.jobs);
};
"#;

/// Lease functions spanning queue, counter and ledger.
const LEASE_FUNCTIONS: &str = r#"
DEFINE FUNCTION OVERWRITE fn::lease_next_job($name: string, $server: string, $start: float) {
    LET $queue = type::thing("job_queue", $name);
    LET $before = (UPDATE ONLY $queue SET jobs = array::slice(jobs, 1) WHERE array::len(jobs) > 0 RETURN BEFORE);
    IF $before = NONE {
        IF record::exists($queue) {
            THROW "queue_empty:" + $name;
        };
        THROW "queue_not_found:" + $name;
    };
    LET $jobid = (UPSERT ONLY job_counter:jobid SET current += 1 RETURN VALUE current);
    LET $lease = { jobid: $jobid, queue: $name, server: $server, start_time: $start, job: $before.jobs[0] };
    -- CREATE fails on an existing id, so a racing writer that reused a job id cannot commit.
    CREATE type::thing("in_progress", $jobid) CONTENT $lease;
    RETURN $lease;
};

DEFINE FUNCTION OVERWRITE fn::requeue_lease($jobid: int) {
    LET $record = (DELETE ONLY type::thing("in_progress", $jobid) RETURN BEFORE);
    IF $record = NONE {
        THROW "job_not_found:" + <string> $jobid;
    };
    LET $queue = type::thing("job_queue", $record.queue);
    LET $after = (UPDATE ONLY $queue SET jobs = array::prepend(jobs, $record.job) RETURN AFTER);
    IF $after = NONE {
        THROW "queue_not_found:" + $record.queue;
    };
    RETURN {
        jobid: $record.jobid,
        queue: $record.queue,
        server: $record.server,
        start_time: $record.start_time,
        job: $record.job,
    };
};

DEFINE FUNCTION OVERWRITE fn::complete_lease($jobid: int) {
    LET $record = (DELETE ONLY type::thing("in_progress", $jobid) RETURN BEFORE);
    IF $record = NONE {
        THROW "job_not_found:" + <string> $jobid;
    };
    RETURN {
        jobid: $record.jobid,
        queue: $record.queue,
        server: $record.server,
        start_time: $record.start_time,
        job: $record.job,
    };
};
"#;

/// Server registry functions.
const SERVER_FUNCTIONS: &str = r#"
DEFINE FUNCTION OVERWRITE fn::delete_server($key: string) {
    LET $server = type::thing("server", $key);
    LET $existed = record::exists($server);
    DELETE $server;
    RETURN $existed;
};
"#;

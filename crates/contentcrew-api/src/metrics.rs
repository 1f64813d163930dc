use tracing::info;
use uuid::Uuid;

pub fn job_started(kind: &str, article_id: Uuid, running: usize, available_permits: usize) {
    info!(
        target = "telemetry.api",
        kind,
        article_id = %article_id,
        running_jobs = running,
        available_permits,
        event = "job_started"
    );
}

pub fn job_completed(kind: &str, article_id: Uuid, trace_events: usize, draft_number: Option<i32>) {
    info!(
        target = "telemetry.api",
        kind,
        article_id = %article_id,
        trace_events,
        draft_number,
        event = "job_completed"
    );
}

pub fn job_failed(kind: &str, article_id: Uuid, error: &str) {
    info!(
        target = "telemetry.api",
        kind,
        article_id = %article_id,
        error,
        event = "job_failed"
    );
}

pub fn stream_opened(article_id: Uuid) {
    info!(
        target = "telemetry.api",
        article_id = %article_id,
        event = "stream_opened"
    );
}

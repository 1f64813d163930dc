use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};

struct PipelineMetrics {
    stages: Counter<u64>,
    searches: Counter<u64>,
    search_hits: Histogram<u64>,
}

static METRICS: OnceCell<PipelineMetrics> = OnceCell::new();

fn handles() -> &'static PipelineMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("contentcrew.pipeline");
        PipelineMetrics {
            stages: meter
                .u64_counter("pipeline_stage_runs_total")
                .with_description("Pipeline stage executions by stage and status")
                .init(),
            searches: meter
                .u64_counter("web_search_calls_total")
                .with_description("Web search calls by outcome")
                .init(),
            search_hits: meter
                .u64_histogram("web_search_results")
                .with_description("Organic results returned per successful search")
                .init(),
        }
    })
}

/// Record one stage execution (no-op if no provider installed).
pub(crate) fn record_stage(stage: &str, status: &str) {
    handles().stages.add(
        1,
        &[
            KeyValue::new("stage", stage.to_string()),
            KeyValue::new("status", status.to_string()),
        ],
    );
}

pub(crate) fn record_search(outcome: &str, hits: usize) {
    let metrics = handles();
    let attrs = [KeyValue::new("outcome", outcome.to_string())];
    metrics.searches.add(1, &attrs);
    if outcome == "ok" {
        metrics.search_hits.record(hits as u64, &attrs);
    }
}

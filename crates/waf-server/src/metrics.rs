use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// 初始化 Prometheus metrics exporter
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_metrics();

    tracing::info!("Metrics exporter started on http://{}/metrics", addr);
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "waf_pipeline_evaluations_total",
        "Total number of pipeline evaluations"
    );
    describe_counter!(
        "waf_pipeline_decisions_total",
        "Pipeline decisions by kind"
    );
    describe_counter!(
        "waf_rule_faults_total",
        "Rule runtime faults by kind"
    );
    describe_histogram!(
        "waf_rule_duration_seconds",
        "Rule execution duration in seconds"
    );
    describe_gauge!(
        "waf_snapshot_stale",
        "1 while a domain is served from a snapshot older than the staleness alarm"
    );
}

//! Prometheus metrics HTTP endpoint
//!
//! Exposes router metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Histogram with cumulative buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_input_metrics(&mut output, &summary);
    write_throttle_metrics(&mut output, &summary);
    write_fetch_metrics(&mut output, &summary);

    output
}

fn write_input_metrics(output: &mut String, summary: &MetricsSummary) {
    write_metric(
        output,
        "campus_router_map_events_total",
        "Map view events processed",
        MetricType::Counter,
        summary.map_events_total,
    );
    write_metric(
        output,
        "campus_router_map_events_ignored_total",
        "Map view events that changed nothing or failed to parse",
        MetricType::Counter,
        summary.map_events_ignored,
    );
    write_metric(
        output,
        "campus_router_position_updates_total",
        "Live position fixes applied",
        MetricType::Counter,
        summary.position_updates_total,
    );
    write_metric(
        output,
        "campus_router_position_errors_total",
        "Live position errors reported by the source",
        MetricType::Counter,
        summary.position_errors_total,
    );
}

fn write_throttle_metrics(output: &mut String, summary: &MetricsSummary) {
    write_metric(
        output,
        "campus_router_throttle_invocations_total",
        "Route fetch requests submitted to the rate limiter",
        MetricType::Counter,
        summary.throttle_invocations,
    );
    write_metric(
        output,
        "campus_router_throttle_immediate_total",
        "Rate limiter invocations that fired immediately",
        MetricType::Counter,
        summary.throttle_immediate,
    );
    write_metric(
        output,
        "campus_router_throttle_coalesced_total",
        "Rate limiter invocations deferred to a trailing fire",
        MetricType::Counter,
        summary.throttle_coalesced,
    );
}

fn write_fetch_metrics(output: &mut String, summary: &MetricsSummary) {
    write_metric(
        output,
        "campus_router_fetches_issued_total",
        "Directions requests sent",
        MetricType::Counter,
        summary.fetches_issued,
    );
    write_metric(
        output,
        "campus_router_fetches_applied_total",
        "Directions responses applied as the current route",
        MetricType::Counter,
        summary.fetches_applied,
    );
    write_metric(
        output,
        "campus_router_fetches_failed_total",
        "Directions requests that failed",
        MetricType::Counter,
        summary.fetches_failed,
    );
    write_metric(
        output,
        "campus_router_responses_stale_total",
        "Directions responses discarded as stale",
        MetricType::Counter,
        summary.responses_stale,
    );

    write_histogram(
        output,
        "campus_router_fetch_latency_ms",
        "Directions request round trip in milliseconds",
        &summary.fetch_latency_buckets,
        summary.fetch_latency_sum_ms,
    );
    write_metric(
        output,
        "campus_router_fetch_latency_p95_ms",
        "95th percentile directions latency",
        MetricType::Gauge,
        summary.fetch_latency_p95_ms,
    );
    write_metric(
        output,
        "campus_router_fetch_latency_max_ms",
        "Maximum directions latency",
        MetricType::Gauge,
        summary.fetch_latency_max_ms,
    );
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Full::new(Bytes::from(format_prometheus_metrics(&metrics)))),
        (&Method::GET, "/health") => {
            Response::builder().status(StatusCode::OK).body(Full::new(Bytes::from("ok")))
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found"))),
    };
    Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

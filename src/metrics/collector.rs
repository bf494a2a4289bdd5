//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the team-queue service
//! using Prometheus metrics.

use crate::types::{Team, Verdict};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the queue service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Waiting list metrics
    queue_metrics: QueueMetrics,

    /// Admission pass metrics
    admission_metrics: AdmissionMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Waiting list metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Players currently queued
    pub players_queued: IntGauge,

    /// Players currently marked away
    pub players_afk: IntGauge,

    /// Players added to the queue, by how they got there
    pub players_enqueued_total: IntCounterVec,

    /// Players moved from the queue onto a team
    pub players_admitted_total: IntCounterVec,

    /// Queue entries dropped because the player could not be admitted
    pub stale_dropped_total: IntCounter,

    /// Verdicts returned for join attempts
    pub verdicts_total: IntCounterVec,
}

/// Admission pass metrics
#[derive(Clone)]
pub struct AdmissionMetrics {
    /// Pass requests by outcome (coalesced, skipped, executed)
    pub passes_total: IntCounterVec,

    /// Time spent planning and issuing one pass
    pub pass_duration: Histogram,

    /// Host calls made by the frame worker
    pub host_calls_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let admission_metrics = AdmissionMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            admission_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get admission metrics
    pub fn admission(&self) -> &AdmissionMetrics {
        &self.admission_metrics
    }

    /// Update the current queue and away list sizes
    pub fn update_queue_sizes(&self, queued: usize, afk: usize) {
        self.queue_metrics.players_queued.set(queued as i64);
        self.queue_metrics.players_afk.set(afk as i64);
    }

    /// Record a player entering the queue
    pub fn record_enqueued(&self, reason: &str) {
        self.queue_metrics
            .players_enqueued_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a player admitted to a team
    pub fn record_admitted(&self, team: Team) {
        let team_str = team.to_string();
        self.queue_metrics
            .players_admitted_total
            .with_label_values(&[team_str.as_str()])
            .inc();
    }

    /// Record a stale queue entry being dropped
    pub fn record_stale_dropped(&self) {
        self.queue_metrics.stale_dropped_total.inc();
    }

    /// Record a join attempt verdict
    pub fn record_verdict(&self, verdict: Verdict) {
        let verdict_str = match verdict {
            Verdict::Allow => "allow",
            Verdict::Veto => "veto",
        };
        self.queue_metrics
            .verdicts_total
            .with_label_values(&[verdict_str])
            .inc();
    }

    /// Record what happened to an admission pass request
    pub fn record_pass(&self, outcome: &str) {
        self.admission_metrics
            .passes_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record how long an executed pass took
    pub fn record_pass_duration(&self, duration: Duration) {
        self.admission_metrics
            .pass_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a host call made by the frame worker
    pub fn record_host_call(&self, call: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.admission_metrics
            .host_calls_total
            .with_label_values(&[call, status])
            .inc();
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.service_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("team_queue_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "team_queue_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("team_queue_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "team_queue_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        let health_status = IntGauge::new(
            "team_queue_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("team_queue_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            amqp_operation_duration,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_queued =
            IntGauge::new("team_queue_players_queued", "Players currently queued")?;
        registry.register(Box::new(players_queued.clone()))?;

        let players_afk = IntGauge::new("team_queue_players_afk", "Players currently away")?;
        registry.register(Box::new(players_afk.clone()))?;

        let players_enqueued_total = IntCounterVec::new(
            Opts::new(
                "team_queue_players_enqueued_total",
                "Players added to the queue",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(players_enqueued_total.clone()))?;

        let players_admitted_total = IntCounterVec::new(
            Opts::new(
                "team_queue_players_admitted_total",
                "Players admitted from the queue",
            ),
            &["team"],
        )?;
        registry.register(Box::new(players_admitted_total.clone()))?;

        let stale_dropped_total = IntCounter::new(
            "team_queue_stale_dropped_total",
            "Queue entries dropped as not admittable",
        )?;
        registry.register(Box::new(stale_dropped_total.clone()))?;

        let verdicts_total = IntCounterVec::new(
            Opts::new("team_queue_verdicts_total", "Join attempt verdicts"),
            &["verdict"],
        )?;
        registry.register(Box::new(verdicts_total.clone()))?;

        Ok(Self {
            players_queued,
            players_afk,
            players_enqueued_total,
            players_admitted_total,
            stale_dropped_total,
            verdicts_total,
        })
    }
}

impl AdmissionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let passes_total = IntCounterVec::new(
            Opts::new("team_queue_admission_passes_total", "Admission pass requests"),
            &["outcome"],
        )?;
        registry.register(Box::new(passes_total.clone()))?;

        let pass_duration = Histogram::with_opts(
            HistogramOpts::new(
                "team_queue_admission_pass_duration_seconds",
                "Admission pass processing time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(pass_duration.clone()))?;

        let host_calls_total = IntCounterVec::new(
            Opts::new("team_queue_host_calls_total", "Host calls from the frame worker"),
            &["call", "status"],
        )?;
        registry.register(Box::new(host_calls_total.clone()))?;

        Ok(Self {
            passes_total,
            pass_duration,
            host_calls_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Encoder;
    use std::time::Duration;

    fn render(collector: &MetricsCollector) -> String {
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&collector.registry().gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        // Test that we can access all metric groups
        let _service = collector.service();
        let _queue = collector.queue();
        let _admission = collector.admission();
    }

    #[test]
    fn test_queue_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.update_queue_sizes(3, 1);
        collector.record_enqueued("join_attempt");
        collector.record_admitted(Team::Red);
        collector.record_admitted(Team::Red);
        collector.record_stale_dropped();
        collector.record_verdict(Verdict::Veto);

        assert_eq!(collector.queue().players_queued.get(), 3);
        assert_eq!(collector.queue().players_afk.get(), 1);
        assert_eq!(
            collector
                .queue()
                .players_admitted_total
                .with_label_values(&["red"])
                .get(),
            2
        );

        let text = render(&collector);
        assert!(text.contains("team_queue_players_enqueued_total"));
        assert!(text.contains("team_queue_verdicts_total{verdict=\"veto\"} 1"));
    }

    #[test]
    fn test_admission_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_pass("coalesced");
        collector.record_pass("executed");
        collector.record_pass_duration(Duration::from_micros(250));
        collector.record_host_call("move", true);
        collector.record_host_call("apply_tag", false);

        assert_eq!(
            collector
                .admission()
                .passes_total
                .with_label_values(&["coalesced"])
                .get(),
            1
        );
        assert_eq!(collector.admission().pass_duration.get_sample_count(), 1);
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.update_health_status(2); // Healthy
        collector.update_component_health("scheduler", true);
        collector.update_component_health("amqp", false);
        collector.record_amqp_operation("consume", false, Duration::from_millis(3));

        assert_eq!(collector.service().health_status.get(), 2);
        assert_eq!(
            collector
                .service()
                .amqp_errors_total
                .with_label_values(&["consume"])
                .get(),
            1
        );
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();

        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}

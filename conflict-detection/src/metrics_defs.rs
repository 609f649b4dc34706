//! Metrics definitions for conflict detection.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REPORTS_RECEIVED: MetricDef = MetricDef {
    name: "conflict_report.received",
    metric_type: MetricType::Counter,
    description: "Conflict reports received. Tagged with outcome: accepted, window_closed, rejected.",
};

pub const REPORT_CLIENTS: MetricDef = MetricDef {
    name: "conflict_report.clients",
    metric_type: MetricType::Histogram,
    description: "Number of clients in each accepted conflict report",
};

pub const UNREGISTERED_CLIENTS_TOTAL: MetricDef = MetricDef {
    name: "unregistered_clients.total",
    metric_type: MetricType::Gauge,
    description: "Number of stored unregistered clients after the last merge",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REPORTS_RECEIVED,
    REPORT_CLIENTS,
    UNREGISTERED_CLIENTS_TOTAL,
    REQUEST_DURATION,
];

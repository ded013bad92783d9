//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience guards and HTTP handlers produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every breaker transition, rejection and retry is logged with the
//!   dependency name as a field
//! - Metric updates are cheap no-ops until an exporter is installed

pub mod logging;
pub mod metrics;

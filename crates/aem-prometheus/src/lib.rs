//! Prometheus metrics for the AEM deployment controller.
//!
//! [`PrometheusMetrics`] implements [`aem_core::ReconcileMetrics`] on its own
//! [`Registry`], so several controllers (or tests) never collide on the
//! default registry.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use aem_core::ReconcileMetrics;
//! use aem_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let hook: Arc<dyn ReconcileMetrics> = Arc::new(metrics.clone());
//! hook.set_queue_depth(3);
//!
//! let body = metrics.encode_text()?;
//! assert!(body.contains("aem_queue_depth 3"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `aem_reconcile_total{outcome}` - Counter
//! - `aem_reconcile_duration_seconds{outcome}` - Histogram
//! - `aem_instances_created_total{runmode}` - Counter
//! - `aem_instances_removed_total{runmode}` - Counter
//! - `aem_queue_depth` - Gauge
//!
//! Serving `/metrics` is left to the binary (see `aem-operatord`).

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};

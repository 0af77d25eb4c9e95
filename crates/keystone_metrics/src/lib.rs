//! KEYSTONE Metrics
//!
//! Captures one snapshot per coordination attempt and summarizes them over
//! time windows.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collector;

pub use collector::{
    MetricSnapshot, MetricTrend, MetricsCollector, MetricsError, MetricsResult, TrendWindow,
};

//! Monitor agent: samples the container fleet, derives CPU and memory
//! gauges from raw counters, detects anomalies against configured
//! thresholds, and publishes health alerts for the Analyzer.

pub mod anomaly;
pub mod config;
pub mod monitor;
pub mod sampler;

pub use config::MonitorConfig;
pub use monitor::MonitorAgent;

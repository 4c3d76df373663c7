// Analyzer module: trend statistics, statistical anomaly detection, and the
// fixed percentage threshold check.

pub mod anomaly;
pub mod threshold;
pub mod trends;

pub use anomaly::AnomalyDetector;
pub use trends::TrendCalculator;

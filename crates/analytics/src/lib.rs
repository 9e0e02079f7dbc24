pub mod models;
pub mod performance_tracker;
pub mod signal_analyzer;

pub use models::*;
pub use performance_tracker::PerformanceTracker;
pub use signal_analyzer::SignalAnalyzer;

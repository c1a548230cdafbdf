// Ambient infrastructure: logging setup and runner metrics
pub mod logging;
pub mod metrics;

pub use logging::{
    init_dev_logging, init_logging, init_prod_logging, parse_level, LogConfig, LogFormat, LogOutput,
};
pub use metrics::{MetricsSummary, RunnerMetrics, Timer, TimingStats};

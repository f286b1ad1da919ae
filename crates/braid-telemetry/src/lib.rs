mod logging;

pub use logging::{LogQuery, LogRecord, MemoryLogLayer, MemoryLogSink};

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by the BRAID_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "braid_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Whether to keep warn+ records in the in-memory buffer.
    pub capture_anomalies: bool,
    /// How many records the buffer retains before dropping the oldest.
    pub buffer_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            capture_anomalies: true,
            buffer_capacity: 512,
        }
    }
}

/// Handle returned by [`init_telemetry`]; keeps the anomaly buffer reachable.
pub struct TelemetryGuard {
    log_sink: Option<Arc<MemoryLogSink>>,
}

impl TelemetryGuard {
    /// Access the anomaly buffer for querying captured warn+ records.
    pub fn logs(&self) -> Option<&MemoryLogSink> {
        self.log_sink.as_deref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    let env_filter = EnvFilter::try_from_env("BRAID_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(env_filter);

    let (buffer_layer, sink) = if config.capture_anomalies {
        let sink = Arc::new(MemoryLogSink::new(config.buffer_capacity));
        (Some(MemoryLogLayer::new(sink.clone())), Some(sink))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(buffer_layer)
        .init();

    TelemetryGuard { log_sink: sink }
}

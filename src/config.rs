use serde::{Deserialize, Serialize};

/// Runtime configuration for the controller core.
/// Keeps lifecycle and timing knobs small and explicit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Device MAC as 12 uppercase hex chars; prefixes every bus topic.
    pub mac: String,

    /// Sleep at the tail of every wire scan iteration **in milliseconds**
    /// (`None` = 10).
    pub scan_sleep_ms: Option<u64>,

    /// Pause between wire-task spawns during apply **in milliseconds**
    /// (`None` = 200). Avoids starving the scheduler on bulk creation.
    pub spawn_pause_ms: Option<u64>,

    /// Deadline for a chunked configuration transfer **in seconds**
    /// (`None` = 10). On expiry the reassembly buffer is discarded.
    pub ingest_timeout_secs: Option<u64>,

    /// Period of the monitor/parent publisher tick **in milliseconds**
    /// (`None` = 100).
    pub publish_tick_ms: Option<u64>,

    /// Seconds without a "Present" heartbeat before the app is considered
    /// gone (`None` = 10).
    pub heartbeat_timeout_secs: Option<u64>,

    /// Upper bound on wires in one document (`None` = 64). A document with
    /// more wires is refused whole.
    pub max_wires: Option<usize>,
}

impl RuntimeConfig {
    pub fn new(mac: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            scan_sleep_ms: None,
            spawn_pause_ms: None,
            ingest_timeout_secs: None,
            publish_tick_ms: None,
            heartbeat_timeout_secs: None,
            max_wires: None,
        }
    }

    #[inline]
    pub fn scan_sleep_ms(&self) -> u64 {
        self.scan_sleep_ms.unwrap_or(10)
    }

    #[inline]
    pub fn spawn_pause_ms(&self) -> u64 {
        self.spawn_pause_ms.unwrap_or(200)
    }

    #[inline]
    pub fn ingest_timeout_secs(&self) -> u64 {
        self.ingest_timeout_secs.unwrap_or(10)
    }

    #[inline]
    pub fn publish_tick_ms(&self) -> u64 {
        self.publish_tick_ms.unwrap_or(100)
    }

    #[inline]
    pub fn heartbeat_timeout_secs(&self) -> u64 {
        self.heartbeat_timeout_secs.unwrap_or(10)
    }

    #[inline]
    pub fn max_wires(&self) -> usize {
        self.max_wires.unwrap_or(64)
    }
}

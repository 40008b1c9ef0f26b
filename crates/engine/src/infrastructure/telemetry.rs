//! Fire-and-forget telemetry sink.
//!
//! Events land in the tracing pipeline under a dedicated target so
//! they can be filtered or shipped separately. There is no failure
//! path: a dropped event is a dropped event.

use serde_json::Value;

use crate::infrastructure::ports::TelemetryPort;

pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryPort for TracingTelemetry {
    fn log_event(&self, name: &str, fields: Value) {
        tracing::info!(target: "taleweaver::telemetry", event = name, fields = %fields);
    }
}

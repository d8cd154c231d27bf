//! Tracking configuration.
//!
//! There is no process-external configuration. A `TrackingConfig` is built in
//! code (or loaded from JSON by the embedding layer) and handed to
//! `Path::with_config` / `PathTracker::with_config`.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Knobs for path validation and runtime tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Suppress the outward event when a part detaches from a source whose
    /// attribute value was already null.
    pub suppress_null_transitions: bool,

    /// Require the terminal segment's declaring type to raise change
    /// notifications. When false the terminal value is read on every
    /// upstream change but never subscribed to.
    pub require_notifying_terminal: bool,

    /// Re-walk the whole chain from the root when an event reveals a source
    /// that has already been dropped.
    pub refresh_on_suspect_events: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            suppress_null_transitions: true,
            require_notifying_terminal: true,
            refresh_on_suspect_events: true,
        }
    }
}

impl TrackingConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

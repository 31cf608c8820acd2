//! Alertmanager webhook types.
//!
//! Reference: <https://prometheus.io/docs/alerting/latest/configuration/#webhook_config>

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Alertmanager webhook payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerPayload {
    /// Version of the payload format
    #[serde(default)]
    pub version: String,
    /// Unique identifier for this group of alerts
    #[serde(default)]
    pub group_key: String,
    /// Number of truncated alerts (if any)
    #[serde(default)]
    pub truncated_alerts: u32,
    /// Status: "firing" or "resolved"
    #[serde(default)]
    pub status: String,
    /// Receiver that matched this alert
    #[serde(default)]
    pub receiver: String,
    /// Labels common to all alerts in this group
    #[serde(default)]
    pub group_labels: HashMap<String, String>,
    /// Labels common to all alerts (may include group labels)
    #[serde(default)]
    pub common_labels: HashMap<String, String>,
    /// Annotations common to all alerts
    #[serde(default)]
    pub common_annotations: HashMap<String, String>,
    /// External URL for Alertmanager
    #[serde(default, rename = "externalURL")]
    pub external_url: String,
    /// List of alerts in this notification
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// Individual alert from Alertmanager.
///
/// The `fingerprint` is the stable key used for thread continuity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Status: "firing" or "resolved"
    #[serde(default)]
    pub status: String,
    /// Alert labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Alert annotations
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// When the alert started firing
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// When the alert was resolved (zero time while firing)
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// URL to the alert source
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
    /// Unique fingerprint for this alert
    #[serde(default)]
    pub fingerprint: String,
}

impl Alert {
    /// Create a firing alert with a fingerprint and no labels.
    #[must_use]
    pub fn firing(fingerprint: impl Into<String>) -> Self {
        Self {
            status: "firing".to_string(),
            fingerprint: fingerprint.into(),
            ..Self::default()
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Get the alert name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.labels.get("alertname").map(String::as_str)
    }

    /// Get the severity.
    #[must_use]
    pub fn severity(&self) -> &str {
        self.labels.get("severity").map_or("unknown", String::as_str)
    }

    /// Check if this is a firing alert.
    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.status != "resolved"
    }

    /// Get a non-empty annotation.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

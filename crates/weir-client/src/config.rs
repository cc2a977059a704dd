//! Producer configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Bounds for [`ProducerConfig::cancellation_delay_max_ms`].
const CANCELLATION_DELAY_MIN_MS: u64 = 1;
const CANCELLATION_DELAY_MAX_MS: u64 = 10_000;

// ============================================================================
// Delivery report field selection
// ============================================================================

/// Which fields of a delivery acknowledgment are surfaced in the typed
/// result. Deselecting a field skips the work of carrying it through the
/// completion path; the corresponding result field is then `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFields {
    pub key: bool,
    pub value: bool,
    pub timestamp: bool,
    pub headers: bool,
    /// Persistence status. Deselected means the result reports `None`,
    /// never a silently assumed status.
    pub status: bool,
}

impl ReportFields {
    pub const ALL: ReportFields = ReportFields {
        key: true,
        value: true,
        timestamp: true,
        headers: true,
        status: true,
    };

    pub const NONE: ReportFields = ReportFields {
        key: false,
        value: false,
        timestamp: false,
        headers: false,
        status: false,
    };

    /// Parses a field-selection string: `"all"`, `"none"`, or a
    /// comma-separated subset of `key,value,timestamp,headers,status`.
    /// Whitespace is ignored; unknown field names are a configuration error.
    pub fn parse(selection: &str) -> Result<Self> {
        let stripped: String = selection.chars().filter(|c| !c.is_whitespace()).collect();
        match stripped.as_str() {
            "all" => return Ok(ReportFields::ALL),
            "none" => return Ok(ReportFields::NONE),
            _ => {}
        }

        let mut fields = ReportFields::NONE;
        for part in stripped.split(',') {
            match part {
                "key" => fields.key = true,
                "value" => fields.value = true,
                "timestamp" => fields.timestamp = true,
                "headers" => fields.headers = true,
                "status" => fields.status = true,
                other => {
                    return Err(Error::Config(format!(
                        "unknown delivery report field name '{other}' in selection '{selection}'"
                    )))
                }
            }
        }
        Ok(fields)
    }
}

impl Default for ReportFields {
    fn default() -> Self {
        ReportFields::ALL
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Producer facade configuration.
///
/// These toggles are consumed by the facade itself, never forwarded to the
/// transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Name used for the poll thread and in log output.
    pub client_id: String,
    /// Run a dedicated background task pumping the transport's event queue.
    /// When disabled the application must call `Producer::poll` itself; the
    /// mode is fixed for the lifetime of the producer.
    pub enable_background_poll: bool,
    /// Track per-record delivery and resolve futures/callbacks. When
    /// disabled, produce calls return a synthetic unset-offset result
    /// immediately.
    pub enable_delivery_reports: bool,
    /// Field-selection string, see [`ReportFields::parse`].
    pub delivery_report_fields: String,
    /// Route every acknowledgment to the raw ack handler only, bypassing the
    /// typed completion path.
    pub delivery_report_as_user_state: bool,
    /// Upper bound, in milliseconds, of one blocking poll/flush slice; this
    /// bounds how quickly cancellation and teardown are observed.
    pub cancellation_delay_max_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            client_id: "weir-producer".to_string(),
            enable_background_poll: true,
            enable_delivery_reports: true,
            delivery_report_fields: "all".to_string(),
            delivery_report_as_user_state: false,
            cancellation_delay_max_ms: 100,
        }
    }
}

impl ProducerConfig {
    pub fn builder() -> ProducerConfigBuilder {
        ProducerConfigBuilder::default()
    }

    /// Validates the configuration and resolves the field selection.
    pub(crate) fn validate(&self) -> Result<ReportFields> {
        if !(CANCELLATION_DELAY_MIN_MS..=CANCELLATION_DELAY_MAX_MS)
            .contains(&self.cancellation_delay_max_ms)
        {
            return Err(Error::Config(format!(
                "cancellation_delay_max_ms must be in [{CANCELLATION_DELAY_MIN_MS}, {CANCELLATION_DELAY_MAX_MS}], got {}",
                self.cancellation_delay_max_ms
            )));
        }
        ReportFields::parse(&self.delivery_report_fields)
    }
}

/// Builder for [`ProducerConfig`].
#[derive(Debug, Default)]
pub struct ProducerConfigBuilder {
    config: ProducerConfig,
}

impl ProducerConfigBuilder {
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    pub fn enable_background_poll(mut self, enable: bool) -> Self {
        self.config.enable_background_poll = enable;
        self
    }

    pub fn enable_delivery_reports(mut self, enable: bool) -> Self {
        self.config.enable_delivery_reports = enable;
        self
    }

    pub fn delivery_report_fields(mut self, selection: impl Into<String>) -> Self {
        self.config.delivery_report_fields = selection.into();
        self
    }

    pub fn delivery_report_as_user_state(mut self, enable: bool) -> Self {
        self.config.delivery_report_as_user_state = enable;
        self
    }

    pub fn cancellation_delay_max_ms(mut self, ms: u64) -> Self {
        self.config.cancellation_delay_max_ms = ms;
        self
    }

    pub fn build(self) -> ProducerConfig {
        self.config
    }
}

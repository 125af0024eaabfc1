//! Read point configuration.

use modsight_common::{Error, Format, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::bridge::ReadFunctionCode;
use crate::codec::ValueEncoding;
use crate::error::ReadPointError;
use crate::transform::{TransformConfig, Transformation};
use crate::trigger::Trigger;
use crate::value::ChannelSubscription;

/// Read point settings as written in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadPointConfig {
    /// Zero-based element index within the poller's data.
    pub start: usize,

    /// Value type name, e.g. "uint16" or "float32_swap".
    #[serde(default = "default_value_type")]
    pub value_type: String,

    /// "*" or a literal the decoded value must match.
    #[serde(default = "default_trigger")]
    pub trigger: String,

    #[serde(default)]
    pub transform: TransformConfig,

    /// Publish UNDEF to every channel when a read fails.
    #[serde(default)]
    pub post_read_errors_as_undefined: bool,
}

fn default_value_type() -> String {
    ValueEncoding::Uint16.as_str().to_string()
}

fn default_trigger() -> String {
    "*".to_string()
}

impl ReadPointConfig {
    pub fn new(start: usize, value_type: impl Into<String>) -> Self {
        Self {
            start,
            value_type: value_type.into(),
            trigger: default_trigger(),
            transform: TransformConfig::default(),
            post_read_errors_as_undefined: false,
        }
    }

    /// Resolve names into a [`ReadPoint`].
    pub fn resolve(&self) -> Result<ReadPoint, ReadPointError> {
        let encoding: ValueEncoding = self.value_type.parse()?;
        let transform = match &self.transform {
            TransformConfig::Identity => None,
            other => Some(other.build()),
        };

        Ok(ReadPoint {
            start: self.start,
            encoding,
            trigger: Trigger::parse(&self.trigger),
            transform,
            post_read_errors_as_undefined: self.post_read_errors_as_undefined,
        })
    }
}

/// A resolved read point. Replaced as a whole on reconfiguration.
#[derive(Debug, Clone)]
pub struct ReadPoint {
    pub start: usize,
    pub encoding: ValueEncoding,
    pub trigger: Trigger,
    pub transform: Option<Arc<dyn Transformation>>,
    pub post_read_errors_as_undefined: bool,
}

impl ReadPoint {
    pub fn new(start: usize, encoding: ValueEncoding) -> Self {
        Self {
            start,
            encoding,
            trigger: Trigger::Any,
            transform: None,
            post_read_errors_as_undefined: false,
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<Trigger>) -> Self {
        self.trigger = trigger.into();
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transformation>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_post_read_errors_as_undefined(mut self, enabled: bool) -> Self {
        self.post_read_errors_as_undefined = enabled;
        self
    }

    /// The transformation to run, skipping identities.
    pub fn effective_transform(&self) -> Option<&Arc<dyn Transformation>> {
        self.transform.as_ref().filter(|t| !t.is_identity())
    }
}

/// Poller section of the command-line reader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// "coil", "discrete", "input" or "holding".
    #[serde(rename = "type")]
    pub function_code: ReadFunctionCode,

    /// Number of elements each poll returns.
    pub length: usize,

    /// A disabled poller has no active poll task.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Configuration file of the `modsight-read` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadToolConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Output encoding of published updates.
    #[serde(default)]
    pub serialization: Format,

    pub read_point: ReadPointConfig,

    pub poller: PollerConfig,

    #[serde(default)]
    pub channels: Vec<ChannelSubscription>,
}

impl ReadToolConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let config: ReadToolConfig = modsight_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.channels.is_empty() {
            return Err(Error::Config(
                "At least one channel must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.id.is_empty() {
                return Err(Error::Config("Channel id cannot be empty".to_string()));
            }
            if !seen.insert(channel.id.as_str()) {
                return Err(Error::Config(format!(
                    "Channel '{}' is configured twice",
                    channel.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn test_read_point_defaults() {
        let config: ReadPointConfig = modsight_common::parse_config("{ start: 3 }").unwrap();

        assert_eq!(config.start, 3);
        assert_eq!(config.value_type, "uint16");
        assert_eq!(config.trigger, "*");
        assert_eq!(config.transform, TransformConfig::Identity);
        assert!(!config.post_read_errors_as_undefined);

        let read_point = config.resolve().unwrap();
        assert_eq!(read_point.encoding, ValueEncoding::Uint16);
        assert_eq!(read_point.trigger, Trigger::Any);
        assert!(read_point.effective_transform().is_none());
    }

    #[test]
    fn test_unknown_value_type_fails_on_resolve() {
        let config = ReadPointConfig::new(0, "int64");
        assert!(matches!(
            config.resolve(),
            Err(ReadPointError::Decode(crate::codec::DecodeError::UnknownEncoding(_)))
        ));
    }

    #[test]
    fn test_linear_transform_resolves() {
        let config: ReadPointConfig = modsight_common::parse_config(
            r#"{
                start: 0,
                value_type: "int32_swap",
                trigger: "ON",
                transform: { type: "linear", scale: 0.5 },
            }"#,
        )
        .unwrap();

        let read_point = config.resolve().unwrap();
        assert_eq!(read_point.encoding, ValueEncoding::Int32Swap);
        assert_eq!(read_point.trigger, Trigger::Literal("ON".to_string()));
        assert!(read_point.effective_transform().is_some());
    }

    #[test]
    fn test_parse_tool_config() {
        let json = r#"{
            serialization: "cbor",
            read_point: { start: 9, value_type: "uint16" },
            poller: { type: "holding", length: 10 },
            channels: [
                { id: "number", accepts: ["decimal"] },
                { id: "switch", accepts: ["on_off"] },
                { id: "string" },
            ],
        }"#;

        let config: ReadToolConfig = modsight_common::parse_config(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.serialization, Format::Cbor);
        assert_eq!(config.poller.function_code, ReadFunctionCode::ReadHoldingRegisters);
        assert!(config.poller.enabled);
        assert_eq!(config.channels.len(), 3);
        assert!(config.channels[1].accepts(ValueKind::OnOff));
        assert!(!config.channels[2].is_linked());
    }

    #[test]
    fn test_validate_duplicate_channels() {
        let json = r#"{
            read_point: { start: 0 },
            poller: { type: "coil", length: 1 },
            channels: [ { id: "a", accepts: ["on_off"] }, { id: "a" } ],
        }"#;

        let config: ReadToolConfig = modsight_common::parse_config(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_no_channels() {
        let json = r#"{
            read_point: { start: 0 },
            poller: { type: "input", length: 4 },
        }"#;

        let config: ReadToolConfig = modsight_common::parse_config(json).unwrap();
        assert!(config.validate().is_err());
    }
}

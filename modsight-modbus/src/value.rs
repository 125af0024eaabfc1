//! Channel-facing value types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::codec::NumericValue;

/// Kinds of value a subscribed channel can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Switch-like ON/OFF state.
    OnOff,
    /// Contact-like OPEN/CLOSED state.
    OpenClosed,
    /// Plain number.
    Decimal,
    /// Free text.
    Text,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::OnOff => "on_off",
            ValueKind::OpenClosed => "open_closed",
            ValueKind::Decimal => "decimal",
            ValueKind::Text => "text",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OnOff {
    On,
    Off,
}

impl From<bool> for OnOff {
    fn from(v: bool) -> Self {
        if v { OnOff::On } else { OnOff::Off }
    }
}

impl fmt::Display for OnOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnOff::On => f.write_str("ON"),
            OnOff::Off => f.write_str("OFF"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpenClosed {
    Open,
    Closed,
}

impl From<bool> for OpenClosed {
    fn from(v: bool) -> Self {
        if v {
            OpenClosed::Open
        } else {
            OpenClosed::Closed
        }
    }
}

impl fmt::Display for OpenClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenClosed::Open => f.write_str("OPEN"),
            OpenClosed::Closed => f.write_str("CLOSED"),
        }
    }
}

/// A value published to a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Decimal(NumericValue),
    OnOff(OnOff),
    OpenClosed(OpenClosed),
    Text(String),
    /// Published in place of a value after a read error, when enabled.
    Undefined,
}

impl ChannelValue {
    /// Interpret `text` as a value of `kind`.
    ///
    /// State names are matched case-insensitively; text always parses.
    pub fn parse_as(kind: ValueKind, text: &str) -> Option<ChannelValue> {
        let trimmed = text.trim();
        match kind {
            ValueKind::OnOff => {
                if trimmed.eq_ignore_ascii_case("ON") {
                    Some(ChannelValue::OnOff(OnOff::On))
                } else if trimmed.eq_ignore_ascii_case("OFF") {
                    Some(ChannelValue::OnOff(OnOff::Off))
                } else {
                    None
                }
            }
            ValueKind::OpenClosed => {
                if trimmed.eq_ignore_ascii_case("OPEN") {
                    Some(ChannelValue::OpenClosed(OpenClosed::Open))
                } else if trimmed.eq_ignore_ascii_case("CLOSED") {
                    Some(ChannelValue::OpenClosed(OpenClosed::Closed))
                } else {
                    None
                }
            }
            ValueKind::Decimal => {
                if let Ok(v) = trimmed.parse::<i64>() {
                    Some(ChannelValue::Decimal(NumericValue::Integer(v)))
                } else {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .map(|v| ChannelValue::Decimal(NumericValue::Double(v)))
                }
            }
            ValueKind::Text => Some(ChannelValue::Text(text.to_string())),
        }
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Decimal(v) => write!(f, "{}", v),
            ChannelValue::OnOff(v) => write!(f, "{}", v),
            ChannelValue::OpenClosed(v) => write!(f, "{}", v),
            ChannelValue::Text(v) => f.write_str(v),
            ChannelValue::Undefined => f.write_str("UNDEF"),
        }
    }
}

/// A command addressed to the device side of a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    OnOff(OnOff),
    OpenClosed(OpenClosed),
    Decimal(NumericValue),
    Text(String),
    Refresh,
}

/// A channel linked to a read point, with the kinds of value it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    /// Channel identifier.
    pub id: String,

    /// Accepted kinds; empty when nothing consumes the channel.
    #[serde(default)]
    pub accepts: BTreeSet<ValueKind>,
}

impl ChannelSubscription {
    pub fn new(id: impl Into<String>, accepts: impl IntoIterator<Item = ValueKind>) -> Self {
        Self {
            id: id.into(),
            accepts: accepts.into_iter().collect(),
        }
    }

    pub fn accepts(&self, kind: ValueKind) -> bool {
        self.accepts.contains(&kind)
    }

    /// A channel with no accepted kinds has no consumer and is skipped.
    pub fn is_linked(&self) -> bool {
        !self.accepts.is_empty()
    }

    /// Boolean-like view of `flag` for this channel, ON/OFF winning over OPEN/CLOSED.
    pub fn bool_projection(&self, flag: bool) -> Option<ChannelValue> {
        if self.accepts(ValueKind::OnOff) {
            Some(ChannelValue::OnOff(flag.into()))
        } else if self.accepts(ValueKind::OpenClosed) {
            Some(ChannelValue::OpenClosed(flag.into()))
        } else {
            None
        }
    }
}

/// Values published in one decode cycle, keyed by channel id.
pub type ChannelStates = BTreeMap<String, ChannelValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_projection_prefers_on_off() {
        let both = ChannelSubscription::new("x", [ValueKind::OpenClosed, ValueKind::OnOff]);
        assert_eq!(
            both.bool_projection(true),
            Some(ChannelValue::OnOff(OnOff::On))
        );

        let contact = ChannelSubscription::new("contact", [ValueKind::OpenClosed]);
        assert_eq!(
            contact.bool_projection(false),
            Some(ChannelValue::OpenClosed(OpenClosed::Closed))
        );

        let number = ChannelSubscription::new("number", [ValueKind::Decimal]);
        assert_eq!(number.bool_projection(true), None);
    }

    #[test]
    fn test_unlinked_subscription() {
        let channel = ChannelSubscription::new("string", Vec::<ValueKind>::new());
        assert!(!channel.is_linked());
    }

    #[test]
    fn test_parse_as() {
        assert_eq!(
            ChannelValue::parse_as(ValueKind::OnOff, "on"),
            Some(ChannelValue::OnOff(OnOff::On))
        );
        assert_eq!(ChannelValue::parse_as(ValueKind::OnOff, "1"), None);
        assert_eq!(
            ChannelValue::parse_as(ValueKind::OpenClosed, " Closed "),
            Some(ChannelValue::OpenClosed(OpenClosed::Closed))
        );
        assert_eq!(
            ChannelValue::parse_as(ValueKind::Decimal, "17"),
            Some(ChannelValue::Decimal(NumericValue::Integer(17)))
        );
        assert_eq!(
            ChannelValue::parse_as(ValueKind::Decimal, "2.5"),
            Some(ChannelValue::Decimal(NumericValue::Double(2.5)))
        );
        assert_eq!(ChannelValue::parse_as(ValueKind::Decimal, "NaN"), None);
        assert_eq!(
            ChannelValue::parse_as(ValueKind::Text, "anything"),
            Some(ChannelValue::Text("anything".to_string()))
        );
    }

    #[test]
    fn test_display_and_serialize() {
        assert_eq!(ChannelValue::OnOff(OnOff::Off).to_string(), "OFF");
        assert_eq!(ChannelValue::Undefined.to_string(), "UNDEF");

        let json = serde_json::to_string(&ChannelValue::OpenClosed(OpenClosed::Open)).unwrap();
        assert_eq!(json, "\"OPEN\"");
        let json = serde_json::to_string(&ChannelValue::Decimal(NumericValue::Integer(7))).unwrap();
        assert_eq!(json, "7");
        assert_eq!(serde_json::to_string(&ChannelValue::Undefined).unwrap(), "null");
    }

    #[test]
    fn test_subscription_from_json5_shape() {
        let sub: ChannelSubscription =
            serde_json::from_str(r#"{"id":"switch","accepts":["on_off","decimal"]}"#).unwrap();
        assert!(sub.accepts(ValueKind::OnOff));
        assert!(sub.accepts(ValueKind::Decimal));
        assert!(!sub.accepts(ValueKind::Text));
    }
}

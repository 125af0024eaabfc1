//! Value transformations applied before publishing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::codec::NumericValue;
use crate::value::{ChannelValue, ValueKind};

/// Turns a decoded number into the value published on a channel.
pub trait Transformation: fmt::Debug + Send + Sync {
    /// Identity transformations are bypassed by the dispatcher, which then
    /// publishes the boolean-like projection or the raw number itself.
    fn is_identity(&self) -> bool {
        false
    }

    /// Transform `value` for a channel accepting `accepts`.
    ///
    /// `None` means the channel is skipped this cycle.
    fn apply(&self, accepts: &BTreeSet<ValueKind>, value: &NumericValue) -> Option<ChannelValue>;
}

/// Pass-through transformation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transformation for Identity {
    fn is_identity(&self) -> bool {
        true
    }

    fn apply(&self, _accepts: &BTreeSet<ValueKind>, value: &NumericValue) -> Option<ChannelValue> {
        Some(ChannelValue::Decimal(*value))
    }
}

/// `value * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linear {
    pub scale: f64,
    pub offset: f64,
}

impl Transformation for Linear {
    fn apply(&self, accepts: &BTreeSet<ValueKind>, value: &NumericValue) -> Option<ChannelValue> {
        let scaled = value.as_f64() * self.scale + self.offset;
        if accepts.contains(&ValueKind::Decimal) {
            Some(ChannelValue::Decimal(NumericValue::Double(scaled)))
        } else if accepts.contains(&ValueKind::Text) {
            Some(ChannelValue::Text(scaled.to_string()))
        } else {
            None
        }
    }
}

/// Lookup table keyed by the canonical string of the decoded value.
///
/// The looked-up text is coerced into the first accepted kind able to parse
/// it, trying ON/OFF, OPEN/CLOSED, decimal and text in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapTransform {
    entries: HashMap<String, String>,
    default: Option<String>,
}

impl MapTransform {
    pub fn new(entries: HashMap<String, String>, default: Option<String>) -> Self {
        Self { entries, default }
    }
}

const COERCION_ORDER: [ValueKind; 4] = [
    ValueKind::OnOff,
    ValueKind::OpenClosed,
    ValueKind::Decimal,
    ValueKind::Text,
];

impl Transformation for MapTransform {
    fn apply(&self, accepts: &BTreeSet<ValueKind>, value: &NumericValue) -> Option<ChannelValue> {
        let text = self
            .entries
            .get(&value.to_string())
            .or(self.default.as_ref())?;

        COERCION_ORDER
            .iter()
            .filter(|kind| accepts.contains(*kind))
            .find_map(|kind| ChannelValue::parse_as(*kind, text))
    }
}

/// Transformation section of a read point configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransformConfig {
    #[default]
    Identity,
    Linear {
        #[serde(default = "default_scale")]
        scale: f64,
        #[serde(default)]
        offset: f64,
    },
    Map {
        entries: HashMap<String, String>,
        #[serde(default)]
        default: Option<String>,
    },
}

fn default_scale() -> f64 {
    1.0
}

impl TransformConfig {
    /// Build the configured transformation.
    pub fn build(&self) -> Arc<dyn Transformation> {
        match self {
            TransformConfig::Identity => Arc::new(Identity),
            TransformConfig::Linear { scale, offset } => Arc::new(Linear {
                scale: *scale,
                offset: *offset,
            }),
            TransformConfig::Map { entries, default } => {
                Arc::new(MapTransform::new(entries.clone(), default.clone()))
            }
        }
    }
}

//! Trigger filtering of decoded values.

use std::fmt;

use crate::codec::NumericValue;
use crate::value::ChannelValue;

/// Decides whether a decoded value is forwarded to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Trigger {
    /// `"*"`: every value passes.
    #[default]
    Any,
    /// Passes when the literal equals, ignoring case, the numeric value's
    /// canonical string or the channel's boolean-like projection (`ON`, `OPEN`, ...).
    Literal(String),
}

impl Trigger {
    pub fn parse(s: &str) -> Self {
        if s == "*" {
            Trigger::Any
        } else {
            Trigger::Literal(s.to_string())
        }
    }

    pub fn matches(&self, numeric: &NumericValue, bool_like: Option<&ChannelValue>) -> bool {
        match self {
            Trigger::Any => true,
            Trigger::Literal(literal) => {
                literal.eq_ignore_ascii_case(&numeric.to_string())
                    || bool_like.is_some_and(|state| literal.eq_ignore_ascii_case(&state.to_string()))
            }
        }
    }
}

impl From<&str> for Trigger {
    fn from(s: &str) -> Self {
        Trigger::parse(s)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Any => f.write_str("*"),
            Trigger::Literal(literal) => f.write_str(literal),
        }
    }
}

//! Read point error taxonomy.

use thiserror::Error;

use crate::bridge::ElementKind;
use crate::codec::DecodeError;
use crate::sink::FaultKind;

/// Everything that can keep a read point from publishing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadPointError {
    #[error("Read point is not configured")]
    NotConfigured,

    /// Out-of-range element or unknown value type.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    MissingBridgeLink(String),

    #[error("{0}")]
    BridgeNotReady(String),

    #[error("Poller {poller} is configured not to poll")]
    PollerNotConfigured { poller: String },

    #[error(
        "Out-of-bounds: would read {element} elements with index (zero-indexed) {first} to {last}. Poller reads only {length} {element} elements which means that maximum index (zero-indexed) is {max_index}"
    )]
    OutOfBoundsConfiguration {
        element: ElementKind,
        first: usize,
        last: usize,
        length: usize,
        max_index: i64,
    },

    #[error("{kind}: {message}")]
    Communication { kind: String, message: String },
}

impl ReadPointError {
    pub fn out_of_bounds(element: ElementKind, first: usize, last: usize, length: usize) -> Self {
        Self::OutOfBoundsConfiguration {
            element,
            first,
            last,
            length,
            max_index: i64::try_from(length).map_or(i64::MAX, |len| len - 1),
        }
    }

    /// Wrap a transport error under the kind the transport gave it.
    ///
    /// A blank kind is reported as "CommunicationError".
    pub fn communication<E>(kind: &str, error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let kind = kind.trim();
        Self::Communication {
            kind: if kind.is_empty() {
                "CommunicationError".to_string()
            } else {
                kind.to_string()
            },
            message: error.to_string(),
        }
    }

    /// How this error is reported to the owner of the read point.
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            ReadPointError::NotConfigured
            | ReadPointError::Decode(_)
            | ReadPointError::OutOfBoundsConfiguration { .. } => FaultKind::ConfigurationError,
            ReadPointError::MissingBridgeLink(_)
            | ReadPointError::BridgeNotReady(_)
            | ReadPointError::PollerNotConfigured { .. } => FaultKind::BridgeOffline,
            ReadPointError::Communication { .. } => FaultKind::CommunicationError,
        }
    }

    /// Bridge chain faults clear by themselves on a later bridge status change.
    pub fn is_recoverable(&self) -> bool {
        self.fault_kind() != FaultKind::ConfigurationError
    }
}

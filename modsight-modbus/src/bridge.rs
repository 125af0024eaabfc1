//! Bridge chain collaborators.
//!
//! A read point hangs below a read/write bridge, which in turn hangs below
//! the poller bridge that owns the poll task:
//!
//! ```text
//! read point -> read/write bridge -> poller bridge (PollBinding)
//! ```
//!
//! The dispatcher only ever walks two levels up, through [`BridgeChain`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Bridge availability as seen by the read point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeStatus::Online => write!(f, "online"),
            BridgeStatus::Offline => write!(f, "offline"),
            BridgeStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Handle to a bridge in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bridge {
    pub id: String,
    pub label: String,
}

/// Modbus read function used by a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadFunctionCode {
    /// Function code 1.
    #[serde(rename = "coil")]
    ReadCoils,
    /// Function code 2.
    #[serde(rename = "discrete")]
    ReadDiscreteInputs,
    /// Function code 3.
    #[serde(rename = "holding")]
    ReadHoldingRegisters,
    /// Function code 4.
    #[serde(rename = "input")]
    ReadInputRegisters,
}

impl ReadFunctionCode {
    /// Modbus function code number.
    pub fn code(&self) -> u8 {
        match self {
            ReadFunctionCode::ReadCoils => 1,
            ReadFunctionCode::ReadDiscreteInputs => 2,
            ReadFunctionCode::ReadHoldingRegisters => 3,
            ReadFunctionCode::ReadInputRegisters => 4,
        }
    }

    /// Whether responses arrive as registers rather than bits.
    pub fn reads_registers(&self) -> bool {
        matches!(
            self,
            ReadFunctionCode::ReadHoldingRegisters | ReadFunctionCode::ReadInputRegisters
        )
    }

    pub fn element_kind(&self) -> ElementKind {
        match self {
            ReadFunctionCode::ReadCoils => ElementKind::Coil,
            ReadFunctionCode::ReadDiscreteInputs => ElementKind::DiscreteInput,
            ReadFunctionCode::ReadHoldingRegisters | ReadFunctionCode::ReadInputRegisters => {
                ElementKind::Register
            }
        }
    }
}

/// Data element addressed by a poll, as named in fault messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Register,
    Coil,
    DiscreteInput,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Register => write!(f, "register"),
            ElementKind::Coil => write!(f, "coil"),
            ElementKind::DiscreteInput => write!(f, "discrete input"),
        }
    }
}

/// The poll task a poller bridge is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBinding {
    pub function_code: ReadFunctionCode,
    /// Number of elements each poll returns.
    pub data_length: usize,
}

/// Lookups into the bridge hierarchy.
pub trait BridgeChain: Send + Sync {
    /// Bridge directly above `entity_id`, if one is set and known.
    fn parent_bridge(&self, entity_id: &str) -> Option<Bridge>;

    fn bridge_status(&self, bridge: &Bridge) -> BridgeStatus;

    /// Poll task of a poller bridge; `None` when it is configured not to poll.
    fn active_poll_binding(&self, poller: &Bridge) -> Option<PollBinding>;
}

#[derive(Debug, Clone, Default)]
struct Node {
    label: String,
    parent: Option<String>,
    status: BridgeStatus,
    poll: Option<PollBinding>,
}

/// In-memory [`BridgeChain`].
///
/// Entities are created on first mention, so links can be declared in any
/// order. All methods take `&self`, allowing statuses to change while the
/// registry is shared with dispatchers.
#[derive(Debug, Default)]
pub struct BridgeRegistry {
    nodes: RwLock<HashMap<String, Node>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a bridge with its label and initial status.
    pub fn add_bridge(&self, id: &str, label: &str, status: BridgeStatus) {
        let mut nodes = self.write();
        let node = nodes.entry(id.to_string()).or_default();
        node.label = label.to_string();
        node.status = status;
    }

    /// Set (or clear) the bridge above `child_id`.
    pub fn set_parent(&self, child_id: &str, parent_id: Option<&str>) {
        self.write().entry(child_id.to_string()).or_default().parent =
            parent_id.map(str::to_string);
    }

    pub fn set_status(&self, id: &str, status: BridgeStatus) {
        self.write().entry(id.to_string()).or_default().status = status;
    }

    /// Set (or clear) the poll task of a poller bridge.
    pub fn set_poll_binding(&self, id: &str, binding: Option<PollBinding>) {
        self.write().entry(id.to_string()).or_default().poll = binding;
    }

    /// Remove a bridge; children keep a dangling parent link.
    pub fn remove(&self, id: &str) {
        self.write().remove(id);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BridgeChain for BridgeRegistry {
    fn parent_bridge(&self, entity_id: &str) -> Option<Bridge> {
        let nodes = self.read();
        let parent_id = nodes.get(entity_id)?.parent.as_ref()?;
        let parent = nodes.get(parent_id)?;
        Some(Bridge {
            id: parent_id.clone(),
            label: parent.label.clone(),
        })
    }

    fn bridge_status(&self, bridge: &Bridge) -> BridgeStatus {
        self.read()
            .get(&bridge.id)
            .map(|node| node.status)
            .unwrap_or_default()
    }

    fn active_poll_binding(&self, poller: &Bridge) -> Option<PollBinding> {
        self.read().get(&poller.id)?.poll
    }
}

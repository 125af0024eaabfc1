//! Modbus read points.
//!
//! A read point selects one element out of the data a Modbus poller
//! returns, decodes it and publishes the result to the channels linked to
//! it. Every channel receives the value in the shape it accepts: ON/OFF,
//! OPEN/CLOSED, a number or text.
//!
//! # Modules
//!
//! - [`codec`] - register and bit decoding
//! - [`value`] - channel values and subscriptions
//! - [`trigger`] - value filters
//! - [`transform`] - value transformations
//! - [`bridge`] - the read point -> read/write bridge -> poller chain
//! - [`sink`] - publication of channel values and status reports
//! - [`dispatcher`] - per read point state machine and update dispatch
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use modsight_modbus::bridge::{BridgeRegistry, BridgeStatus, PollBinding, ReadFunctionCode};
//! use modsight_modbus::codec::{RegisterArray, ValueEncoding};
//! use modsight_modbus::config::ReadPoint;
//! use modsight_modbus::dispatcher::{PollData, ReadPointDispatcher, ReadPointState};
//! use modsight_modbus::sink::RecordingSink;
//! use modsight_modbus::value::{ChannelSubscription, ValueKind};
//!
//! let bridges = Arc::new(BridgeRegistry::new());
//! bridges.add_bridge("rw", "RW", BridgeStatus::Online);
//! bridges.add_bridge("poller", "Poller", BridgeStatus::Online);
//! bridges.set_parent("temp", Some("rw"));
//! bridges.set_parent("rw", Some("poller"));
//! bridges.set_poll_binding(
//!     "poller",
//!     Some(PollBinding { function_code: ReadFunctionCode::ReadHoldingRegisters, data_length: 4 }),
//! );
//!
//! let sink = Arc::new(RecordingSink::new());
//! let dispatcher = ReadPointDispatcher::new("temp", bridges, sink.clone());
//! let state = dispatcher.activate_read_point(
//!     ReadPoint::new(1, ValueEncoding::Uint16),
//!     vec![ChannelSubscription::new("number", [ValueKind::Decimal])],
//! );
//! assert_eq!(state, ReadPointState::Ready);
//!
//! let registers = RegisterArray::new([0, 215, 0, 0]);
//! let states = dispatcher.on_data_received(PollData::Registers(&registers)).unwrap();
//! assert_eq!(states["number"].to_string(), "215");
//! ```

pub mod bridge;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod sink;
pub mod transform;
pub mod trigger;
pub mod value;

pub use codec::{BitArray, DecodeError, NumericValue, RegisterArray, ValueEncoding};
pub use config::{ReadPoint, ReadPointConfig, ReadToolConfig};
pub use dispatcher::{PollData, ReadPointDispatcher, ReadPointState};
pub use error::ReadPointError;
pub use sink::{FaultKind, Marker, RecordingSink, UpdateSink};
pub use value::{ChannelStates, ChannelSubscription, ChannelValue, ValueKind};

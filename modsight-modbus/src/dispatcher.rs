//! Per read point update dispatch.
//!
//! A [`ReadPointDispatcher`] validates its read point against the poller it
//! is bound to, decodes every poll response at the configured element and
//! publishes the filtered, transformed value to each subscribed channel.
//!
//! # States
//!
//! ```text
//! Unconfigured --activate--> Validating --+--> Ready
//!                                ^        +--> Faulted
//!                                |                |
//!                                +-- bridge status change
//! ```
//!
//! # Locking
//!
//! Three locks, always taken in this order:
//!
//! - the outbound lock is held while calling the [`UpdateSink`]. Every state
//!   change and every publish happens under it, so status reports reach the
//!   sink in the order the states were entered, and a decode cycle cannot
//!   publish once a reactivation has started.
//! - the configuration lock guards the read point, subscriptions and state.
//!   It is never held across sink calls; a decode cycle only copies a
//!   snapshot out of it and computes channel values with no lock held.
//! - the cache lock guards the last published channel states, so readers of
//!   [`ReadPointDispatcher::last_published_state`] never wait for a decode.
//!
//! Sinks must not call back into operations that change state.

use chrono::Utc;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, error, info};

use crate::bridge::{BridgeChain, BridgeStatus, ElementKind, PollBinding};
use crate::codec::{BitArray, DecodeError, NumericValue, RegisterArray, ValueEncoding, decode_numeric};
use crate::config::{ReadPoint, ReadPointConfig};
use crate::error::ReadPointError;
use crate::sink::{FaultKind, Marker, UpdateSink};
use crate::value::{ChannelStates, ChannelSubscription, ChannelValue};

/// A poll response handed to [`ReadPointDispatcher::on_data_received`].
#[derive(Debug, Clone, Copy)]
pub enum PollData<'a> {
    /// Input or holding registers.
    Registers(&'a RegisterArray),
    /// Coils or discrete inputs.
    Bits(&'a BitArray),
}

/// Lifecycle state of a read point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadPointState {
    #[default]
    Unconfigured,
    Validating,
    /// Active and publishing.
    Ready,
    /// Active but blocked by a fault.
    Faulted { kind: FaultKind, reason: String },
}

impl ReadPointState {
    /// `Ready` or `Faulted`.
    pub fn is_active(&self) -> bool {
        matches!(self, ReadPointState::Ready | ReadPointState::Faulted { .. })
    }

    fn from_error(err: &ReadPointError) -> Self {
        ReadPointState::Faulted {
            kind: err.fault_kind(),
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for ReadPointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadPointState::Unconfigured => write!(f, "unconfigured"),
            ReadPointState::Validating => write!(f, "validating"),
            ReadPointState::Ready => write!(f, "ready"),
            ReadPointState::Faulted { kind, reason } => write!(f, "{}: {}", kind, reason),
        }
    }
}

/// Poller elements a read point touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub element: ElementKind,
    pub first: usize,
    pub last: usize,
}

/// Check that a read point starting at `start` fits in the poller's data.
///
/// Bit polls count as one bit wide whatever the encoding. Elements narrower
/// than a register are located by `start / 16`.
pub fn check_bounds(
    start: usize,
    encoding: ValueEncoding,
    binding: &PollBinding,
) -> Result<IndexRange, ReadPointError> {
    let element = binding.function_code.element_kind();
    let bit_count = if binding.function_code.reads_registers() {
        encoding.bit_width()
    } else {
        1
    };

    let first = if bit_count < 16 { start / 16 } else { start };
    let register_count = std::cmp::max(1, bit_count / 16) as usize;
    let last = first.saturating_add(register_count - 1);

    if first >= binding.data_length || last >= binding.data_length {
        return Err(ReadPointError::out_of_bounds(
            element,
            first,
            last,
            binding.data_length,
        ));
    }

    Ok(IndexRange {
        element,
        first,
        last,
    })
}

/// Values to publish for one decoded number.
///
/// `flag` is the boolean reading of the same data: the bit itself for bit
/// polls, `numeric != 0` for registers.
pub fn compute_channel_states(
    read_point: &ReadPoint,
    subscriptions: &[ChannelSubscription],
    numeric: NumericValue,
    flag: bool,
) -> ChannelStates {
    let transform = read_point.effective_transform();
    let mut states = ChannelStates::new();

    for subscription in subscriptions {
        if !subscription.is_linked() {
            continue;
        }

        let bool_like = subscription.bool_projection(flag);
        if !read_point.trigger.matches(&numeric, bool_like.as_ref()) {
            continue;
        }

        let value = match transform {
            None => bool_like.unwrap_or(ChannelValue::Decimal(numeric)),
            Some(transform) => match transform.apply(&subscription.accepts, &numeric) {
                Some(value) => value,
                None => continue,
            },
        };

        states.insert(subscription.id.clone(), value);
    }

    states
}

fn decode_point(read_point: &ReadPoint, data: PollData<'_>) -> Result<(NumericValue, bool), DecodeError> {
    match data {
        PollData::Registers(registers) => {
            let numeric = decode_numeric(registers, read_point.start, read_point.encoding)?;
            Ok((numeric, !numeric.is_zero()))
        }
        PollData::Bits(bits) => {
            let bit = bits.get(read_point.start).ok_or(DecodeError::OutOfRange {
                encoding: ValueEncoding::Bit,
                index: read_point.start,
                available: bits.len(),
            })?;
            Ok((NumericValue::Integer(i64::from(bit)), bit))
        }
    }
}

struct ConfigSection {
    read_point: Option<ReadPoint>,
    subscriptions: Arc<[ChannelSubscription]>,
    state: ReadPointState,
    /// Bumped on every (re)activation.
    generation: u64,
}

/// What a decode cycle needs from the configuration section.
struct Snapshot {
    read_point: ReadPoint,
    subscriptions: Arc<[ChannelSubscription]>,
    generation: u64,
}

/// Decodes poll responses for one read point and publishes channel updates.
pub struct ReadPointDispatcher {
    id: String,
    bridges: Arc<dyn BridgeChain>,
    sink: Arc<dyn UpdateSink>,
    /// Held across sink calls; orders them with state changes.
    outbound: Mutex<()>,
    config: Mutex<ConfigSection>,
    cache: RwLock<Option<Arc<ChannelStates>>>,
}

impl ReadPointDispatcher {
    /// Create an unconfigured dispatcher for the read point `id`.
    ///
    /// `id` is the entity looked up in `bridges` to find the read/write bridge.
    pub fn new(id: impl Into<String>, bridges: Arc<dyn BridgeChain>, sink: Arc<dyn UpdateSink>) -> Self {
        Self {
            id: id.into(),
            bridges,
            sink,
            outbound: Mutex::new(()),
            config: Mutex::new(ConfigSection {
                read_point: None,
                subscriptions: Arc::from(Vec::new()),
                state: ReadPointState::Unconfigured,
                generation: 0,
            }),
            cache: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ReadPointState {
        self.lock_config().state.clone()
    }

    /// (Re)activate from configuration, then validate.
    ///
    /// An unknown value type leaves the read point faulted until the next
    /// activation.
    pub fn activate(
        &self,
        config: &ReadPointConfig,
        subscriptions: Vec<ChannelSubscription>,
    ) -> ReadPointState {
        match config.resolve() {
            Ok(read_point) => self.activate_read_point(read_point, subscriptions),
            Err(err) => {
                error!("Read point '{}' has an invalid configuration: {}", self.id, err);
                let _outbound = self.lock_outbound();
                let state = {
                    let mut section = self.lock_config();
                    self.reset(&mut section, None, subscriptions);
                    section.state = ReadPointState::from_error(&err);
                    section.state.clone()
                };
                self.report(&state);
                state
            }
        }
    }

    /// (Re)activate with an already resolved read point, then validate.
    pub fn activate_read_point(
        &self,
        read_point: ReadPoint,
        subscriptions: Vec<ChannelSubscription>,
    ) -> ReadPointState {
        debug!(
            "Activating read point '{}' (start={}, value_type={}, trigger={})",
            self.id, read_point.start, read_point.encoding, read_point.trigger
        );

        let _outbound = self.lock_outbound();
        let state = {
            let mut section = self.lock_config();
            self.reset(&mut section, Some(read_point), subscriptions);
            self.validate_locked(&mut section)
        };
        self.report(&state);
        state
    }

    /// Return to `Unconfigured`, dropping configuration and cached states.
    pub fn deactivate(&self) {
        let _outbound = self.lock_outbound();
        let mut section = self.lock_config();
        self.reset(&mut section, None, Vec::new());
        debug!("Read point '{}' deactivated", self.id);
    }

    /// Re-validate after the readiness of a bridge in the chain changed.
    ///
    /// Ignored until a read point has been activated.
    pub fn bridge_status_changed(&self) -> ReadPointState {
        let _outbound = self.lock_outbound();
        let state = {
            let mut section = self.lock_config();
            if section.read_point.is_none() {
                return section.state.clone();
            }
            self.validate_locked(&mut section)
        };
        self.report(&state);
        state
    }

    /// Replace the subscribed channels used from the next cycle on.
    pub fn set_subscriptions(&self, subscriptions: Vec<ChannelSubscription>) {
        self.lock_config().subscriptions = Arc::from(subscriptions);
    }

    /// Decode a poll response and publish it.
    ///
    /// Returns the new channel states, or `None` when nothing was published:
    /// the read point is not ready, the element is missing from the
    /// response, or the read point was reconfigured during the cycle.
    pub fn on_data_received(&self, data: PollData<'_>) -> Option<Arc<ChannelStates>> {
        let snapshot = self.snapshot(|state| *state == ReadPointState::Ready)?;

        let (numeric, flag) = match decode_point(&snapshot.read_point, data) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.fault_from_cycle(snapshot.generation, err.into());
                return None;
            }
        };

        let states = Arc::new(compute_channel_states(
            &snapshot.read_point,
            &snapshot.subscriptions,
            numeric,
            flag,
        ));

        let _outbound = self.lock_outbound();
        if self.lock_config().generation != snapshot.generation {
            debug!(
                "Read point '{}' was reconfigured during a decode cycle, dropping result",
                self.id
            );
            return None;
        }
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&states));

        for (channel, value) in states.iter() {
            self.sink.publish_channel_value(channel, value);
        }
        self.sink.publish_marker(Marker::LastSuccess, Utc::now());

        debug!(
            "Read point '{}': value {} published to {} channel(s)",
            self.id,
            numeric,
            states.len()
        );
        Some(states)
    }

    /// Report a failed read. Cached states are left untouched.
    ///
    /// `kind` names the failure as the transport classifies it, e.g.
    /// "Timeout" or "ConnectionReset".
    pub fn on_read_error<E>(&self, kind: &str, error: &E)
    where
        E: std::error::Error + ?Sized,
    {
        let _outbound = self.lock_outbound();
        let Some(snapshot) = self.snapshot(ReadPointState::is_active) else {
            debug!("Read point '{}' is not active, ignoring read error", self.id);
            return;
        };

        let err = ReadPointError::communication(kind, error);
        error!("Read point '{}' received read error: {}", self.id, err);

        self.sink.report_fault(err.fault_kind(), &err.to_string());
        self.sink.publish_marker(Marker::LastError, Utc::now());

        if snapshot.read_point.post_read_errors_as_undefined {
            for subscription in snapshot.subscriptions.iter().filter(|s| s.is_linked()) {
                self.sink
                    .publish_channel_value(&subscription.id, &ChannelValue::Undefined);
            }
        }
    }

    /// States published by the most recent decode cycle, if any.
    pub fn last_published_state(&self) -> Option<Arc<ChannelStates>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_outbound(&self) -> MutexGuard<'_, ()> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_config(&self) -> MutexGuard<'_, ConfigSection> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, accept: impl FnOnce(&ReadPointState) -> bool) -> Option<Snapshot> {
        let section = self.lock_config();
        if !accept(&section.state) {
            return None;
        }
        Some(Snapshot {
            read_point: section.read_point.clone()?,
            subscriptions: Arc::clone(&section.subscriptions),
            generation: section.generation,
        })
    }

    /// Install new configuration and clear the cache. Caller holds the config lock.
    fn reset(
        &self,
        section: &mut ConfigSection,
        read_point: Option<ReadPoint>,
        subscriptions: Vec<ChannelSubscription>,
    ) {
        section.generation += 1;
        section.state = if read_point.is_some() {
            ReadPointState::Validating
        } else {
            ReadPointState::Unconfigured
        };
        section.read_point = read_point;
        section.subscriptions = Arc::from(subscriptions);

        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn validate_locked(&self, section: &mut ConfigSection) -> ReadPointState {
        section.state = ReadPointState::Validating;

        let outcome = match section.read_point.as_ref() {
            Some(read_point) => self.validate_chain(read_point),
            None => Err(ReadPointError::NotConfigured),
        };

        section.state = match outcome {
            Ok(()) => ReadPointState::Ready,
            Err(err) => {
                if err.is_recoverable() {
                    debug!("Read point '{}' is waiting for its bridges: {}", self.id, err);
                } else {
                    error!("Read point '{}' cannot be polled: {}", self.id, err);
                }
                ReadPointState::from_error(&err)
            }
        };
        section.state.clone()
    }

    fn validate_chain(&self, read_point: &ReadPoint) -> Result<(), ReadPointError> {
        let Some(readwrite) = self.bridges.parent_bridge(&self.id) else {
            return Err(ReadPointError::MissingBridgeLink(
                "No read-write bridge".to_string(),
            ));
        };
        if self.bridges.bridge_status(&readwrite) != BridgeStatus::Online {
            return Err(ReadPointError::BridgeNotReady(format!(
                "Read-write bridge {} is offline",
                readwrite.label
            )));
        }

        let Some(poller) = self.bridges.parent_bridge(&readwrite.id) else {
            return Err(ReadPointError::MissingBridgeLink(format!(
                "No poller bridge set for the read-write bridge {}",
                readwrite.label
            )));
        };
        if self.bridges.bridge_status(&poller) != BridgeStatus::Online {
            return Err(ReadPointError::BridgeNotReady(format!(
                "Poller bridge {} of the read-write bridge is offline",
                poller.label
            )));
        }

        let Some(binding) = self.bridges.active_poll_binding(&poller) else {
            return Err(ReadPointError::PollerNotConfigured {
                poller: poller.label,
            });
        };

        let range = check_bounds(read_point.start, read_point.encoding, &binding)?;

        info!(
            "Read point '{}' bound to poller '{}' ({} {} to {}, function code {})",
            self.id,
            poller.label,
            range.element,
            range.first,
            range.last,
            binding.function_code.code()
        );
        Ok(())
    }

    /// Fault raised by a decode cycle; dropped if the read point was reconfigured meanwhile.
    fn fault_from_cycle(&self, generation: u64, err: ReadPointError) {
        error!("Read point '{}' failed to decode poll data: {}", self.id, err);
        let _outbound = self.lock_outbound();
        let state = {
            let mut section = self.lock_config();
            if section.generation != generation {
                return;
            }
            section.state = ReadPointState::from_error(&err);
            section.state.clone()
        };
        self.report(&state);
    }

    /// Caller holds the outbound lock.
    fn report(&self, state: &ReadPointState) {
        match state {
            ReadPointState::Ready => self.sink.report_ready(),
            ReadPointState::Faulted { kind, reason } => self.sink.report_fault(*kind, reason),
            ReadPointState::Unconfigured | ReadPointState::Validating => {}
        }
    }
}

impl fmt::Debug for ReadPointDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadPointDispatcher")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

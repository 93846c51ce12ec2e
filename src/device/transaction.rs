//! # Bus Transactions and Sockets
//!
//! A [`Transaction`] is one read or write exchange. The initiator creates it, hands it to a
//! [`TransactionTarget`] via a blocking [`b_transport`](TransactionTarget::b_transport) call and
//! inspects the response status once the call returns. The call also carries a `delay`: the
//! simulated time that passed relative to the caller's local time. Targets add whatever latency
//! they model to it.
//!
//! Initiators reach their targets through an [`InitiatorSocket`], which is bound exactly once while
//! the topology is assembled.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Range,
    sync::{Arc, OnceLock},
};

use tracing::error;

use crate::{error::TopologyError, sim::time::SimDuration};

/// The direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// The target fills the data buffer.
    Read,

    /// The target consumes the data buffer.
    Write,
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "READ"),
            Self::Write => write!(f, "WRITE"),
        }
    }
}

/// The response status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// No target has handled the transaction yet.
    Incomplete,

    /// The transaction completed successfully.
    Ok,

    /// The transaction failed for an unspecified reason.
    GenericError,

    /// The address range is not served by the target.
    AddressError,

    /// The target does not support the command at this address.
    CommandError,

    /// The target cannot handle a transaction of this length.
    BurstError,

    /// The target cannot handle the byte lanes of this transaction.
    ByteEnableError,
}

impl ResponseStatus {
    /// Returns `true` for [`ResponseStatus::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// A single bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    address: u64,
    command: Command,
    data: Vec<u8>,
    status: ResponseStatus,
}

impl Transaction {
    /// Create a read of `len` bytes at `address`.
    #[must_use]
    pub fn read(address: u64, len: usize) -> Self {
        Self {
            address,
            command: Command::Read,
            data: vec![0; len],
            status: ResponseStatus::Incomplete,
        }
    }

    /// Create a write of `data` to `address`.
    #[must_use]
    pub fn write(address: u64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            command: Command::Write,
            data: data.into(),
            status: ResponseStatus::Incomplete,
        }
    }

    /// The target address.
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.address
    }

    /// The command.
    #[must_use]
    pub const fn command(&self) -> Command {
        self.command
    }

    /// The data buffer.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The data buffer for targets serving a read.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the transaction and return its data buffer.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// The length of the access in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for zero-length accesses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The addressed byte range, or `None` if it wraps around the 64-bit address space.
    #[must_use]
    pub fn range(&self) -> Option<Range<u64>> {
        let len = u64::try_from(self.data.len()).ok()?;

        Some(self.address..self.address.checked_add(len)?)
    }

    /// The response status.
    #[must_use]
    pub const fn status(&self) -> ResponseStatus {
        self.status
    }

    /// Set the response status. Only the servicing target does this.
    pub fn set_status(&mut self, status: ResponseStatus) {
        self.status = status;
    }

    /// Returns `true` if the transaction completed successfully.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// The receiving end of a blocking transaction.
pub trait TransactionTarget: Debug + Send + Sync {
    /// Service `trans` and set its response status before returning.
    ///
    /// `delay` is the caller's local time offset. Targets add the latency they model.
    fn b_transport(&self, trans: &mut Transaction, delay: &mut SimDuration);
}

/// A reference-counted, thread-safe pointer to a transaction target.
pub type TargetRef = Arc<dyn TransactionTarget>;

/// The initiating end of a connection.
///
/// A socket is created unbound, bound exactly once during construction, and never rebound.
#[derive(Debug)]
pub struct InitiatorSocket<T: ?Sized> {
    name: String,
    target: OnceLock<Arc<T>>,
}

impl<T: ?Sized> InitiatorSocket<T> {
    /// Create an unbound socket.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: OnceLock::new(),
        }
    }

    /// The name of the socket for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect the socket to its target.
    pub fn bind(&self, target: Arc<T>) -> Result<(), TopologyError> {
        self.target
            .set(target)
            .map_err(|_| TopologyError::AlreadyBound {
                socket: self.name.clone(),
            })
    }

    /// Returns `true` once the socket is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.target.get().is_some()
    }

    /// The bound target.
    pub fn target(&self) -> Result<&Arc<T>, TopologyError> {
        self.target.get().ok_or_else(|| TopologyError::UnboundSocket {
            socket: self.name.clone(),
        })
    }

    /// Fail if the socket is not bound.
    pub fn check_bound(&self) -> Result<(), TopologyError> {
        self.target().map(|_| ())
    }
}

impl InitiatorSocket<dyn TransactionTarget> {
    /// Forward a transaction to the bound target.
    ///
    /// Topology validation makes sure every socket is bound before the simulation runs. Should an
    /// unbound socket be used anyway, the transaction fails instead of taking the simulation down.
    pub fn b_transport(&self, trans: &mut Transaction, delay: &mut SimDuration) {
        match self.target.get() {
            Some(target) => target.b_transport(trans, delay),
            None => {
                error!("Transaction on unbound socket {}", self.name);
                trans.set_status(ResponseStatus::GenericError);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutils {
    use std::sync::Mutex;

    use super::*;

    /// A target that records every transaction it sees, answers reads with a fixed byte and adds
    /// a fixed latency.
    #[derive(Debug)]
    pub struct RecordingTarget {
        pub fill: u8,
        pub latency: SimDuration,
        pub seen: Mutex<Vec<Transaction>>,
    }

    impl RecordingTarget {
        pub fn new(fill: u8) -> Self {
            Self {
                fill,
                latency: SimDuration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn with_latency(mut self, latency: SimDuration) -> Self {
            self.latency = latency;
            self
        }

        pub fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl TransactionTarget for RecordingTarget {
        fn b_transport(&self, trans: &mut Transaction, delay: &mut SimDuration) {
            self.seen.lock().unwrap().push(trans.clone());

            if trans.command() == Command::Read {
                trans.data_mut().fill(self.fill);
            }

            *delay += self.latency;
            trans.set_status(ResponseStatus::Ok);
        }
    }
}

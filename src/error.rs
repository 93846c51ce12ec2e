//! # Construction Errors
//!
//! Errors in this module describe a topology that cannot be simulated. They are raised while the
//! topology is assembled, before simulated time starts to advance. Errors of individual bus
//! transactions are never reported here; they live in the transaction's
//! [`ResponseStatus`](crate::device::transaction::ResponseStatus).

use thiserror::Error;

use crate::sim::{clock::ClockError, quantum::QuantumError};

/// A fault in the structure of the simulated system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// An initiator socket was never connected to a target.
    #[error("Initiator socket {socket} is not bound")]
    UnboundSocket {
        /// The name of the socket.
        socket: String,
    },

    /// An initiator socket was connected twice.
    #[error("Initiator socket {socket} is already bound")]
    AlreadyBound {
        /// The name of the socket.
        socket: String,
    },

    /// A model declares a clock input for a domain that does not exist.
    #[error("Clock input {pin} wants domain {domain}, which does not exist")]
    MissingClockDomain {
        /// The clock input of the model.
        pin: &'static str,
        /// The requested domain.
        domain: &'static str,
    },

    /// A region in the decode table has no sub-model socket behind it.
    #[error("Region {region} has no handler")]
    MissingRegionHandler {
        /// The region identifier.
        region: u8,
    },

    /// Two regions share an identifier.
    #[error("Region {region} is declared twice")]
    DuplicateRegion {
        /// The region identifier.
        region: u8,
    },

    /// A region cannot be exposed as a BAR.
    #[error("Region {region} cannot be a BAR: {reason}")]
    InvalidRegion {
        /// The region identifier.
        region: u8,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The configuration space disagrees with the decode table.
    #[error("BAR {region} in the configuration space does not match the decode table")]
    BarMismatch {
        /// The region identifier.
        region: u8,
    },

    /// A clock domain description is invalid.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// The synchronization quantum is invalid.
    #[error(transparent)]
    Quantum(#[from] QuantumError),
}

//! Error types for swaprpc.

use std::fmt;
use std::io;

use crate::buffer::BufferState;
use crate::table::ArgKind;

/// Errors surfaced by the buffer exchange and the batch codec.
#[derive(Debug)]
pub enum Error {
    /// A buffer operation was invoked in a state that does not permit it.
    IllegalState {
        /// Name of the offending operation.
        op: &'static str,
        /// State the buffer was in.
        state: BufferState,
    },
    /// A valid message arrived but no local slot can receive its region.
    /// The remote violated the slot-accounting contract.
    Overflow,
    /// The procedure table or codec configuration is invalid.
    Setup(String),
    /// No procedure with this name can be encoded from this endpoint.
    UnknownProcedure(String),
    /// No procedure with this id can be decoded on this endpoint.
    UnknownProcedureId(u32),
    /// An argument did not match the declared parameter kind.
    ArgumentMismatch {
        procedure: String,
        index: usize,
        expected: ArgKind,
    },
    /// Wrong number of arguments for a procedure.
    ArityMismatch {
        procedure: String,
        expected: usize,
        got: usize,
    },
    /// An instanced procedure was called without an instance id, or vice versa.
    InstanceMismatch {
        procedure: String,
        instanced: bool,
    },
    /// A batch operation would run past the end of the channel.
    CapacityExceeded { needed: usize, capacity: usize },
    /// A stored string cell is not a Unicode scalar value.
    InvalidCodeUnit(u32),
    /// A byte region is empty or not a whole number of 32-bit cells.
    InvalidRegion { len: usize },
    /// IO error from the underlying message port.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IllegalState { op, state } => {
                write!(f, "operation {} not permitted in state {}", op, state)
            }
            Error::Overflow => write!(f, "no free slot to receive an incoming buffer"),
            Error::Setup(msg) => write!(f, "setup error: {}", msg),
            Error::UnknownProcedure(name) => {
                write!(f, "procedure {:?} is not encodable from this endpoint", name)
            }
            Error::UnknownProcedureId(id) => {
                write!(f, "procedure id {} is not decodable on this endpoint", id)
            }
            Error::ArgumentMismatch {
                procedure,
                index,
                expected,
            } => write!(
                f,
                "procedure {:?}: argument {} is not {}",
                procedure, index, expected
            ),
            Error::ArityMismatch {
                procedure,
                expected,
                got,
            } => write!(
                f,
                "procedure {:?}: expected {} arguments, got {}",
                procedure, expected, got
            ),
            Error::InstanceMismatch {
                procedure,
                instanced,
            } => {
                if *instanced {
                    write!(f, "procedure {:?} requires an instance id", procedure)
                } else {
                    write!(f, "procedure {:?} is not instanced", procedure)
                }
            }
            Error::CapacityExceeded { needed, capacity } => {
                write!(f, "channel capacity exceeded: need {} cells, have {}", needed, capacity)
            }
            Error::InvalidCodeUnit(c) => write!(f, "cell {:#x} is not a Unicode scalar value", c),
            Error::InvalidRegion { len } => {
                write!(f, "region of {} bytes is not a whole number of cells", len)
            }
            Error::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type for swaprpc operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Segment store wire protocol.
//!
//! This module defines the command catalog spoken between clients and segment store
//! nodes, the frame layout carrying those commands over a byte stream, and the
//! outbound encoding policy used for appends.
//!
//! # Overview
//!
//! Every command travels in its own frame. The connection layer reads frames on a
//! dedicated thread and hands decoded [`Reply`] values to a reply processor, while
//! outbound [`Request`] and [`Append`] values are written through an [`Encoder`].
//!
//! # Key Components
//!
//! - [`WireCommandType`]: Stable numeric code for every known command.
//! - [`Request`] / [`Append`]: Commands a client sends.
//! - [`Reply`]: Commands a segment store sends back.
//! - [`CommandEncoder`]: Frames and buffers outbound commands.
//! - [`AppendBatchSizeTracker`]: Sizing heuristic for append batches.
//!
//! # Binary Format
//!
//! - Each frame begins with an 8 byte header: a big-endian `i32` command type
//!   followed by a big-endian `i32` payload length.
//! - The length must lie within `0..=MAX_WIRECOMMAND_SIZE`.
//! - The payload is encoded with bincode, big-endian with fixed-width integers.
//!
//! Unknown command types are rejected before any payload byte is consumed, which
//! keeps a corrupted stream from being misread as a sequence of valid frames.
//!
//! # See Also
//!
//! - [`connection`](crate::connection): Socket handling built on these primitives.
mod batch;
mod encoder;
mod request;
mod response;
mod transport;

use bincode::config::{BigEndian, Configuration, Fixint};

pub use batch::{AdaptiveBatchSizeTracker, AppendBatchSizeTracker, MAX_BATCH_SIZE};
pub use encoder::{CommandEncoder, Encoder};
pub use request::{Append, Hello, KeepAlive, Request, SetupAppend};
pub use response::{
    AppendSetup, DataAppended, InvalidEventNumber, NoSuchSegment, OperationUnsupported, Reply,
    SegmentIsSealed, WrongHost,
};
pub use transport::{IoBuffer, TransportError, read_command, write_frame};

/// Largest payload a single frame may declare.
pub const MAX_WIRECOMMAND_SIZE: i32 = 0x007F_FFFF;

/// Size of the fixed frame header: command type followed by payload length.
pub const HEADER_SIZE: usize = TYPE_SIZE + LENGTH_SIZE;

pub(crate) const TYPE_SIZE: usize = size_of::<i32>();
pub(crate) const LENGTH_SIZE: usize = size_of::<i32>();

/// Highest protocol version this client speaks.
pub const WIRE_VERSION: i32 = 15;
/// Oldest protocol version this client can still talk to.
pub const OLDEST_COMPATIBLE_VERSION: i32 = 5;

/// Payload encoding shared by every command.
pub(crate) fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Numeric identifiers of every command known to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireCommandType {
    Hello,
    KeepAlive,
    SetupAppend,
    AppendSetup,
    AppendBlockEnd,
    DataAppended,
    WrongHost,
    SegmentIsSealed,
    NoSuchSegment,
    InvalidEventNumber,
    OperationUnsupported,
}

impl WireCommandType {
    const ALL: [WireCommandType; 11] = [
        WireCommandType::Hello,
        WireCommandType::KeepAlive,
        WireCommandType::SetupAppend,
        WireCommandType::AppendSetup,
        WireCommandType::AppendBlockEnd,
        WireCommandType::DataAppended,
        WireCommandType::WrongHost,
        WireCommandType::SegmentIsSealed,
        WireCommandType::NoSuchSegment,
        WireCommandType::InvalidEventNumber,
        WireCommandType::OperationUnsupported,
    ];

    /// Code written in the first four bytes of a frame.
    pub const fn code(self) -> i32 {
        match self {
            WireCommandType::Hello => -127,
            WireCommandType::KeepAlive => 100,
            WireCommandType::SetupAppend => 1,
            WireCommandType::AppendSetup => 2,
            WireCommandType::AppendBlockEnd => 4,
            WireCommandType::DataAppended => 7,
            WireCommandType::WrongHost => 50,
            WireCommandType::SegmentIsSealed => 51,
            WireCommandType::NoSuchSegment => 53,
            WireCommandType::InvalidEventNumber => 55,
            WireCommandType::OperationUnsupported => 57,
        }
    }

    /// Looks up the command type for a wire code, `None` if the code is unknown.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Whether a segment store may send this command to a client.
    pub const fn is_reply(self) -> bool {
        !matches!(
            self,
            WireCommandType::SetupAppend | WireCommandType::AppendBlockEnd
        )
    }
}

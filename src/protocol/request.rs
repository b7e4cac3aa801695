use std::io::Write;

use bincode::{Decode, Encode};

use super::{OLDEST_COMPATIBLE_VERSION, TransportError, WIRE_VERSION, WireCommandType, write_frame};

/// Version negotiation, sent by both sides right after connecting.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub struct Hello {
    pub high_version: i32,
    pub low_version: i32,
}

impl Default for Hello {
    fn default() -> Self {
        Self {
            high_version: WIRE_VERSION,
            low_version: OLDEST_COMPATIBLE_VERSION,
        }
    }
}

/// Liveness probe; carries no fields.
#[derive(Debug, Clone, Copy, Default, Encode, Decode, PartialEq, Eq)]
pub struct KeepAlive;

/// Opens an append session for `writer_id` on `segment`.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct SetupAppend {
    pub request_id: i64,
    pub writer_id: u128,
    pub segment: String,
    pub delegation_token: String,
}

/// Structural (non-append) commands a client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Hello(Hello),
    KeepAlive(KeepAlive),
    SetupAppend(SetupAppend),
}

impl Request {
    pub fn command_type(&self) -> WireCommandType {
        match self {
            Request::Hello(_) => WireCommandType::Hello,
            Request::KeepAlive(_) => WireCommandType::KeepAlive,
            Request::SetupAppend(_) => WireCommandType::SetupAppend,
        }
    }

    /// Writes this request as one frame, returning the number of bytes written.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<usize, TransportError> {
        let command_type = self.command_type();
        match self {
            Request::Hello(body) => write_frame(out, command_type, body),
            Request::KeepAlive(body) => write_frame(out, command_type, body),
            Request::SetupAppend(body) => write_frame(out, command_type, body),
        }
    }
}

impl From<Hello> for Request {
    fn from(value: Hello) -> Self {
        Request::Hello(value)
    }
}

impl From<KeepAlive> for Request {
    fn from(value: KeepAlive) -> Self {
        Request::KeepAlive(value)
    }
}

impl From<SetupAppend> for Request {
    fn from(value: SetupAppend) -> Self {
        Request::SetupAppend(value)
    }
}

/// Event data for an established append session. Each append is
/// acknowledged by a `DataAppended` reply carrying its event number.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Append {
    pub writer_id: u128,
    pub event_number: i64,
    pub event_count: i32,
    pub data: Vec<u8>,
    pub request_id: i64,
}

impl Append {
    pub fn new(writer_id: u128, event_number: i64, data: Vec<u8>) -> Self {
        Self {
            writer_id,
            event_number,
            event_count: 1,
            data,
            request_id: event_number,
        }
    }

    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<usize, TransportError> {
        write_frame(out, WireCommandType::AppendBlockEnd, self)
    }
}

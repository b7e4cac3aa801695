use std::io::Write;

use bincode::{Decode, Encode, decode_from_slice};

use super::{
    Hello, KeepAlive, TransportError, WireCommandType, request::Append, wire_config, write_frame,
};

/// Confirms an append session opened by `SetupAppend`.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct AppendSetup {
    pub request_id: i64,
    pub segment: String,
    pub writer_id: u128,
    pub last_event_number: i64,
}

/// Acknowledges every event of `writer_id` up to and including `event_number`.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct DataAppended {
    pub request_id: i64,
    pub writer_id: u128,
    pub event_number: i64,
    pub previous_event_number: i64,
    pub current_segment_write_offset: i64,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct WrongHost {
    pub request_id: i64,
    pub segment: String,
    pub correct_host: String,
    pub server_stack_trace: String,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct SegmentIsSealed {
    pub request_id: i64,
    pub segment: String,
    pub server_stack_trace: String,
    pub offset: i64,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct NoSuchSegment {
    pub request_id: i64,
    pub segment: String,
    pub server_stack_trace: String,
    pub offset: i64,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct InvalidEventNumber {
    pub writer_id: u128,
    pub event_number: i64,
    pub server_stack_trace: String,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct OperationUnsupported {
    pub request_id: i64,
    pub operation_name: String,
    pub server_stack_trace: String,
}

/// Messages a segment store sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Hello(Hello),
    KeepAlive(KeepAlive),
    AppendSetup(AppendSetup),
    DataAppended(DataAppended),
    WrongHost(WrongHost),
    SegmentIsSealed(SegmentIsSealed),
    NoSuchSegment(NoSuchSegment),
    InvalidEventNumber(InvalidEventNumber),
    OperationUnsupported(OperationUnsupported),
}

impl Reply {
    pub fn command_type(&self) -> WireCommandType {
        match self {
            Reply::Hello(_) => WireCommandType::Hello,
            Reply::KeepAlive(_) => WireCommandType::KeepAlive,
            Reply::AppendSetup(_) => WireCommandType::AppendSetup,
            Reply::DataAppended(_) => WireCommandType::DataAppended,
            Reply::WrongHost(_) => WireCommandType::WrongHost,
            Reply::SegmentIsSealed(_) => WireCommandType::SegmentIsSealed,
            Reply::NoSuchSegment(_) => WireCommandType::NoSuchSegment,
            Reply::InvalidEventNumber(_) => WireCommandType::InvalidEventNumber,
            Reply::OperationUnsupported(_) => WireCommandType::OperationUnsupported,
        }
    }

    /// Request this reply answers, when the command carries one.
    pub fn request_id(&self) -> Option<i64> {
        match self {
            Reply::Hello(_) | Reply::KeepAlive(_) | Reply::InvalidEventNumber(_) => None,
            Reply::AppendSetup(r) => Some(r.request_id),
            Reply::DataAppended(r) => Some(r.request_id),
            Reply::WrongHost(r) => Some(r.request_id),
            Reply::SegmentIsSealed(r) => Some(r.request_id),
            Reply::NoSuchSegment(r) => Some(r.request_id),
            Reply::OperationUnsupported(r) => Some(r.request_id),
        }
    }

    /// Decodes the payload of a frame whose header named `command_type`.
    ///
    /// Bytes past the end of the known fields are ignored so newer peers may
    /// append fields to a command.
    pub fn read_from(command_type: WireCommandType, payload: &[u8]) -> Result<Self, TransportError> {
        let reply = match command_type {
            WireCommandType::Hello => Reply::Hello(decode(payload)?),
            WireCommandType::KeepAlive => Reply::KeepAlive(decode(payload)?),
            WireCommandType::AppendSetup => Reply::AppendSetup(decode(payload)?),
            WireCommandType::DataAppended => Reply::DataAppended(decode(payload)?),
            WireCommandType::WrongHost => Reply::WrongHost(decode(payload)?),
            WireCommandType::SegmentIsSealed => Reply::SegmentIsSealed(decode(payload)?),
            WireCommandType::NoSuchSegment => Reply::NoSuchSegment(decode(payload)?),
            WireCommandType::InvalidEventNumber => Reply::InvalidEventNumber(decode(payload)?),
            WireCommandType::OperationUnsupported => {
                Reply::OperationUnsupported(decode(payload)?)
            }
            t @ (WireCommandType::SetupAppend | WireCommandType::AppendBlockEnd) => {
                return Err(TransportError::UnexpectedCommand(t));
            }
        };
        Ok(reply)
    }

    /// Writes this reply as one frame, the way a segment store would.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<usize, TransportError> {
        let command_type = self.command_type();
        match self {
            Reply::Hello(body) => write_frame(out, command_type, body),
            Reply::KeepAlive(body) => write_frame(out, command_type, body),
            Reply::AppendSetup(body) => write_frame(out, command_type, body),
            Reply::DataAppended(body) => write_frame(out, command_type, body),
            Reply::WrongHost(body) => write_frame(out, command_type, body),
            Reply::SegmentIsSealed(body) => write_frame(out, command_type, body),
            Reply::NoSuchSegment(body) => write_frame(out, command_type, body),
            Reply::InvalidEventNumber(body) => write_frame(out, command_type, body),
            Reply::OperationUnsupported(body) => write_frame(out, command_type, body),
        }
    }
}

impl From<&Append> for DataAppended {
    /// Acknowledgement a segment store sends once `append` is durable.
    fn from(append: &Append) -> Self {
        Self {
            request_id: append.request_id,
            writer_id: append.writer_id,
            event_number: append.event_number,
            previous_event_number: append.event_number - i64::from(append.event_count),
            current_segment_write_offset: 0,
        }
    }
}

fn decode<T: Decode<()>>(payload: &[u8]) -> Result<T, TransportError> {
    let (value, _) = decode_from_slice(payload, wire_config())?;
    Ok(value)
}

use std::io::{self, Read, Write};

use bincode::{Encode, encode_to_vec};
use thiserror::Error;

use super::{
    HEADER_SIZE, LENGTH_SIZE, MAX_WIRECOMMAND_SIZE, Reply, TYPE_SIZE, WireCommandType, wire_config,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unknown wire command: {0}")]
    UnknownCommand(i32),
    #[error("event of invalid length: {0}")]
    InvalidLength(i32),
    #[error("command {0:?} is not a reply")]
    UnexpectedCommand(WireCommandType),
    #[error("encoded command of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

impl From<TransportError> for io::Error {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Io(e) => e,
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

/// Reusable receive buffer; grows to the largest frame seen and is
/// refilled in place for every read.
#[derive(Debug, Default)]
pub struct IoBuffer {
    buf: Vec<u8>,
}

impl IoBuffer {
    /// Reads exactly `len` bytes from `input` and returns them.
    pub fn fill<R: Read + ?Sized>(&mut self, input: &mut R, len: usize) -> io::Result<&[u8]> {
        self.buf.clear();
        self.buf.resize(len, 0);
        input.read_exact(&mut self.buf)?;
        Ok(&self.buf)
    }
}

/// Reads one frame from `input` and decodes it into a [`Reply`].
///
/// The header is validated before the payload is touched: an unknown type or a
/// length outside `0..=MAX_WIRECOMMAND_SIZE` fails after exactly
/// [`HEADER_SIZE`] bytes have been consumed.
pub fn read_command<R: Read + ?Sized>(
    input: &mut R,
    buffer: &mut IoBuffer,
) -> Result<Reply, TransportError> {
    let header = buffer.fill(input, HEADER_SIZE)?;
    let code = read_i32(&header[..TYPE_SIZE]);
    let length = read_i32(&header[TYPE_SIZE..TYPE_SIZE + LENGTH_SIZE]);

    let Some(command_type) = WireCommandType::from_code(code) else {
        return Err(TransportError::UnknownCommand(code));
    };
    if !(0..=MAX_WIRECOMMAND_SIZE).contains(&length) {
        return Err(TransportError::InvalidLength(length));
    }

    let payload = buffer.fill(input, length as usize)?;
    Reply::read_from(command_type, payload)
}

/// Writes a frame carrying `body` and returns the number of bytes written.
pub fn write_frame<W: Write + ?Sized, T: Encode>(
    out: &mut W,
    command_type: WireCommandType,
    body: &T,
) -> Result<usize, TransportError> {
    let payload = encode_to_vec(body, wire_config())?;
    let length = i32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_WIRECOMMAND_SIZE)
        .ok_or(TransportError::FrameTooLarge(payload.len()))?;

    let mut header = [0u8; HEADER_SIZE];
    header[..TYPE_SIZE].copy_from_slice(&command_type.code().to_be_bytes());
    header[TYPE_SIZE..].copy_from_slice(&length.to_be_bytes());
    out.write_all(&header)?;
    out.write_all(&payload)?;
    Ok(HEADER_SIZE + payload.len())
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    i32::from_be_bytes(raw)
}

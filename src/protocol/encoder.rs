use std::{
    io::{self, BufWriter, Write},
    sync::Arc,
};

use log::trace;

use super::{Append, AppendBatchSizeTracker, Request};

/// Outbound side of a connection.
///
/// Implementations are not synchronized; callers serialize access.
pub trait Encoder: Send {
    /// Writes a structural command and pushes it to the peer.
    fn write_command(&mut self, command: &Request) -> io::Result<()>;

    /// Writes an append. It may stay buffered until [`Encoder::flush`].
    fn write_append(&mut self, append: &Append) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;
}

/// Frames commands onto a buffered writer, coalescing appends into blocks
/// sized by an [`AppendBatchSizeTracker`].
pub struct CommandEncoder<W: Write> {
    out: BufWriter<W>,
    tracker: Arc<dyn AppendBatchSizeTracker>,
    pending: usize,
}

impl<W: Write> CommandEncoder<W> {
    pub fn new(out: W, tracker: Arc<dyn AppendBatchSizeTracker>) -> Self {
        Self {
            out: BufWriter::with_capacity(super::MAX_BATCH_SIZE, out),
            tracker,
            pending: 0,
        }
    }

    pub fn get_ref(&self) -> &W {
        self.out.get_ref()
    }
}

impl<W: Write + Send> Encoder for CommandEncoder<W> {
    fn write_command(&mut self, command: &Request) -> io::Result<()> {
        command.write_to(&mut self.out)?;
        self.flush()
    }

    fn write_append(&mut self, append: &Append) -> io::Result<()> {
        let size = append.write_to(&mut self.out)?;
        self.tracker.record_append(append.event_number, size);
        self.pending += size;

        let block_size = self.tracker.append_block_size();
        if self.pending >= block_size {
            trace!("flushing {} bytes of appends, block size {block_size}", self.pending);
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.pending = 0;
        self.out.flush()
    }
}

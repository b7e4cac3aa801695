use std::{
    any::Any,
    io::{self, Read},
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use log::{debug, error};

use crate::protocol::{AppendBatchSizeTracker, IoBuffer, Reply, read_command};

use super::{ProcessingError, ReplyProcessor};

/// Background reader for one connection.
///
/// Runs on a dedicated thread that is the only reader of the socket and the
/// only caller of the reply processor for decoded replies. The reader holds the
/// processor, never the connection that owns it.
pub struct ConnectionReader {
    shared: Arc<ReaderState>,
}

struct ReaderState {
    name: String,
    callback: Arc<dyn ReplyProcessor>,
    stop: AtomicBool,
}

impl ConnectionReader {
    /// Spawns the reader thread decoding frames from `input`.
    ///
    /// `on_failure` runs on the reader thread after a read or protocol error
    /// that the reader noticed first, once the processor has been told the
    /// connection dropped. It does not run when the reader is stopped through
    /// [`ConnectionReader::stop`].
    pub fn start<R, F>(
        name: String,
        input: R,
        callback: Arc<dyn ReplyProcessor>,
        tracker: Arc<dyn AppendBatchSizeTracker>,
        on_failure: F,
    ) -> io::Result<Self>
    where
        R: Read + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(ReaderState {
            name,
            callback,
            stop: AtomicBool::new(false),
        });

        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("Reading from {}", shared.name))
            .spawn(move || worker.run(input, &*tracker, on_failure))?;

        Ok(Self { shared })
    }

    /// Stops reading and notifies the processor that the connection dropped.
    ///
    /// Only the first call notifies. A read blocked on the socket returns once
    /// the socket is closed and the thread exits without notifying again.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }
}

impl ReaderState {
    fn run<R: Read>(
        &self,
        mut input: R,
        tracker: &dyn AppendBatchSizeTracker,
        on_failure: impl FnOnce(),
    ) {
        let mut buffer = IoBuffer::default();

        let error = loop {
            if self.stop.load(Ordering::Acquire) {
                debug!("reader for {} exited", self.name);
                return;
            }
            match read_command(&mut input, &mut buffer) {
                Ok(reply) => {
                    if let Reply::DataAppended(ack) = &reply {
                        tracker.record_ack(ack.event_number);
                    }
                    self.dispatch(reply);
                }
                Err(e) => break e,
            }
        };

        if self.stop.load(Ordering::Acquire) {
            debug!("read from {} ended after close: {error}", self.name);
        } else {
            error!("Error processing data from server {}: {error}", self.name);
        }
        if self.stop() {
            on_failure();
        }
        debug!("reader for {} exited", self.name);
    }

    fn dispatch(&self, reply: Reply) {
        let error = match panic::catch_unwind(AssertUnwindSafe(|| self.callback.process(reply))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(payload) => panic_error(payload),
        };
        self.callback.processing_failure(error);
    }

    /// Returns whether this call was the one that stopped the reader.
    fn stop(&self) -> bool {
        let first = !self.stop.swap(true, Ordering::AcqRel);
        if first {
            self.callback.connection_dropped();
        }
        first
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> ProcessingError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "reply processor panicked".to_string()
    };
    message.into()
}

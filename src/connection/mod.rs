//! Connections to segment store nodes.
//!
//! A [`TcpClientConnection`] is one logical link to a node. Establishing it
//! opens and tunes a socket, optionally completes a TLS handshake, and starts a
//! background reader that decodes frames and hands every [`Reply`] to a
//! caller-supplied [`ReplyProcessor`]. Commands are written synchronously on the
//! caller's thread.
//!
//! # Lifecycle
//!
//! A connection ends through [`ClientConnection::close`], through a failed
//! write, through a read failure observed by the reader, or when the value is
//! dropped. Whatever the cause, the reply processor receives exactly one
//! [`ReplyProcessor::connection_dropped`] notification. A failed send returns
//! an error *and* triggers that notification; callers treat them as two views of
//! the same failure.
//!
//! # Concurrency
//!
//! Two actors touch a connection: any number of caller threads sending or
//! closing, and the connection's own reader thread. The closed flag is an
//! atomic compare-and-set so teardown runs once even when `close` races with a
//! failing write. Closing the socket wakes a reader blocked in `read`, which
//! then exits quietly.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use segwire::{
//!     ClientConfig, NodeUri,
//!     connection::{ClientConnection, ProcessingError, ReplyProcessor, TcpClientConnection},
//!     protocol::{Hello, Reply},
//! };
//!
//! struct Print;
//!
//! impl ReplyProcessor for Print {
//!     fn process(&self, reply: Reply) -> Result<(), ProcessingError> {
//!         println!("{reply:?}");
//!         Ok(())
//!     }
//!
//!     fn processing_failure(&self, error: ProcessingError) {
//!         eprintln!("{error}");
//!     }
//!
//!     fn connection_dropped(&self) {}
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = tokio::runtime::Handle::current();
//! let location = NodeUri::new("localhost", 12345);
//! let connection =
//!     TcpClientConnection::connect(location, ClientConfig::default(), Arc::new(Print), &handle)
//!         .await?;
//! connection.send(&Hello::default().into())?;
//! connection.close();
//! # Ok(())
//! # }
//! ```
mod reader;
mod socket;
mod tls;

use std::{
    error::Error,
    fmt,
    future::Future,
    io,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::{runtime::Handle, task::JoinError};

use crate::{
    ClientConfig, NodeUri,
    protocol::{
        AdaptiveBatchSizeTracker, Append, AppendBatchSizeTracker, CommandEncoder, Encoder, Reply,
        Request,
    },
};

pub use reader::ConnectionReader;
use socket::SocketHandle;

/// Send and receive buffer size applied to every socket.
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Error raised by a [`ReplyProcessor`] while handling a reply.
pub type ProcessingError = Box<dyn Error + Send + Sync>;

/// Completion handler for [`ClientConnection::send_async`].
pub type CompletedCallback = Box<dyn FnOnce(Result<(), ConnectionError>) + Send>;

/// Receives everything a connection reads.
///
/// All three methods are called from the connection's reader thread, except
/// that `connection_dropped` runs on the closing thread when the connection is
/// closed locally.
pub trait ReplyProcessor: Send + Sync {
    fn process(&self, reply: Reply) -> Result<(), ProcessingError>;

    /// Called with the error (or panic message) of a failed [`ReplyProcessor::process`].
    /// The connection keeps reading.
    fn processing_failure(&self, error: ProcessingError);

    /// Called once when the connection is gone, whatever the cause.
    fn connection_dropped(&self);
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection is closed")]
    Closed,

    #[error("connection failed: {0}")]
    Failed(#[from] io::Error),

    #[error("tls handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("unable to load trust store '{path}': {source}")]
    TrustStore {
        path: PathBuf,
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    #[error("unable to build certificate verifier: {0}")]
    Verifier(#[from] rustls::client::VerifierBuilderError),

    #[error("invalid server name: {0}")]
    InvalidServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    #[error("could not resolve '{0}'")]
    Unresolved(String),

    #[error("connection task failed: {0}")]
    Task(#[from] JoinError),
}

/// Outbound half of a link to a segment store, plus its lifecycle.
pub trait ClientConnection: Send + Sync {
    /// Sends a structural command.
    fn send(&self, command: &Request) -> Result<(), ConnectionError>;

    /// Sends a single append and flushes it.
    fn send_append(&self, append: &Append) -> Result<(), ConnectionError>;

    /// Writes `appends` in order and completes `callback` with the outcome.
    /// On failure a prefix of the batch may already have been written.
    fn send_async(&self, appends: Vec<Append>, callback: CompletedCallback);

    /// Tears the connection down. Idempotent.
    fn close(&self);
}

/// Connection to a segment store over a (possibly TLS wrapped) TCP socket.
pub struct TcpClientConnection {
    link: Arc<Link>,
    encoder: Mutex<Box<dyn Encoder>>,
    reader: ConnectionReader,
    location: NodeUri,
}

/// Closed flag and socket, shared with the reader thread so a read failure
/// can close the connection without holding a reference to it.
struct Link {
    closed: AtomicBool,
    socket: SocketHandle,
}

impl Link {
    fn new(socket: SocketHandle) -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
            socket,
        })
    }

    /// Flags the link closed. Only the first caller gets `true`.
    fn mark_closed(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn shutdown(&self, location: &NodeUri) {
        if let Err(e) = self.socket.close() {
            warn!("Error closing socket to {location}: {e}");
        }
    }
}

impl TcpClientConnection {
    /// Connects to `location`.
    ///
    /// The work is spawned on `executor` right away, so the caller's thread is
    /// never blocked; the returned future only waits for the outcome. The TLS
    /// handshake, when enabled, is blocking and runs on the executor's blocking
    /// pool. On failure any socket opened along the way is closed.
    ///
    /// Dropping the returned future does not cancel the connect. When the drop
    /// happens before the handshake finishes, the socket is closed and the
    /// reader never starts, so `callback` hears nothing. A connection that was
    /// already established is dropped at once and `callback` receives
    /// [`ReplyProcessor::connection_dropped`].
    pub fn connect(
        location: NodeUri,
        config: ClientConfig,
        callback: Arc<dyn ReplyProcessor>,
        executor: &Handle,
    ) -> impl Future<Output = Result<Self, ConnectionError>> + Send + 'static {
        let abandoned = Abandoned::default();
        let flag = Arc::clone(&abandoned.0);
        let task = executor.spawn(async move {
            let stream = socket::open(&location).await?;
            let connection = tokio::task::spawn_blocking(move || {
                Self::establish(stream, location, &config, callback, &flag)
            })
            .await??;
            Ok::<_, ConnectionError>(connection)
        });

        async move {
            let _abandoned = abandoned;
            match task.await {
                Ok(result) => result,
                Err(e) => Err(e.into()),
            }
        }
    }

    fn establish(
        stream: std::net::TcpStream,
        location: NodeUri,
        config: &ClientConfig,
        callback: Arc<dyn ReplyProcessor>,
        abandoned: &AtomicBool,
    ) -> Result<Self, ConnectionError> {
        let (input, output, socket) = if config.enable_tls_to_segment_store {
            let tls_config = tls::client_config(config)?;
            tls::handshake(stream, tls_config, &location.endpoint)?.split()?
        } else {
            socket::split(stream)?
        };

        if abandoned.load(Ordering::Acquire) {
            debug!("connect to {location} abandoned by the caller");
            return Err(ConnectionError::Closed);
        }

        let tracker: Arc<dyn AppendBatchSizeTracker> = Arc::new(AdaptiveBatchSizeTracker::default());
        let link = Link::new(socket);
        let reader = Self::start_reader(&link, &location, input, callback, Arc::clone(&tracker))?;
        let encoder = CommandEncoder::new(output, tracker);

        info!("connected to {location}");
        Ok(Self::new(link, Box::new(encoder), reader, location))
    }

    /// Starts the reader. A read or protocol error it hits closes the link.
    fn start_reader<R>(
        link: &Arc<Link>,
        location: &NodeUri,
        input: R,
        callback: Arc<dyn ReplyProcessor>,
        tracker: Arc<dyn AppendBatchSizeTracker>,
    ) -> io::Result<ConnectionReader>
    where
        R: io::Read + Send + 'static,
    {
        let teardown = Arc::clone(link);
        let peer = location.clone();
        ConnectionReader::start(location.to_string(), input, callback, tracker, move || {
            if teardown.mark_closed() {
                teardown.shutdown(&peer);
            }
        })
    }

    fn new(
        link: Arc<Link>,
        encoder: Box<dyn Encoder>,
        reader: ConnectionReader,
        location: NodeUri,
    ) -> Self {
        Self {
            link,
            encoder: Mutex::new(encoder),
            reader,
            location,
        }
    }

    pub fn location(&self) -> &NodeUri {
        &self.location
    }

    pub fn is_closed(&self) -> bool {
        self.link.is_closed()
    }

    /// Runs `op` against the encoder unless the connection is closed. A
    /// failed write closes the connection.
    fn write<F>(&self, op: F) -> Result<(), ConnectionError>
    where
        F: FnOnce(&mut Box<dyn Encoder>) -> io::Result<()>,
    {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let result = match self.encoder.lock() {
            Ok(mut encoder) => op(&mut *encoder),
            Err(_) => Err(io::Error::other("encoder poisoned by an earlier panic")),
        };

        result.map_err(|e| {
            warn!("Error writing to connection {}: {e}", self.location);
            self.close();
            ConnectionError::Failed(e)
        })
    }
}

impl ClientConnection for TcpClientConnection {
    fn send(&self, command: &Request) -> Result<(), ConnectionError> {
        self.write(|encoder| encoder.write_command(command))
    }

    fn send_append(&self, append: &Append) -> Result<(), ConnectionError> {
        self.write(|encoder| {
            encoder.write_append(append)?;
            encoder.flush()
        })
    }

    fn send_async(&self, appends: Vec<Append>, callback: CompletedCallback) {
        let result = self.write(|encoder| {
            for append in &appends {
                encoder.write_append(append)?;
            }
            encoder.flush()
        });
        callback(result);
    }

    fn close(&self) {
        if self.link.mark_closed() {
            self.reader.stop();
            self.link.shutdown(&self.location);
        }
    }
}

/// Set when the future returned by [`TcpClientConnection::connect`] is dropped.
#[derive(Default)]
struct Abandoned(Arc<AtomicBool>);

impl Drop for Abandoned {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Drop for TcpClientConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for TcpClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TcpClientConnection [location={}, closed={}]",
            self.location,
            self.is_closed()
        )
    }
}

impl fmt::Debug for TcpClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::{Shutdown, TcpListener, TcpStream},
        sync::{
            atomic::AtomicUsize,
            mpsc::{self, Receiver, Sender},
        },
        thread,
        time::{Duration, Instant},
    };

    use crate::protocol::{DataAppended, Hello, IoBuffer, KeepAlive, read_command};

    use super::*;

    /// Processor forwarding replies to a channel and counting drops.
    struct Collect {
        replies: Mutex<Sender<Reply>>,
        dropped: AtomicUsize,
    }

    impl Collect {
        fn new() -> (Arc<Self>, Receiver<Reply>) {
            let (tx, rx) = mpsc::channel();
            let collect = Arc::new(Self {
                replies: Mutex::new(tx),
                dropped: AtomicUsize::new(0),
            });
            (collect, rx)
        }

        fn dropped(&self) -> usize {
            self.dropped.load(Ordering::SeqCst)
        }
    }

    impl ReplyProcessor for Collect {
        fn process(&self, reply: Reply) -> Result<(), ProcessingError> {
            self.replies.lock().unwrap().send(reply)?;
            Ok(())
        }

        fn processing_failure(&self, _error: ProcessingError) {}

        fn connection_dropped(&self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Encoder logging every call and failing on a chosen append or command.
    struct Scripted {
        calls: Arc<Mutex<Vec<String>>>,
        fail_append: Option<i64>,
        fail_commands: bool,
    }

    impl Encoder for Scripted {
        fn write_command(&mut self, command: &Request) -> io::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("command {:?}", command.command_type()));
            if self.fail_commands {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            Ok(())
        }

        fn write_append(&mut self, append: &Append) -> io::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("append {}", append.event_number));
            if self.fail_append == Some(append.event_number) {
                return Err(io::Error::from(io::ErrorKind::ConnectionReset));
            }
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.calls.lock().unwrap().push("flush".to_string());
            Ok(())
        }
    }

    struct Fixture {
        connection: Arc<TcpClientConnection>,
        calls: Arc<Mutex<Vec<String>>>,
        callback: Arc<Collect>,
        server: TcpStream,
    }

    impl Fixture {
        fn new(fail_append: Option<i64>, fail_commands: bool) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
            let (server, _) = listener.accept().unwrap();
            server
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();

            let (callback, _) = Collect::new();
            let calls = Arc::new(Mutex::new(Vec::new()));
            let encoder = Scripted {
                calls: Arc::clone(&calls),
                fail_append,
                fail_commands,
            };
            let location = NodeUri::new("127.0.0.1", 12345);
            let input = client.try_clone().unwrap();
            let link = Link::new(SocketHandle::plain(client));
            let reader = TcpClientConnection::start_reader(
                &link,
                &location,
                input,
                callback.clone(),
                Arc::new(AdaptiveBatchSizeTracker::default()),
            )
            .unwrap();
            let connection =
                TcpClientConnection::new(link, Box::new(encoder), reader, location);

            Self {
                connection: Arc::new(connection),
                calls,
                callback,
                server,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn assert_server_sees_eof(&mut self) {
            let mut buf = [0u8; 16];
            assert_eq!(self.server.read(&mut buf).unwrap(), 0);
        }
    }

    fn wait_until(what: &str, done: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn appends(numbers: &[i64]) -> Vec<Append> {
        numbers
            .iter()
            .map(|n| Append::new(1, *n, vec![0; 8]))
            .collect()
    }

    fn completion() -> (CompletedCallback, Receiver<Result<(), ConnectionError>>) {
        let (tx, rx) = mpsc::channel();
        let callback: CompletedCallback = Box::new(move |result| tx.send(result).unwrap());
        (callback, rx)
    }

    #[test]
    fn concurrent_close_tears_down_once() {
        let mut fixture = Fixture::new(None, false);

        let closers = (0..8)
            .map(|_| {
                let connection = Arc::clone(&fixture.connection);
                thread::spawn(move || connection.close())
            })
            .collect::<Vec<_>>();
        for closer in closers {
            closer.join().unwrap();
        }

        assert!(fixture.connection.is_closed());
        assert_eq!(fixture.callback.dropped(), 1);
        fixture.assert_server_sees_eof();

        fixture.connection.close();
        assert_eq!(fixture.callback.dropped(), 1);
    }

    #[test]
    fn protocol_error_from_node_closes_connection() {
        let mut fixture = Fixture::new(None, false);
        let mut frame = 999i32.to_be_bytes().to_vec();
        frame.extend_from_slice(&0i32.to_be_bytes());
        fixture.server.write_all(&frame).unwrap();

        let connection = Arc::clone(&fixture.connection);
        wait_until("close", || connection.is_closed());

        assert!(fixture.connection.reader.is_stopped());
        assert_eq!(fixture.callback.dropped(), 1);
        fixture.assert_server_sees_eof();

        let res = fixture.connection.send(&KeepAlive.into());
        assert!(matches!(res, Err(ConnectionError::Closed)));
        assert!(fixture.calls().is_empty());

        fixture.connection.close();
        assert_eq!(fixture.callback.dropped(), 1);
    }

    #[test]
    fn node_hangup_closes_connection() {
        let fixture = Fixture::new(None, false);
        fixture.server.shutdown(Shutdown::Write).unwrap();

        let connection = Arc::clone(&fixture.connection);
        wait_until("close", || connection.is_closed());

        assert_eq!(fixture.callback.dropped(), 1);
        let (callback, rx) = completion();
        fixture.connection.send_async(appends(&[1]), callback);
        assert!(matches!(rx.recv().unwrap(), Err(ConnectionError::Closed)));
    }

    #[test]
    fn send_after_close_never_touches_encoder() {
        let fixture = Fixture::new(None, false);
        fixture.connection.close();

        let res = fixture.connection.send(&Request::KeepAlive(KeepAlive));
        assert!(matches!(res, Err(ConnectionError::Closed)));
        let res = fixture.connection.send_append(&Append::new(1, 1, vec![]));
        assert!(matches!(res, Err(ConnectionError::Closed)));

        let (callback, rx) = completion();
        fixture.connection.send_async(appends(&[1, 2]), callback);
        assert!(matches!(rx.recv().unwrap(), Err(ConnectionError::Closed)));

        assert!(fixture.calls().is_empty());
    }

    #[test]
    fn write_failure_closes_connection() {
        let mut fixture = Fixture::new(None, true);

        let res = fixture.connection.send(&Hello::default().into());
        assert!(matches!(res, Err(ConnectionError::Failed(e)) if e.kind() == io::ErrorKind::BrokenPipe));

        assert!(fixture.connection.is_closed());
        assert!(fixture.connection.reader.is_stopped());
        assert_eq!(fixture.callback.dropped(), 1);
        fixture.assert_server_sees_eof();

        let res = fixture.connection.send(&Hello::default().into());
        assert!(matches!(res, Err(ConnectionError::Closed)));
        assert_eq!(fixture.calls(), vec!["command Hello".to_string()]);
    }

    #[test]
    fn send_async_stops_at_first_failure() {
        let fixture = Fixture::new(Some(2), false);

        let (callback, rx) = completion();
        fixture.connection.send_async(appends(&[1, 2, 3]), callback);

        let result = rx.recv().unwrap();
        assert!(
            matches!(result, Err(ConnectionError::Failed(e)) if e.kind() == io::ErrorKind::ConnectionReset)
        );
        assert_eq!(fixture.calls(), vec!["append 1", "append 2"]);
        assert!(fixture.connection.is_closed());
        assert_eq!(fixture.callback.dropped(), 1);
    }

    #[test]
    fn send_async_flushes_whole_batch() {
        let fixture = Fixture::new(None, false);

        let (callback, rx) = completion();
        fixture.connection.send_async(appends(&[1, 2, 3]), callback);

        assert!(rx.recv().unwrap().is_ok());
        assert_eq!(
            fixture.calls(),
            vec!["append 1", "append 2", "append 3", "flush"]
        );
        assert!(!fixture.connection.is_closed());
    }

    #[test]
    fn send_append_flushes() {
        let fixture = Fixture::new(None, false);

        fixture
            .connection
            .send_append(&Append::new(1, 5, vec![1]))
            .unwrap();
        assert_eq!(fixture.calls(), vec!["append 5", "flush"]);
    }

    #[test]
    fn display_reports_state() {
        let fixture = Fixture::new(None, false);
        assert_eq!(
            fixture.connection.to_string(),
            "TcpClientConnection [location=127.0.0.1:12345, closed=false]"
        );

        fixture.connection.close();
        assert_eq!(
            fixture.connection.to_string(),
            "TcpClientConnection [location=127.0.0.1:12345, closed=true]"
        );
    }

    /// Accepts one client, answers its first command with `replies`, then
    /// reports what it read until the client goes away.
    fn serve_once(listener: TcpListener, replies: Vec<Reply>) -> thread::JoinHandle<Reply> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let first = read_command(&mut stream, &mut IoBuffer::default()).unwrap();
            for reply in replies {
                reply.write_to(&mut stream).unwrap();
            }
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest);
            first
        })
    }

    #[tokio::test]
    async fn connect_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ack = Reply::DataAppended(DataAppended::from(&Append::new(9, 1, vec![7])));
        let server = serve_once(listener, vec![Reply::Hello(Hello::default()), ack.clone()]);
        let (callback, rx) = Collect::new();

        let connection = TcpClientConnection::connect(
            NodeUri::new("127.0.0.1", port),
            ClientConfig::default(),
            callback.clone(),
            &Handle::current(),
        )
        .await
        .unwrap();
        connection.send(&Hello::default().into()).unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), Reply::Hello(Hello::default()));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), ack);

        connection.close();
        assert_eq!(server.join().unwrap(), Reply::Hello(Hello::default()));
        assert_eq!(callback.dropped(), 1);
    }

    #[tokio::test]
    async fn dropping_connection_closes_it() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = serve_once(listener, vec![]);
        let (callback, _rx) = Collect::new();

        let connection = TcpClientConnection::connect(
            NodeUri::new("127.0.0.1", port),
            ClientConfig::default(),
            callback.clone(),
            &Handle::current(),
        )
        .await
        .unwrap();
        connection.send(&KeepAlive.into()).unwrap();
        drop(connection);

        assert_eq!(server.join().unwrap(), Reply::KeepAlive(KeepAlive));
        assert_eq!(callback.dropped(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn abandoned_connect_never_reaches_processor() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).unwrap();
            rest.len()
        });
        let (callback, _rx) = Collect::new();

        drop(TcpClientConnection::connect(
            NodeUri::new("127.0.0.1", port),
            ClientConfig::default(),
            callback.clone(),
            &Handle::current(),
        ));

        assert_eq!(server.join().unwrap(), 0);
        assert_eq!(callback.dropped(), 0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (callback, _rx) = Collect::new();

        let res = TcpClientConnection::connect(
            NodeUri::new("127.0.0.1", port),
            ClientConfig::default(),
            callback.clone(),
            &Handle::current(),
        )
        .await;

        assert!(matches!(res, Err(ConnectionError::Failed(_))));
        assert_eq!(callback.dropped(), 0);
    }
}

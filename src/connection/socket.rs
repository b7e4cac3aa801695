use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    sync::Arc,
};

use log::debug;
use tokio::net::{TcpSocket, lookup_host};

use crate::NodeUri;

use super::{ConnectionError, TCP_BUFFER_SIZE, tls::TlsShared};

pub(crate) type Halves = (
    Box<dyn Read + Send>,
    Box<dyn Write + Send>,
    SocketHandle,
);

/// Resolves `location` and connects a tuned socket to it.
///
/// The socket is handed back in blocking mode; from here on it is driven by
/// the connection's reader thread and by callers' sends.
pub(crate) async fn open(location: &NodeUri) -> Result<TcpStream, ConnectionError> {
    let addr = lookup_host((location.endpoint.as_str(), location.port))
        .await?
        .next()
        .ok_or_else(|| ConnectionError::Unresolved(location.to_string()))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_send_buffer_size(TCP_BUFFER_SIZE as u32)?;
    socket.set_recv_buffer_size(TCP_BUFFER_SIZE as u32)?;

    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;

    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    debug!("socket to {location} connected via {addr}");
    Ok(stream)
}

/// Splits a plain socket into reader input, writer output and a close handle.
pub(crate) fn split(stream: TcpStream) -> io::Result<Halves> {
    let input = stream.try_clone()?;
    let output = stream.try_clone()?;
    Ok((Box::new(input), Box::new(output), SocketHandle::plain(stream)))
}

/// Handle used to tear the socket down from any thread.
pub(crate) struct SocketHandle {
    tcp: TcpStream,
    tls: Option<Arc<TlsShared>>,
}

impl SocketHandle {
    pub(crate) fn plain(tcp: TcpStream) -> Self {
        Self { tcp, tls: None }
    }

    pub(crate) fn tls(tcp: TcpStream, shared: Arc<TlsShared>) -> Self {
        Self {
            tcp,
            tls: Some(shared),
        }
    }

    /// Shuts the socket down in both directions, which also fails any read
    /// blocked on it. A TLS session gets a best-effort `close_notify` first.
    pub(crate) fn close(&self) -> io::Result<()> {
        if let Some(tls) = &self.tls {
            tls.close_notify();
        }
        self.tcp.shutdown(Shutdown::Both)
    }
}

//! TLS for segment store connections.
//!
//! The session is shared between the reader thread and callers' sends. The
//! reader only holds the session lock while moving bytes between buffers and
//! never while blocked on the socket, so a blocked read cannot stall a send.
//! Encrypted records are written to the socket under a separate lock that
//! keeps them in sequence.
use std::{
    io::{self, Read, Write},
    net::TcpStream,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, warn};
use rustls::{
    CertificateError, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme,
    client::{
        WebPkiServerVerifier,
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    },
    pki_types::{CertificateDer, ServerName, UnixTime, pem::PemObject},
};

use crate::ClientConfig;

use super::{
    ConnectionError,
    socket::{Halves, SocketHandle},
};

const TLS_READ_CHUNK: usize = 16 * 1024;

/// Builds the rustls configuration for `config`.
///
/// Certificates are trusted from `config.trust_store` when set to a non-empty
/// path, otherwise from the platform store. With host name validation turned
/// off the chain is still verified; only the check that the certificate names
/// the dialed host is skipped.
pub(crate) fn client_config(
    config: &ClientConfig,
) -> Result<Arc<rustls::ClientConfig>, ConnectionError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let roots = root_store(config.trust_store.as_deref())?;
    let verifier =
        WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
            .build()?;

    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?;
    let tls_config = if config.validate_host_name {
        builder.with_webpki_verifier(verifier).with_no_client_auth()
    } else {
        warn!("tls host name validation is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AnyHostName { inner: verifier }))
            .with_no_client_auth()
    };
    Ok(Arc::new(tls_config))
}

fn root_store(trust_store: Option<&Path>) -> Result<RootCertStore, ConnectionError> {
    let mut roots = RootCertStore::empty();

    match trust_store.filter(|path| !path.as_os_str().is_empty()) {
        Some(path) => {
            let trust_store_error = |source| ConnectionError::TrustStore {
                path: path.to_path_buf(),
                source,
            };
            for cert in CertificateDer::pem_file_iter(path).map_err(trust_store_error)? {
                roots.add(cert.map_err(trust_store_error)?)?;
            }
            debug!("loaded {} trusted certificates from {path:?}", roots.len());
        }
        None => {
            let native = rustls_native_certs::load_native_certs();
            if !native.errors.is_empty() {
                debug!("errors loading native certs: {:?}", native.errors);
            }
            roots.add_parsable_certificates(native.certs);
        }
    }

    Ok(roots)
}

/// Verifies the certificate chain and signatures but accepts any server name.
#[derive(Debug)]
struct AnyHostName {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for AnyHostName {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// A TLS session whose handshake has completed over `tcp`.
pub(crate) struct TlsStream {
    tcp: TcpStream,
    session: ClientConnection,
}

/// Runs the client handshake to completion on the blocking socket.
pub(crate) fn handshake(
    mut tcp: TcpStream,
    config: Arc<rustls::ClientConfig>,
    endpoint: &str,
) -> Result<TlsStream, ConnectionError> {
    let server_name = ServerName::try_from(endpoint.to_string())?;
    let mut session = ClientConnection::new(config, server_name)?;

    while session.is_handshaking() {
        session
            .complete_io(&mut tcp)
            .map_err(ConnectionError::Handshake)?;
    }
    while session.wants_write() {
        session
            .write_tls(&mut tcp)
            .map_err(ConnectionError::Handshake)?;
    }

    debug!(
        "tls session with {endpoint} established, {:?}",
        session.protocol_version()
    );
    Ok(TlsStream { tcp, session })
}

impl TlsStream {
    pub(crate) fn split(self) -> io::Result<Halves> {
        let shared = Arc::new(TlsShared {
            session: Mutex::new(self.session),
            send: Mutex::new(self.tcp.try_clone()?),
        });
        let input = TlsReader {
            tcp: self.tcp.try_clone()?,
            shared: Arc::clone(&shared),
            pending: Vec::new(),
            chunk: vec![0; TLS_READ_CHUNK].into_boxed_slice(),
        };
        let output = TlsWriter {
            shared: Arc::clone(&shared),
        };
        Ok((
            Box::new(input),
            Box::new(output),
            SocketHandle::tls(self.tcp, shared),
        ))
    }
}

pub(crate) struct TlsShared {
    session: Mutex<ClientConnection>,
    /// Socket used for writing records; holding it orders records on the wire.
    send: Mutex<TcpStream>,
}

impl TlsShared {
    fn session(&self) -> io::Result<MutexGuard<'_, ClientConnection>> {
        self.session
            .lock()
            .map_err(|_| io::Error::other("tls session poisoned"))
    }

    /// Writes every pending record. The caller holds `send`.
    fn flush_records(&self, tcp: &mut TcpStream) -> io::Result<()> {
        let mut records = Vec::new();
        {
            let mut session = self.session()?;
            while session.wants_write() {
                session.write_tls(&mut records)?;
            }
        }
        tcp.write_all(&records)
    }

    /// Queues and sends `close_notify` unless a send is in progress.
    pub(crate) fn close_notify(&self) {
        let Ok(mut tcp) = self.send.try_lock() else {
            return;
        };
        match self.session() {
            Ok(mut session) => session.send_close_notify(),
            Err(_) => return,
        }
        if let Err(e) = self.flush_records(&mut tcp) {
            debug!("unable to send close_notify: {e}");
        }
    }
}

/// Decrypting input for the reader thread.
struct TlsReader {
    tcp: TcpStream,
    shared: Arc<TlsShared>,
    /// Ciphertext read from the socket that the session has not taken yet.
    pending: Vec<u8>,
    chunk: Box<[u8]>,
}

impl TlsReader {
    /// Returns already decrypted bytes, feeding pending ciphertext to the
    /// session until some plaintext appears or nothing is left to feed.
    fn read_plaintext(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let (read, wants_write) = {
            let mut session = self.shared.session()?;
            let read = loop {
                match session.reader().read(buf) {
                    Ok(n) => break Some(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }
                if self.pending.is_empty() {
                    break None;
                }
                let consumed = session.read_tls(&mut &self.pending[..])?;
                self.pending.drain(..consumed);
                session
                    .process_new_packets()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            };
            (read, session.wants_write())
        };

        // Key updates and alerts queued by the peer go out with the next
        // send if a writer is busy right now.
        if wants_write {
            if let Ok(mut tcp) = self.shared.send.try_lock() {
                self.shared.flush_records(&mut tcp)?;
            }
        }
        Ok(read)
    }
}

impl Read for TlsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some(n) = self.read_plaintext(buf)? {
                return Ok(n);
            }
            let n = self.tcp.read(&mut self.chunk)?;
            if n == 0 {
                return Ok(0);
            }
            self.pending.extend_from_slice(&self.chunk[..n]);
        }
    }
}

/// Encrypting output for callers' sends.
struct TlsWriter {
    shared: Arc<TlsShared>,
}

impl Write for TlsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut tcp = self
            .shared
            .send
            .lock()
            .map_err(|_| io::Error::other("tls socket poisoned"))?;
        let written = self.shared.session()?.writer().write(buf)?;
        self.shared.flush_records(&mut tcp)?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut tcp = self
            .shared
            .send
            .lock()
            .map_err(|_| io::Error::other("tls socket poisoned"))?;
        self.shared.flush_records(&mut tcp)?;
        tcp.flush()
    }
}

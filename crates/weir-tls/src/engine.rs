use std::{io, sync::Arc};

use tracing::debug;
use weir_buf::RingBuffer;

/// Outcome of one engine call.
#[derive(Debug, PartialEq, Eq)]
pub enum EngineIo {
    /// Progress was made; for read/write, the byte count.
    Done(usize),
    /// The engine needs more ciphertext in the in queue before it can
    /// continue.
    WantRead,
    /// Orderly close from the peer.
    ZeroReturn,
}

/// The record engine contract: a state machine that moves bytes
/// between caller plaintext and the ciphertext queue pair.
///
/// Implementations never touch a socket; the caller shuttles the out
/// queue to the wire and fills the in queue from it.
pub trait RecordEngine {
    /// Advances the handshake. `Done` here means the handshake made
    /// progress; completion is observed via [`is_established`].
    fn handshake(
        &mut self,
        wire_in: &mut RingBuffer,
        wire_out: &mut RingBuffer,
    ) -> Result<EngineIo, EngineError>;

    fn is_established(&self) -> bool;

    /// Decrypts buffered ciphertext into `dst`.
    fn read(
        &mut self,
        wire_in: &mut RingBuffer,
        dst: &mut [u8],
    ) -> Result<EngineIo, EngineError>;

    /// Encrypts as much of `src` as the engine accepts, appending
    /// records to the out queue. Returns the plaintext bytes consumed.
    fn write(
        &mut self,
        src: &[u8],
        wire_out: &mut RingBuffer,
    ) -> Result<EngineIo, EngineError>;

    /// Queues a close-notify record into the out queue.
    fn send_close(&mut self, wire_out: &mut RingBuffer);
}

#[derive(Debug, thiserror::Error)]
#[error("record engine failure: {0}")]
pub struct EngineError(pub String);

/// rustls-backed [`RecordEngine`]. The rustls connection already works
/// against in-memory queues (`read_tls`/`write_tls`), which maps
/// one-to-one onto the ring pair.
pub struct RustlsEngine {
    conn: rustls::Connection,
}

impl RustlsEngine {
    pub fn client(
        config: Arc<rustls::ClientConfig>,
        server_name: &str,
    ) -> Result<Self, EngineError> {
        let name = rustls::pki_types::ServerName::try_from(server_name.to_owned())
            .map_err(|e| EngineError(format!("bad server name {server_name:?}: {e}")))?;
        let conn = rustls::ClientConnection::new(config, name)
            .map_err(|e| EngineError(e.to_string()))?;
        Ok(Self { conn: rustls::Connection::Client(conn) })
    }

    pub fn server(config: Arc<rustls::ServerConfig>) -> Result<Self, EngineError> {
        let conn =
            rustls::ServerConnection::new(config).map_err(|e| EngineError(e.to_string()))?;
        Ok(Self { conn: rustls::Connection::Server(conn) })
    }

    /// Pulls ciphertext out of `wire_in` into the connection and lets
    /// it process the records.
    fn ingest(&mut self, wire_in: &mut RingBuffer) -> Result<(), EngineError> {
        while !wire_in.is_empty() {
            let n = {
                let mut view = wire_in.peek_head();
                self.conn.read_tls(&mut view).map_err(|e| EngineError(format!("read_tls: {e}")))?
            };
            wire_in.commit_head(n);
            if n == 0 {
                break;
            }
        }
        self.conn.process_new_packets().map_err(|e| EngineError(e.to_string()))?;
        Ok(())
    }

    /// Drains pending records into `wire_out`.
    fn expel(&mut self, wire_out: &mut RingBuffer) -> Result<(), EngineError> {
        while self.conn.wants_write() {
            let mut sink = RingSink(wire_out);
            self.conn
                .write_tls(&mut sink)
                .map_err(|e| EngineError(format!("write_tls: {e}")))?;
        }
        Ok(())
    }
}

impl RecordEngine for RustlsEngine {
    fn handshake(
        &mut self,
        wire_in: &mut RingBuffer,
        wire_out: &mut RingBuffer,
    ) -> Result<EngineIo, EngineError> {
        self.ingest(wire_in)?;
        self.expel(wire_out)?;
        if self.conn.is_handshaking() && wire_out.is_empty() {
            return Ok(EngineIo::WantRead);
        }
        Ok(EngineIo::Done(0))
    }

    fn is_established(&self) -> bool {
        !self.conn.is_handshaking()
    }

    fn read(
        &mut self,
        wire_in: &mut RingBuffer,
        dst: &mut [u8],
    ) -> Result<EngineIo, EngineError> {
        self.ingest(wire_in)?;
        match io::Read::read(&mut self.conn.reader(), dst) {
            Ok(0) => {
                debug!("peer sent close-notify");
                Ok(EngineIo::ZeroReturn)
            }
            Ok(n) => Ok(EngineIo::Done(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(EngineIo::WantRead),
            Err(e) => Err(EngineError(format!("plaintext read: {e}"))),
        }
    }

    fn write(
        &mut self,
        src: &[u8],
        wire_out: &mut RingBuffer,
    ) -> Result<EngineIo, EngineError> {
        let n = io::Write::write(&mut self.conn.writer(), src)
            .map_err(|e| EngineError(format!("plaintext write: {e}")))?;
        self.expel(wire_out)?;
        Ok(EngineIo::Done(n))
    }

    fn send_close(&mut self, wire_out: &mut RingBuffer) {
        self.conn.send_close_notify();
        let _ = self.expel(wire_out);
    }
}

/// io::Write adapter appending to a ring.
struct RingSink<'a>(&'a mut RingBuffer);

impl io::Write for RingSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

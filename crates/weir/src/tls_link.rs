use std::sync::Arc;

use tracing::{debug, warn};
use weir_buf::IoBuf;
use weir_tls::{RustlsEngine, TlsChannel, TlsError, TlsEvent};

use crate::{Error, HandleId, Reactor, ReactorEvent};

/// Ciphertext read size posted on the underlying TCP handle.
const WIRE_BUF: usize = 16 * 1024;

/// Encrypted byte-stream over a reactor TCP handle.
///
/// Owns the record channel and shuttles ciphertext between it and the
/// TCP handle; callers work in plaintext descriptors and collect
/// [`TlsEvent`] completions.
pub struct TlsLink {
    tcp: HandleId,
    chan: TlsChannel,
    started: bool,
}

impl TlsLink {
    /// Wraps an outbound connection; the handshake starts once the
    /// connect completes.
    pub fn client(
        reactor: &mut Reactor,
        addr: std::net::SocketAddr,
        config: Arc<rustls::ClientConfig>,
        server_name: &str,
    ) -> Result<Self, Error> {
        let engine =
            RustlsEngine::client(config, server_name).map_err(|_| Error::InvalidParam)?;
        let tcp = reactor.connect_tcp(addr)?;
        Ok(Self { tcp, chan: TlsChannel::new(Box::new(engine)), started: false })
    }

    /// Wraps a link just accepted by a listener.
    pub fn server(
        reactor: &mut Reactor,
        link: HandleId,
        config: Arc<rustls::ServerConfig>,
    ) -> Result<Self, Error> {
        let engine = RustlsEngine::server(config).map_err(|_| Error::InvalidParam)?;
        let mut this = Self { tcp: link, chan: TlsChannel::new(Box::new(engine)), started: false };
        this.start(reactor)?;
        Ok(this)
    }

    #[inline]
    pub fn tcp_handle(&self) -> HandleId {
        self.tcp
    }

    #[inline]
    pub fn is_established(&self) -> bool {
        self.chan.is_established()
    }

    fn start(&mut self, reactor: &mut Reactor) -> Result<(), Error> {
        self.started = true;
        self.chan.begin();
        self.flush_wire(reactor);
        reactor.post_read(self.tcp, IoBuf::with_capacity(WIRE_BUF))
    }

    /// Queues plaintext for the peer.
    pub fn post_write(&mut self, reactor: &mut Reactor, buf: IoBuf) -> Result<(), Error> {
        self.chan.post_write(buf).map_err(|_| Error::NoWriteable)?;
        self.flush_wire(reactor);
        Ok(())
    }

    /// Queues a buffer for decrypted bytes.
    pub fn post_read(&mut self, reactor: &mut Reactor, buf: IoBuf) -> Result<(), Error> {
        self.chan.post_read(buf).map_err(|_| Error::NoReadable)?;
        self.flush_wire(reactor);
        Ok(())
    }

    /// Starts an orderly shutdown; the close-notify record flushes
    /// before the TCP handle closes.
    pub fn close(&mut self, reactor: &mut Reactor) {
        self.chan.close();
        self.flush_wire(reactor);
        reactor.close(self.tcp);
    }

    /// Routes a reactor event; plaintext completions surface through
    /// `on_event`.
    pub fn handle_event<F>(
        &mut self,
        reactor: &mut Reactor,
        event: ReactorEvent,
        on_event: &mut F,
    ) -> Option<ReactorEvent>
    where
        F: FnMut(TlsEvent),
    {
        match event {
            ReactorEvent::Connected { id, result } if id == self.tcp => {
                match result {
                    Ok(()) => {
                        if !self.started {
                            if let Err(e) = self.start(reactor) {
                                warn!(error = %e, "tls start failed");
                                self.close(reactor);
                            }
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "tls connect failed");
                        on_event(TlsEvent::Shutdown(Err(TlsError::Closed)));
                    }
                }
                self.drain_events(reactor, on_event);
                None
            }
            ReactorEvent::ReadDone { id, mut buf, result } if id == self.tcp => {
                match result {
                    Ok(n) if n > 0 => {
                        self.chan.wire_input(buf.bytes());
                        buf.recycle();
                        let _ = reactor.post_read(self.tcp, buf);
                    }
                    Ok(_) => {
                        debug!("tls transport eof");
                        self.chan.close();
                        reactor.close(self.tcp);
                    }
                    Err(Error::Closing) => {}
                    Err(e) => {
                        warn!(error = %e, "tls transport read failed");
                        self.chan.close();
                        reactor.close(self.tcp);
                    }
                }
                self.flush_wire(reactor);
                self.drain_events(reactor, on_event);
                None
            }
            ReactorEvent::WriteDone { id, result, .. } if id == self.tcp => {
                if let Err(e) = result {
                    if !matches!(e, Error::Closing) {
                        warn!(error = %e, "tls transport write failed");
                        self.chan.close();
                        reactor.close(self.tcp);
                    }
                }
                self.flush_wire(reactor);
                self.drain_events(reactor, on_event);
                None
            }
            ReactorEvent::Closed { id } if id == self.tcp => {
                self.drain_events(reactor, on_event);
                on_event(TlsEvent::Shutdown(Ok(())));
                None
            }
            other => Some(other),
        }
    }

    /// Moves pending ciphertext from the channel onto the TCP handle.
    fn flush_wire(&mut self, reactor: &mut Reactor) {
        loop {
            let pending = self.chan.wire_pending();
            if pending.is_empty() {
                return;
            }
            let buf = IoBuf::from_bytes(pending);
            let n = pending.len();
            self.chan.wire_consumed(n);
            if reactor.post_write(self.tcp, buf).is_err() {
                return;
            }
        }
    }

    fn drain_events<F>(&mut self, reactor: &mut Reactor, on_event: &mut F)
    where
        F: FnMut(TlsEvent),
    {
        // Encrypting plaintext may have produced more wire bytes.
        self.flush_wire(reactor);
        while let Some(ev) = self.chan.poll_event() {
            on_event(ev);
        }
    }
}

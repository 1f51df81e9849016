use std::net::SocketAddr;

use tracing::{debug, info, warn};
use weir_buf::IoBuf;

use crate::{Error, HandleId, Reactor, ReactorEvent, TimerSpec};

/// Size of the forwarding buffers.
const SPLICE_BUF: usize = 16 * 1024;

/// Proxy settings: where to listen, where to forward, and the idle
/// cutoff applied to both legs.
#[derive(Clone, Debug)]
pub struct ProxyCfg {
    pub listen: SocketAddr,
    pub backend: SocketAddr,
    /// Idle milliseconds before both legs are torn down; 0 disables.
    pub timeout_ms: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Front,
    Back,
}

struct Splice {
    front: HandleId,
    back: HandleId,
    last_activity: u64,
}

impl Splice {
    fn side_of(&self, id: HandleId) -> Option<Side> {
        if id == self.front {
            Some(Side::Front)
        } else if id == self.back {
            Some(Side::Back)
        } else {
            None
        }
    }

    fn opposite(&self, side: Side) -> HandleId {
        match side {
            Side::Front => self.back,
            Side::Back => self.front,
        }
    }
}

/// Two-way splice between accepted frontend links and fresh backend
/// connections.
///
/// Bytes move without copying: the buffer a read completed into is
/// posted verbatim as the write on the opposite side; a fresh read is
/// posted on the source in its place.
pub struct TcpProxy {
    cfg: ProxyCfg,
    listener: HandleId,
    splices: Vec<Splice>,
}

impl TcpProxy {
    /// Opens the listening socket and starts accepting.
    pub fn open(reactor: &mut Reactor, cfg: ProxyCfg) -> Result<Self, Error> {
        let listener = reactor.listen_tcp(cfg.listen)?;
        info!(listen = %cfg.listen, backend = %cfg.backend, "proxy up");
        Ok(Self { cfg, listener, splices: Vec::new() })
    }

    #[inline]
    pub fn listener(&self) -> HandleId {
        self.listener
    }

    #[inline]
    pub fn active_splices(&self) -> usize {
        self.splices.len()
    }

    /// Routes a reactor event through the proxy. Events that do not
    /// belong to it come back to the caller.
    pub fn handle_event(
        &mut self,
        reactor: &mut Reactor,
        event: ReactorEvent,
    ) -> Option<ReactorEvent> {
        match event {
            ReactorEvent::Accepted { listener, link, peer } if listener == self.listener => {
                self.on_accept(reactor, link, peer);
                None
            }
            ReactorEvent::Accepted { listener, link, peer } => {
                Some(ReactorEvent::Accepted { listener, link, peer })
            }
            ReactorEvent::Connected { id, result } => {
                let Some(at) = self.splices.iter().position(|s| s.back == id) else {
                    return Some(ReactorEvent::Connected { id, result });
                };
                match result {
                    Ok(()) => self.on_backend_up(reactor, at),
                    Err(e) => {
                        warn!(error = %e, "backend connect failed");
                        self.teardown_at(reactor, at);
                    }
                }
                None
            }
            ReactorEvent::ReadDone { id, buf, result } => {
                let Some(at) = self.splices.iter().position(|s| s.side_of(id).is_some()) else {
                    return Some(ReactorEvent::ReadDone { id, buf, result });
                };
                self.on_read(reactor, at, id, buf, result);
                None
            }
            ReactorEvent::WriteDone { id, buf, result } => {
                let Some(at) = self.splices.iter().position(|s| s.side_of(id).is_some()) else {
                    return Some(ReactorEvent::WriteDone { id, buf, result });
                };
                self.on_write(reactor, at, result);
                None
            }
            ReactorEvent::TimerFired { id, remaining } => {
                let Some(at) = self.splices.iter().position(|s| s.side_of(id).is_some()) else {
                    return Some(ReactorEvent::TimerFired { id, remaining });
                };
                let idle = reactor.now().saturating_sub(self.splices[at].last_activity);
                if self.cfg.timeout_ms > 0 && idle > self.cfg.timeout_ms {
                    debug!(idle, "splice idle timeout");
                    self.teardown_at(reactor, at);
                }
                None
            }
            ReactorEvent::Closed { id } => {
                if let Some(at) = self.splices.iter().position(|s| s.side_of(id).is_some()) {
                    self.teardown_at(reactor, at);
                    return None;
                }
                if id == self.listener {
                    return None;
                }
                Some(ReactorEvent::Closed { id })
            }
        }
    }

    fn on_accept(&mut self, reactor: &mut Reactor, front: HandleId, peer: SocketAddr) {
        match reactor.connect_tcp(self.cfg.backend) {
            Ok(back) => {
                debug!(%peer, "splice opened");
                if self.cfg.timeout_ms > 0 {
                    let spec = TimerSpec {
                        first_delay: self.cfg.timeout_ms,
                        period: self.cfg.timeout_ms,
                        repeat: 0,
                    };
                    let _ = reactor.set_timer(front, spec);
                }
                self.splices.push(Splice { front, back, last_activity: reactor.now() });
            }
            Err(e) => {
                warn!(error = %e, "cannot reach backend");
                reactor.close(front);
            }
        }
    }

    /// Backend is up: start reading on both legs.
    fn on_backend_up(&mut self, reactor: &mut Reactor, at: usize) {
        let splice = &mut self.splices[at];
        splice.last_activity = reactor.now();
        let front = splice.front;
        let back = splice.back;
        if reactor.post_read(back, IoBuf::with_capacity(SPLICE_BUF)).is_err()
            || reactor.post_read(front, IoBuf::with_capacity(SPLICE_BUF)).is_err()
        {
            self.teardown_at(reactor, at);
        }
    }

    fn on_read(
        &mut self,
        reactor: &mut Reactor,
        at: usize,
        id: HandleId,
        buf: IoBuf,
        result: Result<usize, Error>,
    ) {
        let splice = &mut self.splices[at];
        match result {
            Ok(n) if n > 0 => {
                splice.last_activity = reactor.now();
                let side = splice.side_of(id).expect("matched above");
                let target = splice.opposite(side);
                // The read descriptor becomes the opposite side's
                // write descriptor; the source gets a fresh buffer.
                if reactor.post_write(target, buf).is_err()
                    || reactor.post_read(id, IoBuf::with_capacity(SPLICE_BUF)).is_err()
                {
                    self.teardown_at(reactor, at);
                }
            }
            Ok(_) => {
                debug!("peer finished, closing splice");
                self.teardown_at(reactor, at);
            }
            Err(Error::Closing) => {}
            Err(e) => {
                debug!(error = %e, "splice read failed");
                self.teardown_at(reactor, at);
            }
        }
    }

    fn on_write(&mut self, reactor: &mut Reactor, at: usize, result: Result<(), Error>) {
        match result {
            Ok(()) => {
                self.splices[at].last_activity = reactor.now();
            }
            Err(Error::Closing) => {}
            Err(e) => {
                debug!(error = %e, "splice write failed");
                self.teardown_at(reactor, at);
            }
        }
    }

    /// Closing one leg launches the close of the other.
    fn teardown_at(&mut self, reactor: &mut Reactor, at: usize) {
        let splice = self.splices.swap_remove(at);
        reactor.close(splice.front);
        reactor.close(splice.back);
    }
}

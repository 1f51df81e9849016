use std::net::SocketAddr;

use tracing::{debug, info, warn};
use weir_buf::IoBuf;
use weir_rudp::{Rudp, RudpError, peek_conv};
use weir_timing::Millis;

use crate::{Error, HandleId, Reactor, ReactorEvent, TimerSpec};

/// Datagram receive buffer; comfortably above the default MTU.
const DGRAM_BUF: usize = 2 * 1024;

/// Flush tick driving every session's retransmission schedule.
const TICK_MS: u64 = 10;

/// A peer goes away after this much silence.
const IDLE_CUTOFF_MS: u64 = 15_000;

struct Session {
    conv: u32,
    peer: SocketAddr,
    engine: Rudp,
    last_activity: u64,
}

/// Reliable-UDP endpoint: one UDP handle carrying any number of
/// conversations, each with its own protocol engine, flushed from a
/// shared reactor timer.
pub struct RudpNode {
    udp: HandleId,
    sessions: Vec<Session>,
    /// Accept sessions for unknown conversation ids (server role).
    accept_new: bool,
    recv_scratch: Vec<u8>,
}

impl RudpNode {
    /// Binds the UDP socket, arms the flush timer, and posts the
    /// first read.
    pub fn open(
        reactor: &mut Reactor,
        bind: SocketAddr,
        accept_new: bool,
    ) -> Result<Self, Error> {
        let udp = reactor.open_udp(bind, None)?;
        reactor.set_timer(udp, TimerSpec { first_delay: TICK_MS, period: TICK_MS, repeat: 0 })?;
        reactor.post_read(udp, IoBuf::with_capacity(DGRAM_BUF))?;
        info!(addr = %reactor.local_addr(udp)?, "reliable-udp endpoint up");
        Ok(Self { udp, sessions: Vec::new(), accept_new, recv_scratch: vec![0u8; 64 * 1024] })
    }

    #[inline]
    pub fn handle(&self) -> HandleId {
        self.udp
    }

    #[inline]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Registers a conversation toward `peer` (the connecting role).
    pub fn add_session(&mut self, now: u64, conv: u32, peer: SocketAddr) {
        let mut engine = Rudp::new(conv);
        engine.set_nodelay(1, TICK_MS as u32, 2, true);
        self.sessions.push(Session { conv, peer, engine, last_activity: now });
    }

    /// Queues application bytes on a conversation.
    pub fn send(&mut self, conv: u32, bytes: &[u8]) -> Result<(), Error> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.conv == conv)
            .ok_or(Error::NoOpen)?;
        match session.engine.send(bytes) {
            Ok(()) => Ok(()),
            Err(RudpError::Retry) => Err(Error::Retry),
            Err(_) => Err(Error::InvalidParam),
        }
    }

    /// Routes a reactor event. Received application messages are
    /// handed to `on_msg(conv, peer, bytes)`.
    pub fn handle_event<F>(
        &mut self,
        reactor: &mut Reactor,
        event: ReactorEvent,
        on_msg: &mut F,
    ) -> Option<ReactorEvent>
    where
        F: FnMut(u32, SocketAddr, &[u8]),
    {
        match event {
            ReactorEvent::ReadDone { id, mut buf, result } if id == self.udp => {
                match result {
                    Ok(n) if n > 0 => {
                        let peer = buf.peer;
                        self.ingest(reactor, buf.bytes(), peer, on_msg);
                    }
                    Ok(_) => {}
                    Err(Error::Closing) => return None,
                    Err(e) => warn!(error = %e, "udp read failed"),
                }
                buf.recycle();
                let _ = reactor.post_read(self.udp, buf);
                None
            }
            ReactorEvent::WriteDone { id, result, .. } if id == self.udp => {
                if let Err(e) = result {
                    debug!(error = %e, "udp write failed");
                }
                None
            }
            ReactorEvent::TimerFired { id, .. } if id == self.udp => {
                self.tick(reactor);
                None
            }
            other => Some(other),
        }
    }

    fn ingest<F>(
        &mut self,
        reactor: &mut Reactor,
        datagram: &[u8],
        peer: Option<SocketAddr>,
        on_msg: &mut F,
    ) where
        F: FnMut(u32, SocketAddr, &[u8]),
    {
        let Some(conv) = peek_conv(datagram) else {
            debug!("runt datagram dropped");
            return;
        };
        let Some(peer) = peer else {
            return;
        };
        let now = reactor.now();
        let at = match self.sessions.iter().position(|s| s.conv == conv) {
            Some(at) => at,
            None if self.accept_new => {
                debug!(conv, %peer, "new conversation");
                self.add_session(now, conv, peer);
                self.sessions.len() - 1
            }
            None => {
                debug!(conv, "datagram for unknown conversation");
                return;
            }
        };

        let session = &mut self.sessions[at];
        session.last_activity = now;
        // Follow the sender if it roams ports.
        session.peer = peer;
        if let Err(e) = session.engine.input(datagram) {
            debug!(conv, error = %e, "datagram rejected");
            return;
        }

        loop {
            match session.engine.recv(&mut self.recv_scratch) {
                Ok(n) => on_msg(conv, peer, &self.recv_scratch[..n]),
                Err(RudpError::BufferTooSmall(need)) => {
                    self.recv_scratch.resize(need, 0);
                }
                Err(_) => break,
            }
        }
    }

    /// Periodic flush: run every engine's schedule, emit datagrams,
    /// and cull dead or idle sessions.
    fn tick(&mut self, reactor: &mut Reactor) {
        let now = reactor.now();
        let wire_now = Millis::from(now);
        let udp = self.udp;
        let mut out: Vec<(SocketAddr, Vec<u8>)> = Vec::new();

        self.sessions.retain_mut(|session| {
            let idle = now.saturating_sub(session.last_activity);
            if idle > IDLE_CUTOFF_MS {
                info!(conv = session.conv, idle, "conversation idle, dropping");
                return false;
            }
            let peer = session.peer;
            session.engine.update(wire_now, &mut |d: &[u8]| {
                out.push((peer, d.to_vec()));
            });
            if session.engine.is_dead() {
                warn!(conv = session.conv, "conversation dead, dropping");
                return false;
            }
            true
        });

        for (peer, datagram) in out {
            let mut buf = IoBuf::from_bytes(&datagram);
            buf.peer = Some(peer);
            let _ = reactor.post_write(udp, buf);
        }
    }
}

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::SocketAddr,
    os::fd::AsRawFd,
    time::Duration,
};

use mio::{
    Events, Interest, Poll, Token,
    net::{TcpListener, TcpStream, UdpSocket},
};
use tracing::{debug, error, trace, warn};
use weir_buf::{IoBuf, Pool, PoolId};
use weir_timing::{Clock, TimerHeap, TimerId};
use weir_utils::soft_panic;

use crate::Error;

/// Stable identifier of a reactor handle. Generation-checked: ids of
/// closed handles go stale instead of aliasing their successors.
pub type HandleId = PoolId;

/// Periodic timer attached to a handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimerSpec {
    /// Delay before the first fire, milliseconds.
    pub first_delay: u64,
    /// Interval between fires; 0 means one-shot.
    pub period: u64,
    /// How many times to fire; 0 means forever.
    pub repeat: u32,
}

/// Completion delivered by [`Reactor::poll_with`].
#[derive(Debug)]
pub enum ReactorEvent {
    /// A listener produced a new inbound link.
    Accepted { listener: HandleId, link: HandleId, peer: SocketAddr },
    /// An outbound connect finished.
    Connected { id: HandleId, result: Result<(), Error> },
    /// A posted read completed. Zero filled bytes is end-of-stream.
    ReadDone { id: HandleId, buf: IoBuf, result: Result<usize, Error> },
    /// A posted write fully reached the socket (or failed).
    WriteDone { id: HandleId, buf: IoBuf, result: Result<(), Error> },
    /// A handle timer fired. `remaining` counts down to the last fire.
    TimerFired { id: HandleId, remaining: u32 },
    /// Always the final event for a handle id.
    Closed { id: HandleId },
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    struct HandleFlags: u8 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const CLOSING  = 1 << 2;
        const CONNECTING = 1 << 3;
    }
}

enum Socket {
    Listener(TcpListener),
    Stream(TcpStream),
    Udp(UdpSocket),
}

struct HandleEntry {
    socket: Socket,
    flags: HandleFlags,
    /// Posted read buffers, completed front-first.
    rx: VecDeque<IoBuf>,
    /// Posted writes; the front one may be partially flushed.
    tx: VecDeque<IoBuf>,
    /// Datagram destination for UDP handles without per-buffer peers.
    peer: Option<SocketAddr>,
    writable_armed: bool,
    timer: Option<TimerState>,
}

struct TimerState {
    id: TimerId,
    period: u64,
    remaining: u32,
    forever: bool,
}

impl HandleEntry {
    fn interests(&self) -> Interest {
        if self.writable_armed || self.flags.contains(HandleFlags::CONNECTING) {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }
}

/// The readiness token carries the handle id whole (slot and
/// generation), so dispatch is a direct, stale-checked lookup.
#[inline]
fn token_of(id: HandleId) -> Token {
    Token(id.to_token() as usize)
}

/// Sets kernel SO_SNDBUF and SO_RCVBUF on a socket.
fn set_kernel_buf_size(socket: &impl AsRawFd, size: usize) {
    let fd = socket.as_raw_fd();
    let size = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &size as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

/// Poll-based event loop: socket readiness, per-handle posted I/O
/// queues, and a deadline heap for handle timers.
///
/// Single-threaded by construction; every completion for a handle is
/// delivered from `poll_with` on the owning thread, writes complete
/// in posting order, reads complete in posting order.
pub struct Reactor {
    poll: Poll,
    events: Events,
    clock: Clock,
    timers: TimerHeap,
    handles: Pool<HandleEntry>,
    /// Completions waiting for the next `poll_with` drain.
    ready: VecDeque<ReactorEvent>,
    /// Kernel SO_SNDBUF/SO_RCVBUF applied to every stream and
    /// datagram socket this reactor opens or accepts.
    socket_buf_size: Option<usize>,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            clock: Clock::new(),
            timers: TimerHeap::new(),
            handles: Pool::with_capacity(16),
            ready: VecDeque::new(),
            socket_buf_size: None,
        })
    }

    pub fn set_socket_buf_size(&mut self, size: usize) {
        self.socket_buf_size = Some(size);
    }

    /// Loop-relative monotonic milliseconds.
    #[inline]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    #[inline]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Starts listening for TCP connections.
    pub fn listen_tcp(&mut self, addr: SocketAddr) -> Result<HandleId, Error> {
        let listener = TcpListener::bind(addr)?;
        let id = self.handles.alloc(HandleEntry {
            socket: Socket::Listener(listener),
            flags: HandleFlags::READABLE,
            rx: VecDeque::new(),
            tx: VecDeque::new(),
            peer: None,
            writable_armed: false,
            timer: None,
        });
        // Entry moved in; re-borrow to register with its final token.
        let entry = self.handles.get_mut(id).expect("just allocated");
        let Socket::Listener(l) = &mut entry.socket else { unreachable!() };
        self.poll.registry().register(l, token_of(id), Interest::READABLE)?;
        debug!(?addr, "listening");
        Ok(id)
    }

    /// Starts a non-blocking connect; completion arrives as
    /// [`ReactorEvent::Connected`].
    pub fn connect_tcp(&mut self, addr: SocketAddr) -> Result<HandleId, Error> {
        let stream = TcpStream::connect(addr)?;
        if let Some(size) = self.socket_buf_size {
            set_kernel_buf_size(&stream, size);
        }
        let id = self.handles.alloc(HandleEntry {
            socket: Socket::Stream(stream),
            flags: HandleFlags::READABLE | HandleFlags::WRITABLE | HandleFlags::CONNECTING,
            rx: VecDeque::new(),
            tx: VecDeque::new(),
            peer: Some(addr),
            writable_armed: false,
            timer: None,
        });
        let entry = self.handles.get_mut(id).expect("just allocated");
        let Socket::Stream(s) = &mut entry.socket else { unreachable!() };
        self.poll
            .registry()
            .register(s, token_of(id), Interest::READABLE | Interest::WRITABLE)?;
        debug!(?addr, "connecting");
        Ok(id)
    }

    /// Opens a UDP handle, optionally fixed to one peer.
    pub fn open_udp(
        &mut self,
        bind: SocketAddr,
        peer: Option<SocketAddr>,
    ) -> Result<HandleId, Error> {
        let socket = UdpSocket::bind(bind)?;
        if let Some(size) = self.socket_buf_size {
            set_kernel_buf_size(&socket, size);
        }
        if let Some(p) = peer {
            socket.connect(p)?;
        }
        let id = self.handles.alloc(HandleEntry {
            socket: Socket::Udp(socket),
            flags: HandleFlags::READABLE | HandleFlags::WRITABLE,
            rx: VecDeque::new(),
            tx: VecDeque::new(),
            peer,
            writable_armed: false,
            timer: None,
        });
        let entry = self.handles.get_mut(id).expect("just allocated");
        let Socket::Udp(s) = &mut entry.socket else { unreachable!() };
        self.poll.registry().register(s, token_of(id), Interest::READABLE)?;
        Ok(id)
    }

    /// Local address of a handle's socket.
    pub fn local_addr(&self, id: HandleId) -> Result<SocketAddr, Error> {
        let entry = self.handles.get(id).ok_or(Error::NoOpen)?;
        let addr = match &entry.socket {
            Socket::Listener(l) => l.local_addr()?,
            Socket::Stream(s) => s.local_addr()?,
            Socket::Udp(u) => u.local_addr()?,
        };
        Ok(addr)
    }

    pub fn peer_addr(&self, id: HandleId) -> Result<SocketAddr, Error> {
        let entry = self.handles.get(id).ok_or(Error::NoOpen)?;
        match (&entry.socket, entry.peer) {
            (Socket::Stream(s), _) => Ok(s.peer_addr()?),
            (_, Some(p)) => Ok(p),
            _ => Err(Error::InvalidParam),
        }
    }

    /// Posts a buffer to be filled by the next inbound data.
    pub fn post_read(&mut self, id: HandleId, buf: IoBuf) -> Result<(), Error> {
        let entry = self.handles.get_mut(id).ok_or(Error::NoOpen)?;
        if entry.flags.contains(HandleFlags::CLOSING) {
            return Err(Error::NoReadable);
        }
        if matches!(entry.socket, Socket::Listener(_)) {
            return Err(Error::NoReadable);
        }
        entry.rx.push_back(buf);
        // Data may already be waiting; service on the next poll pass.
        self.service_read(id);
        Ok(())
    }

    /// Posts bytes for transmission. Completion preserves posting
    /// order.
    pub fn post_write(&mut self, id: HandleId, buf: IoBuf) -> Result<(), Error> {
        let entry = self.handles.get_mut(id).ok_or(Error::NoOpen)?;
        if entry.flags.contains(HandleFlags::CLOSING) {
            return Err(Error::NoWriteable);
        }
        if matches!(entry.socket, Socket::Listener(_)) {
            return Err(Error::NoWriteable);
        }
        entry.tx.push_back(buf);
        if !entry.flags.contains(HandleFlags::CONNECTING) {
            self.service_write(id);
        }
        Ok(())
    }

    /// Attaches (or replaces) the handle's periodic timer.
    pub fn set_timer(&mut self, id: HandleId, spec: TimerSpec) -> Result<(), Error> {
        let now = self.clock.now();
        let entry = self.handles.get_mut(id).ok_or(Error::NoOpen)?;
        if let Some(old) = entry.timer.take() {
            self.timers.remove(old.id);
        }
        let deadline = now + spec.first_delay;
        let timer_id = self.timers.insert(deadline, id.to_token());
        let entry = self.handles.get_mut(id).expect("checked above");
        entry.timer = Some(TimerState {
            id: timer_id,
            period: spec.period,
            remaining: spec.repeat,
            forever: spec.repeat == 0,
        });
        Ok(())
    }

    pub fn cancel_timer(&mut self, id: HandleId) {
        if let Some(entry) = self.handles.get_mut(id) {
            if let Some(t) = entry.timer.take() {
                self.timers.remove(t.id);
            }
        }
    }

    /// Closes a handle: pending reads and writes drain with
    /// [`Error::Closing`], the timer dies, and a final
    /// [`ReactorEvent::Closed`] is queued. The id is invalid
    /// afterwards.
    pub fn close(&mut self, id: HandleId) {
        let Some(mut entry) = self.handles.free(id) else {
            return;
        };
        if let Some(t) = entry.timer.take() {
            self.timers.remove(t.id);
        }
        let registry = self.poll.registry();
        let res = match &mut entry.socket {
            Socket::Listener(l) => registry.deregister(l),
            Socket::Stream(s) => registry.deregister(s),
            Socket::Udp(u) => registry.deregister(u),
        };
        if let Err(e) = res {
            debug!(error = %e, "deregister on close");
        }
        while let Some(buf) = entry.rx.pop_front() {
            self.ready
                .push_back(ReactorEvent::ReadDone { id, buf, result: Err(Error::Closing) });
        }
        while let Some(buf) = entry.tx.pop_front() {
            self.ready
                .push_back(ReactorEvent::WriteDone { id, buf, result: Err(Error::Closing) });
        }
        self.ready.push_back(ReactorEvent::Closed { id });
        trace!(?id, "handle closed");
    }

    /// Runs one poll pass: expire timers, poll readiness, service
    /// queues, and hand every completion to `handler`. Returns whether
    /// anything was delivered.
    pub fn poll_with<F>(&mut self, timeout: Option<Duration>, handler: &mut F) -> io::Result<bool>
    where
        F: FnMut(&mut Reactor, ReactorEvent),
    {
        // Bound the sleep by the nearest timer deadline.
        let timeout = match (self.timers.next_deadline(), timeout) {
            (Some(deadline), user) => {
                let until = Duration::from_millis(deadline.saturating_sub(self.clock.now()));
                Some(user.map_or(until, |u| u.min(until)))
            }
            (None, user) => user,
        };

        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() != io::ErrorKind::Interrupted {
                return Err(e);
            }
        }

        let tokens: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|e| (e.token(), e.is_readable(), e.is_writable()))
            .collect();
        for (token, readable, writable) in tokens {
            self.service_token(token, readable, writable);
        }
        self.expire_timers();

        let mut delivered = false;
        while let Some(event) = self.ready.pop_front() {
            delivered = true;
            handler(self, event);
        }
        Ok(delivered)
    }

    fn service_token(&mut self, token: Token, readable: bool, writable: bool) {
        let id = HandleId::from_token(token.0 as u64);
        if self.handles.get(id).is_none() {
            // Stale readiness for a handle closed this pass.
            return;
        }
        let is_listener =
            matches!(self.handles.get(id).map(|e| &e.socket), Some(Socket::Listener(_)));
        if is_listener {
            if readable {
                self.service_accept(id);
            }
            return;
        }

        if writable {
            let connecting = self
                .handles
                .get(id)
                .is_some_and(|e| e.flags.contains(HandleFlags::CONNECTING));
            if connecting {
                self.finish_connect(id);
            }
            self.service_write(id);
        }
        if readable {
            self.service_read(id);
        }
    }

    fn service_accept(&mut self, id: HandleId) {
        loop {
            let Some(entry) = self.handles.get_mut(id) else {
                return;
            };
            let Socket::Listener(listener) = &mut entry.socket else {
                return;
            };
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Some(size) = self.socket_buf_size {
                        set_kernel_buf_size(&stream, size);
                    }
                    let link = self.handles.alloc(HandleEntry {
                        socket: Socket::Stream(stream),
                        flags: HandleFlags::READABLE | HandleFlags::WRITABLE,
                        rx: VecDeque::new(),
                        tx: VecDeque::new(),
                        peer: Some(peer),
                        writable_armed: false,
                        timer: None,
                    });
                    let entry = self.handles.get_mut(link).expect("just allocated");
                    let Socket::Stream(s) = &mut entry.socket else { unreachable!() };
                    if let Err(e) =
                        self.poll.registry().register(s, token_of(link), Interest::READABLE)
                    {
                        error!(error = %e, "register accepted link");
                        self.handles.free(link);
                        continue;
                    }
                    trace!(?peer, "accepted");
                    self.ready
                        .push_back(ReactorEvent::Accepted { listener: id, link, peer });
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn finish_connect(&mut self, id: HandleId) {
        let Some(entry) = self.handles.get_mut(id) else {
            return;
        };
        entry.flags -= HandleFlags::CONNECTING;
        let Socket::Stream(stream) = &mut entry.socket else {
            return;
        };
        // A connect error surfaces through take_error / peer_addr once
        // the socket signals writable.
        let failure = match stream.take_error() {
            Ok(Some(e)) => Some(e),
            Ok(None) => stream.peer_addr().err(),
            Err(e) => Some(e),
        };
        match failure {
            None => {
                self.rearm(id);
                self.ready.push_back(ReactorEvent::Connected { id, result: Ok(()) });
            }
            Some(e) => {
                debug!(error = %e, "connect failed");
                self.ready
                    .push_back(ReactorEvent::Connected { id, result: Err(Error::Io(e)) });
                self.close(id);
            }
        }
    }

    /// Fills posted read buffers while the socket has data.
    fn service_read(&mut self, id: HandleId) {
        loop {
            let Some(entry) = self.handles.get_mut(id) else {
                return;
            };
            if entry.flags.contains(HandleFlags::CONNECTING) || entry.rx.is_empty() {
                return;
            }
            let mut buf = entry.rx.pop_front().expect("checked non-empty");
            let outcome = match &mut entry.socket {
                Socket::Stream(stream) => match stream.read(buf.space()) {
                    Ok(n) => Some((n, None)),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => None,
                    Err(e) => {
                        self.ready.push_back(ReactorEvent::ReadDone {
                            id,
                            buf,
                            result: Err(Error::Io(e)),
                        });
                        return;
                    }
                },
                Socket::Udp(socket) => match socket.recv_from(buf.space()) {
                    Ok((n, from)) => Some((n, Some(from))),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => None,
                    Err(e) => {
                        self.ready.push_back(ReactorEvent::ReadDone {
                            id,
                            buf,
                            result: Err(Error::Io(e)),
                        });
                        return;
                    }
                },
                Socket::Listener(_) => return,
            };
            match outcome {
                Some((n, from)) => {
                    buf.set_filled(n);
                    buf.peer = from;
                    self.ready.push_back(ReactorEvent::ReadDone { id, buf, result: Ok(n) });
                    if n == 0 {
                        if let Some(e) = self.handles.get_mut(id) {
                            if matches!(e.socket, Socket::Stream(_)) {
                                // Stream EOF: no further reads will
                                // succeed.
                                return;
                            }
                        }
                    }
                }
                None => {
                    // Not ready: put the buffer back at the front.
                    if let Some(entry) = self.handles.get_mut(id) {
                        entry.rx.push_front(buf);
                    }
                    return;
                }
            }
        }
    }

    /// Flushes the write queue until the kernel pushes back.
    fn service_write(&mut self, id: HandleId) {
        loop {
            let Some(entry) = self.handles.get_mut(id) else {
                return;
            };
            let Some(front) = entry.tx.front_mut() else {
                self.disarm_writable(id);
                return;
            };
            match &mut entry.socket {
                Socket::Stream(stream) => {
                    while !front.is_drained() {
                        match stream.write(front.bytes()) {
                            Ok(0) => {
                                let buf = entry.tx.pop_front().unwrap();
                                self.ready.push_back(ReactorEvent::WriteDone {
                                    id,
                                    buf,
                                    result: Err(Error::Io(io::ErrorKind::WriteZero.into())),
                                });
                                return;
                            }
                            Ok(n) => front.consume(n),
                            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                                self.arm_writable(id);
                                return;
                            }
                            Err(e) => {
                                let buf = entry.tx.pop_front().unwrap();
                                self.ready.push_back(ReactorEvent::WriteDone {
                                    id,
                                    buf,
                                    result: Err(Error::Io(e)),
                                });
                                return;
                            }
                        }
                    }
                }
                Socket::Udp(socket) => {
                    let target = front.peer.or(entry.peer);
                    let result = match target {
                        Some(addr) if entry.peer.is_none() => socket.send_to(front.bytes(), addr),
                        _ => socket.send(front.bytes()),
                    };
                    match result {
                        Ok(_) => front.consume(front.bytes().len()),
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            self.arm_writable(id);
                            return;
                        }
                        Err(e) => {
                            let buf = entry.tx.pop_front().unwrap();
                            self.ready.push_back(ReactorEvent::WriteDone {
                                id,
                                buf,
                                result: Err(Error::Io(e)),
                            });
                            return;
                        }
                    }
                }
                Socket::Listener(_) => return,
            }
            let buf = entry.tx.pop_front().unwrap();
            self.ready.push_back(ReactorEvent::WriteDone { id, buf, result: Ok(()) });
        }
    }

    fn arm_writable(&mut self, id: HandleId) {
        let Some(entry) = self.handles.get_mut(id) else {
            return;
        };
        if !entry.writable_armed {
            entry.writable_armed = true;
            self.rearm(id);
        }
    }

    fn disarm_writable(&mut self, id: HandleId) {
        let Some(entry) = self.handles.get_mut(id) else {
            return;
        };
        if entry.writable_armed {
            entry.writable_armed = false;
            self.rearm(id);
        }
    }

    fn rearm(&mut self, id: HandleId) {
        let Some(entry) = self.handles.get_mut(id) else {
            return;
        };
        let interests = entry.interests();
        let token = token_of(id);
        let res = match &mut entry.socket {
            Socket::Stream(s) => self.poll.registry().reregister(s, token, interests),
            Socket::Udp(u) => self.poll.registry().reregister(u, token, interests),
            Socket::Listener(l) => self.poll.registry().reregister(l, token, interests),
        };
        if let Err(e) = res {
            soft_panic!("reregister failed: {e}");
        }
    }

    fn expire_timers(&mut self) {
        let now = self.clock.now();
        while let Some((_, token)) = self.timers.pop_due(now) {
            let id = HandleId::from_token(token);
            let Some(entry) = self.handles.get_mut(id) else {
                continue;
            };
            let Some(timer) = entry.timer.as_mut() else {
                continue;
            };
            let remaining = if timer.forever {
                0
            } else {
                timer.remaining = timer.remaining.saturating_sub(1);
                timer.remaining
            };
            let rearm = timer.period > 0 && (timer.forever || remaining > 0);
            if rearm {
                let period = timer.period;
                let timer_id = self.timers.insert(now + period, token);
                entry.timer.as_mut().expect("still present").id = timer_id;
            } else {
                entry.timer = None;
            }
            self.ready.push_back(ReactorEvent::TimerFired { id, remaining });
        }
    }
}

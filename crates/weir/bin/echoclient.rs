use std::{
    net::SocketAddr,
    path::PathBuf,
    process::ExitCode,
    time::Duration,
};

use clap::Parser;
use tracing::{error, info, warn};
use weir::{
    Error, HandleId, Reactor, ReactorEvent,
    addr::{parse_endpoint, wildcard_for},
    config::Config,
    rudp_link::RudpNode,
    tls_link::TlsLink,
};
use weir_buf::{IoBuf, MsgFrame, SnCounter};
use weir_tls::TlsEvent;

const LINK_BUF: usize = 16 * 1024;
const ECHO_KIND: u16 = 1;

/// Echo load client over raw TCP ("tcp"), TLS ("TCP"), raw UDP
/// ("udp") or the reliable-UDP protocol ("UDP").
#[derive(Parser, Debug)]
#[command(name = "echoclient")]
struct Args {
    /// Transport mode: tcp | TCP | udp | UDP
    mode: String,
    /// Server address, host:port
    addr: String,
    /// Concurrent clients.
    n_clients: u32,
    /// Messages each client round-trips.
    n_msgs: u32,
    /// Optional JSON configuration (TLS material, payload size).
    #[arg(long)]
    config: Option<PathBuf>,
}

struct ClientState {
    sent: u32,
    acked_bytes: u64,
    completed: u32,
}

struct Run {
    frame: Vec<u8>,
    n_msgs: u32,
    total_done: u64,
    target: u64,
}

impl Run {
    fn new(payload: usize, n_clients: u32, n_msgs: u32) -> Self {
        let mut sn = SnCounter::new();
        let mut frame = MsgFrame::new(ECHO_KIND, 1);
        frame.set_sn(sn.next());
        frame.write_item(0, &vec![0x5au8; payload]);
        Self {
            frame: frame.as_bytes().to_vec(),
            n_msgs,
            total_done: 0,
            target: u64::from(n_clients) * u64::from(n_msgs),
        }
    }

    /// Accounts echoed bytes; returns how many fresh messages this
    /// client should now send.
    fn on_echoed(&mut self, state: &mut ClientState, n: usize) -> u32 {
        state.acked_bytes += n as u64;
        let complete = (state.acked_bytes / self.frame.len() as u64) as u32;
        let newly = complete.saturating_sub(state.completed);
        state.completed = complete;
        self.total_done += u64::from(newly);
        let mut to_send = 0;
        for _ in 0..newly {
            if state.sent < self.n_msgs {
                state.sent += 1;
                to_send += 1;
            }
        }
        to_send
    }

    fn finished(&self) -> bool {
        self.total_done >= self.target
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    if args.n_clients == 0 || args.n_msgs == 0 {
        error!("n_clients and n_msgs must be positive");
        return ExitCode::FAILURE;
    }
    let cfg = match args.config.as_deref().map(Config::load).transpose() {
        Ok(c) => c.unwrap_or_default(),
        Err(_) => return ExitCode::FAILURE,
    };
    let Ok(addr) = parse_endpoint(&args.addr) else {
        error!(addr = %args.addr, "bad server address");
        return ExitCode::FAILURE;
    };

    let result = match args.mode.as_str() {
        "tcp" => run_tcp(addr, &cfg, &args, None),
        "TCP" => {
            let Some(tls) = cfg.tls.as_ref() else {
                error!("TLS mode needs a [tls] config section");
                return ExitCode::FAILURE;
            };
            match tls.client_config() {
                Ok(client_cfg) => {
                    let name = tls.server_name.clone().unwrap_or_else(|| "localhost".into());
                    run_tcp(addr, &cfg, &args, Some((client_cfg, name)))
                }
                Err(_) => return ExitCode::FAILURE,
            }
        }
        "udp" => run_udp(addr, &cfg, &args),
        "UDP" => run_rudp(addr, &cfg, &args),
        other => {
            error!(mode = other, "unknown mode; use tcp | TCP | udp | UDP");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => {
            info!("all messages echoed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "client failed");
            ExitCode::FAILURE
        }
    }
}

fn run_tcp(
    addr: SocketAddr,
    cfg: &Config,
    args: &Args,
    tls: Option<(std::sync::Arc<rustls::ClientConfig>, String)>,
) -> Result<(), Error> {
    let mut reactor = Reactor::new()?;
    if let Some(size) = cfg.socket_buf {
        reactor.set_socket_buf_size(size);
    }
    let mut run = Run::new(cfg.echo.payload, args.n_clients, args.n_msgs);

    let mut plain: Vec<(HandleId, ClientState)> = Vec::new();
    let mut secure: Vec<(TlsLink, ClientState)> = Vec::new();
    for _ in 0..args.n_clients {
        let state = ClientState { sent: 0, acked_bytes: 0, completed: 0 };
        match &tls {
            Some((client_cfg, name)) => {
                let link = TlsLink::client(&mut reactor, addr, client_cfg.clone(), name)?;
                secure.push((link, state));
            }
            None => {
                let id = reactor.connect_tcp(addr)?;
                plain.push((id, state));
            }
        }
    }

    let started = std::time::Instant::now();
    while !run.finished() {
        if started.elapsed() > Duration::from_secs(120) {
            return Err(Error::Retry);
        }
        reactor.poll_with(Some(Duration::from_millis(20)), &mut |reactor, event| {
            // Plain links.
            if tls.is_none() {
                match event {
                    ReactorEvent::Connected { id, result } => {
                        if let Some((_, state)) =
                            plain.iter_mut().find(|(h, _)| *h == id)
                        {
                            match result {
                                Ok(()) => {
                                    let _ = reactor
                                        .post_read(id, IoBuf::with_capacity(LINK_BUF));
                                    state.sent += 1;
                                    let _ = reactor
                                        .post_write(id, IoBuf::from_bytes(&run.frame));
                                }
                                Err(e) => warn!(error = %e, "connect failed"),
                            }
                        }
                    }
                    ReactorEvent::ReadDone { id, buf, result } => {
                        if let Some((_, state)) =
                            plain.iter_mut().find(|(h, _)| *h == id)
                        {
                            match result {
                                Ok(n) if n > 0 => {
                                    let to_send = run.on_echoed(state, n);
                                    for _ in 0..to_send {
                                        let _ = reactor
                                            .post_write(id, IoBuf::from_bytes(&run.frame));
                                    }
                                    let mut buf = buf;
                                    buf.recycle();
                                    let _ = reactor.post_read(id, buf);
                                }
                                Ok(_) => warn!("server closed early"),
                                Err(Error::Closing) => {}
                                Err(e) => warn!(error = %e, "read failed"),
                            }
                        }
                    }
                    _ => {}
                }
                return;
            }

            // TLS links.
            let mut event = Some(event);
            for (link, state) in secure.iter_mut() {
                let Some(ev) = event.take() else { break };
                let mut established = false;
                let mut echoed = 0usize;
                event = link.handle_event(reactor, ev, &mut |tls_ev| match tls_ev {
                    TlsEvent::Established => established = true,
                    TlsEvent::ReadDone(_, Ok(n)) => echoed += n,
                    TlsEvent::Shutdown(Err(e)) => warn!(error = %e, "tls failed"),
                    _ => {}
                });
                if established {
                    state.sent += 1;
                    let _ = link.post_write(reactor, IoBuf::from_bytes(&run.frame));
                    let _ = link.post_read(reactor, IoBuf::with_capacity(LINK_BUF));
                }
                if echoed > 0 {
                    let to_send = run.on_echoed(state, echoed);
                    for _ in 0..to_send {
                        let _ = link.post_write(reactor, IoBuf::from_bytes(&run.frame));
                    }
                    let _ = link.post_read(reactor, IoBuf::with_capacity(LINK_BUF));
                }
            }
        })?;
    }
    info!(done = run.total_done, "tcp run complete");
    Ok(())
}

fn run_udp(addr: SocketAddr, cfg: &Config, args: &Args) -> Result<(), Error> {
    let mut reactor = Reactor::new()?;
    if let Some(size) = cfg.socket_buf {
        reactor.set_socket_buf_size(size);
    }
    // Datagram echo: keep each message within one datagram.
    let payload = cfg.echo.payload.min(1200);
    let mut run = Run::new(payload, args.n_clients, args.n_msgs);

    let bind = wildcard_for(&addr);
    let mut clients: Vec<(HandleId, ClientState)> = Vec::new();
    for _ in 0..args.n_clients {
        let id = reactor.open_udp(bind, Some(addr))?;
        reactor.post_read(id, IoBuf::with_capacity(LINK_BUF))?;
        reactor.post_write(id, IoBuf::from_bytes(&run.frame))?;
        clients.push((id, ClientState { sent: 1, acked_bytes: 0, completed: 0 }));
    }

    let started = std::time::Instant::now();
    while !run.finished() {
        if started.elapsed() > Duration::from_secs(120) {
            return Err(Error::Retry);
        }
        reactor.poll_with(Some(Duration::from_millis(20)), &mut |reactor, event| {
            if let ReactorEvent::ReadDone { id, mut buf, result } = event {
                if let Some((_, state)) = clients.iter_mut().find(|(h, _)| *h == id) {
                    if let Ok(n) = result {
                        if n > 0 {
                            let to_send = run.on_echoed(state, n);
                            for _ in 0..to_send {
                                let _ =
                                    reactor.post_write(id, IoBuf::from_bytes(&run.frame));
                            }
                        }
                    }
                    buf.recycle();
                    let _ = reactor.post_read(id, buf);
                }
            }
        })?;
    }
    info!(done = run.total_done, "udp run complete");
    Ok(())
}

fn run_rudp(addr: SocketAddr, cfg: &Config, args: &Args) -> Result<(), Error> {
    let mut reactor = Reactor::new()?;
    if let Some(size) = cfg.socket_buf {
        reactor.set_socket_buf_size(size);
    }
    let mut run = Run::new(cfg.echo.payload, args.n_clients, args.n_msgs);

    let bind = wildcard_for(&addr);
    let mut node = RudpNode::open(&mut reactor, bind, false)?;
    let now = reactor.now();
    let mut states: Vec<(u32, ClientState)> = Vec::new();
    for i in 0..args.n_clients {
        let conv = 0x4000 + i;
        node.add_session(now, conv, addr);
        node.send(conv, &run.frame).map_err(|e| {
            error!(conv, error = %e, "initial send failed");
            e
        })?;
        states.push((conv, ClientState { sent: 1, acked_bytes: 0, completed: 0 }));
    }

    let started = std::time::Instant::now();
    while !run.finished() {
        if started.elapsed() > Duration::from_secs(120) {
            return Err(Error::Retry);
        }
        let mut follow_ups: Vec<(u32, u32)> = Vec::new();
        reactor.poll_with(Some(Duration::from_millis(20)), &mut |reactor, event| {
            let _ = node.handle_event(reactor, event, &mut |conv, _peer, bytes| {
                if let Some((_, state)) = states.iter_mut().find(|(c, _)| *c == conv) {
                    let to_send = run.on_echoed(state, bytes.len());
                    if to_send > 0 {
                        follow_ups.push((conv, to_send));
                    }
                }
            });
        })?;
        for (conv, count) in follow_ups {
            for _ in 0..count {
                if let Err(e) = node.send(conv, &run.frame) {
                    warn!(conv, error = %e, "send failed");
                }
            }
        }
    }
    info!(done = run.total_done, "reliable-udp run complete");
    Ok(())
}

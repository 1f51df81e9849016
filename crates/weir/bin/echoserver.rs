use std::{
    path::PathBuf,
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use tracing::{error, info, warn};
use weir::{
    Error, Reactor, ReactorEvent, TimerSpec,
    addr::parse_endpoint,
    config::Config,
    rudp_link::RudpNode,
    tls_link::TlsLink,
};
use weir_buf::IoBuf;
use weir_tls::TlsEvent;

const LINK_BUF: usize = 16 * 1024;

/// Echo server over raw TCP ("tcp"), TLS ("TCP"), raw UDP ("udp") or
/// the reliable-UDP protocol ("UDP").
#[derive(Parser, Debug)]
#[command(name = "echoserver")]
struct Args {
    /// Transport mode: tcp | TCP | udp | UDP
    mode: String,
    /// Listen address, host:port
    addr: String,
    /// Optional JSON configuration (TLS certs, tick interval).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Default)]
struct Stats {
    msgs: u64,
    bytes: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = match args.config.as_deref().map(Config::load).transpose() {
        Ok(c) => c.unwrap_or_default(),
        Err(_) => return ExitCode::FAILURE,
    };
    let Ok(addr) = parse_endpoint(&args.addr) else {
        error!(addr = %args.addr, "bad listen address");
        return ExitCode::FAILURE;
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let _ = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst));
    }

    let result = match args.mode.as_str() {
        "tcp" => run_tcp(addr, &cfg, &stop, None),
        "TCP" => {
            let Some(tls) = cfg.tls.as_ref() else {
                error!("TLS mode needs a [tls] config section");
                return ExitCode::FAILURE;
            };
            match tls.server_config() {
                Ok(server_cfg) => run_tcp(addr, &cfg, &stop, Some(server_cfg)),
                Err(_) => return ExitCode::FAILURE,
            }
        }
        "udp" => run_udp(addr, &cfg, &stop),
        "UDP" => run_rudp(addr, &cfg, &stop),
        other => {
            error!(mode = other, "unknown mode; use tcp | TCP | udp | UDP");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => {
            info!("orderly shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

fn run_tcp(
    addr: std::net::SocketAddr,
    cfg: &Config,
    stop: &AtomicBool,
    tls: Option<Arc<rustls::ServerConfig>>,
) -> Result<(), Error> {
    let mut reactor = Reactor::new()?;
    if let Some(size) = cfg.socket_buf {
        reactor.set_socket_buf_size(size);
    }
    let listener = reactor.listen_tcp(addr)?;
    reactor.set_timer(
        listener,
        TimerSpec {
            first_delay: cfg.echo.tick.as_millis(),
            period: cfg.echo.tick.as_millis(),
            repeat: 0,
        },
    )?;
    info!(%addr, tls = tls.is_some(), "echo server listening");

    let mut stats = Stats::default();
    let mut tls_links: Vec<TlsLink> = Vec::new();

    while !stop.load(Ordering::SeqCst) {
        reactor.poll_with(Some(Duration::from_millis(50)), &mut |reactor, event| {
            // TLS links consume their own transport events; decrypted
            // payloads echo straight back through the same link.
            let mut event = Some(event);
            let mut idx = 0;
            while idx < tls_links.len() {
                let Some(ev) = event.take() else { break };
                let mut echoes: Vec<Vec<u8>> = Vec::new();
                let mut shutdown = false;
                event = tls_links[idx].handle_event(reactor, ev, &mut |tls_ev| match tls_ev {
                    TlsEvent::ReadDone(buf, Ok(n)) => {
                        stats.msgs += 1;
                        stats.bytes += n as u64;
                        echoes.push(buf.bytes().to_vec());
                    }
                    TlsEvent::Shutdown(_) => shutdown = true,
                    _ => {}
                });
                let link = &mut tls_links[idx];
                for bytes in echoes {
                    let _ = link.post_write(reactor, IoBuf::from_bytes(&bytes));
                    let _ = link.post_read(reactor, IoBuf::with_capacity(LINK_BUF));
                }
                if shutdown {
                    tls_links.swap_remove(idx);
                } else {
                    idx += 1;
                }
            }
            let Some(event) = event else { return };

            match event {
                ReactorEvent::Accepted { link, peer, .. } => {
                    info!(%peer, "client connected");
                    match tls.as_ref() {
                        Some(server_cfg) => {
                            match TlsLink::server(reactor, link, server_cfg.clone()) {
                                Ok(mut tls_link) => {
                                    let _ = tls_link
                                        .post_read(reactor, IoBuf::with_capacity(LINK_BUF));
                                    tls_links.push(tls_link);
                                }
                                Err(e) => {
                                    warn!(error = %e, "tls accept failed");
                                    reactor.close(link);
                                }
                            }
                        }
                        None => {
                            let _ = reactor.post_read(link, IoBuf::with_capacity(LINK_BUF));
                        }
                    }
                }
                ReactorEvent::ReadDone { id, buf, result } => match result {
                    Ok(n) if n > 0 => {
                        stats.msgs += 1;
                        stats.bytes += n as u64;
                        // The received descriptor goes straight back
                        // out; the link reads into a fresh buffer.
                        let _ = reactor.post_write(id, buf);
                        let _ = reactor.post_read(id, IoBuf::with_capacity(LINK_BUF));
                    }
                    Ok(_) => reactor.close(id),
                    Err(Error::Closing) => {}
                    Err(e) => {
                        warn!(error = %e, "link read failed");
                        reactor.close(id);
                    }
                },
                ReactorEvent::TimerFired { .. } => {
                    info!(msgs = stats.msgs, bytes = stats.bytes, "tick");
                }
                _ => {}
            }
        })?;
    }
    Ok(())
}

fn run_udp(
    addr: std::net::SocketAddr,
    cfg: &Config,
    stop: &AtomicBool,
) -> Result<(), Error> {
    let mut reactor = Reactor::new()?;
    if let Some(size) = cfg.socket_buf {
        reactor.set_socket_buf_size(size);
    }
    let udp = reactor.open_udp(addr, None)?;
    reactor.post_read(udp, IoBuf::with_capacity(LINK_BUF))?;
    reactor.set_timer(
        udp,
        TimerSpec {
            first_delay: cfg.echo.tick.as_millis(),
            period: cfg.echo.tick.as_millis(),
            repeat: 0,
        },
    )?;
    info!(%addr, "udp echo server up");

    let mut stats = Stats::default();
    while !stop.load(Ordering::SeqCst) {
        reactor.poll_with(Some(Duration::from_millis(50)), &mut |reactor, event| {
            match event {
                ReactorEvent::ReadDone { id, buf, result } => match result {
                    Ok(n) if n > 0 => {
                        stats.msgs += 1;
                        stats.bytes += n as u64;
                        // Echo to the sender, then rearm the read.
                        let _ = reactor.post_write(id, buf);
                        let _ = reactor.post_read(id, IoBuf::with_capacity(LINK_BUF));
                    }
                    Ok(_) => {
                        let _ = reactor.post_read(id, buf);
                    }
                    Err(Error::Closing) => {}
                    Err(e) => warn!(error = %e, "udp read failed"),
                },
                ReactorEvent::TimerFired { .. } => {
                    info!(msgs = stats.msgs, bytes = stats.bytes, "tick");
                }
                _ => {}
            }
        })?;
    }
    Ok(())
}

fn run_rudp(
    addr: std::net::SocketAddr,
    cfg: &Config,
    stop: &AtomicBool,
) -> Result<(), Error> {
    let mut reactor = Reactor::new()?;
    if let Some(size) = cfg.socket_buf {
        reactor.set_socket_buf_size(size);
    }
    let mut node = RudpNode::open(&mut reactor, addr, true)?;

    // The node's handle timer drives protocol flushes, so the stats
    // tick runs off the loop clock instead.
    let mut ticker = weir_timing::Repeater::every(cfg.echo.tick);
    let mut stats = Stats::default();
    while !stop.load(Ordering::SeqCst) {
        let mut echoes: Vec<(u32, Vec<u8>)> = Vec::new();
        reactor.poll_with(Some(Duration::from_millis(50)), &mut |reactor, event| {
            let _ = node.handle_event(reactor, event, &mut |conv, _peer, bytes| {
                stats.msgs += 1;
                stats.bytes += bytes.len() as u64;
                echoes.push((conv, bytes.to_vec()));
            });
        })?;
        for (conv, bytes) in echoes {
            if let Err(e) = node.send(conv, &bytes) {
                warn!(conv, error = %e, "echo send failed");
            }
        }
        if ticker.fired(reactor.now()) {
            info!(
                msgs = stats.msgs,
                bytes = stats.bytes,
                sessions = node.session_count(),
                "tick"
            );
        }
    }
    Ok(())
}

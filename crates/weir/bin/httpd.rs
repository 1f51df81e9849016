use std::{
    collections::HashMap,
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
    Error, HandleId, Reactor, ReactorEvent,
    addr::parse_endpoint,
    config::Config,
    proxy::{ProxyCfg, TcpProxy},
};
use weir_buf::IoBuf;
use weir_http::HttpLayer;

const LINK_BUF: usize = 16 * 1024;

/// Static-file HTTP server on the reactor loop.
#[derive(Parser, Debug)]
#[command(name = "httpd")]
struct Args {
    /// Listen address, host:port
    addr: String,
    /// JSON configuration with a website section.
    #[arg(long)]
    config: Option<PathBuf>,
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
    let site = cfg.website.clone().unwrap_or_default().to_site();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let _ = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst));
    }

    match serve(addr, site, &cfg, &stop) {
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

fn serve(
    addr: std::net::SocketAddr,
    site: weir_http::WebsiteCfg,
    cfg: &Config,
    stop: &AtomicBool,
) -> Result<(), Error> {
    let mut reactor = Reactor::new()?;
    if let Some(size) = cfg.socket_buf {
        reactor.set_socket_buf_size(size);
    }
    let listener = reactor.listen_tcp(addr)?;
    info!(%addr, root = %site.root.display(), "httpd listening");

    // An optional reverse-proxy leg shares the loop.
    let mut proxy = match cfg.proxy.as_ref() {
        Some(section) => Some(TcpProxy::open(
            &mut reactor,
            ProxyCfg {
                listen: parse_endpoint(&section.listen)?,
                backend: parse_endpoint(&section.backend)?,
                timeout_ms: section.timeout.as_millis(),
            },
        )?),
        None => None,
    };

    let mut layers: HashMap<usize, HttpLayer> = HashMap::new();
    while !stop.load(Ordering::SeqCst) {
        reactor.poll_with(Some(Duration::from_millis(50)), &mut |reactor, event| {
            let event = match proxy.as_mut() {
                Some(p) => match p.handle_event(reactor, event) {
                    Some(ev) => ev,
                    None => return,
                },
                None => event,
            };
            match event {
                ReactorEvent::Accepted { listener: from, link, peer } if from == listener => {
                    info!(%peer, "client connected");
                    layers.insert(link.index(), HttpLayer::new(site.clone()));
                    let _ = reactor.post_read(link, IoBuf::with_capacity(LINK_BUF));
                }
                ReactorEvent::ReadDone { id, buf, result } => {
                    let Some(layer) = layers.get_mut(&id.index()) else {
                        return;
                    };
                    match result {
                        Ok(n) if n > 0 => {
                            let outcome = layer.feed(buf.bytes());
                            flush_layer(reactor, id, layer);
                            if outcome.close && layer.pending_output().is_empty() {
                                reactor.close(id);
                            } else {
                                let mut buf = buf;
                                buf.recycle();
                                let _ = reactor.post_read(id, buf);
                            }
                        }
                        Ok(_) => {
                            let _ = layer.on_eof();
                            reactor.close(id);
                        }
                        Err(Error::Closing) => {}
                        Err(e) => {
                            warn!(error = %e, "link read failed");
                            reactor.close(id);
                        }
                    }
                }
                ReactorEvent::WriteDone { id, result: Ok(()), .. } => {
                    let Some(layer) = layers.get_mut(&id.index()) else {
                        return;
                    };
                    let outcome = layer.on_output_drained();
                    flush_layer(reactor, id, layer);
                    if outcome.close && layer.pending_output().is_empty() {
                        reactor.close(id);
                    }
                }
                ReactorEvent::WriteDone { id, result: Err(e), .. } => {
                    if !matches!(e, Error::Closing) {
                        warn!(error = %e, "link write failed");
                        reactor.close(id);
                    }
                }
                ReactorEvent::Closed { id } => {
                    if let Some(layer) = layers.remove(&id.index()) {
                        info!(served = layer.messages_served(), "client gone");
                    }
                }
                _ => {}
            }
        })?;
    }
    Ok(())
}

/// Moves a layer's pending response bytes onto the wire.
fn flush_layer(reactor: &mut Reactor, id: HandleId, layer: &mut HttpLayer) {
    loop {
        let pending = layer.pending_output().to_vec();
        if pending.is_empty() {
            return;
        }
        layer.consume_output(pending.len());
        if reactor.post_write(id, IoBuf::from_bytes(&pending)).is_err() {
            return;
        }
    }
}

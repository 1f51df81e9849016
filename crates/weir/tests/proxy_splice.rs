use std::time::Duration;

use weir::{
    Error, Reactor, ReactorEvent,
    proxy::{ProxyCfg, TcpProxy},
};
use weir_buf::IoBuf;

/// Frontend -> proxy -> echoing backend -> proxy -> frontend, all on
/// one loop.
#[test]
fn splices_bytes_both_ways() {
    let mut reactor = Reactor::new().unwrap();

    // Echoing backend.
    let backend = reactor.listen_tcp("127.0.0.1:0".parse().unwrap()).unwrap();
    let backend_addr = reactor.local_addr(backend).unwrap();

    let mut proxy = TcpProxy::open(
        &mut reactor,
        ProxyCfg {
            listen: "127.0.0.1:0".parse().unwrap(),
            backend: backend_addr,
            timeout_ms: 10_000,
        },
    )
    .unwrap();
    let proxy_addr = reactor.local_addr(proxy.listener()).unwrap();

    let client = reactor.connect_tcp(proxy_addr).unwrap();

    let payload = vec![0xabu8; 9_000];
    let mut echoed: Vec<u8> = Vec::new();
    let mut sent = false;
    let start = std::time::Instant::now();

    while echoed.len() < payload.len() && start.elapsed() < Duration::from_secs(5) {
        let send_now = &mut sent;
        let got = &mut echoed;
        let expect = payload.clone();
        reactor
            .poll_with(Some(Duration::from_millis(10)), &mut |reactor, event| {
                let Some(event) = proxy.handle_event(reactor, event) else {
                    return;
                };
                match event {
                    ReactorEvent::Connected { id, result: Ok(()) } if id == client => {
                        reactor.post_read(id, IoBuf::with_capacity(16 * 1024)).unwrap();
                        reactor.post_write(id, IoBuf::from_bytes(&expect)).unwrap();
                        *send_now = true;
                    }
                    ReactorEvent::Accepted { listener, link, .. } if listener == backend => {
                        reactor.post_read(link, IoBuf::with_capacity(16 * 1024)).unwrap();
                    }
                    ReactorEvent::ReadDone { id, buf, result: Ok(n) } if n > 0 => {
                        if id == client {
                            got.extend_from_slice(buf.bytes());
                            let mut buf = buf;
                            buf.recycle();
                            let _ = reactor.post_read(id, buf);
                        } else {
                            // Backend link: echo and rearm.
                            let _ = reactor.post_write(id, buf);
                            let _ = reactor.post_read(id, IoBuf::with_capacity(16 * 1024));
                        }
                    }
                    _ => {}
                }
            })
            .unwrap();
    }

    assert!(sent);
    assert_eq!(echoed, payload, "proxied echo must be byte-identical");
    assert_eq!(proxy.active_splices(), 1);
}

/// Backend refusing connections tears the frontend down instead of
/// leaking half-open splices.
#[test]
fn dead_backend_closes_frontend() {
    let mut reactor = Reactor::new().unwrap();

    // Grab a port and close it again so nothing is listening there.
    let ghost = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let ghost_addr = ghost.local_addr().unwrap();
    drop(ghost);

    let mut proxy = TcpProxy::open(
        &mut reactor,
        ProxyCfg {
            listen: "127.0.0.1:0".parse().unwrap(),
            backend: ghost_addr,
            timeout_ms: 1_000,
        },
    )
    .unwrap();
    let proxy_addr = reactor.local_addr(proxy.listener()).unwrap();
    let client = reactor.connect_tcp(proxy_addr).unwrap();

    let mut client_gone = false;
    let start = std::time::Instant::now();
    while !client_gone && start.elapsed() < Duration::from_secs(5) {
        reactor
            .poll_with(Some(Duration::from_millis(10)), &mut |reactor, event| {
                let Some(event) = proxy.handle_event(reactor, event) else {
                    return;
                };
                match event {
                    ReactorEvent::Connected { id, result: Ok(()) } if id == client => {
                        // Learn about the teardown through a read.
                        let _ = reactor.post_read(id, IoBuf::with_capacity(64));
                    }
                    ReactorEvent::ReadDone { id, result, .. } if id == client => {
                        match result {
                            Ok(0) | Err(Error::Closing) | Err(Error::Io(_)) => {
                                client_gone = true;
                            }
                            _ => {}
                        }
                    }
                    ReactorEvent::Closed { id } if id == client => client_gone = true,
                    _ => {}
                }
            })
            .unwrap();
    }
    assert!(client_gone, "frontend must observe the teardown");
    assert_eq!(proxy.active_splices(), 0);
}

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use crate::Error;

/// Parses "host:port" into a socket address, resolving names.
pub fn parse_endpoint(text: &str) -> Result<SocketAddr, Error> {
    text.to_socket_addrs()
        .map_err(|_| Error::InvalidParam)?
        .next()
        .ok_or(Error::InvalidParam)
}

/// Unspecified bind address of the same family as `peer`, for
/// ephemeral client sockets.
pub fn wildcard_for(peer: &SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

/// A connection's two ends. `reversed` swaps the local/remote roles,
/// as a proxy does when it mirrors an accepted pair onto its backend
/// leg.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

impl Endpoints {
    pub fn new(local: SocketAddr, remote: SocketAddr) -> Self {
        Self { local, remote }
    }

    #[inline]
    pub fn reversed(self) -> Self {
        Self { local: self.remote, remote: self.local }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v4_and_v6() {
        assert!(parse_endpoint("127.0.0.1:8080").is_ok());
        assert!(parse_endpoint("[::1]:8080").is_ok());
        assert!(parse_endpoint("not-an-endpoint").is_err());
    }

    #[test]
    fn wildcard_matches_family() {
        let v4 = parse_endpoint("127.0.0.1:1").unwrap();
        let v6 = parse_endpoint("[::1]:1").unwrap();
        assert!(wildcard_for(&v4).is_ipv4());
        assert!(wildcard_for(&v6).is_ipv6());
        assert_eq!(wildcard_for(&v4).port(), 0);
    }

    #[test]
    fn reversed_swaps_roles() {
        let e = Endpoints::new(
            parse_endpoint("127.0.0.1:1").unwrap(),
            parse_endpoint("127.0.0.1:2").unwrap(),
        );
        let r = e.reversed();
        assert_eq!(r.local, e.remote);
        assert_eq!(r.remote, e.local);
        assert_eq!(r.reversed(), e);
    }
}

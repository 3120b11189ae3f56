use std::{fmt, net::SocketAddr};

/// A resolved socket address with a stable display form
///
/// The display form is a URI in the `ipv4:` / `ipv6:` schemes, e.g. `ipv4:127.0.0.1:443` or
/// `ipv6:[::1]:443`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedAddress(SocketAddr);

impl ResolvedAddress {
    /// Wrap an already-resolved address
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// The underlying socket address
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// The URI form of this address
    pub fn to_uri_string(&self) -> String {
        self.to_string()
    }
}

impl From<SocketAddr> for ResolvedAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            SocketAddr::V4(addr) => write!(f, "ipv4:{addr}"),
            SocketAddr::V6(addr) => write!(f, "ipv6:{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn uri_forms() {
        let v4 = ResolvedAddress::new((Ipv4Addr::LOCALHOST, 443).into());
        assert_eq!(v4.to_uri_string(), "ipv4:127.0.0.1:443");
        let v6 = ResolvedAddress::new((Ipv6Addr::LOCALHOST, 8080).into());
        assert_eq!(v6.to_uri_string(), "ipv6:[::1]:8080");
        assert_eq!(v6.socket_addr().port(), 8080);
    }
}

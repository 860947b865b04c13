use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

/// Bind host for listeners: wildcard when reachable from other machines,
/// loopback otherwise.
pub fn bind_host(external: bool) -> &'static str {
    if external {
        "0.0.0.0"
    } else {
        "127.0.0.1"
    }
}

/// Resolve `host:port` to the first matching socket address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addr = format!("{host}:{port}");
    addr.to_socket_addrs()
        .map_err(|_| TransportError::InvalidAddress(addr.clone()))?
        .next()
        .ok_or(TransportError::InvalidAddress(addr))
}

/// A bound UDP socket used by both listeners and senders.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpEndpoint {
    /// Bind a receiving socket with a read timeout so callers can poll for
    /// cancellation between datagrams.
    pub fn bind(host: &str, port: u16, read_timeout: Duration) -> Result<Self> {
        let addr = resolve(host, port)?;
        let bind_err = |source: std::io::Error| TransportError::Bind {
            addr: addr.to_string(),
            source,
        };
        let socket = UdpSocket::bind(addr).map_err(bind_err)?;
        socket.set_read_timeout(Some(read_timeout)).map_err(bind_err)?;
        info!(%addr, "udp socket bound");
        Ok(Self {
            socket,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Bind an ephemeral local socket for sending to `target`.
    pub fn sender(target: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).map_err(|source| TransportError::Bind {
            addr: local.to_string(),
            source,
        })?;
        debug!(%target, "udp sender socket bound");
        Ok(Self {
            socket,
            buf: Vec::new(),
        })
    }

    /// Receive one datagram.
    ///
    /// Returns `Ok(None)` when the read timeout elapsed without data.
    pub fn recv(&mut self) -> Result<Option<(&[u8], SocketAddr)>> {
        if self.buf.len() < MAX_DATAGRAM {
            self.buf.resize(MAX_DATAGRAM, 0);
        }
        match self.socket.recv_from(&mut self.buf) {
            Ok((n, from)) => Ok(Some((&self.buf[..n], from))),
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Send one datagram to `target`.
    pub fn send_to(&self, datagram: &[u8], target: SocketAddr) -> Result<()> {
        if datagram.len() > MAX_DATAGRAM {
            return Err(TransportError::CapacityExceeded {
                size: datagram.len(),
                capacity: MAX_DATAGRAM,
            });
        }
        let sent = self.socket.send_to(datagram, target)?;
        if sent != datagram.len() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short datagram write ({sent} of {} bytes)", datagram.len()),
            )));
        }
        Ok(())
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_host_selects_wildcard_for_external() {
        assert_eq!(bind_host(true), "0.0.0.0");
        assert_eq!(bind_host(false), "127.0.0.1");
    }

    #[test]
    fn send_and_receive_datagram() {
        let mut listener = UdpEndpoint::bind("127.0.0.1", 0, Duration::from_millis(500)).unwrap();
        let target = listener.local_addr().unwrap();
        let sender = UdpEndpoint::sender(target).unwrap();

        sender.send_to(b"datagram", target).unwrap();
        let (data, _from) = listener.recv().unwrap().expect("datagram should arrive");
        assert_eq!(data, b"datagram");
    }

    #[test]
    fn recv_times_out_with_none() {
        let mut listener = UdpEndpoint::bind("127.0.0.1", 0, Duration::from_millis(20)).unwrap();
        assert!(listener.recv().unwrap().is_none());
    }

    #[test]
    fn oversized_datagram_rejected() {
        let target: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let sender = UdpEndpoint::sender(target).unwrap();
        let err = sender.send_to(&vec![0u8; MAX_DATAGRAM + 1], target).unwrap_err();
        assert!(matches!(err, TransportError::CapacityExceeded { .. }));
    }

    #[test]
    fn bind_conflict_reports_address() {
        let first = UdpEndpoint::bind("127.0.0.1", 0, Duration::from_millis(20)).unwrap();
        let port = first.local_addr().unwrap().port();
        let err = UdpEndpoint::bind("127.0.0.1", port, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
    }
}

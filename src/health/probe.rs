//! Database reachability probe

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::warn;

/// Outcome of one probe call.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    pub success: bool,
}

/// Zero-argument reachability check against the server's embedded database.
/// Implementations must not panic; failure is a `false` result.
pub trait DatabaseProbe: Send + Sync {
    fn ping(&self) -> ProbeResult;
}

/// Probe that opens a TCP connection to the database listener and closes it.
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

impl DatabaseProbe for TcpProbe {
    fn ping(&self) -> ProbeResult {
        let addrs = match self.addr.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "Database probe address unresolvable");
                return ProbeResult { success: false };
            }
        };

        for addr in addrs {
            if TcpStream::connect_timeout(&addr, self.timeout).is_ok() {
                return ProbeResult { success: true };
            }
        }

        ProbeResult { success: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolvable_address_is_false() {
        let probe = TcpProbe::new("no-such-host.invalid:1", Duration::from_millis(100));
        assert!(!probe.ping().success);
    }

    #[test]
    fn test_closed_port_is_false() {
        // Reserved port on localhost, nothing should be listening.
        let probe = TcpProbe::new("127.0.0.1:1", Duration::from_millis(200));
        assert!(!probe.ping().success);
    }
}

//! Port binding with sequential fallback.
//!
//! # Responsibilities
//! - Bind the requested port, walking forward through the next nine ports
//!   when it is taken
//! - Report the address actually bound so callers can advertise it
//!
//! # Design Decisions
//! - The fallback is the process's only bind retry loop; after ten failures
//!   startup aborts with the last error

use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Ports tried per bind: the requested one plus the nine following it.
pub const BIND_ATTEMPTS: u16 = 10;

/// Bind `port`, falling back through `port+1 … port+9`. Port 0 binds an
/// ephemeral port on the first attempt.
pub async fn bind_with_fallback(port: u16) -> Result<(TcpListener, SocketAddr), std::io::Error> {
    let mut last_err = None;

    for offset in 0..BIND_ATTEMPTS {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };

        match TcpListener::bind(("0.0.0.0", candidate)).await {
            Ok(listener) => {
                let addr = listener.local_addr()?;
                if offset > 0 {
                    tracing::warn!(
                        requested = port,
                        bound = addr.port(),
                        "requested port unavailable, bound fallback"
                    );
                }
                return Ok((listener, addr));
            }
            Err(err) => {
                tracing::debug!(port = candidate, error = %err, "bind failed, trying next port");
                last_err = Some(err);
            }
        }

        // A request for port 0 is already a wildcard; retrying is pointless.
        if port == 0 {
            break;
        }
    }

    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::AddrInUse, "no usable port in range")
    }))
}

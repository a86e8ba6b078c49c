//! UDP receive loop (spec §4.4): a single socket accepting exported flow
//! datagrams, handing each off to the bounded queue without blocking.

use std::net::UdpSocket;
use std::time::Duration;

use log::{error, warn};

use super::queue::Queue;
use crate::context::AppContext;

/// Largest UDP payload the receiver accepts; NetFlow v9/IPFIX exporters
/// keep well under the classic Ethernet MTU, but large template flowsets
/// can still run long, so this is sized generously rather than at 1500.
const MAX_DATAGRAM: usize = 8192;

/// A short read timeout so the loop can notice `ctx.running` flipping to
/// `false` promptly; a blocking `recv_from` can't be interrupted from
/// another thread in safe Rust (spec §5's resolved Open Question).
const READ_TIMEOUT: Duration = Duration::from_millis(200);

pub fn run(ctx: AppContext, listen_port: u16, queue: Queue) -> std::io::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", listen_port))?;
    socket.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut buf = [0u8; MAX_DATAGRAM];
    while ctx.is_running() {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                if !queue.try_enqueue(buf[..len].to_vec(), from.ip()) {
                    warn!("receiver: ingest queue full, dropping datagram from {}", from.ip());
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => error!("receiver: recv_from failed: {err}"),
        }
    }
    Ok(())
}

//! Decoder worker pool (spec §4.4): each worker owns a forwarding socket
//! (when enabled) and pulls datagrams off the shared queue, decoding and
//! optionally re-emitting them.

use std::net::{SocketAddrV4, UdpSocket};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, warn};

use super::queue::Datagram;
use crate::context::AppContext;
use crate::decoder::decode_datagram;

/// Workers time out their receive so they notice `ctx.running` flipping to
/// `false` without needing a wakeup signal (spec §5).
const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn connect_forward_socket(ctx: &AppContext) -> Option<UdpSocket> {
    let target = ctx.forward?;
    match UdpSocket::bind(("0.0.0.0", 0)) {
        Ok(socket) => {
            let addr = SocketAddrV4::new(target.ip, target.port);
            if let Err(err) = socket.connect(addr) {
                error!("worker: failed to connect forwarding socket to {addr}: {err}");
                return None;
            }
            Some(socket)
        }
        Err(err) => {
            error!("worker: failed to bind forwarding socket: {err}");
            None
        }
    }
}

pub fn run(id: usize, ctx: AppContext, receiver: Receiver<Datagram>) {
    let forward_socket = connect_forward_socket(&ctx);

    while ctx.is_running() {
        let (datagram, from) = match receiver.recv_timeout(RECV_TIMEOUT) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let templates = &ctx.templates;
        let resolver = ctx.resolver.as_ref();
        let forward = forward_socket.is_some();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            decode_datagram(&datagram, from, templates, resolver, forward)
        }));

        match outcome {
            Ok(Ok(decoded)) => {
                if let (Some(socket), Some(bytes)) = (&forward_socket, decoded.forward_datagram) {
                    if let Err(err) = socket.send(&bytes) {
                        warn!("worker {id}: failed to forward datagram: {err}");
                    }
                }
                if ctx.debug && !decoded.records.is_empty() {
                    debug!(
                        "worker {id}: decoded {} flow record(s) from {from}",
                        decoded.records.len()
                    );
                }
            }
            Ok(Err(err)) => debug!("worker {id}: decode error from {from}: {err}"),
            Err(_) => error!("worker {id}: panic while decoding a datagram from {from}"),
        }
    }
}

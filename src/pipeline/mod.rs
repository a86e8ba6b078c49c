//! Ingest pipeline (spec §4.4): one UDP receiver feeding a bounded queue
//! drained by a fixed pool of decoder workers.

mod queue;
mod receiver;
mod worker;

use std::thread::JoinHandle;

pub use queue::Queue;

use crate::context::AppContext;

/// Spawns the receiver and the configured number of decoder workers as OS
/// threads, returning their join handles. The receiver thread's `JoinHandle`
/// carries an `io::Result<()>` so startup failures (e.g. the listen port
/// already in use) surface to the caller instead of being silently lost.
pub fn spawn(
    ctx: AppContext,
    listen_port: u16,
    queue_capacity: usize,
    worker_count: usize,
) -> (JoinHandle<std::io::Result<()>>, Vec<JoinHandle<()>>) {
    let queue = Queue::bounded(queue_capacity);

    let receiver_ctx = ctx.clone();
    let receiver_queue = queue.clone();
    let receiver_handle = std::thread::Builder::new()
        .name("gixflow-receiver".into())
        .spawn(move || receiver::run(receiver_ctx, listen_port, receiver_queue))
        .expect("failed to spawn receiver thread");

    let mut worker_handles = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let worker_ctx = ctx.clone();
        let worker_receiver = queue.receiver();
        let handle = std::thread::Builder::new()
            .name(format!("gixflow-worker-{id}"))
            .spawn(move || worker::run(id, worker_ctx, worker_receiver))
            .expect("failed to spawn worker thread");
        worker_handles.push(handle);
    }

    (receiver_handle, worker_handles)
}

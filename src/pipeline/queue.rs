//! The bounded MPMC ingest queue (spec §4.4): the receiver enqueues with a
//! non-blocking `try_send`, so a saturated queue sheds load by dropping
//! datagrams rather than backpressuring the UDP receive loop.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

pub type Datagram = (Vec<u8>, IpAddr);

#[derive(Clone)]
pub struct Queue {
    sender: Sender<Datagram>,
    receiver: Receiver<Datagram>,
    dropped: Arc<AtomicU64>,
}

impl Queue {
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns `true` if the datagram was enqueued, `false` if it was
    /// dropped because the queue is full.
    pub fn try_enqueue(&self, datagram: Vec<u8>, from: IpAddr) -> bool {
        match self.sender.try_send((datagram, from)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn receiver(&self) -> Receiver<Datagram> {
        self.receiver.clone()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_dropped_not_blocked() {
        let queue = Queue::bounded(2);
        assert!(queue.try_enqueue(vec![1], "127.0.0.1".parse().unwrap()));
        assert!(queue.try_enqueue(vec![2], "127.0.0.1".parse().unwrap()));
        assert!(!queue.try_enqueue(vec![3], "127.0.0.1".parse().unwrap()));
        assert_eq!(queue.dropped_count(), 1);
    }

    #[test]
    fn draining_frees_capacity() {
        let queue = Queue::bounded(1);
        assert!(queue.try_enqueue(vec![1], "127.0.0.1".parse().unwrap()));
        let (datagram, _) = queue.receiver().recv().unwrap();
        assert_eq!(datagram, vec![1]);
        assert!(queue.try_enqueue(vec![2], "127.0.0.1".parse().unwrap()));
    }
}

//! Per-key single-flight de-duplication (spec §4.2, "SHOULD single-flight
//! per `(reversed-name)` key to reduce external load").

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

#[derive(Default)]
pub(crate) struct SingleFlight {
    inflight: Mutex<HashSet<String>>,
    done: Condvar,
}

pub(crate) enum Ticket {
    /// This caller is the one that should perform the lookup.
    Leader,
    /// Another caller already finished the same lookup while we waited; the
    /// cache should be re-checked instead of issuing a fresh DNS query.
    Follower,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Blocks until `key` is not in flight, then claims it and returns
    /// [`Ticket::Leader`] unless another caller raced us to the claim in
    /// which case we wait for them and return [`Ticket::Follower`].
    pub(crate) fn join(&self, key: &str) -> Ticket {
        let mut inflight = self.inflight.lock().unwrap();
        if !inflight.contains(key) {
            inflight.insert(key.to_string());
            return Ticket::Leader;
        }
        while inflight.contains(key) {
            inflight = self.done.wait(inflight).unwrap();
        }
        Ticket::Follower
    }

    /// Releases a key claimed via [`Ticket::Leader`] and wakes any waiters.
    pub(crate) fn leave(&self, key: &str) {
        let mut inflight = self.inflight.lock().unwrap();
        inflight.remove(key);
        drop(inflight);
        self.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn second_joiner_waits_for_leader_then_follows() {
        let sf = Arc::new(SingleFlight::new());
        let sf2 = sf.clone();

        let leader_ready = Arc::new(std::sync::Barrier::new(2));
        let leader_ready2 = leader_ready.clone();

        let handle = thread::spawn(move || {
            match sf2.join("k") {
                Ticket::Leader => {}
                Ticket::Follower => panic!("expected leader"),
            }
            leader_ready2.wait();
            thread::sleep(std::time::Duration::from_millis(20));
            sf2.leave("k");
        });

        leader_ready.wait();
        match sf.join("k") {
            Ticket::Follower => {}
            Ticket::Leader => panic!("expected follower"),
        }
        handle.join().unwrap();
    }
}

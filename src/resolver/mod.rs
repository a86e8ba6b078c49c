//! ASN resolver (spec §4.2): consults the prefix cache, falling back to a
//! Cymru DNS TXT lookup on miss or expiry.

mod cymru;
mod singleflight;

use std::net::IpAddr;
use std::sync::Arc;

use log::debug;

use crate::cache::{Asn, PrefixCache, DEFAULT_TTL, SHORT_TTL};
use crate::time::unix_now;
use singleflight::{SingleFlight, Ticket};

/// Total DNS attempts per miss: one initial try plus two retries, per spec
/// §4.2 step 4.
const MAX_ATTEMPTS: u32 = 3;

/// Abstracts the DNS TXT lookup so tests can stub Cymru's answers without
/// touching the network.
pub trait TxtLookup: Send + Sync {
    fn lookup_txt(&self, name: &str) -> Vec<String>;
}

/// Production [`TxtLookup`] backed by `hickory-resolver`'s system
/// configuration (`/etc/resolv.conf` or platform equivalent).
///
/// `hickory-resolver` only exposes an async lookup API; each decoder worker
/// calls `resolve` synchronously (spec §5: "DNS lookups inside the resolver
/// are ... synchronous from a worker's point of view"), so this handle owns
/// a dedicated single-threaded Tokio runtime and blocks on it per call
/// rather than making every caller up the stack async.
pub struct HickoryTxtLookup {
    resolver: hickory_resolver::Resolver,
    runtime: tokio::runtime::Runtime,
}

impl HickoryTxtLookup {
    pub fn from_system_conf() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        // Construction spawns the resolver's background connection task,
        // which needs an entered runtime even though this call itself
        // isn't `async`.
        let _guard = runtime.enter();
        let resolver = hickory_resolver::Resolver::tokio_from_system_conf()?;
        drop(_guard);
        Ok(Self { resolver, runtime })
    }
}

impl TxtLookup for HickoryTxtLookup {
    fn lookup_txt(&self, name: &str) -> Vec<String> {
        match self.runtime.block_on(self.resolver.txt_lookup(name)) {
            Ok(response) => response
                .iter()
                .flat_map(|record| record.txt_data().iter())
                .filter_map(|data| std::str::from_utf8(data).ok())
                .map(str::to_string)
                .collect(),
            Err(err) => {
                debug!("asn resolver: dns lookup for {name} failed: {err}");
                Vec::new()
            }
        }
    }
}

/// Resolves IPs to ASNs, consulting `cache` and falling back to `dns`.
/// Cheap to clone: internally an `Arc`-backed handle shared by every
/// decoder worker.
#[derive(Clone)]
pub struct AsnResolver {
    cache: PrefixCache,
    dns: Arc<dyn TxtLookup>,
    inflight: Arc<SingleFlight>,
    debug: bool,
}

impl AsnResolver {
    pub fn new(cache: PrefixCache, dns: Arc<dyn TxtLookup>, debug: bool) -> Self {
        Self {
            cache,
            dns,
            inflight: Arc::new(SingleFlight::new()),
            debug,
        }
    }

    /// Never fails: every error path returns [`Asn::UNKNOWN`] and caches a
    /// short-lived negative entry (spec §4.2).
    pub fn resolve(&self, ip: IpAddr) -> Asn {
        let now = unix_now();

        if let Some((net, entry)) = self.cache.lookup_entry(ip) {
            if !entry.is_expired(now) {
                if self.debug {
                    debug!("asn resolver: cache hit for {ip} -> {}", entry.asn);
                }
                return entry.asn;
            }
            self.cache.delete(net);
        }

        self.resolve_miss(ip, now)
    }

    fn resolve_miss(&self, ip: IpAddr, now: u64) -> Asn {
        let name = cymru::reverse_query_name(ip);

        match self.inflight.join(&name) {
            Ticket::Follower => {
                // Another worker just resolved the same reversed name;
                // the cache should now have an answer.
                return self
                    .cache
                    .lookup(ip)
                    .map(|entry| entry.asn)
                    .unwrap_or(Asn::UNKNOWN);
            }
            Ticket::Leader => {}
        }

        let asn = self.query_and_learn(ip, &name, now);
        self.inflight.leave(&name);
        asn
    }

    fn query_and_learn(&self, ip: IpAddr, name: &str, now: u64) -> Asn {
        for attempt in 0..MAX_ATTEMPTS {
            let records = self.dns.lookup_txt(name);
            let learned = cymru::parse_origin_txt(&records);
            if learned.is_empty() {
                continue;
            }

            for (prefix, asn) in &learned {
                self.cache.insert(*prefix, *asn, now + DEFAULT_TTL);
            }
            if self.debug {
                debug!(
                    "asn resolver: learned {} prefix(es) for {ip} on attempt {}",
                    learned.len(),
                    attempt + 1
                );
            }
            return self
                .cache
                .lookup(ip)
                .map(|entry| entry.asn)
                .unwrap_or(learned[0].1);
        }

        let negative = cymru::reduce_to_query_network(ip);
        self.cache.insert(negative, Asn::UNKNOWN, now + SHORT_TTL);
        if self.debug {
            debug!("asn resolver: negative-cached {negative} after {MAX_ATTEMPTS} empty attempts");
        }
        Asn::UNKNOWN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubDns {
        answers: Vec<String>,
        calls: AtomicUsize,
    }

    impl TxtLookup for StubDns {
        fn lookup_txt(&self, _name: &str) -> Vec<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers.clone()
        }
    }

    fn resolver_with(answers: Vec<String>) -> (AsnResolver, Arc<StubDns>) {
        let cache = PrefixCache::new();
        cache.seed(&[]);
        let dns = Arc::new(StubDns {
            answers,
            calls: AtomicUsize::new(0),
        });
        (
            AsnResolver::new(cache, dns.clone() as Arc<dyn TxtLookup>, false),
            dns,
        )
    }

    #[test]
    fn seed_lookup_never_touches_dns() {
        let (resolver, dns) = resolver_with(vec![]);
        let asn = resolver.resolve("10.1.2.3".parse().unwrap());
        assert_eq!(asn, Asn::UNKNOWN);
        assert_eq!(dns.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn as112_pin_never_touches_dns() {
        let (resolver, dns) = resolver_with(vec![]);
        let asn = resolver.resolve("192.175.48.5".parse().unwrap());
        assert_eq!(asn, Asn(112));
        assert_eq!(dns.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn positive_learn_then_cached_second_call() {
        let (resolver, dns) = resolver_with(vec![
            "15169 | 8.8.8.0/24 | US | arin | 2000-01-01".to_string(),
        ]);
        let asn = resolver.resolve("8.8.8.8".parse().unwrap());
        assert_eq!(asn, Asn(15169));
        assert_eq!(dns.calls.load(Ordering::SeqCst), 1);

        let asn2 = resolver.resolve("8.8.8.9".parse().unwrap());
        assert_eq!(asn2, Asn(15169));
        assert_eq!(dns.calls.load(Ordering::SeqCst), 1, "second call must hit cache");
    }

    #[test]
    fn negative_learn_after_three_empty_attempts() {
        let (resolver, dns) = resolver_with(vec![]);
        let asn = resolver.resolve("100.64.0.1".parse().unwrap());
        assert_eq!(asn, Asn::UNKNOWN);
        assert_eq!(dns.calls.load(Ordering::SeqCst), 3);

        let entry = resolver
            .cache
            .lookup("100.64.0.1".parse().unwrap())
            .unwrap();
        assert_eq!(entry.asn, Asn::UNKNOWN);
        let expected = unix_now() + SHORT_TTL;
        assert!(entry.expiry.abs_diff(expected) <= 2);
    }
}

//! Longest-prefix-match ASN cache (spec §4.1).
//!
//! Backed by a pair of binary (Patricia) tries — one for IPv4, one for IPv6
//! — protected by a single [`RwLock`] per the single-writer/many-reader
//! discipline called for by the concurrency model. Cloning a [`PrefixCache`]
//! clones the `Arc` handle, not the trie, so every worker thread and the
//! persistence task share one backing store.

mod seed;
mod trie;

use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use ipnet::IpNet;
use serde::Serialize;

use trie::Trie;

/// 32-bit Autonomous System Number, with the two sentinel values the spec
/// reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Asn(pub u32);

impl Asn {
    /// Operator-tagged local network.
    pub const INTERNAL: Asn = Asn(0);
    /// No ASN could be determined.
    pub const UNKNOWN: Asn = Asn(0xFFFF_FFFF);
}

impl std::fmt::Display for Asn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `expiry = 0` means "never expires", matching `PrefixExpire.Never` in the
/// reference implementation.
pub const NEVER: u64 = 0;
/// Positive DNS answers are cached for 28 days.
pub const DEFAULT_TTL: u64 = 2_419_200;
/// Negative (empty/failed) DNS answers are cached for 2 days.
pub const SHORT_TTL: u64 = 172_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub asn: Asn,
    pub expiry: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry != NEVER && self.expiry <= now
    }
}

/// Converts a CIDR network into a uniform `(key, prefix_len)` pair:
/// IPv4 addresses occupy the high 32 bits of the 128-bit key space so both
/// families can walk the same trie-node code (but never the same tree).
fn net_to_key(net: &IpNet) -> (u128, u8, bool) {
    match net {
        IpNet::V4(v4) => (
            (u32::from(v4.network()) as u128) << 96,
            v4.prefix_len(),
            true,
        ),
        IpNet::V6(v6) => (u128::from(v6.network()), v6.prefix_len(), false),
    }
}

fn ip_to_key(ip: IpAddr) -> (u128, bool) {
    match ip {
        IpAddr::V4(v4) => ((u32::from(v4) as u128) << 96, true),
        IpAddr::V6(v6) => (u128::from(v6), false),
    }
}

#[derive(Debug, Default)]
struct Tries {
    v4: Trie<CacheEntry>,
    v6: Trie<CacheEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct PrefixCache {
    inner: Arc<RwLock<Tries>>,
}

impl PrefixCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the fixed RFC/special-use prefix set plus any operator-pinned
    /// `local_prefixes`, all with `expiry = NEVER`.
    pub fn seed(&self, local_prefixes: &[IpNet]) {
        let mut tries = self.inner.write().unwrap();
        for (net, asn) in seed::rfc_prefix_table() {
            Self::insert_locked(&mut tries, &net, asn, NEVER);
        }
        for net in local_prefixes {
            Self::insert_locked(&mut tries, net, Asn::INTERNAL, NEVER);
        }
    }

    /// Longest-prefix match. Returns a copy of the entry (expired entries
    /// are returned too; the resolver is responsible for refreshing them).
    pub fn lookup(&self, ip: IpAddr) -> Option<CacheEntry> {
        self.lookup_entry(ip).map(|(_, entry)| entry)
    }

    /// Like [`PrefixCache::lookup`] but also returns the matched network, so
    /// callers (the resolver) can delete the exact entry that expired
    /// without re-deriving its prefix length.
    pub fn lookup_entry(&self, ip: IpAddr) -> Option<(IpNet, CacheEntry)> {
        let (key, is_v4) = ip_to_key(ip);
        let tries = self.inner.read().unwrap();
        let (prefix_len, entry) = if is_v4 {
            tries.v4.lookup_longest(key, 32)?
        } else {
            tries.v6.lookup_longest(key, 128)?
        };
        let net = IpNet::new(ip, prefix_len).ok()?.trunc();
        Some((net, *entry))
    }

    /// Idempotent upsert.
    pub fn insert(&self, net: IpNet, asn: Asn, expiry: u64) {
        let mut tries = self.inner.write().unwrap();
        Self::insert_locked(&mut tries, &net, asn, expiry);
    }

    fn insert_locked(tries: &mut Tries, net: &IpNet, asn: Asn, expiry: u64) {
        let (key, prefix_len, is_v4) = net_to_key(net);
        let entry = CacheEntry { asn, expiry };
        if is_v4 {
            tries.v4.insert(key, prefix_len, entry);
        } else {
            tries.v6.insert(key, prefix_len, entry);
        }
    }

    pub fn delete(&self, net: IpNet) {
        let (key, prefix_len, is_v4) = net_to_key(&net);
        let mut tries = self.inner.write().unwrap();
        if is_v4 {
            tries.v4.delete(key, prefix_len);
        } else {
            tries.v6.delete(key, prefix_len);
        }
    }

    /// A consistent point-in-time view of every entry, for persistence.
    pub fn snapshot(&self) -> Vec<(IpNet, CacheEntry)> {
        let tries = self.inner.read().unwrap();
        let mut out = Vec::new();
        for (key, prefix_len, entry) in tries.v4.entries() {
            let addr = std::net::Ipv4Addr::from(((key >> 96) & 0xFFFF_FFFF) as u32);
            if let Ok(net) = IpNet::new(addr.into(), prefix_len) {
                out.push((net, entry));
            }
        }
        for (key, prefix_len, entry) in tries.v6.entries() {
            let addr = std::net::Ipv6Addr::from(key);
            if let Ok(net) = IpNet::new(addr.into(), prefix_len) {
                out.push((net, entry));
            }
        }
        out
    }

    /// Bulk insert, typically right after [`PrefixCache::seed`] at startup.
    pub fn hydrate(&self, entries: impl IntoIterator<Item = (IpNet, CacheEntry)>) {
        let mut tries = self.inner.write().unwrap();
        for (net, entry) in entries {
            Self::insert_locked(&mut tries, &net, entry.asn, entry.expiry);
        }
    }

    pub fn len(&self) -> usize {
        let tries = self.inner.read().unwrap();
        tries.v4.entries().len() + tries.v6.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_reserved_address_is_unknown_and_never_expires() {
        let cache = PrefixCache::new();
        cache.seed(&[]);

        let entry = cache.lookup("10.1.2.3".parse().unwrap()).unwrap();
        assert_eq!(entry.asn, Asn::UNKNOWN);
        assert_eq!(entry.expiry, NEVER);

        let entry = cache.lookup("fe80::1".parse().unwrap()).unwrap();
        assert_eq!(entry.asn, Asn::UNKNOWN);
        assert_eq!(entry.expiry, NEVER);
    }

    #[test]
    fn as112_prefix_is_pinned() {
        let cache = PrefixCache::new();
        cache.seed(&[]);
        let entry = cache.lookup("192.175.48.5".parse().unwrap()).unwrap();
        assert_eq!(entry.asn, Asn(112));
        assert_eq!(entry.expiry, NEVER);
    }

    #[test]
    fn insert_then_delete_falls_back_to_shorter_prefix_or_nil() {
        let cache = PrefixCache::new();
        let base: IpNet = "198.51.100.0/24".parse().unwrap();
        cache.insert(base, Asn(64512), NEVER);

        let narrow: IpNet = "198.51.100.128/25".parse().unwrap();
        cache.insert(narrow, Asn(64513), 1_000);

        cache.delete(narrow);

        let entry = cache.lookup("198.51.100.200".parse().unwrap());
        match entry {
            None => {}
            Some(entry) => assert_eq!(entry.asn, Asn(64512)),
        }
    }

    #[test]
    fn hydrate_of_snapshot_is_identity() {
        let cache = PrefixCache::new();
        cache.seed(&[]);
        cache.insert("8.8.8.0/24".parse().unwrap(), Asn(15169), 12345);

        let snapshot = cache.snapshot();

        let rebuilt = PrefixCache::new();
        rebuilt.hydrate(snapshot.clone());

        let mut a = snapshot;
        let mut b = rebuilt.snapshot();
        a.sort_by_key(|(net, _)| net.to_string());
        b.sort_by_key(|(net, _)| net.to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn local_prefixes_are_pinned_internal() {
        let cache = PrefixCache::new();
        let local: IpNet = "10.55.0.0/16".parse().unwrap();
        cache.seed(&[local]);
        let entry = cache.lookup("10.55.1.1".parse().unwrap()).unwrap();
        assert_eq!(entry.asn, Asn::INTERNAL);
    }
}

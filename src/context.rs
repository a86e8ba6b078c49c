//! Shared application state (spec §9 design note: make the reference's
//! scattered global mutable state — the prefix cache, template dictionaries,
//! and the "keep running" flag — an explicit handle instead of module-level
//! statics).

use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ipnet::IpNet;

use crate::cache::PrefixCache;
use crate::config::Config;
use crate::decoder::TemplateTable;
use crate::error::{GixflowError, Result};
use crate::resolver::{AsnResolver, TxtLookup};

/// Forwarding target, pre-resolved once at startup.
#[derive(Debug, Clone, Copy)]
pub struct ForwardTarget {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// Everything a decoder worker or the persistence worker needs, bundled
/// behind cheap-to-clone `Arc`-backed handles.
#[derive(Clone)]
pub struct AppContext {
    pub cache: PrefixCache,
    pub templates: TemplateTable,
    pub resolver: Option<AsnResolver>,
    pub forward: Option<ForwardTarget>,
    pub running: Arc<AtomicBool>,
    pub debug: bool,
}

impl AppContext {
    /// Builds the shared context from a loaded [`Config`], seeding the
    /// prefix cache but not yet hydrating it from the durable store (the
    /// caller does that once the store is open, per spec §4.5 startup
    /// ordering). `dns` is consulted only when `config.ip2asn` is set; the
    /// resulting resolver shares this context's own [`PrefixCache`], so
    /// cache hits/misses observed by the resolver are the same ones the
    /// persistence worker snapshots.
    pub fn build(config: &Config, dns: Option<Arc<dyn TxtLookup>>) -> Result<Self> {
        let mut local_prefixes = Vec::with_capacity(config.local_prefixes.len());
        for raw in &config.local_prefixes {
            let net: IpNet = raw
                .parse()
                .map_err(|source| GixflowError::InvalidLocalPrefix {
                    prefix: raw.clone(),
                    source,
                })?;
            local_prefixes.push(net);
        }

        let cache = PrefixCache::new();
        cache.seed(&local_prefixes);

        let resolver = if config.ip2asn {
            dns.map(|dns| AsnResolver::new(cache.clone(), dns, config.debug))
        } else {
            None
        };

        let forward = config.forwardto_enable.then_some(ForwardTarget {
            ip: config.forwardto_ip,
            port: config.forwardto_port,
        });

        Ok(Self {
            cache,
            templates: TemplateTable::new(config.template_cache_size),
            resolver,
            forward,
            running: Arc::new(AtomicBool::new(true)),
            debug: config.debug,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn shut_down(&self) {
        self.running.store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_seeds_cache_and_honors_local_prefixes() {
        let mut config = Config::default();
        config.local_prefixes = vec!["10.77.0.0/16".to_string()];
        let ctx = AppContext::build(&config, None).unwrap();

        let entry = ctx.cache.lookup("10.77.1.1".parse().unwrap()).unwrap();
        assert_eq!(entry.asn, crate::cache::Asn::INTERNAL);
        assert!(ctx.is_running());
    }

    #[test]
    fn invalid_local_prefix_is_rejected() {
        let mut config = Config::default();
        config.local_prefixes = vec!["not-a-cidr".to_string()];
        assert!(AppContext::build(&config, None).is_err());
    }

    #[test]
    fn forward_target_only_set_when_enabled() {
        let mut config = Config::default();
        config.forwardto_enable = false;
        let ctx = AppContext::build(&config, None).unwrap();
        assert!(ctx.forward.is_none());

        config.forwardto_enable = true;
        let ctx = AppContext::build(&config, None).unwrap();
        assert!(ctx.forward.is_some());
    }

    #[test]
    fn shut_down_flips_running_flag() {
        let config = Config::default();
        let ctx = AppContext::build(&config, None).unwrap();
        ctx.shut_down();
        assert!(!ctx.is_running());
    }
}

//! Template tracking for NetFlow v9 and IPFIX (spec §3, §9 design note:
//! "make the reference's global mutable template dictionary an explicit,
//! boundable handle instead of an unbounded process-wide map").
//!
//! Templates are scoped per `(exporter, source/domain id, template id)`
//! triple because the same template id is reused independently by every
//! exporter and, within one exporter, by every NetFlow source id / IPFIX
//! observation domain.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Identifies one template across every exporter this process talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub exporter: IpAddr,
    pub source_id: u32,
    pub template_id: u16,
}

/// The ordered `(field_id, field_length)` pairs a template declares. Option
/// scopes and option fields are flattened into the same list; the decoder
/// only ever looks up [`fields::IPV4_SRC_ADDR`](super::fields::IPV4_SRC_ADDR)
/// and [`fields::IPV4_DST_ADDR`](super::fields::IPV4_DST_ADDR) out of it, so
/// option vs. scope field distinctions don't need to survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDef {
    pub fields: Vec<(u16, u16)>,
    /// `true` for templates declared in an options-template flowset/set.
    /// Forwarding extends and ASN-enriches ordinary templates only; options
    /// records (sampler/metering metadata, not traffic) pass through
    /// unmodified (spec §4.3.3).
    pub is_option: bool,
}

impl TemplateDef {
    pub fn new(fields: Vec<(u16, u16)>) -> Self {
        Self {
            fields,
            is_option: false,
        }
    }

    pub fn option(fields: Vec<(u16, u16)>) -> Self {
        Self {
            fields,
            is_option: true,
        }
    }

    pub fn record_len(&self) -> usize {
        super::fields::record_length(&self.fields)
    }

    /// `false` if any field is IPFIX variable-length (length `0xFFFF`):
    /// a fixed byte-offset walk can't locate fields after it, so such
    /// templates are skipped rather than mis-decoded (spec §4.3.2's IPFIX
    /// coverage is scoped to fixed-width vendor fields).
    pub fn is_fixed_width(&self) -> bool {
        self.fields.iter().all(|(_, len)| *len != 0xFFFF)
    }
}

struct Inner {
    defs: HashMap<TemplateKey, TemplateDef>,
    /// FIFO eviction order, independent of `defs`' hash order, so the table
    /// stays bounded under `capacity` (spec's added `template_cache_size`
    /// config key) without needing an LRU clock.
    order: VecDeque<TemplateKey>,
    capacity: usize,
}

/// Thread-safe, capacity-bounded store of every template currently known to
/// the process. Cheap to clone: an `Arc`-backed handle shared by every
/// decoder worker, so a template learned by one worker's datagram is
/// immediately visible to the others (spec §4.3: "a given exporter's
/// flowsets may arrive at any worker").
#[derive(Clone)]
pub struct TemplateTable {
    inner: Arc<Mutex<Inner>>,
}

impl TemplateTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                defs: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            })),
        }
    }

    /// Records or replaces a template definition, evicting the oldest entry
    /// first if the table is at capacity and `key` is new.
    pub fn insert(&self, key: TemplateKey, def: TemplateDef) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.defs.contains_key(&key) {
            if inner.defs.len() >= inner.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.defs.remove(&oldest);
                }
            }
            inner.order.push_back(key);
        }
        inner.defs.insert(key, def);
    }

    pub fn get(&self, key: &TemplateKey) -> Option<TemplateDef> {
        self.inner.lock().unwrap().defs.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

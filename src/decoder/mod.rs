//! NetFlow v9 / IPFIX decoding (spec §4.3).
//!
//! Unlike the teacher crate (a read-only introspection library), this
//! decoder also knows how to re-emit a v9 datagram enriched with ASN
//! fields when forwarding is enabled (spec §4.3.3), so it works directly
//! against raw bytes with hand-written `nom` parsers rather than the
//! teacher's derive-heavy struct-per-protocol-field approach — template
//! tracking and byte re-emission don't fit a read-only derive target.

mod fields;
mod header;
mod ipfix;
mod template;
mod v9;

use std::net::IpAddr;

use header::NetflowVersion;
pub use template::{TemplateDef, TemplateKey, TemplateTable};

use crate::resolver::AsnResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("datagram truncated before a complete header could be read")]
    Truncated,
    #[error("unsupported NetFlow version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown {version} set id {set_id}")]
    UnknownSet {
        version: &'static str,
        set_id: u16,
    },
    #[error("data flowset for template {template_id} arrived before its template")]
    TemplateNotYetSeen { template_id: u16 },
}

/// One decoded flow's worth of enrichment-relevant fields. The remaining
/// record bytes (byte/packet counts, ports, tcp flags, ...) are opaque to
/// the core and are carried through to the forward datagram unparsed, per
/// spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSummary {
    pub src_ip: Option<std::net::Ipv4Addr>,
    pub dst_ip: Option<std::net::Ipv4Addr>,
    pub src_asn: crate::cache::Asn,
    pub dst_asn: crate::cache::Asn,
}

#[derive(Debug, Clone, Default)]
pub struct DecodeOutcome {
    pub records: Vec<FlowSummary>,
    /// Present only when forwarding is enabled and at least one v9 flowset
    /// was re-emittable (spec §4.3.3 is v9-only; IPFIX forwarding is out of
    /// scope).
    pub forward_datagram: Option<Vec<u8>>,
}

/// Decodes one raw datagram from `exporter`. `resolver` is consulted per
/// flow record when ASN enrichment (`ip2asn`) is enabled; `forward` selects
/// whether a re-emission datagram is built (v9 only).
pub fn decode_datagram(
    packet: &[u8],
    exporter: IpAddr,
    templates: &TemplateTable,
    resolver: Option<&AsnResolver>,
    forward: bool,
) -> Result<DecodeOutcome, DecodeError> {
    let (version, rest) = header::parse_version(packet)?;
    match version {
        NetflowVersion::V9 => v9::decode(rest, exporter, templates, resolver, forward),
        NetflowVersion::IPFix => ipfix::decode(rest, exporter, templates, resolver),
        NetflowVersion::Unsupported(v) => Err(DecodeError::UnsupportedVersion(v)),
    }
}

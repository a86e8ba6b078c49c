//! Cymru `origin.asn.cymru.com` query construction and TXT answer parsing.
//!
//! Grounded on the reverse-name and record-splitting approach of the
//! `cymrust` crate, adapted to the spec's "take the first integer when
//! multiple ASNs originate the prefix" rule rather than cymrust's
//! one-result-per-ASN expansion.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use crate::cache::Asn;

/// Builds the reversed DNS name queried for `ip`'s origin ASN. Per spec
/// §4.2 step 1, IPv4 is reduced to the containing /24 before reversing, so
/// `8.8.8.8` becomes `0.8.8.8.origin.asn.cymru.com`, not a full four-octet
/// reverse of the host address.
pub fn reverse_query_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("0.{}.{}.{}.origin.asn.cymru.com", o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => format!("{}.origin6.asn.cymru.com", ipv6_nibbles(v6)),
    }
}

/// Reduces `ip` to the lookup key the spec calls for: the containing /24 for
/// IPv4 (`A.B.C.0`), a /64 for IPv6 (the natural origin6 extension).
pub fn reduce_to_query_network(ip: IpAddr) -> IpNet {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
            IpNet::new(net.into(), 24).expect("/24 is always valid")
        }
        IpAddr::V6(v6) => IpNet::new(v6.into(), 64).expect("/64 is always valid"),
    }
}

fn ipv6_nibbles(ip: Ipv6Addr) -> String {
    fn nibble_to_hex(n: u8) -> char {
        std::char::from_digit(u32::from(n), 16).expect("nibble is always 0..16")
    }
    let mut parts = Vec::with_capacity(32);
    for octet in ip.octets().iter().rev() {
        parts.push(nibble_to_hex(octet & 0x0F));
        parts.push(nibble_to_hex(octet >> 4));
    }
    parts.into_iter().collect::<Vec<_>>().join(".")
}

/// Parses Cymru's origin TXT answer format:
/// `"<asn[,asn...]> | <prefix> | <cc> | <rir> | <date>"`. Unparseable
/// records are skipped rather than failing the whole answer.
pub fn parse_origin_txt(records: &[String]) -> Vec<(IpNet, Asn)> {
    let mut results = Vec::new();
    for record in records {
        let fields: Vec<&str> = record.split('|').map(str::trim).collect();
        if fields.len() < 2 {
            continue;
        }
        let Ok(prefix) = fields[1].parse::<IpNet>() else {
            continue;
        };
        // Multiple ASNs originating the same prefix are whitespace
        // separated; the spec only wants the first.
        if let Some(asn) = fields[0]
            .split_whitespace()
            .find_map(|tok| tok.parse::<u32>().ok())
        {
            results.push((prefix, Asn(asn)));
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_reverse_name_matches_cymru_convention() {
        let name = reverse_query_name("8.8.8.8".parse().unwrap());
        assert_eq!(name, "0.8.8.8.origin.asn.cymru.com");
    }

    #[test]
    fn v6_reverse_name_is_nibble_reversed() {
        let name = reverse_query_name("2001:db8:0123:4567:89ab:cdef:0123:4567".parse().unwrap());
        assert!(name.ends_with(".origin6.asn.cymru.com"));
        assert!(name.starts_with("7.6.5.4.3.2.1.0"));
    }

    #[test]
    fn parses_single_origin_answer() {
        let records = vec!["15169 | 8.8.8.0/24 | US | arin | 2000-01-01".to_string()];
        let parsed = parse_origin_txt(&records);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].1, Asn(15169));
        assert_eq!(parsed[0].0, "8.8.8.0/24".parse::<IpNet>().unwrap());
    }

    #[test]
    fn takes_first_asn_when_multiple_originate_prefix() {
        let records = vec!["1 23 456 | 203.0.113.0/24 | GB | ripencc | 2006-02-17".to_string()];
        let parsed = parse_origin_txt(&records);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].1, Asn(1));
    }

    #[test]
    fn skips_unparseable_records() {
        assert!(parse_origin_txt(&["".to_string()]).is_empty());
        assert!(parse_origin_txt(&["garbage".to_string()]).is_empty());
    }

    #[test]
    fn reduces_to_containing_slash_24() {
        let net = reduce_to_query_network("100.64.0.1".parse().unwrap());
        assert_eq!(net, "100.64.0.0/24".parse::<IpNet>().unwrap());
    }
}

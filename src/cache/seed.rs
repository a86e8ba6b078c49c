//! The fixed RFC special-use / AS112 prefix table (spec §4.1).

use ipnet::IpNet;

use super::Asn;

/// Returns the seed set as `(network, asn)` pairs; every entry gets
/// `expiry = NEVER` when inserted by [`super::PrefixCache::seed`].
pub fn rfc_prefix_table() -> Vec<(IpNet, Asn)> {
    const RESERVED: &[&str] = &[
        "0.0.0.0/8",        // Current network (only valid as source address)
        "10.0.0.0/8",       // Private network
        "127.0.0.0/8",      // Loopback
        "169.254.0.0/16",   // Link-local
        "172.16.0.0/12",    // Private network
        "192.0.0.0/24",     // IETF Protocol Assignments
        "192.0.2.0/24",     // TEST-NET-1
        "192.168.0.0/16",   // Private network
        "198.18.0.0/15",    // Network benchmark tests
        "198.51.100.0/24",  // TEST-NET-2
        "203.0.113.0/24",   // TEST-NET-3
        "224.0.0.0/4",      // IP multicast
        "240.0.0.0/4",      // Reserved
        "2001:10::/28",     // ORCHID
        "2001:db8::/32",    // Documentation
        "3ffe::/16",        // 6bone (second instance)
        "5f00::/8",         // 6bone (first instance)
        "fc00::/7",         // Unique-local
        "fe80::/10",        // Link-local
    ];

    let mut table: Vec<(IpNet, Asn)> = RESERVED
        .iter()
        .map(|cidr| (cidr.parse().expect("static RFC CIDR parses"), Asn::UNKNOWN))
        .collect();

    for cidr in ["192.175.48.0/24", "2620:4f:8000::/48"] {
        table.push((cidr.parse().expect("static AS112 CIDR parses"), Asn(112)));
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_expected_entry_count() {
        assert_eq!(rfc_prefix_table().len(), 21);
    }

    #[test]
    fn as112_entries_carry_asn_112() {
        let as112 = rfc_prefix_table()
            .into_iter()
            .filter(|(_, asn)| *asn == Asn(112))
            .count();
        assert_eq!(as112, 2);
    }
}

//! End-to-end NetFlow v9 decode-and-forward round trip, exercised through
//! the public crate API rather than the decoder's private internals.

use gixflow::decoder::{decode_datagram, TemplateTable};

fn header(count: u16, source_id: u32) -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&9u16.to_be_bytes()); // version
    h.extend_from_slice(&count.to_be_bytes());
    h.extend_from_slice(&0u32.to_be_bytes()); // sys_uptime
    h.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // unix_secs
    h.extend_from_slice(&1u32.to_be_bytes()); // sequence_number
    h.extend_from_slice(&source_id.to_be_bytes());
    h
}

fn template_flowset(template_id: u16, fields: &[(u16, u16)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&template_id.to_be_bytes());
    body.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    for (id, len) in fields {
        body.extend_from_slice(&id.to_be_bytes());
        body.extend_from_slice(&len.to_be_bytes());
    }
    let mut flowset = Vec::new();
    flowset.extend_from_slice(&0u16.to_be_bytes());
    flowset.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
    flowset.extend_from_slice(&body);
    flowset
}

fn data_flowset(template_id: u16, record: &[u8]) -> Vec<u8> {
    let mut flowset = Vec::new();
    flowset.extend_from_slice(&template_id.to_be_bytes());
    flowset.extend_from_slice(&((4 + record.len()) as u16).to_be_bytes());
    flowset.extend_from_slice(record);
    flowset
}

#[test]
fn single_record_datagram_forwards_with_unchanged_header_and_extended_template() {
    let templates = TemplateTable::new(64);
    let exporter = "203.0.113.9".parse().unwrap();

    let mut packet = header(2, 7);
    packet.extend_from_slice(&template_flowset(256, &[(8, 4), (12, 4)]));
    let record = [10, 0, 0, 5, 198, 51, 100, 7];
    packet.extend_from_slice(&data_flowset(256, &record));

    let outcome = decode_datagram(&packet, exporter, &templates, None, true).unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(
        outcome.records[0].src_ip,
        Some("10.0.0.5".parse().unwrap())
    );
    assert_eq!(
        outcome.records[0].dst_ip,
        Some("198.51.100.7".parse().unwrap())
    );

    let forwarded = outcome.forward_datagram.expect("forwarding was enabled");

    // Header: version + count unchanged (record count doesn't grow; only
    // existing records gain bytes).
    assert_eq!(&forwarded[0..2], &9u16.to_be_bytes());
    assert_eq!(&forwarded[2..4], &2u16.to_be_bytes());
    assert_eq!(forwarded.len(), 20 /* header */ + 24 /* extended template flowset */ + 20 /* extended data flowset */);

    // Re-decoding the forwarded bytes against a fresh template table must
    // succeed and now see the appended ASN fields.
    let fresh_templates = TemplateTable::new(64);
    let redecoded = decode_datagram(&forwarded, exporter, &fresh_templates, None, false).unwrap();
    assert_eq!(redecoded.records.len(), 1);
}

#[test]
fn data_for_a_template_never_seen_is_dropped_without_aborting_the_datagram() {
    let templates = TemplateTable::new(64);
    let exporter = "192.0.2.50".parse().unwrap();

    let mut packet = header(1, 3);
    packet.extend_from_slice(&data_flowset(900, &[1, 2, 3, 4]));

    let outcome = decode_datagram(&packet, exporter, &templates, None, false).unwrap();
    assert!(outcome.records.is_empty());
}

#[test]
fn multiple_exporters_keep_independent_template_ids() {
    let templates = TemplateTable::new(64);
    let exporter_a = "198.51.100.1".parse().unwrap();
    let exporter_b = "198.51.100.2".parse().unwrap();

    let mut packet_a = header(2, 1);
    packet_a.extend_from_slice(&template_flowset(256, &[(8, 4), (12, 4)]));
    packet_a.extend_from_slice(&data_flowset(256, &[1, 1, 1, 1, 2, 2, 2, 2]));
    decode_datagram(&packet_a, exporter_a, &templates, None, false).unwrap();

    // exporter_b never sent template 256; its data for that id must drop.
    let mut packet_b = header(1, 1);
    packet_b.extend_from_slice(&data_flowset(256, &[9, 9, 9, 9, 8, 8, 8, 8]));
    let outcome = decode_datagram(&packet_b, exporter_b, &templates, None, false).unwrap();
    assert!(outcome.records.is_empty());
}

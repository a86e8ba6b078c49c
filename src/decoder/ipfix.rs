//! IPFIX (v10, RFC 7011) body decoding: header, set dispatch, template
//! learning, data-record enrichment (spec §4.3.2). Forwarding is out of
//! scope for IPFIX (spec §4.3.3, Non-goals).

use std::net::{IpAddr, Ipv4Addr};

use log::debug;
use nom::number::complete::{be_u16, be_u32};
use nom::IResult;

use super::fields::{self, IPV4_DST_ADDR, IPV4_SRC_ADDR};
use super::template::{TemplateDef, TemplateKey, TemplateTable};
use super::{DecodeError, DecodeOutcome, FlowSummary};
use crate::cache::Asn;
use crate::resolver::AsnResolver;
use crate::time::build_unix_time;

const TEMPLATE_SET_ID: u16 = 2;
const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
const DATA_SET_MIN_ID: u16 = 256;

/// Top bit of an IPFIX field id marks it enterprise-specific, in which case
/// a 4-byte enterprise number follows the `(id, length)` pair.
const ENTERPRISE_BIT: u16 = 0x8000;

struct Header {
    export_time: u32,
    sequence_number: u32,
    domain_id: u32,
}

fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
    // The 2-byte total-message length was already accounted for by the
    // receiver sizing the datagram; nothing downstream needs it, so it's
    // read and discarded here.
    let (input, _length) = be_u16(input)?;
    let (input, export_time) = be_u32(input)?;
    let (input, sequence_number) = be_u32(input)?;
    let (input, domain_id) = be_u32(input)?;
    Ok((
        input,
        Header {
            export_time,
            sequence_number,
            domain_id,
        },
    ))
}

pub fn decode(
    input: &[u8],
    exporter: IpAddr,
    templates: &TemplateTable,
    resolver: Option<&AsnResolver>,
) -> Result<DecodeOutcome, DecodeError> {
    let (mut cursor, header) = parse_header(input).map_err(|_| DecodeError::Truncated)?;

    debug!(
        "ipfix: datagram from {exporter} exported at {:?}, sequence {}, domain {}",
        build_unix_time(header.export_time, 0),
        header.sequence_number,
        header.domain_id
    );

    let mut outcome = DecodeOutcome::default();

    while cursor.len() >= 4 {
        let (rest, set_id) = be_u16::<_, nom::error::Error<&[u8]>>(cursor).unwrap();
        let (rest, length) = be_u16::<_, nom::error::Error<&[u8]>>(rest).unwrap();
        let length = length as usize;
        if length < 4 || length - 4 > rest.len() {
            break;
        }
        let body = &rest[..length - 4];
        let next_cursor = &rest[length - 4..];

        match set_id {
            TEMPLATE_SET_ID => {
                for (template_id, def) in parse_template_records(body) {
                    templates.insert(
                        TemplateKey {
                            exporter,
                            source_id: header.domain_id,
                            template_id,
                        },
                        def,
                    );
                }
            }
            OPTIONS_TEMPLATE_SET_ID => {
                for (template_id, def) in parse_options_template_records(body) {
                    templates.insert(
                        TemplateKey {
                            exporter,
                            source_id: header.domain_id,
                            template_id,
                        },
                        def,
                    );
                }
            }
            id if id >= DATA_SET_MIN_ID => {
                let key = TemplateKey {
                    exporter,
                    source_id: header.domain_id,
                    template_id: id,
                };
                match templates.get(&key) {
                    None => {
                        debug!("ipfix: data set for unseen template {id} from {exporter}, dropping");
                    }
                    Some(def) if !def.is_fixed_width() => {
                        debug!("ipfix: template {id} has a variable-length field, skipping its data");
                    }
                    Some(def) => {
                        outcome.records.extend(decode_data_set(body, &def, resolver));
                    }
                }
            }
            other => {
                // Spec §7: drop the remainder of this set and continue with
                // the rest of the datagram rather than failing it outright.
                debug!("ipfix: unknown set id {other} from {exporter}, skipping set");
            }
        }

        cursor = next_cursor;
    }

    Ok(outcome)
}

fn parse_template_records(body: &[u8]) -> Vec<(u16, TemplateDef)> {
    let mut out = Vec::new();
    let mut cursor = body;
    while cursor.len() >= 4 {
        let Ok((rest, template_id)) = be_u16::<_, nom::error::Error<&[u8]>>(cursor) else {
            break;
        };
        let Ok((rest, field_count)) = be_u16::<_, nom::error::Error<&[u8]>>(rest) else {
            break;
        };
        let Some((fields, remainder)) = read_ipfix_field_pairs(rest, field_count as usize) else {
            break;
        };
        out.push((template_id, TemplateDef::new(fields)));
        cursor = remainder;
    }
    out
}

fn parse_options_template_records(body: &[u8]) -> Vec<(u16, TemplateDef)> {
    let mut out = Vec::new();
    let mut cursor = body;
    while cursor.len() >= 6 {
        let Ok((rest, template_id)) = be_u16::<_, nom::error::Error<&[u8]>>(cursor) else {
            break;
        };
        let Ok((rest, field_count)) = be_u16::<_, nom::error::Error<&[u8]>>(rest) else {
            break;
        };
        let Ok((rest, _scope_field_count)) = be_u16::<_, nom::error::Error<&[u8]>>(rest) else {
            break;
        };
        let Some((fields, remainder)) = read_ipfix_field_pairs(rest, field_count as usize) else {
            break;
        };
        out.push((template_id, TemplateDef::option(fields)));
        cursor = remainder;
    }
    out
}

/// Reads `count` `(id, length[, enterprise number])` field specifiers,
/// masking off the enterprise bit from stored ids (the decoder never
/// matches on vendor-specific fields, only on the standard IPV4 src/dst
/// addr ids) and discarding the enterprise number itself.
fn read_ipfix_field_pairs(input: &[u8], count: usize) -> Option<(Vec<(u16, u16)>, &[u8])> {
    let mut fields = Vec::with_capacity(count);
    let mut cursor = input;
    for _ in 0..count {
        let (rest, raw_id) = be_u16::<_, nom::error::Error<&[u8]>>(cursor).ok()?;
        let (rest, len) = be_u16::<_, nom::error::Error<&[u8]>>(rest).ok()?;
        let (rest, id) = if raw_id & ENTERPRISE_BIT != 0 {
            let (rest, _enterprise_number) = be_u32::<_, nom::error::Error<&[u8]>>(rest).ok()?;
            (rest, raw_id & !ENTERPRISE_BIT)
        } else {
            (rest, raw_id)
        };
        fields.push((id, len));
        cursor = rest;
    }
    Some((fields, cursor))
}

fn decode_data_set(body: &[u8], def: &TemplateDef, resolver: Option<&AsnResolver>) -> Vec<FlowSummary> {
    let record_len = def.record_len();
    if record_len == 0 {
        return Vec::new();
    }

    let mut summaries = Vec::new();
    let mut cursor = body;
    while cursor.len() >= record_len {
        let record = &cursor[..record_len];
        cursor = &cursor[record_len..];

        let src_ip = fields::find_u32_field(&def.fields, record, IPV4_SRC_ADDR).map(Ipv4Addr::from);
        let dst_ip = fields::find_u32_field(&def.fields, record, IPV4_DST_ADDR).map(Ipv4Addr::from);

        let (src_asn, dst_asn) = match resolver {
            Some(resolver) => (
                src_ip.map(|ip| resolver.resolve(IpAddr::V4(ip))).unwrap_or(Asn::UNKNOWN),
                dst_ip.map(|ip| resolver.resolve(IpAddr::V4(ip))).unwrap_or(Asn::UNKNOWN),
            ),
            None => (Asn::UNKNOWN, Asn::UNKNOWN),
        };

        summaries.push(FlowSummary {
            src_ip,
            dst_ip,
            src_asn,
            dst_asn,
        });
    }
    summaries
}
